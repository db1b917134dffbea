use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat, RgbImage, Rgba, RgbaImage};
use ndarray::prelude::*;

use rmbg_rs::mocks::{FailingSegmenter, MockModelSource, MockSegmenter};
use rmbg_rs::{
    MattingError, MattingPipeline, ModelSource, ModelSpec, Result, Segmenter,
};

// 統合テスト用のモデルソース（任意のセグメンターを返す）
#[derive(Clone)]
struct FixedSource<M: Segmenter + Clone> {
    segmenter: M,
}

impl<M: Segmenter + Clone + 'static> ModelSource for FixedSource<M> {
    type Segmenter = M;

    fn load(&self, _spec: &ModelSpec) -> Result<M> {
        Ok(self.segmenter.clone())
    }
}

fn encode(image: &RgbaImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image.clone())
        .write_to(&mut bytes, format)
        .unwrap();
    bytes.into_inner()
}

fn decode(bytes: &[u8]) -> RgbaImage {
    image::load_from_memory(bytes).unwrap().to_rgba8()
}

#[tokio::test]
async fn test_opaque_red_scenario() -> Result<()> {
    let source = MockModelSource::new().with_segmenter(MockSegmenter::new(255.0));
    let pipeline = MattingPipeline::new(source, ModelSpec::rmbg());
    let red = RgbaImage::from_pixel(100, 100, Rgba([255, 0, 0, 255]));

    let result = pipeline.process(red).await?;
    let output = decode(result.bytes());

    assert_eq!(output.dimensions(), (100, 100));
    assert!(output.pixels().all(|p| p.0 == [255, 0, 0, 255]));
    result.revoke();
    Ok(())
}

#[tokio::test]
async fn test_colour_channels_survive_compositing() -> Result<()> {
    let source = MockModelSource::new().with_segmenter(MockSegmenter::new(0.5));
    let pipeline = MattingPipeline::new(source, ModelSpec::rmbg());
    let original = RgbaImage::from_fn(73, 41, |x, y| {
        Rgba([(x * 3) as u8, (y * 5) as u8, (x + y) as u8, 255])
    });

    let result = pipeline
        .process(encode(&original, ImageFormat::Png))
        .await?;
    let output = decode(result.bytes());

    assert_eq!(output.dimensions(), original.dimensions());
    for (out, src) in output.pixels().zip(original.pixels()) {
        assert_eq!(out.0[..3], src.0[..3]);
        assert_eq!(out.0[3], 127);
    }
    result.revoke();
    Ok(())
}

#[tokio::test]
async fn test_all_zero_mask_is_fully_transparent() -> Result<()> {
    let source = MockModelSource::new().with_segmenter(MockSegmenter::transparent());
    let pipeline = MattingPipeline::new(source, ModelSpec::rmbg());
    let original = RgbaImage::from_pixel(31, 64, Rgba([10, 20, 30, 255]));

    let result = pipeline.process(original).await?;
    let output = decode(result.bytes());

    assert!(output.pixels().all(|p| p.0 == [10, 20, 30, 0]));
    result.revoke();
    Ok(())
}

#[tokio::test]
async fn test_non_image_bytes_are_decode_errors() {
    let pipeline = MattingPipeline::new(MockModelSource::new(), ModelSpec::rmbg());

    for bytes in [Vec::new(), b"definitely not a picture".to_vec(), vec![0x89, b'P', b'N', b'G']] {
        let err = pipeline.process(bytes).await.unwrap_err();
        assert!(matches!(err, MattingError::Decode { .. }), "{:?}", err);
    }
    assert_eq!(pipeline.store().live_count(), 0);
}

#[tokio::test]
async fn test_wrong_mask_shape_is_inference_error() {
    let source = FixedSource {
        segmenter: MockSegmenter::opaque().with_shape(&[1, 1, 512, 512]),
    };
    let pipeline = MattingPipeline::new(source, ModelSpec::rmbg());

    let err = pipeline
        .process(RgbaImage::new(20, 20))
        .await
        .unwrap_err();

    assert!(matches!(err, MattingError::Inference { .. }), "{:?}", err);
    assert_eq!(pipeline.store().live_count(), 0);
}

#[tokio::test]
async fn test_segmenter_failure_is_inference_error() {
    let pipeline = MattingPipeline::new(FixedSource { segmenter: FailingSegmenter }, ModelSpec::rmbg());

    let err = pipeline.process(RgbaImage::new(4, 4)).await.unwrap_err();

    assert!(matches!(err, MattingError::Inference { .. }), "{:?}", err);
}

#[tokio::test]
async fn test_jpeg_input_is_decoded() -> Result<()> {
    let pipeline = MattingPipeline::new(MockModelSource::new(), ModelSpec::rmbg());
    let original = RgbaImage::from_pixel(16, 8, Rgba([0, 128, 255, 255]));
    let jpeg = {
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(original)
            .to_rgb8()
            .write_to(&mut bytes, ImageFormat::Jpeg)
            .unwrap();
        bytes.into_inner()
    };

    let result = pipeline.process(jpeg).await?;

    assert_eq!((result.width, result.height), (16, 8));
    assert_eq!(decode(result.bytes()).dimensions(), (16, 8));
    result.revoke();
    Ok(())
}

#[tokio::test]
async fn test_exif_rotated_jpeg_keeps_display_orientation() -> Result<()> {
    // Orientation=6: stored 40x20, displayed rotated 90 degrees clockwise
    let mut exif = vec![b'I', b'I', 0x2a, 0x00, 0x08, 0x00, 0x00, 0x00, 0x01, 0x00];
    exif.extend_from_slice(&[0x12, 0x01, 0x03, 0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x00]);
    exif.extend_from_slice(&[0, 0, 0, 0, 0, 0]);

    let mut jpeg = Vec::new();
    let mut encoder = JpegEncoder::new(&mut jpeg);
    encoder.set_exif_metadata(exif).unwrap();
    encoder
        .write_image(RgbImage::new(40, 20).as_raw(), 40, 20, ExtendedColorType::Rgb8)
        .unwrap();

    let pipeline = MattingPipeline::new(MockModelSource::new(), ModelSpec::rmbg());
    let result = pipeline.process(jpeg).await?;

    assert_eq!((result.width, result.height), (20, 40));
    assert_eq!(decode(result.bytes()).dimensions(), (20, 40));
    result.revoke();
    Ok(())
}

#[tokio::test]
async fn test_empty_decoded_image_is_rejected_before_load() {
    let source = MockModelSource::new();
    let pipeline = MattingPipeline::new(source.clone(), ModelSpec::rmbg());

    let err = pipeline.process(RgbaImage::new(0, 12)).await.unwrap_err();

    assert!(matches!(err, MattingError::Decode { .. }), "{:?}", err);
    assert_eq!(source.load_attempts(), 0);
}

#[tokio::test]
async fn test_results_stay_valid_until_revoked() -> Result<()> {
    let pipeline = MattingPipeline::new(MockModelSource::new(), ModelSpec::rmbg());

    let first = pipeline.process(RgbaImage::new(3, 3)).await?;
    let second = pipeline.process(RgbaImage::new(5, 5)).await?;
    assert_eq!(pipeline.store().live_count(), 2);

    let url = first.url().to_string();
    first.revoke();
    assert!(pipeline.store().resolve(&url).is_none());
    assert!(pipeline.store().resolve(second.url()).is_some());

    second.revoke();
    assert_eq!(pipeline.store().live_count(), 0);
    Ok(())
}

#[test]
fn test_trait_abstraction() -> Result<()> {
    let segmenter: Box<dyn Segmenter> = Box::new(MockSegmenter::opaque());
    let mask = segmenter.infer(Array4::<f32>::zeros((1, 3, 32, 32)).view())?;
    assert_eq!(mask.shape(), &[1, 1, 32, 32]);
    Ok(())
}
