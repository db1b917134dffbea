use image::{imageops, GenericImageView, ImageBuffer, Pixel, Primitive};

/// Largest size with the aspect ratio of `width x height` that fits inside `target`.
pub fn fit_within(width: u32, height: u32, target_width: u32, target_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (0, 0);
    }
    let scale = f64::min(
        f64::from(target_width) / f64::from(width),
        f64::from(target_height) / f64::from(height),
    );
    let fit = |v: u32, max: u32| ((f64::from(v) * scale).round() as u32).clamp(1, max);
    (fit(width, target_width), fit(height, target_height))
}

/// Offset that centers a `width x height` image on a `pad_width x pad_height` canvas.
pub const fn center_offset(
    width: u32,
    height: u32,
    pad_width: u32,
    pad_height: u32,
) -> Option<(u32, u32)> {
    if width > pad_width || height > pad_height {
        return None;
    }
    Some(((pad_width - width) / 2, (pad_height - height) / 2))
}

/// Place `image` at the center of a canvas filled with `color`.
///
/// Returns the canvas and the top-left corner of the image on it, or `None` when the image
/// is larger than the canvas.
pub fn pad_center<I, P, S>(
    image: &I,
    pad_width: u32,
    pad_height: u32,
    color: P,
) -> Option<(ImageBuffer<P, Vec<S>>, (u32, u32))>
where
    I: GenericImageView<Pixel = P>,
    P: Pixel<Subpixel = S>,
    S: Primitive,
{
    let (width, height) = image.dimensions();

    center_offset(width, height, pad_width, pad_height).map(|(x, y)| {
        let mut canvas = ImageBuffer::from_pixel(pad_width, pad_height, color);
        imageops::overlay(&mut canvas, image, i64::from(x), i64::from(y));
        (canvas, (x, y))
    })
}
