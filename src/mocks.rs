use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ndarray::prelude::*;

use crate::errors::{MattingError, Result};
use crate::model::ModelSpec;
use crate::traits::{ModelSource, Segmenter};

/// テスト用のモックセグメンテーションモデル
///
/// 一定値のマスクを返す。形状は入力テンソルに合わせた `[1, 1, H, W]`、
/// または形状検証を試すための固定形状。
#[derive(Debug, Clone)]
pub struct MockSegmenter {
    pub fill: f32,
    pub shape: Option<Vec<usize>>,
}

impl MockSegmenter {
    pub const fn new(fill: f32) -> Self {
        Self { fill, shape: None }
    }

    pub const fn opaque() -> Self {
        Self::new(1.0)
    }

    pub const fn transparent() -> Self {
        Self::new(0.0)
    }

    pub fn with_shape(mut self, shape: &[usize]) -> Self {
        self.shape = Some(shape.to_vec());
        self
    }
}

impl Segmenter for MockSegmenter {
    fn infer(&self, tensor: ArrayView4<f32>) -> Result<ArrayD<f32>> {
        let shape = match &self.shape {
            Some(shape) => shape.clone(),
            None => {
                let input = tensor.shape();
                vec![input[0], 1, input[2], input[3]]
            }
        };
        Ok(ArrayD::from_elem(IxDyn(&shape), self.fill))
    }
}

/// Segmenter that always fails, standing in for a crashed runtime.
#[derive(Debug, Clone, Default)]
pub struct FailingSegmenter;

impl Segmenter for FailingSegmenter {
    fn infer(&self, _tensor: ArrayView4<f32>) -> Result<ArrayD<f32>> {
        Err(MattingError::inference("mock inference", "runtime crashed"))
    }
}

/// テスト用のモデルソース
///
/// クローン間でロード回数を数え、先頭の指定回数はネットワークエラーを模して失敗し、
/// 遅延を入れてロード中の状態を保つこともできる。
#[derive(Debug, Clone)]
pub struct MockModelSource {
    segmenter: MockSegmenter,
    attempts: Arc<AtomicUsize>,
    fail_first: usize,
    delay: Duration,
}

impl MockModelSource {
    pub fn new() -> Self {
        Self {
            segmenter: MockSegmenter::opaque(),
            attempts: Arc::new(AtomicUsize::new(0)),
            fail_first: 0,
            delay: Duration::ZERO,
        }
    }

    pub fn with_segmenter(mut self, segmenter: MockSegmenter) -> Self {
        self.segmenter = segmenter;
        self
    }

    pub const fn failing_first(mut self, attempts: usize) -> Self {
        self.fail_first = attempts;
        self
    }

    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn load_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Default for MockModelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelSource for MockModelSource {
    type Segmenter = MockSegmenter;

    fn load(&self, _spec: &ModelSpec) -> Result<MockSegmenter> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if attempt < self.fail_first {
            return Err(MattingError::model(
                "weights download",
                std::io::Error::new(std::io::ErrorKind::ConnectionReset, "simulated network failure"),
            ));
        }
        Ok(self.segmenter.clone())
    }
}
