use crate::errors::{MattingError, Result};

/// Size bookkeeping for an interleaved 8-bit pixel buffer.
///
/// All size arithmetic is checked: a layout whose byte length does not fit in `usize`
/// yields `None` instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelLayout {
    width: u32,
    height: u32,
    channels: usize,
}

impl PixelLayout {
    pub const RGBA_CHANNELS: usize = 4;
    pub const ALPHA: usize = 3;

    pub const fn new(width: u32, height: u32, channels: usize) -> Self {
        Self {
            width,
            height,
            channels,
        }
    }

    pub const fn rgba(width: u32, height: u32) -> Self {
        Self::new(width, height, Self::RGBA_CHANNELS)
    }

    pub const fn channels(&self) -> usize {
        self.channels
    }

    pub fn pixel_count(&self) -> Option<usize> {
        usize::try_from(self.width)
            .ok()?
            .checked_mul(usize::try_from(self.height).ok()?)
    }

    pub fn byte_len(&self) -> Option<usize> {
        self.pixel_count()?.checked_mul(self.channels)
    }

    /// Reserve an empty buffer able to hold the whole layout.
    ///
    /// Fails with `UnsupportedPlatform` when the buffer cannot exist on this target: the
    /// size overflows the address space, exceeds `max_alloc` bytes, or the allocator refuses.
    pub fn allocate(&self, max_alloc: u64) -> Result<Vec<u8>> {
        let len = self
            .byte_len()
            .ok_or_else(|| MattingError::UnsupportedPlatform {
                reason: format!(
                    "a {}x{}x{} pixel buffer exceeds the address space",
                    self.width, self.height, self.channels
                ),
            })?;

        if len as u64 > max_alloc {
            return Err(MattingError::UnsupportedPlatform {
                reason: format!(
                    "a {}x{} pixel buffer needs {} bytes, above the {} byte limit",
                    self.width, self.height, len, max_alloc
                ),
            });
        }

        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(len)
            .map_err(|e| MattingError::UnsupportedPlatform {
                reason: format!("pixel buffer allocation of {} bytes failed: {}", len, e),
            })?;
        Ok(buffer)
    }
}
