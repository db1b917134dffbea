mod alpha;
mod layout;
pub mod padding;

pub use alpha::{AlphaMaskError, ReplaceAlpha};
pub use layout::PixelLayout;
