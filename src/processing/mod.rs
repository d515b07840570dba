//! # Image Processing
//!
//! Turns upstream sprites into bitmaps the OLED firmware can draw.
//!
//! - [`fetcher`]: HTTP retrieval with per-request timeouts
//! - [`sprites`]: smallest-sprite selection by byte size
//! - [`bitmap`]: fit, threshold and bit-pack into 1-bit scanlines

pub mod bitmap;
pub mod fetcher;
pub mod sprites;

// Re-export main items for convenience
pub use bitmap::{convert_bytes_to_bitmap, convert_to_bitmap, Bitmap};
pub use fetcher::ImageFetcher;
pub use sprites::{collect_sprite_urls, select_smallest};
