//! # Monochrome Bitmap Codec
//!
//! Converts a decoded raster image into the 1-bit, byte-aligned bitmap that an
//! SSD1306-style OLED expects (`drawBitmap` layout).
//!
//! ## Algorithm
//!
//! 1. **Fit**: compute a target size inside `(max_width, max_height)` that keeps
//!    the source aspect ratio. Images that already fit are left alone.
//!    Landscape images are width-limited first, portrait and square images
//!    height-limited first, each re-checked against the other axis.
//!    Every step rounds to the nearest integer.
//! 2. **Align**: round the width up to the next multiple of 8 so each scanline
//!    is a whole number of bytes.
//! 3. **Contain**: scale the source into the aligned box without cropping,
//!    centre it and pad the remainder with fully transparent pixels.
//! 4. **Channels**: read alpha and luminance for every pixel of the padded image.
//! 5. **Threshold**: a pixel is foreground iff `alpha > 128 && luminance < 180`.
//!    Transparent padding and light artwork both stay unset.
//! 6. **Pack**: 8 horizontal pixels per byte, MSB first (bit 7 = leftmost),
//!    row-major.
//!
//! ## Output Size
//! A 128x64 display needs at most `128 / 8 * 64 = 1024` bytes.

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use serde::Serialize;

/// Pixels at or below this alpha are treated as transparent.
pub const ALPHA_THRESHOLD: u8 = 128;

/// Pixels at or above this luminance are treated as background (white).
pub const LUMINANCE_THRESHOLD: u8 = 180;

/// A packed 1-bit-per-pixel monochrome image.
///
/// `data.len() == height * bytes_per_row` and `width % 8 == 0` always hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
    #[serde(rename = "bitmapData")]
    pub data: Vec<u8>,
}

impl Bitmap {
    /// Whether the pixel at `(x, y)` is set, or `None` outside the bitmap.
    pub fn pixel(&self, x: u32, y: u32) -> Option<bool> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let byte = self.data.get((y * self.bytes_per_row + x / 8) as usize)?;
        Some(byte & (0x80 >> (x % 8)) != 0)
    }

    /// Number of set pixels.
    pub fn lit_pixels(&self) -> u32 {
        self.data.iter().map(|b| b.count_ones()).sum()
    }

    fn blank(width: u32, height: u32) -> Self {
        let bytes_per_row = width / 8;
        Self {
            width,
            height,
            bytes_per_row,
            data: vec![0; (bytes_per_row * height) as usize],
        }
    }
}

/// Compute the aspect-preserving size of an `orig_width x orig_height` image
/// inside a `max_width x max_height` box.
///
/// Never returns a zero dimension: extremely thin images keep at least one
/// pixel on the short axis.
pub fn fit_within(orig_width: u32, orig_height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if orig_width <= max_width && orig_height <= max_height {
        return (orig_width.max(1), orig_height.max(1));
    }

    let aspect_ratio = orig_width as f64 / orig_height as f64;
    let round = |v: f64| v.round() as u32;

    let (width, height) = if aspect_ratio > 1.0 {
        // Landscape: width is the limiting side
        let mut width = max_width;
        let mut height = round(max_width as f64 / aspect_ratio);
        if height > max_height {
            height = max_height;
            width = round(max_height as f64 * aspect_ratio);
        }
        (width, height)
    } else {
        // Portrait or square: height is the limiting side
        let mut height = max_height;
        let mut width = round(max_height as f64 * aspect_ratio);
        if width > max_width {
            width = max_width;
            height = round(max_width as f64 / aspect_ratio);
        }
        (width, height)
    };

    (width.max(1), height.max(1))
}

/// Round a pixel width up to whole bytes.
pub fn byte_aligned(width: u32) -> u32 {
    width.div_ceil(8) * 8
}

/// Convert a decoded image into a packed monochrome bitmap.
///
/// Deterministic: the same input always yields the same bytes.
///
/// # Example
/// ```ignore
/// let img = image::open("pikachu.png")?;
/// let bitmap = convert_to_bitmap(&img, 128, 64);
/// assert_eq!(bitmap.data.len(), (bitmap.height * bitmap.width / 8) as usize);
/// ```
pub fn convert_to_bitmap(image: &DynamicImage, max_width: u32, max_height: u32) -> Bitmap {
    let source = image.to_rgba8();
    let (orig_width, orig_height) = source.dimensions();

    let (width, height) = fit_within(orig_width, orig_height, max_width, max_height);
    let aligned_width = byte_aligned(width);

    if orig_width == 0 || orig_height == 0 {
        return Bitmap::blank(aligned_width, height);
    }

    let canvas = contain(&source, aligned_width, height);

    // Two parallel channels over the padded canvas
    let (alpha, luma): (Vec<u8>, Vec<u8>) = canvas
        .pixels()
        .map(|px| (px[3], luminance(px)))
        .unzip();

    let bytes_per_row = aligned_width / 8;
    let mut data = Vec::with_capacity((bytes_per_row * height) as usize);

    for y in 0..height {
        for byte_x in 0..bytes_per_row {
            let mut byte = 0u8;
            for bit in 0..8 {
                let index = (y * aligned_width + byte_x * 8 + bit) as usize;
                if alpha[index] > ALPHA_THRESHOLD && luma[index] < LUMINANCE_THRESHOLD {
                    byte |= 1 << (7 - bit); // MSB first
                }
            }
            data.push(byte);
        }
    }

    Bitmap {
        width: aligned_width,
        height,
        bytes_per_row,
        data,
    }
}

/// Decode an encoded image (PNG, GIF, JPEG, ...) and convert it.
pub fn convert_bytes_to_bitmap(bytes: &[u8], max_width: u32, max_height: u32) -> Result<Bitmap> {
    let image = image::load_from_memory(bytes).context("failed to decode image")?;
    Ok(convert_to_bitmap(&image, max_width, max_height))
}

/// Scale `source` to fit inside `box_width x box_height`, centred on a fully
/// transparent canvas. Sources that already have the fitted size are copied
/// without resampling.
fn contain(source: &RgbaImage, box_width: u32, box_height: u32) -> RgbaImage {
    let (src_width, src_height) = source.dimensions();
    let scale = f64::min(
        box_width as f64 / src_width as f64,
        box_height as f64 / src_height as f64,
    );
    let fit_width = ((src_width as f64 * scale).round() as u32).clamp(1, box_width);
    let fit_height = ((src_height as f64 * scale).round() as u32).clamp(1, box_height);

    let mut canvas = RgbaImage::from_pixel(box_width, box_height, Rgba([0, 0, 0, 0]));
    let left = ((box_width - fit_width) / 2) as i64;
    let top = ((box_height - fit_height) / 2) as i64;

    if (fit_width, fit_height) == (src_width, src_height) {
        imageops::replace(&mut canvas, source, left, top);
    } else {
        let fitted = imageops::resize(source, fit_width, fit_height, FilterType::Lanczos3);
        imageops::replace(&mut canvas, &fitted, left, top);
    }

    canvas
}

/// Rec. 709 luma of the colour channels, 0 = black, 255 = white.
fn luminance(px: &Rgba<u8>) -> u8 {
    let [r, g, b, _] = px.0;
    ((2126 * r as u32 + 7152 * g as u32 + 722 * b as u32) / 10_000) as u8
}
