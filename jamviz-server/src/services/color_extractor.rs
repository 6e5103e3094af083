//! Dominant color extraction
//!
//! Downloads an image, shrinks it to 150x150 and reduces it to a small palette
//! with median-cut quantization. Decoding and quantization run on a blocking
//! worker.

use super::http_client;
use crate::error::{Error, Result};
use image::imageops::FilterType;
use jamviz_common::models::Rgb;
use std::time::Duration;

const THUMBNAIL_SIZE: u32 = 150;
pub const DEFAULT_PALETTE_SIZE: usize = 5;

pub struct ColorExtractor {
    http_client: reqwest::Client,
    palette_size: usize,
}

impl ColorExtractor {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http_client: http_client(timeout)?,
            palette_size: DEFAULT_PALETTE_SIZE,
        })
    }

    /// Palette of the image at `url`, most common color first
    pub async fn extract(&self, url: &str) -> Result<Vec<Rgb>> {
        let bytes = self
            .http_client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let palette_size = self.palette_size;
        tokio::task::spawn_blocking(move || palette_from_bytes(&bytes, palette_size))
            .await
            .map_err(|e| Error::Internal(format!("color extraction task failed: {}", e)))?
    }
}

/// Decode, resize and quantize (blocking)
pub fn palette_from_bytes(bytes: &[u8], palette_size: usize) -> Result<Vec<Rgb>> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| Error::Image(format!("decode failed: {}", e)))?
        .to_rgb8();
    let resized = image::imageops::resize(&decoded, THUMBNAIL_SIZE, THUMBNAIL_SIZE, FilterType::Lanczos3);
    let pixels: Vec<[u8; 3]> = resized.pixels().map(|p| p.0).collect();
    Ok(median_cut(pixels, palette_size))
}

/// Median-cut quantization
///
/// Repeatedly splits the most populated box along its widest channel at the
/// median until `colors` boxes exist or no box can be split. Each box
/// contributes its mean color; boxes are ordered by population and repeated
/// colors are dropped.
pub fn median_cut(pixels: Vec<[u8; 3]>, colors: usize) -> Vec<Rgb> {
    if pixels.is_empty() || colors == 0 {
        return Vec::new();
    }

    let mut boxes: Vec<Vec<[u8; 3]>> = vec![pixels];
    while boxes.len() < colors {
        let candidate = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.len() > 1 && widest_channel(b).1 > 0)
            .max_by_key(|(_, b)| b.len())
            .map(|(i, _)| i);
        let Some(index) = candidate else {
            break;
        };

        let mut bucket = boxes.swap_remove(index);
        let (channel, _) = widest_channel(&bucket);
        bucket.sort_unstable_by_key(|p| p[channel]);
        let upper = bucket.split_off(bucket.len() / 2);
        boxes.push(bucket);
        boxes.push(upper);
    }

    boxes.sort_by(|a, b| b.len().cmp(&a.len()));
    let mut palette: Vec<Rgb> = Vec::with_capacity(boxes.len());
    for color in boxes.iter().map(|b| mean_color(b)) {
        if !palette.contains(&color) {
            palette.push(color);
        }
    }
    palette
}

/// Channel with the largest value range, and that range
fn widest_channel(pixels: &[[u8; 3]]) -> (usize, u8) {
    (0..3)
        .map(|c| {
            let (min, max) = pixels
                .iter()
                .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[c]), hi.max(p[c])));
            (c, max.saturating_sub(min))
        })
        .max_by_key(|&(_, range)| range)
        .unwrap_or((0, 0))
}

fn mean_color(pixels: &[[u8; 3]]) -> Rgb {
    let mut sums = [0u64; 3];
    for p in pixels {
        for c in 0..3 {
            sums[c] += p[c] as u64;
        }
    }
    let n = pixels.len().max(1) as u64;
    Rgb([
        (sums[0] / n) as u8,
        (sums[1] / n) as u8,
        (sums[2] / n) as u8,
    ])
}
