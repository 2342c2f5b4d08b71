// 64-bit DCT perceptual hash, the fallback identity when the embedded mark
// does not survive. Luminance -> 32x32 Lanczos downsample -> 2-D type-II
// DCT -> top-left 8x8 block; each coefficient is compared to the median of
// the 63 AC coefficients, the DC slot is pinned to 0.

use std::fmt;

use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::color;
use crate::error::CodecError;

const SAMPLE: usize = 32;
const LOW: usize = 8;

/// Hamming distance at or below this is a probable match (> 85% similarity).
pub const MATCH_DISTANCE: u32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PerceptualHash(pub u64);

impl PerceptualHash {
    /// Hash an RGB image.
    pub fn from_image(img: &RgbImage) -> PerceptualHash {
        let (w, h) = img.dimensions();
        let gray = GrayImage::from_raw(w, h, color::luminance_plane(img))
            .expect("luminance plane matches image dimensions");
        let small = imageops::resize(&gray, SAMPLE as u32, SAMPLE as u32, FilterType::Lanczos3);

        let mut pixels = [0.0f64; SAMPLE * SAMPLE];
        for (i, px) in small.pixels().enumerate() {
            pixels[i] = px[0] as f64;
        }
        let freq = dct2d(&pixels);

        // Median over the 63 AC coefficients of the low-frequency block.
        let mut acs = Vec::with_capacity(LOW * LOW - 1);
        for r in 0..LOW {
            for c in 0..LOW {
                if r != 0 || c != 0 {
                    acs.push(freq[r * SAMPLE + c]);
                }
            }
        }
        acs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let median = acs[acs.len() / 2];

        let mut bits = 0u64;
        for r in 0..LOW {
            for c in 0..LOW {
                if r == 0 && c == 0 {
                    continue;
                }
                if freq[r * SAMPLE + c] > median {
                    bits |= 1 << (63 - (r * LOW + c));
                }
            }
        }
        PerceptualHash(bits)
    }

    pub fn from_hex(s: &str) -> Result<PerceptualHash, CodecError> {
        if s.len() != 16 {
            return Err(CodecError::InvalidParameter(format!(
                "perceptual hash must be 16 hex chars, got {}",
                s.len()
            )));
        }
        u64::from_str_radix(s, 16)
            .map(PerceptualHash)
            .map_err(|e| CodecError::InvalidParameter(format!("bad perceptual hash: {}", e)))
    }

    pub fn distance(&self, other: &PerceptualHash) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// Similarity as a percentage of agreeing bits.
    pub fn similarity_percent(&self, other: &PerceptualHash) -> f32 {
        (64 - self.distance(other)) as f32 / 64.0 * 100.0
    }

    /// Probable-match predicate: similarity strictly above 85%.
    pub fn is_match(&self, other: &PerceptualHash) -> bool {
        self.distance(other) <= MATCH_DISTANCE
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Unnormalized type-II DCT over rows then columns of a 32x32 plane, the
/// transform the hash was historically built on. Uniform scaling cancels
/// in the median comparison.
fn dct2d(pixels: &[f64; SAMPLE * SAMPLE]) -> Vec<f64> {
    let mut table = [[0.0f64; SAMPLE]; SAMPLE];
    for (k, row) in table.iter_mut().enumerate() {
        for (n, cell) in row.iter_mut().enumerate() {
            *cell = (std::f64::consts::PI * k as f64 * (2 * n + 1) as f64
                / (2.0 * SAMPLE as f64))
                .cos();
        }
    }

    let mut rows = vec![0.0f64; SAMPLE * SAMPLE];
    for r in 0..SAMPLE {
        for k in 0..SAMPLE {
            let mut acc = 0.0;
            for n in 0..SAMPLE {
                acc += pixels[r * SAMPLE + n] * table[k][n];
            }
            rows[r * SAMPLE + k] = 2.0 * acc;
        }
    }
    let mut out = vec![0.0f64; SAMPLE * SAMPLE];
    for c in 0..SAMPLE {
        for k in 0..SAMPLE {
            let mut acc = 0.0;
            for n in 0..SAMPLE {
                acc += rows[n * SAMPLE + c] * table[k][n];
            }
            out[k * SAMPLE + c] = 2.0 * acc;
        }
    }
    out
}
