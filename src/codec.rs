// High-level embed and extract: claim text -> SHA-224 digest -> RS codeword
// -> bit grid tiled over the LL subband -> marked image re-encoded in the
// input container. Extraction runs the chain backwards without the
// original image.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat, ImageReader, RgbImage};
use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224};

use crate::capacity::{self, CapacityPlan};
use crate::ecc::{self, DIGEST_LEN};
use crate::error::{CodecError, Result};
use crate::phash::PerceptualHash;
use crate::{bits, color, quantize, wavelet};

/// Codec parameters. These travel with every call; embed and extract must
/// agree on all three or the recovered bits land in the wrong cosets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WatermarkParams {
    /// Quantization step on the dominant singular value.
    pub q: u32,
    /// Reed-Solomon parity as a percentage of the digest length.
    pub redundancy_percent: u32,
    /// Blocks excluded from each edge of the LL grid.
    pub margin_blocks: usize,
}

impl Default for WatermarkParams {
    fn default() -> Self {
        WatermarkParams { q: 85, redundancy_percent: 50, margin_blocks: 0 }
    }
}

impl WatermarkParams {
    pub fn validate(&self) -> Result<()> {
        // Below 4 the truncated Q/4 lattice offset collapses to zero and
        // every block decodes as 0.
        if self.q < 4 {
            return Err(CodecError::InvalidParameter(format!(
                "quantization step must be at least 4, got {}",
                self.q
            )));
        }
        if ecc::codeword_len(self.redundancy_percent) > 255 {
            return Err(CodecError::InvalidParameter(format!(
                "redundancy {}% exceeds the GF(256) codeword limit",
                self.redundancy_percent
            )));
        }
        Ok(())
    }
}

/// SHA-224 of the claim text. The digest, not the claim, is what the image
/// carries; the claim itself is not recoverable.
pub fn claim_digest(claim: &str) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha224::new();
    hasher.update(claim.as_bytes());
    hasher.finalize().into()
}

/// Everything the embed operation reports back.
pub struct EmbedOutcome {
    /// Marked image, re-encoded in the input container.
    pub image: Vec<u8>,
    pub format: ImageFormat,
    /// 56 hex chars of the embedded SHA-224 digest.
    pub digest_hex: String,
    /// Perceptual hash of the marked image, for registry storage.
    pub phash: PerceptualHash,
    pub capacity: CapacityPlan,
    /// Watermark matrix dimensions, (rows, cols).
    pub matrix_size: (usize, usize),
    pub codeword_bits: usize,
    /// How many times the codeword tiles into the grid.
    pub redundancy_ratio: f32,
}

fn decode_image(bytes: &[u8]) -> Result<(RgbImage, ImageFormat)> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    // Unknown containers re-encode as JPEG on the way out.
    let format = reader.format().unwrap_or(ImageFormat::Jpeg);
    Ok((reader.decode()?.to_rgb8(), format))
}

fn encode_image(img: &RgbImage, format: ImageFormat) -> Result<Vec<u8>> {
    let (w, h) = img.dimensions();
    let mut out = Cursor::new(Vec::new());
    match format {
        ImageFormat::Png => {
            PngEncoder::new(&mut out).write_image(img.as_raw(), w, h, ExtendedColorType::Rgb8)?
        }
        ImageFormat::WebP => WebPEncoder::new_lossless(&mut out).write_image(
            img.as_raw(),
            w,
            h,
            ExtendedColorType::Rgb8,
        )?,
        _ => JpegEncoder::new_with_quality(&mut out, 100).write_image(
            img.as_raw(),
            w,
            h,
            ExtendedColorType::Rgb8,
        )?,
    }
    Ok(out.into_inner())
}

/// Embed the digest of `claim` into `image_bytes`.
pub fn embed(image_bytes: &[u8], claim: &str, params: &WatermarkParams) -> Result<EmbedOutcome> {
    params.validate()?;
    let (img, format) = decode_image(image_bytes)?;
    let (width, height) = img.dimensions();

    let digest = claim_digest(claim);
    let codeword = ecc::encode(&digest, params.redundancy_percent)?;
    let stream = bits::pack_bits(&codeword);

    let plan = capacity::plan(width, height, params.margin_blocks);
    if !plan.fits(stream.len()) || !capacity::margin_leaves_interior(&plan, params.margin_blocks) {
        return Err(CodecError::ImageTooSmall {
            needed: stream.len(),
            available: plan.capacity_bits,
        });
    }
    let (rows, cols) = plan.usable_blocks;
    debug!(
        "embedding {} bits into a {}x{} grid ({}x{} image)",
        stream.len(),
        rows,
        cols,
        width,
        height
    );

    let planes = color::split_planes(&img);
    let mut bands = wavelet::forward(&planes.y, width, height);
    let wm = bits::tile(&stream, rows, cols);
    quantize::embed_grid(&mut bands.ll, bands.cols, &wm, rows, cols, params.q, params.margin_blocks);
    let marked_y = wavelet::inverse(&bands);
    let marked = color::merge_planes(&marked_y, &planes.cb, &planes.cr, width, height);

    let phash = PerceptualHash::from_image(&marked);
    let image = encode_image(&marked, format)?;
    Ok(EmbedOutcome {
        image,
        format,
        digest_hex: hex::encode(digest),
        phash,
        capacity: plan.clone(),
        matrix_size: (rows, cols),
        codeword_bits: stream.len(),
        redundancy_ratio: plan.capacity_bits as f32 / stream.len() as f32,
    })
}

/// Blindly recover the embedded digest from an image. Returns the digest as
/// 56 hex chars, or `EccUncorrectable` when no mark survives.
pub fn extract(image_bytes: &[u8], params: &WatermarkParams) -> Result<String> {
    params.validate()?;
    let (img, _) = decode_image(image_bytes)?;
    let (width, height) = img.dimensions();

    let needed = ecc::codeword_len(params.redundancy_percent) * 8;
    let plan = capacity::plan(width, height, params.margin_blocks);
    if !plan.fits(needed) || !capacity::margin_leaves_interior(&plan, params.margin_blocks) {
        return Err(CodecError::ImageTooSmall { needed, available: plan.capacity_bits });
    }
    let (rows, cols) = plan.usable_blocks;

    let y = color::luminance_plane(&img);
    let bands = wavelet::forward(&y, width, height);
    let grid = quantize::extract_grid(&bands.ll, bands.cols, rows, cols, params.q, params.margin_blocks);
    let stream = bits::vote(&grid, needed);
    let codeword = bits::unpack_bits(&stream);
    let digest = ecc::decode(&codeword, params.redundancy_percent)?;
    debug!("recovered digest {} from {}x{} image", hex::encode(&digest), width, height);
    Ok(hex::encode(digest))
}

/// Perceptual hash of an encoded image, for the fallback lookup path.
pub fn perceptual_hash(image_bytes: &[u8]) -> Result<PerceptualHash> {
    let (img, _) = decode_image(image_bytes)?;
    Ok(PerceptualHash::from_image(&img))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const SHA224_EMPTY: &str = "d14a028c2a3a2bc9476102bb288234c415a2b01f828ea62ac5b3e42f";

    fn textured_image(side: u32) -> RgbImage {
        let mut img = RgbImage::new(side, side);
        for (x, y, px) in img.enumerate_pixels_mut() {
            let v = (100 + (x * 7 + y * 13) % 80) as u8;
            *px = Rgb([v, v.wrapping_add(20), v.wrapping_sub(30)]);
        }
        img
    }

    fn png_bytes(img: &RgbImage) -> Vec<u8> {
        encode_image(img, ImageFormat::Png).unwrap()
    }

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(hex::encode(claim_digest("")), SHA224_EMPTY);
        assert_eq!(claim_digest("owner:alice"), claim_digest("owner:alice"));
        assert_ne!(claim_digest("owner:alice"), claim_digest("owner:bob"));
    }

    #[test]
    fn embed_extract_roundtrip() {
        let cover = png_bytes(&textured_image(512));
        let params = WatermarkParams::default();
        let outcome = embed(&cover, "owner:alice", &params).unwrap();

        assert_eq!(outcome.format, ImageFormat::Png);
        assert_eq!(outcome.digest_hex, hex::encode(claim_digest("owner:alice")));
        assert_eq!(outcome.matrix_size, (64, 64));
        assert_eq!(outcome.codeword_bits, 336);
        assert!(outcome.redundancy_ratio > 12.0);

        let recovered = extract(&outcome.image, &params).unwrap();
        assert_eq!(recovered, outcome.digest_hex);
    }

    #[test]
    fn empty_claim_is_permitted() {
        let cover = png_bytes(&textured_image(512));
        let outcome = embed(&cover, "", &WatermarkParams::default()).unwrap();
        assert_eq!(outcome.digest_hex, SHA224_EMPTY);
        let recovered = extract(&outcome.image, &WatermarkParams::default()).unwrap();
        assert_eq!(recovered, SHA224_EMPTY);
    }

    #[test]
    fn re_embedding_the_same_claim_is_stable() {
        let params = WatermarkParams::default();
        let once = embed(&png_bytes(&textured_image(512)), "owner:alice", &params).unwrap();
        let twice = embed(&once.image, "owner:alice", &params).unwrap();
        assert_eq!(extract(&twice.image, &params).unwrap(), once.digest_hex);
    }

    #[test]
    fn mark_survives_jpeg_recompression() {
        let cover = png_bytes(&textured_image(512));
        let params = WatermarkParams::default();
        let outcome = embed(&cover, "owner:alice", &params).unwrap();

        // Re-encode the marked image at JPEG quality 90, as a platform would.
        let (marked, _) = decode_image(&outcome.image).unwrap();
        let mut jpeg = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut jpeg, 90)
            .write_image(marked.as_raw(), 512, 512, ExtendedColorType::Rgb8)
            .unwrap();

        let recovered = extract(&jpeg.into_inner(), &params).unwrap();
        assert_eq!(recovered, outcome.digest_hex);
    }

    #[test]
    fn chroma_planes_pass_through() {
        let img = textured_image(256);
        let original = color::split_planes(&img);
        let outcome = embed(&png_bytes(&img), "owner:alice", &WatermarkParams::default()).unwrap();
        let (marked, _) = decode_image(&outcome.image).unwrap();
        let after = color::split_planes(&marked);
        for i in 0..original.cb.len() {
            assert!((original.cb[i] as i32 - after.cb[i] as i32).abs() <= 2);
            assert!((original.cr[i] as i32 - after.cr[i] as i32).abs() <= 2);
        }
    }

    #[test]
    fn refuses_undersized_images() {
        let cover = png_bytes(&textured_image(64));
        match embed(&cover, "owner:alice", &WatermarkParams::default()) {
            Err(CodecError::ImageTooSmall { needed, available }) => {
                assert_eq!(needed, 336);
                assert!(available < 336);
            }
            other => panic!("expected ImageTooSmall, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn rejects_degenerate_quantization_step() {
        let cover = png_bytes(&textured_image(512));
        for q in [0u32, 1, 3] {
            let params = WatermarkParams { q, ..Default::default() };
            assert!(matches!(
                embed(&cover, "x", &params),
                Err(CodecError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn extract_needs_one_codeword_of_capacity() {
        let cover = png_bytes(&textured_image(64));
        assert!(matches!(
            extract(&cover, &WatermarkParams::default()),
            Err(CodecError::ImageTooSmall { .. })
        ));
    }

    #[test]
    fn unmarked_image_does_not_decode() {
        let cover = png_bytes(&textured_image(512));
        match extract(&cover, &WatermarkParams::default()) {
            Err(CodecError::EccUncorrectable) => {}
            Ok(digest) => {
                // A miscorrection would still have to produce some digest;
                // it must at least not be a panic. Overwhelmingly the RS
                // layer rejects the noise outright.
                assert_eq!(digest.len(), 56);
            }
            Err(e) => panic!("unexpected error kind: {:?}", e),
        }
    }

    #[test]
    fn rejects_garbage_bytes() {
        assert!(matches!(
            embed(&[0u8; 64], "x", &WatermarkParams::default()),
            Err(CodecError::UnsupportedImage(_))
        ));
    }
}
