// Verification driver: digest lookup first, perceptual-hash fallback when
// the mark did not survive. Batch scans walk a directory tree in parallel,
// one task per image, and report in sorted input order.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;
use walkdir::WalkDir;

use crate::codec::{self, WatermarkParams};
use crate::error::CodecError;
use crate::phash::PerceptualHash;
use crate::registry::{AssetRecord, Registry};

/// Minimum similarity (strict) for a perceptual-hash match to count.
pub const SIMILARITY_THRESHOLD: f32 = 85.0;

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tiff", "webp"];

/// Per-image outcome of a verification attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "match_type", rename_all = "snake_case")]
pub enum Verdict {
    /// The embedded digest was recovered and found in the registry.
    Hash {
        record: AssetRecord,
        digest_hex: String,
        similarity_percent: f32,
    },
    /// No recoverable mark, but the perceptual hash sits within the match
    /// radius of a registered asset.
    Phash {
        record: AssetRecord,
        phash_hex: String,
        similarity_percent: f32,
    },
    Unverified {
        reason: String,
    },
}

impl Verdict {
    pub fn is_verified(&self) -> bool {
        !matches!(self, Verdict::Unverified { .. })
    }
}

/// Verify a single encoded image against the registry.
pub fn verify_bytes<R: Registry + ?Sized>(
    bytes: &[u8],
    params: &WatermarkParams,
    registry: &R,
) -> Verdict {
    match codec::extract(bytes, params) {
        Ok(digest_hex) => match registry.lookup_by_digest(&digest_hex) {
            Ok(Some(record)) => Verdict::Hash { record, digest_hex, similarity_percent: 100.0 },
            Ok(None) => phash_fallback(bytes, registry),
            Err(e) => Verdict::Unverified { reason: format!("registry error: {}", e) },
        },
        // No mark present; the perceptual hash is the remaining identity.
        Err(CodecError::EccUncorrectable) | Err(CodecError::ImageTooSmall { .. }) => {
            phash_fallback(bytes, registry)
        }
        Err(e) => Verdict::Unverified { reason: e.to_string() },
    }
}

fn phash_fallback<R: Registry + ?Sized>(bytes: &[u8], registry: &R) -> Verdict {
    let phash = match codec::perceptual_hash(bytes) {
        Ok(p) => p,
        Err(e) => return Verdict::Unverified { reason: e.to_string() },
    };
    match registry.lookup_by_phash(&phash) {
        Ok(candidates) => best_phash_match(&phash, candidates),
        Err(e) => Verdict::Unverified { reason: format!("registry error: {}", e) },
    }
}

/// Keep candidates strictly above the similarity threshold and report the
/// best of them.
fn best_phash_match(phash: &PerceptualHash, candidates: Vec<(AssetRecord, f32)>) -> Verdict {
    let best = candidates
        .into_iter()
        .filter(|(_, similarity)| *similarity > SIMILARITY_THRESHOLD)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    match best {
        Some((record, similarity_percent)) => Verdict::Phash {
            record,
            phash_hex: phash.to_string(),
            similarity_percent,
        },
        None => Verdict::Unverified { reason: "no registry match".to_string() },
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageReport {
    pub path: PathBuf,
    /// Where the image was scraped from, when the caller knows it.
    pub source_url: Option<String>,
    pub verdict: Verdict,
    /// Unix seconds.
    pub processed_at: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub verified: usize,
    pub hash_matches: usize,
    pub phash_matches: usize,
    pub unverified: usize,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Verify one image file.
pub fn verify_path<R: Registry + ?Sized>(
    path: &Path,
    source_url: Option<String>,
    params: &WatermarkParams,
    registry: &R,
) -> ImageReport {
    let verdict = match std::fs::read(path) {
        Ok(bytes) => verify_bytes(&bytes, params, registry),
        Err(e) => Verdict::Unverified { reason: format!("read failed: {}", e) },
    };
    match &verdict {
        Verdict::Unverified { reason } => info!("{}: unverified ({})", path.display(), reason),
        v => info!("{}: verified ({} match)", path.display(), verdict_kind(v)),
    }
    ImageReport { path: path.to_path_buf(), source_url, verdict, processed_at: unix_now() }
}

fn verdict_kind(v: &Verdict) -> &'static str {
    match v {
        Verdict::Hash { .. } => "hash",
        Verdict::Phash { .. } => "phash",
        Verdict::Unverified { .. } => "none",
    }
}

/// Recursively verify every image under `dir`. Images are independent, so
/// the walk fans out one task per file; report order follows the sorted
/// file list regardless of scheduling.
pub fn verify_directory<R: Registry + Sync + ?Sized>(
    dir: &Path,
    params: &WatermarkParams,
    registry: &R,
) -> (Vec<ImageReport>, BatchSummary) {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) if e.file_type().is_file() => Some(e.into_path()),
            Ok(_) => None,
            Err(e) => {
                warn!("skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    info!("verifying {} images under {}", files.len(), dir.display());

    let reports: Vec<ImageReport> = files
        .par_iter()
        .map(|path| verify_path(path, None, params, registry))
        .collect();

    let mut summary = BatchSummary { total: reports.len(), ..Default::default() };
    for report in &reports {
        match report.verdict {
            Verdict::Hash { .. } => {
                summary.verified += 1;
                summary.hash_matches += 1;
            }
            Verdict::Phash { .. } => {
                summary.verified += 1;
                summary.phash_matches += 1;
            }
            Verdict::Unverified { .. } => summary.unverified += 1,
        }
    }
    (reports, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::error::RegistryError;
    use crate::registry::MemoryRegistry;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn textured_png(side: u32) -> Vec<u8> {
        let mut img = RgbImage::new(side, side);
        for (x, y, px) in img.enumerate_pixels_mut() {
            let v = (100 + (x * 7 + y * 13) % 80) as u8;
            *px = Rgb([v, v.wrapping_add(20), v.wrapping_sub(30)]);
        }
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn record(digest_hex: &str, phash_hex: &str) -> AssetRecord {
        AssetRecord {
            asset_id: "asset-1".to_string(),
            ip_asset_id: "ip-1".to_string(),
            wallet_id: "w-1".to_string(),
            public_url: "https://assets.example/asset-1".to_string(),
            digest_hex: digest_hex.to_string(),
            phash_hex: phash_hex.to_string(),
        }
    }

    struct FailingRegistry;

    impl Registry for FailingRegistry {
        fn lookup_by_digest(&self, _: &str) -> Result<Option<AssetRecord>, RegistryError> {
            Err(RegistryError::Transport("connection refused".to_string()))
        }
        fn lookup_by_phash(
            &self,
            _: &PerceptualHash,
        ) -> Result<Vec<(AssetRecord, f32)>, RegistryError> {
            Err(RegistryError::Transport("connection refused".to_string()))
        }
    }

    #[test]
    fn marked_image_verifies_by_digest() {
        let params = WatermarkParams::default();
        let outcome = codec::embed(&textured_png(512), "owner:alice", &params).unwrap();
        let registry = MemoryRegistry::new(vec![record(
            &outcome.digest_hex,
            &outcome.phash.to_string(),
        )]);

        match verify_bytes(&outcome.image, &params, &registry) {
            Verdict::Hash { record, digest_hex, similarity_percent } => {
                assert_eq!(record.asset_id, "asset-1");
                assert_eq!(digest_hex, outcome.digest_hex);
                assert_eq!(similarity_percent, 100.0);
            }
            other => panic!("expected a hash match, got {:?}", other),
        }
    }

    #[test]
    fn unmarked_image_falls_back_to_phash() {
        let params = WatermarkParams::default();
        let bytes = textured_png(512);
        let phash = codec::perceptual_hash(&bytes).unwrap();
        // Registered digest belongs to someone else's claim; only the
        // perceptual hash can connect this copy to the asset.
        let registry = MemoryRegistry::new(vec![record(
            &"00".repeat(28),
            &phash.to_string(),
        )]);

        match verify_bytes(&bytes, &params, &registry) {
            Verdict::Phash { record, phash_hex, similarity_percent } => {
                assert_eq!(record.asset_id, "asset-1");
                assert_eq!(phash_hex, phash.to_string());
                assert_eq!(similarity_percent, 100.0);
            }
            other => panic!("expected a phash match, got {:?}", other),
        }
    }

    #[test]
    fn empty_registry_is_unverified() {
        let params = WatermarkParams::default();
        let verdict = verify_bytes(&textured_png(512), &params, &MemoryRegistry::default());
        assert!(!verdict.is_verified());
    }

    #[test]
    fn registry_failure_is_downgraded_not_fatal() {
        let params = WatermarkParams::default();
        let verdict = verify_bytes(&textured_png(512), &params, &FailingRegistry);
        match verdict {
            Verdict::Unverified { reason } => assert!(reason.contains("registry")),
            other => panic!("expected unverified, got {:?}", other),
        }
    }

    #[test]
    fn best_candidate_wins_and_threshold_binds() {
        let probe = PerceptualHash(0);
        let near = (record("a", "0000000000000000"), 96.875f32);
        let edge = (record("b", "00000000000003ff"), 84.375f32); // 10 bits: below cutoff
        let verdict = best_phash_match(&probe, vec![edge.clone(), near.clone()]);
        match verdict {
            Verdict::Phash { similarity_percent, .. } => {
                assert!((similarity_percent - 96.875).abs() < 1e-4);
            }
            other => panic!("expected a phash match, got {:?}", other),
        }

        let verdict = best_phash_match(&probe, vec![edge]);
        assert!(!verdict.is_verified());
    }

    #[test]
    fn directory_batch_preserves_order_and_summarizes() {
        let params = WatermarkParams::default();
        let outcome = codec::embed(&textured_png(512), "owner:alice", &params).unwrap();
        let registry = MemoryRegistry::new(vec![record(
            &outcome.digest_hex,
            &outcome.phash.to_string(),
        )]);

        let dir = std::env::temp_dir().join(format!("imprint_batch_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a_marked.png"), &outcome.image).unwrap();
        std::fs::write(dir.join("b_broken.png"), b"not really a png").unwrap();
        std::fs::write(dir.join("notes.txt"), b"not an image").unwrap();

        let (reports, summary) = verify_directory(&dir, &params, &registry);
        assert_eq!(reports.len(), 2);
        assert!(reports[0].path.ends_with("a_marked.png"));
        assert!(reports[1].path.ends_with("b_broken.png"));
        assert!(reports[0].verdict.is_verified());
        assert!(!reports[1].verdict.is_verified());
        assert_eq!(summary.total, 2);
        assert_eq!(summary.verified, 1);
        assert_eq!(summary.hash_matches, 1);
        assert_eq!(summary.phash_matches, 0);
        assert_eq!(summary.unverified, 1);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
