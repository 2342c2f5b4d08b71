//! Blind image watermarking: a SHA-224 ownership digest is Reed-Solomon
//! coded, tiled across the Haar LL subband, and carried in the dominant
//! singular value of each 4x4 tile. Verification recovers the digest from
//! an unknown copy, or falls back to a 64-bit perceptual hash.

pub mod bits;
pub mod capacity;
pub mod codec;
pub mod color;
pub mod ecc;
pub mod error;
pub mod phash;
pub mod quantize;
pub mod registry;
pub mod verify;
pub mod wavelet;

pub use codec::{claim_digest, embed, extract, EmbedOutcome, WatermarkParams};
pub use error::{CodecError, RegistryError, Result};
pub use phash::PerceptualHash;
pub use registry::{AssetRecord, MemoryRegistry, Registry};
pub use verify::{verify_bytes, verify_directory, BatchSummary, ImageReport, Verdict};
