// Registry contract: the codec never owns storage, it only asks two
// questions of it. Backends answer "who registered this digest" and "which
// stored perceptual hashes sit near this one". The in-memory and JSON-file
// implementations here cover tests and offline scans; remote backends live
// elsewhere and surface their failures as RegistryError.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::phash::PerceptualHash;

/// One registered asset, as persisted by the registration side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub asset_id: String,
    pub ip_asset_id: String,
    pub wallet_id: String,
    pub public_url: String,
    /// 56 hex chars, SHA-224 of the owner's claim.
    pub digest_hex: String,
    /// 16 hex chars, pHash of the marked image.
    pub phash_hex: String,
}

/// pHash candidates below this distance are worth reporting at all; the
/// verification driver applies its own similarity cutoff on top.
const CANDIDATE_DISTANCE: u32 = 16;

pub trait Registry {
    /// Exact digest lookup.
    fn lookup_by_digest(&self, digest_hex: &str) -> Result<Option<AssetRecord>, RegistryError>;

    /// Nearby perceptual hashes, each with its similarity percentage.
    fn lookup_by_phash(
        &self,
        phash: &PerceptualHash,
    ) -> Result<Vec<(AssetRecord, f32)>, RegistryError>;
}

/// Registry over a plain vector of records.
#[derive(Debug, Default, Clone)]
pub struct MemoryRegistry {
    records: Vec<AssetRecord>,
}

impl MemoryRegistry {
    pub fn new(records: Vec<AssetRecord>) -> Self {
        MemoryRegistry { records }
    }

    pub fn insert(&mut self, record: AssetRecord) {
        self.records.push(record);
    }

    /// Load from a JSON array of records, the sidecar format the
    /// registration pipeline writes.
    pub fn from_json_file(path: &Path) -> Result<Self, RegistryError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| RegistryError::Transport(format!("{}: {}", path.display(), e)))?;
        let records: Vec<AssetRecord> =
            serde_json::from_str(&raw).map_err(|e| RegistryError::Malformed(e.to_string()))?;
        Ok(MemoryRegistry { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Registry for MemoryRegistry {
    fn lookup_by_digest(&self, digest_hex: &str) -> Result<Option<AssetRecord>, RegistryError> {
        Ok(self
            .records
            .iter()
            .find(|r| r.digest_hex.eq_ignore_ascii_case(digest_hex))
            .cloned())
    }

    fn lookup_by_phash(
        &self,
        phash: &PerceptualHash,
    ) -> Result<Vec<(AssetRecord, f32)>, RegistryError> {
        let mut out = Vec::new();
        for record in &self.records {
            let stored = PerceptualHash::from_hex(&record.phash_hex)
                .map_err(|e| RegistryError::Malformed(e.to_string()))?;
            if stored.distance(phash) <= CANDIDATE_DISTANCE {
                out.push((record.clone(), stored.similarity_percent(phash)));
            }
        }
        Ok(out)
    }
}
