// Capacity planning: how many 4x4 LL tiles an image offers, and whether a
// codeword fits. Kept in one place so the embed refusal and the CLI report
// can never disagree.

use serde::{Deserialize, Serialize};

use crate::quantize::BLOCK;

/// Embedding capacity of an image at a given margin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityPlan {
    pub image_width: u32,
    pub image_height: u32,
    /// LL subband size, (rows, cols).
    pub ll_size: (usize, usize),
    /// Full block grid, (rows, cols).
    pub total_blocks: (usize, usize),
    /// Interior grid after the margin is carved off, (rows, cols).
    pub usable_blocks: (usize, usize),
    /// One bit per usable block.
    pub capacity_bits: usize,
}

impl CapacityPlan {
    pub fn fits(&self, required_bits: usize) -> bool {
        self.capacity_bits >= required_bits
    }
}

/// Plan the block grid for an image without touching its pixels.
pub fn plan(width: u32, height: u32, margin_blocks: usize) -> CapacityPlan {
    let ll_rows = (height as usize + 1) / 2;
    let ll_cols = (width as usize + 1) / 2;
    let total_rows = ll_rows / BLOCK;
    let total_cols = ll_cols / BLOCK;
    let usable_rows = total_rows.saturating_sub(2 * margin_blocks).max(1);
    let usable_cols = total_cols.saturating_sub(2 * margin_blocks).max(1);
    CapacityPlan {
        image_width: width,
        image_height: height,
        ll_size: (ll_rows, ll_cols),
        total_blocks: (total_rows, total_cols),
        usable_blocks: (usable_rows, usable_cols),
        capacity_bits: usable_rows * usable_cols,
    }
}

/// Whether the margin leaves a real interior to index into. `plan` clamps
/// the reported grid to 1x1; embedding additionally needs the unclamped
/// interior to be non-empty before it walks the subband.
pub fn margin_leaves_interior(plan: &CapacityPlan, margin_blocks: usize) -> bool {
    plan.total_blocks.0 > 2 * margin_blocks && plan.total_blocks.1 > 2 * margin_blocks
}
