// Bit packing and grid tiling. Bits are MSB-first within each byte; grids
// are row-major, top-to-bottom, left-to-right, on both the embed and the
// extract side.

/// Expand bytes to bits, most significant bit first.
pub fn pack_bits(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 8);
    for b in data {
        for i in (0..8).rev() {
            out.push((b >> i) & 1);
        }
    }
    out
}

/// Collapse bits back to bytes, MSB first. A trailing partial byte is dropped.
pub fn unpack_bits(bits: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bits.len() / 8);
    for chunk in bits.chunks_exact(8) {
        let mut byte = 0u8;
        for (i, &bit) in chunk.iter().enumerate() {
            byte |= (bit & 1) << (7 - i);
        }
        out.push(byte);
    }
    out
}

/// Tile a bit stream row-major across a rows x cols grid, repeating the
/// stream when the grid is larger and truncating when it is smaller.
pub fn tile(bits: &[u8], rows: usize, cols: usize) -> Vec<u8> {
    let total = rows * cols;
    let mut out = Vec::with_capacity(total);
    if bits.is_empty() {
        out.resize(total, 0);
        return out;
    }
    for k in 0..total {
        out.push(bits[k % bits.len()]);
    }
    out
}

/// Majority-vote the repetitions of an L-bit stream out of a tiled grid.
/// Cell k of the flattened grid holds stream position k mod L; ties
/// resolve to 0. The final partial repetition still contributes votes.
pub fn vote(grid: &[u8], stream_len: usize) -> Vec<u8> {
    debug_assert!(stream_len > 0);
    let mut ones = vec![0usize; stream_len];
    let mut totals = vec![0usize; stream_len];
    for (k, &bit) in grid.iter().enumerate() {
        let slot = k % stream_len;
        totals[slot] += 1;
        if bit & 1 == 1 {
            ones[slot] += 1;
        }
    }
    ones.iter()
        .zip(totals.iter())
        .map(|(&o, &t)| if o * 2 > t { 1 } else { 0 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_is_msb_first() {
        assert_eq!(pack_bits(&[0b1010_0001]), vec![1, 0, 1, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn unpack_inverts_pack_and_drops_tail() {
        let data = vec![0x00, 0xff, 0x5a, 0x17];
        assert_eq!(unpack_bits(&pack_bits(&data)), data);

        let mut bits = pack_bits(&data);
        bits.extend_from_slice(&[1, 0, 1]);
        assert_eq!(unpack_bits(&bits), data);
    }

    #[test]
    fn tile_repeats_and_truncates() {
        let bits = vec![1, 0, 1];
        assert_eq!(tile(&bits, 2, 4), vec![1, 0, 1, 1, 0, 1, 1, 0]);
        assert_eq!(tile(&bits, 1, 2), vec![1, 0]);
    }

    #[test]
    fn vote_recovers_stream_with_minority_flips() {
        let stream = vec![1, 0, 0, 1, 1];
        let mut grid = tile(&stream, 3, 5);
        // Flip one copy of positions 0 and 3; two clean copies outvote it.
        grid[0] ^= 1;
        grid[8] ^= 1;
        assert_eq!(vote(&grid, stream.len()), stream);
    }

    #[test]
    fn vote_ties_resolve_to_zero() {
        // Two repetitions, position 0 split 1/0.
        let grid = vec![1, 1, 0, 1];
        assert_eq!(vote(&grid, 2), vec![0, 1]);
    }

    #[test]
    fn vote_counts_partial_tail_repetition() {
        let stream = vec![0, 1, 0];
        // Grid of 8 cells: positions 0 and 1 get three votes, position 2 two.
        let mut grid = tile(&stream, 2, 4);
        grid[2] ^= 1; // one flipped copy of position 2, now a 1/1 tie
        assert_eq!(vote(&grid, 3), vec![0, 1, 0]);
    }
}
