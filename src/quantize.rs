// Dominant-singular-value quantization over 4x4 tiles of the LL subband.
// One bit per tile: sigma_1 is snapped to the nearest lattice point of the
// coset selected by the bit, modulo the step Q. Extraction reads the coset
// back with a threshold at Q/2.
//
// sigma_1 is truncated to an integer before the modulo, and the lattice
// offsets use truncating division (Q=85 -> 21/63/105). Embed and extract
// must agree on this arithmetic exactly; keep both sides in sync.

/// Tile edge in LL coefficients. One tile carries one bit.
pub const BLOCK: usize = 4;

struct Svd4 {
    u: [[f64; BLOCK]; BLOCK],
    v: [[f64; BLOCK]; BLOCK],
    sigma: [f64; BLOCK],
}

fn identity() -> [[f64; BLOCK]; BLOCK] {
    let mut m = [[0.0; BLOCK]; BLOCK];
    for i in 0..BLOCK {
        m[i][i] = 1.0;
    }
    m
}

/// One-sided Jacobi SVD of a 4x4 matrix. Columns of `u`/`v` are the
/// singular vectors, `sigma` is sorted descending. Returns None when the
/// input or the decomposition is non-finite.
fn svd4(m: &[[f64; BLOCK]; BLOCK]) -> Option<Svd4> {
    if m.iter().flatten().any(|x| !x.is_finite()) {
        return None;
    }
    let mut a = *m;
    let mut v = identity();

    for _ in 0..60 {
        let mut rotated = false;
        for p in 0..BLOCK - 1 {
            for q in p + 1..BLOCK {
                let mut alpha = 0.0;
                let mut beta = 0.0;
                let mut gamma = 0.0;
                for r in 0..BLOCK {
                    alpha += a[r][p] * a[r][p];
                    beta += a[r][q] * a[r][q];
                    gamma += a[r][p] * a[r][q];
                }
                if gamma.abs() <= 1e-12 * (alpha * beta).sqrt() || gamma == 0.0 {
                    continue;
                }
                rotated = true;
                let zeta = (beta - alpha) / (2.0 * gamma);
                let t = if zeta >= 0.0 {
                    1.0 / (zeta + (1.0 + zeta * zeta).sqrt())
                } else {
                    -1.0 / (-zeta + (1.0 + zeta * zeta).sqrt())
                };
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = c * t;
                for r in 0..BLOCK {
                    let (xp, xq) = (a[r][p], a[r][q]);
                    a[r][p] = c * xp - s * xq;
                    a[r][q] = s * xp + c * xq;
                    let (vp, vq) = (v[r][p], v[r][q]);
                    v[r][p] = c * vp - s * vq;
                    v[r][q] = s * vp + c * vq;
                }
            }
        }
        if !rotated {
            break;
        }
    }

    let mut sigma = [0.0f64; BLOCK];
    let mut u = [[0.0f64; BLOCK]; BLOCK];
    for j in 0..BLOCK {
        let norm = (0..BLOCK).map(|r| a[r][j] * a[r][j]).sum::<f64>().sqrt();
        sigma[j] = norm;
        if norm > 1e-12 {
            for r in 0..BLOCK {
                u[r][j] = a[r][j] / norm;
            }
        } else {
            u[j][j] = 1.0;
        }
    }
    if sigma.iter().any(|s| !s.is_finite()) {
        return None;
    }

    // Order descending, permuting all three factors together.
    let mut order = [0usize, 1, 2, 3];
    order.sort_by(|&i, &j| sigma[j].partial_cmp(&sigma[i]).unwrap_or(std::cmp::Ordering::Equal));
    let mut out = Svd4 { u: identity(), v: identity(), sigma: [0.0; BLOCK] };
    for (dst, &src) in order.iter().enumerate() {
        out.sigma[dst] = sigma[src];
        for r in 0..BLOCK {
            out.u[r][dst] = u[r][src];
            out.v[r][dst] = v[r][src];
        }
    }
    Some(out)
}

fn reconstruct(svd: &Svd4) -> [[f64; BLOCK]; BLOCK] {
    let mut m = [[0.0f64; BLOCK]; BLOCK];
    for r in 0..BLOCK {
        for c in 0..BLOCK {
            let mut acc = 0.0;
            for j in 0..BLOCK {
                acc += svd.u[r][j] * svd.sigma[j] * svd.v[c][j];
            }
            m[r][c] = acc;
        }
    }
    m
}

fn read_block(ll: &[f32], ll_cols: usize, y: usize, x: usize) -> [[f64; BLOCK]; BLOCK] {
    let mut b = [[0.0f64; BLOCK]; BLOCK];
    for r in 0..BLOCK {
        for c in 0..BLOCK {
            b[r][c] = ll[(y + r) * ll_cols + (x + c)] as f64;
        }
    }
    b
}

fn write_block(ll: &mut [f32], ll_cols: usize, y: usize, x: usize, b: &[[f64; BLOCK]; BLOCK]) {
    for r in 0..BLOCK {
        for c in 0..BLOCK {
            ll[(y + r) * ll_cols + (x + c)] = b[r][c] as f32;
        }
    }
}

/// Quantized replacement for sigma_1 carrying `bit`.
///
/// The branch boundaries compare against the exact rationals 3Q/4 and Q/4
/// (cross-multiplied), while the offsets are the truncated Q/4 multiples.
fn quantize_sigma(s: i64, bit: u8, q: i64) -> i64 {
    let a = s % q;
    let step = q / 4;
    if bit == 0 {
        if 4 * a < 3 * q {
            s - a + step
        } else {
            s - a + 5 * step
        }
    } else if 4 * a < q {
        s - a - step
    } else {
        s - a + 3 * step
    }
}

/// Write one bit per 4x4 tile into the LL subband. `wm` is a rows x cols
/// grid of 0/1 bits; `margin` shifts the usable interior away from the
/// subband edges. Tiles whose decomposition fails are left untouched.
pub fn embed_grid(
    ll: &mut [f32],
    ll_cols: usize,
    wm: &[u8],
    rows: usize,
    cols: usize,
    q: u32,
    margin: usize,
) {
    debug_assert_eq!(wm.len(), rows * cols);
    let q = q as i64;
    for i in 0..rows {
        for j in 0..cols {
            let y = (i + margin) * BLOCK;
            let x = (j + margin) * BLOCK;
            let block = read_block(ll, ll_cols, y, x);
            let mut svd = match svd4(&block) {
                Some(svd) => svd,
                None => continue,
            };
            let s = svd.sigma[0].trunc() as i64;
            svd.sigma[0] = quantize_sigma(s, wm[i * cols + j] & 1, q) as f64;
            let rebuilt = reconstruct(&svd);
            if rebuilt.iter().flatten().any(|v| !v.is_finite()) {
                continue;
            }
            write_block(ll, ll_cols, y, x, &rebuilt);
        }
    }
}

/// Read one bit per 4x4 tile back out of the LL subband. Tiles whose
/// decomposition fails contribute a 0; Reed-Solomon absorbs those.
pub fn extract_grid(
    ll: &[f32],
    ll_cols: usize,
    rows: usize,
    cols: usize,
    q: u32,
    margin: usize,
) -> Vec<u8> {
    let q = q as i64;
    let mut bits = Vec::with_capacity(rows * cols);
    for i in 0..rows {
        for j in 0..cols {
            let y = (i + margin) * BLOCK;
            let x = (j + margin) * BLOCK;
            let bit = match svd4(&read_block(ll, ll_cols, y, x)) {
                Some(svd) => {
                    let a = (svd.sigma[0].trunc() as i64) % q;
                    u8::from(2 * a >= q)
                }
                None => 0,
            };
            bits.push(bit);
        }
    }
    bits
}
