// Reed-Solomon codec over GF(2^8), reducing polynomial x^8+x^4+x^3+x^2+1
// (0x11d), generator element 2, first consecutive root 2^0.
//
// The codeword is systematic: 28 digest bytes followed by the parity bytes.
// Decoding corrects up to parity/2 byte errors at unknown positions:
// syndromes, Berlekamp-Massey for the error locator, Chien search for the
// positions, then a Gaussian solve of the syndrome system for the
// magnitudes. A final syndrome re-check guards against miscorrection.

use once_cell::sync::Lazy;

use crate::error::{CodecError, Result};

/// SHA-224 digest length; the only message size the codec carries.
pub const DIGEST_LEN: usize = 28;

const PRIM_POLY: u16 = 0x11d;
const FIELD_ORDER: usize = 255;

struct GfTables {
    exp: [u8; 512],
    log: [u8; 256],
}

static TABLES: Lazy<GfTables> = Lazy::new(|| {
    let mut exp = [0u8; 512];
    let mut log = [0u8; 256];
    let mut x: u16 = 1;
    for i in 0..FIELD_ORDER {
        exp[i] = x as u8;
        log[x as usize] = i as u8;
        x <<= 1;
        if x & 0x100 != 0 {
            x ^= PRIM_POLY;
        }
    }
    for i in FIELD_ORDER..512 {
        exp[i] = exp[i - FIELD_ORDER];
    }
    GfTables { exp, log }
});

#[inline]
fn gf_mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    let t = &*TABLES;
    t.exp[t.log[a as usize] as usize + t.log[b as usize] as usize]
}

#[inline]
fn gf_div(a: u8, b: u8) -> u8 {
    debug_assert!(b != 0);
    if a == 0 {
        return 0;
    }
    let t = &*TABLES;
    t.exp[t.log[a as usize] as usize + FIELD_ORDER - t.log[b as usize] as usize]
}

#[inline]
fn gf_inv(a: u8) -> u8 {
    debug_assert!(a != 0);
    let t = &*TABLES;
    t.exp[FIELD_ORDER - t.log[a as usize] as usize]
}

/// 2^e for arbitrary non-negative e.
#[inline]
fn alpha_pow(e: usize) -> u8 {
    TABLES.exp[e % FIELD_ORDER]
}

/// Parity byte count for a redundancy percentage, at least one byte.
pub fn parity_len(redundancy_percent: u32) -> usize {
    let p = (DIGEST_LEN * redundancy_percent as usize + 99) / 100;
    p.max(1)
}

/// Total codeword length (digest plus parity) for a redundancy percentage.
pub fn codeword_len(redundancy_percent: u32) -> usize {
    DIGEST_LEN + parity_len(redundancy_percent)
}

/// Product of (x - 2^i) for i in 0..parity, highest-degree coefficient first.
fn generator_poly(parity: usize) -> Vec<u8> {
    let mut g = vec![1u8];
    for i in 0..parity {
        let factor = [1u8, alpha_pow(i)];
        let mut next = vec![0u8; g.len() + 1];
        for (gi, &gc) in g.iter().enumerate() {
            for (fi, &fc) in factor.iter().enumerate() {
                next[gi + fi] ^= gf_mul(gc, fc);
            }
        }
        g = next;
    }
    g
}

/// Encode a 28-byte digest into a systematic codeword.
pub fn encode(digest: &[u8], redundancy_percent: u32) -> Result<Vec<u8>> {
    if digest.len() != DIGEST_LEN {
        return Err(CodecError::InvalidParameter(format!(
            "digest must be {} bytes, got {}",
            DIGEST_LEN,
            digest.len()
        )));
    }
    let parity = parity_len(redundancy_percent);
    if DIGEST_LEN + parity > FIELD_ORDER {
        return Err(CodecError::InvalidParameter(format!(
            "redundancy {}% needs a {}-byte codeword, limit is {}",
            redundancy_percent,
            DIGEST_LEN + parity,
            FIELD_ORDER
        )));
    }

    let gen = generator_poly(parity);
    let mut buf = vec![0u8; DIGEST_LEN + parity];
    buf[..DIGEST_LEN].copy_from_slice(digest);
    for i in 0..DIGEST_LEN {
        let coef = buf[i];
        if coef != 0 {
            for (j, &gc) in gen.iter().enumerate().skip(1) {
                buf[i + j] ^= gf_mul(gc, coef);
            }
        }
    }
    buf[..DIGEST_LEN].copy_from_slice(digest);
    Ok(buf)
}

/// Evaluate a polynomial stored highest-degree-first at x.
fn poly_eval(poly: &[u8], x: u8) -> u8 {
    let mut y = poly[0];
    for &c in &poly[1..] {
        y = gf_mul(y, x) ^ c;
    }
    y
}

/// Evaluate a polynomial stored lowest-degree-first at x.
fn poly_eval_ascending(poly: &[u8], x: u8) -> u8 {
    let mut y = 0u8;
    for &c in poly.iter().rev() {
        y = gf_mul(y, x) ^ c;
    }
    y
}

fn syndromes(codeword: &[u8], parity: usize) -> Vec<u8> {
    (0..parity).map(|i| poly_eval(codeword, alpha_pow(i))).collect()
}

/// a(x) + coef * x^shift * b(x), coefficients lowest-degree-first.
fn poly_add_scaled(a: &[u8], b: &[u8], coef: u8, shift: usize) -> Vec<u8> {
    let mut out = vec![0u8; a.len().max(b.len() + shift)];
    out[..a.len()].copy_from_slice(a);
    for (i, &bc) in b.iter().enumerate() {
        out[i + shift] ^= gf_mul(coef, bc);
    }
    out
}

/// Berlekamp-Massey. Returns the error locator (lowest-degree-first) and the
/// tracked error count.
fn error_locator(synd: &[u8]) -> (Vec<u8>, usize) {
    let mut lambda = vec![1u8];
    let mut prev = vec![1u8];
    let mut l: usize = 0;
    let mut shift: usize = 1;
    let mut prev_delta: u8 = 1;

    for n in 0..synd.len() {
        let mut delta = synd[n];
        for i in 1..lambda.len() {
            if n >= i {
                delta ^= gf_mul(lambda[i], synd[n - i]);
            }
        }
        if delta == 0 {
            shift += 1;
        } else if 2 * l <= n {
            let keep = lambda.clone();
            lambda = poly_add_scaled(&lambda, &prev, gf_div(delta, prev_delta), shift);
            l = n + 1 - l;
            prev = keep;
            prev_delta = delta;
            shift = 1;
        } else {
            lambda = poly_add_scaled(&lambda, &prev, gf_div(delta, prev_delta), shift);
            shift += 1;
        }
    }
    while lambda.len() > 1 && lambda.last() == Some(&0) {
        lambda.pop();
    }
    (lambda, l)
}

/// Chien search: byte indices of the locator's roots within the codeword.
fn error_positions(lambda: &[u8], n: usize) -> Vec<usize> {
    let mut positions = Vec::new();
    for e in 0..n {
        let x_inv = TABLES.exp[(FIELD_ORDER - e % FIELD_ORDER) % FIELD_ORDER];
        if poly_eval_ascending(lambda, x_inv) == 0 {
            positions.push(n - 1 - e);
        }
    }
    positions
}

/// Solve sum_j y_j * X_j^i = synd[i] for the error magnitudes y_j.
fn error_magnitudes(synd: &[u8], locators: &[u8]) -> Option<Vec<u8>> {
    let v = locators.len();
    let mut mat: Vec<Vec<u8>> = (0..v)
        .map(|i| {
            locators
                .iter()
                .map(|&x| {
                    let t = &*TABLES;
                    t.exp[(t.log[x as usize] as usize * i) % FIELD_ORDER]
                })
                .collect()
        })
        .collect();
    let mut rhs: Vec<u8> = synd[..v].to_vec();

    for col in 0..v {
        let pivot = (col..v).find(|&r| mat[r][col] != 0)?;
        mat.swap(col, pivot);
        rhs.swap(col, pivot);
        let inv = gf_inv(mat[col][col]);
        for j in col..v {
            mat[col][j] = gf_mul(mat[col][j], inv);
        }
        rhs[col] = gf_mul(rhs[col], inv);
        for r in 0..v {
            if r != col && mat[r][col] != 0 {
                let f = mat[r][col];
                for j in col..v {
                    let x = gf_mul(f, mat[col][j]);
                    mat[r][j] ^= x;
                }
                let x = gf_mul(f, rhs[col]);
                rhs[r] ^= x;
            }
        }
    }
    Some(rhs)
}

/// Decode a codeword back to the 28-byte digest, correcting up to parity/2
/// byte errors. Never panics on arbitrary input.
pub fn decode(codeword: &[u8], redundancy_percent: u32) -> Result<Vec<u8>> {
    let parity = parity_len(redundancy_percent);
    let n = DIGEST_LEN + parity;
    if codeword.len() != n {
        return Err(CodecError::InvalidParameter(format!(
            "codeword must be {} bytes, got {}",
            n,
            codeword.len()
        )));
    }

    let synd = syndromes(codeword, parity);
    if synd.iter().all(|&s| s == 0) {
        return Ok(codeword[..DIGEST_LEN].to_vec());
    }

    let (lambda, errors) = error_locator(&synd);
    if errors == 0 || errors > parity / 2 || lambda.len() != errors + 1 {
        return Err(CodecError::EccUncorrectable);
    }

    let positions = error_positions(&lambda, n);
    if positions.len() != errors {
        return Err(CodecError::EccUncorrectable);
    }

    // X_j = 2^(n-1-k) for an error at byte index k.
    let locators: Vec<u8> = positions.iter().map(|&k| alpha_pow(n - 1 - k)).collect();
    let magnitudes = match error_magnitudes(&synd, &locators) {
        Some(m) => m,
        None => return Err(CodecError::EccUncorrectable),
    };

    let mut repaired = codeword.to_vec();
    for (&k, &y) in positions.iter().zip(magnitudes.iter()) {
        repaired[k] ^= y;
    }
    if syndromes(&repaired, parity).iter().any(|&s| s != 0) {
        return Err(CodecError::EccUncorrectable);
    }
    Ok(repaired[..DIGEST_LEN].to_vec())
}
