// RGB <-> YCbCr, ITU-R BT.601 full-range. The pipeline only ever touches
// the luminance plane; Cb and Cr are split off here and handed back
// untouched at merge time. No chroma subsampling.

use image::RgbImage;

/// The three full-resolution planes of an image, row-major u8.
pub struct YcbcrPlanes {
    pub y: Vec<u8>,
    pub cb: Vec<u8>,
    pub cr: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[inline]
fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Split an RGB image into Y, Cb, Cr planes.
pub fn split_planes(img: &RgbImage) -> YcbcrPlanes {
    let (width, height) = img.dimensions();
    let n = (width * height) as usize;
    let mut y = Vec::with_capacity(n);
    let mut cb = Vec::with_capacity(n);
    let mut cr = Vec::with_capacity(n);
    for px in img.pixels() {
        let r = px[0] as f32;
        let g = px[1] as f32;
        let b = px[2] as f32;
        y.push(clamp_u8(0.299 * r + 0.587 * g + 0.114 * b));
        cb.push(clamp_u8(128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b));
        cr.push(clamp_u8(128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b));
    }
    YcbcrPlanes { y, cb, cr, width, height }
}

/// Luminance plane alone, for extraction and perceptual hashing.
pub fn luminance_plane(img: &RgbImage) -> Vec<u8> {
    img.pixels()
        .map(|px| clamp_u8(0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32))
        .collect()
}

/// Recombine a (possibly rewritten) Y plane with the original chroma planes.
pub fn merge_planes(y: &[u8], cb: &[u8], cr: &[u8], width: u32, height: u32) -> RgbImage {
    debug_assert_eq!(y.len(), (width * height) as usize);
    debug_assert_eq!(cb.len(), y.len());
    debug_assert_eq!(cr.len(), y.len());
    let mut raw = Vec::with_capacity(y.len() * 3);
    for i in 0..y.len() {
        let yy = y[i] as f32;
        let u = cb[i] as f32 - 128.0;
        let v = cr[i] as f32 - 128.0;
        raw.push(clamp_u8(yy + 1.402 * v));
        raw.push(clamp_u8(yy - 0.344_136 * u - 0.714_136 * v));
        raw.push(clamp_u8(yy + 1.772 * u));
    }
    RgbImage::from_raw(width, height, raw).expect("plane dimensions checked above")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn gray_pixels_have_neutral_chroma() {
        let mut img = RgbImage::new(4, 4);
        for (i, px) in img.pixels_mut().enumerate() {
            let v = (i * 16) as u8;
            *px = Rgb([v, v, v]);
        }
        let planes = split_planes(&img);
        for i in 0..planes.y.len() {
            assert_eq!(planes.y[i], (i * 16) as u8);
            assert_eq!(planes.cb[i], 128);
            assert_eq!(planes.cr[i], 128);
        }
    }

    #[test]
    fn split_merge_roundtrip_is_close() {
        let mut img = RgbImage::new(8, 8);
        for (i, px) in img.pixels_mut().enumerate() {
            *px = Rgb([
                (i * 11 % 256) as u8,
                (i * 53 % 256) as u8,
                (i * 97 % 256) as u8,
            ]);
        }
        let planes = split_planes(&img);
        let back = merge_planes(&planes.y, &planes.cb, &planes.cr, 8, 8);
        for (a, b) in img.pixels().zip(back.pixels()) {
            for c in 0..3 {
                let d = (a[c] as i32 - b[c] as i32).abs();
                assert!(d <= 3, "channel drift {} exceeds rounding tolerance", d);
            }
        }
    }

    #[test]
    fn luminance_matches_split() {
        let mut img = RgbImage::new(5, 3);
        for (i, px) in img.pixels_mut().enumerate() {
            *px = Rgb([(i * 7) as u8, (i * 13) as u8, (i * 29) as u8]);
        }
        assert_eq!(luminance_plane(&img), split_planes(&img).y);
    }
}
