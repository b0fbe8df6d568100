//! RGB to packed 4:2:2 luma/chroma

use crate::pipeline::demosaic::Rgb;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YCbCr {
    pub y: u8,
    pub cb: u8,
    pub cr: u8,
}

// Coefficients in thousandths.
const Y_COEFFS: [i32; 3] = [183, 614, 62];
const CB_COEFFS: [i32; 3] = [-101, -338, 439];
const CR_COEFFS: [i32; 3] = [439, -399, -40];

/// Fixed-point conversion with offsets 16/128/128.
///
/// The sum is floored and then clamped to 0..=255 so a component can never
/// spill into the neighbouring byte of the packed word.
pub fn to_luma_chroma(rgb: Rgb) -> YCbCr {
    YCbCr {
        y: component(Y_COEFFS, 16, rgb),
        cb: component(CB_COEFFS, 128, rgb),
        cr: component(CR_COEFFS, 128, rgb),
    }
}

#[inline]
fn component(coeffs: [i32; 3], offset: i32, rgb: Rgb) -> u8 {
    let sum = coeffs[0] * rgb.r as i32
        + coeffs[1] * rgb.g as i32
        + coeffs[2] * rgb.b as i32
        + offset * 1000;
    sum.div_euclid(1000).clamp(0, 255) as u8
}

/// Output word for pixel `index`: Cb on even pixels, Cr on odd, luma low.
#[inline]
pub fn pack(index: usize, ycc: YCbCr) -> u16 {
    let chroma = if index % 2 == 0 { ycc.cb } else { ycc.cr };
    ((chroma as u16) << 8) | ycc.y as u16
}
