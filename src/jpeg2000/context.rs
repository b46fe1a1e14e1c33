//! Context formation for the bit-plane coder (ISO/IEC 15444-1 D.3).
//!
//! Every coefficient owns one flag word holding its own state and the significance
//! and sign of its eight neighbours. The word of a coefficient is kept current by
//! `FlagPlane::update_flags`, so context selection never rescans the neighbourhood.

use crate::jpeg2000::image::SubbandOrientation;

pub const T1_SIG_NE: u16 = 0x0001;
pub const T1_SIG_SE: u16 = 0x0002;
pub const T1_SIG_SW: u16 = 0x0004;
pub const T1_SIG_NW: u16 = 0x0008;
pub const T1_SIG_N: u16 = 0x0010;
pub const T1_SIG_E: u16 = 0x0020;
pub const T1_SIG_S: u16 = 0x0040;
pub const T1_SIG_W: u16 = 0x0080;
pub const T1_SIG_OTH: u16 =
    T1_SIG_N | T1_SIG_NE | T1_SIG_E | T1_SIG_SE | T1_SIG_S | T1_SIG_SW | T1_SIG_W | T1_SIG_NW;
pub const T1_SIG_PRIM: u16 = T1_SIG_N | T1_SIG_E | T1_SIG_S | T1_SIG_W;

pub const T1_SGN_N: u16 = 0x0100;
pub const T1_SGN_E: u16 = 0x0200;
pub const T1_SGN_S: u16 = 0x0400;
pub const T1_SGN_W: u16 = 0x0800;
pub const T1_SGN: u16 = T1_SGN_N | T1_SGN_E | T1_SGN_S | T1_SGN_W;

/// The coefficient itself is significant.
pub const T1_SIG: u16 = 0x1000;
/// The coefficient has been refined at least once.
pub const T1_REFINE: u16 = 0x2000;
/// The coefficient was coded in the current bit-plane's significance pass.
pub const T1_VISIT: u16 = 0x4000;

/// Bits describing neighbours below the current stripe row, hidden in vertically causal mode.
pub const T1_VSC_MASK: u16 = !(T1_SIG_S | T1_SIG_SE | T1_SIG_SW | T1_SGN_S);

pub const T1_CTXNO_AGG: usize = 0;
pub const T1_CTXNO_ZC: usize = 1;
pub const T1_CTXNO_MAG: usize = 10;
pub const T1_CTXNO_SC: usize = 13;
pub const T1_CTXNO_UNI: usize = 18;
pub const T1_NUM_CONTEXTS: usize = 19;

const fn count(f: u16, mask: u16) -> u8 {
    (f & mask != 0) as u8
}

// Table D.1
const fn zc_label(f: u16, orient: usize) -> u8 {
    let mut h = count(f, T1_SIG_W) + count(f, T1_SIG_E);
    let mut v = count(f, T1_SIG_N) + count(f, T1_SIG_S);
    let d = count(f, T1_SIG_NW) + count(f, T1_SIG_NE) + count(f, T1_SIG_SE) + count(f, T1_SIG_SW);
    if orient == 3 {
        let hv = h + v;
        return match d {
            0 => match hv {
                0 => 0,
                1 => 1,
                _ => 2,
            },
            1 => match hv {
                0 => 3,
                1 => 4,
                _ => 5,
            },
            2 => {
                if hv == 0 {
                    6
                } else {
                    7
                }
            }
            _ => 8,
        };
    }
    if orient == 2 {
        let t = h;
        h = v;
        v = t;
    }
    match h {
        0 => match v {
            0 => match d {
                0 => 0,
                1 => 1,
                _ => 2,
            },
            1 => 3,
            _ => 4,
        },
        1 => {
            if v == 0 {
                if d == 0 { 5 } else { 6 }
            } else {
                7
            }
        }
        _ => 8,
    }
}

const fn build_zc_lut() -> [u8; 1024] {
    let mut lut = [0u8; 1024];
    let mut orient = 0;
    while orient < 4 {
        let mut f = 0;
        while f < 256 {
            lut[(orient << 8) | f] = T1_CTXNO_ZC as u8 + zc_label(f as u16, orient);
            f += 1;
        }
        orient += 1;
    }
    lut
}

// (positive, negative) significance of one neighbour.
const fn neighbour_sign(f: u16, sig: u16, sgn: u16) -> (i32, i32) {
    let positive = (f & (sig | sgn) == sig) as i32;
    let negative = (f & (sig | sgn) == (sig | sgn)) as i32;
    (positive, negative)
}

// Horizontal and vertical sign contributions (Table D.2), each in -1..=1.
const fn sign_contributions(f: u16) -> (i32, i32) {
    let (pe, ne) = neighbour_sign(f, T1_SIG_E, T1_SGN_E);
    let (pw, nw) = neighbour_sign(f, T1_SIG_W, T1_SGN_W);
    let (pn, nn) = neighbour_sign(f, T1_SIG_N, T1_SGN_N);
    let (ps, ns) = neighbour_sign(f, T1_SIG_S, T1_SGN_S);
    let hc = min1(pe + pw) - min1(ne + nw);
    let vc = min1(pn + ps) - min1(nn + ns);
    (hc, vc)
}

const fn min1(x: i32) -> i32 {
    if x > 1 { 1 } else { x }
}

const fn build_sc_luts() -> ([u8; 256], [u8; 256]) {
    let mut sc = [0u8; 256];
    let mut spb = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let (hc, vc) = sign_contributions((i as u16) << 4);
        spb[i] = if hc == 0 && vc == 0 {
            0
        } else {
            !(hc > 0 || (hc == 0 && vc > 0)) as u8
        };
        let (hc, vc) = if hc < 0 { (-hc, -vc) } else { (hc, vc) };
        let n = if hc == 0 {
            if vc == 0 { 0 } else { 1 }
        } else {
            match vc {
                -1 => 2,
                0 => 3,
                _ => 4,
            }
        };
        sc[i] = T1_CTXNO_SC as u8 + n;
        i += 1;
    }
    (sc, spb)
}

const LUT_CTXNO_ZC: [u8; 1024] = build_zc_lut();
const SC_LUTS: ([u8; 256], [u8; 256]) = build_sc_luts();
const LUT_CTXNO_SC: [u8; 256] = SC_LUTS.0;
const LUT_SPB: [u8; 256] = SC_LUTS.1;

impl SubbandOrientation {
    // LL and LH share the horizontally dominant table, HL swaps the axes.
    const fn zc_table(self) -> usize {
        match self {
            SubbandOrientation::LL => 0,
            SubbandOrientation::LH => 1,
            SubbandOrientation::HL => 2,
            SubbandOrientation::HH => 3,
        }
    }
}

/// Zero coding context of a coefficient.
#[inline]
pub fn zc_context(flags: u16, orientation: SubbandOrientation) -> usize {
    LUT_CTXNO_ZC[(orientation.zc_table() << 8) | usize::from(flags & T1_SIG_OTH)] as usize
}

/// Sign coding context of a coefficient.
#[inline]
pub fn sc_context(flags: u16) -> usize {
    LUT_CTXNO_SC[usize::from((flags & (T1_SIG_PRIM | T1_SGN)) >> 4)] as usize
}

/// Predicted sign; XORed with the actual sign before coding.
#[inline]
pub fn sign_prediction_bit(flags: u16) -> u32 {
    u32::from(LUT_SPB[usize::from((flags & (T1_SIG_PRIM | T1_SGN)) >> 4)])
}

/// Magnitude refinement context.
#[inline]
pub fn mag_context(flags: u16) -> usize {
    if flags & T1_REFINE != 0 {
        T1_CTXNO_MAG + 2
    } else if flags & T1_SIG_OTH != 0 {
        T1_CTXNO_MAG + 1
    } else {
        T1_CTXNO_MAG
    }
}

/// Flag words of one code-block surrounded by a one-coefficient guard border.
#[derive(Debug, Clone, Default)]
pub struct FlagPlane {
    stride: usize,
    flags: Vec<u16>,
}

impl FlagPlane {
    /// Resize to `width` x `height` and clear every flag, keeping the allocation.
    pub fn reset(&mut self, width: usize, height: usize) {
        self.stride = width + 2;
        self.flags.clear();
        self.flags.resize(self.stride * (height + 2), 0);
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        (y + 1) * self.stride + x + 1
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u16 {
        self.flags[self.index(x, y)]
    }

    #[inline]
    pub fn set_bits(&mut self, x: usize, y: usize, bits: u16) {
        let idx = self.index(x, y);
        self.flags[idx] |= bits;
    }

    #[inline]
    pub fn clear_bits(&mut self, x: usize, y: usize, bits: u16) {
        let idx = self.index(x, y);
        self.flags[idx] &= !bits;
    }

    /// Mark (x, y) significant and publish its significance and sign to the eight neighbours.
    pub fn update_flags(&mut self, x: usize, y: usize, negative: bool) {
        let stride = self.stride;
        let row = (y + 1) * stride;
        let (above, rest) = self.flags.split_at_mut(row);
        let north = &mut above[row - stride..];
        let (current, below) = rest.split_at_mut(stride);
        let south = &mut below[..stride];
        update_rows(north, current, south, x + 1, negative);
    }
}

#[inline]
fn update_rows(
    north: &mut [u16],
    current: &mut [u16],
    south: &mut [u16],
    i: usize,
    negative: bool,
) {
    north[i - 1] |= T1_SIG_SE;
    north[i] |= T1_SIG_S;
    north[i + 1] |= T1_SIG_SW;
    current[i - 1] |= T1_SIG_E;
    current[i] |= T1_SIG;
    current[i + 1] |= T1_SIG_W;
    south[i - 1] |= T1_SIG_NE;
    south[i] |= T1_SIG_N;
    south[i + 1] |= T1_SIG_NW;
    if negative {
        north[i] |= T1_SGN_S;
        current[i - 1] |= T1_SGN_E;
        current[i + 1] |= T1_SGN_W;
        south[i] |= T1_SGN_N;
    }
}
