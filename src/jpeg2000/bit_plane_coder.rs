//! Tier-1 bit-plane coding of code-blocks (ISO/IEC 15444-1 Annex D).
//!
//! A code-block with `numbps` magnitude bit-planes is coded in `3 * numbps - 2` passes:
//! one cleanup pass on the most significant plane, then a significance, a refinement
//! and a cleanup pass on every lower plane. Coefficients are scanned in stripes of four
//! rows, column by column inside a stripe.

use crate::coding_parameters::CodeBlockStyle;
use crate::constants::{
    MAX_BITPLANES, MAX_CODEBLOCK_AREA, MAX_CODEBLOCK_DIMENSION, T1_NMSEDEC_FRACBITS,
};
use crate::error::J2kError;
use crate::jpeg2000::context::{
    FlagPlane, T1_CTXNO_AGG, T1_CTXNO_UNI, T1_CTXNO_ZC, T1_NUM_CONTEXTS, T1_REFINE, T1_SIG,
    T1_SIG_OTH, T1_VISIT, T1_VSC_MASK, mag_context, sc_context, sign_prediction_bit, zc_context,
};
use crate::jpeg2000::image::{CodeBlock, Pass, PassType, SubbandOrientation, Tile};
use crate::jpeg2000::mq_coder::{MqDecoder, MqEncoder, RawDecoder};
use log::{debug, trace, warn};

const NMSEDEC_TABLE_SIZE: usize = 1 << 7;

const fn build_nmsedec_tables() -> [[i32; NMSEDEC_TABLE_SIZE]; 4] {
    let mut tables = [[0i32; NMSEDEC_TABLE_SIZE]; 4];
    let mut i = 0;
    while i < NMSEDEC_TABLE_SIZE {
        let x = i as i32;
        let sig = 128 * (3 * x - 144);
        tables[0][i] = if sig > 0 { sig } else { 0 };
        tables[1][i] = ((x * x + 32) / 64) * 128;
        let refinement = if i & 64 != 0 { 128 * (x - 80) } else { 128 * (48 - x) };
        tables[2][i] = if refinement > 0 { refinement } else { 0 };
        tables[3][i] = (((x - 64) * (x - 64) + 32) / 64) * 128;
        i += 1;
    }
    tables
}

// Mean squared error decrease of a newly significant or a refined coefficient, indexed by
// the magnitude bits just below the current plane. 13 fractional bits.
const NMSEDEC: [[i32; NMSEDEC_TABLE_SIZE]; 4] = build_nmsedec_tables();
const NMSEDEC_SIG: usize = 0;
const NMSEDEC_SIG0: usize = 1;
const NMSEDEC_REF: usize = 2;
const NMSEDEC_REF0: usize = 3;

#[inline]
fn nmsedec_index(magnitude: u32, bpno: u32) -> usize {
    let x = u64::from(magnitude) << T1_NMSEDEC_FRACBITS;
    let x = if bpno > 0 { x >> bpno } else { x };
    (x & (NMSEDEC_TABLE_SIZE as u64 - 1)) as usize
}

#[inline]
fn nmsedec_sig(magnitude: u32, bpno: u32) -> i64 {
    let table = if bpno > 0 { NMSEDEC_SIG } else { NMSEDEC_SIG0 };
    i64::from(NMSEDEC[table][nmsedec_index(magnitude, bpno)])
}

#[inline]
fn nmsedec_ref(magnitude: u32, bpno: u32) -> i64 {
    let table = if bpno > 0 { NMSEDEC_REF } else { NMSEDEC_REF0 };
    i64::from(NMSEDEC[table][nmsedec_index(magnitude, bpno)])
}

/// Kind of pass `passno` (counted from 0 at the first cleanup pass).
pub fn pass_type(passno: usize) -> PassType {
    match (passno + 2) % 3 {
        0 => PassType::Significance,
        1 => PassType::Refinement,
        _ => PassType::Cleanup,
    }
}

// Bit-planes below the most significant one that pass `passno` works on.
#[inline]
fn plane_offset(passno: usize) -> usize {
    (passno + 2) / 3
}

/// Pass `passno` is coded raw under selective bypass: significance and refinement passes
/// from the fifth bit-plane on.
pub fn is_raw_pass(style: CodeBlockStyle, passno: usize) -> bool {
    style.bypass && pass_type(passno) != PassType::Cleanup && plane_offset(passno) >= 4
}

/// The coder is terminated after pass `passno` of a code-block with `total` passes.
pub fn is_term_pass(style: CodeBlockStyle, passno: usize, total: usize) -> bool {
    if passno + 1 == total || style.termall {
        return true;
    }
    if style.bypass {
        let k = plane_offset(passno);
        return match pass_type(passno) {
            PassType::Cleanup => k >= 3,
            PassType::Refinement => k >= 4,
            PassType::Significance => false,
        };
    }
    false
}

/// Weighting applied to the distortion estimates of one code-block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockCodingParams {
    pub orientation: SubbandOrientation,
    pub style: CodeBlockStyle,
    pub stepsize: f64,
    /// Synthesis norm of the band.
    pub band_norm: f64,
    /// Multi-component transform norm of the component.
    pub mct_norm: f64,
    pub roishift: u32,
}

impl Default for BlockCodingParams {
    fn default() -> Self {
        Self {
            orientation: SubbandOrientation::LL,
            style: CodeBlockStyle::default(),
            stepsize: 1.0,
            band_norm: 1.0,
            mct_norm: 1.0,
            roishift: 0,
        }
    }
}

impl BlockCodingParams {
    fn distortion_scale(&self) -> f64 {
        self.mct_norm * self.band_norm * self.stepsize
    }

    /// Weighted distortion decrease of `nmsedec` on plane `bpno`.
    fn weighted_mse(&self, nmsedec: i64, bpno: u32) -> f64 {
        let w = self.distortion_scale() * (1u64 << bpno) as f64;
        w * w * nmsedec as f64 / 8192.0
    }
}

fn check_geometry(cblk: &CodeBlock) -> Result<(usize, usize), J2kError> {
    let (w, h) = (cblk.width(), cblk.height());
    if w > MAX_CODEBLOCK_DIMENSION || h > MAX_CODEBLOCK_DIMENSION || w * h > MAX_CODEBLOCK_AREA {
        return Err(J2kError::InvalidCodeBlockSize);
    }
    Ok((w, h))
}

fn reset_encoder_contexts(mqc: &mut MqEncoder) {
    mqc.reset_states();
    mqc.set_state(T1_CTXNO_UNI, 46, 0);
    mqc.set_state(T1_CTXNO_AGG, 3, 0);
    mqc.set_state(T1_CTXNO_ZC, 4, 0);
}

fn reset_decoder_contexts(mqc: &mut MqDecoder<'_>) {
    mqc.reset_states();
    mqc.set_state(T1_CTXNO_UNI, 46, 0);
    mqc.set_state(T1_CTXNO_AGG, 3, 0);
    mqc.set_state(T1_CTXNO_ZC, 4, 0);
}

#[inline]
// Clamp pass rates to the coded bytes, make them non-decreasing and fill in `len`.
fn settle_rates(passes: &mut [Pass], data: &[u8]) {
    let mut limit = data.len();
    for pass in passes.iter_mut().rev() {
        if pass.rate > limit {
            pass.rate = limit;
        } else {
            limit = pass.rate;
        }
    }
    let mut previous = 0;
    for pass in passes.iter_mut() {
        // a truncation point never ends on 0xFF
        if pass.rate > 1 && data[pass.rate - 1] == 0xff {
            pass.rate -= 1;
        }
        pass.len = pass.rate - previous;
        previous = pass.rate;
    }
}

fn stripe_flags(flags: u16, vsc: bool, j: usize, k: usize, h: usize) -> u16 {
    if vsc && (j == k + 3 || j == h - 1) { flags & T1_VSC_MASK } else { flags }
}

/// Code-block encoder. Keeps its flag plane and MQ coder between code-blocks.
pub struct T1Encoder {
    flags: FlagPlane,
    mqc: MqEncoder,
    width: usize,
    height: usize,
}

impl Default for T1Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl T1Encoder {
    pub fn new() -> Self {
        Self {
            flags: FlagPlane::default(),
            mqc: MqEncoder::new(T1_NUM_CONTEXTS),
            width: 0,
            height: 0,
        }
    }

    /// Encode `cblk.coefficients`, filling `numbps`, `data` and `passes`.
    /// Returns the weighted distortion reduction of the whole code-block.
    pub fn encode_cblk(
        &mut self,
        cblk: &mut CodeBlock,
        params: &BlockCodingParams,
    ) -> Result<f64, J2kError> {
        let (w, h) = check_geometry(cblk)?;
        if cblk.coefficients.len() != w * h {
            return Err(J2kError::InvalidArgument);
        }
        cblk.reset_coding_state();

        let max = cblk.coefficients.iter().map(|c| c.unsigned_abs()).max().unwrap_or(0);
        let numbps = 32 - max.leading_zeros();
        if numbps > MAX_BITPLANES {
            return Err(J2kError::TooManyBitplanes);
        }
        cblk.numbps = numbps;
        if numbps == 0 {
            return Ok(0.0);
        }

        self.width = w;
        self.height = h;
        self.flags.reset(w, h);
        self.mqc.init_enc();
        reset_encoder_contexts(&mut self.mqc);

        let style = params.style;
        let energy: f64 = cblk.coefficients.iter().map(|&c| (c as f64) * (c as f64)).sum::<f64>()
            * params.distortion_scale()
            * params.distortion_scale();
        let total = 3 * numbps as usize - 2;
        let mut cumulative = 0.0;
        let coefficients = std::mem::take(&mut cblk.coefficients);

        for passno in 0..total {
            let kind = pass_type(passno);
            let bpno = numbps - 1 - plane_offset(passno) as u32;
            let raw = is_raw_pass(style, passno);
            if passno > 0 && cblk.passes[passno - 1].term {
                if raw {
                    self.mqc.bypass_init();
                } else {
                    self.mqc.restart_init();
                }
            }

            let nmsedec = match kind {
                PassType::Significance => {
                    self.sig_pass(&coefficients, bpno, params.orientation, style.vsc, raw)
                }
                PassType::Refinement => self.ref_pass(&coefficients, bpno, style.vsc, raw),
                PassType::Cleanup => {
                    let nmsedec = self.cln_pass(&coefficients, bpno, params.orientation, style.vsc);
                    if style.segsym {
                        self.mqc.segmark(T1_CTXNO_UNI);
                    }
                    nmsedec
                }
            };
            // the estimate can overshoot on the last planes
            cumulative = (cumulative + params.weighted_mse(nmsedec, bpno)).min(energy);

            let term = is_term_pass(style, passno, total);
            let rate = if term {
                if raw {
                    self.mqc.bypass_flush();
                } else {
                    self.mqc.flush();
                }
                self.mqc.num_bytes()
            } else if raw {
                self.mqc.num_bytes() + self.mqc.bypass_extra_bytes()
            } else {
                self.mqc.rate_estimate()
            };
            trace!("pass {passno} {kind:?} plane {bpno} raw {raw} term {term} rate {rate}");
            cblk.passes.push(Pass {
                pass_type: kind,
                rate,
                len: 0,
                distortion_dec: cumulative,
                term,
            });

            if style.reset {
                reset_encoder_contexts(&mut self.mqc);
            }
        }
        cblk.coefficients = coefficients;

        let data = self.mqc.data();
        settle_rates(&mut cblk.passes, data);
        cblk.data = data.to_vec();

        Ok(cumulative)
    }

    fn emit(&mut self, cx: usize, bit: u32, raw: bool) {
        if raw {
            self.mqc.bypass_encode(bit);
        } else {
            self.mqc.encode(cx, bit);
        }
    }

    fn sig_pass(
        &mut self,
        coefficients: &[i32],
        bpno: u32,
        orientation: SubbandOrientation,
        vsc: bool,
        raw: bool,
    ) -> i64 {
        let (w, h) = (self.width, self.height);
        let mut nmsedec = 0;
        for k in (0..h).step_by(4) {
            for i in 0..w {
                for j in k..(k + 4).min(h) {
                    let flag = stripe_flags(self.flags.get(i, j), vsc, j, k, h);
                    if flag & T1_SIG_OTH == 0 || flag & (T1_SIG | T1_VISIT) != 0 {
                        continue;
                    }
                    let coefficient = coefficients[j * w + i];
                    let magnitude = coefficient.unsigned_abs();
                    let bit = (magnitude >> bpno) & 1;
                    self.emit(zc_context(flag, orientation), bit, raw);
                    if bit != 0 {
                        let negative = coefficient < 0;
                        nmsedec += nmsedec_sig(magnitude, bpno);
                        if raw {
                            self.mqc.bypass_encode(u32::from(negative));
                        } else {
                            let symbol = u32::from(negative) ^ sign_prediction_bit(flag);
                            self.mqc.encode(sc_context(flag), symbol);
                        }
                        self.flags.update_flags(i, j, negative);
                    }
                    self.flags.set_bits(i, j, T1_VISIT);
                }
            }
        }
        nmsedec
    }

    fn ref_pass(&mut self, coefficients: &[i32], bpno: u32, vsc: bool, raw: bool) -> i64 {
        let (w, h) = (self.width, self.height);
        let mut nmsedec = 0;
        for k in (0..h).step_by(4) {
            for i in 0..w {
                for j in k..(k + 4).min(h) {
                    let flag = stripe_flags(self.flags.get(i, j), vsc, j, k, h);
                    if flag & (T1_SIG | T1_VISIT) != T1_SIG {
                        continue;
                    }
                    let magnitude = coefficients[j * w + i].unsigned_abs();
                    nmsedec += nmsedec_ref(magnitude, bpno);
                    self.emit(mag_context(flag), (magnitude >> bpno) & 1, raw);
                    self.flags.set_bits(i, j, T1_REFINE);
                }
            }
        }
        nmsedec
    }

    fn cln_pass(
        &mut self,
        coefficients: &[i32],
        bpno: u32,
        orientation: SubbandOrientation,
        vsc: bool,
    ) -> i64 {
        let (w, h) = (self.width, self.height);
        let mut nmsedec = 0;
        for k in (0..h).step_by(4) {
            for i in 0..w {
                let agg = k + 3 < h
                    && (0..4).all(|r| {
                        let flag = stripe_flags(self.flags.get(i, k + r), vsc, k + r, k, h);
                        flag & (T1_SIG | T1_VISIT | T1_SIG_OTH) == 0
                    });
                let mut runlen = 0;
                if agg {
                    runlen = (0..4)
                        .find(|&r| (coefficients[(k + r) * w + i].unsigned_abs() >> bpno) & 1 != 0)
                        .unwrap_or(4);
                    self.mqc.encode(T1_CTXNO_AGG, u32::from(runlen != 4));
                    if runlen == 4 {
                        continue;
                    }
                    self.mqc.encode(T1_CTXNO_UNI, (runlen >> 1) as u32);
                    self.mqc.encode(T1_CTXNO_UNI, (runlen & 1) as u32);
                }
                for j in (k + runlen)..(k + 4).min(h) {
                    let flag = stripe_flags(self.flags.get(i, j), vsc, j, k, h);
                    let coefficient = coefficients[j * w + i];
                    let magnitude = coefficient.unsigned_abs();
                    let significant = if agg && j == k + runlen {
                        true
                    } else if flag & (T1_SIG | T1_VISIT) == 0 {
                        let bit = (magnitude >> bpno) & 1;
                        self.mqc.encode(zc_context(flag, orientation), bit);
                        bit != 0
                    } else {
                        false
                    };
                    if significant {
                        let negative = coefficient < 0;
                        nmsedec += nmsedec_sig(magnitude, bpno);
                        let symbol = u32::from(negative) ^ sign_prediction_bit(flag);
                        self.mqc.encode(sc_context(flag), symbol);
                        self.flags.update_flags(i, j, negative);
                    }
                    self.flags.clear_bits(i, j, T1_VISIT);
                }
            }
        }
        nmsedec
    }
}

// Symbol source of the segment being decoded.
struct SymbolDecoder<'a> {
    mqc: MqDecoder<'a>,
    raw: RawDecoder<'a>,
    bypass: bool,
}

impl SymbolDecoder<'_> {
    #[inline]
    fn decode(&mut self, cx: usize) -> u32 {
        if self.bypass { self.raw.decode() } else { self.mqc.decode(cx) }
    }

    #[inline]
    fn decode_sign(&mut self, flag: u16) -> u32 {
        if self.bypass {
            self.raw.decode()
        } else {
            self.mqc.decode(sc_context(flag)) ^ sign_prediction_bit(flag)
        }
    }
}

/// Code-block decoder. Keeps its flag plane and sample buffer between code-blocks.
#[derive(Default)]
pub struct T1Decoder {
    flags: FlagPlane,
    data: Vec<i32>,
    width: usize,
    height: usize,
}

impl T1Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the segments of `cblk` into `cblk.coefficients`.
    ///
    /// On damaged data the coefficients reconstructed so far are kept, the block is marked
    /// corrupted and the error is returned.
    pub fn decode_cblk(
        &mut self,
        cblk: &mut CodeBlock,
        params: &BlockCodingParams,
    ) -> Result<(), J2kError> {
        let (w, h) = check_geometry(cblk)?;
        self.width = w;
        self.height = h;
        self.flags.reset(w, h);
        self.data.clear();
        self.data.resize(w * h, 0);

        let result = self.decode_segments(cblk, params);
        cblk.coefficients.clear();
        cblk.coefficients.extend_from_slice(&self.data);
        if result.is_err() {
            cblk.corrupted = true;
        }
        result
    }

    fn decode_segments(
        &mut self,
        cblk: &CodeBlock,
        params: &BlockCodingParams,
    ) -> Result<(), J2kError> {
        if cblk.segments.is_empty() {
            return Ok(());
        }
        let planes = cblk.numbps + params.roishift;
        if planes > MAX_BITPLANES {
            return Err(J2kError::TooManyBitplanes);
        }
        let style = params.style;
        let mut decoder = SymbolDecoder {
            mqc: MqDecoder::new(T1_NUM_CONTEXTS),
            raw: RawDecoder::new(&[]),
            bypass: false,
        };
        reset_decoder_contexts(&mut decoder.mqc);

        let mut bpno = planes as i32 - 1;
        let mut passno = 0;
        for segment in &cblk.segments {
            let end = segment.data_offset + segment.len;
            let bytes = cblk
                .data
                .get(segment.data_offset..end)
                .ok_or(J2kError::CodeBlockDataOverflow)?;
            decoder.bypass = is_raw_pass(style, passno);
            if decoder.bypass {
                decoder.raw = RawDecoder::new(bytes);
            } else {
                decoder.mqc.init_dec(bytes);
            }

            for _ in 0..segment.num_passes {
                if bpno < 0 {
                    return Err(J2kError::TooManyPasses);
                }
                let plane = bpno as u32;
                match pass_type(passno) {
                    PassType::Significance => {
                        self.sig_pass(&mut decoder, plane, params.orientation, style.vsc)
                    }
                    PassType::Refinement => self.ref_pass(&mut decoder, plane, style.vsc),
                    PassType::Cleanup => {
                        self.cln_pass(&mut decoder.mqc, plane, params.orientation, style.vsc);
                        if style.segsym {
                            let symbol =
                                (0..4).fold(0, |v, _| (v << 1) | decoder.mqc.decode(T1_CTXNO_UNI));
                            if symbol != 0xa {
                                warn!(
                                    "segmentation symbol {symbol:#x} after cleanup pass {passno}, \
                                     dropping the rest of the code-block"
                                );
                                return Err(J2kError::SegmentationSymbolMismatch);
                            }
                        }
                        bpno -= 1;
                    }
                }
                if style.reset && !decoder.bypass {
                    reset_decoder_contexts(&mut decoder.mqc);
                }
                passno += 1;
            }
        }
        Ok(())
    }

    fn sig_pass(
        &mut self,
        decoder: &mut SymbolDecoder<'_>,
        bpno: u32,
        orientation: SubbandOrientation,
        vsc: bool,
    ) {
        let (w, h) = (self.width, self.height);
        let one = 1i32 << bpno;
        let oneplushalf = one | (one >> 1);
        for k in (0..h).step_by(4) {
            for i in 0..w {
                for j in k..(k + 4).min(h) {
                    let flag = stripe_flags(self.flags.get(i, j), vsc, j, k, h);
                    if flag & T1_SIG_OTH == 0 || flag & (T1_SIG | T1_VISIT) != 0 {
                        continue;
                    }
                    if decoder.decode(zc_context(flag, orientation)) != 0 {
                        let negative = decoder.decode_sign(flag) != 0;
                        self.data[j * w + i] = if negative { -oneplushalf } else { oneplushalf };
                        self.flags.update_flags(i, j, negative);
                    }
                    self.flags.set_bits(i, j, T1_VISIT);
                }
            }
        }
    }

    fn ref_pass(&mut self, decoder: &mut SymbolDecoder<'_>, bpno: u32, vsc: bool) {
        let (w, h) = (self.width, self.height);
        let poshalf = (1i32 << bpno) >> 1;
        let neghalf = if bpno > 0 { -poshalf } else { -1 };
        for k in (0..h).step_by(4) {
            for i in 0..w {
                for j in k..(k + 4).min(h) {
                    let flag = stripe_flags(self.flags.get(i, j), vsc, j, k, h);
                    if flag & (T1_SIG | T1_VISIT) != T1_SIG {
                        continue;
                    }
                    let t = if decoder.decode(mag_context(flag)) != 0 { poshalf } else { neghalf };
                    let value = &mut self.data[j * w + i];
                    *value += if *value < 0 { -t } else { t };
                    self.flags.set_bits(i, j, T1_REFINE);
                }
            }
        }
    }

    fn cln_pass(
        &mut self,
        mqc: &mut MqDecoder<'_>,
        bpno: u32,
        orientation: SubbandOrientation,
        vsc: bool,
    ) {
        let (w, h) = (self.width, self.height);
        let one = 1i32 << bpno;
        let oneplushalf = one | (one >> 1);
        for k in (0..h).step_by(4) {
            for i in 0..w {
                let agg = k + 3 < h
                    && (0..4).all(|r| {
                        let flag = stripe_flags(self.flags.get(i, k + r), vsc, k + r, k, h);
                        flag & (T1_SIG | T1_VISIT | T1_SIG_OTH) == 0
                    });
                let mut runlen = 0;
                if agg {
                    if mqc.decode(T1_CTXNO_AGG) == 0 {
                        continue;
                    }
                    runlen = mqc.decode(T1_CTXNO_UNI) as usize;
                    runlen = (runlen << 1) | mqc.decode(T1_CTXNO_UNI) as usize;
                }
                for j in (k + runlen)..(k + 4).min(h) {
                    let flag = stripe_flags(self.flags.get(i, j), vsc, j, k, h);
                    let significant = (agg && j == k + runlen)
                        || (flag & (T1_SIG | T1_VISIT) == 0
                            && mqc.decode(zc_context(flag, orientation)) != 0);
                    if significant {
                        let negative =
                            mqc.decode(sc_context(flag)) ^ sign_prediction_bit(flag) != 0;
                        self.data[j * w + i] = if negative { -oneplushalf } else { oneplushalf };
                        self.flags.update_flags(i, j, negative);
                    }
                    self.flags.clear_bits(i, j, T1_VISIT);
                }
            }
        }
    }
}

// Every code-block of the tile paired with the parameters of its band and component.
fn codeblock_jobs(tile: &mut Tile) -> Vec<(BlockCodingParams, &mut CodeBlock)> {
    let mut jobs = Vec::new();
    for component in tile.components.iter_mut() {
        let (style, mct_norm, roishift) = (component.style, component.mct_norm, component.roishift);
        for resolution in component.resolutions.iter_mut() {
            for band in resolution.bands.iter_mut() {
                let params = BlockCodingParams {
                    orientation: band.orientation,
                    style,
                    stepsize: band.stepsize,
                    band_norm: band.norm,
                    mct_norm,
                    roishift,
                };
                for precinct in band.precincts.iter_mut() {
                    for cblk in precinct.codeblocks.iter_mut() {
                        jobs.push((params, cblk));
                    }
                }
            }
        }
    }
    jobs
}

/// Tier-1 encode every code-block of the tile and record the tile's total distortion
/// reduction in `tile.distortion`. The first failing code-block aborts the tile.
pub fn encode_codeblocks(tile: &mut Tile) -> Result<f64, J2kError> {
    let jobs = codeblock_jobs(tile);
    let count = jobs.len();

    #[cfg(feature = "rayon")]
    let results: Vec<Result<f64, J2kError>> = {
        use rayon::prelude::*;
        jobs.into_par_iter()
            .map_init(T1Encoder::new, |encoder, (params, cblk)| encoder.encode_cblk(cblk, &params))
            .collect()
    };
    #[cfg(not(feature = "rayon"))]
    let results: Vec<Result<f64, J2kError>> = {
        let mut encoder = T1Encoder::new();
        jobs.into_iter()
            .map(|(params, cblk)| encoder.encode_cblk(cblk, &params))
            .collect()
    };

    let mut distortion = 0.0;
    for result in results {
        distortion += result?;
    }
    debug!("tier-1 encoded {count} code-blocks, distortion reduction {distortion:.3}");
    tile.distortion = distortion;
    Ok(distortion)
}

/// Outcome of decoding the code-blocks of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tier1DecodeReport {
    pub decoded: usize,
    /// Code-blocks that stopped early; their partial coefficients are kept.
    pub corrupted: usize,
}

/// Tier-1 decode every code-block of the tile. Damaged code-blocks are logged and
/// counted, never fatal.
pub fn decode_codeblocks(tile: &mut Tile) -> Tier1DecodeReport {
    let jobs = codeblock_jobs(tile);

    #[cfg(feature = "rayon")]
    let results: Vec<Result<(), J2kError>> = {
        use rayon::prelude::*;
        jobs.into_par_iter()
            .map_init(T1Decoder::new, |decoder, (params, cblk)| decoder.decode_cblk(cblk, &params))
            .collect()
    };
    #[cfg(not(feature = "rayon"))]
    let results: Vec<Result<(), J2kError>> = {
        let mut decoder = T1Decoder::new();
        jobs.into_iter()
            .map(|(params, cblk)| decoder.decode_cblk(cblk, &params))
            .collect()
    };

    let mut report = Tier1DecodeReport::default();
    for result in results {
        match result {
            Ok(()) => report.decoded += 1,
            Err(e) => {
                warn!("code-block decoding stopped early: {e}");
                report.corrupted += 1;
            }
        }
    }
    debug!("tier-1 decoded {} code-blocks, {} corrupted", report.decoded, report.corrupted);
    report
}
