//! Tile model shared by the Tier-1, rate allocation and Tier-2 stages.
//!
//! The geometry (how many resolutions, bands, precincts and code-blocks, and where they
//! sit) is decided by the caller; these structures only carry it together with the
//! per-code-block coding state.

use crate::coding_parameters::{CodeBlockStyle, PacketStyle, Transform};
use crate::jpeg2000::progression::ProgressionOrder;
use crate::jpeg2000::tag_tree::TagTree;

/// Orientation of a wavelet subband.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubbandOrientation {
    #[default]
    /// Low-Low (base image)
    LL,
    /// High-Low (horizontal details)
    HL,
    /// Low-High (vertical details)
    LH,
    /// High-High (diagonal details)
    HH,
}

/// Kind of a bit-plane coding pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassType {
    Significance,
    Refinement,
    #[default]
    Cleanup,
}

/// One coding pass of an encoded code-block.
///
/// Packet decoding rebuilds these from the received segment chunks: only the last pass of
/// a chunk carries its bytes and distortion is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pass {
    pub pass_type: PassType,
    /// Coded bytes of the code-block up to and including this pass.
    pub rate: usize,
    /// Bytes added by this pass.
    pub len: usize,
    /// Weighted distortion reduction of the code-block up to and including this pass.
    pub distortion_dec: f64,
    /// The coder was terminated at the end of this pass.
    pub term: bool,
}

/// Decode side: consecutive passes sharing one coder initialisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Segment {
    /// Offset of the segment's first byte in `CodeBlock::data`.
    pub data_offset: usize,
    /// Bytes received so far.
    pub len: usize,
    /// Passes received so far.
    pub num_passes: u32,
    /// Passes the segment can hold under the code-block style.
    pub max_passes: u32,
}

/// The passes a code-block contributes to one quality layer, as allocated or as received.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Layer {
    /// New passes in this layer.
    pub num_passes: u32,
    /// Bytes of those passes.
    pub len: usize,
    /// Offset of the first of those bytes in `CodeBlock::data`.
    pub data_offset: usize,
    /// Distortion reduction contributed by those passes.
    pub distortion: f64,
}

/// Segment contribution announced by a packet header, applied once the body is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SegmentChunk {
    /// Extends the code-block's last segment instead of opening a new one.
    pub continues: bool,
    pub max_passes: u32,
    pub num_passes: u32,
    pub len: usize,
}

/// A core unit of compressed data in J2K (typically 32x32 or 64x64).
#[derive(Debug, Clone, Default)]
pub struct CodeBlock {
    /// Left edge in band coordinates.
    pub x0: u32,
    /// Top edge in band coordinates.
    pub y0: u32,
    /// Right edge (exclusive).
    pub x1: u32,
    /// Bottom edge (exclusive).
    pub y1: u32,
    /// Quantized coefficients in raster order: input of Tier-1 encode, output of Tier-1 decode.
    pub coefficients: Vec<i32>,
    /// Magnitude bit-planes. Computed by Tier-1 encode, signalled through Tier-2 on decode.
    pub numbps: u32,
    /// Coded bytes of every pass (encode) or every received segment (decode).
    pub data: Vec<u8>,
    pub passes: Vec<Pass>,
    pub layers: Vec<Layer>,
    pub segments: Vec<Segment>,
    /// Passes already signalled in packets (encode).
    pub num_passes_coded: u32,
    /// Current number of bits of the segment length indicator (Lblock).
    pub num_len_bits: u32,
    /// Decoding stopped early on damaged data.
    pub corrupted: bool,
    pub(crate) pending: Vec<SegmentChunk>,
}

impl CodeBlock {
    pub fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self {
            x0,
            y0,
            x1,
            y1,
            ..Default::default()
        }
    }

    /// Code-block with its coefficients already in place.
    pub fn with_coefficients(width: u32, height: u32, coefficients: Vec<i32>) -> Self {
        Self {
            coefficients,
            ..Self::new(0, 0, width, height)
        }
    }

    pub fn width(&self) -> usize {
        self.x1.saturating_sub(self.x0) as usize
    }

    pub fn height(&self) -> usize {
        self.y1.saturating_sub(self.y0) as usize
    }

    /// Passes assigned to the committed layers.
    pub fn num_passes_in_layers(&self) -> u32 {
        self.layers.iter().map(|l| l.num_passes).sum()
    }

    /// Passes received over all segments.
    pub fn num_passes_decoded(&self) -> u32 {
        self.segments.iter().map(|s| s.num_passes).sum()
    }

    /// Clear all coding state, keeping geometry and coefficients.
    pub fn reset_coding_state(&mut self) {
        self.numbps = 0;
        self.data.clear();
        self.passes.clear();
        self.layers.clear();
        self.segments.clear();
        self.pending.clear();
        self.num_passes_coded = 0;
        self.num_len_bits = 0;
        self.corrupted = false;
    }
}

/// Code-blocks of one band that fall inside one precinct, with their packet header trees.
#[derive(Debug, Clone, Default)]
pub struct Precinct {
    /// Code-blocks across.
    pub cw: usize,
    /// Code-blocks down.
    pub ch: usize,
    /// Code-blocks in raster order, `cw * ch` of them.
    pub codeblocks: Vec<CodeBlock>,
    pub inclusion_tree: TagTree,
    /// Missing most significant bit-planes of each code-block.
    pub imsb_tree: TagTree,
}

impl Precinct {
    pub fn new(cw: usize, ch: usize, codeblocks: Vec<CodeBlock>) -> Self {
        debug_assert_eq!(codeblocks.len(), cw * ch);
        Self {
            cw,
            ch,
            codeblocks,
            inclusion_tree: TagTree::new(cw, ch),
            imsb_tree: TagTree::new(cw, ch),
        }
    }

    /// Precinct without code-blocks (a degenerate band).
    pub fn empty() -> Self {
        Self::new(0, 0, Vec::new())
    }
}

/// A frequency subband within a resolution level.
#[derive(Debug, Clone, Default)]
pub struct Band {
    /// Orientation of the subband (LL, HL, LH, HH).
    pub orientation: SubbandOrientation,
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
    /// Magnitude bit-planes of the band (guard bits + exponent - 1).
    pub numbps: u32,
    /// Quantization step size.
    pub stepsize: f64,
    /// Wavelet synthesis norm weighting the band's distortion.
    pub norm: f64,
    /// One entry per precinct of the resolution.
    pub precincts: Vec<Precinct>,
}

impl Band {
    pub fn new(
        orientation: SubbandOrientation,
        x0: u32,
        y0: u32,
        x1: u32,
        y1: u32,
        numbps: u32,
    ) -> Self {
        Self {
            orientation,
            x0,
            y0,
            x1,
            y1,
            numbps,
            stepsize: 1.0,
            norm: 1.0,
            precincts: Vec::new(),
        }
    }

    /// Zero width or height; such a band has no code-blocks and is skipped by Tier-2.
    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }
}

/// A specific resolution level in the DWT decomposition.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Precincts across.
    pub pw: usize,
    /// Precincts down.
    pub ph: usize,
    /// Subbands (LL at resolution 0, otherwise HL, LH, HH).
    pub bands: Vec<Band>,
    /// Reference grid position of each precinct, used by the position-driven progressions.
    pub precinct_origins: Vec<(u32, u32)>,
}

impl Resolution {
    /// Precinct origins default to the precinct raster indices.
    pub fn new(pw: usize, ph: usize, bands: Vec<Band>) -> Self {
        let precinct_origins = (0..pw * ph)
            .map(|p| ((p % pw.max(1)) as u32, (p / pw.max(1)) as u32))
            .collect();
        Self {
            pw,
            ph,
            bands,
            precinct_origins,
        }
    }

    pub fn num_precincts(&self) -> usize {
        self.pw * self.ph
    }
}

/// Component data specific to a single tile.
#[derive(Debug, Clone, Default)]
pub struct TileComponent {
    /// Resolution levels, lowest first.
    pub resolutions: Vec<Resolution>,
    pub style: CodeBlockStyle,
    pub transform: Transform,
    /// Region of interest up-shift; adds bit-planes on decode.
    pub roishift: u32,
    /// Multi-component transform norm of this component (1.0 without a transform).
    pub mct_norm: f64,
    /// Highest resolution from which a packet was decoded.
    pub resno_decoded: Option<usize>,
}

impl TileComponent {
    pub fn new(resolutions: Vec<Resolution>, style: CodeBlockStyle) -> Self {
        Self {
            resolutions,
            style,
            transform: Transform::Reversible53,
            roishift: 0,
            mct_norm: 1.0,
            resno_decoded: None,
        }
    }
}

/// One tile: the unit Tier-1, rate allocation and Tier-2 operate on.
#[derive(Debug, Clone, Default)]
pub struct Tile {
    pub components: Vec<TileComponent>,
    pub num_layers: usize,
    pub progression: ProgressionOrder,
    pub packet_style: PacketStyle,
    /// Weighted distortion reduction of every coding pass of the tile.
    pub distortion: f64,
    /// Distortion reduction contributed by each committed layer.
    pub layer_distortion: Vec<f64>,
}

impl Tile {
    pub fn new(
        components: Vec<TileComponent>,
        num_layers: usize,
        progression: ProgressionOrder,
    ) -> Self {
        Self {
            components,
            num_layers,
            progression,
            ..Default::default()
        }
    }

    /// Every code-block of the tile, component by component.
    pub fn codeblocks(&self) -> impl Iterator<Item = &CodeBlock> {
        self.components
            .iter()
            .flat_map(|c| c.resolutions.iter())
            .flat_map(|r| r.bands.iter())
            .flat_map(|b| b.precincts.iter())
            .flat_map(|p| p.codeblocks.iter())
    }

    pub fn codeblocks_mut(&mut self) -> impl Iterator<Item = &mut CodeBlock> {
        self.components
            .iter_mut()
            .flat_map(|c| c.resolutions.iter_mut())
            .flat_map(|r| r.bands.iter_mut())
            .flat_map(|b| b.precincts.iter_mut())
            .flat_map(|p| p.codeblocks.iter_mut())
    }
}
