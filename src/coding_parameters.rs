use crate::constants::DEFAULT_MAX_CODEBLOCK_BYTES;
use num_enum::TryFromPrimitive;

/// Code-block style, as carried by the SPcod/SPcoc code-block style byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodeBlockStyle {
    /// Selective arithmetic coding bypass (raw coding of the lower bit-planes).
    pub bypass: bool,
    /// Reset context probabilities after every coding pass.
    pub reset: bool,
    /// Terminate the arithmetic coder after every coding pass.
    pub termall: bool,
    /// Vertically causal context formation.
    pub vsc: bool,
    /// Predictable termination. Accepted and signalled; coded as normal termination.
    pub predictable_termination: bool,
    /// Segmentation symbol after every cleanup pass.
    pub segsym: bool,
}

impl CodeBlockStyle {
    pub const BYPASS: u8 = 0x01;
    pub const RESET: u8 = 0x02;
    pub const TERMALL: u8 = 0x04;
    pub const VSC: u8 = 0x08;
    pub const PREDICTABLE_TERMINATION: u8 = 0x10;
    pub const SEGSYM: u8 = 0x20;

    pub fn from_byte(value: u8) -> Self {
        Self {
            bypass: value & Self::BYPASS != 0,
            reset: value & Self::RESET != 0,
            termall: value & Self::TERMALL != 0,
            vsc: value & Self::VSC != 0,
            predictable_termination: value & Self::PREDICTABLE_TERMINATION != 0,
            segsym: value & Self::SEGSYM != 0,
        }
    }

    pub fn to_byte(self) -> u8 {
        let mut value = 0;
        if self.bypass {
            value |= Self::BYPASS;
        }
        if self.reset {
            value |= Self::RESET;
        }
        if self.termall {
            value |= Self::TERMALL;
        }
        if self.vsc {
            value |= Self::VSC;
        }
        if self.predictable_termination {
            value |= Self::PREDICTABLE_TERMINATION;
        }
        if self.segsym {
            value |= Self::SEGSYM;
        }
        value
    }
}

/// Packet-level coding style bits of Scod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketStyle {
    /// Start of packet marker before every packet.
    pub sop: bool,
    /// End of packet header marker after every packet header.
    pub eph: bool,
}

impl PacketStyle {
    pub const SOP: u8 = 0x02;
    pub const EPH: u8 = 0x04;

    pub fn from_scod(value: u8) -> Self {
        Self {
            sop: value & Self::SOP != 0,
            eph: value & Self::EPH != 0,
        }
    }

    pub fn to_scod(self) -> u8 {
        (if self.sop { Self::SOP } else { 0 }) | (if self.eph { Self::EPH } else { 0 })
    }
}

/// Wavelet transform of a tile-component (qmfbid in the COD marker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum Transform {
    Irreversible97 = 0,
    Reversible53 = 1,
}

impl Default for Transform {
    fn default() -> Self {
        Self::Reversible53
    }
}

/// Target for one quality layer. Byte budgets and distortion targets are cumulative
/// over the layer and every layer before it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayerTarget {
    /// Total code-block bytes allowed up to and including this layer.
    RateBudget(usize),
    /// Largest weighted distortion allowed to remain after this layer.
    DistortionTarget(f64),
    /// Every remaining coding pass.
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationStrategy {
    /// Slope threshold search per layer.
    #[default]
    Bisection,
    /// Slope-sorted inclusion across all code-blocks. Only applies to byte budgets.
    Greedy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Coded bytes a single code-block may accumulate. Anything beyond marks the block corrupted.
    pub max_codeblock_bytes: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_codeblock_bytes: DEFAULT_MAX_CODEBLOCK_BYTES,
        }
    }
}
