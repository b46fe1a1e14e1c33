// Fixed-point precision of the nmsedec distortion tables (ISO/IEC 15444-1 J.14 style estimate).
pub const T1_NMSEDEC_BITS: u32 = 7;
pub const T1_NMSEDEC_FRACBITS: u32 = T1_NMSEDEC_BITS - 1;

// Largest magnitude bit-plane count a 32-bit signed coefficient can carry.
pub const MAX_BITPLANES: u32 = 31;

// ISO/IEC 15444-1 A.6.1: code-block dimensions are at most 1024 and their area at most 4096.
pub const MAX_CODEBLOCK_DIMENSION: usize = 1024;
pub const MAX_CODEBLOCK_AREA: usize = 4096;

// Passes per segment when no termination-related style bits are set (Table B.5 upper bound).
pub const MAX_PASSES_PER_SEGMENT: u32 = 109;
// Passes in the first segment of a selective-bypass code-block.
pub const BYPASS_FIRST_SEGMENT_PASSES: u32 = 10;

// Largest value the number-of-passes code can carry (Table B.4).
pub const MAX_PASSES_PER_PACKET: u32 = 164;

// Initial number of bits used to signal a code-block segment length (Lblock).
pub const INITIAL_LBLOCK: u32 = 3;

// Tag-tree value meaning "not yet known"; larger than any layer index or bit-plane count.
pub const TAG_TREE_UNKNOWN: i32 = 999;

// Start of packet (SOP) and end of packet header (EPH) marker codes.
pub const SOP_MARKER: u16 = 0xFF91;
pub const EPH_MARKER: u16 = 0xFF92;
pub const SOP_SEGMENT_LENGTH: u16 = 4;

pub const BISECTION_ITERATIONS: u32 = 128;

pub const DEFAULT_MAX_CODEBLOCK_BYTES: usize = 1 << 16;
