//! EBCOT engine of a JPEG 2000 (ISO/IEC 15444-1) codec.
//!
//! The encode path runs Tier-1 bit-plane coding over every code-block of a tile
//! ([`jpeg2000::bit_plane_coder::encode_codeblocks`]), chooses per-layer truncation
//! points ([`jpeg2000::rate_control::allocate_layers`]) and writes the packets in the
//! tile's progression order ([`jpeg2000::packet::encode_packets`]). The decode path reads
//! packets back ([`jpeg2000::packet::decode_packets`]) and reconstructs the coefficients
//! ([`jpeg2000::bit_plane_coder::decode_codeblocks`]).

pub mod coding_parameters;
pub mod constants;
pub mod error;
pub mod jpeg2000;

pub use coding_parameters::{
    AllocationStrategy, CodeBlockStyle, DecoderConfig, LayerTarget, PacketStyle, Transform,
};
pub use error::J2kError;
pub use jpeg2000::image::{
    Band, CodeBlock, Layer, Pass, PassType, Precinct, Resolution, Segment, SubbandOrientation, Tile,
    TileComponent,
};
pub use jpeg2000::packet::{Tier2Outcome, Tier2Status};
pub use jpeg2000::progression::{PacketId, ProgressionOrder};
