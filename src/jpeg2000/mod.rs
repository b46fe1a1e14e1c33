//! JPEG 2000 entropy coding (Part 1, ISO/IEC 15444-1 Annexes B, C, D and J.14)
//!
//! - `bit_io`: bit-stuffed reader/writer for packet headers.
//! - `mq_coder`: the MQ arithmetic coder and the raw (bypass) coder.
//! - `context`: significance/sign flags and context selection.
//! - `bit_plane_coder`: Tier-1 code-block coding and distortion estimates.
//! - `norms`: wavelet and component transform norms weighting distortion.
//! - `rate_control`: PCRD-opt truncation and quality layers.
//! - `tag_tree`: tag trees for inclusion and missing bit-planes.
//! - `progression`: packet order of the five progressions.
//! - `packet`: Tier-2 packet headers and bodies.
//! - `image`: tile, band, precinct and code-block structures.

pub mod bit_io;
pub mod bit_plane_coder;
pub mod context;
pub mod image;
pub mod mq_coder;
pub mod norms;
pub mod packet;
pub mod progression;
pub mod rate_control;
pub mod tag_tree;
