//! Tier-2 packet coding (ISO/IEC 15444-1 B.9 and B.10).
//!
//! A packet carries, for one layer of one precinct of one resolution of one component,
//! the header bits of every code-block of the precinct's bands followed by the coded
//! bytes those code-blocks contribute to the layer.

use crate::coding_parameters::{CodeBlockStyle, DecoderConfig};
use crate::constants::{
    BYPASS_FIRST_SEGMENT_PASSES, EPH_MARKER, INITIAL_LBLOCK, MAX_PASSES_PER_PACKET,
    MAX_PASSES_PER_SEGMENT, SOP_MARKER, SOP_SEGMENT_LENGTH, TAG_TREE_UNKNOWN,
};
use crate::error::J2kError;
use crate::jpeg2000::bit_io::{J2kBitReader, J2kBitWriter};
use crate::jpeg2000::bit_plane_coder::pass_type;
use crate::jpeg2000::image::{CodeBlock, Layer, Pass, Resolution, Segment, SegmentChunk, Tile};
use crate::jpeg2000::progression::{PacketId, packet_order};
use log::{debug, trace, warn};

const SOP_BYTES: usize = 6;
const EPH_BYTES: usize = 2;

/// `floor(log2(value))`, with 0 for 0.
pub fn floor_log2(value: u32) -> u32 {
    if value == 0 { 0 } else { 31 - value.leading_zeros() }
}

/// Table B.4: number of new coding passes.
pub fn encode_num_passes(writer: &mut J2kBitWriter, n: u32) -> Result<(), J2kError> {
    match n {
        1 => writer.write_bit(0),
        2 => writer.write_bits(0b10, 2),
        3..=5 => writer.write_bits(0xc | (n - 3), 4),
        6..=36 => writer.write_bits(0x1e0 | (n - 6), 9),
        37..=MAX_PASSES_PER_PACKET => writer.write_bits(0xff80 | (n - 37), 16),
        _ => Err(J2kError::TooManyPasses),
    }
}

pub fn decode_num_passes(reader: &mut J2kBitReader) -> Result<u32, J2kError> {
    if reader.read_bit()? == 0 {
        return Ok(1);
    }
    if reader.read_bit()? == 0 {
        return Ok(2);
    }
    let n = reader.read_bits(2)?;
    if n != 3 {
        return Ok(3 + n);
    }
    let n = reader.read_bits(5)?;
    if n != 31 {
        return Ok(6 + n);
    }
    Ok(37 + reader.read_bits(7)?)
}

/// Length indicator increment: `n` one bits closed by a zero.
pub fn encode_comma_code(writer: &mut J2kBitWriter, n: u32) -> Result<(), J2kError> {
    for _ in 0..n {
        writer.write_bit(1)?;
    }
    writer.write_bit(0)
}

pub fn decode_comma_code(reader: &mut J2kBitReader) -> Result<u32, J2kError> {
    let mut n = 0;
    while reader.read_bit()? == 1 {
        n += 1;
    }
    Ok(n)
}

/// Passes the next codeword segment of a code-block can hold, given the capacity of the
/// segment before it (`None` for the first one).
pub fn segment_max_passes(style: CodeBlockStyle, previous: Option<u32>) -> u32 {
    if style.termall {
        1
    } else if style.bypass {
        match previous {
            None => BYPASS_FIRST_SEGMENT_PASSES,
            Some(1) | Some(BYPASS_FIRST_SEGMENT_PASSES) => 2,
            Some(_) => 1,
        }
    } else {
        MAX_PASSES_PER_SEGMENT
    }
}

fn resolution_mut(tile: &mut Tile, id: PacketId) -> Result<&mut Resolution, J2kError> {
    tile.components
        .get_mut(id.component)
        .and_then(|c| c.resolutions.get_mut(id.resolution))
        .ok_or(J2kError::InvalidArgument)
}

// Rebuild pass boundaries from a received chunk so the code-block can be written out again.
// Only the chunk end is a known rate; the bytes sit on its last pass.
fn record_passes(cblk: &mut CodeBlock, chunk: SegmentChunk, segment_full: bool) {
    let mut rate = cblk.passes.last().map_or(0, |p| p.rate);
    for i in 0..chunk.num_passes {
        let last = i + 1 == chunk.num_passes;
        let len = if last { chunk.len } else { 0 };
        rate += len;
        cblk.passes.push(Pass {
            pass_type: pass_type(cblk.passes.len()),
            rate,
            len,
            distortion_dec: 0.0,
            term: last && segment_full,
        });
    }
}

/// Write one packet into `dest` and return its size in bytes. `seq` is the SOP sequence
/// number, only written when the tile uses SOP markers.
pub fn encode_packet(
    tile: &mut Tile,
    id: PacketId,
    dest: &mut [u8],
    seq: u16,
) -> Result<usize, J2kError> {
    let packet_style = tile.packet_style;
    let layno = id.layer;
    let resolution = resolution_mut(tile, id)?;
    let mut pos = 0;

    if packet_style.sop {
        if dest.len() < SOP_BYTES {
            return Err(J2kError::DestinationTooSmall);
        }
        let [m0, m1] = SOP_MARKER.to_be_bytes();
        let [l0, l1] = SOP_SEGMENT_LENGTH.to_be_bytes();
        let [s0, s1] = seq.to_be_bytes();
        dest[..SOP_BYTES].copy_from_slice(&[m0, m1, l0, l1, s0, s1]);
        pos = SOP_BYTES;
    }

    for band in resolution.bands.iter_mut().filter(|b| !b.is_empty()) {
        let band_numbps = band.numbps;
        let precinct = band.precincts.get_mut(id.precinct).ok_or(J2kError::InvalidArgument)?;
        if layno == 0 {
            precinct.inclusion_tree.reset();
            precinct.imsb_tree.reset();
            for (cblkno, cblk) in precinct.codeblocks.iter_mut().enumerate() {
                cblk.num_passes_coded = 0;
                let imsb = band_numbps.checked_sub(cblk.numbps).ok_or(J2kError::TooManyBitplanes)?;
                precinct.imsb_tree.set_value(cblkno, imsb as i32);
            }
        }
        for (cblkno, cblk) in precinct.codeblocks.iter().enumerate() {
            let contributes = cblk.layers.get(layno).is_some_and(|l| l.num_passes > 0);
            if cblk.num_passes_coded == 0 && contributes {
                precinct.inclusion_tree.set_value(cblkno, layno as i32);
            }
        }
    }

    let present = resolution
        .bands
        .iter()
        .filter(|b| !b.is_empty())
        .filter_map(|b| b.precincts.get(id.precinct))
        .flat_map(|p| p.codeblocks.iter())
        .any(|c| c.layers.get(layno).is_some_and(|l| l.num_passes > 0));

    let header_len = {
        let mut writer = J2kBitWriter::new(&mut dest[pos..]);
        writer.write_bit(present as u32)?;
        if present {
            for band in resolution.bands.iter_mut().filter(|b| !b.is_empty()) {
                let precinct = band
                    .precincts
                    .get_mut(id.precinct)
                    .ok_or(J2kError::InvalidArgument)?;
                for (cblkno, cblk) in precinct.codeblocks.iter_mut().enumerate() {
                    let layer = cblk.layers.get(layno).copied().unwrap_or_default();
                    if cblk.num_passes_coded == 0 {
                        precinct
                            .inclusion_tree
                            .encode_threshold(&mut writer, cblkno, layno as i32 + 1)?;
                    } else {
                        writer.write_bit((layer.num_passes != 0) as u32)?;
                    }
                    if layer.num_passes == 0 {
                        continue;
                    }
                    if cblk.num_passes_coded == 0 {
                        cblk.num_len_bits = INITIAL_LBLOCK;
                        precinct
                            .imsb_tree
                            .encode_threshold(&mut writer, cblkno, TAG_TREE_UNKNOWN)?;
                    }
                    encode_num_passes(&mut writer, layer.num_passes)?;

                    let first = cblk.num_passes_coded as usize;
                    let last = first + layer.num_passes as usize;
                    let passes = cblk.passes.get(first..last).ok_or(J2kError::TooManyPasses)?;

                    // Codeword segments end at terminated passes and at the end of the layer.
                    let mut segments = Vec::new();
                    let (mut nump, mut len) = (0u32, 0usize);
                    for (i, pass) in passes.iter().enumerate() {
                        nump += 1;
                        len += pass.len;
                        if pass.term || i == passes.len() - 1 {
                            segments.push((nump, len));
                            nump = 0;
                            len = 0;
                        }
                    }

                    let increment = segments
                        .iter()
                        .map(|&(nump, len)| {
                            (floor_log2(len as u32) + 1)
                                .saturating_sub(cblk.num_len_bits + floor_log2(nump))
                        })
                        .max()
                        .unwrap_or(0);
                    encode_comma_code(&mut writer, increment)?;
                    cblk.num_len_bits += increment;

                    for &(nump, len) in &segments {
                        writer.write_bits(len as u32, cblk.num_len_bits + floor_log2(nump))?;
                    }
                }
            }
        }
        writer.flush()?;
        writer.num_bytes()
    };
    pos += header_len;

    if packet_style.eph {
        let end = pos + EPH_BYTES;
        if end > dest.len() {
            return Err(J2kError::DestinationTooSmall);
        }
        dest[pos..end].copy_from_slice(&EPH_MARKER.to_be_bytes());
        pos = end;
    }

    for band in resolution.bands.iter_mut().filter(|b| !b.is_empty()) {
        let precinct = band.precincts.get_mut(id.precinct).ok_or(J2kError::InvalidArgument)?;
        for cblk in precinct.codeblocks.iter_mut() {
            let Some(layer) = cblk.layers.get(layno).copied() else {
                continue;
            };
            if layer.num_passes == 0 {
                continue;
            }
            let bytes = cblk
                .data
                .get(layer.data_offset..layer.data_offset + layer.len)
                .ok_or(J2kError::CodeBlockDataOverflow)?;
            let end = pos + layer.len;
            if end > dest.len() {
                return Err(J2kError::DestinationTooSmall);
            }
            dest[pos..end].copy_from_slice(bytes);
            pos = end;
            cblk.num_passes_coded += layer.num_passes;
        }
    }

    trace!(
        "packet l{} r{} c{} p{}: {} bytes, header {}",
        id.layer, id.resolution, id.component, id.precinct, pos, header_len
    );
    Ok(pos)
}

/// Read one packet from the start of `src` and return the number of bytes it took.
///
/// Header fields update the code-blocks' inclusion state, bit-plane count and segment
/// bookkeeping; body bytes are appended to `CodeBlock::data`. A body shorter than the
/// header announces fails with `TruncatedPacket`.
pub fn decode_packet(
    tile: &mut Tile,
    id: PacketId,
    src: &[u8],
    config: &DecoderConfig,
) -> Result<usize, J2kError> {
    let packet_style = tile.packet_style;
    let layno = id.layer;
    let component = tile.components.get_mut(id.component).ok_or(J2kError::InvalidArgument)?;
    let (style, roishift) = (component.style, component.roishift);
    let resolution = component.resolutions.get_mut(id.resolution).ok_or(J2kError::InvalidArgument)?;
    let mut pos = 0;

    for band in resolution.bands.iter_mut().filter(|b| !b.is_empty()) {
        let precinct = band.precincts.get_mut(id.precinct).ok_or(J2kError::InvalidArgument)?;
        if layno == 0 {
            precinct.inclusion_tree.reset();
            precinct.imsb_tree.reset();
            for cblk in precinct.codeblocks.iter_mut() {
                cblk.data.clear();
                cblk.segments.clear();
                cblk.passes.clear();
                cblk.layers.clear();
                cblk.numbps = 0;
                cblk.num_len_bits = 0;
                cblk.corrupted = false;
            }
        }
        for cblk in precinct.codeblocks.iter_mut() {
            cblk.pending.clear();
        }
    }

    if packet_style.sop {
        if src.starts_with(&SOP_MARKER.to_be_bytes()) {
            if src.len() < SOP_BYTES {
                return Err(J2kError::TruncatedPacket);
            }
            pos = SOP_BYTES;
        } else {
            warn!(
                "expected SOP marker before packet l{} r{} c{} p{}",
                id.layer, id.resolution, id.component, id.precinct
            );
        }
    }

    let mut reader = J2kBitReader::new(&src[pos..]);
    let present = reader.read_bit()? == 1;
    if present {
        for band in resolution.bands.iter_mut().filter(|b| !b.is_empty()) {
            let band_numbps = band.numbps;
            let precinct = band.precincts.get_mut(id.precinct).ok_or(J2kError::InvalidArgument)?;
            for (cblkno, cblk) in precinct.codeblocks.iter_mut().enumerate() {
                let included = if cblk.num_len_bits == 0 {
                    precinct
                        .inclusion_tree
                        .decode_threshold(&mut reader, cblkno, layno as i32 + 1)?
                } else {
                    reader.read_bit()? == 1
                };
                if !included {
                    continue;
                }

                if cblk.num_len_bits == 0 {
                    let mut i = 1;
                    while !precinct.imsb_tree.decode_threshold(&mut reader, cblkno, i)? {
                        i += 1;
                        if i as u32 > band_numbps + 1 {
                            return Err(J2kError::InvalidPacketHeader);
                        }
                    }
                    cblk.numbps = band_numbps - (i as u32 - 1);
                    cblk.num_len_bits = INITIAL_LBLOCK;
                }

                let n = decode_num_passes(&mut reader)?;
                let max_passes = (3 * (cblk.numbps + roishift)).saturating_sub(2);
                if cblk.num_passes_decoded() + n > max_passes {
                    return Err(J2kError::TooManyPasses);
                }

                cblk.num_len_bits += decode_comma_code(&mut reader)?;
                if cblk.num_len_bits > 32 {
                    return Err(J2kError::InvalidPacketHeader);
                }

                let (mut continues, mut max, mut filled) = match cblk.segments.last() {
                    None => (false, segment_max_passes(style, None), 0),
                    Some(s) if s.num_passes >= s.max_passes => {
                        (false, segment_max_passes(style, Some(s.max_passes)), 0)
                    }
                    Some(s) => (true, s.max_passes, s.num_passes),
                };
                let mut remaining = n;
                while remaining > 0 {
                    let nump = (max - filled).min(remaining);
                    let len = reader.read_bits(cblk.num_len_bits + floor_log2(nump))? as usize;
                    cblk.pending.push(SegmentChunk {
                        continues,
                        max_passes: max,
                        num_passes: nump,
                        len,
                    });
                    remaining -= nump;
                    if remaining > 0 {
                        max = segment_max_passes(style, Some(max));
                        filled = 0;
                        continues = false;
                    }
                }
            }
        }
    }
    reader.align()?;
    pos += reader.position();

    if packet_style.eph {
        if src[pos..].starts_with(&EPH_MARKER.to_be_bytes()) {
            pos += EPH_BYTES;
        } else {
            warn!(
                "expected EPH marker after header of packet l{} r{} c{} p{}",
                id.layer, id.resolution, id.component, id.precinct
            );
        }
    }

    for band in resolution.bands.iter_mut().filter(|b| !b.is_empty()) {
        let precinct = band.precincts.get_mut(id.precinct).ok_or(J2kError::InvalidArgument)?;
        for cblk in precinct.codeblocks.iter_mut() {
            let mut layer = Layer {
                data_offset: cblk.data.len(),
                ..Default::default()
            };
            for chunk in std::mem::take(&mut cblk.pending) {
                let end = pos + chunk.len;
                if end > src.len() {
                    return Err(J2kError::TruncatedPacket);
                }
                if !cblk.corrupted && cblk.data.len() + chunk.len > config.max_codeblock_bytes {
                    warn!(
                        "code-block exceeds {} coded bytes, ignoring its remaining data",
                        config.max_codeblock_bytes
                    );
                    cblk.corrupted = true;
                }
                let last = if chunk.continues { cblk.segments.last_mut() } else { None };
                let segment_full = if let Some(segment) = last {
                    segment.len += chunk.len;
                    segment.num_passes += chunk.num_passes;
                    segment.num_passes >= segment.max_passes
                } else {
                    cblk.segments.push(Segment {
                        data_offset: cblk.data.len(),
                        len: chunk.len,
                        num_passes: chunk.num_passes,
                        max_passes: chunk.max_passes,
                    });
                    chunk.num_passes >= chunk.max_passes
                };
                if !cblk.corrupted {
                    cblk.data.extend_from_slice(&src[pos..end]);
                }
                record_passes(cblk, chunk, segment_full);
                layer.num_passes += chunk.num_passes;
                layer.len += chunk.len;
                pos = end;
            }
            cblk.layers.resize(layno, Layer::default());
            cblk.layers.push(layer);
        }
    }

    trace!(
        "packet l{} r{} c{} p{}: {} bytes",
        id.layer, id.resolution, id.component, id.precinct, pos
    );
    Ok(pos)
}

/// Write the packets of the first `max_layers` layers in the tile's progression order.
pub fn encode_packets(
    tile: &mut Tile,
    dest: &mut [u8],
    max_layers: usize,
) -> Result<usize, J2kError> {
    let mut pos = 0;
    let mut seq = 0u16;
    let mut count = 0;
    for id in packet_order(tile).into_iter().filter(|p| p.layer < max_layers) {
        pos += encode_packet(tile, id, &mut dest[pos..], seq)?;
        seq = seq.wrapping_add(1);
        count += 1;
    }
    debug!("tier-2 encoded {count} packets, {pos} bytes, {:?} order", tile.progression);
    Ok(pos)
}

/// How the packet sequence of a tile ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier2Status {
    /// Every packet of the progression was read.
    Complete,
    /// The input ended on a packet boundary before the last packet.
    EndOfData,
    /// The input ended inside a packet; code-blocks keep what was read before it.
    Truncated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tier2Outcome {
    pub status: Tier2Status,
    pub bytes_read: usize,
    pub packets_decoded: usize,
}

/// Read the packets of a tile in its progression order until they or the input run out.
/// Truncation is reported in the outcome; a corrupt packet header is an error.
pub fn decode_packets(
    tile: &mut Tile,
    src: &[u8],
    config: &DecoderConfig,
) -> Result<Tier2Outcome, J2kError> {
    let mut outcome = Tier2Outcome {
        status: Tier2Status::Complete,
        bytes_read: 0,
        packets_decoded: 0,
    };
    for id in packet_order(tile) {
        if outcome.bytes_read >= src.len() {
            outcome.status = Tier2Status::EndOfData;
            break;
        }
        match decode_packet(tile, id, &src[outcome.bytes_read..], config) {
            Ok(n) => {
                outcome.bytes_read += n;
                outcome.packets_decoded += 1;
                let component = &mut tile.components[id.component];
                component.resno_decoded = component.resno_decoded.max(Some(id.resolution));
            }
            Err(J2kError::TruncatedPacket) => {
                warn!(
                    "packet l{} r{} c{} p{} truncated after {} bytes",
                    id.layer, id.resolution, id.component, id.precinct, outcome.bytes_read
                );
                outcome.status = Tier2Status::Truncated;
                break;
            }
            Err(e) => return Err(e),
        }
    }
    debug!(
        "tier-2 decoded {} packets, {} bytes, {:?}",
        outcome.packets_decoded, outcome.bytes_read, outcome.status
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding_parameters::PacketStyle;
    use crate::jpeg2000::image::{
        Band, CodeBlock, Layer, Pass, PassType, Precinct, SubbandOrientation, TileComponent,
    };
    use crate::jpeg2000::progression::ProgressionOrder;

    fn write_num_passes(n: u32) -> (Vec<u8>, usize) {
        let mut buffer = [0u8; 8];
        let mut writer = J2kBitWriter::new(&mut buffer);
        encode_num_passes(&mut writer, n).unwrap();
        writer.write_bits(0x5, 3).unwrap();
        writer.flush().unwrap();
        let len = writer.num_bytes();
        (buffer[..len].to_vec(), len)
    }

    #[test]
    fn test_num_passes_code_boundaries() {
        for n in [1, 2, 3, 5, 6, 36, 37, 164] {
            let (bytes, _) = write_num_passes(n);
            let mut reader = J2kBitReader::new(&bytes);
            assert_eq!(decode_num_passes(&mut reader).unwrap(), n, "passes {n}");
            assert_eq!(reader.read_bits(3).unwrap(), 0x5);
        }
    }

    #[test]
    fn test_num_passes_code_bits() {
        let bits = |n: u32| {
            let (bytes, _) = write_num_passes(n);
            let byte = |i: usize| bytes.get(i).copied().unwrap_or(0);
            u32::from_be_bytes([byte(0), byte(1), byte(2), 0])
        };
        assert_eq!(bits(1) >> 31, 0b0);
        assert_eq!(bits(2) >> 30, 0b10);
        assert_eq!(bits(3) >> 28, 0b1100);
        assert_eq!(bits(5) >> 28, 0b1110);
        assert_eq!(bits(6) >> 23, 0b1_1110_0000);
        assert_eq!(bits(36) >> 23, 0b1_1111_1110);
    }

    #[test]
    fn test_num_passes_out_of_range() {
        let mut buffer = [0u8; 8];
        let mut writer = J2kBitWriter::new(&mut buffer);
        assert_eq!(encode_num_passes(&mut writer, 0), Err(J2kError::TooManyPasses));
        assert_eq!(encode_num_passes(&mut writer, 165), Err(J2kError::TooManyPasses));
    }

    #[test]
    fn test_comma_code() {
        for n in 0..4 {
            let mut buffer = [0u8; 4];
            let mut writer = J2kBitWriter::new(&mut buffer);
            encode_comma_code(&mut writer, n).unwrap();
            writer.write_bit(1).unwrap();
            writer.flush().unwrap();
            let len = writer.num_bytes();
            let mut reader = J2kBitReader::new(&buffer[..len]);
            assert_eq!(decode_comma_code(&mut reader).unwrap(), n);
            assert_eq!(reader.read_bit().unwrap(), 1);
        }
    }

    #[test]
    fn test_floor_log2() {
        assert_eq!(floor_log2(0), 0);
        assert_eq!(floor_log2(1), 0);
        assert_eq!(floor_log2(2), 1);
        assert_eq!(floor_log2(255), 7);
        assert_eq!(floor_log2(256), 8);
    }

    #[test]
    fn test_segment_max_passes() {
        let plain = CodeBlockStyle::default();
        assert_eq!(segment_max_passes(plain, None), 109);
        assert_eq!(segment_max_passes(plain, Some(109)), 109);

        let termall = CodeBlockStyle::from_byte(CodeBlockStyle::TERMALL | CodeBlockStyle::BYPASS);
        assert_eq!(segment_max_passes(termall, None), 1);

        let bypass = CodeBlockStyle::from_byte(CodeBlockStyle::BYPASS);
        let mut seq = vec![segment_max_passes(bypass, None)];
        for _ in 0..4 {
            seq.push(segment_max_passes(bypass, seq.last().copied()));
        }
        assert_eq!(seq, vec![10, 2, 1, 2, 1]);
    }

    // One 4x4 code-block with two bit-planes, four passes and two layers of two passes.
    fn coded_block() -> CodeBlock {
        let mut cblk = CodeBlock::new(0, 0, 4, 4);
        cblk.numbps = 2;
        cblk.data = (1..=10).collect();
        let lens = [3, 2, 4, 1];
        let mut rate = 0;
        cblk.passes = lens
            .iter()
            .enumerate()
            .map(|(i, &len)| {
                rate += len;
                Pass {
                    pass_type: [
                        PassType::Cleanup,
                        PassType::Significance,
                        PassType::Refinement,
                    ][i % 3],
                    rate,
                    len,
                    distortion_dec: i as f64,
                    term: i == lens.len() - 1,
                }
            })
            .collect();
        cblk.layers = vec![
            Layer {
                num_passes: 2,
                len: 5,
                data_offset: 0,
                distortion: 1.0,
            },
            Layer {
                num_passes: 2,
                len: 5,
                data_offset: 5,
                distortion: 5.0,
            },
        ];
        cblk
    }

    fn single_block_tile(cblk: CodeBlock, band_numbps: u32) -> Tile {
        let mut band = Band::new(SubbandOrientation::LL, 0, 0, 4, 4, band_numbps);
        band.precincts = vec![Precinct::new(1, 1, vec![cblk])];
        let component =
            TileComponent::new(vec![Resolution::new(1, 1, vec![band])], CodeBlockStyle::default());
        Tile::new(vec![component], 2, ProgressionOrder::Lrcp)
    }

    fn first_block(tile: &Tile) -> &CodeBlock {
        tile.codeblocks().next().unwrap()
    }

    #[test]
    fn test_packet_roundtrip_two_layers() {
        let mut tile = single_block_tile(coded_block(), 4);
        let mut buffer = [0u8; 64];
        let n = encode_packets(&mut tile, &mut buffer, 2).unwrap();
        assert_eq!(first_block(&tile).num_passes_coded, 4);

        let mut decoded = single_block_tile(CodeBlock::new(0, 0, 4, 4), 4);
        let outcome = decode_packets(&mut decoded, &buffer[..n], &DecoderConfig::default())
            .unwrap();
        assert_eq!(outcome.status, Tier2Status::Complete);
        assert_eq!(outcome.bytes_read, n);
        assert_eq!(outcome.packets_decoded, 2);

        let cblk = first_block(&decoded);
        assert_eq!(cblk.numbps, 2);
        assert_eq!(cblk.data, (1..=10).collect::<Vec<u8>>());
        assert_eq!(
            cblk.segments,
            vec![Segment {
                data_offset: 0,
                len: 10,
                num_passes: 4,
                max_passes: 109,
            }]
        );
        assert_eq!(decoded.components[0].resno_decoded, Some(0));
    }

    #[test]
    fn test_decoded_tile_reencodes_identically() {
        let mut tile = single_block_tile(coded_block(), 4);
        let mut buffer = [0u8; 64];
        let n = encode_packets(&mut tile, &mut buffer, 2).unwrap();

        let mut decoded = single_block_tile(CodeBlock::new(0, 0, 4, 4), 4);
        decode_packets(&mut decoded, &buffer[..n], &DecoderConfig::default())
            .unwrap();
        let cblk = first_block(&decoded);
        let layers: Vec<(u32, usize, usize)> =
            cblk.layers.iter().map(|l| (l.num_passes, l.len, l.data_offset)).collect();
        assert_eq!(layers, vec![(2, 5, 0), (2, 5, 5)]);
        assert_eq!(cblk.passes.len(), 4);
        assert_eq!(cblk.passes[1].rate, 5);
        assert_eq!(cblk.passes[3].rate, 10);

        let mut again = [0u8; 64];
        let m = encode_packets(&mut decoded, &mut again, 2).unwrap();
        assert_eq!(&again[..m], &buffer[..n]);
    }

    #[test]
    fn test_empty_packet_is_one_zero_byte() {
        let mut cblk = coded_block();
        cblk.layers[0] = Layer::default();
        cblk.layers[1].num_passes = 4;
        cblk.layers[1].len = 10;
        cblk.layers[1].data_offset = 0;
        let mut tile = single_block_tile(cblk, 4);
        let mut buffer = [0u8; 64];
        let first = encode_packet(&mut tile, PacketId::default(), &mut buffer, 0).unwrap();
        assert_eq!(&buffer[..first], &[0x00]);

        let second = PacketId { layer: 1, ..Default::default() };
        let n = first + encode_packet(&mut tile, second, &mut buffer[first..], 1).unwrap();
        let mut decoded = single_block_tile(CodeBlock::new(0, 0, 4, 4), 4);
        let outcome = decode_packets(&mut decoded, &buffer[..n], &DecoderConfig::default())
            .unwrap();
        assert_eq!(outcome.status, Tier2Status::Complete);
        assert_eq!(first_block(&decoded).num_passes_decoded(), 4);
        assert_eq!(first_block(&decoded).data.len(), 10);
    }

    #[test]
    fn test_sop_and_eph_markers() {
        let mut tile = single_block_tile(coded_block(), 4);
        tile.packet_style = PacketStyle { sop: true, eph: true };
        let mut buffer = [0u8; 64];
        let n = encode_packets(&mut tile, &mut buffer, 2).unwrap();
        assert_eq!(&buffer[..6], &[0xff, 0x91, 0x00, 0x04, 0x00, 0x00]);
        let second = buffer[6..n].windows(2).position(|w| w == [0xff, 0x91]).unwrap() + 6;
        assert_eq!(&buffer[second + 4..second + 6], &[0x00, 0x01]);
        assert!(buffer[6..second].windows(2).any(|w| w == [0xff, 0x92]));

        let mut decoded = single_block_tile(CodeBlock::new(0, 0, 4, 4), 4);
        decoded.packet_style = tile.packet_style;
        let outcome = decode_packets(&mut decoded, &buffer[..n], &DecoderConfig::default())
            .unwrap();
        assert_eq!(outcome.status, Tier2Status::Complete);
        assert_eq!(first_block(&decoded).data, (1..=10).collect::<Vec<u8>>());
    }

    #[test]
    fn test_truncated_body_and_end_of_data() {
        let mut tile = single_block_tile(coded_block(), 4);
        let mut buffer = [0u8; 64];
        let first = encode_packet(&mut tile, PacketId::default(), &mut buffer, 0).unwrap();
        let second = PacketId { layer: 1, ..Default::default() };
        let n = first + encode_packet(&mut tile, second, &mut buffer[first..], 1).unwrap();

        let mut decoded = single_block_tile(CodeBlock::new(0, 0, 4, 4), 4);
        let config = DecoderConfig::default();
        let outcome = decode_packets(&mut decoded, &buffer[..first], &config).unwrap();
        assert_eq!(outcome.status, Tier2Status::EndOfData);
        assert_eq!(outcome.packets_decoded, 1);

        let mut decoded = single_block_tile(CodeBlock::new(0, 0, 4, 4), 4);
        let outcome = decode_packets(&mut decoded, &buffer[..n - 1], &config).unwrap();
        assert_eq!(outcome.status, Tier2Status::Truncated);
        assert_eq!(outcome.packets_decoded, 1);
        assert_eq!(first_block(&decoded).data, vec![1, 2, 3, 4, 5]);

        let mut decoded = single_block_tile(CodeBlock::new(0, 0, 4, 4), 4);
        let packet =
            decode_packet(&mut decoded, PacketId::default(), &buffer[..first - 1], &config);
        assert_eq!(packet, Err(J2kError::TruncatedPacket));
    }

    #[test]
    fn test_destination_too_small() {
        let mut tile = single_block_tile(coded_block(), 4);
        let mut buffer = [0u8; 4];
        assert_eq!(
            encode_packet(&mut tile, PacketId::default(), &mut buffer, 0),
            Err(J2kError::DestinationTooSmall)
        );
    }

    #[test]
    fn test_block_deeper_than_band() {
        let mut tile = single_block_tile(coded_block(), 1);
        let mut buffer = [0u8; 64];
        assert_eq!(
            encode_packet(&mut tile, PacketId::default(), &mut buffer, 0),
            Err(J2kError::TooManyBitplanes)
        );
    }

    #[test]
    fn test_degenerate_band_is_skipped() {
        let mut tile = single_block_tile(coded_block(), 4);
        let mut empty = Band::new(SubbandOrientation::HL, 2, 0, 2, 4, 4);
        empty.precincts = vec![Precinct::empty()];
        tile.components[0].resolutions[0].bands.insert(0, empty);
        let mut buffer = [0u8; 64];
        let n = encode_packets(&mut tile, &mut buffer, 2).unwrap();

        let mut decoded = single_block_tile(CodeBlock::new(0, 0, 4, 4), 4);
        let mut empty = Band::new(SubbandOrientation::HL, 2, 0, 2, 4, 4);
        empty.precincts = vec![Precinct::empty()];
        decoded.components[0].resolutions[0].bands.insert(0, empty);
        let outcome = decode_packets(&mut decoded, &buffer[..n], &DecoderConfig::default())
            .unwrap();
        assert_eq!(outcome.status, Tier2Status::Complete);
        assert_eq!(first_block(&decoded).data.len(), 10);
    }

    #[test]
    fn test_oversized_block_marked_corrupted() {
        let mut tile = single_block_tile(coded_block(), 4);
        let mut buffer = [0u8; 64];
        let n = encode_packets(&mut tile, &mut buffer, 2).unwrap();

        let mut decoded = single_block_tile(CodeBlock::new(0, 0, 4, 4), 4);
        let config = DecoderConfig { max_codeblock_bytes: 6 };
        let outcome = decode_packets(&mut decoded, &buffer[..n], &config).unwrap();
        assert_eq!(outcome.status, Tier2Status::Complete);
        let cblk = first_block(&decoded);
        assert!(cblk.corrupted);
        assert_eq!(cblk.data.len(), 5);
        assert_eq!(cblk.num_passes_decoded(), 4);
    }

    #[test]
    fn test_header_with_too_many_passes() {
        // present, included at layer 0, imsb 0, then 37 + 127 passes for a two-plane block
        let mut buffer = [0u8; 8];
        let mut writer = J2kBitWriter::new(&mut buffer);
        writer.write_bits(0b111, 3).unwrap();
        encode_num_passes(&mut writer, 164).unwrap();
        writer.flush().unwrap();
        let n = writer.num_bytes();

        let mut decoded = single_block_tile(CodeBlock::new(0, 0, 4, 4), 2);
        assert_eq!(
            decode_packets(&mut decoded, &buffer[..n], &DecoderConfig::default()),
            Err(J2kError::TooManyPasses)
        );
    }
}
