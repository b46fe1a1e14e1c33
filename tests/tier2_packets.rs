mod common;

use common::*;
use j2k_ebcot::jpeg2000::packet::{decode_packets, encode_packet};
use j2k_ebcot::jpeg2000::progression::packet_order;
use j2k_ebcot::{
    CodeBlockStyle, DecoderConfig, LayerTarget, PacketStyle, ProgressionOrder, Tier2Status,
};

const ORDERS: [ProgressionOrder; 5] = [
    ProgressionOrder::Lrcp,
    ProgressionOrder::Rlcp,
    ProgressionOrder::Rpcl,
    ProgressionOrder::Pcrl,
    ProgressionOrder::Cprl,
];

fn targets() -> Vec<LayerTarget> {
    vec![
        LayerTarget::RateBudget(300),
        LayerTarget::RateBudget(1500),
        LayerTarget::All,
    ]
}

#[test]
fn test_every_progression_is_lossless() {
    for order in ORDERS {
        let mut tile = synthetic_tile(3, order, CodeBlockStyle::default(), false, 7);
        let (_, stream) = encode_tile(&mut tile, &targets());

        let mut decoded = skeleton(&tile);
        let (outcome, report) = decode_tile(&mut decoded, &stream);
        assert_eq!(outcome.status, Tier2Status::Complete, "{order:?}");
        assert_eq!(outcome.bytes_read, stream.len(), "{order:?}");
        assert_eq!(outcome.packets_decoded, packet_order(&tile).len(), "{order:?}");
        assert_eq!(report.corrupted, 0);
        assert_eq!(coefficients(&decoded), coefficients(&tile), "{order:?}");
        assert!(decoded.components.iter().all(|c| c.resno_decoded == Some(1)));
    }
}

#[test]
fn test_decoded_stream_rewrites_in_another_order() {
    let mut tile = synthetic_tile(2, ProgressionOrder::Lrcp, CodeBlockStyle::default(), false, 11);
    let (_, lrcp_stream) = encode_tile(&mut tile, &targets());

    let mut decoded = skeleton(&tile);
    decode_tile(&mut decoded, &lrcp_stream);
    assert_eq!(coefficients(&decoded), coefficients(&tile));

    // Same order writes the same bytes back.
    assert_eq!(write_packets(&mut decoded, 3), lrcp_stream);

    decoded.progression = ProgressionOrder::Rlcp;
    let rlcp_stream = write_packets(&mut decoded, 3);
    assert_eq!(rlcp_stream.len(), lrcp_stream.len());
    assert_ne!(rlcp_stream, lrcp_stream);

    let mut rlcp = skeleton(&decoded);
    let (outcome, _) = decode_tile(&mut rlcp, &rlcp_stream);
    assert_eq!(outcome.status, Tier2Status::Complete);
    assert_eq!(coefficients(&rlcp), coefficients(&tile));
    for (x, y) in rlcp.codeblocks().zip(tile.codeblocks()) {
        assert_eq!(x.data, y.data);
    }
}

#[test]
fn test_code_block_styles_survive_packets() {
    let styles = [
        CodeBlockStyle::BYPASS,
        CodeBlockStyle::TERMALL,
        CodeBlockStyle::BYPASS | CodeBlockStyle::TERMALL,
        CodeBlockStyle::BYPASS | CodeBlockStyle::RESET | CodeBlockStyle::SEGSYM,
        CodeBlockStyle::VSC | CodeBlockStyle::PREDICTABLE_TERMINATION,
        0x3f,
    ];
    for style in styles {
        let style_byte = CodeBlockStyle::from_byte(style);
        let mut tile = synthetic_tile(1, ProgressionOrder::Rpcl, style_byte, false, 3);
        tile.packet_style = PacketStyle { sop: true, eph: true };
        let (_, stream) = encode_tile(&mut tile, &targets());

        let mut decoded = skeleton(&tile);
        let (outcome, report) = decode_tile(&mut decoded, &stream);
        assert_eq!(outcome.status, Tier2Status::Complete, "style {style:#x}");
        assert_eq!(report.corrupted, 0, "style {style:#x}");
        assert_eq!(coefficients(&decoded), coefficients(&tile), "style {style:#x}");
    }
}

#[test]
fn test_sop_sequence_numbers() {
    let mut tile = synthetic_tile(1, ProgressionOrder::Lrcp, CodeBlockStyle::default(), false, 5);
    tile.packet_style = PacketStyle { sop: true, eph: false };
    let (_, stream) = encode_tile(&mut tile, &targets());
    assert_eq!(&stream[..6], &[0xff, 0x91, 0x00, 0x04, 0x00, 0x00]);

    // Packet bodies may contain FF 91 by chance; follow the packets one by one instead.
    let mut replay = tile.clone();
    let mut buffer = vec![0u8; stream.len()];
    let mut pos = 0;
    for (seq, id) in packet_order(&tile).into_iter().enumerate() {
        let n = encode_packet(&mut replay, id, &mut buffer[pos..], seq as u16).unwrap();
        assert_eq!(&stream[pos..pos + 4], &[0xff, 0x91, 0x00, 0x04]);
        assert_eq!(u16::from_be_bytes([stream[pos + 4], stream[pos + 5]]), seq as u16);
        pos += n;
    }
    assert_eq!(pos, stream.len());
    assert_eq!(buffer, stream);
}

#[test]
fn test_missing_markers_are_tolerated() {
    let mut tile = synthetic_tile(1, ProgressionOrder::Lrcp, CodeBlockStyle::default(), false, 9);
    let (_, stream) = encode_tile(&mut tile, &targets());

    // Written without markers, read as if both were announced.
    let mut decoded = skeleton(&tile);
    decoded.packet_style = PacketStyle { sop: true, eph: true };
    let (outcome, _) = decode_tile(&mut decoded, &stream);
    assert_eq!(outcome.status, Tier2Status::Complete);
    assert_eq!(coefficients(&decoded), coefficients(&tile));
}

#[test]
fn test_truncation_differs_from_end_of_data() {
    let mut tile = synthetic_tile(1, ProgressionOrder::Lrcp, CodeBlockStyle::default(), false, 13);
    encode_tile(&mut tile, &targets());

    let mut replay = tile.clone();
    let mut buffer = vec![0u8; 1 << 16];
    let mut boundaries = vec![0];
    for (seq, id) in packet_order(&tile).into_iter().enumerate() {
        let start = *boundaries.last().unwrap();
        let n = encode_packet(&mut replay, id, &mut buffer[start..], seq as u16).unwrap();
        boundaries.push(start + n);
    }

    // Cut on the boundary after the first layer's packets.
    let first_layer = packet_order(&tile).iter().filter(|p| p.layer == 0).count();
    let cut = boundaries[first_layer];
    let mut decoded = skeleton(&tile);
    let (outcome, _) = decode_tile(&mut decoded, &buffer[..cut]);
    assert_eq!(outcome.status, Tier2Status::EndOfData);
    assert_eq!(outcome.packets_decoded, first_layer);
    assert_eq!(outcome.bytes_read, cut);

    // Cut inside the largest packet body.
    let (largest, _) = boundaries
        .windows(2)
        .enumerate()
        .max_by_key(|(_, w)| w[1] - w[0])
        .unwrap();
    let cut = boundaries[largest + 1] - 1;
    let mut decoded = skeleton(&tile);
    let outcome = decode_packets(&mut decoded, &buffer[..cut], &DecoderConfig::default()).unwrap();
    assert_eq!(outcome.status, Tier2Status::Truncated);
    assert_eq!(outcome.packets_decoded, largest);
    assert_eq!(outcome.bytes_read, boundaries[largest]);
}

#[test]
fn test_fewer_layers_reconstruct_approximately() {
    let mut tile = synthetic_tile(1, ProgressionOrder::Lrcp, CodeBlockStyle::default(), false, 17);
    encode_tile(&mut tile, &targets());
    let zero = skeleton(&tile);
    let mut zero_decoded = zero.clone();
    j2k_ebcot::jpeg2000::bit_plane_coder::decode_codeblocks(&mut zero_decoded);
    let energy = squared_error(&tile, &zero_decoded);

    let stream = write_packets(&mut tile.clone(), 1);
    let mut decoded = skeleton(&tile);
    decoded.num_layers = 1;
    let (outcome, report) = decode_tile(&mut decoded, &stream);
    assert_eq!(outcome.status, Tier2Status::Complete);
    assert_eq!(report.corrupted, 0);
    let error = squared_error(&tile, &decoded);
    assert!(error > 0.0);
    assert!(error < energy);
}

#[test]
fn test_degenerate_band_is_skipped() {
    for order in ORDERS {
        let mut tile = synthetic_tile(2, order, CodeBlockStyle::default(), true, 19);
        let (_, stream) = encode_tile(&mut tile, &targets());

        let mut decoded = skeleton(&tile);
        let (outcome, _) = decode_tile(&mut decoded, &stream);
        assert_eq!(outcome.status, Tier2Status::Complete, "{order:?}");
        assert_eq!(coefficients(&decoded), coefficients(&tile), "{order:?}");
    }
}
