// Synthetic tiles shared by the integration tests.
#![allow(dead_code)]

use j2k_ebcot::jpeg2000::bit_plane_coder::{decode_codeblocks, encode_codeblocks, Tier1DecodeReport};
use j2k_ebcot::jpeg2000::norms::{dwt_norm, mct_norm};
use j2k_ebcot::jpeg2000::packet::{decode_packets, encode_packets};
use j2k_ebcot::jpeg2000::rate_control::{allocate_layers, AllocationReport};
use j2k_ebcot::{
    AllocationStrategy, Band, CodeBlock, CodeBlockStyle, DecoderConfig, LayerTarget, Precinct,
    ProgressionOrder, Resolution, SubbandOrientation, Tier2Outcome, Tile, TileComponent, Transform,
};

pub const BLOCK: u32 = 16;
pub const BAND_NUMBPS: u32 = 12;

pub struct Lcg(u32);

impl Lcg {
    pub fn new(seed: u32) -> Self {
        Self(seed)
    }

    pub fn next(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(1_103_515_245).wrapping_add(12345);
        (self.0 >> 16) & 0x7fff
    }

    /// Uniform in `-amplitude..=amplitude`.
    pub fn signed(&mut self, amplitude: i32) -> i32 {
        (self.next() as i32 % (2 * amplitude + 1)) - amplitude
    }
}

/// Wavelet-like block: mostly small values with occasional large ones.
pub fn noise(rng: &mut Lcg, count: usize, amplitude: i32) -> Vec<i32> {
    (0..count)
        .map(|_| {
            let v = rng.signed(amplitude);
            if rng.next() % 4 == 0 { v } else { v / 8 }
        })
        .collect()
}

fn block(rng: &mut Lcg, x0: u32, amplitude: i32) -> CodeBlock {
    let mut cblk = CodeBlock::new(x0, 0, x0 + BLOCK, BLOCK);
    cblk.coefficients = if amplitude == 0 {
        vec![0; (BLOCK * BLOCK) as usize]
    } else {
        noise(rng, (BLOCK * BLOCK) as usize, amplitude)
    };
    cblk
}

/// Two resolutions per component. Resolution 0 holds an LL band with two code-blocks in
/// one precinct; resolution 1 holds HL, LH and HH bands split over two precincts of one
/// code-block each. The second HH code-block is all zero. With `degenerate` the HL band
/// has zero width.
pub fn synthetic_tile(
    components: usize,
    progression: ProgressionOrder,
    style: CodeBlockStyle,
    degenerate: bool,
    seed: u32,
) -> Tile {
    let mut rng = Lcg::new(seed);
    let transform = Transform::Reversible53;
    let comps = (0..components)
        .map(|compno| {
            let mut ll = Band::new(SubbandOrientation::LL, 0, 0, 2 * BLOCK, BLOCK, BAND_NUMBPS);
            ll.norm = dwt_norm(transform, 1, SubbandOrientation::LL);
            ll.precincts = vec![Precinct::new(
                2,
                1,
                vec![block(&mut rng, 0, 1500), block(&mut rng, BLOCK, 1500)],
            )];
            let res0 = Resolution::new(1, 1, vec![ll]);

            let bands = [SubbandOrientation::HL, SubbandOrientation::LH, SubbandOrientation::HH]
                .into_iter()
                .map(|orientation| {
                    if degenerate && orientation == SubbandOrientation::HL {
                        let mut band = Band::new(orientation, BLOCK, 0, BLOCK, BLOCK, BAND_NUMBPS);
                        band.precincts = vec![Precinct::empty(), Precinct::empty()];
                        return band;
                    }
                    let mut band = Band::new(orientation, 0, 0, 2 * BLOCK, BLOCK, BAND_NUMBPS);
                    band.norm = dwt_norm(transform, 0, orientation);
                    let second = if orientation == SubbandOrientation::HH { 0 } else { 120 };
                    band.precincts = vec![
                        Precinct::new(1, 1, vec![block(&mut rng, 0, 120)]),
                        Precinct::new(1, 1, vec![block(&mut rng, BLOCK, second)]),
                    ];
                    band
                })
                .collect();
            let res1 = Resolution::new(2, 1, bands);

            let mut component = TileComponent::new(vec![res0, res1], style);
            component.transform = transform;
            component.mct_norm = mct_norm(transform, components == 3, compno);
            component
        })
        .collect();
    Tile::new(comps, 1, progression)
}

/// Copy of `tile` with geometry only, ready to receive packets.
pub fn skeleton(tile: &Tile) -> Tile {
    let mut empty = tile.clone();
    for cblk in empty.codeblocks_mut() {
        cblk.reset_coding_state();
        cblk.coefficients.clear();
    }
    for component in empty.components.iter_mut() {
        component.resno_decoded = None;
    }
    empty
}

pub fn coefficients(tile: &Tile) -> Vec<Vec<i32>> {
    tile.codeblocks().map(|c| c.coefficients.clone()).collect()
}

pub fn encode_tile(tile: &mut Tile, targets: &[LayerTarget]) -> (AllocationReport, Vec<u8>) {
    encode_codeblocks(tile).unwrap();
    let report = allocate_layers(tile, targets, AllocationStrategy::Bisection).unwrap();
    let stream = write_packets(tile, targets.len());
    (report, stream)
}

pub fn write_packets(tile: &mut Tile, max_layers: usize) -> Vec<u8> {
    let capacity = tile.codeblocks().map(|c| c.data.len()).sum::<usize>() + 4096;
    let mut buffer = vec![0u8; capacity];
    let n = encode_packets(tile, &mut buffer, max_layers).unwrap();
    buffer.truncate(n);
    buffer
}

pub fn decode_tile(skeleton: &mut Tile, stream: &[u8]) -> (Tier2Outcome, Tier1DecodeReport) {
    let outcome = decode_packets(skeleton, stream, &DecoderConfig::default()).unwrap();
    let report = decode_codeblocks(skeleton);
    (outcome, report)
}

/// Sum of squared differences over every code-block.
pub fn squared_error(a: &Tile, b: &Tile) -> f64 {
    a.codeblocks()
        .zip(b.codeblocks())
        .flat_map(|(x, y)| x.coefficients.iter().zip(y.coefficients.iter()))
        .map(|(&p, &q)| {
            let d = (p - q) as f64;
            d * d
        })
        .sum()
}
