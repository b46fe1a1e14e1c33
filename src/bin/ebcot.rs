//! ebcot CLI - inspect the EBCOT stages on synthetic code-blocks.
//!
//! Useful for checking pass tables, layer allocation and packet round trips without a
//! full codestream around them.

use clap::{Parser, Subcommand, ValueEnum};
use j2k_ebcot::jpeg2000::bit_plane_coder::{
    BlockCodingParams, T1Encoder, decode_codeblocks, encode_codeblocks,
};
use j2k_ebcot::jpeg2000::norms::dwt_norm;
use j2k_ebcot::jpeg2000::packet::{decode_packets, encode_packets};
use j2k_ebcot::jpeg2000::rate_control::allocate_layers;
use j2k_ebcot::{
    AllocationStrategy, Band, CodeBlock, CodeBlockStyle, DecoderConfig, LayerTarget, PacketStyle,
    Precinct, ProgressionOrder, Resolution, SubbandOrientation, Tile, TileComponent, Transform,
};

/// EBCOT engine diagnostics: Tier-1 passes, PCRD-opt layers and Tier-2 packets
#[derive(Parser)]
#[command(name = "ebcot")]
#[command(version)]
#[command(about = "Inspect bit-plane coding, rate allocation and packet coding", long_about = None)]
#[command(after_help = "EXAMPLES:
    ebcot passes --pattern ramp --size 32
    ebcot allocate --budget 500 --budget 2000
    ebcot roundtrip --progression rpcl --style 0x01 --sop --eph")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode one code-block and print its coding passes
    #[command(visible_alias = "p")]
    Passes {
        #[arg(short, long, default_value = "noise", value_enum)]
        pattern: Pattern,

        /// Code-block width and height
        #[arg(short, long, default_value = "64")]
        size: u32,

        /// Largest coefficient magnitude
        #[arg(short, long, default_value = "1000")]
        amplitude: i32,

        /// Code-block style byte (SPcod)
        #[arg(long, default_value = "0", value_parser = parse_byte)]
        style: u8,
    },

    /// Encode a synthetic tile and form one quality layer per byte budget
    #[command(visible_alias = "a")]
    Allocate {
        /// Cumulative byte budget of a layer; repeat for more layers
        #[arg(short, long, required = true)]
        budget: Vec<usize>,

        /// Append a lossless layer after the budgets
        #[arg(long)]
        lossless: bool,

        #[arg(long, default_value = "bisection", value_enum)]
        strategy: Strategy,

        #[arg(long, default_value = "1")]
        seed: u32,
    },

    /// Run Tier-1, PCRD-opt, Tier-2 and back on a synthetic tile
    #[command(visible_alias = "r")]
    Roundtrip {
        #[arg(long, default_value = "lrcp")]
        progression: ProgressionOrder,

        #[arg(long, default_value = "0", value_parser = parse_byte)]
        style: u8,

        #[arg(long)]
        sop: bool,

        #[arg(long)]
        eph: bool,

        #[arg(short, long, default_value = "3")]
        layers: usize,

        #[arg(long, default_value = "1")]
        seed: u32,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Pattern {
    Constant,
    Ramp,
    Noise,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Strategy {
    Bisection,
    Greedy,
}

fn parse_byte(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x") {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| e.to_string())
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Passes {
            pattern,
            size,
            amplitude,
            style,
        } => show_passes(pattern, size, amplitude, style),
        Commands::Allocate {
            budget,
            lossless,
            strategy,
            seed,
        } => show_allocation(&budget, lossless, strategy, seed),
        Commands::Roundtrip {
            progression,
            style,
            sop,
            eph,
            layers,
            seed,
        } => roundtrip(progression, style, PacketStyle { sop, eph }, layers, seed),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

struct Lcg(u32);

impl Lcg {
    fn next_signed(&mut self, amplitude: i32) -> i32 {
        self.0 = self.0.wrapping_mul(1_103_515_245).wrapping_add(12345);
        let r = ((self.0 >> 16) & 0x7fff) as i32;
        r % (2 * amplitude + 1) - amplitude
    }
}

fn pattern_block(pattern: Pattern, w: u32, h: u32, amplitude: i32, rng: &mut Lcg) -> Vec<i32> {
    let amplitude = amplitude.max(1);
    let count = (w * h) as usize;
    match pattern {
        Pattern::Constant => vec![amplitude; count],
        Pattern::Ramp => (0..count)
            .map(|i| (i as i64 * 2 * amplitude as i64 / count as i64) as i32 - amplitude)
            .collect(),
        Pattern::Noise => (0..count).map(|_| rng.next_signed(amplitude)).collect(),
    }
}

fn show_passes(
    pattern: Pattern,
    size: u32,
    amplitude: i32,
    style: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = Lcg(1);
    let coefficients = pattern_block(pattern, size, size, amplitude, &mut rng);
    let mut cblk = CodeBlock::with_coefficients(size, size, coefficients);
    let params = BlockCodingParams {
        style: CodeBlockStyle::from_byte(style),
        ..Default::default()
    };
    let distortion = T1Encoder::new().encode_cblk(&mut cblk, &params)?;

    println!("Bit-planes: {}", cblk.numbps);
    println!("Passes:     {}", cblk.passes.len());
    println!("Bytes:      {}", cblk.data.len());
    println!();
    println!("{:>4}  {:<12} {:>8} {:>6} {:>16}  term", "pass", "type", "rate", "len", "distortion");
    for (i, pass) in cblk.passes.iter().enumerate() {
        println!(
            "{:>4}  {:<12} {:>8} {:>6} {:>16.3}  {}",
            i,
            format!("{:?}", pass.pass_type),
            pass.rate,
            pass.len,
            pass.distortion_dec,
            if pass.term { "yes" } else { "" }
        );
    }
    println!();
    println!("Distortion reduction: {:.3}", distortion);
    Ok(())
}

/// One component, two resolutions: an LL band of 2x1 code-blocks, then HL, LH and HH
/// bands split over two precincts.
fn synthetic_tile(style: CodeBlockStyle, seed: u32) -> Tile {
    const BLOCK: u32 = 32;
    let mut rng = Lcg(seed);
    let transform = Transform::Reversible53;
    let mut block = |x0: u32, amplitude: i32| {
        let mut cblk = CodeBlock::new(x0, 0, x0 + BLOCK, BLOCK);
        cblk.coefficients = pattern_block(Pattern::Noise, BLOCK, BLOCK, amplitude, &mut rng);
        cblk
    };

    let mut ll = Band::new(SubbandOrientation::LL, 0, 0, 2 * BLOCK, BLOCK, 14);
    ll.norm = dwt_norm(transform, 1, SubbandOrientation::LL);
    ll.precincts = vec![Precinct::new(2, 1, vec![block(0, 4000), block(BLOCK, 4000)])];

    let details = [SubbandOrientation::HL, SubbandOrientation::LH, SubbandOrientation::HH]
        .into_iter()
        .map(|orientation| {
            let mut band = Band::new(orientation, 0, 0, 2 * BLOCK, BLOCK, 14);
            band.norm = dwt_norm(transform, 0, orientation);
            band.precincts = vec![
                Precinct::new(1, 1, vec![block(0, 300)]),
                Precinct::new(1, 1, vec![block(BLOCK, 300)]),
            ];
            band
        })
        .collect();

    let mut component = TileComponent::new(
        vec![Resolution::new(1, 1, vec![ll]), Resolution::new(2, 1, details)],
        style,
    );
    component.transform = transform;
    Tile::new(vec![component], 1, ProgressionOrder::Lrcp)
}

fn show_allocation(
    budgets: &[usize],
    lossless: bool,
    strategy: Strategy,
    seed: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut tile = synthetic_tile(CodeBlockStyle::default(), seed);
    let distortion = encode_codeblocks(&mut tile)?;
    let total: usize = tile.codeblocks().map(|c| c.data.len()).sum();

    let mut targets: Vec<LayerTarget> =
        budgets.iter().map(|&b| LayerTarget::RateBudget(b)).collect();
    if lossless {
        targets.push(LayerTarget::All);
    }
    let strategy = match strategy {
        Strategy::Bisection => AllocationStrategy::Bisection,
        Strategy::Greedy => AllocationStrategy::Greedy,
    };
    let report = allocate_layers(&mut tile, &targets, strategy)?;

    println!("Code-blocks:  {}", tile.codeblocks().count());
    println!("Coded bytes:  {}", total);
    println!("Distortion:   {:.3}", distortion);
    println!();
    println!("{:>5} {:>14} {:>8} {:>16}  note", "layer", "threshold", "bytes", "distortion");
    for (i, layer) in report.layers.iter().enumerate() {
        println!(
            "{:>5} {:>14.6} {:>8} {:>16.3}  {}",
            i,
            layer.threshold,
            layer.rate,
            layer.distortion,
            if layer.best_effort { "best effort" } else { "" }
        );
    }
    Ok(())
}

fn roundtrip(
    progression: ProgressionOrder,
    style: u8,
    packet_style: PacketStyle,
    layers: usize,
    seed: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    if layers == 0 {
        return Err("at least one layer is required".into());
    }
    let mut tile = synthetic_tile(CodeBlockStyle::from_byte(style), seed);
    tile.progression = progression;
    tile.packet_style = packet_style;
    encode_codeblocks(&mut tile)?;

    // Budgets doubling up to half of the coded bytes, then everything.
    let total: usize = tile.codeblocks().map(|c| c.data.len()).sum();
    let mut targets: Vec<LayerTarget> = (1..layers)
        .map(|i| LayerTarget::RateBudget(total >> (layers - i)))
        .collect();
    targets.push(LayerTarget::All);
    allocate_layers(&mut tile, &targets, AllocationStrategy::Bisection)?;

    let mut stream = vec![0u8; total + 4096];
    let len = encode_packets(&mut tile, &mut stream, layers)?;
    stream.truncate(len);

    let mut decoded = tile.clone();
    for cblk in decoded.codeblocks_mut() {
        cblk.reset_coding_state();
        cblk.coefficients.clear();
    }
    let outcome = decode_packets(&mut decoded, &stream, &DecoderConfig::default())?;
    let report = decode_codeblocks(&mut decoded);

    let matches = tile
        .codeblocks()
        .zip(decoded.codeblocks())
        .all(|(a, b)| a.coefficients == b.coefficients);

    println!("Progression: {:?}", progression);
    println!("Layers:      {}", layers);
    println!("Stream:      {} bytes", len);
    println!("Packets:     {} ({:?})", outcome.packets_decoded, outcome.status);
    println!("Code-blocks: {} decoded, {} corrupted", report.decoded, report.corrupted);
    if matches {
        println!("✓ Coefficients match");
        Ok(())
    } else {
        Err("decoded coefficients differ".into())
    }
}
