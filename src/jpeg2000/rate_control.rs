//! Post-compression rate-distortion optimisation (PCRD-opt).
//!
//! Each code-block's passes are reduced to the points on the convex hull of its
//! (rate, distortion reduction) curve. A quality layer is then formed by a slope
//! threshold: every code-block keeps the hull points whose slope lies above it.

use crate::coding_parameters::{AllocationStrategy, LayerTarget};
use crate::constants::BISECTION_ITERATIONS;
use crate::error::J2kError;
use crate::jpeg2000::image::{Layer, Pass, Tile};
use log::{debug, warn};

/// A feasible truncation point of one code-block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HullPoint {
    /// Passes kept when truncating here.
    pub num_passes: u32,
    pub rate: usize,
    pub distortion: f64,
    /// Distortion reduction per byte since the previous hull point.
    pub slope: f64,
}

/// Convex hull of a code-block's (rate, distortion) checkpoints, with strictly
/// decreasing slopes. Passes that reduce no distortion are never truncation points.
pub fn slope_table(passes: &[Pass]) -> Vec<HullPoint> {
    let mut hull: Vec<HullPoint> = Vec::with_capacity(passes.len());
    for (idx, pass) in passes.iter().enumerate() {
        loop {
            let (rate, distortion) = hull.last().map_or((0, 0.0), |p| (p.rate, p.distortion));
            let dd = pass.distortion_dec - distortion;
            if dd <= 0.0 {
                break;
            }
            let dr = pass.rate as f64 - rate as f64;
            let slope = if dr <= 0.0 {
                if hull.pop().is_some() {
                    continue;
                }
                f64::INFINITY
            } else {
                dd / dr
            };
            if hull.last().is_some_and(|p| slope >= p.slope) {
                hull.pop();
                continue;
            }
            hull.push(HullPoint {
                num_passes: idx as u32 + 1,
                rate: pass.rate,
                distortion: pass.distortion_dec,
                slope,
            });
            break;
        }
    }
    hull
}

/// Rate-distortion view of one code-block during allocation.
#[derive(Debug, Clone)]
pub struct RdBlock<'a> {
    pub passes: &'a [Pass],
    pub hull: Vec<HullPoint>,
    /// Passes already assigned to earlier layers.
    pub committed: u32,
}

impl<'a> RdBlock<'a> {
    pub fn new(passes: &'a [Pass]) -> Self {
        Self {
            passes,
            hull: slope_table(passes),
            committed: 0,
        }
    }

    pub fn rate(&self, num_passes: u32) -> usize {
        match num_passes {
            0 => 0,
            n => self.passes[n as usize - 1].rate,
        }
    }

    pub fn distortion(&self, num_passes: u32) -> f64 {
        match num_passes {
            0 => 0.0,
            n => self.passes[n as usize - 1].distortion_dec,
        }
    }

    /// Passes kept at `threshold`; never fewer than already committed.
    pub fn passes_at(&self, threshold: f64) -> u32 {
        self.hull
            .iter()
            .take_while(|p| p.slope > threshold)
            .last()
            .map_or(0, |p| p.num_passes)
            .max(self.committed)
    }
}

/// Truncation points chosen for one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Truncation {
    /// Cumulative passes per code-block.
    pub num_passes: Vec<u32>,
    pub threshold: f64,
    /// Code-block bytes up to and including this layer.
    pub rate: usize,
    /// Distortion reduction up to and including this layer.
    pub distortion: f64,
    /// The target was missed; the closest available point was used.
    pub best_effort: bool,
}

fn evaluate(blocks: &[RdBlock<'_>], threshold: f64) -> (Vec<u32>, usize, f64) {
    let num_passes: Vec<u32> = blocks.iter().map(|b| b.passes_at(threshold)).collect();
    let rate = blocks.iter().zip(&num_passes).map(|(b, &n)| b.rate(n)).sum();
    let distortion = blocks.iter().zip(&num_passes).map(|(b, &n)| b.distortion(n)).sum();
    (num_passes, rate, distortion)
}

fn truncation_at(blocks: &[RdBlock<'_>], threshold: f64, best_effort: bool) -> Truncation {
    let (num_passes, rate, distortion) = evaluate(blocks, threshold);
    Truncation {
        num_passes,
        threshold,
        rate,
        distortion,
        best_effort,
    }
}

fn max_finite_slope(blocks: &[RdBlock<'_>]) -> f64 {
    blocks
        .iter()
        .flat_map(|b| b.hull.iter())
        .map(|p| p.slope)
        .filter(|s| s.is_finite())
        .fold(0.0, f64::max)
}

/// Choose the next layer's truncation points by bisection on the slope threshold.
///
/// A byte budget picks the lowest threshold whose total rate fits; a distortion target
/// picks the highest threshold whose remaining distortion is small enough. When no
/// target cannot be met the result is flagged `best_effort`: the fewest passes for a
/// budget, all passes for a distortion target.
pub fn select_truncation(blocks: &[RdBlock<'_>], target: LayerTarget) -> Truncation {
    let max_slope = max_finite_slope(blocks);
    match target {
        LayerTarget::All => Truncation {
            num_passes: blocks.iter().map(|b| (b.passes.len() as u32).max(b.committed)).collect(),
            threshold: 0.0,
            rate: blocks.iter().map(|b| b.rate(b.passes.len() as u32)).sum(),
            distortion: blocks.iter().map(|b| b.distortion(b.passes.len() as u32)).sum(),
            best_effort: false,
        },
        LayerTarget::RateBudget(budget) => {
            let (mut lo, mut hi) = (0.0, max_slope);
            let mut good = max_slope;
            for _ in 0..BISECTION_ITERATIONS {
                let threshold = (lo + hi) / 2.0;
                let (_, rate, _) = evaluate(blocks, threshold);
                if rate <= budget {
                    hi = threshold;
                    good = threshold;
                } else {
                    lo = threshold;
                }
            }
            let truncation = truncation_at(blocks, good, false);
            // committed passes or zero-rate hull points already overshoot
            Truncation {
                best_effort: truncation.rate > budget,
                ..truncation
            }
        }
        LayerTarget::DistortionTarget(remaining) => {
            let total: f64 = blocks.iter().map(|b| b.distortion(b.passes.len() as u32)).sum();
            let (_, _, distortion) = evaluate(blocks, 0.0);
            if total - distortion > remaining {
                return truncation_at(blocks, 0.0, true);
            }
            let (mut lo, mut hi) = (0.0, max_slope);
            let mut good = 0.0;
            for _ in 0..BISECTION_ITERATIONS {
                let threshold = (lo + hi) / 2.0;
                let (_, _, distortion) = evaluate(blocks, threshold);
                if total - distortion <= remaining {
                    lo = threshold;
                    good = threshold;
                } else {
                    hi = threshold;
                }
            }
            truncation_at(blocks, good, false)
        }
    }
}

/// Choose the next layer's truncation points under a byte budget by taking hull
/// segments of all code-blocks in order of decreasing slope, stopping at the first
/// slope whose segments do not fit together.
pub fn greedy_truncation(blocks: &[RdBlock<'_>], budget: usize) -> Truncation {
    let mut segments: Vec<(f64, usize, u32)> = blocks
        .iter()
        .enumerate()
        .flat_map(|(b, block)| {
            block
                .hull
                .iter()
                .filter(move |p| p.num_passes > block.committed)
                .map(move |p| (p.slope, b, p.num_passes))
        })
        .collect();
    segments.sort_by(|a, b| {
        b.0.total_cmp(&a.0)
            .then_with(|| a.1.cmp(&b.1))
            .then_with(|| a.2.cmp(&b.2))
    });

    let mut num_passes: Vec<u32> = blocks.iter().map(|b| b.committed).collect();
    let mut rate: usize = blocks.iter().map(|b| b.rate(b.committed)).sum();
    let mut threshold = f64::INFINITY;
    // Segments of equal slope are taken together or not at all.
    for class in segments.chunk_by(|a, b| a.0 == b.0) {
        let candidate = class.iter().fold(rate, |acc, &(_, b, n)| {
            acc - blocks[b].rate(num_passes[b]) + blocks[b].rate(n)
        });
        if candidate > budget {
            break;
        }
        for &(slope, b, n) in class {
            num_passes[b] = n;
            threshold = slope;
        }
        rate = candidate;
    }

    let distortion = blocks.iter().zip(&num_passes).map(|(b, &n)| b.distortion(n)).sum();
    Truncation {
        num_passes,
        threshold,
        rate,
        distortion,
        best_effort: rate > budget,
    }
}

/// Per-layer outcome of `allocate_layers`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllocationReport {
    pub layers: Vec<Truncation>,
}

impl AllocationReport {
    pub fn any_best_effort(&self) -> bool {
        self.layers.iter().any(|l| l.best_effort)
    }
}

/// Form the quality layers of an encoded tile, one per target, and store each
/// code-block's per-layer contribution in `CodeBlock::layers`.
pub fn allocate_layers(
    tile: &mut Tile,
    targets: &[LayerTarget],
    strategy: AllocationStrategy,
) -> Result<AllocationReport, J2kError> {
    if targets.is_empty() {
        return Err(J2kError::InvalidArgument);
    }

    let mut report = AllocationReport::default();
    {
        let mut blocks: Vec<RdBlock<'_>> =
            tile.codeblocks().map(|c| RdBlock::new(&c.passes)).collect();
        for (layno, &target) in targets.iter().enumerate() {
            let truncation = match (target, strategy) {
                (LayerTarget::RateBudget(budget), AllocationStrategy::Greedy) => {
                    greedy_truncation(&blocks, budget)
                }
                _ => select_truncation(&blocks, target),
            };
            if truncation.best_effort {
                warn!(
                    "layer {layno}: target {target:?} unreachable, using {} bytes",
                    truncation.rate
                );
            }
            debug!(
                "layer {layno}: threshold {:.6} rate {} distortion {:.3}",
                truncation.threshold, truncation.rate, truncation.distortion
            );
            for (block, &n) in blocks.iter_mut().zip(&truncation.num_passes) {
                block.committed = n;
            }
            report.layers.push(truncation);
        }
    }

    let mut layer_distortion = vec![0.0; targets.len()];
    for (idx, cblk) in tile.codeblocks_mut().enumerate() {
        cblk.layers.clear();
        cblk.num_passes_coded = 0;
        let mut committed = 0u32;
        for (layno, truncation) in report.layers.iter().enumerate() {
            let n = truncation.num_passes[idx];
            let rate = |n: u32| if n == 0 { 0 } else { cblk.passes[n as usize - 1].rate };
            let distortion = |n: u32| {
                if n == 0 {
                    0.0
                } else {
                    cblk.passes[n as usize - 1].distortion_dec
                }
            };
            let layer = Layer {
                num_passes: n - committed,
                len: rate(n) - rate(committed),
                data_offset: rate(committed),
                distortion: distortion(n) - distortion(committed),
            };
            layer_distortion[layno] += layer.distortion;
            cblk.layers.push(layer);
            committed = n;
        }
    }
    tile.num_layers = targets.len();
    tile.layer_distortion = layer_distortion;
    Ok(report)
}
