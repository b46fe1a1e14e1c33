//! Synthesis filter norms used to weight the distortion of each coding pass.

use crate::coding_parameters::Transform;
use crate::jpeg2000::image::SubbandOrientation;

// Rows: LL, HL, LH, HH. Columns: decomposition level.
const DWT_NORMS_53: [[f64; 10]; 4] = [
    [1.000, 1.500, 2.750, 5.375, 10.68, 21.34, 42.67, 85.33, 170.7, 341.3],
    [1.038, 1.592, 2.919, 5.703, 11.33, 22.64, 45.25, 90.48, 180.9, 0.0],
    [1.038, 1.592, 2.919, 5.703, 11.33, 22.64, 45.25, 90.48, 180.9, 0.0],
    [0.7186, 0.9218, 1.586, 3.043, 6.019, 12.01, 24.00, 47.97, 95.93, 0.0],
];

const DWT_NORMS_97: [[f64; 10]; 4] = [
    [1.000, 1.965, 4.177, 8.403, 16.90, 33.84, 67.69, 135.3, 270.6, 540.9],
    [2.022, 3.989, 8.355, 17.04, 34.27, 68.63, 137.3, 274.6, 549.0, 0.0],
    [2.022, 3.989, 8.355, 17.04, 34.27, 68.63, 137.3, 274.6, 549.0, 0.0],
    [2.080, 3.865, 8.307, 17.18, 34.71, 69.59, 139.3, 278.6, 557.2, 0.0],
];

const MCT_NORMS_REVERSIBLE: [f64; 3] = [1.732, 0.8292, 0.8292];
const MCT_NORMS_IRREVERSIBLE: [f64; 3] = [1.732, 1.805, 1.573];

fn orientation_row(orientation: SubbandOrientation) -> usize {
    match orientation {
        SubbandOrientation::LL => 0,
        SubbandOrientation::HL => 1,
        SubbandOrientation::LH => 2,
        SubbandOrientation::HH => 3,
    }
}

/// Norm of the synthesis basis of a band at decomposition `level` (0 = finest).
/// Levels past the table reuse its last entry.
pub fn dwt_norm(transform: Transform, level: usize, orientation: SubbandOrientation) -> f64 {
    let row = orientation_row(orientation);
    let max_level = if row == 0 { 9 } else { 8 };
    let level = level.min(max_level);
    match transform {
        Transform::Reversible53 => DWT_NORMS_53[row][level],
        Transform::Irreversible97 => DWT_NORMS_97[row][level],
    }
}

/// Weight of component `compno` under the multi-component transform; 1.0 when the
/// tile has no such transform or the component is not one of the first three.
pub fn mct_norm(transform: Transform, with_mct: bool, compno: usize) -> f64 {
    if !with_mct {
        return 1.0;
    }
    let norms = match transform {
        Transform::Reversible53 => &MCT_NORMS_REVERSIBLE,
        Transform::Irreversible97 => &MCT_NORMS_IRREVERSIBLE,
    };
    norms.get(compno).copied().unwrap_or(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dwt_norm_lookup() {
        assert_eq!(dwt_norm(Transform::Reversible53, 0, SubbandOrientation::LL), 1.0);
        assert_eq!(dwt_norm(Transform::Reversible53, 2, SubbandOrientation::HH), 1.586);
        assert_eq!(dwt_norm(Transform::Irreversible97, 1, SubbandOrientation::HL), 3.989);
        assert_eq!(
            dwt_norm(Transform::Irreversible97, 1, SubbandOrientation::LH),
            dwt_norm(Transform::Irreversible97, 1, SubbandOrientation::HL)
        );
    }

    #[test]
    fn test_dwt_norm_clamps_deep_levels() {
        assert_eq!(dwt_norm(Transform::Reversible53, 20, SubbandOrientation::LL), 341.3);
        assert_eq!(dwt_norm(Transform::Reversible53, 20, SubbandOrientation::HH), 95.93);
    }

    #[test]
    fn test_mct_norm() {
        assert_eq!(mct_norm(Transform::Reversible53, false, 0), 1.0);
        assert_eq!(mct_norm(Transform::Reversible53, true, 1), 0.8292);
        assert_eq!(mct_norm(Transform::Irreversible97, true, 2), 1.573);
        assert_eq!(mct_norm(Transform::Irreversible97, true, 3), 1.0);
    }
}
