//! MacKinnon response surfaces for the Dickey-Fuller distribution,
//! restricted to the one-variable, constant-only case used by `adfuller`.

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};
use std::sync::LazyLock;

// MacKinnon (1994), table for N = 1 with a constant term.
const TAU_MAX: f64 = 2.74;
const TAU_MIN: f64 = -18.83;
const TAU_STAR: f64 = -1.61;
const TAU_SMALLP: [f64; 3] = [2.1659, 1.4412, 0.038269];
const TAU_LARGEP: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

// MacKinnon (2010), constant term, N = 1. Rows are 1%, 5%, 10%.
const TAU_C_2010: [[f64; 4]; 3] = [
    [-3.43035, -6.5393, -16.786, -79.433],
    [-2.86154, -2.8903, -4.234, -40.040],
    [-2.56677, -1.5384, -2.809, 0.0],
];

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct CriticalValues {
    pub one_pct: f64,
    pub five_pct: f64,
    pub ten_pct: f64,
}

/// Evaluates c[0] + c[1]·x + c[2]·x² + …
fn polyval(coefs: &[f64], x: f64) -> f64 {
    coefs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Approximate asymptotic p-value for an ADF t-statistic.
pub fn mackinnonp(teststat: f64) -> f64 {
    if teststat > TAU_MAX {
        return 1.0;
    }
    if teststat < TAU_MIN {
        return 0.0;
    }
    let z = if teststat <= TAU_STAR {
        polyval(&TAU_SMALLP, teststat)
    } else {
        polyval(&TAU_LARGEP, teststat)
    };
    STANDARD_NORMAL.cdf(z)
}

/// Finite-sample critical values for a regression with `nobs` observations.
pub fn mackinnoncrit(nobs: usize) -> CriticalValues {
    let inv = 1.0 / nobs as f64;
    let at = |row: usize| polyval(&TAU_C_2010[row], inv);
    CriticalValues {
        one_pct: at(0),
        five_pct: at(1),
        ten_pct: at(2),
    }
}

static STANDARD_NORMAL: LazyLock<Normal> = LazyLock::new(|| Normal::new(0.0, 1.0).unwrap());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p_value_is_clamped_outside_the_surface() {
        assert_eq!(mackinnonp(3.5), 1.0);
        assert_eq!(mackinnonp(-25.0), 0.0);
    }

    #[test]
    fn p_value_near_five_percent_at_the_critical_value() {
        let p = mackinnonp(-2.86154);
        assert!((p - 0.05).abs() < 0.005, "p = {}", p);
    }

    #[test]
    fn p_value_is_continuous_at_the_branch_point() {
        let below = mackinnonp(TAU_STAR - 1e-9);
        let above = mackinnonp(TAU_STAR + 1e-9);
        assert!((below - above).abs() < 0.01);
    }

    #[test]
    fn p_value_increases_with_the_statistic() {
        let stats = [-6.0, -4.0, -3.0, -2.0, -1.0, 0.0, 1.0, 2.0];
        let ps: Vec<f64> = stats.iter().map(|&t| mackinnonp(t)).collect();
        assert!(ps.windows(2).all(|w| w[0] < w[1]), "{:?}", ps);
    }

    #[test]
    fn critical_values_approach_asymptotic_ones() {
        let cv = mackinnoncrit(100_000);
        assert!((cv.one_pct + 3.43).abs() < 0.01);
        assert!((cv.five_pct + 2.86).abs() < 0.01);
        assert!((cv.ten_pct + 2.57).abs() < 0.01);

        // small samples push the critical values further out
        let small = mackinnoncrit(50);
        assert!(small.five_pct < cv.five_pct);
    }
}
