//! Augmented Dickey-Fuller unit-root test.
//!
//! H0: the series has a unit root (non-stationary).
//! H1: the series is stationary. A p-value below 0.05 rejects H0.

use crate::mackinnon::{self, CriticalValues};
use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StationarityError {
    #[error("sample of {0} observations is too short for the ADF regression")]
    TooShort(usize),
    #[error("series is constant")]
    Constant,
    #[error("series contains NaN or infinite values")]
    NonFinite,
    #[error("regression design matrix is singular")]
    Singular,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AdfResult {
    pub statistic: f64,
    pub p_value: f64,
    pub used_lag: usize,
    pub nobs: usize,
    pub critical_values: CriticalValues,
    /// AIC of the selected lag length.
    pub ic_best: f64,
}

impl AdfResult {
    pub fn is_stationary(&self) -> bool {
        self.p_value < 0.05
    }
}

struct OlsFit {
    params: DVector<f64>,
    bse: DVector<f64>,
    aic: f64,
}

impl OlsFit {
    fn tvalue(&self, i: usize) -> f64 {
        self.params[i] / self.bse[i]
    }
}

fn ols(y: &DVector<f64>, x: &DMatrix<f64>) -> Result<OlsFit, StationarityError> {
    let nobs = x.nrows();
    let k = x.ncols();
    if nobs <= k {
        return Err(StationarityError::TooShort(nobs));
    }

    // QR keeps the level column (prices ~1e2..1e5) from squaring the condition number
    let qr = x.clone().qr();
    let r_inv = qr.r().try_inverse().ok_or(StationarityError::Singular)?;
    let params = &r_inv * (qr.q().transpose() * y);
    let xtx_inv = &r_inv * r_inv.transpose();

    let resid = y - x * &params;
    let ssr = resid.norm_squared();
    let sigma2 = ssr / (nobs - k) as f64;
    let bse = DVector::from_iterator(k, (0..k).map(|i| (sigma2 * xtx_inv[(i, i)]).sqrt()));

    let n = nobs as f64;
    let llf = -n / 2.0 * ((2.0 * std::f64::consts::PI).ln() + (ssr / n).ln() + 1.0);
    let aic = -2.0 * llf + 2.0 * k as f64;

    Ok(OlsFit { params, bse, aic })
}

/// Regression sample for a given number of lagged differences:
/// `Δy_t` against `y_{t-1}`, `Δy_{t-1}..Δy_{t-lags}`, over rows `t = lags..`.
/// Returns `(dependent, [level | diff lags])` without the constant.
fn lagged_design(x: &[f64], diff: &[f64], lags: usize) -> (DVector<f64>, DMatrix<f64>) {
    let nobs = diff.len() - lags;
    let y = DVector::from_column_slice(&diff[lags..]);
    let regressors = DMatrix::from_fn(nobs, lags + 1, |r, c| {
        let t = lags + r;
        if c == 0 { x[t] } else { diff[t - c] }
    });
    (y, regressors)
}

fn with_constant(m: DMatrix<f64>, prepend: bool) -> DMatrix<f64> {
    let (rows, cols) = m.shape();
    DMatrix::from_fn(rows, cols + 1, |r, c| match (prepend, c) {
        (true, 0) => 1.0,
        (true, c) => m[(r, c - 1)],
        (false, c) if c == cols => 1.0,
        (false, c) => m[(r, c)],
    })
}

/// Default upper bound on the number of lagged differences.
pub fn default_max_lag(nobs: usize) -> Option<usize> {
    let schwert = (12.0 * (nobs as f64 / 100.0).powf(0.25)).ceil() as i64;
    // one trend term (the constant)
    let cap = nobs as i64 / 2 - 2;
    let maxlag = schwert.min(cap);
    (maxlag >= 0).then_some(maxlag as usize)
}

/// ADF test with a constant, lag length chosen by AIC.
pub fn adfuller(x: &[f64]) -> Result<AdfResult, StationarityError> {
    let n = x.len();
    if x.iter().any(|v| !v.is_finite()) {
        return Err(StationarityError::NonFinite);
    }
    if n < 3 {
        return Err(StationarityError::TooShort(n));
    }
    let (min, max) = x
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if min == max {
        return Err(StationarityError::Constant);
    }

    let maxlag = default_max_lag(n).ok_or(StationarityError::TooShort(n))?;
    let diff: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();

    // Lag search over one common sample so the AICs are comparable.
    let (y, design) = lagged_design(x, &diff, maxlag);
    let full_rhs = with_constant(design, true);
    let mut best: Option<(f64, usize)> = None;
    for lags in 0..=maxlag {
        // a lag column that is all zero over the common sample adds nothing over lags - 1
        let fit = match ols(&y, &full_rhs.columns(0, lags + 2).into_owned()) {
            Err(StationarityError::Singular) => continue,
            fit => fit?,
        };
        if best.is_none_or(|(aic, _)| fit.aic < aic) {
            best = Some((fit.aic, lags));
        }
    }
    let (ic_best, used_lag) = best.ok_or(StationarityError::TooShort(n))?;

    // Re-fit on the longest sample the chosen lag allows.
    let (y, design) = lagged_design(x, &diff, used_lag);
    let nobs = y.len();
    let fit = ols(&y, &with_constant(design, false))?;
    let statistic = fit.tvalue(0);
    if !statistic.is_finite() {
        return Err(StationarityError::Singular);
    }

    Ok(AdfResult {
        statistic,
        p_value: mackinnon::mackinnonp(statistic),
        used_lag,
        nobs,
        critical_values: mackinnon::mackinnoncrit(nobs),
        ic_best,
    })
}
