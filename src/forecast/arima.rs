//! ARIMA(p, d, q) fitting and forecasting
//!
//! ## Estimation
//! 1. Difference the series `d` times; a mean term is estimated only when `d = 0`
//! 2. Start values from a Hannan–Rissanen regression (long AR → residuals →
//!    regression on lagged values and lagged residuals)
//! 3. Minimise the conditional sum of squares (CSS) with Nelder–Mead over an
//!    unconstrained reparametrisation: partial autocorrelations mapped through
//!    `x / sqrt(1 + x²)` and the Durbin–Levinson recursion, which keeps the AR
//!    part stationary and the MA part invertible for every trial point
//!
//! ## Scoring
//! `σ² = CSS / n_eff`, `ll = -n_eff/2 · (ln 2πσ² + 1)`,
//! `AIC = -2·ll + 2·k` with `k = p + q + mean + 1` (σ² counts as a parameter).

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use thiserror::Error;

use super::linalg::least_squares;
use super::optimizer::NelderMead;

/// Structural order of an ARIMA model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArimaOrder {
    /// Autoregressive lags
    pub p: usize,
    /// Differencing passes
    pub d: usize,
    /// Moving-average lags
    pub q: usize,
}

impl ArimaOrder {
    pub const fn new(p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }
}

impl std::fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{},{})", self.p, self.d, self.q)
    }
}

/// Why a model could not be fitted for a given order.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("insufficient observations for order {order}: have {got}, need {needed}")]
    InsufficientData {
        order: ArimaOrder,
        needed: usize,
        got: usize,
    },

    #[error("input series contains non-finite values")]
    NonFiniteInput,

    #[error("residual variance is zero for order {0}; the series is perfectly explained")]
    ZeroVariance(ArimaOrder),

    #[error("optimiser did not converge for order {order} after {iterations} iterations")]
    NoConvergence { order: ArimaOrder, iterations: usize },

    #[error("information criterion is not finite for order {0}")]
    NonFiniteScore(ArimaOrder),
}

/// Residual variance below this (relative to the series scale) is treated as zero.
const ZERO_VARIANCE_EPS: f64 = 1e-12;

/// Forecast with a symmetric prediction interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalForecast {
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
}

/// A fitted ARIMA model, ready to forecast past the end of its training data.
#[derive(Debug, Clone)]
pub struct FittedArima {
    order: ArimaOrder,
    ar: Vec<f64>,
    ma: Vec<f64>,
    mean: f64,
    sigma2: f64,
    log_likelihood: f64,
    aic: f64,
    n_effective: usize,
    iterations: usize,
    /// Differenced training series
    differenced: Vec<f64>,
    /// CSS residuals aligned with `differenced`
    residuals: Vec<f64>,
    /// Last value of each differencing level, level 0 = raw series
    level_tails: Vec<f64>,
}

fn difference(x: &[f64]) -> Vec<f64> {
    x.windows(2).map(|w| w[1] - w[0]).collect()
}

fn mean_of(x: &[f64]) -> f64 {
    if x.is_empty() {
        0.0
    } else {
        x.iter().sum::<f64>() / x.len() as f64
    }
}

/// Map unconstrained reals to the coefficients of a stationary AR polynomial
/// `1 - φ₁z - … - φₖzᵏ`.
pub(crate) fn constrain_stationary(unconstrained: &[f64]) -> Vec<f64> {
    let partials: Vec<f64> = unconstrained
        .iter()
        .map(|x| x / (1.0 + x * x).sqrt())
        .collect();
    let mut phi = vec![0.0; partials.len()];
    for k in 0..partials.len() {
        let prev = phi[..k].to_vec();
        for i in 0..k {
            phi[i] = prev[i] - partials[k] * prev[k - 1 - i];
        }
        phi[k] = partials[k];
    }
    phi
}

/// Inverse of [`constrain_stationary`]; `None` if `phi` is not stationary.
pub(crate) fn unconstrain_stationary(phi: &[f64]) -> Option<Vec<f64>> {
    let mut current = phi.to_vec();
    let mut partials = vec![0.0; phi.len()];
    for k in (0..phi.len()).rev() {
        let r = current[k];
        if !r.is_finite() || r.abs() >= 1.0 {
            return None;
        }
        partials[k] = r;
        let denom = 1.0 - r * r;
        current = (0..k)
            .map(|i| (current[i] + r * current[k - 1 - i]) / denom)
            .collect();
    }
    Some(partials.iter().map(|r| r / (1.0 - r * r).sqrt()).collect())
}

/// Conditional sum of squares and residuals of an ARMA on `w`.
///
/// Residuals before the first `p` observations are taken as zero.
fn conditional_residuals(w: &[f64], mean: f64, ar: &[f64], ma: &[f64]) -> (f64, Vec<f64>) {
    let p = ar.len();
    let mut residuals = vec![0.0; w.len()];
    let mut css = 0.0;
    for t in p..w.len() {
        let mut predicted = mean;
        for (i, phi) in ar.iter().enumerate() {
            predicted += phi * (w[t - 1 - i] - mean);
        }
        for (j, theta) in ma.iter().enumerate() {
            if t > j {
                predicted += theta * residuals[t - 1 - j];
            }
        }
        residuals[t] = w[t] - predicted;
        css += residuals[t] * residuals[t];
    }
    (css, residuals)
}

/// Hannan–Rissanen start values for ARMA(p, q) on a centred series.
fn hannan_rissanen(x: &[f64], p: usize, q: usize) -> Option<(Vec<f64>, Vec<f64>)> {
    let n = x.len();
    if p == 0 && q == 0 {
        return Some((Vec::new(), Vec::new()));
    }

    let lagged = |t: usize, lags: usize| -> Vec<f64> { (1..=lags).map(|i| x[t - i]).collect() };

    if q == 0 {
        let rows: Vec<Vec<f64>> = (p..n).map(|t| lagged(t, p)).collect();
        let targets: Vec<f64> = (p..n).map(|t| x[t]).collect();
        let ar = least_squares(&rows, &targets)?;
        return Some((ar, Vec::new()));
    }

    // long autoregression to approximate the innovations
    let long = (p + q + 1).max((n as f64).ln().ceil() as usize).min(n / 3);
    if long == 0 {
        return None;
    }
    let rows: Vec<Vec<f64>> = (long..n).map(|t| lagged(t, long)).collect();
    let targets: Vec<f64> = (long..n).map(|t| x[t]).collect();
    let long_ar = least_squares(&rows, &targets)?;
    let mut innovations = vec![0.0; n];
    for t in long..n {
        let fitted: f64 = long_ar.iter().enumerate().map(|(i, a)| a * x[t - 1 - i]).sum();
        innovations[t] = x[t] - fitted;
    }

    let start = long + q.max(p);
    if start >= n {
        return None;
    }
    let rows: Vec<Vec<f64>> = (start..n)
        .map(|t| {
            let mut row = lagged(t, p);
            row.extend((1..=q).map(|j| innovations[t - j]));
            row
        })
        .collect();
    let targets: Vec<f64> = (start..n).map(|t| x[t]).collect();
    let coefs = least_squares(&rows, &targets)?;
    Some((coefs[..p].to_vec(), coefs[p..].to_vec()))
}

/// Unconstrained start vector `[ar…, ma…]`, zeros where the regression
/// estimate is unusable.
fn start_values(centred: &[f64], p: usize, q: usize) -> Vec<f64> {
    let (ar, ma) = hannan_rissanen(centred, p, q)
        .unwrap_or_else(|| (vec![0.0; p], vec![0.0; q]));
    let ar_u = unconstrain_stationary(&ar).unwrap_or_else(|| vec![0.0; p]);
    let neg_ma: Vec<f64> = ma.iter().map(|t| -t).collect();
    let ma_u = unconstrain_stationary(&neg_ma).unwrap_or_else(|| vec![0.0; q]);
    ar_u.into_iter().chain(ma_u).collect()
}

impl FittedArima {
    /// Fit an ARIMA model of the given order to `data`.
    pub fn fit(data: &[f64], order: ArimaOrder) -> Result<Self, FitError> {
        Self::fit_with(data, order, &NelderMead::default())
    }

    /// Fit with an explicit optimiser configuration.
    pub fn fit_with(
        data: &[f64],
        order: ArimaOrder,
        optimizer: &NelderMead,
    ) -> Result<Self, FitError> {
        if data.iter().any(|v| !v.is_finite()) {
            return Err(FitError::NonFiniteInput);
        }

        let ArimaOrder { p, d, q } = order;
        let include_mean = d == 0;
        let n_params = p + q + usize::from(include_mean);
        // differencing eats d points, the AR start eats p, and the residual
        // variance needs at least two effective observations beyond the parameters
        let needed = d + p + n_params + 2;
        if data.len() < needed {
            return Err(FitError::InsufficientData {
                order,
                needed,
                got: data.len(),
            });
        }

        let mut w = data.to_vec();
        let mut level_tails = Vec::with_capacity(d);
        for _ in 0..d {
            level_tails.push(w.last().copied().unwrap_or(0.0));
            w = difference(&w);
        }

        let mean0 = if include_mean { mean_of(&w) } else { 0.0 };
        let scale = w
            .iter()
            .map(|v| (v - mean0).powi(2))
            .sum::<f64>()
            .sqrt()
            .max(1e-8);

        let centred: Vec<f64> = w.iter().map(|v| v - mean0).collect();
        let mut start = start_values(&centred, p, q);
        let mut steps = vec![0.1; p + q];
        if include_mean {
            start.push(mean0);
            steps.push((0.1 * scale / (w.len() as f64).sqrt()).max(1e-4));
        }

        let unpack = |x: &[f64]| -> (Vec<f64>, Vec<f64>, f64) {
            let ar = constrain_stationary(&x[..p]);
            let ma: Vec<f64> = constrain_stationary(&x[p..p + q])
                .into_iter()
                .map(|t| -t)
                .collect();
            let mean = if include_mean { x[p + q] } else { 0.0 };
            (ar, ma, mean)
        };

        let objective = |x: &[f64]| {
            let (ar, ma, mean) = unpack(x);
            conditional_residuals(&w, mean, &ar, &ma).0
        };

        let minimum = optimizer.minimize(objective, &start, &steps);
        if !minimum.converged {
            return Err(FitError::NoConvergence {
                order,
                iterations: minimum.iterations,
            });
        }

        let (ar, ma, mean) = unpack(&minimum.point);
        let (css, residuals) = conditional_residuals(&w, mean, &ar, &ma);
        let n_effective = w.len() - p;
        let sigma2 = css / n_effective as f64;
        let data_scale = data.iter().map(|v| v * v).sum::<f64>() / data.len() as f64;
        if !sigma2.is_finite() || sigma2 <= ZERO_VARIANCE_EPS * (1.0 + data_scale) {
            return Err(FitError::ZeroVariance(order));
        }

        let nf = n_effective as f64;
        let log_likelihood = -0.5 * nf * ((2.0 * std::f64::consts::PI * sigma2).ln() + 1.0);
        let k = (n_params + 1) as f64;
        let aic = -2.0 * log_likelihood + 2.0 * k;
        if !aic.is_finite() {
            return Err(FitError::NonFiniteScore(order));
        }

        Ok(Self {
            order,
            ar,
            ma,
            mean,
            sigma2,
            log_likelihood,
            aic,
            n_effective,
            iterations: minimum.iterations,
            differenced: w,
            residuals,
            level_tails,
        })
    }

    pub fn order(&self) -> ArimaOrder {
        self.order
    }

    /// AR coefficients φ₁…φₚ
    pub fn ar(&self) -> &[f64] {
        &self.ar
    }

    /// MA coefficients θ₁…θ_q
    pub fn ma(&self) -> &[f64] {
        &self.ma
    }

    /// Mean of the differenced series (0 when `d > 0`)
    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }

    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    /// Akaike information criterion (lower is better)
    pub fn aic(&self) -> f64 {
        self.aic
    }

    pub fn n_effective(&self) -> usize {
        self.n_effective
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Point forecasts for the next `horizon` steps, on the original scale.
    pub fn forecast(&self, horizon: usize) -> Vec<f64> {
        let mut history = self.differenced.clone();
        let mut errors = self.residuals.clone();
        let mut ahead = Vec::with_capacity(horizon);

        for _ in 0..horizon {
            let t = history.len();
            let mut predicted = self.mean;
            for (i, phi) in self.ar.iter().enumerate() {
                predicted += phi * (history[t - 1 - i] - self.mean);
            }
            for (j, theta) in self.ma.iter().enumerate() {
                if t > j {
                    predicted += theta * errors[t - 1 - j];
                }
            }
            history.push(predicted);
            errors.push(0.0);
            ahead.push(predicted);
        }

        // integrate back up through each differencing level
        for tail in self.level_tails.iter().rev() {
            let mut level = *tail;
            for v in &mut ahead {
                level += *v;
                *v = level;
            }
        }
        ahead
    }

    /// ψ-weights of the integrated model, ψ₀ = 1.
    fn psi_weights(&self, count: usize) -> Vec<f64> {
        // AR polynomial 1 - φ₁z - … multiplied by (1 - z)^d
        let mut poly = vec![1.0];
        poly.extend(self.ar.iter().map(|phi| -phi));
        for _ in 0..self.order.d {
            let mut next = vec![0.0; poly.len() + 1];
            for (i, c) in poly.iter().enumerate() {
                next[i] += c;
                next[i + 1] -= c;
            }
            poly = next;
        }
        let phi_star: Vec<f64> = poly.iter().skip(1).map(|c| -c).collect();

        let mut psi = Vec::with_capacity(count);
        for j in 0..count {
            if j == 0 {
                psi.push(1.0);
                continue;
            }
            let mut value = self.ma.get(j - 1).copied().unwrap_or(0.0);
            for (i, phi) in phi_star.iter().enumerate().take(j) {
                value += phi * psi[j - 1 - i];
            }
            psi.push(value);
        }
        psi
    }

    /// Point forecasts with `level` prediction intervals (e.g. 0.95).
    pub fn forecast_with_intervals(&self, horizon: usize, level: f64) -> Vec<IntervalForecast> {
        let points = self.forecast(horizon);
        let z = Normal::new(0.0, 1.0)
            .map(|n| n.inverse_cdf(0.5 + level.clamp(0.0, 0.999_999) / 2.0))
            .unwrap_or(1.96);
        let psi = self.psi_weights(horizon);

        let mut cumulative = 0.0;
        points
            .into_iter()
            .zip(psi)
            .map(|(value, weight)| {
                cumulative += weight * weight;
                let half_width = z * (self.sigma2 * cumulative).sqrt();
                IntervalForecast {
                    value,
                    lower: value - half_width,
                    upper: value + half_width,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic AR(1) process with a bounded pseudo-random driver.
    fn ar1_series(phi: f64, mean: f64, n: usize) -> Vec<f64> {
        let mut x = mean;
        (0..n)
            .map(|t| {
                let shock = ((t as f64) * 12.9898).sin() * 43_758.545_3;
                let shock = (shock - shock.floor()) - 0.5;
                x = mean + phi * (x - mean) + shock;
                x
            })
            .collect()
    }

    #[test]
    fn test_transform_round_trip() {
        let phi = vec![0.5, -0.3, 0.1];
        let u = unconstrain_stationary(&phi).unwrap();
        let back = constrain_stationary(&u);
        for (a, b) in phi.iter().zip(&back) {
            assert!((a - b).abs() < 1e-10);
        }
    }

    #[test]
    fn test_nonstationary_has_no_preimage() {
        assert!(unconstrain_stationary(&[1.2]).is_none());
    }

    #[test]
    fn test_constrained_ar2_is_stationary() {
        let phi = constrain_stationary(&[5.0, 5.0]);
        // AR(2) stationarity triangle
        assert!(phi[1].abs() < 1.0);
        assert!(phi[0] + phi[1] < 1.0);
        assert!(phi[1] - phi[0] < 1.0);
    }

    #[test]
    fn test_fit_recovers_ar1() {
        let data = ar1_series(0.7, 10.0, 400);
        let model = FittedArima::fit(&data, ArimaOrder::new(1, 0, 0)).unwrap();
        assert!((model.ar()[0] - 0.7).abs() < 0.15, "phi = {}", model.ar()[0]);
        assert!((model.mean() - 10.0).abs() < 0.5);
        assert!(model.aic().is_finite());
    }

    #[test]
    fn test_random_walk_forecast_is_flat() {
        let data: Vec<f64> = ar1_series(0.0, 0.0, 100)
            .iter()
            .scan(50.0, |level, shock| {
                *level += shock;
                Some(*level)
            })
            .collect();
        let model = FittedArima::fit(&data, ArimaOrder::new(0, 1, 0)).unwrap();
        let ahead = model.forecast(5);
        let last = *data.last().unwrap();
        assert!(ahead.iter().all(|v| (v - last).abs() < 1e-9));
    }

    #[test]
    fn test_forecast_length_matches_horizon() {
        let data = ar1_series(0.4, 3.0, 60);
        for order in [ArimaOrder::new(0, 0, 0), ArimaOrder::new(1, 1, 1), ArimaOrder::new(2, 0, 1)] {
            let model = FittedArima::fit(&data, order).unwrap();
            assert_eq!(model.forecast(24).len(), 24);
            assert_eq!(model.forecast(0).len(), 0);
        }
    }

    #[test]
    fn test_intervals_widen_with_horizon() {
        let data = ar1_series(0.5, 0.0, 120);
        let model = FittedArima::fit(&data, ArimaOrder::new(1, 1, 0)).unwrap();
        let fc = model.forecast_with_intervals(10, 0.95);
        assert_eq!(fc.len(), 10);
        for pair in fc.windows(2) {
            assert!(pair[1].upper - pair[1].lower >= pair[0].upper - pair[0].lower);
        }
        assert!(fc.iter().all(|f| f.lower <= f.value && f.value <= f.upper));
    }

    #[test]
    fn test_insufficient_data() {
        let err = FittedArima::fit(&[1.0, 2.0, 3.0], ArimaOrder::new(2, 1, 2)).unwrap_err();
        assert!(matches!(err, FitError::InsufficientData { .. }));
    }

    #[test]
    fn test_non_finite_input() {
        let err = FittedArima::fit(&[1.0, f64::NAN, 3.0, 4.0, 5.0], ArimaOrder::new(0, 0, 0))
            .unwrap_err();
        assert_eq!(err, FitError::NonFiniteInput);
    }

    #[test]
    fn test_constant_series_has_zero_variance() {
        let err = FittedArima::fit(&[5.0; 30], ArimaOrder::new(0, 0, 0)).unwrap_err();
        assert_eq!(err, FitError::ZeroVariance(ArimaOrder::new(0, 0, 0)));
    }

    #[test]
    fn test_psi_weights_random_walk() {
        let data: Vec<f64> = (0..50).map(|t| (t as f64 * 0.37).sin() * 3.0 + t as f64).collect();
        let model = FittedArima::fit(&data, ArimaOrder::new(0, 1, 0)).unwrap();
        // (1 - z)^-1 has all-ones ψ-weights
        assert!(model.psi_weights(5).iter().all(|w| (w - 1.0).abs() < 1e-12));
    }
}
