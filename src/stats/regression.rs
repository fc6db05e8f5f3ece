//! Simple Linear Regression Module
//! Ordinary least squares of one response on one predictor, with intercept.

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Fitted line `y = intercept + slope * x` and its inference.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RegressionFit {
    pub n: usize,
    pub intercept: f64,
    pub slope: f64,
    pub r_squared: f64,
    /// Residual standard error, NaN with fewer than 3 points.
    pub residual_std_error: f64,
    pub slope_std_error: f64,
    pub t_statistic: f64,
    /// Two-sided p-value for slope = 0.
    pub p_value: f64,
    x_mean: f64,
    sxx: f64,
}

impl RegressionFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }

    /// Confidence interval of the mean response at `x`. None when the
    /// residual variance cannot be estimated.
    pub fn confidence_band(&self, x: f64, level: f64) -> Option<(f64, f64)> {
        let dof = self.n as f64 - 2.0;
        if dof <= 0.0 || !self.residual_std_error.is_finite() {
            return None;
        }
        let dist = StudentsT::new(0.0, 1.0, dof).ok()?;
        let t = dist.inverse_cdf(0.5 + level / 2.0);
        let se_fit = self.residual_std_error
            * (1.0 / self.n as f64 + (x - self.x_mean).powi(2) / self.sxx).sqrt();
        let y = self.predict(x);
        Some((y - t * se_fit, y + t * se_fit))
    }
}

/// Fit OLS over `(x, y)` pairs. Returns None for fewer than two pairs or a
/// predictor without variance.
pub fn fit_ols(pairs: &[(f64, f64)]) -> Option<RegressionFit> {
    let n = pairs.len();
    if n < 2 {
        return None;
    }
    let nf = n as f64;

    let x_mean = pairs.iter().map(|(x, _)| x).sum::<f64>() / nf;
    let y_mean = pairs.iter().map(|(_, y)| y).sum::<f64>() / nf;

    let sxx: f64 = pairs.iter().map(|(x, _)| (x - x_mean).powi(2)).sum();
    if sxx == 0.0 {
        return None;
    }
    let sxy: f64 = pairs
        .iter()
        .map(|(x, y)| (x - x_mean) * (y - y_mean))
        .sum();
    let syy: f64 = pairs.iter().map(|(_, y)| (y - y_mean).powi(2)).sum();

    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;

    let sse: f64 = pairs
        .iter()
        .map(|(x, y)| (y - (intercept + slope * x)).powi(2))
        .sum();
    let r_squared = if syy > 0.0 { 1.0 - sse / syy } else { 1.0 };

    let dof = nf - 2.0;
    let (residual_std_error, slope_std_error, t_statistic, p_value) = if dof > 0.0 {
        let s = (sse / dof).sqrt();
        let se = s / sxx.sqrt();
        // A perfect fit has no residual variance: the slope is either exactly
        // zero or infinitely significant.
        let t = if se > 0.0 {
            slope / se
        } else if slope == 0.0 {
            0.0
        } else {
            slope.signum() * f64::INFINITY
        };
        let p = if t.is_infinite() {
            0.0
        } else if t.is_nan() {
            f64::NAN
        } else {
            StudentsT::new(0.0, 1.0, dof)
                .map(|dist| 2.0 * (1.0 - dist.cdf(t.abs())))
                .unwrap_or(f64::NAN)
        };
        (s, se, t, p)
    } else {
        (f64::NAN, f64::NAN, f64::NAN, f64::NAN)
    };

    Some(RegressionFit {
        n,
        intercept,
        slope,
        r_squared,
        residual_std_error,
        slope_std_error,
        t_statistic,
        p_value,
        x_mean,
        sxx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// y = 5 + 2x with noise that sums to zero within each x level.
    fn noisy_pairs() -> Vec<(f64, f64)> {
        let noise = [0.31, -0.12, 0.07, -0.26, 0.19, -0.19, 0.26, -0.07, 0.12, -0.31];
        let mut pairs = Vec::new();
        for x in [0.0, 1.0] {
            for (i, e) in noise.iter().enumerate() {
                let e = if x == 1.0 { noise[noise.len() - 1 - i] } else { *e };
                pairs.push((x, 5.0 + 2.0 * x + e));
            }
        }
        pairs
    }

    #[test]
    fn recovers_slope() {
        let fit = fit_ols(&noisy_pairs()).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-9);
        assert!((fit.intercept - 5.0).abs() < 1e-9);
        assert!(fit.r_squared > 0.9 && fit.r_squared <= 1.0);
        assert!(fit.p_value < 1e-6);
        assert_eq!(fit.n, 20);
    }

    #[test]
    fn slope_close_with_uneven_noise() {
        let pairs: Vec<(f64, f64)> = (0..200)
            .map(|i| {
                let x = if i % 3 == 0 { 1.0 } else { 0.0 };
                let e = ((i * 37 % 101) as f64 / 101.0 - 0.5) * 0.4;
                (x, 1.5 + 2.0 * x + e)
            })
            .collect();
        let fit = fit_ols(&pairs).unwrap();
        assert!((fit.slope - 2.0).abs() < 0.1, "slope {}", fit.slope);
    }

    #[test]
    fn degenerate_inputs() {
        assert!(fit_ols(&[]).is_none());
        assert!(fit_ols(&[(1.0, 2.0)]).is_none());
        assert!(fit_ols(&[(1.0, 2.0), (1.0, 3.0), (1.0, 4.0)]).is_none());

        let two = fit_ols(&[(0.0, 1.0), (1.0, 3.0)]).unwrap();
        assert!((two.slope - 2.0).abs() < 1e-12);
        assert!(two.p_value.is_nan());
        assert!(two.confidence_band(0.5, 0.95).is_none());
    }

    #[test]
    fn constant_response_gives_flat_fit() {
        let fit = fit_ols(&[(0.0, 6.0), (0.0, 6.0), (1.0, 6.0), (1.0, 6.0)]).unwrap();
        assert_eq!(fit.slope, 0.0);
        assert_eq!(fit.intercept, 6.0);
        assert_eq!(fit.residual_std_error, 0.0);
        assert_eq!(fit.t_statistic, 0.0);
        assert!((fit.p_value - 1.0).abs() < 1e-9);
        assert_eq!(fit.confidence_band(0.5, 0.95), Some((6.0, 6.0)));
    }

    #[test]
    fn exact_line_is_fully_significant() {
        let fit = fit_ols(&[(0.0, 1.0), (0.0, 1.0), (1.0, 3.0), (1.0, 3.0)]).unwrap();
        assert_eq!(fit.slope, 2.0);
        assert_eq!(fit.t_statistic, f64::INFINITY);
        assert_eq!(fit.p_value, 0.0);
        assert!((fit.r_squared - 1.0).abs() < 1e-12);
    }

    #[test]
    fn band_contains_fit_and_widens_away_from_mean() {
        let fit = fit_ols(&noisy_pairs()).unwrap();
        let (lo_mid, hi_mid) = fit.confidence_band(0.5, 0.95).unwrap();
        let (lo_end, hi_end) = fit.confidence_band(0.0, 0.95).unwrap();
        assert!(lo_mid < fit.predict(0.5) && fit.predict(0.5) < hi_mid);
        assert!(hi_end - lo_end > hi_mid - lo_mid);
    }
}
