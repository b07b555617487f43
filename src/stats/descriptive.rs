//! # Descriptive Statistics
//!
//! $$
//! s = \sqrt{\frac{1}{n-1}\sum_{i=1}^n (x_i-\bar x)^2}, \qquad
//! DD_t = \frac{C_t - \max_{s\le t} C_s}{\max_{s\le t} C_s}
//! $$
//!
//! Sample moments, empirical quantiles and drawdown series on plain slices.

use ordered_float::OrderedFloat;
use statrs::statistics::Statistics;

/// Arithmetic mean, 0 for an empty slice.
pub fn mean(xs: &[f64]) -> f64 {
  if xs.is_empty() {
    0.0
  } else {
    xs.mean()
  }
}

/// Unbiased (n-1) standard deviation, 0 with fewer than two observations.
pub fn sample_std(xs: &[f64]) -> f64 {
  if xs.len() < 2 {
    0.0
  } else {
    xs.std_dev()
  }
}

/// Population (n) standard deviation, 0 for an empty slice.
pub fn population_std(xs: &[f64]) -> f64 {
  if xs.is_empty() {
    0.0
  } else {
    xs.population_std_dev()
  }
}

/// Empirical quantile with linear interpolation between order statistics at `q * (n - 1)`.
pub fn quantile(xs: &[f64], q: f64) -> f64 {
  if xs.is_empty() {
    return 0.0;
  }

  let mut sorted = xs.to_vec();
  sorted.sort_by_key(|&v| OrderedFloat(v));

  let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
  let lo = pos.floor() as usize;
  let hi = pos.ceil() as usize;
  let frac = pos - lo as f64;
  sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Growth of one unit invested: `C_t = prod_{s<=t} (1 + r_s)`.
pub fn cumulative_growth(returns: &[f64]) -> Vec<f64> {
  returns
    .iter()
    .scan(1.0, |acc, &r| {
      *acc *= 1.0 + r;
      Some(*acc)
    })
    .collect()
}

/// Relative distance of each point below its running maximum (values are `<= 0`).
pub fn drawdown_series(cumulative: &[f64]) -> Vec<f64> {
  let mut peak = f64::NEG_INFINITY;
  cumulative
    .iter()
    .map(|&c| {
      peak = peak.max(c);
      if peak != 0.0 {
        (c - peak) / peak
      } else {
        0.0
      }
    })
    .collect()
}

/// Most negative drawdown of the compounded return path, 0 for an empty path.
pub fn max_drawdown(returns: &[f64]) -> f64 {
  drawdown_series(&cumulative_growth(returns))
    .into_iter()
    .fold(0.0, f64::min)
}
