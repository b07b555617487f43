//! # Return Statistics
//!
//! $$
//! \mu_i = \frac1T\sum_t r_{t,i}, \qquad
//! \Sigma_{ij} = \frac{1}{T-1}\sum_t (r_{t,i}-\mu_i)(r_{t,j}-\mu_j)
//! $$
//!
//! Converts an aligned price matrix into simple returns, the mean-return vector and the
//! sample covariance matrix.
//!
//! Missing quotes are handled with one system-wide policy: a return exists only where
//! both neighbouring prices exist, and any return row with a gap in some column is
//! dropped for every symbol. μ and Σ are therefore always estimated on one dense,
//! date-aligned sample.

use chrono::NaiveDate;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use tracing::debug;

use crate::config::TRADING_DAYS;
use crate::data::PriceMatrix;
use crate::data::ReturnMatrix;
use crate::error::Error;
use crate::error::Result;

/// Minimum number of return rows for a mean and a sample covariance.
pub const MIN_RETURN_ROWS: usize = 2;

/// Compound a daily return over a trading year: `(1 + r)^252 - 1`.
pub fn annualize_return(daily: f64) -> f64 {
  (1.0 + daily).powf(TRADING_DAYS) - 1.0
}

/// Scale a daily volatility to annual under i.i.d. returns: `sigma * sqrt(252)`.
pub fn annualize_volatility(daily: f64) -> f64 {
  daily * TRADING_DAYS.sqrt()
}

/// Output of [`ReturnStatistics::compute`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReturnStatistics {
  /// Dense simple-return matrix.
  pub returns: ReturnMatrix,
  /// Per-symbol mean daily return.
  pub mean: Array1<f64>,
  /// Sample covariance of daily returns.
  pub covariance: Array2<f64>,
  /// Return rows removed because some symbol lacked a quote.
  pub dropped_rows: usize,
}

impl ReturnStatistics {
  /// Compute returns, μ and Σ from a price matrix.
  pub fn compute(prices: &PriceMatrix) -> Result<Self> {
    let returns = simple_returns(prices)?;
    let dropped_rows = prices.len().saturating_sub(1) - returns.nrows();
    if dropped_rows > 0 {
      debug!(
        dropped_rows,
        kept_rows = returns.nrows(),
        "dropped return rows with missing quotes"
      );
    }

    if returns.nrows() == 0 && prices.len() > 1 {
      return Err(Error::DataUnavailable(
        "no return row has a quote for every symbol".into(),
      ));
    }
    if returns.nrows() < MIN_RETURN_ROWS {
      return Err(Error::InsufficientData {
        required: MIN_RETURN_ROWS,
        actual: returns.nrows(),
        context: "return statistics",
      });
    }

    let (mean, covariance) = mean_and_covariance(returns.values());
    Ok(Self {
      returns,
      mean,
      covariance,
      dropped_rows,
    })
  }

  pub fn symbols(&self) -> &[String] {
    self.returns.symbols()
  }

  /// Per-symbol `(1 + mu)^252 - 1`.
  pub fn annualized_mean(&self) -> Array1<f64> {
    self.mean.mapv(annualize_return)
  }

  /// Per-symbol `sqrt(Sigma_ii) * sqrt(252)`.
  pub fn annualized_volatility(&self) -> Array1<f64> {
    self
      .covariance
      .diag()
      .mapv(|v| annualize_volatility(v.max(0.0).sqrt()))
  }

  /// Pearson correlation implied by Σ; pairs involving a zero-variance asset get 0.
  pub fn correlation(&self) -> Array2<f64> {
    let n = self.covariance.nrows();
    let sd: Vec<f64> = (0..n)
      .map(|i| self.covariance[[i, i]].max(0.0).sqrt())
      .collect();
    Array2::from_shape_fn((n, n), |(i, j)| {
      if i == j {
        1.0
      } else {
        let denom = sd[i] * sd[j];
        if denom > 1e-15 {
          (self.covariance[[i, j]] / denom).clamp(-1.0, 1.0)
        } else {
          0.0
        }
      }
    })
  }
}

impl<'de> Deserialize<'de> for ReturnStatistics {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
    #[derive(Deserialize)]
    struct Raw {
      returns: ReturnMatrix,
      mean: Array1<f64>,
      covariance: Array2<f64>,
      dropped_rows: usize,
    }

    let raw = Raw::deserialize(deserializer)?;
    let n = raw.returns.ncols();
    if raw.mean.len() != n || raw.covariance.dim() != (n, n) {
      return Err(serde::de::Error::custom(format!(
        "mean of length {} and {:?} covariance for {n} symbols",
        raw.mean.len(),
        raw.covariance.dim()
      )));
    }
    if raw.mean.iter().chain(raw.covariance.iter()).any(|v| !v.is_finite()) {
      return Err(serde::de::Error::custom("return statistics must be finite"));
    }
    Ok(Self {
      returns: raw.returns,
      mean: raw.mean,
      covariance: raw.covariance,
      dropped_rows: raw.dropped_rows,
    })
  }
}

/// Dense simple returns, dropping any row where some symbol lacks one of its two prices.
pub fn simple_returns(prices: &PriceMatrix) -> Result<ReturnMatrix> {
  let rows = prices.rows();
  let n = prices.symbols().len();
  let mut dates: Vec<NaiveDate> = Vec::with_capacity(rows.len().saturating_sub(1));
  let mut flat: Vec<f64> = Vec::with_capacity(rows.len().saturating_sub(1) * n);

  for pair in rows.windows(2) {
    let (prev, cur) = (&pair[0], &pair[1]);
    let row: Option<Vec<f64>> = prev
      .prices
      .iter()
      .zip(cur.prices.iter())
      .map(|(p0, p1)| match (p0, p1) {
        (Some(p0), Some(p1)) => Some(p1 / p0 - 1.0),
        _ => None,
      })
      .collect();

    if let Some(row) = row {
      dates.push(cur.date);
      flat.extend(row);
    }
  }

  let values = Array2::from_shape_vec((dates.len(), n), flat)
    .map_err(|e| Error::invalid(format!("return matrix shape: {e}")))?;
  ReturnMatrix::new(dates, prices.symbols().to_vec(), values)
}

/// Column means and unbiased sample covariance of a `T x N` matrix.
pub fn mean_and_covariance(values: &Array2<f64>) -> (Array1<f64>, Array2<f64>) {
  let t = values.nrows();
  let n = values.ncols();
  if t == 0 {
    return (Array1::zeros(n), Array2::zeros((n, n)));
  }

  let mean = values
    .mean_axis(Axis(0))
    .unwrap_or_else(|| Array1::zeros(n));
  let centered = values - &mean;
  let mut cov = centered.t().dot(&centered);
  if t > 1 {
    cov /= (t - 1) as f64;
  } else {
    cov.fill(0.0);
  }

  // exact symmetry for downstream eigen-decomposition
  for i in 0..n {
    for j in (i + 1)..n {
      let avg = 0.5 * (cov[[i, j]] + cov[[j, i]]);
      cov[[i, j]] = avg;
      cov[[j, i]] = avg;
    }
  }

  (mean, cov)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;
  use crate::data::fixtures;
  use crate::data::PriceRow;
  use crate::error::ErrorKind;

  #[test]
  fn deserialization_rejects_mismatched_moments() {
    let prices = fixtures::random_walk_prices(20, &[0.0, 0.001], &[0.01, 0.02], 4);
    let stats = ReturnStatistics::compute(&prices).unwrap();
    let mut json: serde_json::Value = serde_json::to_value(&stats).unwrap();
    let back: ReturnStatistics = serde_json::from_value(json.clone()).unwrap();
    assert_eq!(back.symbols(), stats.symbols());
    assert_eq!(back.covariance.dim(), (2, 2));

    json["mean"] = serde_json::json!({"v": 1, "dim": [1], "data": [0.0]});
    let err = serde_json::from_value::<ReturnStatistics>(json).unwrap_err();
    assert!(err.to_string().contains("for 2 symbols"));
  }

  #[test]
  fn three_prices_give_two_returns() {
    let prices =
      PriceMatrix::from_columns(vec!["A".into()], fixtures::dates(3), &[vec![100.0, 101.0, 99.0]])
        .unwrap();
    let stats = ReturnStatistics::compute(&prices).unwrap();

    let r = stats.returns.column(0);
    assert_abs_diff_eq!(r[0], 0.01, epsilon = 1e-15);
    assert_abs_diff_eq!(r[1], 99.0 / 101.0 - 1.0, epsilon = 1e-15);
    assert_abs_diff_eq!(r[1], -0.0198, epsilon = 1e-4);
    assert_abs_diff_eq!(stats.mean[0], -0.00495, epsilon = 1e-5);
    assert_eq!(stats.returns.dates()[0], fixtures::dates(3)[1]);
  }

  #[test]
  fn fewer_than_two_returns_is_insufficient() {
    let prices =
      PriceMatrix::from_columns(vec!["A".into()], fixtures::dates(2), &[vec![100.0, 101.0]]).unwrap();
    let err = ReturnStatistics::compute(&prices).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientData);
  }

  #[test]
  fn gaps_drop_rows_for_all_symbols() {
    let d = fixtures::dates(5);
    let prices = PriceMatrix::new(
      vec!["A".into(), "B".into()],
      vec![
        PriceRow::dense(d[0], &[100.0, 50.0]),
        PriceRow::dense(d[1], &[101.0, 51.0]),
        PriceRow::new(d[2], vec![Some(102.0), None]),
        PriceRow::dense(d[3], &[103.0, 52.0]),
        PriceRow::dense(d[4], &[104.0, 53.0]),
      ],
    )
    .unwrap();

    let stats = ReturnStatistics::compute(&prices).unwrap();
    assert_eq!(stats.returns.dates(), &[d[1], d[4]]);
    assert_eq!(stats.dropped_rows, 2);
    assert_abs_diff_eq!(stats.returns.values()[[1, 0]], 104.0 / 103.0 - 1.0, epsilon = 1e-15);
  }

  #[test]
  fn fully_gapped_history_is_unavailable() {
    let d = fixtures::dates(3);
    let prices = PriceMatrix::new(
      vec!["A".into(), "B".into()],
      vec![
        PriceRow::new(d[0], vec![Some(1.0), None]),
        PriceRow::new(d[1], vec![None, Some(1.0)]),
        PriceRow::new(d[2], vec![Some(1.0), None]),
      ],
    )
    .unwrap();
    let err = ReturnStatistics::compute(&prices).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataUnavailable);
  }

  #[test]
  fn covariance_is_symmetric_sample_covariance() {
    let prices = fixtures::random_walk_prices(120, &[0.001, 0.0, 0.0005], &[0.01, 0.02, 0.015], 7);
    let stats = ReturnStatistics::compute(&prices).unwrap();
    let values = stats.returns.values();

    let a: Vec<f64> = values.column(0).to_vec();
    let b: Vec<f64> = values.column(1).to_vec();
    let (ma, mb) = (a.iter().sum::<f64>() / a.len() as f64, b.iter().sum::<f64>() / b.len() as f64);
    let cov_ab = a
      .iter()
      .zip(b.iter())
      .map(|(x, y)| (x - ma) * (y - mb))
      .sum::<f64>()
      / (a.len() - 1) as f64;

    assert_abs_diff_eq!(stats.covariance[[0, 1]], cov_ab, epsilon = 1e-15);
    assert_eq!(stats.covariance[[0, 1]], stats.covariance[[1, 0]]);
    let corr = stats.correlation();
    assert_eq!(corr[[2, 2]], 1.0);
    assert!(corr.iter().all(|c| c.abs() <= 1.0));
  }

  #[test]
  fn annualization_compounds_and_scales() {
    assert_abs_diff_eq!(annualize_return(0.001), 1.001_f64.powi(252) - 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(annualize_volatility(0.01), 0.01 * 252.0_f64.sqrt(), epsilon = 1e-15);
  }
}
