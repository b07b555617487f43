//! # Features
//!
//! $$
//! \text{RSI}_t = 100-\frac{100}{1+\overline{G}_{14}/\overline{L}_{14}},\qquad
//! \text{MACD}_t=\frac{\text{EMA}_{12}(p)_t-\text{EMA}_{26}(p)_t}{p_t}
//! $$
//!
//! Technical features per symbol and the portfolio-level next-period return target.
//! Every symbol contributes the same 13 columns in a fixed order; rows whose rolling
//! windows are not yet resolved, and the last row (which has no next period), are dropped.

use chrono::NaiveDate;
use ndarray::Array1;
use ndarray::Array2;
use tracing::debug;

use crate::data::PriceMatrix;
use crate::error::Error;
use crate::error::Result;
use crate::stats::descriptive::mean;
use crate::stats::descriptive::sample_std;

/// Lags of the k-period simple return features.
pub const RETURN_LAGS: [usize; 5] = [1, 2, 3, 5, 10];
/// Windows of the `MA(w) / price` features.
pub const MA_WINDOWS: [usize; 3] = [5, 10, 20];
/// Windows of the rolling one-period return volatility features.
pub const VOL_WINDOWS: [usize; 3] = [5, 10, 20];
pub const RSI_PERIOD: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;

/// Columns generated for each symbol.
pub const FEATURES_PER_SYMBOL: usize = RETURN_LAGS.len() + MA_WINDOWS.len() + VOL_WINDOWS.len() + 2;

/// Aligned design matrix and target.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureSet {
  /// Date of each row; the target is the return from this date to the next.
  pub dates: Vec<NaiveDate>,
  pub names: Vec<String>,
  pub features: Array2<f64>,
  pub target: Array1<f64>,
}

impl FeatureSet {
  pub fn len(&self) -> usize {
    self.target.len()
  }

  pub fn is_empty(&self) -> bool {
    self.target.is_empty()
  }
}

/// Number of leading price rows needed before every feature is defined.
pub fn warmup() -> usize {
  let lag = RETURN_LAGS.iter().copied().max().unwrap_or(0);
  let ma = MA_WINDOWS.iter().map(|w| w - 1).max().unwrap_or(0);
  let vol = VOL_WINDOWS.iter().copied().max().unwrap_or(0);
  lag.max(ma).max(vol).max(RSI_PERIOD)
}

/// Column names in design-matrix order.
pub fn feature_names(symbols: &[String]) -> Vec<String> {
  let mut names = Vec::with_capacity(symbols.len() * FEATURES_PER_SYMBOL);
  for s in symbols {
    for lag in RETURN_LAGS {
      names.push(format!("{s}_return_lag_{lag}"));
    }
    for w in MA_WINDOWS {
      names.push(format!("{s}_ma_{w}"));
    }
    for w in VOL_WINDOWS {
      names.push(format!("{s}_vol_{w}"));
    }
    names.push(format!("{s}_rsi"));
    names.push(format!("{s}_macd"));
  }
  names
}

/// Build features and the cross-sectional mean next-period return from aligned prices.
pub fn build_features(prices: &PriceMatrix) -> Result<FeatureSet> {
  let (all_dates, p) = prices.dense();
  if p.nrows() == 0 {
    return Err(Error::DataUnavailable(
      "no price row has a quote for every symbol".into(),
    ));
  }

  let t_len = p.nrows();
  let n_sym = p.ncols();
  let columns: Vec<Vec<f64>> = (0..n_sym).map(|j| p.column(j).to_vec()).collect();
  let rsi_at = |j: usize, t: usize| rsi(&columns[j][t - RSI_PERIOD..=t]);

  // rows whose RSI window has no price change are dropped with the warm-up rows
  let candidates = warmup()..t_len.saturating_sub(1);
  let rows: Vec<usize> = candidates
    .clone()
    .filter(|&t| (0..n_sym).all(|j| rsi_at(j, t).is_some()))
    .collect();
  let flat_rows = candidates.len() - rows.len();
  let mut features = Array2::<f64>::zeros((rows.len(), n_sym * FEATURES_PER_SYMBOL));

  for (j, col) in columns.iter().enumerate() {
    let returns = one_period_returns(&col);
    let fast = ewma(&col, MACD_FAST);
    let slow = ewma(&col, MACD_SLOW);

    for (r, &t) in rows.iter().enumerate() {
      let mut k = j * FEATURES_PER_SYMBOL;
      for lag in RETURN_LAGS {
        features[[r, k]] = col[t] / col[t - lag] - 1.0;
        k += 1;
      }
      for w in MA_WINDOWS {
        features[[r, k]] = mean(&col[t + 1 - w..=t]) / col[t];
        k += 1;
      }
      for w in VOL_WINDOWS {
        features[[r, k]] = sample_std(&returns[t + 1 - w..=t]);
        k += 1;
      }
      features[[r, k]] = rsi_at(j, t).unwrap_or(f64::NAN);
      features[[r, k + 1]] = (fast[t] - slow[t]) / col[t];
    }
  }

  let target = Array1::from_iter(rows.iter().map(|&t| {
    (0..n_sym).map(|j| p[[t + 1, j]] / p[[t, j]] - 1.0).sum::<f64>() / n_sym as f64
  }));
  let dates = rows.iter().map(|&t| all_dates[t]).collect();

  debug!(
    price_rows = t_len,
    feature_rows = rows.len(),
    flat_rows,
    columns = features.ncols(),
    "built feature matrix"
  );

  Ok(FeatureSet {
    dates,
    names: feature_names(prices.symbols()),
    features,
    target,
  })
}

/// `r_s = p_s / p_{s-1} - 1`, with `r_0 = 0`.
fn one_period_returns(prices: &[f64]) -> Vec<f64> {
  let mut out = Vec::with_capacity(prices.len());
  out.push(0.0);
  out.extend(prices.windows(2).map(|w| w[1] / w[0] - 1.0));
  out
}

/// Bias-adjusted exponentially weighted mean with `alpha = 2 / (span + 1)`.
fn ewma(xs: &[f64], span: usize) -> Vec<f64> {
  let decay = 1.0 - 2.0 / (span as f64 + 1.0);
  let mut num = 0.0;
  let mut den = 0.0;
  xs.iter()
    .map(|&x| {
      num = x + decay * num;
      den = 1.0 + decay * den;
      num / den
    })
    .collect()
}

/// RSI over the price changes inside `window` (`RSI_PERIOD + 1` prices); `None` when
/// every change is zero.
fn rsi(window: &[f64]) -> Option<f64> {
  let n = (window.len() - 1) as f64;
  let (gain, loss) = window.windows(2).fold((0.0, 0.0), |(g, l), w| {
    let d = w[1] - w[0];
    if d > 0.0 {
      (g + d, l)
    } else {
      (g, l - d)
    }
  });
  let (gain, loss) = (gain / n, loss / n);

  match (gain == 0.0, loss == 0.0) {
    (true, true) => None,
    (false, true) => Some(100.0),
    _ => Some(100.0 - 100.0 / (1.0 + gain / loss)),
  }
}
