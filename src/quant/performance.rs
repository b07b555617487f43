//! # Performance Metrics
//!
//! $$
//! C_t=\prod_{s\le t}(1+R_s),\quad
//! \text{CAGR}=C_T^{252/T}-1,\quad
//! \text{Sharpe}=\frac{\text{CAGR}}{\sigma_R\sqrt{252}}
//! $$
//!
//! Risk and return statistics of an arbitrary weighted allocation over a historical
//! return window. Weights are taken as given: they may be unnormalized or short, and the
//! engine reports whatever the arithmetic yields.

use ndarray_stats::QuantileExt;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::config::TRADING_DAYS;
use crate::data::time_series;
use crate::data::PriceMatrix;
use crate::data::ReturnMatrix;
use crate::data::TimePoint;
use crate::data::WeightVector;
use crate::error::Error;
use crate::error::Result;
use crate::stats::descriptive::cumulative_growth;
use crate::stats::descriptive::drawdown_series;
use crate::stats::descriptive::mean;
use crate::stats::descriptive::quantile;
use crate::stats::descriptive::sample_std;
use crate::stats::ReturnStatistics;

/// Tail probability for VaR and CVaR.
pub const VAR_LEVEL: f64 = 0.05;

/// Metrics and time series produced by [`PerformanceMetricsEngine::evaluate`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
  pub total_return: f64,
  pub cagr: f64,
  /// Annualized standard deviation of daily portfolio returns.
  pub volatility: f64,

  pub sharpe: f64,
  pub sortino: f64,
  pub calmar: f64,
  pub information_ratio: f64,

  /// Most negative drawdown (`<= 0`).
  pub max_drawdown: f64,
  pub ulcer_index: f64,
  pub pain_index: f64,
  pub recovery_factor: f64,

  pub win_rate: f64,
  pub profit_factor: f64,
  pub avg_win: f64,
  pub avg_loss: f64,
  pub best_day: f64,
  pub worst_day: f64,

  /// Daily standard deviation of the losing days.
  pub downside_deviation: f64,
  /// Annualized standard deviation of the losing days.
  pub downside_risk: f64,
  pub var_95: f64,
  pub cvar_95: f64,

  pub cumulative_returns: Vec<TimePoint>,
  pub daily_returns: Vec<TimePoint>,
  pub drawdown_series: Vec<TimePoint>,
}

/// Stateless backtest metrics engine.
#[derive(Clone, Copy, Debug, Default)]
pub struct PerformanceMetricsEngine;

impl PerformanceMetricsEngine {
  /// Evaluate `weights` over `returns`.
  ///
  /// The weight and return symbol sets must be identical (order does not matter).
  pub fn evaluate(weights: &WeightVector, returns: &ReturnMatrix) -> Result<PerformanceMetrics> {
    if returns.is_empty() {
      return Err(Error::InsufficientData {
        required: 1,
        actual: 0,
        context: "performance metrics",
      });
    }
    let w = weights.aligned_to(returns.symbols())?;
    if w.iter().any(|x| !x.is_finite()) {
      return Err(Error::invalid("weights must be finite"));
    }

    let daily = returns.portfolio_returns(&w);
    let r = daily.to_vec();
    let n = r.len();

    let cumulative = cumulative_growth(&r);
    let drawdown = drawdown_series(&cumulative);
    let last = cumulative[n - 1];
    let total_return = last - 1.0;

    let years = n as f64 / TRADING_DAYS;
    let cagr = if years > 0.0 {
      last.powf(1.0 / years) - 1.0
    } else {
      0.0
    };

    let sqrt_year = TRADING_DAYS.sqrt();
    let volatility = sample_std(&r) * sqrt_year;

    let wins: Vec<f64> = r.iter().copied().filter(|&x| x > 0.0).collect();
    let losses: Vec<f64> = r.iter().copied().filter(|&x| x < 0.0).collect();

    let downside_deviation = sample_std(&losses);
    let downside_risk = downside_deviation * sqrt_year;

    let max_drawdown = drawdown.iter().copied().fold(0.0, f64::min);
    let loss_sum: f64 = losses.iter().sum();

    let best_day = *daily
      .max()
      .map_err(|e| Error::invalid(format!("portfolio returns: {e}")))?;
    let worst_day = *daily
      .min()
      .map_err(|e| Error::invalid(format!("portfolio returns: {e}")))?;

    let var_95 = quantile(&r, VAR_LEVEL);
    let tail: Vec<f64> = r.iter().copied().filter(|&x| x <= var_95).collect();

    let metrics = PerformanceMetrics {
      total_return,
      cagr,
      volatility,
      sharpe: ratio(cagr, volatility),
      sortino: ratio(cagr, downside_risk),
      calmar: drawdown_ratio(cagr, max_drawdown),
      information_ratio: ratio(cagr, volatility),
      max_drawdown,
      ulcer_index: mean(&drawdown.iter().map(|d| d * d).collect::<Vec<f64>>()).sqrt(),
      pain_index: mean(&drawdown.iter().map(|d| d.abs()).collect::<Vec<f64>>()),
      recovery_factor: drawdown_ratio(total_return, max_drawdown),
      win_rate: wins.len() as f64 / n as f64,
      profit_factor: if !losses.is_empty() && loss_sum != 0.0 {
        wins.iter().sum::<f64>() / loss_sum.abs()
      } else {
        0.0
      },
      avg_win: mean(&wins),
      avg_loss: mean(&losses),
      best_day,
      worst_day,
      downside_deviation,
      downside_risk,
      var_95,
      cvar_95: mean(&tail),
      cumulative_returns: time_series(returns.dates(), &cumulative),
      daily_returns: time_series(returns.dates(), &r),
      drawdown_series: time_series(returns.dates(), &drawdown),
    };

    debug!(
      periods = n,
      total_return = metrics.total_return,
      sharpe = metrics.sharpe,
      max_drawdown = metrics.max_drawdown,
      "evaluated allocation"
    );
    Ok(metrics)
  }

  /// ReturnStatistics on `prices` followed by [`PerformanceMetricsEngine::evaluate`].
  pub fn evaluate_prices(weights: &WeightVector, prices: &PriceMatrix) -> Result<PerformanceMetrics> {
    let stats = ReturnStatistics::compute(prices)?;
    Self::evaluate(weights, &stats.returns)
  }
}

fn ratio(num: f64, denom: f64) -> f64 {
  if denom > 0.0 {
    num / denom
  } else {
    0.0
  }
}

fn drawdown_ratio(num: f64, max_drawdown: f64) -> f64 {
  if max_drawdown != 0.0 {
    num / max_drawdown.abs()
  } else {
    0.0
  }
}
