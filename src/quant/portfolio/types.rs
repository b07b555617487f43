//! # Portfolio Types
//!
//! $$
//! \mathbf{w}^\*=\arg\max_{\mathbf{w}\in\Delta} \ \mathbf{w}^\top\mu-\lambda\,\mathbf{w}^\top\Sigma\mathbf{w}-\tfrac12 D
//! $$
//!
//! Shared enums and result containers for portfolio optimization.

use std::fmt;

use ndarray::Array2;
use serde::Deserialize;
use serde::Serialize;

use crate::data::WeightVector;

/// Objective used for an optimization run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerMethod {
  /// `w'mu - lambda * w'Sigma w`.
  MeanVariance,
  /// Mean-variance with the constant `0.5 * maxDrawdown^2` penalty of the equal-weight history.
  MeanVarianceWithDrawdownPenalty,
}

impl fmt::Display for OptimizerMethod {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      OptimizerMethod::MeanVariance => write!(f, "Mean-Variance"),
      OptimizerMethod::MeanVarianceWithDrawdownPenalty => {
        write!(f, "Mean-Variance with Drawdown Penalty")
      }
    }
  }
}

/// Output of a portfolio optimization run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
  /// Long-only, fully invested weights.
  pub weights: WeightVector,
  /// Model expected daily return `w'mu`.
  pub expected_return: f64,
  /// `(1 + expected_return)^252 - 1`.
  pub annualized_return: f64,
  /// Model daily volatility `sqrt(w'Sigma w)`.
  pub volatility: f64,
  pub annualized_volatility: f64,
  /// Daily `expected_return / volatility`, 0 when volatility is 0.
  pub sharpe: f64,
  pub annualized_sharpe: f64,
  /// Daily return over downside deviation.
  pub sortino: f64,
  pub annualized_sortino: f64,
  /// Sample std of the negative days of the solution's return path, or total volatility
  /// when there are none.
  pub downside_risk: f64,
  pub annualized_downside_risk: f64,
  /// Most negative drawdown of the solution's historical path.
  pub max_drawdown: f64,
  /// `annualized_return / |max_drawdown|`, 0 when there is no drawdown.
  pub calmar: f64,
  /// `maxDrawdown^2` of the equal-weight history, 0 when not requested.
  pub drawdown_penalty: f64,
  /// Objective value at the solution.
  pub objective: f64,
  pub risk_tolerance: f64,
  /// Solver iterations spent (0 for closed-form cases).
  pub iterations: usize,
  /// Covariance matrix the weights were optimized against.
  pub covariance: Array2<f64>,
  pub method: OptimizerMethod,
}
