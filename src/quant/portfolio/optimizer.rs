//! # Mean-Variance Optimizer
//!
//! $$
//! \max_{\mathbf{w}} \ \mathbf{w}^\top\mu-\lambda\,\mathbf{w}^\top\Sigma\mathbf{w}-\tfrac12 D
//! \quad\text{s.t.}\quad \mathbf 1^\top\mathbf{w}=1,\ \mathbf{w}\ge 0
//! $$
//!
//! Long-only, fully invested mean-variance allocation. The program is a convex QP over the
//! probability simplex and is solved with accelerated projected gradient ascent using the
//! exact Euclidean projection onto the simplex, so the returned weights are feasible to
//! machine precision and globally optimal for any positive-semidefinite Σ.

use nalgebra::DMatrix;
use ndarray::Array1;
use ndarray::Array2;
use ordered_float::OrderedFloat;
use tracing::debug;
use tracing::info;

use super::types::OptimizationResult;
use super::types::OptimizerMethod;
use crate::config::OptimizerConfig;
use crate::config::TRADING_DAYS;
use crate::data::PriceMatrix;
use crate::data::ReturnMatrix;
use crate::data::WeightVector;
use crate::error::Error;
use crate::error::Result;
use crate::stats::annualize_return;
use crate::stats::descriptive::max_drawdown;
use crate::stats::descriptive::sample_std;
use crate::stats::ReturnStatistics;

/// Stateless mean-variance engine.
#[derive(Clone, Debug, Default)]
pub struct MeanVarianceOptimizer {
  config: OptimizerConfig,
}

impl MeanVarianceOptimizer {
  /// Construct a new optimizer with validated configuration.
  pub fn new(config: OptimizerConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self { config })
  }

  /// Borrow optimizer configuration.
  pub fn config(&self) -> &OptimizerConfig {
    &self.config
  }

  /// Optimize against the μ, Σ and return history of a [`ReturnStatistics`].
  pub fn optimize(&self, stats: &ReturnStatistics) -> Result<OptimizationResult> {
    self.optimize_parts(&stats.mean, &stats.covariance, &stats.returns)
  }

  /// Optimize with explicit μ and Σ. `returns` supplies the historical path used for the
  /// drawdown penalty and for the realized Sortino/drawdown figures of the solution.
  pub fn optimize_parts(
    &self,
    mu: &Array1<f64>,
    cov: &Array2<f64>,
    returns: &ReturnMatrix,
  ) -> Result<OptimizationResult> {
    validate_inputs(mu, cov, returns)?;

    let n = mu.len();
    let lambda = 1.0 - self.config.risk_tolerance;
    let lambda_max = covariance_spectrum(cov)?;

    let (w, iterations) = if n == 1 {
      (vec![1.0], 0)
    } else if lambda * lambda_max <= f64::MIN_POSITIVE {
      (linear_vertex(mu), 0)
    } else {
      self.solve_qp(mu, cov, lambda, 2.0 * lambda * lambda_max)?
    };

    let drawdown_penalty = if self.config.include_drawdown_penalty {
      equal_weight_drawdown_penalty(returns)
    } else {
      0.0
    };
    let method = if self.config.include_drawdown_penalty {
      OptimizerMethod::MeanVarianceWithDrawdownPenalty
    } else {
      OptimizerMethod::MeanVariance
    };

    let weights = WeightVector::new(returns.symbols().to_vec(), w)?;
    let result = summarize(
      weights,
      mu,
      cov,
      returns,
      lambda,
      self.config.risk_tolerance,
      drawdown_penalty,
      iterations,
      method,
    );

    info!(
      assets = n,
      risk_tolerance = self.config.risk_tolerance,
      iterations,
      expected_return = result.expected_return,
      volatility = result.volatility,
      "mean-variance optimization converged"
    );
    Ok(result)
  }

  /// FISTA with gradient-based adaptive restart on the simplex.
  fn solve_qp(
    &self,
    mu: &Array1<f64>,
    cov: &Array2<f64>,
    lambda: f64,
    lipschitz: f64,
  ) -> Result<(Vec<f64>, usize)> {
    let n = mu.len();
    let step = 1.0 / lipschitz;
    let gradient = |w: &Array1<f64>| mu - &(cov.dot(w) * (2.0 * lambda));

    let mut w = Array1::from_elem(n, 1.0 / n as f64);
    let mut y = w.clone();
    let mut t = 1.0_f64;

    for k in 1..=self.config.max_iters {
      let g = gradient(&y);
      let ascent = &y + &(&g * step);
      let w_next = Array1::from(project_simplex(&ascent.to_vec()));

      let mapping = &w_next - &y;
      let residual = mapping.iter().fold(0.0_f64, |m, d| m.max(d.abs()));
      let scale = g.iter().fold(1.0_f64, |m, d| m.max((d * step).abs()));
      if residual <= self.config.tolerance * scale {
        debug!(iterations = k, residual, "projected gradient converged");
        return Ok((w_next.to_vec(), k));
      }

      let momentum = &w_next - &w;
      if mapping.dot(&momentum) < 0.0 {
        t = 1.0;
        y = w_next.clone();
      } else {
        let t_next = 0.5 * (1.0 + (1.0 + 4.0 * t * t).sqrt());
        y = &w_next + &(&momentum * ((t - 1.0) / t_next));
        t = t_next;
      }
      w = w_next;
    }

    Err(Error::OptimizationFailure(format!(
      "projected gradient did not converge within {} iterations",
      self.config.max_iters
    )))
  }
}

/// ReturnStatistics followed by [`MeanVarianceOptimizer::optimize`].
pub fn optimize_prices(prices: &PriceMatrix, config: &OptimizerConfig) -> Result<OptimizationResult> {
  let stats = ReturnStatistics::compute(prices)?;
  MeanVarianceOptimizer::new(config.clone())?.optimize(&stats)
}

/// Euclidean projection onto `{w : sum(w) = 1, w >= 0}` (Duchi et al., 2008).
pub fn project_simplex(v: &[f64]) -> Vec<f64> {
  if v.is_empty() {
    return Vec::new();
  }

  let mut u = v.to_vec();
  u.sort_by_key(|&x| std::cmp::Reverse(OrderedFloat(x)));

  let mut cumsum = 0.0;
  let mut theta = 0.0;
  for (j, &uj) in u.iter().enumerate() {
    cumsum += uj;
    let candidate = (cumsum - 1.0) / (j + 1) as f64;
    if uj - candidate > 0.0 {
      theta = candidate;
    }
  }

  v.iter().map(|&x| (x - theta).max(0.0)).collect()
}

/// `maxDrawdown^2` of the equal-weight historical portfolio.
pub fn equal_weight_drawdown_penalty(returns: &ReturnMatrix) -> f64 {
  let ew = returns.equal_weight_returns();
  max_drawdown(&ew.to_vec()).powi(2)
}

fn validate_inputs(mu: &Array1<f64>, cov: &Array2<f64>, returns: &ReturnMatrix) -> Result<()> {
  let n = mu.len();
  if n == 0 {
    return Err(Error::invalid("cannot optimize an empty asset universe"));
  }
  if cov.nrows() != n || cov.ncols() != n {
    return Err(Error::invalid(format!(
      "covariance is {}x{} for {} expected returns",
      cov.nrows(),
      cov.ncols(),
      n
    )));
  }
  if returns.ncols() != n {
    return Err(Error::invalid(format!(
      "return history has {} columns for {} assets",
      returns.ncols(),
      n
    )));
  }
  if returns.is_empty() {
    return Err(Error::InsufficientData {
      required: 1,
      actual: 0,
      context: "optimizer return history",
    });
  }
  if mu.iter().chain(cov.iter()).any(|v| !v.is_finite()) {
    return Err(Error::invalid("expected returns and covariance must be finite"));
  }

  let scale = cov.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
  for i in 0..n {
    for j in (i + 1)..n {
      if (cov[[i, j]] - cov[[j, i]]).abs() > 1e-10 * scale {
        return Err(Error::invalid(format!(
          "covariance is not symmetric at ({i}, {j})"
        )));
      }
    }
  }
  Ok(())
}

/// Largest eigenvalue of Σ, failing when Σ has a materially negative eigenvalue.
fn covariance_spectrum(cov: &Array2<f64>) -> Result<f64> {
  let n = cov.nrows();
  let m = DMatrix::from_fn(n, n, |i, j| cov[[i, j]]);
  let eigen = m.symmetric_eigen();
  let lambda_max = eigen.eigenvalues.max();
  let lambda_min = eigen.eigenvalues.min();

  if lambda_min < -1e-10 * lambda_max.abs().max(1.0) {
    return Err(Error::OptimizationFailure(format!(
      "covariance matrix is not positive semidefinite (min eigenvalue {lambda_min:e})"
    )));
  }
  Ok(lambda_max.max(0.0))
}

/// Vertex solution of the linear program `max w'mu` over the simplex; first maximum wins.
fn linear_vertex(mu: &Array1<f64>) -> Vec<f64> {
  let mut best = 0;
  for (i, &m) in mu.iter().enumerate() {
    if m > mu[best] {
      best = i;
    }
  }
  let mut w = vec![0.0; mu.len()];
  w[best] = 1.0;
  w
}

#[allow(clippy::too_many_arguments)]
fn summarize(
  weights: WeightVector,
  mu: &Array1<f64>,
  cov: &Array2<f64>,
  returns: &ReturnMatrix,
  lambda: f64,
  risk_tolerance: f64,
  drawdown_penalty: f64,
  iterations: usize,
  method: OptimizerMethod,
) -> OptimizationResult {
  let w = Array1::from(weights.weights().to_vec());
  let expected_return = w.dot(mu);
  let variance = w.dot(&cov.dot(&w)).max(0.0);
  let volatility = variance.sqrt();

  let path = returns.portfolio_returns(weights.weights()).to_vec();
  let downside: Vec<f64> = path.iter().copied().filter(|&r| r < 0.0).collect();
  let downside_risk = if downside.is_empty() {
    volatility
  } else {
    sample_std(&downside)
  };
  let max_drawdown = max_drawdown(&path);

  let sqrt_year = TRADING_DAYS.sqrt();
  let annualized_return = annualize_return(expected_return);
  let annualized_volatility = volatility * sqrt_year;
  let annualized_downside_risk = downside_risk * sqrt_year;

  OptimizationResult {
    weights,
    expected_return,
    annualized_return,
    volatility,
    annualized_volatility,
    sharpe: ratio(expected_return, volatility),
    annualized_sharpe: ratio(annualized_return, annualized_volatility),
    sortino: ratio(expected_return, downside_risk),
    annualized_sortino: ratio(annualized_return, annualized_downside_risk),
    downside_risk,
    annualized_downside_risk,
    max_drawdown,
    calmar: if max_drawdown != 0.0 {
      annualized_return / max_drawdown.abs()
    } else {
      0.0
    },
    drawdown_penalty,
    objective: expected_return - lambda * variance - 0.5 * drawdown_penalty,
    risk_tolerance,
    iterations,
    covariance: cov.clone(),
    method,
  }
}

fn ratio(num: f64, denom: f64) -> f64 {
  if denom > 0.0 {
    num / denom
  } else {
    0.0
  }
}
