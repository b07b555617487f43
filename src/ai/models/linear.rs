//! # Linear Models
//!
//! $$
//! \min_{\beta_0,\beta}\ \frac{1}{2n}\lVert y-\beta_0-X\beta\rVert_2^2
//! +\alpha\rho\lVert\beta\rVert_1+\frac{\alpha(1-\rho)}{2}\lVert\beta\rVert_2^2
//! $$
//!
//! Least squares with optional L1/L2 penalties. The intercept is never penalized: every
//! model fits on column-centered data and recovers `beta_0 = mean(y) - mean(x)'beta`.

use anyhow::anyhow;
use anyhow::bail;
use anyhow::Result;
use nalgebra::Cholesky;
use nalgebra::DMatrix;
use nalgebra::DVector;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use tracing::warn;

use super::check_training_set;
use super::check_width;
use super::Regressor;

#[derive(Clone, Debug)]
struct Fitted {
  coef: Array1<f64>,
  intercept: f64,
}

impl Fitted {
  fn predict(&self, name: &str, x: &Array2<f64>) -> Result<Array1<f64>> {
    check_width(name, self.coef.len(), x)?;
    Ok(x.dot(&self.coef) + self.intercept)
  }
}

struct Centered {
  x: Array2<f64>,
  y: Array1<f64>,
  x_mean: Array1<f64>,
  y_mean: f64,
}

impl Centered {
  fn new(x: &Array2<f64>, y: &Array1<f64>) -> Result<Self> {
    check_training_set(x, y)?;
    let x_mean = x
      .mean_axis(Axis(0))
      .ok_or_else(|| anyhow!("cannot center an empty design matrix"))?;
    let y_mean = y.mean().unwrap_or(0.0);
    Ok(Self {
      x: x - &x_mean,
      y: y - y_mean,
      x_mean,
      y_mean,
    })
  }

  fn finish(self, coef: Array1<f64>) -> Fitted {
    let intercept = self.y_mean - self.x_mean.dot(&coef);
    Fitted { coef, intercept }
  }
}

fn to_dmatrix(x: &Array2<f64>) -> DMatrix<f64> {
  DMatrix::from_fn(x.nrows(), x.ncols(), |i, j| x[[i, j]])
}

fn to_dvector(y: &Array1<f64>) -> DVector<f64> {
  DVector::from_iterator(y.len(), y.iter().copied())
}

fn not_fitted(name: &str) -> anyhow::Error {
  anyhow!("{name} must be fitted before predicting")
}

/// Ordinary least squares, minimum-norm solution via SVD.
#[derive(Clone, Debug, Default)]
pub struct LinearRegression {
  fitted: Option<Fitted>,
}

impl LinearRegression {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn coefficients(&self) -> Option<(&Array1<f64>, f64)> {
    self.fitted.as_ref().map(|f| (&f.coef, f.intercept))
  }
}

impl Regressor for LinearRegression {
  fn name(&self) -> &'static str {
    "Linear Regression"
  }

  fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    let c = Centered::new(x, y)?;
    let svd = to_dmatrix(&c.x).svd(true, true);
    let eps = 1e-12 * svd.singular_values.max().max(1.0);
    let beta = svd
      .solve(&to_dvector(&c.y), eps)
      .map_err(|e| anyhow!("least squares solve failed: {e}"))?;
    self.fitted = Some(c.finish(Array1::from_iter(beta.iter().copied())));
    Ok(())
  }

  fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
    self
      .fitted
      .as_ref()
      .ok_or_else(|| not_fitted(self.name()))?
      .predict(self.name(), x)
  }
}

/// L2-penalized least squares, `(X'X + alpha I) beta = X'y` solved by Cholesky.
#[derive(Clone, Debug)]
pub struct RidgeRegression {
  alpha: f64,
  fitted: Option<Fitted>,
}

impl RidgeRegression {
  pub fn new(alpha: f64) -> Self {
    Self {
      alpha,
      fitted: None,
    }
  }
}

impl Regressor for RidgeRegression {
  fn name(&self) -> &'static str {
    "Ridge Regression"
  }

  fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if !(self.alpha > 0.0) {
      bail!("ridge alpha must be positive, got {}", self.alpha);
    }
    let c = Centered::new(x, y)?;
    let xm = to_dmatrix(&c.x);
    let mut gram = xm.transpose() * &xm;
    for i in 0..gram.nrows() {
      gram[(i, i)] += self.alpha;
    }
    let rhs = xm.transpose() * to_dvector(&c.y);
    let beta = Cholesky::new(gram)
      .ok_or_else(|| anyhow!("ridge normal equations are not positive definite"))?
      .solve(&rhs);
    self.fitted = Some(c.finish(Array1::from_iter(beta.iter().copied())));
    Ok(())
  }

  fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
    self
      .fitted
      .as_ref()
      .ok_or_else(|| not_fitted(self.name()))?
      .predict(self.name(), x)
  }
}

/// Elastic net by cyclic coordinate descent.
#[derive(Clone, Debug)]
pub struct ElasticNet {
  alpha: f64,
  l1_ratio: f64,
  max_iter: usize,
  tol: f64,
  fitted: Option<Fitted>,
}

impl ElasticNet {
  pub fn new(alpha: f64, l1_ratio: f64) -> Self {
    Self {
      alpha,
      l1_ratio,
      max_iter: 10_000,
      tol: 1e-10,
      fitted: None,
    }
  }

  pub fn coefficients(&self) -> Option<(&Array1<f64>, f64)> {
    self.fitted.as_ref().map(|f| (&f.coef, f.intercept))
  }

  fn solve(&self, c: &Centered) -> Result<Array1<f64>> {
    if !(self.alpha >= 0.0) || !(0.0..=1.0).contains(&self.l1_ratio) {
      bail!(
        "elastic net needs alpha >= 0 and l1_ratio in [0, 1], got {} and {}",
        self.alpha,
        self.l1_ratio
      );
    }

    let (n, p) = c.x.dim();
    let n = n as f64;
    let l1 = self.alpha * self.l1_ratio;
    let l2 = self.alpha * (1.0 - self.l1_ratio);
    let col_sq: Vec<f64> = c.x.columns().into_iter().map(|col| col.dot(&col) / n).collect();

    let mut beta = Array1::<f64>::zeros(p);
    let mut residual = c.y.clone();

    for _ in 0..self.max_iter {
      let mut max_delta = 0.0_f64;
      for j in 0..p {
        let denom = col_sq[j] + l2;
        if denom == 0.0 {
          continue;
        }
        let xj = c.x.column(j);
        let old = beta[j];
        let rho = xj.dot(&residual) / n + col_sq[j] * old;
        let new = soft_threshold(rho, l1) / denom;
        if new != old {
          residual.scaled_add(old - new, &xj);
          beta[j] = new;
          max_delta = max_delta.max((new - old).abs());
        }
      }
      if max_delta <= self.tol {
        return Ok(beta);
      }
    }

    warn!(
      max_iter = self.max_iter,
      "coordinate descent stopped at the iteration cap"
    );
    Ok(beta)
  }
}

impl Regressor for ElasticNet {
  fn name(&self) -> &'static str {
    "Elastic Net"
  }

  fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    let c = Centered::new(x, y)?;
    let beta = self.solve(&c)?;
    self.fitted = Some(c.finish(beta));
    Ok(())
  }

  fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
    self
      .fitted
      .as_ref()
      .ok_or_else(|| not_fitted(self.name()))?
      .predict(self.name(), x)
  }
}

/// Pure L1 penalty, an [`ElasticNet`] with `l1_ratio = 1`.
#[derive(Clone, Debug)]
pub struct LassoRegression {
  inner: ElasticNet,
}

impl LassoRegression {
  pub fn new(alpha: f64) -> Self {
    Self {
      inner: ElasticNet::new(alpha, 1.0),
    }
  }

  pub fn coefficients(&self) -> Option<(&Array1<f64>, f64)> {
    self.inner.coefficients()
  }
}

impl Regressor for LassoRegression {
  fn name(&self) -> &'static str {
    "Lasso Regression"
  }

  fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    self.inner.fit(x, y)
  }

  fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
    self
      .inner
      .fitted
      .as_ref()
      .ok_or_else(|| not_fitted(self.name()))?
      .predict(self.name(), x)
  }
}

fn soft_threshold(z: f64, gamma: f64) -> f64 {
  if z > gamma {
    z - gamma
  } else if z < -gamma {
    z + gamma
  } else {
    0.0
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;
  use crate::ai::models::fixtures;

  #[test]
  fn ols_recovers_exact_coefficients() {
    let (x, y) = fixtures::linear_dataset(50, 0.0, 11);
    let mut ols = LinearRegression::new();
    ols.fit(&x, &y).unwrap();
    let (coef, intercept) = ols.coefficients().unwrap();

    assert_abs_diff_eq!(intercept, 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(coef[0], 2.0, epsilon = 1e-9);
    assert_abs_diff_eq!(coef[1], -3.0, epsilon = 1e-9);
    assert_abs_diff_eq!(coef[2], 0.5, epsilon = 1e-9);
  }

  #[test]
  fn ols_tolerates_collinear_columns() {
    let x = array![[1.0, 2.0], [2.0, 4.0], [3.0, 6.0], [4.0, 8.0]];
    let y = array![1.0, 2.0, 3.0, 4.0];
    let mut ols = LinearRegression::new();
    ols.fit(&x, &y).unwrap();
    let pred = ols.predict(&x).unwrap();
    for (p, t) in pred.iter().zip(y.iter()) {
      assert_abs_diff_eq!(*p, *t, epsilon = 1e-9);
    }
  }

  #[test]
  fn ridge_matches_closed_form_in_one_dimension() {
    // centered x = [-1, 0, 1], y = [-2, 0, 2]: beta = 4 / (2 + 1)
    let x = array![[1.0], [2.0], [3.0]];
    let y = array![3.0, 5.0, 7.0];
    let mut ridge = RidgeRegression::new(1.0);
    ridge.fit(&x, &y).unwrap();
    let pred = ridge.predict(&array![[2.0], [3.0]]).unwrap();
    assert_abs_diff_eq!(pred[0], 5.0, epsilon = 1e-12);
    assert_abs_diff_eq!(pred[1], 5.0 + 4.0 / 3.0, epsilon = 1e-12);
  }

  #[test]
  fn lasso_shrinks_by_alpha_on_orthonormal_design() {
    // x'x / n = 1, x'y / n = 2: beta = S(2, 0.5) = 1.5
    let x = array![[1.0], [-1.0], [1.0], [-1.0]];
    let y = array![2.0, -2.0, 2.0, -2.0];
    let mut lasso = LassoRegression::new(0.5);
    lasso.fit(&x, &y).unwrap();
    let (coef, intercept) = lasso.coefficients().unwrap();
    assert_abs_diff_eq!(coef[0], 1.5, epsilon = 1e-12);
    assert_abs_diff_eq!(intercept, 0.0, epsilon = 1e-12);
  }

  #[test]
  fn large_alpha_zeroes_every_coefficient() {
    let (x, y) = fixtures::linear_dataset(80, 0.1, 2);
    let mut lasso = LassoRegression::new(100.0);
    lasso.fit(&x, &y).unwrap();
    let (coef, intercept) = lasso.coefficients().unwrap();
    assert!(coef.iter().all(|&b| b == 0.0));
    assert_abs_diff_eq!(intercept, y.mean().unwrap(), epsilon = 1e-12);
  }

  #[test]
  fn elastic_net_adds_ridge_shrinkage() {
    // beta = S(2, 0.25) / (1 + 0.25)
    let x = array![[1.0], [-1.0], [1.0], [-1.0]];
    let y = array![2.0, -2.0, 2.0, -2.0];
    let mut enet = ElasticNet::new(0.5, 0.5);
    enet.fit(&x, &y).unwrap();
    assert_abs_diff_eq!(enet.coefficients().unwrap().0[0], 1.75 / 1.25, epsilon = 1e-12);
  }

  #[test]
  fn constant_columns_are_skipped() {
    let x = array![[1.0, 5.0], [2.0, 5.0], [3.0, 5.0]];
    let y = array![1.0, 2.0, 3.0];
    let mut enet = ElasticNet::new(0.0, 0.5);
    enet.fit(&x, &y).unwrap();
    let (coef, _) = enet.coefficients().unwrap();
    assert_eq!(coef[1], 0.0);
    assert_abs_diff_eq!(coef[0], 1.0, epsilon = 1e-9);
  }

  #[test]
  fn width_mismatch_fails_prediction() {
    let (x, y) = fixtures::linear_dataset(20, 0.1, 2);
    let mut ridge = RidgeRegression::new(1.0);
    ridge.fit(&x, &y).unwrap();
    let err = ridge.predict(&array![[1.0, 2.0]]).unwrap_err();
    assert!(err.to_string().contains("3 features"));
  }
}
