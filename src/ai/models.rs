//! # Models
//!
//! $$
//! \hat y = f_\theta(\mathbf{x}),\qquad \theta=\arg\min_\theta \sum_i \ell(y_i,f_\theta(\mathbf{x}_i))+\Omega(\theta)
//! $$
//!
//! The fixed regressor roster evaluated by the model pipeline.

pub mod ensemble;
pub mod linear;
pub mod tree;

use std::fmt;

use anyhow::bail;
use anyhow::Result;
use ndarray::Array1;
use ndarray::Array2;
use serde::Deserialize;
use serde::Serialize;

pub use ensemble::GradientBoosting;
pub use ensemble::RandomForest;
pub use ensemble::XGBoost;
pub use linear::ElasticNet;
pub use linear::LassoRegression;
pub use linear::LinearRegression;
pub use linear::RidgeRegression;

/// Supervised regressor on a dense design matrix.
pub trait Regressor: Send + Sync {
  fn name(&self) -> &'static str;

  fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

  fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;
}

/// Roster entry. Declaration order is evaluation order and the selection tie-break.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
  LinearRegression,
  RidgeRegression,
  LassoRegression,
  ElasticNet,
  RandomForest,
  GradientBoosting,
  XGBoost,
}

impl ModelKind {
  pub const ROSTER: [ModelKind; 7] = [
    ModelKind::LinearRegression,
    ModelKind::RidgeRegression,
    ModelKind::LassoRegression,
    ModelKind::ElasticNet,
    ModelKind::RandomForest,
    ModelKind::GradientBoosting,
    ModelKind::XGBoost,
  ];

  pub fn name(self) -> &'static str {
    match self {
      ModelKind::LinearRegression => "Linear Regression",
      ModelKind::RidgeRegression => "Ridge Regression",
      ModelKind::LassoRegression => "Lasso Regression",
      ModelKind::ElasticNet => "Elastic Net",
      ModelKind::RandomForest => "Random Forest",
      ModelKind::GradientBoosting => "Gradient Boosting",
      ModelKind::XGBoost => "XGBoost",
    }
  }

  /// Fresh, unfitted regressor with the roster hyperparameters.
  pub fn build(self, seed: u64) -> Box<dyn Regressor> {
    match self {
      ModelKind::LinearRegression => Box::new(LinearRegression::new()),
      ModelKind::RidgeRegression => Box::new(RidgeRegression::new(1.0)),
      ModelKind::LassoRegression => Box::new(LassoRegression::new(0.1)),
      ModelKind::ElasticNet => Box::new(ElasticNet::new(0.1, 0.5)),
      ModelKind::RandomForest => Box::new(RandomForest::new(100, 10, seed)),
      ModelKind::GradientBoosting => Box::new(GradientBoosting::new(100, 5, 0.1)),
      ModelKind::XGBoost => Box::new(XGBoost::new(100, 5, 0.1, 1.0)),
    }
  }
}

impl fmt::Display for ModelKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// Shape checks shared by every `fit`.
pub(crate) fn check_training_set(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
  if x.nrows() == 0 {
    bail!("cannot fit on an empty training set");
  }
  if x.nrows() != y.len() {
    bail!("design matrix has {} rows but target has {}", x.nrows(), y.len());
  }
  if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
    bail!("training data must be finite");
  }
  Ok(())
}

/// Width check shared by every `predict`.
pub(crate) fn check_width(name: &str, expected: usize, x: &Array2<f64>) -> Result<()> {
  if x.ncols() != expected {
    bail!("{name} was fitted on {expected} features, got {}", x.ncols());
  }
  Ok(())
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn roster_is_ordered_and_named() {
    let names: Vec<&str> = ModelKind::ROSTER.iter().map(|k| k.name()).collect();
    assert_eq!(
      names,
      [
        "Linear Regression",
        "Ridge Regression",
        "Lasso Regression",
        "Elastic Net",
        "Random Forest",
        "Gradient Boosting",
        "XGBoost"
      ]
    );
    for kind in ModelKind::ROSTER {
      assert_eq!(kind.build(0).name(), kind.name());
    }
  }

  #[test]
  fn every_model_fits_a_linear_signal() {
    let (x, y) = fixtures::linear_dataset(200, 0.1, 3);
    for kind in ModelKind::ROSTER {
      let mut model = kind.build(42);
      model.fit(&x, &y).unwrap();
      let pred = model.predict(&x).unwrap();
      assert_eq!(pred.len(), 200);
      let var = y.var(0.0);
      assert!(fixtures::mse(&pred, &y) < var, "{kind} does not beat the mean");
    }
  }

  #[test]
  fn predicting_before_fit_fails() {
    let (x, _) = fixtures::linear_dataset(5, 0.0, 1);
    for kind in ModelKind::ROSTER {
      assert!(kind.build(1).predict(&x).is_err(), "{kind}");
    }
  }

  #[test]
  fn mismatched_training_shapes_fail() {
    let (x, y) = fixtures::linear_dataset(10, 0.0, 1);
    let y = y.slice(ndarray::s![..9]).to_owned();
    assert!(check_training_set(&x, &y).is_err());
  }
}
