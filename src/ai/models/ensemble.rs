//! # Tree Ensembles
//!
//! $$
//! F_M(\mathbf{x}) = F_0 + \nu\sum_{m=1}^M f_m(\mathbf{x})
//! $$
//!
//! Bagged and boosted regression trees. All three are additive in their trees: the
//! forest averages (`F_0 = 0`, `nu = 1/M`), the boosters shrink each stage by the
//! learning rate starting from the training mean.

use anyhow::anyhow;
use anyhow::Result;
use ndarray::Array1;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rayon::prelude::*;

use super::check_training_set;
use super::check_width;
use super::tree::RegressionTree;
use super::tree::TreeParams;
use super::Regressor;

#[derive(Clone, Debug)]
struct Additive {
  base: f64,
  scale: f64,
  trees: Vec<RegressionTree>,
  n_features: usize,
}

impl Additive {
  fn predict(&self, name: &str, x: &Array2<f64>) -> Result<Array1<f64>> {
    check_width(name, self.n_features, x)?;
    let mut out = Array1::from_elem(x.nrows(), self.base);
    for tree in &self.trees {
      out.scaled_add(self.scale, &tree.predict(x));
    }
    Ok(out)
  }
}

fn predict_fitted(name: &str, fitted: Option<&Additive>, x: &Array2<f64>) -> Result<Array1<f64>> {
  fitted
    .ok_or_else(|| anyhow!("{name} must be fitted before predicting"))?
    .predict(name, x)
}

/// Bootstrap-aggregated CART trees, grown in parallel.
#[derive(Clone, Debug)]
pub struct RandomForest {
  n_trees: usize,
  max_depth: usize,
  seed: u64,
  fitted: Option<Additive>,
}

impl RandomForest {
  pub fn new(n_trees: usize, max_depth: usize, seed: u64) -> Self {
    Self {
      n_trees,
      max_depth,
      seed,
      fitted: None,
    }
  }
}

impl Regressor for RandomForest {
  fn name(&self) -> &'static str {
    "Random Forest"
  }

  fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    check_training_set(x, y)?;
    if self.n_trees == 0 {
      return Err(anyhow!("random forest needs at least one tree"));
    }
    let n = x.nrows();
    let target = y.to_vec();

    // per-tree seeds keep the forest independent of the thread count
    let trees: Vec<RegressionTree> = (0..self.n_trees)
      .into_par_iter()
      .map(|t| {
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(t as u64));
        let rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
        RegressionTree::fit_mean(x, &target, &rows, self.max_depth)
      })
      .collect();

    self.fitted = Some(Additive {
      base: 0.0,
      scale: 1.0 / self.n_trees as f64,
      trees,
      n_features: x.ncols(),
    });
    Ok(())
  }

  fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
    predict_fitted(self.name(), self.fitted.as_ref(), x)
  }
}

/// Squared-loss gradient boosting on residuals.
#[derive(Clone, Debug)]
pub struct GradientBoosting {
  n_stages: usize,
  max_depth: usize,
  learning_rate: f64,
  fitted: Option<Additive>,
}

impl GradientBoosting {
  pub fn new(n_stages: usize, max_depth: usize, learning_rate: f64) -> Self {
    Self {
      n_stages,
      max_depth,
      learning_rate,
      fitted: None,
    }
  }
}

impl Regressor for GradientBoosting {
  fn name(&self) -> &'static str {
    "Gradient Boosting"
  }

  fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    check_training_set(x, y)?;
    let base = y.mean().unwrap_or(0.0);
    let rows: Vec<usize> = (0..x.nrows()).collect();
    let mut f = Array1::from_elem(x.nrows(), base);
    let mut trees = Vec::with_capacity(self.n_stages);

    for _ in 0..self.n_stages {
      let residual = (y - &f).to_vec();
      let tree = RegressionTree::fit_mean(x, &residual, &rows, self.max_depth);
      f.scaled_add(self.learning_rate, &tree.predict(x));
      trees.push(tree);
    }

    self.fitted = Some(Additive {
      base,
      scale: self.learning_rate,
      trees,
      n_features: x.ncols(),
    });
    Ok(())
  }

  fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
    predict_fitted(self.name(), self.fitted.as_ref(), x)
  }
}

/// Second-order boosting with an L2 leaf penalty, in the manner of XGBoost.
#[derive(Clone, Debug)]
pub struct XGBoost {
  n_rounds: usize,
  eta: f64,
  params: TreeParams,
  fitted: Option<Additive>,
}

impl XGBoost {
  pub fn new(n_rounds: usize, max_depth: usize, eta: f64, lambda: f64) -> Self {
    Self {
      n_rounds,
      eta,
      params: TreeParams {
        max_depth,
        lambda,
        gamma: 0.0,
        min_child_weight: 1.0,
      },
      fitted: None,
    }
  }
}

impl Regressor for XGBoost {
  fn name(&self) -> &'static str {
    "XGBoost"
  }

  fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    check_training_set(x, y)?;
    let base = y.mean().unwrap_or(0.0);
    let rows: Vec<usize> = (0..x.nrows()).collect();
    let hess = vec![1.0; x.nrows()];
    let mut f = Array1::from_elem(x.nrows(), base);
    let mut trees = Vec::with_capacity(self.n_rounds);

    for _ in 0..self.n_rounds {
      // squared loss: g = F - y, h = 1
      let grad = (&f - y).to_vec();
      let tree = RegressionTree::grow(x, &grad, &hess, &rows, &self.params);
      f.scaled_add(self.eta, &tree.predict(x));
      trees.push(tree);
    }

    self.fitted = Some(Additive {
      base,
      scale: self.eta,
      trees,
      n_features: x.ncols(),
    });
    Ok(())
  }

  fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
    predict_fitted(self.name(), self.fitted.as_ref(), x)
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;
  use crate::ai::models::fixtures;

  #[test]
  fn forest_is_deterministic_for_a_seed() {
    let (x, y) = fixtures::linear_dataset(120, 0.3, 4);
    let mut a = RandomForest::new(20, 6, 7);
    let mut b = RandomForest::new(20, 6, 7);
    a.fit(&x, &y).unwrap();
    b.fit(&x, &y).unwrap();
    assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());

    let mut c = RandomForest::new(20, 6, 8);
    c.fit(&x, &y).unwrap();
    assert_ne!(a.predict(&x).unwrap(), c.predict(&x).unwrap());
  }

  #[test]
  fn forest_prediction_stays_within_target_range() {
    let (x, y) = fixtures::step_dataset(60);
    let mut forest = RandomForest::new(30, 4, 1);
    forest.fit(&x, &y).unwrap();
    let pred = forest.predict(&x).unwrap();
    assert!(pred.iter().all(|&p| (-1.0..=3.0).contains(&p)));
  }

  #[test]
  fn boosting_converges_on_a_step() {
    let (x, y) = fixtures::step_dataset(40);
    let mut gb = GradientBoosting::new(100, 2, 0.1);
    gb.fit(&x, &y).unwrap();
    let pred = gb.predict(&x).unwrap();
    // residual shrinks by (1 - 0.1) per stage: 2 * 0.9^100
    for (p, t) in pred.iter().zip(y.iter()) {
      assert_abs_diff_eq!(*p, *t, epsilon = 1e-3);
    }
  }

  #[test]
  fn zero_stages_predict_the_mean() {
    let (x, y) = fixtures::step_dataset(10);
    let mut gb = GradientBoosting::new(0, 3, 0.1);
    gb.fit(&x, &y).unwrap();
    assert!(gb.predict(&x).unwrap().iter().all(|&p| p == 1.0));
  }

  #[test]
  fn xgboost_leaf_penalty_slows_fitting() {
    let (x, y) = fixtures::step_dataset(6);
    let mut loose = XGBoost::new(5, 1, 0.5, 0.0);
    let mut tight = XGBoost::new(5, 1, 0.5, 10.0);
    loose.fit(&x, &y).unwrap();
    tight.fit(&x, &y).unwrap();

    let err = |m: &XGBoost| fixtures::mse(&m.predict(&x).unwrap(), &y);
    assert!(err(&tight) > err(&loose));
  }

  #[test]
  fn boosters_reduce_training_error() {
    let (x, y) = fixtures::linear_dataset(150, 0.2, 6);
    let mean_mse = y.var(0.0);
    let mut xgb = XGBoost::new(100, 5, 0.1, 1.0);
    xgb.fit(&x, &y).unwrap();
    assert!(fixtures::mse(&xgb.predict(&x).unwrap(), &y) < 0.2 * mean_mse);
  }
}
