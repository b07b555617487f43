//! # Model Evaluation Pipeline
//!
//! $$
//! m^\* = \min\{\,i : S_i = \max_j S_j\,\}
//! $$
//!
//! Builds features from a price history, holds out a seeded random test split, trains
//! every roster model on the same training rows and ranks them by composite score. The
//! first model in roster order wins ties.

use std::sync::Mutex;

use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::ser::SerializeMap;
use serde::Serialize;
use serde::Serializer;
use tracing::debug;
use tracing::info;

use super::features::build_features;
use super::metrics;
use super::models::ModelKind;
use crate::config::PipelineConfig;
use crate::data::PriceMatrix;
use crate::error::Error;
use crate::error::Result;

/// Text recorded in [`EvaluationReport::selection_criteria`].
pub const SELECTION_CRITERIA: &str = "Combined score (accuracy, direction, risk-adjusted)";

/// Scores of one trained model.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelResult {
  pub name: String,
  pub kind: ModelKind,
  pub train_mse: f64,
  pub test_mse: f64,
  pub train_r2: f64,
  pub test_r2: f64,
  pub train_mae: f64,
  pub test_mae: f64,
  pub train_direction_accuracy: f64,
  pub test_direction_accuracy: f64,
  pub downside_mse: f64,
  pub upside_r2: f64,
  pub max_error: f64,
  pub information_ratio: f64,
  pub composite_score: f64,
}

/// Output of [`ModelEvaluationPipeline::evaluate`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EvaluationReport {
  pub symbols: Vec<String>,
  /// Aligned (feature, target) rows before the split.
  pub data_points: usize,
  pub feature_names: Vec<String>,
  pub train_size: usize,
  pub test_size: usize,
  /// Results in roster order, serialized as a `name -> result` mapping.
  #[serde(serialize_with = "serialize_models")]
  pub models: Vec<ModelResult>,
  pub best_model: String,
  pub best_index: usize,
  pub selection_criteria: String,
}

impl EvaluationReport {
  pub fn best(&self) -> &ModelResult {
    &self.models[self.best_index]
  }

  pub fn get(&self, name: &str) -> Option<&ModelResult> {
    self.models.iter().find(|m| m.name == name)
  }
}

fn serialize_models<S: Serializer>(
  models: &[ModelResult],
  serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
  let mut map = serializer.serialize_map(Some(models.len()))?;
  for m in models {
    map.serialize_entry(&m.name, m)?;
  }
  map.end()
}

/// Seeded shuffled split into `(train, test)` row indices.
///
/// The test set holds `ceil(n * test_ratio)` rows, clamped so both sides are non-empty.
pub fn train_test_split_indices(n: usize, test_ratio: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
  let mut idx = (0..n).collect::<Vec<usize>>();
  let mut rng = StdRng::seed_from_u64(seed);
  idx.shuffle(&mut rng);

  let mut n_test = ((n as f64) * test_ratio).ceil() as usize;
  n_test = n_test.clamp(1, n.saturating_sub(1).max(1));
  let test = idx[..n_test].to_vec();
  let train = idx[n_test..].to_vec();
  (train, test)
}

struct Split {
  x_train: Array2<f64>,
  y_train: Array1<f64>,
  x_test: Array2<f64>,
  y_test: Array1<f64>,
}

/// Trains and ranks the fixed regressor roster on a price history.
#[derive(Clone, Debug, Default)]
pub struct ModelEvaluationPipeline {
  config: PipelineConfig,
}

impl ModelEvaluationPipeline {
  pub fn new(config: PipelineConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self { config })
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  pub fn evaluate(&self, prices: &PriceMatrix) -> Result<EvaluationReport> {
    self.evaluate_with_progress(prices, |_, _| {})
  }

  /// Like [`Self::evaluate`], calling `progress(percent, model_name)` after each model.
  ///
  /// Percentages are `completed / total * 100` and strictly increase up to 100, also when
  /// the roster is trained in parallel.
  pub fn evaluate_with_progress<F>(&self, prices: &PriceMatrix, progress: F) -> Result<EvaluationReport>
  where
    F: FnMut(f64, &str) + Send,
  {
    let set = build_features(prices)?;
    if set.len() < self.config.min_rows {
      return Err(Error::InsufficientData {
        required: self.config.min_rows,
        actual: set.len(),
        context: "model evaluation",
      });
    }

    let (train, test) = train_test_split_indices(set.len(), self.config.test_ratio, self.config.seed);
    let split = Split {
      x_train: set.features.select(Axis(0), &train),
      y_train: set.target.select(Axis(0), &train),
      x_test: set.features.select(Axis(0), &test),
      y_test: set.target.select(Axis(0), &test),
    };
    debug!(
      rows = set.len(),
      train = train.len(),
      test = test.len(),
      parallel = self.config.parallel,
      "split feature rows"
    );

    let total = ModelKind::ROSTER.len();
    let reporter = Mutex::new((0_usize, progress));
    let run = |kind: ModelKind| -> Result<ModelResult> {
      let result = self.train_one(kind, &split)?;
      let mut guard = reporter.lock().unwrap_or_else(|e| e.into_inner());
      let (done, callback) = &mut *guard;
      *done += 1;
      callback(*done as f64 / total as f64 * 100.0, kind.name());
      Ok(result)
    };

    let models: Vec<ModelResult> = if self.config.parallel {
      ModelKind::ROSTER.par_iter().map(|&k| run(k)).collect::<Result<_>>()?
    } else {
      ModelKind::ROSTER.iter().map(|&k| run(k)).collect::<Result<_>>()?
    };

    let best_index = select_best(&models);
    let best_model = models[best_index].name.clone();
    info!(
      best = %best_model,
      score = models[best_index].composite_score,
      "selected best model"
    );

    Ok(EvaluationReport {
      symbols: prices.symbols().to_vec(),
      data_points: set.len(),
      feature_names: set.names,
      train_size: train.len(),
      test_size: test.len(),
      models,
      best_model,
      best_index,
      selection_criteria: SELECTION_CRITERIA.to_string(),
    })
  }

  fn train_one(&self, kind: ModelKind, split: &Split) -> Result<ModelResult> {
    let mut model = kind.build(self.config.seed);
    model.fit(&split.x_train, &split.y_train)?;
    let train_pred = model.predict(&split.x_train)?.to_vec();
    let test_pred = model.predict(&split.x_test)?.to_vec();
    let y_train = split.y_train.to_vec();
    let y_test = split.y_test.to_vec();

    let test_r2 = metrics::r2(&y_test, &test_pred);
    let test_direction_accuracy = metrics::direction_accuracy(&y_test, &test_pred);
    let downside_mse = metrics::downside_mse(&y_test, &test_pred);
    let upside_r2 = metrics::upside_r2(&y_test, &test_pred);
    let information_ratio = metrics::information_ratio(test_r2, &y_test, &test_pred);

    let result = ModelResult {
      name: kind.name().to_string(),
      kind,
      train_mse: metrics::mse(&y_train, &train_pred),
      test_mse: metrics::mse(&y_test, &test_pred),
      train_r2: metrics::r2(&y_train, &train_pred),
      test_r2,
      train_mae: metrics::mae(&y_train, &train_pred),
      test_mae: metrics::mae(&y_test, &test_pred),
      train_direction_accuracy: metrics::direction_accuracy(&y_train, &train_pred),
      test_direction_accuracy,
      downside_mse,
      upside_r2,
      max_error: metrics::max_error(&y_test, &test_pred),
      information_ratio,
      composite_score: metrics::composite_score(
        test_r2,
        test_direction_accuracy,
        downside_mse,
        upside_r2,
        information_ratio,
      ),
    };
    debug!(
      model = kind.name(),
      test_r2 = result.test_r2,
      score = result.composite_score,
      "model evaluated"
    );
    Ok(result)
  }
}

/// Index of the strictly greatest composite score; non-finite scores never win.
fn select_best(models: &[ModelResult]) -> usize {
  let mut best = 0;
  let mut best_score = f64::NEG_INFINITY;
  for (i, m) in models.iter().enumerate() {
    if m.composite_score.is_finite() && m.composite_score > best_score {
      best = i;
      best_score = m.composite_score;
    }
  }
  best
}
