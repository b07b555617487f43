//! # Model Metrics
//!
//! $$
//! S = 0.30\,R^2_{test} + 0.20\,DA + 0.20\,(1-\min(\text{MSE}^-,1)) + 0.15\,R^2_{+} + 0.15\,\min(IR,1)
//! $$
//!
//! Regression errors and the finance-oriented diagnostics used to rank return models.

use crate::stats::descriptive::mean;
use crate::stats::descriptive::population_std;

/// Minimum number of positive actuals for [`upside_r2`] to be defined.
pub const MIN_UPSIDE_ROWS: usize = 6;

pub fn mse(actual: &[f64], predicted: &[f64]) -> f64 {
  mean(
    &actual
      .iter()
      .zip(predicted)
      .map(|(a, p)| (a - p) * (a - p))
      .collect::<Vec<f64>>(),
  )
}

pub fn mae(actual: &[f64], predicted: &[f64]) -> f64 {
  mean(
    &actual
      .iter()
      .zip(predicted)
      .map(|(a, p)| (a - p).abs())
      .collect::<Vec<f64>>(),
  )
}

/// Coefficient of determination. A constant `actual` scores 1 when matched exactly and 0
/// otherwise.
pub fn r2(actual: &[f64], predicted: &[f64]) -> f64 {
  let m = mean(actual);
  let ss_res: f64 = actual.iter().zip(predicted).map(|(a, p)| (a - p) * (a - p)).sum();
  let ss_tot: f64 = actual.iter().map(|a| (a - m) * (a - m)).sum();
  if ss_tot == 0.0 {
    if ss_res == 0.0 {
      1.0
    } else {
      0.0
    }
  } else {
    1.0 - ss_res / ss_tot
  }
}

fn sign(x: f64) -> i8 {
  if x > 0.0 {
    1
  } else if x < 0.0 {
    -1
  } else {
    0
  }
}

/// Share of rows where the predicted and actual signs agree.
pub fn direction_accuracy(actual: &[f64], predicted: &[f64]) -> f64 {
  if actual.is_empty() {
    return 0.0;
  }
  let hits = actual
    .iter()
    .zip(predicted)
    .filter(|(a, p)| sign(**a) == sign(**p))
    .count();
  hits as f64 / actual.len() as f64
}

/// MSE over rows whose actual value is negative, 0 when there are none.
pub fn downside_mse(actual: &[f64], predicted: &[f64]) -> f64 {
  let (a, p): (Vec<f64>, Vec<f64>) = actual
    .iter()
    .zip(predicted)
    .filter(|(a, _)| **a < 0.0)
    .map(|(a, p)| (*a, *p))
    .unzip();
  mse(&a, &p)
}

/// R² over rows whose actual value is positive, 0 with fewer than [`MIN_UPSIDE_ROWS`].
pub fn upside_r2(actual: &[f64], predicted: &[f64]) -> f64 {
  let (a, p): (Vec<f64>, Vec<f64>) = actual
    .iter()
    .zip(predicted)
    .filter(|(a, _)| **a > 0.0)
    .map(|(a, p)| (*a, *p))
    .unzip();
  if a.len() < MIN_UPSIDE_ROWS {
    0.0
  } else {
    r2(&a, &p)
  }
}

pub fn max_error(actual: &[f64], predicted: &[f64]) -> f64 {
  actual
    .iter()
    .zip(predicted)
    .map(|(a, p)| (a - p).abs())
    .fold(0.0, f64::max)
}

/// `test_r2 / std(actual - predicted)` with the population std as tracking error.
pub fn information_ratio(test_r2: f64, actual: &[f64], predicted: &[f64]) -> f64 {
  let residual: Vec<f64> = actual.iter().zip(predicted).map(|(a, p)| a - p).collect();
  let tracking_error = population_std(&residual);
  if tracking_error > 0.0 {
    test_r2 / tracking_error
  } else {
    0.0
  }
}

pub fn composite_score(
  test_r2: f64,
  direction_accuracy: f64,
  downside_mse: f64,
  upside_r2: f64,
  information_ratio: f64,
) -> f64 {
  0.30 * test_r2
    + 0.20 * direction_accuracy
    + 0.20 * (1.0 - downside_mse.min(1.0))
    + 0.15 * upside_r2
    + 0.15 * information_ratio.min(1.0)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  #[test]
  fn errors_match_hand_values() {
    let a = [1.0, -2.0, 3.0];
    let p = [1.5, -2.0, 2.0];
    assert_abs_diff_eq!(mse(&a, &p), (0.25 + 1.0) / 3.0, epsilon = 1e-15);
    assert_abs_diff_eq!(mae(&a, &p), 1.5 / 3.0, epsilon = 1e-15);
    assert_eq!(max_error(&a, &p), 1.0);
  }

  #[test]
  fn r2_of_perfect_and_mean_predictions() {
    let a = [1.0, 2.0, 3.0];
    assert_eq!(r2(&a, &a), 1.0);
    assert_abs_diff_eq!(r2(&a, &[2.0, 2.0, 2.0]), 0.0);
    assert_eq!(r2(&[5.0, 5.0], &[5.0, 5.0]), 1.0);
    assert_eq!(r2(&[5.0, 5.0], &[4.0, 5.0]), 0.0);
  }

  #[test]
  fn direction_uses_signs() {
    let a = [0.01, -0.02, 0.0, 0.03];
    let p = [0.02, 0.01, 0.0, -0.01];
    assert_abs_diff_eq!(direction_accuracy(&a, &p), 0.5);
  }

  #[test]
  fn downside_mse_only_sees_losses() {
    let a = [0.01, -0.02, -0.04];
    let p = [1.0, -0.01, -0.04];
    assert_abs_diff_eq!(downside_mse(&a, &p), 0.0001 / 2.0, epsilon = 1e-15);
    assert_eq!(downside_mse(&[0.1], &[0.0]), 0.0);
  }

  #[test]
  fn upside_r2_needs_six_gains() {
    let a = [0.01, 0.02, 0.03, 0.04, 0.05];
    assert_eq!(upside_r2(&a, &a), 0.0);
    let a = [0.01, 0.02, 0.03, 0.04, 0.05, 0.06, -0.5];
    assert_eq!(upside_r2(&a, &a), 1.0);
  }

  #[test]
  fn information_ratio_uses_population_tracking_error() {
    let a = [1.0, 2.0];
    let p = [0.0, 2.0];
    // residuals 1, 0: population std 0.5
    assert_abs_diff_eq!(information_ratio(0.4, &a, &p), 0.8);
    assert_eq!(information_ratio(0.4, &a, &a), 0.0);
  }

  #[test]
  fn composite_caps_downside_and_information_ratio() {
    assert_abs_diff_eq!(composite_score(1.0, 1.0, 0.0, 1.0, 1.0), 1.0, epsilon = 1e-15);
    assert_abs_diff_eq!(composite_score(0.0, 0.0, 5.0, 0.0, 50.0), 0.15, epsilon = 1e-15);
    assert_abs_diff_eq!(composite_score(-1.0, 0.5, 0.5, 0.0, -2.0), -0.3 + 0.1 + 0.1 - 0.3, epsilon = 1e-15);
  }
}
