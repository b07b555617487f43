//! # Configuration
//!
//! $$
//! \lambda = 1 - \text{risk\_tolerance}
//! $$
//!
//! Runtime configuration for the optimizer and the model-evaluation pipeline. Every field
//! has a default, so a TOML file only needs to name what it overrides:
//!
//! ```toml
//! [optimizer]
//! risk_tolerance = 0.7
//!
//! [pipeline]
//! parallel = true
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::error::Error;
use crate::error::Result;

/// Trading days per year used for every annualization in the crate.
pub const TRADING_DAYS: f64 = 252.0;

/// Settings for [`crate::quant::portfolio::MeanVarianceOptimizer`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
  /// Appetite for variance in `[0, 1]`; the variance penalty is `1 - risk_tolerance`.
  pub risk_tolerance: f64,
  /// Subtract `0.5 * maxDrawdown^2` of the equal-weight history from the objective.
  pub include_drawdown_penalty: bool,
  /// Iteration cap for the projected-gradient solver.
  pub max_iters: usize,
  /// Fixed-point residual at which the solver is considered converged.
  pub tolerance: f64,
}

impl Default for OptimizerConfig {
  fn default() -> Self {
    Self {
      risk_tolerance: 0.5,
      include_drawdown_penalty: true,
      max_iters: 100_000,
      tolerance: 1e-12,
    }
  }
}

impl OptimizerConfig {
  pub fn validate(&self) -> Result<()> {
    if !(0.0..=1.0).contains(&self.risk_tolerance) {
      return Err(Error::invalid(format!(
        "risk_tolerance must be in [0, 1], got {}",
        self.risk_tolerance
      )));
    }
    if self.max_iters == 0 {
      return Err(Error::invalid("max_iters must be > 0"));
    }
    if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
      return Err(Error::invalid(format!(
        "tolerance must be positive and finite, got {}",
        self.tolerance
      )));
    }
    Ok(())
  }
}

/// Settings for [`crate::ai::pipeline::ModelEvaluationPipeline`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  /// Fraction of rows held out for testing.
  pub test_ratio: f64,
  /// Seed for the shuffled split and every stochastic model.
  pub seed: u64,
  /// Minimum number of aligned (feature, target) rows.
  pub min_rows: usize,
  /// Train the roster on the rayon pool instead of sequentially.
  pub parallel: bool,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      test_ratio: 0.2,
      seed: 42,
      min_rows: 50,
      parallel: false,
    }
  }
}

impl PipelineConfig {
  pub fn validate(&self) -> Result<()> {
    if !(self.test_ratio > 0.0 && self.test_ratio < 1.0) {
      return Err(Error::invalid(format!(
        "test_ratio must be in (0, 1), got {}",
        self.test_ratio
      )));
    }
    if self.min_rows < 2 {
      return Err(Error::invalid("min_rows must be at least 2"));
    }
    Ok(())
  }
}

/// Complete engine configuration, usually loaded from a TOML file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub optimizer: OptimizerConfig,
  pub pipeline: PipelineConfig,
}

impl EngineConfig {
  /// Parse and validate a TOML document.
  pub fn from_toml_str(s: &str) -> Result<Self> {
    let config: EngineConfig =
      toml::from_str(s).map_err(|e| Error::invalid(format!("failed to parse config: {e}")))?;
    config.validate()?;
    Ok(config)
  }

  /// Read, parse and validate a TOML file.
  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
      .map_err(|e| Error::invalid(format!("failed to read config {:?}: {e}", path)))?;
    debug!(path = ?path, "loading engine configuration");
    Self::from_toml_str(&content)
  }

  pub fn validate(&self) -> Result<()> {
    self.optimizer.validate()?;
    self.pipeline.validate()
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use super::*;
  use crate::error::ErrorKind;

  #[test]
  fn defaults_match_reference_parameters() {
    let config = EngineConfig::default();
    assert_eq!(config.optimizer.risk_tolerance, 0.5);
    assert!(config.optimizer.include_drawdown_penalty);
    assert_eq!(config.pipeline.test_ratio, 0.2);
    assert_eq!(config.pipeline.seed, 42);
    assert_eq!(config.pipeline.min_rows, 50);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn partial_toml_keeps_defaults() {
    let config = EngineConfig::from_toml_str(
      r#"
        [optimizer]
        risk_tolerance = 0.8

        [pipeline]
        parallel = true
      "#,
    )
    .unwrap();

    assert_eq!(config.optimizer.risk_tolerance, 0.8);
    assert!(config.optimizer.include_drawdown_penalty);
    assert!(config.pipeline.parallel);
    assert_eq!(config.pipeline.seed, 42);
  }

  #[test]
  fn out_of_range_values_are_rejected() {
    let err = EngineConfig::from_toml_str("[optimizer]\nrisk_tolerance = 1.5\n").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = EngineConfig::from_toml_str("[pipeline]\ntest_ratio = 0.0\n").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = EngineConfig::from_toml_str("[pipeline\n").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
  }

  #[test]
  fn loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[pipeline]\nseed = 7\nmin_rows = 60").unwrap();

    let config = EngineConfig::from_file(file.path()).unwrap();
    assert_eq!(config.pipeline.seed, 7);
    assert_eq!(config.pipeline.min_rows, 60);
  }
}
