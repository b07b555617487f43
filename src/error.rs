//! # Errors
//!
//! $$
//! \text{engine}(x) \in \{\text{Ok}(y), \text{Err}(e)\}
//! $$
//!
//! Every engine call either returns a complete result or one of these errors. Errors are
//! terminal for the call that raised them; callers decide whether to retry with different
//! inputs.

use thiserror::Error;

/// Error raised by the return, optimization, metrics and model-evaluation engines.
#[derive(Error, Debug)]
pub enum Error {
  /// No usable price rows after alignment.
  #[error("data unavailable: {0}")]
  DataUnavailable(String),

  /// Fewer rows than the hard minimum for the requested computation.
  #[error("insufficient data for {context}: need at least {required} rows, got {actual}")]
  InsufficientData {
    required: usize,
    actual: usize,
    context: &'static str,
  },

  /// The solver did not converge or the problem is not a valid convex program.
  #[error("optimization failure: {0}")]
  OptimizationFailure(String),

  /// Malformed inputs: mismatched symbols, bad dates, out-of-range parameters.
  #[error("invalid input: {0}")]
  InvalidInput(String),

  /// A regressor failed to fit or predict.
  #[error(transparent)]
  Model(#[from] anyhow::Error),
}

/// Coarse category of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
  DataUnavailable,
  InsufficientData,
  OptimizationFailure,
  InvalidInput,
  Model,
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Error::DataUnavailable(_) => ErrorKind::DataUnavailable,
      Error::InsufficientData { .. } => ErrorKind::InsufficientData,
      Error::OptimizationFailure(_) => ErrorKind::OptimizationFailure,
      Error::InvalidInput(_) => ErrorKind::InvalidInput,
      Error::Model(_) => ErrorKind::Model,
    }
  }

  pub(crate) fn invalid(msg: impl Into<String>) -> Self {
    Error::InvalidInput(msg.into())
  }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn insufficient_data_message_names_counts() {
    let err = Error::InsufficientData {
      required: 50,
      actual: 49,
      context: "model training",
    };

    assert_eq!(err.kind(), ErrorKind::InsufficientData);
    assert_eq!(
      err.to_string(),
      "insufficient data for model training: need at least 50 rows, got 49"
    );
  }

  #[test]
  fn anyhow_errors_convert_to_model_kind() {
    let err: Error = anyhow::anyhow!("singular design matrix").into();
    assert_eq!(err.kind(), ErrorKind::Model);
    assert_eq!(err.to_string(), "singular design matrix");
  }
}
