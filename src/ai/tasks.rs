//! # Training Tasks
//!
//! $$
//! \text{Pending}\to\text{Running}\to\{\text{Completed},\text{Failed}\}
//! $$
//!
//! Caller-owned registry that tracks model-evaluation runs. The pipeline itself holds no
//! state; [`run_tracked`] forwards its progress into a registry entry.

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::sync::MutexGuard;

use serde::Serialize;
use tracing::info;
use tracing::warn;

use super::pipeline::EvaluationReport;
use super::pipeline::ModelEvaluationPipeline;
use crate::config::PipelineConfig;
use crate::data::PriceMatrix;
use crate::error::Error;
use crate::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TaskId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TaskState {
  Pending,
  Running,
  Completed,
  Failed,
}

impl TaskState {
  pub fn is_terminal(self) -> bool {
    matches!(self, TaskState::Completed | TaskState::Failed)
  }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskStatus {
  pub state: TaskState,
  /// Percent complete in `[0, 100]`.
  pub progress: f64,
  pub current_model: Option<String>,
  pub report: Option<EvaluationReport>,
  pub error: Option<String>,
}

impl TaskStatus {
  fn pending() -> Self {
    Self {
      state: TaskState::Pending,
      progress: 0.0,
      current_model: None,
      report: None,
      error: None,
    }
  }
}

/// Thread-safe `TaskId -> TaskStatus` store.
#[derive(Debug, Default)]
pub struct TaskRegistry {
  next_id: AtomicU64,
  tasks: Mutex<HashMap<TaskId, TaskStatus>>,
}

impl TaskRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  fn tasks(&self) -> MutexGuard<'_, HashMap<TaskId, TaskStatus>> {
    self.tasks.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn update<F>(&self, id: TaskId, f: F) -> Result<()>
  where
    F: FnOnce(&mut TaskStatus),
  {
    let mut tasks = self.tasks();
    let status = tasks
      .get_mut(&id)
      .ok_or_else(|| Error::invalid(format!("unknown task {}", id.0)))?;
    if status.state.is_terminal() {
      return Err(Error::invalid(format!(
        "task {} already finished as {:?}",
        id.0, status.state
      )));
    }
    f(status);
    Ok(())
  }

  /// Register a new pending task.
  pub fn submit(&self) -> TaskId {
    let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
    self.tasks().insert(id, TaskStatus::pending());
    id
  }

  pub fn start(&self, id: TaskId) -> Result<()> {
    self.update(id, |s| s.state = TaskState::Running)
  }

  pub fn update_progress(&self, id: TaskId, progress: f64, model: &str) -> Result<()> {
    self.update(id, |s| {
      s.state = TaskState::Running;
      s.progress = progress.clamp(0.0, 100.0);
      s.current_model = Some(model.to_string());
    })
  }

  pub fn complete(&self, id: TaskId, report: EvaluationReport) -> Result<()> {
    self.update(id, |s| {
      s.state = TaskState::Completed;
      s.progress = 100.0;
      s.report = Some(report);
    })
  }

  pub fn fail(&self, id: TaskId, message: impl Into<String>) -> Result<()> {
    let message = message.into();
    self.update(id, |s| {
      s.state = TaskState::Failed;
      s.error = Some(message);
    })
  }

  pub fn get(&self, id: TaskId) -> Option<TaskStatus> {
    self.tasks().get(&id).cloned()
  }

  pub fn remove(&self, id: TaskId) -> Option<TaskStatus> {
    self.tasks().remove(&id)
  }

  pub fn len(&self) -> usize {
    self.tasks().len()
  }

  pub fn is_empty(&self) -> bool {
    self.tasks().is_empty()
  }
}

/// Run the pipeline for task `id`, mirroring progress and the outcome into `registry`.
///
/// The pipeline error is returned to the caller as well as recorded on the task.
pub fn run_tracked(
  registry: &TaskRegistry,
  id: TaskId,
  prices: &PriceMatrix,
  config: PipelineConfig,
) -> Result<EvaluationReport> {
  registry.start(id)?;

  let outcome = ModelEvaluationPipeline::new(config).and_then(|pipeline| {
    pipeline.evaluate_with_progress(prices, |progress, model| {
      if let Err(e) = registry.update_progress(id, progress, model) {
        warn!(task = id.0, error = %e, "dropped progress update");
      }
    })
  });

  match outcome {
    Ok(report) => {
      registry.complete(id, report.clone())?;
      info!(task = id.0, best = %report.best_model, "training task completed");
      Ok(report)
    }
    Err(e) => {
      registry.fail(id, e.to_string())?;
      warn!(task = id.0, error = %e, "training task failed");
      Err(e)
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;
  use std::thread;

  use super::*;
  use crate::data::fixtures;
  use crate::error::ErrorKind;

  #[test]
  fn lifecycle_moves_forward_only() {
    let registry = TaskRegistry::new();
    let id = registry.submit();
    assert_eq!(registry.get(id).unwrap().state, TaskState::Pending);

    registry.update_progress(id, 42.0, "Ridge Regression").unwrap();
    let s = registry.get(id).unwrap();
    assert_eq!(s.state, TaskState::Running);
    assert_eq!(s.progress, 42.0);
    assert_eq!(s.current_model.as_deref(), Some("Ridge Regression"));

    registry.fail(id, "boom").unwrap();
    let err = registry.update_progress(id, 50.0, "Elastic Net").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(registry.get(id).unwrap().error.as_deref(), Some("boom"));
  }

  #[test]
  fn unknown_and_removed_tasks() {
    let registry = TaskRegistry::new();
    assert!(registry.start(TaskId(7)).is_err());

    let a = registry.submit();
    let b = registry.submit();
    assert_ne!(a, b);
    assert_eq!(registry.len(), 2);
    assert!(registry.remove(a).is_some());
    assert!(registry.get(a).is_none());
    assert_eq!(registry.len(), 1);
  }

  #[test]
  fn run_tracked_records_completion() {
    let registry = TaskRegistry::new();
    let id = registry.submit();
    let prices = fixtures::random_walk_prices(75, &[0.0004], &[0.01], 21);

    let report = run_tracked(&registry, id, &prices, PipelineConfig::default()).unwrap();
    let status = registry.get(id).unwrap();
    assert_eq!(status.state, TaskState::Completed);
    assert_eq!(status.progress, 100.0);
    assert_eq!(status.current_model.as_deref(), Some("XGBoost"));
    assert_eq!(status.report.as_ref(), Some(&report));
  }

  #[test]
  fn run_tracked_records_failure() {
    let registry = TaskRegistry::new();
    let id = registry.submit();
    let prices = fixtures::random_walk_prices(30, &[0.0], &[0.01], 2);

    let err = run_tracked(&registry, id, &prices, PipelineConfig::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientData);
    let status = registry.get(id).unwrap();
    assert_eq!(status.state, TaskState::Failed);
    assert!(status.error.unwrap().contains("insufficient data"));
  }

  #[test]
  fn registry_is_shared_across_threads() {
    let registry = Arc::new(TaskRegistry::new());
    let handles: Vec<_> = (0..8)
      .map(|_| {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
          let id = registry.submit();
          registry.start(id).unwrap();
          id
        })
      })
      .collect();
    let mut ids: Vec<TaskId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(registry.len(), 8);
  }
}
