//! # AI
//!
//! $$
//! \hat r_{t+1} = f(\mathbf{x}_t)
//! $$
//!
pub mod features;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod tasks;

pub use models::ModelKind;
pub use models::Regressor;
pub use pipeline::EvaluationReport;
pub use pipeline::ModelEvaluationPipeline;
pub use pipeline::ModelResult;
pub use tasks::run_tracked;
pub use tasks::TaskRegistry;
