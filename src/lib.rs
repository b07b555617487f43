//! # Portfolio Optimizer
//!
//! $$
//! \mathbf{w}^\*=\arg\max_{\mathbf{w}\ge 0,\ \mathbf{1}^\top\mathbf{w}=1}\ \mathbf{w}^\top\mu-\lambda\,\mathbf{w}^\top\Sigma\mathbf{w}
//! $$
//!
//! Historical return statistics, long-only mean-variance allocation, backtest performance
//! metrics and a regression-model evaluation pipeline over aligned daily prices.
//!
//! The library installs no `tracing` subscriber; callers own log output.

pub mod ai;
pub mod config;
pub mod data;
pub mod error;
pub mod quant;
pub mod stats;

pub use ai::EvaluationReport;
pub use ai::ModelEvaluationPipeline;
pub use config::EngineConfig;
pub use config::OptimizerConfig;
pub use config::PipelineConfig;
pub use data::PriceMatrix;
pub use data::PriceRow;
pub use data::ReturnMatrix;
pub use data::TimePoint;
pub use data::WeightVector;
pub use error::Error;
pub use error::ErrorKind;
pub use error::Result;
pub use quant::MeanVarianceOptimizer;
pub use quant::OptimizationResult;
pub use quant::PerformanceMetrics;
pub use quant::PerformanceMetricsEngine;
pub use stats::ReturnStatistics;
