//! # Quant
//!
//! $$
//! R_t^{p} = \sum_i w_i\, r_{t,i}
//! $$
//!
//! Allocation and portfolio performance engines built on [`crate::stats::ReturnStatistics`].

pub mod performance;
pub mod portfolio;

pub use performance::PerformanceMetrics;
pub use performance::PerformanceMetricsEngine;
pub use portfolio::MeanVarianceOptimizer;
pub use portfolio::OptimizationResult;
