//! # Portfolio
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w}
//! $$
//!
//! Long-only mean-variance portfolio optimization.

pub mod optimizer;
pub mod types;

pub use optimizer::equal_weight_drawdown_penalty;
pub use optimizer::optimize_prices;
pub use optimizer::project_simplex;
pub use optimizer::MeanVarianceOptimizer;
pub use types::OptimizationResult;
pub use types::OptimizerMethod;
