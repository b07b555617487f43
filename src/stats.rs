//! # Stats
//!
//! $$
//! r_t = \frac{p_t}{p_{t-1}} - 1
//! $$
//!
pub mod descriptive;
pub mod returns;

pub use returns::annualize_return;
pub use returns::annualize_volatility;
pub use returns::ReturnStatistics;
