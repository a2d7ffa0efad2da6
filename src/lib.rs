//! Cox-Ross-Rubinstein binomial lattice pricer.
//!
//! One immutable [`models::binomial::PricedTree`] per request: price lattice,
//! option values, profits, node probabilities and the most likely terminal
//! path, with the Black-Scholes price as a reference. [`sweep`] measures how
//! the lattice converges to that reference as the step count grows.

pub mod config;
pub mod errors;
pub mod models;
pub mod state;
pub mod sweep;

pub use errors::{EngineError, EngineResult};
pub use models::binomial::{price, PricedTree};
pub use state::{ConvergenceRecord, OptionType, PricingParams};
pub use sweep::convergence::{ConvergenceSweep, SweepOptions, SweepReport};
