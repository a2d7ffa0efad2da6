pub mod lattice;
pub mod valuation;
pub mod path;
pub mod black_scholes;
pub mod binomial;

use crate::errors::EngineResult;
use crate::state::PricingParams;

/// All pricing models implement this trait.
/// price() must be a pure function: deterministic output from inputs only.
/// Send + Sync required so sweeps can fan out across rayon workers.
pub trait PricingModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Present value of the option described by `params`.
    /// Returns an error instead of NaN when the inputs are out of domain.
    fn price(&self, params: &PricingParams) -> EngineResult<f64>;
}
