use crate::errors::{EngineError, EngineResult};
use crate::state::{PricingParams, TriangularLattice};

/// Per-step constants of a Cox-Ross-Rubinstein tree.
///
/// u = exp(sigma * sqrt(dt)), d = 1/u
/// p = (exp(r * dt) - d) / (u - d)
/// discount = exp(-r * dt)
///
/// With zero steps the tree is a single node: u = d = 1, p = 0.5, discount = 1.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct TreeConstants {
    pub steps: usize,
    pub dt: f64,
    pub u: f64,
    pub d: f64,
    pub p: f64,
    pub discount: f64,
}

impl TreeConstants {
    pub fn new(params: &PricingParams) -> Self {
        let steps = params.steps();
        if steps == 0 {
            return Self {
                steps,
                dt: 0.0,
                u: 1.0,
                d: 1.0,
                p: 0.5,
                discount: 1.0,
            };
        }

        let dt = params.maturity() / steps as f64;
        let u = (params.sigma() * dt.sqrt()).exp();
        let d = 1.0 / u;
        let p = ((params.rate() * dt).exp() - d) / (u - d);
        let discount = (-params.rate() * dt).exp();

        Self { steps, dt, u, d, p, discount }
    }

    /// Single-node tree (`steps == 0`). A defined case, not an error.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.steps == 0
    }

    /// Whether p is a probability. Fails when sigma * sqrt(dt) is small
    /// relative to |r| * dt, i.e. the tree admits arbitrage.
    #[inline]
    pub fn is_arbitrage_free(&self) -> bool {
        self.p.is_finite() && (0.0..=1.0).contains(&self.p)
    }

    /// Rejects trees that cannot be priced in f64: a multi-level tree whose
    /// up and down moves collapse to the same factor, or non-finite constants.
    /// A finite p outside [0, 1] passes; see `is_arbitrage_free`.
    pub fn check_finite(&self) -> EngineResult<()> {
        if self.is_degenerate() {
            return Ok(());
        }
        if self.u == self.d {
            return Err(EngineError::invalid(format!(
                "sigma * sqrt(dt) too small: u == d == {} at {} steps",
                self.u, self.steps
            )));
        }
        if !(self.u.is_finite() && self.p.is_finite() && self.discount.is_finite()) {
            return Err(EngineError::invalid(format!(
                "non-finite tree constants: u={} p={} discount={}",
                self.u, self.p, self.discount
            )));
        }
        Ok(())
    }
}

/// Underlying price at every node: S0 * u^(k - j) * d^j, computed as
/// S0 * u^(k - 2j) so nodes with k = 2j are exactly S0.
pub fn build_price_lattice(params: &PricingParams, constants: &TreeConstants) -> TriangularLattice {
    let spot = params.spot();
    let u = constants.u;
    TriangularLattice::from_fn(params.steps(), |k, j| spot * u.powi(k as i32 - 2 * j as i32))
}
