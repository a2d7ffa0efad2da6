use crate::errors::{EngineError, EngineResult};
use crate::models::PricingModel;
use crate::state::{OptionType, PricingParams};
use statrs::distribution::{ContinuousCDF, Normal};

/// Black-Scholes European option pricing, the continuous-time limit of the
/// lattice and its reference price.
///
/// d1 = (ln(S/K) + (r + sigma^2/2)*T) / (sigma * sqrt(T))
/// d2 = d1 - sigma * sqrt(T)
///
/// call = S * Phi(d1) - K * exp(-r*T) * Phi(d2)
/// put  = K * exp(-r*T) * Phi(-d2) - S * Phi(-d1)
pub struct BlackScholes {
    /// Standard normal distribution (created once, reused)
    normal: Normal,
}

impl BlackScholes {
    pub fn new() -> Self {
        Self {
            normal: Normal::standard(),
        }
    }

    /// Closed-form price from raw inputs. Out-of-domain inputs (where ln or
    /// sqrt would produce NaN) are reported, never priced.
    pub fn price_raw(
        &self,
        spot: f64,
        strike: f64,
        maturity: f64,
        rate: f64,
        sigma: f64,
        option_type: OptionType,
    ) -> EngineResult<f64> {
        for (name, value) in [("S0", spot), ("K", strike), ("T", maturity), ("sigma", sigma)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(EngineError::invalid(format!(
                    "closed form needs {name} > 0, got {value}"
                )));
            }
        }
        if !rate.is_finite() {
            return Err(EngineError::invalid(format!("closed form needs finite r, got {rate}")));
        }

        let sigma_sqrt_t = sigma * maturity.sqrt();
        let d1 = ((spot / strike).ln() + (rate + 0.5 * sigma * sigma) * maturity) / sigma_sqrt_t;
        let d2 = d1 - sigma_sqrt_t;
        let discounted_strike = strike * (-rate * maturity).exp();

        let price = match option_type {
            OptionType::Call => spot * self.normal.cdf(d1) - discounted_strike * self.normal.cdf(d2),
            OptionType::Put => discounted_strike * self.normal.cdf(-d2) - spot * self.normal.cdf(-d1),
        };

        if price.is_finite() {
            Ok(price)
        } else {
            Err(EngineError::invalid(format!("closed form produced {price}")))
        }
    }
}

impl Default for BlackScholes {
    fn default() -> Self {
        Self::new()
    }
}

impl PricingModel for BlackScholes {
    #[inline]
    fn name(&self) -> &'static str {
        "Black-Scholes"
    }

    fn price(&self, params: &PricingParams) -> EngineResult<f64> {
        self.price_raw(
            params.spot(),
            params.strike(),
            params.maturity(),
            params.rate(),
            params.sigma(),
            params.option_type(),
        )
    }
}
