use crate::errors::{EngineError, EngineResult};
use crate::state::{OptionType, PricingParams};
use crate::sweep::convergence::SweepOptions;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub spot: f64,
    pub strike: f64,
    pub maturity: f64,
    pub rate: f64,
    pub sigma: f64,
    pub steps: i64,
    pub option_type: OptionType,
    pub max_steps: usize,
    pub run_sweep: bool,
    pub sweep_max_steps: usize,
    pub sweep_stride: usize,
    pub sweep_parallel: bool,
    pub sweep_time_budget: Option<Duration>,
    pub sweep_export_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> EngineResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> EngineResult<Self> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let sweep_time_budget = lookup("SWEEP_TIME_BUDGET_SECS")
            .map(|v| parse::<f64>("SWEEP_TIME_BUDGET_SECS", &v))
            .transpose()?
            .map(|secs| {
                Duration::try_from_secs_f64(secs)
                    .map_err(|e| EngineError::Config(format!("SWEEP_TIME_BUDGET_SECS: {e}")))
            })
            .transpose()?;

        Ok(Self {
            spot: parse("SPOT", &get("SPOT", "150"))?,
            strike: parse("STRIKE", &get("STRIKE", "140"))?,
            maturity: parse("MATURITY_YEARS", &get("MATURITY_YEARS", "0.5"))?,
            rate: parse("RISK_FREE_RATE", &get("RISK_FREE_RATE", "0.04"))?,
            sigma: parse("VOLATILITY", &get("VOLATILITY", "0.25"))?,
            steps: parse("TREE_STEPS", &get("TREE_STEPS", "10"))?,
            option_type: parse("OPTION_TYPE", &get("OPTION_TYPE", "call"))?,
            max_steps: parse("MAX_TREE_STEPS", &get("MAX_TREE_STEPS", "50"))?,
            run_sweep: parse("RUN_SWEEP", &get("RUN_SWEEP", "false"))?,
            sweep_max_steps: parse("SWEEP_MAX_STEPS", &get("SWEEP_MAX_STEPS", "100"))?,
            sweep_stride: parse("SWEEP_STRIDE", &get("SWEEP_STRIDE", "5"))?,
            sweep_parallel: parse("SWEEP_PARALLEL", &get("SWEEP_PARALLEL", "true"))?,
            sweep_time_budget,
            sweep_export_path: lookup("SWEEP_EXPORT_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        })
    }

    /// The configured request, validated.
    pub fn pricing_params(&self) -> EngineResult<PricingParams> {
        PricingParams::new(
            self.spot,
            self.strike,
            self.maturity,
            self.rate,
            self.sigma,
            self.steps,
            self.option_type,
            self.max_steps,
        )
    }

    pub fn sweep_options(&self) -> SweepOptions {
        SweepOptions {
            parallel: self.sweep_parallel,
            time_budget: self.sweep_time_budget,
        }
    }
}

fn parse<T>(key: &str, raw: &str) -> EngineResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| EngineError::Config(format!("{key}: {e}")))
}
