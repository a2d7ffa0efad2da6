use lattice_pricer::config::AppConfig;
use lattice_pricer::models::lattice::TreeConstants;
use lattice_pricer::models::path::MostLikelyOutcome;
use lattice_pricer::sweep::export::export_convergence_csv;
use lattice_pricer::sweep::{CancelToken, SweepProgress};
use lattice_pricer::{ConvergenceSweep, EngineError, EngineResult, PricingParams, SweepReport};

/// What the driver prints to stdout. Lattices are left out; library callers
/// read them from `PricedTree` directly.
#[derive(serde::Serialize)]
struct RunSummary<'a> {
    params: &'a PricingParams,
    constants: &'a TreeConstants,
    option_price: f64,
    reference_price: f64,
    most_likely: &'a MostLikelyOutcome,
    convergence: Option<&'a SweepReport>,
}

fn main() {
    // Structured logging on stderr; stdout carries the JSON summary
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cfg = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("config error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&cfg) {
        tracing::error!(error = %e, "pricing run failed");
        std::process::exit(1);
    }
}

fn run(cfg: &AppConfig) -> EngineResult<()> {
    let params = cfg.pricing_params()?;

    // The engine prices any step count; the cap is this caller's policy.
    if params.exceeds_max_steps() {
        return Err(EngineError::InvalidParameter(format!(
            "steps={} exceeds MAX_TREE_STEPS={}",
            params.steps(),
            params.max_steps()
        )));
    }

    tracing::info!(request = %params, steps = params.steps(), "pricing request");

    let tree = lattice_pricer::price(&params)?;
    let reference_price = tree.reference_price()?;

    tracing::info!(
        option_price = tree.option_price,
        reference_price,
        p = tree.constants.p,
        "{}",
        tree.summary()
    );

    let report = if cfg.run_sweep {
        let sweep = ConvergenceSweep::new(params, cfg.sweep_max_steps, cfg.sweep_stride)?
            .with_options(cfg.sweep_options());
        let report = sweep.run(&CancelToken::new(), &SweepProgress::new())?;

        if let Some(path) = &cfg.sweep_export_path {
            export_convergence_csv(path, &params, &report)?;
        }
        Some(report)
    } else {
        None
    };

    let summary = RunSummary {
        params: &params,
        constants: &tree.constants,
        option_price: tree.option_price,
        reference_price,
        most_likely: &tree.most_likely,
        convergence: report.as_ref(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
