use crate::errors::{EngineError, EngineResult};
use crate::models::binomial::BinomialModel;
use crate::models::black_scholes::BlackScholes;
use crate::models::PricingModel;
use crate::state::{ConvergenceRecord, PricingParams};
use crate::sweep::{CancelToken, SweepProgress};
use rayon::prelude::*;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default)]
pub struct SweepOptions {
    /// Fan per-step runs out over the rayon pool.
    pub parallel: bool,
    /// Abort with `Cancelled` once this much wall time has passed.
    pub time_budget: Option<Duration>,
}

/// Lattice price against the closed form at steps 1, 1+stride, ... <= max_steps.
///
/// Every run is independent; the reference price is computed once. Records
/// come back in ascending step order whether or not runs execute in parallel.
/// The first failing run aborts the sweep and no records are returned.
pub struct ConvergenceSweep {
    base: PricingParams,
    max_steps: usize,
    stride: usize,
    options: SweepOptions,
    lattice: Box<dyn PricingModel>,
    reference: Box<dyn PricingModel>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SweepReport {
    pub reference_price: f64,
    pub records: Vec<ConvergenceRecord>,
    pub elapsed: Duration,
}

impl SweepReport {
    pub fn max_error(&self) -> Option<f64> {
        self.records.iter().map(|r| r.absolute_error).reduce(f64::max)
    }

    /// Error at the finest resolution swept.
    pub fn final_error(&self) -> Option<f64> {
        self.records.last().map(|r| r.absolute_error)
    }
}

impl ConvergenceSweep {
    /// `base` supplies everything except the step count.
    pub fn new(base: PricingParams, max_steps: usize, stride: usize) -> EngineResult<Self> {
        if stride == 0 {
            return Err(EngineError::invalid("sweep stride must be >= 1"));
        }
        if i32::try_from(max_steps).is_err() {
            return Err(EngineError::invalid(format!("sweep max_steps too large: {max_steps}")));
        }
        Ok(Self {
            base,
            max_steps,
            stride,
            options: SweepOptions::default(),
            lattice: Box::new(BinomialModel),
            reference: Box::new(BlackScholes::new()),
        })
    }

    pub fn with_options(mut self, options: SweepOptions) -> Self {
        self.options = options;
        self
    }

    /// Swap the priced model and the reference it is measured against.
    pub fn with_models(
        mut self,
        lattice: Box<dyn PricingModel>,
        reference: Box<dyn PricingModel>,
    ) -> Self {
        self.lattice = lattice;
        self.reference = reference;
        self
    }

    /// Step counts visited, ascending.
    pub fn schedule(&self) -> Vec<usize> {
        (1..=self.max_steps).step_by(self.stride).collect()
    }

    pub fn run(&self, cancel: &CancelToken, progress: &SweepProgress) -> EngineResult<SweepReport> {
        let started = Instant::now();
        let schedule = self.schedule();

        tracing::info!(
            lattice = self.lattice.name(),
            reference = self.reference.name(),
            runs = schedule.len(),
            max_steps = self.max_steps,
            stride = self.stride,
            parallel = self.options.parallel,
            "starting convergence sweep"
        );

        let reference_price = self.reference.price(&self.base)?;

        let run_one = |steps: usize| -> EngineResult<ConvergenceRecord> {
            self.check_continue(cancel, started)?;
            let steps_i64 = i64::try_from(steps)
                .map_err(|e| EngineError::invalid(format!("steps: {e}")))?;
            let params = self.base.with_steps(steps_i64)?;
            let lattice_price = self.lattice.price(&params)?;
            progress.record();
            Ok(ConvergenceRecord::new(steps, lattice_price, reference_price))
        };

        // collect into Result keeps input order and stops at the first error
        let records = if self.options.parallel {
            schedule.par_iter().map(|&s| run_one(s)).collect::<EngineResult<Vec<_>>>()
        } else {
            schedule.iter().map(|&s| run_one(s)).collect::<EngineResult<Vec<_>>>()
        };

        let records = match records {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, completed = progress.completed(), "convergence sweep aborted");
                return Err(e);
            }
        };

        let report = SweepReport {
            reference_price,
            records,
            elapsed: started.elapsed(),
        };

        tracing::info!(
            runs = report.records.len(),
            reference_price,
            final_error = report.final_error().unwrap_or(0.0),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "convergence sweep finished"
        );

        Ok(report)
    }

    fn check_continue(&self, cancel: &CancelToken, started: Instant) -> EngineResult<()> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled("cancelled by caller".into()));
        }
        if let Some(budget) = self.options.time_budget {
            if started.elapsed() >= budget {
                return Err(EngineError::Cancelled(format!("time budget of {budget:?} exhausted")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::OptionType;

    fn base() -> PricingParams {
        PricingParams::new(100.0, 100.0, 1.0, 0.05, 0.2, 10, OptionType::Call, 50).unwrap()
    }

    struct FailsAbove(usize);

    impl PricingModel for FailsAbove {
        fn name(&self) -> &'static str {
            "fails-above"
        }

        fn price(&self, params: &PricingParams) -> EngineResult<f64> {
            if params.steps() > self.0 {
                Err(EngineError::invalid(format!("refusing {} steps", params.steps())))
            } else {
                Ok(params.steps() as f64)
            }
        }
    }

    #[test]
    fn test_schedule_starts_at_one_with_fixed_stride() {
        let sweep = ConvergenceSweep::new(base(), 20, 5).unwrap();
        assert_eq!(sweep.schedule(), vec![1, 6, 11, 16]);
        let sweep = ConvergenceSweep::new(base(), 21, 5).unwrap();
        assert_eq!(sweep.schedule(), vec![1, 6, 11, 16, 21]);
        let sweep = ConvergenceSweep::new(base(), 0, 5).unwrap();
        assert!(sweep.schedule().is_empty());
    }

    #[test]
    fn test_zero_stride_rejected() {
        assert!(matches!(
            ConvergenceSweep::new(base(), 20, 0),
            Err(EngineError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_records_ordered_and_consistent() {
        for parallel in [false, true] {
            let sweep = ConvergenceSweep::new(base(), 20, 5)
                .unwrap()
                .with_options(SweepOptions { parallel, time_budget: None });
            let progress = SweepProgress::new();
            let report = sweep.run(&CancelToken::new(), &progress).unwrap();

            let steps: Vec<usize> = report.records.iter().map(|r| r.steps).collect();
            assert_eq!(steps, vec![1, 6, 11, 16], "parallel={parallel}");
            assert_eq!(progress.completed(), 4);
            for rec in &report.records {
                assert_eq!(rec.reference_price, report.reference_price);
                assert!((rec.absolute_error - (rec.lattice_price - rec.reference_price).abs()).abs() < 1e-15);
            }
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let seq = ConvergenceSweep::new(base(), 60, 7).unwrap();
        let par = ConvergenceSweep::new(base(), 60, 7)
            .unwrap()
            .with_options(SweepOptions { parallel: true, time_budget: None });
        let a = seq.run(&CancelToken::new(), &SweepProgress::new()).unwrap();
        let b = par.run(&CancelToken::new(), &SweepProgress::new()).unwrap();
        assert_eq!(a.records, b.records);
    }

    #[test]
    fn test_error_shrinks_with_resolution() {
        let sweep = ConvergenceSweep::new(base(), 501, 100).unwrap();
        let report = sweep.run(&CancelToken::new(), &SweepProgress::new()).unwrap();
        assert!((report.reference_price - 10.4506).abs() < 1e-3);
        let first = report.records.first().unwrap().absolute_error;
        let last = report.final_error().unwrap();
        assert!(first > last, "first={first} last={last}");
        assert!(last < 1e-2, "error at 501 steps = {last}");
        assert_eq!(report.max_error(), Some(first));
    }

    #[test]
    fn test_first_failure_aborts_without_partial_output() {
        let sweep = ConvergenceSweep::new(base(), 20, 5)
            .unwrap()
            .with_models(Box::new(FailsAbove(10)), Box::new(BlackScholes::new()));
        let progress = SweepProgress::new();
        let err = sweep.run(&CancelToken::new(), &progress).unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter(_)), "got {err}");
        assert_eq!(progress.completed(), 2);
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancelToken::new();
        token.cancel();
        let sweep = ConvergenceSweep::new(base(), 20, 5).unwrap();
        let err = sweep.run(&token, &SweepProgress::new()).unwrap_err();
        assert!(matches!(err, EngineError::Cancelled(_)), "got {err}");
    }

    #[test]
    fn test_exhausted_time_budget() {
        let sweep = ConvergenceSweep::new(base(), 20, 5)
            .unwrap()
            .with_options(SweepOptions { parallel: false, time_budget: Some(Duration::ZERO) });
        let err = sweep.run(&CancelToken::new(), &SweepProgress::new()).unwrap_err();
        assert!(matches!(err, EngineError::Cancelled(_)), "got {err}");
    }

    #[test]
    fn test_empty_sweep() {
        let sweep = ConvergenceSweep::new(base(), 0, 3).unwrap();
        let report = sweep.run(&CancelToken::new(), &SweepProgress::new()).unwrap();
        assert!(report.records.is_empty());
        assert_eq!(report.max_error(), None);
        assert_eq!(report.final_error(), None);
    }
}
