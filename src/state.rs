use crate::errors::{EngineError, EngineResult};
use serde::ser::{Serialize, Serializer};
use smallvec::SmallVec;
use std::str::FromStr;

// ── Option Type ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    /// Payoff at expiry for an underlying price `spot`. Never negative.
    #[inline]
    pub fn payoff(self, spot: f64, strike: f64) -> f64 {
        match self {
            Self::Call => (spot - strike).max(0.0),
            Self::Put => (strike - spot).max(0.0),
        }
    }
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::Put => write!(f, "put"),
        }
    }
}

impl FromStr for OptionType {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "call" => Ok(Self::Call),
            "put" => Ok(Self::Put),
            other => Err(EngineError::invalid(format!(
                "option_type must be call or put, got {other:?}"
            ))),
        }
    }
}

// ── Pricing request (validated, immutable) ──

/// One pricing request. Fields are private so an instance is always valid;
/// changing any input means building a new one.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct PricingParams {
    spot: f64,
    strike: f64,
    maturity: f64,
    rate: f64,
    sigma: f64,
    steps: usize,
    option_type: OptionType,
    /// Caller policy only; the engine never enforces it.
    max_steps: usize,
}

impl PricingParams {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        spot: f64,
        strike: f64,
        maturity: f64,
        rate: f64,
        sigma: f64,
        steps: i64,
        option_type: OptionType,
        max_steps: usize,
    ) -> EngineResult<Self> {
        positive("S0", spot)?;
        positive("K", strike)?;
        positive("T", maturity)?;
        positive("sigma", sigma)?;
        if !rate.is_finite() {
            return Err(EngineError::invalid(format!("r must be finite, got {rate}")));
        }
        let steps = checked_steps(steps)?;

        Ok(Self {
            spot,
            strike,
            maturity,
            rate,
            sigma,
            steps,
            option_type,
            max_steps,
        })
    }

    /// Same request at a different lattice resolution.
    pub fn with_steps(&self, steps: i64) -> EngineResult<Self> {
        Ok(Self {
            steps: checked_steps(steps)?,
            ..*self
        })
    }

    #[inline]
    pub fn spot(&self) -> f64 {
        self.spot
    }

    #[inline]
    pub fn strike(&self) -> f64 {
        self.strike
    }

    #[inline]
    pub fn maturity(&self) -> f64 {
        self.maturity
    }

    #[inline]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    #[inline]
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    #[inline]
    pub fn steps(&self) -> usize {
        self.steps
    }

    #[inline]
    pub fn option_type(&self) -> OptionType {
        self.option_type
    }

    #[inline]
    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// True when `steps` is above the caller's configured cap.
    #[inline]
    pub fn exceeds_max_steps(&self) -> bool {
        self.steps > self.max_steps
    }
}

impl std::fmt::Display for PricingParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "S0={}, K={}, T={}, r={}, sigma={}, option_type={}",
            self.spot, self.strike, self.maturity, self.rate, self.sigma, self.option_type
        )
    }
}

fn positive(name: &str, value: f64) -> EngineResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(EngineError::invalid(format!("{name} must be finite and > 0, got {value}")))
    }
}

fn checked_steps(steps: i64) -> EngineResult<usize> {
    if steps < 0 {
        return Err(EngineError::invalid(format!("steps must be >= 0, got {steps}")));
    }
    // powi takes an i32 exponent
    if steps > i64::from(i32::MAX) {
        return Err(EngineError::invalid(format!("steps too large: {steps}")));
    }
    usize::try_from(steps).map_err(|e| EngineError::invalid(format!("steps: {e}")))
}

// ── Triangular lattice storage ──

/// Recombining-tree storage: level `k` holds `k + 1` nodes, node `j` being the
/// state after `j` down-moves. Stored flat, level `k` starting at `k(k+1)/2`.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangularLattice {
    steps: usize,
    cells: Vec<f64>,
}

impl TriangularLattice {
    /// Build a lattice with `steps + 1` levels, filling node `(k, j)` with `f(k, j)`.
    pub fn from_fn(steps: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut cells = Vec::with_capacity(offset(steps + 1));
        for k in 0..=steps {
            for j in 0..=k {
                cells.push(f(k, j));
            }
        }
        Self { steps, cells }
    }

    pub(crate) fn zeros(steps: usize) -> Self {
        Self {
            steps,
            cells: vec![0.0; offset(steps + 1)],
        }
    }

    #[inline]
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Number of levels (`steps + 1`).
    #[inline]
    pub fn levels(&self) -> usize {
        self.steps + 1
    }

    /// Node value. Panics if `k > steps` or `j > k`.
    #[inline]
    pub fn get(&self, k: usize, j: usize) -> f64 {
        self.row(k)[j]
    }

    #[inline]
    pub fn row(&self, k: usize) -> &[f64] {
        assert!(k <= self.steps, "level {k} out of range (steps={})", self.steps);
        &self.cells[offset(k)..offset(k + 1)]
    }

    #[inline]
    pub(crate) fn row_mut(&mut self, k: usize) -> &mut [f64] {
        assert!(k <= self.steps, "level {k} out of range (steps={})", self.steps);
        &mut self.cells[offset(k)..offset(k + 1)]
    }

    /// Level `k` (mutable) together with level `k + 1` (shared).
    pub(crate) fn level_pair_mut(&mut self, k: usize) -> (&mut [f64], &[f64]) {
        assert!(k < self.steps, "level {k} has no successor (steps={})", self.steps);
        let (head, tail) = self.cells.split_at_mut(offset(k + 1));
        (&mut head[offset(k)..], &tail[..k + 2])
    }

    /// Level `k` (shared) together with level `k + 1` (mutable).
    pub(crate) fn successor_pair_mut(&mut self, k: usize) -> (&[f64], &mut [f64]) {
        assert!(k < self.steps, "level {k} has no successor (steps={})", self.steps);
        let (head, tail) = self.cells.split_at_mut(offset(k + 1));
        (&head[offset(k)..], &mut tail[..k + 2])
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..=self.steps).map(move |k| self.row(k))
    }

    /// Apply `f` to every node, keeping the shape.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            steps: self.steps,
            cells: self.cells.iter().map(|&v| f(v)).collect(),
        }
    }

    pub fn to_nested(&self) -> Vec<Vec<f64>> {
        self.rows().map(<[f64]>::to_vec).collect()
    }

    /// First node holding NaN or an infinity, as `(k, j)`.
    pub fn first_non_finite(&self) -> Option<(usize, usize)> {
        self.rows()
            .enumerate()
            .find_map(|(k, row)| row.iter().position(|v| !v.is_finite()).map(|j| (k, j)))
    }
}

#[inline]
fn offset(k: usize) -> usize {
    k * (k + 1) / 2
}

impl Serialize for TriangularLattice {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.rows())
    }
}

// ── Path and convergence records ──

/// Node index per level, level 0 first.
pub type Path = SmallVec<[usize; 32]>;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct ConvergenceRecord {
    pub steps: usize,
    pub lattice_price: f64,
    pub reference_price: f64,
    pub absolute_error: f64,
}

impl ConvergenceRecord {
    pub fn new(steps: usize, lattice_price: f64, reference_price: f64) -> Self {
        Self {
            steps,
            lattice_price,
            reference_price,
            absolute_error: (lattice_price - reference_price).abs(),
        }
    }

    /// `absolute_error / reference_price`, defined as 0 for a zero reference.
    #[inline]
    pub fn relative_error(&self) -> f64 {
        if self.reference_price == 0.0 {
            0.0
        } else {
            self.absolute_error / self.reference_price
        }
    }
}
