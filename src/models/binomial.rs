use crate::errors::{EngineError, EngineResult};
use crate::models::black_scholes::BlackScholes;
use crate::models::lattice::{build_price_lattice, TreeConstants};
use crate::models::path::{propagate_probabilities, MostLikelyOutcome};
use crate::models::valuation::{backward_induction, profit_lattice};
use crate::models::PricingModel;
use crate::state::{PricingParams, TriangularLattice};

/// Everything derived from one pricing request. Built once, never mutated;
/// a new request means a new `PricedTree`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PricedTree {
    pub params: PricingParams,
    pub constants: TreeConstants,
    pub prices: TriangularLattice,
    pub option_values: TriangularLattice,
    pub profits: TriangularLattice,
    pub probabilities: TriangularLattice,
    pub option_price: f64,
    pub most_likely: MostLikelyOutcome,
}

impl PricedTree {
    /// Closed-form price for the same inputs, computed on demand.
    pub fn reference_price(&self) -> EngineResult<f64> {
        BlackScholes::new().price(&self.params)
    }

    /// Whether the option is worth anything at node `(k, j)`.
    #[inline]
    pub fn node_has_value(&self, k: usize, j: usize) -> bool {
        self.option_values.get(k, j) > 0.0
    }

    pub fn summary(&self) -> String {
        format!(
            "Option price: {:.2} | Estimated payoff at T: {:.2} with probability {:.2}%",
            self.option_price,
            self.most_likely.payoff,
            self.most_likely.probability * 100.0
        )
    }
}

/// Constants, price lattice and option values for `params`, or
/// `InvalidParameter` when the tree does not fit in f64.
fn value_tree(params: &PricingParams) -> EngineResult<(TreeConstants, TriangularLattice, TriangularLattice)> {
    let constants = TreeConstants::new(params);
    constants.check_finite()?;

    let prices = build_price_lattice(params, &constants);
    if let Some((k, j)) = prices.first_non_finite() {
        return Err(EngineError::invalid(format!(
            "underlying price at node ({k}, {j}) is {}; u={} over {} steps overflows",
            prices.get(k, j),
            constants.u,
            params.steps()
        )));
    }

    let option_values = backward_induction(&prices, &constants, params.option_type(), params.strike());
    if let Some((k, j)) = option_values.first_non_finite() {
        return Err(EngineError::invalid(format!(
            "option value at node ({k}, {j}) is {}",
            option_values.get(k, j)
        )));
    }

    Ok((constants, prices, option_values))
}

/// Price `params` on a CRR lattice and estimate the most likely terminal path.
pub fn price(params: &PricingParams) -> EngineResult<PricedTree> {
    let (constants, prices, option_values) = value_tree(params)?;
    if constants.is_degenerate() {
        tracing::debug!(spot = params.spot(), "zero steps, single-node tree");
    } else if !constants.is_arbitrage_free() {
        tracing::warn!(
            p = constants.p,
            steps = params.steps(),
            sigma = params.sigma(),
            rate = params.rate(),
            "risk-neutral probability outside [0, 1]; tree admits arbitrage"
        );
    }

    let option_price = option_values.get(0, 0);
    let profits = profit_lattice(&option_values);
    let probabilities = propagate_probabilities(constants.p, params.steps());
    let most_likely =
        MostLikelyOutcome::estimate(&prices, &option_values, &profits, &probabilities, constants.p);

    tracing::debug!(
        steps = params.steps(),
        option_type = %params.option_type(),
        option_price,
        terminal_node = most_likely.terminal_node,
        "priced tree"
    );

    Ok(PricedTree {
        params: *params,
        constants,
        prices,
        option_values,
        profits,
        probabilities,
        option_price,
        most_likely,
    })
}

/// Lattice price only: builds prices and values, skips path estimation.
/// This is the unit of work in a convergence sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinomialModel;

impl PricingModel for BinomialModel {
    #[inline]
    fn name(&self) -> &'static str {
        "Binomial (CRR)"
    }

    fn price(&self, params: &PricingParams) -> EngineResult<f64> {
        let (_, _, values) = value_tree(params)?;
        Ok(values.get(0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::OptionType;

    fn params(strike: f64, steps: i64, option_type: OptionType) -> PricingParams {
        PricingParams::new(100.0, strike, 1.0, 0.05, 0.2, steps, option_type, 1000).unwrap()
    }

    #[test]
    fn test_degenerate_prices_intrinsic() {
        let call = price(&params(90.0, 0, OptionType::Call)).unwrap();
        assert_eq!(call.prices.to_nested(), vec![vec![100.0]]);
        assert_eq!(call.option_price, 10.0);
        assert_eq!(call.most_likely.path.as_slice(), &[0]);
        assert_eq!(call.most_likely.probability, 1.0);
        assert_eq!(call.most_likely.profit, 0.0);

        let put = price(&params(90.0, 0, OptionType::Put)).unwrap();
        assert_eq!(put.option_price, 0.0);
        let put = price(&params(120.0, 0, OptionType::Put)).unwrap();
        assert_eq!(put.option_price, 20.0);
    }

    #[test]
    fn test_convergence_to_reference() {
        let coarse = price(&params(100.0, 1, OptionType::Call)).unwrap();
        let fine = price(&params(100.0, 500, OptionType::Call)).unwrap();
        let reference = fine.reference_price().unwrap();
        assert!((reference - 10.4506).abs() < 1e-3, "reference={reference}");

        let coarse_err = (coarse.option_price - reference).abs();
        let fine_err = (fine.option_price - reference).abs();
        assert!(coarse_err > fine_err, "coarse={coarse_err} fine={fine_err}");
        assert!(fine_err < 1e-2, "500-step error {fine_err} too large");
    }

    #[test]
    fn test_result_shapes_and_invariants() {
        for option_type in [OptionType::Call, OptionType::Put] {
            let tree = price(&params(105.0, 12, option_type)).unwrap();
            assert!(tree.option_price >= 0.0);
            for lat in [&tree.prices, &tree.option_values, &tree.profits, &tree.probabilities] {
                assert_eq!(lat.levels(), 13);
            }
            for row in tree.probabilities.rows() {
                let sum: f64 = row.iter().sum();
                assert!((sum - 1.0).abs() < 1e-12, "row sums to {sum}");
            }

            let ml = &tree.most_likely;
            assert_eq!(ml.path.len(), 13);
            assert_eq!(ml.path[12], ml.terminal_node);
            assert!(ml.path.windows(2).all(|w| w[1] == w[0] || w[1] == w[0] + 1));
            assert_eq!(ml.payoff, tree.option_values.get(12, ml.terminal_node));
            assert_eq!(ml.probability, tree.probabilities.get(12, ml.terminal_node));
            assert!((ml.profit - (ml.payoff - tree.option_price)).abs() < 1e-12);
            assert_eq!(ml.terminal_price, tree.prices.get(12, ml.terminal_node));
        }
    }

    #[test]
    fn test_most_likely_node_near_center() {
        // mode of the down-move count is floor(11 * (1 - p)) with p ~ 0.524
        let tree = price(&params(100.0, 10, OptionType::Call)).unwrap();
        assert!(tree.constants.p > 0.5);
        assert_eq!(tree.most_likely.terminal_node, 5);
    }

    #[test]
    fn test_node_has_value_tracks_moneyness() {
        let tree = price(&params(100.0, 4, OptionType::Call)).unwrap();
        assert!(tree.node_has_value(4, 0));
        assert!(!tree.node_has_value(4, 4));
        assert!(tree.node_has_value(0, 0));
    }

    #[test]
    fn test_model_matches_full_pricing() {
        let p = params(95.0, 40, OptionType::Put);
        let full = price(&p).unwrap();
        let quick = BinomialModel.price(&p).unwrap();
        assert_eq!(full.option_price, quick);
    }

    #[test]
    fn test_overflowing_tree_is_rejected() {
        // u = e^250 per step; the top of level 16 is e^4000
        let p = PricingParams::new(100.0, 100.0, 100.0, 0.05, 100.0, 16, OptionType::Call, 50).unwrap();
        let err = price(&p).unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter(_)), "got {err}");
        let err = BinomialModel.price(&p).unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter(_)), "got {err}");
    }

    #[test]
    fn test_collapsed_moves_are_rejected() {
        // sigma * sqrt(dt) = 5e-18 rounds u to exactly 1
        let p = PricingParams::new(100.0, 100.0, 1.0, 0.05, 1e-17, 4, OptionType::Call, 50).unwrap();
        assert_eq!(TreeConstants::new(&p).u, 1.0);
        let err = price(&p).unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter(_)), "got {err}");
        let err = BinomialModel.price(&p).unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter(_)), "got {err}");
    }

    #[test]
    fn test_underflowing_dt_is_not_degenerate() {
        // smallest positive maturity: T / 4 rounds to zero
        let p = PricingParams::new(100.0, 100.0, f64::from_bits(1), 0.05, 0.2, 4, OptionType::Put, 50).unwrap();
        let c = TreeConstants::new(&p);
        assert_eq!(c.dt, 0.0);
        assert!(!c.is_degenerate(), "four-step tree must not take the single-node branch");
        let err = price(&p).unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter(_)), "got {err}");
    }

    #[test]
    fn test_wide_tree_stays_finite() {
        // large but representable moves; even-level middle nodes sit exactly at S0
        let p = PricingParams::new(100.0, 100.0, 1.0, 0.05, 3.0, 16, OptionType::Call, 50).unwrap();
        let tree = price(&p).unwrap();
        assert_eq!(tree.prices.first_non_finite(), None);
        assert!(tree.option_price.is_finite() && tree.option_price > 0.0);
        for k in (0..=16).step_by(2) {
            assert_eq!(tree.prices.get(k, k / 2), 100.0, "middle of level {k}");
        }
    }

    #[test]
    fn test_summary_line() {
        let tree = price(&params(90.0, 0, OptionType::Call)).unwrap();
        assert_eq!(
            tree.summary(),
            "Option price: 10.00 | Estimated payoff at T: 10.00 with probability 100.00%"
        );
    }
}
