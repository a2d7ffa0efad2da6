use crate::models::lattice::TreeConstants;
use crate::state::{OptionType, TriangularLattice};

/// Option value at every node by backward induction.
///
/// Terminal level holds the payoff; earlier levels hold the discounted
/// risk-neutral expectation of their two successors:
///
/// value[k][j] = discount * (p * value[k+1][j] + (1 - p) * value[k+1][j+1])
///
/// Node j stays j on an up-move and becomes j+1 on a down-move.
pub fn backward_induction(
    prices: &TriangularLattice,
    constants: &TreeConstants,
    option_type: OptionType,
    strike: f64,
) -> TriangularLattice {
    let steps = prices.steps();
    let mut values = TriangularLattice::zeros(steps);

    for (value, &spot) in values.row_mut(steps).iter_mut().zip(prices.row(steps)) {
        *value = option_type.payoff(spot, strike);
    }

    let disc_p = constants.discount * constants.p;
    let disc_q = constants.discount * (1.0 - constants.p);

    for k in (0..steps).rev() {
        let (current, next) = values.level_pair_mut(k);
        for (j, value) in current.iter_mut().enumerate() {
            *value = disc_p * next[j] + disc_q * next[j + 1];
        }
    }

    values
}

/// Every node's value relative to the root price. A display measure,
/// not a trading P&L.
pub fn profit_lattice(values: &TriangularLattice) -> TriangularLattice {
    let option_price = values.get(0, 0);
    values.map(|v| v - option_price)
}
