use crate::state::{Path, TriangularLattice};

/// Risk-neutral probability of reaching each node.
///
/// prob[0][0] = 1
/// prob[s][n] = prob[s-1][n] * p        (n < s, arrived by an up-move)
///            + prob[s-1][n-1] * (1-p)  (n > 0, arrived by a down-move)
///
/// Each level is a binomial distribution, so rows sum to 1.
pub fn propagate_probabilities(p: f64, steps: usize) -> TriangularLattice {
    let q = 1.0 - p;
    let mut probs = TriangularLattice::zeros(steps);
    probs.row_mut(0)[0] = 1.0;

    for s in 0..steps {
        let (prev, next) = probs.successor_pair_mut(s);
        let level = s + 1;
        for (n, slot) in next.iter_mut().enumerate() {
            let from_up = if n < level { prev[n] * p } else { 0.0 };
            let from_down = if n > 0 { prev[n - 1] * q } else { 0.0 };
            *slot = from_up + from_down;
        }
    }

    probs
}

/// First (lowest-index) node of the highest probability on the last level.
pub fn most_likely_terminal_node(probs: &TriangularLattice) -> usize {
    let mut best = 0;
    let mut best_prob = f64::NEG_INFINITY;
    for (n, &prob) in probs.row(probs.steps()).iter().enumerate() {
        if prob > best_prob {
            best = n;
            best_prob = prob;
        }
    }
    best
}

/// Walk back from `terminal` to the root, choosing at each level the
/// predecessor that contributed more probability.
///
/// The up predecessor is taken only when its contribution is strictly
/// greater. An exact tie goes to the down predecessor, which makes paths in
/// symmetric trees (p = 0.5) lean down. Kept as-is; callers rely on it.
pub fn backtrack_path(probs: &TriangularLattice, p: f64, terminal: usize) -> Path {
    let steps = probs.steps();
    let q = 1.0 - p;
    let mut path = Path::from_elem(0, steps + 1);
    let mut node = terminal;
    path[steps] = node;

    for step in (1..=steps).rev() {
        let prev = probs.row(step - 1);
        let from_up = (node < step).then(|| prev[node] * p);
        let from_down = (node > 0).then(|| prev[node - 1] * q);

        node = match (from_up, from_down) {
            (Some(up), Some(down)) if up > down => node,
            (Some(_), Some(_)) => node - 1,
            (Some(_), None) => node,
            (None, _) => node - 1,
        };
        path[step - 1] = node;
    }

    path
}

/// Most probable terminal node and the path leading to it.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MostLikelyOutcome {
    pub path: Path,
    pub terminal_node: usize,
    pub terminal_price: f64,
    pub payoff: f64,
    pub probability: f64,
    pub profit: f64,
}

impl MostLikelyOutcome {
    pub fn estimate(
        prices: &TriangularLattice,
        values: &TriangularLattice,
        profits: &TriangularLattice,
        probs: &TriangularLattice,
        p: f64,
    ) -> Self {
        let steps = probs.steps();
        let terminal_node = most_likely_terminal_node(probs);
        let path = backtrack_path(probs, p, terminal_node);

        Self {
            path,
            terminal_node,
            terminal_price: prices.get(steps, terminal_node),
            payoff: values.get(steps, terminal_node),
            probability: probs.get(steps, terminal_node),
            profit: profits.get(steps, terminal_node),
        }
    }
}
