//! Backdoor criterion search
//!
//! A set Z satisfies the backdoor criterion for (T, Y) if:
//! 1. No node in Z is a descendant of T
//! 2. Z blocks every backdoor path from T to Y (paths entering T)
//!
//! Condition 2 is tested as d-separation of T and Y given Z in the graph
//! with T's outgoing directed edges removed; what remains of any T–Y
//! connection there is exactly the backdoor paths.
//!
//! The search tests the full candidate pool first (fast accept), then
//! greedily shrinks it. Candidates are dropped in descending lexical
//! order, so the surviving minimal set is the lexically lowest one;
//! identification output must be reproducible bit for bit.

use std::collections::BTreeSet;

use tracing::debug;

use crate::estimand::{Estimand, Expr};
use crate::graph::{CausalGraph, NodeId};

/// Find a minimal backdoor adjustment set for `treatment` → `outcome`.
///
/// Returns `None` when no subset of the candidate pool satisfies the
/// criterion. That is weaker than "not identifiable": frontdoor, IV, or
/// the general algorithm may still succeed.
pub fn find_adjustment_set(
    graph: &CausalGraph,
    treatment: &BTreeSet<NodeId>,
    outcome: &BTreeSet<NodeId>,
) -> Option<BTreeSet<NodeId>> {
    let post_treatment = graph.descendants(treatment);
    let pool: BTreeSet<NodeId> = graph
        .vertices()
        .iter()
        .copied()
        .filter(|id| !post_treatment.contains(id) && !outcome.contains(id))
        .collect();
    debug!(
        "backdoor candidate pool: {:?}",
        graph.names(&pool)
    );

    if !satisfies_backdoor(graph, treatment, outcome, &pool) {
        debug!("full candidate pool fails the backdoor criterion");
        return None;
    }

    // Shrink greedily, dropping lexically-largest names first so the
    // minimal set that survives is the lexically lowest one.
    let mut adjustment = pool;
    let mut by_name_desc: Vec<NodeId> = adjustment.iter().copied().collect();
    by_name_desc.sort_by(|a, b| graph.name(*b).cmp(graph.name(*a)));
    for candidate in by_name_desc {
        adjustment.remove(&candidate);
        if !satisfies_backdoor(graph, treatment, outcome, &adjustment) {
            adjustment.insert(candidate);
        }
    }
    debug!("minimal backdoor set: {:?}", graph.names(&adjustment));
    Some(adjustment)
}

/// Check the backdoor criterion for an explicit set Z.
pub fn satisfies_backdoor(
    graph: &CausalGraph,
    treatment: &BTreeSet<NodeId>,
    outcome: &BTreeSet<NodeId>,
    z: &BTreeSet<NodeId>,
) -> bool {
    let post_treatment = graph.descendants(treatment);
    if z.iter().any(|id| post_treatment.contains(id)) {
        return false;
    }
    graph
        .remove_outgoing(treatment)
        .d_separated(treatment, outcome, z)
}

/// Adjustment-formula estimand: `Σ_z P(y | t, z, w) · P(z | w)` with the
/// effect-modifier context `w` carried through both factors.
pub(crate) fn adjustment_estimand(
    treatment: &BTreeSet<String>,
    outcome: &BTreeSet<String>,
    adjustment: &BTreeSet<String>,
    conditioning: &BTreeSet<String>,
) -> Estimand {
    let outcome_given: Vec<String> = treatment
        .iter()
        .chain(adjustment.iter())
        .chain(conditioning.iter())
        .cloned()
        .collect();
    let outcome_factor = Expr::probability(outcome.iter().cloned(), outcome_given);
    let expression = if adjustment.is_empty() {
        outcome_factor
    } else {
        Expr::marginal(
            adjustment.iter().cloned(),
            Expr::product(vec![
                outcome_factor,
                Expr::probability(adjustment.iter().cloned(), conditioning.iter().cloned()),
            ]),
        )
    };
    Estimand::new(expression)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(graph: &CausalGraph, names: &[&str]) -> BTreeSet<NodeId> {
        names
            .iter()
            .map(|n| graph.node_id(n).expect("fixture node"))
            .collect()
    }

    /// T <- U -> Y, T -> Y
    fn confounded_graph() -> CausalGraph {
        let mut g = CausalGraph::new();
        g.add_node("T").unwrap();
        g.add_node("Y").unwrap();
        g.add_node("U").unwrap();
        g.add_edge("T", "Y").unwrap();
        g.add_edge("U", "T").unwrap();
        g.add_edge("U", "Y").unwrap();
        g
    }

    #[test]
    fn test_observed_confounder_adjusted() {
        let g = confounded_graph();
        let found = find_adjustment_set(&g, &set(&g, &["T"]), &set(&g, &["Y"]));
        assert_eq!(found, Some(set(&g, &["U"])));
    }

    #[test]
    fn test_chain_needs_no_adjustment() {
        let mut g = CausalGraph::new();
        g.add_node("T").unwrap();
        g.add_node("M").unwrap();
        g.add_node("Y").unwrap();
        g.add_edge("T", "M").unwrap();
        g.add_edge("M", "Y").unwrap();
        let found = find_adjustment_set(&g, &set(&g, &["T"]), &set(&g, &["Y"]));
        assert_eq!(found, Some(BTreeSet::new()));
    }

    #[test]
    fn test_latent_confounding_defeats_backdoor() {
        let mut g = CausalGraph::new();
        g.add_node("T").unwrap();
        g.add_node("M").unwrap();
        g.add_node("Y").unwrap();
        g.add_edge("T", "M").unwrap();
        g.add_edge("M", "Y").unwrap();
        g.add_bidirected("T", "Y").unwrap();
        let found = find_adjustment_set(&g, &set(&g, &["T"]), &set(&g, &["Y"]));
        assert_eq!(found, None);
    }

    #[test]
    fn test_lexical_tiebreak_prefers_lowest() {
        // T <- B <- A -> Y: either A or B blocks the one backdoor path
        let mut g = CausalGraph::new();
        for name in ["A", "B", "T", "Y"] {
            g.add_node(name).unwrap();
        }
        g.add_edge("A", "B").unwrap();
        g.add_edge("B", "T").unwrap();
        g.add_edge("A", "Y").unwrap();
        g.add_edge("T", "Y").unwrap();
        let found = find_adjustment_set(&g, &set(&g, &["T"]), &set(&g, &["Y"]));
        assert_eq!(found, Some(set(&g, &["A"])));
    }

    #[test]
    fn test_descendants_excluded_from_pool() {
        // C is a post-treatment collider; the pool must not offer it
        let mut g = CausalGraph::new();
        for name in ["T", "Y", "U", "C"] {
            g.add_node(name).unwrap();
        }
        g.add_edge("T", "Y").unwrap();
        g.add_edge("U", "T").unwrap();
        g.add_edge("U", "Y").unwrap();
        g.add_edge("T", "C").unwrap();
        g.add_edge("U", "C").unwrap();
        let found =
            find_adjustment_set(&g, &set(&g, &["T"]), &set(&g, &["Y"])).expect("identifiable");
        assert!(!found.contains(&g.node_id("C").unwrap()));
        assert_eq!(found, set(&g, &["U"]));
    }

    #[test]
    fn test_found_set_passes_recheck() {
        let g = confounded_graph();
        let t = set(&g, &["T"]);
        let y = set(&g, &["Y"]);
        let found = find_adjustment_set(&g, &t, &y).expect("identifiable");
        assert!(satisfies_backdoor(&g, &t, &y, &found));
    }

    #[test]
    fn test_adjustment_estimand_rendering() {
        let t: BTreeSet<String> = ["T".to_string()].into_iter().collect();
        let y: BTreeSet<String> = ["Y".to_string()].into_iter().collect();
        let z: BTreeSet<String> = ["U".to_string()].into_iter().collect();
        let estimand = adjustment_estimand(&t, &y, &z, &BTreeSet::new());
        assert_eq!(estimand.render(), "Σ_{U} P(Y|T,U)·P(U)");
        let trivial = adjustment_estimand(&t, &y, &BTreeSet::new(), &BTreeSet::new());
        assert_eq!(trivial.render(), "P(Y|T)");
    }
}
