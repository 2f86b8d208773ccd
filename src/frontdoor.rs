//! Frontdoor criterion search
//!
//! A mediator set M satisfies the frontdoor criterion for (T, Y) if:
//! 1. M intercepts every directed path from T to Y
//! 2. There is no unblocked backdoor path from T to M
//! 3. Every backdoor path from M to Y is blocked by T
//!
//! Candidates are the nodes lying on directed T → Y paths. Subsets are
//! enumerated ascending by size and then lexicographically, and the first
//! valid one wins, so the result is deterministic.

use std::collections::BTreeSet;

use tracing::debug;

use crate::estimand::{Estimand, Expr};
use crate::graph::{CausalGraph, NodeId};

/// Find a frontdoor mediator set for `treatment` → `outcome`.
///
/// Invoked only after the backdoor search has failed; a `None` here still
/// leaves IV and the general algorithm in play.
pub fn find_mediator_set(
    graph: &CausalGraph,
    treatment: &BTreeSet<NodeId>,
    outcome: &BTreeSet<NodeId>,
) -> Option<BTreeSet<NodeId>> {
    let on_path = on_path_nodes(graph, treatment, outcome);
    debug!("frontdoor candidates: {:?}", graph.names(&on_path));

    let mut candidates: Vec<NodeId> = on_path.iter().copied().collect();
    candidates.sort_by(|a, b| graph.name(*a).cmp(graph.name(*b)));

    for size in 1..=candidates.len() {
        let mut found = None;
        each_combination(&candidates, size, &mut |combo| {
            if found.is_none() {
                let mediators: BTreeSet<NodeId> = combo.iter().copied().collect();
                if satisfies_frontdoor(graph, treatment, outcome, &mediators) {
                    found = Some(mediators);
                }
            }
        });
        if let Some(mediators) = found {
            debug!("frontdoor mediator set: {:?}", graph.names(&mediators));
            return Some(mediators);
        }
    }
    None
}

/// Nodes on directed treatment → outcome paths, excluding the endpoints.
pub fn on_path_nodes(
    graph: &CausalGraph,
    treatment: &BTreeSet<NodeId>,
    outcome: &BTreeSet<NodeId>,
) -> BTreeSet<NodeId> {
    let reachable = graph.descendants(treatment);
    let reaching = graph.ancestors(outcome);
    reachable
        .intersection(&reaching)
        .copied()
        .filter(|id| !treatment.contains(id) && !outcome.contains(id))
        .collect()
}

/// Check the frontdoor criterion for an explicit mediator set.
pub fn satisfies_frontdoor(
    graph: &CausalGraph,
    treatment: &BTreeSet<NodeId>,
    outcome: &BTreeSet<NodeId>,
    mediators: &BTreeSet<NodeId>,
) -> bool {
    if mediators.is_empty() {
        return false;
    }
    if !intercepts_all_paths(graph, treatment, outcome, mediators) {
        return false;
    }
    // No backdoor path from treatment into the mediators
    let no_out_t = graph.remove_outgoing(treatment);
    if !no_out_t.d_separated(treatment, mediators, &BTreeSet::new()) {
        return false;
    }
    // Backdoor paths from the mediators to the outcome close under T
    let no_out_m = graph.remove_outgoing(mediators);
    no_out_m.d_separated(mediators, outcome, treatment)
}

/// Whether every directed path from `from` to `to` passes through `cut`.
fn intercepts_all_paths(
    graph: &CausalGraph,
    from: &BTreeSet<NodeId>,
    to: &BTreeSet<NodeId>,
    cut: &BTreeSet<NodeId>,
) -> bool {
    let mut visited: BTreeSet<NodeId> = BTreeSet::new();
    let mut queue: Vec<NodeId> = from.iter().copied().collect();
    while let Some(node) = queue.pop() {
        if to.contains(&node) && !from.contains(&node) {
            return false;
        }
        if !visited.insert(node) || (cut.contains(&node) && !from.contains(&node)) {
            continue;
        }
        queue.extend(graph.children(node).iter().copied());
    }
    true
}

/// Visit every `size`-element combination of `items` in lexicographic
/// index order.
fn each_combination(items: &[NodeId], size: usize, visit: &mut impl FnMut(&[NodeId])) {
    fn recurse(
        items: &[NodeId],
        size: usize,
        start: usize,
        chosen: &mut Vec<NodeId>,
        visit: &mut impl FnMut(&[NodeId]),
    ) {
        if chosen.len() == size {
            visit(chosen);
            return;
        }
        let needed = size - chosen.len();
        for i in start..=items.len().saturating_sub(needed) {
            chosen.push(items[i]);
            recurse(items, size, i + 1, chosen, visit);
            chosen.pop();
        }
    }
    if size == 0 || size > items.len() {
        return;
    }
    recurse(items, size, 0, &mut Vec::with_capacity(size), visit);
}

/// Frontdoor estimand: `Σ_m P(m | t) · Σ_{t'} P(y | t', m) · P(t')`.
///
/// The inner sum re-marginalizes the treatment; its bound copy is primed
/// to keep it distinct from the free conditioning occurrence.
pub(crate) fn frontdoor_estimand(
    treatment: &BTreeSet<String>,
    outcome: &BTreeSet<String>,
    mediators: &BTreeSet<String>,
    conditioning: &BTreeSet<String>,
) -> Estimand {
    let primed: Vec<String> = treatment.iter().map(|t| format!("{}'", t)).collect();
    let inner_given: Vec<String> = primed
        .iter()
        .chain(mediators.iter())
        .chain(conditioning.iter())
        .cloned()
        .collect();
    let inner = Expr::marginal(
        primed.iter().cloned(),
        Expr::product(vec![
            Expr::probability(outcome.iter().cloned(), inner_given),
            Expr::probability(primed.iter().cloned(), conditioning.iter().cloned()),
        ]),
    );
    let mediator_given: Vec<String> = treatment
        .iter()
        .chain(conditioning.iter())
        .cloned()
        .collect();
    let expression = Expr::marginal(
        mediators.iter().cloned(),
        Expr::product(vec![
            Expr::probability(mediators.iter().cloned(), mediator_given),
            inner,
        ]),
    );
    Estimand::new(expression)
}
