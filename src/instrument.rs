//! Instrumental-variable search
//!
//! A variable I instruments (T, Y) when:
//! 1. Relevance: I is associated with T (d-connected, unconditioned)
//! 2. Exclusion: every directed I → Y path runs through T
//! 3. Unconfoundedness: I shares no latent common cause with Y
//!
//! Conditions 2 and 3 collapse into one graphical test: in the graph with
//! T's outgoing edges removed, T becomes a collider on every channel it
//! mediates, so any remaining d-connection between I and Y is exactly a
//! forbidden direct or confounded channel.
//!
//! The search only annotates: it produces the instrument witness set for
//! partial identification. Bound arithmetic belongs to the estimation
//! layer and is out of scope here.

use std::collections::BTreeSet;

use tracing::debug;

use crate::graph::{CausalGraph, NodeId};

/// Collect every valid instrument for `treatment` → `outcome`.
///
/// Returns `None` when no candidate qualifies.
pub fn find_instruments(
    graph: &CausalGraph,
    treatment: &BTreeSet<NodeId>,
    outcome: &BTreeSet<NodeId>,
) -> Option<BTreeSet<NodeId>> {
    let post_treatment = graph.descendants(treatment);
    let instruments: BTreeSet<NodeId> = graph
        .vertices()
        .iter()
        .copied()
        .filter(|id| !post_treatment.contains(id) && !outcome.contains(id))
        .filter(|&id| is_valid_instrument(graph, id, treatment, outcome))
        .collect();
    if instruments.is_empty() {
        None
    } else {
        debug!("instrument witnesses: {:?}", graph.names(&instruments));
        Some(instruments)
    }
}

/// Check the IV conditions for a single candidate.
pub fn is_valid_instrument(
    graph: &CausalGraph,
    candidate: NodeId,
    treatment: &BTreeSet<NodeId>,
    outcome: &BTreeSet<NodeId>,
) -> bool {
    let candidate_set: BTreeSet<NodeId> = [candidate].into_iter().collect();
    // Relevance: the instrument must move the treatment
    if graph.d_separated(&candidate_set, treatment, &BTreeSet::new()) {
        return false;
    }
    // Exclusion + unconfoundedness: with the treatment's outgoing edges
    // removed, no open channel from the instrument to the outcome may
    // survive
    graph
        .remove_outgoing(treatment)
        .d_separated(&candidate_set, outcome, &BTreeSet::new())
}
