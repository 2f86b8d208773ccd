//! General identification algorithm
//!
//! The recursive graph-decomposition procedure for arbitrary
//! semi-Markovian diagrams (Tian / Shpitser–Pearl). It decides
//! identifiability of `P(y | do(x))` for any diagram with latent
//! confounding and, on success, emits the symbolic expression as sums and
//! products over C-components via truncated factorization. On failure it
//! returns the obstructing [`Hedge`], a first-class outcome rather than an
//! error.
//!
//! # Recursion
//!
//! 1. No interventions left: marginalize the current distribution
//! 2. Restrict to the ancestors of the outcome
//! 3. Absorb non-effective interventions (variables that cannot reach
//!    the outcome once the intervened edges are cut)
//! 4. Factorize over the C-components of the diagram minus the treatment
//! 5. One component left: fail if the whole diagram is a single
//!    C-component, emit a truncated factor product if the component is a
//!    C-component of the diagram, otherwise recurse into the enclosing
//!    C-component with a substituted product distribution
//!
//! The distribution threaded through the recursion starts as the
//! observational joint; step-5 substitution turns it into a compound
//! expression, whose conditionals are expressed as quotients of
//! marginals.
//!
//! Backdoor and frontdoor are special cases of this procedure; it runs
//! last only because their estimands are simpler to read.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::estimand::Expr;
use crate::graph::{CausalGraph, NodeId};

/// Graphical witness of non-identifiability.
///
/// The latent structure ties the outcome's C-component to the entire
/// subgraph under consideration, so no truncated factorization can
/// isolate the treatment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hedge {
    /// C-component spanning the whole obstructing subgraph
    pub component: BTreeSet<String>,
    /// C-component of the treatment-free residual it engulfs
    pub residual: BTreeSet<String>,
}

impl fmt::Display for Hedge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hedge: C-component {{{}}} spans the whole subgraph, engulfing the factor over {{{}}}",
            self.component.iter().cloned().collect::<Vec<_>>().join(", "),
            self.residual.iter().cloned().collect::<Vec<_>>().join(", "),
        )
    }
}

/// Distribution threaded through the recursion.
#[derive(Clone, Debug)]
enum Dist {
    /// Observational joint over the current diagram's variables
    Joint,
    /// Substituted compound expression over the current diagram's variables
    Compound(Expr),
}

/// Decide identifiability of `P(outcome | do(treatment))` and emit the
/// symbolic expression.
pub fn identify(
    graph: &CausalGraph,
    treatment: &BTreeSet<NodeId>,
    outcome: &BTreeSet<NodeId>,
) -> Result<Expr, Hedge> {
    id(graph, outcome.clone(), treatment.clone(), Dist::Joint)
}

fn id(g: &CausalGraph, y: BTreeSet<NodeId>, x: BTreeSet<NodeId>, p: Dist) -> Result<Expr, Hedge> {
    let v = g.vertices().clone();

    // 1. nothing intervened: sum the distribution down to y
    if x.is_empty() {
        let drop: BTreeSet<NodeId> = v.difference(&y).copied().collect();
        return Ok(Expr::marginal(names(g, &drop), dist_expr(g, &p)));
    }

    // 2. restrict to the ancestors of y
    let ancestral = g.ancestors(&y);
    if ancestral != v {
        debug!("restricting to ancestors of outcome: {:?}", g.names(&ancestral));
        let sub = g.induced_subgraph(&ancestral);
        let x_sub: BTreeSet<NodeId> = x.intersection(&ancestral).copied().collect();
        let p_sub = marginal_to(g, p, &ancestral);
        return id(&sub, y, x_sub, p_sub);
    }

    // 3. absorb interventions that cannot reach y once x is cut off
    let cut = g.remove_incoming(&x);
    let reaching = cut.ancestors(&y);
    let absorbed: BTreeSet<NodeId> = v
        .iter()
        .copied()
        .filter(|id| !x.contains(id) && !reaching.contains(id))
        .collect();
    if !absorbed.is_empty() {
        debug!("absorbing non-effective interventions: {:?}", g.names(&absorbed));
        let x_wide: BTreeSet<NodeId> = x.union(&absorbed).copied().collect();
        return id(g, y, x_wide, p);
    }

    // 4. factorize over the C-components of G ∖ X
    let residual_vertices: BTreeSet<NodeId> = v.difference(&x).copied().collect();
    let residual = g.induced_subgraph(&residual_vertices);
    let mut components = residual.c_components();
    if components.len() > 1 {
        let mut factors = Vec::with_capacity(components.len());
        for component in &components {
            let rest: BTreeSet<NodeId> = v.difference(component).copied().collect();
            factors.push(id(g, component.clone(), rest, p.clone())?);
        }
        let retained: BTreeSet<NodeId> = y.union(&x).copied().collect();
        let drop: BTreeSet<NodeId> = v.difference(&retained).copied().collect();
        return Ok(Expr::marginal(names(g, &drop), Expr::product(factors)));
    }
    let component = components.pop().expect("treatment-free residual is nonempty");

    // 5. single component left
    let diagram_components = g.c_components();
    if diagram_components.len() == 1 {
        let hedge = Hedge {
            component: g.names(&diagram_components[0]),
            residual: g.names(&component),
        };
        debug!("{}", hedge);
        return Err(hedge);
    }

    let order = g.topological_order();
    if diagram_components.contains(&component) {
        // the component factorizes against the current distribution
        let factors = truncated_factors(g, &p, &component, &order);
        let drop: BTreeSet<NodeId> = component.difference(&y).copied().collect();
        return Ok(Expr::marginal(names(g, &drop), Expr::product(factors)));
    }

    // recurse into the enclosing C-component with a substituted
    // product distribution
    let enclosing = diagram_components
        .into_iter()
        .find(|candidate| component.is_subset(candidate))
        .expect("residual component lies inside a diagram C-component");
    debug!("recursing into C-component: {:?}", g.names(&enclosing));
    let substituted = Expr::product(truncated_factors(g, &p, &enclosing, &order));
    let sub = g.induced_subgraph(&enclosing);
    let x_sub: BTreeSet<NodeId> = x.intersection(&enclosing).copied().collect();
    id(&sub, y, x_sub, Dist::Compound(substituted))
}

/// Conditional factors `P(vᵢ | v₁..vᵢ₋₁)` for the members of `component`,
/// with predecessors taken along the diagram's topological order.
fn truncated_factors(
    g: &CausalGraph,
    p: &Dist,
    component: &BTreeSet<NodeId>,
    order: &[NodeId],
) -> Vec<Expr> {
    let mut factors = Vec::with_capacity(component.len());
    let mut preceding: BTreeSet<NodeId> = BTreeSet::new();
    for &node in order {
        if component.contains(&node) {
            factors.push(conditional(g, p, node, &preceding));
        }
        preceding.insert(node);
    }
    factors
}

/// Conditional of the current distribution. The observational joint
/// yields a probability leaf; a compound expression yields a quotient of
/// marginals.
fn conditional(g: &CausalGraph, p: &Dist, target: NodeId, given: &BTreeSet<NodeId>) -> Expr {
    match p {
        Dist::Joint => Expr::probability(
            [g.name(target).to_string()],
            given.iter().map(|&id| g.name(id).to_string()),
        ),
        Dist::Compound(expr) => {
            let scope = g.vertices();
            let numerator_drop: BTreeSet<NodeId> = scope
                .iter()
                .copied()
                .filter(|id| *id != target && !given.contains(id))
                .collect();
            let denominator_drop: BTreeSet<NodeId> = scope
                .iter()
                .copied()
                .filter(|id| !given.contains(id))
                .collect();
            Expr::quotient(
                Expr::marginal(names(g, &numerator_drop), expr.clone()),
                Expr::marginal(names(g, &denominator_drop), expr.clone()),
            )
        }
    }
}

/// The current distribution as a bare expression over the diagram.
fn dist_expr(g: &CausalGraph, p: &Dist) -> Expr {
    match p {
        Dist::Joint => Expr::probability(
            g.vertices().iter().map(|&id| g.name(id).to_string()),
            Vec::new(),
        ),
        Dist::Compound(expr) => expr.clone(),
    }
}

/// Marginalize the current distribution down to `keep`.
fn marginal_to(g: &CausalGraph, p: Dist, keep: &BTreeSet<NodeId>) -> Dist {
    match p {
        // marginals of the observational joint are observational joints
        Dist::Joint => Dist::Joint,
        Dist::Compound(expr) => {
            let drop: BTreeSet<NodeId> = g
                .vertices()
                .iter()
                .copied()
                .filter(|id| !keep.contains(id))
                .collect();
            Dist::Compound(Expr::marginal(names(g, &drop), expr))
        }
    }
}

fn names(g: &CausalGraph, ids: &BTreeSet<NodeId>) -> BTreeSet<String> {
    g.names(ids)
}
