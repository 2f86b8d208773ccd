//! Causal effect identification for semi-Markovian diagrams
//!
//! Given a causal diagram (directed edges for causal arrows, bidirected
//! edges for latent confounding) and a query naming treatment and
//! outcome sets, this crate decides analytically whether the causal
//! effect is expressible as a function of the observed joint
//! distribution, and produces that expression in closed symbolic form.
//!
//! # Strategy chain
//!
//! ```text
//! query ──► backdoor ──► frontdoor ──► instruments ──► general ID
//!              │              │             │               │
//!        adjustment set   mediator set   witness set   C-component
//!                                        (partial)     decomposition
//! ```
//!
//! The criterion-based strategies run first because their estimands are
//! the ones practitioners can read; the general algorithm (Tian /
//! Shpitser–Pearl) is sound and complete and settles everything the
//! criteria cannot, including the verdict "not identifiable" with its
//! graphical hedge witness.
//!
//! # Example
//!
//! ```
//! use causal_identifier::{CausalGraph, CausalQuery, EffectIdentifier};
//!
//! // T <- U -> Y with T -> Y: classic observed confounding
//! let mut graph = CausalGraph::new();
//! graph.add_node("T").unwrap();
//! graph.add_node("Y").unwrap();
//! graph.add_node("U").unwrap();
//! graph.add_edge("T", "Y").unwrap();
//! graph.add_edge("U", "T").unwrap();
//! graph.add_edge("U", "Y").unwrap();
//!
//! let identifier = EffectIdentifier::new(&graph);
//! let result = identifier.identify(&CausalQuery::total_effect("T", "Y")).unwrap();
//!
//! assert!(result.is_identified());
//! assert_eq!(result.estimand().unwrap().render(), "Σ_{U} P(Y|T,U)·P(U)");
//! ```
//!
//! Estimation, refutation, graph discovery, and visualization are
//! external collaborators: they supply the validated graph and consume
//! the [`IdentifiedEstimand`]. The core is synchronous, allocation-light
//! and side-effect-free; a shared graph can serve concurrent queries.

pub mod backdoor;
pub mod error;
pub mod estimand;
pub mod frontdoor;
pub mod graph;
pub mod id_algorithm;
pub mod identify;
pub mod instrument;
pub mod query;

// Re-exports
pub use error::{GraphError, IdentificationError};
pub use estimand::{Estimand, Expr};
pub use graph::{CausalGraph, GraphDescription, MoralGraph, NodeId};
pub use id_algorithm::Hedge;
pub use identify::{
    identify_effect, EffectIdentifier, IdentificationOutcome, IdentifiedEstimand, Strategy,
};
pub use query::{CausalQuery, EstimandType};
