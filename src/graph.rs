//! Causal diagram: directed + bidirected graph with d-separation
//!
//! Implements the graph engine behind effect identification:
//! - Nodes held in an arena indexed by [`NodeId`]; edges are index pairs
//! - Directed edges (causal arrows, acyclic) and bidirected edges
//!   (latent confounders; no latent node is ever materialized)
//! - Ancestor/descendant closures, induced subgraphs, edge mutilations
//! - d-separation via moralization of the ancestral subgraph
//! - C-component decomposition for the general identification algorithm
//!
//! Subgraph views and mutilations return private copies that preserve
//! `NodeId`s, so node identities survive restriction and can be compared
//! across recursion levels. No operation mutates its receiver.
//!
//! All adjacency is kept in `BTreeSet<NodeId>`, which makes every
//! traversal order deterministic; identification output must be
//! bit-identical across runs.

use std::collections::{BTreeSet, VecDeque};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Index of a node in the graph arena.
///
/// Ids are assigned in insertion order and remain valid in every subgraph
/// or mutilated copy derived from the same graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// Position of this node in the arena
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Edge-list description of a causal diagram, the crate's boundary input.
///
/// Produced by an external graph-loading component; validated into a
/// [`CausalGraph`] with [`CausalGraph::from_description`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDescription {
    /// Variable names
    pub nodes: Vec<String>,
    /// Directed causal arrows as (from, to) pairs
    #[serde(default)]
    pub edges: Vec<(String, String)>,
    /// Latent common causes as unordered (left, right) pairs
    #[serde(default)]
    pub bidirected: Vec<(String, String)>,
}

/// A causal diagram over named variables.
///
/// The directed projection is a DAG, enforced on every edge insertion.
/// Bidirected edges stand in for marginalized latent common causes.
/// Role tags (treatment, outcome, instrument candidate) live on the
/// query, not here; the same graph may be queried under different role
/// assignments.
#[derive(Clone, Debug, Default)]
pub struct CausalGraph {
    /// Arena of node names; never shrinks, even in subgraph views
    names: Vec<String>,
    /// Name → id interning map
    index: FxHashMap<String, NodeId>,
    /// Nodes active in this view
    vertices: BTreeSet<NodeId>,
    /// Direct-edge parents per node
    parents: Vec<BTreeSet<NodeId>>,
    /// Direct-edge children per node
    children: Vec<BTreeSet<NodeId>>,
    /// Bidirected neighbors per node
    siblings: Vec<BTreeSet<NodeId>>,
}

impl CausalGraph {
    /// Create an empty causal graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate an edge-list description into a graph.
    pub fn from_description(description: &GraphDescription) -> Result<Self, GraphError> {
        let mut graph = CausalGraph::new();
        for name in &description.nodes {
            graph.add_node(name.clone())?;
        }
        for (from, to) in &description.edges {
            graph.add_edge(from, to)?;
        }
        for (left, right) in &description.bidirected {
            graph.add_bidirected(left, right)?;
        }
        Ok(graph)
    }

    /// Register a node, failing on duplicates.
    pub fn add_node(&mut self, name: impl Into<String>) -> Result<NodeId, GraphError> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(GraphError::DuplicateNode(name));
        }
        let id = NodeId(self.names.len() as u32);
        self.index.insert(name.clone(), id);
        self.names.push(name);
        self.vertices.insert(id);
        self.parents.push(BTreeSet::new());
        self.children.push(BTreeSet::new());
        self.siblings.push(BTreeSet::new());
        Ok(id)
    }

    /// Add a directed causal edge, rejecting cycles in the directed
    /// projection.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<(), GraphError> {
        let from_id = self.resolve(from)?;
        let to_id = self.resolve(to)?;
        // A cycle closes exactly when `to` can already reach `from`.
        if from_id == to_id || self.ancestors_of(from_id).contains(&to_id) {
            return Err(GraphError::CycleDetected {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        self.parents[to_id.index()].insert(from_id);
        self.children[from_id.index()].insert(to_id);
        Ok(())
    }

    /// Add a bidirected (latent-confounding) edge.
    pub fn add_bidirected(&mut self, left: &str, right: &str) -> Result<(), GraphError> {
        let left_id = self.resolve(left)?;
        let right_id = self.resolve(right)?;
        if left_id == right_id {
            return Err(GraphError::SelfConfounding(left.to_string()));
        }
        self.siblings[left_id.index()].insert(right_id);
        self.siblings[right_id.index()].insert(left_id);
        Ok(())
    }

    /// Look up a node id by name, if the node exists and is active.
    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.index
            .get(name)
            .copied()
            .filter(|id| self.vertices.contains(id))
    }

    /// Look up a node id by name or fail.
    pub fn resolve(&self, name: &str) -> Result<NodeId, GraphError> {
        self.node_id(name)
            .ok_or_else(|| GraphError::NodeNotFound(name.to_string()))
    }

    /// Resolve a set of names into node ids.
    pub fn resolve_names<'a>(
        &self,
        names: impl IntoIterator<Item = &'a String>,
    ) -> Result<BTreeSet<NodeId>, GraphError> {
        names.into_iter().map(|n| self.resolve(n)).collect()
    }

    /// Name of a node
    pub fn name(&self, id: NodeId) -> &str {
        &self.names[id.index()]
    }

    /// Names of a set of nodes, lexically ordered
    pub fn names(&self, ids: &BTreeSet<NodeId>) -> BTreeSet<String> {
        ids.iter().map(|&id| self.name(id).to_string()).collect()
    }

    /// Whether a node is active in this view
    pub fn contains_node(&self, name: &str) -> bool {
        self.node_id(name).is_some()
    }

    /// Active nodes of this view
    pub fn vertices(&self) -> &BTreeSet<NodeId> {
        &self.vertices
    }

    /// Number of active nodes
    pub fn node_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of directed edges among active nodes
    pub fn edge_count(&self) -> usize {
        self.vertices
            .iter()
            .map(|&v| self.children[v.index()].len())
            .sum()
    }

    /// Number of bidirected edges among active nodes
    pub fn bidirected_count(&self) -> usize {
        let ends: usize = self
            .vertices
            .iter()
            .map(|&v| self.siblings[v.index()].len())
            .sum();
        ends / 2
    }

    /// Direct-edge parents of a node
    pub fn parents(&self, id: NodeId) -> &BTreeSet<NodeId> {
        &self.parents[id.index()]
    }

    /// Direct-edge children of a node
    pub fn children(&self, id: NodeId) -> &BTreeSet<NodeId> {
        &self.children[id.index()]
    }

    /// Bidirected neighbors of a node
    pub fn siblings(&self, id: NodeId) -> &BTreeSet<NodeId> {
        &self.siblings[id.index()]
    }

    /// Reflexive ancestor closure of a node set over directed edges.
    pub fn ancestors(&self, seeds: &BTreeSet<NodeId>) -> BTreeSet<NodeId> {
        let mut closed: BTreeSet<NodeId> =
            seeds.iter().copied().filter(|id| self.vertices.contains(id)).collect();
        let mut queue: VecDeque<NodeId> = closed.iter().copied().collect();
        while let Some(node) = queue.pop_front() {
            for &parent in &self.parents[node.index()] {
                if closed.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }
        closed
    }

    /// Reflexive descendant closure of a node set over directed edges.
    pub fn descendants(&self, seeds: &BTreeSet<NodeId>) -> BTreeSet<NodeId> {
        let mut closed: BTreeSet<NodeId> =
            seeds.iter().copied().filter(|id| self.vertices.contains(id)).collect();
        let mut queue: VecDeque<NodeId> = closed.iter().copied().collect();
        while let Some(node) = queue.pop_front() {
            for &child in &self.children[node.index()] {
                if closed.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        closed
    }

    /// Ancestors of a single node, excluding the node itself
    pub fn ancestors_of(&self, node: NodeId) -> BTreeSet<NodeId> {
        let seed: BTreeSet<NodeId> = [node].into_iter().collect();
        let mut closed = self.ancestors(&seed);
        closed.remove(&node);
        closed
    }

    /// Descendants of a single node, excluding the node itself
    pub fn descendants_of(&self, node: NodeId) -> BTreeSet<NodeId> {
        let seed: BTreeSet<NodeId> = [node].into_iter().collect();
        let mut closed = self.descendants(&seed);
        closed.remove(&node);
        closed
    }

    /// Induced subgraph over `keep`, preserving node ids.
    pub fn induced_subgraph(&self, keep: &BTreeSet<NodeId>) -> CausalGraph {
        let vertices: BTreeSet<NodeId> = self.vertices.intersection(keep).copied().collect();
        let restrict = |adjacency: &[BTreeSet<NodeId>]| -> Vec<BTreeSet<NodeId>> {
            adjacency
                .iter()
                .enumerate()
                .map(|(i, set)| {
                    if vertices.contains(&NodeId(i as u32)) {
                        set.intersection(&vertices).copied().collect()
                    } else {
                        BTreeSet::new()
                    }
                })
                .collect()
        };
        CausalGraph {
            names: self.names.clone(),
            index: self.index.clone(),
            parents: restrict(&self.parents),
            children: restrict(&self.children),
            siblings: restrict(&self.siblings),
            vertices,
        }
    }

    /// Copy with all edges into `targets` removed, the G_X̄ mutilation.
    ///
    /// Bidirected edges carry an arrowhead into the node, so they are
    /// severed as well.
    pub fn remove_incoming(&self, targets: &BTreeSet<NodeId>) -> CausalGraph {
        let mut cut = self.clone();
        for &target in targets {
            let parents = std::mem::take(&mut cut.parents[target.index()]);
            for parent in parents {
                cut.children[parent.index()].remove(&target);
            }
            let siblings = std::mem::take(&mut cut.siblings[target.index()]);
            for sibling in siblings {
                cut.siblings[sibling.index()].remove(&target);
            }
        }
        cut
    }

    /// Copy with all directed edges out of `sources` removed, the G_X̲
    /// mutilation used by the backdoor criterion. Bidirected edges stay.
    pub fn remove_outgoing(&self, sources: &BTreeSet<NodeId>) -> CausalGraph {
        let mut cut = self.clone();
        for &source in sources {
            let children = std::mem::take(&mut cut.children[source.index()]);
            for child in children {
                cut.parents[child.index()].remove(&source);
            }
        }
        cut
    }

    /// Copy with the directed edges from any node in `from` to any node in
    /// `to` removed. Used to build mediator-respecting sub-queries.
    pub fn without_edges(&self, from: &BTreeSet<NodeId>, to: &BTreeSet<NodeId>) -> CausalGraph {
        let mut cut = self.clone();
        for &source in from {
            for &target in to {
                if cut.children[source.index()].remove(&target) {
                    cut.parents[target.index()].remove(&source);
                }
            }
        }
        cut
    }

    /// Moralize this graph into an undirected adjacency.
    ///
    /// A bidirected edge behaves like a marginalized latent parent shared
    /// by both endpoints, so the effective parent set of a node is
    /// `parents ∪ siblings`; each node is joined to its effective parents
    /// and effective parents are pairwise married.
    pub fn moralize(&self) -> MoralGraph {
        let mut adjacency: Vec<BTreeSet<NodeId>> = vec![BTreeSet::new(); self.names.len()];
        for &node in &self.vertices {
            let effective: Vec<NodeId> = self.parents[node.index()]
                .union(&self.siblings[node.index()])
                .copied()
                .collect();
            for &parent in &effective {
                adjacency[node.index()].insert(parent);
                adjacency[parent.index()].insert(node);
            }
            for (i, &a) in effective.iter().enumerate() {
                for &b in &effective[i + 1..] {
                    adjacency[a.index()].insert(b);
                    adjacency[b.index()].insert(a);
                }
            }
        }
        MoralGraph { adjacency }
    }

    /// d-separation test: every path between `x` and `y` is blocked given
    /// the conditioning set `z`.
    ///
    /// Computed by moralizing the ancestral subgraph of x ∪ y ∪ z and
    /// testing undirected connectivity with `z` removed.
    pub fn d_separated(
        &self,
        x: &BTreeSet<NodeId>,
        y: &BTreeSet<NodeId>,
        z: &BTreeSet<NodeId>,
    ) -> bool {
        if x.intersection(y).any(|id| !z.contains(id)) {
            return false;
        }
        let mut relevant: BTreeSet<NodeId> = x.union(y).copied().collect();
        relevant.extend(z.iter().copied());
        let ancestral = self.induced_subgraph(&self.ancestors(&relevant));
        let moral = ancestral.moralize();
        !moral.connected(x, y, z)
    }

    /// Partition the active nodes into C-components: maximal sets
    /// connected through bidirected edges. Nodes without bidirected
    /// edges form singleton components. Components come out ordered by
    /// their smallest member id.
    pub fn c_components(&self) -> Vec<BTreeSet<NodeId>> {
        let mut components = Vec::new();
        let mut assigned: BTreeSet<NodeId> = BTreeSet::new();
        for &start in &self.vertices {
            if assigned.contains(&start) {
                continue;
            }
            let mut component = BTreeSet::new();
            let mut queue = VecDeque::new();
            component.insert(start);
            queue.push_back(start);
            while let Some(node) = queue.pop_front() {
                for &sibling in &self.siblings[node.index()] {
                    if component.insert(sibling) {
                        queue.push_back(sibling);
                    }
                }
            }
            assigned.extend(component.iter().copied());
            components.push(component);
        }
        components
    }

    /// C-component containing a given node.
    pub fn c_component_of(&self, node: NodeId) -> BTreeSet<NodeId> {
        self.c_components()
            .into_iter()
            .find(|component| component.contains(&node))
            .unwrap_or_default()
    }

    /// Deterministic topological order of the active nodes over directed
    /// edges (Kahn's algorithm, smallest ready id first).
    pub fn topological_order(&self) -> Vec<NodeId> {
        let mut indegree: FxHashMap<NodeId, usize> = self
            .vertices
            .iter()
            .map(|&v| (v, self.parents[v.index()].len()))
            .collect();
        let mut ready: BTreeSet<NodeId> = self
            .vertices
            .iter()
            .copied()
            .filter(|v| indegree[v] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.vertices.len());
        while let Some(&next) = ready.iter().next() {
            ready.remove(&next);
            order.push(next);
            for &child in &self.children[next.index()] {
                let remaining = indegree
                    .get_mut(&child)
                    .expect("child of an active node is active");
                *remaining -= 1;
                if *remaining == 0 {
                    ready.insert(child);
                }
            }
        }
        debug_assert_eq!(order.len(), self.vertices.len());
        order
    }
}

/// Undirected adjacency produced by [`CausalGraph::moralize`].
#[derive(Clone, Debug)]
pub struct MoralGraph {
    adjacency: Vec<BTreeSet<NodeId>>,
}

impl MoralGraph {
    /// Undirected neighbors of a node
    pub fn neighbors(&self, id: NodeId) -> &BTreeSet<NodeId> {
        &self.adjacency[id.index()]
    }

    /// Whether any node in `from` reaches any node in `to` without
    /// passing through `removed`.
    pub fn connected(
        &self,
        from: &BTreeSet<NodeId>,
        to: &BTreeSet<NodeId>,
        removed: &BTreeSet<NodeId>,
    ) -> bool {
        let mut visited: BTreeSet<NodeId> = BTreeSet::new();
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        for &start in from {
            if !removed.contains(&start) && visited.insert(start) {
                queue.push_back(start);
            }
        }
        while let Some(node) = queue.pop_front() {
            if to.contains(&node) {
                return true;
            }
            for &next in &self.adjacency[node.index()] {
                if !removed.contains(&next) && visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        false
    }
}
