//! Dependency graph for fixture records
//!
//! Every reference a record makes to another record becomes an edge. The
//! processing order is computed with a three-color depth-first traversal:
//! meeting a node that is still in progress means the references form a
//! cycle. Uses petgraph for graph storage.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use super::id::FixtureId;
use super::registry::IdentifierRegistry;

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("{from} references {missing}, which is not declared in any selected fixture file")]
    UnresolvedReference { from: FixtureId, missing: FixtureId },

    #[error("Reference cycle detected: {}", format_cycle(.0))]
    CycleDetected(Vec<FixtureId>),

    #[error("Fixture not found: {0}")]
    NotFound(FixtureId),
}

fn format_cycle(ids: &[FixtureId]) -> String {
    let mut parts: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    if let Some(first) = ids.first() {
        parts.push(first.to_string());
    }
    parts.join(" -> ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

struct Frame {
    node: NodeIndex,
    deps: Vec<NodeIndex>,
    next: usize,
}

/// A dependency graph over fixture identifiers
///
/// Nodes are added in discovery order; node indices double as the stable
/// tie-break between records that do not depend on each other.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Edge direction: dependency -> dependent
    graph: DiGraph<FixtureId, ()>,

    node_map: HashMap<FixtureId, NodeIndex>,

    /// Records whose self reference is handled by create-then-patch
    self_referencing: HashSet<FixtureId>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
            self_referencing: HashSet::new(),
        }
    }

    /// Builds the graph for every record in the registry
    ///
    /// `allow_self_reference` decides per entity kind whether a record may
    /// reference itself. Rejected self references are reported as a cycle of
    /// one.
    pub fn from_registry(
        registry: &IdentifierRegistry,
        allow_self_reference: impl Fn(&str) -> bool,
    ) -> Result<Self, GraphError> {
        let mut graph = Self::new();

        // First pass: add all nodes
        for record in registry.records() {
            graph.add_record(record.id.clone());
        }

        // Second pass: add all edges
        for record in registry.records() {
            for target in record.references() {
                if *target == record.id {
                    if allow_self_reference(record.id.kind()) {
                        graph.self_referencing.insert(record.id.clone());
                        continue;
                    }
                    return Err(GraphError::CycleDetected(vec![record.id.clone()]));
                }

                if !registry.contains(target) {
                    return Err(GraphError::UnresolvedReference {
                        from: record.id.clone(),
                        missing: target.clone(),
                    });
                }

                graph.add_dependency(&record.id, target)?;
            }
        }

        Ok(graph)
    }

    /// Adds a record node to the graph
    pub fn add_record(&mut self, id: FixtureId) {
        if !self.node_map.contains_key(&id) {
            let idx = self.graph.add_node(id.clone());
            self.node_map.insert(id, idx);
        }
    }

    /// Adds a dependency edge: `record` references `depends_on`
    ///
    /// Cycles are not rejected here; [`processing_order`](Self::processing_order)
    /// reports them.
    pub fn add_dependency(
        &mut self,
        record: &FixtureId,
        depends_on: &FixtureId,
    ) -> Result<(), GraphError> {
        let record_idx = *self
            .node_map
            .get(record)
            .ok_or_else(|| GraphError::NotFound(record.clone()))?;

        let dep_idx = *self
            .node_map
            .get(depends_on)
            .ok_or_else(|| GraphError::NotFound(depends_on.clone()))?;

        self.graph.update_edge(dep_idx, record_idx, ());
        Ok(())
    }

    /// Direct dependencies of a record, in discovery order
    pub fn dependencies(&self, id: &FixtureId) -> Vec<FixtureId> {
        match self.node_map.get(id) {
            Some(idx) => self
                .sorted_neighbors(*idx, Direction::Incoming)
                .into_iter()
                .map(|n| self.graph[n].clone())
                .collect(),
            None => vec![],
        }
    }

    fn sorted_neighbors(&self, idx: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
        let mut neighbors: Vec<NodeIndex> = self.graph.neighbors_directed(idx, direction).collect();
        neighbors.sort_by_key(|n| n.index());
        neighbors.dedup();
        neighbors
    }

    /// Returns true if the record's self reference was accepted
    pub fn accepts_self_reference(&self, id: &FixtureId) -> bool {
        self.self_referencing.contains(id)
    }

    /// Computes the order in which records must be created
    ///
    /// Dependencies always precede their dependents. Records are grouped by
    /// depth (records with no dependencies first), and within a depth kept in
    /// discovery order, so the result is reproducible across runs.
    pub fn processing_order(&self) -> Result<Vec<FixtureId>, GraphError> {
        let count = self.graph.node_count();
        let mut marks = vec![Mark::Unvisited; count];
        let mut depth = vec![0usize; count];

        for start in self.graph.node_indices() {
            if marks[start.index()] != Mark::Unvisited {
                continue;
            }

            marks[start.index()] = Mark::InProgress;
            let mut stack = vec![Frame {
                node: start,
                deps: self.sorted_neighbors(start, Direction::Incoming),
                next: 0,
            }];

            while let Some(frame) = stack.last_mut() {
                if let Some(&dep) = frame.deps.get(frame.next) {
                    frame.next += 1;

                    match marks[dep.index()] {
                        Mark::Unvisited => {
                            marks[dep.index()] = Mark::InProgress;
                            stack.push(Frame {
                                node: dep,
                                deps: self.sorted_neighbors(dep, Direction::Incoming),
                                next: 0,
                            });
                        }
                        Mark::InProgress => {
                            let pos = stack.iter().position(|f| f.node == dep).unwrap_or(0);
                            let cycle = stack[pos..]
                                .iter()
                                .map(|f| self.graph[f.node].clone())
                                .collect();
                            return Err(GraphError::CycleDetected(cycle));
                        }
                        Mark::Done => {}
                    }
                } else {
                    let node = frame.node;
                    let node_depth = frame
                        .deps
                        .iter()
                        .map(|d| depth[d.index()] + 1)
                        .max()
                        .unwrap_or(0);
                    depth[node.index()] = node_depth;
                    marks[node.index()] = Mark::Done;
                    stack.pop();
                }
            }
        }

        let mut order: Vec<NodeIndex> = self.graph.node_indices().collect();
        order.sort_by_key(|n| (depth[n.index()], n.index()));

        Ok(order.into_iter().map(|n| self.graph[n].clone()).collect())
    }

    pub fn contains(&self, id: &FixtureId) -> bool {
        self.node_map.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}
