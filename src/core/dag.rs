//! Phase DAG used by the scheduler.
//!
//! Wraps petgraph's `DiGraph` with one node per workflow phase and an edge
//! from each dependency to its dependent. Answers the scheduling questions:
//! which phases are ready, what order they run in, and which phases sit
//! downstream of a given phase.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use petgraph::Direction;

use crate::core::execution::{ExecutionState, PhaseStatus};
use crate::workflow::{WorkflowId, WorkflowPhase};
use crate::workflow::validate::ValidationIssue;
use crate::{Error, Result};

pub struct PhaseGraph {
    graph: DiGraph<WorkflowPhase, ()>,
    index: HashMap<String, NodeIndex>,
}

impl PhaseGraph {
    /// Build the graph for a workflow's phases.
    ///
    /// Dependencies on unknown phases are ignored; a cycle is rejected with
    /// `Error::Validation`.
    pub fn new(workflow: &WorkflowId, phases: &[WorkflowPhase]) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for phase in phases {
            if index.contains_key(phase.id()) {
                continue;
            }
            let node = graph.add_node(phase.clone());
            index.insert(phase.id().to_string(), node);
        }
        for phase in phases {
            let to = index[phase.id()];
            for dep in &phase.depends_on {
                if let Some(&from) = index.get(dep) {
                    graph.update_edge(from, to, ());
                }
            }
        }

        toposort(&graph, None).map_err(|cycle| {
            let id = graph[cycle.node_id()].id().to_string();
            Error::Validation {
                workflow: workflow.clone(),
                issues: vec![ValidationIssue::error(
                    format!("cycle detected at phase \"{}\"", id),
                    vec![id],
                )],
            }
        })?;

        Ok(Self { graph, index })
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&WorkflowPhase> {
        self.index.get(id).map(|&node| &self.graph[node])
    }

    fn order_key(&self, node: NodeIndex) -> (u32, &str) {
        let phase = &self.graph[node];
        (phase.sequence, phase.id())
    }

    /// Phases in dependency order, ties broken by (sequence, id).
    pub fn topological_order(&self) -> Vec<&WorkflowPhase> {
        let mut indegree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|n| (n, self.graph.neighbors_directed(n, Direction::Incoming).count()))
            .collect();
        let mut heap: BinaryHeap<Reverse<((u32, &str), NodeIndex)>> = indegree
            .iter()
            .filter(|&(_, &d)| d == 0)
            .map(|(&n, _)| Reverse((self.order_key(n), n)))
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some(Reverse((_, node))) = heap.pop() {
            order.push(&self.graph[node]);
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if let Some(d) = indegree.get_mut(&next) {
                    *d -= 1;
                    if *d == 0 {
                        heap.push(Reverse((self.order_key(next), next)));
                    }
                }
            }
        }
        order
    }

    /// The phase a fresh run starts with.
    pub fn first_phase(&self) -> Option<&WorkflowPhase> {
        self.topological_order().into_iter().next()
    }

    /// Pending phases whose dependencies are all completed or skipped,
    /// sorted by (sequence, id).
    pub fn ready_phases(&self, exec: &ExecutionState) -> Vec<&WorkflowPhase> {
        let mut ready: Vec<&WorkflowPhase> = self
            .graph
            .node_indices()
            .filter(|&node| {
                exec.phase_status(self.graph[node].id()) == PhaseStatus::Pending
                    && self
                        .graph
                        .neighbors_directed(node, Direction::Incoming)
                        .all(|dep| exec.is_phase_done(self.graph[dep].id()))
            })
            .map(|node| &self.graph[node])
            .collect();
        ready.sort_by(|a, b| (a.sequence, a.id()).cmp(&(b.sequence, b.id())));
        ready
    }

    /// The given phase and every phase reachable from it.
    pub fn downstream(&self, id: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        if let Some(&start) = self.index.get(id) {
            let mut bfs = Bfs::new(&self.graph, start);
            while let Some(node) = bfs.next(&self.graph) {
                found.insert(self.graph[node].id().to_string());
            }
        }
        found
    }

    /// Whether every phase is completed or skipped.
    pub fn all_done(&self, exec: &ExecutionState) -> bool {
        self.graph
            .node_weights()
            .all(|phase| exec.is_phase_done(phase.id()))
    }
}

impl std::fmt::Debug for PhaseGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseGraph")
            .field("phases", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .finish()
    }
}
