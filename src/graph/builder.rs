//! Graph builder for wiring phase nodes into an executable flow.
//!
//! Nodes and edges are registered on a [`GraphBuilder`]; [`GraphBuilder::compile`]
//! validates the structure once and produces a [`CompiledGraph`] with a fixed
//! execution order from [`START`] to [`END`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use conduit_common::INITIAL_PHASE;

use super::node::PhaseNode;
use crate::errors::{GraphError, ValidationReason};

/// Synthetic entry marker.
pub const START: &str = "__start__";
/// Synthetic exit marker.
pub const END: &str = "__end__";

fn is_marker(name: &str) -> bool {
    name == START || name == END
}

/// How the runner picks a successor when a node has several outgoing edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EdgeSelection {
    /// Every node and the start marker have exactly one outgoing edge.
    #[default]
    Strict,
    /// Multiple outgoing edges are allowed; the first registered one is taken.
    FirstRegistered,
}

/// Builder for constructing phase graphs.
pub struct GraphBuilder {
    name: String,
    nodes: Vec<Arc<dyn PhaseNode>>,
    index: HashMap<String, usize>,
    edges: Vec<(String, String)>,
    selection: EdgeSelection,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
            selection: EdgeSelection::default(),
        }
    }

    pub fn with_edge_selection(mut self, selection: EdgeSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn add_node<N: PhaseNode + 'static>(&mut self, node: N) -> Result<(), GraphError> {
        self.add_shared(Arc::new(node))
    }

    /// Register a node that is already behind an `Arc`.
    pub fn add_shared(&mut self, node: Arc<dyn PhaseNode>) -> Result<(), GraphError> {
        let name = node.name().to_string();
        if is_marker(&name) {
            return Err(GraphError::ReservedName(name));
        }
        if self.index.contains_key(&name) {
            return Err(GraphError::DuplicateNode(name));
        }
        self.index.insert(name, self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    /// Register a directed edge. Both endpoints must be registered nodes or markers.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<(), GraphError> {
        for endpoint in [from, to] {
            if !is_marker(endpoint) && !self.index.contains_key(endpoint) {
                return Err(GraphError::UnknownNode {
                    from: from.to_string(),
                    to: to.to_string(),
                    missing: endpoint.to_string(),
                });
            }
        }
        self.edges.push((from.to_string(), to.to_string()));
        Ok(())
    }

    /// Validate the graph and freeze it.
    pub fn compile(self) -> Result<CompiledGraph, GraphError> {
        let fail = |reason: ValidationReason| GraphError::Validation {
            graph: self.name.clone(),
            reason,
        };

        if self.nodes.is_empty() {
            return Err(fail(ValidationReason::Empty));
        }

        let mut seen_edges = HashSet::new();
        for (from, to) in &self.edges {
            if to == START || from == END {
                return Err(fail(ValidationReason::MarkerMisuse {
                    from: from.clone(),
                    to: to.clone(),
                }));
            }
            if !seen_edges.insert((from.as_str(), to.as_str())) {
                return Err(fail(ValidationReason::DuplicateEdge {
                    from: from.clone(),
                    to: to.clone(),
                }));
            }
        }

        let mut phase_owner: HashMap<&str, &str> = HashMap::new();
        for node in &self.nodes {
            if node.phase() == INITIAL_PHASE {
                return Err(fail(ValidationReason::InitialPhaseOutput(
                    node.name().to_string(),
                )));
            }
            if let Some(first) = phase_owner.insert(node.phase(), node.name()) {
                return Err(fail(ValidationReason::DuplicatePhase {
                    phase: node.phase().to_string(),
                    first: first.to_string(),
                    second: node.name().to_string(),
                }));
            }
        }

        // Outgoing edges in registration order
        let mut outgoing: HashMap<&str, Vec<&str>> = HashMap::new();
        for (from, to) in &self.edges {
            outgoing.entry(from.as_str()).or_default().push(to.as_str());
        }

        if !outgoing.contains_key(START) {
            return Err(fail(ValidationReason::MissingEntry));
        }

        self.check_cycles(&outgoing).map_err(fail)?;

        if self.selection == EdgeSelection::Strict {
            for (from, targets) in &outgoing {
                if targets.len() > 1 {
                    return Err(fail(ValidationReason::Branching {
                        node: from.to_string(),
                        count: targets.len(),
                    }));
                }
            }
        }

        let reachable = self.reachable_from_start(&outgoing);
        if let Some(node) = self.nodes.iter().find(|n| !reachable.contains(n.name())) {
            return Err(fail(ValidationReason::Unreachable(node.name().to_string())));
        }

        let reaches_end = self.reaching_end();
        if let Some(node) = self.nodes.iter().find(|n| !reaches_end.contains(n.name())) {
            return Err(fail(ValidationReason::DeadEnd(node.name().to_string())));
        }

        // Follow the selected edge from START; every node must lie on that path.
        let mut order: Vec<String> = Vec::with_capacity(self.nodes.len());
        let mut current = START;
        loop {
            let next = outgoing
                .get(current)
                .and_then(|targets| targets.first())
                .copied()
                .ok_or_else(|| fail(ValidationReason::DeadEnd(current.to_string())))?;
            if next == END {
                break;
            }
            order.push(next.to_string());
            current = next;
        }

        if let Some(node) = self
            .nodes
            .iter()
            .find(|n| !order.iter().any(|o| o == n.name()))
        {
            return Err(fail(ValidationReason::Unreachable(node.name().to_string())));
        }

        let phase_index = self
            .nodes
            .iter()
            .map(|n| (n.phase().to_string(), n.name().to_string()))
            .collect();
        let nodes = self
            .nodes
            .into_iter()
            .map(|n| (n.name().to_string(), n))
            .collect();

        Ok(CompiledGraph {
            name: self.name,
            selection: self.selection,
            nodes,
            order,
            phase_index,
        })
    }

    /// Kahn's algorithm over the registered nodes. Marker edges cannot close a
    /// cycle since nothing enters START and nothing leaves END.
    fn check_cycles(&self, outgoing: &HashMap<&str, Vec<&str>>) -> Result<(), ValidationReason> {
        let mut in_degree: HashMap<&str, usize> =
            self.nodes.iter().map(|n| (n.name(), 0)).collect();
        for (from, to) in &self.edges {
            if !is_marker(from)
                && let Some(deg) = in_degree.get_mut(to.as_str())
            {
                *deg += 1;
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut processed = 0;

        while let Some(name) = queue.pop_front() {
            processed += 1;
            for &next in outgoing.get(name).map_or(&[][..], |v| v.as_slice()) {
                if let Some(deg) = in_degree.get_mut(next) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(next);
                    }
                }
            }
        }

        if processed != self.nodes.len() {
            let involved = self
                .nodes
                .iter()
                .filter(|n| in_degree.get(n.name()).is_some_and(|d| *d > 0))
                .map(|n| n.name().to_string())
                .collect();
            return Err(ValidationReason::Cycle(involved));
        }
        Ok(())
    }

    fn reachable_from_start<'a>(
        &self,
        outgoing: &HashMap<&'a str, Vec<&'a str>>,
    ) -> HashSet<&'a str> {
        let mut seen = HashSet::new();
        let mut stack = vec![START];
        while let Some(name) = stack.pop() {
            for &next in outgoing.get(name).map_or(&[][..], |v| v.as_slice()) {
                if seen.insert(next) {
                    stack.push(next);
                }
            }
        }
        seen
    }

    fn reaching_end(&self) -> HashSet<&str> {
        let mut incoming: HashMap<&str, Vec<&str>> = HashMap::new();
        for (from, to) in &self.edges {
            incoming.entry(to.as_str()).or_default().push(from.as_str());
        }
        let mut seen = HashSet::new();
        let mut stack = vec![END];
        while let Some(name) = stack.pop() {
            for &prev in incoming.get(name).map_or(&[][..], |v| v.as_slice()) {
                if seen.insert(prev) {
                    stack.push(prev);
                }
            }
        }
        seen
    }
}

/// A validated graph with a fixed execution order.
pub struct CompiledGraph {
    name: String,
    selection: EdgeSelection,
    nodes: HashMap<String, Arc<dyn PhaseNode>>,
    order: Vec<String>,
    phase_index: HashMap<String, String>,
}

impl CompiledGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn edge_selection(&self) -> EdgeSelection {
        self.selection
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Always false; `compile` rejects empty graphs.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Node names in the order the runner visits them.
    pub fn execution_order(&self) -> &[String] {
        &self.order
    }

    /// Node that runs after `from` (a node name or [`START`]); [`END`] after the
    /// last node. `None` if `from` is not part of the graph.
    pub fn successor(&self, from: &str) -> Option<&str> {
        if from == START {
            return self.order.first().map(String::as_str);
        }
        let pos = self.order.iter().position(|n| n == from)?;
        Some(self.order.get(pos + 1).map_or(END, String::as_str))
    }

    /// Name of the node whose output phase is `phase`.
    pub fn node_for_phase(&self, phase: &str) -> Option<&str> {
        self.phase_index.get(phase).map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn PhaseNode>> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }
}

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("name", &self.name)
            .field("selection", &self.selection)
            .field("order", &self.order)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::FnNode;

    fn node(name: &str) -> FnNode {
        FnNode::transition(name, format!("{name}_done"), name)
    }

    fn reason(err: GraphError) -> ValidationReason {
        match err {
            GraphError::Validation { reason, .. } => reason,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    fn chain(names: &[&str]) -> GraphBuilder {
        let mut builder = GraphBuilder::new("test");
        for name in names {
            builder.add_node(node(name)).unwrap();
        }
        let mut prev = START;
        for &name in names {
            builder.add_edge(prev, name).unwrap();
            prev = name;
        }
        builder.add_edge(prev, END).unwrap();
        builder
    }

    #[test]
    fn test_compile_simple_chain() {
        let graph = chain(&["a", "b", "c"]).compile().unwrap();

        assert_eq!(graph.name(), "test");
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.execution_order(), ["a", "b", "c"]);
        assert_eq!(graph.successor(START), Some("a"));
        assert_eq!(graph.successor("b"), Some("c"));
        assert_eq!(graph.successor("c"), Some(END));
        assert_eq!(graph.successor("zzz"), None);
        assert_eq!(graph.node_for_phase("b_done"), Some("b"));
        assert!(graph.contains("a"));
        assert!(graph.get("a").is_some());
    }

    #[test]
    fn test_empty_graph_rejected() {
        let err = GraphBuilder::new("empty").compile().unwrap_err();
        assert_eq!(reason(err), ValidationReason::Empty);
    }

    #[test]
    fn test_duplicate_node() {
        let mut builder = GraphBuilder::new("g");
        builder.add_node(node("a")).unwrap();
        let err = builder.add_node(node("a")).unwrap_err();
        assert_eq!(err, GraphError::DuplicateNode("a".into()));
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn test_reserved_name() {
        let mut builder = GraphBuilder::new("g");
        let err = builder.add_node(node(START)).unwrap_err();
        assert!(matches!(err, GraphError::ReservedName(_)));
    }

    #[test]
    fn test_unknown_node_in_edge() {
        let mut builder = GraphBuilder::new("g");
        builder.add_node(node("a")).unwrap();
        let err = builder.add_edge("a", "nonexistent").unwrap_err();
        assert!(err.to_string().contains("nonexistent"));
    }

    #[test]
    fn test_missing_entry() {
        let mut builder = GraphBuilder::new("g");
        builder.add_node(node("a")).unwrap();
        builder.add_edge("a", END).unwrap();
        assert_eq!(
            reason(builder.compile().unwrap_err()),
            ValidationReason::MissingEntry
        );
    }

    #[test]
    fn test_cycle_detection() {
        let mut builder = chain(&["a", "b", "c"]);
        builder.add_edge("c", "a").unwrap();
        let builder = builder.with_edge_selection(EdgeSelection::FirstRegistered);
        match reason(builder.compile().unwrap_err()) {
            ValidationReason::Cycle(nodes) => assert_eq!(nodes, ["a", "b", "c"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_strict_rejects_branching() {
        let mut builder = chain(&["a", "b"]);
        builder.add_edge("a", END).unwrap();
        assert_eq!(
            reason(builder.compile().unwrap_err()),
            ValidationReason::Branching {
                node: "a".into(),
                count: 2
            }
        );
    }

    #[test]
    fn test_first_registered_follows_first_edge() {
        let mut builder = chain(&["a", "b"]);
        builder.add_edge("a", END).unwrap();
        let graph = builder
            .with_edge_selection(EdgeSelection::FirstRegistered)
            .compile()
            .unwrap();
        assert_eq!(graph.execution_order(), ["a", "b"]);
        assert_eq!(graph.edge_selection(), EdgeSelection::FirstRegistered);
    }

    #[test]
    fn test_first_registered_rejects_node_off_selected_path() {
        let mut builder = chain(&["a", "b"]);
        builder.add_node(node("side")).unwrap();
        builder.add_edge("a", "side").unwrap();
        builder.add_edge("side", END).unwrap();
        let err = builder
            .with_edge_selection(EdgeSelection::FirstRegistered)
            .compile()
            .unwrap_err();
        assert_eq!(reason(err), ValidationReason::Unreachable("side".into()));
    }

    #[test]
    fn test_unreachable_node() {
        let mut builder = chain(&["a"]);
        builder.add_node(node("orphan")).unwrap();
        builder.add_edge("orphan", END).unwrap();
        assert_eq!(
            reason(builder.compile().unwrap_err()),
            ValidationReason::Unreachable("orphan".into())
        );
    }

    #[test]
    fn test_dead_end_node() {
        let mut builder = GraphBuilder::new("g");
        builder.add_node(node("a")).unwrap();
        builder.add_edge(START, "a").unwrap();
        assert_eq!(
            reason(builder.compile().unwrap_err()),
            ValidationReason::DeadEnd("a".into())
        );
    }

    #[test]
    fn test_edge_into_start_rejected() {
        let mut builder = chain(&["a"]);
        builder.add_edge("a", START).unwrap();
        assert!(matches!(
            reason(builder.compile().unwrap_err()),
            ValidationReason::MarkerMisuse { .. }
        ));
    }

    #[test]
    fn test_duplicate_edge_rejected() {
        let mut builder = chain(&["a"]);
        builder.add_edge(START, "a").unwrap();
        assert!(matches!(
            reason(builder.compile().unwrap_err()),
            ValidationReason::DuplicateEdge { .. }
        ));
    }

    #[test]
    fn test_duplicate_output_phase_rejected() {
        let mut builder = GraphBuilder::new("g");
        builder
            .add_node(FnNode::transition("a", "same", "a"))
            .unwrap();
        builder
            .add_node(FnNode::transition("b", "same", "b"))
            .unwrap();
        builder.add_edge(START, "a").unwrap();
        builder.add_edge("a", "b").unwrap();
        builder.add_edge("b", END).unwrap();
        assert!(matches!(
            reason(builder.compile().unwrap_err()),
            ValidationReason::DuplicatePhase { .. }
        ));
    }

    #[test]
    fn test_initial_phase_output_rejected() {
        let mut builder = GraphBuilder::new("g");
        builder
            .add_node(FnNode::transition("a", INITIAL_PHASE, "a"))
            .unwrap();
        builder.add_edge(START, "a").unwrap();
        builder.add_edge("a", END).unwrap();
        assert_eq!(
            reason(builder.compile().unwrap_err()),
            ValidationReason::InitialPhaseOutput("a".into())
        );
    }
}
