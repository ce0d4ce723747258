//! Static field dependency graph.
//!
//! An edge `state -> [region]` means "region's options and value depend on
//! state". Graphs are declared once per entity type and validated at
//! construction: a cyclic declaration is rejected there and never reaches
//! runtime.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::path::FieldPath;

/// One upstream field and the fields that depend on it directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    #[serde(rename = "field")]
    pub upstream: FieldPath,
    pub dependents: Vec<FieldPath>,
}

impl DependencyEdge {
    pub fn new(upstream: FieldPath, dependents: Vec<FieldPath>) -> Self {
        DependencyEdge {
            upstream,
            dependents,
        }
    }
}

/// A validated, acyclic dependency graph.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Fields in first-declared order.
    nodes: Vec<FieldPath>,
    downstream: BTreeMap<FieldPath, Vec<FieldPath>>,
    upstream: BTreeMap<FieldPath, Vec<FieldPath>>,
    /// Position of each field in a topological order of the graph.
    rank: BTreeMap<FieldPath, usize>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Active,
    Done,
}

impl DependencyGraph {
    /// A graph with no edges.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build and validate a graph. Repeated edges are merged; sibling order
    /// follows declaration order.
    pub fn new(edges: impl IntoIterator<Item = DependencyEdge>) -> Result<Self, GraphError> {
        let mut graph = DependencyGraph::default();
        let mut seen = BTreeSet::new();

        for edge in edges {
            if seen.insert(edge.upstream.clone()) {
                graph.nodes.push(edge.upstream.clone());
            }
            for dependent in edge.dependents {
                if dependent == edge.upstream {
                    return Err(GraphError::SelfDependency {
                        field: dependent.to_string(),
                    });
                }
                if seen.insert(dependent.clone()) {
                    graph.nodes.push(dependent.clone());
                }
                let children = graph.downstream.entry(edge.upstream.clone()).or_default();
                if !children.contains(&dependent) {
                    children.push(dependent.clone());
                    graph
                        .upstream
                        .entry(dependent)
                        .or_default()
                        .push(edge.upstream.clone());
                }
            }
        }

        graph.rank = graph.topological_ranks()?;
        Ok(graph)
    }

    /// Kahn's algorithm, seeded in declaration order so the result is
    /// deterministic.
    fn topological_ranks(&self) -> Result<BTreeMap<FieldPath, usize>, GraphError> {
        let mut indegree: BTreeMap<&FieldPath, usize> = self
            .nodes
            .iter()
            .map(|n| (n, self.upstreams(n).len()))
            .collect();
        let mut queue: VecDeque<&FieldPath> = self
            .nodes
            .iter()
            .filter(|n| indegree.get(n) == Some(&0))
            .collect();

        let mut rank = BTreeMap::new();
        while let Some(node) = queue.pop_front() {
            rank.insert(node.clone(), rank.len());
            for child in self.dependents(node) {
                if let Some(d) = indegree.get_mut(child) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(child);
                    }
                }
            }
        }

        if rank.len() == self.nodes.len() {
            Ok(rank)
        } else {
            Err(GraphError::Cycle {
                path: self.find_cycle().iter().map(ToString::to_string).collect(),
            })
        }
    }

    fn find_cycle(&self) -> Vec<FieldPath> {
        let mut marks = BTreeMap::new();
        let mut stack = Vec::new();
        for node in &self.nodes {
            if !marks.contains_key(node) {
                if let Some(cycle) = self.visit(node, &mut marks, &mut stack) {
                    return cycle;
                }
            }
        }
        Vec::new()
    }

    fn visit(
        &self,
        node: &FieldPath,
        marks: &mut BTreeMap<FieldPath, Mark>,
        stack: &mut Vec<FieldPath>,
    ) -> Option<Vec<FieldPath>> {
        marks.insert(node.clone(), Mark::Active);
        stack.push(node.clone());
        for next in self.dependents(node) {
            match marks.get(next) {
                Some(Mark::Active) => {
                    let start = stack.iter().position(|n| n == next).unwrap_or(0);
                    let mut cycle = stack[start..].to_vec();
                    cycle.push(next.clone());
                    return Some(cycle);
                }
                Some(Mark::Done) => {}
                None => {
                    if let Some(cycle) = self.visit(next, marks, stack) {
                        return Some(cycle);
                    }
                }
            }
        }
        stack.pop();
        marks.insert(node.clone(), Mark::Done);
        None
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// Every field mentioned by the graph, in declaration order.
    pub fn fields(&self) -> &[FieldPath] {
        &self.nodes
    }

    pub fn contains(&self, field: &FieldPath) -> bool {
        self.rank.contains_key(field)
    }

    /// Direct dependents of `field`.
    pub fn dependents(&self, field: &FieldPath) -> &[FieldPath] {
        self.downstream.get(field).map_or(&[], Vec::as_slice)
    }

    /// Direct upstreams of `field`.
    pub fn upstreams(&self, field: &FieldPath) -> &[FieldPath] {
        self.upstream.get(field).map_or(&[], Vec::as_slice)
    }

    /// True if `field` depends on at least one other field.
    pub fn is_dependent(&self, field: &FieldPath) -> bool {
        !self.upstreams(field).is_empty()
    }

    /// Upstream fields whose value can change when `path` is written:
    /// the upstream itself, anything nested under it, or any ancestor of it.
    pub fn upstreams_touching<'a>(
        &'a self,
        path: &'a FieldPath,
    ) -> impl Iterator<Item = &'a FieldPath> + 'a {
        self.downstream.keys().filter(move |u| u.overlaps(path))
    }

    /// The transitive dependents of `changed`, upstream before downstream.
    pub fn invalidate(&self, changed: &FieldPath) -> Vec<FieldPath> {
        self.invalidate_many(std::slice::from_ref(changed))
    }

    /// The union of the transitive dependents of every field in `changed`,
    /// in one topological order.
    pub fn invalidate_many(&self, changed: &[FieldPath]) -> Vec<FieldPath> {
        let mut reached: BTreeSet<&FieldPath> = BTreeSet::new();
        let mut queue: VecDeque<&FieldPath> = changed.iter().collect();
        while let Some(field) = queue.pop_front() {
            for child in self.dependents(field) {
                if reached.insert(child) {
                    queue.push_back(child);
                }
            }
        }

        let mut ordered: Vec<&FieldPath> = reached.into_iter().collect();
        ordered.sort_by_key(|f| self.rank.get(*f).copied().unwrap_or(usize::MAX));
        ordered.into_iter().cloned().collect()
    }

    /// All fields in topological order.
    pub fn topological_order(&self) -> Vec<&FieldPath> {
        let mut ordered: Vec<&FieldPath> = self.nodes.iter().collect();
        ordered.sort_by_key(|f| self.rank.get(*f).copied().unwrap_or(usize::MAX));
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> FieldPath {
        FieldPath::parse(s).unwrap()
    }

    fn edge(up: &str, deps: &[&str]) -> DependencyEdge {
        DependencyEdge::new(p(up), deps.iter().map(|d| p(d)).collect())
    }

    fn location() -> DependencyGraph {
        DependencyGraph::new(vec![
            edge("state", &["region"]),
            edge("region", &["suburb", "serviceArea"]),
        ])
        .unwrap()
    }

    fn names(fields: &[FieldPath]) -> Vec<String> {
        fields.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn invalidate_returns_transitive_closure_in_order() {
        let graph = location();
        assert_eq!(
            names(&graph.invalidate(&p("state"))),
            vec!["region", "suburb", "serviceArea"]
        );
        assert_eq!(
            names(&graph.invalidate(&p("region"))),
            vec!["suburb", "serviceArea"]
        );
        assert!(graph.invalidate(&p("suburb")).is_empty());
        assert!(graph.invalidate(&p("firstName")).is_empty());
    }

    #[test]
    fn declaration_order_does_not_break_topological_order() {
        // Downstream edge declared first.
        let graph = DependencyGraph::new(vec![
            edge("region", &["serviceArea"]),
            edge("state", &["region"]),
        ])
        .unwrap();
        assert_eq!(
            names(&graph.invalidate(&p("state"))),
            vec!["region", "serviceArea"]
        );
    }

    #[test]
    fn diamond_dependents_appear_once_after_all_their_upstreams() {
        let graph = DependencyGraph::new(vec![
            edge("a", &["b", "c"]),
            edge("b", &["d"]),
            edge("c", &["d"]),
        ])
        .unwrap();
        assert_eq!(names(&graph.invalidate(&p("a"))), vec!["b", "c", "d"]);
        assert_eq!(graph.upstreams(&p("d")), &[p("b"), p("c")]);
    }

    #[test]
    fn cycles_are_rejected() {
        let err = DependencyGraph::new(vec![
            edge("state", &["region"]),
            edge("region", &["suburb"]),
            edge("suburb", &["state"]),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            GraphError::Cycle {
                path: vec![
                    "state".into(),
                    "region".into(),
                    "suburb".into(),
                    "state".into()
                ]
            }
        );
        assert_eq!(
            err.to_string(),
            "dependency cycle: state -> region -> suburb -> state"
        );
    }

    #[test]
    fn self_dependency_is_rejected() {
        let err = DependencyGraph::new(vec![edge("state", &["state"])]).unwrap_err();
        assert!(matches!(err, GraphError::SelfDependency { .. }));
    }

    #[test]
    fn duplicate_edges_are_merged() {
        let graph = DependencyGraph::new(vec![
            edge("state", &["region"]),
            edge("state", &["region", "postcode"]),
        ])
        .unwrap();
        assert_eq!(graph.dependents(&p("state")), &[p("region"), p("postcode")]);
        assert_eq!(graph.upstreams(&p("region")), &[p("state")]);
    }

    #[test]
    fn upstreams_touching_matches_nested_writes() {
        let graph = DependencyGraph::new(vec![edge("address.state", &["address.region"])]).unwrap();
        let touching = |path: &str| -> Vec<String> {
            let path = p(path);
            graph.upstreams_touching(&path).map(ToString::to_string).collect()
        };
        assert_eq!(touching("address"), vec!["address.state"]);
        assert_eq!(touching("address.state"), vec!["address.state"]);
        assert_eq!(touching("address.state.code"), vec!["address.state"]);
        assert!(touching("address.postcode").is_empty());
    }
}
