//! Task dependency graph
//!
//! Edges point from a task to the task it depends on. Adding an edge is only
//! allowed when the graph stays acyclic.

use std::collections::{HashMap, HashSet};

/// Adjacency view over existing dependency edges
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Build from `(task_id, depends_on_id)` pairs
    pub fn from_edges<I, S>(edges: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let mut graph = Self::default();
        for (task, depends_on) in edges {
            graph
                .edges
                .entry(task.into())
                .or_default()
                .push(depends_on.into());
        }
        graph
    }

    /// Whether `target` is reachable from `start` following dependency edges
    ///
    /// Iterative depth-first search with a visited set, O(V + E).
    pub fn reaches(&self, start: &str, target: &str) -> bool {
        let mut stack = vec![start];
        let mut visited: HashSet<&str> = HashSet::new();

        while let Some(node) = stack.pop() {
            if node == target {
                return true;
            }
            if !visited.insert(node) {
                continue;
            }
            if let Some(next) = self.edges.get(node) {
                stack.extend(next.iter().map(String::as_str));
            }
        }
        false
    }

    /// Whether adding `task -> depends_on` would close a cycle
    pub fn would_create_cycle(&self, task: &str, depends_on: &str) -> bool {
        task == depends_on || self.reaches(depends_on, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_cycle_rejected() {
        // a depends on b; adding b -> a closes the loop
        let graph = DependencyGraph::from_edges([("a", "b")]);
        assert!(graph.would_create_cycle("b", "a"));
    }

    #[test]
    fn test_transitive_cycle_rejected() {
        let graph = DependencyGraph::from_edges([("a", "b"), ("b", "c"), ("c", "d")]);
        assert!(graph.would_create_cycle("d", "a"));
        assert!(!graph.would_create_cycle("a", "d"));
    }

    #[test]
    fn test_self_dependency_rejected() {
        let graph = DependencyGraph::default();
        assert!(graph.would_create_cycle("a", "a"));
    }

    #[test]
    fn test_diamond_is_acyclic() {
        let graph = DependencyGraph::from_edges([("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")]);
        assert!(!graph.would_create_cycle("e", "a"));
        assert!(graph.would_create_cycle("d", "a"));
    }

    #[test]
    fn test_existing_cycle_terminates() {
        let graph = DependencyGraph::from_edges([("x", "y"), ("y", "x")]);
        assert!(!graph.reaches("x", "z"));
    }
}
