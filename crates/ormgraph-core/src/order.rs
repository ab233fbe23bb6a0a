//! Dependency graph and stable topological ordering.
//!
//! Shared by the unit of work (row steps) and schema synchronization (DDL
//! operations).

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// `from` must be written before `to`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Edge {
    pub(crate) from: usize,
    pub(crate) to: usize,
    /// Relation on `to` whose join columns create the dependency, if any.
    pub(crate) relation: Option<String>,
    /// The join columns accept null, so the dependency can be deferred.
    pub(crate) nullable: bool,
    pub(crate) active: bool,
}

/// Dependency graph over nodes indexed from zero.
#[derive(Debug, Clone, Default)]
pub(crate) struct DependencyGraph {
    nodes: usize,
    edges: Vec<Edge>,
}

impl DependencyGraph {
    pub(crate) fn new(nodes: usize) -> Self {
        Self {
            nodes,
            edges: Vec::new(),
        }
    }

    pub(crate) fn add_edge(
        &mut self,
        from: usize,
        to: usize,
        relation: Option<String>,
        nullable: bool,
    ) {
        let duplicate = self
            .edges
            .iter()
            .any(|e| e.from == from && e.to == to && e.relation == relation);
        if !duplicate {
            self.edges.push(Edge {
                from,
                to,
                relation,
                nullable,
                active: true,
            });
        }
    }

    pub(crate) fn edge(&self, index: usize) -> &Edge {
        &self.edges[index]
    }

    /// Drop every edge `relation` of `to` contributes.
    pub(crate) fn disable(&mut self, to: usize, relation: &str) {
        for edge in &mut self.edges {
            if edge.to == to && edge.relation.as_deref() == Some(relation) {
                edge.active = false;
            }
        }
    }

    /// Kahn's algorithm; ties go to the lowest node index.
    ///
    /// On failure returns the edge indices of one cycle, in edge direction.
    pub(crate) fn sort(&self) -> Result<Vec<usize>, Vec<usize>> {
        let mut in_degree = vec![0usize; self.nodes];
        let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); self.nodes];
        for edge in self.edges.iter().filter(|e| e.active) {
            in_degree[edge.to] += 1;
            outgoing[edge.from].push(edge.to);
        }

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| Reverse(node))
            .collect();
        let mut order = Vec::with_capacity(self.nodes);
        while let Some(Reverse(node)) = ready.pop() {
            order.push(node);
            for &next in &outgoing[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() == self.nodes {
            return Ok(order);
        }
        let remaining: Vec<bool> = in_degree.iter().map(|d| *d > 0).collect();
        let start = remaining.iter().position(|r| *r).unwrap_or(0);
        Err(self.find_cycle(&remaining, start))
    }

    /// Walk incoming edges backwards from `start` until a node repeats.
    ///
    /// Every remaining node has an incoming edge from another remaining
    /// node, so the walk always closes a cycle.
    fn find_cycle(&self, remaining: &[bool], start: usize) -> Vec<usize> {
        let mut seen_at: HashMap<usize, usize> = HashMap::new();
        let mut path = Vec::new();
        let mut node = start;
        loop {
            if let Some(&at) = seen_at.get(&node) {
                let mut cycle = path[at..].to_vec();
                cycle.reverse();
                return cycle;
            }
            seen_at.insert(node, path.len());
            let incoming = self
                .edges
                .iter()
                .position(|e| e.active && e.to == node && remaining[e.from]);
            match incoming {
                Some(index) => {
                    path.push(index);
                    node = self.edges[index].from;
                }
                None => return path,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_order() {
        let mut graph = DependencyGraph::new(4);
        graph.add_edge(3, 0, Some("a".into()), false);
        graph.add_edge(2, 1, Some("b".into()), false);
        assert_eq!(graph.sort().unwrap(), vec![2, 1, 3, 0]);
    }

    #[test]
    fn test_dependencies_come_first() {
        let mut graph = DependencyGraph::new(5);
        let edges = [(4, 0), (3, 4), (1, 3), (2, 1)];
        for (from, to) in edges {
            graph.add_edge(from, to, None, false);
        }
        let order = graph.sort().unwrap();
        let position = |n: usize| order.iter().position(|o| *o == n).unwrap();
        for (from, to) in edges {
            assert!(position(from) < position(to));
        }
    }

    #[test]
    fn test_cycle_is_reported() {
        let mut graph = DependencyGraph::new(3);
        graph.add_edge(0, 1, Some("next".into()), false);
        graph.add_edge(1, 2, Some("next".into()), true);
        graph.add_edge(2, 0, Some("next".into()), false);

        let mut cycle = graph.sort().unwrap_err();
        cycle.sort();
        assert_eq!(cycle, vec![0, 1, 2]);
        assert!(graph.edge(1).nullable);

        graph.disable(2, "next");
        assert_eq!(graph.sort().unwrap(), vec![2, 0, 1]);
    }

    #[test]
    fn test_self_edge_is_a_cycle() {
        let mut graph = DependencyGraph::new(2);
        graph.add_edge(1, 1, Some("parent".into()), true);
        assert_eq!(graph.sort().unwrap_err(), vec![0]);
    }
}
