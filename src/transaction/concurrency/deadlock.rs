use std::collections::{BTreeMap, BTreeSet};

use crate::common::types::TxnId;

/// Directed waits-for graph: an edge `t1 -> t2` records that `t1` is
/// blocked behind a lock `t2` holds. Ordered containers keep traversal
/// deterministic, so detection always reports the same cycle for the same
/// queue contents.
pub struct WaitsForGraph {
    edges: BTreeMap<TxnId, BTreeSet<TxnId>>,
}

#[derive(Clone, Copy, PartialEq)]
enum VisitState {
    InProgress,
    Done,
}

impl WaitsForGraph {
    pub fn new() -> Self {
        Self { edges: BTreeMap::new() }
    }

    pub fn add_edge(&mut self, from: TxnId, to: TxnId) {
        self.edges.entry(from).or_default().insert(to);
    }

    pub fn remove_edge(&mut self, from: TxnId, to: TxnId) {
        if let Some(targets) = self.edges.get_mut(&from) {
            targets.remove(&to);
        }
    }

    pub fn edge_list(&self) -> Vec<(TxnId, TxnId)> {
        self.edges
            .iter()
            .flat_map(|(&from, targets)| targets.iter().map(move |&to| (from, to)))
            .collect()
    }

    /// Depth-first search from the lowest transaction id; returns the
    /// members of the first cycle found.
    pub fn find_cycle(&self) -> Option<Vec<TxnId>> {
        let mut visit = BTreeMap::new();
        let mut path = Vec::new();
        for &start in self.edges.keys() {
            if !visit.contains_key(&start) {
                if let Some(cycle) = self.dfs(start, &mut visit, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn dfs(
        &self,
        node: TxnId,
        visit: &mut BTreeMap<TxnId, VisitState>,
        path: &mut Vec<TxnId>,
    ) -> Option<Vec<TxnId>> {
        visit.insert(node, VisitState::InProgress);
        path.push(node);

        if let Some(targets) = self.edges.get(&node) {
            for &next in targets {
                match visit.get(&next) {
                    Some(VisitState::InProgress) => {
                        // Back edge: the cycle is the path suffix from `next`.
                        let start = path.iter().position(|&t| t == next).unwrap_or(0);
                        return Some(path[start..].to_vec());
                    }
                    Some(VisitState::Done) => {}
                    None => {
                        if let Some(cycle) = self.dfs(next, visit, path) {
                            return Some(cycle);
                        }
                    }
                }
            }
        }

        path.pop();
        visit.insert(node, VisitState::Done);
        None
    }
}

impl Default for WaitsForGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acyclic_graph() {
        let mut g = WaitsForGraph::new();
        g.add_edge(1, 2);
        g.add_edge(2, 3);
        g.add_edge(1, 3);
        assert!(g.find_cycle().is_none());
    }

    #[test]
    fn test_two_cycle() {
        let mut g = WaitsForGraph::new();
        g.add_edge(1, 2);
        g.add_edge(2, 1);
        let cycle = g.find_cycle().unwrap();
        assert_eq!(cycle.len(), 2);
        assert!(cycle.contains(&1) && cycle.contains(&2));
    }

    #[test]
    fn test_cycle_among_many_edges() {
        let mut g = WaitsForGraph::new();
        g.add_edge(1, 2);
        g.add_edge(2, 3);
        g.add_edge(3, 4);
        g.add_edge(4, 2);
        g.add_edge(5, 1);
        let cycle = g.find_cycle().unwrap();
        let members: BTreeSet<TxnId> = cycle.into_iter().collect();
        assert_eq!(members, BTreeSet::from([2, 3, 4]));
    }

    #[test]
    fn test_removed_edge_breaks_cycle() {
        let mut g = WaitsForGraph::new();
        g.add_edge(1, 2);
        g.add_edge(2, 1);
        g.remove_edge(2, 1);
        assert!(g.find_cycle().is_none());
        assert_eq!(g.edge_list(), vec![(1, 2)]);
    }
}
