//! Directed acyclic graph over variable indices.
//!
//! Parent and child lists are kept sorted so that iteration, edge listings and
//! CPT parent orders are deterministic. Every mutation re-establishes
//! acyclicity before returning; an edit that would introduce a cycle is
//! rejected with [`TriageError::Structure`] and leaves the graph untouched.

use smallvec::SmallVec;

use crate::engine::errors::TriageError;

/// Maximum size for inline storage of adjacency lists.
const INLINE_ADJACENCY: usize = 4;

type Adjacency = SmallVec<[usize; INLINE_ADJACENCY]>;

/// A DAG whose nodes are `0..num_nodes()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dag {
    parents: Vec<Adjacency>,
    children: Vec<Adjacency>,
}

impl Dag {
    /// Creates a graph with `num_nodes` isolated nodes.
    pub fn new(num_nodes: usize) -> Self {
        Self {
            parents: vec![Adjacency::new(); num_nodes],
            children: vec![Adjacency::new(); num_nodes],
        }
    }

    /// Builds a graph from an edge list, validating every edge.
    pub fn from_edges(
        num_nodes: usize,
        edges: impl IntoIterator<Item = (usize, usize)>,
    ) -> Result<Self, TriageError> {
        let mut dag = Self::new(num_nodes);
        for (src, dst) in edges {
            dag.add_edge(src, dst)?;
        }
        Ok(dag)
    }

    pub fn num_nodes(&self) -> usize {
        self.parents.len()
    }

    /// Sorted parents of a node.
    pub fn parents(&self, node: usize) -> &[usize] {
        &self.parents[node]
    }

    /// Sorted children of a node.
    pub fn children(&self, node: usize) -> &[usize] {
        &self.children[node]
    }

    pub fn in_degree(&self, node: usize) -> usize {
        self.parents[node].len()
    }

    pub fn has_edge(&self, src: usize, dst: usize) -> bool {
        src < self.num_nodes() && self.children[src].binary_search(&dst).is_ok()
    }

    pub fn edge_count(&self) -> usize {
        self.children.iter().map(SmallVec::len).sum()
    }

    /// All edges as `(parent, child)` pairs, sorted.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        self.children
            .iter()
            .enumerate()
            .flat_map(|(src, children)| children.iter().map(move |&dst| (src, dst)))
            .collect()
    }

    /// Returns true when a directed path `from ~> to` exists (a node reaches itself).
    pub fn is_reachable(&self, from: usize, to: usize) -> bool {
        self.reachable_skipping(from, to, None)
    }

    /// Returns true when adding `src -> dst` would close a directed cycle.
    pub fn would_create_cycle(&self, src: usize, dst: usize) -> bool {
        self.is_reachable(dst, src)
    }

    /// Returns true when the existing edge `src -> dst` can be flipped without
    /// closing a cycle, i.e. no other path `src ~> dst` exists.
    pub fn can_reverse(&self, src: usize, dst: usize) -> bool {
        self.has_edge(src, dst) && !self.reachable_skipping(src, dst, Some((src, dst)))
    }

    /// Adds `src -> dst`.
    pub fn add_edge(&mut self, src: usize, dst: usize) -> Result<(), TriageError> {
        self.check_node(src)?;
        self.check_node(dst)?;
        if src == dst {
            return Err(TriageError::Structure(format!("self loop on node {}", src)));
        }
        if self.has_edge(src, dst) {
            return Err(TriageError::Structure(format!(
                "edge {} -> {} already exists",
                src, dst
            )));
        }
        if self.would_create_cycle(src, dst) {
            return Err(TriageError::Structure(format!(
                "edge {} -> {} would create a cycle",
                src, dst
            )));
        }
        insert_sorted(&mut self.children[src], dst);
        insert_sorted(&mut self.parents[dst], src);
        Ok(())
    }

    /// Removes `src -> dst`.
    pub fn remove_edge(&mut self, src: usize, dst: usize) -> Result<(), TriageError> {
        self.check_node(src)?;
        self.check_node(dst)?;
        if !self.has_edge(src, dst) {
            return Err(TriageError::Structure(format!(
                "edge {} -> {} does not exist",
                src, dst
            )));
        }
        remove_sorted(&mut self.children[src], dst);
        remove_sorted(&mut self.parents[dst], src);
        Ok(())
    }

    /// Replaces `src -> dst` with `dst -> src`.
    pub fn reverse_edge(&mut self, src: usize, dst: usize) -> Result<(), TriageError> {
        if !self.can_reverse(src, dst) {
            return Err(TriageError::Structure(format!(
                "edge {} -> {} cannot be reversed without a cycle",
                src, dst
            )));
        }
        remove_sorted(&mut self.children[src], dst);
        remove_sorted(&mut self.parents[dst], src);
        insert_sorted(&mut self.children[dst], src);
        insert_sorted(&mut self.parents[src], dst);
        Ok(())
    }

    /// Kahn's algorithm, smallest ready index first.
    ///
    /// Returns `None` if the graph contains a cycle, which no public mutation
    /// can produce.
    pub fn topological_order(&self) -> Option<Vec<usize>> {
        let n = self.num_nodes();
        let mut in_degree: Vec<usize> = self.parents.iter().map(SmallVec::len).collect();
        let mut ready: std::collections::BTreeSet<usize> =
            (0..n).filter(|&v| in_degree[v] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(node) = ready.pop_first() {
            order.push(node);
            for &child in &self.children[node] {
                in_degree[child] -= 1;
                if in_degree[child] == 0 {
                    ready.insert(child);
                }
            }
        }
        (order.len() == n).then_some(order)
    }

    pub fn is_acyclic(&self) -> bool {
        self.topological_order().is_some()
    }

    /// The given nodes together with all of their ancestors, as a membership mask.
    pub fn ancestral_set(&self, nodes: impl IntoIterator<Item = usize>) -> Vec<bool> {
        let mut mask = vec![false; self.num_nodes()];
        let mut stack: Vec<usize> = nodes.into_iter().collect();
        while let Some(node) = stack.pop() {
            if mask[node] {
                continue;
            }
            mask[node] = true;
            stack.extend(self.parents[node].iter().copied().filter(|&p| !mask[p]));
        }
        mask
    }

    fn reachable_skipping(&self, from: usize, to: usize, skip: Option<(usize, usize)>) -> bool {
        if from >= self.num_nodes() || to >= self.num_nodes() {
            return false;
        }
        if from == to {
            return true;
        }
        let mut visited = vec![false; self.num_nodes()];
        let mut stack = vec![from];
        visited[from] = true;
        while let Some(node) = stack.pop() {
            for &next in &self.children[node] {
                if skip == Some((node, next)) || visited[next] {
                    continue;
                }
                if next == to {
                    return true;
                }
                visited[next] = true;
                stack.push(next);
            }
        }
        false
    }

    fn check_node(&self, node: usize) -> Result<(), TriageError> {
        if node >= self.num_nodes() {
            return Err(TriageError::Structure(format!(
                "node {} out of range for graph with {} nodes",
                node,
                self.num_nodes()
            )));
        }
        Ok(())
    }
}

fn insert_sorted(list: &mut Adjacency, value: usize) {
    if let Err(pos) = list.binary_search(&value) {
        list.insert(pos, value);
    }
}

fn remove_sorted(list: &mut Adjacency, value: usize) {
    if let Ok(pos) = list.binary_search(&value) {
        list.remove(pos);
    }
}
