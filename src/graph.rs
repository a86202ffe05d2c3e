//! Field dependency DAGs.
//!
//! An edge `a -> b` means `a` must be sampled before `b`. Nodes keep their
//! insertion order, so every algorithm here is deterministic for a given
//! construction sequence.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use crate::error::{Error, Result};

/// Directed graph over node identifiers, expected to be acyclic.
#[derive(Debug, Clone)]
pub struct Dag<N> {
    nodes: Vec<N>,
    ids: HashMap<N, usize>,
    out: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
}

impl<N> Default for Dag<N> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            ids: HashMap::new(),
            out: Vec::new(),
            incoming: Vec::new(),
        }
    }
}

impl<N> Dag<N>
where
    N: Eq + Hash + Clone + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `node` if absent; returns its dense id.
    pub fn add_node(&mut self, node: N) -> usize {
        if let Some(&id) = self.ids.get(&node) {
            return id;
        }
        let id = self.nodes.len();
        self.ids.insert(node.clone(), id);
        self.nodes.push(node);
        self.out.push(Vec::new());
        self.incoming.push(Vec::new());
        id
    }

    /// Add the edge `from -> to`, adding either node as needed. Duplicate
    /// edges are ignored.
    pub fn add_edge(&mut self, from: N, to: N) {
        let f = self.add_node(from);
        let t = self.add_node(to);
        if !self.out[f].contains(&t) {
            self.out[f].push(t);
            self.incoming[t].push(f);
        }
    }

    pub fn contains(&self, node: &N) -> bool {
        self.ids.contains_key(node)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> &[N] {
        &self.nodes
    }

    /// Direct predecessors of `node`, in edge insertion order.
    pub fn parents(&self, node: &N) -> Vec<&N> {
        self.ids
            .get(node)
            .map(|&id| self.incoming[id].iter().map(|&p| &self.nodes[p]).collect())
            .unwrap_or_default()
    }

    /// Direct successors of `node`, in edge insertion order.
    pub fn children(&self, node: &N) -> Vec<&N> {
        self.ids
            .get(node)
            .map(|&id| self.out[id].iter().map(|&c| &self.nodes[c]).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Fails with [`Error::CycleDetected`] unless the graph is acyclic.
    pub fn validate(&self) -> Result<()> {
        topological_sort(self).map(|_| ())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Node ids in topological order.
fn topological_ids<N: Debug>(dag: &Dag<N>) -> Result<Vec<usize>> {
    let n = dag.nodes.len();
    let mut marks = vec![Mark::Unvisited; n];
    let mut post: Vec<usize> = Vec::with_capacity(n);
    // Explicit DFS stack of (node, next child position).
    let mut stack: Vec<(usize, usize)> = Vec::new();

    // Visit roots in reverse so the reversed postorder lists earlier-inserted
    // independent nodes first.
    for start in (0..n).rev() {
        if marks[start] != Mark::Unvisited {
            continue;
        }
        marks[start] = Mark::InProgress;
        stack.push((start, 0));

        while let Some((node, pos)) = stack.pop() {
            if let Some(&child) = dag.out[node].get(pos) {
                stack.push((node, pos + 1));
                match marks[child] {
                    Mark::Unvisited => {
                        marks[child] = Mark::InProgress;
                        stack.push((child, 0));
                    }
                    Mark::InProgress => {
                        return Err(Error::CycleDetected(format!("{:?}", dag.nodes[child])));
                    }
                    Mark::Done => {}
                }
            } else {
                marks[node] = Mark::Done;
                post.push(node);
            }
        }
    }

    post.reverse();
    Ok(post)
}

/// All nodes, each edge's source before its target.
///
/// # Errors
///
/// [`Error::CycleDetected`] naming a node on the cycle.
pub fn topological_sort<N>(dag: &Dag<N>) -> Result<Vec<N>>
where
    N: Clone + Debug,
{
    Ok(topological_ids(dag)?
        .into_iter()
        .map(|id| dag.nodes[id].clone())
        .collect())
}

/// Partition nodes into weakly connected groups (edges treated as undirected),
/// each listed in topological order. Groups are ordered by the position of
/// their first node in the global topological order.
pub fn topological_roots<N>(dag: &Dag<N>) -> Result<Vec<Vec<N>>>
where
    N: Clone + Debug,
{
    let order = topological_ids(dag)?;

    let mut parent: Vec<usize> = (0..dag.nodes.len()).collect();
    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }
    for (from, targets) in dag.out.iter().enumerate() {
        for &to in targets {
            let (a, b) = (find(&mut parent, from), find(&mut parent, to));
            if a != b {
                parent[b] = a;
            }
        }
    }

    let mut group_of_root: HashMap<usize, usize> = HashMap::new();
    let mut groups: Vec<Vec<N>> = Vec::new();
    for id in order {
        let root = find(&mut parent, id);
        let g = *group_of_root.entry(root).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[g].push(dag.nodes[id].clone());
    }
    Ok(groups)
}
