use std::collections::{HashMap, HashSet, VecDeque};

use crate::{BindingEdge, Channel, NodeId};

/// A strongly connected set of bindings on one channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cycle {
    /// `None` when the edges carry no extractable channel; such cycles cannot be mediated.
    pub channel: Option<Channel>,
    /// Participants in first-seen order, without duplicates.
    pub nodes: Vec<NodeId>,
    /// Every partition edge between two vertices of the cycle, in edge order.
    pub edges: Vec<BindingEdge>,
}

impl Cycle {
    pub fn contains(&self, node: &NodeId) -> bool {
        self.nodes.contains(node)
    }

    /// `a, b, c` for diagnostics.
    pub fn describe(&self) -> String {
        self.nodes
            .iter()
            .map(NodeId::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Group edges by the channel both endpoints share. Partitions appear in first-seen order.
pub fn partition_by_channel(edges: &[BindingEdge]) -> Vec<(Option<Channel>, Vec<&BindingEdge>)> {
    let mut partitions: Vec<(Option<Channel>, Vec<&BindingEdge>)> = Vec::new();
    for edge in edges {
        let channel = edge.channel();
        match partitions.iter_mut().find(|(c, _)| *c == channel) {
            Some((_, members)) => members.push(edge),
            None => partitions.push((channel, vec![edge])),
        }
    }
    partitions
}

/// Find every cycle in `edges`, one per strongly connected component per channel partition.
///
/// A vertex is a node together with whether the anchor is a shadow, so the edges a resolved
/// cycle leaves behind (`n.x_internal -> m.x -> n.x`) do not count as a loop through `n`.
/// Self-bindings are ignored.
pub fn detect_cycles(edges: &[BindingEdge]) -> Vec<Cycle> {
    partition_by_channel(edges)
        .into_iter()
        .flat_map(|(channel, members)| partition_cycles(channel, &members))
        .collect()
}

type Vertex = (NodeId, bool);

fn source_vertex(edge: &BindingEdge) -> Vertex {
    (edge.source.node.clone(), edge.source.is_internal())
}

fn target_vertex(edge: &BindingEdge) -> Vertex {
    (edge.target.node.clone(), edge.target.is_internal())
}

fn partition_cycles(channel: Option<Channel>, edges: &[&BindingEdge]) -> Vec<Cycle> {
    let mut index: HashMap<Vertex, usize> = HashMap::new();
    let mut vertices: Vec<Vertex> = Vec::new();
    let mut intern = |vertex: Vertex| -> usize {
        *index.entry(vertex.clone()).or_insert_with(|| {
            vertices.push(vertex);
            vertices.len() - 1
        })
    };

    let endpoints: Vec<(usize, usize)> = edges
        .iter()
        .map(|edge| (intern(source_vertex(edge)), intern(target_vertex(edge))))
        .collect();

    let mut out: Vec<Vec<usize>> = vec![Vec::new(); vertices.len()];
    for &(u, v) in &endpoints {
        if u != v {
            out[u].push(v);
        }
    }
    for targets in &mut out {
        targets.sort_unstable();
        targets.dedup();
    }

    let mut components = Tarjan::new(&out).run();
    for component in &mut components {
        component.sort_unstable();
    }
    components.sort_unstable_by_key(|component| component[0]);

    let mut membership = vec![None; vertices.len()];
    for (i, component) in components.iter().enumerate() {
        for &v in component {
            membership[v] = Some(i);
        }
    }

    components
        .iter()
        .enumerate()
        .map(|(i, component)| {
            let mut seen: HashSet<&NodeId> = HashSet::new();
            let nodes: Vec<NodeId> = component
                .iter()
                .map(|&v| &vertices[v].0)
                .filter(|node| seen.insert(*node))
                .cloned()
                .collect();
            let edges = edges
                .iter()
                .zip(&endpoints)
                .filter(|(_, (u, v))| {
                    u != v && membership[*u] == Some(i) && membership[*v] == Some(i)
                })
                .map(|(edge, _)| (*edge).clone())
                .collect();
            Cycle {
                channel,
                nodes,
                edges,
            }
        })
        .collect()
}

/// Tarjan's strongly connected components; only components with two or more vertices are kept.
struct Tarjan<'a> {
    out: &'a [Vec<usize>],
    index: Vec<Option<usize>>,
    low: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    next: usize,
    components: Vec<Vec<usize>>,
}

impl<'a> Tarjan<'a> {
    fn new(out: &'a [Vec<usize>]) -> Self {
        let n = out.len();
        Self {
            out,
            index: vec![None; n],
            low: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            next: 0,
            components: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Vec<usize>> {
        for v in 0..self.out.len() {
            if self.index[v].is_none() {
                self.visit(v);
            }
        }
        self.components
    }

    /// Depth-first from `root` with an explicit stack of `(vertex, next successor)` frames.
    fn visit(&mut self, root: usize) {
        let out = self.out;
        self.open(root);
        let mut frames = vec![(root, 0usize)];

        while let Some(frame) = frames.last_mut() {
            let (u, next) = *frame;
            if let Some(&v) = out[u].get(next) {
                frame.1 += 1;
                match self.index[v] {
                    None => {
                        self.open(v);
                        frames.push((v, 0));
                    }
                    Some(index) if self.on_stack[v] => {
                        self.low[u] = self.low[u].min(index);
                    }
                    Some(_) => {}
                }
                continue;
            }

            frames.pop();
            if let Some(&(parent, _)) = frames.last() {
                self.low[parent] = self.low[parent].min(self.low[u]);
            }
            self.close(u);
        }
    }

    fn open(&mut self, u: usize) {
        self.index[u] = Some(self.next);
        self.low[u] = self.next;
        self.next += 1;
        self.stack.push(u);
        self.on_stack[u] = true;
    }

    fn close(&mut self, u: usize) {
        if Some(self.low[u]) != self.index[u] {
            return;
        }
        let mut component = Vec::new();
        while let Some(v) = self.stack.pop() {
            self.on_stack[v] = false;
            component.push(v);
            if v == u {
                break;
            }
        }
        if component.len() > 1 {
            self.components.push(component);
        }
    }
}

/// Result of ordering nodes by their bindings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DependencyOrder {
    /// Every node exactly once: the topological prefix, then `unresolved`.
    pub order: Vec<NodeId>,
    /// Nodes that still sit on a loop, in input order.
    pub unresolved: Vec<NodeId>,
}

/// Order nodes so that a node providing a value precedes the nodes it is bound into.
///
/// Edges for which `weak` returns true, self-bindings, and edges touching nodes outside
/// `nodes` are ignored. Nodes that cannot be ordered follow the ordered ones in input order.
pub fn topo_order<'a>(
    nodes: impl IntoIterator<Item = &'a NodeId>,
    edges: &[BindingEdge],
    weak: impl Fn(&BindingEdge) -> bool,
) -> DependencyOrder {
    let nodes: Vec<&NodeId> = nodes.into_iter().collect();
    let position: HashMap<&NodeId, usize> =
        nodes.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let n = nodes.len();

    let mut out: Vec<Vec<usize>> = vec![Vec::new(); n];
    for edge in edges {
        if weak(edge) {
            continue;
        }
        let (Some(&u), Some(&v)) = (
            position.get(&edge.source.node),
            position.get(&edge.target.node),
        ) else {
            continue;
        };
        if u != v {
            out[u].push(v);
        }
    }

    let mut indeg = vec![0usize; n];
    for targets in &mut out {
        targets.sort_unstable();
        targets.dedup();
        for &v in targets.iter() {
            indeg[v] += 1;
        }
    }

    let mut queue: VecDeque<usize> = (0..n).filter(|&i| indeg[i] == 0).collect();
    let mut placed = vec![false; n];
    let mut order = Vec::with_capacity(n);
    while let Some(u) = queue.pop_front() {
        placed[u] = true;
        order.push(nodes[u].clone());
        for &v in &out[u] {
            indeg[v] -= 1;
            if indeg[v] == 0 {
                queue.push_back(v);
            }
        }
    }

    let unresolved: Vec<NodeId> = (0..n)
        .filter(|&i| !placed[i])
        .map(|i| nodes[i].clone())
        .collect();
    order.extend(unresolved.iter().cloned());
    DependencyOrder { order, unresolved }
}
