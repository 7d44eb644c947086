use std::{borrow::Borrow, collections::HashSet, sync::Arc};

use serde::{Deserialize, Serialize};

pub mod anchor;
pub mod channel;
pub mod component;
pub mod context;
mod error;
pub mod fragment;
pub mod graph;
pub mod session;
mod warning;

pub use anchor::{Anchor, AnchorContext, AnchorDecl, AnchorValue, CompileFn, Field, ValueSource};
pub use channel::{
    AnchorSchema, Channel, Container, GroupSchema, INTERNAL_SUFFIX, SchemaType, ValueType,
};
pub use component::{CompileComponent, Component, Configuration, Transform};
pub use context::{
    ChannelContext, CompileContext, CompiledTransform, ConstraintContext, Contribution,
};
pub use error::Error;
pub use fragment::{EventRef, Fragment, Parameter, UpdateRule};
pub use session::{DataReference, DeferredOp, DeferredReference, Session};
pub use warning::Warning;

/// Anchor id that stands for "every anchor of the component".
pub const WILDCARD: &str = "*";

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct NodeId(Arc<str>);

impl NodeId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl From<&NodeId> for NodeId {
    fn from(value: &NodeId) -> Self {
        value.clone()
    }
}

impl From<NodeId> for String {
    fn from(value: NodeId) -> Self {
        value.0.to_string()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

/// One side of a binding: an anchor on a component, or every anchor when `anchor` is `*`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AnchorRef {
    pub node: NodeId,
    pub anchor: String,
}

impl AnchorRef {
    pub fn new(node: impl Into<NodeId>, anchor: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            anchor: anchor.into(),
        }
    }

    pub fn all(node: impl Into<NodeId>) -> Self {
        Self::new(node, WILDCARD)
    }

    pub fn is_wildcard(&self) -> bool {
        self.anchor == WILDCARD
    }

    pub fn is_internal(&self) -> bool {
        self.anchor.ends_with(INTERNAL_SUFFIX)
    }

    pub fn channel(&self) -> Option<Channel> {
        Channel::extract(&self.anchor)
    }
}

impl std::fmt::Display for AnchorRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.node, self.anchor)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BindingEdge {
    /// Value flows from `source` into `target`.
    pub source: AnchorRef,
    pub target: AnchorRef,
    /// Synthesized by the compiler rather than declared by the author.
    pub implicit: bool,
}

impl BindingEdge {
    pub fn new(source: AnchorRef, target: AnchorRef) -> Self {
        Self {
            source,
            target,
            implicit: false,
        }
    }

    pub fn implicit(source: AnchorRef, target: AnchorRef) -> Self {
        Self {
            source,
            target,
            implicit: true,
        }
    }

    /// Identity used for deduplication: `sourceNode:sourceAnchor->targetNode:targetAnchor`.
    pub fn key(&self) -> String {
        format!(
            "{}:{}->{}:{}",
            self.source.node, self.source.anchor, self.target.node, self.target.anchor
        )
    }

    /// Channel shared by both endpoints, if both have one and they agree.
    pub fn channel(&self) -> Option<Channel> {
        let source = self.source.channel()?;
        (self.target.channel()? == source).then_some(source)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BindingNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Deduplicated node and edge set reachable from a compilation root.
#[derive(Clone, Debug)]
pub struct BindingGraph {
    pub root: NodeId,
    nodes: Vec<BindingNode>,
    edges: Vec<BindingEdge>,
    node_ids: HashSet<NodeId>,
    edge_keys: HashSet<String>,
}

impl BindingGraph {
    pub fn new(root: NodeId) -> Self {
        Self {
            root,
            nodes: Vec::new(),
            edges: Vec::new(),
            node_ids: HashSet::new(),
            edge_keys: HashSet::new(),
        }
    }

    pub fn nodes(&self) -> &[BindingNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[BindingEdge] {
        &self.edges
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter().map(|n| &n.id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node_ids.contains(id)
    }

    pub fn contains_edge(&self, edge: &BindingEdge) -> bool {
        self.edge_keys.contains(&edge.key())
    }

    /// Returns `false` if a node with the same id is already present.
    pub fn insert_node(&mut self, node: BindingNode) -> bool {
        if !self.node_ids.insert(node.id.clone()) {
            return false;
        }
        self.nodes.push(node);
        true
    }

    /// Returns `false` if a structurally identical edge is already present.
    pub fn insert_edge(&mut self, edge: BindingEdge) -> bool {
        if !self.edge_keys.insert(edge.key()) {
            return false;
        }
        self.edges.push(edge);
        true
    }

    /// Replace the edge set, deduplicating in order.
    pub fn set_edges(&mut self, edges: impl IntoIterator<Item = BindingEdge>) {
        self.edges.clear();
        self.edge_keys.clear();
        for edge in edges {
            self.insert_edge(edge);
        }
    }

    pub fn take_edges(&mut self) -> Vec<BindingEdge> {
        self.edge_keys.clear();
        std::mem::take(&mut self.edges)
    }
}
