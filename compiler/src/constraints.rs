use std::collections::BTreeMap;

use trellis_expr::qualified_name;
use trellis_scenario::{
    AnchorContext, BindingEdge, BindingGraph, Channel, ChannelContext, CompileContext,
    CompiledTransform, Component, ConstraintContext, Contribution, Error, Fragment, NodeId,
    Warning,
    graph::{DependencyOrder, topo_order},
};

use crate::ComponentTable;

/// Order in which nodes are constraint-compiled: providers before the nodes they feed.
///
/// Edges published by mediators are left out so that participants compile before their
/// mediator. Nodes still caught in a loop spanning several channels follow in graph order.
pub fn dependency_order(graph: &BindingGraph, table: &ComponentTable<'_>) -> DependencyOrder {
    let order = topo_order(graph.node_ids(), graph.edges(), |edge| {
        table.is_synthesized(edge.source.node.as_str())
    });
    if !order.unresolved.is_empty() {
        tracing::debug!(
            nodes = ?order.unresolved,
            "nodes bound in a cross-channel loop are compiled in graph order"
        );
    }
    order
}

/// A node's fragment together with the context it was compiled against.
#[derive(Debug)]
pub struct CompiledNode {
    pub id: NodeId,
    pub context: ConstraintContext,
    pub fragment: Fragment,
}

/// Build each node's constraint context in `order` and run its component exactly once.
pub fn compile_nodes(
    table: &ComponentTable<'_>,
    graph: &BindingGraph,
    order: &[NodeId],
    diagnostics: &mut Vec<Warning>,
) -> Result<Vec<CompiledNode>, Error> {
    let mut contexts: BTreeMap<NodeId, ConstraintContext> = BTreeMap::new();
    let mut fragments = Vec::with_capacity(order.len());

    for node in order {
        let component = table.component(node.as_str())?;
        let context = build_context(table, graph, component, &contexts)?;
        contexts.insert(node.clone(), context);

        let mut ctx = CompileContext::new(component.id(), &contexts[node], &contexts);
        let fragment = component.compile(&mut ctx);
        for warning in ctx.into_diagnostics() {
            tracing::warn!(node = %node, "{warning}");
            diagnostics.push(warning);
        }
        fragments.push((node.clone(), fragment));
    }

    Ok(fragments
        .into_iter()
        .map(|(id, fragment)| {
            let context = contexts.remove(&id).unwrap_or_default();
            CompiledNode {
                id,
                context,
                fragment,
            }
        })
        .collect())
}

/// Resolve everything bound into `component`.
pub fn build_context(
    table: &ComponentTable<'_>,
    graph: &BindingGraph,
    component: &Component,
    contexts: &BTreeMap<NodeId, ConstraintContext>,
) -> Result<ConstraintContext, Error> {
    let node = component.id();
    let mut public: BTreeMap<Channel, Vec<Contribution>> = BTreeMap::new();
    let mut internal: BTreeMap<Channel, Vec<Contribution>> = BTreeMap::new();

    for edge in graph.edges().iter().filter(|e| e.target.node == *node) {
        let Some(channel) = edge.target.channel() else {
            continue;
        };
        let contribution = contribution(table, edge, contexts)?;
        let bucket = if edge.target.is_internal() {
            &mut internal
        } else {
            &mut public
        };
        bucket.entry(channel).or_default().push(contribution);
    }

    let transforms = component
        .configurations()
        .iter()
        .flat_map(|configuration| &configuration.transforms)
        .map(|transform| CompiledTransform {
            name: qualified_name(node.as_str(), Some(&transform.name)),
            channel: transform.channel,
            expr: transform.value.resolve_placeholders(node.as_str()),
        })
        .collect();

    Ok(ConstraintContext {
        channels: resolve_all(public),
        internal: resolve_all(internal),
        transforms,
        shadows: table.shadowed_anchors(node),
    })
}

fn contribution(
    table: &ComponentTable<'_>,
    edge: &BindingEdge,
    contexts: &BTreeMap<NodeId, ConstraintContext>,
) -> Result<Contribution, Error> {
    let anchor = table.anchor(&edge.source)?;
    let ctx = AnchorContext {
        node: &edge.source.node,
        anchor: &edge.source.anchor,
        constraints: contexts.get(&edge.source.node),
    };
    Ok(Contribution {
        from: edge.source.clone(),
        target: edge.target.anchor.clone(),
        container: anchor.container(),
        value: anchor.compile(&ctx).resolve_placeholders(&edge.source.node),
    })
}

fn resolve_all(
    grouped: BTreeMap<Channel, Vec<Contribution>>,
) -> BTreeMap<Channel, ChannelContext> {
    grouped
        .into_iter()
        .map(|(channel, contributions)| (channel, ChannelContext::resolve(channel, contributions)))
        .collect()
}
