use std::collections::HashSet;

use trellis_scenario::{
    AnchorRef, BindingEdge, BindingGraph, BindingNode, Channel, Error, NodeId, SchemaType,
    ValueType, Warning,
    graph::{Cycle, detect_cycles},
};

use super::{GraphPass, PassContext, PassError};

mod mediator;

pub use mediator::{Participant, mediator_id};

/// Kind given to synthesized mediator components.
pub const MEDIATOR_KIND: &str = "merged";

/// Replaces every same-channel cycle with a mediator that owns the channel's value.
///
/// Each participant keeps its public anchor, now fed only by the mediator, and gains a shadow
/// anchor that receives what used to flow into the public one and publishes to the mediator.
#[derive(Clone, Copy, Debug, Default)]
pub struct CyclePass;

impl GraphPass for CyclePass {
    fn name(&self) -> &'static str {
        "cycles"
    }

    fn run(
        &self,
        mut graph: BindingGraph,
        cx: &mut PassContext<'_>,
    ) -> Result<BindingGraph, PassError> {
        let detected = detect_cycles(graph.edges());
        let mut edges = graph.take_edges();

        for cycle in detected {
            let Some(channel) = cycle.channel else {
                let warning = Warning::UnclassifiedCycle {
                    nodes: cycle.describe(),
                };
                tracing::warn!("{warning}");
                cx.diagnostics.push(warning);
                continue;
            };

            let Some(mediator) = resolve(&cycle, channel, &mut edges, cx)
                .map_err(PassError::failed(self.name()))?
            else {
                continue;
            };
            tracing::debug!(
                mediator = %mediator,
                participants = %cycle.describe(),
                "resolved cycle"
            );
            graph.insert_node(BindingNode {
                id: mediator.clone(),
                kind: MEDIATOR_KIND.to_string(),
            });
            cx.mediators.push(mediator);
            cx.cycles.push(cycle);
        }

        graph.set_edges(edges);
        debug_assert!(
            detect_cycles(graph.edges())
                .iter()
                .all(|cycle| cycle.channel.is_none()),
            "cycle resolution left a cycle behind"
        );
        Ok(graph)
    }
}

fn resolve(
    cycle: &Cycle,
    channel: Channel,
    edges: &mut Vec<BindingEdge>,
    cx: &mut PassContext<'_>,
) -> Result<Option<NodeId>, Error> {
    let participants: Vec<Participant> = cycle
        .nodes
        .iter()
        .filter_map(|node| {
            let fed = cycle
                .edges
                .iter()
                .find(|e| e.target.node == *node && !e.target.is_internal())?;
            Some(Participant {
                node: node.clone(),
                anchor: fed.target.anchor.clone(),
            })
        })
        .collect();

    if participants.len() < 2 {
        tracing::debug!(nodes = %cycle.describe(), "cycle has a single participant; left as is");
        return Ok(None);
    }

    let first = AnchorRef::new(participants[0].node.clone(), participants[0].anchor.as_str());
    let schema = match cx.table.anchor(&first)?.schema().single() {
        Some(schema) => *schema,
        None => SchemaType::scalar(ValueType::Numeric),
    };

    let mut shadows = Vec::with_capacity(participants.len());
    for participant in &participants {
        let public = AnchorRef::new(participant.node.clone(), participant.anchor.as_str());
        shadows.push((public.clone(), cx.table.anchor(&public)?.shadow()));
    }

    let id = cx.table.unused_id(mediator_id(channel, &participants));
    let component = mediator::build(id, channel, schema, participants)?;
    let mediator = cx.table.insert_synthesized(component)?;
    let shared = AnchorRef::new(mediator.clone(), channel.as_str());

    let cycle_edges: HashSet<String> = cycle.edges.iter().map(BindingEdge::key).collect();
    let members: HashSet<&NodeId> = cycle.nodes.iter().collect();

    edges.retain(|edge| {
        edge.source.node == edge.target.node
            || edge.channel() != Some(channel)
            || !members.contains(&edge.source.node)
            || !members.contains(&edge.target.node)
    });

    for (public, shadow) in shadows {
        let private = shadow.id().clone();
        for edge in edges.iter_mut() {
            if edge.target == public && !cycle_edges.contains(&edge.key()) {
                edge.target = private.clone();
            }
        }
        edges.push(BindingEdge::implicit(private, shared.clone()));
        edges.push(BindingEdge::implicit(shared.clone(), public));
        cx.table.insert_shadow(shadow);
    }

    Ok(Some(mediator))
}
