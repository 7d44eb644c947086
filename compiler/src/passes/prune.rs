use std::collections::BTreeSet;

use trellis_scenario::{BindingGraph, Channel};

use super::{GraphPass, PassContext, PassError};

/// Drops edges whose channel the root never touches. `data` and `text` always survive.
#[derive(Clone, Copy, Debug, Default)]
pub struct PrunePass;

impl GraphPass for PrunePass {
    fn name(&self) -> &'static str {
        "prune"
    }

    fn run(
        &self,
        mut graph: BindingGraph,
        _cx: &mut PassContext<'_>,
    ) -> Result<BindingGraph, PassError> {
        let channels = root_channels(&graph);
        let edges = graph.take_edges();
        let kept = edges.into_iter().filter(|edge| {
            if !graph.contains_node(edge.source.node.as_str())
                || !graph.contains_node(edge.target.node.as_str())
            {
                return false;
            }
            edge.channel()
                .is_some_and(|channel| channels.contains(&channel))
        });
        let kept: Vec<_> = kept.collect();
        graph.set_edges(kept);
        Ok(graph)
    }
}

/// Channels of every root anchor on any edge, plus the always-on channels.
pub fn root_channels(graph: &BindingGraph) -> BTreeSet<Channel> {
    let mut channels: BTreeSet<Channel> = Channel::ALWAYS_ON.into_iter().collect();
    for edge in graph.edges() {
        for endpoint in [&edge.source, &edge.target] {
            if endpoint.node != graph.root {
                continue;
            }
            if let Some(channel) = endpoint.channel() {
                channels.insert(channel);
            }
        }
    }
    channels
}
