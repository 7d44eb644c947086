use std::collections::HashSet;

use trellis_scenario::{BindingGraph, BindingNode, Error, NodeId, Session};

/// Collect every component connected to `root` through bindings, following bindings in both
/// directions so that components that only ever act as a source are still reached.
pub fn generate_binding_graph(session: &Session, root: &str) -> Result<BindingGraph, Error> {
    let root = session.component(root)?.id().clone();
    let mut graph = BindingGraph::new(root.clone());
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut stack = vec![root];

    while let Some(id) = stack.pop() {
        if !visited.insert(id.clone()) {
            continue;
        }
        let component = session.component(id.as_str())?;
        graph.insert_node(BindingNode {
            id: id.clone(),
            kind: component.kind().to_string(),
        });

        for edge in session.bindings() {
            if edge.source.node != id && edge.target.node != id {
                continue;
            }
            for endpoint in [&edge.source.node, &edge.target.node] {
                session.component(endpoint.as_str())?;
                if !visited.contains(endpoint) {
                    stack.push(endpoint.clone());
                }
            }
            graph.insert_edge(edge.clone());
        }
    }

    Ok(graph)
}
