use trellis_scenario::{AnchorRef, BindingEdge, BindingGraph, Component, Configuration, Error};

use super::{GraphPass, PassContext, PassError};
use crate::ComponentTable;

/// Rewrites wildcard, group and configuration endpoints into concrete anchor-to-anchor edges.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExpandPass;

impl GraphPass for ExpandPass {
    fn name(&self) -> &'static str {
        "expand"
    }

    fn run(
        &self,
        mut graph: BindingGraph,
        cx: &mut PassContext<'_>,
    ) -> Result<BindingGraph, PassError> {
        let mut expanded = Vec::new();
        for edge in graph.take_edges() {
            expand_edge(&cx.table, edge, &mut expanded).map_err(PassError::failed(self.name()))?;
        }
        graph.set_edges(expanded);
        Ok(graph)
    }
}

#[derive(Debug)]
struct Endpoint {
    anchor: AnchorRef,
    /// Reached through the default-configuration fallback of a wildcard.
    implicit: bool,
}

fn expand_edge(
    table: &ComponentTable<'_>,
    edge: BindingEdge,
    out: &mut Vec<BindingEdge>,
) -> Result<(), Error> {
    let sources = expand_endpoint(table, &edge.source)?;
    let targets = expand_endpoint(table, &edge.target)?;

    if let ([source], [target]) = (sources.as_slice(), targets.as_slice())
        && source.anchor == edge.source
        && target.anchor == edge.target
    {
        out.push(edge);
        return Ok(());
    }

    for source in &sources {
        for target in &targets {
            let Some(channel) = source.anchor.channel() else {
                continue;
            };
            if target.anchor.channel() != Some(channel) {
                continue;
            }
            out.push(BindingEdge {
                source: source.anchor.clone(),
                target: target.anchor.clone(),
                implicit: edge.implicit || source.implicit || target.implicit,
            });
        }
    }
    Ok(())
}

fn expand_endpoint(table: &ComponentTable<'_>, anchor: &AnchorRef) -> Result<Vec<Endpoint>, Error> {
    let component = table.component(anchor.node.as_str())?;

    if anchor.is_wildcard() {
        if let Some(configuration) = component.default_configuration() {
            return Ok(configuration_anchors(component, configuration, true));
        }
        return Ok(component
            .anchors()
            .filter(|a| !a.is_group() && !a.is_internal())
            .map(|a| Endpoint {
                anchor: a.id().clone(),
                implicit: false,
            })
            .collect());
    }

    if let Some(found) = component.find_anchor(&anchor.anchor) {
        if !found.is_group() {
            return Ok(vec![Endpoint {
                anchor: found.id().clone(),
                implicit: false,
            }]);
        }
        return Ok(found
            .group_children()
            .iter()
            .filter_map(|child| component.find_anchor(child))
            .filter(|child| !child.is_group())
            .map(|child| Endpoint {
                anchor: child.id().clone(),
                implicit: false,
            })
            .collect());
    }

    if let Some(configuration) = component.configuration(&anchor.anchor) {
        return Ok(configuration_anchors(component, configuration, false));
    }

    // Not an anchor, group or configuration: report it as a missing anchor.
    component.anchor(&anchor.anchor)?;
    Ok(Vec::new())
}

fn configuration_anchors(
    component: &Component,
    configuration: &Configuration,
    implicit: bool,
) -> Vec<Endpoint> {
    component
        .anchors()
        .filter(|a| !a.is_group() && !a.is_internal())
        .filter(|a| {
            a.channel()
                .is_some_and(|channel| configuration.schema.contains_key(&channel))
        })
        .map(|a| Endpoint {
            anchor: a.id().clone(),
            implicit,
        })
        .collect()
}
