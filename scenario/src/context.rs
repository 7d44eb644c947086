use std::collections::{BTreeMap, BTreeSet};

use trellis_expr::{Expr, qualified_name};

use crate::{
    AnchorRef, AnchorValue, Channel, Container, Field, INTERNAL_SUFFIX, NodeId, Warning,
};

/// One edge's value arriving at a node.
#[derive(Clone, Debug, PartialEq)]
pub struct Contribution {
    pub from: AnchorRef,
    /// Anchor id on the receiving node.
    pub target: String,
    /// Container of the producing anchor.
    pub container: Option<Container>,
    pub value: AnchorValue,
}

/// Everything that arrived at one channel of a node, plus one resolved expression per field.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChannelContext {
    contributions: Vec<Contribution>,
    resolved: BTreeMap<Field, Expr>,
}

impl ChannelContext {
    /// Pick, per field, the contribution with the best-ranked source. Ties keep edge order.
    pub fn resolve(channel: Channel, contributions: Vec<Contribution>) -> Self {
        let mut best: BTreeMap<Field, (u8, &Expr)> = BTreeMap::new();
        for contribution in &contributions {
            for (field, expr) in &contribution.value.fields {
                let rank = contribution.value.source.rank(*field, channel.is_positional());
                match best.get(field) {
                    Some((current, _)) if *current <= rank => {}
                    _ => {
                        best.insert(*field, (rank, expr));
                    }
                }
            }
        }
        let resolved = best
            .into_iter()
            .map(|(field, (_, expr))| (field, expr.clone()))
            .collect();
        Self {
            contributions,
            resolved,
        }
    }

    pub fn contributions(&self) -> &[Contribution] {
        &self.contributions
    }

    pub fn resolved(&self) -> &BTreeMap<Field, Expr> {
        &self.resolved
    }

    pub fn get(&self, field: Field) -> Option<&Expr> {
        self.resolved.get(&field)
    }

    pub fn value(&self) -> Option<&Expr> {
        self.get(Field::Value)
    }

    /// Whether any contribution bounds the channel (a range or a discrete set).
    pub fn has_bounds(&self) -> bool {
        self.contributions.iter().any(|c| bound_of(c).is_some())
    }

    /// Wrap `expr` so it honours every bounding contribution: ranges clamp, sets snap to the
    /// nearest candidate.
    pub fn constrain(&self, expr: Expr) -> Expr {
        self.contributions
            .iter()
            .filter_map(bound_of)
            .fold(expr, |acc, bound| match bound {
                Bound::Range(start, stop) => Expr::clamp(acc, start.clone(), stop.clone()),
                Bound::Set(values) => Expr::nearest(acc, values.clone()),
            })
    }
}

enum Bound<'a> {
    Range(&'a Expr, &'a Expr),
    Set(&'a Expr),
}

fn bound_of(contribution: &Contribution) -> Option<Bound<'_>> {
    let value = &contribution.value;
    match contribution.container? {
        Container::Range => Some(Bound::Range(
            value.get(Field::Start)?,
            value.get(Field::Stop)?,
        )),
        Container::Set => value.get(Field::Values).map(Bound::Set),
        Container::Scalar => None,
    }
}

/// A configuration transform with the producing node substituted in.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledTransform {
    pub name: String,
    pub channel: Channel,
    pub expr: Expr,
}

/// The resolved inputs of one node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstraintContext {
    /// Values arriving at public anchors. Channels with no edges are absent.
    pub channels: BTreeMap<Channel, ChannelContext>,
    /// Values arriving at shadow anchors; only nodes taking part in a resolved cycle have any.
    pub internal: BTreeMap<Channel, ChannelContext>,
    pub transforms: Vec<CompiledTransform>,
    /// Anchor ids of this node that feed a mediator through a shadow anchor.
    pub shadows: BTreeSet<String>,
}

impl ConstraintContext {
    pub fn channel(&self, channel: Channel) -> Option<&ChannelContext> {
        self.channels.get(&channel)
    }

    pub fn internal(&self, channel: Channel) -> Option<&ChannelContext> {
        self.internal.get(&channel)
    }

    pub fn is_shadowed(&self, anchor: &str) -> bool {
        self.shadows.contains(anchor)
    }

    /// Shadowed anchor carrying `channel`, if any.
    pub fn shadow_for(&self, channel: Channel) -> Option<&str> {
        self.shadows
            .iter()
            .find(|anchor| Channel::extract(anchor) == Some(channel))
            .map(String::as_str)
    }
}

/// Handed to a component's compile routine.
pub struct CompileContext<'a> {
    node: &'a NodeId,
    constraints: &'a ConstraintContext,
    peers: &'a BTreeMap<NodeId, ConstraintContext>,
    diagnostics: Vec<Warning>,
}

impl<'a> CompileContext<'a> {
    pub fn new(
        node: &'a NodeId,
        constraints: &'a ConstraintContext,
        peers: &'a BTreeMap<NodeId, ConstraintContext>,
    ) -> Self {
        Self {
            node,
            constraints,
            peers,
            diagnostics: Vec::new(),
        }
    }

    pub fn node(&self) -> &NodeId {
        self.node
    }

    pub fn constraints(&self) -> &ConstraintContext {
        self.constraints
    }

    pub fn channel(&self, channel: Channel) -> Option<&ChannelContext> {
        self.constraints.channel(channel)
    }

    /// Context of a node compiled earlier in the same compilation.
    pub fn peer(&self, node: &NodeId) -> Option<&ConstraintContext> {
        self.peers.get(node)
    }

    /// `<node>_<suffix>`
    pub fn signal(&self, suffix: &str) -> String {
        qualified_name(self.node.as_str(), Some(suffix))
    }

    /// `<node>_<suffix>_internal`
    pub fn internal_signal(&self, suffix: &str) -> String {
        format!("{}{INTERNAL_SUFFIX}", self.signal(suffix))
    }

    pub fn warn(&mut self, warning: Warning) {
        self.diagnostics.push(warning);
    }

    pub fn into_diagnostics(self) -> Vec<Warning> {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ValueSource;

    fn contribution(
        from: &str,
        container: Container,
        source: ValueSource,
        fields: &[(Field, &str)],
    ) -> Contribution {
        let mut value = AnchorValue::new(source);
        for (field, expr) in fields {
            value = value.with(*field, Expr::parse(expr).unwrap());
        }
        Contribution {
            from: AnchorRef::new(from, "x"),
            target: "x".to_string(),
            container: Some(container),
            value,
        }
    }

    #[test]
    fn resolves_each_field_by_source_priority() {
        let ctx = ChannelContext::resolve(
            Channel::X,
            vec![
                contribution(
                    "gen",
                    Container::Scalar,
                    ValueSource::Generated,
                    &[(Field::Value, "gen_x"), (Field::Scale, "'gen'")],
                ),
                contribution(
                    "live",
                    Container::Scalar,
                    ValueSource::Context,
                    &[(Field::Value, "live_x"), (Field::Scale, "'live'")],
                ),
            ],
        );
        assert_eq!(ctx.value().unwrap().to_string(), "live_x");
        assert_eq!(ctx.get(Field::Scale).unwrap().to_string(), "\"gen\"");

        let ctx = ChannelContext::resolve(
            Channel::Color,
            vec![
                contribution(
                    "live",
                    Container::Scalar,
                    ValueSource::Context,
                    &[(Field::Value, "live_c")],
                ),
                contribution(
                    "gen",
                    Container::Scalar,
                    ValueSource::Generated,
                    &[(Field::Value, "gen_c")],
                ),
            ],
        );
        assert_eq!(ctx.value().unwrap().to_string(), "gen_c");
    }

    #[test]
    fn ties_keep_edge_order() {
        let ctx = ChannelContext::resolve(
            Channel::Y,
            vec![
                contribution("a", Container::Scalar, ValueSource::Encoding, &[(Field::Value, "a_y")]),
                contribution("b", Container::Scalar, ValueSource::Encoding, &[(Field::Value, "b_y")]),
            ],
        );
        assert_eq!(ctx.value().unwrap().to_string(), "a_y");
    }

    #[test]
    fn constrain_wraps_ranges_and_sets() {
        let ctx = ChannelContext::resolve(
            Channel::X,
            vec![
                contribution(
                    "brush",
                    Container::Range,
                    ValueSource::Context,
                    &[(Field::Start, "brush_x_start"), (Field::Stop, "brush_x_stop")],
                ),
                contribution(
                    "ticks",
                    Container::Set,
                    ValueSource::Generated,
                    &[(Field::Values, "[0, 10, 20]")],
                ),
                contribution("plain", Container::Scalar, ValueSource::Encoding, &[]),
            ],
        );
        assert!(ctx.has_bounds());
        assert_eq!(
            ctx.constrain(Expr::ident("h_x")).to_string(),
            "nearest(clamp(h_x, brush_x_start, brush_x_stop), [0, 10, 20])"
        );
        assert_eq!(ChannelContext::default().constrain(Expr::ident("h_x")).to_string(), "h_x");
    }
}
