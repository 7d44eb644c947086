use std::sync::Arc;

use serde_json::Value;
use trellis_expr::{Expr, qualified_name};
use trellis_scenario::{
    AnchorDecl, AnchorValue, Channel, CompileComponent, CompileContext, Component, EventRef,
    Field, Fragment, INTERNAL_SUFFIX, NodeId, Parameter, SchemaType, UpdateRule, ValueSource,
    Warning,
};

use super::MEDIATOR_KIND;

/// One node of a resolved cycle and the anchor the cycle fed into it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Participant {
    pub node: NodeId,
    pub anchor: String,
}

impl Participant {
    /// `<node>_<anchor>_internal`, the signal the participant's shadow anchor carries.
    pub fn shadow_signal(&self) -> String {
        format!(
            "{}{INTERNAL_SUFFIX}",
            qualified_name(self.node.as_str(), Some(&self.anchor))
        )
    }
}

/// `merged_<channel>_<sorted participant ids joined by _>`
///
/// Different participant sets can spell the same id (`a_b` + `c` and `a` + `b_c`); callers
/// disambiguate against the components that already exist.
pub fn mediator_id(channel: Channel, participants: &[Participant]) -> NodeId {
    let mut nodes: Vec<&str> = participants.iter().map(|p| p.node.as_str()).collect();
    nodes.sort_unstable();
    nodes.dedup();
    NodeId::from(format!("merged_{channel}_{}", nodes.join("_")))
}

/// Build the component that owns the agreed value of a cycle's channel.
///
/// It exposes the channel anchor `c`, which every participant reads back, plus a view anchor
/// `c_<node>` per participant carrying that participant's shadow signal.
pub fn build(
    id: NodeId,
    channel: Channel,
    schema: SchemaType,
    participants: Vec<Participant>,
) -> Result<Component, trellis_scenario::Error> {
    let c = channel.as_str();

    let shared = AnchorValue::new(ValueSource::Context).with(
        Field::Value,
        Expr::ident(qualified_name(id.as_str(), Some(c))),
    );
    let mut anchors = vec![AnchorDecl::constant(c, schema, shared)];
    for participant in &participants {
        let view = AnchorValue::new(ValueSource::Context)
            .with(Field::Value, Expr::ident(participant.shadow_signal()));
        anchors.push(AnchorDecl::constant(
            format!("{c}_{}", participant.node),
            schema,
            view,
        ));
    }

    Component::builder()
        .id(id)
        .kind(MEDIATOR_KIND)
        .channels([(channel, schema)].into())
        .anchors(anchors)
        .behaviour(Arc::new(Mediator {
            channel,
            participants,
        }))
        .build()
}

struct Mediator {
    channel: Channel,
    participants: Vec<Participant>,
}

impl CompileComponent for Mediator {
    fn compile(&self, component: &Component, ctx: &mut CompileContext<'_>) -> Fragment {
        let mut missing = Vec::new();
        for participant in &self.participants {
            if ctx.peer(&participant.node).is_none() {
                missing.push(participant.node.clone());
            }
        }

        let mut parameter = Parameter::new(ctx.signal(self.channel.as_str()), Value::Null);
        for participant in &self.participants {
            let shadow = participant.shadow_signal();
            let update = self
                .participants
                .iter()
                .filter(|other| other.node != participant.node)
                .filter_map(|other| ctx.peer(&other.node))
                .filter_map(|peer| peer.internal(self.channel))
                .fold(Expr::ident(shadow.as_str()), |acc, inputs| {
                    inputs.constrain(acc)
                });
            parameter
                .on
                .push(UpdateRule::new(vec![EventRef::new(shadow)], update));
        }

        for participant in missing {
            ctx.warn(Warning::MissingPeerContext {
                mediator: component.id().clone(),
                participant,
            });
        }
        Fragment::default().with_parameter(parameter)
    }
}
