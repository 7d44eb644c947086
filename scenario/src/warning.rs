use miette::Diagnostic;
use thiserror::Error;

use crate::{Channel, NodeId};

/// Recoverable problems found while compiling; compilation continues with a partial document.
#[derive(Clone, Debug, PartialEq, Eq, Error, Diagnostic)]
#[non_exhaustive]
pub enum Warning {
    #[error("parameter `{parameter}` on `{component}` skipped: nothing resolves channel `{channel}`")]
    #[diagnostic(
        code(compiler::missing_constraint),
        severity(Warning),
        help("bind an anchor into `{component}.{channel}` or give the parameter update rules")
    )]
    MissingConstraint {
        component: NodeId,
        parameter: String,
        channel: Channel,
    },

    #[error("cycle through {nodes} was left unresolved: its anchors carry no known channel")]
    #[diagnostic(code(compiler::unclassified_cycle), severity(Warning))]
    UnclassifiedCycle { nodes: String },

    #[error("mediator `{mediator}` has no context for participant `{participant}`")]
    #[diagnostic(code(compiler::missing_peer_context), severity(Warning))]
    MissingPeerContext {
        mediator: NodeId,
        participant: NodeId,
    },
}
