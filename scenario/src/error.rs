use miette::Diagnostic;
use thiserror::Error;

use crate::NodeId;

#[derive(Clone, Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    #[error("unknown component `{id}`")]
    #[diagnostic(code(scenario::unknown_component))]
    UnknownComponent { id: NodeId },

    #[error("unknown anchor `{anchor}` on component `{component}`")]
    #[diagnostic(code(scenario::unknown_anchor))]
    UnknownAnchor { component: NodeId, anchor: String },

    #[error("group anchor `{group}` on `{component}` contains group `{child}`")]
    #[diagnostic(
        code(scenario::nested_group),
        help("groups must be flat; list the anchors of `{child}` directly")
    )]
    NestedGroup {
        component: NodeId,
        group: String,
        child: String,
    },

    #[error("anchor `{anchor}` is declared more than once on `{component}`")]
    #[diagnostic(code(scenario::duplicate_anchor))]
    DuplicateAnchor { component: NodeId, anchor: String },

    #[error(
        "component `{component}` declares more than one default configuration (`{first}` and \
         `{second}`)"
    )]
    #[diagnostic(code(scenario::multiple_default_configurations))]
    MultipleDefaultConfigurations {
        component: NodeId,
        first: String,
        second: String,
    },

    #[error("component `{id}` is already registered")]
    #[diagnostic(code(scenario::duplicate_component))]
    DuplicateComponent { id: NodeId },

    #[error("unknown channel `{0}`")]
    #[diagnostic(
        code(scenario::unknown_channel),
        help("known channels: x, y, color, size, shape, opacity, angle, radius, data, text")
    )]
    UnknownChannel(String),
}
