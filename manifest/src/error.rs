use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    #[error("{0}")]
    #[diagnostic(code(manifest::json5_error))]
    Json5(json5::Error),

    #[error("{}", .0.inner())]
    #[diagnostic(code(manifest::deserialize_error))]
    Json5Path(serde_path_to_error::Error<json5::Error>),

    #[error("io error: {0}")]
    #[diagnostic(code(manifest::io_error))]
    Io(#[from] std::io::Error),

    #[error("invalid binding endpoint `{input}`: {message}")]
    #[diagnostic(
        code(manifest::invalid_binding),
        help("write endpoints as `component.anchor`, or a bare `component` for every anchor")
    )]
    InvalidBinding { input: String, message: &'static str },

    #[error("anchor `{anchor}` on `{component}` needs both `container` and `type`")]
    #[diagnostic(
        code(manifest::incomplete_anchor),
        help("declare `group: [...]` instead if the anchor only bundles other anchors")
    )]
    IncompleteAnchor { component: String, anchor: String },

    #[error("anchor `{anchor}` on `{component}` mixes `group` with single-anchor fields")]
    #[diagnostic(code(manifest::mixed_anchor))]
    MixedAnchor { component: String, anchor: String },

    #[error("parameter `{parameter}` is declared more than once on `{component}`")]
    #[diagnostic(code(manifest::duplicate_parameter))]
    DuplicateParameter { component: String, parameter: String },

    #[error("invalid `{field}` template on `{component}`: {message}")]
    #[diagnostic(code(manifest::invalid_template))]
    InvalidTemplate {
        component: String,
        field: &'static str,
        message: String,
    },

    #[error("root `{root}` is not a declared component")]
    #[diagnostic(code(manifest::unknown_root))]
    UnknownRoot { root: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Scenario(#[from] trellis_scenario::Error),
}

impl Error {
    /// Document key the error is about, used to place a label in the source.
    pub(crate) fn key(&self) -> Option<&str> {
        match self {
            Error::InvalidBinding { input, .. } => Some(input),
            Error::IncompleteAnchor { anchor, .. } | Error::MixedAnchor { anchor, .. } => {
                Some(anchor)
            }
            Error::DuplicateParameter { parameter, .. } => Some(parameter),
            Error::InvalidTemplate { component, .. } => Some(component),
            Error::UnknownRoot { root } => Some(root),
            _ => None,
        }
    }
}
