//! Authoring documents: json5 files declaring components and the bindings between them.
//!
//! A document validates into a [`Session`]; each declared component compiles through a
//! [`DeclaredComponent`] that fills in its fragment templates from the resolved channels.

mod declared;
mod document;
mod error;
mod raw;
pub mod template;
#[cfg(test)]
mod tests;

use std::sync::Arc;

pub use declared::{DeclaredComponent, DeclaredParameter, DeclaredRule};
pub use document::{DocumentError, ParsedDocument};
pub use error::Error;
pub use raw::{
    RawAnchor, RawBinding, RawComponent, RawDocument, RawParameter, RawRule, parse_endpoint,
};
use trellis_scenario::{NodeId, Session};

/// Everything a document declares, registered and ready to compile.
#[derive(Clone, Debug)]
pub struct Document {
    /// Default compilation root.
    pub root: Option<NodeId>,
    pub session: Session,
}

/// Parse and validate a document held in memory.
pub fn parse(name: impl AsRef<str>, source: impl Into<Arc<str>>) -> Result<Document, DocumentError> {
    ParsedDocument::parse_named(name, source.into()).map(|parsed| parsed.document)
}
