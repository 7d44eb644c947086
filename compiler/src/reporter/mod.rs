use miette::Diagnostic;
use thiserror::Error;

use crate::CompileOutput;

pub mod dot;
pub mod json;

pub use dot::DotReporter;
pub use json::JsonReporter;

#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum ReporterError {
    #[error("failed to serialize the document")]
    #[diagnostic(code(reporter::serialize))]
    Serialize(#[from] serde_json::Error),
}

pub trait Reporter {
    type Artifact;

    fn emit(&self, output: &CompileOutput) -> Result<Self::Artifact, ReporterError>;
}
