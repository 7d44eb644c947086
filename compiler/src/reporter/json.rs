use super::{Reporter, ReporterError};
use crate::CompileOutput;

/// The compiled document as pretty-printed JSON.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonReporter;

impl Reporter for JsonReporter {
    type Artifact = String;

    fn emit(&self, output: &CompileOutput) -> Result<Self::Artifact, ReporterError> {
        let mut out = serde_json::to_string_pretty(&output.document)?;
        out.push('\n');
        Ok(out)
    }
}
