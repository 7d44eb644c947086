#![allow(clippy::result_large_err)]

use std::{path::Path, sync::Arc};

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceCode, SourceSpan};
use serde_path_to_error::Segment;
use thiserror::Error;

use crate::{Document, Error, RawDocument};

/// A validated document together with the text it came from.
#[derive(Clone, Debug)]
pub struct ParsedDocument {
    pub document: Document,
    pub source: Arc<str>,
}

/// A document error rendered against its source text.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DocumentError {
    pub kind: Error,
    message: String,
    src: NamedSource<Arc<str>>,
    labels: Vec<LabeledSpan>,
}

impl DocumentError {
    pub fn new(name: impl AsRef<str>, source: Arc<str>, kind: Error) -> Self {
        let src = NamedSource::new(name, Arc::clone(&source)).with_language("json5");
        let message = message_for(&kind);
        let labels = labels_for(&kind, &source);
        Self {
            kind,
            message,
            src,
            labels,
        }
    }
}

impl Diagnostic for DocumentError {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        self.kind.code()
    }

    fn severity(&self) -> Option<miette::Severity> {
        self.kind.severity()
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        self.kind.help()
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        Some(&self.src)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        (!self.labels.is_empty()).then(|| Box::new(self.labels.iter().cloned()) as _)
    }

    fn diagnostic_source(&self) -> Option<&dyn Diagnostic> {
        self.kind.diagnostic_source()
    }
}

impl ParsedDocument {
    pub fn parse_named(name: impl AsRef<str>, source: Arc<str>) -> Result<Self, DocumentError> {
        let mut deserializer = json5::Deserializer::from_str(&source);
        let raw: RawDocument =
            serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
                let kind = match e.inner().code() {
                    Some(code) if json5_error_is_parse(code) => Error::Json5(e.into_inner()),
                    _ => Error::Json5Path(e),
                };
                DocumentError::new(name.as_ref(), Arc::clone(&source), kind)
            })?;

        let document = raw
            .validate()
            .map_err(|e| DocumentError::new(name.as_ref(), Arc::clone(&source), e))?;

        Ok(Self { document, source })
    }

    pub fn parse_file(path: &Path) -> Result<Self, DocumentError> {
        let name = path.display().to_string();
        let source: Arc<str> = std::fs::read_to_string(path)
            .map_err(|e| DocumentError::new(&name, Arc::from(""), Error::Io(e)))?
            .into();
        Self::parse_named(name, source)
    }
}

fn json5_error_is_parse(code: json5::ErrorCode) -> bool {
    use json5::ErrorCode::*;

    matches!(
        code,
        EofParsingArray
            | EofParsingBool
            | EofParsingComment
            | EofParsingEscapeSequence
            | EofParsingIdentifier
            | EofParsingNull
            | EofParsingNumber
            | EofParsingObject
            | EofParsingString
            | EofParsingValue
            | ExpectedClosingBrace
            | ExpectedClosingBracket
            | ExpectedColon
            | ExpectedComma
            | ExpectedComment
            | ExpectedIdentifier
            | ExpectedValue
            | InvalidBytes
            | InvalidEscapeSequence
            | InvalidKey
            | LeadingZero
            | LineTerminatorInString
            | OverflowParsingNumber
            | TrailingCharacters
    )
}

fn message_for(err: &Error) -> String {
    match err {
        Error::Json5(parse) => format!("json5 parse error: {parse}"),
        Error::Json5Path(de) => {
            format!("json5 deserialize error at {}: {}", de.path(), de.inner())
        }
        other => other.to_string(),
    }
}

fn labels_for(err: &Error, source: &str) -> Vec<LabeledSpan> {
    let (span, label) = match err {
        Error::Json5(parse) => (span_for_json5_error(source, parse), parse.to_string()),
        Error::Json5Path(de) => {
            let span = last_key(de.path())
                .and_then(|key| span_for_key(source, key))
                .unwrap_or_else(|| span_for_json5_error(source, de.inner()));
            (span, de.inner().to_string())
        }
        other => match other.key().and_then(|key| span_for_key(source, key)) {
            Some(span) => (span, other.to_string()),
            None => return Vec::new(),
        },
    };
    vec![LabeledSpan::new_primary_with_span(Some(label), span)]
}

fn last_key(path: &serde_path_to_error::Path) -> Option<&str> {
    path.iter().rev().find_map(|segment| match segment {
        Segment::Map { key } => Some(key.as_str()),
        _ => None,
    })
}

fn span_for_json5_error(source: &str, err: &json5::Error) -> SourceSpan {
    let Some(position) = err.position() else {
        return (source.len(), 0).into();
    };
    span_for_line_col(source, position.line + 1, position.column + 1)
}

/// First occurrence of `key` as an object key or string literal, quoted or bare.
fn span_for_key(source: &str, key: &str) -> Option<SourceSpan> {
    if key.is_empty() {
        return None;
    }
    source.match_indices(key).find_map(|(start, _)| {
        let end = start + key.len();
        let before = source[..start].chars().next_back();
        let after = source[end..].chars().next();
        let quoted = matches!(before, Some('"' | '\'')) && before == after;
        let bare = !before.is_some_and(is_key_char)
            && !after.is_some_and(is_key_char)
            && source[end..].trim_start().starts_with(':');
        (quoted || bare).then(|| (start, key.len()).into())
    })
}

fn is_key_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '"' | '\'' | '.')
}

fn span_for_line_col(source: &str, line: usize, column: usize) -> SourceSpan {
    let line_start: usize = source
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    let line_text = source[line_start..].lines().next().unwrap_or_default();
    let offset = line_text
        .char_indices()
        .nth(column.saturating_sub(1))
        .map_or(line_start + line_text.len(), |(rel, _)| line_start + rel);
    let len = source[offset..].chars().next().map_or(0, char::len_utf8);
    (offset, len).into()
}
