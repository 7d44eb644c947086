use std::{collections::HashMap, fmt::Write as _};

use trellis_scenario::{BindingGraph, NodeId};

use super::{Reporter, ReporterError};
use crate::{CompileOutput, passes::MEDIATOR_KIND};

#[derive(Clone, Copy, Debug, Default)]
pub struct DotReporter;

impl Reporter for DotReporter {
    type Artifact = String;

    fn emit(&self, output: &CompileOutput) -> Result<Self::Artifact, ReporterError> {
        Ok(render_dot(&output.graph))
    }
}

/// Render a binding graph as a Graphviz DOT diagram.
///
/// The root is drawn with a heavy border, mediators as diamonds and compiler-added edges dashed.
pub fn render_dot(graph: &BindingGraph) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph bindings {{");
    let _ = writeln!(out, "  rankdir=LR;");

    let mut index: HashMap<&NodeId, usize> = HashMap::new();
    for (i, node) in graph.nodes().iter().enumerate() {
        index.insert(&node.id, i);

        write_indent(&mut out, 1);
        let _ = write!(out, "n{i} [label=\"");
        write_escaped_label(&mut out, node.id.as_str());
        if node.kind != MEDIATOR_KIND {
            let _ = write!(out, "\\n");
            write_escaped_label(&mut out, &node.kind);
        }
        let _ = write!(out, "\"");
        if node.kind == MEDIATOR_KIND {
            let _ = write!(out, ", shape=diamond");
        } else {
            let _ = write!(out, ", shape=box");
        }
        if node.id == graph.root {
            let _ = write!(out, ", penwidth=2");
        }
        let _ = writeln!(out, "];");
    }

    for edge in graph.edges() {
        let (Some(from), Some(to)) = (index.get(&edge.source.node), index.get(&edge.target.node))
        else {
            continue;
        };
        write_indent(&mut out, 1);
        let _ = write!(out, "n{from} -> n{to} [label=\"");
        write_escaped_label(&mut out, &edge.source.anchor);
        let _ = write!(out, " -> ");
        write_escaped_label(&mut out, &edge.target.anchor);
        if edge.implicit {
            let _ = writeln!(out, "\", style=dashed];");
        } else {
            let _ = writeln!(out, "\"];");
        }
    }

    let _ = writeln!(out, "}}");
    out
}

fn write_indent(out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push_str("  ");
    }
}

fn write_escaped_label(out: &mut String, label: &str) {
    for ch in label.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
}
