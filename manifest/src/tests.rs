use miette::Diagnostic;
use serde_json::json;
use trellis_compiler::{CompileOptions, Compiler};
use trellis_scenario::{AnchorRef, Channel, Warning};

use super::*;

const SLIDER: &str = r#"
// a draggable dot constrained by an axis range
{
  root: "dot",
  components: {
    axis: {
      kind: "axis",
      anchors: {
        x: { container: "range", type: "numeric", start: 0, stop: "width" },
      },
    },
    dot: {
      kind: "point",
      anchors: {
        x: { container: "scalar", type: "numeric", source: "context" },
        position: { group: ["x"] },
      },
      parameters: [
        {
          name: "x",
          value: 0,
          channel: "x",
          on: [{ events: ["BASE_NAME_drag"], update: "BASE_NAME_drag.x" }],
        },
        { name: "drag" },
        { name: "size", channel: "size" },
      ],
      mark: { type: "circle" },
      encoding: {
        x: { $signal: "x" },
        size: { $channel: "size", default: 30 },
      },
      properties: { width: 300 },
    },
  },
  bindings: [{ from: "axis.x", to: "dot.x" }],
}
"#;

fn handle(id: &str) -> String {
    format!(
        r#"{id}: {{
      kind: "handle",
      anchors: {{ x: {{ container: "scalar", type: "numeric", source: "context" }} }},
      parameters: [
        {{ name: "x", value: 0, channel: "x", on: [{{ events: ["BASE_NAME_drag"], update: "BASE_NAME_drag.x" }}] }},
        {{ name: "drag" }},
      ],
      mark: "circle",
      encoding: {{ x: {{ $signal: "x" }} }},
    }}"#
    )
}

fn parse_err(source: &str) -> DocumentError {
    parse("test.json5", source).unwrap_err()
}

fn code(err: &DocumentError) -> String {
    err.code().map(|c| c.to_string()).unwrap_or_default()
}

#[test]
fn document_registers_components_and_bindings() {
    let document = parse("slider.json5", SLIDER).unwrap();
    assert_eq!(document.root.as_ref().map(|r| r.as_str()), Some("dot"));

    let session = &document.session;
    let dot = session.component("dot").unwrap();
    assert_eq!(dot.kind(), "point");
    assert_eq!(dot.find_anchor("position").unwrap().group_children(), ["x"]);
    let axis = session.component("axis").unwrap();
    assert_eq!(axis.anchor("x").unwrap().channel(), Some(Channel::X));
    assert_eq!(session.bindings()[0].source, AnchorRef::new("axis", "x"));
}

#[test]
fn declared_component_compiles_against_its_bindings() {
    let document = parse("slider.json5", SLIDER).unwrap();
    let output = Compiler::new(&document.session).compile("dot").unwrap();

    let x = output.document.parameter("dot_x").unwrap();
    assert_eq!(x.value.as_f64(), Some(0.0));
    assert_eq!(x.on.len(), 1);
    assert_eq!(x.on[0].events[0].signal, "dot_drag");
    assert_eq!(x.on[0].update.to_string(), "clamp(dot_drag.x, 0, width)");
    assert!(output.document.parameter("dot_drag").is_some());
    assert!(output.document.parameter("dot_size").is_none());

    assert_eq!(
        output.diagnostics,
        [Warning::MissingConstraint {
            component: "dot".into(),
            parameter: "size".to_string(),
            channel: Channel::Size,
        }]
    );
    let encoding = output.document.encoding.as_ref().unwrap();
    assert_eq!(encoding["x"], json!({ "signal": "dot_x" }));
    assert_eq!(encoding["size"].as_f64(), Some(30.0));
    assert_eq!(output.document.extra["width"].as_f64(), Some(300.0));
}

#[test]
fn synced_handles_write_shadow_state() {
    let source = format!(
        "{{ components: {{ {}, {} }}, bindings: [{{ from: 'a.x', to: 'b.x', sync: true }}] }}",
        handle("a"),
        handle("b")
    );
    let document = parse("sync.json5", source).unwrap();
    let options = CompileOptions {
        eliminate_dead_parameters: false,
        ..CompileOptions::default()
    };
    let output = Compiler::with_options(&document.session, options)
        .compile("a")
        .unwrap();
    assert_eq!(output.cycles.len(), 1);

    let state = output.document.parameter("a_x_internal").unwrap();
    let updates: Vec<String> = state.on.iter().map(|r| r.update.to_string()).collect();
    assert_eq!(updates, ["a_drag.x"]);

    let public = output.document.parameter("b_x").unwrap();
    assert_eq!(public.on.len(), 1);
    assert_eq!(public.on[0].events[0].signal, "merged_x_a_b_x");

    let mediator = output.document.parameter("merged_x_a_b_x").unwrap();
    let events: Vec<&str> = mediator
        .on
        .iter()
        .map(|r| r.events[0].signal.as_str())
        .collect();
    assert_eq!(events, ["a_x_internal", "b_x_internal"]);
}

#[test]
fn syntax_errors_point_into_the_source() {
    let err = parse_err("{ components: { a: { kind: \"x\" }, }");
    assert!(matches!(err.kind, Error::Json5(_)));
    assert_eq!(code(&err), "manifest::json5_error");
    assert!(err.to_string().starts_with("json5 parse error"));
    assert_eq!(err.labels().map(Iterator::count), Some(1));
}

#[test]
fn shape_errors_carry_the_document_path() {
    let err = parse_err(
        r#"{ components: { h: { kind: "handle", anchors: { x: { colour: "red" } } } } }"#,
    );
    assert!(matches!(err.kind, Error::Json5Path(_)));
    assert_eq!(code(&err), "manifest::deserialize_error");
    assert!(
        err.to_string().contains("components.h.anchors.x"),
        "unexpected message: {err}"
    );

    let err = parse_err(r#"{ components: { a: { kind: "p" }, a: { kind: "q" } } }"#);
    assert!(matches!(err.kind, Error::Json5Path(_)));
}

#[test]
fn anchors_need_a_schema_or_a_group() {
    let err = parse_err(
        r#"{ components: { h: { kind: "handle", anchors: { x: { type: "numeric" } } } } }"#,
    );
    assert!(matches!(
        err.kind,
        Error::IncompleteAnchor { ref component, ref anchor } if component == "h" && anchor == "x"
    ));
    let label = err.labels().and_then(|mut labels| labels.next()).unwrap();
    assert_eq!(label.offset(), 48);

    let err = parse_err(
        r#"{ components: { h: { kind: "handle", anchors: { p: { group: ["x"], value: "1" } } } } }"#,
    );
    assert!(matches!(err.kind, Error::MixedAnchor { .. }));
}

#[test]
fn validation_errors_are_reported() {
    let err = parse_err(r#"{ root: "nowhere", components: {} }"#);
    assert!(matches!(err.kind, Error::UnknownRoot { ref root } if root == "nowhere"));

    let err = parse_err(
        r#"{ components: { h: { kind: "handle", parameters: [{ name: "x" }, { name: "x" }] } } }"#,
    );
    assert!(matches!(err.kind, Error::DuplicateParameter { .. }));

    let err = parse_err(r#"{ components: { h: { kind: "handle", mark: { $signal: 1 } } } }"#);
    assert!(matches!(err.kind, Error::InvalidTemplate { field: "mark", .. }));

    let err = parse_err(r#"{ components: {}, bindings: [{ from: "a.", to: "b.x" }] }"#);
    assert_eq!(code(&err), "manifest::invalid_binding");

    let err = parse_err(
        r#"{ components: { h: { kind: "handle", anchors: { x: { container: "scalar", type: "numeric", value: "1 +" } } } } }"#,
    );
    assert!(matches!(err.kind, Error::Json5Path(_)));
}

#[test]
fn endpoints_without_an_anchor_are_wildcards() {
    assert!(parse_endpoint("chart").unwrap().is_wildcard());
    assert_eq!(parse_endpoint("chart.x_start").unwrap(), AnchorRef::new("chart", "x_start"));
    assert!(parse_endpoint("").is_err());
    assert!(parse_endpoint(".x").is_err());
}

#[test]
fn group_bindings_reach_child_anchors() {
    let source = SLIDER.replace(r#"to: "dot.x""#, r#"to: "dot.position""#);
    let document = parse("slider.json5", source).unwrap();
    let analysis = Compiler::new(&document.session).check("dot").unwrap();
    let keys: Vec<String> = analysis.graph.edges().iter().map(|e| e.key()).collect();
    assert_eq!(keys, ["axis:x->dot:x"]);
}

#[test]
fn configuration_transforms_publish_node_signals() {
    let source = SLIDER.replace(
        r#"kind: "point","#,
        r#"kind: "point",
      configurations: [{
        id: "interval",
        schema: { x: { container: "range", type: "numeric" } },
        transforms: [{ name: "x_start", channel: "x", value: "BASE_NAME_x[0]" }],
      }],"#,
    );
    let document = parse("slider.json5", source).unwrap();
    let options = CompileOptions {
        eliminate_dead_parameters: false,
        ..CompileOptions::default()
    };
    let output = Compiler::with_options(&document.session, options)
        .compile("dot")
        .unwrap();

    let start = output.document.parameter("dot_x_start").unwrap();
    assert!(start.value.is_null());
    assert_eq!(start.on.len(), 1);
    assert_eq!(start.on[0].events[0].signal, "dot_x");
    assert_eq!(start.on[0].update.to_string(), "dot_x[0]");
}
