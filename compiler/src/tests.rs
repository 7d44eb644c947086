use std::sync::Arc;

use serde_json::{Map, Value, json};
use trellis_expr::Expr;
use trellis_scenario::{
    AnchorDecl, AnchorRef, AnchorValue, CompileContext, Component, Configuration, Field,
    Fragment, Parameter, SchemaType, Session, UpdateRule, ValueSource, ValueType, Warning,
    graph::detect_cycles,
};

use super::*;

pub(crate) fn numeric() -> SchemaType {
    SchemaType::scalar(ValueType::Numeric)
}

/// Draws a point and publishes one parameter per channel anchor, following whatever value
/// resolves into that channel.
pub(crate) fn point(component: &Component, ctx: &mut CompileContext<'_>) -> Fragment {
    let mut encoding = Map::new();
    let mut fragment = Fragment {
        mark: Some(json!("circle")),
        ..Fragment::default()
    };
    for anchor in component.anchors() {
        let Some(channel) = anchor.channel() else {
            continue;
        };
        let name = ctx.signal(&anchor.id().anchor);
        let mut parameter = Parameter::new(name.as_str(), json!(0));
        if let Some(rule) = ctx
            .channel(channel)
            .and_then(|c| c.value())
            .cloned()
            .and_then(UpdateRule::following)
        {
            parameter = parameter.with_rule(rule);
        }
        encoding.insert(channel.to_string(), json!({ "signal": name }));
        fragment = fragment.with_parameter(parameter);
    }
    fragment.encoding = Some(Value::Object(encoding));
    fragment
}

pub(crate) fn handle(id: &str, anchors: &[&str]) -> Component {
    Component::builder()
        .id(id)
        .kind("handle")
        .anchors(
            anchors
                .iter()
                .map(|a| AnchorDecl::signal(*a, numeric(), ValueSource::Context))
                .collect(),
        )
        .behaviour(Arc::new(point))
        .build()
        .unwrap()
}

pub(crate) fn anchor(path: &str) -> AnchorRef {
    let (node, anchor) = path.split_once('.').unwrap();
    AnchorRef::new(node, anchor)
}

pub(crate) fn session(components: Vec<Component>, bindings: &[(&str, &str)]) -> Session {
    let mut session = Session::new();
    for component in components {
        session.register(component).unwrap();
    }
    for (source, target) in bindings {
        session.bind(anchor(source), anchor(target));
    }
    session
}

fn keys(graph: &trellis_scenario::BindingGraph) -> Vec<String> {
    graph.edges().iter().map(|e| e.key()).collect()
}

fn parameter<'a>(output: &'a CompileOutput, name: &str) -> &'a Parameter {
    output
        .document
        .parameter(name)
        .unwrap_or_else(|| panic!("missing parameter `{name}`"))
}

fn updates(parameter: &Parameter) -> Vec<String> {
    parameter.on.iter().map(|rule| rule.update.to_string()).collect()
}

#[test]
fn acyclic_compilation_is_deterministic() {
    let session = session(
        vec![
            handle("a", &["x", "y"]),
            handle("b", &["x", "y"]),
            handle("c", &["x"]),
        ],
        &[("a.x", "b.x"), ("a.y", "b.y"), ("b.x", "c.x")],
    );
    let compiler = Compiler::new(&session);
    let first = compiler.compile("a").unwrap();
    let second = compiler.compile("a").unwrap();

    assert_eq!(
        serde_json::to_value(&first.document).unwrap(),
        serde_json::to_value(&second.document).unwrap()
    );
    assert_eq!(first.order, second.order);
    assert!(first.cycles.is_empty());
    assert_eq!(updates(parameter(&first, "c_x")), ["b_x"]);
}

#[test]
fn duplicate_bindings_become_one_edge() {
    let session = session(
        vec![handle("a", &["x"]), handle("b", &["x"])],
        &[("a.x", "b.x"), ("a.x", "b.x")],
    );
    assert_eq!(session.bindings().len(), 2);
    let analysis = Compiler::new(&session).check("a").unwrap();
    assert_eq!(keys(&analysis.graph), ["a:x->b:x"]);
}

#[test]
fn graph_reaches_components_that_only_provide() {
    let session = session(
        vec![
            handle("root", &["x"]),
            handle("source", &["x"]),
            handle("upstream", &["x"]),
            handle("unrelated", &["x"]),
        ],
        &[("source.x", "root.x"), ("upstream.x", "source.x")],
    );
    let graph = generate_binding_graph(&session, "root").unwrap();
    let mut nodes: Vec<&str> = graph.node_ids().map(|id| id.as_str()).collect();
    nodes.sort_unstable();
    assert_eq!(nodes, ["root", "source", "upstream"]);
}

#[test]
fn unknown_components_are_fatal() {
    let session = session(vec![handle("a", &["x"])], &[("a.x", "ghost.x")]);
    let err = Compiler::new(&session).compile("a").unwrap_err();
    assert!(matches!(
        err,
        Error::Scenario(trellis_scenario::Error::UnknownComponent { ref id }) if id.as_str() == "ghost"
    ));
    assert!(Compiler::new(&session).check("nobody").is_err());
}

#[test]
fn explicit_missing_anchors_are_fatal() {
    let session = session(
        vec![handle("a", &["x"]), handle("b", &["x"])],
        &[("a.z", "b.x")],
    );
    match Compiler::new(&session).check("a").unwrap_err() {
        Error::Pass(PassError::Failed { pass, source }) => {
            assert_eq!(pass, "expand");
            assert!(matches!(
                source,
                trellis_scenario::Error::UnknownAnchor { ref anchor, .. } if anchor == "z"
            ));
        }
        other => panic!("expected a pass error, got {other:?}"),
    }
}

#[test]
fn two_node_cycle_gets_one_mediator() {
    let session = session(
        vec![handle("a", &["x"]), handle("b", &["x"])],
        &[("a.x", "b.x"), ("b.x", "a.x")],
    );
    let output = Compiler::new(&session).compile("a").unwrap();

    assert_eq!(output.cycles.len(), 1);
    assert_eq!(output.mediators, [NodeId::from("merged_x_a_b")]);
    assert_eq!(
        keys(&output.graph),
        [
            "a:x_internal->merged_x_a_b:x",
            "merged_x_a_b:x->a:x",
            "b:x_internal->merged_x_a_b:x",
            "merged_x_a_b:x->b:x",
        ]
    );
    assert!(output.graph.edges().iter().all(|e| e.implicit));
    assert!(detect_cycles(output.graph.edges()).is_empty());

    let order: Vec<&str> = output.order.iter().map(NodeId::as_str).collect();
    assert_eq!(order, ["a", "b", "merged_x_a_b"]);

    assert_eq!(updates(parameter(&output, "a_x")), ["merged_x_a_b_x"]);
    assert_eq!(updates(parameter(&output, "b_x")), ["merged_x_a_b_x"]);
    let shared = parameter(&output, "merged_x_a_b_x");
    assert_eq!(updates(shared), ["a_x_internal", "b_x_internal"]);
    assert_eq!(shared.on[1].events[0].signal, "b_x_internal");
}

#[test]
fn mediator_applies_other_participants_constraints() {
    let bounds = Component::builder()
        .id("bounds")
        .kind("axis")
        .anchors(vec![AnchorDecl::constant(
            "x",
            SchemaType::range(ValueType::Numeric),
            AnchorValue::new(ValueSource::Generated)
                .with(Field::Start, Expr::number(0.0))
                .with(Field::Stop, Expr::ident("width")),
        )])
        .behaviour(Arc::new(point))
        .build()
        .unwrap();
    let session = session(
        vec![handle("a", &["x"]), handle("b", &["x"]), bounds],
        &[("a.x", "b.x"), ("b.x", "a.x"), ("bounds.x", "a.x")],
    );
    let output = Compiler::new(&session).compile("a").unwrap();

    assert!(
        keys(&output.graph).contains(&"bounds:x->a:x_internal".to_string()),
        "external input should feed the shadow anchor"
    );
    let shared = parameter(&output, "merged_x_a_b_x");
    assert_eq!(
        updates(shared),
        ["a_x_internal", "clamp(b_x_internal, 0, width)"]
    );
    assert!(output.diagnostics.is_empty());
}

#[test]
fn group_bindings_expand_per_child() {
    let grouped = |id: &str| {
        Component::builder()
            .id(id)
            .kind("handle")
            .anchors(vec![
                AnchorDecl::signal("x", numeric(), ValueSource::Context),
                AnchorDecl::signal("y", numeric(), ValueSource::Context),
                AnchorDecl::group("position", ["x", "y", "missing"]),
            ])
            .behaviour(Arc::new(point))
            .build()
            .unwrap()
    };
    let session = session(
        vec![grouped("a"), grouped("b")],
        &[("a.position", "b.position")],
    );
    let analysis = Compiler::new(&session).check("a").unwrap();
    assert_eq!(keys(&analysis.graph), ["a:x->b:x", "a:y->b:y"]);
}

#[test]
fn wildcards_use_the_default_configuration() {
    let configured = Component::builder()
        .id("w")
        .kind("handle")
        .configurations(vec![
            Configuration::builder()
                .id("point")
                .default(true)
                .schema([(trellis_scenario::Channel::X, numeric())].into())
                .build(),
        ])
        .anchors(vec![
            AnchorDecl::signal("x", numeric(), ValueSource::Context),
            AnchorDecl::signal("y", numeric(), ValueSource::Context),
        ])
        .behaviour(Arc::new(point))
        .build()
        .unwrap();
    let session = session(
        vec![configured, handle("v", &["x", "y"]), handle("u", &["x", "y"])],
        &[("w.*", "v.*"), ("v.*", "u.*")],
    );
    let options = CompileOptions {
        prune: false,
        ..CompileOptions::default()
    };
    let analysis = Compiler::with_options(&session, options).check("w").unwrap();
    let edges: Vec<(String, bool)> = analysis
        .graph
        .edges()
        .iter()
        .map(|e| (e.key(), e.implicit))
        .collect();
    assert_eq!(
        edges,
        [
            ("w:x->v:x".to_string(), true),
            ("v:x->u:x".to_string(), false),
            ("v:y->u:y".to_string(), false),
        ]
    );
}

#[test]
fn pruning_keeps_root_channels_and_always_on() {
    let session = session(
        vec![
            handle("r", &["x"]),
            handle("p", &["x", "y", "data"]),
            handle("q", &["y", "data", "text"]),
        ],
        &[
            ("r.x", "p.x"),
            ("p.y", "q.y"),
            ("p.data", "q.data"),
            ("p.data", "q.text"),
        ],
    );
    let analysis = Compiler::new(&session).check("r").unwrap();
    assert_eq!(keys(&analysis.graph), ["r:x->p:x", "p:data->q:data"]);

    let options = CompileOptions {
        prune: false,
        ..CompileOptions::default()
    };
    let unpruned = Compiler::with_options(&session, options).check("r").unwrap();
    assert_eq!(unpruned.graph.edges().len(), 4);
}

#[test]
fn positional_values_prefer_live_context() {
    let generated = Component::builder()
        .id("g")
        .kind("scale")
        .anchors(vec![
            AnchorDecl::signal("x", numeric(), ValueSource::Generated),
            AnchorDecl::signal("color", numeric(), ValueSource::Generated),
        ])
        .behaviour(Arc::new(point))
        .build()
        .unwrap();
    let session = session(
        vec![generated, handle("k", &["x", "color"]), handle("t", &["x", "color"])],
        &[
            ("g.x", "t.x"),
            ("k.x", "t.x"),
            ("g.color", "t.color"),
            ("k.color", "t.color"),
        ],
    );
    let output = Compiler::new(&session).compile("t").unwrap();
    assert_eq!(updates(parameter(&output, "t_x")), ["k_x"]);
    assert_eq!(updates(parameter(&output, "t_color")), ["g_color"]);
}

#[test]
fn parameters_are_hoisted_and_merged_by_name() {
    fn shares(component: &Component, ctx: &mut CompileContext<'_>) -> Fragment {
        let signal = ctx.signal("data");
        Fragment {
            mark: Some(json!(component.kind())),
            encoding: Some(json!({ "opacity": { "signal": "shared" } })),
            ..Fragment::default()
        }
        .with_parameter(
            Parameter::new("shared", json!(1))
                .with_rule(UpdateRule::new(
                    vec![trellis_scenario::EventRef::new(signal.as_str())],
                    Expr::ident(signal),
                )),
        )
    }
    let sharing = |id: &str| {
        Component::builder()
            .id(id)
            .kind("rect")
            .anchors(vec![AnchorDecl::signal("data", numeric(), ValueSource::Encoding)])
            .behaviour(Arc::new(shares))
            .build()
            .unwrap()
    };
    let session = session(vec![sharing("s1"), sharing("s2")], &[("s1.data", "s2.data")]);
    let output = Compiler::new(&session).compile("s1").unwrap();

    assert_eq!(output.document.layer.len(), 2);
    assert!(output.document.layer.iter().all(|l| l.parameters.is_empty()));
    let shared: Vec<_> = output
        .document
        .parameters
        .iter()
        .filter(|p| p.name == "shared")
        .collect();
    assert_eq!(shared.len(), 1);
    assert_eq!(shared[0].on.len(), 2);
}

#[test]
fn unclassified_cycles_are_reported_and_skipped() {
    let session = session(
        vec![handle("a", &["label"]), handle("b", &["label"])],
        &[("a.label", "b.label"), ("b.label", "a.label")],
    );
    let options = CompileOptions {
        prune: false,
        ..CompileOptions::default()
    };
    let output = Compiler::with_options(&session, options).compile("a").unwrap();
    assert!(output.cycles.is_empty());
    assert!(matches!(
        output.diagnostics.as_slice(),
        [Warning::UnclassifiedCycle { nodes }] if nodes == "a, b"
    ));
    assert_eq!(output.graph.edges().len(), 2);
}

#[test]
fn dead_parameter_elimination_can_be_disabled() {
    fn orphan(_: &Component, ctx: &mut CompileContext<'_>) -> Fragment {
        Fragment::default().with_parameter(Parameter::new(ctx.signal("orphan"), json!(null)))
    }
    let lonely = Component::builder()
        .id("lonely")
        .kind("widget")
        .behaviour(Arc::new(orphan))
        .build()
        .unwrap();
    let session = session(vec![lonely], &[]);

    let output = Compiler::new(&session).compile("lonely").unwrap();
    assert!(output.document.parameters.is_empty());

    let options = CompileOptions {
        eliminate_dead_parameters: false,
        ..CompileOptions::default()
    };
    let output = Compiler::with_options(&session, options).compile("lonely").unwrap();
    assert_eq!(output.document.parameters.len(), 1);
}

#[test]
fn concatenated_views_give_up_their_parameters() {
    fn panels(_: &Component, ctx: &mut CompileContext<'_>) -> Fragment {
        let inner = ctx.signal("inner");
        let mut fragment = Fragment::default();
        fragment.extra.insert(
            "hconcat".to_string(),
            json!([{
                "mark": "bar",
                "parameters": [{ "name": inner }],
                "encoding": { "x": { "signal": inner } },
            }]),
        );
        fragment
    }
    let view = Component::builder()
        .id("n")
        .kind("concat")
        .behaviour(Arc::new(panels))
        .build()
        .unwrap();
    let session = session(vec![view], &[]);
    let output = Compiler::new(&session).compile("n").unwrap();

    assert_eq!(parameter(&output, "n_inner").value, Value::Null);
    let panel = &output.document.extra["hconcat"][0];
    assert!(panel.get("parameters").is_none(), "{panel}");
    assert_eq!(panel["encoding"]["x"]["signal"], json!("n_inner"));
}
