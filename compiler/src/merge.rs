use serde_json::Value;
use trellis_scenario::{Fragment, Parameter};

/// Fold per-node fragments, left to right, into one document.
///
/// Two fragments that both draw something are layered; anything else is shallow-merged with
/// later fields winning and parameter lists concatenated.
pub fn merge_fragments(fragments: impl IntoIterator<Item = Fragment>) -> Fragment {
    fragments.into_iter().fold(Fragment::default(), combine)
}

fn combine(acc: Fragment, next: Fragment) -> Fragment {
    if acc.is_empty() {
        return next;
    }
    if acc.is_visual() && next.is_visual() {
        return layer(acc, next);
    }
    shallow_merge(acc, next)
}

/// Whether `fragment` is only a container of layers, with no mark of its own.
fn is_composite(fragment: &Fragment) -> bool {
    fragment.mark.is_none() && fragment.encoding.is_none() && !fragment.layer.is_empty()
}

fn layer(mut acc: Fragment, next: Fragment) -> Fragment {
    if is_composite(&acc) {
        acc.layer.push(next);
        return acc;
    }
    Fragment {
        layer: vec![acc, next],
        ..Fragment::default()
    }
}

fn shallow_merge(mut acc: Fragment, next: Fragment) -> Fragment {
    let Fragment {
        data,
        parameters,
        mark,
        encoding,
        layer,
        extra,
    } = next;
    if data.is_some() {
        acc.data = data;
    }
    if mark.is_some() {
        acc.mark = mark;
    }
    if encoding.is_some() {
        acc.encoding = encoding;
    }
    acc.parameters.extend(parameters);
    acc.layer.extend(layer);
    acc.extra.extend(extra);
    acc
}

/// Lift every nested parameter list to the top level and merge parameters by name.
///
/// Nested lists are found in layers and anywhere inside the free-form properties, e.g. the
/// views of an `hconcat`.
pub fn hoist_parameters(document: &mut Fragment) -> Result<(), serde_json::Error> {
    let mut parameters = std::mem::take(&mut document.parameters);
    for value in document.extra.values_mut() {
        drain_value(value, &mut parameters)?;
    }
    for layer in &mut document.layer {
        drain_parameters(layer, &mut parameters)?;
    }
    document.parameters = merge_parameters(parameters);
    Ok(())
}

fn drain_parameters(
    fragment: &mut Fragment,
    out: &mut Vec<Parameter>,
) -> Result<(), serde_json::Error> {
    out.append(&mut fragment.parameters);
    for value in fragment.extra.values_mut() {
        drain_value(value, out)?;
    }
    for layer in &mut fragment.layer {
        drain_parameters(layer, out)?;
    }
    Ok(())
}

fn drain_value(value: &mut Value, out: &mut Vec<Parameter>) -> Result<(), serde_json::Error> {
    match value {
        Value::Object(object) => {
            if object.get("parameters").is_some_and(Value::is_array) {
                if let Some(nested) = object.remove("parameters") {
                    out.extend(serde_json::from_value::<Vec<Parameter>>(nested)?);
                }
            }
            for child in object.values_mut() {
                drain_value(child, out)?;
            }
        }
        Value::Array(items) => {
            for item in items {
                drain_value(item, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Parameters sharing a name collapse into the first: a later non-null value overwrites, update
/// rules concatenate.
pub fn merge_parameters(parameters: Vec<Parameter>) -> Vec<Parameter> {
    let mut merged: Vec<Parameter> = Vec::with_capacity(parameters.len());
    for parameter in parameters {
        match merged.iter_mut().find(|p| p.name == parameter.name) {
            Some(existing) => {
                if !parameter.value.is_null() {
                    existing.value = parameter.value;
                }
                existing.on.extend(parameter.on);
            }
            None => merged.push(parameter),
        }
    }
    merged
}

/// Drop top-level parameters whose name appears fewer than two times, as a whole identifier,
/// in the serialized document. The declaration itself accounts for one occurrence.
pub fn eliminate_dead_parameters(document: &mut Fragment) -> Result<Vec<String>, serde_json::Error> {
    let text = serde_json::to_string(document)?;
    let (kept, dropped): (Vec<Parameter>, Vec<Parameter>) =
        std::mem::take(&mut document.parameters)
            .into_iter()
            .partition(|p| count_identifier(&text, &p.name) >= 2);
    document.parameters = kept;
    Ok(dropped.into_iter().map(|p| p.name).collect())
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Occurrences of `name` not directly preceded or followed by an identifier character.
pub(crate) fn count_identifier(haystack: &str, name: &str) -> usize {
    if name.is_empty() {
        return 0;
    }
    haystack
        .match_indices(name)
        .filter(|(start, _)| {
            let before = haystack[..*start].chars().next_back();
            let after = haystack[start + name.len()..].chars().next();
            !before.is_some_and(is_identifier_char) && !after.is_some_and(is_identifier_char)
        })
        .count()
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use trellis_expr::Expr;
    use trellis_scenario::{EventRef, UpdateRule};

    use super::*;

    fn mark(kind: &str) -> Fragment {
        Fragment {
            mark: Some(json!(kind)),
            ..Fragment::default()
        }
    }

    fn rule(signal: &str) -> UpdateRule {
        UpdateRule::new(vec![EventRef::new(signal)], Expr::ident(signal))
    }

    #[test]
    fn visual_fragments_are_layered() {
        let merged = merge_fragments([mark("rect"), mark("circle"), mark("text")]);
        assert!(merged.mark.is_none());
        assert_eq!(merged.layer.len(), 3);
        assert_eq!(merged.layer[2].mark, Some(json!("text")));
    }

    #[test]
    fn non_visual_fragments_shallow_merge() {
        let data = Fragment {
            data: Some(json!({ "name": "table" })),
            ..Fragment::default()
        }
        .with_parameter(Parameter::new("a", json!(1)));
        let merged = merge_fragments([mark("bar").with_parameter(Parameter::new("b", json!(2))), data]);
        assert_eq!(merged.mark, Some(json!("bar")));
        assert_eq!(merged.data, Some(json!({ "name": "table" })));
        let names: Vec<_> = merged.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["b", "a"]);
    }

    #[test]
    fn hoisting_leaves_no_nested_parameters() {
        let mut merged = merge_fragments([
            mark("rect").with_parameter(Parameter::new("a_x", json!(0))),
            mark("circle").with_parameter(Parameter::new("b_x", json!(0))),
        ]);
        hoist_parameters(&mut merged).unwrap();
        assert_eq!(merged.parameters.len(), 2);
        assert!(merged.layer.iter().all(|layer| layer.parameters.is_empty()));
    }

    #[test]
    fn hoisting_reaches_views_nested_in_properties() {
        let mut view = mark("bar").with_parameter(Parameter::new("n_inner", json!(0)));
        view.encoding = Some(json!({ "x": { "signal": "n_inner" } }));
        let mut document = Fragment::default().with_parameter(Parameter::new("n_outer", json!(1)));
        document
            .extra
            .insert("hconcat".to_string(), json!([serde_json::to_value(&view).unwrap()]));
        document.extra.insert(
            "config".to_string(),
            json!({ "nested": { "parameters": [{ "name": "n_deep", "value": 2 }] } }),
        );

        hoist_parameters(&mut document).unwrap();
        let names: Vec<_> = document.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["n_outer", "n_inner", "n_deep"]);

        let text = serde_json::to_string(&document.extra).unwrap();
        assert!(!text.contains("parameters"), "left nested parameters: {text}");
        assert_eq!(document.extra["hconcat"][0]["mark"], json!("bar"));
    }

    #[test]
    fn same_named_parameters_concatenate_rules() {
        let merged = merge_parameters(vec![
            Parameter::new("shared", json!(1)).with_rule(rule("a")),
            Parameter::new("shared", json!(null)).with_rule(rule("b")),
            Parameter::new("other", json!(0)),
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].value, json!(1));
        assert_eq!(merged[0].on.len(), 2);
    }

    #[test]
    fn later_values_overwrite_unless_null() {
        let merged = merge_parameters(vec![
            Parameter::new("shared", json!(1)),
            Parameter::new("shared", json!(2)),
            Parameter::new("shared", json!(null)),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].value, json!(2));
    }

    #[test]
    fn unreferenced_parameters_are_dropped() {
        let mut document = Fragment {
            encoding: Some(json!({ "x": { "signal": "used_x" } })),
            ..mark("point")
        }
        .with_parameter(Parameter::new("used_x", json!(0)))
        .with_parameter(Parameter::new("unused", json!(0)))
        .with_parameter(Parameter::new("used", json!(0)));

        let dropped = eliminate_dead_parameters(&mut document).unwrap();
        assert_eq!(dropped, ["unused", "used"]);
        assert_eq!(document.parameters.len(), 1);
    }

    #[test]
    fn identifier_count_respects_boundaries() {
        assert_eq!(count_identifier("a_x + a_x_internal + ba_x", "a_x"), 1);
        assert_eq!(count_identifier("\"a_x\":a_x", "a_x"), 2);
    }
}
