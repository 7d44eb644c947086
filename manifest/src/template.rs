use std::collections::BTreeMap;

use serde_json::{Map, Value, json};
use trellis_scenario::{Channel, CompileContext, Field};

const SIGNAL_MARKER: &str = "$signal";
const CHANNEL_MARKER: &str = "$channel";

/// A fragment template: literal JSON with markers filled in per node at compile time.
///
/// * `{"$signal": "name"}` becomes `{"signal": "<node>_name"}`.
/// * `{"$channel": "x", "field": "scale", "default": ...}` becomes the value resolved into that
///   channel field. An unresolved marker falls back to `default`, or removes the enclosing
///   object key when there is none.
#[derive(Clone, Debug, PartialEq)]
pub enum Template {
    Literal(Value),
    Signal {
        name: String,
    },
    Channel {
        channel: Channel,
        field: Field,
        default: Option<Value>,
    },
    Object(BTreeMap<String, Template>),
    Array(Vec<Template>),
}

impl Template {
    pub fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Object(map) => Self::from_map(map),
            Value::Array(values) => Ok(Self::Array(
                values
                    .into_iter()
                    .map(Self::from_value)
                    .collect::<Result<_, _>>()?,
            )),
            other => Ok(Self::Literal(other)),
        }
    }

    fn from_map(mut map: Map<String, Value>) -> Result<Self, String> {
        if let Some(value) = map.remove(SIGNAL_MARKER) {
            if !map.is_empty() {
                return Err(format!("{SIGNAL_MARKER} must be the only key of its object"));
            }
            let Value::String(name) = value else {
                return Err(format!("{SIGNAL_MARKER} value must be a string"));
            };
            return Ok(Self::Signal { name });
        }

        if let Some(value) = map.remove(CHANNEL_MARKER) {
            let Value::String(channel) = value else {
                return Err(format!("{CHANNEL_MARKER} value must be a string"));
            };
            let channel = channel.parse::<Channel>().map_err(|err| err.to_string())?;
            let field = match map.remove("field") {
                Some(field) => serde_json::from_value(field).map_err(|err| err.to_string())?,
                None => Field::Value,
            };
            let default = map.remove("default");
            if let Some(key) = map.keys().next() {
                return Err(format!("unexpected key `{key}` next to {CHANNEL_MARKER}"));
            }
            return Ok(Self::Channel {
                channel,
                field,
                default,
            });
        }

        let values = map
            .into_iter()
            .map(|(k, v)| Ok((k, Self::from_value(v)?)))
            .collect::<Result<BTreeMap<_, _>, String>>()?;
        Ok(Self::Object(values))
    }

    /// Fill in markers for the node being compiled. `None` when an unresolved channel marker
    /// has no default.
    pub fn render(&self, ctx: &CompileContext<'_>) -> Option<Value> {
        match self {
            Self::Literal(value) => Some(value.clone()),
            Self::Signal { name } => Some(json!({ "signal": ctx.signal(name) })),
            Self::Channel {
                channel,
                field,
                default,
            } => match ctx.channel(*channel).and_then(|c| c.get(*field)) {
                Some(expr) => Some(
                    expr.as_json()
                        .unwrap_or_else(|| json!({ "signal": expr.to_string() })),
                ),
                None => default.clone(),
            },
            Self::Object(values) => Some(Value::Object(
                values
                    .iter()
                    .filter_map(|(k, v)| Some((k.clone(), v.render(ctx)?)))
                    .collect(),
            )),
            Self::Array(values) => Some(Value::Array(
                values
                    .iter()
                    .map(|v| v.render(ctx).unwrap_or(Value::Null))
                    .collect(),
            )),
        }
    }
}
