use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use serde::{Deserialize, Deserializer, de::Error as _};
use serde_json::{Map, Value};
use serde_with::{MapPreventDuplicates, serde_as};
use trellis_expr::Expr;
use trellis_scenario::{
    AnchorDecl, AnchorRef, AnchorValue, Channel, Component, Configuration, Container, Field,
    NodeId, SchemaType, Session, ValueSource, ValueType,
};

use crate::{
    Document, Error,
    declared::{DeclaredComponent, DeclaredParameter, DeclaredRule},
    template::Template,
};

#[serde_as]
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct RawDocument {
    /// Component compiled when no root is given on the command line.
    #[serde(default)]
    pub root: Option<String>,
    #[serde_as(as = "MapPreventDuplicates<_, _>")]
    #[serde(default)]
    pub components: BTreeMap<String, RawComponent>,
    #[serde(default)]
    pub bindings: Vec<RawBinding>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawBinding {
    pub from: String,
    pub to: String,
    /// Bind both directions.
    #[serde(default)]
    pub sync: bool,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawComponent {
    pub kind: String,
    #[serde(default)]
    pub channels: BTreeMap<Channel, SchemaType>,
    #[serde(default)]
    pub configurations: Vec<Configuration>,
    #[serde_as(as = "MapPreventDuplicates<_, _>")]
    #[serde(default)]
    pub anchors: BTreeMap<String, RawAnchor>,
    #[serde(default)]
    pub parameters: Vec<RawParameter>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub mark: Option<Value>,
    #[serde(default)]
    pub encoding: Option<Value>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// Either a group (`group: [...]`) or a single anchor with a schema and field expressions.
/// A single anchor without expressions publishes the node's `<node>_<anchor>` signal.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawAnchor {
    #[serde(default)]
    pub group: Option<Vec<String>>,
    #[serde(default)]
    pub container: Option<Container>,
    #[serde(default, rename = "type")]
    pub value_type: Option<ValueType>,
    #[serde(default)]
    pub interactive: bool,
    #[serde(default)]
    pub source: Option<ValueSource>,
    #[serde(default, deserialize_with = "optional_expr")]
    pub value: Option<Expr>,
    #[serde(default, deserialize_with = "optional_expr")]
    pub start: Option<Expr>,
    #[serde(default, deserialize_with = "optional_expr")]
    pub stop: Option<Expr>,
    #[serde(default, deserialize_with = "optional_expr")]
    pub values: Option<Expr>,
    #[serde(default, deserialize_with = "optional_expr")]
    pub initial: Option<Expr>,
    #[serde(default, rename = "field", deserialize_with = "optional_expr")]
    pub field_name: Option<Expr>,
    #[serde(default, deserialize_with = "optional_expr")]
    pub scale: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawParameter {
    pub name: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub channel: Option<Channel>,
    #[serde(default)]
    pub field: Option<Field>,
    #[serde(default)]
    pub on: Vec<RawRule>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawRule {
    pub events: Vec<String>,
    #[serde(deserialize_with = "expr")]
    pub update: Expr,
}

fn expr<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Expr, D::Error> {
    let value = Value::deserialize(deserializer)?;
    match &value {
        Value::String(text) => Expr::parse(text).map_err(D::Error::custom),
        other => Expr::from_json(other)
            .ok_or_else(|| D::Error::custom("expected an expression string or a literal")),
    }
}

fn optional_expr<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Expr>, D::Error> {
    expr(deserializer).map(Some)
}

impl RawDocument {
    /// Register every declared component and binding in a fresh session.
    pub fn validate(self) -> Result<Document, Error> {
        let mut session = Session::new();
        for (id, decl) in self.components {
            session.register(decl.into_component(&id)?)?;
        }

        for binding in &self.bindings {
            let source = parse_endpoint(&binding.from)?;
            let target = parse_endpoint(&binding.to)?;
            if binding.sync {
                session.sync(source, target);
            } else {
                session.bind(source, target);
            }
        }

        let root = match self.root {
            Some(root) if session.get(&root).is_none() => return Err(Error::UnknownRoot { root }),
            root => root.map(NodeId::from),
        };

        tracing::debug!(
            components = session.components().count(),
            bindings = session.bindings().len(),
            "validated document"
        );
        Ok(Document { root, session })
    }
}

/// `component.anchor`, or a bare `component` standing for all of its anchors.
pub fn parse_endpoint(input: &str) -> Result<AnchorRef, Error> {
    let invalid = |message| Error::InvalidBinding {
        input: input.to_string(),
        message,
    };
    match input.split_once('.') {
        None if input.is_empty() => Err(invalid("endpoint is empty")),
        None => Ok(AnchorRef::all(input)),
        Some(("", _)) => Err(invalid("component name is empty")),
        Some((_, "")) => Err(invalid("anchor name is empty")),
        Some((node, anchor)) => Ok(AnchorRef::new(node, anchor)),
    }
}

impl RawComponent {
    fn into_component(self, id: &str) -> Result<Component, Error> {
        let anchors = self
            .anchors
            .into_iter()
            .map(|(name, anchor)| anchor.into_decl(id, name))
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = BTreeSet::new();
        let mut parameters = Vec::with_capacity(self.parameters.len());
        for parameter in self.parameters {
            if !seen.insert(parameter.name.clone()) {
                return Err(Error::DuplicateParameter {
                    component: id.to_string(),
                    parameter: parameter.name,
                });
            }
            parameters.push(DeclaredParameter {
                name: parameter.name,
                value: parameter.value,
                channel: parameter.channel,
                field: parameter.field.unwrap_or(Field::Value),
                on: parameter
                    .on
                    .into_iter()
                    .map(|rule| DeclaredRule {
                        events: rule.events,
                        update: rule.update,
                    })
                    .collect(),
            });
        }

        let template = |field: &'static str, value: Option<Value>| {
            value
                .map(Template::from_value)
                .transpose()
                .map_err(|message| Error::InvalidTemplate {
                    component: id.to_string(),
                    field,
                    message,
                })
        };
        let behaviour = DeclaredComponent {
            parameters,
            data: template("data", self.data)?,
            mark: template("mark", self.mark)?,
            encoding: template("encoding", self.encoding)?,
            properties: self.properties,
        };

        Ok(Component::builder()
            .id(id)
            .kind(self.kind)
            .channels(self.channels)
            .configurations(self.configurations)
            .anchors(anchors)
            .behaviour(Arc::new(behaviour))
            .build()?)
    }
}

impl RawAnchor {
    fn into_decl(self, component: &str, id: String) -> Result<AnchorDecl, Error> {
        let fields: BTreeMap<Field, Expr> = [
            (Field::Value, self.value),
            (Field::Start, self.start),
            (Field::Stop, self.stop),
            (Field::Values, self.values),
            (Field::Initial, self.initial),
            (Field::FieldName, self.field_name),
            (Field::Scale, self.scale),
        ]
        .into_iter()
        .filter_map(|(field, expr)| Some((field, expr?)))
        .collect();

        if let Some(children) = self.group {
            if self.container.is_some()
                || self.value_type.is_some()
                || self.source.is_some()
                || !fields.is_empty()
            {
                return Err(Error::MixedAnchor {
                    component: component.to_string(),
                    anchor: id,
                });
            }
            return Ok(AnchorDecl::group(id, children));
        }

        let (Some(container), Some(value_type)) = (self.container, self.value_type) else {
            return Err(Error::IncompleteAnchor {
                component: component.to_string(),
                anchor: id,
            });
        };
        let schema = SchemaType {
            container,
            value_type,
            interactive: self.interactive,
        };
        let source = self.source.unwrap_or(ValueSource::Generated);
        if fields.is_empty() {
            return Ok(AnchorDecl::signal(id, schema, source));
        }
        Ok(AnchorDecl::constant(id, schema, AnchorValue { source, fields }))
    }
}
