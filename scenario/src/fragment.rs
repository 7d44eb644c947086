use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use trellis_expr::Expr;

/// A partial output document produced by one component.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mark: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layer: Vec<Fragment>,
    /// Anything else is passed through to the rendering engine untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Fragment {
    pub fn is_empty(&self) -> bool {
        self.data.is_none()
            && self.parameters.is_empty()
            && self.mark.is_none()
            && self.encoding.is_none()
            && self.layer.is_empty()
            && self.extra.is_empty()
    }

    /// Whether the fragment draws anything, directly or through layers.
    pub fn is_visual(&self) -> bool {
        self.mark.is_some() || !self.layer.is_empty()
    }

    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// A named reactive value evaluated by the rendering engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on: Vec<UpdateRule>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
            on: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: UpdateRule) -> Self {
        self.on.push(rule);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateRule {
    pub events: Vec<EventRef>,
    pub update: Expr,
}

impl UpdateRule {
    pub fn new(events: Vec<EventRef>, update: Expr) -> Self {
        Self { events, update }
    }

    /// Re-evaluate `update` whenever any signal it reads changes. `None` if it reads none.
    pub fn following(update: Expr) -> Option<Self> {
        let events: Vec<EventRef> = update.references().into_iter().map(EventRef::new).collect();
        if events.is_empty() {
            return None;
        }
        Some(Self { events, update })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRef {
    pub signal: String,
}

impl EventRef {
    pub fn new(signal: impl Into<String>) -> Self {
        Self {
            signal: signal.into(),
        }
    }
}
