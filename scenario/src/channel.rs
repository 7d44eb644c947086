use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::Error;

/// Suffix carried by shadow anchors created during cycle resolution.
pub const INTERNAL_SUFFIX: &str = "_internal";

/// The logical axis an anchor carries, independent of its container shape.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    SerializeDisplay,
    DeserializeFromStr,
)]
pub enum Channel {
    X,
    Y,
    Color,
    Size,
    Shape,
    Opacity,
    Angle,
    Radius,
    Data,
    Text,
}

impl Channel {
    pub const ALL: [Channel; 10] = [
        Channel::X,
        Channel::Y,
        Channel::Color,
        Channel::Size,
        Channel::Shape,
        Channel::Opacity,
        Channel::Angle,
        Channel::Radius,
        Channel::Data,
        Channel::Text,
    ];

    /// Channels every component may consume without declaring them.
    pub const ALWAYS_ON: [Channel; 2] = [Channel::Data, Channel::Text];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::X => "x",
            Channel::Y => "y",
            Channel::Color => "color",
            Channel::Size => "size",
            Channel::Shape => "shape",
            Channel::Opacity => "opacity",
            Channel::Angle => "angle",
            Channel::Radius => "radius",
            Channel::Data => "data",
            Channel::Text => "text",
        }
    }

    pub fn is_positional(self) -> bool {
        matches!(self, Channel::X | Channel::Y)
    }

    pub fn is_always_on(self) -> bool {
        Self::ALWAYS_ON.contains(&self)
    }

    /// Channel of an anchor id: `x`, `x_start` and `x_internal` all carry `x`.
    pub fn extract(anchor: &str) -> Option<Channel> {
        let base = anchor.strip_suffix(INTERNAL_SUFFIX).unwrap_or(anchor);
        let head = base.split('_').next().unwrap_or(base);
        head.parse().ok()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == input)
            .ok_or_else(|| Error::UnknownChannel(input.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Scalar,
    Range,
    Set,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Numeric,
    Categorical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaType {
    pub container: Container,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default)]
    pub interactive: bool,
}

impl SchemaType {
    pub fn new(container: Container, value_type: ValueType) -> Self {
        Self {
            container,
            value_type,
            interactive: false,
        }
    }

    pub fn scalar(value_type: ValueType) -> Self {
        Self::new(Container::Scalar, value_type)
    }

    pub fn range(value_type: ValueType) -> Self {
        Self::new(Container::Range, value_type)
    }

    pub fn set(value_type: ValueType) -> Self {
        Self::new(Container::Set, value_type)
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupSchema {
    pub children: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AnchorSchema {
    Single(SchemaType),
    Group(GroupSchema),
}

impl AnchorSchema {
    pub fn single(&self) -> Option<&SchemaType> {
        match self {
            Self::Single(schema) => Some(schema),
            Self::Group(_) => None,
        }
    }

    pub fn group(&self) -> Option<&GroupSchema> {
        match self {
            Self::Single(_) => None,
            Self::Group(group) => Some(group),
        }
    }
}

impl From<SchemaType> for AnchorSchema {
    fn from(value: SchemaType) -> Self {
        Self::Single(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_channel_from_anchor_ids() {
        assert_eq!(Channel::extract("x"), Some(Channel::X));
        assert_eq!(Channel::extract("x_start"), Some(Channel::X));
        assert_eq!(Channel::extract("y_internal"), Some(Channel::Y));
        assert_eq!(Channel::extract("color_start_internal"), Some(Channel::Color));
        assert_eq!(Channel::extract("position"), None);
        assert_eq!(Channel::extract("*"), None);
        assert_eq!(Channel::extract(""), None);
    }

    #[test]
    fn channel_serializes_as_name() {
        let value = serde_json::to_value(Channel::Opacity).unwrap();
        assert_eq!(value, serde_json::json!("opacity"));
        let back: Channel = serde_json::from_value(value).unwrap();
        assert_eq!(back, Channel::Opacity);
        assert!(serde_json::from_value::<Channel>(serde_json::json!("z")).is_err());
    }

    #[test]
    fn schema_uses_type_key() {
        let schema: SchemaType =
            serde_json::from_value(serde_json::json!({ "container": "range", "type": "numeric" }))
                .unwrap();
        assert_eq!(schema, SchemaType::range(ValueType::Numeric));
        assert!(!schema.interactive);
    }
}
