use std::{collections::BTreeMap, fmt, sync::Arc};

use bon::bon;
use serde::{Deserialize, Serialize};
use trellis_expr::Expr;

use crate::{
    Anchor, AnchorDecl, AnchorRef, Channel, CompileContext, Error, Fragment, NodeId, SchemaType,
    WILDCARD,
};

/// A derived signal a configuration publishes, e.g. `x_start = BASE_NAME_x[0]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Transform {
    pub name: String,
    pub channel: Channel,
    /// Template; placeholders stand for the producing node.
    pub value: Expr,
}

/// A named group of channels a component can be bound through as a unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, bon::Builder)]
#[builder(on(String, into))]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    pub id: String,
    #[serde(default)]
    #[builder(default)]
    pub default: bool,
    #[serde(default)]
    #[builder(default)]
    pub schema: BTreeMap<Channel, SchemaType>,
    #[serde(default)]
    #[builder(default)]
    pub transforms: Vec<Transform>,
}

/// Turns a component's resolved inputs into its output fragment.
pub trait CompileComponent: Send + Sync {
    fn compile(&self, component: &Component, ctx: &mut CompileContext<'_>) -> Fragment;
}

impl<F> CompileComponent for F
where
    F: Fn(&Component, &mut CompileContext<'_>) -> Fragment + Send + Sync,
{
    fn compile(&self, component: &Component, ctx: &mut CompileContext<'_>) -> Fragment {
        self(component, ctx)
    }
}

#[derive(Clone)]
pub struct Component {
    id: NodeId,
    kind: String,
    channel_schema: BTreeMap<Channel, SchemaType>,
    configurations: Vec<Configuration>,
    anchors: BTreeMap<String, Anchor>,
    behaviour: Arc<dyn CompileComponent>,
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("channel_schema", &self.channel_schema)
            .field("configurations", &self.configurations)
            .field("anchors", &self.anchors)
            .finish_non_exhaustive()
    }
}

#[bon]
impl Component {
    #[builder]
    pub fn new(
        #[builder(into)] id: NodeId,
        #[builder(into)] kind: String,
        #[builder(default)] channels: BTreeMap<Channel, SchemaType>,
        #[builder(default)] configurations: Vec<Configuration>,
        #[builder(default)] anchors: Vec<AnchorDecl>,
        behaviour: Arc<dyn CompileComponent>,
    ) -> Result<Self, Error> {
        let mut defaults = configurations.iter().filter(|c| c.default);
        if let (Some(first), Some(second)) = (defaults.next(), defaults.next()) {
            return Err(Error::MultipleDefaultConfigurations {
                component: id,
                first: first.id.clone(),
                second: second.id.clone(),
            });
        }

        let mut attached = BTreeMap::new();
        for decl in anchors {
            if attached.contains_key(&decl.id) {
                return Err(Error::DuplicateAnchor {
                    component: id,
                    anchor: decl.id,
                });
            }
            attached.insert(decl.id.clone(), decl.attach(&id));
        }

        for (name, anchor) in &attached {
            for child in anchor.group_children() {
                if attached.get(child).is_some_and(Anchor::is_group) {
                    return Err(Error::NestedGroup {
                        component: id,
                        group: name.clone(),
                        child: child.clone(),
                    });
                }
            }
        }

        Ok(Self {
            id,
            kind,
            channel_schema: channels,
            configurations,
            anchors: attached,
            behaviour,
        })
    }
}

impl Component {
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn channel_schema(&self) -> &BTreeMap<Channel, SchemaType> {
        &self.channel_schema
    }

    pub fn configurations(&self) -> &[Configuration] {
        &self.configurations
    }

    pub fn configuration(&self, id: &str) -> Option<&Configuration> {
        self.configurations.iter().find(|c| c.id == id)
    }

    pub fn default_configuration(&self) -> Option<&Configuration> {
        self.configurations.iter().find(|c| c.default)
    }

    pub fn anchors(&self) -> impl Iterator<Item = &Anchor> {
        self.anchors.values()
    }

    pub fn find_anchor(&self, id: &str) -> Option<&Anchor> {
        self.anchors.get(id)
    }

    pub fn anchor(&self, id: &str) -> Result<&Anchor, Error> {
        self.anchors.get(id).ok_or_else(|| Error::UnknownAnchor {
            component: self.id.clone(),
            anchor: id.to_string(),
        })
    }

    /// Bindable handle for one of this component's anchors.
    pub fn anchor_ref(&self, id: &str) -> Result<AnchorRef, Error> {
        if id == WILDCARD || self.configuration(id).is_some() {
            return Ok(AnchorRef::new(self.id.clone(), id));
        }
        self.anchor(id).map(|anchor| anchor.id().clone())
    }

    /// Handle standing for every anchor of this component.
    pub fn all(&self) -> AnchorRef {
        AnchorRef::all(self.id.clone())
    }

    pub fn compile(&self, ctx: &mut CompileContext<'_>) -> Fragment {
        self.behaviour.compile(self, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ValueSource, ValueType};

    fn empty(_: &Component, _: &mut CompileContext<'_>) -> Fragment {
        Fragment::default()
    }

    fn numeric() -> SchemaType {
        SchemaType::scalar(ValueType::Numeric)
    }

    #[test]
    fn rejects_nested_groups() {
        let err = Component::builder()
            .id("a")
            .kind("handle")
            .anchors(vec![
                AnchorDecl::signal("x", numeric(), ValueSource::Generated),
                AnchorDecl::group("inner", ["x"]),
                AnchorDecl::group("outer", ["inner", "x"]),
            ])
            .behaviour(Arc::new(empty))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::NestedGroup { ref group, ref child, .. } if group == "outer" && child == "inner"
        ));
    }

    #[test]
    fn rejects_two_default_configurations() {
        let err = Component::builder()
            .id("a")
            .kind("handle")
            .configurations(vec![
                Configuration::builder().id("point").default(true).build(),
                Configuration::builder().id("span").default(true).build(),
            ])
            .behaviour(Arc::new(empty))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::MultipleDefaultConfigurations { .. }));
    }

    #[test]
    fn anchor_lookup_errors_on_unknown_ids() {
        let component = Component::builder()
            .id("a")
            .kind("handle")
            .configurations(vec![Configuration::builder().id("point").build()])
            .anchors(vec![AnchorDecl::signal("x", numeric(), ValueSource::Generated)])
            .behaviour(Arc::new(empty))
            .build()
            .unwrap();

        assert_eq!(component.anchor_ref("x").unwrap(), AnchorRef::new("a", "x"));
        assert_eq!(component.anchor_ref("point").unwrap(), AnchorRef::new("a", "point"));
        assert!(component.anchor_ref("*").unwrap().is_wildcard());
        assert!(matches!(
            component.anchor("y"),
            Err(Error::UnknownAnchor { ref anchor, .. }) if anchor == "y"
        ));
    }
}
