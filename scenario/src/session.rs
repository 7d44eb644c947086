use std::{collections::BTreeMap, sync::Arc};

use serde::Serialize;
use serde_json::{Value, json};
use trellis_expr::Expr;

use crate::{AnchorRef, BindingEdge, Component, Error, NodeId};

/// One authoring session: the component registry plus every declared binding.
///
/// Components and bindings are appended while authoring and only read during compilation, so
/// separate sessions never observe each other.
#[derive(Clone, Debug, Default)]
pub struct Session {
    components: BTreeMap<NodeId, Arc<Component>>,
    bindings: Vec<BindingEdge>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, component: Component) -> Result<NodeId, Error> {
        let id = component.id().clone();
        if self.components.contains_key(&id) {
            return Err(Error::DuplicateComponent { id });
        }
        self.components.insert(id.clone(), Arc::new(component));
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Component>> {
        self.components.get(id)
    }

    pub fn component(&self, id: &str) -> Result<&Arc<Component>, Error> {
        self.components
            .get(id)
            .ok_or_else(|| Error::UnknownComponent { id: NodeId::new(id) })
    }

    pub fn components(&self) -> impl Iterator<Item = &Arc<Component>> {
        self.components.values()
    }

    /// Record that `source` flows into `target`. Nothing is checked until compilation.
    pub fn bind(&mut self, source: AnchorRef, target: AnchorRef) {
        self.bindings.push(BindingEdge::new(source, target));
    }

    /// Bind both directions; the compiler resolves the resulting cycle.
    pub fn sync(&mut self, a: AnchorRef, b: AnchorRef) {
        self.bind(a.clone(), b.clone());
        self.bind(b, a);
    }

    pub fn bindings(&self) -> &[BindingEdge] {
        &self.bindings
    }

    pub fn resolve_deferred(&self, reference: &DeferredReference) -> Result<DataReference, Error> {
        let target = self.component(reference.target.as_str())?;
        Ok(reference.replay(target.id()))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DeferredOp {
    Count,
    Filter(Expr),
    GroupBy(Vec<String>),
    Field(String),
}

/// Operations recorded against a component that may not be registered yet, replayed once it
/// is.
#[derive(Clone, Debug, PartialEq)]
pub struct DeferredReference {
    target: NodeId,
    ops: Vec<DeferredOp>,
}

impl DeferredReference {
    pub fn new(target: impl Into<NodeId>) -> Self {
        Self {
            target: target.into(),
            ops: Vec::new(),
        }
    }

    pub fn target(&self) -> &NodeId {
        &self.target
    }

    pub fn ops(&self) -> &[DeferredOp] {
        &self.ops
    }

    pub fn count(mut self) -> Self {
        self.ops.push(DeferredOp::Count);
        self
    }

    pub fn filter(mut self, predicate: Expr) -> Self {
        self.ops.push(DeferredOp::Filter(predicate));
        self
    }

    pub fn group_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ops
            .push(DeferredOp::GroupBy(fields.into_iter().map(Into::into).collect()));
        self
    }

    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.ops.push(DeferredOp::Field(name.into()));
        self
    }

    fn replay(&self, target: &NodeId) -> DataReference {
        let transform = self
            .ops
            .iter()
            .map(|op| match op {
                DeferredOp::Count => json!({ "type": "aggregate", "ops": ["count"], "as": ["count"] }),
                DeferredOp::Filter(predicate) => json!({
                    "type": "filter",
                    "expr": predicate.resolve_placeholders(target.as_str()).to_string(),
                }),
                DeferredOp::GroupBy(fields) => json!({ "type": "aggregate", "groupby": fields }),
                DeferredOp::Field(name) => json!({ "type": "project", "fields": [name] }),
            })
            .collect();
        DataReference {
            source: format!("{target}_data"),
            transform,
        }
    }
}

/// A data source derived from another component's data.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DataReference {
    pub source: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub transform: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{CompileContext, Fragment};

    fn empty(_: &Component, _: &mut CompileContext<'_>) -> Fragment {
        Fragment::default()
    }

    fn component(id: &str) -> Component {
        Component::builder()
            .id(id)
            .kind("table")
            .behaviour(Arc::new(empty))
            .build()
            .unwrap()
    }

    #[test]
    fn register_rejects_duplicate_ids() {
        let mut session = Session::new();
        session.register(component("a")).unwrap();
        assert!(matches!(
            session.register(component("a")),
            Err(Error::DuplicateComponent { .. })
        ));
        assert!(matches!(
            session.component("missing"),
            Err(Error::UnknownComponent { ref id }) if id.as_str() == "missing"
        ));
    }

    #[test]
    fn bind_records_without_validation() {
        let mut session = Session::new();
        session.bind(AnchorRef::new("nowhere", "x"), AnchorRef::new("nobody", "y"));
        session.sync(AnchorRef::new("a", "x"), AnchorRef::new("b", "x"));
        assert_eq!(session.bindings().len(), 3);
        assert_eq!(session.bindings()[2].key(), "b:x->a:x");
    }

    #[test]
    fn deferred_reference_replays_once_target_exists() {
        let deferred = DeferredReference::new("points")
            .filter(Expr::parse("datum.value > BASE_NAME_threshold").unwrap())
            .group_by(["category"])
            .count();

        let mut session = Session::new();
        assert!(session.resolve_deferred(&deferred).is_err());

        session.register(component("points")).unwrap();
        let data = session.resolve_deferred(&deferred).unwrap();
        assert_eq!(
            serde_json::to_value(&data).unwrap(),
            json!({
                "source": "points_data",
                "transform": [
                    { "type": "filter", "expr": "datum.value > points_threshold" },
                    { "type": "aggregate", "groupby": ["category"] },
                    { "type": "aggregate", "ops": ["count"], "as": ["count"] },
                ],
            })
        );
    }
}
