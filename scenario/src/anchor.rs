use std::{collections::BTreeMap, fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use trellis_expr::{Expr, qualified_name};

use crate::{
    AnchorRef, AnchorSchema, Channel, ConstraintContext, Container, GroupSchema, INTERNAL_SUFFIX,
    NodeId, SchemaType,
};

/// Where a value comes from. Used to pick a single value when several edges feed one channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueSource {
    Encoding,
    Generated,
    Context,
    BaseContext,
}

impl ValueSource {
    /// Lower ranks win. The current value of a positional channel prefers live interactive
    /// state over generated defaults; every other field prefers declarative encodings.
    pub fn rank(self, field: Field, positional: bool) -> u8 {
        match (self, field == Field::Value && positional) {
            (ValueSource::Encoding, _) => 0,
            (ValueSource::Generated, false) | (ValueSource::Context, true) => 1,
            (ValueSource::Context, false) | (ValueSource::Generated, true) => 2,
            (ValueSource::BaseContext, _) => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    /// Current value.
    Value,
    Start,
    Stop,
    /// Discrete candidates of a set container.
    Values,
    Initial,
    #[serde(rename = "field")]
    FieldName,
    Scale,
}

/// The tagged value an anchor produces for one resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct AnchorValue {
    pub source: ValueSource,
    pub fields: BTreeMap<Field, Expr>,
}

impl AnchorValue {
    pub fn new(source: ValueSource) -> Self {
        Self {
            source,
            fields: BTreeMap::new(),
        }
    }

    pub fn with(mut self, field: Field, expr: Expr) -> Self {
        self.fields.insert(field, expr);
        self
    }

    pub fn get(&self, field: Field) -> Option<&Expr> {
        self.fields.get(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn map_exprs(self, mut f: impl FnMut(Expr) -> Expr) -> Self {
        Self {
            source: self.source,
            fields: self.fields.into_iter().map(|(k, v)| (k, f(v))).collect(),
        }
    }

    pub fn resolve_placeholders(self, owner: &NodeId) -> Self {
        self.map_exprs(|expr| expr.resolve_placeholders(owner.as_str()))
    }
}

/// What an anchor's compile function may look at: the producing node and, once that node has
/// been constraint-compiled, its resolved context.
#[derive(Clone, Copy)]
pub struct AnchorContext<'a> {
    pub node: &'a NodeId,
    pub anchor: &'a str,
    pub constraints: Option<&'a ConstraintContext>,
}

pub type CompileFn = Arc<dyn Fn(&AnchorContext<'_>) -> AnchorValue + Send + Sync>;

#[derive(Clone)]
pub struct Anchor {
    id: AnchorRef,
    schema: AnchorSchema,
    internal: bool,
    compile: CompileFn,
}

impl fmt::Debug for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Anchor")
            .field("id", &self.id)
            .field("schema", &self.schema)
            .field("internal", &self.internal)
            .finish_non_exhaustive()
    }
}

impl Anchor {
    pub fn new(id: AnchorRef, schema: AnchorSchema, compile: CompileFn) -> Self {
        Self {
            id,
            schema,
            internal: false,
            compile,
        }
    }

    pub fn id(&self) -> &AnchorRef {
        &self.id
    }

    pub fn schema(&self) -> &AnchorSchema {
        &self.schema
    }

    pub fn channel(&self) -> Option<Channel> {
        self.id.channel()
    }

    pub fn container(&self) -> Option<Container> {
        self.schema.single().map(|s| s.container)
    }

    pub fn is_group(&self) -> bool {
        matches!(self.schema, AnchorSchema::Group(_))
    }

    pub fn group_children(&self) -> &[String] {
        self.schema
            .group()
            .map(|g| g.children.as_slice())
            .unwrap_or_default()
    }

    pub fn is_internal(&self) -> bool {
        self.internal
    }

    pub fn compile(&self, ctx: &AnchorContext<'_>) -> AnchorValue {
        (self.compile)(ctx)
    }

    /// Clone this anchor with a different compile function.
    pub fn with_compile(&self, compile: CompileFn) -> Self {
        Self {
            compile,
            ..self.clone()
        }
    }

    /// Private clone feeding a cycle mediator. Its values are pinned to the owner's
    /// `<owner>_<signal>_internal` signals, so nothing downstream can resolve them back to
    /// the public signal the mediator writes.
    pub fn shadow(&self) -> Self {
        let owner = self.id.node.clone();
        let inner = Arc::clone(&self.compile);
        let compile: CompileFn = Arc::new(move |ctx| {
            inner(ctx).map_exprs(|expr| {
                expr.map_placeholders(|suffix| {
                    Expr::ident(format!(
                        "{}{INTERNAL_SUFFIX}",
                        qualified_name(owner.as_str(), suffix)
                    ))
                })
            })
        });
        Self {
            id: AnchorRef::new(
                self.id.node.clone(),
                format!("{}{INTERNAL_SUFFIX}", self.id.anchor),
            ),
            schema: self.schema.clone(),
            internal: true,
            compile,
        }
    }
}

/// An anchor declaration before it is attached to a component.
#[derive(Clone)]
pub struct AnchorDecl {
    pub id: String,
    pub schema: AnchorSchema,
    pub compile: CompileFn,
}

impl fmt::Debug for AnchorDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnchorDecl")
            .field("id", &self.id)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl AnchorDecl {
    pub fn new(
        id: impl Into<String>,
        schema: impl Into<AnchorSchema>,
        compile: impl Fn(&AnchorContext<'_>) -> AnchorValue + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            schema: schema.into(),
            compile: Arc::new(compile),
        }
    }

    /// An anchor that always yields `value`.
    pub fn constant(id: impl Into<String>, schema: SchemaType, value: AnchorValue) -> Self {
        Self::new(id, schema, move |_| value.clone())
    }

    /// An anchor whose value is the producing node's `<node>_<anchor>` signal.
    pub fn signal(id: impl Into<String>, schema: SchemaType, source: ValueSource) -> Self {
        let id = id.into();
        let value = AnchorValue::new(source).with(Field::Value, Expr::placeholder(Some(&id)));
        Self::constant(id, schema, value)
    }

    pub fn group<I, S>(id: impl Into<String>, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let schema = AnchorSchema::Group(GroupSchema {
            children: children.into_iter().map(Into::into).collect(),
        });
        Self::new(id, schema, |_| AnchorValue::new(ValueSource::Generated))
    }

    pub(crate) fn attach(self, node: &NodeId) -> Anchor {
        Anchor::new(AnchorRef::new(node.clone(), self.id), self.schema, self.compile)
    }
}
