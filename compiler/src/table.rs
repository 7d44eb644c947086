use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use trellis_scenario::{Anchor, AnchorRef, Component, Error, INTERNAL_SUFFIX, NodeId, Session};

/// Per-compilation view of the session's components, extended with what cycle resolution
/// synthesizes. Nothing here outlives the compilation.
#[derive(Clone, Debug)]
pub struct ComponentTable<'s> {
    session: &'s Session,
    synthesized: BTreeMap<NodeId, Arc<Component>>,
    shadows: BTreeMap<AnchorRef, Anchor>,
}

impl<'s> ComponentTable<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self {
            session,
            synthesized: BTreeMap::new(),
            shadows: BTreeMap::new(),
        }
    }

    pub fn session(&self) -> &'s Session {
        self.session
    }

    pub fn component(&self, id: &str) -> Result<&Component, Error> {
        if let Some(component) = self.synthesized.get(id) {
            return Ok(component);
        }
        self.session.component(id).map(Arc::as_ref)
    }

    pub fn is_synthesized(&self, id: &str) -> bool {
        self.synthesized.contains_key(id)
    }

    pub fn synthesized(&self) -> impl Iterator<Item = &NodeId> {
        self.synthesized.keys()
    }

    /// Whether `id` names a session component or one synthesized earlier.
    pub fn contains(&self, id: &str) -> bool {
        self.synthesized.contains_key(id) || self.session.component(id).is_ok()
    }

    /// `base`, or `base_<n>` with the smallest `n >= 2` naming no component yet.
    pub fn unused_id(&self, base: NodeId) -> NodeId {
        if !self.contains(base.as_str()) {
            return base;
        }
        let mut n = 2;
        loop {
            let id = NodeId::from(format!("{base}_{n}"));
            if !self.contains(id.as_str()) {
                return id;
            }
            n += 1;
        }
    }

    pub fn insert_synthesized(&mut self, component: Component) -> Result<NodeId, Error> {
        let id = component.id().clone();
        if self.contains(id.as_str()) {
            return Err(Error::DuplicateComponent { id });
        }
        self.synthesized.insert(id.clone(), Arc::new(component));
        Ok(id)
    }

    /// Look up an anchor, including shadow anchors added by cycle resolution.
    pub fn anchor(&self, anchor: &AnchorRef) -> Result<&Anchor, Error> {
        if let Some(shadow) = self.shadows.get(anchor) {
            return Ok(shadow);
        }
        self.component(anchor.node.as_str())?.anchor(&anchor.anchor)
    }

    pub fn insert_shadow(&mut self, shadow: Anchor) {
        self.shadows.insert(shadow.id().clone(), shadow);
    }

    /// Public anchor ids of `node` that have a shadow.
    pub fn shadowed_anchors(&self, node: &NodeId) -> BTreeSet<String> {
        self.shadows
            .keys()
            .filter(|anchor| anchor.node == *node)
            .filter_map(|anchor| anchor.anchor.strip_suffix(INTERNAL_SUFFIX))
            .map(str::to_string)
            .collect()
    }
}
