use serde_json::{Map, Value};
use trellis_expr::{Expr, PLACEHOLDER, qualified_name};
use trellis_scenario::{
    Channel, ChannelContext, CompileComponent, CompileContext, CompiledTransform, Component,
    EventRef, Field, Fragment, Parameter, UpdateRule, Warning,
};

use crate::template::Template;

/// An interaction rule as written in a document: event signals and update, both templates.
#[derive(Clone, Debug, PartialEq)]
pub struct DeclaredRule {
    pub events: Vec<String>,
    pub update: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeclaredParameter {
    pub name: String,
    pub value: Value,
    /// Channel whose resolved value drives this parameter.
    pub channel: Option<Channel>,
    pub field: Field,
    pub on: Vec<DeclaredRule>,
}

/// Component behaviour assembled from a document declaration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeclaredComponent {
    pub parameters: Vec<DeclaredParameter>,
    pub data: Option<Template>,
    pub mark: Option<Template>,
    pub encoding: Option<Template>,
    /// Extra top-level properties copied into the fragment as they are.
    pub properties: Map<String, Value>,
}

impl CompileComponent for DeclaredComponent {
    fn compile(&self, _: &Component, ctx: &mut CompileContext<'_>) -> Fragment {
        let render = |template: &Option<Template>| template.as_ref().and_then(|t| t.render(ctx));
        let mut fragment = Fragment {
            data: render(&self.data),
            mark: render(&self.mark),
            encoding: render(&self.encoding),
            extra: self.properties.clone(),
            ..Fragment::default()
        };
        for parameter in &self.parameters {
            fragment.parameters.extend(parameter.compile(ctx));
        }
        fragment.parameters.extend(
            ctx.constraints()
                .transforms
                .iter()
                .map(transform_parameter),
        );
        fragment
    }
}

/// `<node>_<name>`, recomputed whenever a signal its expression reads changes.
fn transform_parameter(transform: &CompiledTransform) -> Parameter {
    let value = transform.expr.as_json().unwrap_or(Value::Null);
    let mut parameter = Parameter::new(transform.name.clone(), value);
    parameter
        .on
        .extend(UpdateRule::following(transform.expr.clone()));
    parameter
}

impl DeclaredParameter {
    fn compile(&self, ctx: &mut CompileContext<'_>) -> Vec<Parameter> {
        let node = ctx.node().clone();
        let rules: Vec<UpdateRule> = self
            .on
            .iter()
            .map(|rule| {
                UpdateRule::new(
                    rule.events
                        .iter()
                        .map(|event| EventRef::new(qualify_event(event, node.as_str())))
                        .collect(),
                    rule.update.resolve_placeholders(node.as_str()),
                )
            })
            .collect();

        let name = ctx.signal(&self.name);
        let Some(channel) = self.channel else {
            return vec![Parameter {
                name,
                value: self.value.clone(),
                on: rules,
            }];
        };

        let resolved = ctx.channel(channel).and_then(|c| c.get(self.field)).cloned();
        if resolved.is_none() && rules.is_empty() {
            ctx.warn(Warning::MissingConstraint {
                component: node,
                parameter: self.name.clone(),
                channel,
            });
            return Vec::new();
        }

        let value = resolved
            .as_ref()
            .and_then(Expr::as_json)
            .unwrap_or_else(|| self.value.clone());
        let follow = resolved.and_then(UpdateRule::following);

        if ctx.constraints().shadow_for(channel).is_some() {
            // The mediator owns the public signal; interaction writes the shadow signal instead.
            let inputs = ctx.constraints().internal(channel);
            let mut state = Parameter::new(ctx.internal_signal(&self.name), value.clone());
            let redirected = inputs.and_then(|c| c.get(self.field)).cloned();
            state.on.extend(redirected.and_then(UpdateRule::following));
            state.on.extend(constrained(rules, inputs));

            let mut public = Parameter::new(name, value);
            public.on.extend(follow);
            return vec![state, public];
        }

        let mut parameter = Parameter::new(name, value);
        parameter.on.extend(follow);
        parameter.on.extend(constrained(rules, ctx.channel(channel)));
        vec![parameter]
    }
}

fn constrained(rules: Vec<UpdateRule>, bounds: Option<&ChannelContext>) -> Vec<UpdateRule> {
    match bounds {
        Some(bounds) if bounds.has_bounds() => rules
            .into_iter()
            .map(|rule| UpdateRule::new(rule.events, bounds.constrain(rule.update)))
            .collect(),
        _ => rules,
    }
}

/// `BASE_NAME_drag` names the node's own `drag` signal; anything else is taken literally.
fn qualify_event(event: &str, node: &str) -> String {
    match event.strip_prefix(PLACEHOLDER) {
        Some("") => node.to_string(),
        Some(rest) => match rest.strip_prefix('_') {
            Some(suffix) => qualified_name(node, Some(suffix)),
            None => event.to_string(),
        },
        None => event.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_resolve_only_the_placeholder_prefix() {
        assert_eq!(qualify_event("BASE_NAME_drag", "h"), "h_drag");
        assert_eq!(qualify_event("BASE_NAME", "h"), "h");
        assert_eq!(qualify_event("BASE_NAMES", "h"), "BASE_NAMES");
        assert_eq!(qualify_event("width", "h"), "width");
    }
}
