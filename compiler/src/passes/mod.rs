use miette::Diagnostic;
use thiserror::Error;
use trellis_scenario::{BindingGraph, NodeId, Warning, graph::Cycle};

use crate::{CompileOptions, ComponentTable};

pub mod cycles;
pub mod expand;
pub mod prune;

pub use cycles::{CyclePass, MEDIATOR_KIND};
pub use expand::ExpandPass;
pub use prune::PrunePass;

#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum PassError {
    #[error("pass `{pass}` failed")]
    #[diagnostic(code(compiler::pass_failed))]
    Failed {
        pass: &'static str,
        #[source]
        #[diagnostic_source]
        source: trellis_scenario::Error,
    },
}

impl PassError {
    pub(crate) fn failed(pass: &'static str) -> impl FnOnce(trellis_scenario::Error) -> Self {
        move |source| PassError::Failed { pass, source }
    }
}

/// State shared by the passes of one compilation.
#[derive(Debug)]
pub struct PassContext<'s> {
    pub table: ComponentTable<'s>,
    pub cycles: Vec<Cycle>,
    pub mediators: Vec<NodeId>,
    pub diagnostics: Vec<Warning>,
}

impl<'s> PassContext<'s> {
    pub fn new(table: ComponentTable<'s>) -> Self {
        Self {
            table,
            cycles: Vec::new(),
            mediators: Vec::new(),
            diagnostics: Vec::new(),
        }
    }
}

pub trait GraphPass {
    fn name(&self) -> &'static str;

    fn run(&self, graph: BindingGraph, cx: &mut PassContext<'_>)
    -> Result<BindingGraph, PassError>;
}

#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn GraphPass>>,
}

impl PassManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// expand, then prune (unless disabled), then cycles. Each pass relies on the previous
    /// one: pruning expects concrete anchors and cycle detection expects pruned channels.
    pub fn standard(options: &CompileOptions) -> Self {
        let mut manager = Self::new();
        manager.push(ExpandPass);
        if options.prune {
            manager.push(PrunePass);
        }
        manager.push(CyclePass);
        manager
    }

    pub fn push<P>(&mut self, pass: P)
    where
        P: GraphPass + 'static,
    {
        self.passes.push(Box::new(pass));
    }

    pub fn run(
        &self,
        mut graph: BindingGraph,
        cx: &mut PassContext<'_>,
    ) -> Result<BindingGraph, PassError> {
        for pass in &self.passes {
            let before = graph.edges().len();
            graph = pass.run(graph, cx)?;
            tracing::debug!(
                pass = pass.name(),
                before,
                after = graph.edges().len(),
                "graph pass finished"
            );
        }
        Ok(graph)
    }
}
