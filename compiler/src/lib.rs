#[cfg(test)]
mod tests;

use miette::Diagnostic;
use thiserror::Error;
use trellis_scenario::{BindingGraph, Fragment, NodeId, Session, Warning, graph::Cycle};

mod builder;
mod constraints;
mod merge;
pub mod passes;
pub mod reporter;
mod table;

pub use builder::generate_binding_graph;
pub use constraints::{CompiledNode, build_context, compile_nodes, dependency_order};
pub use merge::{eliminate_dead_parameters, hoist_parameters, merge_fragments, merge_parameters};
pub use passes::{GraphPass, PassContext, PassError, PassManager};
pub use table::ComponentTable;

#[derive(Clone, Debug)]
pub struct CompileOptions {
    /// Drop edges on channels the root never touches.
    pub prune: bool,
    pub eliminate_dead_parameters: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            prune: true,
            eliminate_dead_parameters: true,
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Scenario(#[from] trellis_scenario::Error),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Pass(#[from] PassError),
    #[error("failed to convert the compiled document to or from JSON")]
    #[diagnostic(code(compiler::serialize))]
    Serialize(#[from] serde_json::Error),
}

/// The binding graph after every graph pass, without compiling any component.
#[derive(Clone, Debug)]
pub struct Analysis {
    pub graph: BindingGraph,
    pub cycles: Vec<Cycle>,
    pub mediators: Vec<NodeId>,
    pub diagnostics: Vec<Warning>,
}

#[derive(Clone, Debug)]
pub struct CompileOutput {
    pub document: Fragment,
    pub graph: BindingGraph,
    pub cycles: Vec<Cycle>,
    pub mediators: Vec<NodeId>,
    /// Nodes in the order they were compiled.
    pub order: Vec<NodeId>,
    pub diagnostics: Vec<Warning>,
}

#[derive(Clone, Debug)]
pub struct Compiler<'s> {
    session: &'s Session,
    options: CompileOptions,
}

impl<'s> Compiler<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self::with_options(session, CompileOptions::default())
    }

    pub fn with_options(session: &'s Session, options: CompileOptions) -> Self {
        Self { session, options }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Build the binding graph for `root` and run the graph passes.
    pub fn check(&self, root: &str) -> Result<Analysis, Error> {
        self.analyze(root).map(|(analysis, _)| analysis)
    }

    /// Compile the component graph reachable from `root` into one document.
    pub fn compile(&self, root: &str) -> Result<CompileOutput, Error> {
        let (analysis, table) = self.analyze(root)?;
        let Analysis {
            graph,
            cycles,
            mediators,
            mut diagnostics,
        } = analysis;

        let order = dependency_order(&graph, &table).order;
        let compiled = compile_nodes(&table, &graph, &order, &mut diagnostics)?;

        let mut document = merge_fragments(compiled.into_iter().map(|node| node.fragment));
        hoist_parameters(&mut document)?;
        if self.options.eliminate_dead_parameters {
            let dropped = eliminate_dead_parameters(&mut document)?;
            if !dropped.is_empty() {
                tracing::debug!(?dropped, "removed unreferenced parameters");
            }
        }

        Ok(CompileOutput {
            document,
            graph,
            cycles,
            mediators,
            order,
            diagnostics,
        })
    }

    fn analyze(&self, root: &str) -> Result<(Analysis, ComponentTable<'s>), Error> {
        let _span = tracing::debug_span!("analyze", root).entered();

        let graph = generate_binding_graph(self.session, root)?;
        tracing::debug!(
            nodes = graph.nodes().len(),
            edges = graph.edges().len(),
            "built binding graph"
        );

        let mut cx = PassContext::new(ComponentTable::new(self.session));
        let graph = PassManager::standard(&self.options).run(graph, &mut cx)?;
        let PassContext {
            table,
            cycles,
            mediators,
            diagnostics,
        } = cx;

        Ok((
            Analysis {
                graph,
                cycles,
                mediators,
                diagnostics,
            },
            table,
        ))
    }
}
