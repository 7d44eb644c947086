use std::{collections::BTreeSet, fmt, fs, path::PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use miette::{
    Context as _, Diagnostic, GraphicalReportHandler, IntoDiagnostic as _, Result, Severity,
};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, prelude::*};
use trellis_compiler::{
    CompileOptions, Compiler,
    reporter::{DotReporter, JsonReporter, Reporter as _, dot::render_dot},
};
use trellis_manifest::{Document, ParsedDocument};
use trellis_scenario::NodeId;

#[derive(Parser)]
#[command(name = "trellis")]
#[command(version)]
#[command(about = "Compile bound visual components into one reactive document")]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv, -vvvv).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a document into the output document.
    Compile(CompileArgs),
    /// Build and resolve the binding graph without compiling any component.
    Check(CheckArgs),
    /// Print the resolved binding graph as Graphviz DOT.
    Graph(GraphArgs),
}

#[derive(Args)]
struct Target {
    /// Component to compile from. Defaults to the document's `root`.
    #[arg(long = "root", value_name = "COMPONENT")]
    root: Option<String>,

    /// Keep edges on channels the root never touches.
    #[arg(long = "no-prune")]
    no_prune: bool,

    /// Authoring document (json5).
    #[arg(value_name = "DOCUMENT")]
    document: PathBuf,
}

#[derive(Args)]
struct CompileArgs {
    /// Treat the given lints as errors (e.g. `warnings`, `compiler::missing_constraint`).
    #[arg(short = 'D', long = "deny", value_name = "LINT")]
    deny: Vec<String>,

    /// Select the emitted output.
    #[arg(long = "emit", value_enum, default_value_t = EmitKind::Json)]
    emit: EmitKind,

    /// Keep parameters nothing refers to.
    #[arg(long = "keep-dead-parameters")]
    keep_dead_parameters: bool,

    /// Write the output here instead of stdout.
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,

    #[command(flatten)]
    target: Target,
}

#[derive(Args)]
struct CheckArgs {
    /// Treat the given lints as errors (e.g. `warnings`, `compiler::unclassified_cycle`).
    #[arg(short = 'D', long = "deny", value_name = "LINT")]
    deny: Vec<String>,

    #[command(flatten)]
    target: Target,
}

#[derive(Args)]
struct GraphArgs {
    #[command(flatten)]
    target: Target,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EmitKind {
    Json,
    Dot,
}

fn main() -> Result<()> {
    miette::set_panic_hook();
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    match cli.command {
        Command::Compile(args) => compile(args),
        Command::Check(args) => check(args),
        Command::Graph(args) => graph(args),
    }
}

fn init_tracing(verbose: u8) -> Result<()> {
    let filter = if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::try_from_default_env().into_diagnostic()?
    } else {
        let level = match verbose {
            0 => "error",
            1 => "warn",
            2 => "info",
            3 => "debug",
            _ => "trace",
        };
        EnvFilter::new(format!("error,trellis={level},trellis_={level}"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_fmt::layer().with_writer(std::io::stderr))
        .with(ErrorLayer::default())
        .init();

    Ok(())
}

/// Parse the document and pick the compilation root.
fn load(target: &Target) -> Result<(Document, NodeId)> {
    let document = ParsedDocument::parse_file(&target.document)?.document;
    let root = match (&target.root, &document.root) {
        (Some(root), _) => NodeId::from(root.as_str()),
        (None, Some(root)) => root.clone(),
        (None, None) => {
            return Err(miette::miette!(
                help = "pass `--root <COMPONENT>` or set `root` in the document",
                "no component to compile from"
            ));
        }
    };
    Ok((document, root))
}

fn compile(args: CompileArgs) -> Result<()> {
    let (document, root) = load(&args.target)?;
    let options = CompileOptions {
        prune: !args.target.no_prune,
        eliminate_dead_parameters: !args.keep_dead_parameters,
    };

    let output = Compiler::with_options(&document.session, options)
        .compile(root.as_str())
        .wrap_err("compile failed")?;

    let denied = Denied::from_args(&args.deny);
    if print_diagnostics(&output.diagnostics, &denied)? {
        return Err(miette::miette!("compilation failed"));
    }

    let rendered = match args.emit {
        EmitKind::Json => JsonReporter.emit(&output)?,
        EmitKind::Dot => DotReporter.emit(&output)?,
    };
    match args.output {
        Some(path) => fs::write(&path, rendered)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to write `{}`", path.display()))?,
        None => print!("{rendered}"),
    }
    Ok(())
}

fn check(args: CheckArgs) -> Result<()> {
    let (document, root) = load(&args.target)?;
    let options = CompileOptions {
        prune: !args.target.no_prune,
        ..CompileOptions::default()
    };

    let analysis = Compiler::with_options(&document.session, options)
        .check(root.as_str())
        .wrap_err("check failed")?;

    let denied = Denied::from_args(&args.deny);
    if print_diagnostics(&analysis.diagnostics, &denied)? {
        return Err(miette::miette!("check failed"));
    }

    println!(
        "{root}: {} nodes, {} edges, {} cycles resolved",
        analysis.graph.nodes().len(),
        analysis.graph.edges().len(),
        analysis.cycles.len()
    );
    for (mediator, cycle) in analysis.mediators.iter().zip(&analysis.cycles) {
        println!("  {mediator} <- {}", cycle.describe());
    }
    Ok(())
}

fn graph(args: GraphArgs) -> Result<()> {
    let (document, root) = load(&args.target)?;
    let options = CompileOptions {
        prune: !args.target.no_prune,
        ..CompileOptions::default()
    };

    let analysis = Compiler::with_options(&document.session, options)
        .check(root.as_str())
        .wrap_err("check failed")?;
    print_diagnostics(&analysis.diagnostics, &Denied::default())?;
    print!("{}", render_dot(&analysis.graph));
    Ok(())
}

/// Warnings promoted to errors with `-D`.
#[derive(Default)]
struct Denied {
    all: bool,
    codes: BTreeSet<String>,
}

impl Denied {
    fn from_args(args: &[String]) -> Self {
        let (all, codes): (Vec<&String>, Vec<&String>) =
            args.iter().partition(|arg| arg.as_str() == "warnings");
        Self {
            all: !all.is_empty(),
            codes: codes.into_iter().cloned().collect(),
        }
    }

    /// The flag that promotes a warning with `code`, if any does.
    fn flag_for(&self, code: &str) -> Option<String> {
        if self.all {
            Some("-D warnings".to_string())
        } else {
            self.codes.contains(code).then(|| format!("-D {code}"))
        }
    }
}

/// Render every diagnostic to stderr. Returns whether any of them counts as an error.
fn print_diagnostics<D: Diagnostic>(diagnostics: &[D], denied: &Denied) -> Result<bool> {
    let handler = GraphicalReportHandler::new();
    let mut failed = false;

    for diagnostic in diagnostics {
        let diagnostic: &dyn Diagnostic = diagnostic;
        let promoted = match diagnostic.severity() {
            Some(Severity::Warning) => diagnostic
                .code()
                .and_then(|code| denied.flag_for(&code.to_string())),
            _ => None,
        };

        match promoted {
            Some(flag) => {
                failed = true;
                render(&handler, &Promoted {
                    warning: diagnostic,
                    flag,
                })?;
            }
            None => {
                failed |= !matches!(
                    diagnostic.severity(),
                    Some(Severity::Warning | Severity::Advice)
                );
                render(&handler, diagnostic)?;
            }
        }
    }

    Ok(failed)
}

fn render(handler: &GraphicalReportHandler, diagnostic: &dyn Diagnostic) -> Result<()> {
    let mut out = String::new();
    handler
        .render_report(&mut out, diagnostic)
        .map_err(|_| miette::miette!("failed to render a diagnostic"))?;
    eprint!("{out}");
    Ok(())
}

/// A warning reported as an error.
#[derive(Debug)]
struct Promoted<'a> {
    warning: &'a dyn Diagnostic,
    flag: String,
}

impl fmt::Display for Promoted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.warning)
    }
}

impl std::error::Error for Promoted<'_> {}

impl Diagnostic for Promoted<'_> {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.warning.code()
    }

    fn severity(&self) -> Option<Severity> {
        Some(Severity::Error)
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let mut help = format!("denied by `{}`", self.flag);
        if let Some(extra) = self.warning.help() {
            help = format!("{help}\n{extra}");
        }
        Some(Box::new(help))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        self.warning.source_code()
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        self.warning.labels()
    }
}
