//! runlet CLI - compile and run Rust scripts.

mod config;
mod fetch;

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use runlet_core::{
    CompilerKind, ConfigSource, DirectoryRegistry, ExecutionOptions, ExecutorKind, Orchestrator,
    SourceDescriptor,
};

use config::ProfileConfig;
use fetch::LocalFetcher;

#[derive(Parser)]
#[command(name = "runlet")]
#[command(about = "Compile and run Rust scripts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script file (or URL, when a fetcher is available)
    Run {
        /// Path to the script
        script: String,

        #[command(flatten)]
        options: InvocationArgs,

        /// Arguments passed to the script, after `--`
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Evaluate source text given on the command line
    Eval {
        /// Script source text
        code: String,

        #[command(flatten)]
        options: InvocationArgs,

        /// Arguments passed to the script, after `--`
        #[arg(last = true)]
        args: Vec<String>,
    },
}

#[derive(Args)]
struct InvocationArgs {
    /// Add a reference specifier (repeatable): a path, `folder:`, `project:`,
    /// `framework:` or `nuget:<id>[,version]`
    #[arg(short = 'r', long = "reference", value_name = "SPEC")]
    references: Vec<String>,

    /// Add a using directive (repeatable); prefix with `-` to remove one
    #[arg(short = 'u', long = "using", value_name = "DIRECTIVE", allow_hyphen_values = true)]
    usings: Vec<String>,

    /// Compiler strategy: simple, workspace or script
    #[arg(long)]
    compiler: Option<String>,

    /// Executor strategy: in-process or noop
    #[arg(long)]
    executor: Option<String>,

    /// Entry-point name for scripts without `main`
    #[arg(long, value_name = "NAME")]
    entry_point: Option<String>,

    /// Target moniker (a Rust edition such as 2021)
    #[arg(long)]
    target: Option<String>,

    /// Compile only, skip execution
    #[arg(long)]
    dry_run: bool,

    /// Bypass the per-invocation resolution cache
    #[arg(long)]
    no_cache: bool,

    /// Also resolve the wide helper reference packs
    #[arg(long)]
    wide: bool,

    /// Also resolve the web helper reference packs
    #[arg(long)]
    web: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let (source, invocation, args) = match cli.command {
        Commands::Run {
            script,
            options,
            args,
        } => (fetch::descriptor_for(&script), options, args),
        Commands::Eval {
            code,
            options,
            args,
        } => (SourceDescriptor::Inline(code), options, args),
    };

    let defaults = ProfileConfig::standard().defaults();
    let options = build_options(source, invocation, args, &defaults)?;

    let registry = DirectoryRegistry::new(registry_root());
    let orchestrator = Orchestrator::new(Box::new(LocalFetcher), Arc::new(registry));

    std::process::exit(orchestrator.run_to_exit_code(&options));
}

/// Profile defaults go in first so an explicit flag always wins, even when
/// its value happens to equal the built-in default.
fn build_options(
    source: SourceDescriptor,
    invocation: InvocationArgs,
    args: Vec<String>,
    defaults: &runlet_core::OptionDefaults,
) -> anyhow::Result<ExecutionOptions> {
    let mut options = ExecutionOptions::new(source)
        .with_references(invocation.references)
        .with_usings(invocation.usings)
        .with_args(args)
        .merge_defaults(defaults);

    if let Some(compiler) = invocation.compiler.as_deref() {
        options = options.with_compiler(CompilerKind::from_str(compiler)?);
    }
    if let Some(executor) = invocation.executor.as_deref() {
        options = options.with_executor(ExecutorKind::from_str(executor)?);
    }
    if let Some(entry_point) = invocation.entry_point {
        options = options.with_entry_point(entry_point);
    }
    if let Some(target) = invocation.target {
        options = options.with_target(target);
    }

    options.dry_run = invocation.dry_run;
    options.no_cache = invocation.no_cache;
    options.include_wide_references = invocation.wide;
    options.include_web_references = invocation.web;
    Ok(options)
}

/// Registry root: `RUNLET_REGISTRY_ROOT`, else the platform data directory.
fn registry_root() -> PathBuf {
    if let Some(root) = std::env::var_os("RUNLET_REGISTRY_ROOT") {
        return PathBuf::from(root);
    }
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("runlet")
        .join("registry")
}
