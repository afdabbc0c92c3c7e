//! Pipeline orchestration: fetch, resolve, compile, execute.
//!
//! The [`Orchestrator`] owns the long-lived collaborators (source fetcher,
//! package registry, framework pack layout) and drives one
//! [`ExecutionOptions`] request through the phases in order. Each phase
//! checks the cancellation signal at its boundary; the first fatal error
//! stops the pipeline and maps onto a stable exit code.

use std::path::PathBuf;
use std::sync::Arc;

use crate::compile::{
    compiler_for, CompileDriver, CompileInput, CompilerStrategy, Toolchain, WorkspaceCompiler,
};
use crate::error::{exit, Error, Result};
use crate::execute::{executor_for, ExecuteResult};
use crate::options::{CompilerKind, ExecutionOptions, ScriptFetcher, SourceDescriptor};
use crate::resolve::{PackLayout, RegistryClient, Resolver, ResolverSettings};

pub struct Orchestrator {
    fetcher: Box<dyn ScriptFetcher>,
    registry: Arc<dyn RegistryClient>,
    packs: PackLayout,
    /// Scratch root for compile staging and execution arenas.
    build_dir: PathBuf,
}

impl Orchestrator {
    pub fn new(fetcher: Box<dyn ScriptFetcher>, registry: Arc<dyn RegistryClient>) -> Self {
        let default_root = std::env::temp_dir().join("runlet");
        Self {
            fetcher,
            registry,
            packs: PackLayout::from_env(default_root.join("packs")),
            build_dir: default_root.join("build"),
        }
    }

    pub fn with_packs(mut self, packs: PackLayout) -> Self {
        self.packs = packs;
        self
    }

    pub fn with_build_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.build_dir = dir.into();
        self
    }

    /// Run one request through the whole pipeline.
    pub fn run(&self, options: &ExecutionOptions) -> Result<ExecuteResult> {
        options.cancel.check()?;

        let source = self.fetcher.fetch(&options.source)?;
        if source.trim().is_empty() {
            return Err(Error::InvalidSource("script source is empty".to_string()));
        }

        options.cancel.check()?;
        let toolchain = Toolchain::discover()?;
        tracing::info!(toolchain = toolchain.version(), "starting script run");

        let resolver = Resolver::new(
            self.registry.clone(),
            self.packs.clone(),
            ResolverSettings::from_options(options),
        );
        let driver = CompileDriver::new(toolchain, &self.build_dir);
        let compiler = self.compiler_for_options(options, driver);

        let unit_name = unit_name(&options.source);
        let input = CompileInput {
            name: &unit_name,
            source: &source,
            references: &options.references,
            usings: &options.usings,
            target: &options.target,
            entry_point: &options.entry_point,
        };

        let compiled = compiler.compile(&input, &resolver, &options.cancel)?;
        if !compiled.success {
            return Err(Error::Compile(compiled.diagnostics_text()));
        }
        let module = compiled
            .module
            .ok_or_else(|| Error::Machine("compiler reported success without a module".into()))?;

        if options.dry_run {
            tracing::info!(strategy = compiler.name(), "dry run, skipping execution");
            return Ok(ExecuteResult {
                success: true,
                exit_code: exit::SUCCESS,
                message: Some("compilation succeeded".to_string()),
            });
        }

        let executor = executor_for(options.executor, &self.build_dir.join("arena"));
        executor.execute(
            &module,
            &compiled.runtime_references,
            &options.args,
            &options.cancel,
        )
    }

    /// Like [`run`](Self::run), but folds every outcome into a process exit
    /// code. Cancellation is reported as an expected outcome, not an error.
    pub fn run_to_exit_code(&self, options: &ExecutionOptions) -> i32 {
        match self.run(options) {
            Ok(result) => {
                if !result.success {
                    if let Some(message) = &result.message {
                        tracing::error!("{message}");
                    }
                }
                result.exit_code
            }
            Err(e) if e.is_cancelled() => {
                tracing::info!("run cancelled");
                exit::CANCELLED
            }
            Err(e) => {
                tracing::error!("{e}");
                e.exit_code()
            }
        }
    }

    /// A file-backed workspace compile stages sibling sources for `mod`
    /// resolution; every other combination uses the plain factory.
    fn compiler_for_options(
        &self,
        options: &ExecutionOptions,
        driver: CompileDriver,
    ) -> Box<dyn CompilerStrategy> {
        match (&options.compiler, &options.source) {
            (CompilerKind::Workspace, SourceDescriptor::File(path)) => {
                let mut workspace = WorkspaceCompiler::new(driver);
                if let Some(dir) = path.parent() {
                    workspace = workspace.with_script_dir(dir);
                }
                Box::new(workspace)
            }
            (kind, _) => compiler_for(*kind, driver),
        }
    }
}

/// Translation unit name for staging: the file stem when the source is a
/// file, otherwise a fixed name. Non-identifier characters are mapped away
/// so the name is usable as a crate name.
fn unit_name(source: &SourceDescriptor) -> String {
    let raw = match source {
        SourceDescriptor::File(path) => path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "script".to_string()),
        SourceDescriptor::Inline(_) | SourceDescriptor::Url(_) => "script".to_string(),
    };

    let mut name: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if name.chars().next().is_none_or(|c| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}
