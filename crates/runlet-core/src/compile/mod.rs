//! Script compilation pipeline.
//!
//! Turns script source plus resolved references into a loadable binary
//! module by shelling out to `rustc`. Three strategies share one driver:
//!
//! - [`SimpleCompiler`]: the source as a single translation unit
//! - [`WorkspaceCompiler`]: using-directive injection and sibling-file
//!   staging around the main source (the default)
//! - [`ScriptCompiler`]: accepts bare expressions and statement lists and
//!   wraps them into a program before compiling
//!
//! Each strategy first compiles the source as an application. When that
//! fails only because no entry point exists, it retries as a library with
//! a generated dispatch export, so scripts that are plain function
//! collections still run.

pub mod diagnostics;
mod driver;
mod script;
mod shim;
mod simple;
mod toolchain;
mod workspace;

pub use diagnostics::{Diagnostic, Severity};
pub use driver::CompileDriver;
pub use shim::{APPLICATION_EXPORT, LIBRARY_EXPORT};
pub use simple::SimpleCompiler;
pub use script::ScriptCompiler;
pub use toolchain::Toolchain;
pub use workspace::WorkspaceCompiler;

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::cancel::AbortHandle;
use crate::error::Result;
use crate::options::CompilerKind;
use crate::resolve::Resolver;

/// How the compiled module expects to be entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// The script declared `main`; the module exports `__rl_main`.
    Application,
    /// No `main`; a discovered entry function is exported as `__rl_entry`.
    Library,
}

/// A compiled binary module, held in memory until execution stages it.
#[derive(Debug, Clone)]
pub struct CompiledModule {
    /// Raw dylib bytes.
    pub bytes: Vec<u8>,
    /// File name the bytes were produced under (extension matters to the
    /// platform loader).
    pub file_name: String,
    pub entry: EntryKind,
}

/// Outcome of one compilation, failed or not.
#[derive(Debug, Clone)]
pub struct CompileResult {
    pub success: bool,
    pub diagnostics: Vec<Diagnostic>,
    /// Present only on success.
    pub module: Option<CompiledModule>,
    /// Execute-mode reference resolution, for the loader's dependency hook.
    pub runtime_references: BTreeSet<PathBuf>,
}

impl CompileResult {
    pub fn failed(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            success: false,
            diagnostics,
            module: None,
            runtime_references: BTreeSet::new(),
        }
    }

    /// All error-level diagnostics rendered as one displayable block.
    pub fn diagnostics_text(&self) -> String {
        let mut out = String::new();
        for diag in &self.diagnostics {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&diag.display_line());
        }
        out
    }
}

/// One compilation request, borrowed from the invocation options.
#[derive(Debug, Clone, Copy)]
pub struct CompileInput<'a> {
    /// Translation unit name, used for staging file names.
    pub name: &'a str,
    pub source: &'a str,
    /// Raw reference specifiers, resolved per compile/execute mode.
    pub references: &'a [String],
    /// Raw using directives; only the workspace strategy applies them.
    pub usings: &'a [String],
    /// Target moniker; recognized Rust editions pass through to rustc.
    pub target: &'a str,
    /// Preferred entry function name for the library fallback.
    pub entry_point: &'a str,
}

/// A compilation strategy.
///
/// Implementations must be pure with respect to their input: the same
/// input and resolved references produce an equivalent module.
pub trait CompilerStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn compile(
        &self,
        input: &CompileInput<'_>,
        resolver: &Resolver,
        cancel: &AbortHandle,
    ) -> Result<CompileResult>;
}

/// Select the strategy for a configured compiler kind.
pub fn compiler_for(kind: CompilerKind, driver: CompileDriver) -> Box<dyn CompilerStrategy> {
    match kind {
        CompilerKind::Simple => Box::new(SimpleCompiler::new(driver)),
        CompilerKind::Workspace => Box::new(WorkspaceCompiler::new(driver)),
        CompilerKind::Script => Box::new(ScriptCompiler::new(driver)),
    }
}

/// Resolve both reference surfaces for one compilation.
///
/// Compile-mode paths feed the rustc invocation; execute-mode paths ride
/// along in the result for the runtime loader.
pub(crate) fn resolve_surfaces(
    input: &CompileInput<'_>,
    resolver: &Resolver,
    cancel: &AbortHandle,
) -> Result<(BTreeSet<PathBuf>, BTreeSet<PathBuf>)> {
    let compile_refs = resolver.resolve(input.references, input.target, true, cancel)?;
    let runtime_refs = resolver.resolve(input.references, input.target, false, cancel)?;
    Ok((compile_refs, runtime_refs))
}
