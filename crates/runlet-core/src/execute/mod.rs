//! Execution of compiled script modules.
//!
//! A module runs inside an [`ExecutionContext`], a throwaway arena that
//! owns the staged module file and every runtime library loaded for it.
//! Dropping the context unloads the libraries and reclaims the arena.

mod context;
mod entry;
mod in_process;
mod noop;

pub use context::ExecutionContext;
pub use in_process::InProcessExecutor;
pub use noop::NoopExecutor;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::cancel::AbortHandle;
use crate::compile::CompiledModule;
use crate::error::Result;
use crate::options::ExecutorKind;

/// Outcome of running a compiled module.
#[derive(Debug, Clone)]
pub struct ExecuteResult {
    /// Whether the module ran to completion without panicking.
    pub success: bool,
    /// The script's own exit code, passed through verbatim.
    pub exit_code: i32,
    pub message: Option<String>,
}

impl ExecuteResult {
    pub fn completed(exit_code: i32) -> Self {
        Self {
            success: true,
            exit_code,
            message: None,
        }
    }
}

/// An execution strategy.
pub trait ExecutorStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn execute(
        &self,
        module: &CompiledModule,
        runtime_references: &BTreeSet<PathBuf>,
        args: &[String],
        cancel: &AbortHandle,
    ) -> Result<ExecuteResult>;
}

/// Select the executor for a configured kind.
pub fn executor_for(kind: ExecutorKind, arena_dir: &Path) -> Box<dyn ExecutorStrategy> {
    match kind {
        ExecutorKind::InProcess => Box::new(InProcessExecutor::new(PathBuf::from(arena_dir))),
        ExecutorKind::Noop => Box::new(NoopExecutor),
    }
}
