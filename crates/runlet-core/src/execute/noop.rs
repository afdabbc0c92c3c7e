//! Executor that validates the module without running it.

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::cancel::AbortHandle;
use crate::compile::CompiledModule;
use crate::error::Result;

use super::{ExecuteResult, ExecutorStrategy};

/// Reports success without loading or calling anything. Useful when only
/// the compile outcome matters.
pub struct NoopExecutor;

impl ExecutorStrategy for NoopExecutor {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn execute(
        &self,
        module: &CompiledModule,
        _runtime_references: &BTreeSet<PathBuf>,
        _args: &[String],
        cancel: &AbortHandle,
    ) -> Result<ExecuteResult> {
        cancel.check()?;
        tracing::debug!(
            bytes = module.bytes.len(),
            module = %module.file_name,
            "skipping execution"
        );
        Ok(ExecuteResult::completed(0))
    }
}
