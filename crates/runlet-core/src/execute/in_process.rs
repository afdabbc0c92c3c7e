//! In-process executor: loads the module and calls its entry export.

use std::collections::BTreeSet;
use std::ffi::CString;
use std::os::raw::c_char;
use std::path::PathBuf;

use crate::cancel::AbortHandle;
use crate::compile::CompiledModule;
use crate::error::{Error, Result};

use super::context::ExecutionContext;
use super::entry;
use super::{ExecuteResult, ExecutorStrategy};

/// Script name reported as argv[0].
const ARGV0: &str = "script";

pub struct InProcessExecutor {
    arena_base: PathBuf,
}

impl InProcessExecutor {
    pub fn new(arena_base: PathBuf) -> Self {
        Self { arena_base }
    }
}

impl ExecutorStrategy for InProcessExecutor {
    fn name(&self) -> &'static str {
        "in-process"
    }

    fn execute(
        &self,
        module: &CompiledModule,
        runtime_references: &BTreeSet<PathBuf>,
        args: &[String],
        cancel: &AbortHandle,
    ) -> Result<ExecuteResult> {
        cancel.check()?;

        let mut context = ExecutionContext::create(&self.arena_base)?;
        context.load_module(module, runtime_references)?;
        let entry = entry::resolve_entry(&context, module.entry)?;

        cancel.check()?;

        // argv stays alive for the whole call through `storage`
        let mut storage = Vec::with_capacity(args.len() + 1);
        storage.push(CString::new(ARGV0).map_err(|e| Error::Execute(e.to_string()))?);
        for arg in args {
            storage.push(
                CString::new(arg.as_str())
                    .map_err(|_| Error::Execute(format!("argument contains NUL byte: {arg:?}")))?,
            );
        }
        let argv: Vec<*const c_char> = storage.iter().map(|s| s.as_ptr()).collect();

        let mut exit_code = 0i32;
        let status = unsafe { entry(argv.len(), argv.as_ptr(), &mut exit_code) };
        drop(context);

        cancel.check()?;

        if status == 0 {
            tracing::debug!(exit_code, "script completed");
            Ok(ExecuteResult::completed(exit_code))
        } else {
            Ok(ExecuteResult {
                success: false,
                exit_code: crate::error::exit::EXECUTE,
                message: Some("script panicked during execution".to_string()),
            })
        }
    }
}
