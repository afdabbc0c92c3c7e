//! Entry-point discovery in a loaded module.

use std::os::raw::c_char;

use crate::compile::{EntryKind, APPLICATION_EXPORT, LIBRARY_EXPORT};
use crate::error::{Error, Result};

use super::context::ExecutionContext;

/// The generated entry export's signature.
///
/// Returns 0 when the script completed (its exit code is written through
/// the out parameter) and 1 when it panicked.
pub(crate) type EntryFn =
    unsafe extern "C" fn(argc: usize, argv: *const *const c_char, exit_code: *mut i32) -> i32;

/// Probe the module for its entry export.
///
/// The kind recorded at compile time is probed first; the other export is
/// tried before giving up so externally produced modules still run.
pub(crate) fn resolve_entry(context: &ExecutionContext, kind: EntryKind) -> Result<EntryFn> {
    let order: [&str; 2] = match kind {
        EntryKind::Application => [APPLICATION_EXPORT, LIBRARY_EXPORT],
        EntryKind::Library => [LIBRARY_EXPORT, APPLICATION_EXPORT],
    };

    for export in order {
        let symbol = format!("{export}\0");
        if context.has_symbol(symbol.as_bytes()) {
            let entry = unsafe { context.get::<EntryFn>(symbol.as_bytes())? };
            return Ok(*entry);
        }
    }

    Err(Error::NoEntryPoint(format!(
        "module exports neither `{APPLICATION_EXPORT}` nor `{LIBRARY_EXPORT}`"
    )))
}
