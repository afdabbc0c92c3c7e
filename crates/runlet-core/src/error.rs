//! Error types for runlet-core.

use thiserror::Error;

/// Result type for runlet-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving, compiling or executing a script.
///
/// Every phase of the pipeline returns a `Result` instead of raising past its
/// own boundary; the orchestrator maps the first fatal error onto a stable
/// process exit code via [`Error::exit_code`].
#[derive(Debug, Error)]
pub enum Error {
    /// The script source could not be fetched.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// The script source was empty or otherwise unusable.
    #[error("invalid script source: {0}")]
    InvalidSource(String),

    /// A reference specifier could not be resolved.
    #[error("resolution error: {0}")]
    Resolution(String),

    /// Compilation produced fatal diagnostics (after the library fallback).
    #[error("compilation failed:\n{0}")]
    Compile(String),

    /// Library-fallback compile succeeded but no matching entry method exists.
    #[error("no entry point found: {0}")]
    NoEntryPoint(String),

    /// The executed script itself raised an error at run time.
    #[error("execution error: {0}")]
    Execute(String),

    /// The cancellation signal was observed during a phase.
    #[error("operation cancelled")]
    Cancelled,

    /// The execution machinery faulted (context creation, module load, toolchain).
    #[error("execution machinery error: {0}")]
    Machine(String),

    /// Failed to load a dynamic library into the execution context.
    #[error("failed to load library: {0}")]
    LibraryLoad(#[from] libloading::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable process exit codes, one per fatal cause, so calling scripts can
/// branch on why a run failed.
pub mod exit {
    pub const SUCCESS: i32 = 0;
    pub const FETCH: i32 = 3;
    pub const COMPILE: i32 = 4;
    pub const EXECUTE: i32 = 5;
    pub const CANCELLED: i32 = 6;
    pub const MACHINE: i32 = 7;
    // 1 and 2 are left to the shell and to CLI usage errors.
    pub const INVALID_SOURCE: i32 = 8;
}

impl Error {
    /// Map this error to its process exit code.
    ///
    /// Resolution failures map to the compile code: references are resolved
    /// on behalf of a compilation, so that is the phase a caller observes.
    /// `NoEntryPoint` maps to the execute code because it is discovered by
    /// the executor after a successful fallback compile.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Fetch(_) => exit::FETCH,
            Error::InvalidSource(_) => exit::INVALID_SOURCE,
            Error::Resolution(_) | Error::Compile(_) => exit::COMPILE,
            Error::NoEntryPoint(_) | Error::Execute(_) => exit::EXECUTE,
            Error::Cancelled => exit::CANCELLED,
            Error::Machine(_) | Error::LibraryLoad(_) | Error::Io(_) => exit::MACHINE,
        }
    }

    /// Whether this error represents cancellation rather than failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_per_cause() {
        let codes = [
            Error::InvalidSource("".into()).exit_code(),
            Error::Fetch("".into()).exit_code(),
            Error::Compile("".into()).exit_code(),
            Error::Execute("".into()).exit_code(),
            Error::Cancelled.exit_code(),
            Error::Machine("".into()).exit_code(),
        ];
        let mut deduped = codes.to_vec();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(deduped.len(), codes.len());
        assert!(!codes.contains(&exit::SUCCESS));
        // clap reports usage errors as 2; ours must stay clear of it.
        assert!(!codes.contains(&2));
    }

    #[test]
    fn cancellation_is_not_a_failure() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::Execute("boom".into()).is_cancelled());
    }
}
