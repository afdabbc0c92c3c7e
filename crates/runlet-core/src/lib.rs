//! Core engine for the runlet script runner.
//!
//! This crate provides:
//! - Reference resolution (files, folders, projects, frameworks, packages)
//! - Compilation strategies with an application/library entry fallback
//! - Isolated, reclaimable in-process execution of compiled modules
//! - Pipeline orchestration with stable exit codes

pub mod cancel;
pub mod compile;
pub mod error;
pub mod execute;
pub mod options;
pub mod orchestrate;
pub mod resolve;

pub use cancel::AbortHandle;
pub use error::{exit, Error, Result};
pub use compile::{
    compiler_for, CompileDriver, CompileInput, CompileResult, CompiledModule, CompilerStrategy,
    Diagnostic, EntryKind, ScriptCompiler, Severity, SimpleCompiler, Toolchain, WorkspaceCompiler,
};
pub use execute::{
    executor_for, ExecuteResult, ExecutionContext, ExecutorStrategy, InProcessExecutor,
    NoopExecutor,
};
pub use options::{
    CompilerKind, ConfigSource, ExecutionOptions, ExecutorKind, OptionDefaults, ScriptFetcher,
    SourceDescriptor, UsingDirective, DEFAULT_ENTRY_POINT,
};
pub use orchestrate::Orchestrator;
pub use resolve::{
    DirectoryRegistry, PackLayout, ReferenceSpecifier, RegistryClient, ResolutionCache, Resolver,
    ResolverSettings,
};
