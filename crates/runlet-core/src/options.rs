//! Execution options and the narrow collaborator contracts that feed them.
//!
//! An [`ExecutionOptions`] value identifies one compilation + execution
//! request. It is constructed once per invocation (merged over a
//! [`ConfigSource`]'s defaults during the configure stage) and is immutable
//! afterwards.

use std::path::PathBuf;
use std::str::FromStr;

use crate::cancel::AbortHandle;
use crate::error::{Error, Result};

/// Where the script text comes from.
///
/// Descriptors are turned into raw source text by an external
/// [`ScriptFetcher`] before the core pipeline runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    /// Source text supplied inline.
    Inline(String),
    /// Path to a local source file.
    File(PathBuf),
    /// Remote script location; fetching is a host concern.
    Url(String),
}

/// Compiler strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompilerKind {
    /// Compile exactly the given text plus the baseline libraries.
    Simple,
    /// Full-featured strategy: using injection, reference resolution,
    /// project-shaped input.
    #[default]
    Workspace,
    /// Expression-oriented strategy mimicking interactive evaluation.
    Script,
}

impl CompilerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompilerKind::Simple => "simple",
            CompilerKind::Workspace => "workspace",
            CompilerKind::Script => "script",
        }
    }
}

impl FromStr for CompilerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "simple" => Ok(CompilerKind::Simple),
            "workspace" => Ok(CompilerKind::Workspace),
            "script" => Ok(CompilerKind::Script),
            other => Err(Error::InvalidSource(format!(
                "unknown compiler strategy `{other}`"
            ))),
        }
    }
}

/// Executor strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExecutorKind {
    /// Load the module into an isolated in-process context and invoke it.
    #[default]
    InProcess,
    /// Succeed without executing; used for dry runs and compile-only tests.
    Noop,
}

impl ExecutorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutorKind::InProcess => "in-process",
            ExecutorKind::Noop => "noop",
        }
    }
}

impl FromStr for ExecutorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in-process" | "inprocess" => Ok(ExecutorKind::InProcess),
            "noop" => Ok(ExecutorKind::Noop),
            other => Err(Error::InvalidSource(format!(
                "unknown executor strategy `{other}`"
            ))),
        }
    }
}

/// Default entry-point identifier probed when a module is compiled as a
/// library.
pub const DEFAULT_ENTRY_POINT: &str = "main";

/// One compilation + execution request.
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Source descriptor, resolved to raw text by a [`ScriptFetcher`].
    pub source: SourceDescriptor,

    /// Target moniker (a version string, e.g. an edition such as "2021").
    pub target: String,

    /// Raw, unparsed reference specifiers.
    pub references: Vec<String>,

    /// Raw using-directive specifiers.
    pub usings: Vec<String>,

    /// Chosen compiler strategy.
    pub compiler: CompilerKind,

    /// Chosen executor strategy.
    pub executor: ExecutorKind,

    /// Entry-point name probed on library-fallback modules.
    pub entry_point: String,

    /// Argument vector passed to the executed module.
    pub args: Vec<String>,

    /// Cancellation signal threaded through every phase.
    pub cancel: AbortHandle,

    /// Union in the fixed baseline set of always-available helper libraries.
    pub include_wide_references: bool,

    /// Also union in the web helper pack.
    pub include_web_references: bool,

    /// Stop after a successful compile.
    pub dry_run: bool,

    /// Bypass the per-invocation resolution cache.
    pub no_cache: bool,
}

impl ExecutionOptions {
    /// Create options for a source descriptor with defaults everywhere else.
    pub fn new(source: SourceDescriptor) -> Self {
        Self {
            source,
            target: String::new(),
            references: Vec::new(),
            usings: Vec::new(),
            compiler: CompilerKind::default(),
            executor: ExecutorKind::default(),
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            args: Vec::new(),
            cancel: AbortHandle::new(),
            include_wide_references: false,
            include_web_references: false,
            dry_run: false,
            no_cache: false,
        }
    }

    /// Merge configured defaults into fields still at their built-in values.
    ///
    /// Apply this before explicit per-invocation overrides: a field holding
    /// the built-in value is treated as unset here, so an override applied
    /// afterwards wins even when it equals the built-in. Reference and using
    /// lists are prepended so an invocation's own entries stay last (and
    /// therefore win ties such as using removal ordering not mattering).
    pub fn merge_defaults(mut self, defaults: &OptionDefaults) -> Self {
        if self.target.is_empty() {
            if let Some(target) = &defaults.target {
                self.target = target.clone();
            }
        }
        if self.entry_point == DEFAULT_ENTRY_POINT {
            if let Some(entry) = &defaults.entry_point {
                self.entry_point = entry.clone();
            }
        }
        if let Some(compiler) = defaults.compiler {
            if self.compiler == CompilerKind::default() {
                self.compiler = compiler;
            }
        }
        if let Some(executor) = defaults.executor {
            if self.executor == ExecutorKind::default() {
                self.executor = executor;
            }
        }
        let mut references = defaults.references.clone();
        references.append(&mut self.references);
        self.references = references;

        let mut usings = defaults.usings.clone();
        usings.append(&mut self.usings);
        self.usings = usings;

        self
    }

    pub fn with_references(mut self, references: Vec<String>) -> Self {
        self.references = references;
        self
    }

    pub fn with_usings(mut self, usings: Vec<String>) -> Self {
        self.usings = usings;
        self
    }

    pub fn with_compiler(mut self, compiler: CompilerKind) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn with_executor(mut self, executor: ExecutorKind) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_cancel(mut self, cancel: AbortHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// The effective using-directive set for this invocation.
    pub fn effective_usings(&self) -> Vec<UsingDirective> {
        UsingDirective::effective_set(&self.usings)
    }
}

/// Default option values supplied by a configuration profile.
#[derive(Debug, Clone, Default)]
pub struct OptionDefaults {
    pub target: Option<String>,
    pub entry_point: Option<String>,
    pub compiler: Option<CompilerKind>,
    pub executor: Option<ExecutorKind>,
    pub references: Vec<String>,
    pub usings: Vec<String>,
}

/// Collaborator contract: returns raw source text for a descriptor.
pub trait ScriptFetcher {
    fn fetch(&self, descriptor: &SourceDescriptor) -> Result<String>;
}

/// Collaborator contract: supplies default option values merged before the
/// core's options are finalized.
pub trait ConfigSource {
    fn defaults(&self) -> OptionDefaults;
}

/// A parsed using directive.
///
/// Grammar: bare `ns` adds a plain import, `static ns` adds a glob import,
/// `alias = ns` adds an aliased import, and a leading `-` before any of the
/// above removes the same target instead of adding it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UsingDirective {
    Plain(String),
    Static(String),
    Alias { alias: String, path: String },
}

impl UsingDirective {
    /// Parse one raw specifier. Returns `(directive, is_removal)`; malformed
    /// specifiers yield `None` and are skipped.
    pub fn parse(raw: &str) -> Option<(Self, bool)> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let (body, removal) = match trimmed.strip_prefix('-') {
            Some(rest) => (rest.trim_start(), true),
            None => (trimmed, false),
        };
        if body.is_empty() {
            return None;
        }

        if let Some(path) = body.strip_prefix("static ") {
            let path = path.trim();
            if path.is_empty() {
                return None;
            }
            return Some((UsingDirective::Static(path.to_string()), removal));
        }

        if let Some((alias, path)) = body.split_once('=') {
            let alias = alias.trim();
            let path = path.trim();
            if alias.is_empty() || path.is_empty() {
                return None;
            }
            return Some((
                UsingDirective::Alias {
                    alias: alias.to_string(),
                    path: path.to_string(),
                },
                removal,
            ));
        }

        Some((UsingDirective::Plain(body.to_string()), removal))
    }

    /// Compute the effective set: adds applied first, then removes.
    ///
    /// Removal always wins over addition of the same target regardless of
    /// input ordering. First-seen order of surviving adds is preserved.
    pub fn effective_set(raw: &[String]) -> Vec<UsingDirective> {
        let mut adds: Vec<UsingDirective> = Vec::new();
        let mut removes: Vec<UsingDirective> = Vec::new();

        for spec in raw {
            match Self::parse(spec) {
                Some((directive, true)) => removes.push(directive),
                Some((directive, false)) => {
                    if !adds.contains(&directive) {
                        adds.push(directive);
                    }
                }
                None => {
                    tracing::debug!(spec = %spec, "skipping malformed using directive");
                }
            }
        }

        adds.retain(|d| !removes.contains(d));
        adds
    }

    /// Render as a `use` item.
    pub fn render(&self) -> String {
        match self {
            UsingDirective::Plain(path) => format!("use {path};"),
            UsingDirective::Static(path) => format!("use {path}::*;"),
            UsingDirective::Alias { alias, path } => format!("use {path} as {alias};"),
        }
    }
}
