//! Reference resolution engine.
//!
//! Dispatches each dependency specifier to one of five resolution strategies
//! and merges the results into a deduplicated set of binary module paths:
//!
//! | Prefix       | Strategy                                   |
//! |--------------|--------------------------------------------|
//! | `nuget:`     | registry package, optional pinned version  |
//! | `framework:` | shared framework by name                   |
//! | `folder:`    | all binaries in a directory                |
//! | `project:`   | a project manifest's own references        |
//! | *(none)*     | a direct file path                         |
//!
//! Specifiers resolve independently and concurrently; completion order never
//! affects final set membership. Malformed specifiers are skipped; a failing
//! branch surfaces the first failure without aborting completed siblings.

mod cache;
pub mod framework;
mod package;
pub mod project;
pub mod registry;

pub use cache::{CacheKey, ResolutionCache};
pub use framework::PackLayout;
pub use registry::{DirectoryRegistry, RegistryClient};

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use semver::Version;

use crate::cancel::AbortHandle;
use crate::error::{Error, Result};
use crate::options::ExecutionOptions;

use framework::FrameworkEnv;

/// A classified dependency specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceSpecifier {
    File(PathBuf),
    Folder(PathBuf),
    Project(PathBuf),
    Framework(String),
    Package {
        id: String,
        version: Option<Version>,
    },
}

impl ReferenceSpecifier {
    /// Classify a raw specifier string by recognized prefix.
    ///
    /// Returns `None` for malformed specifiers, which are skipped rather
    /// than treated as hard failures.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if let Some(body) = raw.strip_prefix("nuget:") {
            let (id, version) = match body.split_once(',') {
                Some((id, version)) => {
                    let version = parse_version(version.trim())?;
                    (id.trim(), Some(version))
                }
                None => (body.trim(), None),
            };
            if id.is_empty() {
                return None;
            }
            return Some(ReferenceSpecifier::Package {
                id: id.to_string(),
                version,
            });
        }

        if let Some(name) = raw.strip_prefix("framework:") {
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            return Some(ReferenceSpecifier::Framework(name.to_string()));
        }

        if let Some(path) = raw.strip_prefix("folder:") {
            return Some(ReferenceSpecifier::Folder(PathBuf::from(path.trim())));
        }

        if let Some(path) = raw.strip_prefix("project:") {
            return Some(ReferenceSpecifier::Project(PathBuf::from(path.trim())));
        }

        Some(ReferenceSpecifier::File(PathBuf::from(raw)))
    }

    /// Operation name used as the first component of the cache key.
    pub fn operation(&self) -> String {
        match self {
            ReferenceSpecifier::File(p) => format!("file:{}", p.display()),
            ReferenceSpecifier::Folder(p) => format!("folder:{}", p.display()),
            ReferenceSpecifier::Project(p) => format!("project:{}", p.display()),
            ReferenceSpecifier::Framework(name) => format!("framework:{name}"),
            ReferenceSpecifier::Package { id, version } => match version {
                Some(v) => format!("package:{id}@{v}"),
                None => format!("package:{id}"),
            },
        }
    }
}

/// Resolver behavior flags, derived from one invocation's options.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub no_cache: bool,
    pub include_wide_references: bool,
    pub include_web_references: bool,
    /// Fall back to a registry reference-assemblies package when a framework
    /// has no local reference pack.
    pub registry_fallback: bool,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            no_cache: false,
            include_wide_references: false,
            include_web_references: false,
            registry_fallback: true,
        }
    }
}

impl ResolverSettings {
    pub fn from_options(options: &ExecutionOptions) -> Self {
        Self {
            no_cache: options.no_cache,
            include_wide_references: options.include_wide_references,
            include_web_references: options.include_web_references,
            ..Self::default()
        }
    }
}

/// Resolves heterogeneous reference specifiers into binary module paths.
///
/// One resolver (and its cache) lives exactly as long as one invocation.
pub struct Resolver {
    registry: Arc<dyn RegistryClient>,
    packs: PackLayout,
    cache: ResolutionCache,
    settings: ResolverSettings,
}

impl Resolver {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        packs: PackLayout,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            registry,
            packs,
            cache: ResolutionCache::new(settings.no_cache),
            settings,
        }
    }

    /// Resolve raw specifiers into a deduplicated set of module paths.
    ///
    /// `compilation` selects the compile-time surface (reference packs) over
    /// the execute-time one (runtime libraries). Every top-level specifier
    /// resolves concurrently; the join surfaces the first branch failure.
    pub fn resolve(
        &self,
        raw_specifiers: &[String],
        target: &str,
        compilation: bool,
        cancel: &AbortHandle,
    ) -> Result<BTreeSet<PathBuf>> {
        cancel.check()?;

        let specifiers = self.classify(raw_specifiers);

        let sets = specifiers
            .par_iter()
            .map(|spec| self.resolve_one(spec, target, compilation, cancel))
            .collect::<Result<Vec<_>>>()?;

        let mut merged = BTreeSet::new();
        for set in sets {
            merged.extend(set);
        }
        tracing::debug!(
            specifiers = specifiers.len(),
            resolved = merged.len(),
            compilation,
            "reference resolution complete"
        );
        Ok(merged)
    }

    /// Classify raw strings, coalesce duplicate package requests, and drop
    /// exact duplicates.
    fn classify(&self, raw: &[String]) -> Vec<ReferenceSpecifier> {
        let parsed = raw.iter().filter_map(|spec| {
            let classified = ReferenceSpecifier::parse(spec);
            if classified.is_none() {
                tracing::debug!(spec = %spec, "skipping malformed reference specifier");
            }
            classified
        });

        let coalesced = coalesce_packages(parsed.collect());

        let mut seen = FxHashSet::default();
        coalesced
            .into_iter()
            .filter(|spec| seen.insert(spec.operation()))
            .collect()
    }

    fn resolve_one(
        &self,
        spec: &ReferenceSpecifier,
        target: &str,
        compilation: bool,
        cancel: &AbortHandle,
    ) -> Result<BTreeSet<PathBuf>> {
        cancel.check()?;
        let key = (spec.operation(), compilation);
        self.cache.get_or_compute(key, false, || {
            self.dispatch(spec, target, compilation, cancel)
        })
    }

    fn dispatch(
        &self,
        spec: &ReferenceSpecifier,
        target: &str,
        compilation: bool,
        cancel: &AbortHandle,
    ) -> Result<BTreeSet<PathBuf>> {
        match spec {
            ReferenceSpecifier::File(path) => Ok(resolve_file(path)),
            ReferenceSpecifier::Folder(path) => collect_binary_modules(path),
            ReferenceSpecifier::Project(path) => {
                self.resolve_project(path, target, compilation, cancel)
            }
            ReferenceSpecifier::Framework(name) => framework::resolve_framework(
                &self.framework_env(),
                name,
                target,
                compilation,
                cancel,
            ),
            ReferenceSpecifier::Package { id, version } => package::resolve_package(
                self.registry.as_ref(),
                id,
                version.as_ref(),
                target,
                cancel,
            ),
        }
    }

    /// Resolve a project manifest's direct references through the
    /// package/framework strategies.
    fn resolve_project(
        &self,
        manifest: &Path,
        target: &str,
        compilation: bool,
        cancel: &AbortHandle,
    ) -> Result<BTreeSet<PathBuf>> {
        let references = project::read_manifest(manifest)?;
        let mut merged = BTreeSet::new();

        for dep in &references.packages {
            cancel.check()?;
            merged.extend(package::resolve_package(
                self.registry.as_ref(),
                &dep.id,
                dep.version.as_ref(),
                target,
                cancel,
            )?);
        }
        for name in &references.frameworks {
            cancel.check()?;
            merged.extend(framework::resolve_framework(
                &self.framework_env(),
                name,
                target,
                compilation,
                cancel,
            )?);
        }
        Ok(merged)
    }

    fn framework_env(&self) -> FrameworkEnv<'_> {
        FrameworkEnv {
            packs: &self.packs,
            registry: self.registry.as_ref(),
            registry_fallback: self.settings.registry_fallback,
            include_wide: self.settings.include_wide_references,
            include_web: self.settings.include_web_references,
        }
    }
}

/// Coalesce repeated package specifiers for the same id.
///
/// An explicit version wins over an unpinned request; across multiple
/// explicit versions the highest requested one is used. First-occurrence
/// order is preserved for determinism.
fn coalesce_packages(specs: Vec<ReferenceSpecifier>) -> Vec<ReferenceSpecifier> {
    let mut picked: FxHashMap<String, Option<Version>> = FxHashMap::default();
    let mut package_order: Vec<String> = Vec::new();
    let mut others: Vec<ReferenceSpecifier> = Vec::new();
    let mut layout: Vec<Option<String>> = Vec::new();

    for spec in specs {
        match spec {
            ReferenceSpecifier::Package { id, version } => {
                match picked.get_mut(&id) {
                    Some(existing) => {
                        if let Some(version) = version {
                            let replace = match existing {
                                Some(current) => version > *current,
                                None => true,
                            };
                            if replace {
                                *existing = Some(version);
                            }
                        }
                    }
                    None => {
                        package_order.push(id.clone());
                        picked.insert(id.clone(), version);
                        layout.push(Some(id));
                        continue;
                    }
                }
            }
            other => {
                others.push(other);
                layout.push(None);
            }
        }
    }

    let mut others = others.into_iter();
    layout
        .into_iter()
        .map(|slot| match slot {
            Some(id) => {
                let version = picked.remove(&id).flatten();
                ReferenceSpecifier::Package { id, version }
            }
            None => others.next().expect("layout tracks one entry per other"),
        })
        .collect()
}

/// File specifier: valid only if the path exists, otherwise contributes
/// nothing.
fn resolve_file(path: &Path) -> BTreeSet<PathBuf> {
    if path.exists() {
        let absolute = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        BTreeSet::from([absolute])
    } else {
        tracing::debug!(path = %path.display(), "file reference does not exist, dropping");
        BTreeSet::new()
    }
}

/// Binary module extensions recognized by the folder/framework strategies.
const MODULE_EXTENSIONS: &[&str] = &["so", "dylib", "dll", "rlib", "rmeta"];

/// Whether a path looks like a binary module.
pub fn is_binary_module(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| MODULE_EXTENSIONS.contains(&ext))
}

/// Enumerate all binary modules directly inside a directory (non-recursive).
pub(crate) fn collect_binary_modules(dir: &Path) -> Result<BTreeSet<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        Error::Resolution(format!("cannot enumerate folder {}: {e}", dir.display()))
    })?;
    Ok(entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_binary_module(p))
        .collect())
}

/// Lenient semver parse: `"1.2"` and `"1"` are padded to full versions.
pub(crate) fn parse_version(s: &str) -> Option<Version> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    Version::parse(s)
        .ok()
        .or_else(|| Version::parse(&format!("{s}.0")).ok())
        .or_else(|| Version::parse(&format!("{s}.0.0")).ok())
}
