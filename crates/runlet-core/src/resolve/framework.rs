//! Shared-framework resolution strategy.
//!
//! A framework installation lives under a packs root discovered once per
//! process and passed in explicitly:
//!
//! ```text
//! <root>/packs/<name>/<version>/ref/    # metadata-only reference pack
//! <root>/shared/<name>/<version>/       # full runtime libraries
//! ```
//!
//! Compile-time resolution prefers the reference pack; execute-time
//! resolution always takes the runtime libraries. The two sets may differ
//! for the same framework name, which is why the resolution cache keys on
//! the compile/execute mode.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use semver::Version;

use crate::cancel::AbortHandle;
use crate::error::{Error, Result};

use super::registry::RegistryClient;
use super::{collect_binary_modules, parse_version};

/// Helper packs unioned in when wide references are requested.
const WIDE_REFERENCE_PACKS: &[&str] = &["extras"];

/// Additional helper packs for web-enabled scripts.
const WEB_REFERENCE_PACKS: &[&str] = &["web"];

/// On-disk layout of installed framework packs.
///
/// Treated as read-only external configuration: discovered once per process
/// and passed explicitly into the resolver.
#[derive(Debug, Clone)]
pub struct PackLayout {
    root: PathBuf,
}

impl PackLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Discover the packs root from `RUNLET_PACKS_ROOT`, falling back to the
    /// given default.
    pub fn from_env(fallback: impl Into<PathBuf>) -> Self {
        match std::env::var_os("RUNLET_PACKS_ROOT") {
            Some(root) => Self::new(PathBuf::from(root)),
            None => Self::new(fallback),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Highest installed reference pack whose version directory name is
    /// prefixed by the target string. Returns the `ref/` directory.
    pub fn best_reference_pack(&self, name: &str, target: &str) -> Option<(Version, PathBuf)> {
        let (version, dir) = best_version_dir(&self.root.join("packs").join(name), target)?;
        let ref_dir = dir.join("ref");
        ref_dir.is_dir().then_some((version, ref_dir))
    }

    /// Highest installed runtime directory for a shared framework.
    pub fn best_shared(&self, name: &str, target: &str) -> Option<(Version, PathBuf)> {
        best_version_dir(&self.root.join("shared").join(name), target)
    }
}

/// Pick the highest-versioned subdirectory whose name starts with `target`.
fn best_version_dir(parent: &Path, target: &str) -> Option<(Version, PathBuf)> {
    let entries = fs::read_dir(parent).ok()?;
    entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            if !target.is_empty() && !name.starts_with(target) {
                return None;
            }
            parse_version(&name).map(|v| (v, e.path()))
        })
        .max_by(|(a, _), (b, _)| a.cmp(b))
}

/// Everything framework resolution needs besides the specifier itself.
pub(crate) struct FrameworkEnv<'a> {
    pub packs: &'a PackLayout,
    pub registry: &'a dyn RegistryClient,
    /// Resolve a reference-assemblies package from the registry when no
    /// local reference pack is installed.
    pub registry_fallback: bool,
    pub include_wide: bool,
    pub include_web: bool,
}

/// Resolve a `framework:` specifier.
pub(crate) fn resolve_framework(
    env: &FrameworkEnv<'_>,
    name: &str,
    target: &str,
    compilation: bool,
    cancel: &AbortHandle,
) -> Result<BTreeSet<PathBuf>> {
    cancel.check()?;

    let mut set = resolve_one_framework(env, name, target, compilation)?;

    if env.include_wide || env.include_web {
        let mut baseline: Vec<&str> = Vec::new();
        if env.include_wide {
            baseline.extend_from_slice(WIDE_REFERENCE_PACKS);
        }
        if env.include_web {
            baseline.extend_from_slice(WEB_REFERENCE_PACKS);
        }
        for pack in baseline {
            cancel.check()?;
            // Baseline helpers are best-effort: an uninstalled pack is
            // skipped, never a failure. Their versions are independent of
            // the framework target, so the highest installed one is taken.
            match resolve_local(env.packs, pack, compilation) {
                Some(paths) => set.extend(paths),
                None => tracing::debug!(pack, "baseline helper pack not installed, skipping"),
            }
        }
    }

    Ok(set)
}

fn resolve_one_framework(
    env: &FrameworkEnv<'_>,
    name: &str,
    target: &str,
    compilation: bool,
) -> Result<BTreeSet<PathBuf>> {
    if compilation {
        if let Some((version, ref_dir)) = env.packs.best_reference_pack(name, target) {
            tracing::debug!(framework = name, %version, "using local reference pack");
            return Ok(collect_binary_modules(&ref_dir)?);
        }

        if env.registry_fallback {
            let ref_package = format!("{name}-ref");
            match registry_reference_package(env.registry, &ref_package, target) {
                Ok(set) if !set.is_empty() => {
                    tracing::debug!(framework = name, package = %ref_package,
                        "using registry reference-assemblies package");
                    return Ok(set);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(framework = name, error = %e,
                        "registry reference-package fallback failed");
                }
            }
        }

        // Known approximation: no reference pack anywhere, so compile against
        // the runtime libraries, which may admit APIs outside the requested
        // compile-time surface.
        tracing::warn!(
            framework = name,
            target,
            "no reference pack found; compiling against runtime libraries"
        );
    }

    match env.packs.best_shared(name, target) {
        Some((version, dir)) => {
            tracing::debug!(framework = name, %version, "using shared runtime libraries");
            Ok(collect_binary_modules(&dir)?)
        }
        None => Err(Error::Resolution(format!(
            "shared framework `{name}` is not installed for target `{target}`"
        ))),
    }
}

fn resolve_local(packs: &PackLayout, name: &str, compilation: bool) -> Option<BTreeSet<PathBuf>> {
    let dir = if compilation {
        packs.best_reference_pack(name, "").map(|(_, d)| d)
    } else {
        packs.best_shared(name, "").map(|(_, d)| d)
    }?;
    collect_binary_modules(&dir).ok()
}

fn registry_reference_package(
    registry: &dyn RegistryClient,
    id: &str,
    target: &str,
) -> Result<BTreeSet<PathBuf>> {
    let version = registry
        .list_versions(id)?
        .into_iter()
        .max()
        .ok_or_else(|| Error::Resolution(format!("package `{id}` has no published versions")))?;
    Ok(registry
        .resolve_libraries(id, &version, target)?
        .into_iter()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::registry::DirectoryRegistry;
    use std::fs::File;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        File::create(path).unwrap();
    }

    fn layout() -> (tempfile::TempDir, PackLayout) {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path().to_path_buf();

        touch(&root.join("packs/base/1.85.0/ref/libbase.rmeta"));
        touch(&root.join("packs/base/1.85.2/ref/libbase.rmeta"));
        touch(&root.join("packs/base/1.86.0/ref/libbase.rmeta"));
        touch(&root.join("shared/base/1.85.2/libbase.so"));
        touch(&root.join("shared/base/1.85.2/libhelpers.so"));
        touch(&root.join("shared/extras/1.0.0/libextras.so"));

        // Runtime-only framework: no reference pack installed.
        touch(&root.join("shared/bare/2.0.0/libbare.so"));

        (dir, PackLayout::new(root))
    }

    fn env_with<'a>(
        packs: &'a PackLayout,
        registry: &'a DirectoryRegistry,
    ) -> FrameworkEnv<'a> {
        FrameworkEnv {
            packs,
            registry,
            registry_fallback: true,
            include_wide: false,
            include_web: false,
        }
    }

    #[test]
    fn compile_mode_takes_highest_prefixed_reference_pack() {
        let (_tmp, packs) = layout();
        let (version, dir) = packs.best_reference_pack("base", "1.85").unwrap();
        assert_eq!(version, Version::new(1, 85, 2));
        assert!(dir.ends_with("1.85.2/ref"));
    }

    #[test]
    fn compile_and_execute_sets_differ() {
        let (_tmp, packs) = layout();
        let store = tempfile::TempDir::new().unwrap();
        let registry = DirectoryRegistry::new(store.path());
        let env = env_with(&packs, &registry);
        let cancel = AbortHandle::new();

        let compile = resolve_framework(&env, "base", "1.85", true, &cancel).unwrap();
        let execute = resolve_framework(&env, "base", "1.85", false, &cancel).unwrap();

        assert_eq!(compile.len(), 1);
        assert!(compile.iter().all(|p| p.extension().unwrap() == "rmeta"));
        assert_eq!(execute.len(), 2);
        assert!(execute.iter().all(|p| p.extension().unwrap() == "so"));
    }

    #[test]
    fn missing_reference_pack_falls_through_to_runtime() {
        let (_tmp, packs) = layout();
        let store = tempfile::TempDir::new().unwrap();
        let registry = DirectoryRegistry::new(store.path());
        let env = env_with(&packs, &registry);
        let cancel = AbortHandle::new();

        let compile = resolve_framework(&env, "bare", "2.0", true, &cancel).unwrap();
        assert!(compile.iter().any(|p| p.ends_with("libbare.so")));
    }

    #[test]
    fn registry_reference_package_is_preferred_over_runtime_fallthrough() {
        let (_tmp, packs) = layout();
        let store = tempfile::TempDir::new().unwrap();
        touch(&store.path().join("bare-ref/2.0.0/lib/any/libbare.rmeta"));
        let registry = DirectoryRegistry::new(store.path());
        let env = env_with(&packs, &registry);
        let cancel = AbortHandle::new();

        let compile = resolve_framework(&env, "bare", "2.0", true, &cancel).unwrap();
        assert!(compile.iter().any(|p| p.extension().unwrap() == "rmeta"));
    }

    #[test]
    fn uninstalled_framework_is_a_resolution_error() {
        let (_tmp, packs) = layout();
        let store = tempfile::TempDir::new().unwrap();
        let registry = DirectoryRegistry::new(store.path());
        let env = env_with(&packs, &registry);
        let cancel = AbortHandle::new();

        let err = resolve_framework(&env, "ghost", "1.0", false, &cancel).unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
    }

    #[test]
    fn wide_references_union_the_baseline_packs() {
        let (_tmp, packs) = layout();
        let store = tempfile::TempDir::new().unwrap();
        let registry = DirectoryRegistry::new(store.path());
        let mut env = env_with(&packs, &registry);
        env.include_wide = true;
        let cancel = AbortHandle::new();

        let execute = resolve_framework(&env, "base", "1.85", false, &cancel).unwrap();
        assert!(execute.iter().any(|p| p.ends_with("libextras.so")));
    }

    #[test]
    fn baseline_packs_take_the_highest_version_regardless_of_target() {
        let (tmp, packs) = layout();
        touch(&tmp.path().join("shared/extras/3.2.0/libextras3.so"));
        let store = tempfile::TempDir::new().unwrap();
        let registry = DirectoryRegistry::new(store.path());
        let mut env = env_with(&packs, &registry);
        env.include_wide = true;
        let cancel = AbortHandle::new();

        let execute = resolve_framework(&env, "base", "1.85", false, &cancel).unwrap();
        assert!(execute.iter().any(|p| p.ends_with("libextras3.so")));
        assert!(!execute.iter().any(|p| p.ends_with("libextras.so")));
    }
}
