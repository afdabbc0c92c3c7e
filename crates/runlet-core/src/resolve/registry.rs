//! Registry client contract and the filesystem-backed implementation.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;
use semver::Version;

use crate::error::{Error, Result};

use super::project::parse_dependencies_section;
use super::{is_binary_module, parse_version};

/// Narrow contract consumed by the package resolution strategy.
///
/// A registry failure for one specifier propagates as a resolver-level
/// failure for that branch; it never aborts sibling branches.
pub trait RegistryClient: Send + Sync {
    /// All versions available for a package id, unordered.
    fn list_versions(&self, id: &str) -> Result<Vec<Version>>;

    /// Restore a package for a target and return the library paths that
    /// apply to it, including the package's own transitive dependencies.
    fn resolve_libraries(&self, id: &str, version: &Version, target: &str)
        -> Result<Vec<PathBuf>>;
}

/// Registry backed by a local package store.
///
/// Store layout, one directory per package version:
///
/// ```text
/// <root>/<id>/<version>/
///     manifest.toml       # optional; [dependencies] drives transitive restore
///     lib/<target>/*.rlib|*.rmeta|*.so
///     lib/any/...         # fallback when no target directory matches
/// ```
#[derive(Debug, Clone)]
pub struct DirectoryRegistry {
    root: PathBuf,
}

impl DirectoryRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn package_dir(&self, id: &str, version: &Version) -> Result<PathBuf> {
        let id_dir = self.root.join(id);
        let entries = fs::read_dir(&id_dir)
            .map_err(|_| Error::Resolution(format!("package `{id}` not found in registry")))?;
        for entry in entries.flatten() {
            let name = entry.file_name();
            if parse_version(&name.to_string_lossy()).as_ref() == Some(version) {
                return Ok(entry.path());
            }
        }
        Err(Error::Resolution(format!(
            "package `{id}` has no version {version} in registry"
        )))
    }

    /// Pick the library directory applicable to `target`: an exact match
    /// first, then the longest prefix of the target, then `any`.
    fn library_dir(package_dir: &Path, target: &str) -> Option<PathBuf> {
        let lib_root = package_dir.join("lib");
        let entries = fs::read_dir(&lib_root).ok()?;

        let mut best: Option<(usize, PathBuf)> = None;
        let mut any: Option<PathBuf> = None;
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == target && !target.is_empty() {
                return Some(entry.path());
            }
            if name == "any" {
                any = Some(entry.path());
            } else if !target.is_empty()
                && target.starts_with(&name)
                && best.as_ref().is_none_or(|(len, _)| name.len() > *len)
            {
                best = Some((name.len(), entry.path()));
            }
        }
        best.map(|(_, path)| path).or(any)
    }

    fn collect(
        &self,
        id: &str,
        version: &Version,
        target: &str,
        visited: &mut FxHashSet<String>,
        out: &mut BTreeSet<PathBuf>,
    ) -> Result<()> {
        let stamp = format!("{id}@{version}");
        if !visited.insert(stamp) {
            return Ok(());
        }

        let package_dir = self.package_dir(id, version)?;
        let Some(lib_dir) = Self::library_dir(&package_dir, target) else {
            return Err(Error::Resolution(format!(
                "package `{id}` {version} has no libraries applicable to target `{target}`"
            )));
        };

        for entry in fs::read_dir(&lib_dir)?.flatten() {
            let path = entry.path();
            if is_binary_module(&path) {
                out.insert(path);
            }
        }

        // Transitive dependencies from the package's own manifest, resolved
        // the same way. Unpinned entries take the highest available version.
        let manifest = package_dir.join("manifest.toml");
        if let Ok(text) = fs::read_to_string(&manifest) {
            for dep in parse_dependencies_section(&text) {
                let dep_version = match dep.version {
                    Some(v) => v,
                    None => self
                        .list_versions(&dep.id)?
                        .into_iter()
                        .max()
                        .ok_or_else(|| {
                            Error::Resolution(format!(
                                "dependency `{}` of `{id}` has no versions in registry",
                                dep.id
                            ))
                        })?,
                };
                self.collect(&dep.id, &dep_version, target, visited, out)?;
            }
        }

        Ok(())
    }
}

impl RegistryClient for DirectoryRegistry {
    fn list_versions(&self, id: &str) -> Result<Vec<Version>> {
        let id_dir = self.root.join(id);
        let entries = fs::read_dir(&id_dir)
            .map_err(|_| Error::Resolution(format!("package `{id}` not found in registry")))?;
        let versions: Vec<Version> = entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .filter_map(|e| parse_version(&e.file_name().to_string_lossy()))
            .collect();
        Ok(versions)
    }

    fn resolve_libraries(
        &self,
        id: &str,
        version: &Version,
        target: &str,
    ) -> Result<Vec<PathBuf>> {
        let mut visited = FxHashSet::default();
        let mut out = BTreeSet::new();
        self.collect(id, version, target, &mut visited, &mut out)?;
        Ok(out.into_iter().collect())
    }
}
