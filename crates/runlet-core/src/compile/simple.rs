//! Minimal strategy: the source is one translation unit, verbatim.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::cancel::AbortHandle;
use crate::error::Result;
use crate::resolve::{collect_binary_modules, Resolver};

use super::{CompileDriver, CompileInput, CompileResult, CompilerStrategy};

/// Compiles the script source as-is, without using-directive handling or
/// sibling staging. References are limited to local files and folders; no
/// resolver or registry traffic happens on this path.
pub struct SimpleCompiler {
    driver: CompileDriver,
}

impl SimpleCompiler {
    pub fn new(driver: CompileDriver) -> Self {
        Self { driver }
    }
}

impl CompilerStrategy for SimpleCompiler {
    fn name(&self) -> &'static str {
        "simple"
    }

    fn compile(
        &self,
        input: &CompileInput<'_>,
        _resolver: &Resolver,
        cancel: &AbortHandle,
    ) -> Result<CompileResult> {
        let references = local_references(input.references)?;
        let runtime_references = references.clone();
        self.driver.compile_with_fallback(
            input.name,
            input.source,
            &references,
            runtime_references,
            input.target,
            input.entry_point,
            &[],
            cancel,
        )
    }
}

/// Resolve bare file and folder paths without touching the resolver.
fn local_references(raw: &[String]) -> Result<BTreeSet<PathBuf>> {
    let mut references = BTreeSet::new();
    for reference in raw {
        let path = Path::new(reference);
        if path.is_dir() {
            references.extend(collect_binary_modules(path)?);
        } else if path.is_file() {
            references.insert(path.canonicalize()?);
        } else {
            tracing::debug!(reference = %reference, "skipping non-local reference");
        }
    }
    Ok(references)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn only_local_paths_survive() {
        let dir = tempfile::TempDir::new().unwrap();
        let lib = dir.path().join("libhelper.so");
        File::create(&lib).unwrap();

        let raw = vec![
            lib.display().to_string(),
            "nuget:serde,1.0.0".to_string(),
            "framework:base".to_string(),
            dir.path().join("missing.so").display().to_string(),
        ];
        let references = local_references(&raw).unwrap();
        assert_eq!(references.len(), 1);
        assert!(references.iter().next().unwrap().ends_with("libhelper.so"));
    }

    #[test]
    fn folder_paths_expand_to_their_modules() {
        let dir = tempfile::TempDir::new().unwrap();
        File::create(dir.path().join("liba.so")).unwrap();
        File::create(dir.path().join("notes.txt")).unwrap();

        let raw = vec![dir.path().display().to_string()];
        let references = local_references(&raw).unwrap();
        assert_eq!(references.len(), 1);
    }
}
