//! Shared rustc driver behind all compilation strategies.
//!
//! Stages a translation unit in a throwaway directory, invokes rustc with
//! JSON diagnostics, and implements the application-then-library entry
//! fallback on top of [`shim`].

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use rustc_hash::FxHashSet;
use uuid::Uuid;

use crate::cancel::AbortHandle;
use crate::error::{Error, Result};

use super::diagnostics::{self, Diagnostic};
use super::shim;
use super::toolchain::{dylib_extension, dylib_prefix, Toolchain};
use super::{CompileResult, CompiledModule, EntryKind};

/// Rust editions rustc accepts; other target monikers fall back to 2021.
const KNOWN_EDITIONS: &[&str] = &["2015", "2018", "2021", "2024"];

/// Invokes rustc over staged translation units.
pub struct CompileDriver {
    toolchain: Toolchain,
    build_dir: PathBuf,
}

impl CompileDriver {
    pub fn new(toolchain: Toolchain, build_dir: impl Into<PathBuf>) -> Self {
        Self {
            toolchain,
            build_dir: build_dir.into(),
        }
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    /// Compile prepared source, retrying as a library when the only failure
    /// is a missing `main`.
    ///
    /// `extra_sources` are staged next to the main file so the unit can
    /// reach them through `mod` declarations.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn compile_with_fallback(
        &self,
        name: &str,
        source: &str,
        references: &BTreeSet<PathBuf>,
        runtime_references: BTreeSet<PathBuf>,
        target: &str,
        entry_point: &str,
        extra_sources: &[(String, String)],
        cancel: &AbortHandle,
    ) -> Result<CompileResult> {
        let edition = edition_for(target);
        let shape = shim::analyze(source);

        cancel.check()?;
        let unit = shim::application_unit(source, &shape, edition);
        let (diagnostics, module) =
            self.compile_unit(name, &unit, references, edition, extra_sources, cancel)?;

        if let Some(module) = module {
            return Ok(CompileResult {
                success: true,
                diagnostics,
                module: Some(CompiledModule {
                    entry: EntryKind::Application,
                    ..module
                }),
                runtime_references,
            });
        }

        if !diagnostics::is_missing_main(&diagnostics) {
            return Ok(CompileResult {
                success: false,
                diagnostics,
                module: None,
                runtime_references,
            });
        }

        let Some(entry) = shim::select_entry(&shape.candidates, entry_point) else {
            return Err(Error::NoEntryPoint(format!(
                "script declares neither `main` nor a function callable as `{entry_point}`"
            )));
        };
        tracing::debug!(entry = %entry.call_path, "no `main`, retrying as library");

        cancel.check()?;
        let unit = shim::library_unit(source, entry, edition);
        let (diagnostics, module) =
            self.compile_unit(name, &unit, references, edition, extra_sources, cancel)?;

        Ok(CompileResult {
            success: module.is_some(),
            diagnostics,
            module: module.map(|m| CompiledModule {
                entry: EntryKind::Library,
                ..m
            }),
            runtime_references,
        })
    }

    /// Compile one translation unit to a dylib and read it back.
    ///
    /// Returns diagnostics plus the module on success. The staging
    /// directory is removed either way.
    fn compile_unit(
        &self,
        name: &str,
        code: &str,
        references: &BTreeSet<PathBuf>,
        edition: &str,
        extra_sources: &[(String, String)],
        cancel: &AbortHandle,
    ) -> Result<(Vec<Diagnostic>, Option<CompiledModule>)> {
        cancel.check()?;

        let staging = self.build_dir.join(Uuid::new_v4().to_string());
        fs::create_dir_all(&staging)
            .map_err(|e| Error::Compile(format!("failed to create build directory: {e}")))?;

        let result = self.compile_in(&staging, name, code, references, edition, extra_sources);
        if let Err(e) = fs::remove_dir_all(&staging) {
            tracing::warn!(dir = %staging.display(), "failed to remove staging directory: {e}");
        }
        result
    }

    fn compile_in(
        &self,
        staging: &Path,
        name: &str,
        code: &str,
        references: &BTreeSet<PathBuf>,
        edition: &str,
        extra_sources: &[(String, String)],
    ) -> Result<(Vec<Diagnostic>, Option<CompiledModule>)> {
        let src_file = staging.join(format!("{name}.rs"));
        fs::write(&src_file, code)
            .map_err(|e| Error::Compile(format!("failed to write source: {e}")))?;
        for (file_name, contents) in extra_sources {
            fs::write(staging.join(file_name), contents)
                .map_err(|e| Error::Compile(format!("failed to stage {file_name}: {e}")))?;
        }

        let module_name = format!("{}{name}.{}", dylib_prefix(), dylib_extension());
        let module_path = staging.join(&module_name);

        let mut cmd = Command::new(self.toolchain.rustc_path());
        cmd.arg(&src_file)
            .arg("--crate-type=cdylib")
            .arg(format!("--edition={edition}"))
            .arg("-o")
            .arg(&module_path)
            .arg("--error-format=json")
            .arg("-Copt-level=0");

        let mut search_dirs = FxHashSet::default();
        for reference in references {
            if let Some(dir) = reference.parent() {
                if search_dirs.insert(dir.to_path_buf()) {
                    cmd.arg("-L").arg(dir);
                }
            }
            if let Some(extern_name) = extern_crate_name(reference) {
                cmd.arg("--extern")
                    .arg(format!("{extern_name}={}", reference.display()));
            }
        }

        let start = Instant::now();
        let output = cmd
            .output()
            .map_err(|e| Error::Compile(format!("failed to run rustc: {e}")))?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        let diagnostics = diagnostics::parse_stderr(&stderr);

        if !output.status.success() {
            if diagnostics.is_empty() {
                // rustc died without JSON output, keep the raw text
                return Ok((vec![Diagnostic::error(stderr.to_string())], None));
            }
            return Ok((diagnostics, None));
        }

        let bytes = fs::read(&module_path)
            .map_err(|e| Error::Compile(format!("failed to read compiled module: {e}")))?;
        tracing::debug!(
            unit = name,
            bytes = bytes.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "compiled"
        );

        Ok((
            diagnostics,
            Some(CompiledModule {
                bytes,
                file_name: module_name,
                // caller stamps the real entry kind
                entry: EntryKind::Application,
            }),
        ))
    }
}

/// Derive the `--extern` crate name for an rlib/rmeta reference.
///
/// `libserde-0745ea1d.rlib` becomes `serde`; dylib references only
/// contribute their search path.
fn extern_crate_name(reference: &Path) -> Option<String> {
    let ext = reference.extension()?.to_str()?;
    if ext != "rlib" && ext != "rmeta" {
        return None;
    }
    let stem = reference.file_stem()?.to_str()?;
    let stem = stem.strip_prefix("lib").unwrap_or(stem);
    let name = match stem.rsplit_once('-') {
        Some((name, hash)) if hash.chars().all(|c| c.is_ascii_hexdigit()) => name,
        _ => stem,
    };
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn edition_for(target: &str) -> &str {
    if KNOWN_EDITIONS.contains(&target) {
        target
    } else {
        "2021"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extern_names_strip_prefix_and_hash() {
        assert_eq!(
            extern_crate_name(Path::new("/x/libserde-0745ea1d.rlib")),
            Some("serde".to_string())
        );
        assert_eq!(
            extern_crate_name(Path::new("/x/libmy_lib.rmeta")),
            Some("my_lib".to_string())
        );
        assert_eq!(extern_crate_name(Path::new("/x/libfoo.so")), None);
    }

    #[test]
    fn hyphenated_stems_without_a_hash_survive() {
        assert_eq!(
            extern_crate_name(Path::new("/x/libnot-a-hash-zz.rlib")),
            Some("not-a-hash-zz".to_string())
        );
    }

    #[test]
    fn unknown_targets_fall_back_to_a_stable_edition() {
        assert_eq!(edition_for("2024"), "2024");
        assert_eq!(edition_for("net9.0"), "2021");
    }
}
