//! Reclaimable execution arena.
//!
//! Owns a uniquely named directory, the staged module file inside it, and
//! every dynamic library loaded for one execution. Drop order matters:
//! the module library must unload before the runtime libraries it links
//! against, and the directory is removed last.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use libloading::Library;
use uuid::Uuid;

use crate::compile::CompiledModule;
use crate::error::{Error, Result};

pub struct ExecutionContext {
    // field order is drop order
    module: Option<Library>,
    runtime_libraries: Vec<Library>,
    dir: PathBuf,
}

impl ExecutionContext {
    /// Create a fresh arena under `base_dir`.
    pub fn create(base_dir: &Path) -> Result<Self> {
        let dir = base_dir.join(Uuid::new_v4().to_string());
        fs::create_dir_all(&dir)
            .map_err(|e| Error::Execute(format!("failed to create execution arena: {e}")))?;
        tracing::debug!(dir = %dir.display(), "execution arena created");
        Ok(Self {
            module: None,
            runtime_libraries: Vec::new(),
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stage and load the compiled module.
    ///
    /// When the platform loader reports a missing dependency, the matching
    /// runtime reference is loaded into the arena and the module load is
    /// retried. One retry per runtime reference bounds the loop.
    pub fn load_module(
        &mut self,
        module: &CompiledModule,
        runtime_references: &BTreeSet<PathBuf>,
    ) -> Result<()> {
        let module_path = self.dir.join(&module.file_name);
        fs::write(&module_path, &module.bytes)
            .map_err(|e| Error::Execute(format!("failed to stage module: {e}")))?;

        let mut attempts = runtime_references.len() + 1;
        loop {
            match unsafe { Library::new(&module_path) } {
                Ok(library) => {
                    self.module = Some(library);
                    return Ok(());
                }
                Err(e) if attempts > 0 => {
                    attempts -= 1;
                    let text = e.to_string();
                    let Some(missing) = missing_library(&text) else {
                        return Err(e.into());
                    };
                    let Some(dependency) = find_reference(runtime_references, &missing) else {
                        return Err(Error::Execute(format!(
                            "module needs `{missing}` but no runtime reference provides it"
                        )));
                    };
                    tracing::debug!(library = %dependency.display(), "loading module dependency");
                    self.load_runtime_library(&dependency)?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Load a runtime library into the arena so subsequent loads can link
    /// against its symbols.
    fn load_runtime_library(&mut self, path: &Path) -> Result<()> {
        #[cfg(unix)]
        let library = unsafe {
            use libloading::os::unix::{Library as UnixLibrary, RTLD_GLOBAL, RTLD_NOW};
            Library::from(UnixLibrary::open(Some(path), RTLD_NOW | RTLD_GLOBAL)?)
        };
        #[cfg(not(unix))]
        let library = unsafe { Library::new(path)? };

        self.runtime_libraries.push(library);
        Ok(())
    }

    /// Look up an exported symbol in the loaded module.
    ///
    /// # Safety
    /// `T` must match the symbol's actual type.
    pub unsafe fn get<T>(&self, name: &[u8]) -> Result<libloading::Symbol<'_, T>> {
        let library = self
            .module
            .as_ref()
            .ok_or_else(|| Error::Execute("no module loaded in this context".to_string()))?;
        Ok(unsafe { library.get(name) }?)
    }

    /// Whether the loaded module exports a symbol.
    pub fn has_symbol(&self, name: &[u8]) -> bool {
        let Some(library) = self.module.as_ref() else {
            return false;
        };
        unsafe { library.get::<*const ()>(name).is_ok() }
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        self.module = None;
        self.runtime_libraries.clear();
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            tracing::warn!(dir = %self.dir.display(), "failed to reclaim execution arena: {e}");
        }
    }
}

/// Extract the missing library name from a platform loader error.
///
/// Linux dlopen reports `libfoo.so: cannot open shared object file: ...`;
/// macOS reports `dlopen(...): Library not loaded: <path>`.
fn missing_library(error_text: &str) -> Option<String> {
    if let Some(rest) = error_text.split("Library not loaded:").nth(1) {
        let path = rest.trim().split_whitespace().next()?;
        return Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
    }

    let (candidate, _) = error_text.split_once(':')?;
    let name = Path::new(candidate.trim()).file_name()?.to_string_lossy();
    if name.contains(".so") || name.ends_with(".dylib") || name.ends_with(".dll") {
        Some(name.into_owned())
    } else {
        None
    }
}

/// Find the runtime reference whose file name matches a loader-reported
/// dependency.
fn find_reference(references: &BTreeSet<PathBuf>, missing: &str) -> Option<PathBuf> {
    references
        .iter()
        .find(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy() == missing)
                .unwrap_or(false)
        })
        .or_else(|| {
            // versioned sonames like libfoo.so.3 still match libfoo.so
            references.iter().find(|p| {
                p.file_name()
                    .map(|n| missing.starts_with(&*n.to_string_lossy()))
                    .unwrap_or(false)
            })
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_is_reclaimed_on_drop() {
        let base = tempfile::TempDir::new().unwrap();
        let dir = {
            let context = ExecutionContext::create(base.path()).unwrap();
            assert!(context.dir().exists());
            context.dir().to_path_buf()
        };
        assert!(!dir.exists());
    }

    #[test]
    fn two_contexts_never_share_a_directory() {
        let base = tempfile::TempDir::new().unwrap();
        let a = ExecutionContext::create(base.path()).unwrap();
        let b = ExecutionContext::create(base.path()).unwrap();
        assert_ne!(a.dir(), b.dir());
    }

    #[test]
    fn missing_library_name_is_parsed_from_dlopen_errors() {
        assert_eq!(
            missing_library("libdeps.so: cannot open shared object file: No such file"),
            Some("libdeps.so".to_string())
        );
        assert_eq!(
            missing_library(
                "dlopen(/tmp/m.dylib, 5): Library not loaded: /usr/lib/libdeps.dylib"
            ),
            Some("libdeps.dylib".to_string())
        );
        assert_eq!(missing_library("some unrelated error"), None);
    }

    #[test]
    fn versioned_sonames_match_their_reference() {
        let refs = BTreeSet::from([PathBuf::from("/rt/libfoo.so")]);
        assert_eq!(
            find_reference(&refs, "libfoo.so.3"),
            Some(PathBuf::from("/rt/libfoo.so"))
        );
        assert_eq!(find_reference(&refs, "libbar.so"), None);
    }
}
