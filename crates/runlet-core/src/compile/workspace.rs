//! Default strategy: using-directive injection and sibling-file staging.

use std::fs;
use std::path::Path;

use crate::cancel::AbortHandle;
use crate::error::Result;
use crate::options::UsingDirective;
use crate::resolve::Resolver;

use super::{resolve_surfaces, CompileDriver, CompileInput, CompileResult, CompilerStrategy};

/// Compiles the script with the invocation's effective using-directive set
/// prepended, and stages any `.rs` siblings of a file-backed script so
/// `mod` declarations in the script resolve.
pub struct WorkspaceCompiler {
    driver: CompileDriver,
    /// Directory holding the script file, when the source came from disk.
    script_dir: Option<std::path::PathBuf>,
}

impl WorkspaceCompiler {
    pub fn new(driver: CompileDriver) -> Self {
        Self {
            driver,
            script_dir: None,
        }
    }

    pub fn with_script_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.script_dir = Some(dir.into());
        self
    }

    fn sibling_sources(&self, main_name: &str) -> Vec<(String, String)> {
        let Some(dir) = &self.script_dir else {
            return Vec::new();
        };
        collect_siblings(dir, main_name)
    }
}

impl CompilerStrategy for WorkspaceCompiler {
    fn name(&self) -> &'static str {
        "workspace"
    }

    fn compile(
        &self,
        input: &CompileInput<'_>,
        resolver: &Resolver,
        cancel: &AbortHandle,
    ) -> Result<CompileResult> {
        let (references, runtime_references) = resolve_surfaces(input, resolver, cancel)?;

        let source = prepend_usings(input.source, input.usings);
        let siblings = self.sibling_sources(input.name);
        if !siblings.is_empty() {
            tracing::debug!(count = siblings.len(), "staging sibling sources");
        }

        self.driver.compile_with_fallback(
            input.name,
            &source,
            &references,
            runtime_references,
            input.target,
            input.entry_point,
            &siblings,
            cancel,
        )
    }
}

/// Prepend the effective using set as `use` items.
///
/// Inner attributes must stay at the top of the unit, so injected items go
/// after any leading `#![...]` lines.
fn prepend_usings(source: &str, usings: &[String]) -> String {
    let directives = UsingDirective::effective_set(usings);
    if directives.is_empty() {
        return source.to_string();
    }

    let mut header = String::new();
    let mut body = String::new();
    let mut in_header = true;
    for line in source.lines() {
        if in_header && (line.trim_start().starts_with("#![") || line.trim().is_empty()) {
            header.push_str(line);
            header.push('\n');
        } else {
            in_header = false;
            body.push_str(line);
            body.push('\n');
        }
    }

    let mut code = header;
    for directive in &directives {
        code.push_str(&directive.render());
        code.push('\n');
    }
    code.push('\n');
    code.push_str(&body);
    code
}

/// Read `.rs` files next to the script, skipping the script itself.
fn collect_siblings(dir: &Path, main_name: &str) -> Vec<(String, String)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let main_file = format!("{main_name}.rs");
    let mut siblings = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("rs") {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if file_name == main_file {
            continue;
        }
        match fs::read_to_string(&path) {
            Ok(contents) => siblings.push((file_name.to_string(), contents)),
            Err(e) => {
                tracing::warn!(file = %path.display(), "skipping unreadable sibling: {e}");
            }
        }
    }
    siblings.sort_by(|a, b| a.0.cmp(&b.0));
    siblings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usings_are_injected_before_the_body() {
        let out = prepend_usings("fn main() {}", &["std::fs".to_string()]);
        assert!(out.starts_with("use std::fs;\n"));
        assert!(out.contains("fn main() {}"));
    }

    #[test]
    fn inner_attributes_stay_first() {
        let src = "#![allow(dead_code)]\n\nfn main() {}";
        let out = prepend_usings(src, &["std::fs".to_string()]);
        let attr_pos = out.find("#![allow").unwrap();
        let use_pos = out.find("use std::fs;").unwrap();
        assert!(attr_pos < use_pos);
    }

    #[test]
    fn removed_usings_are_not_injected() {
        let out = prepend_usings(
            "fn main() {}",
            &["std::fs".to_string(), "-std::fs".to_string()],
        );
        assert_eq!(out, "fn main() {}");
    }

    #[test]
    fn siblings_exclude_the_main_file() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join("script.rs"), "fn main() {}").unwrap();
        fs::write(dir.path().join("util.rs"), "pub fn helper() {}").unwrap();
        fs::write(dir.path().join("notes.txt"), "not code").unwrap();

        let siblings = collect_siblings(dir.path(), "script");
        assert_eq!(siblings.len(), 1);
        assert_eq!(siblings[0].0, "util.rs");
    }
}
