//! Script strategy: accepts fragments that are not full programs.
//!
//! A bare expression is wrapped into a `main` that prints its value; a
//! statement list is wrapped into a plain `main`. Complete programs pass
//! through untouched and keep the usual entry fallback.

use crate::cancel::AbortHandle;
use crate::error::Result;
use crate::resolve::Resolver;

use super::{resolve_surfaces, CompileDriver, CompileInput, CompileResult, CompilerStrategy};

pub struct ScriptCompiler {
    driver: CompileDriver,
}

impl ScriptCompiler {
    pub fn new(driver: CompileDriver) -> Self {
        Self { driver }
    }
}

impl CompilerStrategy for ScriptCompiler {
    fn name(&self) -> &'static str {
        "script"
    }

    fn compile(
        &self,
        input: &CompileInput<'_>,
        resolver: &Resolver,
        cancel: &AbortHandle,
    ) -> Result<CompileResult> {
        let (references, runtime_references) = resolve_surfaces(input, resolver, cancel)?;

        let source = wrap_fragment(input.source);
        self.driver.compile_with_fallback(
            input.name,
            &source,
            &references,
            runtime_references,
            input.target,
            input.entry_point,
            &[],
            cancel,
        )
    }
}

/// Turn a source fragment into a complete program.
///
/// Classification is syntactic only; source that fits none of the shapes
/// passes through so rustc reports the real errors.
fn wrap_fragment(source: &str) -> String {
    if syn::parse_file(source).is_ok() {
        return source.to_string();
    }

    if syn::parse_str::<syn::Expr>(source).is_ok() {
        tracing::debug!("wrapping bare expression");
        return format!(
            "fn main() {{\n    let value = {};\n    println!(\"{{:?}}\", value);\n}}\n",
            source.trim()
        );
    }

    if syn::parse_str::<syn::Block>(&format!("{{ {source} }}")).is_ok() {
        tracing::debug!("wrapping statement list");
        return format!("fn main() {{\n{source}\n}}\n");
    }

    source.to_string()
}
