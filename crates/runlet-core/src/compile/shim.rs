//! Entry-point analysis and FFI shim generation.
//!
//! A compiled script is entered through one generated C-ABI export:
//! `__rl_main` when the script declares `main` (application), `__rl_entry`
//! when a fallback entry function is dispatched instead (library). The
//! export marshals argv, catches panics, and reports the script's exit
//! code through an out parameter.

use syn::{ImplItem, Item, ReturnType, Type};

/// Export name for application modules.
pub const APPLICATION_EXPORT: &str = "__rl_main";

/// Export name for library-fallback modules.
pub const LIBRARY_EXPORT: &str = "__rl_entry";

/// Shape of a callable entry function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct EntrySignature {
    pub is_async: bool,
    /// Takes a single `Vec<String>` argument.
    pub takes_args: bool,
    /// Returns `i32`; otherwise returns unit.
    pub returns_value: bool,
}

/// A function eligible as a library-fallback entry point.
#[derive(Debug, Clone)]
pub(crate) struct EntryCandidate {
    /// Bare function name, matched against the configured entry point.
    pub name: String,
    /// Callable path, `run` or `App::run` for inherent associated fns.
    pub call_path: String,
    pub is_pub: bool,
    pub signature: EntrySignature,
}

/// What analysis saw in the script source.
#[derive(Debug, Clone, Default)]
pub(crate) struct SourceShape {
    pub has_main: bool,
    pub main_signature: EntrySignature,
    /// In declaration order.
    pub candidates: Vec<EntryCandidate>,
}

/// Analyze script source for entry points.
///
/// Unparseable source yields the default shape; the compiler run will
/// produce the real diagnostics in that case.
pub(crate) fn analyze(source: &str) -> SourceShape {
    let Ok(file) = syn::parse_file(source) else {
        return SourceShape::default();
    };

    let mut shape = SourceShape::default();
    for item in &file.items {
        match item {
            Item::Fn(func) => {
                let Some(signature) = supported_signature(&func.sig) else {
                    if func.sig.ident == "main" {
                        shape.has_main = true;
                    }
                    continue;
                };
                let name = func.sig.ident.to_string();
                if name == "main" {
                    shape.has_main = true;
                    shape.main_signature = signature;
                } else {
                    shape.candidates.push(EntryCandidate {
                        call_path: name.clone(),
                        name,
                        is_pub: matches!(func.vis, syn::Visibility::Public(_)),
                        signature,
                    });
                }
            }
            Item::Impl(block) if block.trait_.is_none() => {
                let Some(self_name) = impl_self_name(&block.self_ty) else {
                    continue;
                };
                for member in &block.items {
                    let ImplItem::Fn(func) = member else { continue };
                    if func.sig.receiver().is_some() {
                        continue;
                    }
                    let Some(signature) = supported_signature(&func.sig) else {
                        continue;
                    };
                    let name = func.sig.ident.to_string();
                    shape.candidates.push(EntryCandidate {
                        call_path: format!("{self_name}::{name}"),
                        name,
                        is_pub: matches!(func.vis, syn::Visibility::Public(_)),
                        signature,
                    });
                }
            }
            _ => {}
        }
    }
    shape
}

/// Pick the fallback entry among candidates.
///
/// Only a name match with the configured entry point qualifies; among
/// same-named candidates a public one wins, then declaration order. No
/// match means no entry point.
pub(crate) fn select_entry<'a>(
    candidates: &'a [EntryCandidate],
    preferred: &str,
) -> Option<&'a EntryCandidate> {
    let mut named = candidates.iter().filter(|c| c.name == preferred);
    let first = named.next()?;
    if first.is_pub {
        return Some(first);
    }
    named.find(|c| c.is_pub).or(Some(first))
}

/// Accept `fn()`, `fn(Vec<String>)` and `i32`/unit returns, sync or async.
fn supported_signature(sig: &syn::Signature) -> Option<EntrySignature> {
    if !sig.generics.params.is_empty() || sig.receiver().is_some() {
        return None;
    }

    let takes_args = match sig.inputs.len() {
        0 => false,
        1 => {
            let syn::FnArg::Typed(arg) = &sig.inputs[0] else {
                return None;
            };
            if !is_vec_string(&arg.ty) {
                return None;
            }
            true
        }
        _ => return None,
    };

    let returns_value = match &sig.output {
        ReturnType::Default => false,
        ReturnType::Type(_, ty) => {
            if !is_i32(ty) {
                return None;
            }
            true
        }
    };

    Some(EntrySignature {
        is_async: sig.asyncness.is_some(),
        takes_args,
        returns_value,
    })
}

fn is_vec_string(ty: &Type) -> bool {
    let Type::Path(path) = ty else { return false };
    let Some(segment) = path.path.segments.last() else {
        return false;
    };
    if segment.ident != "Vec" {
        return false;
    }
    let syn::PathArguments::AngleBracketed(args) = &segment.arguments else {
        return false;
    };
    matches!(
        args.args.first(),
        Some(syn::GenericArgument::Type(Type::Path(inner))) if inner.path.is_ident("String")
    )
}

fn is_i32(ty: &Type) -> bool {
    matches!(ty, Type::Path(path) if path.path.is_ident("i32"))
}

fn impl_self_name(self_ty: &Type) -> Option<String> {
    let Type::Path(path) = self_ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if !segment.arguments.is_empty() {
        return None;
    }
    Some(segment.ident.to_string())
}

/// Full application translation unit: source plus the `__rl_main` export.
///
/// When the source has no `main`, the generated call still references it
/// so the compiler reports exactly the missing-entry-point signature.
pub(crate) fn application_unit(source: &str, shape: &SourceShape, edition: &str) -> String {
    unit(
        source,
        APPLICATION_EXPORT,
        "main",
        &shape.main_signature,
        edition,
    )
}

/// Full library translation unit: source plus the `__rl_entry` export
/// dispatching to the discovered entry function.
pub(crate) fn library_unit(source: &str, entry: &EntryCandidate, edition: &str) -> String {
    unit(
        source,
        LIBRARY_EXPORT,
        &entry.call_path,
        &entry.signature,
        edition,
    )
}

fn unit(
    source: &str,
    export: &str,
    call_path: &str,
    signature: &EntrySignature,
    edition: &str,
) -> String {
    let mut code = String::new();

    code.push_str("#![allow(unused_imports)]\n");
    code.push_str("#![allow(dead_code)]\n\n");
    code.push_str(source);
    code.push_str("\n\n");

    // no_mangle became an unsafe attribute in the 2024 edition
    if edition == "2024" {
        code.push_str("#[unsafe(no_mangle)]\n");
    } else {
        code.push_str("#[no_mangle]\n");
    }
    code.push_str(&format!(
        "pub unsafe extern \"C\" fn {export}(\n\
         \x20   argc: usize,\n\
         \x20   argv: *const *const std::os::raw::c_char,\n\
         \x20   exit_code: *mut i32,\n\
         ) -> i32 {{\n"
    ));

    if signature.takes_args {
        code.push_str("    let args = unsafe { __rl_collect_args(argc, argv) };\n");
    } else {
        code.push_str("    let _ = (argc, argv);\n");
    }

    code.push_str(
        "    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {\n",
    );

    let call_args = if signature.takes_args { "args" } else { "" };
    let invocation = if signature.is_async {
        format!("__rl_block_on({call_path}({call_args}))")
    } else {
        format!("{call_path}({call_args})")
    };
    if signature.returns_value {
        code.push_str(&format!("        {invocation}\n"));
    } else {
        code.push_str(&format!("        {invocation};\n"));
        code.push_str("        0i32\n");
    }
    code.push_str("    }));\n\n");

    code.push_str("    match outcome {\n");
    code.push_str("        Ok(code) => {\n");
    code.push_str("            unsafe { *exit_code = code };\n");
    code.push_str("            0\n");
    code.push_str("        }\n");
    code.push_str("        Err(_) => 1,\n");
    code.push_str("    }\n");
    code.push_str("}\n");

    if signature.takes_args {
        code.push_str(ARGS_HELPER);
    }
    if signature.is_async {
        code.push_str(BLOCK_ON_HELPER);
    }

    code
}

const ARGS_HELPER: &str = r#"
unsafe fn __rl_collect_args(argc: usize, argv: *const *const std::os::raw::c_char) -> Vec<String> {
    let mut args = Vec::with_capacity(argc);
    for i in 0..argc {
        let ptr = unsafe { *argv.add(i) };
        if ptr.is_null() {
            continue;
        }
        args.push(unsafe { std::ffi::CStr::from_ptr(ptr) }.to_string_lossy().into_owned());
    }
    args
}
"#;

const BLOCK_ON_HELPER: &str = r#"
fn __rl_block_on<F: std::future::Future>(future: F) -> F::Output {
    use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

    // Must not touch thread-local state: this code is unloaded with the
    // module, while TLS destructors run at thread exit.
    const VTABLE: RawWakerVTable = RawWakerVTable::new(
        |_| RawWaker::new(std::ptr::null(), &VTABLE),
        |_| {},
        |_| {},
        |_| {},
    );

    let waker = unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) };
    let mut context = Context::from_waker(&waker);
    let mut future = Box::pin(future);
    loop {
        match future.as_mut().poll(&mut context) {
            Poll::Ready(value) => return value,
            Poll::Pending => std::thread::yield_now(),
        }
    }
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_main_and_its_signature() {
        let shape = analyze("fn main() -> i32 { 3 }");
        assert!(shape.has_main);
        assert!(shape.main_signature.returns_value);
        assert!(!shape.main_signature.is_async);
    }

    #[test]
    fn async_main_with_args() {
        let shape = analyze("async fn main(args: Vec<String>) { drop(args); }");
        assert!(shape.has_main);
        assert!(shape.main_signature.is_async);
        assert!(shape.main_signature.takes_args);
    }

    #[test]
    fn candidates_in_declaration_order() {
        let shape = analyze(
            "fn helper() {}\n\
             pub fn run() -> i32 { 0 }\n\
             struct App;\n\
             impl App {\n\
                 pub fn start() {}\n\
                 fn with_state(&self) {}\n\
             }",
        );
        assert!(!shape.has_main);
        let names: Vec<&str> = shape.candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["helper", "run", "start"]);
        assert_eq!(shape.candidates[2].call_path, "App::start");
    }

    #[test]
    fn entry_selection_requires_a_name_match() {
        let shape = analyze(
            "fn first() {}\n\
             pub fn second() {}\n\
             pub fn go() {}",
        );
        assert_eq!(select_entry(&shape.candidates, "go").unwrap().name, "go");
        assert!(select_entry(&shape.candidates, "absent").is_none());
    }

    #[test]
    fn entry_selection_prefers_public_among_same_named() {
        let shape = analyze(
            "struct A;\n\
             impl A { fn run() {} }\n\
             pub fn run() -> i32 { 0 }",
        );
        assert_eq!(
            select_entry(&shape.candidates, "run").unwrap().call_path,
            "run"
        );
    }

    #[test]
    fn unsupported_signatures_are_not_candidates() {
        let shape = analyze(
            "fn generic<T>(value: T) {}\n\
             fn two_args(a: i32, b: i32) {}\n\
             fn wrong_return() -> String { String::new() }\n\
             fn ok() {}",
        );
        assert_eq!(shape.candidates.len(), 1);
        assert_eq!(shape.candidates[0].name, "ok");
    }

    #[test]
    fn application_unit_references_main_even_when_absent() {
        let shape = analyze("pub fn helper() {}");
        let unit = application_unit("pub fn helper() {}", &shape, "2021");
        assert!(unit.contains(APPLICATION_EXPORT));
        assert!(unit.contains("main()"));
        assert!(unit.contains("#[no_mangle]"));
    }

    #[test]
    fn async_entry_emits_the_block_on_helper() {
        let source = "pub async fn run() -> i32 { 1 }";
        let shape = analyze(source);
        let entry = select_entry(&shape.candidates, "run").unwrap();
        let unit = library_unit(source, entry, "2021");
        assert!(unit.contains(LIBRARY_EXPORT));
        assert!(unit.contains("__rl_block_on(run())"));
        assert!(unit.contains("fn __rl_block_on"));
    }

    #[test]
    fn block_on_helper_avoids_thread_local_state() {
        // A waker holding `thread::current()` registers a TLS destructor in
        // module code; unloading the module before thread exit would leave
        // the destructor dangling.
        assert!(!BLOCK_ON_HELPER.contains("thread::current"));
        assert!(!BLOCK_ON_HELPER.contains("thread::park"));
        assert!(BLOCK_ON_HELPER.contains("RawWakerVTable"));
    }

    #[test]
    fn edition_2024_uses_the_unsafe_attribute_form() {
        let shape = analyze("fn main() {}");
        let unit = application_unit("fn main() {}", &shape, "2024");
        assert!(unit.contains("#[unsafe(no_mangle)]"));
    }
}
