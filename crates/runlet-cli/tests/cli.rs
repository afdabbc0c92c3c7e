//! CLI-level tests exercising the installed binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn runlet() -> Command {
    let mut cmd = Command::cargo_bin("runlet").unwrap();
    // keep the run hermetic regardless of the host's installed packs
    cmd.env("RUNLET_PACKS_ROOT", tempdir_path())
        .env("RUNLET_REGISTRY_ROOT", tempdir_path());
    cmd
}

fn tempdir_path() -> std::path::PathBuf {
    let dir = tempfile::TempDir::new().unwrap();
    dir.keep()
}

#[test]
fn eval_runs_a_script_and_reports_its_exit_code() {
    runlet()
        .args(["eval", "fn main() -> i32 { 5 }"])
        .assert()
        .code(5);
}

#[test]
fn eval_success_exits_zero() {
    runlet()
        .args(["eval", "fn main() { println!(\"ok\"); }"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ok"));
}

#[test]
fn compile_errors_exit_with_the_compile_code() {
    runlet()
        .args(["eval", "fn main() { let x: i32 = \"nope\"; }"])
        .assert()
        .code(4);
}

#[test]
fn dry_run_skips_execution() {
    runlet()
        .args(["eval", "--dry-run", "fn main() { std::process::abort(); }"])
        .assert()
        .success();
}

#[test]
fn run_reads_a_script_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let script = dir.path().join("tool.rs");
    std::fs::write(&script, "fn main() -> i32 { 3 }").unwrap();

    runlet()
        .args(["run", script.to_str().unwrap()])
        .assert()
        .code(3);
}

#[test]
fn run_passes_trailing_args_to_the_script() {
    let dir = tempfile::TempDir::new().unwrap();
    let script = dir.path().join("count.rs");
    std::fs::write(
        &script,
        "fn main(args: Vec<String>) -> i32 { (args.len() - 1) as i32 }",
    )
    .unwrap();

    runlet()
        .args(["run", script.to_str().unwrap(), "--", "a", "b", "c"])
        .assert()
        .code(3);
}

#[test]
fn empty_source_and_usage_errors_have_distinct_codes() {
    // clap owns exit code 2 for bad flags; an empty script gets its own.
    runlet().args(["eval", "--no-such-flag"]).assert().code(2);
    runlet().args(["eval", "   "]).assert().code(8);
}

#[test]
fn missing_script_file_exits_with_the_fetch_code() {
    runlet()
        .args(["run", "/definitely/not/here.rs"])
        .assert()
        .code(3);
}

#[test]
fn entry_point_flag_selects_the_fallback_function() {
    runlet()
        .args([
            "eval",
            "--entry-point",
            "go",
            "fn other() {}\npub fn go() -> i32 { 8 }",
        ])
        .assert()
        .code(8);
}
