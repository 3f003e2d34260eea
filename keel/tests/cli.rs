use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn keel() -> Command {
    let mut cmd = Command::cargo_bin("keel").expect("binary exists");
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn clean_program_exits_zero_and_writes_ir() {
    let dir = tempdir().expect("tempdir");
    let out = dir.path().join("hello.ll");

    keel()
        .arg(fixture("s1_hello.kl"))
        .arg(format!("--emit-ir={}", out.display()))
        .assert()
        .success()
        .stderr(predicate::str::is_empty());

    let ir = fs::read_to_string(&out).expect("read ir");
    assert!(ir.contains("define i32 @main()"));
    assert!(ir.contains("declare i32 @print(ptr, ...)"));
}

#[test]
fn without_emit_ir_nothing_is_written() {
    let dir = tempdir().expect("tempdir");
    let src = dir.path().join("main.kl");
    fs::write(&src, "fn main() { print(1); }\n").expect("write input");

    keel().arg(&src).assert().success();
    let entries = fs::read_dir(dir.path()).expect("read dir").count();
    assert_eq!(entries, 1);
}

#[test]
fn blocking_diagnostic_exits_one() {
    keel()
        .arg(fixture("s3_ancestor_defer_without_return.kl"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error: [5001]"))
        .stderr(predicate::str::contains("= scope: `if` body"));
}

#[test]
fn lexer_error_shows_source_context() {
    keel()
        .arg(fixture("s5_unterminated_string.kl"))
        .arg("--context-lines=0")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("s5_unterminated_string.kl:1:19: error: [2001]"))
        .stderr(predicate::str::contains("   1 | fn main() { print(\"oops); }"))
        .stderr(predicate::str::contains("^"));
}

#[test]
fn missing_input_exits_two() {
    keel()
        .arg("definitely/not/here.kl")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("[1001]"));
}

#[test]
fn stop_after_sema_skips_raii() {
    keel()
        .arg(fixture("s3_ancestor_defer_without_return.kl"))
        .arg("--stop-after=sema")
        .assert()
        .success();
}

#[test]
fn emit_ast_after_raii_shows_cleanups() {
    let dir = tempdir().expect("tempdir");
    let out = dir.path().join("s4.kl");

    keel()
        .arg(fixture("s4_ancestor_defer_with_return.kl"))
        .arg("--stop-after=raii")
        .arg(format!("--emit-ast={}", out.display()))
        .assert()
        .success();

    let text = fs::read_to_string(&out).expect("read ast");
    assert!(text.contains("cleanup x => destroy(x);"), "{text}");
    assert!(text.contains("cleanup x;"), "{text}");
}

#[test]
fn deny_warnings_turns_warnings_into_failures() {
    let dir = tempdir().expect("tempdir");
    let src = dir.path().join("main.kl");
    fs::write(&src, "fn main() { int unused = 1; }\n").expect("write input");

    keel()
        .arg(&src)
        .assert()
        .success()
        .stderr(predicate::str::contains("warning: [4005]"));

    keel()
        .arg(&src)
        .arg("--deny-warnings")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error: [4005]"));
}

#[test]
fn keel_toml_next_to_source_is_picked_up() {
    let dir = tempdir().expect("tempdir");
    let src = dir.path().join("main.kl");
    let out = dir.path().join("main.ll");
    fs::write(&src, "fn main() { print(\"hi\"); }\n").expect("write input");
    fs::write(
        dir.path().join("keel.toml"),
        "[emit]\nprint-symbol = \"printf\"\ntarget-triple = \"riscv64gc-unknown-linux-gnu\"\n",
    )
    .expect("write config");

    keel().arg(&src).arg("--emit-ir").arg(&out).assert().success();

    let ir = fs::read_to_string(&out).expect("read ir");
    assert!(ir.contains("declare i32 @printf(ptr, ...)"));
    assert!(ir.contains("target triple = \"riscv64gc-unknown-linux-gnu\""));
}

#[test]
fn cli_flags_override_the_config_file() {
    let dir = tempdir().expect("tempdir");
    let src = dir.path().join("main.kl");
    let cfg = dir.path().join("strict.toml");
    fs::write(&src, "fn main() { int unused = 1; }\n").expect("write input");
    fs::write(&cfg, "[diagnostics]\ndeny-warnings = true\ncontext-lines = 5\n").expect("write config");

    keel()
        .arg(&src)
        .arg(format!("--config={}", cfg.display()))
        .arg("--context-lines=0")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error: [4005]"));
}

#[test]
fn broken_config_is_reported() {
    let dir = tempdir().expect("tempdir");
    let src = dir.path().join("main.kl");
    fs::write(&src, "fn main() {}\n").expect("write input");
    fs::write(dir.path().join("keel.toml"), "[emit]\nprint-symbol = 3\n").expect("write config");

    keel()
        .arg(&src)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("keel.toml"));
}

#[test]
fn fancy_style_renders_through_miette() {
    keel()
        .arg(fixture("s3_ancestor_defer_without_return.kl"))
        .arg("--diagnostic-style=fancy")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("keel::raii::5001"));
}

#[test]
fn diagnostics_are_shown_even_when_ir_cannot_be_written() {
    let dir = tempdir().expect("tempdir");
    let src = dir.path().join("main.kl");
    fs::write(&src, "fn main() { int unused = 1; }\n").expect("write input");
    let out = dir.path().join("missing").join("main.ll");

    keel()
        .arg(&src)
        .arg(format!("--emit-ir={}", out.display()))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("warning: [4005]"))
        .stderr(predicate::str::contains("cannot write IR"));
}
