use std::path::PathBuf;

use keel::{CompileOptions, CompileOutcome, ExitStatus, compile};
use keel_ast::CleanupAction;
use keel_core::ExitKind;
use keel_diagnostics::{Severity, codes};
use miette::{IntoDiagnostic, Result};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn opts() -> CompileOptions {
    CompileOptions {
        target_triple: Some("x86_64-unknown-linux-gnu".to_string()),
        ..CompileOptions::default()
    }
}

fn run(name: &str) -> Result<CompileOutcome> {
    Ok(compile(&fixture(name), &opts()))
}

fn ir_of(out: &CompileOutcome) -> Result<String> {
    out.ir_text()
        .ok_or_else(|| miette::miette!("no IR emitted:\n{}", out.render(2)))
}

#[test]
fn hello_world() -> Result<()> {
    let out = run("s1_hello.kl")?;
    assert!(out.diagnostics.is_empty(), "{}", out.render(2));
    assert_eq!(out.status, ExitStatus::Success);

    let ir = ir_of(&out)?;
    assert_eq!(ir.matches("define ").count(), 1);
    assert!(ir.contains("define i32 @main() {"));
    assert!(ir.contains("ret i32 0"));
    assert!(ir.contains("c\"Hello\\0A\\00\""));
    assert!(ir.contains("@print(ptr @.str0)"));
    Ok(())
}

#[test]
fn conditional_defer_of_branch_local() -> Result<()> {
    let out = run("s2_conditional_local_defer.kl")?;
    assert!(out.diagnostics.is_empty(), "{}", out.render(2));

    let cleaned = out.cleaned.as_ref().expect("raii ran");
    let report = cleaned.report("main").expect("main report");
    let branch_end: Vec<_> = report
        .exits
        .iter()
        .filter(|e| e.kind == ExitKind::FallOff && e.vars() == ["y"])
        .collect();
    assert_eq!(branch_end.len(), 1);
    assert!(matches!(
        &branch_end[0].sequence[0].action,
        CleanupAction::Deferred(call) if call.callee.node == "destroy"
    ));

    let returns: Vec<_> = report.returns().collect();
    assert_eq!(returns.len(), 1);
    assert_eq!(returns[0].vars(), ["x"]);
    assert_eq!(returns[0].sequence[0].action, CleanupAction::Destructor);

    let ir = ir_of(&out)?;
    assert!(ir.contains("declare void @destroy(i32)"));
    assert_eq!(ir.matches("call void @destroy(").count(), 1);
    Ok(())
}

#[test]
fn conditional_defer_of_ancestor_without_return() -> Result<()> {
    let out = run("s3_ancestor_defer_without_return.kl")?;
    let errs: Vec<_> = out.diagnostics.iter().collect();
    assert_eq!(errs.len(), 1, "{}", out.render(2));
    assert_eq!(errs[0].code, codes::RAII_CONDITIONAL_ANCESTOR_DEFER);
    assert_eq!(errs[0].severity, Severity::Error);
    assert_eq!(errs[0].tokens[0].lexeme, "x");
    assert_eq!(
        errs[0].scope.as_ref().map(|s| s.label.as_str()),
        Some("`if` body")
    );
    assert_eq!(out.status, ExitStatus::Failed);
    assert_ne!(out.status.code(), 0);
    assert!(out.module.is_none());
    Ok(())
}

#[test]
fn conditional_defer_of_ancestor_with_return() -> Result<()> {
    let out = run("s4_ancestor_defer_with_return.kl")?;
    assert!(out.diagnostics.is_empty(), "{}", out.render(2));

    let cleaned = out.cleaned.as_ref().expect("raii ran");
    let returns: Vec<_> = cleaned.report("main").expect("main report").returns().collect();
    assert_eq!(returns.len(), 2);
    for ret in &returns {
        assert_eq!(ret.vars(), ["x"]);
    }
    let actions: Vec<_> = returns.iter().map(|r| &r.sequence[0].action).collect();
    assert_eq!(
        actions
            .iter()
            .filter(|a| matches!(a, CleanupAction::Deferred(_)))
            .count(),
        1
    );
    assert_eq!(
        actions
            .iter()
            .filter(|a| matches!(a, CleanupAction::Destructor))
            .count(),
        1
    );

    let ir = ir_of(&out)?;
    assert_eq!(ir.matches("call void @destroy(").count(), 1);
    Ok(())
}

#[test]
fn unterminated_string() -> Result<()> {
    let out = run("s5_unterminated_string.kl")?;
    let err = out
        .diagnostics
        .with_code(codes::LEX_UNTERMINATED_STRING)
        .next()
        .expect("2001 reported");
    let pos = err.primary_position().expect("positioned");
    assert_eq!((pos.line, pos.column), (1, 19));
    assert_eq!(out.status, ExitStatus::Failed);
    assert!(out.module.is_none());

    let rendered = out.render(2);
    assert!(rendered.contains("s5_unterminated_string.kl:1:19: error: [2001]"), "{rendered}");
    Ok(())
}

#[test]
fn bounded_for_loop() -> Result<()> {
    let out = run("s6_bounded_for.kl")?;
    assert!(out.diagnostics.is_empty(), "{}", out.render(2));

    let ir = ir_of(&out)?;
    assert_eq!(ir.matches("@print(ptr @.str0)").count(), 3);
    assert!(!ir.contains("br "));
    Ok(())
}

#[test]
fn emitted_ir_is_written_when_requested() -> Result<()> {
    let dir = tempfile::tempdir().into_diagnostic()?;
    let target = dir.path().join("hello.ll");
    let mut o = opts();
    o.emit_ir = Some(target.clone());

    let out = compile(&fixture("s1_hello.kl"), &o);
    assert!(out.succeeded());
    out.write_artifacts(&o)?;
    let written = std::fs::read_to_string(&target).into_diagnostic()?;
    assert_eq!(Some(written), out.ir_text());
    Ok(())
}

#[test]
fn failing_compilations_write_nothing() -> Result<()> {
    let dir = tempfile::tempdir().into_diagnostic()?;
    let target = dir.path().join("s3.ll");
    let mut o = opts();
    o.emit_ir = Some(target.clone());

    let out = compile(&fixture("s3_ancestor_defer_without_return.kl"), &o);
    assert!(!out.succeeded());
    out.write_artifacts(&o)?;
    assert!(!target.exists());
    Ok(())
}

#[test]
fn every_deferred_call_reaches_the_ir() -> Result<()> {
    let out = keel::compile_str(
        "twice.kl",
        "fn main() { int x = 1; defer d(x); defer e(x); }",
        &opts(),
    );
    assert_eq!(out.status, ExitStatus::Success, "{}", out.render(2));

    let ir = ir_of(&out)?;
    assert!(ir.contains("declare void @d(i32)"), "{ir}");
    assert!(ir.contains("declare void @e(i32)"), "{ir}");
    let e = ir.find("call void @e(").ok_or_else(|| miette::miette!("no call to @e:\n{ir}"))?;
    let d = ir.find("call void @d(").ok_or_else(|| miette::miette!("no call to @d:\n{ir}"))?;
    assert!(e < d, "newest defer runs first:\n{ir}");
    Ok(())
}
