//! Pruebas de integración de la CLI.
//!
//! Se ejecuta el binario compilado y se verifican stdout, stderr y el
//! código de salida.

use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::path::PathBuf;

/// Archivo del lenguaje de ejemplo bajo `grammars/`.
fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("grammars")
        .join(name)
}

fn ccgen() -> Command {
    Command::cargo_bin("ccgen").unwrap()
}

#[test]
fn translates_the_demo_program() {
    let expected = std::fs::read_to_string(demo("toy.expected")).unwrap();

    let mut cmd = ccgen();
    cmd.arg(demo("toy.lex"))
        .arg(demo("toy.grammar"))
        .arg(demo("toy.src"));

    cmd.assert().success().stdout(predicate::str::diff(expected));
}

#[test]
fn reads_the_program_from_stdin() {
    let mut cmd = ccgen();
    cmd.arg(demo("toy.lex"))
        .arg(demo("toy.grammar"))
        .arg("-")
        .write_stdin("var x; x = 1 + 2; print(x);");

    cmd.assert()
        .success()
        .stdout("t1 = 1 + 2\nx = t1\nparam x\ncall print, 1\n");
}

#[test]
fn writes_the_output_file() {
    let temp = assert_fs::TempDir::new().unwrap();
    let source = temp.child("prog.src");
    source.write_str("var a; a = 4;").unwrap();

    let output = temp.child("prog.tac");

    let mut cmd = ccgen();
    cmd.arg(demo("toy.lex"))
        .arg(demo("toy.grammar"))
        .arg(source.path())
        .arg("-o")
        .arg(output.path());

    cmd.assert().success().stdout(predicate::str::is_empty());
    output.assert("a = 4\n");
}

#[test]
fn shows_tokens_and_tables() {
    let temp = assert_fs::TempDir::new().unwrap();
    let source = temp.child("prog.src");
    source.write_str("var a;\na = 4;").unwrap();

    let mut cmd = ccgen();
    cmd.arg(demo("toy.lex"))
        .arg(demo("toy.grammar"))
        .arg(source.path())
        .arg("--tokens")
        .arg("--tables");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("# FIRST / FOLLOW"))
        .stdout(predicate::str::contains("Expr_TAIL"))
        .stdout(predicate::str::contains("1:1\tVAR\tvar\n"))
        .stdout(predicate::str::contains("2:3\tASSIGN\t=\n"))
        .stdout(predicate::str::ends_with("a = 4\n"));
}

#[test]
fn shows_the_control_flow_graph() {
    let mut cmd = ccgen();
    cmd.arg(demo("toy.lex"))
        .arg(demo("toy.grammar"))
        .arg("-")
        .arg("--flow")
        .write_stdin("var i; i = 0; while (i < 3) i = i + 1;");

    cmd.assert()
        .success()
        .stdout(predicate::str::starts_with("i = 0\nL1:\n"))
        .stdout(predicate::str::contains("graph TD\n"))
        .stdout(predicate::str::contains("    B1{\"L1:<br/>t1 = i < 3<br/>t2 = not t1<br/>if t2 goto L2\"}\n"))
        .stdout(predicate::str::contains("    B1 -->|Y| B3\n"))
        .stdout(predicate::str::contains("    B2 --> B1\n"));
}

#[test]
fn checks_rules_without_a_program() {
    let mut cmd = ccgen();
    cmd.arg(demo("toy.lex")).arg(demo("toy.grammar"));
    cmd.assert().success().stdout(predicate::str::is_empty());
}

#[test]
fn reports_bad_patterns_with_their_rule() {
    let temp = assert_fs::TempDir::new().unwrap();
    let lexer = temp.child("broken.lex");
    lexer.write_str("NUM = [0-9]+\nID = [a-z\n").unwrap();

    let grammar = temp.child("g.grammar");
    grammar.write_str("S -> NUM").unwrap();

    let mut cmd = ccgen();
    cmd.arg(lexer.path()).arg(grammar.path());

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("pattern error: Bad pattern `[a-z` for rule `ID`"))
        .stderr(predicate::str::contains("broken.lex:2:"));
}

#[test]
fn reports_grammar_conflicts() {
    let temp = assert_fs::TempDir::new().unwrap();
    let grammar = temp.child("ambiguous.grammar");
    grammar
        .write_str("S -> A | B\nA -> NUM PLUS NUM\nB -> NUM MINUS NUM\n")
        .unwrap();

    let mut cmd = ccgen();
    cmd.arg(demo("toy.lex")).arg(grammar.path());

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to normalize grammar"))
        .stderr(predicate::str::contains("`S`"))
        .stderr(predicate::str::contains("`NUM`"));
}

#[test]
fn reports_every_semantic_error() {
    let mut cmd = ccgen();
    cmd.arg(demo("toy.lex"))
        .arg(demo("toy.grammar"))
        .arg("-")
        .write_stdin("var total;\ntotal = totl + 1;\nprint(count);\n");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains(
            "semantic error: Symbol `totl` is undefined, did you mean `total`?",
        ))
        .stderr(predicate::str::contains("semantic error: Symbol `count` is undefined"))
        .stderr(predicate::str::contains("Build failed with 2 errors"));
}

#[test]
fn explicit_declarations_survive_relaxed_checks() {
    let mut cmd = ccgen();
    cmd.arg(demo("toy.lex"))
        .arg(demo("toy.grammar"))
        .arg("-")
        .arg("--no-check")
        .write_stdin("y = x;");

    // El archivo de gramática exige declaraciones
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Symbol `y` is undefined"));
}

#[test]
fn reports_syntax_errors_at_the_offending_token() {
    let mut cmd = ccgen();
    cmd.arg(demo("toy.lex"))
        .arg(demo("toy.grammar"))
        .arg("-")
        .write_stdin("var a;\na = ;");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("syntax error: Expected"))
        .stderr(predicate::str::contains("-:2:5"));
}

#[test]
fn fails_when_file_missing() {
    let mut cmd = ccgen();
    cmd.arg("does-not-exist.lex").arg(demo("toy.grammar"));
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read: does-not-exist.lex"));
}

#[test]
fn shows_version() {
    let mut cmd = ccgen();
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
