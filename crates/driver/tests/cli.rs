use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

fn rv32cc() -> Command {
    Command::cargo_bin("rv32cc").unwrap()
}

#[test]
fn compiles_file_to_stdout() {
    let dir = tempdir().unwrap();
    let c_path = dir.path().join("ret7.c");
    fs::write(&c_path, "int main() { return 1 + 2 * 3; }\n").unwrap();

    rv32cc()
        .arg(&c_path)
        .assert()
        .success()
        .stdout(predicate::str::contains(".option nopic"))
        .stdout(predicate::str::contains(".globl main"))
        .stdout(predicate::str::contains("mul t0, t1, t0"));
}

#[test]
fn output_flag_writes_file() {
    let dir = tempdir().unwrap();
    let c_path = dir.path().join("prog.c");
    let s_path = dir.path().join("prog.s");
    fs::write(&c_path, "char *s = \"hey\";\nint main() { return 0; }\n").unwrap();

    rv32cc()
        .arg("-o")
        .arg(&s_path)
        .arg(&c_path)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let asm = fs::read_to_string(&s_path).unwrap();
    assert!(asm.contains(".L.C1:\n  .string \"hey\"\n"), "{asm}");
}

#[test]
fn missing_input_exits_with_one() {
    rv32cc().assert().code(1).stderr(predicate::str::contains("Usage"));
}

#[test]
fn extra_argument_exits_with_one() {
    rv32cc().args(["a.c", "b.c"]).assert().code(1);
}

#[test]
fn help_exits_with_zero() {
    rv32cc().arg("--help").assert().success().stdout(predicate::str::contains("--dump-ast"));
}

#[test]
fn unreadable_input_is_reported() {
    rv32cc()
        .arg("/definitely/not/here.c")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed to read /definitely/not/here.c"));
}

#[test]
fn compile_error_exits_with_one() {
    let dir = tempdir().unwrap();
    let c_path = dir.path().join("bad.c");
    fs::write(&c_path, "int main() { return x; }\n").unwrap();

    rv32cc()
        .arg(&c_path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("undeclared identifier 'x'"));
}

#[test]
fn earlier_declarations_stay_emitted_after_an_error() {
    let dir = tempdir().unwrap();
    let c_path = dir.path().join("half.c");
    fs::write(&c_path, "int ok() { return 1; }\nint bad() { return @; }\n").unwrap();

    // the lexer runs first, so nothing is emitted for a lexical error
    rv32cc().arg(&c_path).assert().code(1).stdout(predicate::str::is_empty());

    fs::write(&c_path, "int ok() { return 1; }\nint bad() { return y; }\n").unwrap();
    rv32cc()
        .arg(&c_path)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("ok:"))
        .stdout(predicate::str::contains("bad:").not());
}

#[test]
fn reads_standard_input() {
    rv32cc()
        .arg("-")
        .write_stdin("int main() { return 0; }")
        .assert()
        .success()
        .stdout(predicate::str::contains(".file \"<stdin>\""))
        .stdout(predicate::str::contains("main:"));
}

#[test]
fn dump_ast_goes_to_stderr() {
    let dir = tempdir().unwrap();
    let c_path = dir.path().join("ast.c");
    fs::write(&c_path, "int main() { int a; a = 2; return a[0]; }").unwrap();

    rv32cc()
        .arg("--dump-ast")
        .arg(&c_path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cannot dereference"));

    fs::write(&c_path, "int main() { int a[2]; a[1] = 2; return a[1]; }").unwrap();
    rv32cc()
        .arg("--dump-ast")
        .arg(&c_path)
        .assert()
        .success()
        .stderr(predicate::str::contains("int main() {"))
        .stderr(predicate::str::contains("(*(a + 1) = 2);"));
}

#[test]
fn dump_tokens_lists_every_token() {
    let dir = tempdir().unwrap();
    let c_path = dir.path().join("tok.c");
    fs::write(&c_path, "int x;\n").unwrap();

    rv32cc()
        .arg("--dump-tokens")
        .arg(&c_path)
        .assert()
        .success()
        .stderr(predicate::str::contains("1:1\tKeyword(Int)\tint"))
        .stderr(predicate::str::contains("1:5\tIdentifier\tx"))
        .stderr(predicate::str::contains("Eof"));
}
