use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn compiles_a_single_unit() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("hello.tn");
    fs::write(&input_path, "print \"hello\";").expect("write input");

    Command::cargo_bin("tern-cli")
        .expect("binary exists")
        .arg("--input")
        .arg(&input_path)
        .assert()
        .success();

    assert!(dir.path().join("hello.h").exists(), "header was not created");
    let body = fs::read_to_string(dir.path().join("hello.c")).expect("read body");
    assert!(body.contains("tn_print_string"));
    let entry = fs::read_to_string(dir.path().join("hello_main.c")).expect("read entry");
    assert!(entry.contains("int main(int argc, char **argv)"));
}

#[test]
fn compiles_imported_units() {
    let dir = tempdir().expect("tempdir");
    fs::write(
        dir.path().join("lib.tn"),
        "export function add(a: int, b: int): int { return a + b; }",
    )
    .expect("write lib");
    let input_path = dir.path().join("app.tn");
    fs::write(&input_path, "import add from \"lib\"; print add(1, 2);").expect("write app");

    Command::cargo_bin("tern-cli")
        .expect("binary exists")
        .arg("--input")
        .arg(&input_path)
        .assert()
        .success();

    assert!(dir.path().join("lib.h").exists(), "imported header missing");
    assert!(
        !dir.path().join("lib_main.c").exists(),
        "imported units must not define main"
    );
    let body = fs::read_to_string(dir.path().join("app.c")).expect("read body");
    assert!(body.contains("lib_add(1LL, 2LL)"));
}

#[test]
fn honors_the_out_dir_flag() {
    let dir = tempdir().expect("tempdir");
    let out = tempdir().expect("out dir");
    let input_path = dir.path().join("one.tn");
    fs::write(&input_path, "var x: int = 1 + 2; print x;").expect("write input");

    Command::cargo_bin("tern-cli")
        .expect("binary exists")
        .arg("--input")
        .arg(&input_path)
        .arg("--out-dir")
        .arg(out.path())
        .assert()
        .success();

    let body = fs::read_to_string(out.path().join("one.c")).expect("read body");
    assert!(body.contains("= 3LL;"), "constant folding should reach the output");
    assert!(!dir.path().join("one.c").exists());
}

#[test]
fn library_builds_skip_the_entry_file() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("lib.tn");
    fs::write(&input_path, "export var x: int = 1;").expect("write input");

    Command::cargo_bin("tern-cli")
        .expect("binary exists")
        .arg("--input")
        .arg(&input_path)
        .arg("--lib")
        .assert()
        .success();

    assert!(dir.path().join("lib.h").exists());
    assert!(!dir.path().join("lib_main.c").exists());
}

#[test]
fn warns_about_unrecognized_bytes() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("odd.tn");
    fs::write(&input_path, "var x: int = 1; ?\nprint x;").expect("write input");

    Command::cargo_bin("tern-cli")
        .expect("binary exists")
        .arg("--input")
        .arg(&input_path)
        .assert()
        .success()
        .stderr(predicate::str::contains("unrecognized character"));

    assert!(dir.path().join("odd.c").exists(), "compilation should continue");
}

#[test]
fn reports_undefined_names() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("bad.tn");
    fs::write(&input_path, "var x: int = y;").expect("write input");

    Command::cargo_bin("tern-cli")
        .expect("binary exists")
        .arg("--input")
        .arg(&input_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("'y' is not defined"));
}

#[test]
fn reports_missing_units() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("app.tn");
    fs::write(&input_path, "import \"nowhere\";").expect("write input");

    Command::cargo_bin("tern-cli")
        .expect("binary exists")
        .arg("--input")
        .arg(&input_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("nowhere"));
}

#[test]
fn reports_constant_division_by_zero() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("bad.tn");
    fs::write(&input_path, "var x: int = 4 // 0;").expect("write input");

    Command::cargo_bin("tern-cli")
        .expect("binary exists")
        .arg("--input")
        .arg(&input_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("division by zero"));
}

#[test]
fn reports_forward_variable_use() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("bad.tn");
    fs::write(&input_path, "f(); var g: int = 1; function f(): int { return g; }")
        .expect("write input");

    Command::cargo_bin("tern-cli")
        .expect("binary exists")
        .arg("--input")
        .arg(&input_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("declared later"));
}
