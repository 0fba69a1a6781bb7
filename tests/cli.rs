use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

fn tombo() -> Command {
    Command::cargo_bin("tombo").expect("binary exists")
}

#[test]
fn tombo_run_script() {
    let dir = tempdir().expect("create temp dir");
    let script = dir.path().join("hello.tombo");
    fs::write(
        &script,
        r#"
# greet everyone on the list
let names = ["Ada", "Grace"]
for name in names
    println("Hello, " + name + "!")
end
"#,
    )
    .expect("write script");

    tombo()
        .arg("run")
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("Hello, Ada!\nHello, Grace!\n"));
}

#[test]
fn tombo_eval_snippet() {
    tombo()
        .arg("eval")
        .arg("println(1 + 2 + 3)")
        .assert()
        .success()
        .stdout("6\n");
}

#[test]
fn runtime_error_reports_position_and_excerpt() {
    tombo()
        .arg("eval")
        .arg("let a = 1\nlet b = a + \"x\"")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains(
            "RuntimeError(TypeError): cannot apply `+` to Number and String (line 2, column 11)",
        ))
        .stderr(predicate::str::contains("> 2 | let b = a + \"x\""));
}

#[test]
fn parse_error_exits_with_failure() {
    tombo()
        .arg("eval")
        .arg("while true\n  1\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "ParseError: expected `end`, found end of input",
        ));
}

#[test]
fn missing_script_is_an_io_error() {
    let dir = tempdir().expect("create temp dir");
    tombo()
        .arg("run")
        .arg(dir.path().join("absent.tombo"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("IoError"))
        .stderr(predicate::str::contains("absent.tombo"));
}

#[test]
fn max_call_depth_flag_bounds_recursion() {
    tombo()
        .args(["--max-call-depth", "10", "eval"])
        .arg("function f(n) => f(n + 1)\nf(0)")
        .assert()
        .failure()
        .stderr(predicate::str::contains("RuntimeError(RecursionLimit)"));
}

#[test]
fn no_prelude_flag_starts_empty() {
    tombo()
        .args(["eval", "--no-prelude", "println(1)"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("undefined variable `println`"));
}

#[test]
fn deeply_nested_source_evaluates() {
    let depth = 20_000;
    let source = format!("println({}1{})", "(".repeat(depth), ")".repeat(depth));
    tombo()
        .arg("eval")
        .arg(source)
        .assert()
        .success()
        .stdout("1\n");
}
