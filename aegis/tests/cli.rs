use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

const CLEAN: &str = "module M:\n    fn one() -> int:\n        return 1\n";
const UNDECLARED: &str = "module M:\n    fn foo() -> int:\n        return x\n";

fn aegis(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("aegis").expect("binary exists");
    cmd.current_dir(dir).env_remove("AEGIS_LOG");
    cmd
}

#[test]
fn check_succeeds_on_a_clean_file() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("main.ae"), CLEAN).expect("write source");

    aegis(dir.path())
        .arg("check")
        .arg("main.ae")
        .assert()
        .success()
        .stdout(predicate::str::contains("checked 1 unit(s)"));
}

#[test]
fn check_renders_diagnostics_and_fails() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("main.ae"), UNDECLARED).expect("write source");

    aegis(dir.path())
        .arg("check")
        .arg("main.ae")
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot find `x`"))
        .stderr(predicate::str::contains("1 error(s)"));
}

#[test]
fn check_json_reports_positions() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("main.ae"), UNDECLARED).expect("write source");

    let assert = aegis(dir.path())
        .arg("check")
        .arg("--json")
        .arg("main.ae")
        .assert()
        .failure();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    let json: serde_json::Value = serde_json::from_str(&stdout).expect("json report");
    assert_eq!(json["schema"], "aegis.check.v1");
    assert_eq!(json["ok"], false);
    assert_eq!(json["units"][0]["status"], "failed");
    assert_eq!(json["diagnostics"][0]["kind"], "NameError");
    assert_eq!(json["diagnostics"][0]["line"], 3);
    assert_eq!(json["diagnostics"][0]["column"], 16);
}

#[test]
fn check_walks_directories_and_links_units() {
    let dir = tempdir().expect("tempdir");
    let src = dir.path().join("src");
    fs::create_dir_all(src.join("net")).expect("create dirs");
    fs::write(src.join("a.ae"), "module A:\n    fn one() -> int:\n        return 1\n").expect("write a");
    fs::write(
        src.join("net").join("b.ae"),
        "module B:\n    fn two() -> int:\n        return A.one() + 1\n",
    )
    .expect("write b");
    fs::write(src.join("notes.txt"), "not a source file").expect("write notes");

    aegis(dir.path())
        .arg("check")
        .arg("src")
        .assert()
        .success()
        .stdout(predicate::str::contains("checked 2 unit(s)"));
}

#[test]
fn manifest_supplies_sources_and_foreign_functions() {
    let dir = tempdir().expect("tempdir");
    fs::create_dir_all(dir.path().join("src")).expect("create src");
    fs::write(
        dir.path().join("aegis.toml"),
        "[project]\nname = \"demo\"\nsources = [\"src\"]\n\n[foreign]\nsleep = \"fn(int) -> bool\"\n",
    )
    .expect("write manifest");
    fs::write(
        dir.path().join("src").join("main.ae"),
        "module M:\n    fn nap() -> bool:\n        return sleep(5)\n",
    )
    .expect("write source");

    aegis(dir.path())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("checked 1 unit(s)"));
}

#[test]
fn max_depth_flag_overrides_the_default() {
    let dir = tempdir().expect("tempdir");
    let expr = format!("{}1{}", "(".repeat(40), ")".repeat(40));
    fs::write(
        dir.path().join("deep.ae"),
        format!("module M:\n    fn f() -> int:\n        return {expr}\n"),
    )
    .expect("write source");

    aegis(dir.path()).arg("check").arg("deep.ae").assert().success();
    aegis(dir.path())
        .arg("--max-depth")
        .arg("16")
        .arg("check")
        .arg("deep.ae")
        .assert()
        .failure()
        .stderr(predicate::str::contains("aegis::limit"));
}

#[test]
fn ir_is_written_to_a_file() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("main.ae"), CLEAN).expect("write source");
    let out = dir.path().join("main.ir");

    aegis(dir.path())
        .arg("ir")
        .arg("main.ae")
        .arg("--out")
        .arg(&out)
        .assert()
        .success();

    let ir = fs::read_to_string(&out).expect("read ir");
    assert!(ir.starts_with("; unit main.ae"), "{ir}");
    assert!(ir.contains("one("), "{ir}");
}

#[test]
fn tokens_include_layout_tokens() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("main.ae"), CLEAN).expect("write source");

    aegis(dir.path())
        .arg("tokens")
        .arg("main.ae")
        .assert()
        .success()
        .stdout(predicate::str::contains("1:1\tKeyword\tmodule"))
        .stdout(predicate::str::contains("BlockStart"))
        .stdout(predicate::str::contains("EndOfInput"));
}

#[test]
fn fmt_check_write_cycle() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("main.ae");
    fs::write(&path, "module M:\n    fn one() -> int:\n        return (1 + 2)\n").expect("write source");

    aegis(dir.path())
        .arg("fmt")
        .arg("main.ae")
        .assert()
        .success()
        .stdout(predicate::str::contains("return 1 + 2"));

    aegis(dir.path())
        .arg("fmt")
        .arg("main.ae")
        .arg("--check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not formatted"));

    aegis(dir.path()).arg("fmt").arg("main.ae").arg("--write").assert().success();
    aegis(dir.path()).arg("fmt").arg("main.ae").arg("--check").assert().success();
}

#[test]
fn missing_inputs_are_reported() {
    let dir = tempdir().expect("tempdir");

    aegis(dir.path())
        .arg("check")
        .arg("nope.ae")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no such file or directory"));

    aegis(dir.path())
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no `.ae` files found"));
}
