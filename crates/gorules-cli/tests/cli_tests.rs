//! End-to-end tests for the compilepkg binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn compilepkg() -> Command {
    Command::cargo_bin("compilepkg").unwrap()
}

#[test]
fn test_help() {
    compilepkg()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--testfilter"))
        .stdout(predicate::str::contains("--cgoarc"));
}

#[test]
fn test_missing_output_flag() {
    compilepkg()
        .args(["-p", "example.com/p", "--go", "go", "--goroot", "/go"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("-o is required"));
}

#[test]
fn test_missing_action_file() {
    compilepkg()
        .args(["--config", "/definitely/not/action.toml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration file not found"));
}

#[test]
fn test_invalid_test_filter_runs_nothing() {
    let dir = TempDir::new().unwrap();
    compilepkg()
        .args(["-p", "p", "-o"])
        .arg(dir.path().join("p.a"))
        .args(["--go", "/definitely/not/go", "--goroot", "/go", "--testfilter", "bogus"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid test filter 'bogus'"))
        .stderr(predicate::str::contains("error running").not());
    assert!(!dir.path().join("p.a").exists());
}

#[test]
fn test_missing_dependency_is_reported() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("a.go");
    fs::write(&src, "package p\n\nimport \"example.com/nope\"\n").unwrap();

    compilepkg()
        .args(["-p", "example.com/p", "-o"])
        .arg(dir.path().join("p.a"))
        .args(["--go", "/definitely/not/go", "--goroot", "/go", "--src"])
        .arg(&src)
        .args(["--arc", "example.com/dep=example.com/dep=dep.a"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("missing strict dependencies:"))
        .stderr(predicate::str::contains("import of \"example.com/nope\""))
        .stderr(predicate::str::contains("\texample.com/dep"));
}

#[test]
fn test_unrecognized_extension() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("main.rs");
    fs::write(&src, "fn main() {}\n").unwrap();

    compilepkg()
        .args(["-p", "p", "-o", "p.a", "--go", "go", "--goroot", "/go", "--src"])
        .arg(&src)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unrecognized file extension"));
}

#[cfg(unix)]
fn fake_go(dir: &Path) -> std::path::PathBuf {
    use gorules_build::archive::{write_archive, Member};
    use std::os::unix::fs::PermissionsExt;

    let archive = dir.join("pkg.a");
    write_archive(&archive, &[Member::new("__.PKGDEF", "go object\n")]).unwrap();

    let script = format!(
        r#"#!/bin/sh
tool=$2
shift 2
echo "$tool $*" >> "{log}"
if [ -f "{fail}" ]; then
  cat "{fail}" >&2
  exit 2
fi
out=
prev=
for a in "$@"; do
  if [ "$prev" = "-o" ]; then out=$a; fi
  prev=$a
done
if [ "$tool" = compile ]; then cp "{archive}" "$out"; fi
"#,
        log = dir.join("go.log").display(),
        fail = dir.join("fail").display(),
        archive = archive.display(),
    );
    let go = dir.join("go");
    fs::write(&go, script).unwrap();
    fs::set_permissions(&go, fs::Permissions::from_mode(0o755)).unwrap();
    go
}

#[cfg(unix)]
#[test]
fn test_compiles_from_action_file() {
    let dir = TempDir::new().unwrap();
    let go = fake_go(dir.path());
    let src = dir.path().join("a.go");
    fs::write(&src, "package p\n\nimport \"fmt\"\n").unwrap();
    let list = dir.path().join("packages.txt");
    fs::write(&list, "fmt\nos\n").unwrap();
    let output = dir.path().join("out").join("p.a");

    let action = dir.path().join("action.toml");
    fs::write(
        &action,
        format!(
            r#"
package_path = "example.com/p"
output = "{output}"
sources = ["{src}"]
package_list = "{list}"

[toolchain]
go = "{go}"
goroot = "{goroot}"
work_dir_root = "{work}"
"#,
            output = output.display(),
            src = src.display(),
            list = list.display(),
            go = go.display(),
            goroot = dir.path().join("goroot").display(),
            work = dir.path().join("work").display(),
        ),
    )
    .unwrap();

    compilepkg()
        .arg("--config")
        .arg(&action)
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"archive\""))
        .stdout(predicate::str::contains("\"go_sources\": 1"));

    assert!(output.exists());
    let log = fs::read_to_string(dir.path().join("go.log")).unwrap();
    assert!(log.starts_with("compile -p example.com/p -importcfg "));
    assert_eq!(fs::read_dir(dir.path().join("work")).unwrap().count(), 0);
}

#[cfg(unix)]
#[test]
fn test_compile_failure_output_is_printed() {
    let dir = TempDir::new().unwrap();
    let go = fake_go(dir.path());
    let src = dir.path().join("a.go");
    fs::write(&src, "package p\n").unwrap();
    fs::write(dir.path().join("fail"), "a.go:1:9: syntax error\n").unwrap();

    compilepkg()
        .args(["-p", "example.com/p", "-o"])
        .arg(dir.path().join("p.a"))
        .arg("--go")
        .arg(&go)
        .arg("--goroot")
        .arg(dir.path().join("goroot"))
        .arg("--src")
        .arg(&src)
        .assert()
        .code(1)
        .stderr("a.go:1:9: syntax error\n");
}
