#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn stagecache(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("stagecache").unwrap();
    cmd.env_remove("STAGECACHE_DIR").arg("--dir").arg(dir);
    cmd
}

fn run_demo(dir: &Path, mode: &str) -> Value {
    let out = stagecache(dir)
        .args(["demo", "--durable", "--mode", mode])
        .output()
        .unwrap();
    assert!(out.status.success(), "demo failed: {out:?}");
    serde_json::from_slice(&out.stdout).expect("demo prints JSON")
}

#[test]
fn demo_squares_and_populates_eagerly() {
    let tmp = tempdir().unwrap();
    let out = stagecache(tmp.path()).arg("demo").output().unwrap();
    assert!(out.status.success());

    let v: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["values"], serde_json::json!([16, 81, 9, 49, 1, 4, 25]));
    assert_eq!(v["calls_at_build"], 7);
    assert_eq!(v["calls_total"], 7);
    assert_eq!(v["stats"]["hits"], 7);
}

#[test]
fn inspect_lists_durable_namespace() {
    let tmp = tempdir().unwrap();
    let demo = run_demo(tmp.path(), "eager");
    let ns = demo["namespace"].as_str().unwrap().to_string();

    let out = stagecache(tmp.path())
        .args(["inspect", "--json"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let v: Value = serde_json::from_slice(&out.stdout).unwrap();
    let entries = v.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["namespace"], ns.as_str());
    assert_eq!(entries[0]["entries"], 7);
    assert_eq!(entries[0]["manifest"]["stages"], serde_json::json!(["square@1"]));

    stagecache(tmp.path())
        .arg("inspect")
        .assert()
        .success()
        .stdout(predicate::str::contains("entries=7"));
}

#[test]
fn verify_exit_code_reflects_corruption() {
    let tmp = tempdir().unwrap();
    let demo = run_demo(tmp.path(), "eager");
    let ns = demo["namespace"].as_str().unwrap().to_string();

    stagecache(tmp.path()).arg("verify").assert().code(0);

    let artifact = tmp.path().join(&ns).join("1.json");
    let text = fs::read_to_string(&artifact).unwrap();
    fs::write(&artifact, text.replace("\"record\":81", "\"record\":80")).unwrap();

    stagecache(tmp.path())
        .args(["verify", "--namespace", &ns])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("CORRUPT [1]"));
}

#[test]
fn evict_entry_then_namespace() {
    let tmp = tempdir().unwrap();
    let demo = run_demo(tmp.path(), "eager");
    let ns = demo["namespace"].as_str().unwrap().to_string();

    stagecache(tmp.path())
        .args(["evict", "--namespace", &ns, "--index", "3"])
        .assert()
        .success();
    assert!(!tmp.path().join(&ns).join("3.json").exists());
    assert!(tmp.path().join(&ns).join("4.json").exists());

    // Lazy rerun recomputes only the evicted entry.
    let rerun = run_demo(tmp.path(), "lazy");
    assert_eq!(rerun["calls_total"], 1);

    stagecache(tmp.path())
        .args(["evict", "--namespace", &ns])
        .assert()
        .success();
    assert!(!tmp.path().join(&ns).exists());
}

#[test]
fn clear_removes_everything() {
    let tmp = tempdir().unwrap();
    let cache = tmp.path().join("cache");
    run_demo(&cache, "eager");
    assert!(cache.exists());

    stagecache(&cache).arg("clear").assert().success();
    assert!(!cache.exists());

    stagecache(&cache)
        .arg("inspect")
        .assert()
        .success()
        .stdout(predicate::str::contains("no namespaces"));
}

#[test]
fn evict_rejects_namespace_outside_cache() {
    let tmp = tempdir().unwrap();
    let cache = tmp.path().join("cache");
    let outside = tmp.path().join("precious");
    fs::create_dir_all(&outside).unwrap();
    fs::write(outside.join("data.txt"), "keep me").unwrap();
    run_demo(&cache, "eager");

    stagecache(&cache)
        .args(["evict", "--namespace", "../precious"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid namespace"));
    assert!(outside.join("data.txt").exists());
}

#[test]
fn unknown_mode_is_usage_error() {
    let tmp = tempdir().unwrap();
    stagecache(tmp.path())
        .args(["demo", "--mode", "sometimes"])
        .assert()
        .code(2);
}
