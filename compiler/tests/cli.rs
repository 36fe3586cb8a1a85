// End-to-end tests for the `lifewire` binary: exit codes, emit modes and
// option handling.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn lifewire_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_lifewire"))
}

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn run(args: &[&str]) -> Output {
    Command::new(lifewire_binary())
        .args(args)
        .output()
        .expect("failed to run lifewire")
}

fn stdout(output: &Output) -> String {
    String::from_utf8(output.stdout.clone()).expect("non-UTF8 output")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn clean_graph_exits_zero() {
    let path = fixture("increment_mutable.json");
    let out = run(&[path.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "0 error(s), 0 warning(s)\n");
}

#[test]
fn errors_exit_one_and_are_listed() {
    let path = fixture("increment_immutable.json");
    let out = run(&[path.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(1));
    let text = stdout(&out);
    assert!(text.contains("error[E0201]"), "{text}");
    assert!(text.ends_with("1 error(s), 0 warning(s)\n"), "{text}");
}

#[test]
fn warnings_alone_do_not_fail() {
    let path = fixture("borrow_frame.json");
    let out = run(&[path.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
    assert!(stdout(&out).ends_with("0 error(s), 1 warning(s)\n"));
}

#[test]
fn config_file_toggles_features() {
    let graph = fixture("vectors.json");
    let config = fixture("no_vectors.config.json");
    let out = run(&[graph.to_str().unwrap(), "--config", config.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(1));
    assert_eq!(stdout(&out).matches("error[E0400]").count(), 2);

    let out = run(&[graph.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
}

#[test]
fn stop_after_skips_validation() {
    let path = fixture("increment_immutable.json");
    let out = run(&[path.to_str().unwrap(), "--stop-after", "set_types"]);
    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "0 error(s), 0 warning(s)\n");
}

#[test]
fn unknown_pass_name_is_a_usage_error() {
    let path = fixture("increment_mutable.json");
    let out = run(&[path.to_str().unwrap(), "--stop-after", "lowering"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("unknown pass `lowering`"), "{}", stderr(&out));
}

#[test]
fn malformed_document_exits_two() {
    let path = fixture("malformed.json");
    let out = run(&[path.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("invalid type `Option<`"), "{}", stderr(&out));
}

#[test]
fn missing_document_exits_two() {
    let out = run(&["does-not-exist.json"]);
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn emit_graph_prints_the_dump() {
    let path = fixture("increment_mutable.json");
    let out = run(&[path.to_str().unwrap(), "--emit", "graph"]);
    assert_eq!(out.status.code(), Some(0));
    let text = stdout(&out);
    assert!(text.starts_with("d0:\n"), "{text}");
    assert!(text.contains("explicit_borrow(owner_to_mutable, auto)"), "{text}");
    assert!(text.contains("terminate_lifetime"), "{text}");
}

#[test]
fn emit_dot_prints_a_digraph() {
    let path = fixture("borrow_frame.json");
    let out = run(&[path.to_str().unwrap(), "--emit", "dot"]);
    assert_eq!(out.status.code(), Some(0));
    let text = stdout(&out);
    assert!(text.starts_with("digraph lifewire {"), "{text}");
    assert!(text.contains("subgraph cluster_s0"), "{text}");
    // Diagnostics go to stderr when stdout carries another artifact.
    assert!(stderr(&out).contains("warning[W0600]"), "{}", stderr(&out));
}

#[test]
fn emit_fingerprint_is_hex() {
    let path = fixture("increment_mutable.json");
    let out = run(&[path.to_str().unwrap(), "--emit", "fingerprint"]);
    assert_eq!(out.status.code(), Some(0));
    let text = stdout(&out);
    let line = text.trim_end();
    assert_eq!(line.len(), 64, "{line}");
    assert!(line.chars().all(|c| c.is_ascii_hexdigit()));
}
