// Integration tests for per-node usage rules and feature toggles.

use lifewire::diag::{DiagCode, DiagLevel, DiagTarget};
use lifewire::document::{from_json, LoadedDocument};
use lifewire::options::{AnalysisOptions, FeatureToggles};
use lifewire::pipeline::{analyze, CompilationState};

fn run_with(json: &str, options: &AnalysisOptions) -> (LoadedDocument, CompilationState) {
    let doc = from_json(json).unwrap_or_else(|e| panic!("bad document: {e}"));
    let graph = doc.graph.clone();
    let state = analyze(graph, options).unwrap_or_else(|e| panic!("pipeline failed: {e}"));
    (doc, state)
}

fn run(json: &str) -> (LoadedDocument, CompilationState) {
    run_with(json, &AnalysisOptions::default())
}

fn codes(state: &CompilationState) -> Vec<&'static str> {
    state
        .diagnostics
        .iter()
        .filter_map(|d| d.code.map(|DiagCode(c)| c))
        .collect()
}

// ── Connectivity ────────────────────────────────────────────────────────────

#[test]
fn unwired_required_input() {
    let (doc, state) = run(r#"{"nodes": [{"name": "d", "kind": "drop"}]}"#);
    assert_eq!(codes(&state), vec!["E0100"]);
    let d = state.diagnostics.iter().next().unwrap();
    assert_eq!(d.target, DiagTarget::Terminal(doc.terminal("d.in0").unwrap()));
    assert_eq!(d.hint.as_deref(), Some("wire a value to this terminal"));
}

// ── Types ───────────────────────────────────────────────────────────────────

#[test]
fn vector_element_must_match() {
    let (doc, state) = run(
        r#"{
            "nodes": [
                {"name": "v", "kind": "vector_create"},
                {"name": "index", "kind": "constant", "type": "i32"},
                {"name": "element", "kind": "constant", "type": "bool"},
                {"name": "insert", "kind": "vector_insert"}
            ],
            "wires": [
                {"from": "v.out0", "to": ["insert.in0"], "mutable": true},
                {"from": "index.out0", "to": ["insert.in1"]},
                {"from": "element.out0", "to": ["insert.in2"]}
            ]
        }"#,
    );
    assert_eq!(codes(&state), vec!["E0200"]);
    let d = state.diagnostics.iter().next().unwrap();
    assert_eq!(d.target, DiagTarget::Terminal(doc.terminal("insert.in2").unwrap()));
    assert_eq!(d.message, "type conflict: found `bool`, expected `i32`");
}

#[test]
fn assigned_value_must_match_target() {
    let (doc, state) = run(
        r#"{
            "nodes": [
                {"name": "target", "kind": "constant", "type": "i32"},
                {"name": "value", "kind": "constant", "type": "bool"},
                {"name": "assign", "kind": "assign"}
            ],
            "wires": [
                {"from": "target.out0", "to": ["assign.in0"], "mutable": true},
                {"from": "value.out0", "to": ["assign.in1"]}
            ]
        }"#,
    );
    assert_eq!(codes(&state), vec!["E0200"]);
    let d = state.diagnostics.iter().next().unwrap();
    assert_eq!(d.target, DiagTarget::Terminal(doc.terminal("assign.in1").unwrap()));
}

#[test]
fn pure_operands_must_have_the_operator_type() {
    let (doc, state) = run(
        r#"{
            "nodes": [
                {"name": "a", "kind": "constant", "type": "i32"},
                {"name": "b", "kind": "constant", "type": "bool"},
                {"name": "sum", "kind": "pure_binary", "op": "add"}
            ],
            "wires": [
                {"from": "a.out0", "to": ["sum.in0"]},
                {"from": "b.out0", "to": ["sum.in1"]}
            ]
        }"#,
    );
    assert_eq!(codes(&state), vec!["E0200"]);
    let d = state.diagnostics.iter().next().unwrap();
    assert_eq!(d.target, DiagTarget::Terminal(doc.terminal("sum.in1").unwrap()));
}

#[test]
fn references_cannot_be_dropped() {
    let (_, state) = run(
        r#"{
            "nodes": [
                {"name": "c", "kind": "constant", "type": "i32"},
                {"name": "r", "kind": "explicit_borrow", "mode": "owner_to_immutable"},
                {"name": "d", "kind": "drop"}
            ],
            "wires": [
                {"from": "c.out0", "to": ["r.in0"]},
                {"from": "r.out0", "to": ["d.in0"]}
            ]
        }"#,
    );
    assert_eq!(codes(&state), vec!["E0202"]);
}

// ── Features ────────────────────────────────────────────────────────────────

#[test]
fn disabled_vectors_are_reported_per_node() {
    let options = AnalysisOptions {
        features: FeatureToggles {
            vectors: false,
            ..FeatureToggles::default()
        },
        ..AnalysisOptions::default()
    };
    let (_, state) = run_with(include_str!("fixtures/vectors.json"), &options);
    assert_eq!(codes(&state), vec!["E0400", "E0400"]);
    assert!(state
        .diagnostics
        .iter()
        .all(|d| d.level == DiagLevel::Error && d.message == "feature `vectors` is not enabled"));

    let (_, state) = run(include_str!("fixtures/vectors.json"));
    assert!(state.diagnostics.is_empty(), "{:?}", codes(&state));
}

#[test]
fn disabled_output_node_is_reported() {
    let json = r#"{
        "nodes": [
            {"name": "c", "kind": "constant", "type": "i32"},
            {"name": "out", "kind": "output"}
        ],
        "wires": [{"from": "c.out0", "to": ["out.in0"]}]
    }"#;
    let options = AnalysisOptions::from_json(r#"{"features": {"output_node": false}}"#).unwrap();
    let (doc, state) = run_with(json, &options);
    assert_eq!(codes(&state), vec!["E0400"]);
    let d = state.diagnostics.iter().next().unwrap();
    assert_eq!(d.target, DiagTarget::Node(doc.node("out").unwrap()));

    let (_, state) = run(json);
    assert!(state.diagnostics.is_empty(), "{:?}", codes(&state));
}

#[test]
fn diagnostics_do_not_stop_the_pipeline() {
    let (_, state) = run(include_str!("fixtures/increment_immutable.json"));
    assert!(state.has_error);
    assert_eq!(state.completed.len(), 6);
}
