// Property-based tests for analysis invariants.
//
// Three categories:
// 1. Type printer → parser roundtrip over generated type expressions
// 2. Fork rule: a forked wire is rejected exactly when its type cannot fork
// 3. Terminate-lifetime arity: the node always grows to the lifetime's size
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use lifewire::diag::DiagCode;
use lifewire::document::from_json;
use lifewire::graph::{NodeKind, TerminateLifetimeError};
use lifewire::options::AnalysisOptions;
use lifewire::parser::parse_type;
use lifewire::pipeline::{analyze, CompilationState};
use lifewire::types::Type;
use proptest::prelude::*;

// ── Test helpers ────────────────────────────────────────────────────────────

fn analyze_json(json: &str) -> (lifewire::document::LoadedDocument, CompilationState) {
    let mut doc = from_json(json).unwrap_or_else(|e| panic!("bad document: {e}\n{json}"));
    let graph = std::mem::take(&mut doc.graph);
    let state = analyze(graph, &AnalysisOptions::default())
        .unwrap_or_else(|e| panic!("pipeline failed: {e}"));
    (doc, state)
}

fn codes(state: &CompilationState) -> Vec<&'static str> {
    state
        .diagnostics
        .iter()
        .filter_map(|d| d.code.map(|DiagCode(c)| c))
        .collect()
}

// ── Type generator ──────────────────────────────────────────────────────────

fn arb_type() -> impl Strategy<Value = Type> {
    let leaf = prop_oneof![Just(Type::Void), Just(Type::Boolean), Just(Type::Int32)];
    leaf.prop_recursive(4, 16, 1, |inner| {
        prop_oneof![
            inner.clone().prop_map(Type::immutable_reference),
            inner.clone().prop_map(Type::mutable_reference),
            inner.clone().prop_map(Type::option),
            inner.clone().prop_map(Type::locking_cell),
            inner.clone().prop_map(Type::non_locking_cell),
            inner.clone().prop_map(Type::iterator),
            inner.prop_map(Type::vector),
        ]
    })
}

/// Types a constant can produce and a drop can take.
fn arb_owned_type() -> impl Strategy<Value = Type> {
    arb_type().prop_filter("drop rejects references", |t| !t.is_reference())
}

// ── 1. Type roundtrip ───────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        max_shrink_iters: 200,
        .. ProptestConfig::default()
    })]

    #[test]
    fn printed_types_parse_back(ty in arb_type()) {
        let printed = ty.to_string();
        let parsed = parse_type(&printed);
        prop_assert_eq!(parsed, Ok(ty), "printed as {}", printed);
    }
}

// ── 2. Fork rule ────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        max_shrink_iters: 100,
        .. ProptestConfig::default()
    })]

    #[test]
    fn forks_are_rejected_exactly_for_unforkable_types(
        ty in arb_owned_type(),
        sinks in 1usize..=4,
    ) {
        let mut nodes = vec![format!(
            r#"{{"name": "c", "kind": "constant", "type": "{ty}"}}"#
        )];
        let mut targets = Vec::new();
        for i in 0..sinks {
            nodes.push(format!(r#"{{"name": "d{i}", "kind": "drop"}}"#));
            targets.push(format!(r#""d{i}.in0""#));
        }
        let json = format!(
            r#"{{"nodes": [{}], "wires": [{{"from": "c.out0", "to": [{}]}}]}}"#,
            nodes.join(", "),
            targets.join(", ")
        );
        let (_, state) = analyze_json(&json);

        let expected: Vec<&str> = if sinks >= 2 && !ty.may_fork() {
            vec!["E0102"]
        } else {
            vec![]
        };
        prop_assert_eq!(codes(&state), expected);
    }
}

// ── 3. Terminate-lifetime arity ─────────────────────────────────────────────

/// `n` constants borrowed together; the first `k` references wired into a
/// terminate-lifetime node declared with `k` inputs and one output.
fn borrow_then_terminate(n: usize, k: usize) -> String {
    let mut nodes = Vec::new();
    let mut wires = Vec::new();
    for i in 0..n {
        nodes.push(format!(r#"{{"name": "c{i}", "kind": "constant", "type": "i32"}}"#));
        wires.push(format!(r#"{{"from": "c{i}.out0", "to": ["refs.in{i}"]}}"#));
    }
    nodes.push(format!(
        r#"{{"name": "refs", "kind": "explicit_borrow", "mode": "owner_to_immutable", "inputs": {n}}}"#
    ));
    nodes.push(format!(
        r#"{{"name": "end", "kind": "terminate_lifetime", "inputs": {k}, "outputs": 1}}"#
    ));
    for i in 0..k {
        wires.push(format!(r#"{{"from": "refs.out{i}", "to": ["end.in{i}"]}}"#));
    }
    format!(
        r#"{{"nodes": [{}], "wires": [{}]}}"#,
        nodes.join(", "),
        wires.join(", ")
    )
}

fn arb_arity() -> impl Strategy<Value = (usize, usize)> {
    (1usize..=4).prop_flat_map(|n| (Just(n), 1..=n))
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        max_shrink_iters: 50,
        .. ProptestConfig::default()
    })]

    #[test]
    fn terminate_lifetime_grows_to_the_lifetime((n, k) in arb_arity()) {
        let (doc, state) = analyze_json(&borrow_then_terminate(n, k));
        let end = state.graph.node(doc.node("end").unwrap());
        let NodeKind::TerminateLifetime(s) = end.kind else {
            panic!("end is not a terminate-lifetime node");
        };

        prop_assert_eq!(s.required_inputs, Some(n));
        prop_assert_eq!(s.required_outputs, Some(n));
        prop_assert_eq!(end.inputs.len(), n);
        prop_assert_eq!(end.outputs.len(), n);

        let mut found = codes(&state);
        found.sort_unstable();
        if k < n {
            prop_assert_eq!(s.error, TerminateLifetimeError::NotAllVariablesInLifetimeConnected);
            let mut expected = vec!["E0100"; n - k];
            expected.push("E0302");
            prop_assert_eq!(found, expected);
        } else {
            prop_assert_eq!(s.error, TerminateLifetimeError::NoError);
            prop_assert!(found.is_empty(), "{:?}", found);
        }
    }
}
