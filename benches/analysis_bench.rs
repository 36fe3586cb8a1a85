use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use lifewire::*;
use serde_json::json;

// Benchmark scenarios, generated as graph documents so every run measures
// document loading and analysis over identical input.

/// `n` in-place increments of one value: one borrow and one terminate each.
fn increment_chain(n: usize) -> String {
    let mut nodes = vec![r#"{"name": "c", "kind": "constant", "type": "i32"}"#.to_string()];
    let mut wires = Vec::new();
    let mut previous = "c.out0".to_string();
    for i in 0..n {
        nodes.push(format!(
            r#"{{"name": "inc{i}", "kind": "mutating_unary", "op": "increment"}}"#
        ));
        let mutable = i == 0;
        wires.push(format!(
            r#"{{"from": "{previous}", "to": ["inc{i}.in0"], "mutable": {mutable}}}"#
        ));
        previous = format!("inc{i}.out0");
    }
    format!(
        r#"{{"nodes": [{}], "wires": [{}]}}"#,
        nodes.join(", "),
        wires.join(", ")
    )
}

/// `n` independent sums of two constants.
fn wide_sums(n: usize) -> String {
    let mut nodes = Vec::new();
    let mut wires = Vec::new();
    for i in 0..n {
        nodes.push(format!(r#"{{"name": "a{i}", "kind": "constant", "type": "i32"}}"#));
        nodes.push(format!(r#"{{"name": "b{i}", "kind": "constant", "type": "i32"}}"#));
        nodes.push(format!(r#"{{"name": "sum{i}", "kind": "pure_binary", "op": "add"}}"#));
        wires.push(format!(r#"{{"from": "a{i}.out0", "to": ["sum{i}.in0"]}}"#));
        wires.push(format!(r#"{{"from": "b{i}.out0", "to": ["sum{i}.in1"]}}"#));
    }
    format!(
        r#"{{"nodes": [{}], "wires": [{}]}}"#,
        nodes.join(", "),
        wires.join(", ")
    )
}

/// `n` frames nested one inside the next, each borrowing the value in.
fn nested_frames(n: usize) -> String {
    let mut body = json!({
        "nodes": [{"name": "inc", "kind": "mutating_unary", "op": "increment"}],
        "wires": [{"from": "b0.out0", "to": ["inc.in0"]}]
    });
    for depth in 0..n {
        let frame = json!({
            "name": format!("f{depth}"),
            "kind": "frame",
            "border": [{"name": format!("b{depth}"), "kind": "borrow_tunnel", "mutable": true}],
            "nodes": body.get("nodes").cloned().unwrap_or_else(|| json!([])),
            "structures": body.get("structures").cloned().unwrap_or_else(|| json!([])),
            "wires": body.get("wires").cloned().unwrap_or_else(|| json!([]))
        });
        let feed = if depth + 1 < n {
            json!({"from": format!("b{}.out0", depth + 1), "to": [format!("b{depth}.in0")]})
        } else {
            json!({"from": "c.out0", "to": [format!("b{depth}.in0")], "mutable": true})
        };
        body = json!({"structures": [frame], "wires": [feed]});
    }
    body["nodes"] = json!([{"name": "c", "kind": "constant", "type": "i32"}]);
    body.to_string()
}

fn scenarios() -> [(&'static str, String); 3] {
    [
        ("chain16", increment_chain(16)),
        ("wide16", wide_sums(16)),
        ("nested4", nested_frames(4)),
    ]
}

// Type expression parser latency.
fn bench_type_parse_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("kpi/type_parse_latency");
    for source in ["i32", "&mut Vec<i32>", "Option<LockingCell<Iterator<&bool>>>"] {
        group.bench_with_input(BenchmarkId::from_parameter(source), source, |b, source| {
            b.iter(|| black_box(parser::parse_type(black_box(source))));
        });
    }
    group.finish();
}

// Full analysis latency (load -> all six passes).
fn bench_full_analysis_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("kpi/full_analysis_latency");
    let options = options::AnalysisOptions::default();
    for (name, json) in scenarios() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &json, |b, json| {
            b.iter(|| {
                let doc = document::from_json(black_box(json)).expect("scenario must load");
                let state = pipeline::analyze(doc.graph, &options).expect("scenario must analyze");
                black_box(state.diagnostics.len());
            });
        });
    }
    group.finish();
}

// Per-pass latency on the chain scenario; setup runs the passes before it.
fn bench_pass_latency(c: &mut Criterion) {
    let json = increment_chain(16);
    let options = options::AnalysisOptions::default();
    let mut group = c.benchmark_group("kpi/pass_latency");
    for id in pass::ALL_PASSES {
        let name = pass::descriptor(id).name;
        let previous = pass::ALL_PASSES
            .iter()
            .position(|&p| p == id)
            .and_then(|i| i.checked_sub(1))
            .map(|i| pass::ALL_PASSES[i]);
        group.bench_function(name, |b| {
            b.iter_batched(
                || {
                    let doc = document::from_json(&json).expect("scenario must load");
                    let mut state = pipeline::CompilationState::new(doc.graph);
                    if let Some(p) = previous {
                        pipeline::run_pipeline(
                            &mut state,
                            p,
                            &options,
                            &visit::CancellationToken::new(),
                            false,
                            |_, _| {},
                        )
                        .expect("setup passes must succeed");
                    }
                    state
                },
                |mut state| {
                    let token = visit::CancellationToken::new();
                    let g = &mut state.graph;
                    let r = match id {
                        pass::PassId::CreateFacades => create_facades::create_facades(g, &token),
                        pass::PassId::DetermineVariables => {
                            determine_variables::determine_variables(g, &token)
                        }
                        pass::PassId::AutoBorrow => auto_borrow::auto_borrow(g, &token),
                        pass::PassId::SetTypes => set_types::set_types(g, &token),
                        pass::PassId::Validate => {
                            validate::validate(g, options.features, &token).map(|_| ())
                        }
                        pass::PassId::ExplicitBorrow => {
                            explicit_borrow::explicit_borrow(g, &token).map(|_| ())
                        }
                    };
                    black_box(r.is_ok());
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

// Analysis scaling vs chain length.
fn bench_chain_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("kpi/chain_scaling");
    let options = options::AnalysisOptions::default();
    for n in [1_usize, 8, 32, 128, 512] {
        let json = increment_chain(n);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}nodes", n)),
            &json,
            |b, json| {
                b.iter_batched(
                    || document::from_json(json).expect("scenario must load").graph,
                    |graph| black_box(pipeline::analyze(graph, &options).is_ok()),
                    BatchSize::SmallInput,
                );
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_type_parse_latency,
    bench_full_analysis_latency,
    bench_pass_latency,
    bench_chain_scaling,
);
criterion_main!(benches);
