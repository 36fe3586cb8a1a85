// dot.rs — Graphviz DOT output for analyzed graphs
//
// Renders every diagram of a Graph: plain nodes as boxes, each structure as
// a cluster holding its border nodes and nested diagram, and each wire as
// edges from the producing node to every consumer, labelled with the type of
// the variable it carries once types are known.
//
// Preconditions: none; unanalyzed graphs render without edge labels.
// Postconditions: returns a valid DOT string.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::fmt::{self, Write};

use crate::graph::{DiagramItem, Graph, NodeKind, TerminalOwner};
use crate::id::{DiagramId, NodeId, TerminalId, WireId};

/// Emit the graph as a Graphviz DOT string.
pub fn emit_dot(graph: &Graph) -> String {
    let mut buf = String::new();
    // Writing into a String cannot fail.
    let _ = write_dot(&mut buf, graph);
    buf
}

fn write_dot(buf: &mut String, graph: &Graph) -> fmt::Result {
    writeln!(buf, "digraph lifewire {{")?;
    writeln!(buf, "    rankdir=LR;")?;
    writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10];")?;
    writeln!(buf, "    edge [fontname=\"Helvetica\", fontsize=9];")?;
    write_diagram(buf, graph, graph.root(), "    ")?;
    writeln!(buf, "}}")
}

fn write_diagram(buf: &mut String, graph: &Graph, diagram: DiagramId, indent: &str) -> fmt::Result {
    for &item in &graph.diagram(diagram).items {
        match item {
            DiagramItem::Node(n) => writeln!(buf, "{indent}n{} [{}];", n.0, node_attrs(graph, n))?,
            DiagramItem::Wire(w) => write_wire(buf, graph, w, indent)?,
            DiagramItem::Structure(s) => {
                let st = graph.structure(s);
                let deeper = format!("{indent}    ");
                writeln!(buf)?;
                writeln!(buf, "{indent}subgraph cluster_s{} {{", s.0)?;
                writeln!(buf, "{deeper}label=\"{s} {:?}\";", st.kind)?;
                writeln!(buf, "{deeper}style=rounded;")?;
                writeln!(buf, "{deeper}color=gray50;")?;
                for &n in &st.border_nodes {
                    writeln!(buf, "{deeper}n{} [{}];", n.0, node_attrs(graph, n))?;
                }
                write_diagram(buf, graph, st.inner, &deeper)?;
                writeln!(buf, "{indent}}}")?;
            }
        }
    }
    Ok(())
}

fn write_wire(buf: &mut String, graph: &Graph, wire: WireId, indent: &str) -> fmt::Result {
    let w = graph.wire(wire);
    let Some(src) = owning_node(graph, graph.connected(w.source)) else {
        return Ok(());
    };
    let mut attrs = Vec::new();
    if let Some(label) = wire_label(graph, w.source) {
        attrs.push(format!("label=\"{}\"", escape(&label)));
    }
    if w.begins_mutable_variable {
        attrs.push("style=bold".to_string());
    }
    let attrs = if attrs.is_empty() {
        String::new()
    } else {
        format!(" [{}]", attrs.join(", "))
    };
    for &sink in &w.sinks {
        if let Some(tgt) = owning_node(graph, graph.connected(sink)) {
            writeln!(buf, "{indent}n{} -> n{}{attrs};", src.0, tgt.0)?;
        }
    }
    Ok(())
}

fn owning_node(graph: &Graph, t: Option<TerminalId>) -> Option<NodeId> {
    match graph.terminal(t?).owner {
        TerminalOwner::Node(n) => Some(n),
        TerminalOwner::Wire(_) => None,
    }
}

/// The carried variable's type, once set_types has fixed it.
fn wire_label(graph: &Graph, t: TerminalId) -> Option<String> {
    let v = graph.facade_variable(t)?;
    if !graph.variables.has_set(v.diagram) {
        return None;
    }
    let var = graph.variables.get(v);
    var.fixed.then(|| var.ty.to_string())
}

fn node_attrs(graph: &Graph, node: NodeId) -> String {
    let kind = &graph.node(node).kind;
    let (shape, color) = match kind {
        k if k.is_border() => ("box", "gray85"),
        NodeKind::Constant { .. } => ("ellipse", "lightyellow"),
        NodeKind::ExplicitBorrow { auto: true, .. } | NodeKind::TerminateLifetime(_) => {
            ("diamond", "lightsalmon")
        }
        NodeKind::ExplicitBorrow { .. } | NodeKind::ExplicitUnborrow { .. } => {
            ("diamond", "lightgreen")
        }
        _ => ("box", "lightblue"),
    };
    format!(
        "shape={shape}, style=filled, fillcolor={color}, label=\"{node} {}\"",
        escape(&kind.to_string())
    )
}

fn escape(s: &str) -> String {
    s.replace('"', "\\\"")
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::from_json;
    use crate::options::AnalysisOptions;
    use crate::pipeline::analyze;

    const FRAME: &str = r#"{
        "nodes": [{"name": "c", "kind": "constant", "type": "i32"}],
        "structures": [{
            "name": "f", "kind": "frame",
            "border": [{"name": "t", "kind": "tunnel"}],
            "nodes": [{"name": "d", "kind": "drop"}],
            "wires": [{"from": "t.out0", "to": ["d.in0"]}]
        }],
        "wires": [{"from": "c.out0", "to": ["t.in0"], "mutable": true}]
    }"#;

    #[test]
    fn valid_dot_structure() {
        let doc = from_json(FRAME).unwrap();
        let dot = emit_dot(&doc.graph);
        assert!(dot.starts_with("digraph lifewire {"));
        assert!(dot.trim_end().ends_with('}'));
        assert_eq!(dot.matches('{').count(), dot.matches('}').count());
    }

    #[test]
    fn structures_become_clusters() {
        let doc = from_json(FRAME).unwrap();
        let dot = emit_dot(&doc.graph);
        assert!(dot.contains("subgraph cluster_s0 {"));
        assert!(dot.contains("label=\"s0 Frame\""));
        let t = doc.node("t").unwrap();
        let d = doc.node("d").unwrap();
        assert!(dot.contains(&format!("n{} -> n{};", t.0, d.0)));
    }

    #[test]
    fn analyzed_wires_carry_types() {
        let doc = from_json(FRAME).unwrap();
        let state = analyze(doc.graph, &AnalysisOptions::default()).unwrap();
        let dot = emit_dot(&state.graph);
        assert!(dot.contains("[label=\"i32\", style=bold];"), "{dot}");
    }

    #[test]
    fn deterministic_output() {
        let a = emit_dot(&from_json(FRAME).unwrap().graph);
        let b = emit_dot(&from_json(FRAME).unwrap().graph);
        assert_eq!(a, b);
    }
}
