// explicit_borrow.rs — Explicit-borrow normalizer
//
// Makes every implicit drop in permission explicit. For each passthrough
// pair whose input is wired with something more permissive than the input
// declares (owner > `&mut` > `&`), an explicit borrow is spliced in front of
// the input and the matching explicit unborrow behind the paired output.
//
// Only the top-level diagram is normalized. Structures are skipped with a
// `W0600` warning each.
//
// Preconditions: `set_types` has run.
// Postconditions: no passthrough input on the top-level diagram is wired
//                 with more permission than it declares.
// Failure modes: cancellation.
// Side effects: adds nodes, wires, variables and lifetimes.

use crate::diag::{codes, DiagTarget, Diagnostic, Diagnostics};
use crate::graph::{DiagramItem, Graph, NodeKind};
use crate::id::{NodeId, TerminalId, WireId};
use crate::types::{BorrowMode, Permissiveness, Type};
use crate::variable::VariableRef;
use crate::visit::{AnalysisError, CancellationToken};

/// Normalize the top-level diagram.
pub fn explicit_borrow(
    graph: &mut Graph,
    cancel: &CancellationToken,
) -> Result<Diagnostics, AnalysisError> {
    let mut diagnostics = Diagnostics::new();
    let mut inserted = 0;
    let root = graph.root();
    for item in graph.dataflow_order(root) {
        match item {
            DiagramItem::Node(node) => {
                cancel.check()?;
                inserted += normalize_node(graph, node);
            }
            DiagramItem::Structure(s) => diagnostics.push(
                Diagnostic::warning(
                    DiagTarget::Structure(s),
                    codes::EXPLICIT_BORROW_STRUCTURE_UNSUPPORTED,
                    "explicit borrows are not normalized inside structures",
                )
                .with_hint("the structure is left as the resolver produced it"),
            ),
            DiagramItem::Wire(_) => {}
        }
    }
    log::debug!(
        "explicit_borrow: {inserted} borrow/unborrow pairs inserted, {} structures skipped",
        diagnostics.len()
    );
    Ok(diagnostics)
}

/// What the value on a variable may be used for.
fn permissiveness_of(graph: &Graph, v: VariableRef) -> Permissiveness {
    let var = graph.variables.get(v);
    match var.ty.permissiveness() {
        Permissiveness::Owner if var.mutable => Permissiveness::MutableOwner,
        p => p,
    }
}

fn normalize_node(graph: &mut Graph, node: NodeId) -> usize {
    let (pairs, inputs, outputs) = {
        let n = graph.node(node);
        (n.kind.passthrough_pairs(), n.inputs.clone(), n.outputs.clone())
    };
    let mut inserted = 0;
    for &(i, o) in pairs {
        let (Some(&input), Some(&output)) = (inputs.get(i), outputs.get(o)) else {
            continue;
        };
        let Some(wired) = graph.connected_variable(input) else {
            continue;
        };
        let wired_permission = permissiveness_of(graph, wired);
        let declared = graph.terminal(input).declared.permissiveness();
        if wired_permission <= declared {
            continue;
        }
        if let Some(mode) = BorrowMode::between(wired_permission, declared) {
            splice(graph, node, input, output, wired, mode);
            inserted += 1;
        }
    }
    inserted
}

fn splice(
    graph: &mut Graph,
    node: NodeId,
    input: TerminalId,
    output: TerminalId,
    wired: VariableRef,
    mode: BorrowMode,
) {
    let diagram = graph.node(node).diagram;

    // Borrow in front of the input.
    let borrow = graph.add_node(diagram, NodeKind::ExplicitBorrow { mode, auto: false });
    let (b_in, b_out) = (graph.node(borrow).inputs[0], graph.node(borrow).outputs[0]);
    if let Some(upstream) = graph.connected(input) {
        graph.connect(upstream, b_in);
    }
    graph.terminal_mut(b_in).facade.set_variable(Some(wired));

    let reference = graph.variables.create(diagram, false, Some(b_out));
    let lifetime = graph
        .variables
        .set_mut(diagram)
        .define_lifetime_bounded_by_diagram(&[wired]);
    let underlying = graph.variables.get(wired).ty.underlying().clone();
    graph.variables.set_type_and_lifetime(
        reference,
        Type::reference(underlying, mode.is_mutable()),
        lifetime,
    );
    if let Some(previous) = graph.true_variable(input) {
        if !graph.variables.same(previous, wired) {
            graph.variables.merge(previous, reference);
        }
    }
    graph.terminal_mut(b_out).facade.set_variable(Some(reference));
    let wire = graph.wire_together(b_out, &[input]);
    set_wire_variable(graph, wire, Some(reference));
    graph.terminal_mut(input).facade.rebind_after_splice(reference);

    // Unborrow behind the paired output hands the original value back.
    let unborrow = graph.add_node(diagram, NodeKind::ExplicitUnborrow { mode });
    let (u_in, u_out) = (graph.node(unborrow).inputs[0], graph.node(unborrow).outputs[0]);
    let handed_back = graph.facade_variable(output).unwrap_or(wired);
    if let Some(downstream) = graph.connected(output) {
        graph.connect(downstream, u_out);
    }
    graph.terminal_mut(u_out).facade.set_variable(Some(handed_back));
    let wire = graph.wire_together(output, &[u_in]);
    set_wire_variable(graph, wire, Some(reference));
    graph.terminal_mut(u_in).facade.set_variable(Some(reference));
    graph.terminal_mut(output).facade.rebind_after_splice(reference);

    log::trace!(
        "explicit_borrow: {} around {node} ({borrow}, {unborrow})",
        mode.name()
    );
}

fn set_wire_variable(graph: &mut Graph, wire: WireId, variable: Option<VariableRef>) {
    let terminals: Vec<TerminalId> = {
        let w = graph.wire(wire);
        std::iter::once(w.source).chain(w.sinks.iter().copied()).collect()
    };
    for t in terminals {
        graph.terminal_mut(t).facade.set_variable(variable);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auto_borrow::auto_borrow;
    use crate::create_facades::create_facades;
    use crate::determine_variables::determine_variables;
    use crate::graph::{BinaryOp, StructureKind, UnaryOp};
    use crate::set_types::set_types;

    /// Types the graph without resolving borrows, so owners reach
    /// passthrough inputs directly.
    fn typed_unresolved(g: &mut Graph) {
        let token = CancellationToken::new();
        create_facades(g, &token).unwrap();
        determine_variables(g, &token).unwrap();
        set_types(g, &token).unwrap();
    }

    fn resolved(g: &mut Graph) {
        let token = CancellationToken::new();
        create_facades(g, &token).unwrap();
        determine_variables(g, &token).unwrap();
        auto_borrow(g, &token).unwrap();
        set_types(g, &token).unwrap();
    }

    fn kinds(g: &Graph) -> Vec<String> {
        g.nodes().iter().map(|n| n.kind.to_string()).collect()
    }

    #[test]
    fn owner_into_mutable_passthrough_is_bracketed() {
        let mut g = Graph::new();
        let root = g.root();
        let c = g.add_node(root, NodeKind::Constant { ty: Type::Int32 });
        let inc = g.add_node(root, NodeKind::MutatingUnaryPrimitive { op: UnaryOp::Increment });
        let d = g.add_node(root, NodeKind::Drop);
        g.wire_together(g.node(c).outputs[0], &[g.node(inc).inputs[0]]);
        g.wire_together(g.node(inc).outputs[0], &[g.node(d).inputs[0]]);
        typed_unresolved(&mut g);
        let diags = explicit_borrow(&mut g, &CancellationToken::new()).unwrap();
        assert!(diags.is_empty());
        assert_eq!(
            kinds(&g)[3..],
            [
                "explicit_borrow(owner_to_mutable)".to_string(),
                "explicit_unborrow(owner_to_mutable)".to_string()
            ]
        );

        let borrow = g.node(NodeId(3));
        let unborrow = g.node(NodeId(4));
        // The original wire now ends at the borrow; the drop hangs off the unborrow.
        let original = g.attached_wire(borrow.inputs[0]).unwrap();
        assert_eq!(Some(original), g.attached_wire(g.node(c).outputs[0]));
        let tail = g.attached_wire(unborrow.outputs[0]).unwrap();
        assert_eq!(Some(tail), g.attached_wire(g.node(d).inputs[0]));

        let input = g.node(inc).inputs[0];
        let reference = g.variables.get(g.facade_variable(input).unwrap());
        assert_eq!(reference.ty, Type::mutable_reference(Type::Int32));
        assert!(reference.lifetime.is_bounded());
        let owner = g.facade_variable(g.node(c).outputs[0]).unwrap();
        assert!(g.variables.same(g.facade_variable(unborrow.outputs[0]).unwrap(), owner));
    }

    #[test]
    fn mutable_reference_into_immutable_input_is_downgraded() {
        let mut g = Graph::new();
        let root = g.root();
        let c = g.add_node(root, NodeKind::Constant { ty: Type::Int32 });
        let b = g.add_node(
            root,
            NodeKind::ExplicitBorrow {
                mode: BorrowMode::OwnerToMutable,
                auto: false,
            },
        );
        let p = g.add_node(root, NodeKind::ImmutablePassthrough);
        let w = g.wire_together(g.node(c).outputs[0], &[g.node(b).inputs[0]]);
        g.set_wire_begins_mutable(w, true);
        g.wire_together(g.node(b).outputs[0], &[g.node(p).inputs[0]]);
        typed_unresolved(&mut g);
        explicit_borrow(&mut g, &CancellationToken::new()).unwrap();
        assert!(kinds(&g).contains(&"explicit_borrow(mutable_to_immutable)".to_string()));
        assert!(kinds(&g).contains(&"explicit_unborrow(mutable_to_immutable)".to_string()));
    }

    #[test]
    fn resolved_graph_needs_no_normalization() {
        let mut g = Graph::new();
        let root = g.root();
        let a = g.add_node(root, NodeKind::Constant { ty: Type::Int32 });
        let b = g.add_node(root, NodeKind::Constant { ty: Type::Int32 });
        let op = g.add_node(root, NodeKind::MutatingBinaryPrimitive { op: BinaryOp::Add });
        let wa = g.wire_together(g.node(a).outputs[0], &[g.node(op).inputs[0]]);
        g.set_wire_begins_mutable(wa, true);
        g.wire_together(g.node(b).outputs[0], &[g.node(op).inputs[1]]);
        resolved(&mut g);
        let before = g.nodes().len();
        explicit_borrow(&mut g, &CancellationToken::new()).unwrap();
        assert_eq!(g.nodes().len(), before);
    }

    #[test]
    fn structures_are_skipped_with_a_warning() {
        let mut g = Graph::new();
        let root = g.root();
        let s = g.add_structure(root, StructureKind::Loop);
        let inner = g.structure(s).inner;
        let c = g.add_node(inner, NodeKind::Constant { ty: Type::Int32 });
        let p = g.add_node(inner, NodeKind::ImmutablePassthrough);
        g.wire_together(g.node(c).outputs[0], &[g.node(p).inputs[0]]);
        typed_unresolved(&mut g);
        let before = g.nodes().len();
        let diags = explicit_borrow(&mut g, &CancellationToken::new()).unwrap();
        assert_eq!(g.nodes().len(), before);
        assert_eq!(diags.len(), 1);
        let d = diags.iter().next().unwrap();
        assert_eq!(d.code, Some(codes::EXPLICIT_BORROW_STRUCTURE_UNSUPPORTED));
        assert!(!d.is_error());
    }
}
