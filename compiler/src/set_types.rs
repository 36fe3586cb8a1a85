// set_types.rs — Type and lifetime propagation
//
// Assigns a type and a lifetime to every variable a node produces, keyed by
// node kind. Variables that already carry a type are left alone, which makes
// the rules safe to apply twice: `auto_borrow` applies them node by node while
// it sweeps (its borrow decisions need upstream types), and this pass applies
// them again over the final topology to cover the nodes that sweep spliced in.
//
// Preconditions: `determine_variables` has run.
// Postconditions: every variable reachable from a connected output is fixed;
//                 every terminate-lifetime node records its state and has the
//                 arity its lifetime requires.
// Failure modes: cancellation. Unresolvable terminate-lifetime wiring is
//                recorded on the node, never raised.
// Side effects: resizes terminate-lifetime nodes to exactly their lifetime's
//               size, disconnecting inputs past it; merges their outputs into
//               the variables their lifetime interrupted.

use crate::auto_borrow::{classify, InputState};
use crate::facade::InputReferenceMutability;
use crate::graph::{
    Direction, Graph, NodeKind, TerminateLifetimeError, TerminateLifetimeState,
};
use crate::id::{DiagramId, NodeId, WireId};
use crate::types::{BorrowMode, Type};
use crate::variable::{Lifetime, VariableRef};
use crate::visit::{walk, AnalysisError, CancellationToken, GraphVisitor};

// ── Public entry point ──────────────────────────────────────────────────────

/// Run the propagator over the whole graph.
pub fn set_types(graph: &mut Graph, cancel: &CancellationToken) -> Result<(), AnalysisError> {
    let mut ctx = TypeCtx::default();
    walk(graph, &mut ctx, cancel)?;
    let unfixed = graph
        .variables
        .sets()
        .iter()
        .flat_map(|s| s.variables())
        .filter(|(_, v)| !v.fixed)
        .count();
    log::debug!(
        "set_types: {} nodes visited, {} variables left without a type",
        ctx.nodes,
        unfixed
    );
    Ok(())
}

#[derive(Default)]
struct TypeCtx {
    nodes: usize,
}

impl GraphVisitor for TypeCtx {
    fn visit_node(&mut self, graph: &mut Graph, node: NodeId) -> Result<(), AnalysisError> {
        self.nodes += 1;
        propagate_node(graph, node);
        Ok(())
    }

    fn visit_wire(&mut self, graph: &mut Graph, wire: WireId) -> Result<(), AnalysisError> {
        propagate_wire(graph, wire);
        Ok(())
    }
}

// ── Variable helpers ────────────────────────────────────────────────────────

fn input_var(graph: &Graph, node: NodeId, index: usize) -> Option<VariableRef> {
    graph
        .node(node)
        .inputs
        .get(index)
        .and_then(|&t| graph.true_variable(t))
}

fn output_var(graph: &Graph, node: NodeId, index: usize) -> Option<VariableRef> {
    graph
        .node(node)
        .outputs
        .get(index)
        .and_then(|&t| graph.true_variable(t))
}

pub(crate) fn state_of(graph: &Graph, v: VariableRef) -> InputState {
    let var = graph.variables.get(v);
    InputState {
        ty: var.ty.clone(),
        lifetime: var.lifetime,
        mutable: var.mutable,
    }
}

fn input_state(graph: &Graph, node: NodeId, index: usize) -> Option<InputState> {
    input_var(graph, node, index).map(|v| state_of(graph, v))
}

fn assign(graph: &mut Graph, v: Option<VariableRef>, ty: Type, lifetime: Lifetime) {
    if let Some(v) = v {
        if !graph.variables.is_fixed(v) {
            graph.variables.set_type_and_lifetime(v, ty, lifetime);
        }
    }
}

fn assign_output(graph: &mut Graph, node: NodeId, index: usize, ty: Type, lifetime: Lifetime) {
    let v = output_var(graph, node, index);
    assign(graph, v, ty, lifetime);
}

fn outputs_fixed(graph: &Graph, node: NodeId) -> bool {
    graph
        .node(node)
        .outputs
        .iter()
        .filter_map(|&t| graph.true_variable(t))
        .all(|v| graph.variables.is_fixed(v))
}

/// The diagrams on each side of a border node: (source side, target side).
fn border_sides(graph: &Graph, node: NodeId) -> Option<(DiagramId, DiagramId, Direction)> {
    let border = graph.node(node).border?;
    let s = graph.structure(border.structure);
    Some(match border.direction {
        Direction::Input => (s.diagram, s.inner, Direction::Input),
        Direction::Output => (s.inner, s.diagram, Direction::Output),
    })
}

/// A bounded lifetime entering `inner` from outside becomes one that outlasts
/// `inner`; owned and static lifetimes cross unchanged.
fn lifetime_entering(graph: &mut Graph, inner: DiagramId, lifetime: Lifetime) -> Lifetime {
    match lifetime {
        Lifetime::Bounded(_) => graph
            .variables
            .set_mut(inner)
            .define_lifetime_that_outlasts_diagram(Some(lifetime)),
        other => other,
    }
}

/// A lifetime leaving `inner` maps back to the lifetime it entered with; any
/// other bounded lifetime ends with the structure.
fn lifetime_leaving(graph: &Graph, inner: DiagramId, lifetime: Lifetime) -> Lifetime {
    match lifetime {
        Lifetime::Bounded(b) if b.diagram == inner && b.outlasts_diagram => graph
            .variables
            .set(inner)
            .origin_of(lifetime)
            .unwrap_or(Lifetime::Empty),
        Lifetime::Bounded(_) => Lifetime::Empty,
        other => other,
    }
}

// ── Rules ───────────────────────────────────────────────────────────────────

/// Wires: forked sinks carry a copy of the source value.
pub(crate) fn propagate_wire(graph: &mut Graph, wire: WireId) {
    let (source, sinks) = {
        let w = graph.wire(wire);
        (w.source, w.sinks.clone())
    };
    let Some(source_var) = graph.facade_variable(source) else {
        return;
    };
    if !graph.variables.is_fixed(source_var) {
        return;
    }
    let InputState { ty, lifetime, .. } = state_of(graph, source_var);
    for sink in sinks.into_iter().skip(1) {
        let v = graph.facade_variable(sink);
        assign(graph, v, ty.clone(), lifetime);
    }
}

/// Apply the node's propagation rule. Already-typed variables are kept.
pub(crate) fn propagate_node(graph: &mut Graph, node: NodeId) {
    let kind = graph.node(node).kind.clone();
    if let NodeKind::TerminateLifetime(_) = kind {
        terminate_lifetime(graph, node);
        return;
    }
    if outputs_fixed(graph, node) {
        return;
    }
    let diagram = graph.node(node).diagram;
    match kind {
        NodeKind::Constant { ty } => assign_output(graph, node, 0, ty, Lifetime::Static),
        NodeKind::CreateCell => {
            let ty = match input_state(graph, node, 0) {
                Some(s) if s.mutable => Type::locking_cell(s.ty),
                Some(s) => Type::non_locking_cell(s.ty),
                None => Type::Void,
            };
            assign_output(graph, node, 0, ty, Lifetime::Unbounded);
        }
        NodeKind::CreateCopy => {
            let ty = input_state(graph, node, 0)
                .map(|s| s.ty.underlying().clone())
                .unwrap_or(Type::Void);
            assign_output(graph, node, 1, ty, Lifetime::Unbounded);
        }
        NodeKind::ExplicitBorrow { mode, .. } => {
            let count = graph.node(node).inputs.len();
            let interrupted: Vec<VariableRef> =
                (0..count).filter_map(|i| input_var(graph, node, i)).collect();
            let lifetime = graph
                .variables
                .set_mut(diagram)
                .define_lifetime_bounded_by_diagram(&interrupted);
            for i in 0..graph.node(node).outputs.len() {
                let inner = input_state(graph, node, i)
                    .map(|s| s.ty.underlying().clone())
                    .unwrap_or(Type::Void);
                assign_output(graph, node, i, Type::reference(inner, mode.is_mutable()), lifetime);
            }
        }
        NodeKind::ExplicitUnborrow { mode } => {
            let input = input_state(graph, node, 0);
            let (ty, lifetime) = match (mode, input) {
                (BorrowMode::MutableToImmutable, Some(s)) => {
                    (Type::mutable_reference(s.ty.underlying().clone()), s.lifetime)
                }
                (BorrowMode::MutableToImmutable, None) => {
                    (Type::mutable_reference(Type::Void), Lifetime::Empty)
                }
                (_, Some(s)) => (s.ty.underlying().clone(), Lifetime::Unbounded),
                (_, None) => (Type::Void, Lifetime::Unbounded),
            };
            assign_output(graph, node, 0, ty, lifetime);
        }
        NodeKind::PureBinaryPrimitive { op } => {
            let expected = op.expected_input_type();
            let ty = operation_result(graph, node, 2, &expected);
            assign_output(graph, node, 2, ty, Lifetime::Unbounded);
        }
        NodeKind::PureUnaryPrimitive { op } => {
            let expected = op.expected_input_type();
            let ty = operation_result(graph, node, 1, &expected);
            assign_output(graph, node, 1, ty, Lifetime::Unbounded);
        }
        NodeKind::Range => {
            assign_output(graph, node, 0, Type::iterator(Type::Int32), Lifetime::Unbounded)
        }
        NodeKind::VectorCreate => {
            assign_output(graph, node, 0, Type::vector(Type::Int32), Lifetime::Unbounded)
        }
        NodeKind::SelectReference => select_reference(graph, node, diagram),
        NodeKind::SomeConstructor => {
            let (ty, lifetime) = match input_state(graph, node, 0) {
                Some(s) => (Type::option(s.ty), s.lifetime),
                None => (Type::option(Type::Void), Lifetime::Unbounded),
            };
            assign_output(graph, node, 0, ty, lifetime);
        }
        NodeKind::Tunnel => tunnel(graph, node),
        NodeKind::BorrowTunnel { mutable } => {
            if let Some((_, inner, _)) = border_sides(graph, node) {
                let underlying = input_state(graph, node, 0)
                    .map(|s| s.ty.underlying().clone())
                    .unwrap_or(Type::Void);
                let lifetime = graph
                    .variables
                    .set_mut(inner)
                    .define_lifetime_that_outlasts_diagram(None);
                assign_output(graph, node, 0, Type::reference(underlying, mutable), lifetime);
            }
        }
        NodeKind::LockTunnel => {
            if let Some((_, inner, _)) = border_sides(graph, node) {
                let input = input_state(graph, node, 0);
                let value = input
                    .as_ref()
                    .and_then(|s| s.ty.underlying().locking_cell_value().cloned())
                    .unwrap_or(Type::Void);
                let origin = input.map(|s| s.lifetime);
                let lifetime = graph
                    .variables
                    .set_mut(inner)
                    .define_lifetime_that_outlasts_diagram(origin);
                assign_output(graph, node, 0, Type::mutable_reference(value), lifetime);
            }
        }
        NodeKind::IterateTunnel => {
            if let Some((_, inner, _)) = border_sides(graph, node) {
                let input = input_state(graph, node, 0);
                let item = input
                    .as_ref()
                    .and_then(|s| s.ty.underlying().iterator_item().cloned())
                    .unwrap_or(Type::Void);
                let lifetime = match input {
                    Some(s) if item.is_reference() => lifetime_entering(graph, inner, s.lifetime),
                    _ => Lifetime::Unbounded,
                };
                assign_output(graph, node, 0, item, lifetime);
            }
        }
        NodeKind::LoopConditionTunnel => {
            let outer = input_var(graph, node, 0);
            assign(graph, outer, Type::Boolean, Lifetime::Unbounded);
            if let Some((_, inner, _)) = border_sides(graph, node) {
                let lifetime = graph
                    .variables
                    .set_mut(inner)
                    .define_lifetime_that_outlasts_diagram(None);
                assign_output(graph, node, 0, Type::mutable_reference(Type::Boolean), lifetime);
            }
        }
        NodeKind::UnwrapOptionTunnel => {
            if let Some((_, target, _)) = border_sides(graph, node) {
                let input = input_state(graph, node, 0);
                let value = input
                    .as_ref()
                    .and_then(|s| s.ty.option_value().cloned())
                    .unwrap_or(Type::Void);
                let lifetime = match input {
                    Some(s) => lifetime_entering(graph, target, s.lifetime),
                    None => Lifetime::Unbounded,
                };
                assign_output(graph, node, 0, value, lifetime);
            }
        }
        // Outputs alias inputs, hand back an outer variable, or do not exist.
        NodeKind::Assign
        | NodeKind::Drop
        | NodeKind::ExchangeValues
        | NodeKind::ImmutablePassthrough
        | NodeKind::MutablePassthrough
        | NodeKind::MutatingBinaryPrimitive { .. }
        | NodeKind::MutatingUnaryPrimitive { .. }
        | NodeKind::Output
        | NodeKind::VectorInsert
        | NodeKind::TerminateLifetimeTunnel { .. } => {}
        NodeKind::TerminateLifetime(_) => {}
    }
}

/// Result type of a pure primitive: the operand type when every operand has
/// it, `void` otherwise.
fn operation_result(graph: &Graph, node: NodeId, operands: usize, expected: &Type) -> Type {
    let all_match = (0..operands).all(|i| {
        input_state(graph, node, i).is_some_and(|s| s.ty.underlying() == expected)
    });
    if all_match {
        expected.clone()
    } else {
        Type::Void
    }
}

fn select_reference(graph: &mut Graph, node: NodeId, diagram: DiagramId) {
    let values: Vec<VariableRef> = (1..=2).filter_map(|i| input_var(graph, node, i)).collect();
    let states: Vec<InputState> = values.iter().map(|&v| state_of(graph, v)).collect();
    let underlying = match states.split_first() {
        Some((first, rest)) if rest.iter().all(|s| s.ty.underlying() == first.ty.underlying()) => {
            first.ty.underlying().clone()
        }
        _ => Type::Void,
    };
    let decision = classify(InputReferenceMutability::Polymorphic, &states);
    let (mutable, lifetime) = match (decision, states.first()) {
        (_, None) => (false, Lifetime::Unbounded),
        ((mutable, false), Some(first)) => (mutable, first.lifetime),
        ((mutable, true), Some(_)) => {
            let lifetime = graph
                .variables
                .set_mut(diagram)
                .define_lifetime_bounded_by_diagram(&values);
            (mutable, lifetime)
        }
    };
    assign_output(graph, node, 1, Type::reference(underlying, mutable), lifetime);
}

fn tunnel(graph: &mut Graph, node: NodeId) {
    let Some((source, target, direction)) = border_sides(graph, node) else {
        return;
    };
    let Some(input) = input_state(graph, node, 0) else {
        return;
    };
    match direction {
        Direction::Input => {
            let lifetime = lifetime_entering(graph, target, input.lifetime);
            assign_output(graph, node, 0, input.ty, lifetime);
        }
        Direction::Output => {
            let lifetime = lifetime_leaving(graph, source, input.lifetime);
            let conditional = graph
                .node(node)
                .border
                .is_some_and(|b| graph.executes_conditionally(b.structure));
            let ty = if conditional && !input.ty.is_option() {
                Type::option(input.ty)
            } else {
                input.ty
            };
            assign_output(graph, node, 0, ty, lifetime);
        }
    }
}

// ── Terminate lifetime ──────────────────────────────────────────────────────

fn terminate_lifetime(graph: &mut Graph, node: NodeId) {
    let diagram = graph.node(node).diagram;
    let inputs = graph.node(node).inputs.clone();

    let wired: Vec<(usize, VariableRef)> = inputs
        .iter()
        .enumerate()
        .filter(|(_, &t)| graph.is_connected(t))
        .filter_map(|(i, &t)| graph.true_variable(t).map(|v| (i, v)))
        .collect();
    let mut lifetimes: Vec<Lifetime> = Vec::new();
    for &(_, v) in &wired {
        let lt = graph.variables.get(v).lifetime;
        if !lifetimes.contains(&lt) {
            lifetimes.push(lt);
        }
    }

    let mut state = TerminateLifetimeState::default();
    match lifetimes.as_slice() {
        // A second visit finds the inputs an earlier resize cut off unwired;
        // the earlier verdict stands.
        [] => {
            if let NodeKind::TerminateLifetime(previous) = graph.node(node).kind {
                state = previous;
            }
        }
        [lifetime] => match lifetime.bounded() {
            Some(b) if b.diagram == diagram && !b.outlasts_diagram => {
                let set = graph.variables.set(diagram);
                let required = set.live_count_in(*lifetime);
                let interrupted = set.interrupted_variables(*lifetime);
                // Inputs past `required` are cut off by the resize below.
                let kept = wired.iter().filter(|&&(i, _)| i < required).count();
                if wired.len() != required || kept != required {
                    state.error = TerminateLifetimeError::NotAllVariablesInLifetimeConnected;
                }
                state.required_inputs = Some(required);
                state.required_outputs = Some(interrupted.len());

                graph.set_terminal_counts(node, required, interrupted.len());
                let outputs = graph.node(node).outputs.clone();
                for (&out, &target) in outputs.iter().zip(&interrupted) {
                    match graph.facade_variable(out) {
                        Some(existing) => graph.variables.merge(existing, target),
                        None => graph.terminal_mut(out).facade.set_variable(Some(target)),
                    }
                }
            }
            _ => state.error = TerminateLifetimeError::InputLifetimeCannotBeTerminated,
        },
        _ => state.error = TerminateLifetimeError::InputLifetimesNotUnique,
    }
    // Outputs with nothing to hand back carry an owned `void`.
    let outputs = graph.node(node).outputs.clone();
    for out in outputs {
        let v = match graph.true_variable(out) {
            Some(v) => v,
            None => {
                let v = graph.variables.create(diagram, false, Some(out));
                graph.terminal_mut(out).facade.set_variable(Some(v));
                v
            }
        };
        assign(graph, Some(v), Type::Void, Lifetime::Unbounded);
    }
    log::trace!("set_types: {node} terminate state {:?}", state);
    graph.node_mut(node).kind = NodeKind::TerminateLifetime(state);
}

// ── Tests ───────────────────────────────────────────────────────────────────
