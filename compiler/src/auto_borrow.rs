// auto_borrow.rs — Reference lifetime resolver
//
// Decides, for every reference-input group, whether the wired values can be
// handed to the node as they are or need a fresh borrow, and rewrites the
// graph when they do: an auto-borrow node is spliced in front of the group's
// inputs and, when the node hands the references back, a terminate-lifetime
// node behind the paired outputs.
//
// Decisions need the types of upstream values, so the resolver types each
// node right after resolving it (see `set_types::propagate_node`).
//
// Preconditions: `determine_variables` has run.
// Postconditions: every reference-input facade is resolved; a member's true
//                 variable differs from its facade variable only across a
//                 spliced borrow node.
// Failure modes: cancellation; `AnalysisError::Internal` for a group whose
//                members are only partly paired with terminate outputs.
// Side effects: adds nodes and wires to the graph; allocates lifetimes.

use crate::facade::{BorrowDecision, GroupMember, InputReferenceMutability};
use crate::graph::{Graph, NodeKind, TerminateLifetimeState};
use crate::id::{DiagramId, NodeId, TerminalId, WireId};
use crate::pass::PassId;
use crate::set_types::{propagate_node, propagate_wire, state_of};
use crate::types::{BorrowMode, Type};
use crate::variable::{Lifetime, VariableRef};
use crate::visit::{walk, AnalysisError, CancellationToken, GraphVisitor};

// ── Decision ────────────────────────────────────────────────────────────────

/// What the resolver knows about one wired group member.
#[derive(Debug, Clone, PartialEq)]
pub struct InputState {
    pub ty: Type,
    pub lifetime: Lifetime,
    pub mutable: bool,
}

fn share_bounded_lifetime(inputs: &[InputState]) -> bool {
    match inputs.split_first() {
        Some((first, rest)) => {
            first.lifetime.is_bounded() && rest.iter().all(|s| s.lifetime == first.lifetime)
        }
        None => false,
    }
}

/// The four-case borrow decision. Returns `(mutable, new_lifetime)`; the
/// first matching case wins:
///
/// 1. mutable allowed, every input `&mut` in one bounded lifetime: reuse it;
/// 2. mutable required (or polymorphic over mutable inputs): new `&mut`;
/// 3. every input `&` in one bounded lifetime: reuse it;
/// 4. otherwise: new `&`.
pub fn classify(mutability: InputReferenceMutability, inputs: &[InputState]) -> (bool, bool) {
    use InputReferenceMutability::*;
    let all_mutable_refs = inputs.iter().all(|s| s.ty.is_mutable_reference());
    let all_immutable_refs = inputs.iter().all(|s| s.ty.is_immutable_reference());
    let same_lifetime = share_bounded_lifetime(inputs);

    if matches!(mutability, RequireMutable | Polymorphic) && all_mutable_refs && same_lifetime {
        return (true, false);
    }
    let can_be_mutable = inputs
        .iter()
        .all(|s| s.ty.is_mutable_reference() || (s.mutable && !s.ty.is_reference()));
    if mutability == RequireMutable || (mutability == Polymorphic && can_be_mutable) {
        return (true, true);
    }
    if all_immutable_refs && same_lifetime {
        return (false, false);
    }
    (false, true)
}

// ── Pass ────────────────────────────────────────────────────────────────────

/// Run the resolver over the whole graph.
pub fn auto_borrow(graph: &mut Graph, cancel: &CancellationToken) -> Result<(), AnalysisError> {
    let mut ctx = BorrowCtx::default();
    walk(graph, &mut ctx, cancel)?;
    log::debug!(
        "auto_borrow: {} groups reused a lifetime, {} borrows and {} terminations inserted",
        ctx.reused,
        ctx.borrows,
        ctx.terminates
    );
    Ok(())
}

#[derive(Default)]
struct BorrowCtx {
    reused: usize,
    borrows: usize,
    terminates: usize,
}

impl GraphVisitor for BorrowCtx {
    fn visit_node(&mut self, graph: &mut Graph, node: NodeId) -> Result<(), AnalysisError> {
        for group in 0..graph.node(node).facade.groups.len() {
            self.resolve_group(graph, node, group)?;
        }
        propagate_node(graph, node);
        Ok(())
    }

    fn visit_wire(&mut self, graph: &mut Graph, wire: WireId) -> Result<(), AnalysisError> {
        propagate_wire(graph, wire);
        Ok(())
    }
}

impl BorrowCtx {
    fn resolve_group(
        &mut self,
        graph: &mut Graph,
        node: NodeId,
        group: usize,
    ) -> Result<(), AnalysisError> {
        let (mutability, members) = {
            let g = &graph.node(node).facade.groups[group];
            (g.mutability, g.members.clone())
        };
        let wired: Vec<(GroupMember, VariableRef)> = members
            .iter()
            .filter_map(|&m| graph.facade_variable(m.input).map(|v| (m, v)))
            .collect();
        if wired.is_empty() {
            resolve_members(graph, &members);
            return Ok(());
        }

        let facades: Vec<VariableRef> = wired.iter().map(|&(_, v)| v).collect();
        let states: Vec<InputState> = facades.iter().map(|&v| state_of(graph, v)).collect();
        let (mutable, new_lifetime) = classify(mutability, &states);
        let members_wired: Vec<GroupMember> = wired.iter().map(|&(m, _)| m).collect();

        let lifetime = if new_lifetime {
            let diagram = graph.terminal(members_wired[0].input).diagram;
            let lifetime = graph
                .variables
                .set_mut(diagram)
                .define_lifetime_bounded_by_diagram(&facades);
            for (member, state) in members_wired.iter().zip(&states) {
                if let Some(t) = graph.true_variable(member.input) {
                    let ty = Type::reference(state.ty.underlying().clone(), mutable);
                    graph.variables.set_type_and_lifetime(t, ty, lifetime);
                }
            }
            let mode = if mutable {
                BorrowMode::OwnerToMutable
            } else if states.iter().all(|s| s.ty.is_mutable_reference()) {
                BorrowMode::MutableToImmutable
            } else {
                BorrowMode::OwnerToImmutable
            };
            self.splice_borrow(graph, diagram, mode, &members_wired);
            self.splice_terminate(graph, node, &members_wired)?;
            lifetime
        } else {
            for member in &members_wired {
                let f = graph.facade_variable(member.input);
                let t = graph.true_variable(member.input);
                if let (Some(f), Some(t)) = (f, t) {
                    graph.variables.merge(t, f);
                }
            }
            self.reused += 1;
            states[0].lifetime
        };

        log::trace!(
            "auto_borrow: {node} group {group} -> {} {lifetime}{}",
            if mutable { "&mut" } else { "&" },
            if new_lifetime { " (borrowed)" } else { "" }
        );
        graph.node_mut(node).facade.groups[group].decision = Some(BorrowDecision {
            mutable,
            borrow_required: new_lifetime,
            lifetime,
        });
        resolve_members(graph, &members);
        Ok(())
    }

    /// Insert one borrow node in front of `members`. Each member's old wire
    /// now feeds the borrow node; a new wire carries the reference on.
    fn splice_borrow(
        &mut self,
        graph: &mut Graph,
        diagram: DiagramId,
        mode: BorrowMode,
        members: &[GroupMember],
    ) {
        let n = members.len();
        let borrow = graph.add_node_with_arity(
            diagram,
            NodeKind::ExplicitBorrow { mode, auto: true },
            n,
            n,
        );
        let (b_ins, b_outs) = {
            let b = graph.node(borrow);
            (b.inputs.clone(), b.outputs.clone())
        };
        for ((member, &b_in), &b_out) in members.iter().zip(&b_ins).zip(&b_outs) {
            let facade = graph.facade_variable(member.input);
            let reference = graph.true_variable(member.input);
            if let Some(upstream) = graph.connected(member.input) {
                graph.connect(upstream, b_in);
            }
            graph.terminal_mut(b_in).facade.set_variable(facade);
            graph.terminal_mut(b_out).facade.set_variable(reference);
            let wire = graph.wire_together(b_out, &[member.input]);
            set_wire_variable(graph, wire, reference);
            if let Some(r) = reference {
                graph.terminal_mut(member.input).facade.rebind_after_splice(r);
            }
        }
        self.borrows += 1;
        log::trace!("auto_borrow: inserted {borrow} ({}) for {n} inputs", mode.name());
    }

    /// Insert a terminate-lifetime node behind the outputs paired with
    /// `members`, if they are paired.
    fn splice_terminate(
        &mut self,
        graph: &mut Graph,
        node: NodeId,
        members: &[GroupMember],
    ) -> Result<(), AnalysisError> {
        let outputs: Vec<TerminalId> = members.iter().filter_map(|m| m.terminate_output).collect();
        if outputs.is_empty() {
            return Ok(());
        }
        if outputs.len() != members.len() {
            return Err(AnalysisError::internal(
                PassId::AutoBorrow,
                format!(
                    "{node}: {} of {} borrowed inputs hand their reference back",
                    outputs.len(),
                    members.len()
                ),
            ));
        }

        let n = outputs.len();
        let diagram = graph.terminal(outputs[0]).diagram;
        let terminate = graph.add_node_with_arity(
            diagram,
            NodeKind::TerminateLifetime(TerminateLifetimeState::default()),
            n,
            n,
        );
        let (t_ins, t_outs) = {
            let t = graph.node(terminate);
            (t.inputs.clone(), t.outputs.clone())
        };
        for ((&out, &t_in), &t_out) in outputs.iter().zip(&t_ins).zip(&t_outs) {
            let owner = graph.facade_variable(out);
            let reference = graph.true_variable(out);
            if let Some(downstream) = graph.connected(out) {
                graph.connect(downstream, t_out);
            }
            graph.terminal_mut(t_out).facade.set_variable(owner);
            let wire = graph.wire_together(out, &[t_in]);
            set_wire_variable(graph, wire, reference);
            graph.terminal_mut(t_in).facade.set_variable(reference);
            if let Some(r) = reference {
                graph.terminal_mut(out).facade.rebind_after_splice(r);
            }
        }
        self.terminates += 1;
        log::trace!("auto_borrow: inserted {terminate} behind {node}");
        Ok(())
    }
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

fn resolve_members(graph: &mut Graph, members: &[GroupMember]) {
    for m in members {
        graph.terminal_mut(m.input).facade.resolve();
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
