// create_facades.rs — Attach terminal facades and reference-input groups
//
// Classifies every terminal as a simple facade, a member of a reference-input
// group, or a terminate-lifetime output that hands back a group member's
// reference. The table below is the single place a node kind declares which
// of its inputs are borrowed together and how.
//
// Preconditions: none; malformed graphs are classified all the same.
// Postconditions: every terminal's facade is reset; `graph.variables` holds
//                 one empty set per diagram.
// Failure modes: cancellation.
// Side effects: none.

use crate::facade::{
    FacadeKind, GroupMember, InputReferenceMutability, NodeFacade, ReferenceInputGroup,
    TerminalFacade,
};
use crate::graph::{Graph, NodeKind};
use crate::id::{NodeId, WireId};
use crate::variable::Variables;
use crate::visit::{walk, AnalysisError, CancellationToken, GraphVisitor};

/// One reference-input group as declared by a node kind: input index and,
/// when the node hands the reference back, the paired output index.
type GroupSpec = (InputReferenceMutability, &'static [(usize, Option<usize>)]);

/// Reference-input groups per node kind. Terminals not named here get simple
/// facades.
pub fn reference_groups(kind: &NodeKind) -> Vec<GroupSpec> {
    use InputReferenceMutability::*;
    match kind {
        NodeKind::Assign | NodeKind::MutablePassthrough | NodeKind::MutatingUnaryPrimitive { .. } => {
            vec![group(RequireMutable, &[(0, Some(0))])]
        }
        NodeKind::CreateCopy
        | NodeKind::ImmutablePassthrough
        | NodeKind::Output
        | NodeKind::PureUnaryPrimitive { .. } => vec![group(AllowImmutable, &[(0, Some(0))])],
        NodeKind::ExchangeValues => vec![group(RequireMutable, &[(0, Some(0)), (1, Some(1))])],
        NodeKind::MutatingBinaryPrimitive { .. } | NodeKind::VectorInsert => vec![
            group(RequireMutable, &[(0, Some(0))]),
            group(AllowImmutable, &[(1, Some(1))]),
        ],
        NodeKind::PureBinaryPrimitive { .. } => vec![
            group(AllowImmutable, &[(0, Some(0))]),
            group(AllowImmutable, &[(1, Some(1))]),
        ],
        NodeKind::SelectReference => vec![
            group(AllowImmutable, &[(0, Some(0))]),
            group(Polymorphic, &[(1, None), (2, None)]),
        ],
        NodeKind::IterateTunnel => vec![group(RequireMutable, &[(0, None)])],
        NodeKind::LockTunnel => vec![group(AllowImmutable, &[(0, None)])],
        NodeKind::Constant { .. }
        | NodeKind::CreateCell
        | NodeKind::Drop
        | NodeKind::ExplicitBorrow { .. }
        | NodeKind::ExplicitUnborrow { .. }
        | NodeKind::Range
        | NodeKind::SomeConstructor
        | NodeKind::TerminateLifetime(_)
        | NodeKind::VectorCreate
        | NodeKind::Tunnel
        | NodeKind::BorrowTunnel { .. }
        | NodeKind::LoopConditionTunnel
        | NodeKind::UnwrapOptionTunnel
        | NodeKind::TerminateLifetimeTunnel { .. } => vec![],
    }
}

fn group(
    mutability: InputReferenceMutability,
    members: &'static [(usize, Option<usize>)],
) -> GroupSpec {
    (mutability, members)
}

/// Run the facade builder over the whole graph.
pub fn create_facades(graph: &mut Graph, cancel: &CancellationToken) -> Result<(), AnalysisError> {
    graph.variables = Variables::for_diagrams(graph.diagram_count());
    let mut ctx = FacadeCtx::default();
    walk(graph, &mut ctx, cancel)?;
    log::debug!(
        "create_facades: {} nodes, {} reference-input groups",
        ctx.nodes,
        ctx.groups
    );
    Ok(())
}

#[derive(Default)]
struct FacadeCtx {
    nodes: usize,
    groups: usize,
}

impl GraphVisitor for FacadeCtx {
    fn visit_node(&mut self, graph: &mut Graph, node: NodeId) -> Result<(), AnalysisError> {
        self.nodes += 1;
        let (inputs, outputs, specs) = {
            let n = graph.node(node);
            (n.inputs.clone(), n.outputs.clone(), reference_groups(&n.kind))
        };
        for &t in inputs.iter().chain(&outputs) {
            graph.terminal_mut(t).facade = TerminalFacade::simple();
        }

        let mut facade = NodeFacade::default();
        for (index, (mutability, members)) in specs.into_iter().enumerate() {
            let mut group = ReferenceInputGroup::new(mutability);
            for &(input, output) in members {
                // Arity can differ from the declaration on malformed graphs.
                let Some(&input) = inputs.get(input) else {
                    continue;
                };
                let terminate_output = output.and_then(|o| outputs.get(o).copied());
                graph.terminal_mut(input).facade =
                    TerminalFacade::new(FacadeKind::ReferenceInput { group: index });
                if let Some(out) = terminate_output {
                    graph.terminal_mut(out).facade =
                        TerminalFacade::new(FacadeKind::TerminateLifetimeOutput { input });
                }
                group.members.push(GroupMember {
                    input,
                    terminate_output,
                });
            }
            facade.groups.push(group);
        }
        self.groups += facade.groups.len();
        graph.node_mut(node).facade = facade;
        Ok(())
    }

    fn visit_wire(&mut self, graph: &mut Graph, wire: WireId) -> Result<(), AnalysisError> {
        let terminals: Vec<_> = {
            let w = graph.wire(wire);
            std::iter::once(w.source).chain(w.sinks.iter().copied()).collect()
        };
        for t in terminals {
            graph.terminal_mut(t).facade = TerminalFacade::simple();
        }
        graph.wire_mut(wire).is_first_variable_wire = false;
        Ok(())
    }
}
