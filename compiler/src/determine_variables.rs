// determine_variables.rs — Assign a variable identity to every terminal
//
// Walks the graph in dataflow order. Wires hand their source variable to the
// first sink and fork a new variable for every further sink. Passthrough
// outputs alias the true variable of their paired input; every other output
// produces a fresh variable. Inputs pull whatever their wire carries, or
// nothing when unwired.
//
// Preconditions: `create_facades` has run.
// Postconditions: every connected terminal has a facade variable; reference
//                 inputs that are wired also have a distinct true variable.
// Failure modes: cancellation.
// Side effects: sets `is_first_variable_wire` on wires that start a variable.

use crate::facade::FacadeKind;
use crate::graph::{Graph, NodeKind};
use crate::id::{NodeId, TerminalId, WireId};
use crate::variable::VariableRef;
use crate::visit::{walk, AnalysisError, CancellationToken, GraphVisitor};

/// Run the variable unifier over the whole graph.
pub fn determine_variables(
    graph: &mut Graph,
    cancel: &CancellationToken,
) -> Result<(), AnalysisError> {
    let mut ctx = UnifyCtx::default();
    walk(graph, &mut ctx, cancel)?;
    log::debug!(
        "determine_variables: {} created, {} forked at wires",
        ctx.created,
        ctx.forked
    );
    Ok(())
}

#[derive(Default)]
struct UnifyCtx {
    created: usize,
    forked: usize,
}

/// Inputs that take a reference or end a lifetime without consuming the value.
fn input_consumes(kind: &NodeKind) -> bool {
    !matches!(
        kind,
        NodeKind::ExplicitBorrow { .. }
            | NodeKind::TerminateLifetime(_)
            | NodeKind::BorrowTunnel { .. }
    )
}

impl UnifyCtx {
    fn fresh(&mut self, graph: &mut Graph, terminal: TerminalId, mutable: bool) -> VariableRef {
        self.created += 1;
        let diagram = graph.terminal(terminal).diagram;
        graph.variables.create(diagram, mutable, Some(terminal))
    }

    fn unify_input(&mut self, graph: &mut Graph, node: NodeId, index: usize, input: TerminalId) {
        let wired = graph.connected_variable(input);
        let kind = graph.node(node).kind.clone();
        match graph.terminal(input).facade.kind {
            FacadeKind::ReferenceInput { group } => {
                let true_variable = wired.map(|_| self.fresh(graph, input, false));
                let paired = graph.node(node).facade.groups[group]
                    .members
                    .iter()
                    .any(|m| m.input == input && m.terminate_output.is_some());
                if let (Some(v), false) = (true_variable, paired) {
                    graph.variables.mark_consumed(v);
                }
                graph
                    .terminal_mut(input)
                    .facade
                    .set_variables(wired, true_variable);
            }
            FacadeKind::Simple | FacadeKind::TerminateLifetimeOutput { .. } => {
                let variable = match (wired, &kind) {
                    (None, NodeKind::LoopConditionTunnel) if index == 0 => {
                        Some(self.fresh(graph, input, false))
                    }
                    (wired, _) => wired,
                };
                if let Some(v) = variable {
                    if input_consumes(&kind) {
                        graph.variables.mark_consumed(v);
                    }
                }
                graph.terminal_mut(input).facade.set_variable(variable);
            }
        }
    }

    fn unify_output(&mut self, graph: &mut Graph, node: NodeId, output: TerminalId) {
        let kind = graph.node(node).kind.clone();
        match graph.terminal(output).facade.kind {
            FacadeKind::TerminateLifetimeOutput { input } => {
                let (facade, true_variable) = {
                    let f = &graph.terminal(input).facade;
                    (f.facade_variable(), f.true_variable())
                };
                match (facade, true_variable) {
                    (Some(_), Some(_)) => graph
                        .terminal_mut(output)
                        .facade
                        .set_variables(facade, true_variable),
                    _ => {
                        let v = self.fresh(graph, output, false);
                        graph.terminal_mut(output).facade.set_variable(Some(v));
                    }
                }
            }
            FacadeKind::Simple | FacadeKind::ReferenceInput { .. } => {
                if let NodeKind::TerminateLifetimeTunnel { begin } = kind {
                    let reopened = graph
                        .node(begin)
                        .inputs
                        .first()
                        .and_then(|&t| graph.facade_variable(t));
                    if let Some(v) = reopened {
                        graph.terminal_mut(output).facade.set_variable(Some(v));
                        return;
                    }
                }
                let starts_wire = match graph.attached_wire(output) {
                    Some(w) if !matches!(kind, NodeKind::TerminateLifetime(_)) => Some(w),
                    _ => None,
                };
                let mutable = match starts_wire {
                    Some(w) => {
                        let wire = graph.wire_mut(w);
                        wire.is_first_variable_wire = true;
                        wire.begins_mutable_variable
                    }
                    None => false,
                };
                let v = self.fresh(graph, output, mutable);
                graph.terminal_mut(output).facade.set_variable(Some(v));
            }
        }
    }
}

impl GraphVisitor for UnifyCtx {
    fn visit_node(&mut self, graph: &mut Graph, node: NodeId) -> Result<(), AnalysisError> {
        let (inputs, outputs) = {
            let n = graph.node(node);
            (n.inputs.clone(), n.outputs.clone())
        };
        for (index, &input) in inputs.iter().enumerate() {
            self.unify_input(graph, node, index, input);
        }
        for &output in &outputs {
            self.unify_output(graph, node, output);
        }
        log::trace!("determine_variables: visited {node}");
        Ok(())
    }

    fn visit_wire(&mut self, graph: &mut Graph, wire: WireId) -> Result<(), AnalysisError> {
        let (source, sinks, diagram, mutable) = {
            let w = graph.wire(wire);
            (w.source, w.sinks.clone(), w.diagram, w.begins_mutable_variable)
        };
        let variable = graph.connected_variable(source);
        graph.terminal_mut(source).facade.set_variable(variable);
        for (i, &sink) in sinks.iter().enumerate() {
            let v = if i == 0 {
                variable
            } else {
                self.forked += 1;
                self.created += 1;
                Some(graph.variables.create(diagram, mutable, Some(sink)))
            };
            graph.terminal_mut(sink).facade.set_variable(v);
        }
        Ok(())
    }
}
