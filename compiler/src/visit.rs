// visit.rs — Dataflow-ordered traversal shared by the analysis stages
//
// Walks a diagram in dataflow order and descends into structures: input
// border nodes, then the inner diagram, then output border nodes. The item
// order of each diagram is fixed when the walk enters it, so elements a
// visitor splices in are not visited by the same walk.
//
// Preconditions: none.
// Postconditions: every node, wire and border node present at entry is
//                 visited exactly once, unless the walk stops with an error.
// Failure modes: `AnalysisError::Cancelled` when the token is cancelled;
//                any error a visitor returns.
// Side effects: none beyond the visitor's own.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::graph::{DiagramItem, Direction, Graph};
use crate::id::{DiagramId, NodeId, StructureId, WireId};
use crate::pass::PassId;

// ── Errors ──────────────────────────────────────────────────────────────────

/// Why a stage stopped early. User errors in the graph are diagnostics, not
/// `AnalysisError`s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    Cancelled,
    /// The stage hit a state it cannot continue from.
    Internal { pass: PassId, message: String },
}

impl AnalysisError {
    pub fn internal(pass: PassId, message: impl Into<String>) -> Self {
        AnalysisError::Internal {
            pass,
            message: message.into(),
        }
    }
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::Cancelled => write!(f, "analysis cancelled"),
            AnalysisError::Internal { pass, message } => {
                write!(f, "internal error in {}: {}", crate::pass::descriptor(*pass).name, message)
            }
        }
    }
}

impl std::error::Error for AnalysisError {}

// ── Cancellation ────────────────────────────────────────────────────────────

/// Cooperative cancellation flag, checked between node visits. Clones share
/// the flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), AnalysisError> {
        if self.is_cancelled() {
            Err(AnalysisError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ── Visitor ─────────────────────────────────────────────────────────────────

pub trait GraphVisitor {
    fn visit_node(&mut self, graph: &mut Graph, node: NodeId) -> Result<(), AnalysisError>;

    fn visit_wire(&mut self, _graph: &mut Graph, _wire: WireId) -> Result<(), AnalysisError> {
        Ok(())
    }

    /// Called before any of the structure's border nodes.
    fn visit_structure(
        &mut self,
        _graph: &mut Graph,
        _structure: StructureId,
    ) -> Result<(), AnalysisError> {
        Ok(())
    }
}

/// Walk the whole graph from the root diagram.
pub fn walk(
    graph: &mut Graph,
    visitor: &mut impl GraphVisitor,
    cancel: &CancellationToken,
) -> Result<(), AnalysisError> {
    let root = graph.root();
    walk_diagram(graph, root, visitor, cancel)
}

pub fn walk_diagram(
    graph: &mut Graph,
    diagram: DiagramId,
    visitor: &mut impl GraphVisitor,
    cancel: &CancellationToken,
) -> Result<(), AnalysisError> {
    for item in graph.dataflow_order(diagram) {
        match item {
            DiagramItem::Node(n) => {
                cancel.check()?;
                visitor.visit_node(graph, n)?;
            }
            DiagramItem::Wire(w) => visitor.visit_wire(graph, w)?,
            DiagramItem::Structure(s) => {
                visitor.visit_structure(graph, s)?;
                for n in graph.border_nodes(s, Direction::Input) {
                    cancel.check()?;
                    visitor.visit_node(graph, n)?;
                }
                let inner = graph.structure(s).inner;
                walk_diagram(graph, inner, visitor, cancel)?;
                for n in graph.border_nodes(s, Direction::Output) {
                    cancel.check()?;
                    visitor.visit_node(graph, n)?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NodeKind, StructureKind};
    use crate::types::Type;

    #[derive(Default)]
    struct Recorder {
        seen: Vec<String>,
    }

    impl GraphVisitor for Recorder {
        fn visit_node(&mut self, graph: &mut Graph, node: NodeId) -> Result<(), AnalysisError> {
            self.seen.push(graph.node(node).kind.to_string());
            Ok(())
        }

        fn visit_wire(&mut self, _graph: &mut Graph, wire: WireId) -> Result<(), AnalysisError> {
            self.seen.push(wire.to_string());
            Ok(())
        }
    }

    #[test]
    fn structures_visit_borders_around_body() {
        let mut g = Graph::new();
        let root = g.root();
        let s = g.add_structure(root, StructureKind::Frame);
        let inner = g.structure(s).inner;
        g.add_border_node(s, NodeKind::Tunnel, Direction::Output);
        g.add_border_node(s, NodeKind::Tunnel, Direction::Input);
        g.add_node(inner, NodeKind::Drop);
        let mut rec = Recorder::default();
        walk(&mut g, &mut rec, &CancellationToken::new()).unwrap();
        assert_eq!(rec.seen, vec!["tunnel", "drop", "tunnel"]);
    }

    #[test]
    fn cancelled_walk_stops() {
        let mut g = Graph::new();
        let root = g.root();
        g.add_node(root, NodeKind::Constant { ty: Type::Int32 });
        let token = CancellationToken::new();
        token.clone().cancel();
        let mut rec = Recorder::default();
        let result = walk(&mut g, &mut rec, &token);
        assert_eq!(result, Err(AnalysisError::Cancelled));
        assert!(rec.seen.is_empty());
    }
}
