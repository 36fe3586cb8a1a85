// document.rs — JSON graph document loader
//
// The host-side construction format used by the CLI and tests:
//
//   {
//     "nodes":  [{"name": "a", "kind": "constant", "type": "i32"},
//                {"name": "inc", "kind": "mutating_unary", "op": "increment"}],
//     "structures": [{"name": "f", "kind": "frame",
//                     "border": [{"name": "t", "kind": "tunnel", "direction": "input"}],
//                     "nodes": [], "structures": [], "wires": []}],
//     "wires":  [{"from": "a.out0", "to": ["inc.in0"], "mutable": true}]
//   }
//
// Names are global across the document. Wires are created after every node
// so they may refer to nodes declared later or in another structure.
//
// Preconditions: none.
// Postconditions: on success, every named element exists in the graph and
//                 every wire connects an output to inputs of one diagram.
// Failure modes: malformed JSON, unparseable type text, unknown or repeated
//                names, terminal references that do not resolve.
// Side effects: none.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::graph::{
    BinaryOp, Direction, Graph, NodeKind, StructureKind, TerminateLifetimeState, UnaryOp,
};
use crate::id::{DiagramId, NodeId, StructureId, TerminalId};
use crate::parser::parse_type;
use crate::types::BorrowMode;

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum DocumentError {
    Io(std::io::Error),
    Json(serde_json::Error),
    /// A `type` field that does not parse.
    Type { text: String, message: String },
    /// A wire or tunnel refers to a name that was never declared.
    UnknownName(String),
    /// Two elements share a name.
    DuplicateName(String),
    /// A terminal reference that is malformed, out of range or on the wrong
    /// side of a wire.
    BadTerminal(String),
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentError::Io(e) => write!(f, "cannot read graph document: {e}"),
            DocumentError::Json(e) => write!(f, "invalid graph document: {e}"),
            DocumentError::Type { text, message } => {
                write!(f, "invalid type `{text}`: {message}")
            }
            DocumentError::UnknownName(name) => write!(f, "unknown name `{name}`"),
            DocumentError::DuplicateName(name) => write!(f, "name `{name}` is declared twice"),
            DocumentError::BadTerminal(text) => write!(f, "bad terminal reference `{text}`"),
        }
    }
}

impl std::error::Error for DocumentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DocumentError::Io(e) => Some(e),
            DocumentError::Json(e) => Some(e),
            _ => None,
        }
    }
}

// ── Document schema ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct DiagramDoc {
    nodes: Vec<NodeDoc>,
    structures: Vec<StructureDoc>,
    wires: Vec<WireDoc>,
}

#[derive(Debug, Deserialize)]
struct NodeDoc {
    name: String,
    #[serde(flatten)]
    kind: KindDoc,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ModeDoc {
    OwnerToMutable,
    OwnerToImmutable,
    MutableToImmutable,
}

impl From<ModeDoc> for BorrowMode {
    fn from(mode: ModeDoc) -> Self {
        match mode {
            ModeDoc::OwnerToMutable => BorrowMode::OwnerToMutable,
            ModeDoc::OwnerToImmutable => BorrowMode::OwnerToImmutable,
            ModeDoc::MutableToImmutable => BorrowMode::MutableToImmutable,
        }
    }
}

fn one() -> usize {
    1
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum KindDoc {
    Constant {
        #[serde(rename = "type")]
        ty: String,
    },
    Assign,
    CreateCell,
    CreateCopy,
    Drop,
    ExchangeValues,
    /// `inputs` values borrowed together, one reference out per value.
    ExplicitBorrow {
        mode: ModeDoc,
        #[serde(default = "one")]
        inputs: usize,
    },
    ExplicitUnborrow {
        mode: ModeDoc,
    },
    ImmutablePassthrough,
    MutablePassthrough,
    MutatingBinary {
        op: BinaryOp,
    },
    MutatingUnary {
        op: UnaryOp,
    },
    Output,
    PureBinary {
        op: BinaryOp,
    },
    PureUnary {
        op: UnaryOp,
    },
    Range,
    SelectReference,
    SomeConstructor,
    TerminateLifetime {
        #[serde(default = "one")]
        inputs: usize,
        #[serde(default = "one")]
        outputs: usize,
    },
    VectorCreate,
    VectorInsert,
}

#[derive(Debug, Deserialize)]
struct StructureDoc {
    name: String,
    kind: StructureKind,
    #[serde(default)]
    border: Vec<BorderDoc>,
    #[serde(flatten)]
    body: DiagramDoc,
}

fn input() -> Direction {
    Direction::Input
}

#[derive(Debug, Deserialize)]
struct BorderDoc {
    name: String,
    #[serde(default = "input")]
    direction: Direction,
    #[serde(flatten)]
    kind: BorderKindDoc,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum BorderKindDoc {
    Tunnel,
    BorrowTunnel {
        #[serde(default)]
        mutable: bool,
    },
    LockTunnel,
    IterateTunnel,
    LoopConditionTunnel,
    UnwrapOptionTunnel,
    /// Closes the lifetime opened by the named border node.
    TerminateLifetimeTunnel {
        begin: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireDoc {
    from: String,
    to: Vec<String>,
    #[serde(default)]
    mutable: bool,
}

// ── Loaded document ─────────────────────────────────────────────────────────

/// A built graph plus the names the document gave its elements.
#[derive(Debug)]
pub struct LoadedDocument {
    pub graph: Graph,
    nodes: HashMap<String, NodeId>,
    structures: HashMap<String, StructureId>,
}

impl LoadedDocument {
    pub fn node(&self, name: &str) -> Option<NodeId> {
        self.nodes.get(name).copied()
    }

    pub fn structure(&self, name: &str) -> Option<StructureId> {
        self.structures.get(name).copied()
    }

    /// Resolve `name.inN` / `name.outN`.
    pub fn terminal(&self, reference: &str) -> Result<TerminalId, DocumentError> {
        resolve_terminal(&self.graph, &self.nodes, reference)
    }
}

pub fn from_json(text: &str) -> Result<LoadedDocument, DocumentError> {
    let doc: DiagramDoc = serde_json::from_str(text).map_err(DocumentError::Json)?;
    Builder::default().build(doc)
}

pub fn load(path: &Path) -> Result<LoadedDocument, DocumentError> {
    let text = std::fs::read_to_string(path).map_err(DocumentError::Io)?;
    from_json(&text)
}

// ── Builder ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Builder {
    graph: Graph,
    nodes: HashMap<String, NodeId>,
    structures: HashMap<String, StructureId>,
    wires: Vec<WireDoc>,
}

impl Builder {
    fn build(mut self, doc: DiagramDoc) -> Result<LoadedDocument, DocumentError> {
        let root = self.graph.root();
        self.add_diagram(root, doc)?;
        for wire in std::mem::take(&mut self.wires) {
            self.add_wire(wire)?;
        }
        log::debug!(
            "document: {} nodes, {} structures, {} wires",
            self.graph.nodes().len(),
            self.graph.structures().len(),
            self.graph.wires().len()
        );
        Ok(LoadedDocument {
            graph: self.graph,
            nodes: self.nodes,
            structures: self.structures,
        })
    }

    fn add_diagram(&mut self, diagram: DiagramId, doc: DiagramDoc) -> Result<(), DocumentError> {
        for node in doc.nodes {
            let id = match node.kind {
                KindDoc::TerminateLifetime { inputs, outputs } => self.graph.add_node_with_arity(
                    diagram,
                    NodeKind::TerminateLifetime(TerminateLifetimeState::default()),
                    inputs,
                    outputs,
                ),
                KindDoc::ExplicitBorrow { mode, inputs } => self.graph.add_node_with_arity(
                    diagram,
                    NodeKind::ExplicitBorrow {
                        mode: mode.into(),
                        auto: false,
                    },
                    inputs,
                    inputs,
                ),
                kind => {
                    let kind = node_kind(kind)?;
                    self.graph.add_node(diagram, kind)
                }
            };
            self.name_node(node.name, id)?;
        }
        for structure in doc.structures {
            self.add_structure(diagram, structure)?;
        }
        self.wires.extend(doc.wires);
        Ok(())
    }

    fn add_structure(&mut self, diagram: DiagramId, doc: StructureDoc) -> Result<(), DocumentError> {
        let id = self.graph.add_structure(diagram, doc.kind);
        if self.structures.insert(doc.name.clone(), id).is_some() {
            return Err(DocumentError::DuplicateName(doc.name));
        }
        for border in doc.border {
            let kind = match border.kind {
                BorderKindDoc::Tunnel => NodeKind::Tunnel,
                BorderKindDoc::BorrowTunnel { mutable } => NodeKind::BorrowTunnel { mutable },
                BorderKindDoc::LockTunnel => NodeKind::LockTunnel,
                BorderKindDoc::IterateTunnel => NodeKind::IterateTunnel,
                BorderKindDoc::LoopConditionTunnel => NodeKind::LoopConditionTunnel,
                BorderKindDoc::UnwrapOptionTunnel => NodeKind::UnwrapOptionTunnel,
                BorderKindDoc::TerminateLifetimeTunnel { begin } => {
                    let begin = self
                        .nodes
                        .get(&begin)
                        .copied()
                        .ok_or(DocumentError::UnknownName(begin))?;
                    NodeKind::TerminateLifetimeTunnel { begin }
                }
            };
            let node = self.graph.add_border_node(id, kind, border.direction);
            self.name_node(border.name, node)?;
        }
        let inner = self.graph.structure(id).inner;
        self.add_diagram(inner, doc.body)
    }

    fn name_node(&mut self, name: String, id: NodeId) -> Result<(), DocumentError> {
        if self.nodes.insert(name.clone(), id).is_some() {
            return Err(DocumentError::DuplicateName(name));
        }
        Ok(())
    }

    fn add_wire(&mut self, wire: WireDoc) -> Result<(), DocumentError> {
        let source = resolve_terminal(&self.graph, &self.nodes, &wire.from)?;
        let sinks = wire
            .to
            .iter()
            .map(|s| resolve_terminal(&self.graph, &self.nodes, s))
            .collect::<Result<Vec<_>, _>>()?;

        let diagram = self.graph.terminal(source).diagram;
        if self.graph.terminal(source).direction != Direction::Output {
            return Err(DocumentError::BadTerminal(wire.from));
        }
        for (text, &sink) in wire.to.iter().zip(&sinks) {
            let t = self.graph.terminal(sink);
            if t.direction != Direction::Input || t.diagram != diagram || t.connected.is_some() {
                return Err(DocumentError::BadTerminal(text.clone()));
            }
        }
        if self.graph.is_connected(source) {
            return Err(DocumentError::BadTerminal(wire.from));
        }
        let id = self.graph.wire_together(source, &sinks);
        self.graph.set_wire_begins_mutable(id, wire.mutable);
        Ok(())
    }
}

fn node_kind(kind: KindDoc) -> Result<NodeKind, DocumentError> {
    Ok(match kind {
        KindDoc::Constant { ty } => {
            let parsed = parse_type(&ty).map_err(|message| DocumentError::Type {
                text: ty.clone(),
                message,
            })?;
            NodeKind::Constant { ty: parsed }
        }
        KindDoc::Assign => NodeKind::Assign,
        KindDoc::CreateCell => NodeKind::CreateCell,
        KindDoc::CreateCopy => NodeKind::CreateCopy,
        KindDoc::Drop => NodeKind::Drop,
        KindDoc::ExchangeValues => NodeKind::ExchangeValues,
        KindDoc::ExplicitBorrow { mode, .. } => NodeKind::ExplicitBorrow {
            mode: mode.into(),
            auto: false,
        },
        KindDoc::ExplicitUnborrow { mode } => NodeKind::ExplicitUnborrow { mode: mode.into() },
        KindDoc::ImmutablePassthrough => NodeKind::ImmutablePassthrough,
        KindDoc::MutablePassthrough => NodeKind::MutablePassthrough,
        KindDoc::MutatingBinary { op } => NodeKind::MutatingBinaryPrimitive { op },
        KindDoc::MutatingUnary { op } => NodeKind::MutatingUnaryPrimitive { op },
        KindDoc::Output => NodeKind::Output,
        KindDoc::PureBinary { op } => NodeKind::PureBinaryPrimitive { op },
        KindDoc::PureUnary { op } => NodeKind::PureUnaryPrimitive { op },
        KindDoc::Range => NodeKind::Range,
        KindDoc::SelectReference => NodeKind::SelectReference,
        KindDoc::SomeConstructor => NodeKind::SomeConstructor,
        KindDoc::TerminateLifetime { .. } => {
            NodeKind::TerminateLifetime(TerminateLifetimeState::default())
        }
        KindDoc::VectorCreate => NodeKind::VectorCreate,
        KindDoc::VectorInsert => NodeKind::VectorInsert,
    })
}

/// `name.in0` / `name.out1` to the node terminal it names.
fn resolve_terminal(
    graph: &Graph,
    nodes: &HashMap<String, NodeId>,
    reference: &str,
) -> Result<TerminalId, DocumentError> {
    let bad = || DocumentError::BadTerminal(reference.to_string());
    let (name, port) = reference.rsplit_once('.').ok_or_else(bad)?;
    let node = nodes
        .get(name)
        .copied()
        .ok_or_else(|| DocumentError::UnknownName(name.to_string()))?;
    let (side, index) = if let Some(i) = port.strip_prefix("out") {
        (&graph.node(node).outputs, i)
    } else if let Some(i) = port.strip_prefix("in") {
        (&graph.node(node).inputs, i)
    } else {
        return Err(bad());
    };
    let index: usize = index.parse().map_err(|_| bad())?;
    side.get(index).copied().ok_or_else(bad)
}

// ── Tests ───────────────────────────────────────────────────────────────────
