// graph.rs — Arena graph of diagrams, nodes, terminals, wires and structures
//
// The compilation unit every stage works on. Elements live in arenas and are
// addressed by the ids in `id.rs`; rewriting stages append new elements and
// never invalidate existing ids. Border nodes belong to a structure and carry
// terminals in both the outer and the inner diagram.
//
// Preconditions: none (built incrementally through the mutation API).
// Postconditions: every terminal is owned by exactly one node or wire;
//                 connections are symmetric.
// Failure modes: ids from another graph index out of bounds (programmer error).
// Side effects: none.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::Deserialize;

use crate::facade::{NodeFacade, TerminalFacade};
use crate::id::{DiagramId, IdAllocator, NodeId, StructureId, TerminalId, WireId};
use crate::types::{BorrowMode, Type};
use crate::variable::{VariableRef, Variables};

// ── Node kinds ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    pub fn expected_input_type(self) -> Type {
        match self {
            BinaryOp::Add
            | BinaryOp::Subtract
            | BinaryOp::Multiply
            | BinaryOp::Divide
            | BinaryOp::Modulus => Type::Int32,
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => Type::Boolean,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Subtract => "subtract",
            BinaryOp::Multiply => "multiply",
            BinaryOp::Divide => "divide",
            BinaryOp::Modulus => "modulus",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Increment,
    Not,
}

impl UnaryOp {
    pub fn expected_input_type(self) -> Type {
        match self {
            UnaryOp::Increment => Type::Int32,
            UnaryOp::Not => Type::Boolean,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Increment => "increment",
            UnaryOp::Not => "not",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureKind {
    Frame,
    Loop,
}

/// Why a terminate-lifetime node could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TerminateLifetimeError {
    #[default]
    NoError,
    InputLifetimesNotUnique,
    InputLifetimeCannotBeTerminated,
    NotAllVariablesInLifetimeConnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TerminateLifetimeState {
    pub error: TerminateLifetimeError,
    pub required_inputs: Option<usize>,
    pub required_outputs: Option<usize>,
}

/// Every node kind the analysis knows, border nodes included. Each stage
/// matches on this exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Constant { ty: Type },
    Assign,
    CreateCell,
    CreateCopy,
    Drop,
    ExchangeValues,
    ExplicitBorrow { mode: BorrowMode, auto: bool },
    ExplicitUnborrow { mode: BorrowMode },
    ImmutablePassthrough,
    MutablePassthrough,
    MutatingBinaryPrimitive { op: BinaryOp },
    MutatingUnaryPrimitive { op: UnaryOp },
    Output,
    PureBinaryPrimitive { op: BinaryOp },
    PureUnaryPrimitive { op: UnaryOp },
    Range,
    SelectReference,
    SomeConstructor,
    TerminateLifetime(TerminateLifetimeState),
    VectorCreate,
    VectorInsert,
    // ── Border nodes ──
    Tunnel,
    BorrowTunnel { mutable: bool },
    LockTunnel,
    IterateTunnel,
    LoopConditionTunnel,
    UnwrapOptionTunnel,
    TerminateLifetimeTunnel { begin: NodeId },
}

impl NodeKind {
    pub fn is_border(&self) -> bool {
        matches!(
            self,
            NodeKind::Tunnel
                | NodeKind::BorrowTunnel { .. }
                | NodeKind::LockTunnel
                | NodeKind::IterateTunnel
                | NodeKind::LoopConditionTunnel
                | NodeKind::UnwrapOptionTunnel
                | NodeKind::TerminateLifetimeTunnel { .. }
        )
    }

    /// Border nodes that only make sense in one direction.
    pub fn fixed_direction(&self) -> Option<Direction> {
        match self {
            NodeKind::BorrowTunnel { .. }
            | NodeKind::LockTunnel
            | NodeKind::IterateTunnel
            | NodeKind::LoopConditionTunnel => Some(Direction::Input),
            NodeKind::TerminateLifetimeTunnel { .. } => Some(Direction::Output),
            _ => None,
        }
    }

    /// Border nodes that open a lifetime a terminate-lifetime tunnel may close.
    pub fn begins_lifetime(&self) -> bool {
        matches!(self, NodeKind::BorrowTunnel { .. } | NodeKind::LockTunnel)
    }

    /// Declared input and output terminal types. `void` stands for "any".
    pub fn signature(&self) -> (Vec<Type>, Vec<Type>) {
        let any = || Type::Void;
        let imm = |t: Type| Type::immutable_reference(t);
        let mutr = |t: Type| Type::mutable_reference(t);
        match self {
            NodeKind::Constant { ty } => (vec![], vec![ty.clone()]),
            NodeKind::Assign => (vec![mutr(any()), any()], vec![mutr(any())]),
            NodeKind::CreateCell => (vec![any()], vec![Type::non_locking_cell(any())]),
            NodeKind::CreateCopy => (vec![imm(any())], vec![imm(any()), any()]),
            NodeKind::Drop => (vec![any()], vec![]),
            NodeKind::ExchangeValues => (
                vec![mutr(any()), mutr(any())],
                vec![mutr(any()), mutr(any())],
            ),
            NodeKind::ExplicitBorrow { mode, .. } => {
                let input = match mode {
                    BorrowMode::MutableToImmutable => mutr(any()),
                    _ => any(),
                };
                (vec![input], vec![Type::reference(any(), mode.is_mutable())])
            }
            NodeKind::ExplicitUnborrow { mode } => match mode {
                BorrowMode::MutableToImmutable => (vec![imm(any())], vec![mutr(any())]),
                _ => (vec![Type::reference(any(), mode.is_mutable())], vec![any()]),
            },
            NodeKind::ImmutablePassthrough => (vec![imm(any())], vec![imm(any())]),
            NodeKind::MutablePassthrough => (vec![mutr(any())], vec![mutr(any())]),
            NodeKind::MutatingBinaryPrimitive { op } => {
                let t = op.expected_input_type();
                (
                    vec![mutr(t.clone()), imm(t.clone())],
                    vec![mutr(t.clone()), imm(t)],
                )
            }
            NodeKind::MutatingUnaryPrimitive { op } => {
                let t = op.expected_input_type();
                (vec![mutr(t.clone())], vec![mutr(t)])
            }
            NodeKind::Output => (vec![imm(Type::Int32)], vec![imm(Type::Int32)]),
            NodeKind::PureBinaryPrimitive { op } => {
                let t = op.expected_input_type();
                (
                    vec![imm(t.clone()), imm(t.clone())],
                    vec![imm(t.clone()), imm(t.clone()), t],
                )
            }
            NodeKind::PureUnaryPrimitive { op } => {
                let t = op.expected_input_type();
                (vec![imm(t.clone())], vec![imm(t.clone()), t])
            }
            NodeKind::Range => (
                vec![Type::Int32, Type::Int32],
                vec![Type::iterator(Type::Int32)],
            ),
            NodeKind::SelectReference => (
                vec![imm(Type::Boolean), imm(any()), imm(any())],
                vec![imm(Type::Boolean), imm(any())],
            ),
            NodeKind::SomeConstructor => (vec![any()], vec![Type::option(any())]),
            NodeKind::TerminateLifetime(_) => (vec![imm(any())], vec![any()]),
            NodeKind::VectorCreate => (vec![], vec![Type::vector(Type::Int32)]),
            NodeKind::VectorInsert => (
                vec![mutr(Type::vector(any())), imm(Type::Int32), any()],
                vec![mutr(Type::vector(any())), imm(Type::Int32)],
            ),
            NodeKind::Tunnel => (vec![any()], vec![any()]),
            NodeKind::BorrowTunnel { mutable } => {
                (vec![any()], vec![Type::reference(any(), *mutable)])
            }
            NodeKind::LockTunnel => (vec![imm(Type::locking_cell(any()))], vec![mutr(any())]),
            NodeKind::IterateTunnel => (vec![mutr(Type::iterator(any()))], vec![any()]),
            NodeKind::LoopConditionTunnel => (vec![Type::Boolean], vec![mutr(Type::Boolean)]),
            NodeKind::UnwrapOptionTunnel => (vec![Type::option(any())], vec![any()]),
            NodeKind::TerminateLifetimeTunnel { .. } => (vec![], vec![any()]),
        }
    }

    /// Input/output index pairs that denote the same value.
    pub fn passthrough_pairs(&self) -> &'static [(usize, usize)] {
        match self {
            NodeKind::Assign
            | NodeKind::CreateCopy
            | NodeKind::ImmutablePassthrough
            | NodeKind::MutablePassthrough
            | NodeKind::MutatingUnaryPrimitive { .. }
            | NodeKind::Output
            | NodeKind::PureUnaryPrimitive { .. }
            | NodeKind::SelectReference => &[(0, 0)],
            NodeKind::ExchangeValues
            | NodeKind::MutatingBinaryPrimitive { .. }
            | NodeKind::PureBinaryPrimitive { .. }
            | NodeKind::VectorInsert => &[(0, 0), (1, 1)],
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
            | NodeKind::LockTunnel
            | NodeKind::IterateTunnel
            | NodeKind::LoopConditionTunnel
            | NodeKind::UnwrapOptionTunnel
            | NodeKind::TerminateLifetimeTunnel { .. } => &[],
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Constant { ty } => write!(f, "constant<{ty}>"),
            NodeKind::Assign => write!(f, "assign"),
            NodeKind::CreateCell => write!(f, "create_cell"),
            NodeKind::CreateCopy => write!(f, "create_copy"),
            NodeKind::Drop => write!(f, "drop"),
            NodeKind::ExchangeValues => write!(f, "exchange_values"),
            NodeKind::ExplicitBorrow { mode, auto } => {
                write!(f, "explicit_borrow({}", mode.name())?;
                if *auto {
                    write!(f, ", auto")?;
                }
                write!(f, ")")
            }
            NodeKind::ExplicitUnborrow { mode } => write!(f, "explicit_unborrow({})", mode.name()),
            NodeKind::ImmutablePassthrough => write!(f, "immutable_passthrough"),
            NodeKind::MutablePassthrough => write!(f, "mutable_passthrough"),
            NodeKind::MutatingBinaryPrimitive { op } => write!(f, "mutating_binary({})", op.name()),
            NodeKind::MutatingUnaryPrimitive { op } => write!(f, "mutating_unary({})", op.name()),
            NodeKind::Output => write!(f, "output"),
            NodeKind::PureBinaryPrimitive { op } => write!(f, "pure_binary({})", op.name()),
            NodeKind::PureUnaryPrimitive { op } => write!(f, "pure_unary({})", op.name()),
            NodeKind::Range => write!(f, "range"),
            NodeKind::SelectReference => write!(f, "select_reference"),
            NodeKind::SomeConstructor => write!(f, "some_constructor"),
            NodeKind::TerminateLifetime(_) => write!(f, "terminate_lifetime"),
            NodeKind::VectorCreate => write!(f, "vector_create"),
            NodeKind::VectorInsert => write!(f, "vector_insert"),
            NodeKind::Tunnel => write!(f, "tunnel"),
            NodeKind::BorrowTunnel { mutable: true } => write!(f, "borrow_tunnel(mut)"),
            NodeKind::BorrowTunnel { mutable: false } => write!(f, "borrow_tunnel"),
            NodeKind::LockTunnel => write!(f, "lock_tunnel"),
            NodeKind::IterateTunnel => write!(f, "iterate_tunnel"),
            NodeKind::LoopConditionTunnel => write!(f, "loop_condition_tunnel"),
            NodeKind::UnwrapOptionTunnel => write!(f, "unwrap_option_tunnel"),
            NodeKind::TerminateLifetimeTunnel { begin } => {
                write!(f, "terminate_lifetime_tunnel({begin})")
            }
        }
    }
}

// ── Graph elements ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalOwner {
    Node(NodeId),
    Wire(WireId),
}

#[derive(Debug, Clone)]
pub struct Terminal {
    pub id: TerminalId,
    pub owner: TerminalOwner,
    pub direction: Direction,
    pub declared: Type,
    pub diagram: DiagramId,
    pub connected: Option<TerminalId>,
    pub facade: TerminalFacade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Border {
    pub structure: StructureId,
    pub direction: Direction,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    /// For border nodes, the diagram outside the structure.
    pub diagram: DiagramId,
    pub inputs: Vec<TerminalId>,
    pub outputs: Vec<TerminalId>,
    pub border: Option<Border>,
    pub facade: NodeFacade,
}

#[derive(Debug, Clone)]
pub struct Wire {
    pub id: WireId,
    pub diagram: DiagramId,
    /// Wire terminal connected to the producing output.
    pub source: TerminalId,
    /// Wire terminals connected to consuming inputs.
    pub sinks: Vec<TerminalId>,
    pub begins_mutable_variable: bool,
    pub is_first_variable_wire: bool,
}

#[derive(Debug, Clone)]
pub struct Structure {
    pub id: StructureId,
    pub kind: StructureKind,
    pub diagram: DiagramId,
    pub inner: DiagramId,
    pub border_nodes: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DiagramItem {
    Node(NodeId),
    Wire(WireId),
    Structure(StructureId),
}

#[derive(Debug, Clone)]
pub struct Diagram {
    pub id: DiagramId,
    pub parent: Option<StructureId>,
    /// Nodes, wires and structures in insertion order. Border nodes are
    /// reached through their structure.
    pub items: Vec<DiagramItem>,
}

// ── Graph ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Graph {
    ids: IdAllocator,
    diagrams: Vec<Diagram>,
    nodes: Vec<Node>,
    terminals: Vec<Terminal>,
    wires: Vec<Wire>,
    structures: Vec<Structure>,
    pub variables: Variables,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// An empty graph with a root diagram.
    pub fn new() -> Self {
        let mut graph = Self {
            ids: IdAllocator::new(),
            diagrams: Vec::new(),
            nodes: Vec::new(),
            terminals: Vec::new(),
            wires: Vec::new(),
            structures: Vec::new(),
            variables: Variables::new(),
        };
        graph.new_diagram(None);
        graph
    }

    pub fn root(&self) -> DiagramId {
        DiagramId(0)
    }

    fn new_diagram(&mut self, parent: Option<StructureId>) -> DiagramId {
        let id = self.ids.alloc_diagram();
        self.diagrams.push(Diagram {
            id,
            parent,
            items: Vec::new(),
        });
        id
    }

    fn new_terminal(
        &mut self,
        owner: TerminalOwner,
        direction: Direction,
        declared: Type,
        diagram: DiagramId,
    ) -> TerminalId {
        let id = self.ids.alloc_terminal();
        self.terminals.push(Terminal {
            id,
            owner,
            direction,
            declared,
            diagram,
            connected: None,
            facade: TerminalFacade::simple(),
        });
        id
    }

    // ── Construction ──

    /// Add a node with the kind's default arity.
    pub fn add_node(&mut self, diagram: DiagramId, kind: NodeKind) -> NodeId {
        let (inputs, outputs) = kind.signature();
        self.insert_node(diagram, kind, inputs, outputs, None)
    }

    /// Add a node with explicit arity; extra terminals repeat the last
    /// declared type of their side.
    pub fn add_node_with_arity(
        &mut self,
        diagram: DiagramId,
        kind: NodeKind,
        inputs: usize,
        outputs: usize,
    ) -> NodeId {
        let (ins, outs) = kind.signature();
        let ins = resize_template(ins, inputs);
        let outs = resize_template(outs, outputs);
        self.insert_node(diagram, kind, ins, outs, None)
    }

    fn insert_node(
        &mut self,
        diagram: DiagramId,
        kind: NodeKind,
        input_types: Vec<Type>,
        output_types: Vec<Type>,
        border: Option<(Border, DiagramId)>,
    ) -> NodeId {
        let id = self.ids.alloc_node();
        let (in_diagram, out_diagram) = match border {
            Some((b, inner)) => match b.direction {
                Direction::Input => (diagram, inner),
                Direction::Output => (inner, diagram),
            },
            None => (diagram, diagram),
        };
        let inputs = input_types
            .into_iter()
            .map(|ty| self.new_terminal(TerminalOwner::Node(id), Direction::Input, ty, in_diagram))
            .collect();
        let outputs = output_types
            .into_iter()
            .map(|ty| self.new_terminal(TerminalOwner::Node(id), Direction::Output, ty, out_diagram))
            .collect();
        self.nodes.push(Node {
            id,
            kind,
            diagram,
            inputs,
            outputs,
            border: border.map(|(b, _)| b),
            facade: NodeFacade::default(),
        });
        if border.is_none() {
            self.diagrams[diagram.0 as usize]
                .items
                .push(DiagramItem::Node(id));
        }
        id
    }

    pub fn add_structure(&mut self, diagram: DiagramId, kind: StructureKind) -> StructureId {
        let id = self.ids.alloc_structure();
        let inner = self.new_diagram(Some(id));
        self.structures.push(Structure {
            id,
            kind,
            diagram,
            inner,
            border_nodes: Vec::new(),
        });
        self.diagrams[diagram.0 as usize]
            .items
            .push(DiagramItem::Structure(id));
        id
    }

    /// Add a border node. Kinds with a fixed direction ignore `direction`.
    pub fn add_border_node(
        &mut self,
        structure: StructureId,
        kind: NodeKind,
        direction: Direction,
    ) -> NodeId {
        let direction = kind.fixed_direction().unwrap_or(direction);
        let (outer, inner) = {
            let s = &self.structures[structure.0 as usize];
            (s.diagram, s.inner)
        };
        let (inputs, outputs) = kind.signature();
        let border = Border {
            structure,
            direction,
        };
        let id = self.insert_node(outer, kind, inputs, outputs, Some((border, inner)));
        self.structures[structure.0 as usize].border_nodes.push(id);
        id
    }

    /// Create a wire from `source` (a node output) to `sinks` (node inputs).
    pub fn wire_together(&mut self, source: TerminalId, sinks: &[TerminalId]) -> WireId {
        let diagram = self.terminal(source).diagram;
        let id = self.ids.alloc_wire();
        let owner = TerminalOwner::Wire(id);
        let wire_source = self.new_terminal(owner, Direction::Input, Type::Void, diagram);
        let wire_sinks: Vec<TerminalId> = sinks
            .iter()
            .map(|_| self.new_terminal(owner, Direction::Output, Type::Void, diagram))
            .collect();
        self.wires.push(Wire {
            id,
            diagram,
            source: wire_source,
            sinks: wire_sinks.clone(),
            begins_mutable_variable: false,
            is_first_variable_wire: false,
        });
        self.diagrams[diagram.0 as usize]
            .items
            .push(DiagramItem::Wire(id));
        self.connect(wire_source, source);
        for (&wire_sink, &sink) in wire_sinks.iter().zip(sinks) {
            self.connect(wire_sink, sink);
        }
        id
    }

    /// Connect two terminals, breaking any existing connection of either.
    pub fn connect(&mut self, a: TerminalId, b: TerminalId) {
        self.disconnect(a);
        self.disconnect(b);
        self.terminals[a.0 as usize].connected = Some(b);
        self.terminals[b.0 as usize].connected = Some(a);
    }

    pub fn disconnect(&mut self, t: TerminalId) {
        if let Some(other) = self.terminals[t.0 as usize].connected.take() {
            self.terminals[other.0 as usize].connected = None;
        }
    }

    /// Grow or shrink a node's terminal lists. Removed terminals are
    /// disconnected; added ones repeat the last declared type of their side.
    pub fn set_terminal_counts(&mut self, node: NodeId, inputs: usize, outputs: usize) {
        self.resize_side(node, Direction::Input, inputs);
        self.resize_side(node, Direction::Output, outputs);
    }

    fn resize_side(&mut self, node: NodeId, direction: Direction, count: usize) {
        let current = match direction {
            Direction::Input => self.node(node).inputs.clone(),
            Direction::Output => self.node(node).outputs.clone(),
        };
        if count == current.len() {
            return;
        }
        let mut terminals = current.clone();
        if count < current.len() {
            for &t in &current[count..] {
                self.disconnect(t);
            }
            terminals.truncate(count);
        } else {
            let (ty, diagram) = match current.last() {
                Some(&t) => (self.terminal(t).declared.clone(), self.terminal(t).diagram),
                None => (Type::Void, self.node(node).diagram),
            };
            for _ in current.len()..count {
                let t = self.new_terminal(TerminalOwner::Node(node), direction, ty.clone(), diagram);
                terminals.push(t);
            }
        }
        let n = self.node_mut(node);
        match direction {
            Direction::Input => n.inputs = terminals,
            Direction::Output => n.outputs = terminals,
        }
    }

    pub fn set_wire_begins_mutable(&mut self, wire: WireId, mutable: bool) {
        self.wire_mut(wire).begins_mutable_variable = mutable;
    }

    // ── Queries ──

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub fn terminal(&self, id: TerminalId) -> &Terminal {
        &self.terminals[id.0 as usize]
    }

    pub fn terminal_mut(&mut self, id: TerminalId) -> &mut Terminal {
        &mut self.terminals[id.0 as usize]
    }

    pub fn wire(&self, id: WireId) -> &Wire {
        &self.wires[id.0 as usize]
    }

    pub fn wire_mut(&mut self, id: WireId) -> &mut Wire {
        &mut self.wires[id.0 as usize]
    }

    pub fn structure(&self, id: StructureId) -> &Structure {
        &self.structures[id.0 as usize]
    }

    pub fn diagram(&self, id: DiagramId) -> &Diagram {
        &self.diagrams[id.0 as usize]
    }

    pub fn diagram_count(&self) -> usize {
        self.diagrams.len()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn wires(&self) -> &[Wire] {
        &self.wires
    }

    pub fn structures(&self) -> &[Structure] {
        &self.structures
    }

    pub fn connected(&self, t: TerminalId) -> Option<TerminalId> {
        self.terminal(t).connected
    }

    pub fn is_connected(&self, t: TerminalId) -> bool {
        self.terminal(t).connected.is_some()
    }

    /// The wire a node terminal is attached to, if any.
    pub fn attached_wire(&self, t: TerminalId) -> Option<WireId> {
        match self.connected(t).map(|c| self.terminal(c).owner) {
            Some(TerminalOwner::Wire(w)) => Some(w),
            _ => None,
        }
    }

    pub fn facade_variable(&self, t: TerminalId) -> Option<VariableRef> {
        self.terminal(t).facade.facade_variable()
    }

    pub fn true_variable(&self, t: TerminalId) -> Option<VariableRef> {
        self.terminal(t).facade.true_variable()
    }

    /// The variable a downstream consumer of `t` observes.
    pub fn connected_variable(&self, t: TerminalId) -> Option<VariableRef> {
        self.connected(t).and_then(|c| self.facade_variable(c))
    }

    /// Border nodes of `structure` whose values flow in `direction`.
    pub fn border_nodes(&self, structure: StructureId, direction: Direction) -> Vec<NodeId> {
        self.structure(structure)
            .border_nodes
            .iter()
            .copied()
            .filter(|&n| self.node(n).border.map(|b| b.direction) == Some(direction))
            .collect()
    }

    /// Whether the structure contains an unwrap-option tunnel (and so only
    /// runs its body conditionally).
    pub fn executes_conditionally(&self, structure: StructureId) -> bool {
        self.structure(structure)
            .border_nodes
            .iter()
            .any(|&n| matches!(self.node(n).kind, NodeKind::UnwrapOptionTunnel))
    }

    fn producer_item(&self, t: TerminalId) -> Option<DiagramItem> {
        let source = self.connected(t)?;
        match self.terminal(source).owner {
            TerminalOwner::Wire(w) => Some(DiagramItem::Wire(w)),
            TerminalOwner::Node(n) => match self.node(n).border {
                Some(b) => Some(DiagramItem::Structure(b.structure)),
                None => Some(DiagramItem::Node(n)),
            },
        }
    }

    fn item_inputs(&self, item: DiagramItem, diagram: DiagramId) -> Vec<TerminalId> {
        match item {
            DiagramItem::Node(n) => self.node(n).inputs.clone(),
            DiagramItem::Wire(w) => vec![self.wire(w).source],
            DiagramItem::Structure(s) => self
                .structure(s)
                .border_nodes
                .iter()
                .flat_map(|&n| self.node(n).inputs.iter().copied())
                .filter(|&t| self.terminal(t).diagram == diagram)
                .collect(),
        }
    }

    /// The diagram's items in dataflow order: every item comes after the
    /// items feeding it. Ties and cycles fall back to insertion order.
    pub fn dataflow_order(&self, diagram: DiagramId) -> Vec<DiagramItem> {
        let items = self.diagram(diagram).items.clone();
        let position: HashMap<DiagramItem, usize> =
            items.iter().enumerate().map(|(i, &item)| (item, i)).collect();

        let mut indegree = vec![0usize; items.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); items.len()];
        for (i, &item) in items.iter().enumerate() {
            let mut producers = BTreeSet::new();
            for t in self.item_inputs(item, diagram) {
                if let Some(p) = self.producer_item(t).and_then(|p| position.get(&p)) {
                    if *p != i {
                        producers.insert(*p);
                    }
                }
            }
            indegree[i] = producers.len();
            for p in producers {
                dependents[p].push(i);
            }
        }

        let mut ready: BTreeSet<usize> = (0..items.len()).filter(|&i| indegree[i] == 0).collect();
        let mut placed = vec![false; items.len()];
        let mut order = Vec::with_capacity(items.len());
        while let Some(i) = ready.pop_first() {
            placed[i] = true;
            order.push(items[i]);
            for &d in &dependents[i] {
                indegree[d] -= 1;
                if indegree[d] == 0 {
                    ready.insert(d);
                }
            }
        }
        for (i, &item) in items.iter().enumerate() {
            if !placed[i] {
                order.push(item);
            }
        }
        order
    }

    fn write_terminal(&self, f: &mut fmt::Formatter<'_>, t: TerminalId, indent: &str) -> fmt::Result {
        let term = self.terminal(t);
        let dir = match term.direction {
            Direction::Input => "in ",
            Direction::Output => "out",
        };
        write!(f, "{indent}{dir} {t}")?;
        if let Some(c) = term.connected {
            write!(f, " ~ {c}")?;
        }
        let show = |v: VariableRef| -> Option<String> {
            self.variables
                .has_set(v.diagram)
                .then(|| self.variables.get(v).to_string())
        };
        let facade = term.facade.facade_variable();
        let truev = term.facade.true_variable();
        match (facade, truev) {
            (Some(a), Some(b)) if self.variables.has_set(a.diagram) && !self.variables.same(a, b) => {
                if let (Some(a), Some(b)) = (show(a), show(b)) {
                    write!(f, " [{a}] => [{b}]")?;
                }
            }
            (_, Some(v)) | (Some(v), None) => {
                if let Some(s) = show(v) {
                    write!(f, " [{s}]")?;
                }
            }
            (None, None) => {}
        }
        writeln!(f)
    }

    fn write_diagram(&self, f: &mut fmt::Formatter<'_>, diagram: DiagramId, indent: &str) -> fmt::Result {
        let deeper = format!("{indent}    ");
        for item in &self.diagram(diagram).items {
            match *item {
                DiagramItem::Node(n) => {
                    writeln!(f, "{indent}{n} {}", self.node(n).kind)?;
                    for &t in self.node(n).inputs.iter().chain(&self.node(n).outputs) {
                        self.write_terminal(f, t, &deeper)?;
                    }
                }
                DiagramItem::Wire(w) => {
                    let wire = self.wire(w);
                    write!(f, "{indent}{w} wire")?;
                    if wire.begins_mutable_variable {
                        write!(f, " mut")?;
                    }
                    writeln!(f)?;
                    for &t in std::iter::once(&wire.source).chain(&wire.sinks) {
                        self.write_terminal(f, t, &deeper)?;
                    }
                }
                DiagramItem::Structure(s) => {
                    let st = self.structure(s);
                    writeln!(f, "{indent}{s} {:?} -> {}", st.kind, st.inner)?;
                    for &n in &st.border_nodes {
                        writeln!(f, "{deeper}{n} {}", self.node(n).kind)?;
                        let terms = format!("{deeper}    ");
                        for &t in self.node(n).inputs.iter().chain(&self.node(n).outputs) {
                            self.write_terminal(f, t, &terms)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for d in &self.diagrams {
            match d.parent {
                Some(s) => writeln!(f, "{} (in {s}):", d.id)?,
                None => writeln!(f, "{}:", d.id)?,
            }
            self.write_diagram(f, d.id, "  ")?;
        }
        Ok(())
    }
}

fn resize_template(mut types: Vec<Type>, count: usize) -> Vec<Type> {
    let fill = types.last().cloned().unwrap_or(Type::Void);
    types.resize(count, fill);
    types
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(g: &mut Graph, d: DiagramId) -> NodeId {
        g.add_node(d, NodeKind::Constant { ty: Type::Int32 })
    }

    #[test]
    fn wire_connects_both_ends() {
        let mut g = Graph::new();
        let root = g.root();
        let c = constant(&mut g, root);
        let p = g.add_node(root, NodeKind::ImmutablePassthrough);
        let out = g.node(c).outputs[0];
        let inp = g.node(p).inputs[0];
        let w = g.wire_together(out, &[inp]);
        let wire = g.wire(w);
        assert_eq!(g.connected(wire.source), Some(out));
        assert_eq!(g.connected(wire.sinks[0]), Some(inp));
        assert_eq!(g.attached_wire(inp), Some(w));
        assert_eq!(g.attached_wire(out), Some(w));
    }

    #[test]
    fn connect_breaks_previous_link() {
        let mut g = Graph::new();
        let root = g.root();
        let c = constant(&mut g, root);
        let a = g.add_node(root, NodeKind::Drop);
        let b = g.add_node(root, NodeKind::Drop);
        let out = g.node(c).outputs[0];
        let a_in = g.node(a).inputs[0];
        let b_in = g.node(b).inputs[0];
        g.connect(out, a_in);
        g.connect(out, b_in);
        assert!(!g.is_connected(a_in));
        assert_eq!(g.connected(out), Some(b_in));
    }

    #[test]
    fn dataflow_order_puts_producers_first() {
        let mut g = Graph::new();
        let root = g.root();
        let drop = g.add_node(root, NodeKind::Drop);
        let c = constant(&mut g, root);
        let w = g.wire_together(g.node(c).outputs[0], &[g.node(drop).inputs[0]]);
        let order = g.dataflow_order(root);
        assert_eq!(
            order,
            vec![DiagramItem::Node(c), DiagramItem::Wire(w), DiagramItem::Node(drop)]
        );
    }

    #[test]
    fn dataflow_order_treats_structure_as_one_item() {
        let mut g = Graph::new();
        let root = g.root();
        let s = g.add_structure(root, StructureKind::Frame);
        let tunnel = g.add_border_node(s, NodeKind::Tunnel, Direction::Input);
        let c = constant(&mut g, root);
        let w = g.wire_together(g.node(c).outputs[0], &[g.node(tunnel).inputs[0]]);
        assert_eq!(
            g.dataflow_order(root),
            vec![
                DiagramItem::Node(c),
                DiagramItem::Wire(w),
                DiagramItem::Structure(s)
            ]
        );
    }

    #[test]
    fn border_terminals_live_on_both_sides() {
        let mut g = Graph::new();
        let root = g.root();
        let s = g.add_structure(root, StructureKind::Loop);
        let inner = g.structure(s).inner;
        let t_in = g.add_border_node(s, NodeKind::Tunnel, Direction::Input);
        let t_out = g.add_border_node(s, NodeKind::Tunnel, Direction::Output);
        assert_eq!(g.terminal(g.node(t_in).inputs[0]).diagram, root);
        assert_eq!(g.terminal(g.node(t_in).outputs[0]).diagram, inner);
        assert_eq!(g.terminal(g.node(t_out).inputs[0]).diagram, inner);
        assert_eq!(g.terminal(g.node(t_out).outputs[0]).diagram, root);
        assert_eq!(g.border_nodes(s, Direction::Input), vec![t_in]);
        assert_eq!(g.border_nodes(s, Direction::Output), vec![t_out]);
    }

    #[test]
    fn fixed_direction_overrides_request() {
        let mut g = Graph::new();
        let root = g.root();
        let s = g.add_structure(root, StructureKind::Frame);
        let borrow = g.add_border_node(s, NodeKind::BorrowTunnel { mutable: false }, Direction::Output);
        assert_eq!(g.node(borrow).border.map(|b| b.direction), Some(Direction::Input));
    }

    #[test]
    fn resize_disconnects_removed_terminals() {
        let mut g = Graph::new();
        let root = g.root();
        let c = constant(&mut g, root);
        let term = g.add_node_with_arity(
            root,
            NodeKind::TerminateLifetime(TerminateLifetimeState::default()),
            2,
            1,
        );
        let second = g.node(term).inputs[1];
        g.wire_together(g.node(c).outputs[0], &[second]);
        g.set_terminal_counts(term, 1, 3);
        assert_eq!(g.node(term).inputs.len(), 1);
        assert_eq!(g.node(term).outputs.len(), 3);
        assert!(!g.is_connected(second));
    }

    #[test]
    fn passthrough_pairs_fit_signatures() {
        let kinds = [
            NodeKind::Assign,
            NodeKind::CreateCopy,
            NodeKind::ExchangeValues,
            NodeKind::MutatingBinaryPrimitive { op: BinaryOp::Add },
            NodeKind::PureBinaryPrimitive { op: BinaryOp::And },
            NodeKind::PureUnaryPrimitive { op: UnaryOp::Not },
            NodeKind::SelectReference,
            NodeKind::VectorInsert,
        ];
        for kind in kinds {
            let (ins, outs) = kind.signature();
            for &(i, o) in kind.passthrough_pairs() {
                assert!(i < ins.len() && o < outs.len(), "{kind}");
            }
        }
    }
}
