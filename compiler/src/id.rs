// id.rs — Stable arena identifiers for graph elements
//
// Every graph element lives in an arena owned by `Graph` and is addressed by
// a newtype index. Indices are allocated in creation order and never reused,
// so a snapshot of ids taken before a rewriting pass stays valid while the
// pass appends new elements.

use std::fmt;

/// A diagram: the root function body or the body of a structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiagramId(pub u32);

/// A node (including border nodes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// A terminal on a node or on a wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TerminalId(pub u32);

/// A wire (one source, one or more sinks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WireId(pub u32);

/// A structure (frame or loop) owning one nested diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructureId(pub u32);

impl fmt::Display for DiagramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for TerminalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

impl fmt::Display for StructureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Monotonic allocator for arena ids. One counter per id kind keeps the
/// numbering dense and deterministic.
#[derive(Debug, Default, Clone)]
pub struct IdAllocator {
    next_diagram: u32,
    next_node: u32,
    next_terminal: u32,
    next_wire: u32,
    next_structure: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_diagram(&mut self) -> DiagramId {
        let id = DiagramId(self.next_diagram);
        self.next_diagram += 1;
        id
    }

    pub fn alloc_node(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    pub fn alloc_terminal(&mut self) -> TerminalId {
        let id = TerminalId(self.next_terminal);
        self.next_terminal += 1;
        id
    }

    pub fn alloc_wire(&mut self) -> WireId {
        let id = WireId(self.next_wire);
        self.next_wire += 1;
        id
    }

    pub fn alloc_structure(&mut self) -> StructureId {
        let id = StructureId(self.next_structure);
        self.next_structure += 1;
        id
    }
}
