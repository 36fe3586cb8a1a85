// facade.rs — Terminal facades and reference-input groups
//
// A facade describes how a terminal arrives at the variable its node really
// operates on. The facade variable is what is wired to the terminal; the true
// variable is what the node sees once any auto-borrow has been decided.
// Simple facades never distinguish the two.

use crate::id::TerminalId;
use crate::variable::{Lifetime, VariableRef};

/// What a reference-input group demands of its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputReferenceMutability {
    RequireMutable,
    AllowImmutable,
    /// Mutable if every input can be, immutable otherwise.
    Polymorphic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacadeKind {
    Simple,
    ReferenceInput { group: usize },
    /// An output that hands back the reference taken by `input`.
    TerminateLifetimeOutput { input: TerminalId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Pending,
    Resolved,
}

#[derive(Debug, Clone)]
pub struct TerminalFacade {
    pub kind: FacadeKind,
    facade: Option<VariableRef>,
    true_variable: Option<VariableRef>,
    resolution: Resolution,
}

impl TerminalFacade {
    pub fn new(kind: FacadeKind) -> Self {
        Self {
            kind,
            facade: None,
            true_variable: None,
            resolution: match kind {
                FacadeKind::ReferenceInput { .. } => Resolution::Pending,
                _ => Resolution::Resolved,
            },
        }
    }

    pub fn simple() -> Self {
        Self::new(FacadeKind::Simple)
    }

    pub fn facade_variable(&self) -> Option<VariableRef> {
        self.facade
    }

    pub fn true_variable(&self) -> Option<VariableRef> {
        self.true_variable
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Set one variable as both facade and true variable.
    pub fn set_variable(&mut self, variable: Option<VariableRef>) {
        self.assert_unsettled();
        self.facade = variable;
        self.true_variable = variable;
    }

    /// Set facade and true variables independently. Used for reference
    /// inputs before their borrow is decided and for terminate outputs that
    /// mirror such an input.
    pub fn set_variables(&mut self, facade: Option<VariableRef>, true_variable: Option<VariableRef>) {
        self.assert_unsettled();
        self.facade = facade;
        self.true_variable = true_variable;
    }

    /// Point a terminal at the node spliced in front of or behind it. The
    /// terminal now reads or writes `variable` directly, so both sides
    /// collapse onto it. This is the one change a settled facade accepts.
    pub fn rebind_after_splice(&mut self, variable: VariableRef) {
        self.facade = Some(variable);
        self.true_variable = Some(variable);
        self.resolution = Resolution::Resolved;
    }

    /// Resolved and bound to a variable.
    pub fn is_settled(&self) -> bool {
        self.resolution == Resolution::Resolved
            && (self.facade.is_some() || self.true_variable.is_some())
    }

    fn assert_unsettled(&self) {
        debug_assert!(
            !self.is_settled(),
            "resolved facade rebound outside a splice: {:?}",
            self.kind
        );
    }

    /// Close the borrow decision. Later calls are ignored: a resolved facade
    /// only changes its variables again through `rebind_after_splice`.
    pub fn resolve(&mut self) -> bool {
        if self.resolution == Resolution::Resolved {
            return false;
        }
        self.resolution = Resolution::Resolved;
        true
    }
}

/// One member of a reference-input group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupMember {
    pub input: TerminalId,
    pub terminate_output: Option<TerminalId>,
}

/// Outcome of the four-case borrow decision for one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorrowDecision {
    pub mutable: bool,
    pub borrow_required: bool,
    pub lifetime: Lifetime,
}

/// Input terminals that share a single borrow decision.
#[derive(Debug, Clone)]
pub struct ReferenceInputGroup {
    pub mutability: InputReferenceMutability,
    pub members: Vec<GroupMember>,
    pub decision: Option<BorrowDecision>,
}

impl ReferenceInputGroup {
    pub fn new(mutability: InputReferenceMutability) -> Self {
        Self {
            mutability,
            members: Vec::new(),
            decision: None,
        }
    }
}

/// Per-node facade state: the node's reference-input groups.
#[derive(Debug, Clone, Default)]
pub struct NodeFacade {
    pub groups: Vec<ReferenceInputGroup>,
}
