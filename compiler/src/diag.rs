// diag.rs — Unified diagnostics model
//
// Provides the diagnostic types every analysis stage reports through. A
// diagnostic is attached to a graph element rather than a source span: the
// analysis never aborts on user errors, it records them here and continues.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::id::{NodeId, StructureId, TerminalId, WireId};

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0201`, `W0600`).
///
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    // Connectivity
    pub const REQUIRED_TERMINAL_UNCONNECTED: DiagCode = DiagCode("E0100");
    pub const WIRE_LOOSE_ENDS: DiagCode = DiagCode("E0101");
    pub const WIRE_CANNOT_FORK: DiagCode = DiagCode("E0102");

    // Types and ownership
    pub const TYPE_CONFLICT: DiagCode = DiagCode("E0200");
    pub const TERMINAL_DOES_NOT_ACCEPT_IMMUTABLE: DiagCode = DiagCode("E0201");
    pub const TERMINAL_DOES_NOT_ACCEPT_REFERENCE: DiagCode = DiagCode("E0202");
    pub const REFERENCE_DOES_NOT_LIVE_LONG_ENOUGH: DiagCode = DiagCode("E0203");

    // Lifetimes
    pub const TERMINATE_LIFETIME_INPUTS_NOT_UNIQUE: DiagCode = DiagCode("E0300");
    pub const TERMINATE_LIFETIME_CANNOT_BE_TERMINATED: DiagCode = DiagCode("E0301");
    pub const TERMINATE_LIFETIME_NOT_ALL_CONNECTED: DiagCode = DiagCode("E0302");
    pub const TERMINATE_TUNNEL_UNPAIRED: DiagCode = DiagCode("E0303");
    pub const UNWRAP_OPTION_MUST_BE_INPUT: DiagCode = DiagCode("E0304");

    // Features
    pub const FEATURE_NOT_ENABLED: DiagCode = DiagCode("E0400");

    // Normalization
    pub const EXPLICIT_BORROW_STRUCTURE_UNSUPPORTED: DiagCode = DiagCode("W0600");
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Target ───────────────────────────────────────────────────────────────

/// The graph element a diagnostic is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagTarget {
    Terminal(TerminalId),
    Node(NodeId),
    Wire(WireId),
    Structure(StructureId),
}

impl fmt::Display for DiagTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagTarget::Terminal(t) => write!(f, "{t}"),
            DiagTarget::Node(n) => write!(f, "{n}"),
            DiagTarget::Wire(w) => write!(f, "{w}"),
            DiagTarget::Structure(s) => write!(f, "{s}"),
        }
    }
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A diagnostic emitted by any stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub target: DiagTarget,
    pub message: String,
    pub hint: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code or hint.
    pub fn new(level: DiagLevel, target: DiagTarget, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            target,
            message: message.into(),
            hint: None,
        }
    }

    pub fn error(target: DiagTarget, code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, target, message).with_code(code)
    }

    pub fn warning(target: DiagTarget, code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, target, message).with_code(code)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}: {}", level, code, self.target, self.message)?;
        } else {
            write!(f, "{}: {}: {}", level, self.target, self.message)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

// ── Sink ─────────────────────────────────────────────────────────────────

/// Ordered collection of diagnostics for one analysis run.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.items.extend(diagnostics);
    }

    /// The graph has at least one error-level diagnostic.
    pub fn is_broken(&self) -> bool {
        self.items.iter().any(Diagnostic::is_error)
    }

    pub fn for_target(&self, target: DiagTarget) -> impl Iterator<Item = &Diagnostic> + '_ {
        self.items.iter().filter(move |d| d.target == target)
    }

    pub fn with_code(&self, code: DiagCode) -> impl Iterator<Item = &Diagnostic> + '_ {
        self.items.iter().filter(move |d| d.code == Some(code))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_error()).count()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
