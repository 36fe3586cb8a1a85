// validate.rs — Usage validator
//
// Re-walks the typed graph and checks, per node kind, that every input is
// used the way the node needs it: mutable where it writes, owned where it
// consumes, of the expected underlying type, and within its lifetime. Wires
// are checked for loose ends and for fan-out of values that cannot be
// copied. Failed checks become diagnostics; nothing here stops the walk.
//
// Preconditions: `set_types` has run.
// Postconditions: the graph is unchanged.
// Failure modes: cancellation.
// Side effects: none.

use crate::diag::{codes, DiagTarget, Diagnostic, Diagnostics};
use crate::graph::{Direction, Graph, NodeKind, TerminalOwner, TerminateLifetimeError};
use crate::id::{NodeId, TerminalId, WireId};
use crate::options::FeatureToggles;
use crate::types::{BorrowMode, Type};
use crate::variable::{Lifetime, VariableRef};
use crate::visit::{walk, AnalysisError, CancellationToken, GraphVisitor};

// ── Public entry point ──────────────────────────────────────────────────────

/// Validate the whole graph and return the diagnostics found.
pub fn validate(
    graph: &mut Graph,
    features: FeatureToggles,
    cancel: &CancellationToken,
) -> Result<Diagnostics, AnalysisError> {
    let mut ctx = ValidateCtx {
        features,
        diagnostics: Diagnostics::new(),
    };
    walk(graph, &mut ctx, cancel)?;
    log::debug!(
        "validate: {} diagnostics ({} errors)",
        ctx.diagnostics.len(),
        ctx.diagnostics.error_count()
    );
    Ok(ctx.diagnostics)
}

struct ValidateCtx {
    features: FeatureToggles,
    diagnostics: Diagnostics,
}

impl GraphVisitor for ValidateCtx {
    fn visit_node(&mut self, graph: &mut Graph, node: NodeId) -> Result<(), AnalysisError> {
        check_node(graph, node, self.features, &mut self.diagnostics);
        Ok(())
    }

    fn visit_wire(&mut self, graph: &mut Graph, wire: WireId) -> Result<(), AnalysisError> {
        check_wire(graph, wire, &mut self.diagnostics);
        Ok(())
    }
}

// ── Usage validator ─────────────────────────────────────────────────────────

/// Checks against the variable wired to one input terminal. Construction
/// already reports an unwired required terminal and a reference used outside
/// its lifetime; every `test_*` method is a no-op returning `false` when the
/// terminal has no variable to check.
pub struct UsageValidator<'g> {
    graph: &'g Graph,
    terminal: TerminalId,
    variable: Option<VariableRef>,
}

impl<'g> UsageValidator<'g> {
    /// A required input, checked for connection and lifetime.
    pub fn new(graph: &'g Graph, terminal: TerminalId, diags: &mut Diagnostics) -> Self {
        Self::with_checks(graph, terminal, true, true, diags)
    }

    pub fn with_checks(
        graph: &'g Graph,
        terminal: TerminalId,
        required: bool,
        within_lifetime: bool,
        diags: &mut Diagnostics,
    ) -> Self {
        if required && !graph.is_connected(terminal) {
            diags.push(
                Diagnostic::error(
                    DiagTarget::Terminal(terminal),
                    codes::REQUIRED_TERMINAL_UNCONNECTED,
                    "required terminal is not wired",
                )
                .with_hint("wire a value to this terminal"),
            );
        }
        let variable = graph
            .is_connected(terminal)
            .then(|| graph.facade_variable(terminal))
            .flatten();
        let validator = Self {
            graph,
            terminal,
            variable,
        };
        if within_lifetime {
            validator.check_usage_within_lifetime(diags);
        }
        validator
    }

    fn check_usage_within_lifetime(&self, diags: &mut Diagnostics) {
        let Some(v) = self.variable else {
            return;
        };
        let var = self.graph.variables.get(v);
        if var.ty.is_reference() && var.lifetime == Lifetime::Empty {
            diags.push(Diagnostic::error(
                DiagTarget::Terminal(self.terminal),
                codes::REFERENCE_DOES_NOT_LIVE_LONG_ENOUGH,
                format!("wired reference `{}` does not live long enough", var.ty),
            ));
        }
    }

    fn node_target(&self) -> DiagTarget {
        match self.graph.terminal(self.terminal).owner {
            TerminalOwner::Node(n) => DiagTarget::Node(n),
            TerminalOwner::Wire(w) => DiagTarget::Wire(w),
        }
    }

    /// Underlying type of the wired value, if there is one.
    pub fn underlying_type(&self) -> Option<&'g Type> {
        self.variable
            .map(|v| self.graph.variables.get(v).ty.underlying())
    }

    pub fn test_is_mutable(&self, diags: &mut Diagnostics) -> bool {
        let Some(v) = self.variable else {
            return false;
        };
        let var = self.graph.variables.get(v);
        let mutable = if var.ty.is_reference() {
            var.ty.is_mutable_reference()
        } else {
            var.mutable
        };
        if !mutable {
            diags.push(
                Diagnostic::error(
                    self.node_target(),
                    codes::TERMINAL_DOES_NOT_ACCEPT_IMMUTABLE,
                    format!("{} needs a mutable value, found `{}`", self.terminal, var.ty),
                )
                .with_hint("mark the producing wire `mutable` or borrow mutably"),
            );
        }
        mutable
    }

    pub fn test_is_owned(&self, diags: &mut Diagnostics) -> bool {
        let Some(v) = self.variable else {
            return false;
        };
        let ty = &self.graph.variables.get(v).ty;
        if ty.is_reference() {
            diags.push(Diagnostic::error(
                self.node_target(),
                codes::TERMINAL_DOES_NOT_ACCEPT_REFERENCE,
                format!("{} needs an owned value, found `{ty}`", self.terminal),
            ));
            return false;
        }
        true
    }

    pub fn test_expected_underlying_type(&self, expected: &Type, diags: &mut Diagnostics) -> bool {
        self.test_underlying_type(|t| t == expected, expected, diags)
    }

    /// `example` names the expected type in the diagnostic.
    pub fn test_underlying_type(
        &self,
        predicate: impl Fn(&Type) -> bool,
        example: &Type,
        diags: &mut Diagnostics,
    ) -> bool {
        let Some(found) = self.underlying_type() else {
            return false;
        };
        if !predicate(found) {
            diags.push(type_conflict(self.terminal, found, example));
            return false;
        }
        true
    }

    pub fn test_same_underlying_type_as(
        &self,
        other: &UsageValidator<'_>,
        diags: &mut Diagnostics,
    ) -> bool {
        match other.underlying_type() {
            Some(expected) => self.test_expected_underlying_type(expected, diags),
            None => false,
        }
    }
}

fn type_conflict(terminal: TerminalId, found: &Type, expected: &Type) -> Diagnostic {
    Diagnostic::error(
        DiagTarget::Terminal(terminal),
        codes::TYPE_CONFLICT,
        format!("type conflict: found `{found}`, expected `{expected}`"),
    )
}

// ── Node rules ──────────────────────────────────────────────────────────────

fn feature_not_enabled(node: NodeId, feature: &str) -> Diagnostic {
    Diagnostic::error(
        DiagTarget::Node(node),
        codes::FEATURE_NOT_ENABLED,
        format!("feature `{feature}` is not enabled"),
    )
    .with_hint(format!("set `features.{feature}` in the analysis config"))
}

fn check_node(graph: &Graph, node: NodeId, features: FeatureToggles, diags: &mut Diagnostics) {
    let n = graph.node(node);
    let required = |i: usize, diags: &mut Diagnostics| {
        n.inputs
            .get(i)
            .map(|&t| UsageValidator::new(graph, t, diags))
    };

    match &n.kind {
        NodeKind::Constant { .. } => {}
        NodeKind::Assign => {
            let target = required(0, diags);
            let value = required(1, diags);
            if let Some(target) = &target {
                target.test_is_mutable(diags);
            }
            if let Some(value) = &value {
                value.test_is_owned(diags);
                if let Some(target) = &target {
                    value.test_same_underlying_type_as(target, diags);
                }
            }
        }
        NodeKind::CreateCell | NodeKind::Drop => {
            if let Some(v) = required(0, diags) {
                v.test_is_owned(diags);
            }
        }
        NodeKind::CreateCopy
        | NodeKind::ExplicitUnborrow { .. }
        | NodeKind::ImmutablePassthrough
        | NodeKind::SomeConstructor
        | NodeKind::Tunnel => {
            required(0, diags);
        }
        NodeKind::ExchangeValues => {
            let a = required(0, diags);
            let b = required(1, diags);
            if let Some(a) = &a {
                a.test_is_mutable(diags);
            }
            if let Some(b) = &b {
                b.test_is_mutable(diags);
                if let Some(a) = &a {
                    b.test_same_underlying_type_as(a, diags);
                }
            }
        }
        NodeKind::ExplicitBorrow { mode, .. } => {
            for i in 0..n.inputs.len() {
                let v = required(i, diags);
                if let (Some(v), BorrowMode::OwnerToMutable) = (&v, mode) {
                    v.test_is_mutable(diags);
                }
            }
        }
        NodeKind::MutablePassthrough => {
            if let Some(v) = required(0, diags) {
                v.test_is_mutable(diags);
            }
        }
        NodeKind::MutatingBinaryPrimitive { op } => {
            let expected = op.expected_input_type();
            if let Some(v) = required(0, diags) {
                v.test_expected_underlying_type(&expected, diags);
                v.test_is_mutable(diags);
            }
            if let Some(v) = required(1, diags) {
                v.test_expected_underlying_type(&expected, diags);
            }
        }
        NodeKind::MutatingUnaryPrimitive { op } => {
            if let Some(v) = required(0, diags) {
                v.test_expected_underlying_type(&op.expected_input_type(), diags);
                v.test_is_mutable(diags);
            }
        }
        NodeKind::Output => {
            if !features.output_node {
                diags.push(feature_not_enabled(node, "output_node"));
            }
            if let Some(v) = required(0, diags) {
                v.test_expected_underlying_type(&Type::Int32, diags);
            }
        }
        NodeKind::PureBinaryPrimitive { op } => {
            let expected = op.expected_input_type();
            for i in 0..2 {
                if let Some(v) = required(i, diags) {
                    v.test_expected_underlying_type(&expected, diags);
                }
            }
        }
        NodeKind::PureUnaryPrimitive { op } => {
            if let Some(v) = required(0, diags) {
                v.test_expected_underlying_type(&op.expected_input_type(), diags);
            }
        }
        NodeKind::Range => {
            for i in 0..2 {
                if let Some(v) = required(i, diags) {
                    v.test_expected_underlying_type(&Type::Int32, diags);
                }
            }
        }
        NodeKind::SelectReference => {
            if let Some(v) = required(0, diags) {
                v.test_expected_underlying_type(&Type::Boolean, diags);
            }
            let on_true = required(1, diags);
            let on_false = required(2, diags);
            if let (Some(t), Some(f)) = (&on_true, &on_false) {
                f.test_same_underlying_type_as(t, diags);
            }
        }
        NodeKind::TerminateLifetime(state) => {
            for &t in &n.inputs {
                UsageValidator::with_checks(graph, t, true, false, diags);
            }
            let (code, message) = match state.error {
                TerminateLifetimeError::NoError => return,
                TerminateLifetimeError::InputLifetimesNotUnique => (
                    codes::TERMINATE_LIFETIME_INPUTS_NOT_UNIQUE,
                    "inputs do not share a single lifetime",
                ),
                TerminateLifetimeError::InputLifetimeCannotBeTerminated => (
                    codes::TERMINATE_LIFETIME_CANNOT_BE_TERMINATED,
                    "input lifetime cannot be terminated here",
                ),
                TerminateLifetimeError::NotAllVariablesInLifetimeConnected => (
                    codes::TERMINATE_LIFETIME_NOT_ALL_CONNECTED,
                    "not every reference in the lifetime is wired",
                ),
            };
            diags.push(Diagnostic::error(DiagTarget::Node(node), code, message));
        }
        NodeKind::VectorCreate => {
            if !features.vectors {
                diags.push(feature_not_enabled(node, "vectors"));
            }
        }
        NodeKind::VectorInsert => {
            if !features.vectors {
                diags.push(feature_not_enabled(node, "vectors"));
            }
            let vector = required(0, diags);
            if let Some(v) = &vector {
                if v.test_underlying_type(Type::is_vector, &Type::vector(Type::Int32), diags) {
                    v.test_is_mutable(diags);
                }
            }
            if let Some(index) = required(1, diags) {
                index.test_expected_underlying_type(&Type::Int32, diags);
            }
            let element = required(2, diags);
            let element_type = vector
                .as_ref()
                .and_then(|v| v.underlying_type())
                .and_then(Type::vector_element);
            if let (Some(e), Some(expected)) = (&element, element_type) {
                e.test_expected_underlying_type(expected, diags);
            }
        }
        NodeKind::BorrowTunnel { mutable } => {
            if let Some(v) = required(0, diags) {
                if *mutable {
                    v.test_is_mutable(diags);
                }
            }
        }
        NodeKind::LockTunnel => {
            if let Some(v) = required(0, diags) {
                v.test_underlying_type(
                    Type::is_locking_cell,
                    &Type::locking_cell(Type::Void),
                    diags,
                );
            }
        }
        NodeKind::IterateTunnel => {
            if let Some(v) = required(0, diags) {
                v.test_underlying_type(Type::is_iterator, &Type::iterator(Type::Int32), diags);
                v.test_is_mutable(diags);
            }
        }
        NodeKind::LoopConditionTunnel => {
            if let Some(&t) = n.inputs.first() {
                let v = UsageValidator::with_checks(graph, t, false, true, diags);
                v.test_expected_underlying_type(&Type::Boolean, diags);
            }
        }
        NodeKind::UnwrapOptionTunnel => {
            if n.border.is_some_and(|b| b.direction == Direction::Output) {
                diags.push(Diagnostic::error(
                    DiagTarget::Node(node),
                    codes::UNWRAP_OPTION_MUST_BE_INPUT,
                    "unwrap-option tunnel must be an input tunnel",
                ));
            }
            if let Some(v) = required(0, diags) {
                v.test_underlying_type(Type::is_option, &Type::option(Type::Void), diags);
            }
        }
        NodeKind::TerminateLifetimeTunnel { begin } => {
            let paired = match (n.border, graph.nodes().get(begin.0 as usize)) {
                (Some(own), Some(b)) => {
                    b.kind.begins_lifetime()
                        && b.border.is_some_and(|bb| bb.structure == own.structure)
                }
                _ => false,
            };
            if !paired {
                diags.push(Diagnostic::error(
                    DiagTarget::Node(node),
                    codes::TERMINATE_TUNNEL_UNPAIRED,
                    format!("terminate-lifetime tunnel has no lifetime-beginning partner ({begin})"),
                ));
            }
        }
    }
}

// ── Wire rules ──────────────────────────────────────────────────────────────

fn check_wire(graph: &Graph, wire: WireId, diags: &mut Diagnostics) {
    let w = graph.wire(wire);
    let loose = std::iter::once(&w.source)
        .chain(&w.sinks)
        .any(|&t| !graph.is_connected(t));
    if loose || w.sinks.is_empty() {
        diags.push(Diagnostic::error(
            DiagTarget::Wire(wire),
            codes::WIRE_LOOSE_ENDS,
            "wire has loose ends",
        ));
    }
    if w.sinks.len() < 2 {
        return;
    }
    let Some(v) = graph.facade_variable(w.source) else {
        return;
    };
    let var = graph.variables.get(v);
    if var.fixed && !var.ty.may_fork() {
        diags.push(
            Diagnostic::error(
                DiagTarget::Wire(wire),
                codes::WIRE_CANNOT_FORK,
                format!("a value of type `{}` cannot be forked", var.ty),
            )
            .with_hint("copy the value or borrow it immutably before branching"),
        );
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
