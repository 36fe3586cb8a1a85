// pipeline.rs — Compilation state and pass orchestration
//
// Holds the graph under analysis with its accumulated diagnostics and runs
// the minimal set of passes for a given terminal PassId.
//
// Preconditions: `state.graph` is a graph as loaded or built by the host.
// Postconditions: every pass in `required_passes(terminal)` has run, unless
//                 one failed fatally; `has_error` reflects error diagnostics.
// Failure modes: cancellation or an internal invariant violation in a pass.
//                Error diagnostics do not stop the pipeline: later passes
//                still run so the host gets a best-effort graph.
// Side effects: calls on_pass_complete callback after each pass for
//               immediate display.

use std::fmt;
use std::time::{Duration, Instant};

use crate::diag::{Diagnostic, Diagnostics};
use crate::graph::Graph;
use crate::options::AnalysisOptions;
use crate::pass::{descriptor, required_passes, PassId, ALL_PASSES};
use crate::visit::{AnalysisError, CancellationToken};

// ── State ───────────────────────────────────────────────────────────────────

/// The graph under analysis and everything the passes reported about it.
pub struct CompilationState {
    pub graph: Graph,
    pub diagnostics: Diagnostics,
    pub has_error: bool,
    /// Passes that ran to completion, in order.
    pub completed: Vec<PassId>,
}

impl CompilationState {
    pub fn new(graph: Graph) -> Self {
        Self {
            graph,
            diagnostics: Diagnostics::new(),
            has_error: false,
            completed: Vec::new(),
        }
    }

    /// SHA-256 of the graph dump, hex encoded (64 characters).
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.graph)
    }
}

/// SHA-256 of `graph`'s textual dump, hex encoded.
pub fn fingerprint(graph: &Graph) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(graph.to_string().as_bytes());
    let digest = hasher.finalize();
    let mut s = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

// ── Error type ──────────────────────────────────────────────────────────────

/// A pass stopped without finishing. Diagnostics reported before the failure
/// are still in `CompilationState.diagnostics`.
#[derive(Debug)]
pub struct PipelineError {
    /// The pass that failed.
    pub failing_pass: PassId,
    pub error: AnalysisError,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", descriptor(self.failing_pass).name, self.error)
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

// ── Per-pass bookkeeping ────────────────────────────────────────────────────

/// Per-pass post-processing: callback, accumulate, verbose.
fn finish_pass(
    state: &mut CompilationState,
    pass_id: PassId,
    diags: Diagnostics,
    elapsed: Duration,
    verbose: bool,
    on_pass_complete: &mut impl FnMut(PassId, &[Diagnostic]),
) {
    let diags: Vec<Diagnostic> = diags.iter().cloned().collect();
    on_pass_complete(pass_id, &diags);
    if diags.iter().any(Diagnostic::is_error) {
        state.has_error = true;
    }
    state.diagnostics.extend(diags);
    state.completed.push(pass_id);
    if verbose {
        eprintln!(
            "lifewire: {} complete, {:.1}ms",
            descriptor(pass_id).name,
            elapsed.as_secs_f64() * 1000.0
        );
    }
}

// ── Pipeline runner ─────────────────────────────────────────────────────────

/// Run the minimal set of passes to produce `terminal`.
///
/// Per-pass sequence: execute → on_pass_complete(callback) → verbose.
///
/// The explicit-borrow pass is skipped when
/// `options.normalize_explicit_borrows` is off.
pub fn run_pipeline(
    state: &mut CompilationState,
    terminal: PassId,
    options: &AnalysisOptions,
    cancel: &CancellationToken,
    verbose: bool,
    mut on_pass_complete: impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    for pass_id in required_passes(terminal) {
        if pass_id == PassId::ExplicitBorrow && !options.normalize_explicit_borrows {
            log::info!("explicit_borrow: disabled by configuration");
            continue;
        }
        let fail = |error| PipelineError {
            failing_pass: pass_id,
            error,
        };
        let t = Instant::now();
        let graph = &mut state.graph;
        let diags = match pass_id {
            PassId::CreateFacades => {
                crate::create_facades::create_facades(graph, cancel).map(|()| Diagnostics::new())
            }
            PassId::DetermineVariables => {
                crate::determine_variables::determine_variables(graph, cancel)
                    .map(|()| Diagnostics::new())
            }
            PassId::AutoBorrow => {
                crate::auto_borrow::auto_borrow(graph, cancel).map(|()| Diagnostics::new())
            }
            PassId::SetTypes => {
                crate::set_types::set_types(graph, cancel).map(|()| Diagnostics::new())
            }
            PassId::Validate => crate::validate::validate(graph, options.features, cancel),
            PassId::ExplicitBorrow => crate::explicit_borrow::explicit_borrow(graph, cancel),
        }
        .map_err(fail)?;
        finish_pass(state, pass_id, diags, t.elapsed(), verbose, &mut on_pass_complete);
    }
    log::info!(
        "pipeline: {} passes, {} diagnostics, broken: {}",
        state.completed.len(),
        state.diagnostics.len(),
        state.has_error
    );
    Ok(())
}

/// Run every pass over `graph` with no callback.
pub fn analyze(
    graph: Graph,
    options: &AnalysisOptions,
) -> Result<CompilationState, PipelineError> {
    let mut state = CompilationState::new(graph);
    let terminal = ALL_PASSES[ALL_PASSES.len() - 1];
    run_pipeline(
        &mut state,
        terminal,
        options,
        &CancellationToken::new(),
        false,
        |_, _| {},
    )?;
    Ok(state)
}

// ── Tests ───────────────────────────────────────────────────────────────────
