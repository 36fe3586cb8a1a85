// pass.rs — Pass descriptor module: metadata, dependency resolution, artifact IDs
//
// Declares the six analysis passes, their dependency edges, and the artifacts
// they produce. Used by the pipeline runner to compute the minimal pass
// subset for each --stop-after target.

use std::collections::HashSet;

// ── Pass and Artifact identifiers ──────────────────────────────────────────

/// Identifies each analysis pass (document loading is outside the runner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    CreateFacades,
    DetermineVariables,
    AutoBorrow,
    SetTypes,
    Validate,
    ExplicitBorrow,
}

/// Machine-readable artifact identifiers. Each names state the pass leaves
/// on the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Facades,     // TerminalFacade + NodeFacade
    Variables,   // Variables
    Borrows,     // spliced borrow/terminate nodes, resolved facades
    Types,       // variable types and lifetimes
    Diagnostics, // validation diagnostics
    Normalized,  // explicit borrow/unborrow nodes
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about an analysis pass.
pub struct PassDescriptor {
    /// Human-readable name for diagnostics/verbose output.
    pub name: &'static str,
    /// Pass dependencies (other passes whose outputs this pass consumes).
    pub inputs: &'static [PassId],
    /// Artifacts this pass produces.
    pub outputs: &'static [ArtifactId],
    /// Pre/post conditions (documentation only).
    pub invariants: &'static str,
}

/// Return the static descriptor for a given pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::CreateFacades => PassDescriptor {
            name: "create_facades",
            inputs: &[],
            outputs: &[ArtifactId::Facades],
            invariants: "every terminal has a facade, every variable set is empty",
        },
        PassId::DetermineVariables => PassDescriptor {
            name: "determine_variables",
            inputs: &[PassId::CreateFacades],
            outputs: &[ArtifactId::Variables],
            invariants: "a wire's terminals share the source variable unless it forks",
        },
        PassId::AutoBorrow => PassDescriptor {
            name: "auto_borrow",
            inputs: &[PassId::DetermineVariables],
            outputs: &[ArtifactId::Borrows],
            invariants: "every reference-input facade is resolved",
        },
        PassId::SetTypes => PassDescriptor {
            name: "set_types",
            inputs: &[PassId::AutoBorrow],
            outputs: &[ArtifactId::Types],
            invariants: "every variable on a connected terminal has a type and lifetime",
        },
        PassId::Validate => PassDescriptor {
            name: "validate",
            inputs: &[PassId::SetTypes],
            outputs: &[ArtifactId::Diagnostics],
            invariants: "graph unchanged",
        },
        PassId::ExplicitBorrow => PassDescriptor {
            name: "explicit_borrow",
            inputs: &[PassId::Validate],
            outputs: &[ArtifactId::Normalized],
            invariants: "no wire carries more permission than its sink declares",
        },
    }
}

impl PassId {
    /// Look a pass up by its descriptor name.
    pub fn from_name(name: &str) -> Option<PassId> {
        ALL_PASSES
            .iter()
            .copied()
            .find(|&p| descriptor(p).name == name)
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// All pass IDs in declaration order (used for iteration).
pub const ALL_PASSES: [PassId; 6] = [
    PassId::CreateFacades,
    PassId::DetermineVariables,
    PassId::AutoBorrow,
    PassId::SetTypes,
    PassId::Validate,
    PassId::ExplicitBorrow,
];

/// Compute the minimal ordered set of passes needed to produce `terminal`.
/// Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_passes_set_types() {
        let passes = required_passes(PassId::SetTypes);
        assert_eq!(
            passes,
            vec![
                PassId::CreateFacades,
                PassId::DetermineVariables,
                PassId::AutoBorrow,
                PassId::SetTypes,
            ]
        );
        assert!(!passes.contains(&PassId::Validate));
    }

    #[test]
    fn required_passes_explicit_borrow_includes_all() {
        let passes = required_passes(PassId::ExplicitBorrow);
        assert_eq!(passes.len(), 6);
        assert_eq!(passes, ALL_PASSES.to_vec());
    }

    #[test]
    fn required_passes_create_facades_is_minimal() {
        let passes = required_passes(PassId::CreateFacades);
        assert_eq!(passes, vec![PassId::CreateFacades]);
    }

    #[test]
    fn names_round_trip() {
        for pass in ALL_PASSES {
            assert_eq!(PassId::from_name(descriptor(pass).name), Some(pass));
        }
        assert_eq!(PassId::from_name("lowering"), None);
    }

    #[test]
    fn all_descriptors_have_outputs() {
        for pass in &ALL_PASSES {
            let desc = descriptor(*pass);
            assert!(
                !desc.outputs.is_empty(),
                "pass {:?} has no outputs declared",
                pass
            );
        }
    }

    #[test]
    fn dependency_edges_are_consistent() {
        for pass in &ALL_PASSES {
            let desc = descriptor(*pass);
            for dep in desc.inputs {
                let dep_passes = required_passes(*pass);
                let dep_pos = dep_passes.iter().position(|p| p == dep);
                let self_pos = dep_passes.iter().position(|p| p == pass);
                assert!(
                    dep_pos.unwrap() < self_pos.unwrap(),
                    "{:?} depends on {:?} but it comes later in topological order",
                    pass,
                    dep
                );
            }
        }
    }
}
