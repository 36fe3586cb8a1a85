// variable.rs — Variables, lifetimes and per-diagram variable sets
//
// A `Variable` is the identity of one value flowing through the graph.
// Terminals hold `VariableRef`s (reference indices) rather than variables;
// merging two variables redirects every reference of the merged one, so a
// terminal never has to be revisited after a merge.
//
// Preconditions: a `VariableSet` exists for every diagram a reference names.
// Postconditions: merged-away variables are never observable through any
//                 `VariableRef`.
// Failure modes: none; cross-diagram merges are refused and logged.
// Side effects: none.

use std::collections::HashMap;
use std::fmt;

use crate::id::{DiagramId, TerminalId};
use crate::types::Type;

// ── Lifetimes ───────────────────────────────────────────────────────────────

/// A lifetime allocated by a `VariableSet`. Equality is by allocation: two
/// lifetimes are the same only if they came from the same `define_*` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoundedLifetime {
    pub diagram: DiagramId,
    pub index: u32,
    /// Allocated for a value entering the diagram from outside; such a
    /// lifetime cannot be terminated inside the diagram.
    pub outlasts_diagram: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// Not yet determined, or undeterminable.
    Empty,
    /// Owned values; no borrow tracking.
    Unbounded,
    Static,
    Bounded(BoundedLifetime),
}

impl Lifetime {
    pub fn is_empty(self) -> bool {
        matches!(self, Lifetime::Empty)
    }

    pub fn is_bounded(self) -> bool {
        matches!(self, Lifetime::Bounded(_))
    }

    pub fn bounded(self) -> Option<BoundedLifetime> {
        match self {
            Lifetime::Bounded(b) => Some(b),
            _ => None,
        }
    }

    pub fn does_outlast_diagram(self) -> bool {
        match self {
            Lifetime::Bounded(b) => b.outlasts_diagram,
            Lifetime::Unbounded | Lifetime::Static => true,
            Lifetime::Empty => false,
        }
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifetime::Empty => write!(f, "'empty"),
            Lifetime::Unbounded => write!(f, "'unbounded"),
            Lifetime::Static => write!(f, "'static"),
            Lifetime::Bounded(b) if b.outlasts_diagram => {
                write!(f, "'{}.{}*", b.diagram, b.index)
            }
            Lifetime::Bounded(b) => write!(f, "'{}.{}", b.diagram, b.index),
        }
    }
}

// ── Variables ───────────────────────────────────────────────────────────────

/// A reference to a variable through its set's reference table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableRef {
    pub diagram: DiagramId,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Display id, unique across all sets of one graph.
    pub id: u32,
    pub mutable: bool,
    pub ty: Type,
    pub lifetime: Lifetime,
    /// Type and lifetime have been assigned.
    pub fixed: bool,
    /// Moved into a terminal that does not hand it back.
    pub consumed: bool,
    /// Terminal the variable was created for.
    pub origin: Option<TerminalId>,
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}: ", self.id)?;
        if self.mutable {
            write!(f, "mut ")?;
        }
        write!(f, "{} {}", self.ty, self.lifetime)
    }
}

#[derive(Debug, Clone)]
struct LifetimeRecord {
    outlasts_diagram: bool,
    /// Reference indices of the variables this lifetime borrows from.
    interrupted: Vec<u32>,
    /// For lifetimes entering a structure: the lifetime outside it.
    origin: Option<Lifetime>,
}

// ── Variable set ────────────────────────────────────────────────────────────

/// All variables and lifetimes of one diagram.
#[derive(Debug, Clone)]
pub struct VariableSet {
    diagram: DiagramId,
    variables: Vec<Variable>,
    alive: Vec<bool>,
    references: Vec<usize>,
    lifetimes: Vec<LifetimeRecord>,
    inner_for_outer: HashMap<BoundedLifetime, BoundedLifetime>,
}

impl VariableSet {
    pub fn new(diagram: DiagramId) -> Self {
        Self {
            diagram,
            variables: Vec::new(),
            alive: Vec::new(),
            references: Vec::new(),
            lifetimes: Vec::new(),
            inner_for_outer: HashMap::new(),
        }
    }

    pub fn diagram(&self) -> DiagramId {
        self.diagram
    }

    fn slot(&self, r: VariableRef) -> usize {
        debug_assert_eq!(r.diagram, self.diagram);
        self.references[r.index as usize]
    }

    fn create_variable(&mut self, id: u32, mutable: bool, origin: Option<TerminalId>) -> VariableRef {
        let slot = self.variables.len();
        self.variables.push(Variable {
            id,
            mutable,
            ty: Type::Void,
            lifetime: Lifetime::Empty,
            fixed: false,
            consumed: false,
            origin,
        });
        self.alive.push(true);
        let index = self.references.len() as u32;
        self.references.push(slot);
        VariableRef {
            diagram: self.diagram,
            index,
        }
    }

    pub fn variable(&self, r: VariableRef) -> &Variable {
        &self.variables[self.slot(r)]
    }

    fn variable_mut(&mut self, r: VariableRef) -> &mut Variable {
        let slot = self.slot(r);
        &mut self.variables[slot]
    }

    pub fn same_variable(&self, a: VariableRef, b: VariableRef) -> bool {
        self.slot(a) == self.slot(b)
    }

    /// Fold `to_merge` into `merge_with`. Every reference to `to_merge` now
    /// resolves to `merge_with`, which keeps its own mutability.
    pub fn merge(&mut self, to_merge: VariableRef, merge_with: VariableRef) {
        let from = self.slot(to_merge);
        let into = self.slot(merge_with);
        if from == into {
            return;
        }
        for slot in self.references.iter_mut() {
            if *slot == from {
                *slot = into;
            }
        }
        self.alive[from] = false;
        let merged = self.variables[from].clone();
        let target = &mut self.variables[into];
        target.consumed |= merged.consumed;
        if !target.fixed && merged.fixed {
            target.ty = merged.ty;
            target.lifetime = merged.lifetime;
            target.fixed = true;
        }
    }

    pub fn set_type_and_lifetime(&mut self, r: VariableRef, ty: Type, lifetime: Lifetime) {
        let var = self.variable_mut(r);
        var.ty = ty;
        var.lifetime = lifetime;
        var.fixed = true;
    }

    pub fn mark_consumed(&mut self, r: VariableRef) {
        self.variable_mut(r).consumed = true;
    }

    /// Live variables with one representative reference each, in creation order.
    pub fn variables(&self) -> Vec<(VariableRef, &Variable)> {
        let mut first_ref: Vec<Option<u32>> = vec![None; self.variables.len()];
        for (index, &slot) in self.references.iter().enumerate() {
            if first_ref[slot].is_none() {
                first_ref[slot] = Some(index as u32);
            }
        }
        self.variables
            .iter()
            .enumerate()
            .filter(|(slot, _)| self.alive[*slot])
            .filter_map(|(slot, var)| {
                first_ref[slot].map(|index| {
                    (
                        VariableRef {
                            diagram: self.diagram,
                            index,
                        },
                        var,
                    )
                })
            })
            .collect()
    }

    // ── Lifetimes ──

    /// A new lifetime bounded by this diagram that borrows from `interrupted`.
    pub fn define_lifetime_bounded_by_diagram(&mut self, interrupted: &[VariableRef]) -> Lifetime {
        let index = self.lifetimes.len() as u32;
        self.lifetimes.push(LifetimeRecord {
            outlasts_diagram: false,
            interrupted: interrupted.iter().map(|r| r.index).collect(),
            origin: None,
        });
        Lifetime::Bounded(BoundedLifetime {
            diagram: self.diagram,
            index,
            outlasts_diagram: false,
        })
    }

    /// A lifetime for references entering this diagram from outside. Entries
    /// from the same outer bounded lifetime share one inner lifetime.
    pub fn define_lifetime_that_outlasts_diagram(&mut self, origin: Option<Lifetime>) -> Lifetime {
        let outer = origin.and_then(Lifetime::bounded);
        if let Some(existing) = outer.and_then(|o| self.inner_for_outer.get(&o)) {
            return Lifetime::Bounded(*existing);
        }
        let index = self.lifetimes.len() as u32;
        self.lifetimes.push(LifetimeRecord {
            outlasts_diagram: true,
            interrupted: Vec::new(),
            origin,
        });
        let inner = BoundedLifetime {
            diagram: self.diagram,
            index,
            outlasts_diagram: true,
        };
        if let Some(outer) = outer {
            self.inner_for_outer.insert(outer, inner);
        }
        Lifetime::Bounded(inner)
    }

    fn record(&self, lifetime: Lifetime) -> Option<&LifetimeRecord> {
        let b = lifetime.bounded()?;
        if b.diagram != self.diagram {
            return None;
        }
        self.lifetimes.get(b.index as usize)
    }

    /// Variables the lifetime borrows from, in borrow order.
    pub fn interrupted_variables(&self, lifetime: Lifetime) -> Vec<VariableRef> {
        self.record(lifetime)
            .map(|rec| {
                rec.interrupted
                    .iter()
                    .map(|&index| VariableRef {
                        diagram: self.diagram,
                        index,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The outer lifetime an outlasting lifetime was created for.
    pub fn origin_of(&self, lifetime: Lifetime) -> Option<Lifetime> {
        self.record(lifetime).and_then(|rec| rec.origin)
    }

    /// Number of live, unconsumed variables carrying `lifetime`.
    pub fn live_count_in(&self, lifetime: Lifetime) -> usize {
        self.variables()
            .into_iter()
            .filter(|(_, v)| v.lifetime == lifetime && !v.consumed)
            .count()
    }

    pub fn lifetime_count(&self) -> usize {
        self.lifetimes.len()
    }
}

// ── All sets of a graph ─────────────────────────────────────────────────────

/// One `VariableSet` per diagram, indexed by `DiagramId`.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    sets: Vec<VariableSet>,
    next_id: u32,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh, empty sets for diagrams `0..count`.
    pub fn for_diagrams(count: usize) -> Self {
        Self {
            sets: (0..count as u32).map(|d| VariableSet::new(DiagramId(d))).collect(),
            next_id: 0,
        }
    }

    pub fn has_set(&self, diagram: DiagramId) -> bool {
        (diagram.0 as usize) < self.sets.len()
    }

    pub fn set(&self, diagram: DiagramId) -> &VariableSet {
        &self.sets[diagram.0 as usize]
    }

    pub fn set_mut(&mut self, diagram: DiagramId) -> &mut VariableSet {
        &mut self.sets[diagram.0 as usize]
    }

    pub fn sets(&self) -> &[VariableSet] {
        &self.sets
    }

    pub fn create(&mut self, diagram: DiagramId, mutable: bool, origin: Option<TerminalId>) -> VariableRef {
        let id = self.next_id;
        self.next_id += 1;
        self.set_mut(diagram).create_variable(id, mutable, origin)
    }

    pub fn get(&self, r: VariableRef) -> &Variable {
        self.set(r.diagram).variable(r)
    }

    pub fn same(&self, a: VariableRef, b: VariableRef) -> bool {
        a.diagram == b.diagram && self.set(a.diagram).same_variable(a, b)
    }

    /// Merge within one diagram. Variables of different diagrams never merge.
    pub fn merge(&mut self, to_merge: VariableRef, merge_with: VariableRef) {
        if to_merge.diagram != merge_with.diagram {
            log::warn!(
                "refusing to merge variables across diagrams ({} and {})",
                to_merge.diagram,
                merge_with.diagram
            );
            return;
        }
        self.set_mut(to_merge.diagram).merge(to_merge, merge_with);
    }

    pub fn set_type_and_lifetime(&mut self, r: VariableRef, ty: Type, lifetime: Lifetime) {
        self.set_mut(r.diagram).set_type_and_lifetime(r, ty, lifetime);
    }

    pub fn mark_consumed(&mut self, r: VariableRef) {
        self.set_mut(r.diagram).mark_consumed(r);
    }

    pub fn is_fixed(&self, r: VariableRef) -> bool {
        self.get(r).fixed
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn one_set() -> Variables {
        Variables::for_diagrams(1)
    }

    #[test]
    fn merge_redirects_every_reference() {
        let mut vars = one_set();
        let a = vars.create(DiagramId(0), false, None);
        let b = vars.create(DiagramId(0), true, None);
        let c = vars.create(DiagramId(0), false, None);
        vars.merge(a, c);
        vars.merge(c, b);
        assert!(vars.same(a, b));
        assert!(vars.same(c, b));
        assert!(vars.get(a).mutable, "merge keeps the target's mutability");
        assert_eq!(vars.set(DiagramId(0)).variables().len(), 1);
    }

    #[test]
    fn merge_carries_consumption_and_fixed_type() {
        let mut vars = one_set();
        let a = vars.create(DiagramId(0), false, None);
        let b = vars.create(DiagramId(0), false, None);
        vars.set_type_and_lifetime(a, Type::Int32, Lifetime::Unbounded);
        vars.mark_consumed(a);
        vars.merge(a, b);
        let merged = vars.get(b);
        assert!(merged.consumed);
        assert!(merged.fixed);
        assert_eq!(merged.ty, Type::Int32);
    }

    #[test]
    fn bounded_lifetimes_are_distinct_per_allocation() {
        let mut vars = one_set();
        let a = vars.create(DiagramId(0), false, None);
        let set = vars.set_mut(DiagramId(0));
        let l1 = set.define_lifetime_bounded_by_diagram(&[a]);
        let l2 = set.define_lifetime_bounded_by_diagram(&[a]);
        assert_ne!(l1, l2);
        assert!(l1.is_bounded());
        assert!(!l1.does_outlast_diagram());
    }

    #[test]
    fn interrupted_variables_follow_merges() {
        let mut vars = one_set();
        let a = vars.create(DiagramId(0), false, None);
        let b = vars.create(DiagramId(0), false, None);
        let lt = vars
            .set_mut(DiagramId(0))
            .define_lifetime_bounded_by_diagram(&[a]);
        vars.merge(a, b);
        let interrupted = vars.set(DiagramId(0)).interrupted_variables(lt);
        assert_eq!(interrupted.len(), 1);
        assert!(vars.same(interrupted[0], b));
    }

    #[test]
    fn outlasting_lifetimes_memoize_by_origin() {
        let mut vars = Variables::for_diagrams(2);
        let outer_var = vars.create(DiagramId(0), false, None);
        let outer = vars
            .set_mut(DiagramId(0))
            .define_lifetime_bounded_by_diagram(&[outer_var]);
        let inner = vars.set_mut(DiagramId(1));
        let a = inner.define_lifetime_that_outlasts_diagram(Some(outer));
        let b = inner.define_lifetime_that_outlasts_diagram(Some(outer));
        let c = inner.define_lifetime_that_outlasts_diagram(None);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.does_outlast_diagram());
        assert_eq!(inner.origin_of(a), Some(outer));
        assert_eq!(inner.origin_of(c), None);
    }

    #[test]
    fn live_count_skips_consumed() {
        let mut vars = one_set();
        let src = vars.create(DiagramId(0), false, None);
        let lt = vars
            .set_mut(DiagramId(0))
            .define_lifetime_bounded_by_diagram(&[src]);
        let r1 = vars.create(DiagramId(0), false, None);
        let r2 = vars.create(DiagramId(0), false, None);
        let ty = Type::immutable_reference(Type::Int32);
        vars.set_type_and_lifetime(r1, ty.clone(), lt);
        vars.set_type_and_lifetime(r2, ty, lt);
        assert_eq!(vars.set(DiagramId(0)).live_count_in(lt), 2);
        vars.mark_consumed(r2);
        assert_eq!(vars.set(DiagramId(0)).live_count_in(lt), 1);
    }

    #[test]
    fn cross_diagram_merge_is_refused() {
        let mut vars = Variables::for_diagrams(2);
        let a = vars.create(DiagramId(0), false, None);
        let b = vars.create(DiagramId(1), false, None);
        vars.merge(a, b);
        assert!(!vars.same(a, b));
    }

    #[test]
    fn display() {
        let mut vars = one_set();
        let a = vars.create(DiagramId(0), true, None);
        vars.set_type_and_lifetime(a, Type::mutable_reference(Type::Int32), Lifetime::Static);
        assert_eq!(vars.get(a).to_string(), "v0: mut &mut i32 'static");
    }
}
