// types.rs — Type oracle for the analysis stages
//
// A small structural type language: scalars, references, options, cells,
// iterators and vectors. The analysis never inspects a `Type` directly beyond
// the predicates and constructors defined here.
//
// Preconditions: none.
// Postconditions: `Display` output re-parses to the same `Type` (see parser.rs).
// Failure modes: none.
// Side effects: none.

use std::fmt;

// ── Types ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Boolean,
    Int32,
    ImmutableReference(Box<Type>),
    MutableReference(Box<Type>),
    Option(Box<Type>),
    LockingCell(Box<Type>),
    NonLockingCell(Box<Type>),
    Iterator(Box<Type>),
    Vector(Box<Type>),
}

/// How much a holder of a value may do with it. Declaration order is the
/// ordering: an owner may do everything a mutable reference may, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Permissiveness {
    ImmutableReference,
    MutableReference,
    Owner,
    MutableOwner,
}

/// The borrow needed to go from a more permissive value to a less permissive
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BorrowMode {
    OwnerToMutable,
    OwnerToImmutable,
    MutableToImmutable,
}

impl BorrowMode {
    /// Borrow mode bridging `from` to `to`, or `None` when `to` is not a
    /// reference level strictly below `from`.
    pub fn between(from: Permissiveness, to: Permissiveness) -> Option<BorrowMode> {
        use Permissiveness::*;
        match (from, to) {
            (Owner | MutableOwner, MutableReference) => Some(BorrowMode::OwnerToMutable),
            (Owner | MutableOwner, ImmutableReference) => Some(BorrowMode::OwnerToImmutable),
            (MutableReference, ImmutableReference) => Some(BorrowMode::MutableToImmutable),
            _ => None,
        }
    }

    /// Whether the borrow produces a mutable reference.
    pub fn is_mutable(self) -> bool {
        matches!(self, BorrowMode::OwnerToMutable)
    }

    pub fn name(self) -> &'static str {
        match self {
            BorrowMode::OwnerToMutable => "owner_to_mutable",
            BorrowMode::OwnerToImmutable => "owner_to_immutable",
            BorrowMode::MutableToImmutable => "mutable_to_immutable",
        }
    }
}

impl Type {
    pub fn immutable_reference(inner: Type) -> Type {
        Type::ImmutableReference(Box::new(inner))
    }

    pub fn mutable_reference(inner: Type) -> Type {
        Type::MutableReference(Box::new(inner))
    }

    /// `&mut inner` or `&inner`.
    pub fn reference(inner: Type, mutable: bool) -> Type {
        if mutable {
            Type::mutable_reference(inner)
        } else {
            Type::immutable_reference(inner)
        }
    }

    pub fn option(inner: Type) -> Type {
        Type::Option(Box::new(inner))
    }

    pub fn locking_cell(inner: Type) -> Type {
        Type::LockingCell(Box::new(inner))
    }

    pub fn non_locking_cell(inner: Type) -> Type {
        Type::NonLockingCell(Box::new(inner))
    }

    pub fn iterator(inner: Type) -> Type {
        Type::Iterator(Box::new(inner))
    }

    pub fn vector(inner: Type) -> Type {
        Type::Vector(Box::new(inner))
    }

    // ── Predicates ──

    pub fn is_reference(&self) -> bool {
        matches!(self, Type::ImmutableReference(_) | Type::MutableReference(_))
    }

    pub fn is_mutable_reference(&self) -> bool {
        matches!(self, Type::MutableReference(_))
    }

    pub fn is_immutable_reference(&self) -> bool {
        matches!(self, Type::ImmutableReference(_))
    }

    pub fn is_option(&self) -> bool {
        matches!(self, Type::Option(_))
    }

    pub fn is_locking_cell(&self) -> bool {
        matches!(self, Type::LockingCell(_))
    }

    pub fn is_iterator(&self) -> bool {
        matches!(self, Type::Iterator(_))
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, Type::Vector(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int32)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Type::Boolean)
    }

    /// Whether a wire carrying this type may fan out to several sinks.
    pub fn may_fork(&self) -> bool {
        match self {
            Type::ImmutableReference(_) => true,
            Type::Int32 | Type::Boolean => true,
            Type::Option(inner) => inner.may_fork(),
            _ => false,
        }
    }

    // ── Destructuring ──

    /// The referent of a reference type, or the type itself.
    pub fn underlying(&self) -> &Type {
        match self {
            Type::ImmutableReference(inner) | Type::MutableReference(inner) => inner,
            other => other,
        }
    }

    pub fn option_value(&self) -> Option<&Type> {
        match self {
            Type::Option(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn locking_cell_value(&self) -> Option<&Type> {
        match self {
            Type::LockingCell(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn iterator_item(&self) -> Option<&Type> {
        match self {
            Type::Iterator(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn vector_element(&self) -> Option<&Type> {
        match self {
            Type::Vector(inner) => Some(inner),
            _ => None,
        }
    }

    /// Permissiveness a terminal declared with this type asks for.
    pub fn permissiveness(&self) -> Permissiveness {
        match self {
            Type::ImmutableReference(_) => Permissiveness::ImmutableReference,
            Type::MutableReference(_) => Permissiveness::MutableReference,
            _ => Permissiveness::Owner,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Boolean => write!(f, "bool"),
            Type::Int32 => write!(f, "i32"),
            Type::ImmutableReference(inner) => write!(f, "&{inner}"),
            Type::MutableReference(inner) => write!(f, "&mut {inner}"),
            Type::Option(inner) => write!(f, "Option<{inner}>"),
            Type::LockingCell(inner) => write!(f, "LockingCell<{inner}>"),
            Type::NonLockingCell(inner) => write!(f, "NonLockingCell<{inner}>"),
            Type::Iterator(inner) => write!(f, "Iterator<{inner}>"),
            Type::Vector(inner) => write!(f, "Vec<{inner}>"),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
