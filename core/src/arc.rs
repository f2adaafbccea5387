//! Composition arcs (`spec.md` §3, §4.2; grounded on
//! `pxr/usd/pcp/arc.h`).
//!
//! An [`Arc`] connects a child node to the parent node that introduced
//! it, and carries everything the strength-ordering comparator and the
//! builder need to know about how it got there: what kind of arc it is,
//! where it originated, the namespace mapping between the two nodes,
//! and the sibling/depth bookkeeping used to break ties between arcs of
//! equal kind.

use crate::map_expr::MapExpression;
use crate::node::NodeIndex;
use std::cmp::Ordering;

/// The kind of composition arc. Strength precedence (`spec.md` §4.3) is
/// `Root < Reference = Payload < Inherit < Variant < Relocate <
/// Specialize`; `Reference` and `Payload` share a rank, so `ArcKind`'s
/// `Ord` impl is hand-written against [`ArcKind::strength_rank`] rather
/// than derived from declaration order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ArcKind {
    Root,
    Reference,
    Payload,
    Inherit,
    Variant,
    Relocate,
    Specialize,
}

impl ArcKind {
    pub fn strength_rank(self) -> u8 {
        match self {
            ArcKind::Root => 0,
            ArcKind::Reference | ArcKind::Payload => 1,
            ArcKind::Inherit => 2,
            ArcKind::Variant => 3,
            ArcKind::Relocate => 4,
            ArcKind::Specialize => 5,
        }
    }

    pub fn is_inherit_or_specialize(self) -> bool {
        matches!(self, ArcKind::Inherit | ArcKind::Specialize)
    }

    pub fn is_specialize(self) -> bool {
        matches!(self, ArcKind::Specialize)
    }
}

impl PartialOrd for ArcKind {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ArcKind {
    fn cmp(&self, other: &Self) -> Ordering {
        self.strength_rank().cmp(&other.strength_rank())
    }
}

/// A directed composition arc from a parent node to the child node it
/// introduces.
#[derive(Clone, Debug)]
pub struct Arc {
    pub kind: ArcKind,

    /// The node that directly introduced this arc (not necessarily the
    /// parent after implied-arc propagation copies it to ancestors).
    pub parent: NodeIndex,

    /// For implied/propagated arcs, the node in the originating
    /// namespace this arc is a copy of; for directly-introduced arcs,
    /// equal to `parent`.
    pub origin: NodeIndex,

    /// Maps paths between this node's namespace and its parent's.
    pub map_to_parent: MapExpression,

    /// Position of this node among its siblings at the moment it was
    /// introduced at its origin, used by the specializes-aware
    /// comparator branch (`spec.md` §4.3).
    pub sibling_num_at_origin: u16,

    /// Namespace depth of the path that introduced this arc, i.e. the
    /// depth of the site in the parent's namespace where the arc was
    /// found (`spec.md` §4.3's "namespace depth" ordering key).
    pub namespace_depth: u16,

    /// True if this node's opinions are weaker than its parent's only
    /// because its *source* path is itself hung off another node's
    /// site at a deeper path, rather than via a new arc.
    pub is_ancestral: bool,
}

impl Arc {
    pub fn root() -> Self {
        Arc {
            kind: ArcKind::Root,
            parent: NodeIndex::ROOT,
            origin: NodeIndex::ROOT,
            map_to_parent: MapExpression::identity(),
            sibling_num_at_origin: 0,
            namespace_depth: 0,
            is_ancestral: false,
        }
    }
}
