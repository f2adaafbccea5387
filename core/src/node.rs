//! Node indices and per-node data (`spec.md` §3, §4.2; grounded on
//! `pxr/usd/pcp/primIndex_Graph.h`'s `_Node` layout).

use crate::arc::{Arc as CompArc, ArcKind};
use crate::map_expr::MapExpression;
use crate::path::Path;
use std::num::NonZeroU16;

/// A stable index into a [`crate::graph::Graph`]'s node pool.
///
/// Backed by a `NonZeroU16` storing `index + 1`, so `Option<NodeIndex>`
/// is the same size as `NodeIndex` itself (the niche the original's
/// explicit "invalid" sentinel value served, for free).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(NonZeroU16);

impl NodeIndex {
    /// The root node is always index 0.
    pub const ROOT: NodeIndex = NodeIndex(unsafe { NonZeroU16::new_unchecked(1) });

    /// One less than the backing type's range, since index `n` is
    /// stored as `n + 1` and 0 is reserved by `NonZeroU16`.
    pub const MAX_NODES: usize = u16::MAX as usize - 1;

    pub(crate) fn from_usize(i: usize) -> Option<NodeIndex> {
        u16::try_from(i + 1).ok().and_then(NonZeroU16::new).map(NodeIndex)
    }

    pub fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

/// `permission` on a node: whether weaker nodes may see past it
/// (`spec.md` §3, §4.5).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Permission {
    Public,
    Private,
}

impl Default for Permission {
    fn default() -> Self {
        Permission::Public
    }
}

/// Opaque handle to an interned layer stack, issued by
/// [`crate::registry::LayerStackRegistry`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct LayerStackHandle(pub(crate) u32);

/// Fields that never change once a node is created and are safe to
/// share across graph clones without copying (`spec.md` §4.2 storage
/// policy).
#[derive(Clone, Debug)]
pub struct SharedNodeData {
    pub arc: CompArc,
    pub layer_stack: LayerStackHandle,
    pub permission: Permission,
    pub has_symmetry: bool,
    pub spec_contribution_restricted_depth: u16,
}

/// Fields that mutate as the graph is built and finalized, and so
/// live in a parallel array that is never shared across clones.
#[derive(Clone, Debug)]
pub struct UnsharedNodeData {
    pub site: Path,
    pub has_specs: bool,
    pub inert: bool,
    pub culled: bool,
    pub permission_denied: bool,
    pub is_due_to_ancestor: bool,

    pub parent: Option<NodeIndex>,
    pub first_child: Option<NodeIndex>,
    pub last_child: Option<NodeIndex>,
    pub next_sibling: Option<NodeIndex>,
    pub prev_sibling: Option<NodeIndex>,
}

impl UnsharedNodeData {
    pub(crate) fn new(site: Path, parent: Option<NodeIndex>) -> Self {
        UnsharedNodeData {
            site,
            has_specs: false,
            inert: false,
            culled: false,
            permission_denied: false,
            is_due_to_ancestor: false,
            parent,
            first_child: None,
            last_child: None,
            next_sibling: None,
            prev_sibling: None,
        }
    }
}

/// A read-only, borrowed view of one node, as handed to callers walking
/// a finalized graph.
#[derive(Clone, Copy, Debug)]
pub struct NodeRef<'g> {
    pub index: NodeIndex,
    pub shared: &'g SharedNodeData,
    pub unshared: &'g UnsharedNodeData,
}

impl<'g> NodeRef<'g> {
    pub fn kind(&self) -> ArcKind {
        self.shared.arc.kind
    }

    pub fn site(&self) -> &'g Path {
        &self.unshared.site
    }

    pub fn map_to_parent(&self) -> &'g MapExpression {
        &self.shared.arc.map_to_parent
    }

    pub fn can_contribute_specs(&self) -> bool {
        !self.unshared.inert && !self.unshared.culled && !self.unshared.permission_denied
    }
}
