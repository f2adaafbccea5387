//! The node-pool graph (`spec.md` §4.2; grounded on
//! `pxr/usd/pcp/primIndex_Graph.h`'s `_Node`/`_NodePool` split).
//!
//! The pool is two parallel arrays, each held behind an `Arc` so that
//! cloning a `Graph` (to build an ancestral subgraph, or before a
//! mutation that might be observed by another holder) is O(1); the
//! first mutation after a clone copies the underlying `Vec` via
//! `Arc::make_mut`, mirroring the original's `std::shared_ptr`
//! copy-before-mutate discipline.

use crate::arc::Arc as CompArc;
use crate::error::PcpError;
use crate::map_expr::MapExpression;
use crate::node::{LayerStackHandle, NodeIndex, NodeRef, Permission, SharedNodeData, UnsharedNodeData};
use crate::path::Path;
use crate::strength;
use std::cmp::Ordering;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct Graph {
    shared: Arc<Vec<SharedNodeData>>,
    unshared: Arc<Vec<UnsharedNodeData>>,
    usd_mode: bool,
}

impl Graph {
    /// Creates a graph containing only the root node.
    pub fn new_graph(root_site: Path, root_layer_stack: LayerStackHandle, usd_mode: bool) -> Graph {
        let shared = SharedNodeData {
            arc: CompArc::root(),
            layer_stack: root_layer_stack,
            permission: Permission::Public,
            has_symmetry: false,
            spec_contribution_restricted_depth: 0,
        };
        let unshared = UnsharedNodeData::new(root_site, None);
        Graph {
            shared: Arc::new(vec![shared]),
            unshared: Arc::new(vec![unshared]),
            usd_mode,
        }
    }

    pub fn usd_mode(&self) -> bool {
        self.usd_mode
    }

    pub fn root_index(&self) -> NodeIndex {
        NodeIndex::ROOT
    }

    pub fn node_count(&self) -> usize {
        self.shared.len()
    }

    pub fn node(&self, index: NodeIndex) -> NodeRef<'_> {
        NodeRef {
            index,
            shared: &self.shared[index.index()],
            unshared: &self.unshared[index.index()],
        }
    }

    pub fn parent(&self, index: NodeIndex) -> Option<NodeIndex> {
        self.unshared[index.index()].parent
    }

    pub fn children(&self, parent: NodeIndex) -> Children<'_> {
        Children {
            graph: self,
            next: self.unshared[parent.index()].first_child,
        }
    }

    pub fn site(&self, index: NodeIndex) -> &Path {
        &self.unshared[index.index()].site
    }

    pub fn culled(&self, index: NodeIndex) -> bool {
        self.unshared[index.index()].culled
    }

    pub fn set_culled(&mut self, index: NodeIndex, culled: bool) {
        Arc::make_mut(&mut self.unshared)[index.index()].culled = culled;
    }

    pub fn mark_inert(&mut self, index: NodeIndex, inert: bool) {
        Arc::make_mut(&mut self.unshared)[index.index()].inert = inert;
    }

    pub fn mark_permission_denied(&mut self, index: NodeIndex, denied: bool) {
        Arc::make_mut(&mut self.unshared)[index.index()].permission_denied = denied;
    }

    pub fn set_has_specs(&mut self, index: NodeIndex, has_specs: bool) {
        Arc::make_mut(&mut self.unshared)[index.index()].has_specs = has_specs;
    }

    pub fn set_permission_and_symmetry(&mut self, index: NodeIndex, permission: Permission, has_symmetry: bool) {
        let shared = Arc::make_mut(&mut self.shared);
        shared[index.index()].permission = permission;
        shared[index.index()].has_symmetry = has_symmetry;
    }

    /// Composes `map_to_root` on demand by walking ancestors, as the
    /// invariant `map_to_root == map_to_parent ∘ parent.map_to_root`
    /// defines it (`spec.md` §3).
    pub fn map_to_root(&self, index: NodeIndex) -> MapExpression {
        let mut result = MapExpression::identity();
        let mut cur = index;
        loop {
            let node = self.node(cur);
            result = node.map_to_parent().compose(&result);
            match self.parent(cur) {
                Some(parent) => cur = parent,
                None => break,
            }
        }
        result
    }

    /// Allocates a new node and splices it into `parent`'s child list
    /// at the position the sibling strength comparator dictates.
    pub fn insert_child(
        &mut self,
        parent: NodeIndex,
        site: Path,
        arc: CompArc,
        layer_stack: LayerStackHandle,
    ) -> Result<NodeIndex, PcpError> {
        if self.node_count() >= NodeIndex::MAX_NODES {
            return Err(PcpError::IndexCapacityExceeded {
                root: self.site(self.root_index()).clone(),
            });
        }
        if arc.namespace_depth == u16::MAX {
            return Err(PcpError::ArcNamespaceDepthCapacityExceeded { site });
        }

        let new_index = NodeIndex::from_usize(self.node_count())
            .expect("capacity checked above");

        Arc::make_mut(&mut self.shared).push(SharedNodeData {
            arc,
            layer_stack,
            permission: Permission::Public,
            has_symmetry: false,
            spec_contribution_restricted_depth: 0,
        });
        Arc::make_mut(&mut self.unshared).push(UnsharedNodeData::new(site, Some(parent)));

        self.splice_in_strength_order(parent, new_index);
        Ok(new_index)
    }

    fn splice_in_strength_order(&mut self, parent: NodeIndex, new_index: NodeIndex) {
        let mut prev: Option<NodeIndex> = None;
        let mut cursor = self.unshared[parent.index()].first_child;
        while let Some(candidate) = cursor {
            if strength::compare_siblings(self, new_index, candidate) == Ordering::Less {
                break;
            }
            prev = Some(candidate);
            cursor = self.unshared[candidate.index()].next_sibling;
        }

        let unshared = Arc::make_mut(&mut self.unshared);
        unshared[new_index.index()].prev_sibling = prev;
        unshared[new_index.index()].next_sibling = cursor;
        match prev {
            Some(prev) => unshared[prev.index()].next_sibling = Some(new_index),
            None => unshared[parent.index()].first_child = Some(new_index),
        }
        match cursor {
            Some(next) => unshared[next.index()].prev_sibling = Some(new_index),
            None => unshared[parent.index()].last_child = Some(new_index),
        }
    }

    /// Appends every node of `subgraph` into this graph's pool, rewires
    /// indices to the new base offset, and inserts the relocated
    /// subgraph root as a child of `parent` in strength order.
    pub fn insert_child_subgraph(
        &mut self,
        parent: NodeIndex,
        subgraph: Graph,
        arc: CompArc,
    ) -> Result<NodeIndex, PcpError> {
        let offset = self.node_count();
        if offset + subgraph.node_count() > NodeIndex::MAX_NODES {
            return Err(PcpError::IndexCapacityExceeded {
                root: self.site(self.root_index()).clone(),
            });
        }

        let rebase = |idx: NodeIndex| NodeIndex::from_usize(idx.index() + offset).unwrap();
        let rebase_opt = |idx: Option<NodeIndex>| idx.map(rebase);

        let shared = Arc::make_mut(&mut self.shared);
        let unshared = Arc::make_mut(&mut self.unshared);

        for (i, mut node) in subgraph.shared.iter().cloned().enumerate() {
            if i == 0 {
                node.arc = arc.clone();
            }
            shared.push(node);
        }
        for (i, mut node) in subgraph.unshared.iter().cloned().enumerate() {
            node.parent = match node.parent {
                Some(p) => Some(rebase(p)),
                None => Some(parent),
            };
            node.first_child = rebase_opt(node.first_child);
            node.last_child = rebase_opt(node.last_child);
            node.next_sibling = rebase_opt(node.next_sibling);
            node.prev_sibling = rebase_opt(node.prev_sibling);
            // Node 0 of a spliced subgraph is the arc's introduction
            // point; the rest are ancestral structure brought along with
            // it (`spec.md` §3 `is_due_to_ancestor`, §4.5 culling
            // exception for `depth_below_introduction == 0`).
            node.is_due_to_ancestor = i != 0;
            unshared.push(node);
        }

        let new_root = NodeIndex::from_usize(offset).unwrap();
        self.splice_in_strength_order(parent, new_root);
        Ok(new_root)
    }

    /// Linear scan for a node whose site equals `site`, used for
    /// duplicate-node detection (`spec.md` §4.4.1 step 2).
    pub fn get_node_using_site(&self, site: &Path) -> Option<NodeIndex> {
        self.unshared
            .iter()
            .position(|n| &n.site == site)
            .and_then(NodeIndex::from_usize)
    }

    /// After recursing to the parent index, descend every node's
    /// stored site one level by appending `child_name`.
    pub fn append_child_name_to_all_sites(&mut self, child_name: &str) {
        for node in Arc::make_mut(&mut self.unshared).iter_mut() {
            node.site = node.site.append_child(child_name);
        }
    }

    /// Depth-first pre-order traversal of the child tree, which is the
    /// whole-graph strength order given that child lists are always
    /// maintained strongest-first (`spec.md` §4.3 `compare_nodes`).
    pub fn nodes_strong_to_weak(&self) -> Vec<NodeIndex> {
        let mut out = Vec::with_capacity(self.node_count());
        let mut stack = vec![self.root_index()];
        while let Some(idx) = stack.pop() {
            out.push(idx);
            let mut kids: Vec<NodeIndex> = self.children(idx).collect();
            kids.reverse();
            stack.extend(kids);
        }
        out
    }

    /// Permutes the node pool so that index order equals strength
    /// order, and returns the old-index → new-index mapping
    /// (`spec.md` §4.5 "Strength-order layout").
    pub fn apply_strength_order_layout(&mut self) -> Vec<NodeIndex> {
        let order = self.nodes_strong_to_weak();
        let mut old_to_new = vec![None; self.node_count()];
        for (new_pos, old_idx) in order.iter().enumerate() {
            old_to_new[old_idx.index()] = NodeIndex::from_usize(new_pos);
        }
        self.permute(&order, &old_to_new);
        old_to_new.into_iter().map(|x| x.unwrap()).collect()
    }

    /// Erases nodes whose old index is in `remove`, renumbering the
    /// survivors (`spec.md` §4.5 "Erasure of culled nodes"). Relies on
    /// the invariant that a removed node's parent and origin are also
    /// removed (a non-culled node's ancestors are never culled). Returns
    /// the old-index → new-index mapping (removed nodes map to `None`).
    pub fn erase_nodes(&mut self, remove: &[bool]) -> Vec<Option<NodeIndex>> {
        let mut old_to_new: Vec<Option<NodeIndex>> = vec![None; self.node_count()];
        let mut keep_order = Vec::new();
        for (i, removed) in remove.iter().enumerate() {
            if !*removed {
                old_to_new[i] = NodeIndex::from_usize(keep_order.len());
                keep_order.push(NodeIndex::from_usize(i).unwrap());
            }
        }
        self.permute(&keep_order, &old_to_new);
        old_to_new
    }

    fn permute(&mut self, order: &[NodeIndex], old_to_new: &[Option<NodeIndex>]) {
        let remap = |idx: Option<NodeIndex>| {
            idx.map(|i| old_to_new[i.index()].expect("ancestor of a kept node must also be kept"))
        };

        let new_shared: Vec<SharedNodeData> =
            order.iter().map(|&i| self.shared[i.index()].clone()).collect();
        let new_unshared: Vec<UnsharedNodeData> = order
            .iter()
            .map(|&i| {
                let mut n = self.unshared[i.index()].clone();
                n.parent = remap(n.parent);
                n.first_child = remap(n.first_child);
                n.last_child = remap(n.last_child);
                n.next_sibling = remap(n.next_sibling);
                n.prev_sibling = remap(n.prev_sibling);
                n
            })
            .collect();

        self.shared = Arc::new(new_shared);
        self.unshared = Arc::new(new_unshared);
    }
}

pub struct Children<'g> {
    graph: &'g Graph,
    next: Option<NodeIndex>,
}

impl<'g> Iterator for Children<'g> {
    type Item = NodeIndex;

    fn next(&mut self) -> Option<NodeIndex> {
        let cur = self.next?;
        self.next = self.graph.unshared[cur.index()].next_sibling;
        Some(cur)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arc::ArcKind;

    fn simple_arc(kind: ArcKind, namespace_depth: u16, sibling_num: u16) -> CompArc {
        CompArc {
            kind,
            parent: NodeIndex::ROOT,
            origin: NodeIndex::ROOT,
            map_to_parent: MapExpression::identity(),
            sibling_num_at_origin: sibling_num,
            namespace_depth,
            is_ancestral: false,
        }
    }

    #[test]
    fn insert_child_builds_sibling_list() {
        let mut g = Graph::new_graph(Path::absolute_root(), LayerStackHandle(0), false);
        let a = g
            .insert_child(
                g.root_index(),
                Path::absolute_root().append_child("A"),
                simple_arc(ArcKind::Reference, 1, 0),
                LayerStackHandle(1),
            )
            .unwrap();
        let b = g
            .insert_child(
                g.root_index(),
                Path::absolute_root().append_child("B"),
                simple_arc(ArcKind::Inherit, 1, 0),
                LayerStackHandle(2),
            )
            .unwrap();
        let kids: Vec<NodeIndex> = g.children(g.root_index()).collect();
        assert_eq!(kids, vec![a, b]);
    }

    #[test]
    fn strong_to_weak_visits_root_first() {
        let g = Graph::new_graph(Path::absolute_root(), LayerStackHandle(0), false);
        assert_eq!(g.nodes_strong_to_weak(), vec![g.root_index()]);
    }
}
