//! Finalization & Query (`spec.md` §4.5; grounded on
//! `pxr/usd/pcp/primIndex_Graph.h`'s `_ComputeStrengthOrderIndexMapping`
//! / `_ComputeEraseCulledNodeIndexMapping` / `_ApplyNodeIndexMapping`,
//! and the culling/permission sections of `primIndex.cpp`).

use crate::arc::ArcKind;
use crate::builder::CulledDependency;
use crate::error::PcpError;
use crate::graph::Graph;
use crate::layer::{FieldName, FieldValue, Layer, LayerStackSite};
use crate::node::{NodeIndex, Permission};
use crate::path::Path;
use crate::registry::LayerStackRegistry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// One `(node, layer)` pair that actually carries a spec for the prim
/// this index is for, strongest first — the flattened answer most
/// callers want (`spec.md` §3 "Prim Stack").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrimStackEntry {
    pub node: NodeIndex,
    pub layer_index: usize,
}

/// Which nodes/entries a range query should keep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeKind {
    /// Every node/entry, regardless of whether it can contribute.
    All,
    /// Only nodes/entries that can still contribute opinions, i.e. not
    /// inert, culled, or permission-denied.
    Contributing,
}

/// Result of finalizing one built graph.
pub struct FinalizeOutcome {
    pub prim_stack: Vec<PrimStackEntry>,
    pub errors: Vec<PcpError>,
    pub culled_dependencies: Vec<CulledDependency>,
}

/// Runs the fixed finalization sequence `spec.md` §4.5 lists in order:
/// cull, enforce permissions, lay the pool out in strength order, erase
/// culled nodes, then collect the prim stack. `usd_mode` disables
/// permission enforcement and prim-stack retention, matching the
/// `usd: bool` input's documented effect ("disable permissions,
/// symmetry, list-ordering; do not retain prim_stack").
pub fn finalize(graph: &mut Graph, registry: &LayerStackRegistry, cull: bool) -> FinalizeOutcome {
    let mut errors = Vec::new();
    let mut culled_dependencies = Vec::new();

    if cull {
        cull_graph(graph, &mut culled_dependencies);
    }

    if !graph.usd_mode() {
        enforce_permissions(graph, &mut errors);
    }

    graph.apply_strength_order_layout();

    if cull {
        erase_culled(graph);
    }

    let prim_stack = if graph.usd_mode() {
        Vec::new()
    } else {
        collect_prim_stack(graph, registry)
    };

    FinalizeOutcome { prim_stack, errors, culled_dependencies }
}

/// Culling (`spec.md` §4.5 "Culling"): a node with no opinions of its
/// own and no contributing descendant is culled, unless it is the root,
/// the introduction point of its arc (`depth_below_introduction == 0`,
/// i.e. `!is_due_to_ancestor`), carries symmetry, or is a subroot
/// inherit node in the root layer stack. Specializes subtrees hanging
/// directly off the root are processed weakest-to-strongest first,
/// copying each node's culled bit across to its `origin` counterpart
/// elsewhere in the graph, before the rest of the graph is culled.
fn cull_graph(graph: &mut Graph, culled_dependencies: &mut Vec<CulledDependency>) {
    let root = graph.root_index();
    let root_layer_stack = graph.node(root).shared.layer_stack;

    let mut own_decided: HashSet<NodeIndex> = HashSet::new();
    let mut bit_override: HashMap<NodeIndex, bool> = HashMap::new();

    let specialize_children: Vec<NodeIndex> = graph
        .children(root)
        .filter(|&c| graph.node(c).kind().is_specialize())
        .collect();

    // Weakest-to-strongest: the child list is strongest-first, so walk
    // it in reverse.
    for &child in specialize_children.iter().rev() {
        decide_cull(graph, root_layer_stack, child, &mut own_decided, &mut bit_override, culled_dependencies);
    }

    decide_cull(graph, root_layer_stack, root, &mut own_decided, &mut bit_override, culled_dependencies);
}

fn decide_cull(
    graph: &mut Graph,
    root_layer_stack: crate::node::LayerStackHandle,
    node: NodeIndex,
    own_decided: &mut HashSet<NodeIndex>,
    bit_override: &mut HashMap<NodeIndex, bool>,
    culled_dependencies: &mut Vec<CulledDependency>,
) -> bool {
    if own_decided.contains(&node) {
        return !graph.culled(node);
    }

    let children: Vec<NodeIndex> = graph.children(node).collect();
    let mut any_child_contributes = false;
    for child in children {
        if decide_cull(graph, root_layer_stack, child, own_decided, bit_override, culled_dependencies) {
            any_child_contributes = true;
        }
    }

    let culled = if let Some(&forced) = bit_override.get(&node) {
        forced
    } else {
        let node_ref = graph.node(node);
        let is_root = node == graph.root_index();
        let is_introduction_point = !node_ref.unshared.is_due_to_ancestor;
        let has_symmetry = node_ref.shared.has_symmetry;
        let is_subroot_inherit_in_root_stack = node_ref.kind() == ArcKind::Inherit
            && node_ref.site().namespace_depth() > 1
            && node_ref.shared.layer_stack == root_layer_stack;
        let never_culled =
            is_root || is_introduction_point || has_symmetry || is_subroot_inherit_in_root_stack;
        let contributes_self = node_ref.unshared.has_specs && !node_ref.unshared.inert;
        !never_culled && !any_child_contributes && !contributes_self
    };

    graph.set_culled(node, culled);
    own_decided.insert(node);
    if culled {
        let node_ref = graph.node(node);
        culled_dependencies.push(CulledDependency {
            site: LayerStackSite {
                layer_stack: node_ref.shared.layer_stack,
                path: node_ref.site().clone(),
            },
        });
    }

    let origin = graph.node(node).shared.arc.origin;
    if origin != node {
        bit_override.insert(origin, culled);
    }

    !culled
}

/// Permissions (`spec.md` §4.5 "Permissions"): a single pass from the
/// root down marks every descendant of a private node `restricted`,
/// reporting `PrimPermissionDenied` for each one newly denied. The
/// direct arc onto a private site is instead reported as
/// `ArcPermissionDenied` at arc-add time (`core::builder::arcs`); this
/// pass is for opinions nested *beneath* a private node.
fn enforce_permissions(graph: &mut Graph, errors: &mut Vec<PcpError>) {
    propagate_permission(graph, graph.root_index(), false, errors);
}

fn propagate_permission(graph: &mut Graph, node: NodeIndex, inherited_denied: bool, errors: &mut Vec<PcpError>) {
    if inherited_denied && !graph.node(node).unshared.permission_denied {
        graph.mark_permission_denied(node, true);
        errors.push(PcpError::PrimPermissionDenied {
            site: graph.site(node).clone(),
        });
    }

    let is_private = graph.node(node).shared.permission == Permission::Private;
    let pass_down = inherited_denied || is_private;

    let children: Vec<NodeIndex> = graph.children(node).collect();
    for child in children {
        propagate_permission(graph, child, pass_down, errors);
    }
}

/// Erasure of culled nodes (`spec.md` §4.5 "Erasure"): a culled node
/// survives if it's still needed as another surviving node's `origin`,
/// transitively.
fn erase_culled(graph: &mut Graph) {
    let n = graph.node_count();
    let mut keep_origin = vec![false; n];

    for i in 0..n {
        let idx = NodeIndex::from_usize(i).expect("in-range index");
        if !graph.culled(idx) {
            let origin = graph.node(idx).shared.arc.origin;
            if origin.index() != i {
                keep_origin[origin.index()] = true;
            }
        }
    }

    let mut changed = true;
    while changed {
        changed = false;
        for i in 0..n {
            if !keep_origin[i] {
                continue;
            }
            let idx = NodeIndex::from_usize(i).expect("in-range index");
            let origin = graph.node(idx).shared.arc.origin;
            if origin.index() != i && !keep_origin[origin.index()] {
                keep_origin[origin.index()] = true;
                changed = true;
            }
        }
    }

    let remove: Vec<bool> = (0..n)
        .map(|i| graph.culled(NodeIndex::from_usize(i).expect("in-range index")) && !keep_origin[i])
        .collect();
    graph.erase_nodes(&remove);
}

/// Spec collection (`spec.md` §4.5 "Spec collection"): every
/// `(node, layer_index)` pair, strong to weak, where that layer has a
/// spec at the node's site.
fn collect_prim_stack(graph: &Graph, registry: &LayerStackRegistry) -> Vec<PrimStackEntry> {
    let mut out = Vec::new();
    for node in graph.nodes_strong_to_weak() {
        let node_ref = graph.node(node);
        if !node_ref.can_contribute_specs() {
            continue;
        }
        let layer_stack = registry.get(node_ref.shared.layer_stack);
        let path = node_ref.site();
        for (i, layer) in layer_stack.layers().iter().enumerate() {
            if layer.has_spec(path) {
                out.push(PrimStackEntry { node, layer_index: i });
            }
        }
    }
    out
}

/// `get_root_node` (`spec.md` §4.5 query surface).
pub fn get_root_node(graph: &Graph) -> NodeIndex {
    graph.root_index()
}

/// `get_node_range(range_kind)`.
pub fn get_node_range(graph: &Graph, kind: RangeKind) -> Vec<NodeIndex> {
    graph
        .nodes_strong_to_weak()
        .into_iter()
        .filter(|&n| matches!(kind, RangeKind::All) || graph.node(n).can_contribute_specs())
        .collect()
}

/// `get_prim_range(range_kind)`: the distinct nodes that appear in the
/// prim stack, in strength order, filtered by `kind`.
pub fn get_prim_range(graph: &Graph, prim_stack: &[PrimStackEntry], kind: RangeKind) -> Vec<NodeIndex> {
    let mut seen = HashSet::new();
    prim_stack
        .iter()
        .filter_map(|entry| {
            if !seen.insert(entry.node) {
                return None;
            }
            let keep = matches!(kind, RangeKind::All) || graph.node(entry.node).can_contribute_specs();
            keep.then_some(entry.node)
        })
        .collect()
}

/// `get_node_providing_spec(layer, path)`: the strongest node whose
/// site is `path` and whose layer stack includes `layer`, provided
/// `layer` actually has a spec at that path.
pub fn get_node_providing_spec(
    graph: &Graph,
    registry: &LayerStackRegistry,
    layer: &Arc<dyn Layer>,
    path: &Path,
) -> Option<NodeIndex> {
    graph.nodes_strong_to_weak().into_iter().find(|&n| {
        let node_ref = graph.node(n);
        if node_ref.site() != path {
            return false;
        }
        let stack = registry.get(node_ref.shared.layer_stack);
        stack.layers().iter().any(|l| Arc::ptr_eq(l, layer)) && layer.has_spec(path)
    })
}

/// `compose_authored_variant_selections`: the strongest authored
/// selection for each variant set named at `node`'s site, across its
/// whole layer stack.
pub fn compose_authored_variant_selections(
    graph: &Graph,
    registry: &LayerStackRegistry,
    node: NodeIndex,
) -> BTreeMap<String, String> {
    let node_ref = graph.node(node);
    let layer_stack = registry.get(node_ref.shared.layer_stack);
    let path = node_ref.site();

    let mut out = BTreeMap::new();
    let Some((_, FieldValue::VariantSetNames(names))) =
        layer_stack.compose_value(path, &FieldName::VariantSetNames)
    else {
        return out;
    };
    for name in names {
        if let Some((_, FieldValue::String(selection))) =
            layer_stack.compose_value(path, &FieldName::VariantSelection(name.clone()))
        {
            out.insert(name, selection);
        }
    }
    out
}

/// `compute_prim_child_names`: composes namespace child names across
/// every contributing node's layer stack, strong to weak, applying
/// relocation rename/remove at each step and keeping a renamed-away
/// name out of the result even if a weaker layer reintroduces it under
/// its old name.
///
/// A prim index's nodes all represent the same prim (just possibly at a
/// different path in each node's own layer stack, reached via an arc),
/// so this walks the whole graph rather than a single node's subtree.
/// Instanceable name-child restriction (only nodes that can carry
/// instance opinions contribute) isn't modeled: this crate's `Inputs`
/// carries no instanceable flag.
pub fn compute_prim_child_names(graph: &Graph, registry: &LayerStackRegistry) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut prohibited: HashSet<String> = HashSet::new();

    for node in graph.nodes_strong_to_weak() {
        let node_ref = graph.node(node);
        if !node_ref.can_contribute_specs() {
            continue;
        }
        let layer_stack = registry.get(node_ref.shared.layer_stack);
        let path = node_ref.site();
        let relocates = layer_stack.relocates();

        for layer in layer_stack.layers() {
            for child in layer.child_names(path) {
                let child_path = path.append_child(&child);
                if let Some(renamed_to) = relocates.source_to_target.get(&child_path) {
                    prohibited.insert(child);
                    if let Some(new_name) = renamed_to.name() {
                        if !prohibited.contains(new_name) && !names.iter().any(|n| n == new_name) {
                            names.push(new_name.to_string());
                        }
                    }
                    continue;
                }
                if prohibited.contains(&child) || names.contains(&child) {
                    continue;
                }
                names.push(child);
            }
        }
    }

    names
}

/// `compute_prim_property_names`: the union of property names across
/// every contributing node's layer stack, strong to weak, first
/// occurrence wins the position.
pub fn compute_prim_property_names(graph: &Graph, registry: &LayerStackRegistry) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();

    for node in graph.nodes_strong_to_weak() {
        let node_ref = graph.node(node);
        if !node_ref.can_contribute_specs() {
            continue;
        }
        let layer_stack = registry.get(node_ref.shared.layer_stack);
        let path = node_ref.site();

        for layer in layer_stack.layers() {
            for prop in layer.property_names(path) {
                if !names.contains(&prop) {
                    names.push(prop);
                }
            }
        }
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arc::Arc as CompArc;
    use crate::map_expr::MapExpression;
    use crate::node::LayerStackHandle;

    fn simple_arc(kind: ArcKind, parent: NodeIndex, origin: NodeIndex) -> CompArc {
        CompArc {
            kind,
            parent,
            origin,
            map_to_parent: MapExpression::identity(),
            sibling_num_at_origin: 0,
            namespace_depth: 1,
            is_ancestral: false,
        }
    }

    #[test]
    fn root_is_never_culled_even_without_specs() {
        let mut g = Graph::new_graph(Path::absolute_root(), LayerStackHandle(0), false);
        cull_graph(&mut g, &mut Vec::new());
        assert!(!g.culled(g.root_index()));
    }

    #[test]
    fn leaf_with_no_opinions_is_culled() {
        let mut g = Graph::new_graph(Path::absolute_root(), LayerStackHandle(0), false);
        let root = g.root_index();
        let child = g
            .insert_child(
                root,
                Path::absolute_root().append_child("A"),
                simple_arc(ArcKind::Reference, root, root),
                LayerStackHandle(1),
            )
            .unwrap();
        // has_specs left false (default): no opinions, no descendants.
        let mut deps = Vec::new();
        cull_graph(&mut g, &mut deps);
        assert!(g.culled(child));
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].site.path, g.site(child).clone());
    }

    #[test]
    fn node_with_specs_is_not_culled() {
        let mut g = Graph::new_graph(Path::absolute_root(), LayerStackHandle(0), false);
        let root = g.root_index();
        let child = g
            .insert_child(
                root,
                Path::absolute_root().append_child("A"),
                simple_arc(ArcKind::Reference, root, root),
                LayerStackHandle(1),
            )
            .unwrap();
        g.set_has_specs(child, true);
        cull_graph(&mut g, &mut Vec::new());
        assert!(!g.culled(child));
    }

    #[test]
    fn private_descendant_is_permission_denied() {
        let mut g = Graph::new_graph(Path::absolute_root(), LayerStackHandle(0), false);
        let root = g.root_index();
        let private_child = g
            .insert_child(
                root,
                Path::absolute_root().append_child("A"),
                simple_arc(ArcKind::Reference, root, root),
                LayerStackHandle(1),
            )
            .unwrap();
        g.set_permission_and_symmetry(private_child, Permission::Private, false);
        let grandchild = g
            .insert_child(
                private_child,
                Path::absolute_root().append_child("A").append_child("B"),
                simple_arc(ArcKind::Reference, private_child, private_child),
                LayerStackHandle(2),
            )
            .unwrap();

        let mut errors = Vec::new();
        enforce_permissions(&mut g, &mut errors);
        assert!(g.node(grandchild).unshared.permission_denied);
        assert!(errors
            .iter()
            .any(|e| matches!(e, PcpError::PrimPermissionDenied { .. })));
    }
}
