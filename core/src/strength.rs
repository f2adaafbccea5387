//! Strength ordering (`spec.md` §4.3; grounded on
//! `pxr/usd/pcp/strengthOrdering.cpp`).
//!
//! `Ordering::Less` means "the first argument is stronger" throughout
//! this module, matching how [`crate::graph::Graph::insert_child`]
//! uses [`compare_siblings`] to find a new node's splice position.

use crate::graph::Graph;
use crate::node::NodeIndex;
use std::cmp::Ordering;

/// Compares two nodes that share a parent.
pub fn compare_siblings(graph: &Graph, a: NodeIndex, b: NodeIndex) -> Ordering {
    let an = graph.node(a);
    let bn = graph.node(b);

    let rank = an.kind().cmp(&bn.kind());
    if rank != Ordering::Equal {
        return rank;
    }
    if an.kind().is_specialize() {
        return compare_specializes_siblings(graph, a, b);
    }

    // Namespace depth at introduction: greater is stronger.
    let depth = bn.shared.arc.namespace_depth.cmp(&an.shared.arc.namespace_depth);
    if depth != Ordering::Equal {
        return depth;
    }

    let (oa, ob) = (an.shared.arc.origin, bn.shared.arc.origin);
    if oa != ob {
        return compare_origin_strength(graph, oa, ob);
    }

    an.shared
        .arc
        .sibling_num_at_origin
        .cmp(&bn.shared.arc.sibling_num_at_origin)
}

/// Compares two nodes that share a root, by walking both ancestor
/// chains to their least common ancestor and comparing the diverging
/// siblings. A node is stronger than its own descendant.
pub fn compare_nodes(graph: &Graph, a: NodeIndex, b: NodeIndex) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    let ca = ancestor_chain(graph, a);
    let cb = ancestor_chain(graph, b);
    let mut i = 0;
    while i < ca.len() && i < cb.len() && ca[i] == cb[i] {
        i += 1;
    }
    if i == ca.len() {
        return Ordering::Less;
    }
    if i == cb.len() {
        return Ordering::Greater;
    }
    compare_siblings(graph, ca[i], cb[i])
}

fn ancestor_chain(graph: &Graph, node: NodeIndex) -> Vec<NodeIndex> {
    let mut chain = vec![node];
    let mut cur = node;
    while let Some(parent) = graph.parent(cur) {
        chain.push(parent);
        cur = parent;
    }
    chain.reverse();
    chain
}

fn is_node_ancestor(graph: &Graph, ancestor: NodeIndex, node: NodeIndex) -> bool {
    let mut cur = Some(node);
    while let Some(c) = cur {
        if c == ancestor {
            return true;
        }
        cur = graph.parent(c);
    }
    false
}

/// Whichever of `oa`/`ob` appears first in the whole graph's
/// strong-to-weak order is stronger ("walk the shared root's entire
/// expression subtree in strength order").
fn compare_origin_strength(graph: &Graph, oa: NodeIndex, ob: NodeIndex) -> Ordering {
    let order = graph.nodes_strong_to_weak();
    let pos = |target: NodeIndex| order.iter().position(|&i| i == target).expect("origin must be in graph");
    pos(oa).cmp(&pos(ob))
}

fn origin_root(graph: &Graph, node: NodeIndex) -> NodeIndex {
    let mut cur = node;
    loop {
        let origin = graph.node(cur).shared.arc.origin;
        match graph.parent(cur) {
            Some(parent) if origin != parent => cur = origin,
            _ => return cur,
        }
    }
}

fn origin_chain_len(graph: &Graph, node: NodeIndex) -> usize {
    let mut cur = node;
    let mut len = 0;
    loop {
        let origin = graph.node(cur).shared.arc.origin;
        match graph.parent(cur) {
            Some(parent) if origin != parent => {
                len += 1;
                cur = origin;
            }
            _ => return len,
        }
    }
}

/// The specializes-aware comparator branch (`spec.md` §4.3): specializes
/// hierarchies invert the usual origin-strength intuition, so nested
/// origin roots are compared by their own outer ordering rather than by
/// namespace depth directly.
fn compare_specializes_siblings(graph: &Graph, a: NodeIndex, b: NodeIndex) -> Ordering {
    let an = graph.node(a);
    let bn = graph.node(b);

    let ra = origin_root(graph, a);
    let rb = origin_root(graph, b);
    if ra != rb {
        let nested = is_node_ancestor(graph, ra, rb) || is_node_ancestor(graph, rb, ra);
        if !nested {
            return bn.shared.arc.namespace_depth.cmp(&an.shared.arc.namespace_depth);
        }
        return compare_origin_strength(graph, ra, rb);
    }

    let (oa, ob) = (an.shared.arc.origin, bn.shared.arc.origin);
    if oa == ob {
        let a_authored = graph.parent(a) == Some(oa);
        let b_authored = graph.parent(b) == Some(ob);
        if a_authored != b_authored {
            return if a_authored { Ordering::Less } else { Ordering::Greater };
        }
        return an
            .shared
            .arc
            .sibling_num_at_origin
            .cmp(&bn.shared.arc.sibling_num_at_origin);
    }

    let la = origin_chain_len(graph, a);
    let lb = origin_chain_len(graph, b);
    if la != lb {
        return lb.cmp(&la);
    }
    compare_origin_strength(graph, oa, ob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arc::{Arc as CompArc, ArcKind};
    use crate::map_expr::MapExpression;
    use crate::node::LayerStackHandle;
    use crate::path::Path;

    fn arc_with(kind: ArcKind, depth: u16, sibling: u16) -> CompArc {
        CompArc {
            kind,
            parent: NodeIndex::ROOT,
            origin: NodeIndex::ROOT,
            map_to_parent: MapExpression::identity(),
            sibling_num_at_origin: sibling,
            namespace_depth: depth,
            is_ancestral: false,
        }
    }

    #[test]
    fn arc_kind_orders_reference_and_payload_equal() {
        assert_eq!(ArcKind::Reference.cmp(&ArcKind::Payload), Ordering::Equal);
        assert_eq!(ArcKind::Root.cmp(&ArcKind::Reference), Ordering::Less);
        assert_eq!(ArcKind::Relocate.cmp(&ArcKind::Specialize), Ordering::Less);
    }

    #[test]
    fn deeper_namespace_depth_is_stronger() {
        let mut g = Graph::new_graph(Path::absolute_root(), LayerStackHandle(0), false);
        let shallow = g
            .insert_child(
                g.root_index(),
                Path::absolute_root().append_child("A"),
                arc_with(ArcKind::Reference, 1, 0),
                LayerStackHandle(1),
            )
            .unwrap();
        let deep = g
            .insert_child(
                g.root_index(),
                Path::absolute_root().append_child("B"),
                arc_with(ArcKind::Reference, 2, 0),
                LayerStackHandle(2),
            )
            .unwrap();
        assert_eq!(compare_siblings(&g, deep, shallow), Ordering::Less);
        // insertion should have placed `deep` before `shallow` in child order
        let kids: Vec<NodeIndex> = g.children(g.root_index()).collect();
        assert_eq!(kids, vec![deep, shallow]);
    }

    proptest::proptest! {
        #[test]
        fn siblings_with_distinct_sibling_nums_form_strict_total_order(
            nums in proptest::collection::hash_set(0u16..50, 1..8)
        ) {
            let mut g = Graph::new_graph(Path::absolute_root(), LayerStackHandle(0), false);
            let mut nodes = Vec::new();
            for (i, n) in nums.into_iter().enumerate() {
                let idx = g
                    .insert_child(
                        g.root_index(),
                        Path::absolute_root().append_child(&format!("n{i}")),
                        arc_with(ArcKind::Reference, 1, n),
                        LayerStackHandle(i as u32 + 1),
                    )
                    .unwrap();
                nodes.push(idx);
            }
            for &x in &nodes {
                for &y in &nodes {
                    let xy = compare_siblings(&g, x, y);
                    let yx = compare_siblings(&g, y, x);
                    prop_assert_eq!(xy, yx.reverse());
                }
            }
            let order: Vec<NodeIndex> = g.children(g.root_index()).collect();
            for w in order.windows(2) {
                prop_assert_eq!(compare_siblings(&g, w[0], w[1]), Ordering::Less);
            }
        }
    }
}
