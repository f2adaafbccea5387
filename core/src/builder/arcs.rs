//! Adding an arc (`spec.md` §4.4.1): the single operation every task
//! evaluator calls to introduce a new node. Grounded on
//! `pxr/usd/pcp/primIndex.cpp`'s `_AddArc`, `_CheckForCycle`, and the
//! duplicate-node search comment block around it.

use super::{Builder, StackFrame, TaskKind};
use crate::arc::{Arc as CompArc, ArcKind};
use crate::error::PcpError;
use crate::layer::{FieldName, LayerStackSite};
use crate::map_expr::MapExpression;
use crate::node::{NodeIndex, Permission};
use crate::path::Path;

/// `Pcp_ArcOptions`, verbatim (`spec.md` §4.4.1).
#[derive(Clone, Debug)]
pub struct ArcOptions {
    pub direct_node_contributes_specs: bool,
    pub include_ancestral_opinions: bool,
    pub skip_duplicate_nodes: bool,
    pub skip_tasks_for_expressed_arcs: bool,
    pub skip_implied_specializes_completed_nodes: bool,
}

impl Default for ArcOptions {
    fn default() -> Self {
        ArcOptions {
            direct_node_contributes_specs: true,
            include_ancestral_opinions: false,
            skip_duplicate_nodes: true,
            skip_tasks_for_expressed_arcs: false,
            skip_implied_specializes_completed_nodes: false,
        }
    }
}

/// Everything one call to `AddArc` needs beyond the options
/// (`spec.md` §4.4.1 parameter list).
pub struct ArcRequest {
    pub parent: NodeIndex,
    pub source_site: LayerStackSite,
    pub map_to_parent: MapExpression,
    pub kind: ArcKind,
    pub sibling_num_at_origin: u16,
    pub namespace_depth: u16,
    pub origin: NodeIndex,
    pub options: ArcOptions,
}

/// Adds one arc, returning the new node if it was added (a cycle or a
/// duplicate silently drops the arc after recording the relevant
/// error, per `spec.md` §7's "recoverable errors don't abort the
/// build").
pub fn add_arc(builder: &mut Builder<'_>, frame: Option<&StackFrame<'_>>, req: ArcRequest) -> Option<NodeIndex> {
    if let Some(chain) = check_cycle(builder, frame, req.parent, req.kind, &req.source_site) {
        builder.errors.push(PcpError::ArcCycle {
            new_site: req.source_site.path.clone(),
            chain,
        });
        return None;
    }

    if req.options.skip_duplicate_nodes
        && check_duplicate(builder, frame, &req.source_site.path)
    {
        return None;
    }

    let mut options = req.options;
    if is_under_relocation_source(builder, req.parent, &req.source_site.path) {
        options.direct_node_contributes_specs = false;
    }

    let arc = CompArc {
        kind: req.kind,
        parent: req.parent,
        origin: req.origin,
        map_to_parent: req.map_to_parent,
        sibling_num_at_origin: req.sibling_num_at_origin,
        namespace_depth: req.namespace_depth,
        is_ancestral: false,
    };

    let layer_stack = req.source_site.layer_stack;
    let new_node = if !options.include_ancestral_opinions {
        let node = builder
            .graph
            .insert_child(req.parent, req.source_site.path.clone(), arc, layer_stack)
            .ok()?;
        let stack = builder.registry.get(layer_stack);
        let has_specs = stack.layers().iter().any(|l| l.has_spec(&req.source_site.path));
        builder.graph.set_has_specs(node, has_specs && options.direct_node_contributes_specs);
        if !builder.inputs.usd && !builder.graph.node(node).unshared.inert {
            apply_permission_and_symmetry(builder, node, &req.source_site.path);
        }
        node
    } else {
        let sub_inputs = super::Inputs {
            variant_fallbacks: builder.inputs.variant_fallbacks.clone(),
            included_payloads: builder.inputs.included_payloads.clone(),
            include_payload_predicate: builder.inputs.include_payload_predicate.clone(),
            asset_resolver: builder.inputs.asset_resolver.clone(),
            cull: builder.inputs.cull,
            usd: builder.inputs.usd,
            file_format_target: builder.inputs.file_format_target.clone(),
        };
        let sub_outputs = crate::build_prim_index_with_frame(
            &req.source_site,
            builder.registry,
            &sub_inputs,
            false,
            false,
            Some(&StackFrame {
                requested_site: req.source_site.clone(),
                parent_node: req.parent,
                outer_graph: &builder.graph,
                previous_frame: frame,
                skip_duplicate_nodes: options.skip_duplicate_nodes,
            }),
        );
        builder.errors.extend(sub_outputs.all_errors);
        builder
            .graph
            .insert_child_subgraph(req.parent, sub_outputs.graph, arc)
            .ok()?
    };

    if !builder.inputs.usd {
        let permission = builder.graph.node(new_node).shared.permission;
        if permission == Permission::Private {
            builder.errors.push(PcpError::ArcPermissionDenied {
                site: req.source_site.path.clone(),
            });
            mark_subtree_inert(builder, new_node);
        }
    }
    if builder.graph.site(new_node).is_absolute_root() {
        builder.graph.mark_inert(new_node, true);
    }

    enqueue_tasks_for_subtree(builder, new_node, options.skip_tasks_for_expressed_arcs);
    Some(new_node)
}

fn check_cycle(
    builder: &Builder<'_>,
    frame: Option<&StackFrame<'_>>,
    parent: NodeIndex,
    kind: ArcKind,
    new_site: &LayerStackSite,
) -> Option<Vec<Path>> {
    if kind.is_inherit_or_specialize() && builder.graph.node(parent).kind() == ArcKind::Relocate {
        return None;
    }

    let mut chain = Vec::new();
    let mut cur = Some(parent);
    while let Some(node) = cur {
        let node_ref = builder.graph.node(node);
        let node_layer_stack = node_ref.shared.layer_stack;
        let node_site = node_ref.unshared.site.clone();
        chain.push(node_site.clone());
        if node_layer_stack == new_site.layer_stack && is_cycle_pair(&node_site, &new_site.path) {
            return Some(chain);
        }
        cur = builder.graph.parent(node);
    }

    let mut outer = frame;
    while let Some(f) = outer {
        chain.push(f.requested_site.path.clone());
        if f.requested_site.layer_stack == new_site.layer_stack
            && is_cycle_pair(&f.requested_site.path, &new_site.path)
        {
            return Some(chain);
        }
        outer = f.previous_frame;
    }
    None
}

fn is_cycle_pair(ancestor_path: &Path, new_path: &Path) -> bool {
    let same_prim = ancestor_path.strip_variant_selections() == new_path.strip_variant_selections();
    if same_prim {
        return false;
    }
    ancestor_path.is_ancestor_of(new_path) || new_path.is_ancestor_of(ancestor_path)
}

fn check_duplicate(builder: &Builder<'_>, frame: Option<&StackFrame<'_>>, candidate: &Path) -> bool {
    if builder.graph.get_node_using_site(candidate).is_some() {
        return true;
    }
    let mut outer = frame;
    let mut current_root = builder.graph.site(builder.graph.root_index()).clone();
    while let Some(f) = outer {
        if let Some(translated) = f.translate_path(&current_root, candidate) {
            if f.outer_graph.get_node_using_site(&translated).is_some() {
                return true;
            }
        }
        current_root = f.requested_site.path.clone();
        outer = f.previous_frame;
    }
    false
}

/// "Salted earth": opinions at or under a relocation source are
/// silently ignored (`spec.md` §4.4.1 step 3, §9 GLOSSARY).
fn is_under_relocation_source(builder: &Builder<'_>, parent: NodeIndex, site_path: &Path) -> bool {
    let layer_stack = builder.registry.get(builder.graph.node(parent).shared.layer_stack);
    layer_stack
        .relocates()
        .source_to_target
        .keys()
        .any(|source| source.is_ancestor_of(site_path))
}

fn apply_permission_and_symmetry(builder: &mut Builder<'_>, node: NodeIndex, path: &Path) {
    let layer_stack = builder.registry.get(builder.graph.node(node).shared.layer_stack);
    let permission = match layer_stack.compose_value(path, &FieldName::Permission) {
        Some((_, crate::layer::FieldValue::Bool(true))) => Permission::Private,
        _ => Permission::Public,
    };
    let has_symmetry = matches!(
        layer_stack.compose_value(path, &FieldName::Symmetry),
        Some((_, crate::layer::FieldValue::Bool(true)))
    );
    builder.graph.set_permission_and_symmetry(node, permission, has_symmetry);
}

fn mark_subtree_inert(builder: &mut Builder<'_>, node: NodeIndex) {
    builder.graph.mark_inert(node, true);
    let children: Vec<NodeIndex> = builder.graph.children(node).collect();
    for child in children {
        mark_subtree_inert(builder, child);
    }
}

fn enqueue_tasks_for_subtree(builder: &mut Builder<'_>, node: NodeIndex, skip_expressed: bool) {
    let children: Vec<NodeIndex> = builder.graph.children(node).collect();
    for child in children {
        enqueue_tasks_for_subtree(builder, child, skip_expressed);
    }
    if skip_expressed {
        return;
    }
    scan_and_enqueue(builder, node);
}

/// Enqueues one node's initial tasks, the way `spec.md` §2's data flow
/// describes for a build's root node and `_AddArc`'s post-insert step
/// describes for every node it introduces. Variant-set and dynamic-
/// payload tasks are skipped for ancestral/nested builds
/// (`evaluate_variants_and_dynamic_payloads == false`): those decisions
/// are deferred to the outermost build, which re-scans the whole graph
/// with the flag set once the ancestral subgraph is spliced in.
pub(crate) fn scan_and_enqueue(builder: &mut Builder<'_>, node: NodeIndex) {
    let layer_stack = builder.registry.get(builder.graph.node(node).shared.layer_stack);
    let path = builder.graph.site(node).clone();

    builder.enqueue(TaskKind::EvalNodeRelocations, node, None);
    builder.enqueue(TaskKind::EvalImpliedSpecializes, node, None);

    if layer_stack.compose_value(&path, &FieldName::References).is_some() {
        builder.enqueue(TaskKind::EvalNodeReferences, node, None);
    }
    if layer_stack.compose_value(&path, &FieldName::Payload).is_some() {
        builder.enqueue(TaskKind::EvalNodePayloadsStatic, node, None);
    }
    if layer_stack.compose_value(&path, &FieldName::InheritPaths).is_some() {
        builder.enqueue(TaskKind::EvalNodeInherits, node, None);
    }
    if layer_stack.compose_value(&path, &FieldName::SpecializesPaths).is_some() {
        builder.enqueue(TaskKind::EvalNodeSpecializes, node, None);
    }
    if builder.evaluate_variants_and_dynamic_payloads {
        if let Some((_, crate::layer::FieldValue::VariantSetNames(names))) =
            layer_stack.compose_value(&path, &FieldName::VariantSetNames)
        {
            for name in names {
                let set: std::sync::Arc<str> = std::sync::Arc::from(name.as_str());
                builder.enqueue(TaskKind::EvalNodeVariantSetsAuthored, node, Some(set.clone()));
                builder.enqueue(TaskKind::EvalNodeVariantSetsFallback, node, Some(set.clone()));
                builder.enqueue(TaskKind::EvalNodeVariantSetsNoneFound, node, Some(set));
            }
        }
    }
    builder.enqueue(TaskKind::EvalUnresolvedPrimPathError, node, None);
}
