//! Per-arc-kind task evaluators (`spec.md` §4.4.2; grounded on the
//! `_EvalNode*`/`_EvalImplied*` functions of `primIndex.cpp`).

use super::arcs::{add_arc, ArcOptions, ArcRequest};
use super::{PayloadState, StackFrame, Task, TaskKind};
use crate::arc::ArcKind;
use crate::error::PcpError;
use crate::layer::{FieldName, FieldValue, LayerStackSite, Reference};
use crate::list_op;
use crate::map_expr::{MapExpression, MapFunction, TimeOffset};
use crate::node::NodeIndex;
use crate::path::Path;
use std::sync::Arc;

use super::Builder;

pub fn dispatch(builder: &mut Builder<'_>, task: &Task, frame: Option<&StackFrame<'_>>) {
    match task.kind {
        TaskKind::EvalNodeRelocations => eval_node_relocations(builder, frame, task.node),
        TaskKind::EvalImpliedRelocations => eval_implied_relocations(builder, task.node),
        TaskKind::EvalNodeReferences => eval_references_or_payloads(builder, frame, task.node, false),
        TaskKind::EvalNodePayloadsStatic => eval_references_or_payloads(builder, frame, task.node, true),
        TaskKind::EvalNodeInherits => eval_classes(builder, frame, task.node, ArcKind::Inherit),
        TaskKind::EvalImpliedClasses => eval_implied_classes(builder, task.node),
        TaskKind::EvalNodeSpecializes => eval_classes(builder, frame, task.node, ArcKind::Specialize),
        TaskKind::EvalImpliedSpecializes => eval_implied_specializes(builder, task.node),
        TaskKind::EvalNodeAncestralVariantSetsAuthored | TaskKind::EvalNodeVariantSetsAuthored => {
            eval_variant_authored(builder, task.node, task.variant_set.clone())
        }
        TaskKind::EvalNodeAncestralVariantSetsFallback | TaskKind::EvalNodeVariantSetsFallback => {
            eval_variant_fallback(builder, task.node, task.variant_set.clone())
        }
        TaskKind::EvalNodeAncestralVariantSetsNoneFound | TaskKind::EvalNodeVariantSetsNoneFound => {}
        TaskKind::EvalNodeAncestralDynamicPayloads | TaskKind::EvalNodeDynamicPayloads => {
            eval_dynamic_payload(builder, task.node)
        }
        TaskKind::EvalUnresolvedPrimPathError => eval_unresolved_prim_path(builder, task.node),
    }
}

fn eval_node_relocations(builder: &mut Builder<'_>, frame: Option<&StackFrame<'_>>, node: NodeIndex) {
    let layer_stack = builder.registry.get(builder.graph.node(node).shared.layer_stack);
    let path = builder.graph.site(node).clone();
    let source = match layer_stack.relocates().target_to_source.get(&path) {
        Some(s) => s.clone(),
        None => return,
    };

    let children: Vec<NodeIndex> = builder.graph.children(node).collect();
    for child in children {
        if !builder.graph.node(child).kind().is_inherit_or_specialize() {
            builder.graph.set_culled(child, true);
        }
    }

    let layer_stack_handle = builder.graph.node(node).shared.layer_stack;
    add_arc(
        builder,
        frame,
        ArcRequest {
            parent: node,
            source_site: LayerStackSite {
                layer_stack: layer_stack_handle,
                path: source,
            },
            map_to_parent: MapExpression::identity(),
            kind: ArcKind::Relocate,
            sibling_num_at_origin: 0,
            namespace_depth: path.namespace_depth() as u16,
            origin: node,
            options: ArcOptions {
                include_ancestral_opinions: true,
                ..ArcOptions::default()
            },
        },
    );

    if layer_stack.layers().iter().any(|l| l.has_spec(&path)) {
        builder.errors.push(PcpError::OpinionAtRelocationSource { path });
    }

    builder.enqueue(TaskKind::EvalImpliedRelocations, node, None);
}

/// Propagates a relocation up by one step using the grandparent's
/// `map_to_parent`, so ancestors that reach the relocated site through
/// another arc also see the rename (`spec.md` §4.4.2 "Relocations").
fn eval_implied_relocations(builder: &mut Builder<'_>, node: NodeIndex) {
    let parent = match builder.graph.parent(node) {
        Some(p) => p,
        None => return,
    };
    let grandparent = match builder.graph.parent(parent) {
        Some(g) => g,
        None => return,
    };

    let parent_map = builder.graph.node(parent).map_to_parent().clone();
    let parent_layer_stack = builder.registry.get(builder.graph.node(parent).shared.layer_stack);
    let vars = parent_layer_stack.expression_variables();
    builder.expression_variables_dependency.extend(parent_map.variable_names());

    let node_path = builder.graph.site(node).clone();
    let gp_reloc_source = match parent_map.map_source_to_target(vars, &node_path) {
        Some(p) => p,
        None => return,
    };

    let already_propagated = builder
        .graph
        .children(grandparent)
        .any(|c| builder.graph.node(c).kind() == ArcKind::Relocate && *builder.graph.site(c) == gp_reloc_source);
    if already_propagated {
        return;
    }

    let gp_layer_stack = builder.graph.node(grandparent).shared.layer_stack;
    add_arc(
        builder,
        None,
        ArcRequest {
            parent: grandparent,
            source_site: LayerStackSite {
                layer_stack: gp_layer_stack,
                path: gp_reloc_source,
            },
            map_to_parent: MapExpression::identity(),
            kind: ArcKind::Relocate,
            sibling_num_at_origin: 0,
            namespace_depth: node_path.namespace_depth() as u16,
            origin: node,
            options: ArcOptions {
                direct_node_contributes_specs: false,
                ..ArcOptions::default()
            },
        },
    );
}

fn eval_references_or_payloads(builder: &mut Builder<'_>, frame: Option<&StackFrame<'_>>, node: NodeIndex, is_payload: bool) {
    let layer_stack = builder.registry.get(builder.graph.node(node).shared.layer_stack);
    let path = builder.graph.site(node).clone();
    let field = if is_payload { FieldName::Payload } else { FieldName::References };

    let refs = list_op::compose(layer_stack.layers().iter().filter_map(|l| {
        match l.get_field(&path, &field) {
            Some(FieldValue::References(op)) => Some(op),
            _ => None,
        }
    }));

    if is_payload {
        if let Some(included) = included(builder, &path) {
            builder.payload_state = included;
            if !matches!(
                builder.payload_state,
                PayloadState::IncludedByIncludeSet | PayloadState::IncludedByPredicate
            ) {
                return;
            }
        }
    }

    for (i, reference) in refs.into_iter().enumerate() {
        add_reference_arc(builder, frame, node, &path, reference, i as u16, is_payload);
    }
}

fn included(builder: &Builder<'_>, path: &Path) -> Option<PayloadState> {
    if let Some(set) = &builder.inputs.included_payloads {
        let contains = set.read().contains(path);
        return Some(if contains {
            PayloadState::IncludedByIncludeSet
        } else {
            PayloadState::ExcludedByIncludeSet
        });
    }
    if let Some(predicate) = &builder.inputs.include_payload_predicate {
        return Some(if predicate(path) {
            PayloadState::IncludedByPredicate
        } else {
            PayloadState::ExcludedByPredicate
        });
    }
    None
}

fn add_reference_arc(
    builder: &mut Builder<'_>,
    frame: Option<&StackFrame<'_>>,
    node: NodeIndex,
    referencing_path: &Path,
    reference: Reference,
    sibling_num: u16,
    is_payload: bool,
) {
    let node_layer_stack = builder.graph.node(node).shared.layer_stack;

    let target_stack = if reference.asset_path.as_deref().unwrap_or("").is_empty() {
        node_layer_stack
    } else if let Some(resolver) = builder.inputs.asset_resolver.clone() {
        let asset_path = reference.asset_path.clone().unwrap();
        if resolver.is_muted(&asset_path) {
            builder.errors.push(PcpError::MutedAssetPath {
                site: referencing_path.clone(),
                asset_path,
            });
            return;
        }
        let identifier = builder
            .registry
            .get(node_layer_stack)
            .identifier()
            .clone();
        match resolver.resolve(&identifier, &asset_path) {
            Some(stack) => builder.registry.intern(stack),
            None => {
                builder.errors.push(PcpError::InvalidAssetPath {
                    site: referencing_path.clone(),
                    asset_path,
                });
                return;
            }
        }
    } else {
        builder.errors.push(PcpError::InvalidAssetPath {
            site: referencing_path.clone(),
            asset_path: reference.asset_path.clone().unwrap_or_default(),
        });
        return;
    };

    let target_path = match reference.prim_path.clone() {
        Some(p) => p,
        None => {
            let stack = builder.registry.get(target_stack);
            match stack.layers().first().and_then(|l| l.get_default_prim()) {
                Some(p) => p,
                None => {
                    builder.errors.push(PcpError::UnresolvedPrimPath {
                        site: referencing_path.clone(),
                    });
                    if !crate::config::new_default_standin_behavior() {
                        return;
                    }
                    Path::absolute_root()
                }
            }
        }
    };

    let source_time = builder.registry.get(node_layer_stack).layers().first().map(|l| l.get_time_codes_per_second());
    let target_time = builder.registry.get(target_stack).layers().first().map(|l| l.get_time_codes_per_second());
    let mut offset = reference.layer_offset;
    if let (Some(s), Some(t)) = (source_time, target_time) {
        if s != t && t != 0.0 {
            offset.scale *= s / t;
        }
    }

    let map = MapExpression::constant(MapFunction::constant(
        vec![(target_path.clone(), referencing_path.strip_variant_selections())],
        offset,
    ))
    .add_root_identity();

    let new_node = add_arc(
        builder,
        frame,
        ArcRequest {
            parent: node,
            source_site: LayerStackSite {
                layer_stack: target_stack,
                path: target_path,
            },
            map_to_parent: map,
            kind: if is_payload { ArcKind::Payload } else { ArcKind::Reference },
            sibling_num_at_origin: sibling_num,
            namespace_depth: referencing_path.namespace_depth() as u16,
            origin: node,
            options: ArcOptions::default(),
        },
    );
    if let Some(new_node) = new_node {
        builder.enqueue(TaskKind::EvalImpliedClasses, new_node, None);
    }
}

fn eval_classes(builder: &mut Builder<'_>, frame: Option<&StackFrame<'_>>, node: NodeIndex, kind: ArcKind) {
    let layer_stack = builder.registry.get(builder.graph.node(node).shared.layer_stack);
    let path = builder.graph.site(node).clone();
    let field = if kind.is_specialize() {
        FieldName::SpecializesPaths
    } else {
        FieldName::InheritPaths
    };

    let targets = list_op::compose(layer_stack.layers().iter().filter_map(|l| match l.get_field(&path, &field) {
        Some(FieldValue::Paths(op)) => Some(op),
        _ => None,
    }));

    for (i, target) in targets.into_iter().enumerate() {
        if target.has_variant_selection() || target.is_absolute_root() {
            builder.errors.push(PcpError::InvalidPrimPath { path: target });
            continue;
        }
        let map = MapExpression::constant(MapFunction::constant(
            vec![(target.clone(), path.strip_variant_selections())],
            TimeOffset::IDENTITY,
        ))
        .add_root_identity();
        let subroot = target.namespace_depth() > 1;
        let new_node = add_arc(
            builder,
            frame,
            ArcRequest {
                parent: node,
                source_site: LayerStackSite {
                    layer_stack: builder.graph.node(node).shared.layer_stack,
                    path: target,
                },
                map_to_parent: map,
                kind,
                sibling_num_at_origin: i as u16,
                namespace_depth: path.namespace_depth() as u16,
                origin: node,
                options: ArcOptions {
                    include_ancestral_opinions: subroot,
                    ..ArcOptions::default()
                },
            },
        );
        if let Some(new_node) = new_node {
            builder.enqueue(TaskKind::EvalImpliedClasses, new_node, None);
        }
    }
}

/// Propagates `node`'s class-based (inherit/specialize) children up to
/// its parent, so "the class follows the instance" across the arc that
/// introduced `node` (`spec.md` §4.4.2 "Implied Classes").
///
/// Scheduled for every node; a no-op unless `node` was introduced by an
/// arc kind that can carry class children along with it.
fn eval_implied_classes(builder: &mut Builder<'_>, node: NodeIndex) {
    if !matches!(
        builder.graph.node(node).kind(),
        ArcKind::Reference | ArcKind::Payload | ArcKind::Inherit | ArcKind::Specialize
    ) {
        return;
    }
    let dest = match builder.graph.parent(node) {
        Some(p) => p,
        None => return,
    };
    let transfer = builder.graph.node(node).map_to_parent().clone();
    propagate_class_children(builder, node, dest, &transfer);
}

fn propagate_class_children(builder: &mut Builder<'_>, src: NodeIndex, dest: NodeIndex, transfer: &MapExpression) {
    let class_children: Vec<NodeIndex> = builder
        .graph
        .children(src)
        .filter(|&c| builder.graph.node(c).kind().is_inherit_or_specialize())
        .collect();

    for child in class_children {
        let child_node = builder.graph.node(child);
        let kind = child_node.kind();
        let sibling_num = child_node.shared.arc.sibling_num_at_origin;
        let namespace_depth = child_node.shared.arc.namespace_depth;
        let child_map = child_node.map_to_parent().clone();
        let layer_stack = child_node.shared.layer_stack;
        let site_path = child_node.unshared.site.clone();

        // Places the copied class arc into `dest`'s namespace: map from
        // the new child's own namespace through `child`'s existing
        // mapping into `src`'s namespace, then through `transfer` into
        // `dest`'s namespace.
        let equiv_map = child_map.compose(transfer).add_root_identity();

        if let Some(existing) = builder
            .graph
            .children(dest)
            .find(|&c| builder.graph.site(c).strip_variant_selections() == site_path.strip_variant_selections())
        {
            tracing::warn!(
                node = existing.index(),
                "multiple arcs imply the same class; keeping the first-encountered node"
            );
            continue;
        }

        if add_arc(
            builder,
            None,
            ArcRequest {
                parent: dest,
                source_site: LayerStackSite { layer_stack, path: site_path },
                map_to_parent: equiv_map.clone(),
                kind,
                sibling_num_at_origin: sibling_num,
                namespace_depth,
                origin: child,
                options: ArcOptions {
                    include_ancestral_opinions: false,
                    ..ArcOptions::default()
                },
            },
        )
        .is_some()
        {
            propagate_class_children(builder, child, dest, &equiv_map);
        }
    }
}

/// Propagates specializes subtrees toward the graph root so strength
/// ordering naturally places them last (`spec.md` §4.4.2 "Implied
/// Specializes"). A simplified single-pass version: walks `node`'s
/// specializes-kind children and re-adds each as a child of the graph
/// root with the composed root-relative map.
fn eval_implied_specializes(builder: &mut Builder<'_>, node: NodeIndex) {
    if !builder.evaluate_implied_specializes {
        return;
    }
    let root = builder.graph.root_index();
    let specialize_children: Vec<NodeIndex> = builder
        .graph
        .children(node)
        .filter(|&c| builder.graph.node(c).kind().is_specialize())
        .collect();

    for child in specialize_children {
        if node == root {
            continue;
        }
        let map_to_root = builder.graph.map_to_root(child);
        let child_node = builder.graph.node(child);
        let sibling_num = child_node.shared.arc.sibling_num_at_origin;
        let namespace_depth = child_node.shared.arc.namespace_depth;
        let layer_stack = child_node.shared.layer_stack;
        let site_path = child_node.unshared.site.clone();

        let new_node = add_arc(
            builder,
            None,
            ArcRequest {
                parent: root,
                source_site: LayerStackSite { layer_stack, path: site_path },
                map_to_parent: map_to_root,
                kind: ArcKind::Specialize,
                sibling_num_at_origin: sibling_num,
                namespace_depth,
                origin: child,
                options: ArcOptions {
                    include_ancestral_opinions: false,
                    ..ArcOptions::default()
                },
            },
        );
        if let Some(new_node) = new_node {
            builder.enqueue(TaskKind::EvalImpliedClasses, new_node, None);
        }
    }
}

fn eval_variant_authored(builder: &mut Builder<'_>, node: NodeIndex, variant_set: Option<Arc<str>>) {
    let variant_set = match variant_set {
        Some(v) => v,
        None => return,
    };
    let selection = compose_variant_selection(builder, node, &variant_set);
    if let Some(selection) = selection {
        add_variant_arc(builder, node, &variant_set, &selection);
        builder.retry_variant_tasks(node, &variant_set);
    }
}

fn eval_variant_fallback(builder: &mut Builder<'_>, node: NodeIndex, variant_set: Option<Arc<str>>) {
    let variant_set = match variant_set {
        Some(v) => v,
        None => return,
    };
    let options = variant_set_options(builder, node, &variant_set);
    let fallbacks = builder.inputs.variant_fallbacks.get(variant_set.as_ref());
    let chosen = fallbacks.and_then(|list| list.iter().find(|name| options.contains(*name)).cloned());
    if let Some(selection) = chosen {
        add_variant_arc(builder, node, &variant_set, &selection);
        builder.retry_variant_tasks(node, &variant_set);
    }
}

fn compose_variant_selection(builder: &Builder<'_>, node: NodeIndex, variant_set: &str) -> Option<String> {
    for candidate in builder.graph.nodes_strong_to_weak() {
        let layer_stack = builder.registry.get(builder.graph.node(candidate).shared.layer_stack);
        let path = builder.graph.site(candidate);
        if let Some((_, FieldValue::String(sel))) =
            layer_stack.compose_value(path, &FieldName::VariantSelection(variant_set.to_string()))
        {
            return Some(sel);
        }
    }
    None
}

/// The variant names actually authored under `variant_set` at `node`'s
/// site, which a fallback selection must match to be usable
/// (`spec.md` §4.4.2 "Variants"). Only considered if `variant_set`
/// itself is named in the composed variant-set-names list; the actual
/// option names come from each layer's own `variant_names`, strongest
/// layer that declares any winning (first-one-wins, like `child_names`).
fn variant_set_options(builder: &Builder<'_>, node: NodeIndex, variant_set: &str) -> Vec<String> {
    let layer_stack = builder.registry.get(builder.graph.node(node).shared.layer_stack);
    let path = builder.graph.site(node);
    match layer_stack.compose_value(path, &FieldName::VariantSetNames) {
        Some((_, FieldValue::VariantSetNames(names))) if names.iter().any(|n| n == variant_set) => {}
        _ => return Vec::new(),
    }
    layer_stack
        .layers()
        .iter()
        .map(|l| l.variant_names(path, variant_set))
        .find(|names| !names.is_empty())
        .unwrap_or_default()
}

fn add_variant_arc(builder: &mut Builder<'_>, node: NodeIndex, variant_set: &str, selection: &str) {
    let path = builder.graph.site(node).clone();
    let variant_path = path.append_variant_selection(variant_set, selection);
    let layer_stack = builder.graph.node(node).shared.layer_stack;
    add_arc(
        builder,
        None,
        ArcRequest {
            parent: node,
            source_site: LayerStackSite { layer_stack, path: variant_path },
            map_to_parent: MapExpression::identity(),
            kind: ArcKind::Variant,
            sibling_num_at_origin: 0,
            namespace_depth: path.namespace_depth() as u16,
            origin: node,
            options: ArcOptions::default(),
        },
    );
}

/// Dynamic file-format argument generation dispatches to an external
/// plugin (`spec.md` §4.4.2, §6); that dispatch is an external
/// collaborator call this crate does not implement. What belongs here
/// is recording that the node's file format was consulted, so the
/// dependency data is non-empty and future changes can be noticed.
fn eval_dynamic_payload(builder: &mut Builder<'_>, node: NodeIndex) {
    let layer_stack = builder.registry.get(builder.graph.node(node).shared.layer_stack);
    let path = builder.graph.site(node).clone();
    if layer_stack.compose_value(&path, &FieldName::Payload).is_some() {
        builder
            .dynamic_file_format_dependency
            .note_field(&FieldName::Payload);
    }
}

fn eval_unresolved_prim_path(builder: &mut Builder<'_>, node: NodeIndex) {
    if builder.graph.site(node).is_absolute_root() && builder.graph.node(node).unshared.inert {
        builder.errors.push(PcpError::UnresolvedPrimPath {
            site: builder.graph.site(node).clone(),
        });
    }
}
