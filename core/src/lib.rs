//! `pcp-core`: the prim composition engine (`spec.md` §2). Builds, for a
//! namespace path and a root layer stack, the directed graph of opinion
//! sources (the *prim index*) and answers strength-ordered queries
//! against it.
//!
//! Five cooperating components, leaves first: [`map_expr`] (namespace
//! mapping algebra), [`graph`]/[`node`] (the node pool), [`strength`]
//! (the total order over nodes), [`builder`] (the task-driven indexer),
//! and [`finalize`] (culling, permissions, and the query surface).
//! [`layer`] and [`registry`] are the external collaborator contracts
//! everything else consumes opinions through.

pub mod arc;
pub mod builder;
pub mod config;
pub mod error;
pub mod finalize;
pub mod graph;
pub mod layer;
pub mod list_op;
pub mod map_expr;
pub mod node;
pub mod path;
pub mod registry;
pub mod strength;

use builder::{Builder, Inputs, StackFrame};
use error::PcpError;
use graph::Graph;
use layer::{Layer, LayerStackSite};
use node::{LayerStackHandle, NodeIndex};
use path::Path;
use registry::LayerStackRegistry;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

/// The finalized, queryable result of one build (`spec.md` §6
/// `Outputs.prim_index`). Bundles the finalized [`Graph`] with the prim
/// stack and the registry needed to resolve layer-stack handles back
/// into layers for queries.
#[derive(Clone)]
pub struct PrimIndex {
    graph: Graph,
    registry: LayerStackRegistry,
    prim_stack: Vec<finalize::PrimStackEntry>,
}

impl PrimIndex {
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn prim_stack(&self) -> &[finalize::PrimStackEntry] {
        &self.prim_stack
    }

    pub fn root_node(&self) -> NodeIndex {
        finalize::get_root_node(&self.graph)
    }

    pub fn node_range(&self, kind: finalize::RangeKind) -> Vec<NodeIndex> {
        finalize::get_node_range(&self.graph, kind)
    }

    pub fn prim_range(&self, kind: finalize::RangeKind) -> Vec<NodeIndex> {
        finalize::get_prim_range(&self.graph, &self.prim_stack, kind)
    }

    pub fn node_providing_spec(&self, layer: &Arc<dyn Layer>, path: &Path) -> Option<NodeIndex> {
        finalize::get_node_providing_spec(&self.graph, &self.registry, layer, path)
    }

    pub fn compose_authored_variant_selections(&self, node: NodeIndex) -> BTreeMap<String, String> {
        finalize::compose_authored_variant_selections(&self.graph, &self.registry, node)
    }

    pub fn compute_prim_child_names(&self) -> Vec<String> {
        finalize::compute_prim_child_names(&self.graph, &self.registry)
    }

    pub fn compute_prim_property_names(&self) -> Vec<String> {
        finalize::compute_prim_property_names(&self.graph, &self.registry)
    }
}

/// The result of building and finalizing one prim index (`spec.md` §6).
pub struct Outputs {
    pub prim_index: PrimIndex,
    pub all_errors: Vec<PcpError>,
    pub payload_state: builder::PayloadState,
    pub dynamic_file_format_dependency: builder::dynamic_format::DynamicFileFormatDependencyData,
    pub expression_variables_dependency: BTreeSet<String>,
    pub culled_dependencies: Vec<builder::CulledDependency>,
}

/// Builds and finalizes a complete prim index for `path` in
/// `root_layer_stack` (`spec.md` §2 "Data flow", entry point).
pub fn build_prim_index(
    path: &Path,
    root_layer_stack: LayerStackHandle,
    registry: &LayerStackRegistry,
    inputs: &Inputs,
) -> Outputs {
    let site = LayerStackSite {
        layer_stack: root_layer_stack,
        path: path.clone(),
    };
    let mut sub = build_prim_index_with_frame(&site, registry, inputs, true, true, None);

    let outcome = finalize::finalize(&mut sub.graph, registry, inputs.cull);
    sub.all_errors.extend(outcome.errors);
    sub.culled_dependencies.extend(outcome.culled_dependencies);

    Outputs {
        prim_index: PrimIndex {
            graph: sub.graph,
            registry: registry.clone(),
            prim_stack: outcome.prim_stack,
        },
        all_errors: sub.all_errors,
        payload_state: sub.payload_state,
        dynamic_file_format_dependency: sub.dynamic_file_format_dependency,
        expression_variables_dependency: sub.expression_variables_dependency,
        culled_dependencies: sub.culled_dependencies,
    }
}

/// Builds (but does not finalize) the graph for `site`, recursing to
/// establish the ancestral subgraph first when `site.path` has a parent
/// other than the pseudo-root (`spec.md` §2 "Data flow"). Used both as
/// the outermost entry point's first step and, recursively, by
/// `add_arc`'s `include_ancestral_opinions` branch
/// (`core::builder::arcs`) to build an arc target's own subgraph before
/// splicing it in.
///
/// `evaluate_variants_and_dynamic_payloads` and
/// `evaluate_implied_specializes` are `false` for nested/ancestral
/// builds: those decisions are deferred until the outermost build has
/// the whole graph assembled.
pub fn build_prim_index_with_frame(
    site: &LayerStackSite,
    registry: &LayerStackRegistry,
    inputs: &Inputs,
    evaluate_variants_and_dynamic_payloads: bool,
    evaluate_implied_specializes: bool,
    frame: Option<&StackFrame<'_>>,
) -> builder::Outputs {
    let graph = match site.path.parent_path() {
        Some(parent_path) if !parent_path.is_absolute_root() => {
            let parent_site = LayerStackSite {
                layer_stack: site.layer_stack,
                path: parent_path,
            };
            let mut parent_outputs =
                build_prim_index_with_frame(&parent_site, registry, inputs, false, false, frame);
            let child_name = site
                .path
                .name()
                .expect("a path with a non-root parent has its own name")
                .to_string();
            parent_outputs.graph.append_child_name_to_all_sites(&child_name);
            parent_outputs.graph
        }
        _ => Graph::new_graph(site.path.clone(), site.layer_stack, inputs.usd),
    };

    let mut builder = Builder::new(
        graph,
        registry,
        inputs,
        evaluate_variants_and_dynamic_payloads,
        evaluate_implied_specializes,
    );
    let root = builder.graph.root_index();
    builder::arcs::scan_and_enqueue(&mut builder, root);
    builder.run(frame);

    builder::Outputs {
        graph: builder.graph,
        all_errors: builder.errors.into_vec(),
        payload_state: builder.payload_state,
        dynamic_file_format_dependency: builder.dynamic_file_format_dependency,
        expression_variables_dependency: builder.expression_variables_dependency,
        culled_dependencies: builder.culled_dependencies,
    }
}
