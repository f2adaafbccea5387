//! External collaborator contracts (`spec.md` §6): layers and layer
//! stacks are consumed, never constructed, by this crate. Grounded on
//! `spec.md`'s interface list directly, and on
//! `cloudpeers-tlfs/crdt/src/doc.rs`'s trait-object-over-`Arc` pattern
//! for modeling an external collaborator the engine only calls into.

use crate::list_op::ListOp;
use crate::map_expr::{ExpressionVariables, MapExpression, TimeOffset};
use crate::node::LayerStackHandle;
use crate::path::Path;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A `(asset_path, prim_path, layer_offset)` triple as authored in a
/// references or payloads list-edit (`spec.md` §4.4.2).
#[derive(Clone, Debug, PartialEq)]
pub struct Reference {
    /// Empty means an internal reference (same layer stack).
    pub asset_path: Option<String>,
    /// `None` defers to the target layer's default-prim metadata.
    pub prim_path: Option<Path>,
    pub layer_offset: TimeOffset,
}

/// The field kinds the builder reads off a spec. Intentionally only
/// the fields the evaluators in `spec.md` §4.4.2 consume — this is not
/// a general scene-description value model.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldName {
    References,
    Payload,
    InheritPaths,
    SpecializesPaths,
    VariantSetNames,
    VariantSelection(String),
    Permission,
    Symmetry,
    Specifier,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    String(String),
    Path(Path),
    Paths(ListOp<Path>),
    References(ListOp<Reference>),
    VariantSetNames(Vec<String>),
}

/// An opaque, externally-owned source of specs and fields. The engine
/// calls only the three methods below; everything else (parsing,
/// on-disk format) is out of scope (`spec.md` §1).
pub trait Layer: std::fmt::Debug + Send + Sync {
    fn has_spec(&self, path: &Path) -> bool;
    fn has_field(&self, path: &Path, field: &FieldName) -> bool;
    fn get_field(&self, path: &Path, field: &FieldName) -> Option<FieldValue>;
    fn get_default_prim(&self) -> Option<Path>;
    fn get_time_codes_per_second(&self) -> f64;
    /// This layer's own ordered list of immediate namespace children of
    /// `path`, empty if it has no spec there. Backs
    /// `compute_prim_child_names` (`spec.md` §4.5).
    fn child_names(&self, path: &Path) -> Vec<String>;
    /// This layer's own property names at `path`. Backs
    /// `compute_prim_property_names` (`spec.md` §4.5).
    fn property_names(&self, path: &Path) -> Vec<String>;
    /// This layer's own list of variant names authored under
    /// `variant_set` at `path`, empty if it has no spec for that
    /// variant set. Backs variant-fallback selection (`spec.md` §4.4.2
    /// "Variants") the way `child_names` backs namespace-child
    /// enumeration: variant prims are external specs this crate doesn't
    /// otherwise have a way to list.
    fn variant_names(&self, path: &Path, variant_set: &str) -> Vec<String>;
}

/// The two disjoint relocation maps a layer stack resolves
/// (`spec.md` §3): the full accumulated map and the map contributed
/// by this layer stack's own layers alone ("incremental").
#[derive(Clone, Debug, Default)]
pub struct RelocatesMap {
    pub source_to_target: BTreeMap<Path, Path>,
    pub target_to_source: BTreeMap<Path, Path>,
    pub incremental_source_to_target: BTreeMap<Path, Path>,
    pub incremental_target_to_source: BTreeMap<Path, Path>,
}

/// Identifies a layer stack: its root/session layers and the asset
/// resolver context used to resolve relative references within it
/// (`spec.md` §6). Resolver context and layer identity are represented
/// as opaque strings since asset resolution itself is out of scope.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LayerStackIdentifier {
    pub root_layer: String,
    pub session_layer: Option<String>,
    pub path_resolver_context: String,
    pub expression_variables_source: Option<String>,
}

/// An immutable, strength-ordered sequence of layers plus resolved
/// relocations (`spec.md` §3). Layer stacks are interned by
/// [`crate::registry::LayerStackRegistry`]; equality is identity.
pub trait LayerStack: std::fmt::Debug + Send + Sync {
    fn identifier(&self) -> &LayerStackIdentifier;
    fn layers(&self) -> &[std::sync::Arc<dyn Layer>];
    fn has_relocates(&self) -> bool;
    fn relocates(&self) -> &RelocatesMap;
    fn expression_for_relocates_at(&self, path: &Path) -> MapExpression;
    fn expression_variables(&self) -> &ExpressionVariables;

    /// Composes `has_field`/`get_field` across this stack's layers,
    /// strongest first, returning the layer index and value of the
    /// first layer that has the field.
    fn compose_value(&self, path: &Path, field: &FieldName) -> Option<(usize, FieldValue)> {
        self.layers()
            .iter()
            .enumerate()
            .find_map(|(i, layer)| layer.get_field(path, field).map(|v| (i, v)))
    }

    /// Every layer's opinion for `field`, strongest first, skipping
    /// layers with no opinion. Used by dynamic file-format contexts
    /// that need the whole stack, not just the strongest layer.
    fn compose_value_stack(&self, path: &Path, field: &FieldName) -> Vec<FieldValue> {
        self.layers()
            .iter()
            .filter_map(|layer| layer.get_field(path, field))
            .collect()
    }
}

/// A `(layer_stack, path)` pair: the fundamental address used
/// throughout the engine (`spec.md` §3).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LayerStackSite {
    pub layer_stack: LayerStackHandle,
    pub path: Path,
}

/// Resolves a reference or payload's asset path to a layer stack.
/// Asset resolution itself (relative-path anchoring, on-disk formats)
/// is out of scope (`spec.md` §1); this is the one call the builder
/// makes into that external system.
pub trait AssetResolver: std::fmt::Debug + Send + Sync {
    fn resolve(&self, anchor: &LayerStackIdentifier, asset_path: &str) -> Option<Arc<dyn LayerStack>>;
    fn is_muted(&self, asset_path: &str) -> bool;
}
