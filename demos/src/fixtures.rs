//! Hand-built fixture layers and layer stacks for the demonstration
//! scenarios (`spec.md` §8, E1-E7). Plain Rust constructors, not a
//! layer-format parser: on-disk formats stay out of scope the way
//! `spec.md` §1 scopes them.

use pcp_core::layer::{
    FieldName, FieldValue, Layer, LayerStack, LayerStackIdentifier, Reference, RelocatesMap,
};
use pcp_core::map_expr::{ExpressionVariables, MapExpression, TimeOffset};
use pcp_core::path::Path;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct FixtureLayer {
    name: String,
    specs: HashMap<Path, HashMap<FieldName, FieldValue>>,
    children: HashMap<Path, Vec<String>>,
    properties: HashMap<Path, Vec<String>>,
    variants: HashMap<(Path, String), Vec<String>>,
    default_prim: Option<Path>,
}

impl FixtureLayer {
    pub fn new(name: &str) -> Self {
        FixtureLayer {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Declares a prim spec at `path` with no fields, registering it as
    /// a named child of its parent.
    pub fn prim(mut self, path: &Path) -> Self {
        self.specs.entry(path.clone()).or_default();
        if let Some(parent) = path.parent_path() {
            if let Some(name) = path.name() {
                self.children.entry(parent).or_default().push(name.to_string());
            }
        }
        self
    }

    pub fn field(mut self, path: &Path, field: FieldName, value: FieldValue) -> Self {
        self.specs.entry(path.clone()).or_default().insert(field, value);
        self
    }

    pub fn property(mut self, path: &Path, name: &str) -> Self {
        self.properties.entry(path.clone()).or_default().push(name.to_string());
        self
    }

    /// Declares `name` as an authored variant option under `variant_set`
    /// at `path`, the way a real layer's variant spec would be enumerated.
    pub fn variant(mut self, path: &Path, variant_set: &str, name: &str) -> Self {
        self.variants
            .entry((path.clone(), variant_set.to_string()))
            .or_default()
            .push(name.to_string());
        self
    }

    pub fn default_prim(mut self, path: &Path) -> Self {
        self.default_prim = Some(path.clone());
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl Layer for FixtureLayer {
    fn has_spec(&self, path: &Path) -> bool {
        self.specs.contains_key(path)
    }

    fn has_field(&self, path: &Path, field: &FieldName) -> bool {
        self.specs.get(path).map_or(false, |f| f.contains_key(field))
    }

    fn get_field(&self, path: &Path, field: &FieldName) -> Option<FieldValue> {
        self.specs.get(path)?.get(field).cloned()
    }

    fn get_default_prim(&self) -> Option<Path> {
        self.default_prim.clone()
    }

    fn get_time_codes_per_second(&self) -> f64 {
        24.0
    }

    fn child_names(&self, path: &Path) -> Vec<String> {
        self.children.get(path).cloned().unwrap_or_default()
    }

    fn property_names(&self, path: &Path) -> Vec<String> {
        self.properties.get(path).cloned().unwrap_or_default()
    }

    fn variant_names(&self, path: &Path, variant_set: &str) -> Vec<String> {
        self.variants
            .get(&(path.clone(), variant_set.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

/// A layer stack with no relocations, built from a strongest-to-weakest
/// list of layers. The demonstration scenarios never relocate, so this
/// is the only `LayerStack` shape `pcp-demo` needs.
#[derive(Debug)]
pub struct FixtureLayerStack {
    identifier: LayerStackIdentifier,
    layers: Vec<Arc<dyn Layer>>,
    relocates: RelocatesMap,
    vars: ExpressionVariables,
}

impl FixtureLayerStack {
    pub fn new(name: &str, layers: Vec<Arc<dyn Layer>>) -> Arc<Self> {
        Arc::new(FixtureLayerStack {
            identifier: LayerStackIdentifier {
                root_layer: name.to_string(),
                session_layer: None,
                path_resolver_context: String::new(),
                expression_variables_source: None,
            },
            layers,
            relocates: RelocatesMap::default(),
            vars: ExpressionVariables::default(),
        })
    }
}

impl LayerStack for FixtureLayerStack {
    fn identifier(&self) -> &LayerStackIdentifier {
        &self.identifier
    }

    fn layers(&self) -> &[Arc<dyn Layer>] {
        &self.layers
    }

    fn has_relocates(&self) -> bool {
        false
    }

    fn relocates(&self) -> &RelocatesMap {
        &self.relocates
    }

    fn expression_for_relocates_at(&self, _path: &Path) -> MapExpression {
        MapExpression::identity()
    }

    fn expression_variables(&self) -> &ExpressionVariables {
        &self.vars
    }
}

pub fn internal_reference(prim_path: &Path) -> Reference {
    Reference {
        asset_path: None,
        prim_path: Some(prim_path.clone()),
        layer_offset: TimeOffset::IDENTITY,
    }
}

pub fn asset_reference(asset_path: &str, prim_path: Option<Path>) -> Reference {
    Reference {
        asset_path: Some(asset_path.to_string()),
        prim_path,
        layer_offset: TimeOffset::IDENTITY,
    }
}
