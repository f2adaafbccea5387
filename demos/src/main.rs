//! Fixture-driven demonstration CLI (`spec.md` §8 scenarios E1-E7).
//!
//! Builds a prim index against a hand-constructed in-memory layer
//! stack and prints the resulting prim stack, errors, and payload
//! state. No on-disk layer format is parsed; that boundary stays out
//! of scope the way `spec.md` §1 scopes it.

mod fixtures;

use anyhow::{bail, Result};
use clap::Parser;
use fixtures::{asset_reference, internal_reference, FixtureLayer, FixtureLayerStack};
use pcp_core::builder::Inputs;
use pcp_core::layer::{
    AssetResolver, FieldName, FieldValue, LayerStack, LayerStackIdentifier,
};
use pcp_core::list_op::ListOp;
use pcp_core::path::Path;
use pcp_core::registry::LayerStackRegistry;
use pcp_core::Outputs;
use std::collections::HashMap;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(about = "Builds and prints prim indexes for the composition engine's demonstration scenarios")]
struct Cli {
    /// Scenario to run: e1..e7, or "all".
    scenario: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    type Scenario = fn() -> (Path, LayerStackRegistry, pcp_core::node::LayerStackHandle, Inputs);
    let scenarios: Vec<(&str, Scenario)> = vec![
        ("e1", scenario_e1),
        ("e2", scenario_e2),
        ("e3", scenario_e3),
        ("e4", scenario_e4),
        ("e5", scenario_e5),
        ("e6", scenario_e6),
        ("e7", scenario_e7),
    ];

    let selected: Vec<_> = if cli.scenario == "all" {
        scenarios
    } else {
        let found = scenarios
            .into_iter()
            .filter(|(name, _)| *name == cli.scenario)
            .collect::<Vec<_>>();
        if found.is_empty() {
            bail!("unknown scenario {:?}, expected one of e1..e7 or \"all\"", cli.scenario);
        }
        found
    };

    for (name, make) in selected {
        let (path, registry, root_handle, inputs) = make();
        let outputs = pcp_core::build_prim_index(&path, root_handle, &registry, &inputs);
        print_outcome(name, &path, &outputs);
    }
    Ok(())
}

fn print_outcome(name: &str, path: &Path, outputs: &Outputs) {
    println!("=== {name}: building {path} ===");
    let index = &outputs.prim_index;
    for entry in index.prim_stack() {
        let node = index.graph().node(entry.node);
        println!(
            "  prim-stack: node={:?} kind={:?} site={} layer_index={}",
            entry.node,
            node.kind(),
            node.site(),
            entry.layer_index
        );
    }
    let children = index.compute_prim_child_names();
    if !children.is_empty() {
        println!("  children: {children:?}");
    }
    let properties = index.compute_prim_property_names();
    if !properties.is_empty() {
        println!("  properties: {properties:?}");
    }
    println!("  payload_state: {:?}", outputs.payload_state);
    for error in &outputs.all_errors {
        println!("  error: {error}");
    }
    println!();
}

// E1: Two-layer strongest-wins. Both layers declare /A and a "x"
// property; the stronger (first) layer's opinion is what the prim
// stack's strongest entry reflects.
fn scenario_e1() -> (Path, LayerStackRegistry, pcp_core::node::LayerStackHandle, Inputs) {
    let root = Path::absolute_root();
    let a = root.append_child("A");

    let strong = FixtureLayer::new("strong.usd").prim(&a).property(&a, "x").build();
    let weak = FixtureLayer::new("weak.usd").prim(&a).property(&a, "x").build();
    let stack = FixtureLayerStack::new("root.usd", vec![strong, weak]);

    let registry = LayerStackRegistry::new();
    let handle = registry.intern(stack);
    (a, registry, handle, Inputs::default())
}

// E2: Internal reference. root: /A -> refs </B>; /B { x=1 }.
fn scenario_e2() -> (Path, LayerStackRegistry, pcp_core::node::LayerStackHandle, Inputs) {
    let root = Path::absolute_root();
    let a = root.append_child("A");
    let b = root.append_child("B");

    let layer = FixtureLayer::new("root.usd")
        .prim(&a)
        .field(
            &a,
            FieldName::References,
            FieldValue::References(ListOp::explicit(vec![internal_reference(&b)])),
        )
        .prim(&b)
        .property(&b, "x")
        .build();
    let stack = FixtureLayerStack::new("root.usd", vec![layer]);

    let registry = LayerStackRegistry::new();
    let handle = registry.intern(stack);
    (a, registry, handle, Inputs::default())
}

// E3: Default-prim reference. root: /A -> refs @ref.usd@ (no prim);
// ref.usd: defaultPrim=B; /B { x=2 }.
fn scenario_e3() -> (Path, LayerStackRegistry, pcp_core::node::LayerStackHandle, Inputs) {
    let root = Path::absolute_root();
    let a = root.append_child("A");
    let b = root.append_child("B");

    let ref_layer = FixtureLayer::new("ref.usd").prim(&b).property(&b, "x").default_prim(&b).build();
    let ref_stack: Arc<dyn LayerStack> = FixtureLayerStack::new("ref.usd", vec![ref_layer]);

    let root_layer = FixtureLayer::new("root.usd")
        .prim(&a)
        .field(
            &a,
            FieldName::References,
            FieldValue::References(ListOp::explicit(vec![asset_reference("ref.usd", None)])),
        )
        .build();
    let root_stack = FixtureLayerStack::new("root.usd", vec![root_layer]);

    let registry = LayerStackRegistry::new();
    let handle = registry.intern(root_stack);
    let resolver = Arc::new(NamedAssetResolver::new(vec![("ref.usd".to_string(), ref_stack)]));

    let mut inputs = Inputs::default();
    inputs.asset_resolver = Some(resolver);
    (a, registry, handle, inputs)
}

// E4: Nested classes with ancestral inherit. /CharRig inherits
// /_class_Rig; both have an "Arm" child; building /CharRig/Arm should
// surface the implied inherit arc to /_class_Rig/Arm alongside the
// authored one (`spec.md` §4.4.2 "ancestral-child-of-ancestral-class").
fn scenario_e4() -> (Path, LayerStackRegistry, pcp_core::node::LayerStackHandle, Inputs) {
    let root = Path::absolute_root();
    let class_rig = root.append_child("_class_Rig");
    let class_arm = class_rig.append_child("Arm");
    let char_rig = root.append_child("CharRig");
    let char_arm = char_rig.append_child("Arm");

    let layer = FixtureLayer::new("root.usd")
        .prim(&class_rig)
        .prim(&class_arm)
        .property(&class_arm, "length")
        .prim(&char_rig)
        .field(
            &char_rig,
            FieldName::InheritPaths,
            FieldValue::Paths(ListOp::explicit(vec![class_rig.clone()])),
        )
        .prim(&char_arm)
        .property(&char_arm, "color")
        .build();
    let stack = FixtureLayerStack::new("root.usd", vec![layer]);

    let registry = LayerStackRegistry::new();
    let handle = registry.intern(stack);
    (char_arm, registry, handle, Inputs::default())
}

// E5: Specializes propagation. /Hero specializes /_class_Weak; the
// implied specializes arc should propagate to any node whose origin
// chain leads back into /_class_Weak.
fn scenario_e5() -> (Path, LayerStackRegistry, pcp_core::node::LayerStackHandle, Inputs) {
    let root = Path::absolute_root();
    let class_weak = root.append_child("_class_Weak");
    let hero = root.append_child("Hero");

    let layer = FixtureLayer::new("root.usd")
        .prim(&class_weak)
        .property(&class_weak, "tint")
        .prim(&hero)
        .field(
            &hero,
            FieldName::SpecializesPaths,
            FieldValue::Paths(ListOp::explicit(vec![class_weak.clone()])),
        )
        .build();
    let stack = FixtureLayerStack::new("root.usd", vec![layer]);

    let registry = LayerStackRegistry::new();
    let handle = registry.intern(stack);
    (hero, registry, handle, Inputs::default())
}

// E6: Variant-in-variant selection. /A { variantSet s1 = { "a" {
// variantSet s2 = { "b" { variantSet s3 = { "x", "y" } } } } } }.
// s1 and s2 carry explicit authored selections (s1=a, s2=b); s3 has no
// authored selection and falls back to the first option that matches
// `Inputs::variant_fallbacks` (`spec.md` §4.4.2 "Variants", property 6).
fn scenario_e6() -> (Path, LayerStackRegistry, pcp_core::node::LayerStackHandle, Inputs) {
    let root = Path::absolute_root();
    let a = root.append_child("A");
    let a_s1_a = a.append_variant_selection("s1", "a");
    let a_s1_a_s2_b = a_s1_a.append_variant_selection("s2", "b");

    let layer = FixtureLayer::new("root.usd")
        .prim(&a)
        .field(
            &a,
            FieldName::VariantSetNames,
            FieldValue::VariantSetNames(vec!["s1".to_string()]),
        )
        .field(
            &a,
            FieldName::VariantSelection("s1".to_string()),
            FieldValue::String("a".to_string()),
        )
        .variant(&a, "s1", "a")
        .prim(&a_s1_a)
        .field(
            &a_s1_a,
            FieldName::VariantSetNames,
            FieldValue::VariantSetNames(vec!["s2".to_string()]),
        )
        .field(
            &a_s1_a,
            FieldName::VariantSelection("s2".to_string()),
            FieldValue::String("b".to_string()),
        )
        .variant(&a_s1_a, "s2", "b")
        .prim(&a_s1_a_s2_b)
        .property(&a_s1_a_s2_b, "variantColor")
        .field(
            &a_s1_a_s2_b,
            FieldName::VariantSetNames,
            FieldValue::VariantSetNames(vec!["s3".to_string()]),
        )
        .variant(&a_s1_a_s2_b, "s3", "x")
        .variant(&a_s1_a_s2_b, "s3", "y")
        .build();
    let stack = FixtureLayerStack::new("root.usd", vec![layer]);

    let registry = LayerStackRegistry::new();
    let handle = registry.intern(stack);

    let mut inputs = Inputs::default();
    inputs.variant_fallbacks.insert("s3".to_string(), vec!["x".to_string()]);
    (a, registry, handle, inputs)
}

// E7: Payload inclusion predicate. /A has a payload excluded by the
// predicate: `payload_state == ExcludedByPredicate`, no payload arc
// present in the graph.
fn scenario_e7() -> (Path, LayerStackRegistry, pcp_core::node::LayerStackHandle, Inputs) {
    let root = Path::absolute_root();
    let a = root.append_child("A");
    let b = root.append_child("B");

    let layer = FixtureLayer::new("root.usd")
        .prim(&a)
        .field(
            &a,
            FieldName::Payload,
            FieldValue::References(ListOp::explicit(vec![internal_reference(&b)])),
        )
        .prim(&b)
        .property(&b, "x")
        .build();
    let stack = FixtureLayerStack::new("root.usd", vec![layer]);

    let registry = LayerStackRegistry::new();
    let handle = registry.intern(stack);

    let mut inputs = Inputs::default();
    inputs.include_payload_predicate = Some(Arc::new(|_: &Path| false));
    (a, registry, handle, inputs)
}

/// Resolves asset paths by exact string match against a fixed table,
/// the simplest possible stand-in for real asset resolution
/// (`spec.md` §1 scopes resolution itself out).
#[derive(Debug)]
struct NamedAssetResolver {
    table: HashMap<String, Arc<dyn LayerStack>>,
}

impl NamedAssetResolver {
    fn new(entries: Vec<(String, Arc<dyn LayerStack>)>) -> Self {
        NamedAssetResolver {
            table: entries.into_iter().collect(),
        }
    }
}

impl AssetResolver for NamedAssetResolver {
    fn resolve(&self, _anchor: &LayerStackIdentifier, asset_path: &str) -> Option<Arc<dyn LayerStack>> {
        self.table.get(asset_path).cloned()
    }

    fn is_muted(&self, _asset_path: &str) -> bool {
        false
    }
}
