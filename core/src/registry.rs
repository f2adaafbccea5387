//! Layer stack interning (`spec.md` §3: "layer stacks are interned by
//! an external registry; equality is identity"). Grounded on
//! `cloudpeers-tlfs/crdt/src/registry.rs`'s `Registry`, swapping its
//! `blake3::Hash` content-address keys for pointer-identity keys since
//! layer stacks here aren't content-addressed values.

use crate::layer::LayerStack;
use crate::node::LayerStackHandle;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct Inner {
    stacks: Vec<Arc<dyn LayerStack>>,
    by_identity: HashMap<usize, LayerStackHandle>,
}

/// Interns `Arc<dyn LayerStack>` trait objects by pointer identity, so
/// that two requests for the same layer stack resolve to the same
/// [`LayerStackHandle`] regardless of how many times the caller passes
/// it in.
#[derive(Clone, Default)]
pub struct LayerStackRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl LayerStackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, stack: Arc<dyn LayerStack>) -> LayerStackHandle {
        let identity = Arc::as_ptr(&stack) as *const () as usize;
        {
            let read = self.inner.read();
            if let Some(&handle) = read.by_identity.get(&identity) {
                return handle;
            }
        }
        let mut write = self.inner.write();
        if let Some(&handle) = write.by_identity.get(&identity) {
            return handle;
        }
        let handle = LayerStackHandle(write.stacks.len() as u32);
        write.stacks.push(stack);
        write.by_identity.insert(identity, handle);
        handle
    }

    pub fn get(&self, handle: LayerStackHandle) -> Arc<dyn LayerStack> {
        self.inner.read().stacks[handle.0 as usize].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{LayerStackIdentifier, RelocatesMap};
    use crate::map_expr::{ExpressionVariables, MapExpression};
    use crate::path::Path;

    #[derive(Debug)]
    struct EmptyStack {
        id: LayerStackIdentifier,
        relocates: RelocatesMap,
        vars: ExpressionVariables,
    }

    impl LayerStack for EmptyStack {
        fn identifier(&self) -> &LayerStackIdentifier {
            &self.id
        }
        fn layers(&self) -> &[Arc<dyn crate::layer::Layer>] {
            &[]
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

    fn stack(name: &str) -> Arc<dyn LayerStack> {
        Arc::new(EmptyStack {
            id: LayerStackIdentifier {
                root_layer: name.to_string(),
                session_layer: None,
                path_resolver_context: String::new(),
                expression_variables_source: None,
            },
            relocates: RelocatesMap::default(),
            vars: ExpressionVariables::default(),
        })
    }

    #[test]
    fn interning_the_same_arc_returns_the_same_handle() {
        let registry = LayerStackRegistry::new();
        let s = stack("root.usd");
        let h1 = registry.intern(s.clone());
        let h2 = registry.intern(s);
        assert_eq!(h1, h2);
    }

    #[test]
    fn distinct_stacks_get_distinct_handles() {
        let registry = LayerStackRegistry::new();
        let h1 = registry.intern(stack("a.usd"));
        let h2 = registry.intern(stack("b.usd"));
        assert_ne!(h1, h2);
    }
}
