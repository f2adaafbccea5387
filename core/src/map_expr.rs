//! Namespace-mapping algebra (`spec.md` §4.1).
//!
//! A [`MapExpression`] is a lazily-evaluated tree built from constants,
//! identity, variable references, composition and inversion. Evaluating
//! an expression folds it down to a concrete [`MapFunction`] that can
//! actually translate paths; the fold is memoised so repeated
//! evaluation of the same expression is free after the first call.
//!
//! Expressions are value types (cheap `Arc` clones); a returned `None`
//! from a mapping call is not an error, it is the well-defined "this
//! path is outside the function's domain" signal used throughout the
//! builder.

use crate::path::Path;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock};

/// A linear time reparameterization: `target_time = source_time * scale
/// + offset`. Used to carry `layerOffset` data across reference and
/// payload arcs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeOffset {
    pub offset: f64,
    pub scale: f64,
}

impl TimeOffset {
    pub const IDENTITY: TimeOffset = TimeOffset {
        offset: 0.0,
        scale: 1.0,
    };

    /// Composes `self` after `inner`: applying `inner` then `self`.
    pub fn compose(&self, inner: &TimeOffset) -> TimeOffset {
        TimeOffset {
            offset: self.offset + self.scale * inner.offset,
            scale: self.scale * inner.scale,
        }
    }

    pub fn inverse(&self) -> TimeOffset {
        TimeOffset {
            offset: -self.offset / self.scale,
            scale: 1.0 / self.scale,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.offset == 0.0 && self.scale == 1.0
    }
}

/// A concrete, evaluated path-mapping function: an ordered list of
/// `(source_prefix, target_prefix)` pairs (most specific prefix first),
/// an associated [`TimeOffset`], and whether the identity `/ -> /`
/// mapping is additionally present even though it may not appear in
/// `pairs` (the "add-root-identity" feature used to let root-class
/// inherits cross reference arcs, `spec.md` §4.1).
#[derive(Clone, Debug, PartialEq)]
pub struct MapFunction {
    pairs: Vec<(Path, Path)>,
    time_offset: TimeOffset,
    root_identity: bool,
}

impl MapFunction {
    pub fn identity() -> Self {
        MapFunction {
            pairs: vec![(Path::absolute_root(), Path::absolute_root())],
            time_offset: TimeOffset::IDENTITY,
            root_identity: true,
        }
    }

    pub fn constant(pairs: Vec<(Path, Path)>, time_offset: TimeOffset) -> Self {
        MapFunction {
            pairs,
            time_offset,
            root_identity: false,
        }
    }

    pub fn time_offset(&self) -> TimeOffset {
        self.time_offset
    }

    pub fn is_constant_identity(&self) -> bool {
        self.time_offset.is_identity()
            && self.pairs.len() == 1
            && self.pairs[0].0.is_absolute_root()
            && self.pairs[0].1.is_absolute_root()
    }

    pub fn has_root_identity(&self) -> bool {
        self.root_identity || self.is_constant_identity()
    }

    /// Returns this function with the root identity `/ -> /` ensured to
    /// be in its domain, without disturbing any other pair.
    pub fn with_root_identity(mut self) -> Self {
        self.root_identity = true;
        self
    }

    fn best_pair<'a>(
        pairs: &'a [(Path, Path)],
        path: &Path,
        forward: bool,
    ) -> Option<&'a (Path, Path)> {
        pairs
            .iter()
            .filter(|(src, tgt)| {
                let domain = if forward { src } else { tgt };
                domain.is_ancestor_of(path)
            })
            .max_by_key(|(src, tgt)| {
                let domain = if forward { src } else { tgt };
                domain.namespace_depth()
            })
    }

    /// Maps a path from this function's source namespace to its target
    /// namespace. Returns `None` if `path` lies outside the domain.
    pub fn map_source_to_target(&self, path: &Path) -> Option<Path> {
        let (src, tgt) = Self::best_pair(&self.pairs, path, true)?;
        path.replace_prefix(src, tgt)
    }

    /// The symmetric inverse of [`map_source_to_target`].
    pub fn map_target_to_source(&self, path: &Path) -> Option<Path> {
        let (src, tgt) = Self::best_pair(&self.pairs, path, false)?;
        path.replace_prefix(tgt, src)
    }

    /// `self` applied first, followed by `next`: a path is mapped into
    /// `self`'s target namespace, then from there into `next`'s target
    /// namespace. Pairs whose intermediate target has no match in
    /// `next`'s source domain are dropped, the same way an out-of-domain
    /// mapping anywhere in the chain yields no result for that pair.
    pub fn compose(&self, next: &MapFunction) -> MapFunction {
        let mut pairs = Vec::new();
        for (src, mid) in &self.pairs {
            if let Some(tgt) = next.map_source_to_target(mid) {
                pairs.push((src.clone(), tgt));
            }
        }
        if pairs.is_empty() {
            pairs.push((Path::absolute_root(), Path::absolute_root()));
        }
        MapFunction {
            pairs,
            time_offset: next.time_offset.compose(&self.time_offset),
            root_identity: self.root_identity && next.root_identity,
        }
    }

    pub fn inverse(&self) -> MapFunction {
        MapFunction {
            pairs: self
                .pairs
                .iter()
                .map(|(src, tgt)| (tgt.clone(), src.clone()))
                .collect(),
            time_offset: self.time_offset.inverse(),
            root_identity: self.root_identity,
        }
    }
}

/// A mapping of expression-variable names to replacement strings,
/// sourced from a layer stack's `expression_variables()` (`spec.md`
/// §6). Used to resolve `Variable` nodes in a [`MapExpression`] tree.
pub type ExpressionVariables = BTreeMap<String, String>;

#[derive(Debug)]
enum Node {
    Constant(MapFunction),
    Identity,
    /// A variable reference, resolved against the expression variables
    /// supplied at evaluation time; falls back to identity if unbound,
    /// consistent with "failure to map is not an error".
    Variable(String),
    Compose(MapExpression, MapExpression),
    Inverse(MapExpression),
    AddRootIdentity(MapExpression),
}

/// A lazily-evaluated namespace-mapping expression.
///
/// Cloning a `MapExpression` clones only an `Arc`; evaluation is cached
/// the first time [`MapExpression::evaluate`] is called for a given
/// `ExpressionVariables` context (in practice, once per build, since the
/// builder passes the same resolved variables throughout one index).
#[derive(Clone, Debug)]
pub struct MapExpression {
    node: Arc<Node>,
    cache: Arc<OnceLock<MapFunction>>,
}

impl MapExpression {
    pub fn identity() -> Self {
        Self::from_node(Node::Identity)
    }

    pub fn constant(f: MapFunction) -> Self {
        Self::from_node(Node::Constant(f))
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self::from_node(Node::Variable(name.into()))
    }

    pub fn compose(&self, next: &MapExpression) -> MapExpression {
        Self::from_node(Node::Compose(self.clone(), next.clone()))
    }

    pub fn inverse(&self) -> MapExpression {
        Self::from_node(Node::Inverse(self.clone()))
    }

    pub fn add_root_identity(&self) -> MapExpression {
        Self::from_node(Node::AddRootIdentity(self.clone()))
    }

    fn from_node(node: Node) -> Self {
        MapExpression {
            node: Arc::new(node),
            cache: Arc::new(OnceLock::new()),
        }
    }

    /// Folds this expression tree to a concrete [`MapFunction`],
    /// memoising the result.
    pub fn evaluate(&self, vars: &ExpressionVariables) -> MapFunction {
        self.cache
            .get_or_init(|| self.evaluate_uncached(vars))
            .clone()
    }

    fn evaluate_uncached(&self, vars: &ExpressionVariables) -> MapFunction {
        match &*self.node {
            Node::Constant(f) => f.clone(),
            Node::Identity => MapFunction::identity(),
            Node::Variable(name) => match vars.get(name) {
                Some(value) => MapFunction::constant(
                    vec![(Path::absolute_root(), Path::absolute_root().append_child(value))],
                    TimeOffset::IDENTITY,
                ),
                None => MapFunction::identity(),
            },
            Node::Compose(a, b) => a.evaluate(vars).compose(&b.evaluate(vars)),
            Node::Inverse(a) => a.evaluate(vars).inverse(),
            Node::AddRootIdentity(a) => a.evaluate(vars).with_root_identity(),
        }
    }

    pub fn has_root_identity(&self, vars: &ExpressionVariables) -> bool {
        self.evaluate(vars).has_root_identity()
    }

    pub fn is_constant_identity(&self, vars: &ExpressionVariables) -> bool {
        self.evaluate(vars).is_constant_identity()
    }

    pub fn map_source_to_target(&self, vars: &ExpressionVariables, path: &Path) -> Option<Path> {
        self.evaluate(vars).map_source_to_target(path)
    }

    pub fn map_target_to_source(&self, vars: &ExpressionVariables, path: &Path) -> Option<Path> {
        self.evaluate(vars).map_target_to_source(path)
    }

    /// Every expression-variable name this tree consults while
    /// evaluating, so a caller that evaluates against one set of
    /// bindings can tell which variables a later change to would
    /// invalidate the result (`spec.md` §6 `expression_variables_dependency`).
    pub fn variable_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_variable_names(&mut names);
        names
    }

    fn collect_variable_names(&self, out: &mut BTreeSet<String>) {
        match &*self.node {
            Node::Constant(_) | Node::Identity => {}
            Node::Variable(name) => {
                out.insert(name.clone());
            }
            Node::Compose(a, b) => {
                a.collect_variable_names(out);
                b.collect_variable_names(out);
            }
            Node::Inverse(a) | Node::AddRootIdentity(a) => a.collect_variable_names(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Path {
        let mut path = Path::absolute_root();
        for comp in s.trim_start_matches('/').split('/').filter(|c| !c.is_empty()) {
            path = path.append_child(comp);
        }
        path
    }

    #[test]
    fn identity_maps_everything_to_itself() {
        let vars = ExpressionVariables::default();
        let id = MapExpression::identity();
        assert_eq!(id.map_source_to_target(&vars, &p("/A/B")), Some(p("/A/B")));
    }

    #[test]
    fn constant_maps_within_domain_only() {
        let vars = ExpressionVariables::default();
        let f = MapFunction::constant(vec![(p("/B"), p("/A"))], TimeOffset::IDENTITY);
        let expr = MapExpression::constant(f);
        assert_eq!(
            expr.map_source_to_target(&vars, &p("/B/Child")),
            Some(p("/A/Child"))
        );
        assert_eq!(expr.map_source_to_target(&vars, &p("/Other")), None);
    }

    #[test]
    fn compose_chains_two_constants() {
        let vars = ExpressionVariables::default();
        let ref_to_source = MapExpression::constant(MapFunction::constant(
            vec![(p("/Target"), p("/Source"))],
            TimeOffset::IDENTITY,
        ));
        let source_to_root = MapExpression::constant(MapFunction::constant(
            vec![(p("/Source"), p("/Root"))],
            TimeOffset::IDENTITY,
        ));
        let composed = ref_to_source.compose(&source_to_root);
        assert_eq!(
            composed.map_source_to_target(&vars, &p("/Target/Leaf")),
            Some(p("/Root/Leaf"))
        );
    }

    #[test]
    fn inverse_round_trips() {
        let vars = ExpressionVariables::default();
        let f = MapExpression::constant(MapFunction::constant(
            vec![(p("/B"), p("/A"))],
            TimeOffset::IDENTITY,
        ));
        let inv = f.inverse();
        assert_eq!(inv.map_source_to_target(&vars, &p("/A/X")), Some(p("/B/X")));
    }

    #[test]
    fn variable_names_collects_across_compose() {
        let a = MapExpression::variable("SET_A");
        let b = MapExpression::variable("SET_B").add_root_identity();
        let composed = a.compose(&b);
        let names: Vec<_> = composed.variable_names().into_iter().collect();
        assert_eq!(names, vec!["SET_A".to_string(), "SET_B".to_string()]);
    }

    #[test]
    fn add_root_identity_is_idempotent_on_domain() {
        let vars = ExpressionVariables::default();
        let f = MapExpression::constant(MapFunction::constant(
            vec![(p("/B"), p("/A"))],
            TimeOffset::IDENTITY,
        ))
        .add_root_identity();
        assert!(f.has_root_identity(&vars));
    }
}
