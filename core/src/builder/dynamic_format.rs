//! Dynamic file-format dependency tracking (`spec.md` §4.4.2, §6;
//! grounded on `dynamicFileFormatContext.h`).
//!
//! A dynamic file format's arguments are generated by an external
//! plugin that queries the in-progress prim index through a
//! [`DynamicFileFormatContext`]. What matters for correctness is not
//! the values the plugin read, but *which* fields and attributes it
//! consulted: those become a dependency key so a later change to one
//! of them invalidates the cached index.

use crate::layer::FieldName;
use std::collections::BTreeSet;

/// Records which fields and attribute defaults a dynamic file-format
/// plugin invocation consulted while generating its arguments.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DynamicFileFormatDependencyData {
    fields_consulted: BTreeSet<FieldNameKey>,
    attribute_defaults_consulted: BTreeSet<String>,
    /// Set when the plugin performed a wildcard lookup over all
    /// prim-level opinions rather than a named field, meaning any
    /// prim-level change is a potential dependency.
    depends_on_all_prim_opinions: bool,
}

/// `FieldName` isn't `Ord`/hashable as written (it carries a `String`
/// payload for `VariantSelection`), so dependency tracking keys on this
/// lightweight projection instead.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum FieldNameKey {
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

impl From<&FieldName> for FieldNameKey {
    fn from(f: &FieldName) -> Self {
        match f {
            FieldName::References => FieldNameKey::References,
            FieldName::Payload => FieldNameKey::Payload,
            FieldName::InheritPaths => FieldNameKey::InheritPaths,
            FieldName::SpecializesPaths => FieldNameKey::SpecializesPaths,
            FieldName::VariantSetNames => FieldNameKey::VariantSetNames,
            FieldName::VariantSelection(s) => FieldNameKey::VariantSelection(s.clone()),
            FieldName::Permission => FieldNameKey::Permission,
            FieldName::Symmetry => FieldNameKey::Symmetry,
            FieldName::Specifier => FieldNameKey::Specifier,
        }
    }
}

impl DynamicFileFormatDependencyData {
    pub fn is_empty(&self) -> bool {
        self.fields_consulted.is_empty()
            && self.attribute_defaults_consulted.is_empty()
            && !self.depends_on_all_prim_opinions
    }

    pub fn note_field(&mut self, field: &FieldName) {
        self.fields_consulted.insert(field.into());
    }

    pub fn note_attribute_default(&mut self, attr_name: &str) {
        self.attribute_defaults_consulted.insert(attr_name.to_string());
    }

    pub fn note_all_prim_opinions(&mut self) {
        self.depends_on_all_prim_opinions = true;
    }

    pub fn merge(&mut self, other: DynamicFileFormatDependencyData) {
        self.fields_consulted.extend(other.fields_consulted);
        self.attribute_defaults_consulted
            .extend(other.attribute_defaults_consulted);
        self.depends_on_all_prim_opinions |= other.depends_on_all_prim_opinions;
    }
}

/// The interface a dynamic file-format plugin is given to query the
/// in-progress prim index (`spec.md` §6). Implementations are external
/// collaborators; this crate only defines the contract and records
/// what is consulted through it.
pub trait DynamicFileFormatContext {
    fn compose_value(&self, field: &FieldName) -> Option<crate::layer::FieldValue>;
    fn compose_value_stack(&self, field: &FieldName) -> Vec<crate::layer::FieldValue>;
    fn compose_attribute_default(&self, attr_name: &str) -> Option<crate::layer::FieldValue>;
}
