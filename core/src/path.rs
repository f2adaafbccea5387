//! Hierarchical namespace paths.
//!
//! A [`Path`] is a sequence of prim-name components, optionally followed
//! by a trailing variant selection. Variant-selection elements are
//! storage-only: they say *where* opinions for a variant live, but they
//! never count as a level of composed namespace (see `spec.md` §3).

use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// One element of a [`Path`].
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
enum Elem {
    Prim(Arc<str>),
    Variant { set: Arc<str>, selection: Arc<str> },
}

impl fmt::Display for Elem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Elem::Prim(name) => write!(f, "{name}"),
            Elem::Variant { set, selection } => write!(f, "{{{set}={selection}}}"),
        }
    }
}

/// A hierarchical namespace path: the absolute root, a prim path
/// (`/A/B`), or a prim variant-selection path (`/A{v=sel}`).
///
/// Cloning a `Path` is O(1): the component list is shared via `Arc`.
#[derive(Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Path {
    elems: Arc<SmallVec<[Elem; 4]>>,
}

impl Path {
    /// The absolute root path, `/`.
    pub fn absolute_root() -> Self {
        Path {
            elems: Arc::new(SmallVec::new()),
        }
    }

    /// Whether this path is the absolute root.
    pub fn is_absolute_root(&self) -> bool {
        self.elems.is_empty()
    }

    /// Appends a child prim name, returning the resulting path.
    pub fn append_child(&self, name: &str) -> Path {
        let mut elems = (*self.elems).clone();
        elems.push(Elem::Prim(Arc::from(name)));
        Path {
            elems: Arc::new(elems),
        }
    }

    /// Appends a variant selection, returning a variant-selection path.
    ///
    /// Variant-selection elements are storage-only: they do not add a
    /// level of composed namespace depth (`spec.md` §3, §4.3).
    pub fn append_variant_selection(&self, set: &str, selection: &str) -> Path {
        let mut elems = (*self.elems).clone();
        elems.push(Elem::Variant {
            set: Arc::from(set),
            selection: Arc::from(selection),
        });
        Path {
            elems: Arc::new(elems),
        }
    }

    /// The parent of this path, or `None` if this is the absolute root.
    ///
    /// Strips exactly one trailing element, whether that element is a
    /// prim name or a variant selection.
    pub fn parent_path(&self) -> Option<Path> {
        if self.elems.is_empty() {
            return None;
        }
        let mut elems = (*self.elems).clone();
        elems.pop();
        Some(Path {
            elems: Arc::new(elems),
        })
    }

    /// This path with all trailing variant-selection elements stripped,
    /// leaving only the underlying prim path.
    pub fn strip_variant_selections(&self) -> Path {
        let mut elems = (*self.elems).clone();
        while matches!(elems.last(), Some(Elem::Variant { .. })) {
            elems.pop();
        }
        Path {
            elems: Arc::new(elems),
        }
    }

    /// Whether this path carries a trailing variant selection.
    pub fn has_variant_selection(&self) -> bool {
        matches!(self.elems.last(), Some(Elem::Variant { .. }))
    }

    /// The name of the nearest enclosing prim, or `None` at the root.
    pub fn name(&self) -> Option<&str> {
        self.elems.iter().rev().find_map(|e| match e {
            Elem::Prim(name) => Some(&**name),
            Elem::Variant { .. } => None,
        })
    }

    /// Namespace depth: the number of non-variant (prim) components.
    /// This is the quantity `spec.md` §3/§4.3 calls "namespace depth at
    /// introduction" when used on the introducing prim of an arc.
    pub fn namespace_depth(&self) -> usize {
        self.elems
            .iter()
            .filter(|e| matches!(e, Elem::Prim(_)))
            .count()
    }

    /// Whether `self` is `other`, or an ancestor of `other` in the prim
    /// hierarchy (ignoring variant-selection elements on either side).
    pub fn is_ancestor_of(&self, other: &Path) -> bool {
        let a = self.strip_variant_selections();
        let b = other.strip_variant_selections();
        a.elems.len() <= b.elems.len() && a.elems[..] == b.elems[..a.elems.len()]
    }

    /// Whether `self` is a strict ancestor of `other`.
    pub fn is_strict_ancestor_of(&self, other: &Path) -> bool {
        self.is_ancestor_of(other) && self != &other.strip_variant_selections()
    }

    /// Replaces a prefix of this path, the way `SdfPath::ReplacePrefix`
    /// does in the original implementation: if `self` starts with
    /// `old_prefix`, returns `self` with that prefix swapped for
    /// `new_prefix`. Used to translate sites between namespace depths
    /// during cross-recursion cycle and duplicate-node detection
    /// (`spec.md` §4.4.1).
    pub fn replace_prefix(&self, old_prefix: &Path, new_prefix: &Path) -> Option<Path> {
        if !old_prefix.is_ancestor_of(self) {
            return None;
        }
        let mut elems = (*new_prefix.elems).clone();
        elems.extend(self.elems[old_prefix.elems.len()..].iter().cloned());
        Some(Path {
            elems: Arc::new(elems),
        })
    }

    /// Iterates this path's ancestors, starting with the immediate
    /// parent and ending at the absolute root.
    pub fn ancestors(&self) -> impl Iterator<Item = Path> + '_ {
        let mut cur = Some(self.clone());
        std::iter::from_fn(move || {
            let next = cur.as_ref()?.parent_path();
            std::mem::replace(&mut cur, next.clone())
        })
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({self})")
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.elems.is_empty() {
            return write!(f, "/");
        }
        for elem in self.elems.iter() {
            match elem {
                Elem::Prim(name) => write!(f, "/{name}")?,
                Elem::Variant { .. } => write!(f, "{elem}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_has_no_parent() {
        assert_eq!(Path::absolute_root().parent_path(), None);
    }

    #[test]
    fn child_round_trips() {
        let a = Path::absolute_root().append_child("A");
        let b = a.append_child("B");
        assert_eq!(b.to_string(), "/A/B");
        assert_eq!(b.parent_path().unwrap(), a);
        assert_eq!(b.namespace_depth(), 2);
    }

    #[test]
    fn variant_selection_does_not_add_depth() {
        let a = Path::absolute_root().append_child("A");
        let sel = a.append_variant_selection("v", "x");
        assert_eq!(sel.to_string(), "/A{v=x}");
        assert_eq!(sel.namespace_depth(), a.namespace_depth());
        assert!(sel.has_variant_selection());
        assert_eq!(sel.strip_variant_selections(), a);
    }

    #[test]
    fn ancestor_queries_ignore_variant_selections() {
        let a = Path::absolute_root().append_child("A");
        let b = a.append_child("B");
        let b_sel = b.append_variant_selection("v", "x");
        assert!(a.is_strict_ancestor_of(&b));
        assert!(a.is_strict_ancestor_of(&b_sel));
        assert!(!b.is_strict_ancestor_of(&a));
    }

    #[test]
    fn replace_prefix_translates_between_namespace_depths() {
        // requested = /A/B, current = /A, site = /C  =>  /C/B
        let requested = Path::absolute_root().append_child("A").append_child("B");
        let current = Path::absolute_root().append_child("A");
        let site = Path::absolute_root().append_child("C");
        let translated = site.replace_prefix(&current, &requested.parent_path().unwrap());
        // current is not a prefix of site, so this case uses the other
        // direction: translating `site` isn't meaningful here directly;
        // exercise the documented direction instead.
        assert!(translated.is_none());

        let child_of_current = current.append_child("D");
        let translated = child_of_current.replace_prefix(&current, &site);
        assert_eq!(translated.unwrap().to_string(), "/C/D");
    }
}
