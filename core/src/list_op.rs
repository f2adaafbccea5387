//! List-edit composition over a layer stack.
//!
//! References, payloads, and inherit/specialize target lists are all
//! authored as Sdf-style list-edits (explicit / added / deleted) at
//! each layer; composing them strongest-to-weakest is the same
//! algorithm in every evaluator that consumes one (`spec.md` §4.4.2),
//! so it lives here once rather than being reimplemented per arc kind.

/// One layer's list-edit opinion for a field. `explicit`, when present,
/// resets the composed result instead of layering on weaker opinions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListOp<T> {
    pub explicit: Option<Vec<T>>,
    pub added: Vec<T>,
    pub deleted: Vec<T>,
}

impl<T> ListOp<T> {
    pub fn explicit(items: Vec<T>) -> Self {
        ListOp {
            explicit: Some(items),
            added: Vec::new(),
            deleted: Vec::new(),
        }
    }

    pub fn added(items: Vec<T>) -> Self {
        ListOp {
            explicit: None,
            added: items,
            deleted: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.explicit.is_none() && self.added.is_empty() && self.deleted.is_empty()
    }
}

/// Composes a stack of list-edits, strongest layer first, into the
/// final ordered list: a strongest-to-weakest walk where an `explicit`
/// opinion resets accumulation, and weaker `added`/`deleted` opinions
/// are layered behind whatever a stronger layer has already
/// contributed.
pub fn compose<T: Clone + PartialEq>(layers_strong_to_weak: impl Iterator<Item = ListOp<T>>) -> Vec<T> {
    let mut result: Vec<T> = Vec::new();
    let mut explicit_seen = false;

    for op in layers_strong_to_weak {
        if explicit_seen {
            break;
        }
        if let Some(items) = op.explicit {
            result.extend(items);
            explicit_seen = true;
            continue;
        }
        result.retain(|item| !op.deleted.contains(item));
        for item in op.added {
            if !result.contains(&item) {
                result.push(item);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_opinion_resets_weaker_layers() {
        let strong = ListOp::explicit(vec!["a".to_string()]);
        let weak = ListOp::added(vec!["b".to_string()]);
        let result = compose(vec![strong, weak].into_iter());
        assert_eq!(result, vec!["a".to_string()]);
    }

    #[test]
    fn weaker_additions_layer_behind_stronger_ones() {
        let strong = ListOp::added(vec![1]);
        let weak = ListOp::added(vec![1, 2]);
        let result = compose(vec![strong, weak].into_iter());
        assert_eq!(result, vec![1, 2]);
    }

    #[test]
    fn deletions_remove_from_accumulated_result() {
        let strong = ListOp {
            explicit: None,
            added: Vec::new(),
            deleted: vec![2],
        };
        let weak = ListOp::added(vec![1, 2, 3]);
        let result = compose(vec![strong, weak].into_iter());
        assert_eq!(result, vec![1, 3]);
    }
}
