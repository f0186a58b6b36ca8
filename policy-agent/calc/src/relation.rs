use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use std::{fmt, hash::Hash};

/// A many-to-many association between two key domains.
///
/// Both directions are indexed so that it's cheap to ask which values a key is associated with
/// and which keys a value is associated with. A key (or value) with no associations is not
/// retained.
#[derive(Clone, Debug)]
pub struct Relation<K, V> {
    forward: HashMap<K, HashSet<V>>,
    reverse: HashMap<V, HashSet<K>>,
    len: usize,
}

// === impl Relation ===

impl<K, V> Default for Relation<K, V> {
    fn default() -> Self {
        Self {
            forward: HashMap::default(),
            reverse: HashMap::default(),
            len: 0,
        }
    }
}

impl<K, V> Relation<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone + Eq + Hash,
{
    /// Associates `key` with `value`.
    ///
    /// Returns false if the association already existed.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        let inserted = self
            .forward
            .entry(key.clone())
            .or_default()
            .insert(value.clone());
        if inserted {
            self.reverse.entry(value).or_default().insert(key);
            self.len += 1;
        }
        inserted
    }

    /// Removes the association between `key` and `value`.
    ///
    /// Returns false if there was no such association.
    pub fn remove(&mut self, key: &K, value: &V) -> bool {
        let removed = match self.forward.get_mut(key) {
            Some(values) => {
                let removed = values.remove(value);
                if values.is_empty() {
                    self.forward.remove(key);
                }
                removed
            }
            None => false,
        };
        if removed {
            self.len -= 1;
            if let Some(keys) = self.reverse.get_mut(value) {
                keys.remove(key);
                if keys.is_empty() {
                    self.reverse.remove(value);
                }
            }
        }
        removed
    }

    /// Removes an association that the caller knows to exist.
    ///
    /// A missing association means the caller's bookkeeping is corrupt. This panics in debug
    /// builds; otherwise the error is logged and nothing is changed.
    pub fn discard(&mut self, key: &K, value: &V) -> bool
    where
        K: fmt::Debug,
        V: fmt::Debug,
    {
        let removed = self.remove(key, value);
        if !removed {
            tracing::error!(?key, ?value, "Relation does not contain association");
            debug_assert!(removed, "relation does not associate {key:?} with {value:?}");
        }
        removed
    }

    /// Returns true if `key` is associated with at least one value.
    #[inline]
    pub fn contains_key(&self, key: &K) -> bool {
        self.forward.contains_key(key)
    }

    #[inline]
    pub fn contains(&self, key: &K, value: &V) -> bool {
        self.forward
            .get(key)
            .map(|values| values.contains(value))
            .unwrap_or(false)
    }

    /// Iterates over the values associated with `key`.
    pub fn values(&self, key: &K) -> impl Iterator<Item = &V> {
        self.forward.get(key).into_iter().flatten()
    }

    /// Iterates over the keys associated with `value`.
    pub fn keys_for(&self, value: &V) -> impl Iterator<Item = &K> {
        self.reverse.get(value).into_iter().flatten()
    }

    /// The number of associations.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }
}
