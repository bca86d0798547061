/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use shared::collation::CollationOrder;
use shared::key::{KeyRange, TripleKey};
use shared::literal::Literal;
use shared::triple::Triple;
use std::collections::BTreeMap;

/// One ordered key to triple container. Iteration follows the comparator of
/// `order` exactly.
#[derive(Debug, Clone)]
pub struct Index {
    order: CollationOrder,
    entries: BTreeMap<TripleKey, Triple>,
    dirty: bool,
}

impl Index {
    pub fn new(order: CollationOrder) -> Self {
        Self {
            order,
            entries: BTreeMap::new(),
            dirty: false,
        }
    }

    pub fn order(&self) -> CollationOrder {
        self.order
    }

    /// Returns false if the triple was already present.
    pub fn insert(&mut self, triple: Triple) -> bool {
        let key = TripleKey::new(self.order, &triple);
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, triple);
        self.dirty = true;
        true
    }

    pub fn remove(&mut self, triple: &Triple) -> bool {
        let removed = self.entries.remove(&TripleKey::new(self.order, triple)).is_some();
        self.dirty |= removed;
        removed
    }

    pub fn contains(&self, triple: &Triple) -> bool {
        self.entries.contains_key(&TripleKey::new(self.order, triple))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Triple> + '_ {
        self.entries.values()
    }

    /// Lazily iterates the keys inside `range`, in order.
    pub fn scan<'a>(&'a self, range: &KeyRange) -> impl Iterator<Item = &'a Triple> + 'a {
        let upper = range.clone();
        let lower = range.clone();
        let cursor = if range.order != self.order || range.is_empty() {
            None
        } else {
            Some(self.entries.range(range.start_key()..))
        };
        cursor
            .into_iter()
            .flatten()
            .take_while(move |(key, _)| upper.is_below_upper(key))
            .filter(move |(key, _)| lower.is_above_lower(key))
            .map(|(_, triple)| triple)
    }

    /// All triples whose leading components equal `prefix`.
    pub fn prefix_scan<'a>(&'a self, prefix: Vec<Literal>) -> impl Iterator<Item = &'a Triple> + 'a {
        self.scan(&KeyRange::prefix(self.order, prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Index {
        let mut index = Index::new(CollationOrder::Pos);
        for (s, p, o) in [("a", "p", "x"), ("b", "p", "c"), ("c", "q", "a"), ("d", "p", "m")] {
            index.insert(Triple::new(s, p, o));
        }
        index
    }

    #[test]
    fn test_iteration_follows_order() {
        let index = sample();
        let objects: Vec<&str> = index.iter().map(|t| t.object.as_str()).collect();
        assert_eq!(objects, vec!["c", "m", "x", "a"]);
    }

    #[test]
    fn test_duplicate_insert_is_ignored() {
        let mut index = sample();
        assert!(!index.insert(Triple::new("a", "p", "x")));
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_prefix_scan() {
        let index = sample();
        let subjects: Vec<&str> = index
            .prefix_scan(vec![Literal::from("p")])
            .map(|t| t.subject.as_str())
            .collect();
        assert_eq!(subjects, vec!["b", "d", "a"]);
        assert_eq!(index.prefix_scan(vec![Literal::from("zz")]).count(), 0);
    }

    #[test]
    fn test_bounded_scan_is_inclusive() {
        let index = sample();
        let range = KeyRange {
            order: CollationOrder::Pos,
            lower: vec![Literal::from("p"), Literal::from("c")],
            upper: vec![Literal::from("p"), Literal::from("m")],
        };
        let objects: Vec<&str> = index.scan(&range).map(|t| t.object.as_str()).collect();
        assert_eq!(objects, vec!["c", "m"]);
    }

    #[test]
    fn test_dirty_tracking() {
        let mut index = sample();
        assert!(index.is_dirty());
        index.mark_clean();
        assert!(!index.remove(&Triple::new("zz", "p", "x")));
        assert!(!index.is_dirty());
        assert!(index.remove(&Triple::new("a", "p", "x")));
        assert!(index.is_dirty());
    }
}
