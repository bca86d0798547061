/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use crate::collation::CollationOrder;
use crate::literal::Literal;
use crate::triple::Triple;

/// A triple projected under one collation order.
///
/// Keys compare by order first and then lexicographically by the permuted
/// components, so inside one container the ordering is exactly the
/// order's comparator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TripleKey {
    order: CollationOrder,
    components: [Literal; 3],
}

impl TripleKey {
    pub fn new(order: CollationOrder, triple: &Triple) -> Self {
        let [a, b, c] = order.positions();
        Self {
            order,
            components: [triple.get(a).clone(), triple.get(b).clone(), triple.get(c).clone()],
        }
    }

    pub fn from_components(order: CollationOrder, components: [Literal; 3]) -> Self {
        Self { order, components }
    }

    pub fn order(&self) -> CollationOrder {
        self.order
    }

    pub fn components(&self) -> &[Literal; 3] {
        &self.components
    }

    pub fn to_triple(&self) -> Triple {
        let mut subject = None;
        let mut predicate = None;
        let mut object = None;
        for (pos, value) in self.order.positions().iter().zip(self.components.iter()) {
            let slot = match pos {
                crate::triple::TriplePosition::Subject => &mut subject,
                crate::triple::TriplePosition::Predicate => &mut predicate,
                crate::triple::TriplePosition::Object => &mut object,
            };
            *slot = Some(value.clone());
        }
        // every order is a permutation, so all three slots are filled
        Triple {
            subject: subject.unwrap_or_else(Literal::min_value),
            predicate: predicate.unwrap_or_else(Literal::min_value),
            object: object.unwrap_or_else(Literal::min_value),
        }
    }
}

/// A partially specified key: `None` components are wildcards.
///
/// Used as search key and, after truncation at the first wildcard, as an
/// inclusive range end. A wildcard sorts below every literal at a lower end
/// and above every literal at an upper end.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPattern {
    pub order: CollationOrder,
    pub components: [Option<Literal>; 3],
}

impl KeyPattern {
    pub fn new(order: CollationOrder, components: [Option<Literal>; 3]) -> Self {
        Self { order, components }
    }

    /// The wildcard-free leading segment.
    pub fn prefix(&self) -> Vec<Literal> {
        self.components
            .iter()
            .map_while(|c| c.clone())
            .collect()
    }

    pub fn prefix_len(&self) -> usize {
        self.components.iter().take_while(|c| c.is_some()).count()
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.order)?;
        for (i, c) in self.components.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match c {
                Some(value) => write!(f, "{}", value)?,
                None => f.write_str("*")?,
            }
        }
        f.write_str("]")
    }
}

/// An inclusive key range `[lower, upper]` over one container, given as
/// wildcard-free prefixes. An empty prefix leaves that end open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub order: CollationOrder,
    pub lower: Vec<Literal>,
    pub upper: Vec<Literal>,
}

impl KeyRange {
    pub fn full(order: CollationOrder) -> Self {
        Self { order, lower: Vec::new(), upper: Vec::new() }
    }

    /// Range of all keys starting with `prefix`.
    pub fn prefix(order: CollationOrder, prefix: Vec<Literal>) -> Self {
        Self { order, lower: prefix.clone(), upper: prefix }
    }

    pub fn between(min: &KeyPattern, max: &KeyPattern) -> Self {
        Self {
            order: min.order,
            lower: min.prefix(),
            upper: max.prefix(),
        }
    }

    /// Smallest concrete key that can fall inside the range.
    pub fn start_key(&self) -> TripleKey {
        let mut components = [Literal::min_value(), Literal::min_value(), Literal::min_value()];
        for (slot, value) in components.iter_mut().zip(self.lower.iter()) {
            *slot = value.clone();
        }
        TripleKey::from_components(self.order, components)
    }

    pub fn is_above_lower(&self, key: &TripleKey) -> bool {
        let n = self.lower.len().min(3);
        key.components()[..n].cmp(&self.lower[..n]) != Ordering::Less
    }

    pub fn is_below_upper(&self, key: &TripleKey) -> bool {
        let n = self.upper.len().min(3);
        key.components()[..n].cmp(&self.upper[..n]) != Ordering::Greater
    }

    pub fn contains(&self, key: &TripleKey) -> bool {
        self.is_above_lower(key) && self.is_below_upper(key)
    }

    /// True when no key can satisfy both ends.
    pub fn is_empty(&self) -> bool {
        let n = self.lower.len().min(self.upper.len());
        self.lower[..n] > self.upper[..n]
    }
}
