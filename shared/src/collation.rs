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
use crate::key::TripleKey;
use crate::terms::TriplePattern;
use crate::triple::{Triple, TriplePosition};
use TriplePosition::*;

/// The six attribute orders under which every triple is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CollationOrder {
    Spo,
    Sop,
    Pso,
    Pos,
    Osp,
    Ops,
}

impl CollationOrder {
    /// Fixed order used for persistence and for every per-order array.
    pub const ALL: [CollationOrder; 6] = [
        CollationOrder::Spo,
        CollationOrder::Sop,
        CollationOrder::Pso,
        CollationOrder::Pos,
        CollationOrder::Osp,
        CollationOrder::Ops,
    ];

    pub fn positions(self) -> [TriplePosition; 3] {
        match self {
            CollationOrder::Spo => [Subject, Predicate, Object],
            CollationOrder::Sop => [Subject, Object, Predicate],
            CollationOrder::Pso => [Predicate, Subject, Object],
            CollationOrder::Pos => [Predicate, Object, Subject],
            CollationOrder::Osp => [Object, Subject, Predicate],
            CollationOrder::Ops => [Object, Predicate, Subject],
        }
    }

    pub fn from_positions(positions: [TriplePosition; 3]) -> Option<Self> {
        CollationOrder::ALL
            .iter()
            .copied()
            .find(|order| order.positions() == positions)
    }

    pub fn from_letters(letters: &str) -> Option<Self> {
        let mut positions = [Subject; 3];
        let mut chars = letters.chars();
        for slot in positions.iter_mut() {
            *slot = TriplePosition::from_letter(chars.next()?)?;
        }
        if chars.next().is_some() {
            return None;
        }
        Self::from_positions(positions)
    }

    pub fn name(self) -> &'static str {
        match self {
            CollationOrder::Spo => "SPO",
            CollationOrder::Sop => "SOP",
            CollationOrder::Pso => "PSO",
            CollationOrder::Pos => "POS",
            CollationOrder::Osp => "OSP",
            CollationOrder::Ops => "OPS",
        }
    }

    /// Slot of this order in [`CollationOrder::ALL`].
    pub fn index(self) -> usize {
        match self {
            CollationOrder::Spo => 0,
            CollationOrder::Sop => 1,
            CollationOrder::Pso => 2,
            CollationOrder::Pos => 3,
            CollationOrder::Osp => 4,
            CollationOrder::Ops => 5,
        }
    }

    /// Nested comparison of the three positions in this order's sequence.
    pub fn compare(self, a: &Triple, b: &Triple) -> Ordering {
        for pos in self.positions() {
            match a.get(pos).cmp(b.get(pos)) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }

    pub fn key(self, triple: &Triple) -> TripleKey {
        TripleKey::new(self, triple)
    }

    /// Picks the order that front-loads selectivity for `pattern`.
    ///
    /// Constant positions come first (S, P, O tie order), then the positions
    /// of `ordered_vars` in caller order, then whatever is left. A scan under
    /// the returned order is sorted by `ordered_vars` whenever all of them
    /// occur in the pattern.
    pub fn for_pattern<S: AsRef<str>>(pattern: &TriplePattern, ordered_vars: &[S]) -> Self {
        let mut chosen: Vec<TriplePosition> = Vec::with_capacity(3);
        for pos in TriplePosition::ALL {
            if !pattern.term(pos).is_var() {
                chosen.push(pos);
            }
        }
        for var in ordered_vars {
            for pos in pattern.positions_of(var.as_ref()) {
                if !chosen.contains(&pos) {
                    chosen.push(pos);
                }
            }
        }
        for pos in TriplePosition::ALL {
            if !chosen.contains(&pos) {
                chosen.push(pos);
            }
        }
        Self::from_positions([chosen[0], chosen[1], chosen[2]]).unwrap_or(CollationOrder::Spo)
    }
}

impl fmt::Display for CollationOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters_round_trip() {
        for order in CollationOrder::ALL {
            assert_eq!(CollationOrder::from_letters(order.name()), Some(order));
            assert_eq!(CollationOrder::ALL[order.index()], order);
        }
        assert_eq!(CollationOrder::from_letters("SSO"), None);
        assert_eq!(CollationOrder::from_letters("SPOX"), None);
    }

    #[test]
    fn test_compare_follows_position_sequence() {
        let a = Triple::new("a", "z", "m");
        let b = Triple::new("b", "y", "m");
        assert_eq!(CollationOrder::Spo.compare(&a, &b), Ordering::Less);
        assert_eq!(CollationOrder::Pos.compare(&a, &b), Ordering::Greater);
        assert_eq!(CollationOrder::Osp.compare(&a, &b), Ordering::Less);
    }

    #[test]
    fn test_for_pattern_constants_first() {
        let pattern = TriplePattern::parse("?x", "p1", "?y");
        assert_eq!(CollationOrder::for_pattern::<&str>(&pattern, &[]), CollationOrder::Pso);
        assert_eq!(CollationOrder::for_pattern(&pattern, &["y"]), CollationOrder::Pos);
        assert_eq!(CollationOrder::for_pattern(&pattern, &["x", "y"]), CollationOrder::Pso);
    }

    #[test]
    fn test_for_pattern_ignores_unknown_variables() {
        let pattern = TriplePattern::parse("s1", "?p", "o1");
        assert_eq!(CollationOrder::for_pattern(&pattern, &["zzz", "p"]), CollationOrder::Sop);
    }

    #[test]
    fn test_for_pattern_every_prefix_holds_constants() {
        let tokens = [("s", "?s"), ("p", "?p"), ("o", "?o")];
        let var_orders: [&[&str]; 4] = [&[], &["s"], &["o", "p"], &["p", "o", "s"]];
        for mask in 0..8u8 {
            let pick = |i: usize| if mask & (1 << i) != 0 { tokens[i].0 } else { tokens[i].1 };
            let pattern = TriplePattern::parse(pick(0), pick(1), pick(2));
            let k = pattern.constant_count();
            let expected: String = TriplePosition::ALL
                .iter()
                .filter(|&&pos| !pattern.term(pos).is_var())
                .map(|pos| pos.letter())
                .collect();
            for vars in var_orders {
                let order = CollationOrder::for_pattern(&pattern, vars);
                assert_eq!(&order.name()[..k], expected.as_str());
            }
        }
    }
}
