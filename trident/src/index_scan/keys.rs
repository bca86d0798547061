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
use shared::key::{KeyPattern, KeyRange};
use shared::literal::Literal;
use shared::terms::{Bindings, Term, TriplePattern};
use shared::triple::Triple;

/// Inclusive per-variable value bounds supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableBounds {
    pub min: Bindings,
    pub max: Bindings,
}

impl VariableBounds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min(mut self, variable: &str, value: impl Into<Literal>) -> Self {
        self.min.insert(variable.to_string(), value.into());
        self
    }

    pub fn with_max(mut self, variable: &str, value: impl Into<Literal>) -> Self {
        self.max.insert(variable.to_string(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.min.is_empty() && self.max.is_empty()
    }

    pub fn is_bounded(&self, variable: &str) -> bool {
        self.min.contains_key(variable) || self.max.contains_key(variable)
    }

    /// True when `value` lies inside the bounds of `variable`.
    pub fn admits(&self, variable: &str, value: &Literal) -> bool {
        self.min.get(variable).map_or(true, |lo| value >= lo) && self.max.get(variable).map_or(true, |hi| value <= hi)
    }

    /// Keeps only the bounds of `variables`.
    pub fn restricted_to<'a>(&self, variables: impl IntoIterator<Item = &'a String>) -> Self {
        let mut out = Self::default();
        for var in variables {
            if let Some(lo) = self.min.get(var) {
                out.min.insert(var.clone(), lo.clone());
            }
            if let Some(hi) = self.max.get(var) {
                out.max.insert(var.clone(), hi.clone());
            }
        }
        out
    }
}

/// Search, minimum and maximum key of one pattern under one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanKeys {
    pub order: CollationOrder,
    pub search: KeyPattern,
    pub min: KeyPattern,
    pub max: KeyPattern,
}

impl ScanKeys {
    /// Constants pass through to all three keys. A variable bound in
    /// `bindings` is substituted everywhere; an unbound one is a wildcard in
    /// the search key and takes its caller bound, if any, in the min/max key.
    pub fn build(order: CollationOrder, pattern: &TriplePattern, bindings: Option<&Bindings>, bounds: &VariableBounds) -> Self {
        let mut search: [Option<Literal>; 3] = [None, None, None];
        let mut min: [Option<Literal>; 3] = [None, None, None];
        let mut max: [Option<Literal>; 3] = [None, None, None];

        for (i, pos) in order.positions().into_iter().enumerate() {
            match pattern.term(pos) {
                Term::Constant(value) => {
                    search[i] = Some(value.clone());
                    min[i] = Some(value.clone());
                    max[i] = Some(value.clone());
                }
                Term::Variable(name) => {
                    if let Some(value) = bindings.and_then(|b| b.get(name)) {
                        search[i] = Some(value.clone());
                        min[i] = Some(value.clone());
                        max[i] = Some(value.clone());
                    } else {
                        min[i] = bounds.min.get(name).cloned();
                        max[i] = bounds.max.get(name).cloned();
                    }
                }
            }
        }

        Self {
            order,
            search: KeyPattern::new(order, search),
            min: KeyPattern::new(order, min),
            max: KeyPattern::new(order, max),
        }
    }

    /// Range dispatch: without bounds this is a prefix search on the
    /// search key; with bounds the min/max keys are used, each truncated at
    /// its first wildcard so that wildcards read as open range ends.
    pub fn range(&self) -> KeyRange {
        if self.min == self.search && self.max == self.search {
            KeyRange::prefix(self.order, self.search.prefix())
        } else {
            KeyRange::between(&self.min, &self.max)
        }
    }
}

/// Exactness filter for what a key range cannot express: repeated variables,
/// bounds behind a wildcard, and bindings for the triple positions.
pub(crate) fn residual_admits(pattern: &TriplePattern, bindings: Option<&Bindings>, bounds: &VariableBounds, triple: &Triple) -> bool {
    if !pattern.matches(triple) {
        return false;
    }
    for pos in shared::triple::TriplePosition::ALL {
        if let Some(name) = pattern.term(pos).as_var() {
            let value = triple.get(pos);
            if let Some(bound) = bindings.and_then(|b| b.get(name)) {
                if bound != value {
                    return false;
                }
            }
            if !bounds.admits(name, value) {
                return false;
            }
        }
    }
    true
}
