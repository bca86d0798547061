/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Merge-join realizability.
//!
//! A merge join on `J` needs both inputs sorted by some permutation `P` of
//! `J`. Its output is then sorted by `P`, followed by the outer input's
//! remaining sort variables, followed by the inner input's. A subtree can
//! deliver a requested sort order when that order has exactly this shape
//! and both children can deliver their part, recursively down to the scans,
//! where any set of triple variables can be put in front by picking the
//! collation order.

use super::plan::{InnerPlan, Plan, VarSet};

/// Upper bound on the permutations tried per join.
const MAX_PERMUTATIONS: usize = 720;

/// How one merge join produces a requested order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Realization {
    /// Sort order of the join variables shared by both inputs.
    pub ordering: Vec<String>,
    /// The plan's right child acts as the outer input.
    pub swapped: bool,
    pub outer_requirement: Vec<String>,
    pub inner_requirement: Vec<String>,
}

/// Permutations of `items` in lexicographic order of positions.
pub(crate) fn permutations(items: &[String]) -> Vec<Vec<String>> {
    fn extend(prefix: &mut Vec<String>, remaining: &mut Vec<String>, out: &mut Vec<Vec<String>>) {
        if out.len() >= MAX_PERMUTATIONS {
            return;
        }
        if remaining.is_empty() {
            out.push(prefix.clone());
            return;
        }
        for i in 0..remaining.len() {
            let item = remaining.remove(i);
            prefix.push(item);
            extend(prefix, remaining, out);
            if let Some(item) = prefix.pop() {
                remaining.insert(i, item);
            }
        }
    }
    let mut out = Vec::new();
    extend(&mut Vec::new(), &mut items.to_vec(), &mut out);
    out
}

fn has_duplicates(vars: &[String]) -> bool {
    vars.iter().enumerate().any(|(i, v)| vars[..i].contains(v))
}

fn concat(a: &[String], b: &[String]) -> Vec<String> {
    a.iter().chain(b.iter()).cloned().collect()
}

/// Can `plan` produce its output sorted by `required` (as a prefix)?
pub fn deliver(plan: &Plan, required: &[String]) -> bool {
    if required.is_empty() {
        return true;
    }
    match plan {
        Plan::Leaf(leaf) => {
            // the graph variable is not part of any key
            let triple_vars = leaf.pattern.variables();
            !has_duplicates(required) && required.iter().all(|v| triple_vars.contains(v))
        }
        Plan::Inner(inner) => realize(inner, required).is_some(),
    }
}

/// Finds how a merge join node produces `required`. `None` for generic
/// joins and for orders the node cannot produce.
pub fn realize(inner: &InnerPlan, required: &[String]) -> Option<Realization> {
    if !inner.merge_join || inner.join_partner.is_empty() || has_duplicates(required) {
        return None;
    }
    let join: Vec<String> = inner.join_partner.iter().cloned().collect();
    let k = join.len();
    let head = &required[..required.len().min(k)];
    if head.iter().any(|v| !inner.join_partner.contains(v)) {
        return None;
    }
    let rest = if required.len() > k { &required[k..] } else { &[][..] };

    let remaining: Vec<String> = join.iter().filter(|v| !head.contains(v)).cloned().collect();
    // prefer the node's own ordering when it is compatible
    let mut candidates: Vec<Vec<String>> = Vec::new();
    if inner.ordering.len() == k && inner.ordering.starts_with(head) {
        candidates.push(inner.ordering.clone());
    }
    for tail in permutations(&remaining) {
        let candidate = concat(head, &tail);
        if !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    }

    for ordering in candidates {
        for swapped in [false, true] {
            let (outer, other) = if swapped {
                (inner.right.as_ref(), inner.left.as_ref())
            } else {
                (inner.left.as_ref(), inner.right.as_ref())
            };
            if swapped && rest.is_empty() {
                break;
            }
            let outer_only: VarSet = outer.variables().difference(&inner.join_partner).cloned().collect();
            let inner_only: VarSet = other.variables().difference(&inner.join_partner).cloned().collect();
            let split = rest.iter().take_while(|v| outer_only.contains(*v)).count();
            let (a, b) = rest.split_at(split);
            if b.iter().any(|v| !inner_only.contains(v)) {
                continue;
            }
            if !b.is_empty() && a.len() != outer_only.len() {
                continue;
            }
            let outer_requirement = concat(&ordering, a);
            let inner_requirement = concat(&ordering, b);
            if deliver(outer, &outer_requirement) && deliver(other, &inner_requirement) {
                return Some(Realization {
                    ordering,
                    swapped,
                    outer_requirement,
                    inner_requirement,
                });
            }
        }
    }
    None
}

/// First permutation of `join_partner` that both inputs can deliver.
pub fn find_merge_ordering(left: &Plan, right: &Plan, join_partner: &VarSet) -> Option<Vec<String>> {
    if join_partner.is_empty() {
        return None;
    }
    let join: Vec<String> = join_partner.iter().cloned().collect();
    permutations(&join)
        .into_iter()
        .find(|ordering| deliver(left, ordering) && deliver(right, ordering))
}
