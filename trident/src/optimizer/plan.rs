/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::histogram::VarBucket;
use shared::terms::TriplePattern;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

pub type VarSet = BTreeSet<String>;
pub type Buckets = BTreeMap<String, VarBucket>;

#[derive(Debug, Clone)]
pub struct LeafPlan {
    /// Position of the pattern in the optimizer input.
    pub index: usize,
    pub pattern: TriplePattern,
    pub variables: VarSet,
    pub buckets: Buckets,
    pub cardinality: f64,
    pub cost: f64,
}

#[derive(Debug, Clone)]
pub struct InnerPlan {
    pub left: Arc<Plan>,
    pub right: Arc<Plan>,
    pub join_partner: VarSet,
    pub variables: VarSet,
    pub buckets: Buckets,
    pub cardinality: f64,
    pub cost: f64,
    /// Both children can deliver their output sorted by `ordering`.
    pub merge_join: bool,
    pub ordering: Vec<String>,
    pub merge_joins: usize,
    pub cartesian_products: usize,
    pub joins: usize,
    pub patterns: BTreeSet<usize>,
}

/// Binary join tree over the patterns of one basic graph pattern.
///
/// Subtrees are immutable once built and shared through `Arc` between the
/// alternatives that contain them.
#[derive(Debug, Clone)]
pub enum Plan {
    Leaf(LeafPlan),
    Inner(InnerPlan),
}

impl Plan {
    pub fn variables(&self) -> &VarSet {
        match self {
            Plan::Leaf(leaf) => &leaf.variables,
            Plan::Inner(inner) => &inner.variables,
        }
    }

    pub fn buckets(&self) -> &Buckets {
        match self {
            Plan::Leaf(leaf) => &leaf.buckets,
            Plan::Inner(inner) => &inner.buckets,
        }
    }

    pub fn cardinality(&self) -> f64 {
        match self {
            Plan::Leaf(leaf) => leaf.cardinality,
            Plan::Inner(inner) => inner.cardinality,
        }
    }

    pub fn cost(&self) -> f64 {
        match self {
            Plan::Leaf(leaf) => leaf.cost,
            Plan::Inner(inner) => inner.cost,
        }
    }

    pub fn merge_joins(&self) -> usize {
        match self {
            Plan::Leaf(_) => 0,
            Plan::Inner(inner) => inner.merge_joins,
        }
    }

    pub fn cartesian_products(&self) -> usize {
        match self {
            Plan::Leaf(_) => 0,
            Plan::Inner(inner) => inner.cartesian_products,
        }
    }

    pub fn joins(&self) -> usize {
        match self {
            Plan::Leaf(_) => 0,
            Plan::Inner(inner) => inner.joins,
        }
    }

    pub fn patterns(&self) -> BTreeSet<usize> {
        match self {
            Plan::Leaf(leaf) => BTreeSet::from([leaf.index]),
            Plan::Inner(inner) => inner.patterns.clone(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Plan::Leaf(_))
    }

    /// Leaves from left to right.
    pub fn leaves(&self) -> Vec<&LeafPlan> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a LeafPlan>) {
        match self {
            Plan::Leaf(leaf) => out.push(leaf),
            Plan::Inner(inner) => {
                inner.left.collect_leaves(out);
                inner.right.collect_leaves(out);
            }
        }
    }

    /// Plan ranking: fewer cartesian products, then more merge joins, then
    /// fewer joins, then lower cost, then the rendered tree as a total
    /// tie-break. `Less` means `self` is the better plan.
    pub fn rank_cmp(&self, other: &Plan) -> Ordering {
        self.cartesian_products()
            .cmp(&other.cartesian_products())
            .then_with(|| other.merge_joins().cmp(&self.merge_joins()))
            .then_with(|| self.joins().cmp(&other.joins()))
            .then_with(|| self.cost().total_cmp(&other.cost()))
            .then_with(|| self.to_string().cmp(&other.to_string()))
    }

    pub fn is_better_than(&self, other: &Plan) -> bool {
        self.rank_cmp(other) == Ordering::Less
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Plan::Leaf(leaf) => write!(f, "{}", leaf.index),
            Plan::Inner(inner) => {
                let op = if inner.join_partner.is_empty() {
                    "x"
                } else if inner.merge_join {
                    "M"
                } else {
                    "J"
                };
                write!(f, "({} {} {})", inner.left, op, inner.right)
            }
        }
    }
}
