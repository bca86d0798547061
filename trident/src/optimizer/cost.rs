/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use super::ordering::find_merge_ordering;
use super::plan::{Buckets, InnerPlan, LeafPlan, Plan, VarSet};
use crate::config::OptimizerConfig;
use crate::index_scan::PatternStatistics;
use shared::terms::TriplePattern;
use std::sync::Arc;

/// Cardinality and cost estimation for plan nodes.
#[derive(Debug, Clone)]
pub struct CostModel {
    merge_join_penalty: f64,
    skew_threshold: f64,
}

impl CostModel {
    pub fn new(config: &OptimizerConfig) -> Self {
        Self {
            merge_join_penalty: config.merge_join_penalty,
            skew_threshold: config.skew_threshold,
        }
    }

    /// A scan of one pattern. Cost equals the estimated match count.
    pub fn leaf(&self, index: usize, pattern: TriplePattern, stats: PatternStatistics) -> Plan {
        Plan::Leaf(LeafPlan {
            index,
            variables: pattern.all_variables(),
            pattern,
            buckets: stats.buckets,
            cardinality: stats.cardinality,
            cost: stats.cardinality,
        })
    }

    pub fn join(&self, left: Arc<Plan>, right: Arc<Plan>) -> Plan {
        let join_partner: VarSet = left.variables().intersection(right.variables()).cloned().collect();
        let variables: VarSet = left.variables().union(right.variables()).cloned().collect();
        let mut patterns = left.patterns();
        patterns.extend(right.patterns());

        let ordering = find_merge_ordering(&left, &right, &join_partner);
        let merge_join = ordering.is_some();
        let cross = left.cardinality() * right.cardinality();

        let (cardinality, cost, cartesian_products) = if join_partner.is_empty() {
            (
                cross,
                f64::INFINITY,
                1 + left.cartesian_products() + right.cartesian_products(),
            )
        } else {
            let cardinality = self.join_cardinality(&left, &right, &join_partner);
            let cost = self.join_cost(&left, &right, &join_partner, cardinality, merge_join);
            (cardinality, cost, left.cartesian_products() + right.cartesian_products())
        };

        let buckets = output_buckets(&left, &right, &join_partner, cardinality);
        Plan::Inner(InnerPlan {
            merge_joins: left.merge_joins() + right.merge_joins() + usize::from(merge_join),
            joins: left.joins() + right.joins() + 1,
            cartesian_products,
            left,
            right,
            join_partner,
            variables,
            buckets,
            cardinality,
            cost,
            merge_join,
            ordering: ordering.unwrap_or_default(),
            patterns,
        })
    }

    fn join_cardinality(&self, left: &Plan, right: &Plan, join_partner: &VarSet) -> f64 {
        let mut cardinality = left.cardinality() * right.cardinality();
        for var in join_partner {
            let selectivity = match (left.buckets().get(var), right.buckets().get(var)) {
                (Some(l), Some(r)) => l.join_selectivity(r),
                _ => 1.0 / left.cardinality().max(right.cardinality()).max(1.0),
            };
            cardinality *= selectivity;
        }
        cardinality
    }

    fn join_cost(&self, left: &Plan, right: &Plan, join_partner: &VarSet, cardinality: f64, merge_join: bool) -> f64 {
        if merge_join {
            let (smaller, larger) = if left.cardinality() <= right.cardinality() {
                (left, right)
            } else {
                (right, left)
            };
            let uniform = join_partner.iter().all(|var| {
                larger
                    .buckets()
                    .get(var)
                    .map_or(false, |bucket| bucket.skew() <= self.skew_threshold)
            });
            if uniform {
                // the larger input is only read where the smaller one has matches
                return cardinality + smaller.cost() + smaller.cardinality();
            }
            cardinality + left.cost() + right.cost()
        } else {
            cardinality * self.merge_join_penalty + left.cost() + right.cost()
        }
    }
}

fn output_buckets(left: &Plan, right: &Plan, join_partner: &VarSet, cardinality: f64) -> Buckets {
    let mut out = Buckets::new();
    for (var, bucket) in left.buckets().iter().chain(right.buckets().iter()) {
        if out.contains_key(var) {
            continue;
        }
        let scaled = if join_partner.contains(var) {
            match (left.buckets().get(var), right.buckets().get(var)) {
                (Some(l), Some(r)) => l.joined_with(r, cardinality),
                _ => bucket.scaled_to(cardinality),
            }
        } else {
            bucket.scaled_to(cardinality)
        };
        out.insert(var.clone(), scaled);
    }
    out
}
