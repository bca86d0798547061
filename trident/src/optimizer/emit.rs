/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Turns a plan tree into an operator graph.

use super::ordering::realize;
use super::plan::Plan;
use crate::index_scan::VariableBounds;
use crate::operator::{JoinKind, NodeId, OperatorGraph, ScanNode};
use log::trace;
use shared::collation::CollationOrder;

/// Emits `plan` top-down. Each node receives the sort order its parent
/// needs; scans pick the collation order that produces it. Scan bounds are
/// the caller bounds narrowed by every leaf's observed value range.
pub(super) fn emit(plan: &Plan, bounds: &VariableBounds) -> OperatorGraph {
    let mut graph = OperatorGraph::new();
    let (sideways, empty) = sideways_bounds(plan, bounds);
    emit_node(&mut graph, plan, &[], &sideways);
    if empty {
        graph.mark_provably_empty();
    }
    graph
}

/// Intersects the caller bounds with the min/max of each leaf histogram.
/// The flag is set when some variable ends up with an empty range.
fn sideways_bounds(plan: &Plan, bounds: &VariableBounds) -> (VariableBounds, bool) {
    let mut out = bounds.clone();
    for leaf in plan.leaves() {
        for (var, bucket) in &leaf.buckets {
            if let Some(lo) = &bucket.min {
                match out.min.get(var) {
                    Some(current) if current >= lo => {}
                    _ => {
                        out.min.insert(var.clone(), lo.clone());
                    }
                }
            }
            if let Some(hi) = &bucket.max {
                match out.max.get(var) {
                    Some(current) if current <= hi => {}
                    _ => {
                        out.max.insert(var.clone(), hi.clone());
                    }
                }
            }
        }
    }
    let empty = out
        .min
        .iter()
        .any(|(var, lo)| out.max.get(var).map_or(false, |hi| lo > hi));
    (out, empty)
}

fn emit_node(graph: &mut OperatorGraph, plan: &Plan, required: &[String], bounds: &VariableBounds) -> NodeId {
    match plan {
        Plan::Leaf(leaf) => {
            let order = CollationOrder::for_pattern(&leaf.pattern, required);
            let mut scan = ScanNode::new(leaf.pattern.clone(), order);
            let restricted = bounds.restricted_to(&leaf.pattern.variables());
            scan.min = restricted.min;
            scan.max = restricted.max;
            scan.estimated_cardinality = leaf.cardinality;
            trace!("scan {} via {}", leaf.pattern, order);
            graph.add_scan(scan)
        }
        Plan::Inner(inner) => {
            if let Some(realization) = realize(inner, required) {
                let (outer, other) = if realization.swapped {
                    (&inner.right, &inner.left)
                } else {
                    (&inner.left, &inner.right)
                };
                let outer_id = emit_node(graph, outer, &realization.outer_requirement, bounds);
                let inner_id = emit_node(graph, other, &realization.inner_requirement, bounds);
                return graph.add_join(JoinKind::Merge, realization.ordering, outer_id, inner_id, inner.cardinality);
            }
            let kind = if inner.join_partner.is_empty() {
                JoinKind::CrossProduct
            } else {
                JoinKind::Hash
            };
            let left = emit_node(graph, &inner.left, &[], bounds);
            let right = emit_node(graph, &inner.right, &[], bounds);
            graph.add_join(kind, inner.join_partner.iter().cloned().collect(), left, right, inner.cardinality)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptimizerConfig;
    use crate::histogram::VarBucket;
    use crate::index_scan::PatternStatistics;
    use crate::operator::Operator;
    use crate::optimizer::CostModel;
    use shared::literal::Literal;
    use shared::terms::TriplePattern;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn leaf(model: &CostModel, index: usize, pattern: TriplePattern, var: &str, lo: &str, hi: &str) -> Arc<Plan> {
        let mut buckets = BTreeMap::new();
        buckets.insert(var.to_string(), VarBucket::summary(10, 10, Literal::from(lo), Literal::from(hi)));
        Arc::new(model.leaf(
            index,
            pattern,
            PatternStatistics {
                cardinality: 10.0,
                buckets,
                exact: true,
            },
        ))
    }

    #[test]
    fn test_merge_join_scans_lead_with_join_variable() {
        let model = CostModel::new(&OptimizerConfig::default());
        let plan = model.join(
            leaf(&model, 0, TriplePattern::parse("?x", "p1", "?y"), "y", "a", "m"),
            leaf(&model, 1, TriplePattern::parse("?y", "p2", "?z"), "y", "c", "z"),
        );
        let graph = emit(&plan, &VariableBounds::new());
        assert!(!graph.is_provably_empty());
        let Some(Operator::Join(root)) = graph.root().and_then(|r| graph.operator(r)) else {
            panic!("root must be a join");
        };
        assert_eq!(root.kind, JoinKind::Merge);
        assert_eq!(root.join_variables, vec!["y".to_string()]);
        let scans = graph.scans();
        assert_eq!(scans[0].1.order, CollationOrder::Pos);
        assert_eq!(scans[1].1.order, CollationOrder::Pso);
        // both sides narrowed to the overlap of the two value ranges
        for (_, scan) in scans {
            assert_eq!(scan.min.get("y"), Some(&Literal::from("c")));
            assert_eq!(scan.max.get("y"), Some(&Literal::from("m")));
        }
    }

    #[test]
    fn test_disjoint_ranges_are_provably_empty() {
        let model = CostModel::new(&OptimizerConfig::default());
        let plan = model.join(
            leaf(&model, 0, TriplePattern::parse("?x", "p1", "?y"), "y", "a", "c"),
            leaf(&model, 1, TriplePattern::parse("?y", "p2", "?z"), "y", "x", "z"),
        );
        assert!(emit(&plan, &VariableBounds::new()).is_provably_empty());
    }

    #[test]
    fn test_caller_bounds_reach_the_scan() {
        let model = CostModel::new(&OptimizerConfig::default());
        let plan = leaf(&model, 0, TriplePattern::parse("?s", "p", "?o"), "s", "a", "z");
        let bounds = VariableBounds::new().with_min("o", "b").with_max("o", "m");
        let graph = emit(&plan, &bounds);
        let scans = graph.scans();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].1.min.get("o"), Some(&Literal::from("b")));
        assert_eq!(scans[0].1.max.get("o"), Some(&Literal::from("m")));
        assert_eq!(scans[0].1.min.get("s"), Some(&Literal::from("a")));
    }
}
