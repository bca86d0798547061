/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Direct join-tree construction without the cost-based optimizer.

use super::IndexScan;
use crate::error::{Result, TridentError};
use crate::operator::{JoinKind, NodeId, OperatorGraph, ScanNode};
use log::debug;
use shared::terms::TriplePattern;
use std::collections::BTreeSet;

fn shared_variables(a: &BTreeSet<String>, b: &BTreeSet<String>) -> Vec<String> {
    a.intersection(b).cloned().collect()
}

impl<'d> IndexScan<'d> {
    /// Builds a join tree straight from the patterns.
    ///
    /// Two patterns become one merge join whose scans both expose the shared
    /// variables as a sorted prefix. With more patterns, pairs with the
    /// fewest open positions (3 minus shared variables) are merge-joined
    /// first, then the resulting operators are combined by largest
    /// shared-variable overlap.
    pub fn binary_join(&self, patterns: &[TriplePattern]) -> Result<OperatorGraph> {
        if patterns.len() < 2 {
            return Err(TridentError::invalid(format!(
                "a binary join needs at least two patterns, got {}",
                patterns.len()
            )));
        }
        let mut graph = OperatorGraph::new();

        let mut unpaired: Vec<usize> = (0..patterns.len()).collect();
        let mut operators: Vec<(NodeId, f64)> = Vec::new();
        while unpaired.len() >= 2 {
            let mut best: Option<(usize, usize, usize)> = None;
            for i in 0..unpaired.len() {
                for j in (i + 1)..unpaired.len() {
                    let shared = shared_variables(
                        &patterns[unpaired[i]].all_variables(),
                        &patterns[unpaired[j]].all_variables(),
                    )
                    .len();
                    let open = 3usize.saturating_sub(shared);
                    if best.map_or(true, |(_, _, b)| open < b) {
                        best = Some((i, j, open));
                    }
                }
            }
            let Some((i, j, _)) = best else { break };
            let right = unpaired.remove(j);
            let left = unpaired.remove(i);
            operators.push(self.pair_join(&mut graph, &patterns[left], &patterns[right])?);
        }
        for leftover in unpaired {
            let pattern = &patterns[leftover];
            let estimate = self.estimate_cardinality(pattern)?;
            let mut scan = ScanNode::new(pattern.clone(), Self::collation_order::<&str>(pattern, &[]));
            scan.estimated_cardinality = estimate;
            operators.push((graph.add_scan(scan), estimate));
        }

        while operators.len() > 1 {
            let mut best: (usize, usize, usize) = (0, 1, 0);
            let mut found = false;
            for i in 0..operators.len() {
                for j in (i + 1)..operators.len() {
                    let overlap = shared_variables(
                        &graph.output_variables(operators[i].0),
                        &graph.output_variables(operators[j].0),
                    )
                    .len();
                    if !found || overlap > best.2 {
                        best = (i, j, overlap);
                        found = true;
                    }
                }
            }
            let (i, j, _) = best;
            let (right, right_card) = operators.remove(j);
            let (left, left_card) = operators.remove(i);
            let join_variables = shared_variables(&graph.output_variables(left), &graph.output_variables(right));
            let (kind, card) = if join_variables.is_empty() {
                (JoinKind::CrossProduct, left_card * right_card)
            } else {
                (JoinKind::Hash, left_card.min(right_card))
            };
            let node = graph.add_join(kind, join_variables, left, right, card);
            operators.push((node, card));
        }

        if let Some(&(root, _)) = operators.first() {
            graph.set_root(root);
        }
        debug!("legacy join tree over {} patterns:\n{}", patterns.len(), graph.explain());
        Ok(graph)
    }

    fn pair_join(&self, graph: &mut OperatorGraph, left: &TriplePattern, right: &TriplePattern) -> Result<(NodeId, f64)> {
        let shared: Vec<String> = shared_variables(&left.variables(), &right.variables());
        let left_card = self.estimate_cardinality(left)?;
        let right_card = self.estimate_cardinality(right)?;

        let mut left_scan = ScanNode::new(left.clone(), Self::collation_order(left, &shared));
        left_scan.estimated_cardinality = left_card;
        let mut right_scan = ScanNode::new(right.clone(), Self::collation_order(right, &shared));
        right_scan.estimated_cardinality = right_card;
        let left_id = graph.add_scan(left_scan);
        let right_id = graph.add_scan(right_scan);

        let all_shared = shared_variables(&left.all_variables(), &right.all_variables());
        let (kind, join_variables, card) = if all_shared.is_empty() {
            (JoinKind::CrossProduct, Vec::new(), left_card * right_card)
        } else if shared.len() == all_shared.len() {
            (JoinKind::Merge, shared, left_card.min(right_card))
        } else {
            // a shared graph variable is not part of any sort key
            (JoinKind::Hash, all_shared, left_card.min(right_card))
        };
        Ok((graph.add_join(kind, join_variables, left_id, right_id, card), card))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::operator::Operator;
    use shared::collation::CollationOrder;

    fn dataset() -> Dataset {
        let mut dataset = Dataset::default();
        for (s, p, o) in [("a", "p1", "b"), ("b", "p2", "c"), ("c", "p3", "d"), ("b", "p4", "e")] {
            dataset.add(s, p, o).unwrap();
        }
        dataset.build().unwrap();
        dataset
    }

    #[test]
    fn test_two_patterns_form_one_merge_join() {
        let dataset = dataset();
        let scan = IndexScan::new(&dataset);
        let graph = scan
            .binary_join(&[TriplePattern::parse("?x", "p1", "?y"), TriplePattern::parse("?y", "p2", "?z")])
            .unwrap();
        let joins = graph.joins();
        assert_eq!(joins.len(), 1);
        assert_eq!(joins[0].1.kind, JoinKind::Merge);
        assert_eq!(joins[0].1.join_variables, vec!["y".to_string()]);
        let orders: Vec<CollationOrder> = graph.scans().iter().map(|(_, s)| s.order).collect();
        assert_eq!(orders, vec![CollationOrder::Pos, CollationOrder::Pso]);
    }

    #[test]
    fn test_greedy_pairing_for_four_patterns() {
        let dataset = dataset();
        let scan = IndexScan::new(&dataset);
        let patterns = [
            TriplePattern::parse("?x", "p1", "?y"),
            TriplePattern::parse("?z", "p3", "?w"),
            TriplePattern::parse("?y", "p2", "?z"),
            TriplePattern::parse("?y", "p4", "?v"),
        ];
        let graph = scan.binary_join(&patterns).unwrap();
        assert_eq!(graph.scans().len(), 4);
        assert_eq!(graph.joins().len(), 3);
        // (?x p1 ?y)+(?y p2 ?z) pair first; the two leftovers share nothing
        assert_eq!(graph.count_joins(JoinKind::Merge), 1);
        assert_eq!(graph.count_joins(JoinKind::CrossProduct), 1);
        assert_eq!(graph.count_joins(JoinKind::Hash), 1);
        let Some(Operator::Join(root)) = graph.root().and_then(|r| graph.operator(r)) else {
            panic!("root must be a join");
        };
        assert_eq!(root.output_variables.len(), 5);
    }

    #[test]
    fn test_fewer_than_two_patterns_is_invalid() {
        let dataset = dataset();
        let scan = IndexScan::new(&dataset);
        let err = scan.binary_join(&[TriplePattern::parse("?x", "p1", "?y")]).unwrap_err();
        assert!(matches!(err, TridentError::InvalidArgument(_)));
    }
}
