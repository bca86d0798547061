/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Turning one triple pattern into an ordered range scan.
//!
//! `IndexScan` builds the search/min/max keys, chooses the collation order,
//! fans out over candidate graphs through the k-way merge and computes the
//! per-variable histograms the optimizer costs plans with.

pub mod keys;
mod legacy;

pub use keys::{ScanKeys, VariableBounds};

use crate::config::OptimizerConfig;
use crate::dataset::{Dataset, GraphId};
use crate::error::{Result, TridentError};
use crate::histogram::VarBucket;
use crate::merge::{KMerge, TaggedCursor};
use crate::operator::ScanNode;
use crate::storage::SixIndices;
use keys::residual_admits;
use log::{trace, warn};
use shared::collation::CollationOrder;
use shared::literal::Literal;
use shared::terms::{Bindings, GraphConstraint, Term, TriplePattern};
use shared::triple::{Triple, TriplePosition};
use std::collections::{BTreeMap, BTreeSet};

/// Estimated size of a pattern's result plus the histograms of the
/// requested variables.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternStatistics {
    pub cardinality: f64,
    pub buckets: BTreeMap<String, VarBucket>,
    /// False when some figure is the configured default rather than
    /// derived from data.
    pub exact: bool,
}

/// A stream of `(graph, triple)` matches in the scan's collation order.
pub type TripleStream<'d> = Box<dyn Iterator<Item = (GraphId, &'d Triple)> + 'd>;

pub struct IndexScan<'d> {
    dataset: &'d Dataset,
    config: OptimizerConfig,
}

impl<'d> IndexScan<'d> {
    pub fn new(dataset: &'d Dataset) -> Self {
        Self::with_config(dataset, OptimizerConfig::default())
    }

    pub fn with_config(dataset: &'d Dataset, config: OptimizerConfig) -> Self {
        Self { dataset, config }
    }

    pub fn dataset(&self) -> &'d Dataset {
        self.dataset
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Order for `pattern` when the caller wants its output sorted by
    /// `ordered_vars`: constants first, then the requested variables, then
    /// the rest.
    pub fn collation_order<S: AsRef<str>>(pattern: &TriplePattern, ordered_vars: &[S]) -> CollationOrder {
        CollationOrder::for_pattern(pattern, ordered_vars)
    }

    /// Order for a bare scan: bindings count as constants and bounded
    /// variables come right after them so the bounds narrow the key range.
    pub fn scan_order(pattern: &TriplePattern, bindings: Option<&Bindings>, bounds: &VariableBounds) -> CollationOrder {
        let bound = match bindings {
            Some(b) => pattern.substitute(b),
            None => pattern.clone(),
        };
        let bounded: Vec<String> = bound.variables().into_iter().filter(|v| bounds.is_bounded(v)).collect();
        CollationOrder::for_pattern(&bound, &bounded)
    }

    pub fn keys(pattern: &TriplePattern, order: CollationOrder, bindings: Option<&Bindings>, bounds: &VariableBounds) -> ScanKeys {
        ScanKeys::build(order, pattern, bindings, bounds)
    }

    /// Lazily streams the matches of one pattern under `order`. Several
    /// candidate graphs are merged into one globally ordered stream.
    pub fn scan(
        &self,
        pattern: &TriplePattern,
        order: CollationOrder,
        bindings: Option<&Bindings>,
        bounds: &VariableBounds,
    ) -> Result<TripleStream<'d>> {
        let keys = Self::keys(pattern, order, bindings, bounds);
        let range = keys.range();
        trace!("scan {} via {} range {:?}..{:?}", pattern, order, range.lower, range.upper);

        let graphs = self.dataset.candidate_graphs(&pattern.graph, bindings);
        let mut cursors = Vec::with_capacity(graphs.len());
        for (graph, store) in graphs {
            let residual = pattern.clone();
            let bindings = bindings.cloned();
            let bounds = bounds.clone();
            let matches = store
                .range_scan(&range)?
                .filter(move |triple| residual_admits(&residual, bindings.as_ref(), &bounds, triple));
            cursors.push(TaggedCursor::new(graph, matches));
        }
        if cursors.len() == 1 {
            return Ok(Box::new(cursors.remove(0)));
        }
        Ok(Box::new(KMerge::new(order, cursors)))
    }

    /// Evaluates a scan operator into solution mappings, sorted by the
    /// scan's order. A scan must carry exactly one pattern.
    pub fn evaluate(
        &self,
        scan: &ScanNode,
        bindings: Option<&Bindings>,
    ) -> Result<impl Iterator<Item = Bindings> + 'd> {
        let pattern = match scan.patterns.as_slice() {
            [pattern] => pattern.clone().in_graph(scan.graph.clone()),
            patterns => {
                return Err(TridentError::invalid(format!(
                    "a scan evaluates exactly one pattern, got {}",
                    patterns.len()
                )))
            }
        };
        let bounds = VariableBounds {
            min: scan.min.clone(),
            max: scan.max.clone(),
        };
        let stream = self.scan(&pattern, scan.order, bindings, &bounds)?;
        let dataset = self.dataset;
        let graph_var = pattern.graph.as_var().map(str::to_string);
        Ok(stream.map(move |(graph, triple)| {
            let mut solution = pattern.bind(triple);
            if let (Some(var), Some(name)) = (graph_var.as_ref(), dataset.graph_name(graph)) {
                solution.insert(var.clone(), name.clone());
            }
            solution
        }))
    }

    /// Histograms for `variables` of `pattern` plus its estimated
    /// cardinality. Uses the pre-computed per-order statistics where the
    /// pattern shape allows it and falls back to scanning the matched range.
    pub fn var_buckets(&self, pattern: &TriplePattern, variables: &BTreeSet<String>) -> Result<PatternStatistics> {
        let graphs = self.dataset.candidate_graphs(&pattern.graph, None);
        let mut stats = PatternStatistics {
            cardinality: 0.0,
            buckets: BTreeMap::new(),
            exact: true,
        };
        if graphs.is_empty() {
            for var in variables {
                stats.buckets.insert(var.clone(), VarBucket::empty());
            }
            return Ok(stats);
        }

        for (_, store) in &graphs {
            match self.count(store, pattern)? {
                Some(count) => stats.cardinality += count as f64,
                None => {
                    warn!(
                        "cardinality of {} exceeds the scan budget; assuming {}",
                        pattern, self.config.default_cardinality
                    );
                    stats.cardinality += self.config.default_cardinality;
                    stats.exact = false;
                }
            }
        }

        for var in variables {
            let bucket = if pattern.graph.as_var() == Some(var.as_str()) && pattern.positions_of(var).is_empty() {
                self.graph_bucket(&graphs, pattern)?
            } else if pattern.positions_of(var).is_empty() {
                continue;
            } else {
                let mut combined = VarBucket::empty();
                for (id, store) in &graphs {
                    match self.variable_bucket(*id, store, pattern, var)? {
                        Some(bucket) => combined = combined.combine(&bucket),
                        None => {
                            warn!("histogram of ?{} in {} is unavailable; using defaults", var, pattern);
                            stats.exact = false;
                            combined = combined.combine(&VarBucket::unknown(self.config.default_cardinality));
                        }
                    }
                }
                combined
            };
            stats.buckets.insert(var.clone(), bucket);
        }
        Ok(stats)
    }

    /// Exact match count, or `None` when counting would exceed the scan
    /// budget.
    fn count(&self, store: &SixIndices, pattern: &TriplePattern) -> Result<Option<u64>> {
        let constants: Vec<TriplePosition> = TriplePosition::ALL
            .iter()
            .copied()
            .filter(|&pos| !pattern.term(pos).is_var())
            .collect();
        if !pattern.has_repeated_variable() {
            let order = CollationOrder::for_pattern::<&str>(pattern, &[]);
            match constants.as_slice() {
                [] => {
                    if let Some(histogram) = store.histogram(order) {
                        return Ok(Some(histogram.total()));
                    }
                }
                [pos] => {
                    if let (Some(histogram), Some(value)) = (store.histogram(order), pattern.term(*pos).as_constant()) {
                        return Ok(Some(histogram.summary(value).map_or(0, |s| s.count)));
                    }
                }
                _ => {}
            }
        }
        let order = CollationOrder::for_pattern::<&str>(pattern, &[]);
        let range = Self::keys(pattern, order, None, &VariableBounds::new()).range();
        let limit = self.config.max_histogram_scan;
        let mut seen = 0usize;
        let mut count = 0u64;
        for triple in store.range_scan(&range).map_err(|e| histogram_error(pattern, e))? {
            seen += 1;
            if seen > limit {
                return Ok(None);
            }
            if pattern.matches(triple) {
                count += 1;
            }
        }
        Ok(Some(count))
    }

    fn variable_bucket(
        &self,
        graph: GraphId,
        store: &SixIndices,
        pattern: &TriplePattern,
        var: &str,
    ) -> Result<Option<VarBucket>> {
        let signature = format!(
            "{} g{} b{}",
            canonical_signature(pattern, var),
            graph,
            self.config.histogram_buckets
        );
        let generation = self.dataset.generation();
        let cache = self.dataset.statistics();
        if let Some(bucket) = cache.get(&signature, generation)? {
            return Ok(Some(bucket));
        }

        let bucket = match self.bucket_from_histogram_index(store, pattern, var) {
            Some(bucket) => Some(bucket),
            None => self.bucket_from_scan(store, pattern, var)?,
        };
        if let Some(bucket) = &bucket {
            cache.insert(signature, generation, bucket.clone())?;
        }
        Ok(bucket)
    }

    fn bucket_from_histogram_index(&self, store: &SixIndices, pattern: &TriplePattern, var: &str) -> Option<VarBucket> {
        if pattern.has_repeated_variable() {
            return None;
        }
        let target = pattern.position_of(var)?;
        let constants: Vec<TriplePosition> = TriplePosition::ALL
            .iter()
            .copied()
            .filter(|&pos| !pattern.term(pos).is_var())
            .collect();
        match constants.as_slice() {
            [] => {
                let order = CollationOrder::ALL.iter().copied().find(|o| o.positions()[0] == target)?;
                Some(store.histogram(order)?.leading().clone())
            }
            [pos] => {
                let order = CollationOrder::ALL
                    .iter()
                    .copied()
                    .find(|o| o.positions()[0] == *pos && o.positions()[1] == target)?;
                let value = pattern.term(*pos).as_constant()?;
                Some(store.histogram(order)?.second_given(value))
            }
            _ => None,
        }
    }

    /// Scans under the order that makes `var` the leading non-constant key
    /// component, so its values arrive sorted.
    fn bucket_from_scan(&self, store: &SixIndices, pattern: &TriplePattern, var: &str) -> Result<Option<VarBucket>> {
        let order = CollationOrder::for_pattern(pattern, &[var]);
        let range = Self::keys(pattern, order, None, &VariableBounds::new()).range();
        let position = match pattern.position_of(var) {
            Some(pos) => pos,
            None => return Ok(Some(VarBucket::empty())),
        };
        let limit = self.config.max_histogram_scan;
        let mut values: Vec<Literal> = Vec::new();
        for (seen, triple) in store.range_scan(&range).map_err(|e| histogram_error(pattern, e))?.enumerate() {
            if seen >= limit {
                return Ok(None);
            }
            if pattern.matches(triple) {
                values.push(triple.get(position).clone());
            }
        }
        Ok(Some(VarBucket::from_sorted_values(values.iter(), self.config.histogram_buckets)))
    }

    /// Distribution of graph names bound to a graph variable.
    fn graph_bucket(&self, graphs: &[(GraphId, &SixIndices)], pattern: &TriplePattern) -> Result<VarBucket> {
        let mut runs: Vec<(Literal, u64)> = Vec::new();
        for (id, store) in graphs {
            let Some(name) = self.dataset.graph_name(*id) else { continue };
            let count = self.count(store, pattern)?.unwrap_or(self.config.default_cardinality as u64);
            runs.push((name.clone(), count));
        }
        runs.sort();
        Ok(VarBucket::from_runs(runs, self.config.histogram_buckets))
    }

    /// Rough match count used where full statistics are not needed.
    pub fn estimate_cardinality(&self, pattern: &TriplePattern) -> Result<f64> {
        Ok(self.var_buckets(pattern, &BTreeSet::new())?.cardinality)
    }
}

fn histogram_error(pattern: &TriplePattern, err: TridentError) -> TridentError {
    TridentError::Histogram {
        pattern: pattern.to_string(),
        reason: err.to_string(),
    }
}

/// Pattern text with variables renamed by first occurrence, plus the target
/// variable, so patterns equal up to renaming share cached statistics.
pub(crate) fn canonical_signature(pattern: &TriplePattern, target: &str) -> String {
    let mut names: Vec<String> = Vec::new();
    let mut rename = |name: &str| -> String {
        let index = match names.iter().position(|n| n == name) {
            Some(i) => i,
            None => {
                names.push(name.to_string());
                names.len() - 1
            }
        };
        format!("?{}", index)
    };
    let mut parts: Vec<String> = Vec::with_capacity(5);
    for pos in TriplePosition::ALL {
        parts.push(match pattern.term(pos) {
            Term::Variable(name) => rename(name.as_str()),
            Term::Constant(value) => format!("<{}>", value),
        });
    }
    parts.push(match &pattern.graph {
        GraphConstraint::Variable(name) => format!("@{}", rename(name.as_str())),
        other => format!("@{}", other),
    });
    parts.push(format!("#{}", rename(target)));
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    fn dataset() -> Dataset {
        let mut dataset = Dataset::default();
        for (s, p, o) in [
            ("alice", "knows", "bob"),
            ("alice", "knows", "carol"),
            ("bob", "knows", "carol"),
            ("carol", "age", "30"),
            ("bob", "age", "25"),
        ] {
            dataset.add(s, p, o).unwrap();
        }
        dataset.build().unwrap();
        dataset
    }

    #[test]
    fn test_scan_order_front_loads_bounded_variables() {
        let pattern = TriplePattern::parse("?s", "knows", "?o");
        let bounds = VariableBounds::new().with_min("o", "b");
        assert_eq!(IndexScan::scan_order(&pattern, None, &bounds), CollationOrder::Pos);
        assert_eq!(IndexScan::scan_order(&pattern, None, &VariableBounds::new()), CollationOrder::Pso);
        let mut bindings = Bindings::new();
        bindings.insert("o".to_string(), Literal::from("bob"));
        assert_eq!(IndexScan::scan_order(&pattern, Some(&bindings), &bounds), CollationOrder::Pos);
    }

    #[test]
    fn test_scan_respects_bindings() {
        let dataset = dataset();
        let scan = IndexScan::new(&dataset);
        let pattern = TriplePattern::parse("?s", "knows", "?o");
        let mut bindings = Bindings::new();
        bindings.insert("s".to_string(), Literal::from("alice"));
        let order = IndexScan::scan_order(&pattern, Some(&bindings), &VariableBounds::new());
        let objects: Vec<&str> = scan
            .scan(&pattern, order, Some(&bindings), &VariableBounds::new())
            .unwrap()
            .map(|(_, t)| t.object.as_str())
            .collect();
        assert_eq!(objects, vec!["bob", "carol"]);
    }

    #[test]
    fn test_evaluate_rejects_multi_pattern_scans() {
        let dataset = dataset();
        let scan = IndexScan::new(&dataset);
        let mut node = ScanNode::new(TriplePattern::parse("?s", "knows", "?o"), CollationOrder::Pso);
        node.patterns.push(TriplePattern::parse("?s", "age", "?a"));
        assert!(matches!(scan.evaluate(&node, None), Err(TridentError::InvalidArgument(_))));
    }

    #[test]
    fn test_var_buckets_fast_path_matches_scan() {
        let dataset = dataset();
        let scan = IndexScan::new(&dataset);
        let pattern = TriplePattern::parse("?s", "knows", "?o");
        let vars: BTreeSet<String> = ["s", "o"].iter().map(|v| v.to_string()).collect();
        let stats = scan.var_buckets(&pattern, &vars).unwrap();
        assert!(stats.exact);
        assert_eq!(stats.cardinality, 3.0);
        assert_eq!(stats.buckets["s"].distinct, 2.0);
        assert_eq!(stats.buckets["o"].distinct, 2.0);
        assert_eq!(stats.buckets["o"].min, Some(Literal::from("bob")));

        let fresh = scan.bucket_from_scan(dataset.default_graph(), &pattern, "s").unwrap().unwrap();
        assert_eq!(fresh.count, 3.0);
        assert_eq!(fresh.distinct, 2.0);
    }

    #[test]
    fn test_var_buckets_for_unknown_constant_is_empty() {
        let dataset = dataset();
        let scan = IndexScan::new(&dataset);
        let pattern = TriplePattern::parse("?s", "likes", "?o");
        let vars: BTreeSet<String> = ["s"].iter().map(|v| v.to_string()).collect();
        let stats = scan.var_buckets(&pattern, &vars).unwrap();
        assert_eq!(stats.cardinality, 0.0);
        assert!(stats.buckets["s"].is_empty());
    }

    #[test]
    fn test_scan_budget_falls_back_to_default() {
        let dataset = dataset();
        let config = OptimizerConfig {
            max_histogram_scan: 1,
            default_cardinality: 42.0,
            ..OptimizerConfig::default()
        };
        let scan = IndexScan::with_config(&dataset, config);
        // two constants: no pre-computed statistics, the scan exceeds its budget
        let pattern = TriplePattern::parse("alice", "knows", "?o");
        let stats = scan.var_buckets(&pattern, &BTreeSet::new()).unwrap();
        assert!(!stats.exact);
        assert_eq!(stats.cardinality, 42.0);
    }

    #[test]
    fn test_unusable_store_is_a_histogram_failure() {
        let mut dataset = Dataset::new(StoreConfig::default());
        dataset.add("a", "p", "b").unwrap();
        dataset.default_graph_mut().begin_bulk_load().unwrap();
        let scan = IndexScan::new(&dataset);
        let pattern = TriplePattern::parse("a", "p", "?o");
        let err = scan.var_buckets(&pattern, &BTreeSet::new()).unwrap_err();
        assert!(matches!(err, TridentError::Histogram { .. }));
        dataset.default_graph_mut().build().unwrap();
    }

    #[test]
    fn test_cached_histograms_are_kept_apart_per_resolution() {
        let dataset = dataset();
        // two constants: the bucket comes from a scan at the scanner's resolution
        let pattern = TriplePattern::parse("alice", "knows", "?o");
        let vars: BTreeSet<String> = ["o"].iter().map(|v| v.to_string()).collect();
        let coarse = IndexScan::with_config(
            &dataset,
            OptimizerConfig {
                histogram_buckets: 1,
                ..OptimizerConfig::default()
            },
        );
        let fine = IndexScan::with_config(
            &dataset,
            OptimizerConfig {
                histogram_buckets: 8,
                ..OptimizerConfig::default()
            },
        );
        let first = coarse.var_buckets(&pattern, &vars).unwrap();
        let second = fine.var_buckets(&pattern, &vars).unwrap();
        assert_eq!(dataset.statistics().len().unwrap(), 2);
        assert_eq!(first.buckets["o"].buckets.len(), 1);
        assert_eq!(second.buckets["o"].buckets.len(), 2);
        coarse.var_buckets(&pattern, &vars).unwrap();
        assert_eq!(dataset.statistics().len().unwrap(), 2);
    }

    #[test]
    fn test_signature_ignores_variable_names() {
        let a = TriplePattern::parse("?x", "p", "?y");
        let b = TriplePattern::parse("?s", "p", "?o");
        assert_eq!(canonical_signature(&a, "y"), canonical_signature(&b, "o"));
        assert_ne!(canonical_signature(&a, "x"), canonical_signature(&b, "o"));
    }
}
