/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Decomposition of connected pattern sets too large for exhaustive search.

use super::plan::Plan;
use super::{Planner, PlanningStrategy};
use crate::error::{Result, TridentError};
use log::debug;
use shared::triple::TriplePosition;
use std::collections::BTreeMap;
use std::sync::Arc;

impl<'p> Planner<'p> {
    /// Tries, in order: splitting at an articulation pattern, splitting off
    /// the largest star, and clustering patterns into stars. A set that none
    /// of these can break up is planned as a greedy chain.
    pub(super) fn decompose(&self, indices: &[usize], trace: &mut Vec<PlanningStrategy>) -> Result<Arc<Plan>> {
        if let Some((pattern, parts)) = self.articulation_split(indices) {
            debug!("splitting {} patterns at pattern {}", indices.len(), pattern);
            trace.push(PlanningStrategy::ArticulationSplit { pattern });
            return self.plan_parts(parts, trace);
        }
        if let Some((variable, parts)) = self.star_split(indices) {
            debug!("splitting star on ?{} off {} patterns", variable, indices.len());
            trace.push(PlanningStrategy::StarSplit { variable });
            return self.plan_parts(parts, trace);
        }
        let clusters = self.star_clusters(indices);
        trace.push(PlanningStrategy::StarClusters {
            clusters: clusters.len(),
        });
        if clusters.len() > 1 {
            return self.plan_parts(clusters, trace);
        }
        trace.push(PlanningStrategy::GreedyChain { patterns: indices.len() });
        self.greedy_chain(indices)
    }

    /// A pattern whose removal leaves at least two components, none larger
    /// than two thirds of the rest. The pattern joins the smallest
    /// component so that every pattern is planned exactly once.
    fn articulation_split(&self, indices: &[usize]) -> Option<(usize, Vec<Vec<usize>>)> {
        let rest_len = indices.len().saturating_sub(1);
        for &pattern in indices {
            let rest: Vec<usize> = indices.iter().copied().filter(|&i| i != pattern).collect();
            let mut parts = self.components(&rest);
            if parts.len() < 2 {
                continue;
            }
            let largest = parts.iter().map(Vec::len).max().unwrap_or(0);
            if largest * 3 > rest_len * 2 {
                continue;
            }
            let smallest = (0..parts.len()).min_by_key(|&i| parts[i].len()).unwrap_or(0);
            parts[smallest].push(pattern);
            parts[smallest].sort_unstable();
            return Some((pattern, parts));
        }
        None
    }

    /// The variable shared by the most patterns, split off with its
    /// patterns when it covers more than two but not all of them.
    fn star_split(&self, indices: &[usize]) -> Option<(String, Vec<Vec<usize>>)> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for &i in indices {
            for var in &self.variables[i] {
                *counts.entry(var.as_str()).or_insert(0) += 1;
            }
        }
        let mut best: Option<(&str, usize)> = None;
        for (var, count) in counts {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((var, count));
            }
        }
        let (variable, count) = best?;
        if count <= 2 || count >= indices.len() {
            return None;
        }
        let (star, rest): (Vec<usize>, Vec<usize>) = indices.iter().copied().partition(|&i| self.variables[i].contains(variable));
        let mut parts = vec![star];
        parts.extend(self.components(&rest));
        Some((variable.to_string(), parts))
    }

    /// Groups patterns sharing a subject variable, then an object variable,
    /// then a predicate variable. Groups need two patterns; whatever is left
    /// stays on its own.
    fn star_clusters(&self, indices: &[usize]) -> Vec<Vec<usize>> {
        let mut assigned = vec![false; self.variables.len()];
        let mut clusters: Vec<Vec<usize>> = Vec::new();
        for position in [TriplePosition::Subject, TriplePosition::Object, TriplePosition::Predicate] {
            let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
            for &i in indices {
                if assigned[i] {
                    continue;
                }
                if let Some(var) = self.leaf_pattern(i).and_then(|p| p.term(position).as_var()) {
                    groups.entry(var).or_default().push(i);
                }
            }
            let mut groups: Vec<Vec<usize>> = groups.into_values().filter(|g| g.len() >= 2).collect();
            groups.sort_by(|a, b| b.len().cmp(&a.len()));
            for group in groups {
                let members: Vec<usize> = group.into_iter().filter(|&i| !assigned[i]).collect();
                if members.len() < 2 {
                    continue;
                }
                for &i in &members {
                    assigned[i] = true;
                }
                clusters.push(members);
            }
        }
        for &i in indices {
            if !assigned[i] {
                clusters.push(vec![i]);
            }
        }
        clusters
    }

    fn leaf_pattern(&self, index: usize) -> Option<&shared::terms::TriplePattern> {
        match self.leaves.get(index).map(Arc::as_ref) {
            Some(Plan::Leaf(leaf)) => Some(&leaf.pattern),
            _ => None,
        }
    }

    /// Left-deep chain: the cheapest leaf first, then whichever remaining
    /// leaf gives the best-ranked join.
    fn greedy_chain(&self, indices: &[usize]) -> Result<Arc<Plan>> {
        let mut remaining: Vec<Arc<Plan>> = Vec::with_capacity(indices.len());
        for &i in indices {
            remaining.push(
                self.leaves
                    .get(i)
                    .cloned()
                    .ok_or_else(|| TridentError::Planning(format!("no leaf for pattern {}", i)))?,
            );
        }
        let first = (0..remaining.len())
            .min_by(|&a, &b| remaining[a].cost().total_cmp(&remaining[b].cost()))
            .ok_or_else(|| TridentError::Planning("empty chain".to_string()))?;
        let mut current = remaining.remove(first);
        while !remaining.is_empty() {
            self.cancel.check()?;
            let mut best: Option<(usize, Plan)> = None;
            for (i, next) in remaining.iter().enumerate() {
                let candidate = self.model.join(current.clone(), next.clone());
                if best.as_ref().map_or(true, |(_, b)| candidate.is_better_than(b)) {
                    best = Some((i, candidate));
                }
            }
            let Some((i, joined)) = best else { break };
            remaining.remove(i);
            current = Arc::new(joined);
        }
        Ok(current)
    }
}
