/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Reference evaluation of an operator graph into solution mappings.

use crate::config::OptimizerConfig;
use crate::dataset::Dataset;
use crate::error::{Result, TridentError};
use crate::index_scan::IndexScan;
use crate::operator::{JoinKind, JoinNode, NodeId, Operator, OperatorGraph};
use log::debug;
use rustc_hash::FxHashMap;
use shared::literal::Literal;
use shared::terms::Bindings;
use std::cmp::Ordering;

pub struct Executor<'d> {
    scan: IndexScan<'d>,
}

impl<'d> Executor<'d> {
    pub fn new(dataset: &'d Dataset) -> Self {
        Self::with_config(dataset, OptimizerConfig::default())
    }

    pub fn with_config(dataset: &'d Dataset, config: OptimizerConfig) -> Self {
        Self {
            scan: IndexScan::with_config(dataset, config),
        }
    }

    /// All solutions of the graph, in the order the root produces them.
    pub fn execute(&self, graph: &OperatorGraph) -> Result<Vec<Bindings>> {
        if graph.is_provably_empty() {
            return Ok(Vec::new());
        }
        match graph.root() {
            Some(root) => self.evaluate(graph, root),
            None => Ok(Vec::new()),
        }
    }

    fn evaluate(&self, graph: &OperatorGraph, id: NodeId) -> Result<Vec<Bindings>> {
        match graph.operator(id) {
            Some(Operator::Scan(scan)) => Ok(self.scan.evaluate(scan, None)?.collect()),
            Some(Operator::Join(join)) => {
                let left = self.evaluate(graph, join.left)?;
                // an empty input decides the join without touching the other side
                if left.is_empty() {
                    return Ok(Vec::new());
                }
                let right = self.evaluate(graph, join.right)?;
                let out = match join.kind {
                    JoinKind::Merge => merge_join(&left, &right, &join.join_variables),
                    JoinKind::Hash => hash_join(&left, &right, &join.join_variables),
                    JoinKind::CrossProduct => cross_product(&left, &right),
                };
                debug!("{}: {} x {} -> {} rows", describe(join), left.len(), right.len(), out.len());
                Ok(out)
            }
            None => Err(TridentError::invalid(format!("operator {} does not exist", id))),
        }
    }
}

fn describe(join: &JoinNode) -> String {
    format!("{} on [{}]", join.kind, join.join_variables.join(", "))
}

fn key<'a>(row: &'a Bindings, variables: &[String]) -> Option<Vec<&'a Literal>> {
    variables.iter().map(|v| row.get(v)).collect()
}

fn merged(left: &Bindings, right: &Bindings) -> Bindings {
    let mut row = left.clone();
    for (var, value) in right {
        row.entry(var.clone()).or_insert_with(|| value.clone());
    }
    row
}

/// Both inputs sorted by `variables`. Equal-key groups are combined
/// left-major, which keeps the output sorted by the left input's order.
fn merge_join(left: &[Bindings], right: &[Bindings], variables: &[String]) -> Vec<Bindings> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        let (Some(lk), Some(rk)) = (key(&left[i], variables), key(&right[j], variables)) else {
            if key(&left[i], variables).is_none() {
                i += 1;
            } else {
                j += 1;
            }
            continue;
        };
        match lk.cmp(&rk) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                let left_end = (i..left.len())
                    .find(|&k| key(&left[k], variables).as_ref() != Some(&lk))
                    .unwrap_or(left.len());
                let right_end = (j..right.len())
                    .find(|&k| key(&right[k], variables).as_ref() != Some(&rk))
                    .unwrap_or(right.len());
                for l in &left[i..left_end] {
                    for r in &right[j..right_end] {
                        out.push(merged(l, r));
                    }
                }
                i = left_end;
                j = right_end;
            }
        }
    }
    out
}

fn hash_join(left: &[Bindings], right: &[Bindings], variables: &[String]) -> Vec<Bindings> {
    let mut table: FxHashMap<Vec<&Literal>, Vec<&Bindings>> = FxHashMap::default();
    for row in right {
        if let Some(k) = key(row, variables) {
            table.entry(k).or_default().push(row);
        }
    }
    let mut out = Vec::new();
    for row in left {
        let Some(k) = key(row, variables) else { continue };
        if let Some(matches) = table.get(&k) {
            out.extend(matches.iter().map(|r| merged(row, r)));
        }
    }
    out
}

fn cross_product(left: &[Bindings], right: &[Bindings]) -> Vec<Bindings> {
    left.iter()
        .flat_map(|l| right.iter().map(move |r| merged(l, r)))
        .collect()
}
