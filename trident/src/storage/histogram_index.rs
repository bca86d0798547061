/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use super::index::Index;
use crate::histogram::VarBucket;
use serde::{Deserialize, Serialize};
use shared::collation::CollationOrder;
use shared::literal::Literal;
use std::collections::BTreeMap;

/// Statistics of the second key component under one leading value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadingSummary {
    pub count: u64,
    pub distinct_second: u64,
    pub min_second: Literal,
    pub max_second: Literal,
}

/// Pre-computed statistics for one collation order, generated when a build
/// finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramIndex {
    order: CollationOrder,
    total: u64,
    leading: VarBucket,
    summaries: BTreeMap<Literal, LeadingSummary>,
}

impl HistogramIndex {
    /// One ordered pass over the container. Within a run of equal leading
    /// values the second component is sorted, so distinct counting only
    /// compares neighbours.
    pub fn build(index: &Index, max_buckets: usize) -> Self {
        let mut runs: Vec<(Literal, u64)> = Vec::new();
        let mut summaries: BTreeMap<Literal, LeadingSummary> = BTreeMap::new();
        let positions = index.order().positions();

        let mut current: Option<(Literal, LeadingSummary)> = None;
        for triple in index.iter() {
            let first = triple.get(positions[0]);
            let second = triple.get(positions[1]);
            let same_run = matches!(&current, Some((value, _)) if value == first);
            if same_run {
                if let Some((_, summary)) = current.as_mut() {
                    summary.count += 1;
                    if &summary.max_second != second {
                        summary.distinct_second += 1;
                        summary.max_second = second.clone();
                    }
                }
                continue;
            }
            if let Some((value, summary)) = current.take() {
                runs.push((value.clone(), summary.count));
                summaries.insert(value, summary);
            }
            current = Some((
                first.clone(),
                LeadingSummary {
                    count: 1,
                    distinct_second: 1,
                    min_second: second.clone(),
                    max_second: second.clone(),
                },
            ));
        }
        if let Some((value, summary)) = current {
            runs.push((value.clone(), summary.count));
            summaries.insert(value, summary);
        }

        Self {
            order: index.order(),
            total: index.len() as u64,
            leading: VarBucket::from_runs(runs, max_buckets),
            summaries,
        }
    }

    pub fn order(&self) -> CollationOrder {
        self.order
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Distribution of the leading key component over the whole container.
    pub fn leading(&self) -> &VarBucket {
        &self.leading
    }

    pub fn summary(&self, leading: &Literal) -> Option<&LeadingSummary> {
        self.summaries.get(leading)
    }

    /// Distribution of the second key component among keys starting with
    /// `leading`. Empty when the value does not occur.
    pub fn second_given(&self, leading: &Literal) -> VarBucket {
        match self.summaries.get(leading) {
            Some(s) => VarBucket::summary(s.count, s.distinct_second, s.min_second.clone(), s.max_second.clone()),
            None => VarBucket::empty(),
        }
    }
}
