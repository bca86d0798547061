/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Per-variable statistics used by the cost model.
//!
//! A [`VarBucket`] summarises the values one variable takes in the matches of
//! one pattern: how many matches there are, how many distinct values, the
//! value range and an equi-depth distribution. Buckets never split a value,
//! so the distinct counts add up.

use crate::error::{Result, TridentError};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use shared::literal::Literal;
use std::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    /// Largest value in the bucket. The bucket covers everything above the
    /// previous bucket's upper value.
    pub upper: Literal,
    pub count: f64,
    pub distinct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarBucket {
    pub count: f64,
    pub distinct: f64,
    pub min: Option<Literal>,
    pub max: Option<Literal>,
    pub buckets: Vec<Bucket>,
}

impl Default for VarBucket {
    fn default() -> Self {
        Self::empty()
    }
}

impl VarBucket {
    pub fn empty() -> Self {
        Self {
            count: 0.0,
            distinct: 0.0,
            min: None,
            max: None,
            buckets: Vec::new(),
        }
    }

    /// A histogram that only knows its totals, used when no data could be
    /// inspected.
    pub fn unknown(count: f64) -> Self {
        Self {
            count,
            distinct: count.max(1.0),
            min: None,
            max: None,
            buckets: Vec::new(),
        }
    }

    /// Single-bucket summary from pre-computed totals.
    pub fn summary(count: u64, distinct: u64, min: Literal, max: Literal) -> Self {
        Self {
            count: count as f64,
            distinct: distinct as f64,
            min: Some(min),
            buckets: vec![Bucket {
                upper: max.clone(),
                count: count as f64,
                distinct: distinct as f64,
            }],
            max: Some(max),
        }
    }

    /// Builds an equi-depth histogram from `(value, occurrences)` runs given
    /// in ascending value order.
    pub fn from_runs<I>(runs: I, max_buckets: usize) -> Self
    where
        I: IntoIterator<Item = (Literal, u64)>,
    {
        let runs: Vec<(Literal, u64)> = runs.into_iter().filter(|(_, n)| *n > 0).collect();
        let total: u64 = runs.iter().map(|(_, n)| n).sum();
        if total == 0 {
            return Self::empty();
        }
        let target = (total as f64 / max_buckets.max(1) as f64).ceil().max(1.0);

        let mut buckets = Vec::new();
        let mut count = 0.0;
        let mut distinct = 0.0;
        for (i, (value, n)) in runs.iter().enumerate() {
            count += *n as f64;
            distinct += 1.0;
            if count >= target || i + 1 == runs.len() {
                buckets.push(Bucket {
                    upper: value.clone(),
                    count,
                    distinct,
                });
                count = 0.0;
                distinct = 0.0;
            }
        }

        Self {
            count: total as f64,
            distinct: runs.len() as f64,
            min: runs.first().map(|(v, _)| v.clone()),
            max: runs.last().map(|(v, _)| v.clone()),
            buckets,
        }
    }

    /// Builds a histogram from values in ascending order.
    pub fn from_sorted_values<'a, I>(values: I, max_buckets: usize) -> Self
    where
        I: IntoIterator<Item = &'a Literal>,
    {
        let mut runs: Vec<(Literal, u64)> = Vec::new();
        for value in values {
            match runs.last_mut() {
                Some((last, n)) if last == value => *n += 1,
                _ => runs.push((value.clone(), 1)),
            }
        }
        Self::from_runs(runs, max_buckets)
    }

    /// Builds a histogram from values in any order.
    pub fn from_values(mut values: Vec<Literal>, max_buckets: usize) -> Self {
        values.sort_unstable();
        Self::from_sorted_values(values.iter(), max_buckets)
    }

    pub fn is_empty(&self) -> bool {
        self.count <= 0.0
    }

    /// Average number of matches per distinct value.
    pub fn skew(&self) -> f64 {
        if self.distinct <= 0.0 {
            1.0
        } else {
            self.count / self.distinct
        }
    }

    /// `(upper, cumulative selectivity)` breakpoints in ascending order.
    pub fn breakpoints(&self) -> Vec<(Literal, f64)> {
        let mut seen = 0.0;
        self.buckets
            .iter()
            .map(|bucket| {
                seen += bucket.count;
                (bucket.upper.clone(), if self.count > 0.0 { seen / self.count } else { 0.0 })
            })
            .collect()
    }

    /// Count and distinct count of the part of this histogram that lies in
    /// `[lo, hi]`, at bucket granularity.
    fn restricted_totals(&self, lo: &Literal, hi: &Literal) -> (f64, f64) {
        if self.buckets.is_empty() {
            return (self.count, self.distinct);
        }
        let mut count = 0.0;
        let mut distinct = 0.0;
        let mut lower = self.min.as_ref();
        for bucket in &self.buckets {
            let below = &bucket.upper < lo;
            let above = lower.map_or(false, |l| l > hi);
            if !below && !above {
                count += bucket.count;
                distinct += bucket.distinct;
            }
            lower = Some(&bucket.upper);
        }
        (count, distinct)
    }

    /// Estimated number of matches of an equi-join between the two value
    /// distributions. Disjoint value ranges yield zero.
    pub fn join_cardinality(&self, other: &VarBucket) -> f64 {
        if self.is_empty() || other.is_empty() {
            return 0.0;
        }
        let (lo, hi) = match (&self.min, &self.max, &other.min, &other.max) {
            (Some(a_min), Some(a_max), Some(b_min), Some(b_max)) => {
                (a_min.max(b_min).clone(), a_max.min(b_max).clone())
            }
            _ => return self.count * other.count / self.distinct.max(other.distinct).max(1.0),
        };
        if lo > hi {
            return 0.0;
        }
        let (left_count, left_distinct) = self.restricted_totals(&lo, &hi);
        let (right_count, right_distinct) = other.restricted_totals(&lo, &hi);
        left_count * right_count / left_distinct.max(right_distinct).max(1.0)
    }

    /// Fraction of the cross product that survives an equi-join on this
    /// variable.
    pub fn join_selectivity(&self, other: &VarBucket) -> f64 {
        let cross = self.count * other.count;
        if cross <= 0.0 {
            0.0
        } else {
            (self.join_cardinality(other) / cross).min(1.0)
        }
    }

    /// Same distribution shape, rescaled to `count` matches.
    pub fn scaled_to(&self, count: f64) -> Self {
        if self.count <= 0.0 {
            return Self::unknown(count);
        }
        let factor = count / self.count;
        Self {
            count,
            distinct: self.distinct.min(count).max(if count > 0.0 { 1.0 } else { 0.0 }),
            min: self.min.clone(),
            max: self.max.clone(),
            buckets: self
                .buckets
                .iter()
                .map(|b| Bucket {
                    upper: b.upper.clone(),
                    count: b.count * factor,
                    distinct: b.distinct.min(b.count * factor),
                })
                .collect(),
        }
    }

    /// Histogram of the join variable after an equi-join with `other`.
    pub fn joined_with(&self, other: &VarBucket, count: f64) -> Self {
        let mut joined = self.scaled_to(count);
        joined.distinct = joined.distinct.min(other.distinct.max(1.0));
        joined.min = match (&self.min, &other.min) {
            (Some(a), Some(b)) => Some(a.max(b).clone()),
            (a, b) => a.clone().or_else(|| b.clone()),
        };
        joined.max = match (&self.max, &other.max) {
            (Some(a), Some(b)) => Some(a.min(b).clone()),
            (a, b) => a.clone().or_else(|| b.clone()),
        };
        joined
    }

    /// Union of two histograms over disjoint sources (e.g. two graphs).
    pub fn combine(&self, other: &VarBucket) -> Self {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        let mut buckets: Vec<Bucket> = self.buckets.iter().chain(other.buckets.iter()).cloned().collect();
        buckets.sort_by(|a, b| a.upper.cmp(&b.upper));
        Self {
            count: self.count + other.count,
            distinct: self.distinct.max(other.distinct),
            min: match (&self.min, &other.min) {
                (Some(a), Some(b)) => Some(a.min(b).clone()),
                (a, b) => a.clone().or_else(|| b.clone()),
            },
            max: match (&self.max, &other.max) {
                (Some(a), Some(b)) => Some(a.max(b).clone()),
                (a, b) => a.clone().or_else(|| b.clone()),
            },
            buckets,
        }
    }
}

/// Cache of fallback histograms keyed by canonical pattern signature.
///
/// Entries remember the dataset generation they were computed for; a rebuild
/// bumps the generation and makes them stale.
#[derive(Debug, Default)]
pub struct HistogramCache {
    entries: RwLock<FxHashMap<String, (u64, VarBucket)>>,
}

impl HistogramCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, signature: &str, generation: u64) -> Result<Option<VarBucket>> {
        let entries = self.entries.read().map_err(|_| TridentError::Histogram {
            pattern: signature.to_string(),
            reason: "histogram cache lock poisoned".to_string(),
        })?;
        Ok(entries
            .get(signature)
            .filter(|(g, _)| *g == generation)
            .map(|(_, bucket)| bucket.clone()))
    }

    pub fn insert(&self, signature: String, generation: u64, bucket: VarBucket) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| TridentError::Histogram {
            pattern: signature.clone(),
            reason: "histogram cache lock poisoned".to_string(),
        })?;
        entries.insert(signature, (generation, bucket));
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        let entries = self.entries.read().map_err(|_| TridentError::Histogram {
            pattern: "*".to_string(),
            reason: "histogram cache lock poisoned".to_string(),
        })?;
        Ok(entries.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
