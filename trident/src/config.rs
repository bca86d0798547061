/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::error::{Result, TridentError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which backend holds the six containers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageVariant {
    /// Containers live in memory only
    InMemory,
    /// Containers are mirrored to one file per collation order
    Persistent { data_dir: PathBuf },
}

/// Configuration for one `SixIndices` instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub variant: StorageVariant,
    /// Capacity of each bulk-load worker queue; producers block when full
    pub bulk_queue_capacity: usize,
    /// Generate one histogram index per order when a build finishes
    pub histograms: bool,
    /// Number of equi-depth buckets per histogram index
    pub histogram_buckets: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            variant: StorageVariant::InMemory,
            bulk_queue_capacity: 4096,
            histograms: true,
            histogram_buckets: 16,
        }
    }
}

impl StoreConfig {
    pub fn persistent(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            variant: StorageVariant::Persistent { data_dir: data_dir.into() },
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| TridentError::invalid(format!("store config: {}", e)))
    }
}

/// Knobs of the join-order optimizer and its cost model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Pattern counts up to this value are planned exhaustively
    pub dp_threshold: usize,
    /// Cost multiplier for joins that cannot be executed as merge joins
    pub merge_join_penalty: f64,
    /// count/distinct ratio at or below which the larger join side is
    /// charged only the smaller side's cardinality
    pub skew_threshold: f64,
    /// Worker threads for leaf construction and subset enumeration
    pub concurrency_budget: usize,
    /// Buckets per histogram built by range scans
    pub histogram_buckets: usize,
    /// Triples a fallback histogram scan may visit before giving up
    pub max_histogram_scan: usize,
    /// Cardinality assumed when a histogram cannot be computed
    pub default_cardinality: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            dp_threshold: 7,
            merge_join_penalty: 3.0,
            skew_threshold: 1.2,
            concurrency_budget: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            histogram_buckets: 16,
            max_histogram_scan: 1_000_000,
            default_cardinality: 1000.0,
        }
    }
}

impl OptimizerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| TridentError::invalid(format!("optimizer config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency_budget == 0 {
            return Err(TridentError::invalid("concurrency_budget must be at least 1"));
        }
        if self.histogram_buckets == 0 {
            return Err(TridentError::invalid("histogram_buckets must be at least 1"));
        }
        // subsets are addressed by a u64 bitmask
        if self.dp_threshold > 20 {
            return Err(TridentError::invalid("dp_threshold above 20 is not supported"));
        }
        if !(self.merge_join_penalty >= 1.0) {
            return Err(TridentError::invalid("merge_join_penalty must be >= 1"));
        }
        Ok(())
    }
}
