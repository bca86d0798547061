/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

pub mod cancel;
pub mod config;
pub mod dataset;
pub mod error;
pub mod exec;
pub mod histogram;
pub mod index_scan;
pub mod merge;
pub mod operator;
pub mod optimizer;
pub mod storage;

pub use cancel::CancellationToken;
pub use config::{OptimizerConfig, StorageVariant, StoreConfig};
pub use dataset::{Dataset, GraphId, DEFAULT_GRAPH};
pub use error::{Result, TridentError};
pub use exec::Executor;
pub use histogram::VarBucket;
pub use index_scan::{IndexScan, PatternStatistics, VariableBounds};
pub use operator::{JoinKind, OperatorGraph};
pub use optimizer::{JoinOrderOptimizer, OptimizedPlan, Plan, PlanningStrategy};
pub use storage::SixIndices;
