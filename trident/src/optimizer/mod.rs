/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Cost-based join ordering for one basic graph pattern.
//!
//! Planning runs in phases: split into connected components, build one leaf
//! per pattern from its histograms, compose each component either
//! exhaustively (small inputs) or with decomposition heuristics (large
//! inputs), then emit the winning tree as an [`OperatorGraph`].

pub mod cost;
mod dp;
mod emit;
mod heuristics;
pub mod ordering;
pub mod plan;

pub use cost::CostModel;
pub use plan::{InnerPlan, LeafPlan, Plan, VarSet};

use crate::cancel::CancellationToken;
use crate::config::OptimizerConfig;
use crate::dataset::Dataset;
use crate::error::{Result, TridentError};
use crate::index_scan::{IndexScan, VariableBounds};
use crate::operator::OperatorGraph;
use log::{debug, info};
use rayon::prelude::*;
use rayon::ThreadPool;
use shared::terms::{Bindings, TriplePattern};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// A composition step the planner took, in the order it was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanningStrategy {
    /// The patterns fell into disconnected groups joined by cross products.
    CartesianSplit { components: usize },
    DynamicProgramming { patterns: usize },
    /// Removing the pattern at this input position split the rest.
    ArticulationSplit { pattern: usize },
    StarSplit { variable: String },
    StarClusters { clusters: usize },
    GreedyChain { patterns: usize },
}

impl fmt::Display for PlanningStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanningStrategy::CartesianSplit { components } => write!(f, "cartesian split into {} components", components),
            PlanningStrategy::DynamicProgramming { patterns } => write!(f, "dynamic programming over {} patterns", patterns),
            PlanningStrategy::ArticulationSplit { pattern } => write!(f, "articulation split at pattern {}", pattern),
            PlanningStrategy::StarSplit { variable } => write!(f, "star split on ?{}", variable),
            PlanningStrategy::StarClusters { clusters } => write!(f, "{} star clusters", clusters),
            PlanningStrategy::GreedyChain { patterns } => write!(f, "greedy chain over {} patterns", patterns),
        }
    }
}

/// Result of one optimization call.
#[derive(Debug, Clone)]
pub struct OptimizedPlan {
    pub plan: Arc<Plan>,
    pub operators: OperatorGraph,
    pub trace: Vec<PlanningStrategy>,
}

impl OptimizedPlan {
    /// Some pattern has no match, or the value ranges of a join variable do
    /// not overlap.
    pub fn is_provably_empty(&self) -> bool {
        self.operators.is_provably_empty()
    }

    pub fn used(&self, strategy: fn(&PlanningStrategy) -> bool) -> bool {
        self.trace.iter().any(strategy)
    }
}

pub struct JoinOrderOptimizer<'d> {
    scan: IndexScan<'d>,
    config: OptimizerConfig,
    model: CostModel,
    cancel: CancellationToken,
    pool: ThreadPool,
}

impl<'d> JoinOrderOptimizer<'d> {
    pub fn new(dataset: &'d Dataset) -> Result<Self> {
        Self::with_config(dataset, OptimizerConfig::default())
    }

    pub fn with_config(dataset: &'d Dataset, config: OptimizerConfig) -> Result<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.concurrency_budget)
            .thread_name(|i| format!("trident-planner-{}", i))
            .build()
            .map_err(|e| TridentError::Planning(format!("cannot start planner pool: {}", e)))?;
        Ok(Self {
            scan: IndexScan::with_config(dataset, config.clone()),
            model: CostModel::new(&config),
            config,
            cancel: CancellationToken::new(),
            pool,
        })
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn index_scan(&self) -> &IndexScan<'d> {
        &self.scan
    }

    pub fn optimize(&self, patterns: &[TriplePattern]) -> Result<OptimizedPlan> {
        self.optimize_with(patterns, None, &VariableBounds::new())
    }

    /// Plans `patterns` under an optional binding environment and caller
    /// bounds. Fails on empty input, cancellation, or any histogram
    /// retrieval failure.
    pub fn optimize_with(
        &self,
        patterns: &[TriplePattern],
        bindings: Option<&Bindings>,
        bounds: &VariableBounds,
    ) -> Result<OptimizedPlan> {
        if patterns.is_empty() {
            return Err(TridentError::invalid("cannot plan an empty pattern set"));
        }
        self.cancel.check()?;
        let patterns: Vec<TriplePattern> = match bindings {
            Some(bindings) => patterns.iter().map(|p| p.substitute(bindings)).collect(),
            None => patterns.to_vec(),
        };
        let shared = shared_variables(&patterns);
        let leaves = self.build_leaves(&patterns, &shared)?;
        let empty_leaf = leaves.iter().any(|leaf| leaf.cardinality() <= 0.0);

        let planner = Planner {
            model: &self.model,
            config: &self.config,
            cancel: &self.cancel,
            pool: &self.pool,
            variables: patterns.iter().map(|p| p.all_variables()).collect(),
            leaves,
        };
        let mut trace = Vec::new();
        let all: Vec<usize> = (0..patterns.len()).collect();
        let plan = planner.plan_subset(&all, &mut trace)?;

        let mut operators = emit::emit(&plan, bounds);
        if empty_leaf {
            operators.mark_provably_empty();
        }
        info!(
            "planned {} patterns: {} (cost {:.1}, {} merge joins)",
            patterns.len(),
            plan,
            plan.cost(),
            plan.merge_joins()
        );
        debug!("operator graph:\n{}", operators.explain());
        Ok(OptimizedPlan { plan, operators, trace })
    }

    /// One leaf per pattern with histograms of its shared variables, built
    /// on the planner pool.
    fn build_leaves(&self, patterns: &[TriplePattern], shared: &BTreeSet<String>) -> Result<Vec<Arc<Plan>>> {
        self.pool.install(|| {
            patterns
                .par_iter()
                .enumerate()
                .map(|(index, pattern)| -> Result<Arc<Plan>> {
                    self.cancel.check()?;
                    let wanted: BTreeSet<String> = pattern.all_variables().intersection(shared).cloned().collect();
                    let stats = self.scan.var_buckets(pattern, &wanted)?;
                    Ok(Arc::new(self.model.leaf(index, pattern.clone(), stats)))
                })
                .collect()
        })
    }
}

/// Variables occurring in at least two patterns.
fn shared_variables(patterns: &[TriplePattern]) -> BTreeSet<String> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for pattern in patterns {
        for var in pattern.all_variables() {
            *counts.entry(var).or_insert(0) += 1;
        }
    }
    counts.into_iter().filter(|(_, n)| *n >= 2).map(|(v, _)| v).collect()
}

/// Per-call planning state shared by the composition strategies.
pub(crate) struct Planner<'p> {
    model: &'p CostModel,
    config: &'p OptimizerConfig,
    cancel: &'p CancellationToken,
    pool: &'p ThreadPool,
    leaves: Vec<Arc<Plan>>,
    /// Variables per input pattern, graph variable included.
    variables: Vec<VarSet>,
}

impl<'p> Planner<'p> {
    pub(crate) fn plan_subset(&self, indices: &[usize], trace: &mut Vec<PlanningStrategy>) -> Result<Arc<Plan>> {
        self.cancel.check()?;
        if let [single] = indices {
            return self
                .leaves
                .get(*single)
                .cloned()
                .ok_or_else(|| TridentError::Planning(format!("no leaf for pattern {}", single)));
        }
        let components = self.components(indices);
        if components.len() > 1 {
            trace.push(PlanningStrategy::CartesianSplit {
                components: components.len(),
            });
            return self.plan_parts(components, trace);
        }
        if indices.len() <= self.config.dp_threshold {
            trace.push(PlanningStrategy::DynamicProgramming { patterns: indices.len() });
            return self.dynamic_programming(indices);
        }
        self.decompose(indices, trace)
    }

    /// Plans every part on its own, then joins the parts greedily.
    fn plan_parts(&self, parts: Vec<Vec<usize>>, trace: &mut Vec<PlanningStrategy>) -> Result<Arc<Plan>> {
        let mut plans = Vec::with_capacity(parts.len());
        for part in &parts {
            plans.push(self.plan_subset(part, trace)?);
        }
        self.combine_greedy(plans)
    }

    /// Repeatedly joins the best-ranked pair until one plan remains.
    pub(crate) fn combine_greedy(&self, mut plans: Vec<Arc<Plan>>) -> Result<Arc<Plan>> {
        while plans.len() > 1 {
            self.cancel.check()?;
            let mut best: Option<(usize, usize, Plan)> = None;
            for i in 0..plans.len() {
                for j in (i + 1)..plans.len() {
                    let candidate = self.model.join(plans[i].clone(), plans[j].clone());
                    if best.as_ref().map_or(true, |(_, _, b)| candidate.is_better_than(b)) {
                        best = Some((i, j, candidate));
                    }
                }
            }
            let Some((i, j, joined)) = best else { break };
            plans.remove(j);
            plans[i] = Arc::new(joined);
        }
        plans
            .pop()
            .ok_or_else(|| TridentError::Planning("nothing to combine".to_string()))
    }

    /// Connected components of `indices`, two patterns being adjacent when
    /// they share a variable. Components keep input order.
    pub(crate) fn components(&self, indices: &[usize]) -> Vec<Vec<usize>> {
        let mut seen: BTreeSet<usize> = BTreeSet::new();
        let mut out = Vec::new();
        for &start in indices {
            if !seen.insert(start) {
                continue;
            }
            let mut component = vec![start];
            let mut frontier = vec![start];
            while let Some(current) = frontier.pop() {
                for &other in indices {
                    if !seen.contains(&other) && !self.variables[current].is_disjoint(&self.variables[other]) {
                        seen.insert(other);
                        component.push(other);
                        frontier.push(other);
                    }
                }
            }
            component.sort_unstable();
            out.push(component);
        }
        out
    }
}
