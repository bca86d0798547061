/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use super::plan::Plan;
use super::Planner;
use crate::error::{Result, TridentError};
use log::trace;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::sync::{Arc, RwLock};

type PlanTable = RwLock<FxHashMap<u64, Arc<Plan>>>;

fn poisoned() -> TridentError {
    TridentError::Planning("plan table lock poisoned".to_string())
}

fn is_connected(mask: u64, adjacency: &[u64]) -> bool {
    let start = mask & mask.wrapping_neg();
    let mut reached = start;
    let mut frontier = start;
    while frontier != 0 {
        let bit = frontier.trailing_zeros() as usize;
        frontier &= frontier - 1;
        let next = adjacency[bit] & mask & !reached;
        reached |= next;
        frontier |= next;
    }
    reached == mask
}

impl<'p> Planner<'p> {
    /// Exhaustive search over connected subsets, smallest first. Every
    /// subset of one size is solved in parallel from the already final
    /// entries of smaller sizes.
    pub(super) fn dynamic_programming(&self, indices: &[usize]) -> Result<Arc<Plan>> {
        let n = indices.len();
        let adjacency: Vec<u64> = (0..n)
            .map(|i| {
                (0..n)
                    .filter(|&j| j != i && !self.variables[indices[i]].is_disjoint(&self.variables[indices[j]]))
                    .fold(0u64, |acc, j| acc | (1u64 << j))
            })
            .collect();

        let mut singles = FxHashMap::default();
        for (bit, &index) in indices.iter().enumerate() {
            let leaf = self
                .leaves
                .get(index)
                .cloned()
                .ok_or_else(|| TridentError::Planning(format!("no leaf for pattern {}", index)))?;
            singles.insert(1u64 << bit, leaf);
        }
        let table: PlanTable = RwLock::new(singles);
        let full = if n == 64 { u64::MAX } else { (1u64 << n) - 1 };

        for size in 2..=n {
            self.cancel.check()?;
            let masks: Vec<u64> = (1..=full)
                .filter(|m| m.count_ones() as usize == size && is_connected(*m, &adjacency))
                .collect();
            trace!("dp level {}: {} connected subsets", size, masks.len());
            self.pool
                .install(|| masks.par_iter().try_for_each(|&mask| self.solve_subset(mask, &table)))?;
        }

        let table = table.read().map_err(|_| poisoned())?;
        table
            .get(&full)
            .cloned()
            .ok_or_else(|| TridentError::Planning("no plan covers every pattern".to_string()))
    }

    /// Best join of two connected halves of `mask`. The half holding the
    /// lowest pattern is always the left input.
    fn solve_subset(&self, mask: u64, table: &PlanTable) -> Result<()> {
        self.cancel.check()?;
        let lowest = mask & mask.wrapping_neg();
        let mut best: Option<Plan> = None;
        let mut sub = (mask - 1) & mask;
        while sub != 0 {
            if sub & lowest != 0 {
                let (left, right) = {
                    let table = table.read().map_err(|_| poisoned())?;
                    (table.get(&sub).cloned(), table.get(&(mask ^ sub)).cloned())
                };
                if let (Some(left), Some(right)) = (left, right) {
                    if !left.variables().is_disjoint(right.variables()) {
                        let candidate = self.model.join(left, right);
                        if best.as_ref().map_or(true, |b| candidate.is_better_than(b)) {
                            best = Some(candidate);
                        }
                    }
                }
            }
            sub = (sub - 1) & mask;
        }
        if let Some(plan) = best {
            offer(table, mask, plan)?;
        }
        Ok(())
    }
}

/// Stores `plan` unless an equal or better one is already there.
fn offer(table: &PlanTable, mask: u64, plan: Plan) -> Result<()> {
    let mut table = table.write().map_err(|_| poisoned())?;
    match table.get(&mask) {
        Some(existing) if !plan.is_better_than(existing) => {}
        _ => {
            table.insert(mask, Arc::new(plan));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_of_masks() {
        // 0 - 1 - 2, 3 isolated
        let adjacency = [0b0010, 0b0101, 0b0010, 0b0000];
        assert!(is_connected(0b0111, &adjacency));
        assert!(is_connected(0b0011, &adjacency));
        assert!(!is_connected(0b0101, &adjacency));
        assert!(!is_connected(0b1001, &adjacency));
        assert!(is_connected(0b1000, &adjacency));
    }
}
