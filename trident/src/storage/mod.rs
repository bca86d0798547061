/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! The six-way clustered index family of one graph.
//!
//! Every triple is stored under all six collation orders, so any pattern is
//! answered by a single ordered range scan over the container whose order
//! puts the pattern's constants first.

mod bulk;
pub mod histogram_index;
pub mod index;
mod persistence;

pub use histogram_index::{HistogramIndex, LeadingSummary};
pub use index::Index;
pub use persistence::index_file_name;

use crate::cancel::CancellationToken;
use crate::config::{StorageVariant, StoreConfig};
use crate::error::{Result, TridentError};
use bulk::BulkLoader;
use log::{debug, info, warn};
use shared::collation::CollationOrder;
use shared::key::KeyRange;
use shared::literal::Literal;
use shared::terms::TriplePattern;
use shared::triple::Triple;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Ready,
    /// A bulk load is in flight; containers are owned by the workers.
    Loading,
    /// A build was aborted. The containers disagree and the instance must
    /// be rebuilt from scratch.
    Unusable,
}

pub struct SixIndices {
    config: StoreConfig,
    indexes: Vec<Index>,
    histograms: Vec<Option<HistogramIndex>>,
    loader: Option<BulkLoader>,
    state: StoreState,
    generation: u64,
    cancel: CancellationToken,
}

fn empty_indexes() -> Vec<Index> {
    CollationOrder::ALL.iter().map(|&order| Index::new(order)).collect()
}

impl SixIndices {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            indexes: empty_indexes(),
            histograms: vec![None; 6],
            loader: None,
            state: StoreState::Ready,
            generation: 0,
            cancel: CancellationToken::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(StoreConfig::default())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn state(&self) -> StoreState {
        self.state
    }

    /// Bumped whenever the content changes; cached statistics computed for
    /// an older generation are stale.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Token checked before every task spawned by bulk load and finalisation.
    pub fn set_cancellation_token(&mut self, cancel: CancellationToken) {
        self.cancel = cancel;
    }

    fn ensure_readable(&self) -> Result<()> {
        match self.state {
            StoreState::Ready => Ok(()),
            StoreState::Loading => Err(TridentError::invalid("bulk load in progress; call build() first")),
            StoreState::Unusable => Err(TridentError::Unusable),
        }
    }

    fn index_mut(&mut self, order: CollationOrder) -> &mut Index {
        &mut self.indexes[order.index()]
    }

    /// The container of one order. While a bulk load is in flight, or after
    /// it failed to start, this is an empty placeholder.
    pub fn index(&self, order: CollationOrder) -> &Index {
        &self.indexes[order.index()]
    }

    pub fn len(&self) -> usize {
        if self.state == StoreState::Ready {
            self.index(CollationOrder::Spo).len()
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Switches to parallel bulk-load mode. Until [`SixIndices::build`]
    /// returns, `add` feeds the six workers and nothing is readable.
    pub fn begin_bulk_load(&mut self) -> Result<()> {
        self.ensure_readable()?;
        let indexes = std::mem::replace(&mut self.indexes, empty_indexes());
        match BulkLoader::start(indexes, self.config.bulk_queue_capacity, &self.cancel) {
            Ok(loader) => {
                self.loader = Some(loader);
                self.state = StoreState::Loading;
                Ok(())
            }
            Err(err) => {
                self.state = StoreState::Unusable;
                Err(err)
            }
        }
    }

    pub fn add(&mut self, triple: Triple) -> Result<()> {
        if let Some(loader) = &self.loader {
            let sent = loader.send(triple);
            if sent.is_err() {
                self.state = StoreState::Unusable;
            }
            return sent;
        }
        self.ensure_readable()?;
        for index in self.indexes.iter_mut() {
            index.insert(triple.clone());
        }
        self.invalidate_statistics();
        Ok(())
    }

    /// Barrier: closes the bulk queues, joins the six workers, then runs one
    /// finalisation task per order. Nothing loaded is visible before this
    /// returns. Without a bulk load in flight it only refreshes the
    /// per-order statistics and files.
    pub fn build(&mut self) -> Result<()> {
        if self.state == StoreState::Unusable {
            return Err(TridentError::Unusable);
        }
        if let Some(loader) = self.loader.take() {
            match loader.finish() {
                Ok(indexes) => self.indexes = indexes,
                Err(err) => {
                    self.indexes = empty_indexes();
                    self.state = StoreState::Unusable;
                    return Err(err);
                }
            }
            if self.cancel.is_cancelled() {
                self.state = StoreState::Unusable;
                return Err(TridentError::BuildAborted("bulk load cancelled".to_string()));
            }
            self.state = StoreState::Ready;
            info!("bulk load finished with {} triples per order", self.index(CollationOrder::Spo).len());
        }
        self.generation += 1;
        self.finalize()
    }

    /// One task per order: histogram generation plus, for the persistent
    /// variant, writing the container file.
    fn finalize(&mut self) -> Result<()> {
        let with_histograms = self.config.histograms;
        let buckets = self.config.histogram_buckets;
        let data_dir = match &self.config.variant {
            StorageVariant::Persistent { data_dir } => Some(data_dir.as_path()),
            StorageVariant::InMemory => None,
        };
        let cancel = &self.cancel;
        let indexes = &self.indexes;

        let outcomes = crossbeam::scope(|s| {
            let mut handles = Vec::with_capacity(indexes.len());
            for index in indexes.iter() {
                if cancel.is_cancelled() {
                    break;
                }
                handles.push(s.spawn(move |_| -> Result<Option<HistogramIndex>> {
                    if let Some(dir) = data_dir {
                        persistence::write_index_file(dir, index)?;
                    }
                    Ok(if with_histograms {
                        Some(HistogramIndex::build(index, buckets))
                    } else {
                        None
                    })
                }));
            }
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(TridentError::BuildAborted("finalisation task panicked".to_string())))
                })
                .collect::<Vec<_>>()
        })
        .map_err(|_| TridentError::BuildAborted("finalisation scope panicked".to_string()));

        let outcomes = match outcomes {
            Ok(outcomes) if outcomes.len() == CollationOrder::ALL.len() => outcomes,
            Ok(_) => {
                self.state = StoreState::Unusable;
                return Err(TridentError::BuildAborted("finalisation cancelled".to_string()));
            }
            Err(err) => {
                self.state = StoreState::Unusable;
                return Err(err);
            }
        };

        let mut histograms = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                Ok(histogram) => histograms.push(histogram),
                Err(err @ TridentError::Storage { .. }) => return Err(err),
                Err(err) => {
                    self.state = StoreState::Unusable;
                    return Err(err);
                }
            }
        }
        self.histograms = histograms;
        if data_dir.is_some() {
            for index in self.indexes.iter_mut() {
                index.mark_clean();
            }
        }
        debug!("finalised six orders (histograms: {})", with_histograms);
        Ok(())
    }

    fn invalidate_statistics(&mut self) {
        self.generation += 1;
        for histogram in self.histograms.iter_mut() {
            *histogram = None;
        }
    }

    /// Removes the triple from all six containers.
    pub fn remove(&mut self, triple: &Triple) -> Result<bool> {
        self.ensure_readable()?;
        let mut removed = 0;
        for order in CollationOrder::ALL {
            if self.index_mut(order).remove(triple) {
                removed += 1;
            }
        }
        match removed {
            0 => Ok(false),
            6 => {
                self.invalidate_statistics();
                Ok(true)
            }
            n => {
                warn!("triple {} was present in only {} of six containers", triple, n);
                self.state = StoreState::Unusable;
                Err(TridentError::Unusable)
            }
        }
    }

    /// Membership test through the SPO container.
    pub fn contains(&self, triple: &Triple) -> bool {
        self.state == StoreState::Ready && self.index(CollationOrder::Spo).contains(triple)
    }

    pub fn range_scan<'a>(&'a self, range: &KeyRange) -> Result<impl Iterator<Item = &'a Triple> + 'a> {
        self.ensure_readable()?;
        Ok(self.index(range.order).scan(range))
    }

    pub fn prefix_scan<'a>(
        &'a self,
        order: CollationOrder,
        prefix: Vec<Literal>,
    ) -> Result<impl Iterator<Item = &'a Triple> + 'a> {
        self.ensure_readable()?;
        Ok(self.index(order).prefix_scan(prefix))
    }

    /// Pre-computed statistics of one order, present after a build when
    /// histograms are enabled and nothing changed since.
    pub fn histogram(&self, order: CollationOrder) -> Option<&HistogramIndex> {
        if self.state != StoreState::Ready {
            return None;
        }
        self.histograms[order.index()].as_ref()
    }

    /// Lazily streams the matches of `pattern` in the order that puts its
    /// constants first.
    pub fn evaluate_triple_pattern<'a>(
        &'a self,
        pattern: &TriplePattern,
    ) -> Result<impl Iterator<Item = &'a Triple> + 'a> {
        let order = CollationOrder::for_pattern::<&str>(pattern, &[]);
        let prefix: Vec<Literal> = order
            .positions()
            .iter()
            .map_while(|&pos| pattern.term(pos).as_constant().cloned())
            .collect();
        let residual = pattern.clone();
        Ok(self
            .prefix_scan(order, prefix)?
            .filter(move |triple| residual.matches(triple)))
    }
}
