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
use crate::cancel::CancellationToken;
use crate::error::{Result, TridentError};
use crossbeam::channel::{bounded, Sender};
use log::{debug, error};
use shared::triple::Triple;
use std::thread::{self, JoinHandle};

/// Six long-lived workers, one per collation order, each draining a bounded
/// queue into its private container. Producers block while a queue is full.
pub(crate) struct BulkLoader {
    senders: Vec<Sender<Triple>>,
    workers: Vec<JoinHandle<Index>>,
}

impl BulkLoader {
    pub(crate) fn start(indexes: Vec<Index>, capacity: usize, cancel: &CancellationToken) -> Result<Self> {
        let mut senders = Vec::with_capacity(indexes.len());
        let mut workers = Vec::with_capacity(indexes.len());

        for mut index in indexes {
            if let Err(err) = cancel.check() {
                // already spawned workers exit once their queues close
                drop(senders);
                Self::join_all(workers);
                return Err(err);
            }
            let (sender, receiver) = bounded::<Triple>(capacity.max(1));
            let order = index.order();
            let handle = thread::Builder::new()
                .name(format!("trident-bulk-{}", order))
                .spawn(move || {
                    for triple in receiver {
                        index.insert(triple);
                    }
                    debug!("bulk worker {} drained {} triples", order, index.len());
                    index
                })
                .map_err(|e| TridentError::BuildAborted(format!("cannot spawn {} worker: {}", order, e)))?;
            senders.push(sender);
            workers.push(handle);
        }

        Ok(Self { senders, workers })
    }

    /// Hands one triple to every worker. Fails when a worker has died.
    pub(crate) fn send(&self, triple: Triple) -> Result<()> {
        for sender in &self.senders {
            sender
                .send(triple.clone())
                .map_err(|_| TridentError::BuildAborted("bulk worker stopped accepting triples".to_string()))?;
        }
        Ok(())
    }

    /// Closes the queues and waits for all six workers.
    pub(crate) fn finish(self) -> Result<Vec<Index>> {
        drop(self.senders);
        let mut indexes = Vec::with_capacity(self.workers.len());
        let mut failed = false;
        for handle in self.workers {
            match handle.join() {
                Ok(index) => indexes.push(index),
                Err(_) => {
                    error!("bulk worker panicked; index set is now inconsistent");
                    failed = true;
                }
            }
        }
        if failed {
            return Err(TridentError::BuildAborted("a bulk worker panicked".to_string()));
        }
        Ok(indexes)
    }

    fn join_all(workers: Vec<JoinHandle<Index>>) {
        for handle in workers {
            let _ = handle.join();
        }
    }
}
