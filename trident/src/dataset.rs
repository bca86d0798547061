/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::config::{StorageVariant, StoreConfig};
use crate::error::Result;
use crate::histogram::HistogramCache;
use crate::storage::SixIndices;
use shared::dictionary::Dictionary;
use shared::literal::Literal;
use shared::terms::{Bindings, GraphConstraint};
use shared::triple::Triple;
use std::collections::BTreeMap;

/// Small integer naming a graph inside one dataset. The default graph is 0,
/// named graphs are numbered from 1 in creation order.
pub type GraphId = u32;

pub const DEFAULT_GRAPH: GraphId = 0;

/// A default graph plus any number of named graphs, each with its own six
/// indexes, sharing one literal dictionary.
pub struct Dataset {
    config: StoreConfig,
    dictionary: Dictionary,
    default_graph: SixIndices,
    named: BTreeMap<Literal, (GraphId, SixIndices)>,
    statistics: HistogramCache,
}

impl Default for Dataset {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl Dataset {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            default_graph: SixIndices::new(Self::graph_config(&config, "default")),
            config,
            dictionary: Dictionary::new(),
            named: BTreeMap::new(),
            statistics: HistogramCache::new(),
        }
    }

    /// Persistent graphs get one subdirectory each below `data_dir`.
    fn graph_config(config: &StoreConfig, directory: &str) -> StoreConfig {
        let mut config = config.clone();
        if let StorageVariant::Persistent { data_dir } = &mut config.variant {
            *data_dir = data_dir.join(directory);
        }
        config
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn statistics(&self) -> &HistogramCache {
        &self.statistics
    }

    /// Changes whenever any graph changes or a graph is added.
    pub fn generation(&self) -> u64 {
        let named: u64 = self.named.values().map(|(_, store)| store.generation()).sum();
        self.default_graph.generation() + named + self.named.len() as u64
    }

    pub fn default_graph(&self) -> &SixIndices {
        &self.default_graph
    }

    pub fn default_graph_mut(&mut self) -> &mut SixIndices {
        &mut self.default_graph
    }

    pub fn graph(&self, id: GraphId) -> Option<&SixIndices> {
        if id == DEFAULT_GRAPH {
            return Some(&self.default_graph);
        }
        self.named.values().find(|(gid, _)| *gid == id).map(|(_, store)| store)
    }

    pub fn graph_name(&self, id: GraphId) -> Option<&Literal> {
        self.named.iter().find(|(_, (gid, _))| *gid == id).map(|(name, _)| name)
    }

    pub fn named_graph(&self, name: &str) -> Option<(GraphId, &SixIndices)> {
        self.named.get(name).map(|(id, store)| (*id, store))
    }

    /// Returns the named graph, creating it if needed.
    pub fn named_graph_mut(&mut self, name: &str) -> (GraphId, &mut SixIndices) {
        let name = self.dictionary.encode(name);
        let next_id = self.named.len() as GraphId + 1;
        let config = Self::graph_config(&self.config, &format!("graph_{}", next_id));
        let (id, store) = self
            .named
            .entry(name)
            .or_insert_with(|| (next_id, SixIndices::new(config)));
        (*id, store)
    }

    /// Interns the three strings and adds the triple to the default graph.
    pub fn add(&mut self, subject: &str, predicate: &str, object: &str) -> Result<()> {
        let triple = self.dictionary.encode_triple(subject, predicate, object);
        self.default_graph.add(triple)
    }

    pub fn add_to_graph(&mut self, graph: &str, subject: &str, predicate: &str, object: &str) -> Result<()> {
        let triple = self.dictionary.encode_triple(subject, predicate, object);
        let (_, store) = self.named_graph_mut(graph);
        store.add(triple)
    }

    pub fn add_triple(&mut self, triple: &Triple) -> Result<()> {
        let triple = self.intern(triple);
        self.default_graph.add(triple)
    }

    fn intern(&mut self, triple: &Triple) -> Triple {
        Triple {
            subject: self.dictionary.intern(&triple.subject),
            predicate: self.dictionary.intern(&triple.predicate),
            object: self.dictionary.intern(&triple.object),
        }
    }

    /// Builds every graph.
    pub fn build(&mut self) -> Result<()> {
        self.default_graph.build()?;
        for (_, store) in self.named.values_mut() {
            store.build()?;
        }
        Ok(())
    }

    /// Resolves a graph constraint to the graphs a scan must visit, in graph
    /// id order. A graph variable already bound in `bindings` acts as a named
    /// graph; an unbound one selects every named graph.
    pub fn candidate_graphs(&self, constraint: &GraphConstraint, bindings: Option<&Bindings>) -> Vec<(GraphId, &SixIndices)> {
        match constraint {
            GraphConstraint::Default => vec![(DEFAULT_GRAPH, &self.default_graph)],
            GraphConstraint::Named(name) => self.named_graph(name.as_str()).into_iter().collect(),
            GraphConstraint::Variable(var) => {
                if let Some(bound) = bindings.and_then(|b| b.get(var)) {
                    return self.named_graph(bound.as_str()).into_iter().collect();
                }
                let mut graphs: Vec<(GraphId, &SixIndices)> =
                    self.named.values().map(|(id, store)| (*id, store)).collect();
                graphs.sort_by_key(|(id, _)| *id);
                graphs
            }
        }
    }

    pub fn graph_count(&self) -> usize {
        self.named.len() + 1
    }
}
