/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Binary images of the six containers.
//!
//! A stream holds six container images in the fixed order SPO, SOP, PSO,
//! POS, OSP, OPS, optionally followed by six histogram images in the same
//! order. Whether histograms follow is not recorded in the stream; the
//! reader's `StoreConfig::histograms` must match the writer's.

use super::{empty_indexes, HistogramIndex, Index, SixIndices, StoreState};
use crate::config::{StorageVariant, StoreConfig};
use crate::error::{Result, TridentError};
use log::info;
use serde::{Deserialize, Serialize};
use shared::collation::CollationOrder;
use shared::triple::Triple;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

#[derive(Serialize)]
struct IndexImageRef<'a> {
    order: CollationOrder,
    triples: Vec<&'a Triple>,
}

#[derive(Deserialize)]
struct IndexImage {
    order: CollationOrder,
    triples: Vec<Triple>,
}

pub fn index_file_name(order: CollationOrder) -> String {
    format!("index_{}.bin", order.name())
}

fn write_image<W: Write>(writer: &mut W, index: &Index) -> Result<()> {
    let image = IndexImageRef {
        order: index.order(),
        triples: index.iter().collect(),
    };
    bincode::serialize_into(writer, &image)?;
    Ok(())
}

fn read_image<R: Read>(reader: &mut R, expected: CollationOrder) -> Result<Index> {
    let image: IndexImage = bincode::deserialize_from(reader)?;
    if image.order != expected {
        return Err(TridentError::serialization(
            "reading an index image",
            format!("expected {} container, found {}", expected, image.order),
        ));
    }
    let mut index = Index::new(expected);
    for triple in image.triples {
        index.insert(triple);
    }
    index.mark_clean();
    Ok(index)
}

pub(crate) fn write_index_file(dir: &Path, index: &Index) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| TridentError::storage(format!("creating {}", dir.display()), e))?;
    let path = dir.join(index_file_name(index.order()));
    let file = File::create(&path).map_err(|e| TridentError::storage(format!("creating {}", path.display()), e))?;
    let mut writer = BufWriter::new(file);
    write_image(&mut writer, index)?;
    writer
        .flush()
        .map_err(|e| TridentError::storage(format!("flushing {}", path.display()), e))
}

fn read_index_file(dir: &Path, order: CollationOrder) -> Result<Option<Index>> {
    let path = dir.join(index_file_name(order));
    if !path.exists() {
        return Ok(None);
    }
    let file = File::open(&path).map_err(|e| TridentError::storage(format!("opening {}", path.display()), e))?;
    read_image(&mut BufReader::new(file), order).map(Some)
}

impl SixIndices {
    /// Serialises the six containers, then the histograms if enabled.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.ensure_readable()?;
        for order in CollationOrder::ALL {
            write_image(writer, self.index(order))?;
        }
        if self.config.histograms {
            for order in CollationOrder::ALL {
                match self.histogram(order) {
                    Some(histogram) => bincode::serialize_into(&mut *writer, histogram)?,
                    None => {
                        let fresh = HistogramIndex::build(self.index(order), self.config.histogram_buckets);
                        bincode::serialize_into(&mut *writer, &fresh)?
                    }
                }
            }
        }
        writer
            .flush()
            .map_err(|e| TridentError::storage("flushing an index stream", e))
    }

    /// Reads a stream produced by [`SixIndices::write_to`] with the same
    /// histogram setting.
    pub fn read_from<R: Read>(reader: &mut R, config: StoreConfig) -> Result<Self> {
        let mut indexes = Vec::with_capacity(6);
        for order in CollationOrder::ALL {
            indexes.push(read_image(reader, order)?);
        }
        let mut histograms = vec![None; 6];
        if config.histograms {
            for (slot, order) in histograms.iter_mut().zip(CollationOrder::ALL) {
                let histogram: HistogramIndex = bincode::deserialize_from(&mut *reader)?;
                if histogram.order() != order {
                    return Err(TridentError::serialization(
                        "reading a histogram image",
                        format!("expected {} histogram, found {}", order, histogram.order()),
                    ));
                }
                *slot = Some(histogram);
            }
        }
        let mut store = SixIndices::new(config);
        store.indexes = indexes;
        store.histograms = histograms;
        store.check_consistent()?;
        Ok(store)
    }

    /// Loads the per-order files of a persistent store. A directory without
    /// files yields an empty store; a partial set is an error.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let dir = match &config.variant {
            StorageVariant::InMemory => return Ok(SixIndices::new(config)),
            StorageVariant::Persistent { data_dir } => data_dir.clone(),
        };
        let mut loaded = Vec::with_capacity(6);
        for order in CollationOrder::ALL {
            loaded.push(read_index_file(&dir, order)?);
        }
        let present = loaded.iter().filter(|i| i.is_some()).count();
        let mut store = SixIndices::new(config);
        if present == 0 {
            return Ok(store);
        }
        if present != loaded.len() {
            return Err(TridentError::serialization(
                format!("opening {}", dir.display()),
                format!("only {} of six container files present", present),
            ));
        }
        store.indexes = loaded.into_iter().flatten().collect();
        store.check_consistent()?;
        store.generation += 1;
        if store.config.histograms {
            let buckets = store.config.histogram_buckets;
            store.histograms = store
                .indexes
                .iter()
                .map(|index| Some(HistogramIndex::build(index, buckets)))
                .collect();
        }
        info!("opened {} with {} triples", dir.display(), store.len());
        Ok(store)
    }

    /// Rewrites the files of every container modified since the last write.
    /// A no-op for the in-memory variant.
    pub fn write_out_all_modified_pages(&mut self) -> Result<()> {
        self.ensure_readable()?;
        let dir = match &self.config.variant {
            StorageVariant::InMemory => return Ok(()),
            StorageVariant::Persistent { data_dir } => data_dir.clone(),
        };
        let mut written = 0;
        for index in self.indexes.iter_mut().filter(|i| i.is_dirty()) {
            write_index_file(&dir, index)?;
            index.mark_clean();
            written += 1;
        }
        info!("wrote {} modified containers to {}", written, dir.display());
        Ok(())
    }

    fn check_consistent(&mut self) -> Result<()> {
        let expected = self.indexes.first().map(Index::len).unwrap_or(0);
        if self.indexes.iter().any(|i| i.len() != expected) {
            self.indexes = empty_indexes();
            self.state = StoreState::Unusable;
            return Err(TridentError::serialization(
                "checking container images",
                "containers hold different numbers of triples",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(config: StoreConfig) -> SixIndices {
        let mut store = SixIndices::new(config);
        for (s, p, o) in [("b", "p", "c"), ("a", "q", "b"), ("a", "p", "z"), ("c", "p", "a")] {
            store.add(Triple::new(s, p, o)).unwrap();
        }
        store
    }

    #[test]
    fn test_stream_round_trip_with_histograms() {
        let mut store = sample(StoreConfig::default());
        store.build().unwrap();
        let mut bytes = Vec::new();
        store.write_to(&mut bytes).unwrap();

        let restored = SixIndices::read_from(&mut bytes.as_slice(), StoreConfig::default()).unwrap();
        for order in CollationOrder::ALL {
            let before: Vec<&Triple> = store.index(order).iter().collect();
            let after: Vec<&Triple> = restored.index(order).iter().collect();
            assert_eq!(before, after);
            assert_eq!(store.histogram(order), restored.histogram(order));
        }
    }

    #[test]
    fn test_mismatched_histogram_flag_is_rejected() {
        let store = sample(StoreConfig {
            histograms: false,
            ..StoreConfig::default()
        });
        let mut bytes = Vec::new();
        store.write_to(&mut bytes).unwrap();
        assert!(SixIndices::read_from(&mut bytes.as_slice(), StoreConfig::default()).is_err());
    }

    #[test]
    fn test_truncated_stream_is_an_error() {
        let store = sample(StoreConfig::default());
        let mut bytes = Vec::new();
        store.write_to(&mut bytes).unwrap();
        bytes.truncate(bytes.len() / 3);
        assert!(SixIndices::read_from(&mut bytes.as_slice(), StoreConfig::default()).is_err());
    }

    #[test]
    fn test_in_memory_flush_is_a_no_op() {
        let mut store = sample(StoreConfig::default());
        store.write_out_all_modified_pages().unwrap();
        assert!(store.index(CollationOrder::Spo).is_dirty());
    }
}
