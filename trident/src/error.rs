/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Error types shared by storage, scanning and planning.

use std::io;
use thiserror::Error;

/// Errors surfaced by the storage and planning core.
#[derive(Debug, Error)]
pub enum TridentError {
    /// The caller handed in something malformed, e.g. several patterns where
    /// exactly one is required.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Reading or writing index images failed.
    #[error("storage failure while {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: io::Error,
    },

    /// An index image could not be encoded or decoded.
    #[error("serialization failure while {context}: {message}")]
    Serialization { context: String, message: String },

    /// A bulk-load worker or finalisation task died or was cancelled.
    #[error("bulk build aborted: {0}")]
    BuildAborted(String),

    /// The index set is inconsistent after an aborted build and must be
    /// rebuilt from scratch.
    #[error("index set is unusable after an aborted build")]
    Unusable,

    /// Histogram retrieval failed; optimisation cannot continue.
    #[error("histogram retrieval failed for pattern {pattern}: {reason}")]
    Histogram { pattern: String, reason: String },

    /// The planner's worker pool or shared plan table failed.
    #[error("planning failed: {0}")]
    Planning(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl TridentError {
    pub fn storage(context: impl Into<String>, source: io::Error) -> Self {
        TridentError::Storage {
            context: context.into(),
            source,
        }
    }

    pub fn serialization(context: impl Into<String>, message: impl ToString) -> Self {
        TridentError::Serialization {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        TridentError::InvalidArgument(message.into())
    }
}

impl From<bincode::Error> for TridentError {
    fn from(err: bincode::Error) -> Self {
        match *err {
            bincode::ErrorKind::Io(source) if source.kind() == io::ErrorKind::UnexpectedEof => {
                TridentError::serialization("decoding an index image", "image is truncated")
            }
            bincode::ErrorKind::Io(source) => TridentError::storage("streaming an index image", source),
            other => TridentError::serialization("encoding an index image", other),
        }
    }
}

pub type Result<T> = std::result::Result<T, TridentError>;
