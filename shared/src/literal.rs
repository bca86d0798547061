/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// An RDF value as seen by the storage core.
///
/// Literals are opaque: the core only compares, hashes and clones them.
/// Cloning is a reference-count bump, so keys of all six indexes share the
/// same allocation once the literal has been interned by a [`Dictionary`].
///
/// [`Dictionary`]: crate::dictionary::Dictionary
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Literal(Arc<str>);

impl Literal {
    pub fn new(value: impl AsRef<str>) -> Self {
        Literal(Arc::from(value.as_ref()))
    }

    /// The smallest literal under the total order. Used to materialise
    /// open lower range ends.
    pub fn min_value() -> Self {
        Literal(Arc::from(""))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when both handles point at the same interned allocation.
    pub fn shares_storage_with(&self, other: &Literal) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Borrow<str> for Literal {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::new(value)
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal(Arc::from(value))
    }
}

impl fmt::Debug for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_is_lexicographic() {
        let a = Literal::from("apple");
        let b = Literal::from("banana");
        assert!(a < b);
        assert!(Literal::min_value() <= a);
    }

    #[test]
    fn test_serde_is_transparent() {
        let lit = Literal::from("http://example.org/x");
        let json = serde_json::to_string(&lit).unwrap();
        assert_eq!(json, "\"http://example.org/x\"");
        let back: Literal = serde_json::from_str(&json).unwrap();
        assert_eq!(back, lit);
    }
}
