/*
 * Copyright © 2024 ladroid
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::collections::HashSet;
use crate::literal::Literal;
use crate::triple::Triple;

// Interning table applied to every value before it reaches the indexes
#[derive(Debug, Default, Clone)]
pub struct Dictionary {
    literals: HashSet<Literal>,
}

impl Dictionary {
    pub fn new() -> Self {
        Dictionary {
            literals: HashSet::new(),
        }
    }

    /// Returns the canonical handle for `value`, creating it on first use.
    pub fn encode(&mut self, value: &str) -> Literal {
        if let Some(existing) = self.literals.get(value) {
            existing.clone()
        } else {
            let literal = Literal::new(value);
            self.literals.insert(literal.clone());
            literal
        }
    }

    /// Looks a value up without interning it.
    pub fn get(&self, value: &str) -> Option<Literal> {
        self.literals.get(value).cloned()
    }

    /// Rewrites an already constructed literal to its canonical handle.
    pub fn intern(&mut self, literal: &Literal) -> Literal {
        self.encode(literal.as_str())
    }

    pub fn encode_triple(&mut self, subject: &str, predicate: &str, object: &str) -> Triple {
        Triple {
            subject: self.encode(subject),
            predicate: self.encode(predicate),
            object: self.encode(object),
        }
    }

    pub fn len(&self) -> usize {
        self.literals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

}
