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
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use crate::literal::Literal;
use crate::triple::{Triple, TriplePosition};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Term {
    Variable(String),
    Constant(Literal),
}

/// Variable name to value mapping. Variable names are stored without the
/// leading `?`.
pub type Bindings = BTreeMap<String, Literal>;

impl Term {
    pub fn var(name: &str) -> Self {
        Term::Variable(name.strip_prefix('?').unwrap_or(name).to_string())
    }

    pub fn constant(value: impl Into<Literal>) -> Self {
        Term::Constant(value.into())
    }

    /// `?name` becomes a variable, anything else a constant.
    pub fn parse(token: &str) -> Self {
        match token.strip_prefix('?') {
            Some(name) => Term::Variable(name.to_string()),
            None => Term::Constant(Literal::new(token)),
        }
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Term::Variable(_))
    }

    pub fn as_var(&self) -> Option<&str> {
        match self {
            Term::Variable(name) => Some(name),
            Term::Constant(_) => None,
        }
    }

    pub fn as_constant(&self) -> Option<&Literal> {
        match self {
            Term::Constant(value) => Some(value),
            Term::Variable(_) => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Variable(name) => write!(f, "?{}", name),
            Term::Constant(value) => write!(f, "<{}>", value),
        }
    }
}

/// Which graph(s) of a dataset a pattern is evaluated against.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GraphConstraint {
    #[default]
    Default,
    Named(Literal),
    /// Unbound graph position: every named graph is a candidate and the
    /// graph name is bound to the variable.
    Variable(String),
}

impl GraphConstraint {
    pub fn as_var(&self) -> Option<&str> {
        match self {
            GraphConstraint::Variable(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for GraphConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphConstraint::Default => f.write_str("DEFAULT"),
            GraphConstraint::Named(name) => write!(f, "<{}>", name),
            GraphConstraint::Variable(name) => write!(f, "?{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TriplePattern {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
    #[serde(default)]
    pub graph: GraphConstraint,
}

impl TriplePattern {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
            graph: GraphConstraint::Default,
        }
    }

    /// Builds a pattern from three tokens, see [`Term::parse`].
    pub fn parse(subject: &str, predicate: &str, object: &str) -> Self {
        Self::new(Term::parse(subject), Term::parse(predicate), Term::parse(object))
    }

    pub fn in_graph(mut self, graph: GraphConstraint) -> Self {
        self.graph = graph;
        self
    }

    pub fn term(&self, position: TriplePosition) -> &Term {
        match position {
            TriplePosition::Subject => &self.subject,
            TriplePosition::Predicate => &self.predicate,
            TriplePosition::Object => &self.object,
        }
    }

    /// Variables occurring in the subject, predicate or object position.
    pub fn variables(&self) -> BTreeSet<String> {
        TriplePosition::ALL
            .iter()
            .filter_map(|&pos| self.term(pos).as_var())
            .map(str::to_string)
            .collect()
    }

    /// Triple variables plus the graph variable, if any.
    pub fn all_variables(&self) -> BTreeSet<String> {
        let mut vars = self.variables();
        if let Some(graph_var) = self.graph.as_var() {
            vars.insert(graph_var.to_string());
        }
        vars
    }

    pub fn constant_count(&self) -> usize {
        TriplePosition::ALL
            .iter()
            .filter(|&&pos| !self.term(pos).is_var())
            .count()
    }

    pub fn positions_of(&self, variable: &str) -> Vec<TriplePosition> {
        TriplePosition::ALL
            .iter()
            .copied()
            .filter(|&pos| self.term(pos).as_var() == Some(variable))
            .collect()
    }

    pub fn position_of(&self, variable: &str) -> Option<TriplePosition> {
        self.positions_of(variable).into_iter().next()
    }

    /// True when the same variable occupies more than one position.
    pub fn has_repeated_variable(&self) -> bool {
        let names: Vec<&str> = TriplePosition::ALL
            .iter()
            .filter_map(|&pos| self.term(pos).as_var())
            .collect();
        let distinct: BTreeSet<&str> = names.iter().copied().collect();
        distinct.len() != names.len()
    }

    /// Checks constants and repeated-variable equality against a triple.
    pub fn matches(&self, triple: &Triple) -> bool {
        let mut seen: Vec<(&str, &Literal)> = Vec::with_capacity(3);
        for pos in TriplePosition::ALL {
            let value = triple.get(pos);
            match self.term(pos) {
                Term::Constant(constant) => {
                    if constant != value {
                        return false;
                    }
                }
                Term::Variable(name) => {
                    if let Some((_, bound)) = seen.iter().find(|(n, _)| *n == name.as_str()) {
                        if *bound != value {
                            return false;
                        }
                    } else {
                        seen.push((name.as_str(), value));
                    }
                }
            }
        }
        true
    }

    /// Binds the triple variables of this pattern to the values of `triple`.
    pub fn bind(&self, triple: &Triple) -> Bindings {
        let mut bindings = Bindings::new();
        for pos in TriplePosition::ALL {
            if let Some(name) = self.term(pos).as_var() {
                bindings.insert(name.to_string(), triple.get(pos).clone());
            }
        }
        bindings
    }

    /// Replaces variables bound in `bindings` by their values. A bound graph
    /// variable becomes a named graph.
    pub fn substitute(&self, bindings: &Bindings) -> TriplePattern {
        let bind = |term: &Term| match term {
            Term::Variable(name) => match bindings.get(name) {
                Some(value) => Term::Constant(value.clone()),
                None => term.clone(),
            },
            Term::Constant(_) => term.clone(),
        };
        let graph = match &self.graph {
            GraphConstraint::Variable(name) => match bindings.get(name) {
                Some(value) => GraphConstraint::Named(value.clone()),
                None => self.graph.clone(),
            },
            other => other.clone(),
        };
        TriplePattern {
            subject: bind(&self.subject),
            predicate: bind(&self.predicate),
            object: bind(&self.object),
            graph,
        }
    }
}

impl fmt::Display for TriplePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.subject, self.predicate, self.object)?;
        if self.graph != GraphConstraint::Default {
            write!(f, "@{}", self.graph)?;
        }
        Ok(())
    }
}
