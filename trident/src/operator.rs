/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Physical operator graph handed to the execution layer.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Children are
//! owned through ids stored in the join; parents are plain back-references.

use shared::collation::CollationOrder;
use shared::terms::{Bindings, GraphConstraint, TriplePattern};
use std::collections::BTreeSet;
use std::fmt::{self, Write};

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// Both inputs arrive sorted on the join variables.
    Merge,
    /// Generic equi-join on unsorted inputs.
    Hash,
    /// No shared variables.
    CrossProduct,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JoinKind::Merge => "MergeJoin",
            JoinKind::Hash => "HashJoin",
            JoinKind::CrossProduct => "CrossProduct",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanNode {
    pub patterns: Vec<TriplePattern>,
    pub graph: GraphConstraint,
    pub order: CollationOrder,
    /// Inclusive per-variable lower bounds.
    pub min: Bindings,
    /// Inclusive per-variable upper bounds.
    pub max: Bindings,
    pub estimated_cardinality: f64,
}

impl ScanNode {
    pub fn new(pattern: TriplePattern, order: CollationOrder) -> Self {
        Self {
            graph: pattern.graph.clone(),
            patterns: vec![pattern],
            order,
            min: Bindings::new(),
            max: Bindings::new(),
            estimated_cardinality: 0.0,
        }
    }

    pub fn variables(&self) -> BTreeSet<String> {
        self.patterns.iter().flat_map(|p| p.all_variables()).collect()
    }

    /// Variables in the order the scan's output is sorted by.
    pub fn sort_variables(&self) -> Vec<String> {
        let mut vars: Vec<String> = Vec::new();
        if let Some(pattern) = self.patterns.first() {
            for pos in self.order.positions() {
                if let Some(name) = pattern.term(pos).as_var() {
                    if !vars.iter().any(|v| v == name) {
                        vars.push(name.to_string());
                    }
                }
            }
        }
        vars
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinNode {
    pub kind: JoinKind,
    /// For merge joins, the sort order both inputs share as a prefix.
    pub join_variables: Vec<String>,
    pub output_variables: BTreeSet<String>,
    pub left: NodeId,
    pub right: NodeId,
    pub estimated_cardinality: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Scan(ScanNode),
    Join(JoinNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperatorNode {
    pub operator: Operator,
    pub parent: Option<NodeId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperatorGraph {
    nodes: Vec<OperatorNode>,
    root: Option<NodeId>,
    provably_empty: bool,
}

impl OperatorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_scan(&mut self, scan: ScanNode) -> NodeId {
        self.nodes.push(OperatorNode {
            operator: Operator::Scan(scan),
            parent: None,
        });
        let id = self.nodes.len() - 1;
        self.root = Some(id);
        id
    }

    /// Adds a join over two existing nodes and makes it the root.
    pub fn add_join(
        &mut self,
        kind: JoinKind,
        join_variables: Vec<String>,
        left: NodeId,
        right: NodeId,
        estimated_cardinality: f64,
    ) -> NodeId {
        let mut output_variables = self.output_variables(left);
        output_variables.extend(self.output_variables(right));
        let id = self.nodes.len();
        self.nodes.push(OperatorNode {
            operator: Operator::Join(JoinNode {
                kind,
                join_variables,
                output_variables,
                left,
                right,
                estimated_cardinality,
            }),
            parent: None,
        });
        for child in [left, right] {
            if let Some(node) = self.nodes.get_mut(child) {
                node.parent = Some(id);
            }
        }
        self.root = Some(id);
        id
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&OperatorNode> {
        self.nodes.get(id)
    }

    pub fn operator(&self, id: NodeId) -> Option<&Operator> {
        self.nodes.get(id).map(|n| &n.operator)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_provably_empty(&self) -> bool {
        self.provably_empty
    }

    pub fn mark_provably_empty(&mut self) {
        self.provably_empty = true;
    }

    pub fn output_variables(&self, id: NodeId) -> BTreeSet<String> {
        match self.operator(id) {
            Some(Operator::Scan(scan)) => scan.variables(),
            Some(Operator::Join(join)) => join.output_variables.clone(),
            None => BTreeSet::new(),
        }
    }

    /// Scans reachable from the root, left to right.
    pub fn scans(&self) -> Vec<(NodeId, &ScanNode)> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.root.into_iter().collect();
        while let Some(id) = stack.pop() {
            match self.operator(id) {
                Some(Operator::Scan(scan)) => out.push((id, scan)),
                Some(Operator::Join(join)) => {
                    stack.push(join.right);
                    stack.push(join.left);
                }
                None => {}
            }
        }
        out
    }

    /// Joins reachable from the root, bottom-up.
    pub fn joins(&self) -> Vec<(NodeId, &JoinNode)> {
        let mut out = Vec::new();
        self.collect_joins(self.root, &mut out);
        out
    }

    fn collect_joins<'a>(&'a self, id: Option<NodeId>, out: &mut Vec<(NodeId, &'a JoinNode)>) {
        let Some(id) = id else { return };
        if let Some(Operator::Join(join)) = self.operator(id) {
            self.collect_joins(Some(join.left), out);
            self.collect_joins(Some(join.right), out);
            out.push((id, join));
        }
    }

    pub fn count_joins(&self, kind: JoinKind) -> usize {
        self.joins().iter().filter(|(_, j)| j.kind == kind).count()
    }

    /// Indented text rendering, one operator per line.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        if self.provably_empty {
            out.push_str("(provably empty)\n");
        }
        if let Some(root) = self.root {
            self.explain_node(root, 0, &mut out);
        }
        out
    }

    fn explain_node(&self, id: NodeId, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        match self.operator(id) {
            Some(Operator::Scan(scan)) => {
                let patterns: Vec<String> = scan.patterns.iter().map(|p| p.to_string()).collect();
                let _ = writeln!(
                    out,
                    "{}Scan {} order={} card={:.1}",
                    indent,
                    patterns.join(" "),
                    scan.order,
                    scan.estimated_cardinality
                );
            }
            Some(Operator::Join(join)) => {
                let _ = writeln!(
                    out,
                    "{}{} on [{}] card={:.1}",
                    indent,
                    join.kind,
                    join.join_variables.join(", "),
                    join.estimated_cardinality
                );
                self.explain_node(join.left, depth + 1, out);
                self.explain_node(join.right, depth + 1, out);
            }
            None => {}
        }
    }
}
