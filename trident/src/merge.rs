/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Combining per-graph ordered streams into one ordered stream.

use crate::dataset::GraphId;
use shared::collation::CollationOrder;
use shared::triple::Triple;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;

/// An ordered triple stream from one graph, tagged with the graph's id.
pub struct TaggedCursor<'a> {
    graph: GraphId,
    inner: Box<dyn Iterator<Item = &'a Triple> + 'a>,
}

impl<'a> TaggedCursor<'a> {
    pub fn new(graph: GraphId, inner: impl Iterator<Item = &'a Triple> + 'a) -> Self {
        Self {
            graph,
            inner: Box::new(inner),
        }
    }

    pub fn graph(&self) -> GraphId {
        self.graph
    }
}

impl<'a> Iterator for TaggedCursor<'a> {
    type Item = (GraphId, &'a Triple);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|triple| (self.graph, triple))
    }
}

impl fmt::Debug for TaggedCursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaggedCursor").field("graph", &self.graph).finish()
    }
}

struct HeapEntry<'a> {
    head: &'a Triple,
    cursor: TaggedCursor<'a>,
    order: CollationOrder,
}

impl HeapEntry<'_> {
    // min-heap on (triple under order, graph id)
    fn rank(&self, other: &Self) -> Ordering {
        self.order
            .compare(self.head, other.head)
            .then_with(|| self.cursor.graph.cmp(&other.cursor.graph))
    }
}

impl PartialEq for HeapEntry<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.rank(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry<'_> {}

impl PartialOrd for HeapEntry<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.rank(self)
    }
}

/// K-way merge of tagged cursors that are each sorted under `order`.
///
/// Equal triples from different graphs come out in ascending graph id.
pub struct KMerge<'a> {
    order: CollationOrder,
    heap: BinaryHeap<HeapEntry<'a>>,
    last_source: Option<GraphId>,
}

impl<'a> KMerge<'a> {
    pub fn new(order: CollationOrder, cursors: impl IntoIterator<Item = TaggedCursor<'a>>) -> Self {
        let mut heap = BinaryHeap::new();
        for mut cursor in cursors {
            if let Some(head) = cursor.inner.next() {
                heap.push(HeapEntry { head, cursor, order });
            }
        }
        Self {
            order,
            heap,
            last_source: None,
        }
    }

    pub fn order(&self) -> CollationOrder {
        self.order
    }

    /// Graph that produced the most recent triple.
    pub fn last_source(&self) -> Option<GraphId> {
        self.last_source
    }
}

impl<'a> Iterator for KMerge<'a> {
    type Item = (GraphId, &'a Triple);

    fn next(&mut self) -> Option<Self::Item> {
        let HeapEntry { head, mut cursor, order } = self.heap.pop()?;
        let graph = cursor.graph;
        if let Some(next) = cursor.inner.next() {
            self.heap.push(HeapEntry { head: next, cursor, order });
        }
        self.last_source = Some(graph);
        Some((graph, head))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_interleaves_sources() {
        let g1 = [Triple::new("a", "p", "1"), Triple::new("c", "p", "1")];
        let g2 = [Triple::new("b", "p", "1"), Triple::new("d", "p", "1")];
        let mut merge = KMerge::new(
            CollationOrder::Spo,
            vec![TaggedCursor::new(1, g1.iter()), TaggedCursor::new(2, g2.iter())],
        );
        let mut seen = Vec::new();
        while let Some((graph, triple)) = merge.next() {
            assert_eq!(merge.last_source(), Some(graph));
            seen.push((graph, triple.subject.as_str()));
        }
        assert_eq!(seen, vec![(1, "a"), (2, "b"), (1, "c"), (2, "d")]);
    }

    #[test]
    fn test_equal_keys_tie_break_by_graph_id() {
        let shared = [Triple::new("a", "p", "o")];
        let merge = KMerge::new(
            CollationOrder::Pos,
            vec![TaggedCursor::new(5, shared.iter()), TaggedCursor::new(3, shared.iter())],
        );
        let graphs: Vec<GraphId> = merge.map(|(graph, _)| graph).collect();
        assert_eq!(graphs, vec![3, 5]);
    }

    #[test]
    fn test_no_first_element_means_no_result() {
        let empty: [Triple; 0] = [];
        let mut merge = KMerge::new(
            CollationOrder::Spo,
            vec![TaggedCursor::new(1, empty.iter()), TaggedCursor::new(2, empty.iter())],
        );
        assert!(merge.next().is_none());
        assert_eq!(merge.last_source(), None);
    }
}
