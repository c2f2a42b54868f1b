// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::scoring::ScoredExtraction;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::rc::Rc;

/// A heap entry ordering extractions by a norm, with an insertion counter
/// breaking ties deterministically
pub(crate) struct HeapEntry {
    pub norm: OrderedFloat<f64>,
    pub seq: u64,
    pub item: Rc<ScoredExtraction>,
}

impl HeapEntry {
    /// Builds an entry under the standard norm: the negated score, so that
    /// a min-heap yields best-first.
    pub fn new(item: Rc<ScoredExtraction>, seq: u64) -> Self {
        Self {
            norm: OrderedFloat(-item.score),
            seq,
            item,
        }
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        (self.norm, self.seq) == (other.norm, other.seq)
    }
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.norm, self.seq).cmp(&(other.norm, other.seq))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Forwards the values of a stream, constantly peeking a configured
/// distance ahead and preferring to return better-scoring values first
///
/// `initialize` fills a min-heap with `peek_distance` items; on `next`, one
/// more item is pulled from the underlying stream, added to the heap, and
/// the heap's minimum is returned. The effect is a short-horizon local
/// re-sort of the stream.
pub(crate) struct Peeker<I> {
    source: I,
    peek_distance: usize,
    heap: BinaryHeap<Reverse<HeapEntry>>,
    seq: u64,
    initialized: bool,
}

impl<I> Peeker<I>
where
    I: Iterator<Item = crate::Result<Rc<ScoredExtraction>>>,
{
    pub fn new(source: I, peek_distance: usize) -> Self {
        Self {
            source,
            peek_distance,
            heap: BinaryHeap::new(),
            seq: 0,
            initialized: false,
        }
    }

    /// The underlying stream.
    pub fn source(&self) -> &I {
        &self.source
    }

    /// Fills the lookahead heap.
    pub fn initialize(&mut self) -> crate::Result<()> {
        debug_assert!(!self.initialized, "attempted initialization twice");
        for _ in 0..self.peek_distance {
            self.pull()?;
        }
        self.initialized = true;
        Ok(())
    }

    fn pull(&mut self) -> crate::Result<()> {
        if let Some(item) = self.source.next() {
            let item = item?;
            self.heap.push(Reverse(HeapEntry::new(item, self.seq)));
            self.seq += 1;
        }
        Ok(())
    }

    /// The best item currently in the lookahead window.
    ///
    /// It is *not* guaranteed that `next` will return exactly this item.
    pub fn top(&self) -> Option<&Rc<ScoredExtraction>> {
        self.heap.peek().map(|Reverse(entry)| &entry.item)
    }

    /// Pulls one item from the source and pops the best of the window.
    pub fn next(&mut self) -> Option<crate::Result<Rc<ScoredExtraction>>> {
        if !self.initialized {
            fail_iter!(self.initialize());
        }

        fail_iter!(self.pull());

        self.heap.pop().map(|Reverse(entry)| Ok(entry.item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::{Extraction, Field};
    use crate::scoring::extraction_score;
    use std::collections::BTreeMap;
    use test_log::test;

    fn scored(score: f64) -> crate::Result<Rc<ScoredExtraction>> {
        let field_scores: BTreeMap<Field, f64> = [(Field::from("f"), score)].into();
        Ok(Rc::new(ScoredExtraction {
            extraction: Extraction::from_points([(
                Field::from("f"),
                crate::entity::EntityId(0),
            )])?,
            score: extraction_score(&field_scores, 1),
            field_scores,
            rule_scores: rustc_hash::FxHashMap::default(),
            mass: 1,
        }))
    }

    fn scores_of<I>(mut peeker: Peeker<I>) -> Vec<f64>
    where
        I: Iterator<Item = crate::Result<Rc<ScoredExtraction>>>,
    {
        let mut out = Vec::new();
        while let Some(item) = peeker.next() {
            out.push(item.expect("no errors in test stream").score);
        }
        out
    }

    fn unwrap_scores(items: Vec<crate::Result<Rc<ScoredExtraction>>>) -> Vec<f64> {
        items
            .into_iter()
            .map(|i| i.expect("no errors in test stream").score)
            .collect()
    }

    #[test]
    fn sorted_input_passes_through() -> crate::Result<()> {
        let items = vec![scored(0.9)?, scored(0.5)?, scored(0.2)?];
        let peeker = Peeker::new(items.into_iter().map(Ok), 2);
        assert_eq!(scores_of(peeker), vec![0.9, 0.5, 0.2]);
        Ok(())
    }

    #[test]
    fn lookahead_resorts_within_window() -> crate::Result<()> {
        let items = vec![scored(0.2)?, scored(0.9)?, scored(0.5)?];
        let peeker = Peeker::new(items.into_iter().map(Ok), 2);
        // The 0.9 and 0.5 overtake the 0.2 inside the lookahead window
        assert_eq!(scores_of(peeker), vec![0.9, 0.5, 0.2]);
        Ok(())
    }

    #[test]
    fn every_item_is_eventually_emitted() -> crate::Result<()> {
        let raw = [0.5, 0.2, 0.9, 0.1, 0.7];
        let items: Vec<_> = raw.iter().map(|s| scored(*s)).collect::<crate::Result<_>>()?;
        let mut expected = unwrap_scores(items.iter().cloned().map(Ok).collect());
        expected.sort_by(f64::total_cmp);

        let peeker = Peeker::new(items.into_iter().map(Ok), 1);
        let mut emitted = scores_of(peeker);
        emitted.sort_by(f64::total_cmp);
        assert_eq!(emitted, expected);
        Ok(())
    }

    #[test]
    fn top_is_available_after_initialize() -> crate::Result<()> {
        let items = vec![scored(0.2)?, scored(0.9)?];
        let mut peeker = Peeker::new(items.into_iter().map(Ok), 2);
        peeker.initialize()?;
        assert!((peeker.top().expect("window is non-empty").score - 0.9).abs() < 1e-9);
        Ok(())
    }
}
