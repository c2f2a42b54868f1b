// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::peeker::Peeker;
use crate::scoring::ScoredExtraction;
use crate::{Error, Result};
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::rc::Rc;

// Entries hold the owning peeker's index, not the peeker, so the peekers
// stay addressable for results reporting even once exhausted.
#[derive(Eq, Ord, PartialEq, PartialOrd)]
struct IndexEntry {
    norm: OrderedFloat<f64>,
    // Counter breaks ties between equal top values
    seq: u64,
    index: usize,
}

/// Best-first k-way selection across several peeked streams
///
/// A min-heap holds the current top of each peeker (normalised for
/// comparison); `next` pops the winning stream, advances its peeker, and
/// reinserts it if it is not exhausted.
pub(crate) struct PeekingHeap<I> {
    peekers: Vec<Peeker<I>>,
    normalizer: Box<dyn Fn(&ScoredExtraction) -> ScoredExtraction>,
    heap: BinaryHeap<Reverse<IndexEntry>>,
    seq: u64,
    initialized: bool,
}

impl<I> PeekingHeap<I>
where
    I: Iterator<Item = Result<Rc<ScoredExtraction>>>,
{
    /// Creates a heap over the given streams.
    ///
    /// # Errors
    ///
    /// Fails if `peek_distance` is zero.
    pub fn new(
        sources: Vec<I>,
        normalizer: Box<dyn Fn(&ScoredExtraction) -> ScoredExtraction>,
        peek_distance: usize,
    ) -> Result<Self> {
        if peek_distance < 1 {
            return Err(Error::InvalidParameter(format!(
                "peek_distance must be positive, not {peek_distance}"
            )));
        }
        Ok(Self {
            peekers: sources
                .into_iter()
                .map(|source| Peeker::new(source, peek_distance))
                .collect(),
            normalizer,
            heap: BinaryHeap::new(),
            seq: 0,
            initialized: false,
        })
    }

    /// The underlying streams, in construction order.
    pub fn sources(&self) -> impl Iterator<Item = &I> {
        self.peekers.iter().map(Peeker::source)
    }

    fn initialize(&mut self) -> Result<()> {
        for idx in 0..self.peekers.len() {
            self.peekers[idx].initialize()?;
            self.add(idx);
        }
        self.initialized = true;
        Ok(())
    }

    fn add(&mut self, index: usize) {
        if let Some(top) = self.peekers[index].top() {
            let normalized = (self.normalizer)(top);
            self.heap.push(Reverse(IndexEntry {
                norm: OrderedFloat(-normalized.score),
                seq: self.seq,
                index,
            }));
            self.seq += 1;
        }
    }

    /// Pops the winning stream's next item, normalised.
    pub fn next(&mut self) -> Option<Result<Rc<ScoredExtraction>>> {
        if !self.initialized {
            fail_iter!(self.initialize());
        }

        loop {
            let Reverse(entry) = self.heap.pop()?;
            let index = entry.index;

            match self.peekers[index].next() {
                Some(Ok(item)) => {
                    let normalized = Rc::new((self.normalizer)(&item));
                    self.add(index);
                    return Some(Ok(normalized));
                }
                Some(Err(e)) => return Some(Err(e)),
                // The peeker had a top when the entry was pushed, so this
                // is unreachable; skip the stream defensively.
                None => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::{Extraction, Field};
    use crate::scoring::extraction_score;
    use std::collections::BTreeMap;
    use test_log::test;

    fn scored(score: f64) -> Rc<ScoredExtraction> {
        let field_scores: BTreeMap<Field, f64> = [(Field::from("f"), score)].into();
        Rc::new(ScoredExtraction {
            extraction: Extraction::from_points([(
                Field::from("f"),
                crate::entity::EntityId(0),
            )])
            .expect("single field"),
            score: extraction_score(&field_scores, 1),
            field_scores,
            rule_scores: rustc_hash::FxHashMap::default(),
            mass: 1,
        })
    }

    fn stream(scores: &[f64]) -> std::vec::IntoIter<Result<Rc<ScoredExtraction>>> {
        scores
            .iter()
            .map(|s| Ok(scored(*s)))
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn merges_best_first() -> Result<()> {
        let mut heap = PeekingHeap::new(
            vec![stream(&[0.9, 0.3]), stream(&[0.7, 0.5])],
            Box::new(Clone::clone),
            2,
        )?;

        let mut out = Vec::new();
        while let Some(item) = heap.next() {
            out.push(item?.score);
        }
        assert_eq!(out, vec![0.9, 0.7, 0.5, 0.3]);
        Ok(())
    }

    #[test]
    fn rejects_zero_peek_distance() {
        assert!(PeekingHeap::new(vec![stream(&[0.9])], Box::new(Clone::clone), 0).is_err());
    }

    #[test]
    fn normalizer_is_applied() -> Result<()> {
        let mut heap = PeekingHeap::new(
            vec![stream(&[0.8])],
            Box::new(|m| m.normalize(2)),
            1,
        )?;
        let item = heap.next().expect("one item")?;
        assert!((item.score - 0.4).abs() < 1e-9);
        Ok(())
    }
}
