// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::peeker::{HeapEntry, Peeker};
use crate::prefilter::{Prefilter, TrivialPrefilter};
use crate::scoring::ScoredExtraction;
use crate::{Error, Result};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::rc::Rc;

/// Combines one extraction from each input stream into an output candidate.
///
/// Returning `Ok(None)` discards the combination gracefully.
pub(crate) type Merger<'d> =
    Box<dyn FnMut(&[Rc<ScoredExtraction>]) -> Result<Option<ScoredExtraction>> + 'd>;

/// Estimates the norm a tuple of pre-merge extractions would get if merged.
pub(crate) type NormEstimator<'d> = Box<dyn Fn(&[&ScoredExtraction]) -> f64 + 'd>;

struct Stream<'d, I> {
    peeker: Peeker<I>,
    prefilter: Prefilter<'d>,
    // A muted stream is never stepped and its prefilter only offers the
    // empty extraction (the all-or-nothing short-circuit).
    muted: bool,
}

impl<I> Stream<'_, I>
where
    I: Iterator<Item = Result<Rc<ScoredExtraction>>>,
{
    fn top(&self) -> Option<&Rc<ScoredExtraction>> {
        if self.muted {
            None
        } else {
            self.peeker.top()
        }
    }

    fn advance(&mut self) -> Result<Option<Rc<ScoredExtraction>>> {
        match self.peeker.next() {
            Some(Ok(item)) => {
                self.prefilter.add(item.clone());
                Ok(Some(item))
            }
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

/// Combines several roughly-increasing sequences of extractions into a
/// single roughly-increasing sequence of merged extractions
///
/// Given inputs x1, x2, ... and y1, y2, ..., each in roughly best-first
/// order, the smerger yields merged combinations, also in roughly
/// best-first order. Every combination is eventually emitted (with
/// multiplicity) unless the merger discards it. The exception is
/// all-or-nothing, where a stream with no assignments at all collapses the
/// output to just the empty extraction.
///
/// Norms run opposite to scores: smaller is better, so the heaps are
/// min-heaps.
pub(crate) struct Smerger<'d, I> {
    streams: Vec<Stream<'d, I>>,
    merger: Merger<'d>,
    norm_estimator: NormEstimator<'d>,
    heap: BinaryHeap<Reverse<HeapEntry>>,
    seq: u64,
    all_or_nothing: bool,
    /// Step whenever some stream's optimistic norm beats the current heap
    /// top, before yielding
    optimistic: bool,
    initialized: bool,
}

impl<'d, I> Smerger<'d, I>
where
    I: Iterator<Item = Result<Rc<ScoredExtraction>>>,
{
    /// Creates a smerger over the given streams and their prefilters.
    ///
    /// # Errors
    ///
    /// Fails if `peek_distance` is zero.
    pub fn new(
        streams: Vec<(I, Prefilter<'d>)>,
        merger: Merger<'d>,
        norm_estimator: NormEstimator<'d>,
        all_or_nothing: bool,
        peek_distance: usize,
        optimistic: bool,
    ) -> Result<Self> {
        if peek_distance < 1 {
            return Err(Error::InvalidParameter(format!(
                "peek_distance must be positive, not {peek_distance}"
            )));
        }

        Ok(Self {
            streams: streams
                .into_iter()
                .map(|(source, prefilter)| Stream {
                    peeker: Peeker::new(source, peek_distance),
                    prefilter,
                    muted: false,
                })
                .collect(),
            merger,
            norm_estimator,
            heap: BinaryHeap::new(),
            seq: 0,
            all_or_nothing,
            optimistic,
            initialized: false,
        })
    }

    /// The underlying streams, in construction order.
    pub fn sources(&self) -> impl Iterator<Item = &I> {
        self.streams.iter().map(|s| s.peeker.source())
    }

    fn initialize(&mut self) -> Result<()> {
        for stream in &mut self.streams {
            stream.peeker.initialize()?;
        }

        // The empty extraction is always returned last from a stream, so a
        // stream whose best remaining item is empty has no assignments at
        // all. Under all-or-nothing that forces the whole output to empty:
        // mute every other stream.
        let only_empty =
            |s: &Stream<'_, I>| s.peeker.top().is_some_and(|top| top.is_empty());

        if self.all_or_nothing && self.streams.iter().any(only_empty) {
            for stream in &mut self.streams {
                if !only_empty(stream) {
                    stream.muted = true;
                    let mut prefilter = Prefilter::Trivial(TrivialPrefilter::new());
                    prefilter.add(Rc::new(ScoredExtraction::empty()));
                    stream.prefilter = prefilter;
                }
            }
        }

        for idx in 0..self.streams.len() {
            if self.streams[idx].top().is_some() {
                self.step(idx)?;
            }
        }

        self.initialized = true;
        Ok(())
    }

    fn push(&mut self, item: ScoredExtraction) {
        self.heap
            .push(Reverse(HeapEntry::new(Rc::new(item), self.seq)));
        self.seq += 1;
    }

    /// Advances one stream by one item and pushes every new combination
    /// formable from it plus one prefilter-compatible item from each other
    /// stream.
    fn step(&mut self, stepping: usize) -> Result<()> {
        let Some(item) = self.streams[stepping].advance()? else {
            return Ok(());
        };

        let lists: Vec<Vec<Rc<ScoredExtraction>>> = self
            .streams
            .iter()
            .enumerate()
            .map(|(idx, stream)| {
                if idx == stepping {
                    vec![item.clone()]
                } else {
                    stream.prefilter.get(&item)
                }
            })
            .collect();

        if lists.iter().any(Vec::is_empty) {
            return Ok(());
        }

        // Odometer over the cartesian product
        let mut indices = vec![0usize; lists.len()];
        'combos: loop {
            let combo: Vec<Rc<ScoredExtraction>> = indices
                .iter()
                .zip(&lists)
                .map(|(i, list)| list[*i].clone())
                .collect();

            if let Some(merged) = (self.merger)(&combo)? {
                self.push(merged);
            }

            let mut position = lists.len();
            loop {
                if position == 0 {
                    break 'combos;
                }
                position -= 1;
                indices[position] += 1;
                if indices[position] < lists[position].len() {
                    break;
                }
                indices[position] = 0;
            }
        }

        Ok(())
    }

    /// The norm we would get by merging this stream's peek top with every
    /// other stream's best-so-far.
    fn optimistic_norm(&self, stream_idx: usize) -> Option<f64> {
        let mut contributions: Vec<&ScoredExtraction> =
            Vec::with_capacity(self.streams.len());

        for (idx, stream) in self.streams.iter().enumerate() {
            let contribution = if idx == stream_idx {
                stream.top()?
            } else {
                stream.prefilter.best()?
            };
            contributions.push(contribution);
        }

        Some((self.norm_estimator)(&contributions))
    }

    fn most_promising_stream(&self, limit: Option<f64>) -> Option<usize> {
        let mut best: Option<(f64, usize)> = None;

        for idx in 0..self.streams.len() {
            if self.streams[idx].top().is_none() {
                continue;
            }
            let Some(norm) = self.optimistic_norm(idx) else {
                continue;
            };
            if limit.is_some_and(|limit| norm >= limit) {
                continue;
            }
            if best.is_none_or(|(best_norm, _)| norm < best_norm) {
                best = Some((norm, idx));
            }
        }

        best.map(|(_, idx)| idx)
    }

    /// Yields the next combined extraction in roughly best-first order.
    pub fn next(&mut self) -> Option<Result<Rc<ScoredExtraction>>> {
        if !self.initialized {
            fail_iter!(self.initialize());
        }

        if self.streams.iter().all(|s| s.prefilter.best().is_some()) {
            while self.heap.is_empty() {
                let Some(idx) = self.most_promising_stream(None) else {
                    break;
                };
                fail_iter!(self.step(idx));
            }

            if self.optimistic {
                loop {
                    let Some(Reverse(top)) = self.heap.peek() else {
                        break;
                    };
                    let current_norm = top.norm.0;
                    let Some(idx) = self.most_promising_stream(Some(current_norm)) else {
                        break;
                    };
                    fail_iter!(self.step(idx));
                }
            }
        }

        self.heap.pop().map(|Reverse(entry)| Ok(entry.item))
    }
}
