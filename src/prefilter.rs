// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Prefilters for the smerger.
//!
//! A prefilter sits on one input stream of a smerger. `add` is called each
//! time that stream yields an extraction; `get` is called when some *other*
//! stream yields, to enumerate which already-seen extractions of this stream
//! are worth combining with it. The trivial prefilter returns everything;
//! the doc-region prefilter returns only those whose key-field bbox
//! satisfies the region restriction derived from the feeder's bboxes.

use crate::doc_region_restriction::{get_doc_region_restriction, Restriction};
use crate::document::{Document, EzDocRegion};
use crate::extraction::Field;
use crate::scoring::ScoredExtraction;
use crate::spatial_formula::{simplify, to_dnf, Dnf, Formula};
use rustc_hash::FxHashSet;
use std::rc::Rc;

/// A prefilter that does nothing but hold the extractions that pass through
/// it, and keep track of the best one
pub struct TrivialPrefilter {
    items: Vec<Rc<ScoredExtraction>>,
    best: Option<Rc<ScoredExtraction>>,
}

impl TrivialPrefilter {
    /// Creates an empty trivial prefilter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            best: None,
        }
    }

    fn add(&mut self, target: Rc<ScoredExtraction>) {
        if self.best.as_ref().is_none_or(|b| target.ranks_before(b)) {
            self.best = Some(target.clone());
        }
        self.items.push(target);
    }

    fn get(&self) -> Vec<Rc<ScoredExtraction>> {
        self.items.clone()
    }
}

impl Default for TrivialPrefilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Indexes target extractions by the bbox of a chosen key field, so that
/// given a feeder extraction, the compatible targets can be enumerated
/// through region queries instead of a scan
///
/// Targets with no assignment for the key field are kept in a parallel list
/// and always yielded.
pub struct DocRegionPrefilter<'d> {
    field: Field,
    phi: Dnf,
    document: &'d Document,
    index: EzDocRegion<Rc<ScoredExtraction>>,
    nones: Vec<Rc<ScoredExtraction>>,
    best: Option<Rc<ScoredExtraction>>,
}

impl<'d> DocRegionPrefilter<'d> {
    /// Creates a prefilter keyed on `field`, restricted by the weakened
    /// formula `phi`.
    #[must_use]
    pub fn new(field: Field, phi: &Formula, document: &'d Document) -> Self {
        Self {
            field,
            phi: to_dnf(&simplify(phi)),
            document,
            index: EzDocRegion::new(document.bbox()),
            nones: Vec::new(),
            best: None,
        }
    }

    fn add(&mut self, target: Rc<ScoredExtraction>) {
        if self.best.as_ref().is_none_or(|b| target.ranks_before(b)) {
            self.best = Some(target.clone());
        }

        match target.get(&self.field) {
            None => self.nones.push(target),
            Some(entity) => {
                let bbox = self.document.entity(entity).bbox();
                // Entity bboxes are contained in the document bbox by
                // construction.
                if let Err(e) = self.index.insert(target.clone(), bbox) {
                    log::error!("prefilter index rejected {bbox:?}: {e}; keeping unfiltered");
                    self.nones.push(target);
                }
            }
        }
    }

    fn get(&self, feeder: &ScoredExtraction) -> Vec<Rc<ScoredExtraction>> {
        let mut out = self.targets_for(feeder);
        out.extend(self.nones.iter().cloned());
        out
    }

    fn targets_for(&self, feeder: &ScoredExtraction) -> Vec<Rc<ScoredExtraction>> {
        match get_doc_region_restriction(&self.field, feeder, &self.phi, self.document) {
            Restriction::Never => Vec::new(),
            Restriction::Always => self.index.items(),
            Restriction::Regions(conjunctions) => {
                let mut seen: FxHashSet<*const ScoredExtraction> = FxHashSet::default();
                let mut out = Vec::new();

                for conjunction in conjunctions {
                    let candidates = match (&conjunction.superset, &conjunction.intersections) {
                        (None, None) => continue,

                        (None, Some(regions)) => {
                            // Intersect the per-region result sets
                            let mut sets = regions
                                .iter()
                                .map(|region| self.index.items_intersecting(region));
                            let Some(first) = sets.next() else {
                                continue;
                            };
                            let rest: Vec<FxHashSet<*const ScoredExtraction>> = sets
                                .map(|set| {
                                    set.iter().map(|t| Rc::as_ptr(t)).collect()
                                })
                                .collect();
                            first
                                .into_iter()
                                .filter(|t| {
                                    rest.iter().all(|set| set.contains(&Rc::as_ptr(t)))
                                })
                                .collect()
                        }

                        (Some(superset), None) => self.index.items_contained_in(superset),

                        (Some(superset), Some(regions)) => self
                            .index
                            .items_contained_in(superset)
                            .into_iter()
                            .filter(|target| {
                                let Some(entity) = target.get(&self.field) else {
                                    return false;
                                };
                                let bbox = self.document.entity(entity).bbox();
                                regions.iter().all(|region| region.intersects_bbox(&bbox))
                            })
                            .collect::<Vec<_>>(),
                    };

                    for target in candidates {
                        if seen.insert(Rc::as_ptr(&target)) {
                            out.push(target);
                        }
                    }
                }

                out
            }
        }
    }
}

/// A smerger input's prefilter: trivial, or keyed by document region
pub enum Prefilter<'d> {
    /// Yields every seen extraction for every feeder
    Trivial(TrivialPrefilter),

    /// Yields only spatially compatible extractions
    DocRegion(DocRegionPrefilter<'d>),
}

impl Prefilter<'_> {
    /// Records an extraction yielded by this prefilter's stream.
    pub fn add(&mut self, target: Rc<ScoredExtraction>) {
        match self {
            Self::Trivial(p) => p.add(target),
            Self::DocRegion(p) => p.add(target),
        }
    }

    /// The already-seen extractions worth combining with this feeder.
    #[must_use]
    pub fn get(&self, feeder: &ScoredExtraction) -> Vec<Rc<ScoredExtraction>> {
        match self {
            Self::Trivial(p) => p.get(),
            Self::DocRegion(p) => p.get(feeder),
        }
    }

    /// The best extraction seen so far.
    #[must_use]
    pub fn best(&self) -> Option<&Rc<ScoredExtraction>> {
        match self {
            Self::Trivial(p) => p.best.as_ref(),
            Self::DocRegion(p) => p.best.as_ref(),
        }
    }
}
