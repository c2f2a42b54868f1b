// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::geometry::{BBox, Interval};
use crate::{Error, Result};

/// How many straddlers a node may hold before it splits
const STRADDLER_CAPACITY: usize = 5;

/// The width/height ratio the splitting heuristic steers towards
pub const IDEAL_WIDTH_TO_HEIGHT_RATIO: f64 = 20.0;

/// A recursive axis-aligned box partition
///
/// Items are stored with the bounding box they were inserted under. Each node
/// keeps a small set of "straddlers" that cross its children's partition
/// line; when a leaf exceeds its straddler capacity it splits along whichever
/// axis brings its aspect ratio closest to the ideal width/height ratio.
///
/// Queries visit every straddler set on the root-to-leaf paths that intersect
/// the query region, so there are no false negatives.
pub struct EzBox<T> {
    bbox: BBox,
    ideal_width_to_height_ratio: f64,
    straddlers: Vec<(T, BBox)>,
    children: Option<Box<[EzBox<T>; 2]>>,
}

impl<T: Clone> EzBox<T> {
    /// Creates an index covering the given region.
    #[must_use]
    pub fn new(bbox: BBox) -> Self {
        Self::with_ratio(bbox, IDEAL_WIDTH_TO_HEIGHT_RATIO)
    }

    /// Creates an index with a custom ideal width/height ratio.
    #[must_use]
    pub fn with_ratio(bbox: BBox, ideal_width_to_height_ratio: f64) -> Self {
        Self {
            bbox,
            ideal_width_to_height_ratio,
            straddlers: Vec::new(),
            children: None,
        }
    }

    /// Inserts an item under the given bounding box.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::OutOfBounds`] if the bbox is not contained in the
    /// index bounds.
    pub fn insert(&mut self, item: T, bbox: BBox) -> Result<()> {
        if !self.bbox.contains_bbox(&bbox) {
            return Err(Error::OutOfBounds);
        }
        self.insert_unchecked(item, bbox);
        Ok(())
    }

    fn insert_unchecked(&mut self, item: T, bbox: BBox) {
        if let Some(children) = &mut self.children {
            for child in children.iter_mut() {
                if child.bbox.contains_bbox(&bbox) {
                    child.insert_unchecked(item, bbox);
                    return;
                }
            }
            self.straddlers.push((item, bbox));
            return;
        }

        self.straddlers.push((item, bbox));
        if self.straddlers.len() > STRADDLER_CAPACITY {
            self.split();
        }
    }

    /// Returns all items.
    #[must_use]
    pub fn items(&self) -> Vec<T> {
        let mut out = Vec::new();
        self.visit(&mut |item, _| out.push(item.clone()));
        out
    }

    /// Returns all items whose bbox is contained in the query box.
    #[must_use]
    pub fn items_contained_in(&self, query: &BBox) -> Vec<T> {
        let mut out = Vec::new();
        self.collect_contained_in(query, &mut out);
        out
    }

    /// Returns all items whose bbox intersects the query box.
    #[must_use]
    pub fn items_intersecting(&self, query: &BBox) -> Vec<T> {
        let mut out = Vec::new();
        self.collect_intersecting(query, &mut out);
        out
    }

    fn visit(&self, f: &mut impl FnMut(&T, &BBox)) {
        for (item, bbox) in &self.straddlers {
            f(item, bbox);
        }
        if let Some(children) = &self.children {
            for child in children.iter() {
                child.visit(f);
            }
        }
    }

    fn collect_contained_in(&self, query: &BBox, out: &mut Vec<T>) {
        let Some(query) = BBox::intersection([*query, self.bbox]) else {
            return;
        };

        for (item, bbox) in &self.straddlers {
            if query.contains_bbox(bbox) {
                out.push(item.clone());
            }
        }

        if let Some(children) = &self.children {
            for child in children.iter() {
                child.collect_contained_in(&query, out);
            }
        }
    }

    fn collect_intersecting(&self, query: &BBox, out: &mut Vec<T>) {
        let Some(query) = BBox::intersection([*query, self.bbox]) else {
            return;
        };

        for (item, bbox) in &self.straddlers {
            if query.intersects_bbox(bbox) {
                out.push(item.clone());
            }
        }

        if let Some(children) = &self.children {
            for child in children.iter() {
                child.collect_intersecting(&query, out);
            }
        }
    }

    fn split(&mut self) {
        debug_assert!(self.children.is_none());

        let items = std::mem::take(&mut self.straddlers);

        let current_ratio = self.bbox.ix.length() / self.bbox.iy.length();
        let v_ratio = 0.5 * current_ratio;
        let h_ratio = 2.0 * current_ratio;

        let v_error = (1.0 - v_ratio / self.ideal_width_to_height_ratio).abs();
        let h_error = (1.0 - h_ratio / self.ideal_width_to_height_ratio).abs();

        let (first, second) = if v_error < h_error {
            // Split vertically (a left and a right half)
            let (l, c, r) = (self.bbox.ix.a, self.bbox.ix.center(), self.bbox.ix.b);
            (
                BBox::new(Interval::new(l, c), self.bbox.iy),
                BBox::new(Interval::new(c, r), self.bbox.iy),
            )
        } else {
            // Split horizontally (an upper and a lower half)
            let (u, c, l) = (self.bbox.iy.a, self.bbox.iy.center(), self.bbox.iy.b);
            (
                BBox::new(self.bbox.ix, Interval::new(u, c)),
                BBox::new(self.bbox.ix, Interval::new(c, l)),
            )
        };

        self.children = Some(Box::new([
            Self::with_ratio(first, self.ideal_width_to_height_ratio),
            Self::with_ratio(second, self.ideal_width_to_height_ratio),
        ]));

        for (item, bbox) in items {
            self.insert_unchecked(item, bbox);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn unit_box(x: f64, y: f64) -> BBox {
        BBox::new(Interval::new(x, x + 1.0), Interval::new(y, y + 1.0))
    }

    #[test]
    fn ez_box_insert_and_query() -> crate::Result<()> {
        let bounds = BBox::new(Interval::new(0.0, 100.0), Interval::new(0.0, 100.0));
        let mut index = EzBox::new(bounds);

        for i in 0..20 {
            #[allow(clippy::cast_lossless)]
            index.insert(i, unit_box((i * 4) as f64, 10.0))?;
        }

        assert_eq!(index.items().len(), 20);

        let query = BBox::new(Interval::new(0.0, 10.0), Interval::new(0.0, 100.0));
        let mut contained = index.items_contained_in(&query);
        contained.sort_unstable();
        assert_eq!(contained, vec![0, 1, 2]);

        // Item 2 spans x in [8, 9], item 3 spans [12, 13]
        let query = BBox::new(Interval::new(9.0, 12.0), Interval::new(0.0, 100.0));
        let mut touching = index.items_intersecting(&query);
        touching.sort_unstable();
        assert_eq!(touching, vec![2, 3]);

        Ok(())
    }

    #[test]
    fn ez_box_out_of_bounds() {
        let bounds = BBox::new(Interval::new(0.0, 10.0), Interval::new(0.0, 10.0));
        let mut index = EzBox::new(bounds);
        assert!(matches!(
            index.insert(0, unit_box(50.0, 50.0)),
            Err(Error::OutOfBounds)
        ));
    }

    #[test]
    fn ez_box_straddlers_not_lost_after_split() -> crate::Result<()> {
        let bounds = BBox::new(Interval::new(0.0, 100.0), Interval::new(0.0, 100.0));
        let mut index = EzBox::new(bounds);

        // An item crossing the middle of the region straddles any split line.
        index.insert(
            999,
            BBox::new(Interval::new(40.0, 60.0), Interval::new(40.0, 60.0)),
        )?;

        for i in 0..20 {
            #[allow(clippy::cast_lossless)]
            index.insert(i, unit_box((i * 4) as f64, 80.0))?;
        }

        let query = BBox::new(Interval::new(45.0, 55.0), Interval::new(45.0, 55.0));
        assert_eq!(index.items_intersecting(&query), vec![999]);

        Ok(())
    }
}
