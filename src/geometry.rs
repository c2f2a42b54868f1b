// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// A closed real interval `[a, b]`
///
/// Compared by value and freely copyable. An interval with `a > b` is
/// *invalid*; most constructors return `None` instead of producing one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Interval {
    /// Lower end
    pub a: f64,

    /// Upper end
    pub b: f64,
}

impl Interval {
    /// Creates a new interval without checking its orientation.
    #[must_use]
    pub fn new(a: f64, b: f64) -> Self {
        Self { a, b }
    }

    /// Creates a new interval, or `None` if `a > b`.
    #[must_use]
    pub fn build(a: f64, b: f64) -> Option<Self> {
        (a <= b).then_some(Self { a, b })
    }

    /// Returns `b - a`.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.b - self.a
    }

    /// Returns the midpoint.
    #[must_use]
    pub fn center(&self) -> f64 {
        (self.a + self.b) / 2.0
    }

    /// Returns `true` if `a <= b`.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.a <= self.b
    }

    /// Returns `true` if the interval has positive length.
    #[must_use]
    pub fn non_empty(&self) -> bool {
        self.length() > 0.0
    }

    /// Returns `true` if `x` falls within this interval.
    #[must_use]
    pub fn contains(&self, x: f64) -> bool {
        self.a <= x && x <= self.b
    }

    /// Returns `true` if `other` is fully contained in this interval.
    #[must_use]
    pub fn contains_interval(&self, other: &Self) -> bool {
        self.a <= other.a && other.a <= other.b && other.b <= self.b
    }

    /// Returns `true` if the intervals overlap at least in a point.
    #[must_use]
    pub fn intersects_interval(&self, other: &Self) -> bool {
        !(self.b < other.a || other.b < self.a)
    }

    /// The percentage range of `self` which `other` overlaps.
    #[must_use]
    pub fn percentages_overlapping(&self, other: &Self) -> Option<Self> {
        let intersection = Self::intersection([*self, *other])?;
        if self.length() == 0.0 {
            return Some(Self::new(0.0, 1.0));
        }
        Some(Self::new(
            (intersection.a - self.a) / self.length(),
            (intersection.b - self.a) / self.length(),
        ))
    }

    /// Returns the fraction of `other` contained in `self`.
    #[must_use]
    pub fn contains_percentage_of(&self, other: &Self) -> f64 {
        if other.length() == 0.0 {
            return if self.contains(other.a) { 1.0 } else { 0.0 };
        }
        Self::intersection([*self, *other])
            .map_or(0.0, |intersection| intersection.length() / other.length())
    }

    /// Shrinks the interval by `amount` on both ends, or `None` if it would
    /// become empty.
    #[must_use]
    pub fn eroded(&self, amount: f64) -> Option<Self> {
        let result = Self::new(self.a + amount, self.b - amount);
        result.non_empty().then_some(result)
    }

    /// Grows the interval by `amount` on both ends.
    #[must_use]
    pub fn expanded(&self, amount: f64) -> Self {
        Self::new(self.a - amount, self.b + amount)
    }

    /// The smallest interval containing all given points.
    ///
    /// Returns `None` for an empty input.
    pub fn spanning_points(xs: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut any = false;

        for x in xs {
            any = true;
            min = min.min(x);
            max = max.max(x);
        }

        any.then_some(Self::new(min, max))
    }

    /// The smallest interval containing all given intervals.
    pub fn spanning(intervals: impl IntoIterator<Item = Self>) -> Option<Self> {
        Self::spanning_points(intervals.into_iter().flat_map(|i| [i.a, i.b]))
    }

    /// The intersection of all given intervals, or `None` when they are
    /// disjoint (or the input is empty).
    pub fn intersection(intervals: impl IntoIterator<Item = Self>) -> Option<Self> {
        let mut iter = intervals.into_iter();
        let first = iter.next()?;
        let (mut a, mut b) = (first.a, first.b);

        for i in iter {
            a = a.max(i.a);
            b = b.min(i.b);
        }

        Self::build(a, b)
    }
}

/// A point in document coordinates
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    /// Horizontal coordinate
    pub x: f64,

    /// Vertical coordinate
    pub y: f64,
}

impl Point {
    /// Euclidean distance between two points.
    #[must_use]
    pub fn distance(p1: Self, p2: Self) -> f64 {
        ((p2.x - p1.x).powi(2) + (p2.y - p1.y).powi(2)).sqrt()
    }
}

/// An axis-aligned bounding box, as two closed intervals
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BBox {
    /// Horizontal extent
    pub ix: Interval,

    /// Vertical extent
    pub iy: Interval,
}

impl BBox {
    /// Creates a new bounding box.
    #[must_use]
    pub fn new(ix: Interval, iy: Interval) -> Self {
        Self { ix, iy }
    }

    /// Creates a new bounding box, or `None` if either interval is absent.
    #[must_use]
    pub fn build(ix: Option<Interval>, iy: Option<Interval>) -> Option<Self> {
        Some(Self {
            ix: ix?,
            iy: iy?,
        })
    }

    /// Returns the center point.
    #[must_use]
    pub fn center(&self) -> Point {
        Point {
            x: self.ix.center(),
            y: self.iy.center(),
        }
    }

    /// Returns the width.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.ix.length()
    }

    /// Returns the height.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.iy.length()
    }

    /// Returns the area.
    #[must_use]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Returns `true` if both intervals are valid.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.ix.valid() && self.iy.valid()
    }

    /// Returns `true` if the box has positive area.
    #[must_use]
    pub fn non_empty(&self) -> bool {
        self.ix.non_empty() && self.iy.non_empty()
    }

    /// Returns `true` if the point falls within this box.
    #[must_use]
    pub fn contains_point(&self, p: Point) -> bool {
        self.ix.contains(p.x) && self.iy.contains(p.y)
    }

    /// The four corners, counter-clockwise from the top-left.
    #[must_use]
    pub fn corners(&self) -> [Point; 4] {
        [
            Point {
                x: self.ix.a,
                y: self.iy.a,
            },
            Point {
                x: self.ix.a,
                y: self.iy.b,
            },
            Point {
                x: self.ix.b,
                y: self.iy.b,
            },
            Point {
                x: self.ix.b,
                y: self.iy.a,
            },
        ]
    }

    /// Returns `true` if `other` is fully contained in this box.
    #[must_use]
    pub fn contains_bbox(&self, other: &Self) -> bool {
        self.ix.contains_interval(&other.ix) && self.iy.contains_interval(&other.iy)
    }

    /// Returns `true` if the boxes overlap at least in a point.
    #[must_use]
    pub fn intersects_bbox(&self, other: &Self) -> bool {
        self.ix.intersects_interval(&other.ix) && self.iy.intersects_interval(&other.iy)
    }

    /// The percentage ranges of `self` which `other` overlaps.
    ///
    /// # Examples
    ///
    /// ```
    /// # use extraction_tree::{BBox, Interval};
    /// let box1 = BBox::new(Interval::new(1.0, 3.0), Interval::new(2.0, 6.0));
    /// let box2 = BBox::new(Interval::new(0.0, 2.0), Interval::new(3.0, 5.0));
    /// let overlap = box1.percentages_overlapping(&box2).unwrap();
    /// assert_eq!(overlap, BBox::new(Interval::new(0.0, 0.5), Interval::new(0.25, 0.75)));
    /// ```
    #[must_use]
    pub fn percentages_overlapping(&self, other: &Self) -> Option<Self> {
        Self::build(
            self.ix.percentages_overlapping(&other.ix),
            self.iy.percentages_overlapping(&other.iy),
        )
    }

    /// The smallest box containing all given points.
    pub fn spanning_points(ps: impl IntoIterator<Item = Point>) -> Option<Self> {
        let ps: Vec<Point> = ps.into_iter().collect();
        Self::build(
            Interval::spanning_points(ps.iter().map(|p| p.x)),
            Interval::spanning_points(ps.iter().map(|p| p.y)),
        )
    }

    /// The intersection of all given boxes, or `None` when they are disjoint
    /// (or the input is empty).
    pub fn intersection(bs: impl IntoIterator<Item = Self>) -> Option<Self> {
        let bs: Vec<Self> = bs.into_iter().collect();
        if bs.is_empty() {
            return None;
        }
        Self::build(
            Interval::intersection(bs.iter().map(|b| b.ix)),
            Interval::intersection(bs.iter().map(|b| b.iy)),
        )
    }

    /// The smallest box containing all given boxes (their union).
    pub fn union(bs: impl IntoIterator<Item = Self>) -> Option<Self> {
        Self::spanning_points(bs.into_iter().flat_map(|b| b.corners()))
    }

    /// The gap distance between two boxes (0 when they touch or overlap).
    #[must_use]
    pub fn distance(b1: &Self, b2: &Self) -> f64 {
        let ix = Interval::new(b1.ix.a.min(b2.ix.a), b1.ix.b.max(b2.ix.b));
        let iy = Interval::new(b1.iy.a.min(b2.iy.a), b1.iy.b.max(b2.iy.b));
        let inner_width = (ix.length() - b1.ix.length() - b2.ix.length()).max(0.0);
        let inner_height = (iy.length() - b1.iy.length() - b2.iy.length()).max(0.0);
        (inner_width.powi(2) + inner_height.powi(2)).sqrt()
    }

    /// The fraction of this box's area contained in `other`.
    #[must_use]
    pub fn percentage_contained_in(&self, other: &Self) -> f64 {
        Self::intersection([*self, *other])
            .map_or(0.0, |intersection| intersection.area() / self.area())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn interval_intersection() {
        let a = Interval::new(0.0, 5.0);
        let b = Interval::new(3.0, 8.0);
        assert_eq!(
            Interval::intersection([a, b]),
            Some(Interval::new(3.0, 5.0))
        );

        let c = Interval::new(6.0, 8.0);
        assert_eq!(Interval::intersection([a, c]), None);
        assert_eq!(Interval::intersection([]), None);
    }

    #[test]
    fn interval_spanning() {
        let intervals = [Interval::new(2.0, 4.0), Interval::new(0.0, 1.0)];
        assert_eq!(
            Interval::spanning(intervals),
            Some(Interval::new(0.0, 4.0))
        );
    }

    #[test]
    fn interval_erosion() {
        let i = Interval::new(0.0, 10.0);
        assert_eq!(i.eroded(2.0), Some(Interval::new(2.0, 8.0)));
        assert_eq!(i.eroded(5.0), None);
        assert_eq!(i.expanded(1.0), Interval::new(-1.0, 11.0));
    }

    #[test]
    fn interval_contains_percentage() {
        let i = Interval::new(0.0, 10.0);
        assert!((i.contains_percentage_of(&Interval::new(5.0, 15.0)) - 0.5).abs() < 1e-9);
        assert!((i.contains_percentage_of(&Interval::new(2.0, 4.0)) - 1.0).abs() < 1e-9);
        assert!((i.contains_percentage_of(&Interval::new(20.0, 30.0))).abs() < 1e-9);
    }

    #[test]
    fn bbox_union_and_intersection() {
        let b1 = BBox::new(Interval::new(0.0, 2.0), Interval::new(0.0, 2.0));
        let b2 = BBox::new(Interval::new(1.0, 3.0), Interval::new(1.0, 3.0));

        assert_eq!(
            BBox::union([b1, b2]),
            Some(BBox::new(Interval::new(0.0, 3.0), Interval::new(0.0, 3.0)))
        );
        assert_eq!(
            BBox::intersection([b1, b2]),
            Some(BBox::new(Interval::new(1.0, 2.0), Interval::new(1.0, 2.0)))
        );
        assert_eq!(BBox::union([]), None);
    }

    #[test]
    fn bbox_containment() {
        let outer = BBox::new(Interval::new(0.0, 10.0), Interval::new(0.0, 10.0));
        let inner = BBox::new(Interval::new(2.0, 4.0), Interval::new(2.0, 4.0));
        assert!(outer.contains_bbox(&inner));
        assert!(!inner.contains_bbox(&outer));
        assert!(outer.intersects_bbox(&inner));
    }

    #[test]
    fn bbox_distance() {
        let b1 = BBox::new(Interval::new(0.0, 1.0), Interval::new(0.0, 1.0));
        let b2 = BBox::new(Interval::new(4.0, 5.0), Interval::new(0.0, 1.0));
        assert!((BBox::distance(&b1, &b2) - 3.0).abs() < 1e-9);

        let b3 = BBox::new(Interval::new(0.5, 2.0), Interval::new(0.0, 1.0));
        assert!(BBox::distance(&b1, &b3).abs() < 1e-9);
    }
}
