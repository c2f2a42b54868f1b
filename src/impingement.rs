// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::geometry::Interval;
use crate::{Error, Result};

/// Tracks how opaque each part of a gap interval is
///
/// The profile starts as one fully transparent interval. As overlapping
/// rectangles are incorporated (projected onto the gap axis), the interval is
/// split pointwise, always keeping the maximum opacity seen in each
/// subdivision. The total impingement is the length-weighted mean opacity.
pub struct ImpingementProfile {
    interval: Interval,
    // Disjoint subdivisions covering `interval`, each with its opacity
    opacities: Vec<(Interval, f64)>,
}

impl ImpingementProfile {
    /// Creates a fully transparent profile over the given interval.
    ///
    /// # Errors
    ///
    /// Fails if the interval is invalid or empty.
    pub fn new(interval: Interval) -> Result<Self> {
        if !interval.valid() {
            return Err(Error::InvalidParameter(format!(
                "impingement interval {interval:?} cannot be invalid"
            )));
        }
        if !interval.non_empty() {
            return Err(Error::InvalidParameter(format!(
                "impingement interval {interval:?} cannot be empty"
            )));
        }
        Ok(Self {
            interval,
            opacities: vec![(interval, 0.0)],
        })
    }

    /// The length-weighted mean opacity over the whole interval.
    #[must_use]
    pub fn total_impingement(&self) -> f64 {
        self.opacities
            .iter()
            .map(|(i, opacity)| opacity * i.length())
            .sum::<f64>()
            / self.interval.length()
    }

    /// Incorporates an overlapping rectangle's projection with the given
    /// opacity, splitting subdivisions as needed.
    ///
    /// # Errors
    ///
    /// Fails if the opacity is outside `[0, 1]` or the interval is invalid.
    pub fn incorporate_subdivision(&mut self, i: Interval, new_opacity: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&new_opacity) {
            return Err(Error::InvalidParameter(format!(
                "subdivision opacity must be in [0,1], not {new_opacity}"
            )));
        }
        if !i.valid() {
            return Err(Error::InvalidParameter(format!(
                "subdivision {i:?} cannot be invalid"
            )));
        }
        if !i.non_empty() {
            // A zero-length subdivision cannot contribute to impingement.
            return Ok(());
        }

        let mut next = Vec::with_capacity(self.opacities.len() + 2);

        for &(subdivision, old_opacity) in &self.opacities {
            if !i.intersects_interval(&subdivision) || new_opacity <= old_opacity {
                next.push((subdivision, old_opacity));
                continue;
            }

            if i.a <= subdivision.a && i.b >= subdivision.b {
                // new: -----
                // old:  ---
                next.push((subdivision, new_opacity));
            } else if i.a <= subdivision.a {
                // ----
                //   ----
                next.push((Interval::new(subdivision.a, i.b), new_opacity));
                next.push((Interval::new(i.b, subdivision.b), old_opacity));
            } else if i.b >= subdivision.b {
                //   ----
                // ----
                next.push((Interval::new(subdivision.a, i.a), old_opacity));
                next.push((Interval::new(i.a, subdivision.b), new_opacity));
            } else {
                //  ---
                // -----
                next.push((Interval::new(subdivision.a, i.a), old_opacity));
                next.push((Interval::new(i.a, i.b), new_opacity));
                next.push((Interval::new(i.b, subdivision.b), old_opacity));
            }
        }

        self.opacities = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn transparent_profile() -> crate::Result<()> {
        let profile = ImpingementProfile::new(Interval::new(0.0, 10.0))?;
        assert!(profile.total_impingement().abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn single_subdivision() -> crate::Result<()> {
        let mut profile = ImpingementProfile::new(Interval::new(0.0, 10.0))?;
        profile.incorporate_subdivision(Interval::new(0.0, 5.0), 1.0)?;
        assert!((profile.total_impingement() - 0.5).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn max_opacity_wins() -> crate::Result<()> {
        let mut profile = ImpingementProfile::new(Interval::new(0.0, 10.0))?;
        profile.incorporate_subdivision(Interval::new(0.0, 10.0), 0.2)?;
        profile.incorporate_subdivision(Interval::new(0.0, 5.0), 0.6)?;
        // Left half 0.6, right half 0.2
        assert!((profile.total_impingement() - 0.4).abs() < 1e-9);

        // A weaker overlay changes nothing
        profile.incorporate_subdivision(Interval::new(0.0, 10.0), 0.1)?;
        assert!((profile.total_impingement() - 0.4).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn interior_subdivision_splits() -> crate::Result<()> {
        let mut profile = ImpingementProfile::new(Interval::new(0.0, 10.0))?;
        profile.incorporate_subdivision(Interval::new(4.0, 6.0), 1.0)?;
        assert!((profile.total_impingement() - 0.2).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn invalid_inputs() -> crate::Result<()> {
        assert!(ImpingementProfile::new(Interval::new(3.0, 3.0)).is_err());
        let mut profile = ImpingementProfile::new(Interval::new(0.0, 1.0))?;
        assert!(profile
            .incorporate_subdivision(Interval::new(0.0, 1.0), 1.5)
            .is_err());
        Ok(())
    }
}
