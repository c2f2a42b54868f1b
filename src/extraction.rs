// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::entity::EntityId;
use crate::{Error, Result};
use std::collections::BTreeSet;
use std::sync::Arc;

/// An ID for "something we wish to extract" from a document
///
/// A field is just a name for a thing-to-be-extracted, the analog of a
/// variable in a modeling language. An extraction is a simultaneous
/// assignment from a set of fields to entities in a document.
pub type Field = Arc<str>;

/// A `(field, entity)` pair
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExtractionPoint {
    /// The assigned field
    pub field: Field,

    /// The entity it is assigned to
    pub entity: EntityId,
}

/// An assignment from some fields to some entities in some document
///
/// No field appears twice. The empty extraction is permitted and
/// distinguished.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Extraction {
    // Sorted by field name
    points: Vec<ExtractionPoint>,
}

impl Extraction {
    /// The empty extraction.
    #[must_use]
    pub fn empty() -> Self {
        Self { points: Vec::new() }
    }

    /// Builds an extraction from field/entity pairs.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::OverlappingFields`] if a field appears twice.
    pub fn from_points(points: impl IntoIterator<Item = (Field, EntityId)>) -> Result<Self> {
        let mut points: Vec<ExtractionPoint> = points
            .into_iter()
            .map(|(field, entity)| ExtractionPoint { field, entity })
            .collect();
        points.sort_by(|p, q| p.field.cmp(&q.field));

        for pair in points.windows(2) {
            if pair[0].field == pair[1].field {
                return Err(Error::OverlappingFields(format!(
                    "field {} appears twice",
                    pair[0].field
                )));
            }
        }

        Ok(Self { points })
    }

    /// Returns `true` if no field is assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of assigned fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// The points of this extraction, sorted by field name.
    #[must_use]
    pub fn points(&self) -> &[ExtractionPoint] {
        &self.points
    }

    /// Iterates over the assigned fields, in sorted order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.points.iter().map(|p| &p.field)
    }

    /// The assigned fields as a set.
    #[must_use]
    pub fn field_set(&self) -> BTreeSet<Field> {
        self.fields().cloned().collect()
    }

    /// Returns `true` if the field is assigned.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// The entity this field is assigned to, if any.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<EntityId> {
        self.points
            .binary_search_by(|p| (*p.field).cmp(field))
            .ok()
            .map(|i| self.points[i].entity)
    }

    /// Combines several extractions into one.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::OverlappingFields`] if the inputs share any field.
    pub fn merge<'a>(extractions: impl IntoIterator<Item = &'a Self>) -> Result<Self> {
        Self::from_points(
            extractions
                .into_iter()
                .flat_map(|e| e.points.iter())
                .map(|p| (p.field.clone(), p.entity)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn ext(pairs: &[(&str, u32)]) -> Extraction {
        Extraction::from_points(
            pairs
                .iter()
                .map(|(f, i)| (Field::from(*f), EntityId(*i))),
        )
        .expect("valid extraction")
    }

    #[test]
    fn extraction_lookup() {
        let e = ext(&[("banana", 2), ("apple", 1)]);
        assert_eq!(e.get("apple"), Some(EntityId(1)));
        assert_eq!(e.get("banana"), Some(EntityId(2)));
        assert_eq!(e.get("cherry"), None);
        assert!(e.contains("apple"));
        assert_eq!(e.len(), 2);

        // Points come out sorted by field
        let fields: Vec<&str> = e.fields().map(|f| &**f).collect();
        assert_eq!(fields, vec!["apple", "banana"]);
    }

    #[test]
    fn extraction_merge() -> crate::Result<()> {
        let a = ext(&[("apple", 1)]);
        let b = ext(&[("banana", 2)]);
        let merged = Extraction::merge([&a, &b])?;
        assert_eq!(merged.len(), 2);

        let overlapping = ext(&[("apple", 3)]);
        assert!(matches!(
            Extraction::merge([&a, &overlapping]),
            Err(Error::OverlappingFields(_))
        ));

        Ok(())
    }

    #[test]
    fn duplicate_fields_rejected() {
        assert!(matches!(
            Extraction::from_points([
                (Field::from("f"), EntityId(0)),
                (Field::from("f"), EntityId(1)),
            ]),
            Err(Error::OverlappingFields(_))
        ));
    }
}
