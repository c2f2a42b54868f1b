// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::entity::EntityKind;
use crate::extraction::Field;
use crate::predicate::Degree;

/// Represents errors that can occur while building or running an extraction tree
#[derive(Debug)]
pub enum Error {
    /// A rule or operation referenced a field not present in the enclosing node
    UnrecognizedField(Field),

    /// Two nodes or extractions unexpectedly share a field
    OverlappingFields(String),

    /// A required field was absent
    MissingField(Field),

    /// A predicate was applied to the wrong number of fields or entities
    Degree {
        /// The degree the predicate accepts
        expected: Degree,

        /// The number of fields or entities it was given
        got: usize,
    },

    /// A numeric parameter was out of range (negative tolerance, non-positive
    /// peek distance, ...)
    InvalidParameter(String),

    /// A predicate was handed an entity of a variant it cannot score
    EntityType {
        /// The entity variant the predicate requires
        expected: EntityKind,

        /// The entity variant it was given
        got: EntityKind,
    },

    /// An item was inserted into a spatial index outside the index bounds
    OutOfBounds,

    /// The per-document deadline was exceeded; partial results are preserved
    Timeout,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExtractionTreeError: {self:?}")
    }
}

impl std::error::Error for Error {}

/// Extraction result
pub type Result<T> = std::result::Result<T, Error>;
