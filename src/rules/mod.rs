// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The built-in rule predicates.
//!
//! Each submodule groups predicates of one flavour, plus the lowercase
//! builder functions that are the idiomatic way to construct them.

pub mod impingement;
pub mod label;
pub mod logical;
pub mod numeric;
pub mod semantic;
pub mod spatial;
pub mod tabular;
pub mod textual;

use crate::entity::EntityId;
use crate::predicate::Degree;
use crate::{Error, Result};

pub(crate) fn expect_one(entities: &[EntityId]) -> Result<EntityId> {
    match entities {
        [e] => Ok(*e),
        _ => Err(Error::Degree {
            expected: Degree::Fixed(1),
            got: entities.len(),
        }),
    }
}

pub(crate) fn expect_two(entities: &[EntityId]) -> Result<(EntityId, EntityId)> {
    match entities {
        [e1, e2] => Ok((*e1, *e2)),
        _ => Err(Error::Degree {
            expected: Degree::Fixed(2),
            got: entities.len(),
        }),
    }
}
