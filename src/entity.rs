// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::geometry::BBox;

/// Index of a word in its document's word arena
///
/// Two `WordId`s are equal exactly when they name the same typeset word on
/// the page, so identity comparisons (word-set disjointness, impingement
/// exclusion) are index comparisons.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct WordId(pub(crate) u32);

/// Index of an entity in its document's entity pool
///
/// Entities are compared by identity, not value: two entities with identical
/// text are distinct if they came from different positions.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct EntityId(pub(crate) u32);

/// A positioned word, the smallest unit of OCR output
#[derive(Clone, Debug)]
pub struct Word {
    /// Bounding box in document pixels
    pub bbox: BBox,

    /// The word text
    pub text: String,
}

/// Discriminates the [`Entity`] variants
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[allow(missing_docs)]
pub enum EntityKind {
    Word,
    Page,
    Text,
    Cluster,
    Date,
    DollarAmount,
    Number,
    Integer,
    Time,
    PersonName,
    Address,
    TableCell,
    TableRow,
    Table,
    NamedEntity,
}

/// A positioned, typed piece of a document
///
/// Entities reference their constituent words and sub-entities through arena
/// indices owned by the [`Document`](crate::Document). They are immutable
/// after document construction.
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub enum Entity {
    /// A single word
    Word { bbox: BBox, word: WordId },

    /// A page region; pages have no children
    Page { bbox: BBox, page_number: u32 },

    /// A sequence of one or more contiguous words
    Text {
        bbox: BBox,
        text: String,
        words: Box<[WordId]>,
        maximality_score: Option<f64>,
        ocr_score: Option<f64>,
    },

    /// A multiline group of phrases
    Cluster {
        bbox: BBox,
        text: String,
        lines: Box<[EntityId]>,
        label: Option<String>,
    },

    Date {
        bbox: BBox,
        text: String,
        words: Box<[WordId]>,
        likeness_score: Option<f64>,
    },

    DollarAmount {
        bbox: BBox,
        text: String,
        words: Box<[WordId]>,
        units: Option<String>,
        likeness_score: Option<f64>,
    },

    Number {
        bbox: BBox,
        text: String,
        words: Box<[WordId]>,
        value: Option<f64>,
    },

    Integer {
        bbox: BBox,
        text: String,
        words: Box<[WordId]>,
        value: Option<i64>,
    },

    Time {
        bbox: BBox,
        text: String,
        words: Box<[WordId]>,
        value: Option<i64>,
        likeness_score: Option<f64>,
    },

    PersonName {
        bbox: BBox,
        text: String,
        name_parts: Box<[EntityId]>,
        likeness_score: Option<f64>,
    },

    Address {
        bbox: BBox,
        text: String,
        lines: Box<[EntityId]>,
        address_parts: Box<[(String, String)]>,
        likeness_score: Option<f64>,
    },

    TableCell { bbox: BBox, content: Box<[EntityId]> },

    TableRow { bbox: BBox, cells: Box<[EntityId]> },

    Table { bbox: BBox, rows: Box<[EntityId]> },

    NamedEntity {
        bbox: BBox,
        text: String,
        words: Box<[WordId]>,
        value: Option<String>,
        label: Option<String>,
    },
}

impl Entity {
    /// Returns the bounding box.
    #[must_use]
    pub fn bbox(&self) -> BBox {
        match self {
            Self::Word { bbox, .. }
            | Self::Page { bbox, .. }
            | Self::Text { bbox, .. }
            | Self::Cluster { bbox, .. }
            | Self::Date { bbox, .. }
            | Self::DollarAmount { bbox, .. }
            | Self::Number { bbox, .. }
            | Self::Integer { bbox, .. }
            | Self::Time { bbox, .. }
            | Self::PersonName { bbox, .. }
            | Self::Address { bbox, .. }
            | Self::TableCell { bbox, .. }
            | Self::TableRow { bbox, .. }
            | Self::Table { bbox, .. }
            | Self::NamedEntity { bbox, .. } => *bbox,
        }
    }

    /// Returns the variant tag.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Word { .. } => EntityKind::Word,
            Self::Page { .. } => EntityKind::Page,
            Self::Text { .. } => EntityKind::Text,
            Self::Cluster { .. } => EntityKind::Cluster,
            Self::Date { .. } => EntityKind::Date,
            Self::DollarAmount { .. } => EntityKind::DollarAmount,
            Self::Number { .. } => EntityKind::Number,
            Self::Integer { .. } => EntityKind::Integer,
            Self::Time { .. } => EntityKind::Time,
            Self::PersonName { .. } => EntityKind::PersonName,
            Self::Address { .. } => EntityKind::Address,
            Self::TableCell { .. } => EntityKind::TableCell,
            Self::TableRow { .. } => EntityKind::TableRow,
            Self::Table { .. } => EntityKind::Table,
            Self::NamedEntity { .. } => EntityKind::NamedEntity,
        }
    }

    /// Returns the entity text, if this variant carries any.
    ///
    /// `Word` entities resolve their text through the document arena, see
    /// [`Document::entity_text`](crate::Document::entity_text).
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. }
            | Self::Cluster { text, .. }
            | Self::Date { text, .. }
            | Self::DollarAmount { text, .. }
            | Self::Number { text, .. }
            | Self::Integer { text, .. }
            | Self::Time { text, .. }
            | Self::PersonName { text, .. }
            | Self::Address { text, .. }
            | Self::NamedEntity { text, .. } => Some(text),
            Self::Word { .. }
            | Self::Page { .. }
            | Self::TableCell { .. }
            | Self::TableRow { .. }
            | Self::Table { .. } => None,
        }
    }

    /// The likeness score, for the typed variants that carry one.
    #[must_use]
    pub fn likeness_score(&self) -> Option<f64> {
        match self {
            Self::Date { likeness_score, .. }
            | Self::DollarAmount { likeness_score, .. }
            | Self::Time { likeness_score, .. }
            | Self::PersonName { likeness_score, .. }
            | Self::Address { likeness_score, .. } => *likeness_score,
            _ => None,
        }
    }

    /// The maximality score of a `Text` entity.
    #[must_use]
    pub fn maximality_score(&self) -> Option<f64> {
        match self {
            Self::Text {
                maximality_score, ..
            } => *maximality_score,
            _ => None,
        }
    }

    /// Line count for multiline variants; anything else counts as one line.
    #[must_use]
    pub fn line_count(&self) -> usize {
        match self {
            Self::Cluster { lines, .. } | Self::Address { lines, .. } => lines.len(),
            _ => 1,
        }
    }

    /// Words this entity references directly (not through sub-entities).
    #[must_use]
    pub(crate) fn direct_words(&self) -> &[WordId] {
        match self {
            Self::Word { word, .. } => std::slice::from_ref(word),
            Self::Text { words, .. }
            | Self::Date { words, .. }
            | Self::DollarAmount { words, .. }
            | Self::Number { words, .. }
            | Self::Integer { words, .. }
            | Self::Time { words, .. }
            | Self::NamedEntity { words, .. } => words,
            _ => &[],
        }
    }

    /// Sub-entities this entity spans.
    #[must_use]
    pub(crate) fn child_entities(&self) -> &[EntityId] {
        match self {
            Self::Cluster { lines, .. } | Self::Address { lines, .. } => lines,
            Self::PersonName { name_parts, .. } => name_parts,
            Self::TableCell { content, .. } => content,
            Self::TableRow { cells, .. } => cells,
            Self::Table { rows, .. } => rows,
            _ => &[],
        }
    }
}
