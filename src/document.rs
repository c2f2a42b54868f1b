// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::entity::{Entity, EntityId, EntityKind, Word, WordId};
use crate::ez_box::EzBox;
use crate::geometry::{BBox, Interval};
use crate::{Error, Result};
use std::cell::OnceCell;

/// A spatial index over items keyed by a bounding box inside one document's
/// bounds
///
/// Thin wrapper around [`EzBox`] that roots the partition at the document
/// bbox on first insertion.
pub struct EzDocRegion<T> {
    doc_bbox: BBox,
    root: Option<EzBox<T>>,
}

impl<T: Clone> EzDocRegion<T> {
    /// Creates an empty index over the given document bounds.
    #[must_use]
    pub fn new(doc_bbox: BBox) -> Self {
        Self {
            doc_bbox,
            root: None,
        }
    }

    /// Inserts an item under the given bounding box.
    ///
    /// # Errors
    ///
    /// Fails if the bbox lies outside the document bounds.
    pub fn insert(&mut self, item: T, bbox: BBox) -> Result<()> {
        self.root
            .get_or_insert_with(|| EzBox::new(self.doc_bbox))
            .insert(item, bbox)
    }

    /// Returns all items.
    #[must_use]
    pub fn items(&self) -> Vec<T> {
        self.root.as_ref().map(EzBox::items).unwrap_or_default()
    }

    /// Returns all items whose bbox is contained in the query region.
    #[must_use]
    pub fn items_contained_in(&self, query: &BBox) -> Vec<T> {
        self.root
            .as_ref()
            .map(|r| r.items_contained_in(query))
            .unwrap_or_default()
    }

    /// Returns all items whose bbox intersects the query region.
    #[must_use]
    pub fn items_intersecting(&self, query: &BBox) -> Vec<T> {
        self.root
            .as_ref()
            .map(|r| r.items_intersecting(query))
            .unwrap_or_default()
    }
}

/// A collection of positioned, typed entities, read-only once constructed
///
/// The document owns every [`Word`] and [`Entity`] in two arenas; everything
/// else refers to them by [`WordId`] / [`EntityId`]. Derived data (pages,
/// median line height, the single-word spatial index) is computed once on
/// first use and immutable thereafter.
pub struct Document {
    name: String,
    bbox: BBox,
    words: Vec<Word>,
    entities: Vec<Entity>,

    pages: OnceCell<Vec<EntityId>>,
    median_line_height: OnceCell<f64>,
    word_index: OnceCell<EzDocRegion<EntityId>>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("name", &self.name)
            .field("bbox", &self.bbox)
            .field("entities", &self.entities.len())
            .finish_non_exhaustive()
    }
}

impl Document {
    /// Returns the document name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the document bounding box.
    #[must_use]
    pub fn bbox(&self) -> BBox {
        self.bbox
    }

    /// Resolves an entity id.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> &Entity {
        &self.entities[id.0 as usize]
    }

    /// Resolves a word id.
    #[must_use]
    pub fn word(&self, id: WordId) -> &Word {
        &self.words[id.0 as usize]
    }

    /// Iterates over all entities in pool order.
    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities
            .iter()
            .enumerate()
            .map(|(i, e)| (EntityId(u32::try_from(i).unwrap_or(u32::MAX)), e))
    }

    /// Iterates over the ids of all entities of the given kind.
    pub fn entities_of_kind(&self, kind: EntityKind) -> impl Iterator<Item = EntityId> + '_ {
        self.entities()
            .filter(move |(_, e)| e.kind() == kind)
            .map(|(id, _)| id)
    }

    /// Returns the entity's text.
    ///
    /// Unlike [`Entity::text`], this resolves `Word` entities through the
    /// word arena.
    #[must_use]
    pub fn entity_text(&self, id: EntityId) -> Option<&str> {
        match self.entity(id) {
            Entity::Word { word, .. } => Some(&self.word(*word).text),
            e => e.text(),
        }
    }

    /// All words spanned by this entity, recursively (the leaves of the
    /// entity DAG).
    #[must_use]
    pub fn entity_words(&self, id: EntityId) -> Vec<WordId> {
        let mut out = Vec::new();
        self.collect_words(id, &mut out);
        out
    }

    fn collect_words(&self, id: EntityId, out: &mut Vec<WordId>) {
        let entity = self.entity(id);
        out.extend_from_slice(entity.direct_words());
        for child in entity.child_entities() {
            self.collect_words(*child, out);
        }
    }

    /// The document's pages, in pool order.
    #[must_use]
    pub fn pages(&self) -> &[EntityId] {
        self.pages.get_or_init(|| {
            self.entities_of_kind(EntityKind::Page).collect()
        })
    }

    /// The pages whose bbox intersects the given bbox.
    #[must_use]
    pub fn pages_intersecting(&self, bbox: &BBox) -> Vec<EntityId> {
        self.pages()
            .iter()
            .copied()
            .filter(|p| self.entity(*p).bbox().intersects_bbox(bbox))
            .collect()
    }

    /// The page numbers of all pages intersecting the given bbox.
    #[must_use]
    pub fn page_numbers_intersecting(&self, bbox: &BBox) -> Vec<u32> {
        self.pages_intersecting(bbox)
            .into_iter()
            .filter_map(|p| match self.entity(p) {
                Entity::Page { page_number, .. } => Some(*page_number),
                _ => None,
            })
            .collect()
    }

    /// The median height of all words in the document, in document pixels.
    ///
    /// Design-level lengths ("line heights") are multiplied by this before
    /// being compared against document coordinates.
    #[must_use]
    pub fn median_line_height(&self) -> f64 {
        *self.median_line_height.get_or_init(|| {
            let mut heights: Vec<f64> = self.words.iter().map(|w| w.bbox.height()).collect();
            if heights.is_empty() {
                return 0.0;
            }
            heights.sort_by(f64::total_cmp);
            let n = heights.len();
            if n % 2 == 0 {
                0.5 * (heights[n / 2 - 1] + heights[n / 2])
            } else {
                heights[(n - 1) / 2]
            }
        })
    }

    /// A spatial index over all single-word `Text` entities, used by the
    /// impingement rules.
    #[must_use]
    pub fn single_word_index(&self) -> &EzDocRegion<EntityId> {
        self.word_index.get_or_init(|| {
            let mut index = EzDocRegion::new(self.bbox);
            for (id, entity) in self.entities() {
                if let Entity::Text { words, bbox, .. } = entity {
                    if words.len() == 1 {
                        // Entities are contained in the document bbox by
                        // construction.
                        let _ = index.insert(id, *bbox);
                    }
                }
            }
            index
        })
    }
}

/// Assembles a [`Document`] from pages, words and derived entities
///
/// Input adapters (OCR formats, test fixtures) drive this builder; the
/// resulting document is immutable. Pages should be added before the words
/// that lie on them, so out-of-bounds words can be discarded.
pub struct DocumentBuilder {
    name: String,
    words: Vec<Word>,
    entities: Vec<Entity>,
}

impl DocumentBuilder {
    /// Starts a new document.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            words: Vec::new(),
            entities: Vec::new(),
        }
    }

    fn push(&mut self, entity: Entity) -> EntityId {
        let id = EntityId(u32::try_from(self.entities.len()).unwrap_or(u32::MAX));
        self.entities.push(entity);
        id
    }

    fn page_bboxes(&self) -> Vec<BBox> {
        self.entities
            .iter()
            .filter(|e| e.kind() == EntityKind::Page)
            .map(Entity::bbox)
            .collect()
    }

    /// Adds a page region.
    pub fn page(&mut self, bbox: BBox, page_number: u32) -> EntityId {
        self.push(Entity::Page { bbox, page_number })
    }

    /// Adds a word to the word arena.
    ///
    /// Returns `None`, with a warning, for words with empty text or words
    /// lying outside every page (when pages are present). Such words are
    /// discarded, mirroring how malformed OCR input is dropped.
    pub fn word(&mut self, bbox: BBox, text: &str) -> Option<WordId> {
        if text.is_empty() {
            log::warn!("word at {bbox:?} has empty text; discarding");
            return None;
        }

        let pages = self.page_bboxes();
        if !pages.is_empty() && !pages.iter().any(|p| p.contains_bbox(&bbox)) {
            log::warn!("word {text:?} at {bbox:?} not in page bounds; discarding");
            return None;
        }

        let id = WordId(u32::try_from(self.words.len()).unwrap_or(u32::MAX));
        self.words.push(Word {
            bbox,
            text: text.into(),
        });
        Some(id)
    }

    fn words_bbox(&self, words: &[WordId]) -> Result<BBox> {
        BBox::union(words.iter().map(|w| self.words[w.0 as usize].bbox))
            .ok_or_else(|| Error::InvalidParameter("entity needs at least one word".into()))
    }

    fn words_text(&self, words: &[WordId]) -> String {
        words
            .iter()
            .map(|w| self.words[w.0 as usize].text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn entities_bbox(&self, ids: &[EntityId]) -> Result<BBox> {
        BBox::union(ids.iter().map(|id| self.entities[id.0 as usize].bbox()))
            .ok_or_else(|| Error::InvalidParameter("entity needs at least one child".into()))
    }

    fn entities_text(&self, ids: &[EntityId], sep: &str) -> String {
        ids.iter()
            .filter_map(|id| self.entities[id.0 as usize].text())
            .collect::<Vec<_>>()
            .join(sep)
    }

    /// Adds a `Word` entity wrapping an arena word.
    pub fn word_entity(&mut self, word: WordId) -> EntityId {
        let bbox = self.words[word.0 as usize].bbox;
        self.push(Entity::Word { bbox, word })
    }

    /// Adds a `Text` entity spanning the given words.
    ///
    /// # Errors
    ///
    /// Fails if `words` is empty.
    pub fn text(
        &mut self,
        words: &[WordId],
        maximality_score: Option<f64>,
        ocr_score: Option<f64>,
    ) -> Result<EntityId> {
        let bbox = self.words_bbox(words)?;
        let text = self.words_text(words);
        Ok(self.push(Entity::Text {
            bbox,
            text,
            words: words.into(),
            maximality_score,
            ocr_score,
        }))
    }

    /// Adds a `Date` entity.
    ///
    /// # Errors
    ///
    /// Fails if `words` is empty.
    pub fn date(&mut self, words: &[WordId], likeness_score: Option<f64>) -> Result<EntityId> {
        let bbox = self.words_bbox(words)?;
        let text = self.words_text(words);
        Ok(self.push(Entity::Date {
            bbox,
            text,
            words: words.into(),
            likeness_score,
        }))
    }

    /// Adds a `DollarAmount` entity.
    ///
    /// # Errors
    ///
    /// Fails if `words` is empty.
    pub fn dollar_amount(
        &mut self,
        words: &[WordId],
        units: Option<&str>,
        likeness_score: Option<f64>,
    ) -> Result<EntityId> {
        let bbox = self.words_bbox(words)?;
        let text = self.words_text(words);
        Ok(self.push(Entity::DollarAmount {
            bbox,
            text,
            words: words.into(),
            units: units.map(Into::into),
            likeness_score,
        }))
    }

    /// Adds a `Number` entity.
    ///
    /// # Errors
    ///
    /// Fails if `words` is empty.
    pub fn number(&mut self, words: &[WordId], value: Option<f64>) -> Result<EntityId> {
        let bbox = self.words_bbox(words)?;
        let text = value.map(|v| v.to_string()).unwrap_or_default();
        Ok(self.push(Entity::Number {
            bbox,
            text,
            words: words.into(),
            value,
        }))
    }

    /// Adds an `Integer` entity.
    ///
    /// # Errors
    ///
    /// Fails if `words` is empty.
    pub fn integer(&mut self, words: &[WordId], value: Option<i64>) -> Result<EntityId> {
        let bbox = self.words_bbox(words)?;
        let text = value.map(|v| v.to_string()).unwrap_or_default();
        Ok(self.push(Entity::Integer {
            bbox,
            text,
            words: words.into(),
            value,
        }))
    }

    /// Adds a `Time` entity.
    ///
    /// # Errors
    ///
    /// Fails if `words` is empty.
    pub fn time(
        &mut self,
        words: &[WordId],
        value: Option<i64>,
        likeness_score: Option<f64>,
    ) -> Result<EntityId> {
        let bbox = self.words_bbox(words)?;
        let text = value.map(|v| v.to_string()).unwrap_or_default();
        Ok(self.push(Entity::Time {
            bbox,
            text,
            words: words.into(),
            value,
            likeness_score,
        }))
    }

    /// Adds a `Cluster` entity spanning the given phrase entities.
    ///
    /// # Errors
    ///
    /// Fails if `lines` is empty.
    pub fn cluster(&mut self, lines: &[EntityId], label: Option<&str>) -> Result<EntityId> {
        let bbox = self.entities_bbox(lines)?;
        let text = self.entities_text(lines, "\n");
        Ok(self.push(Entity::Cluster {
            bbox,
            text,
            lines: lines.into(),
            label: label.map(Into::into),
        }))
    }

    /// Adds a `PersonName` entity spanning the given phrase entities.
    ///
    /// # Errors
    ///
    /// Fails if `name_parts` is empty.
    pub fn person_name(
        &mut self,
        name_parts: &[EntityId],
        likeness_score: Option<f64>,
    ) -> Result<EntityId> {
        let bbox = self.entities_bbox(name_parts)?;
        let text = self.entities_text(name_parts, " ");
        Ok(self.push(Entity::PersonName {
            bbox,
            text,
            name_parts: name_parts.into(),
            likeness_score,
        }))
    }

    /// Adds an `Address` entity spanning the given phrase entities.
    ///
    /// # Errors
    ///
    /// Fails if `lines` is empty.
    pub fn address(
        &mut self,
        lines: &[EntityId],
        address_parts: &[(String, String)],
        likeness_score: Option<f64>,
    ) -> Result<EntityId> {
        let bbox = self.entities_bbox(lines)?;
        let text = self.entities_text(lines, "\n");
        Ok(self.push(Entity::Address {
            bbox,
            text,
            lines: lines.into(),
            address_parts: address_parts.into(),
            likeness_score,
        }))
    }

    /// Adds a `TableCell` entity.
    ///
    /// # Errors
    ///
    /// Fails if `content` is empty.
    pub fn table_cell(&mut self, content: &[EntityId]) -> Result<EntityId> {
        let bbox = self.entities_bbox(content)?;
        Ok(self.push(Entity::TableCell {
            bbox,
            content: content.into(),
        }))
    }

    /// Adds a `TableRow` entity.
    ///
    /// # Errors
    ///
    /// Fails if `cells` is empty.
    pub fn table_row(&mut self, cells: &[EntityId]) -> Result<EntityId> {
        let bbox = self.entities_bbox(cells)?;
        Ok(self.push(Entity::TableRow {
            bbox,
            cells: cells.into(),
        }))
    }

    /// Adds a `Table` entity.
    ///
    /// # Errors
    ///
    /// Fails if `rows` is empty.
    pub fn table(&mut self, rows: &[EntityId]) -> Result<EntityId> {
        let bbox = self.entities_bbox(rows)?;
        Ok(self.push(Entity::Table {
            bbox,
            rows: rows.into(),
        }))
    }

    /// Adds a `NamedEntity`.
    ///
    /// # Errors
    ///
    /// Fails if `words` is empty.
    pub fn named_entity(
        &mut self,
        words: &[WordId],
        value: Option<&str>,
        label: Option<&str>,
    ) -> Result<EntityId> {
        let bbox = self.words_bbox(words)?;
        let text = self.words_text(words);
        Ok(self.push(Entity::NamedEntity {
            bbox,
            text,
            words: words.into(),
            value: value.map(Into::into),
            label: label.map(Into::into),
        }))
    }

    /// Finishes the document.
    ///
    /// The document bbox is the union of all entity bboxes; an entity-less
    /// document gets a degenerate box at the origin.
    #[must_use]
    pub fn finish(self) -> Document {
        let bbox = BBox::union(self.entities.iter().map(Entity::bbox)).unwrap_or(BBox::new(
            Interval::new(0.0, 0.0),
            Interval::new(0.0, 0.0),
        ));

        Document {
            name: self.name,
            bbox,
            words: self.words,
            entities: self.entities,
            pages: OnceCell::new(),
            median_line_height: OnceCell::new(),
            word_index: OnceCell::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn char_box(x0: f64, x1: f64, line: f64) -> BBox {
        BBox::new(Interval::new(x0, x1), Interval::new(line, line + 1.0))
    }

    #[test]
    fn document_basics() -> crate::Result<()> {
        let mut b = DocumentBuilder::new("doc");
        b.page(
            BBox::new(Interval::new(0.0, 20.0), Interval::new(0.0, 5.0)),
            1,
        );
        let w1 = b.word(char_box(0.0, 5.0, 1.0), "Apple").unwrap();
        let w2 = b.word(char_box(8.0, 14.0, 1.0), "Orange").unwrap();
        let t1 = b.text(&[w1], Some(1.0), None)?;
        let t2 = b.text(&[w2], Some(1.0), None)?;
        let phrase = b.text(&[w1, w2], Some(1.0), None)?;
        let doc = b.finish();

        assert_eq!(doc.pages().len(), 1);
        assert_eq!(doc.entity_text(phrase), Some("Apple Orange"));
        assert_eq!(doc.entity_words(phrase), vec![w1, w2]);
        assert!((doc.median_line_height() - 1.0).abs() < 1e-9);

        let singles = doc.single_word_index().items();
        assert!(singles.contains(&t1));
        assert!(singles.contains(&t2));
        assert!(!singles.contains(&phrase));

        Ok(())
    }

    #[test]
    fn builder_discards_bad_words() {
        let mut b = DocumentBuilder::new("doc");
        b.page(
            BBox::new(Interval::new(0.0, 10.0), Interval::new(0.0, 5.0)),
            1,
        );
        assert!(b.word(char_box(0.0, 4.0, 1.0), "").is_none());
        assert!(b.word(char_box(50.0, 55.0, 1.0), "elsewhere").is_none());
        assert!(b.word(char_box(0.0, 4.0, 1.0), "here").is_some());
    }
}
