// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Predicates about text.

use super::expect_one;
use crate::document::Document;
use crate::entity::{Entity, EntityId, EntityKind};
use crate::predicate::{AnyPredicate, Degree, Leniency, Predicate};
use crate::string_algos::{edit_distance, pattern_edit_distance, substring_edit_distance};
use crate::text_properties::{
    legal_chars_error, length_error, max_char_counts_error, max_char_proportions_error,
    min_char_counts_error, min_char_proportions_error, CharCount, CharProportion, LengthSpec,
};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::ops::BitOr;

/// Flags describing how to massage texts before comparison
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct TextComparisonFlags(u8);

impl TextComparisonFlags {
    /// Case-insensitive comparison of the raw texts
    pub const NONE: Self = Self(0);

    /// Do not fold case before comparing
    pub const CASE_SENSITIVE: Self = Self(1);

    /// Strip all whitespace before comparing
    pub const NO_WHITESPACE: Self = Self(1 << 1);

    /// Keep only ASCII letters
    pub const ALPHABETICAL: Self = Self(1 << 2);

    /// Keep only ASCII digits
    pub const NUMERICAL: Self = Self(1 << 3);

    /// Keep only ASCII letters and digits
    pub const ALPHANUMERICAL: Self = Self(1 << 2 | 1 << 3);

    /// Returns `true` if all of `other`'s flags are set in `self`.
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for TextComparisonFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

pub(crate) fn massage(flags: TextComparisonFlags, s: &str) -> String {
    let mut s: String = if flags.contains(TextComparisonFlags::CASE_SENSITIVE) {
        s.into()
    } else {
        s.to_uppercase()
    };
    if flags.contains(TextComparisonFlags::NO_WHITESPACE) {
        s.retain(|c| !c.is_whitespace());
    }
    if flags.contains(TextComparisonFlags::ALPHANUMERICAL) {
        s.retain(|c| c.is_ascii_alphanumeric());
    } else if flags.contains(TextComparisonFlags::ALPHABETICAL) {
        s.retain(|c| c.is_ascii_alphabetic());
    } else if flags.contains(TextComparisonFlags::NUMERICAL) {
        s.retain(|c| c.is_ascii_digit());
    }
    s
}

/// The discrete taper used by the textual rules: score 1 up to `tolerance`
/// errors, then a linear ramp hitting 0 at `tolerance + taper + 1` errors.
pub(crate) fn taper_error(raw_error: f64, tolerance: f64, taper: f64) -> f64 {
    debug_assert!(raw_error >= 0.0 && tolerance >= 0.0 && taper >= 0.0);
    let error = (raw_error - tolerance).max(0.0);
    if error == 0.0 {
        return 1.0;
    }
    if taper == 0.0 {
        return 0.0;
    }
    // abs to avoid -0.0 in output
    (1.0 - (error / (taper + 1.0)).min(1.0)).abs()
}

/// Looks a count up in a score table, linearly interpolating between present
/// keys and clamping to the outermost values.
pub(crate) fn count_score(score_dict: &BTreeMap<i64, f64>, count: i64) -> f64 {
    if let Some(score) = score_dict.get(&count) {
        return *score;
    }

    let below = score_dict.range(..count).next_back();
    let above = score_dict.range(count..).next();

    match (below, above) {
        (Some((_, score)), None) | (None, Some((_, score))) => *score,
        (Some((&k0, &v0)), Some((&k1, &v1))) => {
            #[allow(clippy::cast_precision_loss)]
            let t = (count - k0) as f64 / (k1 - k0) as f64;
            v0 + (v1 - v0) * t
        }
        (None, None) => 0.0,
    }
}

/// Says a field has one of the given line counts.
///
/// Scores are linearly interpolated between the table's keys and clamped to
/// the outermost values beyond them. Useful for dealing with multiline text.
#[derive(Clone, Debug, PartialEq)]
pub struct LineCountIs {
    /// Map from line count to score
    pub score_dict: BTreeMap<i64, f64>,
}

impl Hash for LineCountIs {
    fn hash<H: Hasher>(&self, state: &mut H) {
        crate::predicate::hash_score_dict(&self.score_dict, state);
    }
}

impl Predicate for LineCountIs {
    fn name(&self) -> &'static str {
        "line_count_is"
    }

    fn degree(&self) -> Degree {
        Degree::Fixed(1)
    }

    fn score(&self, entities: &[EntityId], document: &Document) -> Result<f64> {
        let entity = document.entity(expect_one(entities)?);
        let line_count = i64::try_from(entity.line_count()).unwrap_or(i64::MAX);
        Ok(count_score(&self.score_dict, line_count))
    }

    fn leniency(&self) -> Leniency {
        Leniency::NotApplicable
    }
}

/// Says a field has one of the given word counts.
///
/// Similar to [`LineCountIs`]. Only works with `Text` entities.
#[derive(Clone, Debug, PartialEq)]
pub struct WordCountIs {
    /// Map from word count to score
    pub score_dict: BTreeMap<i64, f64>,
}

impl Hash for WordCountIs {
    fn hash<H: Hasher>(&self, state: &mut H) {
        crate::predicate::hash_score_dict(&self.score_dict, state);
    }
}

impl Predicate for WordCountIs {
    fn name(&self) -> &'static str {
        "word_count_is"
    }

    fn degree(&self) -> Degree {
        Degree::Fixed(1)
    }

    fn score(&self, entities: &[EntityId], document: &Document) -> Result<f64> {
        let entity = document.entity(expect_one(entities)?);
        match entity {
            Entity::Text { words, .. } => {
                let count = i64::try_from(words.len()).unwrap_or(i64::MAX);
                Ok(count_score(&self.score_dict, count))
            }
            other => Err(Error::EntityType {
                expected: EntityKind::Text,
                got: other.kind(),
            }),
        }
    }

    fn leniency(&self) -> Leniency {
        Leniency::NotApplicable
    }
}

/// Says a field's text matches one of the given texts.
///
/// The measured error is the edit (Levenshtein) distance to the closest of
/// the candidate texts. With no candidate texts, the rule scores 1.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct TextEquals {
    /// Candidate texts; the best match is used
    pub texts: Vec<String>,

    /// How to massage the texts before comparison
    pub flags: TextComparisonFlags,

    /// Scores 1 if the measured error is at most this
    pub tolerance: u32,

    /// The score tapers from 1 to 0 as the error minus the tolerance goes
    /// from 0 to `taper + 1`
    pub taper: u32,
}

impl Predicate for TextEquals {
    fn name(&self) -> &'static str {
        "text_equals"
    }

    fn degree(&self) -> Degree {
        Degree::Fixed(1)
    }

    fn score(&self, entities: &[EntityId], document: &Document) -> Result<f64> {
        let id = expect_one(entities)?;

        if self.texts.is_empty() {
            return Ok(1.0);
        }

        let Some(entity_text) = document.entity_text(id) else {
            return Ok(if self.texts.iter().any(String::is_empty) {
                1.0
            } else {
                0.0
            });
        };
        let entity_text = massage(self.flags, entity_text);
        let entity_len = entity_text.chars().count();

        let mut best = 0.0f64;
        for text in &self.texts {
            let text = massage(self.flags, text);

            // Cheap length-difference lower bound on the edit distance
            let len_gap = text.chars().count().abs_diff(entity_len);
            if len_gap > (self.tolerance + self.taper) as usize {
                continue;
            }

            let error = edit_distance(&text, &entity_text);
            #[allow(clippy::cast_precision_loss)]
            let score = taper_error(
                error as f64,
                f64::from(self.tolerance),
                f64::from(self.taper),
            );
            best = best.max(score);
            if best == 1.0 {
                return Ok(best);
            }
        }

        Ok(best)
    }

    fn leniency(&self) -> Leniency {
        Leniency::NotApplicable
    }
}

/// Says the given text is (approximately) a substring of a field's text.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct TextHasSubstring {
    /// The text to look for
    pub text: String,

    /// How to massage the texts before comparison
    pub flags: TextComparisonFlags,

    /// Scores 1 if the measured error is at most this
    pub tolerance: u32,

    /// Taper width; defaults to half the length of `text`
    pub taper: Option<u32>,
}

impl Predicate for TextHasSubstring {
    fn name(&self) -> &'static str {
        "text_has_substring"
    }

    fn degree(&self) -> Degree {
        Degree::Fixed(1)
    }

    fn score(&self, entities: &[EntityId], document: &Document) -> Result<f64> {
        let entity = document.entity(expect_one(entities)?);
        let Entity::Text {
            text: entity_text, ..
        } = entity
        else {
            return Ok(0.0);
        };

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let taper = self
            .taper
            .unwrap_or((self.text.chars().count() / 2) as u32);

        let needle = massage(self.flags, &self.text);
        let haystack = massage(self.flags, entity_text);
        let error = substring_edit_distance(&haystack, &needle);

        #[allow(clippy::cast_precision_loss)]
        Ok(taper_error(
            error as f64,
            f64::from(self.tolerance),
            f64::from(taper),
        ))
    }

    fn leniency(&self) -> Leniency {
        Leniency::NotApplicable
    }
}

/// Says a field's text matches a pattern.
///
/// Characters in the pattern are literals unless they appear as keys in
/// `stands_for`, in which case they stand for any one of the characters in
/// the corresponding value. Useful for things like social security numbers.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct TextMatchesPattern {
    /// The pattern to match the field's text against
    pub pattern: String,

    /// Map from pattern character to the characters it stands for
    pub stands_for: BTreeMap<char, String>,

    /// Scores 1 if the measured error is at most this
    pub tolerance: u32,

    /// Taper width; defaults to half the length of the longer of the text
    /// and the pattern
    pub taper: Option<u32>,
}

impl Predicate for TextMatchesPattern {
    fn name(&self) -> &'static str {
        "text_matches_pattern"
    }

    fn degree(&self) -> Degree {
        Degree::Fixed(1)
    }

    fn score(&self, entities: &[EntityId], document: &Document) -> Result<f64> {
        let entity = document.entity(expect_one(entities)?);
        let Entity::Text { text, .. } = entity else {
            return Ok(0.0);
        };

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let taper = self.taper.unwrap_or_else(|| {
            (text.chars().count().max(self.pattern.chars().count()) / 2) as u32
        });

        let error = pattern_edit_distance(text, &self.pattern, &self.stands_for);

        #[allow(clippy::cast_precision_loss)]
        Ok(taper_error(
            error as f64,
            f64::from(self.tolerance),
            f64::from(taper),
        ))
    }

    fn leniency(&self) -> Leniency {
        Leniency::NotApplicable
    }
}

/// Says a field's text has the specified character-level properties.
///
/// Every option contributes a number of characters' worth of error; the
/// errors are summed and pushed through the taper.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextPropertiesAre {
    /// Bounds on the text length
    pub length: Option<LengthSpec>,

    /// Characters the text may consist of
    pub legal_chars: Option<String>,

    /// Lower bounds on character-set proportions
    pub min_char_proportions: Vec<CharProportion>,

    /// Upper bounds on character-set proportions
    pub max_char_proportions: Vec<CharProportion>,

    /// Lower bounds on character-set counts
    pub min_char_counts: Vec<CharCount>,

    /// Upper bounds on character-set counts
    pub max_char_counts: Vec<CharCount>,

    /// Scores 1 if the summed error is at most this
    pub tolerance: u32,

    /// Taper width; defaults to half the text length
    pub taper: Option<u32>,
}

impl Hash for TextPropertiesAre {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.length.hash(state);
        self.legal_chars.hash(state);
        for spec in self.min_char_proportions.iter().chain(&self.max_char_proportions) {
            spec.chars.hash(state);
            crate::predicate::hash_f64(spec.proportion, state);
        }
        self.min_char_counts.hash(state);
        self.max_char_counts.hash(state);
        self.tolerance.hash(state);
        self.taper.hash(state);
    }
}

impl Predicate for TextPropertiesAre {
    fn name(&self) -> &'static str {
        "text_properties_are"
    }

    fn degree(&self) -> Degree {
        Degree::Fixed(1)
    }

    fn score(&self, entities: &[EntityId], document: &Document) -> Result<f64> {
        let entity = document.entity(expect_one(entities)?);
        let Entity::Text { text, .. } = entity else {
            return Ok(0.0);
        };

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let taper = self
            .taper
            .unwrap_or((text.chars().count() / 2) as u32);

        let mut error = 0.0;
        if let Some(length) = &self.length {
            error += length_error(text, length);
        }
        if let Some(legal_chars) = &self.legal_chars {
            error += legal_chars_error(text, legal_chars);
        }
        error += min_char_proportions_error(text, &self.min_char_proportions);
        error += max_char_proportions_error(text, &self.max_char_proportions);
        error += min_char_counts_error(text, &self.min_char_counts);
        error += max_char_counts_error(text, &self.max_char_counts);

        Ok(taper_error(error, f64::from(self.tolerance), f64::from(taper)))
    }

    fn leniency(&self) -> Leniency {
        Leniency::NotApplicable
    }
}

/// Says that two fields' assignments have unequal texts.
///
/// Scores 0 if the texts are equal, 1 otherwise.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct HaveUnequalText;

impl Predicate for HaveUnequalText {
    fn name(&self) -> &'static str {
        "have_unequal_text"
    }

    fn degree(&self) -> Degree {
        Degree::Fixed(2)
    }

    fn score(&self, entities: &[EntityId], document: &Document) -> Result<f64> {
        let (e1, e2) = super::expect_two(entities)?;
        Ok(if document.entity_text(e1) == document.entity_text(e2) {
            0.0
        } else {
            1.0
        })
    }
}

/// Says a field's text matches the given text (tolerance 1, taper 1).
#[must_use]
pub fn text_equals(text: &str) -> AnyPredicate {
    TextEquals {
        texts: vec![text.into()],
        flags: TextComparisonFlags::NONE,
        tolerance: 1,
        taper: 1,
    }
    .into()
}

/// Says a field's text matches one of the given texts.
#[must_use]
pub fn text_is_one_of(
    texts: &[&str],
    flags: TextComparisonFlags,
    tolerance: u32,
    taper: u32,
) -> AnyPredicate {
    TextEquals {
        texts: texts.iter().map(|t| (*t).into()).collect(),
        flags,
        tolerance,
        taper,
    }
    .into()
}

/// Says the given text is a substring of a field's text (tolerance 1,
/// taper 1).
#[must_use]
pub fn text_has_substring(text: &str) -> AnyPredicate {
    TextHasSubstring {
        text: text.into(),
        flags: TextComparisonFlags::NONE,
        tolerance: 1,
        taper: Some(1),
    }
    .into()
}

/// Says the given text is *not* a substring of a field's text.
///
/// Scores 0 if the text appears within `intolerance` edits, tapering up to 1.
#[must_use]
pub fn text_does_not_contain_substring(
    text: &str,
    flags: TextComparisonFlags,
    intolerance: u32,
    taper: u32,
) -> AnyPredicate {
    super::logical::negate(
        TextHasSubstring {
            text: text.into(),
            flags,
            tolerance: intolerance,
            taper: Some(taper),
        }
        .into(),
    )
}

/// Says a field's text matches the pattern.
#[must_use]
pub fn text_matches_pattern(pattern: &str, stands_for: &[(char, &str)]) -> AnyPredicate {
    TextMatchesPattern {
        pattern: pattern.into(),
        stands_for: stands_for
            .iter()
            .map(|(c, s)| (*c, (*s).into()))
            .collect(),
        tolerance: 0,
        taper: None,
    }
    .into()
}

/// See [`LineCountIs`].
#[must_use]
pub fn line_count_is(score_dict: &[(i64, f64)]) -> AnyPredicate {
    LineCountIs {
        score_dict: score_dict.iter().copied().collect(),
    }
    .into()
}

/// See [`WordCountIs`].
#[must_use]
pub fn word_count_is(score_dict: &[(i64, f64)]) -> AnyPredicate {
    WordCountIs {
        score_dict: score_dict.iter().copied().collect(),
    }
    .into()
}

/// Says a field is a single line.
#[must_use]
pub fn is_one_line() -> AnyPredicate {
    line_count_is(&[(0, 0.0), (1, 1.0), (2, 0.0)])
}

/// Says a field is exactly two lines.
#[must_use]
pub fn is_two_lines() -> AnyPredicate {
    line_count_is(&[(1, 0.0), (2, 1.0), (3, 0.0)])
}

/// Says a field is a single word.
#[must_use]
pub fn is_one_word() -> AnyPredicate {
    word_count_is(&[(0, 0.0), (1, 1.0), (2, 0.0)])
}

/// Says a field is exactly two words.
#[must_use]
pub fn is_two_words() -> AnyPredicate {
    word_count_is(&[(1, 0.0), (2, 1.0), (3, 0.0)])
}

/// See [`HaveUnequalText`].
#[must_use]
pub fn have_unequal_text() -> AnyPredicate {
    HaveUnequalText.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn massage_flags() {
        assert_eq!(massage(TextComparisonFlags::NONE, "Ab c1"), "AB C1");
        assert_eq!(
            massage(TextComparisonFlags::CASE_SENSITIVE, "Ab c1"),
            "Ab c1"
        );
        assert_eq!(
            massage(
                TextComparisonFlags::NO_WHITESPACE | TextComparisonFlags::CASE_SENSITIVE,
                "Ab c1"
            ),
            "Abc1"
        );
        assert_eq!(
            massage(
                TextComparisonFlags::NUMERICAL | TextComparisonFlags::CASE_SENSITIVE,
                "Ab c1"
            ),
            "1"
        );
        assert_eq!(
            massage(
                TextComparisonFlags::ALPHANUMERICAL | TextComparisonFlags::CASE_SENSITIVE,
                "Ab c1!"
            ),
            "Abc1"
        );
    }

    #[test]
    fn count_score_interpolates() {
        let dict: BTreeMap<i64, f64> =
            [(1, 0.0), (2, 0.5), (4, 1.0), (5, 0.0), (6, 0.3)].into();
        assert!((count_score(&dict, 2) - 0.5).abs() < 1e-9);
        // Lerp between 2 and 4
        assert!((count_score(&dict, 3) - 0.75).abs() < 1e-9);
        // Clamped beyond the outermost keys
        assert!((count_score(&dict, 0)).abs() < 1e-9);
        assert!((count_score(&dict, 10) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn discrete_taper() {
        assert!((taper_error(0.0, 0.0, 0.0) - 1.0).abs() < 1e-9);
        assert!((taper_error(1.0, 0.0, 0.0)).abs() < 1e-9);
        assert!((taper_error(1.0, 1.0, 0.0) - 1.0).abs() < 1e-9);
        // With taper 1, one error past tolerance scores 1 - 1/2
        assert!((taper_error(1.0, 0.0, 1.0) - 0.5).abs() < 1e-9);
        assert!((taper_error(2.0, 0.0, 1.0)).abs() < 1e-9);
    }
}
