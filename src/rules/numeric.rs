// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Predicates over entities with numeric text.
//!
//! Each entity's text is stripped down to a number before scoring. OCR
//! frequently loses punctuation, so by default all periods are dropped and
//! `force_dollar_decimal` can reinstate a `dollars.cents` decimal point.

use crate::document::Document;
use crate::entity::EntityId;
use crate::predicate::{AnyPredicate, Degree, Predicate};
use crate::{Error, Result};
use std::hash::{Hash, Hasher};

/// Strips an entity text down to its numeric content.
///
/// Digits are kept; a leading minus sign is kept; with
/// `period_as_delimiter`, the right-most period is kept as a decimal point.
/// With `force_dollar_decimal`, a decimal point is inserted before the last
/// two digits when none survived.
fn numeric_text(s: &str, period_as_delimiter: bool, force_dollar_decimal: bool) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut reversed = String::new();
    let mut drop_remaining_periods = !period_as_delimiter;

    for i in (0..chars.len()).rev() {
        let c = chars[i];
        if c.is_ascii_digit() {
            reversed.push(c);
        }
        if c == '-' && i == 0 {
            // A minus sign in the middle of the "number" is OCR noise
            reversed.push(c);
        }
        if !drop_remaining_periods && c == '.' {
            reversed.push(c);
            drop_remaining_periods = true;
        }
    }

    if reversed == "." {
        reversed.clear();
    }

    let mut result: String = reversed.chars().rev().collect();

    if force_dollar_decimal && !result.contains('.') && result.len() > 2 {
        result.insert(result.len() - 2, '.');
    }

    result
}

fn weighted_sum(
    entities: &[EntityId],
    document: &Document,
    coefficients: &[f64],
    period_as_delimiter: bool,
    force_dollar_decimal: bool,
) -> Result<Option<f64>> {
    if entities.len() != coefficients.len() {
        return Err(Error::Degree {
            expected: Degree::Fixed(coefficients.len()),
            got: entities.len(),
        });
    }

    let mut sum = 0.0;
    for (id, coefficient) in entities.iter().zip(coefficients) {
        let text = document.entity_text(*id).unwrap_or_default();
        let numeric = numeric_text(text, period_as_delimiter, force_dollar_decimal);
        if numeric.is_empty() {
            return Ok(None);
        }
        let Ok(value) = numeric.parse::<f64>() else {
            return Ok(None);
        };
        sum += value * coefficient;
    }

    Ok(Some(sum))
}

/// Says that the coefficient-weighted sum of some fields' numeric values is
/// close to a target amount.
#[derive(Clone, Debug, PartialEq)]
pub struct SumIsApproximately {
    /// The approximate target value of the sum
    pub amount: f64,

    /// Per-field weights; the predicate's degree is their count
    pub coefficients: Vec<f64>,

    /// How far from the target the sum may be without penalty
    pub tolerance: f64,

    /// The score tapers from 1 to 0 over this distance past the tolerance
    pub taper: f64,

    /// Treat the right-most period as a decimal delimiter instead of
    /// stripping it
    pub period_as_delimiter: bool,

    /// Insert a decimal point before the final two digits when none is
    /// present
    pub force_dollar_decimal: bool,
}

impl Hash for SumIsApproximately {
    fn hash<H: Hasher>(&self, state: &mut H) {
        crate::predicate::hash_f64(self.amount, state);
        state.write_usize(self.coefficients.len());
        for c in &self.coefficients {
            crate::predicate::hash_f64(*c, state);
        }
        crate::predicate::hash_f64(self.tolerance, state);
        crate::predicate::hash_f64(self.taper, state);
        self.period_as_delimiter.hash(state);
        self.force_dollar_decimal.hash(state);
    }
}

impl Predicate for SumIsApproximately {
    fn name(&self) -> &'static str {
        "sum_is_approximately"
    }

    fn degree(&self) -> Degree {
        Degree::Fixed(self.coefficients.len())
    }

    fn score(&self, entities: &[EntityId], document: &Document) -> Result<f64> {
        let Some(sum) = weighted_sum(
            entities,
            document,
            &self.coefficients,
            self.period_as_delimiter,
            self.force_dollar_decimal,
        )?
        else {
            return Ok(0.0);
        };

        let error = ((sum - self.amount).abs() - self.tolerance).max(0.0);
        if self.taper == 0.0 {
            return Ok(if error == 0.0 { 1.0 } else { 0.0 });
        }
        Ok(1.0 - (error / self.taper).min(1.0))
    }
}

/// Says that the coefficient-weighted sum of some fields' numeric values is
/// at least a lower bound.
#[derive(Clone, Debug, PartialEq)]
pub struct SumIsAtLeast {
    /// The minimum value of the sum
    pub lower_bound: f64,

    /// Per-field weights; the predicate's degree is their count
    pub coefficients: Vec<f64>,

    /// Use a strict inequality rather than a weak one
    pub strict: bool,

    /// Treat the right-most period as a decimal delimiter instead of
    /// stripping it
    pub period_as_delimiter: bool,

    /// Insert a decimal point before the final two digits when none is
    /// present
    pub force_dollar_decimal: bool,
}

impl Hash for SumIsAtLeast {
    fn hash<H: Hasher>(&self, state: &mut H) {
        crate::predicate::hash_f64(self.lower_bound, state);
        state.write_usize(self.coefficients.len());
        for c in &self.coefficients {
            crate::predicate::hash_f64(*c, state);
        }
        self.strict.hash(state);
        self.period_as_delimiter.hash(state);
        self.force_dollar_decimal.hash(state);
    }
}

impl Predicate for SumIsAtLeast {
    fn name(&self) -> &'static str {
        "sum_is_at_least"
    }

    fn degree(&self) -> Degree {
        Degree::Fixed(self.coefficients.len())
    }

    #[allow(clippy::float_cmp)]
    fn score(&self, entities: &[EntityId], document: &Document) -> Result<f64> {
        let Some(sum) = weighted_sum(
            entities,
            document,
            &self.coefficients,
            self.period_as_delimiter,
            self.force_dollar_decimal,
        )?
        else {
            return Ok(0.0);
        };

        let holds = sum > self.lower_bound || (!self.strict && sum == self.lower_bound);
        Ok(if holds { 1.0 } else { 0.0 })
    }
}

/// Builds a [`SumIsApproximately`].
///
/// # Errors
///
/// Fails if the tolerance or taper is negative.
pub fn sum_is_approximately(
    amount: f64,
    coefficients: &[f64],
    tolerance: f64,
    taper: f64,
    period_as_delimiter: bool,
    force_dollar_decimal: bool,
) -> Result<AnyPredicate> {
    if tolerance.is_nan() || tolerance < 0.0 {
        return Err(Error::InvalidParameter(format!(
            "tolerance must be nonnegative, not {tolerance}"
        )));
    }
    if taper.is_nan() || taper < 0.0 {
        return Err(Error::InvalidParameter(format!(
            "taper must be nonnegative, not {taper}"
        )));
    }
    Ok(SumIsApproximately {
        amount,
        coefficients: coefficients.into(),
        tolerance,
        taper,
        period_as_delimiter,
        force_dollar_decimal,
    }
    .into())
}

/// Says that the weighted sum of some fields is close to zero.
///
/// # Errors
///
/// Fails if the tolerance or taper is negative.
pub fn sum_is_near_zero(coefficients: &[f64], tolerance: f64, taper: f64) -> Result<AnyPredicate> {
    sum_is_approximately(0.0, coefficients, tolerance, taper, false, false)
}

/// Says that the weighted sum of some fields is exactly zero.
///
/// # Errors
///
/// Fails only if the coefficient list is malformed.
pub fn sum_is_zero(coefficients: &[f64]) -> Result<AnyPredicate> {
    sum_is_near_zero(coefficients, 0.0, 0.0)
}

/// Builds a [`SumIsAtLeast`].
#[must_use]
pub fn sum_is_at_least(lower_bound: f64, coefficients: &[f64], strict: bool) -> AnyPredicate {
    SumIsAtLeast {
        lower_bound,
        coefficients: coefficients.into(),
        strict,
        period_as_delimiter: false,
        force_dollar_decimal: false,
    }
    .into()
}

/// Says that the weighted sum of some fields is positive.
#[must_use]
pub fn sum_is_positive(coefficients: &[f64], strict: bool) -> AnyPredicate {
    sum_is_at_least(0.0, coefficients, strict)
}

/// Says that a field's numeric value is close to the given amount.
///
/// # Errors
///
/// Fails if the tolerance or taper is negative.
pub fn is_nearly_equal_to(amount: f64, tolerance: f64, taper: f64) -> Result<AnyPredicate> {
    sum_is_approximately(amount, &[1.0], tolerance, taper, false, false)
}

/// Says that a field's numeric value is exactly the given amount.
///
/// # Errors
///
/// Never fails in practice (zero tolerance and taper are valid).
pub fn is_equal_to(amount: f64) -> Result<AnyPredicate> {
    is_nearly_equal_to(amount, 0.0, 0.0)
}

/// Says that a field's numeric value is greater than the given amount.
#[must_use]
pub fn is_greater_than(amount: f64, strict: bool) -> AnyPredicate {
    sum_is_at_least(amount, &[1.0], strict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn numeric_text_stripping() {
        assert_eq!(numeric_text("$1,234.56", false, false), "123456");
        assert_eq!(numeric_text("$1,234.56", true, false), "1234.56");
        assert_eq!(numeric_text("$1.234.56", true, false), "1234.56");
        assert_eq!(numeric_text("-42", false, false), "-42");
        // A stray minus sign mid-number is dropped
        assert_eq!(numeric_text("4-2", false, false), "42");
        assert_eq!(numeric_text("abc", false, false), "");
        assert_eq!(numeric_text(".", true, false), "");
    }

    #[test]
    fn force_dollar_decimal_inserts_cents() {
        assert_eq!(numeric_text("12345", false, true), "123.45");
        assert_eq!(numeric_text("12", false, true), "12");
        assert_eq!(numeric_text("123.45", true, true), "123.45");
    }
}
