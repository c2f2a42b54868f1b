// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Character-level error counts used by the `text_properties_are` rule.
//!
//! Each function returns the number of characters' worth of error, which the
//! rule adds up and pushes through its taper.

/// Bounds on a text's length
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct LengthSpec {
    /// The text must have at least this many characters
    pub at_least: Option<usize>,

    /// The text must have at most this many characters
    pub at_most: Option<usize>,

    /// The text must have exactly this many characters
    pub exactly: Option<usize>,
}

/// A bound on the fraction of a text drawn from a character set
#[derive(Clone, Debug, PartialEq)]
pub struct CharProportion {
    /// The character set
    pub chars: String,

    /// The bounding proportion, in `[0, 1]`
    pub proportion: f64,
}

/// A bound on the number of characters drawn from a character set
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct CharCount {
    /// The character set
    pub chars: String,

    /// The bounding count
    pub count: usize,
}

fn count_in(s: &str, chars: &str) -> usize {
    s.chars().filter(|c| chars.contains(*c)).count()
}

pub(crate) fn length_error(s: &str, spec: &LengthSpec) -> f64 {
    let len = s.chars().count();
    let mut errors = 0usize;
    if let Some(at_most) = spec.at_most {
        errors += len.saturating_sub(at_most);
    }
    if let Some(at_least) = spec.at_least {
        errors += at_least.saturating_sub(len);
    }
    if let Some(exactly) = spec.exactly {
        errors += exactly.abs_diff(len);
    }
    errors as f64
}

pub(crate) fn legal_chars_error(s: &str, chars: &str) -> f64 {
    s.chars().filter(|c| !chars.contains(*c)).count() as f64
}

pub(crate) fn min_char_proportions_error(s: &str, specs: &[CharProportion]) -> f64 {
    let len = s.chars().count() as f64;
    specs
        .iter()
        .map(|spec| (len * spec.proportion - count_in(s, &spec.chars) as f64).max(0.0))
        .sum()
}

pub(crate) fn max_char_proportions_error(s: &str, specs: &[CharProportion]) -> f64 {
    let len = s.chars().count() as f64;
    specs
        .iter()
        .map(|spec| (count_in(s, &spec.chars) as f64 - len * spec.proportion).max(0.0))
        .sum()
}

pub(crate) fn min_char_counts_error(s: &str, specs: &[CharCount]) -> f64 {
    specs
        .iter()
        .map(|spec| spec.count.saturating_sub(count_in(s, &spec.chars)) as f64)
        .sum()
}

pub(crate) fn max_char_counts_error(s: &str, specs: &[CharCount]) -> f64 {
    specs
        .iter()
        .map(|spec| count_in(s, &spec.chars).saturating_sub(spec.count) as f64)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn length_errors() {
        let spec = LengthSpec {
            at_least: Some(3),
            at_most: Some(5),
            exactly: None,
        };
        assert!((length_error("ab", &spec) - 1.0).abs() < 1e-9);
        assert!((length_error("abcd", &spec)).abs() < 1e-9);
        assert!((length_error("abcdefg", &spec) - 2.0).abs() < 1e-9);

        let exact = LengthSpec {
            exactly: Some(4),
            ..LengthSpec::default()
        };
        assert!((length_error("ab", &exact) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn char_errors() {
        assert!((legal_chars_error("a1b2", "ab") - 2.0).abs() < 1e-9);

        let specs = [CharProportion {
            chars: "X-".into(),
            proportion: 0.5,
        }];
        // "XX--abcd" is half X/-, no error
        assert!(max_char_proportions_error("XX--abcd", &specs).abs() < 1e-9);
        // "XXX-abcd" is 4/8 too; "XXXX-bcd" has 5/8
        assert!((max_char_proportions_error("XXXX-bcd", &specs) - 1.0).abs() < 1e-9);

        let counts = [CharCount {
            chars: "-".into(),
            count: 1,
        }];
        assert!((max_char_counts_error("a-b-c-", &counts) - 2.0).abs() < 1e-9);
        assert!((min_char_counts_error("abc", &counts) - 1.0).abs() < 1e-9);
    }
}
