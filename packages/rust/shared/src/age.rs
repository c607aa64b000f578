//! Age-range matching shared by discovery filtering, the safety
//! capabilities, and the result formatter.

use std::ops::RangeInclusive;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::types::MAX_CHILD_AGE;

/// Matches `6-12`, `Ages 6 - 12`, `6–12`.
static RANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*[-\u{2013}]\s*(\d+)").expect("age range regex"));

/// Matches open-ended ranges: `8+`, `8 and up`.
static OPEN_RANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*(?:\+|and up)").expect("open age regex"));

/// Matches the words `age` / `ages` (not `stage`, `package`).
static AGE_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bages?\b").expect("age word regex"));

/// Keyword buckets consulted when no numeric range is present, in match order.
/// The open buckets admit every age, including ones above [`MAX_CHILD_AGE`].
const AGE_KEYWORDS: &[(&str, RangeInclusive<u32>)] = &[
    ("all ages", 0..=u32::MAX),
    ("any age", 0..=u32::MAX),
    ("toddler", 1..=3),
    ("preschool", 3..=5),
    ("elementary", 6..=11),
    ("middle school", 11..=14),
    ("teen", 13..=17),
];

/// Outcome of matching a child's age against an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgeFit {
    Appropriate,
    Inappropriate,
    /// Nothing in the text states an age. A legitimate answer, not an error.
    Unclear,
}

impl AgeFit {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Appropriate => "appropriate",
            Self::Inappropriate => "inappropriate",
            Self::Unclear => "unclear",
        }
    }
}

/// Where an age verdict came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgeBasis {
    /// An explicit numeric range.
    Range(u32, u32),
    /// A keyword bucket such as `toddler`.
    Keyword(&'static str),
    None,
}

/// Extract an explicit `<min>-<max>` (or `<min>+`) range from text.
pub fn parse_age_range(text: &str) -> Option<(u32, u32)> {
    if let Some(caps) = RANGE_RE.captures(text) {
        let min = caps[1].parse().ok()?;
        let max = caps[2].parse().ok()?;
        return Some((min, max));
    }
    let caps = OPEN_RANGE_RE.captures(text)?;
    let min = caps[1].parse().ok()?;
    Some((min, MAX_CHILD_AGE))
}

/// Match `child_age` against an age-range string, falling back to keyword
/// buckets found in the range or in `context` (title/description).
pub fn assess_age(age_range: &str, context: &str, child_age: u32) -> (AgeFit, AgeBasis) {
    if let Some((min, max)) = parse_age_range(age_range) {
        let fit = if (min..=max).contains(&child_age) {
            AgeFit::Appropriate
        } else {
            AgeFit::Inappropriate
        };
        return (fit, AgeBasis::Range(min, max));
    }

    let text = format!("{age_range} {context}").to_lowercase();
    for (keyword, ages) in AGE_KEYWORDS {
        if text.contains(keyword) {
            let fit = if ages.contains(&child_age) {
                AgeFit::Appropriate
            } else {
                AgeFit::Inappropriate
            };
            return (fit, AgeBasis::Keyword(*keyword));
        }
    }

    (AgeFit::Unclear, AgeBasis::None)
}

/// Shorthand for [`assess_age`] without context text.
pub fn age_fit(age_range: &str, child_age: u32) -> AgeFit {
    assess_age(age_range, "", child_age).0
}

/// Whether the text carries any age indication at all.
pub fn has_age_indicator(text: &str) -> bool {
    if parse_age_range(text).is_some() {
        return true;
    }
    if AGE_WORD_RE.is_match(text) {
        return true;
    }
    let lower = text.to_lowercase();
    AGE_KEYWORDS.iter().any(|(kw, _)| lower.contains(kw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_range_bounds_are_inclusive() {
        assert_eq!(age_fit("6-12", 8), AgeFit::Appropriate);
        assert_eq!(age_fit("6-12", 6), AgeFit::Appropriate);
        assert_eq!(age_fit("6-12", 12), AgeFit::Appropriate);
        assert_eq!(age_fit("6-12", 3), AgeFit::Inappropriate);
        assert_eq!(age_fit("Ages 6-12", 13), AgeFit::Inappropriate);
    }

    #[test]
    fn all_ages_is_always_appropriate() {
        for age in 1..=MAX_CHILD_AGE {
            assert_eq!(age_fit("all ages", age), AgeFit::Appropriate);
            assert_eq!(age_fit("All Ages", age), AgeFit::Appropriate);
        }
    }

    #[test]
    fn all_ages_ignores_the_child_age_bound() {
        for age in [0, MAX_CHILD_AGE + 1, 25, 40] {
            assert_eq!(age_fit("all ages", age), AgeFit::Appropriate);
            assert_eq!(age_fit("Any age welcome", age), AgeFit::Appropriate);
        }
    }

    #[test]
    fn family_wording_does_not_mask_a_narrower_bucket() {
        let (fit, basis) = assess_age("", "Family toddler tumble time", 14);
        assert_eq!(fit, AgeFit::Inappropriate);
        assert_eq!(basis, AgeBasis::Keyword("toddler"));

        let (fit, basis) = assess_age("", "Family picnic in the park", 8);
        assert_eq!(fit, AgeFit::Unclear);
        assert_eq!(basis, AgeBasis::None);
    }

    #[test]
    fn keyword_buckets_from_context() {
        let (fit, basis) = assess_age("", "Interactive story reading for toddlers", 2);
        assert_eq!(fit, AgeFit::Appropriate);
        assert_eq!(basis, AgeBasis::Keyword("toddler"));

        let (fit, _) = assess_age("", "Teen robotics league", 8);
        assert_eq!(fit, AgeFit::Inappropriate);
    }

    #[test]
    fn no_indicator_is_unclear() {
        let (fit, basis) = assess_age("", "Pumpkin patch hayride", 8);
        assert_eq!(fit, AgeFit::Unclear);
        assert_eq!(basis, AgeBasis::None);
    }

    #[test]
    fn open_ended_range() {
        assert_eq!(parse_age_range("8+"), Some((8, MAX_CHILD_AGE)));
        assert_eq!(age_fit("Ages 10 and up", 9), AgeFit::Inappropriate);
        assert_eq!(age_fit("Ages 10 and up", 11), AgeFit::Appropriate);
    }

    #[test]
    fn age_indicator_detection() {
        assert!(has_age_indicator("Ages 6-12"));
        assert!(has_age_indicator("great for preschool kids"));
        assert!(!has_age_indicator("Free parking"));
        assert!(!has_age_indicator("Main stage, bring a package lunch"));
    }
}
