//! Interest categories and keyword inference.

/// Category name → keywords that indicate it, in priority order.
pub const INTEREST_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "STEM",
        &["science", "coding", "technology", "math", "engineering", "robot", "stem"],
    ),
    (
        "Arts",
        &["art", "craft", "dance", "music", "creative", "painting", "theater"],
    ),
    (
        "Sports",
        &["soccer", "basketball", "swimming", "tennis", "fitness", "sport", "skating"],
    ),
    (
        "Educational",
        &["library", "reading", "story", "learning", "book", "museum"],
    ),
    (
        "Nature & Outdoor",
        &["nature", "hiking", "park", "garden", "zoo", "farm", "outdoor"],
    ),
    ("Social", &["play", "party", "group", "community", "friends"]),
];

/// Guess a category from free text (title, description).
pub fn infer_category(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    INTEREST_CATEGORIES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| lower.contains(kw)))
        .map(|(name, _)| *name)
}

/// Whether an interest (e.g. "science") points at `category` (e.g. "STEM").
pub fn interest_matches_category(interest: &str, category: &str) -> bool {
    let interest = interest.to_lowercase();
    if interest.trim().is_empty() {
        return false;
    }
    if category.to_lowercase() == interest.trim() {
        return true;
    }
    INTEREST_CATEGORIES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(category))
        .is_some_and(|(_, keywords)| keywords.iter().any(|kw| interest.contains(kw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_from_keywords() {
        assert_eq!(infer_category("Junior Robotics Lab"), Some("STEM"));
        assert_eq!(infer_category("Family Nature Hike"), Some("Nature & Outdoor"));
        assert_eq!(infer_category("Parent meetup"), None);
    }

    #[test]
    fn interests_map_to_categories() {
        assert!(interest_matches_category("science", "STEM"));
        assert!(interest_matches_category("Dance", "Arts"));
        assert!(interest_matches_category("stem", "STEM"));
        assert!(!interest_matches_category("soccer", "Arts"));
        assert!(!interest_matches_category("", "Arts"));
    }
}
