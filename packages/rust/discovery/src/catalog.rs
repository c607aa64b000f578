//! Built-in activity catalog.
//!
//! Serves as an always-available event source and as the formatter's
//! fallback when no events can be recovered from discovery text.

use async_trait::async_trait;
use kidplanner_shared::{Activity, Result};

use crate::{EventQuery, EventSource};

fn activity(fields: [&str; 11]) -> Activity {
    let [title, location, address, date, time, age_range, price, category, description, url, venue_type] =
        fields;
    Activity {
        title: title.into(),
        location: location.into(),
        address: address.into(),
        date: date.into(),
        time: time.into(),
        age_range: age_range.into(),
        price: price.into(),
        category: category.into(),
        description: description.into(),
        url: url.into(),
        venue_type: venue_type.into(),
    }
}

/// The built-in activities, in catalog order.
pub fn mock_events() -> Vec<Activity> {
    vec![
        activity([
            "Kids Science Workshop",
            "Science Center",
            "123 Science St, Downtown",
            "2025-01-15",
            "10:00 AM",
            "6-12",
            "$15",
            "STEM",
            "Hands-on science experiments for kids",
            "https://example.com/science-workshop",
            "Museum",
        ]),
        activity([
            "Art & Craft Session",
            "Community Center",
            "456 Art Ave, Midtown",
            "2025-01-16",
            "2:00 PM",
            "4-10",
            "Free",
            "Arts",
            "Creative art projects for children",
            "https://example.com/art-session",
            "Community Center",
        ]),
        activity([
            "Soccer Skills Clinic",
            "Sports Complex",
            "789 Sports Blvd, Eastside",
            "2025-01-17",
            "9:00 AM",
            "8-14",
            "$25",
            "Sports",
            "Learn soccer fundamentals",
            "https://example.com/soccer-clinic",
            "Sports Facility",
        ]),
        activity([
            "Story Time at Library",
            "Public Library",
            "321 Book St, Westside",
            "2025-01-18",
            "11:00 AM",
            "2-6",
            "Free",
            "Educational",
            "Interactive story reading for toddlers",
            "https://example.com/story-time",
            "Library",
        ]),
        activity([
            "Coding for Kids",
            "Tech Hub",
            "654 Code Ave, Tech District",
            "2025-01-19",
            "3:00 PM",
            "10-16",
            "$30",
            "STEM",
            "Introduction to programming concepts",
            "https://example.com/coding-kids",
            "Educational Center",
        ]),
        activity([
            "Dance Party",
            "Dance Studio",
            "987 Dance St, Arts Quarter",
            "2025-01-20",
            "4:00 PM",
            "5-12",
            "$20",
            "Arts",
            "Fun dance session for kids",
            "https://example.com/dance-party",
            "Dance Studio",
        ]),
    ]
}

/// Event source backed by [`mock_events`].
#[derive(Debug, Clone)]
pub struct MockCatalog {
    events: Vec<Activity>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self {
            events: mock_events(),
        }
    }

    /// A catalog with caller-supplied entries (tests, demos).
    pub fn with_events(events: Vec<Activity>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &[Activity] {
        &self.events
    }
}

impl Default for MockCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSource for MockCatalog {
    fn name(&self) -> &str {
        "mock-catalog"
    }

    async fn fetch(&self, _query: &EventQuery) -> Result<Vec<Activity>> {
        Ok(self.events.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_six_entries_with_categories() {
        let events = mock_events();
        assert_eq!(events.len(), 6);
        assert!(events.iter().all(|e| !e.category.is_empty()));
        assert_eq!(events[0].title, "Kids Science Workshop");
    }
}
