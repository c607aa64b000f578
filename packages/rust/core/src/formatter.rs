//! Result formatter: discovery text → structured events.
//!
//! The discovery artifact is free text in the listing grammar of
//! [`kidplanner_shared::listing`]. Parsing is best effort: unknown lines are
//! skipped, missing markers leave fields unset, and a listing with no
//! parseable event falls back to a slice of the catalog.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use url::Url;

use kidplanner_shared::listing::match_marker;
use kidplanner_shared::{Activity, EventField, EventRecord, RequestId, has_age_indicator};

use crate::pipeline::PipelineState;
use crate::stage::{StageName, ToolCallRecord};

static TITLE_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.").expect("title line regex"));

/// Bucket for events without a category.
pub const UNCATEGORIZED: &str = "Other";

/// Parsed events and their category partition.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormattedEvents {
    pub events: Vec<EventRecord>,
    /// Category → events, first-seen order within each bucket.
    pub categorized: BTreeMap<String, Vec<EventRecord>>,
}

/// Parse `text`, falling back to the first `fallback_count` entries of
/// `fallback` when it holds no events, then fill in missing links.
pub fn format_events(
    text: &str,
    fallback: &[Activity],
    fallback_count: usize,
    location: &str,
) -> FormattedEvents {
    let mut events = parse_events(text);
    if events.is_empty() {
        events = fallback
            .iter()
            .take(fallback_count)
            .map(EventRecord::from)
            .collect();
    }
    for event in &mut events {
        if event.link.is_none() {
            event.link = Some(event_link(event, location));
        }
    }
    let categorized = categorize(&events);
    FormattedEvents {
        events,
        categorized,
    }
}

/// Scan a listing for numbered events and their marker lines.
pub fn parse_events(text: &str) -> Vec<EventRecord> {
    let mut events = Vec::new();
    let mut current: Option<EventRecord> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if TITLE_LINE_RE.is_match(line) {
            flush(&mut events, current.take());
            current = Some(EventRecord {
                title: clean_title(line),
                ..EventRecord::default()
            });
            continue;
        }

        let Some(event) = current.as_mut() else {
            continue;
        };
        let line = line.trim_start_matches(['-', '*', '\u{2022}']).trim_start();
        let Some((field, value)) = match_marker(line) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        let value = Some(value.to_string());
        match field {
            EventField::Location => event.location = value,
            EventField::Date => event.date = value,
            EventField::AgeRange => event.age_range = value,
            EventField::Price => event.price = value,
            EventField::Category => event.category = value,
            EventField::Description => event.description = value,
            EventField::Link => event.link = value,
        }
    }
    flush(&mut events, current);
    events
}

fn flush(events: &mut Vec<EventRecord>, event: Option<EventRecord>) {
    if let Some(event) = event.filter(|e| !e.title.is_empty()) {
        events.push(event);
    }
}

/// Text after the first `". "`, without markdown emphasis.
fn clean_title(line: &str) -> String {
    let title = line.split_once(". ").map_or(line, |(_, rest)| rest);
    title
        .trim()
        .trim_matches(|c| c == '*' || c == '_')
        .trim()
        .to_string()
}

/// Group events by category. Every event lands in exactly one bucket.
pub fn categorize(events: &[EventRecord]) -> BTreeMap<String, Vec<EventRecord>> {
    let mut buckets: BTreeMap<String, Vec<EventRecord>> = BTreeMap::new();
    for event in events {
        let key = event
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(UNCATEGORIZED);
        buckets.entry(key.to_string()).or_default().push(event.clone());
    }
    buckets
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

/// A search link for an event that has none.
pub fn event_link(event: &EventRecord, location: &str) -> String {
    let title = event.title.to_lowercase();
    let category = event.category.as_deref().unwrap_or_default().to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| title.contains(n));

    if category.contains("eventbrite") || title.contains("search eventbrite") {
        let section = if has(&["music"]) {
            "music--kids-family"
        } else if has(&["performing", "visual arts"]) {
            "performing-arts--kids-family"
        } else if has(&["family", "education"]) {
            "family--kids-family"
        } else {
            "kids-family"
        };
        return format!("https://www.eventbrite.com/d/{}/{section}/", slug(location));
    }

    let (base, query) = if has(&["story time", "library"]) {
        (FACEBOOK_SEARCH, format!("story time {location}"))
    } else if has(&["family fun", "park"]) {
        (FACEBOOK_SEARCH, format!("family fun {location}"))
    } else if has(&["cooking"]) {
        (FACEBOOK_SEARCH, format!("kids cooking {location}"))
    } else if has(&["museum"]) {
        (GOOGLE_SEARCH, format!("museums {location} kids"))
    } else if has(&["workshop", "class"]) {
        (GOOGLE_SEARCH, format!("{} {location}", event.title))
    } else {
        (GOOGLE_SEARCH, format!("{} {location} kids family", event.title))
    };
    search_url(base, &query)
}

const FACEBOOK_SEARCH: &str = "https://www.facebook.com/events/search/";
const GOOGLE_SEARCH: &str = "https://www.google.com/search";

fn search_url(base: &str, query: &str) -> String {
    let query = query.replace(',', "");
    match Url::parse_with_params(base, &[("q", query.trim())]) {
        Ok(url) => url.to_string(),
        Err(_) => base.to_string(),
    }
}

/// `Cleveland, OH` → `cleveland-oh`.
fn slug(location: &str) -> String {
    location
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// What a caller receives for one request.
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationResponse {
    pub request_id: RequestId,
    pub events: Vec<EventRecord>,
    pub total_found: usize,
    /// Events stating an age range or mentioning an age keyword.
    pub age_appropriate: usize,
    pub categorized: BTreeMap<String, Vec<EventRecord>>,
    /// The synthesis plan, or the discovery text when there is none.
    pub result: String,
    pub tool_calls: Vec<ToolCallRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub degraded_stages: Vec<StageName>,
}

impl RecommendationResponse {
    pub fn from_state(state: &PipelineState, fallback: &[Activity], fallback_count: usize) -> Self {
        let events_text = state.events.as_deref().unwrap_or_default();
        let formatted = format_events(
            events_text,
            fallback,
            fallback_count,
            &state.child_profile.location,
        );
        let age_appropriate = formatted
            .events
            .iter()
            .filter(|e| {
                e.age_range.is_some()
                    || has_age_indicator(&format!(
                        "{} {}",
                        e.title,
                        e.description.as_deref().unwrap_or_default()
                    ))
            })
            .count();
        let result = state
            .final_plan
            .as_deref()
            .filter(|plan| !plan.trim().is_empty())
            .unwrap_or(events_text)
            .to_string();

        Self {
            request_id: state.request_id.clone(),
            total_found: formatted.events.len(),
            age_appropriate,
            events: formatted.events,
            categorized: formatted.categorized,
            result,
            tool_calls: state.tool_calls.clone(),
            degraded_stages: state.degraded_stages.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kidplanner_discovery::mock_events;
    use kidplanner_shared::render_listing;
    use proptest::prelude::*;

    const LISTING: &str = "Found 2 events in Downtown:

1. **Kids Science Workshop**
   \u{1F4CD} Science Center - 123 Science St, Downtown
   \u{1F4C5} 2025-01-15 at 10:00 AM
   \u{1F476} Ages 6-12
   \u{1F4B0} $15
   \u{1F3F7}\u{FE0F} STEM
   \u{1F517} https://example.com/science
2. Pumpkin Patch
   - \u{1F4B0} Free
   Bring boots.
";

    #[test]
    fn parses_markers_and_strips_emphasis() {
        let events = parse_events(LISTING);
        assert_eq!(events.len(), 2);

        let science = &events[0];
        assert_eq!(science.title, "Kids Science Workshop");
        assert_eq!(
            science.location.as_deref(),
            Some("Science Center - 123 Science St, Downtown")
        );
        assert_eq!(science.date.as_deref(), Some("2025-01-15 at 10:00 AM"));
        assert_eq!(science.age_range.as_deref(), Some("Ages 6-12"));
        assert_eq!(science.category.as_deref(), Some("STEM"));
        assert_eq!(science.link.as_deref(), Some("https://example.com/science"));

        let patch = &events[1];
        assert_eq!(patch.price.as_deref(), Some("Free"));
        assert_eq!(patch.category, None);
    }

    #[test]
    fn markers_before_first_title_are_ignored() {
        let events = parse_events("\u{1F4CD} Nowhere\n1. Real Event\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].location, None);
    }

    #[test]
    fn title_without_separator_keeps_line() {
        let events = parse_events("3.Odd Title");
        assert_eq!(events[0].title, "3.Odd Title");
    }

    #[test]
    fn rendered_catalog_parses_back() {
        let catalog = mock_events();
        let events = parse_events(&render_listing("Catalog:", &catalog));
        assert_eq!(events.len(), catalog.len());
        assert_eq!(events[3].title, "Story Time at Library");
        assert_eq!(events[3].category.as_deref(), Some("Educational"));
    }

    #[test]
    fn empty_text_falls_back_to_catalog_slice() {
        let formatted = format_events("The model had nothing to say.", &mock_events(), 3, "Cleveland, OH");
        assert_eq!(formatted.events.len(), 3);
        assert_eq!(formatted.events[0].title, "Kids Science Workshop");
        assert!(formatted.events.iter().all(|e| e.link.is_some()));
    }

    #[test]
    fn categorize_uses_other_bucket() {
        let formatted = format_events(LISTING, &[], 3, "Downtown");
        assert_eq!(formatted.categorized["STEM"].len(), 1);
        assert_eq!(formatted.categorized[UNCATEGORIZED][0].title, "Pumpkin Patch");
    }

    #[test]
    fn generated_links() {
        let event = |title: &str, category: Option<&str>| EventRecord {
            title: title.into(),
            category: category.map(Into::into),
            ..EventRecord::default()
        };

        assert_eq!(
            event_link(&event("Search Eventbrite", Some("Eventbrite")), "Cleveland, OH"),
            "https://www.eventbrite.com/d/cleveland-oh/kids-family/"
        );
        assert_eq!(
            event_link(&event("Live Music Morning", Some("Eventbrite")), "Cleveland, OH"),
            "https://www.eventbrite.com/d/cleveland-oh/music--kids-family/"
        );
        assert!(
            event_link(&event("Story Time at Library", None), "Cleveland, OH")
                .starts_with("https://www.facebook.com/events/search/?q=story+time+Cleveland+OH")
        );
        assert!(
            event_link(&event("Natural History Museum", None), "Austin")
                .starts_with("https://www.google.com/search?q=museums+Austin+kids")
        );
        assert_eq!(
            event_link(&event("Dance Party", None), "Austin"),
            "https://www.google.com/search?q=Dance+Party+Austin+kids+family"
        );
    }

    fn listing_line() -> impl Strategy<Value = String> {
        prop_oneof![
            "[0-9]{1,2}\\. [A-Za-z*_ ]{0,20}",
            "[A-Za-z ]{0,12}".prop_map(|c| format!("\u{1F3F7}\u{FE0F} {c}")),
            "[A-Za-z0-9 ]{0,12}".prop_map(|l| format!("  \u{1F4CD} {l}")),
            "[0-9-]{0,5}".prop_map(|a| format!("\u{1F476} Ages {a}")),
            "\\PC{0,30}",
        ]
    }

    proptest! {
        #[test]
        fn formatting_is_total_and_partitions(lines in prop::collection::vec(listing_line(), 0..20)) {
            let text = lines.join("\n");
            let catalog = mock_events();
            let first = format_events(&text, &catalog, 3, "Cleveland, OH");
            let second = format_events(&text, &catalog, 3, "Cleveland, OH");

            prop_assert_eq!(&first, &second);
            prop_assert!(!first.events.is_empty());

            let bucketed: usize = first.categorized.values().map(Vec::len).sum();
            prop_assert_eq!(bucketed, first.events.len());
            for event in &first.events {
                let key = event.category.as_deref().map(str::trim).filter(|c| !c.is_empty())
                    .unwrap_or(UNCATEGORIZED);
                prop_assert!(first.categorized[key].contains(event));
            }
        }
    }
}
