//! Local event discovery.
//!
//! Events come from one or more [`EventSource`]s: the built-in
//! [`MockCatalog`] and any configured HTML listing pages. [`EventFinder`]
//! queries them, merges the results, and narrows them to the requested
//! location and child age.

mod catalog;
mod category;
mod listing_page;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kidplanner_shared::{Activity, AgeFit, Result, SourcesConfig, assess_age};
use tracing::{debug, info, instrument, warn};
use url::Url;

pub use catalog::{MockCatalog, mock_events};
pub use category::{INTEREST_CATEGORIES, infer_category, interest_matches_category};
pub use listing_page::{ListingPageSource, clean_title, is_valid_event_title, parse_listing_page};

/// User-Agent string for listing-page requests.
pub(crate) const USER_AGENT: &str = concat!("KidPlanner/", env!("CARGO_PKG_VERSION"));

/// Number of events returned when nothing matches the location.
const DEFAULT_FALLBACK_COUNT: usize = 3;

// ---------------------------------------------------------------------------
// EventQuery / EventSource
// ---------------------------------------------------------------------------

/// What the caller is looking for.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub location: String,
    pub child_age: Option<u32>,
    pub activity_types: Vec<String>,
    pub date_range: String,
}

impl EventQuery {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Self::default()
        }
    }

    pub fn with_age(mut self, age: u32) -> Self {
        self.child_age = Some(age);
        self
    }
}

/// A provider of candidate activities.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Fetch every activity the source knows about for `query`.
    async fn fetch(&self, query: &EventQuery) -> Result<Vec<Activity>>;
}

// ---------------------------------------------------------------------------
// EventFinder
// ---------------------------------------------------------------------------

/// Result of a [`EventFinder::find`] call.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOutcome {
    pub activities: Vec<Activity>,
    /// False when no activity matched the location and the fallback was used.
    pub location_matched: bool,
    /// Per-source failures, rendered as `"<source>: <error>"`.
    pub errors: Vec<String>,
}

/// Queries all sources and narrows their results.
#[derive(Clone)]
pub struct EventFinder {
    sources: Vec<Arc<dyn EventSource>>,
    fallback_count: usize,
}

impl std::fmt::Debug for EventFinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.sources.iter().map(|s| s.name()).collect();
        f.debug_struct("EventFinder")
            .field("sources", &names)
            .field("fallback_count", &self.fallback_count)
            .finish()
    }
}

impl EventFinder {
    pub fn new(sources: Vec<Arc<dyn EventSource>>) -> Self {
        Self {
            sources,
            fallback_count: DEFAULT_FALLBACK_COUNT,
        }
    }

    /// A finder that only consults the built-in catalog.
    pub fn with_mock_catalog() -> Self {
        Self::new(vec![Arc::new(MockCatalog::new())])
    }

    /// Build the source list from configuration. Listing URLs that fail to
    /// parse are skipped with a warning.
    pub fn from_config(config: &SourcesConfig) -> Result<Self> {
        let mut sources: Vec<Arc<dyn EventSource>> = Vec::new();
        let timeout = Duration::from_secs(config.timeout_secs);

        for raw in &config.listing_urls {
            match Url::parse(raw) {
                Ok(url) => sources.push(Arc::new(ListingPageSource::new(url, timeout)?)),
                Err(e) => warn!(url = %raw, error = %e, "skipping invalid listing url"),
            }
        }
        if config.use_mock_catalog || sources.is_empty() {
            sources.push(Arc::new(MockCatalog::new()));
        }

        Ok(Self::new(sources))
    }

    pub fn with_fallback_count(mut self, count: usize) -> Self {
        self.fallback_count = count;
        self
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Query every source, merge, and filter to the query's location and age.
    ///
    /// Source failures are logged and collected; they never abort the search.
    #[instrument(skip_all, fields(location = %query.location))]
    pub async fn find(&self, query: &EventQuery) -> DiscoveryOutcome {
        let mut outcome = DiscoveryOutcome::default();
        let mut seen = HashSet::new();
        let mut merged = Vec::new();

        for source in &self.sources {
            match source.fetch(query).await {
                Ok(activities) => {
                    debug!(source = source.name(), count = activities.len(), "source fetched");
                    for activity in activities {
                        if seen.insert(activity.title.trim().to_lowercase()) {
                            merged.push(activity);
                        }
                    }
                }
                Err(e) => {
                    warn!(source = source.name(), error = %e, "event source failed");
                    outcome.errors.push(format!("{}: {e}", source.name()));
                }
            }
        }

        let local: Vec<Activity> = merged
            .iter()
            .filter(|a| location_matches(a, &query.location))
            .cloned()
            .collect();

        let mut activities = if local.is_empty() {
            info!(
                fallback = self.fallback_count,
                "no events matched location, using fallback"
            );
            merged.into_iter().take(self.fallback_count).collect()
        } else {
            outcome.location_matched = true;
            local
        };

        if let Some(age) = query.child_age {
            let suitable: Vec<Activity> = activities
                .iter()
                .filter(|a| {
                    assess_age(&a.age_range, &a.description, age).0 != AgeFit::Inappropriate
                })
                .cloned()
                .collect();
            // Never narrow to nothing.
            if !suitable.is_empty() {
                activities = suitable;
            }
        }

        info!(count = activities.len(), "events discovered");
        outcome.activities = activities;
        outcome
    }
}

/// Whether an activity is plausibly in (or near) `location`.
///
/// Matches when the query text appears in the venue or address, or when the
/// address's trailing area (after the last comma) appears in the query.
pub fn location_matches(activity: &Activity, location: &str) -> bool {
    let needle = location.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    let venue = activity.location.to_lowercase();
    let address = activity.address.to_lowercase();
    if venue.contains(&needle) || address.contains(&needle) {
        return true;
    }
    // "Cleveland, OH" vs an address ending in ", Cleveland"
    let city = needle.split(',').next().unwrap_or_default().trim();
    if !city.is_empty() && address.contains(city) {
        return true;
    }
    address
        .rsplit(',')
        .next()
        .map(str::trim)
        .is_some_and(|area| !area.is_empty() && needle.contains(area))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kidplanner_shared::KidPlannerError;

    struct FailingSource;

    #[async_trait]
    impl EventSource for FailingSource {
        fn name(&self) -> &str {
            "failing"
        }

        async fn fetch(&self, _query: &EventQuery) -> Result<Vec<Activity>> {
            Err(KidPlannerError::Network("connection refused".into()))
        }
    }

    fn activity(title: &str, address: &str, age_range: &str) -> Activity {
        Activity {
            title: title.into(),
            location: "Rec Center".into(),
            address: address.into(),
            age_range: age_range.into(),
            ..Activity::default()
        }
    }

    #[test]
    fn location_matching() {
        let a = activity("Swim", "12 Lake Rd, Cleveland", "");
        assert!(location_matches(&a, "Cleveland, OH"));
        assert!(location_matches(&a, "cleveland"));
        assert!(!location_matches(&a, "Austin, TX"));

        let downtown = activity("Workshop", "123 Science St, Downtown", "");
        assert!(location_matches(&downtown, "Downtown Cleveland"));
        assert!(location_matches(&downtown, ""));
    }

    #[tokio::test]
    async fn unmatched_location_falls_back_to_first_entries() {
        let finder = EventFinder::with_mock_catalog();
        let outcome = finder.find(&EventQuery::new("Reykjavik")).await;

        assert!(!outcome.location_matched);
        assert_eq!(outcome.activities.len(), 3);
        assert_eq!(outcome.activities[0].title, "Kids Science Workshop");
    }

    #[tokio::test]
    async fn filters_by_age_but_never_to_empty() {
        let catalog = MockCatalog::with_events(vec![
            activity("Toddler Tumble", "1 Main St, Cleveland", "1-3"),
            activity("Robotics", "2 Main St, Cleveland", "8-12"),
        ]);
        let finder = EventFinder::new(vec![Arc::new(catalog)]);

        let outcome = finder.find(&EventQuery::new("Cleveland").with_age(9)).await;
        assert!(outcome.location_matched);
        assert_eq!(outcome.activities.len(), 1);
        assert_eq!(outcome.activities[0].title, "Robotics");

        let outcome = finder.find(&EventQuery::new("Cleveland").with_age(17)).await;
        assert_eq!(outcome.activities.len(), 2);
    }

    #[tokio::test]
    async fn failing_source_is_collected_not_fatal() {
        let finder = EventFinder::new(vec![
            Arc::new(FailingSource),
            Arc::new(MockCatalog::new()),
        ]);
        let outcome = finder.find(&EventQuery::new("Downtown")).await;

        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].starts_with("failing:"));
        assert!(outcome.location_matched);
        assert_eq!(outcome.activities[0].title, "Kids Science Workshop");
    }

    #[tokio::test]
    async fn duplicate_titles_are_merged() {
        let finder = EventFinder::new(vec![
            Arc::new(MockCatalog::new()),
            Arc::new(MockCatalog::new()),
        ]);
        let outcome = finder.find(&EventQuery::new("")).await;
        assert_eq!(outcome.activities.len(), 6);
    }

    #[tokio::test]
    async fn listing_pages_from_config() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/events"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(
                r#"<div class="event"><h3>Kids Art Studio</h3>
                   <span class="address">44 Clay Ave, Cleveland</span>
                   <span class="ages">Ages 6-10</span></div>"#,
            ))
            .mount(&server)
            .await;

        let config = SourcesConfig {
            use_mock_catalog: false,
            listing_urls: vec![format!("{}/events", server.uri()), "not a url".into()],
            timeout_secs: 5,
        };
        let finder = EventFinder::from_config(&config).unwrap();
        assert_eq!(finder.source_names().len(), 1);

        let outcome = finder.find(&EventQuery::new("Cleveland").with_age(8)).await;
        assert!(outcome.location_matched);
        assert_eq!(outcome.activities[0].title, "Kids Art Studio");
        assert_eq!(outcome.activities[0].category, "Arts");
    }
}
