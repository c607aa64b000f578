//! Discovery-group capabilities: find, filter, categorize, weather.

use std::fmt::Write;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use kidplanner_discovery::{EventFinder, EventQuery, infer_category, interest_matches_category};
use kidplanner_shared::{Activity, AgeFit, Result, assess_age, parse_age_range, render_listing};

use super::{CapabilityHandler, CapabilityName, parse_args};

static FIRST_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("number regex"));

/// Venue types treated as outdoors.
const OUTDOOR_VENUES: &[&str] = &["Sports Facility", "Park"];

/// Mock forecast. There is no weather provider.
const FORECAST: (&str, &str) = ("Sunny", "Perfect for outdoor activities");

// ---------------------------------------------------------------------------
// discover_local_events
// ---------------------------------------------------------------------------

/// The child's age as the model sends it: a number or a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AgeArg {
    Years(u32),
    Text(String),
}

impl AgeArg {
    /// A single age. Ranges such as `6-12` carry no single age and yield `None`.
    fn child_age(&self) -> Option<u32> {
        match self {
            Self::Years(years) => Some(*years),
            Self::Text(text) if parse_age_range(text).is_some() => None,
            Self::Text(text) => FIRST_NUMBER_RE.find(text)?.as_str().parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DiscoverArgs {
    location: String,
    #[serde(default, alias = "child_age")]
    age_range: Option<AgeArg>,
    #[serde(default)]
    activity_types: Vec<String>,
    #[serde(default)]
    date_range: Option<String>,
}

/// Looks up events through an [`EventFinder`] and renders them as a listing.
pub struct DiscoverLocalEvents {
    finder: EventFinder,
}

impl DiscoverLocalEvents {
    pub fn new(finder: EventFinder) -> Self {
        Self { finder }
    }
}

#[async_trait]
impl CapabilityHandler for DiscoverLocalEvents {
    async fn call(&self, arguments: Value) -> Result<String> {
        let args: DiscoverArgs = parse_args(CapabilityName::DiscoverLocalEvents, arguments)?;
        let query = EventQuery {
            location: args.location.clone(),
            child_age: args.age_range.as_ref().and_then(AgeArg::child_age),
            activity_types: args.activity_types.clone(),
            date_range: args.date_range.unwrap_or_default(),
        };

        let outcome = self.finder.find(&query).await;
        if outcome.activities.is_empty() {
            return Ok(format!("No events found in {}.", args.location));
        }

        let mut activities = outcome.activities;
        // Preferred activity types first; sort_by_key is stable.
        activities.sort_by_key(|a| !matches_any_type(a, &args.activity_types));
        debug!(count = activities.len(), "events listed");

        let header = if outcome.location_matched {
            format!("Found {} events in {}:", activities.len(), args.location)
        } else {
            format!(
                "No events listed for {}; showing {} popular picks instead:",
                args.location,
                activities.len()
            )
        };
        let mut out = render_listing(&header, &activities);
        if !outcome.errors.is_empty() {
            let _ = writeln!(out, "Some sources were unavailable: {}", outcome.errors.join("; "));
        }
        Ok(out)
    }
}

fn matches_any_type(activity: &Activity, types: &[String]) -> bool {
    let text = format!("{} {}", activity.title, activity.description).to_lowercase();
    types.iter().any(|t| {
        interest_matches_category(t, &activity.category)
            || (!t.trim().is_empty() && text.contains(&t.trim().to_lowercase()))
    })
}

// ---------------------------------------------------------------------------
// filter_by_age_appropriateness
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FilterArgs {
    events: Vec<Activity>,
    child_age: u32,
}

pub(super) fn filter_by_age_appropriateness(arguments: Value) -> Result<String> {
    let args: FilterArgs = parse_args(CapabilityName::FilterByAgeAppropriateness, arguments)?;
    let total = args.events.len();
    let suitable: Vec<Activity> = args
        .events
        .into_iter()
        .filter(|e| {
            let context = format!("{} {}", e.title, e.description);
            assess_age(&e.age_range, &context, args.child_age).0 == AgeFit::Appropriate
        })
        .collect();

    if suitable.is_empty() {
        return Ok(format!(
            "None of the {total} events is clearly appropriate for a {}-year-old.",
            args.child_age
        ));
    }
    let header = format!(
        "Age-appropriate events for {}-year-old ({} of {total}):",
        args.child_age,
        suitable.len()
    );
    Ok(render_listing(&header, &suitable))
}

// ---------------------------------------------------------------------------
// categorize_activities
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CategorizeArgs {
    events: Vec<Activity>,
    #[serde(default)]
    interests: Vec<String>,
}

pub(super) fn categorize_activities(arguments: Value) -> Result<String> {
    let args: CategorizeArgs = parse_args(CapabilityName::CategorizeActivities, arguments)?;

    let mut events: Vec<Activity> = args
        .events
        .into_iter()
        .map(|mut e| {
            if e.category.trim().is_empty() {
                let text = format!("{} {}", e.title, e.description);
                e.category = infer_category(&text).unwrap_or("Other").to_string();
            }
            e
        })
        .collect();

    events.sort_by_key(|e| {
        !args
            .interests
            .iter()
            .any(|i| interest_matches_category(i, &e.category))
    });

    let interests = if args.interests.is_empty() {
        "none given".to_string()
    } else {
        args.interests.join(", ")
    };
    Ok(render_listing(
        &format!("Activities categorized by interests ({interests}):"),
        &events,
    ))
}

// ---------------------------------------------------------------------------
// get_weather_impact
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WeatherArgs {
    activities: Vec<Activity>,
    location: String,
}

fn is_outdoor(activity: &Activity) -> bool {
    OUTDOOR_VENUES.contains(&activity.venue_type.as_str())
        || activity.category.eq_ignore_ascii_case("Nature & Outdoor")
}

pub(super) fn get_weather_impact(arguments: Value) -> Result<String> {
    let args: WeatherArgs = parse_args(CapabilityName::GetWeatherImpact, arguments)?;
    let (conditions, impact) = FORECAST;

    let mut out = format!("Weather in {}: {conditions}\nImpact: {impact}\n\n", args.location);
    let outdoor: Vec<&Activity> = args.activities.iter().filter(|a| is_outdoor(a)).collect();
    if outdoor.is_empty() {
        out.push_str("No outdoor activities scheduled.\n");
    } else {
        out.push_str("Outdoor activities affected:\n");
        for activity in outdoor {
            let _ = writeln!(out, "- {} on {}", activity.title, activity.date);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kidplanner_discovery::mock_events;
    use serde_json::json;

    #[tokio::test]
    async fn discover_renders_marker_listing() {
        let handler = DiscoverLocalEvents::new(EventFinder::with_mock_catalog());
        let out = handler
            .call(json!({"location": "Downtown", "age_range": "8", "activity_types": []}))
            .await
            .unwrap();

        assert!(out.starts_with("Found 1 events in Downtown:"));
        assert!(out.contains("1. Kids Science Workshop"));
        assert!(out.contains("\u{1F4CD} Science Center - 123 Science St, Downtown"));
        assert!(out.contains("\u{1F476} Ages 6-12"));
    }

    #[tokio::test]
    async fn discover_falls_back_and_drops_wrong_ages() {
        let handler = DiscoverLocalEvents::new(EventFinder::with_mock_catalog());
        let out = handler
            .call(json!({"location": "Cleveland, OH", "child_age": 5}))
            .await
            .unwrap();

        // First three catalog entries, minus the ones that exclude a 5-year-old.
        assert!(out.starts_with("No events listed for Cleveland, OH"));
        assert!(!out.contains("Kids Science Workshop"));
        assert!(!out.contains("Soccer Skills Clinic"));
        assert!(out.contains("Art & Craft Session"));
    }

    #[tokio::test]
    async fn discover_prefers_requested_types() {
        let handler = DiscoverLocalEvents::new(EventFinder::with_mock_catalog());
        let out = handler
            .call(json!({"location": "", "activity_types": ["sports"]}))
            .await
            .unwrap();
        assert!(out.contains("1. Soccer Skills Clinic"), "{out}");
    }

    #[test]
    fn age_argument_shapes() {
        assert_eq!(AgeArg::Years(8).child_age(), Some(8));
        assert_eq!(AgeArg::Text("8".into()).child_age(), Some(8));
        assert_eq!(AgeArg::Text("age 10".into()).child_age(), Some(10));
        assert_eq!(AgeArg::Text("6-12".into()).child_age(), None);
    }

    #[test]
    fn filter_keeps_only_matching_ranges() {
        let out = filter_by_age_appropriateness(json!({
            "events": mock_events(),
            "child_age": 5
        }))
        .unwrap();
        assert!(out.contains("(3 of 6)"), "{out}");
        assert!(out.contains("Art & Craft Session"));
        assert!(out.contains("Story Time at Library"));
        assert!(out.contains("Dance Party"));
        assert!(!out.contains("Coding for Kids"));
    }

    #[test]
    fn categorize_puts_interests_first() {
        let out = categorize_activities(json!({
            "events": [
                {"title": "Story Time", "category": "Educational"},
                {"title": "Robot Building Club"},
            ],
            "interests": ["science"]
        }))
        .unwrap();
        let robot = out.find("Robot Building Club").unwrap();
        let story = out.find("Story Time").unwrap();
        assert!(robot < story);
        assert!(out.contains("\u{1F3F7}\u{FE0F} STEM"));
    }

    #[test]
    fn weather_lists_outdoor_activities() {
        let out = get_weather_impact(json!({
            "activities": mock_events(),
            "location": "Cleveland"
        }))
        .unwrap();
        assert!(out.starts_with("Weather in Cleveland: Sunny"));
        assert!(out.contains("- Soccer Skills Clinic on 2025-01-17"));
        assert!(!out.contains("Dance Party"));
    }
}
