//! HTML event-listing page source.
//!
//! Fetches a calendar/listing page and extracts event cards with CSS
//! selectors. Works with the common `.event` card markup and with
//! schema.org `Event` microdata.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use kidplanner_shared::{Activity, KidPlannerError, Result};

use crate::category::infer_category;
use crate::{EventQuery, EventSource, USER_AGENT};

/// Most cards taken from a single page.
const MAX_EVENTS_PER_PAGE: usize = 25;

/// Link text and headings that are page chrome, not events.
const NAVIGATION_PHRASES: &[&str] = &[
    "learn more",
    "view all",
    "view event",
    "load more",
    "skip to",
    "open menu",
    "close menu",
    "submit an event",
    "sign in",
    "log in",
    "subscribe",
    "calendar",
];

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static CARD_SEL: LazyLock<Selector> = LazyLock::new(|| {
    sel(".event, .event-card, .event-item, [itemtype$='schema.org/Event']")
});
static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| sel("[itemprop='name'], .event-title, .title, h2, h3, h4"));
static DATE_SEL: LazyLock<Selector> =
    LazyLock::new(|| sel("[itemprop='startDate'], time, .date"));
static TIME_SEL: LazyLock<Selector> = LazyLock::new(|| sel(".time"));
static VENUE_SEL: LazyLock<Selector> =
    LazyLock::new(|| sel("[itemprop='location'], .venue, .location"));
static ADDRESS_SEL: LazyLock<Selector> = LazyLock::new(|| sel("[itemprop='address'], .address"));
static PRICE_SEL: LazyLock<Selector> = LazyLock::new(|| sel("[itemprop='price'], .price, .cost"));
static AGE_SEL: LazyLock<Selector> = LazyLock::new(|| sel(".ages, .age-range, .age"));
static CATEGORY_SEL: LazyLock<Selector> = LazyLock::new(|| sel(".category, .tag"));
static DESCRIPTION_SEL: LazyLock<Selector> =
    LazyLock::new(|| sel("[itemprop='description'], .description, .summary, p"));
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| sel("a[href]"));

/// An event source that scrapes one HTML listing page.
pub struct ListingPageSource {
    url: Url,
    client: Client,
}

impl ListingPageSource {
    /// Create a source for `url` with the given request timeout.
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .map_err(|e| {
                KidPlannerError::Network(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self { url, client })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl EventSource for ListingPageSource {
    fn name(&self) -> &str {
        self.url.host_str().unwrap_or("listing-page")
    }

    #[instrument(skip_all, fields(url = %self.url))]
    async fn fetch(&self, _query: &EventQuery) -> Result<Vec<Activity>> {
        let response = self
            .client
            .get(self.url.as_str())
            .send()
            .await
            .map_err(|e| KidPlannerError::Network(format!("{}: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KidPlannerError::Network(format!(
                "{}: HTTP {status}",
                self.url
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| KidPlannerError::Network(format!("{}: failed to read body: {e}", self.url)))?;

        let events = parse_listing_page(&body, &self.url);
        debug!(count = events.len(), "listing page parsed");
        Ok(events)
    }
}

/// Extract event cards from a listing page.
pub fn parse_listing_page(html: &str, base: &Url) -> Vec<Activity> {
    let doc = Html::parse_document(html);
    let location_hint = base.host_str().unwrap_or_default().to_string();

    doc.select(&CARD_SEL)
        .filter_map(|card| parse_card(card, base, &location_hint))
        .take(MAX_EVENTS_PER_PAGE)
        .collect()
}

fn parse_card(card: ElementRef<'_>, base: &Url, location_hint: &str) -> Option<Activity> {
    let title = clean_title(&first_text(card, &TITLE_SEL)?);
    if !is_valid_event_title(&title) {
        return None;
    }

    let description = first_text(card, &DESCRIPTION_SEL).unwrap_or_default();
    let category = first_text(card, &CATEGORY_SEL)
        .or_else(|| infer_category(&format!("{title} {description}")).map(String::from))
        .unwrap_or_default();

    let date = card
        .select(&DATE_SEL)
        .next()
        .map(|el| {
            el.value()
                .attr("datetime")
                .or_else(|| el.value().attr("content"))
                .map(String::from)
                .unwrap_or_else(|| element_text(el))
        })
        .unwrap_or_default();

    let url = card
        .select(&LINK_SEL)
        .filter_map(|a| a.value().attr("href"))
        .find_map(|href| base.join(href).ok())
        .map(|u| u.to_string())
        .unwrap_or_default();

    let venue = first_text(card, &VENUE_SEL).unwrap_or_else(|| location_hint.to_string());

    Some(Activity {
        title,
        location: venue,
        address: first_text(card, &ADDRESS_SEL).unwrap_or_default(),
        date,
        time: first_text(card, &TIME_SEL).unwrap_or_default(),
        age_range: first_text(card, &AGE_SEL).unwrap_or_default(),
        price: first_text(card, &PRICE_SEL).unwrap_or_default(),
        category,
        description,
        url,
        venue_type: String::new(),
    })
}

fn element_text(el: ElementRef<'_>) -> String {
    let raw = el.text().collect::<String>();
    WHITESPACE_RE.replace_all(raw.trim(), " ").into_owned()
}

fn first_text(card: ElementRef<'_>, selector: &Selector) -> Option<String> {
    card.select(selector)
        .map(element_text)
        .find(|text| !text.is_empty())
}

/// Strip UI residue such as `View Event →` and collapse whitespace.
pub fn clean_title(title: &str) -> String {
    let stripped = title.replace("View Event", "").replace('\u{2192}', " ");
    WHITESPACE_RE.replace_all(stripped.trim(), " ").into_owned()
}

/// Whether a heading looks like an individual event rather than page chrome.
pub fn is_valid_event_title(title: &str) -> bool {
    let trimmed = title.trim();
    if trimmed.chars().count() < 4 || trimmed.chars().count() > 200 {
        return false;
    }
    let lower = trimmed.to_lowercase();
    !NAVIGATION_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<html><body>
  <nav><a href="/calendar">Calendar</a></nav>
  <div class="event">
    <h3><a href="/events/robotics">Junior Robotics Lab View Event →</a></h3>
    <time datetime="2025-03-08">Sat, Mar 8</time>
    <span class="time">10:00 AM</span>
    <span class="venue">Great Lakes Science Center</span>
    <span class="price">$12</span>
    <span class="ages">Ages 7-12</span>
    <p>Build and program a small robot.</p>
  </div>
  <div class="event">
    <h3>Family Nature Hike</h3>
    <span class="price">Free</span>
    <p>Guided walk for all ages.</p>
  </div>
  <div class="event">
    <h3>View all events</h3>
  </div>
</body></html>
"#;

    #[test]
    fn parses_event_cards() {
        let base = Url::parse("https://events.example.org/kids").unwrap();
        let events = parse_listing_page(PAGE, &base);

        assert_eq!(events.len(), 2);
        let robotics = &events[0];
        assert_eq!(robotics.title, "Junior Robotics Lab");
        assert_eq!(robotics.date, "2025-03-08");
        assert_eq!(robotics.time, "10:00 AM");
        assert_eq!(robotics.location, "Great Lakes Science Center");
        assert_eq!(robotics.age_range, "Ages 7-12");
        assert_eq!(robotics.category, "STEM");
        assert_eq!(robotics.url, "https://events.example.org/events/robotics");

        let hike = &events[1];
        assert_eq!(hike.location, "events.example.org");
        assert_eq!(hike.category, "Nature & Outdoor");
        assert!(hike.url.is_empty());
    }

    #[test]
    fn title_validation_rejects_chrome() {
        assert!(is_valid_event_title("Junior Robotics Lab"));
        assert!(!is_valid_event_title("Learn more"));
        assert!(!is_valid_event_title("Go"));
        assert!(!is_valid_event_title(&"x".repeat(250)));
    }

    #[tokio::test]
    async fn fetches_from_mock_server() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/family-events"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/family-events", server.uri())).unwrap();
        let source = ListingPageSource::new(url, Duration::from_secs(5)).unwrap();
        let events = source.fetch(&EventQuery::new("Cleveland, OH")).await.unwrap();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn http_error_is_reported() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let url = Url::parse(&server.uri()).unwrap();
        let source = ListingPageSource::new(url, Duration::from_secs(5)).unwrap();
        let err = source.fetch(&EventQuery::new("Cleveland")).await.unwrap_err();
        assert!(matches!(err, KidPlannerError::Network(_)));
    }
}
