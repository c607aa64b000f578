//! Plain-text event listing grammar.
//!
//! Discovery output travels between stages as free text. The format is a
//! numbered title line followed by marker-prefixed detail lines:
//!
//! ```text
//! 1. Kids Science Workshop
//!    📍 Science Center - 123 Science St, Downtown
//!    📅 2025-01-15 at 10:00 AM
//!    👶 Ages 6-12
//!    💰 $15
//!    🏷️ STEM
//!    📝 Hands-on science experiments for kids
//!    🔗 https://example.com/science-workshop
//! ```
//!
//! The renderer lives here so that the writer and the reader share a
//! single marker table.

use std::fmt::Write;

use crate::types::Activity;

/// The event field a marker line populates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventField {
    Location,
    Date,
    AgeRange,
    Price,
    Category,
    Description,
    Link,
}

/// Marker prefixes in match order. The first matching prefix wins, so the
/// tag with its variation selector is listed before the bare tag.
pub const MARKERS: &[(&str, EventField)] = &[
    ("\u{1F4CD}", EventField::Location),          // 📍
    ("\u{1F4C5}", EventField::Date),              // 📅
    ("\u{1F476}", EventField::AgeRange),          // 👶
    ("\u{1F4B0}", EventField::Price),             // 💰
    ("\u{1F3F7}\u{FE0F}", EventField::Category),  // 🏷️
    ("\u{1F3F7}", EventField::Category),          // 🏷
    ("\u{1F4DD}", EventField::Description),       // 📝
    ("\u{1F517}", EventField::Link),              // 🔗
];

/// Find the marker a (trimmed) line starts with, returning the field and
/// the remainder after the marker.
pub fn match_marker(line: &str) -> Option<(EventField, &str)> {
    MARKERS.iter().find_map(|(prefix, field)| {
        line.strip_prefix(prefix)
            .map(|rest| (*field, rest.trim_start_matches('\u{FE0F}').trim()))
    })
}

/// The marker written for a field.
pub fn marker_for(field: EventField) -> &'static str {
    match field {
        EventField::Location => "\u{1F4CD}",
        EventField::Date => "\u{1F4C5}",
        EventField::AgeRange => "\u{1F476}",
        EventField::Price => "\u{1F4B0}",
        EventField::Category => "\u{1F3F7}\u{FE0F}",
        EventField::Description => "\u{1F4DD}",
        EventField::Link => "\u{1F517}",
    }
}

/// Render activities as a numbered listing under `header`.
pub fn render_listing(header: &str, activities: &[Activity]) -> String {
    let mut out = String::new();
    if !header.is_empty() {
        let _ = writeln!(out, "{header}\n");
    }

    for (i, activity) in activities.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, activity.title);

        let location = join_non_empty(&activity.location, &activity.address, " - ");
        detail(&mut out, EventField::Location, &location);

        let when = join_non_empty(&activity.date, &activity.time, " at ");
        detail(&mut out, EventField::Date, &when);

        detail(&mut out, EventField::AgeRange, &age_label(&activity.age_range));
        detail(&mut out, EventField::Price, &activity.price);
        detail(&mut out, EventField::Category, &activity.category);
        detail(&mut out, EventField::Description, &activity.description);
        detail(&mut out, EventField::Link, &activity.url);
        out.push('\n');
    }

    out
}

fn detail(out: &mut String, field: EventField, value: &str) {
    if !value.trim().is_empty() {
        let _ = writeln!(out, "   {} {}", marker_for(field), value.trim());
    }
}

fn join_non_empty(a: &str, b: &str, sep: &str) -> String {
    match (a.trim(), b.trim()) {
        ("", "") => String::new(),
        (a, "") => a.to_string(),
        ("", b) => b.to_string(),
        (a, b) => format!("{a}{sep}{b}"),
    }
}

/// `6-12` renders as `Ages 6-12`; labels that already read as text are kept.
fn age_label(age_range: &str) -> String {
    let trimmed = age_range.trim();
    if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        format!("Ages {trimmed}")
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workshop() -> Activity {
        Activity {
            title: "Kids Science Workshop".into(),
            location: "Science Center".into(),
            address: "123 Science St, Downtown".into(),
            date: "2025-01-15".into(),
            time: "10:00 AM".into(),
            age_range: "6-12".into(),
            price: "$15".into(),
            category: "STEM".into(),
            description: "Hands-on science experiments for kids".into(),
            url: "https://example.com/science-workshop".into(),
            venue_type: "Museum".into(),
        }
    }

    #[test]
    fn render_uses_marker_lines() {
        let text = render_listing("Found 1 events in Downtown:", &[workshop()]);
        assert!(text.starts_with("Found 1 events in Downtown:\n\n1. Kids Science Workshop\n"));
        assert!(text.contains("\u{1F4CD} Science Center - 123 Science St, Downtown"));
        assert!(text.contains("\u{1F4C5} 2025-01-15 at 10:00 AM"));
        assert!(text.contains("\u{1F476} Ages 6-12"));
        assert!(text.contains("\u{1F3F7}\u{FE0F} STEM"));
    }

    #[test]
    fn render_skips_empty_fields() {
        let activity = Activity {
            title: "Pop-up Play".into(),
            ..Default::default()
        };
        let text = render_listing("", &[activity]);
        assert_eq!(text, "1. Pop-up Play\n\n");
    }

    #[test]
    fn match_marker_prefers_variation_selector_form() {
        let (field, rest) = match_marker("\u{1F3F7}\u{FE0F} Arts").unwrap();
        assert_eq!(field, EventField::Category);
        assert_eq!(rest, "Arts");

        let (field, rest) = match_marker("\u{1F3F7} Sports").unwrap();
        assert_eq!(field, EventField::Category);
        assert_eq!(rest, "Sports");

        assert!(match_marker("Tickets at the door").is_none());
    }

    #[test]
    fn every_written_marker_reads_back_as_its_field() {
        let fields = [
            EventField::Location,
            EventField::Date,
            EventField::AgeRange,
            EventField::Price,
            EventField::Category,
            EventField::Description,
            EventField::Link,
        ];
        for field in fields {
            let line = format!("{} value", marker_for(field));
            assert_eq!(match_marker(&line), Some((field, "value")), "{field:?}");
        }
    }

    #[test]
    fn age_label_keeps_text_labels() {
        assert_eq!(age_label("6-12"), "Ages 6-12");
        assert_eq!(age_label("All ages"), "All ages");
    }
}
