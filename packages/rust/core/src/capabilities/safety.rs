//! Safety-group capabilities: age fit, safety considerations, accessibility.

use std::fmt::Write;

use serde::Deserialize;
use serde_json::Value;

use kidplanner_shared::{Activity, AgeBasis, AgeFit, Result, assess_age};

use super::{CapabilityName, parse_args};

#[derive(Debug, Deserialize)]
struct AgeCheckArgs {
    activity: Activity,
    child_age: u32,
}

pub(super) fn validate_age_appropriateness(arguments: Value) -> Result<String> {
    let args: AgeCheckArgs = parse_args(CapabilityName::ValidateAgeAppropriateness, arguments)?;
    let activity = &args.activity;
    let age = args.child_age;
    let context = format!("{} {}", activity.title, activity.description);

    let text = match assess_age(&activity.age_range, &context, age) {
        (AgeFit::Appropriate, AgeBasis::Range(min, max)) => format!(
            "\u{2705} {} is age-appropriate for {age}-year-old (ages {min}-{max})",
            activity.title
        ),
        (AgeFit::Inappropriate, AgeBasis::Range(min, max)) => format!(
            "\u{274C} {} is NOT age-appropriate for {age}-year-old (ages {min}-{max})",
            activity.title
        ),
        (AgeFit::Appropriate, AgeBasis::Keyword(keyword)) => format!(
            "\u{2705} {} appears age-appropriate for {age}-year-old (indicated for {keyword})",
            activity.title
        ),
        (AgeFit::Inappropriate, AgeBasis::Keyword(keyword)) => format!(
            "\u{26A0}\u{FE0F} {} may not be age-appropriate for {age}-year-old (indicated for {keyword})",
            activity.title
        ),
        _ => format!(
            "\u{26A0}\u{FE0F} {} - age appropriateness unclear, please verify",
            activity.title
        ),
    };
    Ok(text)
}

#[derive(Debug, Deserialize)]
struct SafetyArgs {
    activity: Activity,
}

fn venue_checks(venue_type: &str) -> &'static [&'static str] {
    match venue_type {
        "Sports Facility" => &[
            "Ensure proper safety equipment is provided",
            "Check if supervision is adequate for age group",
            "Verify first aid availability",
        ],
        "Museum" => &[
            "Generally safe environment",
            "Check for age-appropriate exhibits",
        ],
        "Community Center" => &[
            "Verify staff background checks",
            "Check supervision ratios",
        ],
        "Library" => &["Very safe environment", "Quiet, supervised setting"],
        "Park" => &[
            "Bring sun protection and water",
            "Agree on a meeting point in case you get separated",
        ],
        _ => &[],
    }
}

fn category_checks(category: &str) -> &'static [&'static str] {
    match category {
        "STEM" => &[
            "Check for chemical/material safety",
            "Ensure proper supervision for experiments",
        ],
        "Sports" => &[
            "Verify physical safety measures",
            "Check for injury prevention protocols",
        ],
        "Arts" => &[
            "Check for safe art materials",
            "Ensure proper ventilation if needed",
        ],
        _ => &[],
    }
}

pub(super) fn check_safety_requirements(arguments: Value) -> Result<String> {
    let args: SafetyArgs = parse_args(CapabilityName::CheckSafetyRequirements, arguments)?;
    let activity = &args.activity;

    let mut checks: Vec<&str> = venue_checks(activity.venue_type.trim()).to_vec();
    checks.extend_from_slice(category_checks(activity.category.trim()));
    if checks.is_empty() {
        checks.push("Standard adult supervision recommended");
    }

    let mut out = format!("Safety considerations for {}:\n", activity.title);
    for check in checks {
        let _ = writeln!(out, "  \u{2705} {check}");
    }
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct AccessibilityArgs {
    activity: Activity,
    #[serde(default)]
    special_needs: Vec<String>,
}

/// Venue types that are usually step-free.
const STEP_FREE_VENUES: &[&str] = &["Museum", "Library", "Community Center"];

pub(super) fn assess_accessibility(arguments: Value) -> Result<String> {
    let args: AccessibilityArgs = parse_args(CapabilityName::AssessAccessibility, arguments)?;
    let activity = &args.activity;
    let needs: Vec<&str> = args
        .special_needs
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .collect();

    if needs.is_empty() {
        return Ok(format!(
            "\u{2705} {} - No special accessibility requirements specified",
            activity.title
        ));
    }

    let venue = activity.venue_type.trim();
    let mut notes = Vec::new();
    for need in needs {
        let need = need.to_lowercase();
        if need.contains("wheelchair") || need.contains("mobility") {
            notes.push(if STEP_FREE_VENUES.contains(&venue) {
                "\u{2705} Wheelchair accessible (typical for this venue type)"
            } else {
                "\u{26A0}\u{FE0F} Contact venue to confirm wheelchair accessibility"
            });
        }
        if need.contains("sensory") || need.contains("autism") {
            notes.push(if venue == "Library" {
                "\u{2705} Quiet environment, good for sensory needs"
            } else {
                "\u{26A0}\u{FE0F} May be noisy - contact venue about sensory accommodations"
            });
        }
        if need.contains("learning") || need.contains("adhd") {
            notes.push("\u{2705} Check if venue offers learning support or accommodations");
        }
    }
    if notes.is_empty() {
        notes.push("\u{26A0}\u{FE0F} Contact venue to discuss the listed needs");
    }
    notes.dedup();

    let mut out = format!("Accessibility assessment for {}:\n", activity.title);
    for note in notes {
        let _ = writeln!(out, "  {note}");
    }
    Ok(out)
}
