//! Schedule-group capabilities: schedule fit, travel time, budget.

use std::fmt::Write;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate, Weekday};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use kidplanner_shared::{Activity, AvailableDay, BudgetPreference, FamilySchedule, Result, TimeOfDay};

use super::{CapabilityName, parse_args};

static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").expect("iso date regex"));

/// `10:00 AM`, `4pm`, `7:30 p.m.`
static CLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?::\d{2})?\s*([ap])\.?\s*m\b").expect("clock regex")
});

static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\s*(\d+(?:\.\d+)?)").expect("price regex"));

// ---------------------------------------------------------------------------
// optimize_schedule
// ---------------------------------------------------------------------------

/// How an activity fits the family's schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleFit {
    /// Right day and a preferred time.
    Perfect,
    /// Right day, time not preferred or unknown.
    Partial,
    NoFit,
}

impl ScheduleFit {
    fn label(self) -> &'static str {
        match self {
            Self::Perfect => "\u{2705} Perfect fit",
            Self::Partial => "\u{26A0}\u{FE0F} Good fit, but time may not be ideal",
            Self::NoFit => "\u{274C} Doesn't fit current schedule",
        }
    }
}

fn weekday_of(date: &str) -> Option<Weekday> {
    if let Some(m) = ISO_DATE_RE.find(date) {
        if let Ok(parsed) = NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d") {
            return Some(parsed.weekday());
        }
    }
    date.split(|c: char| !c.is_ascii_alphabetic())
        .filter(|word| word.len() >= 3)
        .find_map(|word| word.parse::<Weekday>().ok())
}

fn is_weekend(day: Weekday) -> bool {
    matches!(day, Weekday::Sat | Weekday::Sun)
}

fn time_of_day(time: &str) -> Option<TimeOfDay> {
    if let Some(caps) = CLOCK_RE.captures(time) {
        let hour: u32 = caps[1].parse().ok()?;
        let pm = caps[2].eq_ignore_ascii_case("p");
        return Some(match (pm, hour) {
            (false, _) => TimeOfDay::Morning,
            (true, 12) | (true, 1..=4) => TimeOfDay::Afternoon,
            (true, _) => TimeOfDay::Evening,
        });
    }
    let lower = time.to_lowercase();
    [TimeOfDay::Morning, TimeOfDay::Afternoon, TimeOfDay::Evening]
        .into_iter()
        .find(|t| lower.contains(t.as_str()))
}

/// Classify one activity against the family's days and preferred times.
pub fn classify_schedule(activity: &Activity, schedule: &FamilySchedule) -> ScheduleFit {
    let days = &schedule.available_days;
    let day_fits = days.contains(&AvailableDay::Any)
        || match weekday_of(&format!("{} {}", activity.date, activity.time)) {
            Some(day) if is_weekend(day) => days.contains(&AvailableDay::Weekend),
            Some(_) => days.contains(&AvailableDay::Weekday),
            None => false,
        };

    if !day_fits {
        return ScheduleFit::NoFit;
    }
    match time_of_day(&activity.time) {
        Some(t) if schedule.preferred_times.contains(&t) => ScheduleFit::Perfect,
        _ => ScheduleFit::Partial,
    }
}

#[derive(Debug, Deserialize)]
struct OptimizeArgs {
    activities: Vec<Activity>,
    #[serde(default)]
    family_schedule: FamilySchedule,
}

pub(super) fn optimize_schedule(arguments: Value) -> Result<String> {
    let args: OptimizeArgs = parse_args(CapabilityName::OptimizeSchedule, arguments)?;
    let schedule = &args.family_schedule;

    let mut out = format!(
        "Schedule optimization for family availability ({}; {}; by {}):\n\n",
        schedule.days_label(),
        schedule.times_label(),
        schedule.transportation.as_str()
    );

    let mut counts = [0usize; 3];
    for activity in &args.activities {
        let fit = classify_schedule(activity, schedule);
        counts[fit as usize] += 1;
        let _ = writeln!(
            out,
            "{} on {} at {}\n  {}\n",
            activity.title,
            activity.date,
            activity.time,
            fit.label()
        );
    }
    let _ = writeln!(
        out,
        "Summary: {} perfect, {} partial, {} not fitting",
        counts[0], counts[1], counts[2]
    );
    Ok(out)
}

// ---------------------------------------------------------------------------
// calculate_travel_time
// ---------------------------------------------------------------------------

/// Coarse travel estimate by neighborhood keyword.
pub fn travel_estimate(activity: &Activity) -> &'static str {
    const BUCKETS: &[(&str, &str)] = &[
        ("downtown", "15-20 minutes"),
        ("midtown", "10-15 minutes"),
        ("eastside", "20-25 minutes"),
        ("westside", "25-30 minutes"),
    ];
    let text = format!("{} {}", activity.location, activity.address).to_lowercase();
    BUCKETS
        .iter()
        .find(|(keyword, _)| text.contains(keyword))
        .map_or("15-25 minutes", |(_, estimate)| estimate)
}

#[derive(Debug, Deserialize)]
struct TravelArgs {
    activities: Vec<Activity>,
    home_location: String,
}

pub(super) fn calculate_travel_time(arguments: Value) -> Result<String> {
    let args: TravelArgs = parse_args(CapabilityName::CalculateTravelTime, arguments)?;

    let mut out = format!("Travel time estimates from {}:\n\n", args.home_location);
    for activity in &args.activities {
        let _ = writeln!(out, "{} at {}", activity.title, activity.location);
        let _ = writeln!(out, "  \u{1F697} Travel time: {}", travel_estimate(activity));
        let _ = writeln!(out, "  \u{1F4CD} Address: {}\n", activity.address);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// budget_optimization
// ---------------------------------------------------------------------------

/// Price in dollars; "Free" is zero. `None` when no amount can be read.
pub fn price_in_dollars(price: &str) -> Option<f64> {
    if price.trim().is_empty() || price.to_lowercase().contains("free") {
        return Some(0.0);
    }
    PRICE_RE.captures(price)?.get(1)?.as_str().parse().ok()
}

/// Whether `price` fits the tier's ceiling. Unreadable prices pass.
pub fn within_budget(price: &str, preference: BudgetPreference) -> bool {
    match (preference.ceiling(), price_in_dollars(price)) {
        (Some(ceiling), Some(amount)) => amount <= f64::from(ceiling),
        _ => true,
    }
}

#[derive(Debug, Deserialize)]
struct BudgetArgs {
    activities: Vec<Activity>,
    #[serde(default)]
    budget_preference: String,
}

pub(super) fn budget_optimization(arguments: Value) -> Result<String> {
    let args: BudgetArgs = parse_args(CapabilityName::BudgetOptimization, arguments)?;
    let preference = match args.budget_preference.parse::<BudgetPreference>() {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "unrecognised budget preference, using moderate");
            BudgetPreference::Moderate
        }
    };

    let limit = match preference.ceiling() {
        Some(c) => format!("max ${c}/activity"),
        None => "no price limit".to_string(),
    };
    let mut out = format!("Budget optimization for {preference} preference ({limit}):\n\n");

    let (within, over): (Vec<&Activity>, Vec<&Activity>) = args
        .activities
        .iter()
        .partition(|a| within_budget(&a.price, preference));

    out.push_str("\u{2705} Within budget:\n");
    for activity in &within {
        let _ = writeln!(out, "  - {} ({})", activity.title, activity.price);
    }
    if !over.is_empty() {
        out.push_str("\n\u{26A0}\u{FE0F} Over budget:\n");
        for activity in &over {
            let _ = writeln!(out, "  - {} ({})", activity.title, activity.price);
        }
    }
    Ok(out)
}
