//! Core domain types for KidPlanner requests and activities.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{KidPlannerError, Result};

/// Oldest child the planner accepts.
pub const MAX_CHILD_AGE: u32 = 18;

// ---------------------------------------------------------------------------
// RequestId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one recommendation run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Generate a new time-sortable request identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Preference enums
// ---------------------------------------------------------------------------

/// How much the family is willing to spend per activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetPreference {
    Budget,
    #[default]
    Moderate,
    Premium,
}

impl BudgetPreference {
    /// Highest acceptable price in whole dollars; `None` means unrestricted.
    pub fn ceiling(self) -> Option<u32> {
        match self {
            Self::Budget => Some(15),
            Self::Moderate => Some(30),
            Self::Premium => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Budget => "budget",
            Self::Moderate => "moderate",
            Self::Premium => "premium",
        }
    }
}

impl FromStr for BudgetPreference {
    type Err = KidPlannerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "budget" => Ok(Self::Budget),
            "moderate" => Ok(Self::Moderate),
            "premium" => Ok(Self::Premium),
            other => Err(KidPlannerError::validation(format!(
                "unknown budget preference '{other}': expected budget, moderate, or premium"
            ))),
        }
    }
}

impl std::fmt::Display for BudgetPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which days the family can attend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvailableDay {
    Weekend,
    Weekday,
    Any,
}

impl AvailableDay {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weekend => "weekend",
            Self::Weekday => "weekday",
            Self::Any => "any",
        }
    }
}

impl FromStr for AvailableDay {
    type Err = KidPlannerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "weekend" => Ok(Self::Weekend),
            "weekday" => Ok(Self::Weekday),
            "any" => Ok(Self::Any),
            other => Err(KidPlannerError::validation(format!(
                "unknown day '{other}': expected weekend, weekday, or any"
            ))),
        }
    }
}

/// Preferred part of the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
}

impl TimeOfDay {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
        }
    }
}

impl FromStr for TimeOfDay {
    type Err = KidPlannerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "morning" => Ok(Self::Morning),
            "afternoon" => Ok(Self::Afternoon),
            "evening" => Ok(Self::Evening),
            other => Err(KidPlannerError::validation(format!(
                "unknown time of day '{other}': expected morning, afternoon, or evening"
            ))),
        }
    }
}

/// How the family gets around.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transportation {
    #[default]
    Car,
    Transit,
    Walk,
    Bike,
}

impl Transportation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Car => "car",
            Self::Transit => "transit",
            Self::Walk => "walk",
            Self::Bike => "bike",
        }
    }
}

impl FromStr for Transportation {
    type Err = KidPlannerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "car" => Ok(Self::Car),
            "transit" | "bus" | "train" => Ok(Self::Transit),
            "walk" | "walking" => Ok(Self::Walk),
            "bike" | "bicycle" => Ok(Self::Bike),
            other => Err(KidPlannerError::validation(format!(
                "unknown transportation '{other}': expected car, transit, walk, or bike"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Everything the planner knows about the child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildProfile {
    /// Age in years.
    pub age: u32,
    /// Free-text home location (city, neighborhood).
    pub location: String,
    /// Interests, most important first.
    #[serde(default)]
    pub interests: Vec<String>,
    /// Activity-type preferences such as "indoor" or "educational".
    #[serde(default)]
    pub activity_types: Vec<String>,
    /// Special-needs tags such as "wheelchair accessible".
    #[serde(default)]
    pub special_needs: Vec<String>,
    /// Spending tier.
    #[serde(default)]
    pub budget: BudgetPreference,
}

/// When and how the family can attend activities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilySchedule {
    #[serde(default = "default_available_days")]
    pub available_days: BTreeSet<AvailableDay>,
    #[serde(default = "default_preferred_times")]
    pub preferred_times: Vec<TimeOfDay>,
    #[serde(default)]
    pub transportation: Transportation,
}

impl Default for FamilySchedule {
    fn default() -> Self {
        Self {
            available_days: default_available_days(),
            preferred_times: default_preferred_times(),
            transportation: Transportation::default(),
        }
    }
}

impl FamilySchedule {
    /// Comma-joined available days, e.g. `weekend, weekday`.
    pub fn days_label(&self) -> String {
        self.available_days
            .iter()
            .map(|d| d.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Comma-joined preferred times, e.g. `morning, afternoon`.
    pub fn times_label(&self) -> String {
        self.preferred_times
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn default_available_days() -> BTreeSet<AvailableDay> {
    BTreeSet::from([AvailableDay::Weekend])
}

fn default_preferred_times() -> Vec<TimeOfDay> {
    vec![TimeOfDay::Morning, TimeOfDay::Afternoon]
}

fn default_request_date_range() -> String {
    "next_2_weeks".into()
}

/// One recommendation request, immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRequest {
    pub child: ChildProfile,
    #[serde(default)]
    pub schedule: FamilySchedule,
    /// Date window, e.g. `next_2_weeks`.
    #[serde(default = "default_request_date_range")]
    pub date_range: String,
}

impl ActivityRequest {
    /// Build a request with default schedule and date window.
    pub fn new(age: u32, location: impl Into<String>) -> Self {
        Self {
            child: ChildProfile {
                age,
                location: location.into(),
                interests: Vec::new(),
                activity_types: Vec::new(),
                special_needs: Vec::new(),
                budget: BudgetPreference::default(),
            },
            schedule: FamilySchedule::default(),
            date_range: default_request_date_range(),
        }
    }

    /// Reject requests the pipeline cannot meaningfully serve.
    pub fn validate(&self) -> Result<()> {
        if self.child.age == 0 || self.child.age > MAX_CHILD_AGE {
            return Err(KidPlannerError::validation(format!(
                "child age must be between 1 and {MAX_CHILD_AGE}, got {}",
                self.child.age
            )));
        }
        if self.child.location.trim().is_empty() {
            return Err(KidPlannerError::validation("location must not be empty"));
        }
        if self.date_range.trim().is_empty() {
            return Err(KidPlannerError::validation("date range must not be empty"));
        }
        if self.schedule.available_days.is_empty() {
            return Err(KidPlannerError::validation(
                "at least one available day is required",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Activities and events
// ---------------------------------------------------------------------------

/// A candidate activity as produced by an event source.
///
/// Every field defaults to empty so the same type can be deserialized from
/// loosely-shaped capability arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Activity {
    pub title: String,
    pub location: String,
    pub address: String,
    pub date: String,
    pub time: String,
    pub age_range: String,
    pub price: String,
    pub category: String,
    pub description: String,
    pub url: String,
    pub venue_type: String,
}

/// An event reconstructed from listing text. Best effort, not authoritative.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl From<&Activity> for EventRecord {
    fn from(activity: &Activity) -> Self {
        let location = match (non_empty(&activity.location), non_empty(&activity.address)) {
            (Some(loc), Some(addr)) => Some(format!("{loc} - {addr}")),
            (loc, addr) => loc.or(addr),
        };
        let date = match (non_empty(&activity.date), non_empty(&activity.time)) {
            (Some(date), Some(time)) => Some(format!("{date} at {time}")),
            (date, _) => date,
        };
        Self {
            title: activity.title.clone(),
            location,
            date,
            age_range: non_empty(&activity.age_range),
            price: non_empty(&activity.price),
            category: non_empty(&activity.category),
            description: non_empty(&activity.description),
            link: non_empty(&activity.url),
        }
    }
}
