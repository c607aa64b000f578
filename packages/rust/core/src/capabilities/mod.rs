//! Capability registry.
//!
//! Capabilities are the named, schema-typed functions a stage may ask the
//! text-completion service to invoke. Each receives explicit JSON arguments
//! and returns text. The registry never fails to its caller: unknown
//! names, malformed arguments, handler errors, panics and timeouts all
//! come back as explanatory result text.

mod discovery;
mod safety;
mod schedule;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use kidplanner_discovery::EventFinder;
use kidplanner_shared::{KidPlannerError, Result};

use crate::completion::CapabilityCall;

pub use discovery::DiscoverLocalEvents;
pub use schedule::{ScheduleFit, classify_schedule, price_in_dollars, travel_estimate, within_budget};

// ---------------------------------------------------------------------------
// Names and schemas
// ---------------------------------------------------------------------------

/// Which stage a capability belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityGroup {
    Discovery,
    Safety,
    Schedule,
}

/// The built-in capability catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityName {
    DiscoverLocalEvents,
    FilterByAgeAppropriateness,
    CategorizeActivities,
    GetWeatherImpact,
    ValidateAgeAppropriateness,
    CheckSafetyRequirements,
    AssessAccessibility,
    OptimizeSchedule,
    CalculateTravelTime,
    BudgetOptimization,
}

impl CapabilityName {
    pub const ALL: [Self; 10] = [
        Self::DiscoverLocalEvents,
        Self::FilterByAgeAppropriateness,
        Self::CategorizeActivities,
        Self::GetWeatherImpact,
        Self::ValidateAgeAppropriateness,
        Self::CheckSafetyRequirements,
        Self::AssessAccessibility,
        Self::OptimizeSchedule,
        Self::CalculateTravelTime,
        Self::BudgetOptimization,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DiscoverLocalEvents => "discover_local_events",
            Self::FilterByAgeAppropriateness => "filter_by_age_appropriateness",
            Self::CategorizeActivities => "categorize_activities",
            Self::GetWeatherImpact => "get_weather_impact",
            Self::ValidateAgeAppropriateness => "validate_age_appropriateness",
            Self::CheckSafetyRequirements => "check_safety_requirements",
            Self::AssessAccessibility => "assess_accessibility",
            Self::OptimizeSchedule => "optimize_schedule",
            Self::CalculateTravelTime => "calculate_travel_time",
            Self::BudgetOptimization => "budget_optimization",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    pub fn group(self) -> CapabilityGroup {
        match self {
            Self::DiscoverLocalEvents
            | Self::FilterByAgeAppropriateness
            | Self::CategorizeActivities
            | Self::GetWeatherImpact => CapabilityGroup::Discovery,
            Self::ValidateAgeAppropriateness
            | Self::CheckSafetyRequirements
            | Self::AssessAccessibility => CapabilityGroup::Safety,
            Self::OptimizeSchedule | Self::CalculateTravelTime | Self::BudgetOptimization => {
                CapabilityGroup::Schedule
            }
        }
    }

    /// Every capability in `group`, in catalog order.
    pub fn in_group(group: CapabilityGroup) -> Vec<Self> {
        Self::ALL.into_iter().filter(|c| c.group() == group).collect()
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::DiscoverLocalEvents => {
                "Discover local events and activities for children near a location."
            }
            Self::FilterByAgeAppropriateness => {
                "Keep only the events whose age range includes the child's age."
            }
            Self::CategorizeActivities => {
                "Categorize activities and put those matching the child's interests first."
            }
            Self::GetWeatherImpact => "Analyze the weather impact on outdoor activities.",
            Self::ValidateAgeAppropriateness => {
                "Validate that one activity is age-appropriate for the child."
            }
            Self::CheckSafetyRequirements => {
                "List safety considerations for an activity by venue type and category."
            }
            Self::AssessAccessibility => {
                "Assess accessibility of an activity for the given special needs."
            }
            Self::OptimizeSchedule => {
                "Classify activities against the family's available days and preferred times."
            }
            Self::CalculateTravelTime => "Estimate travel time from home to each activity.",
            Self::BudgetOptimization => {
                "Split activities into within-budget and over-budget for a budget tier."
            }
        }
    }

    /// JSON Schema for the capability's arguments.
    pub fn parameters(self) -> Value {
        let activity = activity_schema();
        let activities = json!({"type": "array", "items": activity});
        match self {
            Self::DiscoverLocalEvents => json!({
                "type": "object",
                "properties": {
                    "location": {"type": "string", "description": "City or neighborhood"},
                    "age_range": {"type": "string", "description": "Child age, e.g. \"8\""},
                    "activity_types": {"type": "array", "items": {"type": "string"}},
                    "date_range": {"type": "string", "description": "e.g. next_2_weeks"}
                },
                "required": ["location"]
            }),
            Self::FilterByAgeAppropriateness => json!({
                "type": "object",
                "properties": {
                    "events": activities,
                    "child_age": {"type": "integer", "minimum": 1}
                },
                "required": ["events", "child_age"]
            }),
            Self::CategorizeActivities => json!({
                "type": "object",
                "properties": {
                    "events": activities,
                    "interests": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["events"]
            }),
            Self::GetWeatherImpact => json!({
                "type": "object",
                "properties": {
                    "activities": activities,
                    "location": {"type": "string"}
                },
                "required": ["activities", "location"]
            }),
            Self::ValidateAgeAppropriateness => json!({
                "type": "object",
                "properties": {
                    "activity": activity,
                    "child_age": {"type": "integer", "minimum": 1}
                },
                "required": ["activity", "child_age"]
            }),
            Self::CheckSafetyRequirements => json!({
                "type": "object",
                "properties": {"activity": activity},
                "required": ["activity"]
            }),
            Self::AssessAccessibility => json!({
                "type": "object",
                "properties": {
                    "activity": activity,
                    "special_needs": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["activity"]
            }),
            Self::OptimizeSchedule => json!({
                "type": "object",
                "properties": {
                    "activities": activities,
                    "family_schedule": {
                        "type": "object",
                        "properties": {
                            "available_days": {
                                "type": "array",
                                "items": {"type": "string", "enum": ["weekend", "weekday", "any"]}
                            },
                            "preferred_times": {
                                "type": "array",
                                "items": {"type": "string", "enum": ["morning", "afternoon", "evening"]}
                            },
                            "transportation": {
                                "type": "string",
                                "enum": ["car", "transit", "walk", "bike"]
                            }
                        }
                    }
                },
                "required": ["activities", "family_schedule"]
            }),
            Self::CalculateTravelTime => json!({
                "type": "object",
                "properties": {
                    "activities": activities,
                    "home_location": {"type": "string"}
                },
                "required": ["activities", "home_location"]
            }),
            Self::BudgetOptimization => json!({
                "type": "object",
                "properties": {
                    "activities": activities,
                    "budget_preference": {
                        "type": "string",
                        "enum": ["budget", "moderate", "premium"]
                    }
                },
                "required": ["activities", "budget_preference"]
            }),
        }
    }

    pub fn schema(self) -> CapabilitySchema {
        CapabilitySchema {
            name: self.as_str().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

impl std::fmt::Display for CapabilityName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn activity_schema() -> Value {
    let text = json!({"type": "string"});
    json!({
        "type": "object",
        "properties": {
            "title": text, "location": text, "address": text, "date": text,
            "time": text, "age_range": text, "price": text, "category": text,
            "description": text, "url": text, "venue_type": text
        },
        "required": ["title"]
    })
}

/// What the text-completion service is told about a capability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilitySchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the argument object.
    pub parameters: Value,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// The implementation behind a capability name.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    async fn call(&self, arguments: Value) -> Result<String>;
}

/// A synchronous capability that only looks at its arguments.
struct PureCapability(fn(Value) -> Result<String>);

#[async_trait]
impl CapabilityHandler for PureCapability {
    async fn call(&self, arguments: Value) -> Result<String> {
        (self.0)(arguments)
    }
}

/// Decode a capability's argument object.
pub(crate) fn parse_args<T: DeserializeOwned>(name: CapabilityName, arguments: Value) -> Result<T> {
    serde_json::from_value(arguments)
        .map_err(|e| KidPlannerError::Capability(format!("invalid arguments for {name}: {e}")))
}

// ---------------------------------------------------------------------------
// CapabilityRegistry
// ---------------------------------------------------------------------------

struct Registered {
    schema: CapabilitySchema,
    handler: Arc<dyn CapabilityHandler>,
}

/// Name → handler table consulted by the stage executor.
#[derive(Default)]
pub struct CapabilityRegistry {
    entries: BTreeMap<String, Registered>,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CapabilityRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The full built-in catalog, with discovery backed by `finder`.
    pub fn standard(finder: EventFinder) -> Self {
        let mut registry = Self::new();
        let pure = |f: fn(Value) -> Result<String>| -> Arc<dyn CapabilityHandler> {
            Arc::new(PureCapability(f))
        };

        registry.register_builtin(
            CapabilityName::DiscoverLocalEvents,
            Arc::new(DiscoverLocalEvents::new(finder)),
        );
        registry.register_builtin(
            CapabilityName::FilterByAgeAppropriateness,
            pure(discovery::filter_by_age_appropriateness),
        );
        registry.register_builtin(
            CapabilityName::CategorizeActivities,
            pure(discovery::categorize_activities),
        );
        registry.register_builtin(
            CapabilityName::GetWeatherImpact,
            pure(discovery::get_weather_impact),
        );
        registry.register_builtin(
            CapabilityName::ValidateAgeAppropriateness,
            pure(safety::validate_age_appropriateness),
        );
        registry.register_builtin(
            CapabilityName::CheckSafetyRequirements,
            pure(safety::check_safety_requirements),
        );
        registry.register_builtin(
            CapabilityName::AssessAccessibility,
            pure(safety::assess_accessibility),
        );
        registry.register_builtin(CapabilityName::OptimizeSchedule, pure(schedule::optimize_schedule));
        registry.register_builtin(
            CapabilityName::CalculateTravelTime,
            pure(schedule::calculate_travel_time),
        );
        registry.register_builtin(
            CapabilityName::BudgetOptimization,
            pure(schedule::budget_optimization),
        );

        registry
    }

    fn register_builtin(&mut self, name: CapabilityName, handler: Arc<dyn CapabilityHandler>) {
        self.register(name.schema(), handler);
    }

    /// Add or replace a capability.
    pub fn register(&mut self, schema: CapabilitySchema, handler: Arc<dyn CapabilityHandler>) {
        debug!(capability = %schema.name, "registering capability");
        self.entries
            .insert(schema.name.clone(), Registered { schema, handler });
    }

    /// Replace the handler of a built-in capability, keeping its schema.
    pub fn replace(&mut self, name: CapabilityName, handler: Arc<dyn CapabilityHandler>) {
        self.register_builtin(name, handler);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered capability names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Schemas for the registered subset of `names`, in the given order.
    pub fn schemas(&self, names: &[CapabilityName]) -> Vec<CapabilitySchema> {
        names
            .iter()
            .filter_map(|name| self.entries.get(name.as_str()))
            .map(|entry| entry.schema.clone())
            .collect()
    }

    /// Run one capability call and render the outcome as text.
    ///
    /// The handler runs on its own task so that a panic is contained, and is
    /// aborted if it outlives `timeout`.
    #[instrument(skip_all, fields(capability = %call.name))]
    pub async fn invoke(&self, call: &CapabilityCall, timeout: Duration) -> String {
        let Some(entry) = self.entries.get(&call.name) else {
            warn!("unknown capability requested");
            return format!(
                "Unknown capability '{}'. Available capabilities: {}.",
                call.name,
                self.names().join(", ")
            );
        };

        let handler = Arc::clone(&entry.handler);
        let arguments = call.arguments.clone();
        let mut task = tokio::spawn(async move { handler.call(arguments).await });

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(Ok(text))) => {
                debug!(chars = text.len(), "capability completed");
                text
            }
            Ok(Ok(Err(e))) => {
                warn!(error = %e, "capability failed");
                format!("Capability {} failed: {e}", call.name)
            }
            Ok(Err(join_error)) => {
                warn!(error = %join_error, "capability task aborted");
                format!("Capability {} failed: the handler crashed", call.name)
            }
            Err(_) => {
                task.abort();
                warn!(timeout_secs = timeout.as_secs_f64(), "capability timed out");
                format!(
                    "Capability {} failed: {}",
                    call.name,
                    KidPlannerError::timeout(call.name.as_str(), timeout)
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait]
    impl CapabilityHandler for Failing {
        async fn call(&self, _arguments: Value) -> Result<String> {
            Err(KidPlannerError::Network("venue API unreachable".into()))
        }
    }

    struct Slow;

    #[async_trait]
    impl CapabilityHandler for Slow {
        async fn call(&self, _arguments: Value) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("too late".into())
        }
    }

    struct Panicking;

    #[async_trait]
    impl CapabilityHandler for Panicking {
        async fn call(&self, _arguments: Value) -> Result<String> {
            panic!("handler bug");
        }
    }

    fn call(name: &str, arguments: Value) -> CapabilityCall {
        CapabilityCall::new("call_1", name, arguments)
    }

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[test]
    fn catalog_groups() {
        assert_eq!(CapabilityName::in_group(CapabilityGroup::Discovery).len(), 4);
        assert_eq!(CapabilityName::in_group(CapabilityGroup::Safety).len(), 3);
        assert_eq!(CapabilityName::in_group(CapabilityGroup::Schedule).len(), 3);
        for name in CapabilityName::ALL {
            assert_eq!(CapabilityName::from_name(name.as_str()), Some(name));
            assert_eq!(name.parameters()["type"], "object");
        }
    }

    #[test]
    fn standard_registry_has_every_capability() {
        let registry = CapabilityRegistry::standard(EventFinder::with_mock_catalog());
        assert_eq!(registry.len(), CapabilityName::ALL.len());

        let schemas = registry.schemas(&CapabilityName::in_group(CapabilityGroup::Schedule));
        let names: Vec<_> = schemas.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            ["optimize_schedule", "calculate_travel_time", "budget_optimization"]
        );
    }

    #[tokio::test]
    async fn unknown_capability_is_text() {
        let registry = CapabilityRegistry::standard(EventFinder::with_mock_catalog());
        let out = registry.invoke(&call("book_tickets", json!({})), TIMEOUT).await;
        assert!(out.starts_with("Unknown capability 'book_tickets'"));
    }

    #[tokio::test]
    async fn bad_arguments_are_text() {
        let registry = CapabilityRegistry::standard(EventFinder::with_mock_catalog());
        let out = registry
            .invoke(&call("validate_age_appropriateness", json!({"child_age": "eight"})), TIMEOUT)
            .await;
        assert!(out.contains("invalid arguments for validate_age_appropriateness"), "{out}");
    }

    #[tokio::test]
    async fn handler_errors_panics_and_timeouts_are_text() {
        let mut registry = CapabilityRegistry::new();
        registry.replace(CapabilityName::CheckSafetyRequirements, Arc::new(Failing));
        registry.replace(CapabilityName::AssessAccessibility, Arc::new(Panicking));
        registry.replace(CapabilityName::OptimizeSchedule, Arc::new(Slow));

        let out = registry
            .invoke(&call("check_safety_requirements", json!({})), TIMEOUT)
            .await;
        assert_eq!(
            out,
            "Capability check_safety_requirements failed: network error: venue API unreachable"
        );

        let out = registry.invoke(&call("assess_accessibility", json!({})), TIMEOUT).await;
        assert!(out.contains("crashed"));

        let out = registry
            .invoke(&call("optimize_schedule", json!({})), Duration::from_millis(50))
            .await;
        assert!(out.contains("timed out"), "{out}");
    }
}
