//! Shared types, error model, and configuration for KidPlanner.
//!
//! This crate is the foundation depended on by all other KidPlanner crates.
//! It provides:
//! - [`KidPlannerError`], the unified error type
//! - Domain types ([`ActivityRequest`], [`Activity`], [`EventRecord`], [`RequestId`])
//! - The listing marker grammar ([`listing`])
//! - Configuration ([`AppConfig`], [`PipelineSettings`], config loading)

pub mod age;
pub mod config;
pub mod error;
pub mod listing;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use age::{AgeBasis, AgeFit, age_fit, assess_age, has_age_indicator, parse_age_range};
pub use config::{
    AppConfig, DefaultsConfig, OpenRouterConfig, PipelineConfig, PipelineSettings,
    SourcesConfig, api_key, config_dir, config_file_path, init_config, load_config,
    load_config_from,
};
pub use error::{KidPlannerError, Result};
pub use listing::{EventField, render_listing};
pub use types::{
    Activity, ActivityRequest, AvailableDay, BudgetPreference, ChildProfile, EventRecord,
    FamilySchedule, MAX_CHILD_AGE, RequestId, TimeOfDay, Transportation,
};
