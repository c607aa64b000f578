//! Core pipeline orchestration and domain logic for KidPlanner.
//!
//! This crate ties together the text-completion service, the capability
//! registry, and the per-stage executor into the recommendation pipeline,
//! and formats its output for callers.

pub mod capabilities;
pub mod completion;
pub mod formatter;
pub mod pipeline;
pub mod prompts;
pub mod stage;

pub use capabilities::{
    CapabilityGroup, CapabilityHandler, CapabilityName, CapabilityRegistry, CapabilitySchema,
};
pub use completion::{
    CapabilityCall, ChatMessage, Completion, OfflineCompletion, OpenRouterClient, Role,
    TextCompletion,
};
pub use formatter::{FormattedEvents, RecommendationResponse, format_events, parse_events};
pub use pipeline::{
    PipelinePhase, PipelineState, ProgressReporter, RecommendationPipeline, SilentProgress,
};
pub use stage::{LoggedMessage, StageExecutor, StageName, StageOutcome, StageSpec, ToolCallRecord};
