//! Recommendation pipeline: request → discovery ∥ safety ∥ schedule → synthesis.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use kidplanner_discovery::mock_events;
use kidplanner_shared::{
    Activity, ActivityRequest, ChildProfile, FamilySchedule, PipelineSettings, RequestId, Result,
};

use crate::capabilities::{CapabilityName, CapabilityRegistry};
use crate::completion::{CapabilityCall, TextCompletion};
use crate::formatter::RecommendationResponse;
use crate::prompts::{DiscoveryPrompt, PromptTemplate, SafetyPrompt, SchedulePrompt, SynthesisPrompt};
use crate::stage::{LoggedMessage, StageExecutor, StageName, StageOutcome, StageSpec, ToolCallRecord};

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelinePhase {
    Pending,
    /// The three entry stages are in flight.
    Running,
    /// Synthesis is in flight.
    Converging,
    Done,
}

impl PipelinePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Converging => "converging",
            Self::Done => "done",
        }
    }
}

/// Everything one run accumulates. Owned by the orchestrator; stages only
/// hand back outcomes.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineState {
    pub request_id: RequestId,
    pub child_profile: ChildProfile,
    pub family_schedule: FamilySchedule,
    pub date_range: String,
    pub events: Option<String>,
    pub safety: Option<String>,
    pub schedule: Option<String>,
    #[serde(rename = "final")]
    pub final_plan: Option<String>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub messages: Vec<LoggedMessage>,
    pub phase: PipelinePhase,
    pub degraded_stages: Vec<StageName>,
}

impl PipelineState {
    pub fn new(request: &ActivityRequest) -> Self {
        Self {
            request_id: RequestId::new(),
            child_profile: request.child.clone(),
            family_schedule: request.schedule.clone(),
            date_range: request.date_range.clone(),
            events: None,
            safety: None,
            schedule: None,
            final_plan: None,
            tool_calls: Vec::new(),
            messages: Vec::new(),
            phase: PipelinePhase::Pending,
            degraded_stages: Vec::new(),
        }
    }

    /// The artifact slot a stage writes.
    pub fn artifact(&self, stage: StageName) -> Option<&str> {
        match stage {
            StageName::Discovery => self.events.as_deref(),
            StageName::Safety => self.safety.as_deref(),
            StageName::Schedule => self.schedule.as_deref(),
            StageName::Synthesis => self.final_plan.as_deref(),
        }
    }

    /// Merge a finished stage. Each slot is written once; a second outcome
    /// for the same stage is dropped and `false` returned.
    pub fn record(&mut self, outcome: StageOutcome) -> bool {
        let slot = match outcome.stage {
            StageName::Discovery => &mut self.events,
            StageName::Safety => &mut self.safety,
            StageName::Schedule => &mut self.schedule,
            StageName::Synthesis => &mut self.final_plan,
        };
        if slot.is_some() {
            warn!(stage = %outcome.stage, "stage artifact already recorded, ignoring");
            return false;
        }
        *slot = Some(outcome.artifact);
        if outcome.degraded {
            self.degraded_stages.push(outcome.stage);
        }
        self.tool_calls.extend(outcome.invocations);
        self.messages.extend(outcome.messages);
        true
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when the run changes phase.
    fn phase(&self, phase: PipelinePhase);
    /// Called when a stage starts.
    fn stage_started(&self, stage: StageName);
    /// Called when a stage hands back its outcome.
    fn stage_finished(&self, stage: StageName, degraded: bool);
    /// Called once the final state is assembled.
    fn done(&self, state: &PipelineState);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _phase: PipelinePhase) {}
    fn stage_started(&self, _stage: StageName) {}
    fn stage_finished(&self, _stage: StageName, _degraded: bool) {}
    fn done(&self, _state: &PipelineState) {}
}

/// The orchestrator. The completion service and registry are injected so
/// tests can substitute doubles.
pub struct RecommendationPipeline {
    executor: StageExecutor,
    settings: PipelineSettings,
    fallback: Vec<Activity>,
}

impl RecommendationPipeline {
    pub fn new(
        completion: Arc<dyn TextCompletion>,
        registry: Arc<CapabilityRegistry>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            executor: StageExecutor::new(completion, registry, &settings),
            settings,
            fallback: mock_events(),
        }
    }

    /// Catalog the formatter falls back to when discovery text has no events.
    #[must_use]
    pub fn with_fallback_catalog(mut self, fallback: Vec<Activity>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run every stage and return the merged state.
    ///
    /// Only request validation can fail; stage failures come back as
    /// degraded artifacts.
    #[instrument(skip_all, fields(age = request.child.age, location = %request.child.location))]
    pub async fn run(
        &self,
        request: &ActivityRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<PipelineState> {
        request.validate()?;
        let start = Instant::now();
        let mut state = PipelineState::new(request);
        info!(request_id = %state.request_id, "starting recommendation pipeline");

        // --- Phase 1: entry stages ---
        state.phase = PipelinePhase::Running;
        progress.phase(state.phase);

        let discovery_spec =
            StageSpec::new(StageName::Discovery).with_mandatory(discovery_call(request));
        let safety_spec = StageSpec::new(StageName::Safety);
        let schedule_spec = StageSpec::new(StageName::Schedule);
        let discovery_prompt = DiscoveryPrompt::new(&request.child, &request.date_range);
        let safety_prompt = SafetyPrompt::new(&request.child);
        let schedule_prompt = SchedulePrompt::new(&request.child, &request.schedule);

        let (discovery, safety, schedule) = tokio::join!(
            self.stage(&discovery_spec, &discovery_prompt, progress),
            self.stage(&safety_spec, &safety_prompt, progress),
            self.stage(&schedule_spec, &schedule_prompt, progress),
        );
        // Fixed merge order keeps the state independent of completion order.
        for outcome in [discovery, safety, schedule] {
            state.record(outcome);
        }

        // --- Phase 2: synthesis ---
        state.phase = PipelinePhase::Converging;
        progress.phase(state.phase);

        let limit = self.settings.excerpt_chars;
        let events = excerpt(state.events.as_deref().unwrap_or_default(), limit);
        let safety = excerpt(state.safety.as_deref().unwrap_or_default(), limit);
        let schedule = excerpt(state.schedule.as_deref().unwrap_or_default(), limit);
        let synthesis_prompt = SynthesisPrompt {
            age: request.child.age,
            location: &request.child.location,
            interests: &request.child.interests,
            events,
            safety,
            schedule,
        };
        let synthesis = self
            .stage(&StageSpec::new(StageName::Synthesis), &synthesis_prompt, progress)
            .await;
        state.record(synthesis);

        state.phase = PipelinePhase::Done;
        progress.phase(state.phase);
        progress.done(&state);

        info!(
            request_id = %state.request_id,
            tool_calls = state.tool_calls.len(),
            degraded = state.degraded_stages.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "pipeline complete"
        );
        Ok(state)
    }

    /// Run the pipeline and format the response.
    pub async fn recommend(
        &self,
        request: &ActivityRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<RecommendationResponse> {
        let state = self.run(request, progress).await?;
        Ok(RecommendationResponse::from_state(
            &state,
            &self.fallback,
            self.settings.fallback_count,
        ))
    }

    async fn stage(
        &self,
        spec: &StageSpec,
        prompt: &dyn PromptTemplate,
        progress: &dyn ProgressReporter,
    ) -> StageOutcome {
        progress.stage_started(spec.name);
        let outcome = self.executor.run_stage(spec, prompt).await;
        progress.stage_finished(spec.name, outcome.degraded);
        outcome
    }
}

/// The discovery lookup every run performs before consulting the service.
fn discovery_call(request: &ActivityRequest) -> CapabilityCall {
    CapabilityCall::new(
        "discovery-mandatory",
        CapabilityName::DiscoverLocalEvents.as_str(),
        json!({
            "location": request.child.location,
            "age_range": request.child.age.to_string(),
            "activity_types": request.child.activity_types,
            "date_range": request.date_range,
        }),
    )
}

/// At most `limit` characters of `text`, cut on a char boundary.
fn excerpt(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
