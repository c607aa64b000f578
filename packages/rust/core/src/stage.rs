//! Stage executor.
//!
//! A stage renders its prompt, runs any mandatory capability, asks the
//! text-completion service for an answer, executes the invocations it
//! requests, and makes one follow-up call to turn capability output into
//! the stage's artifact. Failures never escape: the artifact becomes a
//! description of what went wrong.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use kidplanner_shared::{KidPlannerError, PipelineSettings, Result};

use crate::capabilities::{CapabilityGroup, CapabilityName, CapabilityRegistry, CapabilitySchema};
use crate::completion::{CapabilityCall, ChatMessage, Completion, TextCompletion};
use crate::prompts::PromptTemplate;

// ---------------------------------------------------------------------------
// Stage names and specs
// ---------------------------------------------------------------------------

/// The four pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
    Discovery,
    Safety,
    Schedule,
    Synthesis,
}

impl StageName {
    /// The three stages that run in parallel.
    pub const ENTRY: [Self; 3] = [Self::Discovery, Self::Safety, Self::Schedule];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Safety => "safety",
            Self::Schedule => "schedule",
            Self::Synthesis => "synthesis",
        }
    }

    /// Prefix of the degraded artifact written when the stage fails.
    pub fn failure_label(self) -> &'static str {
        match self {
            Self::Discovery => "Research failed",
            Self::Safety => "Safety review failed",
            Self::Schedule => "Schedule planning failed",
            Self::Synthesis => "Plan synthesis failed",
        }
    }

    /// Capabilities the stage may offer to the service.
    pub fn capability_group(self) -> Option<CapabilityGroup> {
        match self {
            Self::Discovery => Some(CapabilityGroup::Discovery),
            Self::Safety => Some(CapabilityGroup::Safety),
            Self::Schedule => Some(CapabilityGroup::Schedule),
            Self::Synthesis => None,
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Orchestrator directive for one stage.
#[derive(Debug, Clone)]
pub struct StageSpec {
    pub name: StageName,
    pub capabilities: Vec<CapabilityName>,
    /// Executed before the first completion call, regardless of what the
    /// service would choose.
    pub mandatory_capability: Option<CapabilityCall>,
}

impl StageSpec {
    /// A stage offering its group's capabilities and nothing forced.
    pub fn new(name: StageName) -> Self {
        Self {
            name,
            capabilities: name
                .capability_group()
                .map(CapabilityName::in_group)
                .unwrap_or_default(),
            mandatory_capability: None,
        }
    }

    /// Whether the service may invoke `name` during this stage.
    pub fn offers(&self, name: &str) -> bool {
        CapabilityName::from_name(name).is_some_and(|c| self.capabilities.contains(&c))
    }

    #[must_use]
    pub fn with_mandatory(mut self, call: CapabilityCall) -> Self {
        self.mandatory_capability = Some(call);
        self
    }
}

// ---------------------------------------------------------------------------
// Outcome records
// ---------------------------------------------------------------------------

/// One capability invocation, as logged in the pipeline state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub stage: StageName,
    pub capability: String,
    pub arguments: Value,
}

/// A message exchanged by a stage, kept for auditing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedMessage {
    pub stage: StageName,
    #[serde(flatten)]
    pub message: ChatMessage,
}

/// What a stage hands back to the orchestrator.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub stage: StageName,
    /// Always non-empty.
    pub artifact: String,
    pub invocations: Vec<ToolCallRecord>,
    pub messages: Vec<LoggedMessage>,
    /// True when the artifact describes a failure.
    pub degraded: bool,
}

/// Per-stage buffers; merged by the orchestrator after the stage finishes.
struct StageLog {
    stage: StageName,
    invocations: Vec<ToolCallRecord>,
    messages: Vec<LoggedMessage>,
    capability_outputs: Vec<String>,
}

impl StageLog {
    fn new(stage: StageName) -> Self {
        Self {
            stage,
            invocations: Vec::new(),
            messages: Vec::new(),
            capability_outputs: Vec::new(),
        }
    }

    /// Append to both the conversation and the audit log.
    fn push(&mut self, conversation: &mut Vec<ChatMessage>, message: ChatMessage) {
        self.messages.push(LoggedMessage {
            stage: self.stage,
            message: message.clone(),
        });
        conversation.push(message);
    }

    fn finish(self, artifact: String, degraded: bool) -> StageOutcome {
        StageOutcome {
            stage: self.stage,
            artifact,
            invocations: self.invocations,
            messages: self.messages,
            degraded,
        }
    }
}

// ---------------------------------------------------------------------------
// StageExecutor
// ---------------------------------------------------------------------------

/// Runs stages against an injected completion service and registry.
#[derive(Clone)]
pub struct StageExecutor {
    completion: Arc<dyn TextCompletion>,
    registry: Arc<CapabilityRegistry>,
    call_timeout: Duration,
    capability_timeout: Duration,
}

impl StageExecutor {
    pub fn new(
        completion: Arc<dyn TextCompletion>,
        registry: Arc<CapabilityRegistry>,
        settings: &PipelineSettings,
    ) -> Self {
        Self {
            completion,
            registry,
            call_timeout: settings.call_timeout,
            capability_timeout: settings.capability_timeout,
        }
    }

    /// Run one stage to completion. Never fails.
    #[instrument(skip_all, fields(stage = %spec.name))]
    pub async fn run_stage(&self, spec: &StageSpec, prompt: &dyn PromptTemplate) -> StageOutcome {
        let mut log = StageLog::new(spec.name);
        let mut conversation = Vec::new();

        match self.drive(spec, prompt, &mut log, &mut conversation).await {
            Ok(artifact) => {
                info!(chars = artifact.len(), invocations = log.invocations.len(), "stage complete");
                log.finish(artifact, false)
            }
            Err(e) => {
                warn!(error = %e, "stage degraded");
                let artifact = format!("{}: {e}", spec.name.failure_label());
                log.push(&mut conversation, ChatMessage::assistant(artifact.clone(), Vec::new()));
                log.finish(artifact, true)
            }
        }
    }

    async fn drive(
        &self,
        spec: &StageSpec,
        prompt: &dyn PromptTemplate,
        log: &mut StageLog,
        conversation: &mut Vec<ChatMessage>,
    ) -> Result<String> {
        log.push(conversation, ChatMessage::system(prompt.instruction()));
        log.push(conversation, ChatMessage::user(prompt.request()));
        let schemas = self.registry.schemas(&spec.capabilities);

        if let Some(call) = &spec.mandatory_capability {
            debug!(capability = %call.name, "running mandatory capability");
            log.push(conversation, ChatMessage::assistant("", vec![call.clone()]));
            self.execute(call, log, conversation).await;
            log.push(conversation, ChatMessage::system(prompt.follow_up()));
        }

        let reply = self.complete(conversation, &schemas).await?;
        if reply.invocations.is_empty() {
            log.push(conversation, ChatMessage::assistant(reply.text.clone(), Vec::new()));
            return Ok(settle(reply.text, log));
        }

        let calls: Vec<CapabilityCall> = reply
            .invocations
            .iter()
            .enumerate()
            .map(|(i, call)| {
                let mut call = call.clone();
                if call.id.is_empty() {
                    call.id = format!("{}-{}", spec.name, i + 1);
                }
                call
            })
            .collect();
        log.push(conversation, ChatMessage::assistant(reply.text, calls.clone()));
        for call in &calls {
            if spec.offers(&call.name) {
                self.execute(call, log, conversation).await;
            } else {
                warn!(capability = %call.name, "capability not offered to this stage");
                let refusal = format!(
                    "Capability {} is not available to the {} stage.",
                    call.name, spec.name
                );
                log.push(conversation, ChatMessage::tool(&call.id, refusal));
            }
        }

        log.push(conversation, ChatMessage::system(prompt.follow_up()));
        let last = self.complete(conversation, &[]).await?;
        log.push(conversation, ChatMessage::assistant(last.text.clone(), Vec::new()));
        Ok(settle(last.text, log))
    }

    async fn execute(
        &self,
        call: &CapabilityCall,
        log: &mut StageLog,
        conversation: &mut Vec<ChatMessage>,
    ) {
        log.invocations.push(ToolCallRecord {
            stage: log.stage,
            capability: call.name.clone(),
            arguments: call.arguments.clone(),
        });
        let output = self.registry.invoke(call, self.capability_timeout).await;
        log.capability_outputs.push(output.clone());
        log.push(conversation, ChatMessage::tool(&call.id, output));
    }

    async fn complete(
        &self,
        conversation: &[ChatMessage],
        schemas: &[CapabilitySchema],
    ) -> Result<Completion> {
        tokio::time::timeout(
            self.call_timeout,
            self.completion.complete(conversation, schemas),
        )
        .await
        .map_err(|_| KidPlannerError::timeout("text completion", self.call_timeout))?
    }
}

/// The service's text, or the capability output when the text is blank.
fn settle(text: String, log: &StageLog) -> String {
    if !text.trim().is_empty() {
        return text;
    }
    let outputs = log.capability_outputs.join("\n");
    if outputs.trim().is_empty() {
        format!("The {} stage produced no output.", log.stage)
    } else {
        outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::Role;
    use crate::prompts::SafetyPrompt;
    use async_trait::async_trait;
    use kidplanner_discovery::EventFinder;
    use kidplanner_shared::ActivityRequest;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replies from a queue, recording what it was shown.
    struct Queue {
        replies: Mutex<Vec<Result<Completion>>>,
        seen: Mutex<Vec<(usize, usize)>>,
    }

    impl Queue {
        fn new(mut replies: Vec<Result<Completion>>) -> Arc<Self> {
            replies.reverse();
            Arc::new(Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextCompletion for Queue {
        fn name(&self) -> &str {
            "queue"
        }

        async fn complete(
            &self,
            messages: &[ChatMessage],
            capabilities: &[CapabilitySchema],
        ) -> Result<Completion> {
            self.seen.lock().unwrap().push((messages.len(), capabilities.len()));
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(Completion::text("done")))
        }
    }

    struct Hang;

    #[async_trait]
    impl TextCompletion for Hang {
        fn name(&self) -> &str {
            "hang"
        }

        async fn complete(&self, _: &[ChatMessage], _: &[CapabilitySchema]) -> Result<Completion> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Completion::text("late"))
        }
    }

    fn executor(completion: Arc<dyn TextCompletion>) -> StageExecutor {
        let settings = PipelineSettings {
            call_timeout: Duration::from_millis(200),
            ..PipelineSettings::default()
        };
        let registry = Arc::new(CapabilityRegistry::standard(EventFinder::with_mock_catalog()));
        StageExecutor::new(completion, registry, &settings)
    }

    fn request() -> ActivityRequest {
        ActivityRequest::new(8, "Cleveland, OH")
    }

    #[tokio::test]
    async fn direct_answer_is_the_artifact() {
        let queue = Queue::new(vec![Ok(Completion::text("All clear."))]);
        let request = request();
        let outcome = executor(queue.clone())
            .run_stage(&StageSpec::new(StageName::Safety), &SafetyPrompt::new(&request.child))
            .await;

        assert_eq!(outcome.artifact, "All clear.");
        assert!(!outcome.degraded);
        assert!(outcome.invocations.is_empty());
        // system + user shown once, with the three safety capabilities
        assert_eq!(*queue.seen.lock().unwrap(), vec![(2, 3)]);
        assert_eq!(outcome.messages.len(), 3);
    }

    #[tokio::test]
    async fn invocations_then_follow_up() {
        let call = CapabilityCall::new(
            "",
            "validate_age_appropriateness",
            json!({"activity": {"title": "Soccer", "age_range": "8-14"}, "child_age": 8}),
        );
        let queue = Queue::new(vec![
            Ok(Completion { text: String::new(), invocations: vec![call] }),
            Ok(Completion::text("Soccer is a good fit.")),
        ]);
        let request = request();
        let outcome = executor(queue.clone())
            .run_stage(&StageSpec::new(StageName::Safety), &SafetyPrompt::new(&request.child))
            .await;

        assert_eq!(outcome.artifact, "Soccer is a good fit.");
        assert_eq!(outcome.invocations.len(), 1);
        assert_eq!(outcome.invocations[0].stage, StageName::Safety);

        // second call sees: system, user, assistant request, tool result, follow-up; no tools
        assert_eq!(queue.seen.lock().unwrap()[1], (5, 0));
        let tool = outcome
            .messages
            .iter()
            .find(|m| m.message.role == Role::Tool)
            .unwrap();
        assert_eq!(tool.message.call_id.as_deref(), Some("safety-1"));
        assert!(tool.message.content.contains("age-appropriate for 8-year-old"));
    }

    #[tokio::test]
    async fn capabilities_outside_the_stage_are_refused() {
        let call = CapabilityCall::new(
            "stray",
            "discover_local_events",
            json!({"location": "Downtown"}),
        );
        let queue = Queue::new(vec![
            Ok(Completion { text: String::new(), invocations: vec![call] }),
            Ok(Completion::text("")),
        ]);
        let request = request();
        let spec = StageSpec::new(StageName::Safety);
        assert!(!spec.offers("discover_local_events"));
        assert!(spec.offers("check_safety_requirements"));

        let outcome = executor(queue)
            .run_stage(&spec, &SafetyPrompt::new(&request.child))
            .await;

        assert!(outcome.invocations.is_empty());
        assert!(!outcome.artifact.contains("Kids Science Workshop"), "{}", outcome.artifact);
        assert_eq!(outcome.artifact, "The safety stage produced no output.");
        let tool = outcome
            .messages
            .iter()
            .find(|m| m.message.role == Role::Tool)
            .unwrap();
        assert_eq!(tool.message.call_id.as_deref(), Some("stray"));
        assert_eq!(
            tool.message.content,
            "Capability discover_local_events is not available to the safety stage."
        );
    }

    #[tokio::test]
    async fn mandatory_capability_runs_first() {
        let queue = Queue::new(vec![Ok(Completion::text(""))]);
        let request = request();
        let spec = StageSpec::new(StageName::Discovery).with_mandatory(CapabilityCall::new(
            "forced",
            "discover_local_events",
            json!({"location": "Downtown"}),
        ));
        let prompt = crate::prompts::DiscoveryPrompt::new(&request.child, &request.date_range);
        let outcome = executor(queue).run_stage(&spec, &prompt).await;

        // blank reply falls back to the capability output
        assert!(outcome.artifact.contains("1. Kids Science Workshop"));
        assert_eq!(outcome.invocations[0].capability, "discover_local_events");
    }

    #[tokio::test]
    async fn completion_error_degrades() {
        let queue = Queue::new(vec![Err(KidPlannerError::Completion("HTTP 500".into()))]);
        let request = request();
        let outcome = executor(queue)
            .run_stage(&StageSpec::new(StageName::Schedule), &SafetyPrompt::new(&request.child))
            .await;

        assert!(outcome.degraded);
        assert_eq!(outcome.artifact, "Schedule planning failed: completion error: HTTP 500");
    }

    #[tokio::test]
    async fn hung_service_times_out() {
        let request = request();
        let outcome = executor(Arc::new(Hang))
            .run_stage(&StageSpec::new(StageName::Discovery), &SafetyPrompt::new(&request.child))
            .await;

        assert!(outcome.degraded);
        assert!(outcome.artifact.starts_with("Research failed: text completion timed out"));
    }
}
