//! Stage prompt templates.
//!
//! Each stage has its own template struct holding exactly the values its
//! prompt interpolates, so a missing variable is a compile error rather
//! than a runtime formatting failure.

use kidplanner_shared::{BudgetPreference, ChildProfile, FamilySchedule};

/// A rendered stage prompt.
pub trait PromptTemplate: Send + Sync {
    /// The system instruction.
    fn instruction(&self) -> String;

    /// The request facts the instruction operates on.
    fn request(&self) -> String;

    /// Sent after capability results, asking for the stage's final answer.
    fn follow_up(&self) -> String;
}

fn list_or(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        empty.to_string()
    } else {
        items.join(", ")
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DiscoveryPrompt<'a> {
    pub age: u32,
    pub location: &'a str,
    pub interests: &'a [String],
    pub activity_types: &'a [String],
    pub date_range: &'a str,
}

impl<'a> DiscoveryPrompt<'a> {
    pub fn new(child: &'a ChildProfile, date_range: &'a str) -> Self {
        Self {
            age: child.age,
            location: &child.location,
            interests: &child.interests,
            activity_types: &child.activity_types,
            date_range,
        }
    }
}

impl PromptTemplate for DiscoveryPrompt<'_> {
    fn instruction(&self) -> String {
        format!(
            "You are a kid activity discovery specialist.\n\
             Find age-appropriate activities for a {}-year-old in {}.\n\
             Interests: {}.\n\
             Use tools to discover local events, filter by age, and categorize by interests.\n\
             List events as numbered lines (\"1. Title\") followed by the detail lines exactly \
             as the tools format them.",
            self.age,
            self.location,
            list_or(self.interests, "none given"),
        )
    }

    fn request(&self) -> String {
        format!(
            "Child age: {}\nLocation: {}\nInterests: {}\nActivity types: {}\nDate range: {}",
            self.age,
            self.location,
            list_or(self.interests, "any"),
            list_or(self.activity_types, "any"),
            self.date_range,
        )
    }

    fn follow_up(&self) -> String {
        "Based on the discovered activities, provide a comprehensive summary of \
         age-appropriate events for this child. Keep the numbered event listing format."
            .to_string()
    }
}

// ---------------------------------------------------------------------------
// Safety
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SafetyPrompt<'a> {
    pub age: u32,
    pub location: &'a str,
    pub special_needs: &'a [String],
}

impl<'a> SafetyPrompt<'a> {
    pub fn new(child: &'a ChildProfile) -> Self {
        Self {
            age: child.age,
            location: &child.location,
            special_needs: &child.special_needs,
        }
    }
}

impl PromptTemplate for SafetyPrompt<'_> {
    fn instruction(&self) -> String {
        format!(
            "You are a child safety specialist.\n\
             Validate the safety and age appropriateness of typical local activities for a \
             {}-year-old child.\n\
             Special needs: {}.\n\
             Use tools to check age appropriateness, safety requirements, and accessibility.",
            self.age,
            list_or(self.special_needs, "None"),
        )
    }

    fn request(&self) -> String {
        format!(
            "Child age: {}\nLocation: {}\nSpecial needs: {}",
            self.age,
            self.location,
            list_or(self.special_needs, "none"),
        )
    }

    fn follow_up(&self) -> String {
        format!(
            "Provide a comprehensive safety assessment for the {}-year-old child, including \
             age appropriateness, safety considerations, and accessibility needs.",
            self.age
        )
    }
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SchedulePrompt<'a> {
    pub location: &'a str,
    pub budget: BudgetPreference,
    pub schedule: &'a FamilySchedule,
}

impl<'a> SchedulePrompt<'a> {
    pub fn new(child: &'a ChildProfile, schedule: &'a FamilySchedule) -> Self {
        Self {
            location: &child.location,
            budget: child.budget,
            schedule,
        }
    }

    fn schedule_summary(&self) -> String {
        format!(
            "days: {}; times: {}; transportation: {}",
            self.schedule.days_label(),
            self.schedule.times_label(),
            self.schedule.transportation.as_str(),
        )
    }
}

impl PromptTemplate for SchedulePrompt<'_> {
    fn instruction(&self) -> String {
        format!(
            "You are a family schedule optimization specialist.\n\
             Optimize activities for a family in {} with budget preference: {}.\n\
             Family schedule: {}.\n\
             Use tools to optimize schedule, calculate travel times, and budget optimization.",
            self.location,
            self.budget,
            self.schedule_summary(),
        )
    }

    fn request(&self) -> String {
        let ceiling = match self.budget.ceiling() {
            Some(c) => format!("up to ${c} per activity"),
            None => "no price limit".to_string(),
        };
        format!(
            "Home location: {}\nBudget: {} ({ceiling})\nSchedule: {}",
            self.location,
            self.budget,
            self.schedule_summary(),
        )
    }

    fn follow_up(&self) -> String {
        "Provide a comprehensive schedule optimization including timing, travel logistics, \
         and budget considerations."
            .to_string()
    }
}

// ---------------------------------------------------------------------------
// Synthesis
// ---------------------------------------------------------------------------

/// The convergent prompt. Upstream artifacts arrive already excerpted.
#[derive(Debug, Clone)]
pub struct SynthesisPrompt<'a> {
    pub age: u32,
    pub location: &'a str,
    pub interests: &'a [String],
    pub events: &'a str,
    pub safety: &'a str,
    pub schedule: &'a str,
}

impl PromptTemplate for SynthesisPrompt<'_> {
    fn instruction(&self) -> String {
        format!(
            "Create a comprehensive activity plan for a {}-year-old in {}.\n\
             Interests: {}.\n\
             Synthesize the inputs into a final, actionable activity plan with specific \
             recommendations.",
            self.age,
            self.location,
            list_or(self.interests, "none given"),
        )
    }

    fn request(&self) -> String {
        format!(
            "Inputs:\nEvents: {}\nSafety: {}\nSchedule: {}",
            self.events, self.safety, self.schedule
        )
    }

    fn follow_up(&self) -> String {
        "Write the final activity plan.".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kidplanner_shared::ActivityRequest;

    #[test]
    fn discovery_prompt_interpolates_profile() {
        let mut request = ActivityRequest::new(8, "Cleveland, OH");
        request.child.interests = vec!["science".into(), "art".into()];
        let prompt = DiscoveryPrompt::new(&request.child, &request.date_range);

        let instruction = prompt.instruction();
        assert!(instruction.contains("8-year-old in Cleveland, OH"));
        assert!(instruction.contains("Interests: science, art."));
        assert!(prompt.request().contains("Date range: next_2_weeks"));
    }

    #[test]
    fn empty_lists_read_naturally() {
        let request = ActivityRequest::new(5, "Austin");
        assert!(SafetyPrompt::new(&request.child).instruction().contains("Special needs: None."));

        let schedule = SchedulePrompt::new(&request.child, &request.schedule);
        assert!(schedule.instruction().contains("days: weekend; times: morning, afternoon"));
        assert!(schedule.request().contains("up to $30 per activity"));
    }
}
