//! # Suggestion Engine
//!
//! Turns a user's unprocessed activity into suggested time entries: engagement
//! matching, task category, normalized duration and a draft amount. Each
//! activity is written together with its processed flag, so a rerun never
//! duplicates an entry.

use anyhow::Result;
use metrics::counter;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::models::raw_activity::Model as RawActivity;
use crate::repositories::{
    ActivityRepository, CreateOutcome, EngagementCandidate, EngagementRepository, NewSuggestion,
    SuggestionRepository,
};
use crate::telemetry::metric_names::{SUGGESTIONS_CREATED, SUGGESTION_FAILURES};

pub mod heuristics;
pub mod matcher;

pub use matcher::{EngagementMatch, MATCH_THRESHOLD};

/// Counts from one engine run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineReport {
    pub created: u64,
    pub matched: u64,
    /// Activities that already had an entry
    pub skipped: u64,
    pub failed: u64,
}

#[derive(Clone)]
pub struct SuggestionEngine {
    activities: ActivityRepository,
    engagements: EngagementRepository,
    suggestions: SuggestionRepository,
}

impl SuggestionEngine {
    pub fn new(
        activities: ActivityRepository,
        engagements: EngagementRepository,
        suggestions: SuggestionRepository,
    ) -> Self {
        Self {
            activities,
            engagements,
            suggestions,
        }
    }

    /// Processes every unprocessed activity of the user, newest first.
    ///
    /// A failure on one activity is logged and counted; the rest of the batch
    /// still runs. Only loading the working set can fail the call.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn process_user(&self, user_id: Uuid) -> Result<EngineReport> {
        let pending = self.activities.list_unprocessed(user_id).await?;
        if pending.is_empty() {
            debug!("No unprocessed activity");
            return Ok(EngineReport::default());
        }

        let candidates = self.engagements.list_active_candidates(user_id).await?;
        let mut report = EngineReport::default();

        for activity in &pending {
            let suggestion = suggest(activity, &candidates);
            let matched = suggestion.engagement_id.is_some();

            match self.suggestions.create_for_activity(suggestion).await {
                Ok(CreateOutcome::Created(entry)) => {
                    report.created += 1;
                    if matched {
                        report.matched += 1;
                    }
                    counter!(SUGGESTIONS_CREATED, "matched" => matched.to_string()).increment(1);
                    debug!(
                        activity_id = %activity.id,
                        entry_id = %entry.id,
                        engagement_id = ?entry.engagement_id,
                        score = entry.match_score,
                        "Suggested entry created"
                    );
                }
                Ok(CreateOutcome::AlreadyExists) => {
                    report.skipped += 1;
                }
                Err(err) => {
                    report.failed += 1;
                    counter!(SUGGESTION_FAILURES).increment(1);
                    warn!(activity_id = %activity.id, error = %err, "Failed to create suggested entry");
                }
            }
        }

        info!(
            created = report.created,
            matched = report.matched,
            skipped = report.skipped,
            failed = report.failed,
            "Suggestion run complete"
        );

        Ok(report)
    }
}

/// Builds the suggested entry for one activity
pub fn suggest(activity: &RawActivity, candidates: &[EngagementCandidate]) -> NewSuggestion {
    let text = heuristics::search_text(activity.subject.as_deref(), activity.description.as_deref());
    let keywords = heuristics::extract_keywords(&text);
    let found = matcher::best_match(&keywords, candidates);

    let duration_minutes =
        heuristics::normalize_duration(activity.activity_type, activity.duration_minutes);
    let hourly_rate_cents = found.map(|m| m.hourly_rate_cents).unwrap_or(0);
    let occurred_at = activity.occurred_at.with_timezone(&chrono::Utc);

    NewSuggestion {
        user_id: activity.user_id,
        source_activity_id: activity.id,
        engagement_id: found.map(|m| m.engagement_id),
        entry_date: occurred_at.date_naive(),
        activity_at: occurred_at,
        duration_minutes,
        description: entry_description(activity),
        task_category: heuristics::categorize(&text),
        hourly_rate_cents,
        amount_cents: heuristics::amount_cents(duration_minutes, hourly_rate_cents),
        match_score: found.map(|m| m.score).unwrap_or(0),
    }
}

/// Provider description, falling back to the subject
fn entry_description(activity: &RawActivity) -> String {
    [activity.description.as_deref(), activity.subject.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|text| !text.is_empty())
        .unwrap_or("Captured activity")
        .to_string()
}
