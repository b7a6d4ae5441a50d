//! # Engagement Matcher
//!
//! Keyword-overlap scoring of an activity against a user's active engagements.

use uuid::Uuid;

use crate::repositories::EngagementCandidate;

pub const NAME_WEIGHT: i32 = 3;
pub const DESCRIPTION_WEIGHT: i32 = 2;
pub const CLIENT_NAME_WEIGHT: i32 = 3;
pub const CLIENT_COMPANY_WEIGHT: i32 = 2;

/// Minimum score for an engagement to be attached to a suggestion
pub const MATCH_THRESHOLD: i32 = 2;

/// Winning engagement for one activity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngagementMatch {
    pub engagement_id: Uuid,
    pub hourly_rate_cents: i64,
    pub score: i32,
}

/// Sum of field weights over every keyword contained in each field
pub fn score(keywords: &[String], candidate: &EngagementCandidate) -> i32 {
    let name = candidate.name.to_lowercase();
    let description = candidate.description.as_deref().map(str::to_lowercase);
    let client_name = candidate.client_name.to_lowercase();
    let company = candidate
        .client_company_name
        .as_deref()
        .map(str::to_lowercase);

    keywords
        .iter()
        .map(|keyword| {
            let keyword = keyword.as_str();
            let mut total = 0;
            if name.contains(keyword) {
                total += NAME_WEIGHT;
            }
            if description.as_deref().is_some_and(|d| d.contains(keyword)) {
                total += DESCRIPTION_WEIGHT;
            }
            if client_name.contains(keyword) {
                total += CLIENT_NAME_WEIGHT;
            }
            if company.as_deref().is_some_and(|c| c.contains(keyword)) {
                total += CLIENT_COMPANY_WEIGHT;
            }
            total
        })
        .sum()
}

/// Highest-scoring candidate at or above [`MATCH_THRESHOLD`].
///
/// Candidates are visited in ascending id order and only a strictly greater
/// score replaces the leader, so ties go to the lowest id.
pub fn best_match(keywords: &[String], candidates: &[EngagementCandidate]) -> Option<EngagementMatch> {
    let mut ordered: Vec<&EngagementCandidate> = candidates.iter().collect();
    ordered.sort_by_key(|c| c.id);

    let mut best: Option<EngagementMatch> = None;
    for candidate in ordered {
        let candidate_score = score(keywords, candidate);
        if best.is_none_or(|b| candidate_score > b.score) {
            best = Some(EngagementMatch {
                engagement_id: candidate.id,
                hourly_rate_cents: candidate.hourly_rate_cents,
                score: candidate_score,
            });
        }
    }

    best.filter(|m| m.score >= MATCH_THRESHOLD)
}
