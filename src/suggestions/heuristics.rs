//! # Suggestion Heuristics
//!
//! Keyword extraction, task-category inference, duration normalization and
//! draft amounts. All functions are pure.

use crate::models::{ActivityType, TaskCategory};

/// Words ignored when extracting keywords
pub const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
];

/// Ordered category table; the first row with a keyword present in the text wins
pub const CATEGORY_KEYWORDS: &[(TaskCategory, &[&str])] = &[
    (
        TaskCategory::Research,
        &["research", "review", "analysis", "investigate"],
    ),
    (
        TaskCategory::Communication,
        &["email", "call", "meeting", "discussion", "correspondence"],
    ),
    (
        TaskCategory::Drafting,
        &["draft", "prepare", "write", "document", "memo"],
    ),
    (TaskCategory::Court, &["court", "hearing", "trial", "filing"]),
    (
        TaskCategory::ClientConference,
        &["client", "conference", "consultation"],
    ),
    (
        TaskCategory::Administrative,
        &["admin", "file", "organize", "schedule"],
    ),
];

pub const EMAIL_MINUTES: (i32, i32) = (5, 30);
pub const EMAIL_DEFAULT_MINUTES: i32 = 15;
pub const DOCUMENT_MINUTES: (i32, i32) = (15, 60);
pub const DOCUMENT_DEFAULT_MINUTES: i32 = 30;
pub const MEETING_INCREMENT_MINUTES: i32 = 15;

/// Lower-cased `subject description`, the text every heuristic reads
pub fn search_text(subject: Option<&str>, description: Option<&str>) -> String {
    format!(
        "{} {}",
        subject.unwrap_or_default(),
        description.unwrap_or_default()
    )
    .to_lowercase()
}

/// Whitespace tokens longer than three characters that are not stop words.
///
/// Repeated tokens are kept once, in first-seen order, so a word repeated in
/// the subject does not multiply its score.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for token in text.to_lowercase().split_whitespace() {
        if token.chars().count() <= 3 || STOP_WORDS.contains(&token) {
            continue;
        }
        if !keywords.iter().any(|k| k == token) {
            keywords.push(token.to_string());
        }
    }
    keywords
}

pub fn categorize(text: &str) -> TaskCategory {
    let text = text.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(TaskCategory::General)
}

/// Billable minutes for an activity; always positive
pub fn normalize_duration(activity_type: ActivityType, raw_minutes: Option<i32>) -> i32 {
    let raw = raw_minutes.filter(|m| *m > 0);
    match activity_type {
        ActivityType::Email => raw
            .map(|m| m.clamp(EMAIL_MINUTES.0, EMAIL_MINUTES.1))
            .unwrap_or(EMAIL_DEFAULT_MINUTES),
        ActivityType::Document => raw
            .map(|m| m.clamp(DOCUMENT_MINUTES.0, DOCUMENT_MINUTES.1))
            .unwrap_or(DOCUMENT_DEFAULT_MINUTES),
        ActivityType::Meeting => {
            let rounded = round_to_increment(raw.unwrap_or(0), MEETING_INCREMENT_MINUTES);
            if rounded == 0 {
                MEETING_INCREMENT_MINUTES
            } else {
                rounded
            }
        }
    }
}

/// Nearest multiple of `increment`, halves rounding up
fn round_to_increment(minutes: i32, increment: i32) -> i32 {
    ((minutes + increment / 2) / increment) * increment
}

/// `minutes / 60 * rate`, in cents, rounded half up
pub fn amount_cents(duration_minutes: i32, hourly_rate_cents: i64) -> i64 {
    if duration_minutes <= 0 || hourly_rate_cents <= 0 {
        return 0;
    }
    (i64::from(duration_minutes) * hourly_rate_cents + 30) / 60
}
