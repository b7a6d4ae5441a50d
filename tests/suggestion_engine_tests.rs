//! Integration tests for the suggestion engine and the entry lifecycle

use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use sea_orm::{ConnectionTrait, DatabaseConnection};
use timecapture::models::{EntryStatus, Provider, TaskCategory};
use timecapture::repositories::{
    ActivityRepository, EngagementRepository, LifecycleError, SuggestionRepository,
};
use timecapture::suggestions::SuggestionEngine;
use uuid::Uuid;

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{insert_client, insert_engagement, insert_user, raw_event, setup_test_db_arc};

struct Fixture {
    db: Arc<DatabaseConnection>,
    user: Uuid,
    activities: ActivityRepository,
    suggestions: SuggestionRepository,
    engine: SuggestionEngine,
}

async fn fixture() -> Fixture {
    let db = setup_test_db_arc().await.unwrap();
    let user = insert_user(&db, "lawyer@example.com").await.unwrap();
    let activities = ActivityRepository::new(db.clone());
    let suggestions = SuggestionRepository::new(db.clone());
    let engine = SuggestionEngine::new(
        activities.clone(),
        EngagementRepository::new(db.clone()),
        suggestions.clone(),
    );
    Fixture {
        db,
        user,
        activities,
        suggestions,
        engine,
    }
}

async fn add_acme_merger(fx: &Fixture) -> Uuid {
    let client = insert_client(&fx.db, fx.user, "Acme Corp", None).await.unwrap();
    insert_engagement(
        &fx.db,
        Uuid::from_u128(7),
        fx.user,
        client,
        "Acme Merger",
        None,
        30_000,
    )
    .await
    .unwrap()
}

async fn only_entry(fx: &Fixture) -> timecapture::models::suggested_entry::Model {
    let mut entries = fx
        .suggestions
        .list(fx.user, EntryStatus::Suggested, 10)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1, "expected exactly one suggested entry");
    entries.remove(0)
}

#[tokio::test]
async fn acme_contract_review_becomes_a_matched_research_entry() {
    let fx = fixture().await;
    let engagement = add_acme_merger(&fx).await;
    let sent_at = Utc.with_ymd_and_hms(2026, 3, 4, 15, 30, 0).unwrap();

    fx.activities
        .upsert(&raw_event(
            fx.user,
            Provider::Gmail,
            "msg-1",
            "Acme contract review",
            Some(""),
            Some(0),
            sent_at,
        ))
        .await
        .unwrap();

    let report = fx.engine.process_user(fx.user).await.unwrap();
    assert_eq!(report.created, 1);
    assert_eq!(report.matched, 1);

    let entry = only_entry(&fx).await;
    assert_eq!(entry.engagement_id, Some(engagement));
    assert_eq!(entry.match_score, 6);
    assert_eq!(entry.task_category, TaskCategory::Research);
    assert_eq!(entry.duration_minutes, 15);
    assert_eq!(entry.hourly_rate_cents, 30_000);
    assert_eq!(entry.amount_cents, 7_500);
    assert_eq!(entry.entry_date, NaiveDate::from_ymd_opt(2026, 3, 4).unwrap());
    assert_eq!(entry.status, EntryStatus::Suggested);

    assert!(fx.activities.list_unprocessed(fx.user).await.unwrap().is_empty());
}

#[tokio::test]
async fn activity_without_keyword_overlap_is_left_unmatched() {
    let fx = fixture().await;
    add_acme_merger(&fx).await;

    fx.activities
        .upsert(&raw_event(
            fx.user,
            Provider::Gmail,
            "msg-1",
            "Quarterly budget",
            None,
            Some(10),
            Utc::now(),
        ))
        .await
        .unwrap();

    let report = fx.engine.process_user(fx.user).await.unwrap();
    assert_eq!(report.created, 1);
    assert_eq!(report.matched, 0);

    let entry = only_entry(&fx).await;
    assert_eq!(entry.engagement_id, None);
    assert_eq!(entry.hourly_rate_cents, 0);
    assert_eq!(entry.amount_cents, 0);
    assert_eq!(entry.match_score, 0);
}

#[tokio::test]
async fn company_name_hit_alone_reaches_the_threshold() {
    let fx = fixture().await;
    let client = insert_client(&fx.db, fx.user, "Smith", Some("Globex Holdings"))
        .await
        .unwrap();
    let engagement = insert_engagement(
        &fx.db,
        Uuid::from_u128(3),
        fx.user,
        client,
        "Patent portfolio",
        None,
        24_000,
    )
    .await
    .unwrap();

    fx.activities
        .upsert(&raw_event(
            fx.user,
            Provider::Gmail,
            "msg-1",
            "Globex invoice",
            None,
            Some(30),
            Utc::now(),
        ))
        .await
        .unwrap();

    fx.engine.process_user(fx.user).await.unwrap();

    let entry = only_entry(&fx).await;
    assert_eq!(entry.match_score, 2);
    assert_eq!(entry.engagement_id, Some(engagement));
    assert_eq!(entry.amount_cents, 12_000);
}

#[tokio::test]
async fn equal_scores_go_to_the_lowest_engagement_id() {
    let fx = fixture().await;
    let client = insert_client(&fx.db, fx.user, "Initech", None).await.unwrap();
    for id in [9u128, 4, 6] {
        insert_engagement(
            &fx.db,
            Uuid::from_u128(id),
            fx.user,
            client,
            &format!("Initech matter {}", id),
            None,
            10_000,
        )
        .await
        .unwrap();
    }

    fx.activities
        .upsert(&raw_event(
            fx.user,
            Provider::Gmail,
            "msg-1",
            "Initech update",
            None,
            None,
            Utc::now(),
        ))
        .await
        .unwrap();

    fx.engine.process_user(fx.user).await.unwrap();
    assert_eq!(only_entry(&fx).await.engagement_id, Some(Uuid::from_u128(4)));
}

#[tokio::test]
async fn durations_are_normalized_per_activity_type() {
    let fx = fixture().await;
    let now = Utc::now();
    let cases = [
        (Provider::Gmail, "short", Some(2), 5),
        (Provider::Gmail, "long", Some(45), 30),
        (Provider::GoogleCalendar, "meeting", Some(52), 45),
        (Provider::GoogleDrive, "doc", None, 30),
    ];
    for (i, (provider, source_id, minutes, _)) in cases.iter().enumerate() {
        fx.activities
            .upsert(&raw_event(
                fx.user,
                *provider,
                source_id,
                "Weekly sync",
                None,
                *minutes,
                now - chrono::Duration::minutes(i as i64),
            ))
            .await
            .unwrap();
    }

    fx.engine.process_user(fx.user).await.unwrap();

    for (_, source_id, _, expected) in cases {
        let activity = fx
            .activities
            .list_unprocessed(fx.user)
            .await
            .unwrap()
            .into_iter()
            .find(|a| a.source_id == source_id);
        assert!(activity.is_none(), "{} should be processed", source_id);

        let entries = fx
            .suggestions
            .list(fx.user, EntryStatus::Suggested, 10)
            .await
            .unwrap();
        let entry = entries
            .iter()
            .find(|e| e.description == "Weekly sync" && e.duration_minutes == expected);
        assert!(entry.is_some(), "{} should normalize to {} minutes", source_id, expected);
    }
}

#[tokio::test]
async fn rerunning_the_engine_creates_nothing_new() {
    let fx = fixture().await;
    add_acme_merger(&fx).await;
    fx.activities
        .upsert(&raw_event(
            fx.user,
            Provider::Gmail,
            "msg-1",
            "Acme contract review",
            None,
            None,
            Utc::now(),
        ))
        .await
        .unwrap();

    assert_eq!(fx.engine.process_user(fx.user).await.unwrap().created, 1);
    let second = fx.engine.process_user(fx.user).await.unwrap();
    assert_eq!(second.created, 0);
    assert_eq!(second.skipped, 0);
    only_entry(&fx).await;
}

#[tokio::test]
async fn lifecycle_moves_forward_only() {
    let fx = fixture().await;
    add_acme_merger(&fx).await;
    for id in ["msg-1", "msg-2"] {
        fx.activities
            .upsert(&raw_event(
                fx.user,
                Provider::Gmail,
                id,
                "Acme call",
                None,
                None,
                Utc::now(),
            ))
            .await
            .unwrap();
    }
    fx.engine.process_user(fx.user).await.unwrap();

    let entries = fx
        .suggestions
        .list(fx.user, EntryStatus::Suggested, 10)
        .await
        .unwrap();
    let (first, second) = (entries[0].id, entries[1].id);

    let err = fx
        .suggestions
        .transition(fx.user, first, EntryStatus::Billed)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::InvalidTransition {
            from: EntryStatus::Suggested,
            to: EntryStatus::Billed
        }
    ));

    let approved = fx
        .suggestions
        .transition(fx.user, first, EntryStatus::Approved)
        .await
        .unwrap();
    assert_eq!(approved.status, EntryStatus::Approved);
    let billed = fx
        .suggestions
        .transition(fx.user, first, EntryStatus::Billed)
        .await
        .unwrap();
    assert_eq!(billed.status, EntryStatus::Billed);

    fx.suggestions
        .transition(fx.user, second, EntryStatus::Rejected)
        .await
        .unwrap();
    let err = fx
        .suggestions
        .transition(fx.user, second, EntryStatus::Approved)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidTransition { .. }));

    let other_user = insert_user(&fx.db, "other@example.com").await.unwrap();
    let err = fx
        .suggestions
        .transition(other_user, first, EntryStatus::Approved)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::NotFound(_)));
}

#[tokio::test]
async fn one_failed_write_does_not_stop_the_run() {
    let fx = fixture().await;
    let now = Utc::now();
    fx.db
        .execute_unprepared(
            "CREATE TRIGGER reject_sealed_entry BEFORE INSERT ON suggested_entries \
             WHEN NEW.description = 'Sealed filing' \
             BEGIN SELECT RAISE(ABORT, 'sealed entries are rejected'); END;",
        )
        .await
        .unwrap();

    for (i, (source_id, subject)) in [
        ("msg-1", "Acme contract review"),
        ("msg-2", "Sealed filing"),
        ("msg-3", "Globex lease question"),
    ]
    .iter()
    .enumerate()
    {
        fx.activities
            .upsert(&raw_event(
                fx.user,
                Provider::Gmail,
                source_id,
                subject,
                None,
                None,
                now - chrono::Duration::minutes(i as i64),
            ))
            .await
            .unwrap();
    }

    let report = fx.engine.process_user(fx.user).await.unwrap();
    assert_eq!(report.created, 2);
    assert_eq!(report.failed, 1);

    let entries = fx
        .suggestions
        .list(fx.user, EntryStatus::Suggested, 10)
        .await
        .unwrap();
    let mut descriptions: Vec<&str> = entries.iter().map(|e| e.description.as_str()).collect();
    descriptions.sort();
    assert_eq!(descriptions, vec!["Acme contract review", "Globex lease question"]);

    // the failed activity stays unprocessed for the next run
    let pending = fx.activities.list_unprocessed(fx.user).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].source_id, "msg-2");
}
