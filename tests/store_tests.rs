// tests/store_tests.rs

use std::collections::BTreeMap;

use proctor::{
    error::AppError,
    models::{
        activity::{ActivityKind, ActivityLogEntry},
        answer::{Answer, CodingAnswer},
        attempt::AttemptStatus,
        payload::{AutosavePayload, SubmissionType, SubmitPayload},
        question::QuestionKind,
    },
    services::{AttemptProvider, AutosaveSink, ExamProvider, RecordingSink, SubmitSink},
    store::{SqliteStore, seed_demo_exam},
};
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;

const EXAM_ID: i64 = 7;

/// Fresh in-memory database with the demo exam seeded.
async fn setup() -> (SqliteStore, TempDir) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    seed_demo_exam(&pool, EXAM_ID)
        .await
        .expect("Failed to seed demo exam");

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let store = SqliteStore::new(pool, dir.path());
    (store, dir)
}

fn scored_answers() -> BTreeMap<i64, Answer> {
    let mut answers = BTreeMap::new();
    answers.insert(1, Answer::Choice { option: 1 }); // Correct
    answers.insert(2, Answer::Choice { option: 0 }); // Wrong
    answers.insert(
        3,
        Answer::Coding(CodingAnswer {
            code: "def reverse(s):\n    return s[::-1]\n".to_string(),
            language: "python".to_string(),
            passed: Some(true),
            test_results: vec![],
        }),
    );
    answers
}

fn submit_payload(submission_type: SubmissionType, answers: BTreeMap<i64, Answer>) -> SubmitPayload {
    SubmitPayload {
        exam_id: EXAM_ID,
        candidate: "alice".to_string(),
        submission_type,
        answers,
        marked_for_review: Default::default(),
        activity_logs: vec![ActivityLogEntry::new(ActivityKind::TabSwitch, "Switched tab (1/3)")],
    }
}

#[tokio::test]
async fn seeded_exam_is_served_in_order() {
    let (store, _dir) = setup().await;

    let exam = store.get_exam(EXAM_ID).await.unwrap();
    assert_eq!(exam.duration_minutes, 10);
    assert!(exam.proctoring.camera_required);
    assert_eq!(exam.proctoring.focus_loss_limit, 3);

    let questions = store.get_questions(EXAM_ID).await.unwrap();
    let kinds: Vec<QuestionKind> = questions.iter().map(|q| q.kind).collect();
    assert_eq!(
        kinds,
        vec![QuestionKind::Choice, QuestionKind::Choice, QuestionKind::Coding]
    );
    assert_eq!(questions[0].options.len(), 4);
    assert!(questions[2].coding.is_some());

    assert!(matches!(store.get_exam(999).await, Err(AppError::NotFound(_))));

    // Seeding twice leaves the exam alone.
    seed_demo_exam(store.pool(), EXAM_ID).await.unwrap();
    assert_eq!(store.get_questions(EXAM_ID).await.unwrap().len(), 3);
}

#[tokio::test]
async fn start_attempt_keeps_the_first_start_time() {
    let (store, _dir) = setup().await;

    assert!(store.resume_attempt(EXAM_ID, "alice").await.unwrap().is_none());

    let first = store.start_attempt(EXAM_ID, "alice").await.unwrap();
    let second = store.start_attempt(EXAM_ID, "alice").await.unwrap();
    assert_eq!(first.started_at, second.started_at);
    assert_eq!(first.status, AttemptStatus::InProgress);

    let resumed = store.resume_attempt(EXAM_ID, "alice").await.unwrap().unwrap();
    assert_eq!(resumed.started_at, first.started_at);
}

#[tokio::test]
async fn autosave_round_trips_answers() {
    let (store, _dir) = setup().await;
    store.start_attempt(EXAM_ID, "alice").await.unwrap();

    let payload = AutosavePayload {
        exam_id: EXAM_ID,
        candidate: "alice".to_string(),
        answers: scored_answers(),
        marked_for_review: [2].into_iter().collect(),
        activity_logs: vec![],
    };
    store.autosave(&payload).await.unwrap();
    // Last write wins; repeating is harmless.
    store.autosave(&payload).await.unwrap();

    let attempt = store.resume_attempt(EXAM_ID, "alice").await.unwrap().unwrap();
    assert_eq!(attempt.answers, payload.answers);
    assert!(attempt.marked_for_review.contains(&2));
}

#[tokio::test]
async fn submit_scores_once_and_is_idempotent() {
    let (store, _dir) = setup().await;
    store.start_attempt(EXAM_ID, "alice").await.unwrap();

    let receipt = store
        .submit(&submit_payload(SubmissionType::Auto, scored_answers()))
        .await
        .unwrap();
    // Choice 1 (1 mark) + passing code (2 marks) out of 4.
    assert_eq!((receipt.score, receipt.total), (3, 4));
    assert_eq!(receipt.submission_type, SubmissionType::Auto);

    // A racing manual submit with different answers gets the stored receipt.
    let again = store
        .submit(&submit_payload(SubmissionType::Manual, BTreeMap::new()))
        .await
        .unwrap();
    assert_eq!((again.score, again.total), (3, 4));
    assert_eq!(again.submission_type, SubmissionType::Auto);
    assert_eq!(
        again.submitted_at.timestamp_millis(),
        receipt.submitted_at.timestamp_millis()
    );

    let attempt = store.resume_attempt(EXAM_ID, "alice").await.unwrap().unwrap();
    assert_eq!(attempt.status, AttemptStatus::Submitted);
}

#[tokio::test]
async fn autosave_after_submit_changes_nothing() {
    let (store, _dir) = setup().await;
    store.start_attempt(EXAM_ID, "alice").await.unwrap();
    store
        .submit(&submit_payload(SubmissionType::Manual, scored_answers()))
        .await
        .unwrap();

    let late = AutosavePayload {
        exam_id: EXAM_ID,
        candidate: "alice".to_string(),
        answers: BTreeMap::new(),
        marked_for_review: Default::default(),
        activity_logs: vec![],
    };
    store.autosave(&late).await.unwrap();

    let attempt = store.resume_attempt(EXAM_ID, "alice").await.unwrap().unwrap();
    assert_eq!(attempt.answers, scored_answers());
}

#[tokio::test]
async fn submit_without_attempt_is_not_found() {
    let (store, _dir) = setup().await;
    let result = store
        .submit(&submit_payload(SubmissionType::Manual, BTreeMap::new()))
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn recordings_are_written_per_stream() {
    let (store, dir) = setup().await;

    store
        .upload_recording(EXAM_ID, "alice/../bob", Some(vec![1, 2, 3]), Some(vec![4]))
        .await
        .unwrap();
    store
        .upload_recording(EXAM_ID, "alice", None, None)
        .await
        .unwrap();

    let mut files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    files.sort();
    assert_eq!(files.len(), 2);
    assert!(files.iter().all(|p| p.parent() == Some(dir.path())));

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM recordings")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(rows, 2);
}
