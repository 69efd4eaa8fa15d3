// src/store/mod.rs

//! SQLite-backed exam backend: exams, attempts, autosave, submission and
//! recording uploads.

use std::{collections::BTreeMap, path::PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{SqlitePool, types::Json};

use crate::{
    error::AppError,
    models::{
        answer::Answer,
        attempt::{AttemptRow, AttemptStatus, ExamAttempt},
        exam::{Exam, ExamRow},
        media::StreamKind,
        payload::{AutosavePayload, SubmissionType, SubmitPayload, SubmitReceipt},
        question::{CodingSpec, Question, QuestionKind, QuestionRow},
    },
    services::{AttemptProvider, AutosaveSink, ExamProvider, RecordingSink, SubmitSink},
};

const ATTEMPT_COLUMNS: &str = "id, exam_id, candidate, started_at, status, answers, marked, \
     activity_logs, submission_type, score, total, submitted_at";

/// Helper struct for fetching answer keys.
#[derive(sqlx::FromRow)]
struct AnswerKey {
    id: i64,
    question_type: String,
    correct_option: Option<i64>,
    marks: i64,
}

/// Returns (score, total) in marks.
/// Choice answers score when they hit the key; coding answers when the last run passed.
fn calculate_score(answers: &BTreeMap<i64, Answer>, keys: &[AnswerKey]) -> (i64, i64) {
    let mut score = 0;
    let mut total = 0;

    for key in keys {
        total += key.marks;
        let correct = match (QuestionKind::parse(&key.question_type), answers.get(&key.id)) {
            (Some(QuestionKind::Choice), Some(Answer::Choice { option })) => key
                .correct_option
                .is_some_and(|correct| i64::try_from(*option).is_ok_and(|o| o == correct)),
            (Some(QuestionKind::Coding), Some(Answer::Coding(coding))) => coding.passed == Some(true),
            _ => false,
        };
        if correct {
            score += key.marks;
        }
    }

    (score, total)
}

fn receipt_from_row(row: &AttemptRow) -> Result<SubmitReceipt, AppError> {
    match (
        row.score,
        row.total,
        row.submission_type.as_deref().and_then(SubmissionType::parse),
        row.submitted_at,
    ) {
        (Some(score), Some(total), Some(submission_type), Some(submitted_at)) => Ok(SubmitReceipt {
            score,
            total,
            submission_type,
            submitted_at,
        }),
        _ => Err(AppError::InternalServerError(format!(
            "Attempt {} is submitted but has no receipt",
            row.id
        ))),
    }
}

/// File-name safe form of a candidate id.
fn file_slug(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    recording_dir: PathBuf,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, recording_dir: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            recording_dir: recording_dir.into(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_attempt(&self, exam_id: i64, candidate: &str) -> Result<Option<AttemptRow>, AppError> {
        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {} FROM attempts WHERE exam_id = ? AND candidate = ?",
            ATTEMPT_COLUMNS
        ))
        .bind(exam_id)
        .bind(candidate)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn write_recording(
        &self,
        exam_id: i64,
        candidate: &str,
        stream: StreamKind,
        data: &[u8],
    ) -> Result<PathBuf, AppError> {
        let path = self.recording_dir.join(format!(
            "{}-{}-{}-{}.webm",
            exam_id,
            file_slug(candidate),
            stream.as_str(),
            uuid::Uuid::new_v4()
        ));
        tokio::fs::write(&path, data).await?;

        sqlx::query(
            "INSERT INTO recordings (exam_id, candidate, stream, path, bytes, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(exam_id)
        .bind(candidate)
        .bind(stream.as_str())
        .bind(path.to_string_lossy().into_owned())
        .bind(data.len() as i64)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(path)
    }
}

#[async_trait]
impl ExamProvider for SqliteStore {
    async fn get_exam(&self, exam_id: i64) -> Result<Exam, AppError> {
        let row = sqlx::query_as::<_, ExamRow>(
            "SELECT id, title, duration_minutes, camera_required, screen_required, \
             fullscreen_required, focus_loss_limit, face_sensitivity FROM exams WHERE id = ?",
        )
        .bind(exam_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Exam {} not found", exam_id)))?;

        Ok(row.into())
    }

    async fn get_questions(&self, exam_id: i64) -> Result<Vec<Question>, AppError> {
        let rows = sqlx::query_as::<_, QuestionRow>(
            "SELECT id, exam_id, position, type, content, options, coding_spec, correct_option, marks \
             FROM questions WHERE exam_id = ? ORDER BY position, id",
        )
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id;
                let question = row.into_public();
                if question.is_none() {
                    tracing::warn!(question_id = id, "Skipping question with unknown type");
                }
                question
            })
            .collect())
    }
}

#[async_trait]
impl AttemptProvider for SqliteStore {
    async fn resume_attempt(&self, exam_id: i64, candidate: &str) -> Result<Option<ExamAttempt>, AppError> {
        Ok(self.fetch_attempt(exam_id, candidate).await?.map(ExamAttempt::from))
    }

    async fn start_attempt(&self, exam_id: i64, candidate: &str) -> Result<ExamAttempt, AppError> {
        let result = sqlx::query(
            "INSERT INTO attempts (exam_id, candidate, started_at) VALUES (?, ?, ?) \
             ON CONFLICT(exam_id, candidate) DO NOTHING",
        )
        .bind(exam_id)
        .bind(candidate)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            tracing::info!(exam_id, candidate, "Attempt started");
        }

        self.fetch_attempt(exam_id, candidate)
            .await?
            .map(ExamAttempt::from)
            .ok_or_else(|| AppError::InternalServerError("Attempt vanished after insert".to_string()))
    }
}

#[async_trait]
impl AutosaveSink for SqliteStore {
    async fn autosave(&self, payload: &AutosavePayload) -> Result<(), AppError> {
        // Upsert: a submitted attempt is never touched again.
        let result = sqlx::query(
            "INSERT INTO attempts (exam_id, candidate, started_at, answers, marked, activity_logs) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(exam_id, candidate) DO UPDATE SET \
                answers = excluded.answers, \
                marked = excluded.marked, \
                activity_logs = excluded.activity_logs \
             WHERE attempts.status = 'in_progress'",
        )
        .bind(payload.exam_id)
        .bind(&payload.candidate)
        .bind(Utc::now())
        .bind(Json(&payload.answers))
        .bind(Json(&payload.marked_for_review))
        .bind(Json(&payload.activity_logs))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to autosave attempt: {:?}", e);
            AppError::Upstream(e.to_string())
        })?;

        if result.rows_affected() == 0 {
            tracing::debug!(exam_id = payload.exam_id, "Autosave ignored for submitted attempt");
        }
        Ok(())
    }
}

#[async_trait]
impl SubmitSink for SqliteStore {
    async fn submit(&self, payload: &SubmitPayload) -> Result<SubmitReceipt, AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {} FROM attempts WHERE exam_id = ? AND candidate = ?",
            ATTEMPT_COLUMNS
        ))
        .bind(payload.exam_id)
        .bind(&payload.candidate)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("No attempt to submit".to_string()))?;

        if AttemptStatus::parse(&row.status) == AttemptStatus::Submitted {
            tracing::info!(attempt_id = row.id, "Repeated submit, returning stored receipt");
            return receipt_from_row(&row);
        }

        let keys = sqlx::query_as::<_, AnswerKey>(
            "SELECT id, type AS question_type, correct_option, marks FROM questions WHERE exam_id = ?",
        )
        .bind(payload.exam_id)
        .fetch_all(&mut *tx)
        .await?;

        let (score, total) = calculate_score(&payload.answers, &keys);
        let submitted_at = Utc::now();

        let result = sqlx::query(
            "UPDATE attempts SET status = 'submitted', answers = ?, marked = ?, activity_logs = ?, \
             submission_type = ?, score = ?, total = ?, submitted_at = ? \
             WHERE id = ? AND status = 'in_progress'",
        )
        .bind(Json(&payload.answers))
        .bind(Json(&payload.marked_for_review))
        .bind(Json(&payload.activity_logs))
        .bind(payload.submission_type.as_str())
        .bind(score)
        .bind(total)
        .bind(submitted_at)
        .bind(row.id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            let row = self
                .fetch_attempt(payload.exam_id, &payload.candidate)
                .await?
                .ok_or_else(|| AppError::NotFound("No attempt to submit".to_string()))?;
            return receipt_from_row(&row);
        }

        tx.commit().await?;
        tracing::info!(
            attempt_id = row.id,
            score,
            total,
            submission_type = payload.submission_type.as_str(),
            "Attempt submitted"
        );

        Ok(SubmitReceipt {
            score,
            total,
            submission_type: payload.submission_type,
            submitted_at,
        })
    }
}

#[async_trait]
impl RecordingSink for SqliteStore {
    async fn upload_recording(
        &self,
        exam_id: i64,
        candidate: &str,
        webcam: Option<Vec<u8>>,
        screen: Option<Vec<u8>>,
    ) -> Result<(), AppError> {
        tokio::fs::create_dir_all(&self.recording_dir).await?;

        for (stream, data) in [(StreamKind::Webcam, webcam), (StreamKind::Screen, screen)] {
            let Some(data) = data else { continue };
            let path = self.write_recording(exam_id, candidate, stream, &data).await?;
            tracing::info!(stream = stream.as_str(), path = %path.display(), bytes = data.len(), "Recording stored");
        }
        Ok(())
    }
}

/// Inserts a small mixed exam under `exam_id` unless one already exists.
pub async fn seed_demo_exam(pool: &SqlitePool, exam_id: i64) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO exams (id, title, duration_minutes, camera_required, screen_required, \
         fullscreen_required, focus_loss_limit, face_sensitivity) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(exam_id)
    .bind("Demo Proctored Exam")
    .bind(10_i64)
    .bind(true)
    .bind(false)
    .bind(true)
    .bind(3_i64)
    .bind(0.5_f64)
    .execute(&mut *tx)
    .await?;

    if inserted.rows_affected() == 0 {
        return Ok(());
    }

    let choices: [(&str, [&str; 4], i64); 2] = [
        ("Which keyword declares an immutable binding in Rust?", ["var", "let", "const fn", "mut"], 1),
        ("What does HTTP status 404 mean?", ["Unauthorized", "Server error", "Not Found", "Conflict"], 2),
    ];
    let mut position = 0_i64;
    for (content, options, correct) in choices {
        position += 1;
        sqlx::query(
            "INSERT INTO questions (exam_id, position, type, content, options, correct_option, marks) \
             VALUES (?, ?, 'choice', ?, ?, ?, 1)",
        )
        .bind(exam_id)
        .bind(position)
        .bind(content)
        .bind(Json(options.to_vec()))
        .bind(correct)
        .execute(&mut *tx)
        .await?;
    }

    let coding = CodingSpec {
        languages: vec!["python".to_string(), "javascript".to_string()],
        starter_code: Some("def reverse(s):\n    pass\n".to_string()),
        test_case_count: 3,
    };
    sqlx::query(
        "INSERT INTO questions (exam_id, position, type, content, options, coding_spec, marks) \
         VALUES (?, ?, 'coding', ?, '[]', ?, 2)",
    )
    .bind(exam_id)
    .bind(position + 1)
    .bind("Write a function that reverses a string.")
    .bind(Json(coding))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::info!(exam_id, "Seeded demo exam");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::answer::CodingAnswer;

    fn key(id: i64, question_type: &str, correct_option: Option<i64>, marks: i64) -> AnswerKey {
        AnswerKey {
            id,
            question_type: question_type.to_string(),
            correct_option,
            marks,
        }
    }

    #[test]
    fn test_calculate_score_perfect() {
        let keys = vec![key(1, "choice", Some(0), 1), key(2, "choice", Some(3), 1)];
        let mut answers = BTreeMap::new();
        answers.insert(1, Answer::Choice { option: 0 });
        answers.insert(2, Answer::Choice { option: 3 });

        assert_eq!(calculate_score(&answers, &keys), (2, 2));
    }

    #[test]
    fn test_calculate_score_weights_marks() {
        let keys = vec![key(1, "choice", Some(1), 1), key(2, "coding", None, 3)];
        let mut answers = BTreeMap::new();
        answers.insert(1, Answer::Choice { option: 2 }); // Wrong
        answers.insert(
            2,
            Answer::Coding(CodingAnswer {
                code: "print(1)".to_string(),
                language: "python".to_string(),
                passed: Some(true),
                test_results: vec![],
            }),
        );

        assert_eq!(calculate_score(&answers, &keys), (3, 4));
    }

    #[test]
    fn test_calculate_score_unrun_code_scores_nothing() {
        let keys = vec![key(7, "coding", None, 2)];
        let mut answers = BTreeMap::new();
        answers.insert(
            7,
            Answer::Coding(CodingAnswer {
                code: "print(1)".to_string(),
                ..CodingAnswer::default()
            }),
        );

        assert_eq!(calculate_score(&answers, &keys), (0, 2));
    }

    #[test]
    fn test_calculate_score_zero() {
        let keys = vec![key(1, "choice", Some(0), 1)];
        assert_eq!(calculate_score(&BTreeMap::new(), &keys), (0, 1));
        assert_eq!(calculate_score(&BTreeMap::new(), &[]), (0, 0));
    }

    #[test]
    fn test_file_slug() {
        assert_eq!(file_slug("cand/../01 x"), "cand____01_x");
    }
}
