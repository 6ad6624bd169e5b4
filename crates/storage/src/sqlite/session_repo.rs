use chrono::{DateTime, Utc};
use course_core::model::{SessionId, SessionStatus};

use super::SqliteRepository;
use super::mapping::{
    conn, map_session_answer_row, map_session_row, u64_to_i64, verdict_to_json,
};
use crate::repository::{NewSession, SessionAnswerRecord, SessionRecord, SessionRepository, StorageError};

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn insert_session(&self, new: NewSession) -> Result<SessionId, StorageError> {
        let result = sqlx::query(
            r"
            INSERT INTO quiz_sessions (
                quiz_id, student_id, classroom_id, status, started_at,
                completed_at, total_score, max_score, passed
            )
            VALUES (?1, ?2, ?3, ?4, ?5, NULL, 0, ?6, 0)
            ",
        )
        .bind(u64_to_i64("quiz_id", new.quiz_id.value())?)
        .bind(u64_to_i64("student_id", new.student_id.value())?)
        .bind(u64_to_i64("classroom_id", new.classroom_id.value())?)
        .bind(SessionStatus::InProgress.as_str())
        .bind(new.started_at)
        .bind(i64::from(new.max_score))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        let id = u64::try_from(result.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("session rowid overflow".into()))?;
        Ok(SessionId::new(id))
    }

    async fn get_session(&self, id: SessionId) -> Result<SessionRecord, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, quiz_id, student_id, classroom_id, status, started_at,
                   completed_at, total_score, max_score, passed
            FROM quiz_sessions
            WHERE id = ?1
            ",
        )
        .bind(u64_to_i64("session_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        map_session_row(&row)
    }

    async fn append_answer(&self, answer: &SessionAnswerRecord) -> Result<(), StorageError> {
        let result = sqlx::query(
            r"
            INSERT INTO session_answers (session_id, question_id, is_correct, verdict, answered_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(session_id, question_id) DO NOTHING
            ",
        )
        .bind(u64_to_i64("session_id", answer.session_id.value())?)
        .bind(u64_to_i64("question_id", answer.question_id.value())?)
        .bind(answer.is_correct)
        .bind(verdict_to_json(&answer.verdict)?)
        .bind(answer.answered_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }
        Ok(())
    }

    async fn answers_for_session(
        &self,
        id: SessionId,
    ) -> Result<Vec<SessionAnswerRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT session_id, question_id, is_correct, verdict, answered_at
            FROM session_answers
            WHERE session_id = ?1
            ORDER BY rowid ASC
            ",
        )
        .bind(u64_to_i64("session_id", id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_session_answer_row).collect()
    }

    async fn complete_session(
        &self,
        id: SessionId,
        completed_at: DateTime<Utc>,
        total_score: u32,
        passed: bool,
    ) -> Result<bool, StorageError> {
        // Compare-and-swap on status: only one caller wins against a
        // concurrent finish or the timeout sweep.
        let result = sqlx::query(
            r"
            UPDATE quiz_sessions
            SET status = ?2, completed_at = ?3, total_score = ?4, passed = ?5
            WHERE id = ?1 AND status = ?6
            ",
        )
        .bind(u64_to_i64("session_id", id.value())?)
        .bind(SessionStatus::Completed.as_str())
        .bind(completed_at)
        .bind(i64::from(total_score))
        .bind(passed)
        .bind(SessionStatus::InProgress.as_str())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(result.rows_affected() == 1)
    }

    async fn abandon_session(&self, id: SessionId) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE quiz_sessions SET status = ?2 WHERE id = ?1 AND status = ?3",
        )
        .bind(u64_to_i64("session_id", id.value())?)
        .bind(SessionStatus::Abandoned.as_str())
        .bind(SessionStatus::InProgress.as_str())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(result.rows_affected() == 1)
    }

    async fn abandon_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query(
            "UPDATE quiz_sessions SET status = ?1 WHERE status = ?2 AND started_at <= ?3",
        )
        .bind(SessionStatus::Abandoned.as_str())
        .bind(SessionStatus::InProgress.as_str())
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(result.rows_affected())
    }
}
