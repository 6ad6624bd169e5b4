use chrono::{DateTime, Utc};
use course_core::leitner::BoxLevel;
use course_core::model::{ClassroomId, QuestionId, ReviewSessionId, SessionStatus, StudentId};

use super::SqliteRepository;
use super::mapping::{
    box_level_from_i64, conn, map_box_row, map_pick_row, map_review_answer_row,
    map_review_session_row, u64_to_i64, verdict_to_json,
};
use crate::repository::{
    LeitnerBoxRecord, LeitnerRepository, NewReviewSession, ReviewAnswerRecord, ReviewPickRecord,
    ReviewSessionRecord, StorageError,
};

#[async_trait::async_trait]
impl LeitnerRepository for SqliteRepository {
    async fn seed_box(&self, record: &LeitnerBoxRecord) -> Result<bool, StorageError> {
        // First insert wins; an established level is never overwritten.
        let result = sqlx::query(
            r"
            INSERT INTO leitner_boxes (
                classroom_id, student_id, question_id, box_level, last_reviewed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(classroom_id, student_id, question_id) DO NOTHING
            ",
        )
        .bind(u64_to_i64("classroom_id", record.classroom_id.value())?)
        .bind(u64_to_i64("student_id", record.student_id.value())?)
        .bind(u64_to_i64("question_id", record.question_id.value())?)
        .bind(i64::from(record.box_level.value()))
        .bind(record.last_reviewed_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_box(
        &self,
        classroom_id: ClassroomId,
        student_id: StudentId,
        question_id: QuestionId,
    ) -> Result<Option<LeitnerBoxRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT classroom_id, student_id, question_id, box_level, last_reviewed_at
            FROM leitner_boxes
            WHERE classroom_id = ?1 AND student_id = ?2 AND question_id = ?3
            ",
        )
        .bind(u64_to_i64("classroom_id", classroom_id.value())?)
        .bind(u64_to_i64("student_id", student_id.value())?)
        .bind(u64_to_i64("question_id", question_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_box_row).transpose()
    }

    async fn boxes_for_student(
        &self,
        classroom_id: ClassroomId,
        student_id: StudentId,
    ) -> Result<Vec<LeitnerBoxRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT classroom_id, student_id, question_id, box_level, last_reviewed_at
            FROM leitner_boxes
            WHERE classroom_id = ?1 AND student_id = ?2
            ORDER BY question_id ASC
            ",
        )
        .bind(u64_to_i64("classroom_id", classroom_id.value())?)
        .bind(u64_to_i64("student_id", student_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_box_row).collect()
    }

    async fn box_counts(
        &self,
        classroom_id: ClassroomId,
        student_id: StudentId,
    ) -> Result<[u64; 5], StorageError> {
        use sqlx::Row;

        let rows = sqlx::query(
            r"
            SELECT box_level, COUNT(*) AS n
            FROM leitner_boxes
            WHERE classroom_id = ?1 AND student_id = ?2
            GROUP BY box_level
            ",
        )
        .bind(u64_to_i64("classroom_id", classroom_id.value())?)
        .bind(u64_to_i64("student_id", student_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut counts = [0u64; 5];
        for row in rows {
            let level = box_level_from_i64(row.try_get::<i64, _>("box_level").map_err(conn)?)?;
            let n: i64 = row.try_get("n").map_err(conn)?;
            counts[level.index()] = u64::try_from(n)
                .map_err(|_| StorageError::Serialization("negative count".into()))?;
        }
        Ok(counts)
    }

    async fn update_box(
        &self,
        classroom_id: ClassroomId,
        student_id: StudentId,
        question_id: QuestionId,
        level: BoxLevel,
        reviewed_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            r"
            UPDATE leitner_boxes
            SET box_level = ?4, last_reviewed_at = ?5
            WHERE classroom_id = ?1 AND student_id = ?2 AND question_id = ?3
            ",
        )
        .bind(u64_to_i64("classroom_id", classroom_id.value())?)
        .bind(u64_to_i64("student_id", student_id.value())?)
        .bind(u64_to_i64("question_id", question_id.value())?)
        .bind(i64::from(level.value()))
        .bind(reviewed_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn insert_review_session(
        &self,
        new: NewReviewSession,
        picks: &[(QuestionId, BoxLevel)],
    ) -> Result<ReviewSessionId, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let result = sqlx::query(
            r"
            INSERT INTO leitner_sessions (
                classroom_id, student_id, question_count, status, started_at, completed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, NULL)
            ",
        )
        .bind(u64_to_i64("classroom_id", new.classroom_id.value())?)
        .bind(u64_to_i64("student_id", new.student_id.value())?)
        .bind(i64::from(new.question_count))
        .bind(SessionStatus::InProgress.as_str())
        .bind(new.started_at)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        let session_id = u64::try_from(result.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("review session rowid overflow".into()))?;

        for (order, &(question_id, box_before)) in picks.iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO leitner_picks (session_id, question_id, box_before, pick_order)
                VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(u64_to_i64("session_id", session_id)?)
            .bind(u64_to_i64("question_id", question_id.value())?)
            .bind(i64::from(box_before.value()))
            .bind(u64_to_i64("pick_order", order as u64)?)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(ReviewSessionId::new(session_id))
    }

    async fn get_review_session(
        &self,
        id: ReviewSessionId,
    ) -> Result<ReviewSessionRecord, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, classroom_id, student_id, question_count, status, started_at, completed_at
            FROM leitner_sessions
            WHERE id = ?1
            ",
        )
        .bind(u64_to_i64("session_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        map_review_session_row(&row)
    }

    async fn picks_for_session(
        &self,
        id: ReviewSessionId,
    ) -> Result<Vec<ReviewPickRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT session_id, question_id, box_before
            FROM leitner_picks
            WHERE session_id = ?1
            ORDER BY pick_order ASC
            ",
        )
        .bind(u64_to_i64("session_id", id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_pick_row).collect()
    }

    async fn append_review_answer(&self, answer: &ReviewAnswerRecord) -> Result<(), StorageError> {
        let result = sqlx::query(
            r"
            INSERT INTO leitner_answers (
                session_id, question_id, is_correct, box_before, box_after, verdict, answered_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(session_id, question_id) DO NOTHING
            ",
        )
        .bind(u64_to_i64("session_id", answer.session_id.value())?)
        .bind(u64_to_i64("question_id", answer.question_id.value())?)
        .bind(answer.is_correct)
        .bind(i64::from(answer.box_before.value()))
        .bind(i64::from(answer.box_after.value()))
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

    async fn answers_for_review_session(
        &self,
        id: ReviewSessionId,
    ) -> Result<Vec<ReviewAnswerRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT session_id, question_id, is_correct, box_before, box_after, verdict, answered_at
            FROM leitner_answers
            WHERE session_id = ?1
            ORDER BY rowid ASC
            ",
        )
        .bind(u64_to_i64("session_id", id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_review_answer_row).collect()
    }

    async fn complete_review_session(
        &self,
        id: ReviewSessionId,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r"
            UPDATE leitner_sessions
            SET status = ?2, completed_at = ?3
            WHERE id = ?1 AND status = ?4
            ",
        )
        .bind(u64_to_i64("session_id", id.value())?)
        .bind(SessionStatus::Completed.as_str())
        .bind(completed_at)
        .bind(SessionStatus::InProgress.as_str())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(result.rows_affected() == 1)
    }

    async fn abandon_stale_reviews(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query(
            "UPDATE leitner_sessions SET status = ?1 WHERE status = ?2 AND started_at <= ?3",
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
