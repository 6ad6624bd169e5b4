use chrono::{DateTime, Utc};
use course_core::model::{ModuleId, QuizId, StudentId};

use super::SqliteRepository;
use super::mapping::{conn, u64_to_i64};
use crate::repository::{CompletionRepository, StorageError};

#[async_trait::async_trait]
impl CompletionRepository for SqliteRepository {
    async fn insert_quiz_fact(
        &self,
        student_id: StudentId,
        quiz_id: QuizId,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        // The primary key makes the insert race-safe: exactly one concurrent
        // caller observes rows_affected == 1.
        let result = sqlx::query(
            r"
            INSERT INTO completed_quizzes (student_id, quiz_id, completed_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(student_id, quiz_id) DO NOTHING
            ",
        )
        .bind(u64_to_i64("student_id", student_id.value())?)
        .bind(u64_to_i64("quiz_id", quiz_id.value())?)
        .bind(completed_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(result.rows_affected() == 1)
    }

    async fn has_quiz_fact(
        &self,
        student_id: StudentId,
        quiz_id: QuizId,
    ) -> Result<bool, StorageError> {
        let row = sqlx::query(
            "SELECT 1 FROM completed_quizzes WHERE student_id = ?1 AND quiz_id = ?2",
        )
        .bind(u64_to_i64("student_id", student_id.value())?)
        .bind(u64_to_i64("quiz_id", quiz_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        Ok(row.is_some())
    }

    async fn insert_module_fact(
        &self,
        student_id: StudentId,
        module_id: ModuleId,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r"
            INSERT INTO completed_modules (student_id, module_id, completed_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(student_id, module_id) DO NOTHING
            ",
        )
        .bind(u64_to_i64("student_id", student_id.value())?)
        .bind(u64_to_i64("module_id", module_id.value())?)
        .bind(completed_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(result.rows_affected() == 1)
    }

    async fn has_module_fact(
        &self,
        student_id: StudentId,
        module_id: ModuleId,
    ) -> Result<bool, StorageError> {
        let row = sqlx::query(
            "SELECT 1 FROM completed_modules WHERE student_id = ?1 AND module_id = ?2",
        )
        .bind(u64_to_i64("student_id", student_id.value())?)
        .bind(u64_to_i64("module_id", module_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        Ok(row.is_some())
    }
}
