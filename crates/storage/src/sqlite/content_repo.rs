use course_core::model::{Module, ModuleId, Question, QuestionId, Quiz, QuizId};
use course_core::model::ClassroomId;

use super::SqliteRepository;
use super::mapping::{
    conn, map_module_row, map_question_row, map_quiz_row, opt_u64_to_i64, ser, u64_to_i64,
};
use crate::repository::{ContentRepository, StorageError};

#[async_trait::async_trait]
impl ContentRepository for SqliteRepository {
    async fn upsert_module(&self, module: &Module) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO modules (id, classroom_id, title, prerequisite_id)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                classroom_id = excluded.classroom_id,
                title = excluded.title,
                prerequisite_id = excluded.prerequisite_id
            ",
        )
        .bind(u64_to_i64("module_id", module.id().value())?)
        .bind(u64_to_i64("classroom_id", module.classroom_id().value())?)
        .bind(module.title())
        .bind(opt_u64_to_i64(
            "prerequisite_id",
            module.prerequisite_id().map(|p| p.value()),
        )?)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_module(&self, id: ModuleId) -> Result<Module, StorageError> {
        let row = sqlx::query(
            "SELECT id, classroom_id, title, prerequisite_id FROM modules WHERE id = ?1",
        )
        .bind(u64_to_i64("module_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        map_module_row(&row)
    }

    async fn modules_in_classroom(
        &self,
        classroom_id: ClassroomId,
    ) -> Result<Vec<Module>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, classroom_id, title, prerequisite_id
            FROM modules
            WHERE classroom_id = ?1
            ORDER BY id ASC
            ",
        )
        .bind(u64_to_i64("classroom_id", classroom_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_module_row).collect()
    }

    async fn set_module_prerequisite(
        &self,
        id: ModuleId,
        prerequisite_id: Option<ModuleId>,
    ) -> Result<(), StorageError> {
        let result = sqlx::query("UPDATE modules SET prerequisite_id = ?2 WHERE id = ?1")
            .bind(u64_to_i64("module_id", id.value())?)
            .bind(opt_u64_to_i64(
                "prerequisite_id",
                prerequisite_id.map(|p| p.value()),
            )?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn upsert_quiz(&self, quiz: &Quiz) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO quizzes (
                id, module_id, title, prerequisite_id, min_score_to_unlock_next, is_active
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                module_id = excluded.module_id,
                title = excluded.title,
                prerequisite_id = excluded.prerequisite_id,
                min_score_to_unlock_next = excluded.min_score_to_unlock_next,
                is_active = excluded.is_active
            ",
        )
        .bind(u64_to_i64("quiz_id", quiz.id().value())?)
        .bind(u64_to_i64("module_id", quiz.module_id().value())?)
        .bind(quiz.title())
        .bind(opt_u64_to_i64(
            "prerequisite_id",
            quiz.prerequisite_id().map(|p| p.value()),
        )?)
        .bind(i64::from(quiz.min_score_to_unlock_next()))
        .bind(quiz.is_active())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_quiz(&self, id: QuizId) -> Result<Quiz, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, module_id, title, prerequisite_id, min_score_to_unlock_next, is_active
            FROM quizzes
            WHERE id = ?1
            ",
        )
        .bind(u64_to_i64("quiz_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        map_quiz_row(&row)
    }

    async fn quizzes_in_module(&self, module_id: ModuleId) -> Result<Vec<Quiz>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, module_id, title, prerequisite_id, min_score_to_unlock_next, is_active
            FROM quizzes
            WHERE module_id = ?1
            ORDER BY id ASC
            ",
        )
        .bind(u64_to_i64("module_id", module_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_quiz_row).collect()
    }

    async fn set_quiz_prerequisite(
        &self,
        id: QuizId,
        prerequisite_id: Option<QuizId>,
    ) -> Result<(), StorageError> {
        let result = sqlx::query("UPDATE quizzes SET prerequisite_id = ?2 WHERE id = ?1")
            .bind(u64_to_i64("quiz_id", id.value())?)
            .bind(opt_u64_to_i64(
                "prerequisite_id",
                prerequisite_id.map(|p| p.value()),
            )?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let payload = serde_json::to_string(question.shape()).map_err(ser)?;
        sqlx::query(
            r"
            INSERT INTO questions (id, quiz_id, prompt, explanation, shape, payload)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                quiz_id = excluded.quiz_id,
                prompt = excluded.prompt,
                explanation = excluded.explanation,
                shape = excluded.shape,
                payload = excluded.payload
            ",
        )
        .bind(u64_to_i64("question_id", question.id().value())?)
        .bind(u64_to_i64("quiz_id", question.quiz_id().value())?)
        .bind(question.prompt())
        .bind(question.explanation())
        .bind(question.shape().kind().as_str())
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_question(&self, id: QuestionId) -> Result<Question, StorageError> {
        let row = sqlx::query(
            "SELECT id, quiz_id, prompt, explanation, shape, payload FROM questions WHERE id = ?1",
        )
        .bind(u64_to_i64("question_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        map_question_row(&row)
    }

    async fn questions_for_quiz(&self, quiz_id: QuizId) -> Result<Vec<Question>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, quiz_id, prompt, explanation, shape, payload
            FROM questions
            WHERE quiz_id = ?1
            ORDER BY id ASC
            ",
        )
        .bind(u64_to_i64("quiz_id", quiz_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_question_row).collect()
    }
}
