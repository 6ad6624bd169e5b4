use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the full schema (content tree, completion facts, quiz sessions,
/// Leitner boxes and review sessions, and indexes).
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS modules (
                    id INTEGER PRIMARY KEY,
                    classroom_id INTEGER NOT NULL,
                    title TEXT NOT NULL,
                    prerequisite_id INTEGER,
                    FOREIGN KEY (prerequisite_id) REFERENCES modules(id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS quizzes (
                    id INTEGER PRIMARY KEY,
                    module_id INTEGER NOT NULL,
                    title TEXT NOT NULL,
                    prerequisite_id INTEGER,
                    min_score_to_unlock_next INTEGER NOT NULL CHECK (min_score_to_unlock_next >= 0),
                    is_active INTEGER NOT NULL CHECK (is_active IN (0, 1)),
                    FOREIGN KEY (module_id) REFERENCES modules(id) ON DELETE CASCADE,
                    FOREIGN KEY (prerequisite_id) REFERENCES quizzes(id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS questions (
                    id INTEGER PRIMARY KEY,
                    quiz_id INTEGER NOT NULL,
                    prompt TEXT NOT NULL,
                    explanation TEXT,
                    shape TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    FOREIGN KEY (quiz_id) REFERENCES quizzes(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS completed_quizzes (
                    student_id INTEGER NOT NULL,
                    quiz_id INTEGER NOT NULL,
                    completed_at TEXT NOT NULL,
                    PRIMARY KEY (student_id, quiz_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS completed_modules (
                    student_id INTEGER NOT NULL,
                    module_id INTEGER NOT NULL,
                    completed_at TEXT NOT NULL,
                    PRIMARY KEY (student_id, module_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS quiz_sessions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    quiz_id INTEGER NOT NULL,
                    student_id INTEGER NOT NULL,
                    classroom_id INTEGER NOT NULL,
                    status TEXT NOT NULL CHECK (status IN ('in_progress', 'completed', 'abandoned')),
                    started_at TEXT NOT NULL,
                    completed_at TEXT,
                    total_score INTEGER NOT NULL CHECK (total_score >= 0),
                    max_score INTEGER NOT NULL CHECK (max_score >= 0),
                    passed INTEGER NOT NULL CHECK (passed IN (0, 1)),
                    FOREIGN KEY (quiz_id) REFERENCES quizzes(id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS session_answers (
                    session_id INTEGER NOT NULL,
                    question_id INTEGER NOT NULL,
                    is_correct INTEGER NOT NULL CHECK (is_correct IN (0, 1)),
                    verdict TEXT NOT NULL,
                    answered_at TEXT NOT NULL,
                    PRIMARY KEY (session_id, question_id),
                    FOREIGN KEY (session_id) REFERENCES quiz_sessions(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS leitner_boxes (
                    classroom_id INTEGER NOT NULL,
                    student_id INTEGER NOT NULL,
                    question_id INTEGER NOT NULL,
                    box_level INTEGER NOT NULL CHECK (box_level BETWEEN 1 AND 5),
                    last_reviewed_at TEXT,
                    PRIMARY KEY (classroom_id, student_id, question_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS leitner_sessions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    classroom_id INTEGER NOT NULL,
                    student_id INTEGER NOT NULL,
                    question_count INTEGER NOT NULL CHECK (question_count > 0),
                    status TEXT NOT NULL CHECK (status IN ('in_progress', 'completed', 'abandoned')),
                    started_at TEXT NOT NULL,
                    completed_at TEXT
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS leitner_picks (
                    session_id INTEGER NOT NULL,
                    question_id INTEGER NOT NULL,
                    box_before INTEGER NOT NULL CHECK (box_before BETWEEN 1 AND 5),
                    pick_order INTEGER NOT NULL,
                    PRIMARY KEY (session_id, question_id),
                    FOREIGN KEY (session_id) REFERENCES leitner_sessions(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS leitner_answers (
                    session_id INTEGER NOT NULL,
                    question_id INTEGER NOT NULL,
                    is_correct INTEGER NOT NULL CHECK (is_correct IN (0, 1)),
                    box_before INTEGER NOT NULL CHECK (box_before BETWEEN 1 AND 5),
                    box_after INTEGER NOT NULL CHECK (box_after BETWEEN 1 AND 5),
                    verdict TEXT NOT NULL,
                    answered_at TEXT NOT NULL,
                    PRIMARY KEY (session_id, question_id),
                    FOREIGN KEY (session_id) REFERENCES leitner_sessions(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_modules_classroom
                    ON modules(classroom_id, id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_quizzes_module
                    ON quizzes(module_id, id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_questions_quiz
                    ON questions(quiz_id, id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_quiz_sessions_status_started
                    ON quiz_sessions(status, started_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_leitner_boxes_student
                    ON leitner_boxes(classroom_id, student_id, box_level);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_leitner_sessions_status_started
                    ON leitner_sessions(status, started_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
