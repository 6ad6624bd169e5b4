use course_core::grader::Verdict;
use course_core::leitner::BoxLevel;
use course_core::model::{
    ClassroomId, Module, ModuleId, Question, QuestionId, Quiz, QuizId, ReviewSessionId, SessionId,
    SessionStatus, StudentId,
};
use sqlx::Row;

use crate::repository::{
    LeitnerBoxRecord, ReviewAnswerRecord, ReviewPickRecord, ReviewSessionRecord,
    SessionAnswerRecord, SessionRecord, StorageError,
};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn u64_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn opt_u64_to_i64(
    field: &'static str,
    v: Option<u64>,
) -> Result<Option<i64>, StorageError> {
    v.map(|v| u64_to_i64(field, v)).transpose()
}

pub(crate) fn classroom_id_from_i64(v: i64) -> Result<ClassroomId, StorageError> {
    Ok(ClassroomId::new(i64_to_u64("classroom_id", v)?))
}

pub(crate) fn module_id_from_i64(v: i64) -> Result<ModuleId, StorageError> {
    Ok(ModuleId::new(i64_to_u64("module_id", v)?))
}

pub(crate) fn quiz_id_from_i64(v: i64) -> Result<QuizId, StorageError> {
    Ok(QuizId::new(i64_to_u64("quiz_id", v)?))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) fn student_id_from_i64(v: i64) -> Result<StudentId, StorageError> {
    Ok(StudentId::new(i64_to_u64("student_id", v)?))
}

pub(crate) fn session_id_from_i64(v: i64) -> Result<SessionId, StorageError> {
    Ok(SessionId::new(i64_to_u64("session_id", v)?))
}

pub(crate) fn review_session_id_from_i64(v: i64) -> Result<ReviewSessionId, StorageError> {
    Ok(ReviewSessionId::new(i64_to_u64("review_session_id", v)?))
}

pub(crate) fn parse_status(s: &str) -> Result<SessionStatus, StorageError> {
    SessionStatus::parse(s).ok_or_else(|| StorageError::Serialization(format!("invalid status: {s}")))
}

pub(crate) fn box_level_from_i64(v: i64) -> Result<BoxLevel, StorageError> {
    let v = u8::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid box: {v}")))?;
    BoxLevel::from_value(v).ok_or_else(|| StorageError::Serialization(format!("invalid box: {v}")))
}

pub(crate) fn verdict_to_json(verdict: &Verdict) -> Result<String, StorageError> {
    serde_json::to_string(verdict).map_err(ser)
}

pub(crate) fn verdict_from_json(json: &str) -> Result<Verdict, StorageError> {
    serde_json::from_str(json).map_err(ser)
}

pub(crate) fn map_module_row(row: &sqlx::sqlite::SqliteRow) -> Result<Module, StorageError> {
    Module::new(
        module_id_from_i64(row.try_get::<i64, _>("id").map_err(conn)?)?,
        classroom_id_from_i64(row.try_get::<i64, _>("classroom_id").map_err(conn)?)?,
        row.try_get::<String, _>("title").map_err(conn)?,
        row.try_get::<Option<i64>, _>("prerequisite_id")
            .map_err(conn)?
            .map(module_id_from_i64)
            .transpose()?,
    )
    .map_err(ser)
}

pub(crate) fn map_quiz_row(row: &sqlx::sqlite::SqliteRow) -> Result<Quiz, StorageError> {
    let min_score: i64 = row.try_get("min_score_to_unlock_next").map_err(conn)?;
    Quiz::new(
        quiz_id_from_i64(row.try_get::<i64, _>("id").map_err(conn)?)?,
        module_id_from_i64(row.try_get::<i64, _>("module_id").map_err(conn)?)?,
        row.try_get::<String, _>("title").map_err(conn)?,
        row.try_get::<Option<i64>, _>("prerequisite_id")
            .map_err(conn)?
            .map(quiz_id_from_i64)
            .transpose()?,
        u32::try_from(min_score)
            .map_err(|_| StorageError::Serialization(format!("invalid min_score: {min_score}")))?,
        row.try_get::<bool, _>("is_active").map_err(conn)?,
    )
    .map_err(ser)
}

/// The shape payload is stored as self-describing JSON; the `shape` column
/// is denormalized for queries and must agree with the payload's tag.
pub(crate) fn map_question_row(row: &sqlx::sqlite::SqliteRow) -> Result<Question, StorageError> {
    let payload: String = row.try_get("payload").map_err(conn)?;
    let shape = serde_json::from_str(&payload).map_err(ser)?;
    Question::new(
        question_id_from_i64(row.try_get::<i64, _>("id").map_err(conn)?)?,
        quiz_id_from_i64(row.try_get::<i64, _>("quiz_id").map_err(conn)?)?,
        row.try_get::<String, _>("prompt").map_err(conn)?,
        row.try_get::<Option<String>, _>("explanation").map_err(conn)?,
        shape,
    )
    .map_err(ser)
}

pub(crate) fn map_session_row(row: &sqlx::sqlite::SqliteRow) -> Result<SessionRecord, StorageError> {
    let status: String = row.try_get("status").map_err(conn)?;
    let total_score: i64 = row.try_get("total_score").map_err(conn)?;
    let max_score: i64 = row.try_get("max_score").map_err(conn)?;
    Ok(SessionRecord {
        id: session_id_from_i64(row.try_get::<i64, _>("id").map_err(conn)?)?,
        quiz_id: quiz_id_from_i64(row.try_get::<i64, _>("quiz_id").map_err(conn)?)?,
        student_id: student_id_from_i64(row.try_get::<i64, _>("student_id").map_err(conn)?)?,
        classroom_id: classroom_id_from_i64(row.try_get::<i64, _>("classroom_id").map_err(conn)?)?,
        status: parse_status(&status)?,
        started_at: row.try_get("started_at").map_err(conn)?,
        completed_at: row.try_get("completed_at").map_err(conn)?,
        total_score: u32::try_from(total_score).map_err(ser)?,
        max_score: u32::try_from(max_score).map_err(ser)?,
        passed: row.try_get("passed").map_err(conn)?,
    })
}

pub(crate) fn map_session_answer_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<SessionAnswerRecord, StorageError> {
    let verdict: String = row.try_get("verdict").map_err(conn)?;
    Ok(SessionAnswerRecord {
        session_id: session_id_from_i64(row.try_get::<i64, _>("session_id").map_err(conn)?)?,
        question_id: question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(conn)?)?,
        is_correct: row.try_get("is_correct").map_err(conn)?,
        verdict: verdict_from_json(&verdict)?,
        answered_at: row.try_get("answered_at").map_err(conn)?,
    })
}

pub(crate) fn map_box_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<LeitnerBoxRecord, StorageError> {
    Ok(LeitnerBoxRecord {
        classroom_id: classroom_id_from_i64(row.try_get::<i64, _>("classroom_id").map_err(conn)?)?,
        student_id: student_id_from_i64(row.try_get::<i64, _>("student_id").map_err(conn)?)?,
        question_id: question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(conn)?)?,
        box_level: box_level_from_i64(row.try_get::<i64, _>("box_level").map_err(conn)?)?,
        last_reviewed_at: row.try_get("last_reviewed_at").map_err(conn)?,
    })
}

pub(crate) fn map_review_session_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<ReviewSessionRecord, StorageError> {
    let status: String = row.try_get("status").map_err(conn)?;
    let question_count: i64 = row.try_get("question_count").map_err(conn)?;
    Ok(ReviewSessionRecord {
        id: review_session_id_from_i64(row.try_get::<i64, _>("id").map_err(conn)?)?,
        classroom_id: classroom_id_from_i64(row.try_get::<i64, _>("classroom_id").map_err(conn)?)?,
        student_id: student_id_from_i64(row.try_get::<i64, _>("student_id").map_err(conn)?)?,
        question_count: u32::try_from(question_count).map_err(ser)?,
        status: parse_status(&status)?,
        started_at: row.try_get("started_at").map_err(conn)?,
        completed_at: row.try_get("completed_at").map_err(conn)?,
    })
}

pub(crate) fn map_pick_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<ReviewPickRecord, StorageError> {
    Ok(ReviewPickRecord {
        session_id: review_session_id_from_i64(row.try_get::<i64, _>("session_id").map_err(conn)?)?,
        question_id: question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(conn)?)?,
        box_before: box_level_from_i64(row.try_get::<i64, _>("box_before").map_err(conn)?)?,
    })
}

pub(crate) fn map_review_answer_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<ReviewAnswerRecord, StorageError> {
    let verdict: String = row.try_get("verdict").map_err(conn)?;
    Ok(ReviewAnswerRecord {
        session_id: review_session_id_from_i64(row.try_get::<i64, _>("session_id").map_err(conn)?)?,
        question_id: question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(conn)?)?,
        is_correct: row.try_get("is_correct").map_err(conn)?,
        box_before: box_level_from_i64(row.try_get::<i64, _>("box_before").map_err(conn)?)?,
        box_after: box_level_from_i64(row.try_get::<i64, _>("box_after").map_err(conn)?)?,
        verdict: verdict_from_json(&verdict)?,
        answered_at: row.try_get("answered_at").map_err(conn)?,
    })
}
