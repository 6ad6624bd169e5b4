//! Shared error types for the services crate.

use thiserror::Error;

use course_core::grader::GradeError;
use course_core::model::{ModuleId, QuizId, SessionStatus};
use course_core::prerequisite::CycleError;
use storage::repository::StorageError;

/// Broad failure category, suitable for mapping to a transport layer
/// (HTTP status, exit code) without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Locked,
    Conflict,
    NotFound,
    State,
    Internal,
}

/// Errors emitted by `PrerequisiteService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PrerequisiteError {
    #[error("prerequisite edge would create a cycle")]
    Circular,

    #[error("prerequisite must be a sibling of the node it gates")]
    CrossScope,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl PrerequisiteError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            PrerequisiteError::Circular => ErrorKind::Conflict,
            PrerequisiteError::CrossScope => ErrorKind::Validation,
            PrerequisiteError::Storage(StorageError::NotFound) => ErrorKind::NotFound,
            PrerequisiteError::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            PrerequisiteError::Circular => "CIRCULAR_PREREQUISITE",
            PrerequisiteError::CrossScope => "PREREQUISITE_SCOPE_MISMATCH",
            PrerequisiteError::Storage(StorageError::NotFound) => "NOT_FOUND",
            PrerequisiteError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<CycleError> for PrerequisiteError {
    fn from(_: CycleError) -> Self {
        // Depth exhaustion is treated as a suspected cycle.
        PrerequisiteError::Circular
    }
}

/// Errors emitted by `QuizSessionService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("quiz is locked behind quiz {prerequisite}")]
    QuizLocked { prerequisite: QuizId },

    #[error("module prerequisite {prerequisite} is not met")]
    ModuleLocked { prerequisite: ModuleId },

    #[error("quiz is not active")]
    QuizInactive,

    #[error("session is {status:?} and accepts no further actions")]
    Closed { status: SessionStatus },

    #[error("question does not belong to this session's quiz")]
    NotInQuiz,

    #[error("question was already answered in this session")]
    AlreadyAnswered,

    #[error("session review requires a completed session")]
    NotCompleted,

    #[error(transparent)]
    Grade(#[from] GradeError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SessionError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::QuizLocked { .. } | SessionError::ModuleLocked { .. } => {
                ErrorKind::Locked
            }
            SessionError::QuizInactive | SessionError::Grade(_) => ErrorKind::Validation,
            // A finished session is a conflict with the completing call;
            // abandonment is silent cleanup, so touching it reads as a
            // plain state error.
            SessionError::Closed {
                status: SessionStatus::Completed,
            } => ErrorKind::Conflict,
            SessionError::Closed { .. } | SessionError::NotCompleted => ErrorKind::State,
            SessionError::NotInQuiz => ErrorKind::Validation,
            SessionError::AlreadyAnswered => ErrorKind::Conflict,
            SessionError::Storage(StorageError::NotFound) => ErrorKind::NotFound,
            SessionError::Storage(StorageError::Conflict) => ErrorKind::Conflict,
            SessionError::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::QuizLocked { .. } => "QUIZ_LOCKED",
            SessionError::ModuleLocked { .. } => "MODULE_PREREQUISITE_NOT_MET",
            SessionError::QuizInactive => "QUIZ_INACTIVE",
            SessionError::Closed { .. } => "SESSION_ALREADY_FINISHED",
            SessionError::NotInQuiz => "QUESTION_NOT_IN_QUIZ",
            SessionError::AlreadyAnswered => "QUESTION_ALREADY_ANSWERED",
            SessionError::NotCompleted => "SESSION_NOT_COMPLETED",
            SessionError::Grade(_) => "INVALID_RESPONSE_SHAPE",
            SessionError::Storage(StorageError::NotFound) => "NOT_FOUND",
            SessionError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

/// Errors emitted by `LeitnerService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LeitnerError {
    #[error("question count {got} is not one of the allowed sizes")]
    InvalidQuestionCount { got: u32 },

    #[error("no questions available for review")]
    NoQuestions,

    #[error("review session is {status:?} and accepts no further actions")]
    Closed { status: SessionStatus },

    #[error("question is not part of this review session")]
    NotInSession,

    #[error("question was already answered in this review session")]
    AlreadyAnswered,

    #[error("review summary requires a completed session")]
    NotCompleted,

    #[error(transparent)]
    Grade(#[from] GradeError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl LeitnerError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            LeitnerError::InvalidQuestionCount { .. } | LeitnerError::Grade(_) => {
                ErrorKind::Validation
            }
            LeitnerError::NoQuestions => ErrorKind::Validation,
            LeitnerError::Closed {
                status: SessionStatus::Completed,
            } => ErrorKind::Conflict,
            LeitnerError::Closed { .. } | LeitnerError::NotCompleted => ErrorKind::State,
            LeitnerError::NotInSession => ErrorKind::Validation,
            LeitnerError::AlreadyAnswered => ErrorKind::Conflict,
            LeitnerError::Storage(StorageError::NotFound) => ErrorKind::NotFound,
            LeitnerError::Storage(StorageError::Conflict) => ErrorKind::Conflict,
            LeitnerError::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            LeitnerError::InvalidQuestionCount { .. } => "INVALID_QUESTION_COUNT",
            LeitnerError::NoQuestions => "LEITNER_NO_QUESTIONS",
            LeitnerError::Closed { .. } => "SESSION_ALREADY_FINISHED",
            LeitnerError::NotInSession => "QUESTION_NOT_IN_SESSION",
            LeitnerError::AlreadyAnswered => "QUESTION_ALREADY_ANSWERED",
            LeitnerError::NotCompleted => "SESSION_NOT_COMPLETED",
            LeitnerError::Grade(_) => "INVALID_RESPONSE_SHAPE",
            LeitnerError::Storage(StorageError::NotFound) => "NOT_FOUND",
            LeitnerError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

/// Errors emitted by `CompletionService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompletionError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(PrerequisiteError::Circular.code(), "CIRCULAR_PREREQUISITE");
        assert_eq!(
            SessionError::QuizLocked {
                prerequisite: QuizId::new(1)
            }
            .code(),
            "QUIZ_LOCKED"
        );
        assert_eq!(
            SessionError::ModuleLocked {
                prerequisite: ModuleId::new(1)
            }
            .code(),
            "MODULE_PREREQUISITE_NOT_MET"
        );
        assert_eq!(
            SessionError::Closed {
                status: SessionStatus::Completed
            }
            .code(),
            "SESSION_ALREADY_FINISHED"
        );
        assert_eq!(
            LeitnerError::InvalidQuestionCount { got: 7 }.code(),
            "INVALID_QUESTION_COUNT"
        );
        assert_eq!(LeitnerError::NoQuestions.code(), "LEITNER_NO_QUESTIONS");
    }

    #[test]
    fn kinds_reflect_failure_category() {
        assert_eq!(
            SessionError::QuizLocked {
                prerequisite: QuizId::new(1)
            }
            .kind(),
            ErrorKind::Locked
        );
        assert_eq!(SessionError::AlreadyAnswered.kind(), ErrorKind::Conflict);
        assert_eq!(
            SessionError::Closed {
                status: SessionStatus::Completed
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            SessionError::Closed {
                status: SessionStatus::Abandoned
            }
            .kind(),
            ErrorKind::State
        );
        assert_eq!(
            LeitnerError::Closed {
                status: SessionStatus::Completed
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            SessionError::Storage(StorageError::NotFound).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(PrerequisiteError::Circular.kind(), ErrorKind::Conflict);
        assert_eq!(PrerequisiteError::CrossScope.kind(), ErrorKind::Validation);
    }
}
