#![forbid(unsafe_code)]

pub mod completion_service;
pub mod error;
pub mod leitner_service;
pub mod prerequisite_service;
pub mod session_service;
pub mod view;

pub use course_core::Clock;

pub use completion_service::{CompletionOutcome, CompletionService};
pub use error::{CompletionError, ErrorKind, LeitnerError, PrerequisiteError, SessionError};
pub use leitner_service::LeitnerService;
pub use prerequisite_service::PrerequisiteService;
pub use session_service::QuizSessionService;

pub use view::{
    AnswerOutcome, LeitnerReview, LeitnerStatus, LockStatus, QuestionView, ReviewFinish,
    SessionResult, SessionReview, StartedReview, StartedSession,
};
