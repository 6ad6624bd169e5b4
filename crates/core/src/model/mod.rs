mod ids;
mod node;
mod question;
mod session;

pub use ids::{
    ClassroomId, ModuleId, OptionId, ParseIdError, QuestionId, QuizId, ReviewSessionId, SessionId,
    StudentId, ZoneId,
};
pub use node::{Module, NodeError, Quiz};
pub use question::{
    ChoiceOption, ClickZone, MatchPair, Question, QuestionError, QuestionShape, Response,
    ShapeKind,
};
pub use session::{SessionStatus, session_timeout};
