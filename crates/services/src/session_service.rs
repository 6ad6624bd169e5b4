//! The quiz session state machine: start, answer, finish, review, sweep.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use course_core::grader::grade;
use course_core::leitner::BoxLevel;
use course_core::model::{
    QuestionId, QuizId, Response, SessionId, SessionStatus, StudentId, session_timeout,
};
use course_core::time::Clock;
use storage::repository::{
    ContentRepository, LeitnerBoxRecord, LeitnerRepository, NewSession, SessionAnswerRecord,
    SessionRecord, SessionRepository, Storage, StorageError,
};

use crate::completion_service::CompletionService;
use crate::error::{CompletionError, SessionError};
use crate::prerequisite_service::PrerequisiteService;
use crate::view::{
    AnswerOutcome, LockStatus, QuestionView, ReviewEntry, SessionResult, SessionReview,
    StartedSession,
};

/// Drives quiz sessions from start through grading to completion.
#[derive(Clone)]
pub struct QuizSessionService {
    storage: Storage,
    clock: Clock,
    prerequisites: PrerequisiteService,
    completions: CompletionService,
}

impl From<CompletionError> for SessionError {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::Storage(e) => SessionError::Storage(e),
        }
    }
}

impl QuizSessionService {
    #[must_use]
    pub fn new(storage: Storage) -> Self {
        Self {
            prerequisites: PrerequisiteService::new(storage.clone()),
            completions: CompletionService::new(storage.clone()),
            storage,
            clock: Clock::default(),
        }
    }

    /// Override the clock (usually for deterministic testing).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Current time according to the service's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Open a session for one student on one quiz.
    ///
    /// # Errors
    ///
    /// `StorageError::NotFound` for an unknown quiz, `QuizInactive` for a
    /// deactivated one, and `QuizLocked`/`ModuleLocked` when a prerequisite
    /// is unmet.
    pub async fn start(
        &self,
        student_id: StudentId,
        quiz_id: QuizId,
    ) -> Result<StartedSession, SessionError> {
        let quiz = self.storage.content.get_quiz(quiz_id).await?;
        if !quiz.is_active() {
            return Err(SessionError::QuizInactive);
        }

        match self.prerequisites.check_lock(student_id, quiz_id).await? {
            LockStatus::Unlocked => {}
            LockStatus::LockedByQuiz { prerequisite } => {
                return Err(SessionError::QuizLocked { prerequisite });
            }
            LockStatus::LockedByModule { prerequisite } => {
                return Err(SessionError::ModuleLocked { prerequisite });
            }
        }

        let module = self.storage.content.get_module(quiz.module_id()).await?;
        let questions = self.storage.content.questions_for_quiz(quiz_id).await?;
        let max_score = u32::try_from(questions.len()).unwrap_or(u32::MAX);

        let session_id = self
            .storage
            .sessions
            .insert_session(NewSession {
                quiz_id,
                student_id,
                classroom_id: module.classroom_id(),
                started_at: self.clock.now(),
                max_score,
            })
            .await?;

        info!(session = %session_id, quiz = %quiz_id, student = %student_id, "session started");

        Ok(StartedSession {
            session_id,
            quiz_id,
            questions: questions.iter().map(QuestionView::from_question).collect(),
            max_score,
        })
    }

    /// Grade one answer inside an open session. Returns the correctness bit
    /// only; full verdicts wait for [`QuizSessionService::review`].
    ///
    /// # Errors
    ///
    /// `Closed` once the session is no longer in progress (a timed-out
    /// session is abandoned on the spot), `NotInQuiz` for a foreign
    /// question, and `AlreadyAnswered` on a double submit.
    pub async fn submit_answer(
        &self,
        session_id: SessionId,
        question_id: QuestionId,
        response: &Response,
    ) -> Result<AnswerOutcome, SessionError> {
        let session = self.open_session(session_id).await?;

        let question = self.storage.content.get_question(question_id).await?;
        if question.quiz_id() != session.quiz_id {
            return Err(SessionError::NotInQuiz);
        }

        let verdict = grade(question.shape(), response)?;
        let correct = verdict.correct;

        let record = SessionAnswerRecord {
            session_id,
            question_id,
            is_correct: correct,
            verdict,
            answered_at: self.clock.now(),
        };
        self.storage
            .sessions
            .append_answer(&record)
            .await
            .map_err(|e| match e {
                StorageError::Conflict => SessionError::AlreadyAnswered,
                other => SessionError::Storage(other),
            })?;

        debug!(session = %session_id, question = %question_id, correct, "answer recorded");

        Ok(AnswerOutcome {
            question_id,
            correct,
        })
    }

    /// Close a session, score it, and fire pass side effects: completion
    /// facts plus seeding a Leitner box at level 1 for every quiz question
    /// (seed-if-absent, so an established level is never demoted).
    ///
    /// # Errors
    ///
    /// `Closed` when the session already reached a terminal state, including
    /// losing the race against a concurrent finish or the timeout sweep.
    pub async fn finish(&self, session_id: SessionId) -> Result<SessionResult, SessionError> {
        let session = self.open_session(session_id).await?;

        let answers = self.storage.sessions.answers_for_session(session_id).await?;
        let score = u32::try_from(answers.iter().filter(|a| a.is_correct).count())
            .unwrap_or(u32::MAX);

        let quiz = self.storage.content.get_quiz(session.quiz_id).await?;
        let passed = score >= quiz.min_score_to_unlock_next();
        let now = self.clock.now();

        let won = self
            .storage
            .sessions
            .complete_session(session_id, now, score, passed)
            .await?;
        if !won {
            let current = self.storage.sessions.get_session(session_id).await?;
            return Err(SessionError::Closed {
                status: current.status,
            });
        }

        let mut quiz_newly_completed = false;
        let mut module_newly_completed = false;
        if passed {
            let outcome = self
                .completions
                .record_quiz_completion(session.student_id, &quiz, score, now)
                .await?;
            quiz_newly_completed = outcome.quiz_newly_completed;
            module_newly_completed = outcome.module_newly_completed;

            let questions = self
                .storage
                .content
                .questions_for_quiz(session.quiz_id)
                .await?;
            for question in &questions {
                self.storage
                    .leitner
                    .seed_box(&LeitnerBoxRecord {
                        classroom_id: session.classroom_id,
                        student_id: session.student_id,
                        question_id: question.id(),
                        box_level: BoxLevel::One,
                        last_reviewed_at: None,
                    })
                    .await?;
            }
        }

        info!(
            session = %session_id,
            score,
            max_score = session.max_score,
            passed,
            "session finished"
        );

        Ok(SessionResult {
            session_id,
            score,
            max_score: session.max_score,
            passed,
            quiz_newly_completed,
            module_newly_completed,
        })
    }

    /// Full per-question verdicts with explanations, for completed sessions
    /// only.
    ///
    /// # Errors
    ///
    /// `NotCompleted` unless the session reached COMPLETED.
    pub async fn review(&self, session_id: SessionId) -> Result<SessionReview, SessionError> {
        let session = self.storage.sessions.get_session(session_id).await?;
        if session.status != SessionStatus::Completed {
            return Err(SessionError::NotCompleted);
        }

        let answers = self.storage.sessions.answers_for_session(session_id).await?;
        let mut entries = Vec::with_capacity(answers.len());
        for answer in answers {
            let question = self.storage.content.get_question(answer.question_id).await?;
            entries.push(ReviewEntry {
                question_id: answer.question_id,
                prompt: question.prompt().to_owned(),
                explanation: question.explanation().map(str::to_owned),
                verdict: answer.verdict,
            });
        }

        Ok(SessionReview {
            session_id,
            score: session.total_score,
            max_score: session.max_score,
            passed: session.passed,
            entries,
        })
    }

    /// Background sweep: abandon every in-progress session older than the
    /// session timeout in one atomic pass. Returns the number swept.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` when the store fails.
    pub async fn sweep_abandoned(&self) -> Result<u64, SessionError> {
        let cutoff = self.clock.now() - session_timeout();
        let swept = self.storage.sessions.abandon_stale(cutoff).await?;
        if swept > 0 {
            info!(swept, "abandoned stale sessions");
        }
        Ok(swept)
    }

    /// Fetch a session that is still open, lazily abandoning it when the
    /// timeout has elapsed since `started_at`.
    async fn open_session(&self, session_id: SessionId) -> Result<SessionRecord, SessionError> {
        let session = self.storage.sessions.get_session(session_id).await?;
        match session.status {
            SessionStatus::InProgress => {
                if self.clock.now() - session.started_at >= session_timeout() {
                    self.storage.sessions.abandon_session(session_id).await?;
                    warn!(session = %session_id, "session timed out");
                    return Err(SessionError::Closed {
                        status: SessionStatus::Abandoned,
                    });
                }
                Ok(session)
            }
            status => Err(SessionError::Closed { status }),
        }
    }
}
