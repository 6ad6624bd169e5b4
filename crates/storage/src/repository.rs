use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use course_core::grader::Verdict;
use course_core::leitner::BoxLevel;
use course_core::model::{
    ClassroomId, Module, ModuleId, Question, QuestionId, Quiz, QuizId, ReviewSessionId, SessionId,
    SessionStatus, StudentId,
};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// Persisted shape of one quiz session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: SessionId,
    pub quiz_id: QuizId,
    pub student_id: StudentId,
    pub classroom_id: ClassroomId,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_score: u32,
    pub max_score: u32,
    pub passed: bool,
}

/// Fields needed to open a quiz session; the store mints the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub quiz_id: QuizId,
    pub student_id: StudentId,
    pub classroom_id: ClassroomId,
    pub started_at: DateTime<Utc>,
    pub max_score: u32,
}

/// One graded answer inside a quiz session. Insertion order is attempt
/// order.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionAnswerRecord {
    pub session_id: SessionId,
    pub question_id: QuestionId,
    pub is_correct: bool,
    pub verdict: Verdict,
    pub answered_at: DateTime<Utc>,
}

/// Spaced-repetition state of one question for one student in one
/// classroom.
#[derive(Debug, Clone, PartialEq)]
pub struct LeitnerBoxRecord {
    pub classroom_id: ClassroomId,
    pub student_id: StudentId,
    pub question_id: QuestionId,
    pub box_level: BoxLevel,
    pub last_reviewed_at: Option<DateTime<Utc>>,
}

/// Persisted shape of one Leitner review session.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewSessionRecord {
    pub id: ReviewSessionId,
    pub classroom_id: ClassroomId,
    pub student_id: StudentId,
    pub question_count: u32,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Fields needed to open a review session; the store mints the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReviewSession {
    pub classroom_id: ClassroomId,
    pub student_id: StudentId,
    pub question_count: u32,
    pub started_at: DateTime<Utc>,
}

/// Snapshot of one selected question at review-session start, carrying its
/// pre-session box level so finish can compute transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewPickRecord {
    pub session_id: ReviewSessionId,
    pub question_id: QuestionId,
    pub box_before: BoxLevel,
}

/// One graded answer inside a review session.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewAnswerRecord {
    pub session_id: ReviewSessionId,
    pub question_id: QuestionId,
    pub is_correct: bool,
    pub box_before: BoxLevel,
    pub box_after: BoxLevel,
    pub verdict: Verdict,
    pub answered_at: DateTime<Utc>,
}

//
// ─── TRAITS ────────────────────────────────────────────────────────────────────
//

/// Repository contract for the classroom content tree.
#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Persist or update a module.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the module cannot be stored.
    async fn upsert_module(&self, module: &Module) -> Result<(), StorageError>;

    /// Fetch a module by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing.
    async fn get_module(&self, id: ModuleId) -> Result<Module, StorageError>;

    /// All modules of a classroom.
    async fn modules_in_classroom(
        &self,
        classroom_id: ClassroomId,
    ) -> Result<Vec<Module>, StorageError>;

    /// Rewrite a module's prerequisite edge.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the module does not exist.
    async fn set_module_prerequisite(
        &self,
        id: ModuleId,
        prerequisite_id: Option<ModuleId>,
    ) -> Result<(), StorageError>;

    /// Persist or update a quiz.
    async fn upsert_quiz(&self, quiz: &Quiz) -> Result<(), StorageError>;

    /// Fetch a quiz by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing.
    async fn get_quiz(&self, id: QuizId) -> Result<Quiz, StorageError>;

    /// All quizzes of a module.
    async fn quizzes_in_module(&self, module_id: ModuleId) -> Result<Vec<Quiz>, StorageError>;

    /// Rewrite a quiz's prerequisite edge.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the quiz does not exist.
    async fn set_quiz_prerequisite(
        &self,
        id: QuizId,
        prerequisite_id: Option<QuizId>,
    ) -> Result<(), StorageError>;

    /// Persist or update a question.
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError>;

    /// Fetch a question by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing.
    async fn get_question(&self, id: QuestionId) -> Result<Question, StorageError>;

    /// All questions of a quiz, in stable order.
    async fn questions_for_quiz(&self, quiz_id: QuizId) -> Result<Vec<Question>, StorageError>;
}

/// Repository contract for the completion cache.
///
/// Both inserts are idempotent upserts keyed on the natural composite key;
/// the unique constraint on that key is the enforcement point under
/// concurrent duplicate triggers, not an in-process lock.
#[async_trait]
pub trait CompletionRepository: Send + Sync {
    /// Insert the (student, quiz) fact. Returns `true` only for the first
    /// insert; duplicates are silent no-ops.
    async fn insert_quiz_fact(
        &self,
        student_id: StudentId,
        quiz_id: QuizId,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    async fn has_quiz_fact(
        &self,
        student_id: StudentId,
        quiz_id: QuizId,
    ) -> Result<bool, StorageError>;

    /// Insert the (student, module) fact. Returns `true` only for the first
    /// insert.
    async fn insert_module_fact(
        &self,
        student_id: StudentId,
        module_id: ModuleId,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    async fn has_module_fact(
        &self,
        student_id: StudentId,
        module_id: ModuleId,
    ) -> Result<bool, StorageError>;
}

/// Repository contract for quiz sessions.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Open a session and return its minted id.
    async fn insert_session(&self, new: NewSession) -> Result<SessionId, StorageError>;

    /// Fetch a session by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing.
    async fn get_session(&self, id: SessionId) -> Result<SessionRecord, StorageError>;

    /// Append one answer.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the question was already answered
    /// in this session.
    async fn append_answer(&self, answer: &SessionAnswerRecord) -> Result<(), StorageError>;

    /// All answers of a session in attempt order.
    async fn answers_for_session(
        &self,
        id: SessionId,
    ) -> Result<Vec<SessionAnswerRecord>, StorageError>;

    /// Atomically move an IN_PROGRESS session to COMPLETED, recording score
    /// and outcome. Returns `false` when the session was not IN_PROGRESS
    /// (the caller lost a race or the sweep got there first).
    async fn complete_session(
        &self,
        id: SessionId,
        completed_at: DateTime<Utc>,
        total_score: u32,
        passed: bool,
    ) -> Result<bool, StorageError>;

    /// Atomically move an IN_PROGRESS session to ABANDONED. Returns `false`
    /// when the session was not IN_PROGRESS.
    async fn abandon_session(&self, id: SessionId) -> Result<bool, StorageError>;

    /// Sweep: abandon every IN_PROGRESS session started at or before
    /// `cutoff`. Returns the number of sessions transitioned.
    async fn abandon_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError>;
}

/// Repository contract for Leitner box states and review sessions.
#[async_trait]
pub trait LeitnerRepository: Send + Sync {
    /// Insert a box state unless one already exists for the key. Returns
    /// `true` only when a row was created; an existing level is never
    /// touched.
    async fn seed_box(&self, record: &LeitnerBoxRecord) -> Result<bool, StorageError>;

    async fn get_box(
        &self,
        classroom_id: ClassroomId,
        student_id: StudentId,
        question_id: QuestionId,
    ) -> Result<Option<LeitnerBoxRecord>, StorageError>;

    /// All box states for one (classroom, student) pair.
    async fn boxes_for_student(
        &self,
        classroom_id: ClassroomId,
        student_id: StudentId,
    ) -> Result<Vec<LeitnerBoxRecord>, StorageError>;

    /// Per-level counts for one (classroom, student) pair.
    async fn box_counts(
        &self,
        classroom_id: ClassroomId,
        student_id: StudentId,
    ) -> Result<[u64; 5], StorageError>;

    /// Rewrite one box state's level and review timestamp.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no box state exists for the key.
    async fn update_box(
        &self,
        classroom_id: ClassroomId,
        student_id: StudentId,
        question_id: QuestionId,
        level: BoxLevel,
        reviewed_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Open a review session with its question snapshot in one write.
    async fn insert_review_session(
        &self,
        new: NewReviewSession,
        picks: &[(QuestionId, BoxLevel)],
    ) -> Result<ReviewSessionId, StorageError>;

    /// Fetch a review session by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing.
    async fn get_review_session(
        &self,
        id: ReviewSessionId,
    ) -> Result<ReviewSessionRecord, StorageError>;

    /// The snapshot taken at session start, in selection order.
    async fn picks_for_session(
        &self,
        id: ReviewSessionId,
    ) -> Result<Vec<ReviewPickRecord>, StorageError>;

    /// Append one review answer.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` on a double answer.
    async fn append_review_answer(&self, answer: &ReviewAnswerRecord) -> Result<(), StorageError>;

    /// All review answers of a session in attempt order.
    async fn answers_for_review_session(
        &self,
        id: ReviewSessionId,
    ) -> Result<Vec<ReviewAnswerRecord>, StorageError>;

    /// Atomic IN_PROGRESS -> COMPLETED transition; `false` when lost.
    async fn complete_review_session(
        &self,
        id: ReviewSessionId,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    /// Sweep: abandon every IN_PROGRESS review session started at or before
    /// `cutoff`.
    async fn abandon_stale_reviews(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError>;
}

//
// ─── IN-MEMORY IMPLEMENTATION ──────────────────────────────────────────────────
//

#[derive(Default)]
struct InMemoryState {
    modules: HashMap<ModuleId, Module>,
    quizzes: HashMap<QuizId, Quiz>,
    questions: HashMap<QuestionId, Question>,
    quiz_facts: HashMap<(StudentId, QuizId), DateTime<Utc>>,
    module_facts: HashMap<(StudentId, ModuleId), DateTime<Utc>>,
    sessions: HashMap<SessionId, SessionRecord>,
    session_answers: Vec<SessionAnswerRecord>,
    boxes: HashMap<(ClassroomId, StudentId, QuestionId), LeitnerBoxRecord>,
    review_sessions: HashMap<ReviewSessionId, ReviewSessionRecord>,
    review_picks: Vec<ReviewPickRecord>,
    review_answers: Vec<ReviewAnswerRecord>,
    next_session_id: u64,
    next_review_session_id: u64,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, InMemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl ContentRepository for InMemoryRepository {
    async fn upsert_module(&self, module: &Module) -> Result<(), StorageError> {
        self.lock()?.modules.insert(module.id(), module.clone());
        Ok(())
    }

    async fn get_module(&self, id: ModuleId) -> Result<Module, StorageError> {
        self.lock()?
            .modules
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn modules_in_classroom(
        &self,
        classroom_id: ClassroomId,
    ) -> Result<Vec<Module>, StorageError> {
        let guard = self.lock()?;
        let mut modules: Vec<Module> = guard
            .modules
            .values()
            .filter(|m| m.classroom_id() == classroom_id)
            .cloned()
            .collect();
        modules.sort_by_key(Module::id);
        Ok(modules)
    }

    async fn set_module_prerequisite(
        &self,
        id: ModuleId,
        prerequisite_id: Option<ModuleId>,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let module = guard.modules.get(&id).ok_or(StorageError::NotFound)?;
        let updated = Module::new(module.id(), module.classroom_id(), module.title(), prerequisite_id)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        guard.modules.insert(id, updated);
        Ok(())
    }

    async fn upsert_quiz(&self, quiz: &Quiz) -> Result<(), StorageError> {
        self.lock()?.quizzes.insert(quiz.id(), quiz.clone());
        Ok(())
    }

    async fn get_quiz(&self, id: QuizId) -> Result<Quiz, StorageError> {
        self.lock()?
            .quizzes
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn quizzes_in_module(&self, module_id: ModuleId) -> Result<Vec<Quiz>, StorageError> {
        let guard = self.lock()?;
        let mut quizzes: Vec<Quiz> = guard
            .quizzes
            .values()
            .filter(|q| q.module_id() == module_id)
            .cloned()
            .collect();
        quizzes.sort_by_key(Quiz::id);
        Ok(quizzes)
    }

    async fn set_quiz_prerequisite(
        &self,
        id: QuizId,
        prerequisite_id: Option<QuizId>,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let quiz = guard.quizzes.get(&id).ok_or(StorageError::NotFound)?;
        let updated = Quiz::new(
            quiz.id(),
            quiz.module_id(),
            quiz.title(),
            prerequisite_id,
            quiz.min_score_to_unlock_next(),
            quiz.is_active(),
        )
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
        guard.quizzes.insert(id, updated);
        Ok(())
    }

    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        self.lock()?
            .questions
            .insert(question.id(), question.clone());
        Ok(())
    }

    async fn get_question(&self, id: QuestionId) -> Result<Question, StorageError> {
        self.lock()?
            .questions
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn questions_for_quiz(&self, quiz_id: QuizId) -> Result<Vec<Question>, StorageError> {
        let guard = self.lock()?;
        let mut questions: Vec<Question> = guard
            .questions
            .values()
            .filter(|q| q.quiz_id() == quiz_id)
            .cloned()
            .collect();
        questions.sort_by_key(Question::id);
        Ok(questions)
    }
}

#[async_trait]
impl CompletionRepository for InMemoryRepository {
    async fn insert_quiz_fact(
        &self,
        student_id: StudentId,
        quiz_id: QuizId,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let mut guard = self.lock()?;
        match guard.quiz_facts.entry((student_id, quiz_id)) {
            std::collections::hash_map::Entry::Occupied(_) => Ok(false),
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(completed_at);
                Ok(true)
            }
        }
    }

    async fn has_quiz_fact(
        &self,
        student_id: StudentId,
        quiz_id: QuizId,
    ) -> Result<bool, StorageError> {
        Ok(self.lock()?.quiz_facts.contains_key(&(student_id, quiz_id)))
    }

    async fn insert_module_fact(
        &self,
        student_id: StudentId,
        module_id: ModuleId,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let mut guard = self.lock()?;
        match guard.module_facts.entry((student_id, module_id)) {
            std::collections::hash_map::Entry::Occupied(_) => Ok(false),
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(completed_at);
                Ok(true)
            }
        }
    }

    async fn has_module_fact(
        &self,
        student_id: StudentId,
        module_id: ModuleId,
    ) -> Result<bool, StorageError> {
        Ok(self
            .lock()?
            .module_facts
            .contains_key(&(student_id, module_id)))
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn insert_session(&self, new: NewSession) -> Result<SessionId, StorageError> {
        let mut guard = self.lock()?;
        guard.next_session_id += 1;
        let id = SessionId::new(guard.next_session_id);
        guard.sessions.insert(
            id,
            SessionRecord {
                id,
                quiz_id: new.quiz_id,
                student_id: new.student_id,
                classroom_id: new.classroom_id,
                status: SessionStatus::InProgress,
                started_at: new.started_at,
                completed_at: None,
                total_score: 0,
                max_score: new.max_score,
                passed: false,
            },
        );
        Ok(id)
    }

    async fn get_session(&self, id: SessionId) -> Result<SessionRecord, StorageError> {
        self.lock()?
            .sessions
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn append_answer(&self, answer: &SessionAnswerRecord) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let duplicate = guard.session_answers.iter().any(|a| {
            a.session_id == answer.session_id && a.question_id == answer.question_id
        });
        if duplicate {
            return Err(StorageError::Conflict);
        }
        guard.session_answers.push(answer.clone());
        Ok(())
    }

    async fn answers_for_session(
        &self,
        id: SessionId,
    ) -> Result<Vec<SessionAnswerRecord>, StorageError> {
        Ok(self
            .lock()?
            .session_answers
            .iter()
            .filter(|a| a.session_id == id)
            .cloned()
            .collect())
    }

    async fn complete_session(
        &self,
        id: SessionId,
        completed_at: DateTime<Utc>,
        total_score: u32,
        passed: bool,
    ) -> Result<bool, StorageError> {
        let mut guard = self.lock()?;
        let Some(session) = guard.sessions.get_mut(&id) else {
            return Err(StorageError::NotFound);
        };
        if session.status != SessionStatus::InProgress {
            return Ok(false);
        }
        session.status = SessionStatus::Completed;
        session.completed_at = Some(completed_at);
        session.total_score = total_score;
        session.passed = passed;
        Ok(true)
    }

    async fn abandon_session(&self, id: SessionId) -> Result<bool, StorageError> {
        let mut guard = self.lock()?;
        let Some(session) = guard.sessions.get_mut(&id) else {
            return Err(StorageError::NotFound);
        };
        if session.status != SessionStatus::InProgress {
            return Ok(false);
        }
        session.status = SessionStatus::Abandoned;
        Ok(true)
    }

    async fn abandon_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let mut guard = self.lock()?;
        let mut swept = 0;
        for session in guard.sessions.values_mut() {
            if session.status == SessionStatus::InProgress && session.started_at <= cutoff {
                session.status = SessionStatus::Abandoned;
                swept += 1;
            }
        }
        Ok(swept)
    }
}

#[async_trait]
impl LeitnerRepository for InMemoryRepository {
    async fn seed_box(&self, record: &LeitnerBoxRecord) -> Result<bool, StorageError> {
        let mut guard = self.lock()?;
        let key = (record.classroom_id, record.student_id, record.question_id);
        match guard.boxes.entry(key) {
            std::collections::hash_map::Entry::Occupied(_) => Ok(false),
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(record.clone());
                Ok(true)
            }
        }
    }

    async fn get_box(
        &self,
        classroom_id: ClassroomId,
        student_id: StudentId,
        question_id: QuestionId,
    ) -> Result<Option<LeitnerBoxRecord>, StorageError> {
        Ok(self
            .lock()?
            .boxes
            .get(&(classroom_id, student_id, question_id))
            .cloned())
    }

    async fn boxes_for_student(
        &self,
        classroom_id: ClassroomId,
        student_id: StudentId,
    ) -> Result<Vec<LeitnerBoxRecord>, StorageError> {
        let guard = self.lock()?;
        let mut boxes: Vec<LeitnerBoxRecord> = guard
            .boxes
            .values()
            .filter(|b| b.classroom_id == classroom_id && b.student_id == student_id)
            .cloned()
            .collect();
        boxes.sort_by_key(|b| b.question_id);
        Ok(boxes)
    }

    async fn box_counts(
        &self,
        classroom_id: ClassroomId,
        student_id: StudentId,
    ) -> Result<[u64; 5], StorageError> {
        let guard = self.lock()?;
        let mut counts = [0u64; 5];
        for b in guard.boxes.values() {
            if b.classroom_id == classroom_id && b.student_id == student_id {
                counts[b.box_level.index()] += 1;
            }
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
        let mut guard = self.lock()?;
        let record = guard
            .boxes
            .get_mut(&(classroom_id, student_id, question_id))
            .ok_or(StorageError::NotFound)?;
        record.box_level = level;
        record.last_reviewed_at = Some(reviewed_at);
        Ok(())
    }

    async fn insert_review_session(
        &self,
        new: NewReviewSession,
        picks: &[(QuestionId, BoxLevel)],
    ) -> Result<ReviewSessionId, StorageError> {
        let mut guard = self.lock()?;
        guard.next_review_session_id += 1;
        let id = ReviewSessionId::new(guard.next_review_session_id);
        guard.review_sessions.insert(
            id,
            ReviewSessionRecord {
                id,
                classroom_id: new.classroom_id,
                student_id: new.student_id,
                question_count: new.question_count,
                status: SessionStatus::InProgress,
                started_at: new.started_at,
                completed_at: None,
            },
        );
        for &(question_id, box_before) in picks {
            guard.review_picks.push(ReviewPickRecord {
                session_id: id,
                question_id,
                box_before,
            });
        }
        Ok(id)
    }

    async fn get_review_session(
        &self,
        id: ReviewSessionId,
    ) -> Result<ReviewSessionRecord, StorageError> {
        self.lock()?
            .review_sessions
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn picks_for_session(
        &self,
        id: ReviewSessionId,
    ) -> Result<Vec<ReviewPickRecord>, StorageError> {
        Ok(self
            .lock()?
            .review_picks
            .iter()
            .filter(|p| p.session_id == id)
            .copied()
            .collect())
    }

    async fn append_review_answer(&self, answer: &ReviewAnswerRecord) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let duplicate = guard.review_answers.iter().any(|a| {
            a.session_id == answer.session_id && a.question_id == answer.question_id
        });
        if duplicate {
            return Err(StorageError::Conflict);
        }
        guard.review_answers.push(answer.clone());
        Ok(())
    }

    async fn answers_for_review_session(
        &self,
        id: ReviewSessionId,
    ) -> Result<Vec<ReviewAnswerRecord>, StorageError> {
        Ok(self
            .lock()?
            .review_answers
            .iter()
            .filter(|a| a.session_id == id)
            .cloned()
            .collect())
    }

    async fn complete_review_session(
        &self,
        id: ReviewSessionId,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let mut guard = self.lock()?;
        let Some(session) = guard.review_sessions.get_mut(&id) else {
            return Err(StorageError::NotFound);
        };
        if session.status != SessionStatus::InProgress {
            return Ok(false);
        }
        session.status = SessionStatus::Completed;
        session.completed_at = Some(completed_at);
        Ok(true)
    }

    async fn abandon_stale_reviews(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let mut guard = self.lock()?;
        let mut swept = 0;
        for session in guard.review_sessions.values_mut() {
            if session.status == SessionStatus::InProgress && session.started_at <= cutoff {
                session.status = SessionStatus::Abandoned;
                swept += 1;
            }
        }
        Ok(swept)
    }
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Aggregates the engine's repositories behind trait objects for easy
/// backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub content: Arc<dyn ContentRepository>,
    pub completions: Arc<dyn CompletionRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub leitner: Arc<dyn LeitnerRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            content: Arc::new(repo.clone()),
            completions: Arc::new(repo.clone()),
            sessions: Arc::new(repo.clone()),
            leitner: Arc::new(repo),
        }
    }
}
