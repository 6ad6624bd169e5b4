//! The Leitner scheduler: weighted review sampling and box transitions.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::rng;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use course_core::grader::grade;
use course_core::leitner::{
    BoxDistribution, BoxLevel, VALID_QUESTION_COUNTS, next_level, sample_plan,
};
use course_core::model::{
    ClassroomId, QuestionId, Response, ReviewSessionId, SessionStatus, StudentId, session_timeout,
};
use course_core::time::Clock;
use storage::repository::{
    ContentRepository, LeitnerRepository, NewReviewSession, ReviewAnswerRecord,
    ReviewSessionRecord, Storage, StorageError,
};

use crate::error::LeitnerError;
use crate::view::{
    AnswerOutcome, LeitnerReview, LeitnerReviewEntry, LeitnerStatus, QuestionView, ReviewFinish,
    StartedReview,
};

/// Drives Leitner review sessions over the per-question box states.
#[derive(Clone)]
pub struct LeitnerService {
    storage: Storage,
    clock: Clock,
}

impl LeitnerService {
    #[must_use]
    pub fn new(storage: Storage) -> Self {
        Self {
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

    /// Per-box counts and percentage distribution for one student.
    ///
    /// # Errors
    ///
    /// Returns `LeitnerError::Storage` when the store fails.
    pub async fn status(
        &self,
        classroom_id: ClassroomId,
        student_id: StudentId,
    ) -> Result<LeitnerStatus, LeitnerError> {
        let counts = self.storage.leitner.box_counts(classroom_id, student_id).await?;
        Ok(LeitnerStatus::from_distribution(&BoxDistribution { counts }))
    }

    /// Open a review session of `requested` questions, drawn without
    /// replacement across the boxes per the weighted sampling plan. The
    /// selection is snapshotted with each question's pre-session box level.
    ///
    /// # Errors
    ///
    /// `InvalidQuestionCount` unless `requested` is an allowed size and
    /// `NoQuestions` when the student has no box states at all.
    pub async fn start(
        &self,
        classroom_id: ClassroomId,
        student_id: StudentId,
        requested: u32,
    ) -> Result<StartedReview, LeitnerError> {
        if !VALID_QUESTION_COUNTS.contains(&requested) {
            return Err(LeitnerError::InvalidQuestionCount { got: requested });
        }

        let boxes = self
            .storage
            .leitner
            .boxes_for_student(classroom_id, student_id)
            .await?;
        if boxes.is_empty() {
            return Err(LeitnerError::NoQuestions);
        }

        let mut by_level: [Vec<QuestionId>; 5] = Default::default();
        for record in &boxes {
            by_level[record.box_level.index()].push(record.question_id);
        }

        let available = [
            by_level[0].len(),
            by_level[1].len(),
            by_level[2].len(),
            by_level[3].len(),
            by_level[4].len(),
        ];
        let plan = sample_plan(available, requested as usize);

        let mut picks: Vec<(QuestionId, BoxLevel)> = Vec::new();
        {
            let mut rng = rng();
            for (index, pool) in by_level.iter_mut().enumerate() {
                pool.as_mut_slice().shuffle(&mut rng);
                let level = BoxLevel::ALL[index];
                for question_id in pool.iter().take(plan[index]) {
                    picks.push((*question_id, level));
                }
            }
            picks.as_mut_slice().shuffle(&mut rng);
        }

        let question_count = u32::try_from(picks.len()).unwrap_or(u32::MAX);
        let session_id = self
            .storage
            .leitner
            .insert_review_session(
                NewReviewSession {
                    classroom_id,
                    student_id,
                    question_count,
                    started_at: self.clock.now(),
                },
                &picks,
            )
            .await?;

        let mut questions = Vec::with_capacity(picks.len());
        for (question_id, _) in &picks {
            let question = self.storage.content.get_question(*question_id).await?;
            questions.push(QuestionView::from_question(&question));
        }

        info!(
            session = %session_id,
            student = %student_id,
            question_count,
            "review session started"
        );

        Ok(StartedReview {
            session_id,
            questions,
        })
    }

    /// Grade one answer inside an open review session. Box levels do not
    /// move until [`LeitnerService::finish`].
    ///
    /// # Errors
    ///
    /// `Closed` once the session is no longer in progress, `NotInSession`
    /// for a question outside the snapshot, and `AlreadyAnswered` on a
    /// double submit.
    pub async fn submit_answer(
        &self,
        session_id: ReviewSessionId,
        question_id: QuestionId,
        response: &Response,
    ) -> Result<AnswerOutcome, LeitnerError> {
        let _session = self.open_session(session_id).await?;

        let picks = self.storage.leitner.picks_for_session(session_id).await?;
        let Some(pick) = picks.iter().find(|p| p.question_id == question_id) else {
            return Err(LeitnerError::NotInSession);
        };

        let question = self.storage.content.get_question(question_id).await?;
        let verdict = grade(question.shape(), response)?;
        let correct = verdict.correct;

        let record = ReviewAnswerRecord {
            session_id,
            question_id,
            is_correct: correct,
            box_before: pick.box_before,
            box_after: next_level(pick.box_before, correct),
            verdict,
            answered_at: self.clock.now(),
        };
        self.storage
            .leitner
            .append_review_answer(&record)
            .await
            .map_err(|e| match e {
                StorageError::Conflict => LeitnerError::AlreadyAnswered,
                other => LeitnerError::Storage(other),
            })?;

        debug!(session = %session_id, question = %question_id, correct, "review answer recorded");

        Ok(AnswerOutcome {
            question_id,
            correct,
        })
    }

    /// Close a review session and apply box transitions for every snapshot
    /// question: a correct answer promotes one box (capped at five), an
    /// incorrect or missing answer drops the question to box one.
    ///
    /// # Errors
    ///
    /// `Closed` when the session already reached a terminal state, including
    /// losing the race against a concurrent finish or the timeout sweep.
    pub async fn finish(&self, session_id: ReviewSessionId) -> Result<ReviewFinish, LeitnerError> {
        let session = self.open_session(session_id).await?;
        let now = self.clock.now();

        let won = self
            .storage
            .leitner
            .complete_review_session(session_id, now)
            .await?;
        if !won {
            let current = self.storage.leitner.get_review_session(session_id).await?;
            return Err(LeitnerError::Closed {
                status: current.status,
            });
        }

        let picks = self.storage.leitner.picks_for_session(session_id).await?;
        let answers = self
            .storage
            .leitner
            .answers_for_review_session(session_id)
            .await?;
        let answered: HashMap<QuestionId, bool> = answers
            .iter()
            .map(|a| (a.question_id, a.is_correct))
            .collect();

        let mut summary = ReviewFinish {
            session_id,
            correct: 0,
            wrong: 0,
            promoted: 0,
            demoted: 0,
            unchanged: 0,
        };

        for pick in &picks {
            // An unanswered question counts as incorrect.
            let correct = answered.get(&pick.question_id).copied().unwrap_or(false);
            let after = next_level(pick.box_before, correct);

            self.storage
                .leitner
                .update_box(
                    session.classroom_id,
                    session.student_id,
                    pick.question_id,
                    after,
                    now,
                )
                .await?;

            if correct {
                summary.correct += 1;
            } else {
                summary.wrong += 1;
            }
            match after.value().cmp(&pick.box_before.value()) {
                std::cmp::Ordering::Greater => summary.promoted += 1,
                std::cmp::Ordering::Less => summary.demoted += 1,
                std::cmp::Ordering::Equal => summary.unchanged += 1,
            }
        }

        info!(
            session = %session_id,
            correct = summary.correct,
            wrong = summary.wrong,
            "review session finished"
        );

        Ok(summary)
    }

    /// Per-question box transitions and verdicts, for completed review
    /// sessions only.
    ///
    /// # Errors
    ///
    /// `NotCompleted` unless the session reached COMPLETED.
    pub async fn review(&self, session_id: ReviewSessionId) -> Result<LeitnerReview, LeitnerError> {
        let session = self.storage.leitner.get_review_session(session_id).await?;
        if session.status != SessionStatus::Completed {
            return Err(LeitnerError::NotCompleted);
        }

        let picks = self.storage.leitner.picks_for_session(session_id).await?;
        let answers = self
            .storage
            .leitner
            .answers_for_review_session(session_id)
            .await?;
        let by_question: HashMap<QuestionId, &ReviewAnswerRecord> =
            answers.iter().map(|a| (a.question_id, a)).collect();

        let mut entries = Vec::with_capacity(picks.len());
        for pick in &picks {
            let question = self.storage.content.get_question(pick.question_id).await?;
            let answer = by_question.get(&pick.question_id);
            let correct = answer.is_some_and(|a| a.is_correct);
            entries.push(LeitnerReviewEntry {
                question_id: pick.question_id,
                prompt: question.prompt().to_owned(),
                explanation: question.explanation().map(str::to_owned),
                box_before: pick.box_before,
                box_after: next_level(pick.box_before, correct),
                verdict: answer.map(|a| a.verdict.clone()),
            });
        }

        Ok(LeitnerReview {
            session_id,
            entries,
        })
    }

    /// Background sweep: abandon every in-progress review session older than
    /// the session timeout. Returns the number swept.
    ///
    /// # Errors
    ///
    /// Returns `LeitnerError::Storage` when the store fails.
    pub async fn sweep_abandoned(&self) -> Result<u64, LeitnerError> {
        let cutoff = self.clock.now() - session_timeout();
        let swept = self.storage.leitner.abandon_stale_reviews(cutoff).await?;
        if swept > 0 {
            info!(swept, "abandoned stale review sessions");
        }
        Ok(swept)
    }

    /// Current time according to the service's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Fetch a review session that is still open, lazily abandoning it when
    /// the timeout has elapsed since `started_at`.
    async fn open_session(
        &self,
        session_id: ReviewSessionId,
    ) -> Result<ReviewSessionRecord, LeitnerError> {
        let session = self.storage.leitner.get_review_session(session_id).await?;
        match session.status {
            SessionStatus::InProgress => {
                if self.clock.now() - session.started_at >= session_timeout() {
                    self.storage
                        .leitner
                        .abandon_stale_reviews(self.clock.now() - session_timeout())
                        .await?;
                    warn!(session = %session_id, "review session timed out");
                    return Err(LeitnerError::Closed {
                        status: SessionStatus::Abandoned,
                    });
                }
                Ok(session)
            }
            status => Err(LeitnerError::Closed { status }),
        }
    }
}
