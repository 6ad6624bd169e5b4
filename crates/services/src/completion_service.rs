//! The completion cache: idempotent quiz and module completion facts.

use chrono::{DateTime, Utc};
use tracing::info;

use course_core::model::{Quiz, StudentId};
use storage::repository::{CompletionRepository, ContentRepository, Storage};

use crate::error::CompletionError;

/// What a completion attempt actually changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompletionOutcome {
    pub quiz_newly_completed: bool,
    pub module_newly_completed: bool,
}

/// Records completion facts and cascades quiz completion into module
/// completion.
#[derive(Clone)]
pub struct CompletionService {
    storage: Storage,
}

impl CompletionService {
    #[must_use]
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Record a quiz completion for one student.
    ///
    /// Below the quiz's pass threshold this is a no-op. Otherwise the quiz
    /// fact is inserted idempotently; on first insert, the module fact
    /// follows once every sibling quiz has a fact. The fact inserts rely on
    /// the store's unique keys, so concurrent duplicate finishes converge on
    /// one fact apiece.
    ///
    /// # Errors
    ///
    /// Returns `CompletionError::Storage` when the store fails.
    pub async fn record_quiz_completion(
        &self,
        student_id: StudentId,
        quiz: &Quiz,
        score: u32,
        completed_at: DateTime<Utc>,
    ) -> Result<CompletionOutcome, CompletionError> {
        if score < quiz.min_score_to_unlock_next() {
            return Ok(CompletionOutcome::default());
        }

        let quiz_newly_completed = self
            .storage
            .completions
            .insert_quiz_fact(student_id, quiz.id(), completed_at)
            .await?;

        let mut module_newly_completed = false;
        if quiz_newly_completed {
            info!(student = %student_id, quiz = %quiz.id(), "quiz completed");
            if self.all_sibling_quizzes_done(student_id, quiz).await? {
                module_newly_completed = self
                    .storage
                    .completions
                    .insert_module_fact(student_id, quiz.module_id(), completed_at)
                    .await?;
                if module_newly_completed {
                    info!(student = %student_id, module = %quiz.module_id(), "module completed");
                }
            }
        }

        Ok(CompletionOutcome {
            quiz_newly_completed,
            module_newly_completed,
        })
    }

    async fn all_sibling_quizzes_done(
        &self,
        student_id: StudentId,
        quiz: &Quiz,
    ) -> Result<bool, CompletionError> {
        let siblings = self
            .storage
            .content
            .quizzes_in_module(quiz.module_id())
            .await?;
        for sibling in &siblings {
            if !self
                .storage
                .completions
                .has_quiz_fact(student_id, sibling.id())
                .await?
            {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::{ClassroomId, Module, ModuleId, QuizId};
    use course_core::time::fixed_now;

    async fn seed_module_with_quizzes(storage: &Storage, quiz_count: u64) -> Vec<Quiz> {
        let module = Module::new(ModuleId::new(1), ClassroomId::new(1), "Anatomy", None).unwrap();
        storage.content.upsert_module(&module).await.unwrap();
        let mut quizzes = Vec::new();
        for id in 1..=quiz_count {
            let quiz = Quiz::new(
                QuizId::new(id),
                module.id(),
                format!("Quiz {id}"),
                None,
                2,
                true,
            )
            .unwrap();
            storage.content.upsert_quiz(&quiz).await.unwrap();
            quizzes.push(quiz);
        }
        quizzes
    }

    #[tokio::test]
    async fn below_threshold_records_nothing() {
        let storage = Storage::in_memory();
        let quizzes = seed_module_with_quizzes(&storage, 1).await;
        let service = CompletionService::new(storage.clone());
        let student = StudentId::new(1);

        let outcome = service
            .record_quiz_completion(student, &quizzes[0], 1, fixed_now())
            .await
            .unwrap();
        assert_eq!(outcome, CompletionOutcome::default());
        assert!(!storage
            .completions
            .has_quiz_fact(student, quizzes[0].id())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn module_fact_appears_when_the_last_sibling_completes() {
        let storage = Storage::in_memory();
        let quizzes = seed_module_with_quizzes(&storage, 2).await;
        let service = CompletionService::new(storage.clone());
        let student = StudentId::new(1);

        let first = service
            .record_quiz_completion(student, &quizzes[0], 2, fixed_now())
            .await
            .unwrap();
        assert!(first.quiz_newly_completed);
        assert!(!first.module_newly_completed);

        let second = service
            .record_quiz_completion(student, &quizzes[1], 3, fixed_now())
            .await
            .unwrap();
        assert!(second.quiz_newly_completed);
        assert!(second.module_newly_completed);
        assert!(storage
            .completions
            .has_module_fact(student, ModuleId::new(1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn duplicate_completion_is_a_silent_no_op() {
        let storage = Storage::in_memory();
        let quizzes = seed_module_with_quizzes(&storage, 1).await;
        let service = CompletionService::new(storage);
        let student = StudentId::new(1);

        let first = service
            .record_quiz_completion(student, &quizzes[0], 2, fixed_now())
            .await
            .unwrap();
        assert!(first.quiz_newly_completed);
        assert!(first.module_newly_completed);

        let second = service
            .record_quiz_completion(student, &quizzes[0], 2, fixed_now())
            .await
            .unwrap();
        assert_eq!(second, CompletionOutcome::default());
    }

    #[tokio::test]
    async fn concurrent_finishes_yield_exactly_one_fact() {
        let storage = Storage::in_memory();
        let quizzes = seed_module_with_quizzes(&storage, 1).await;
        let service = CompletionService::new(storage);
        let student = StudentId::new(1);
        let quiz = quizzes[0].clone();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = service.clone();
            let quiz = quiz.clone();
            handles.push(tokio::spawn(async move {
                service
                    .record_quiz_completion(student, &quiz, 2, fixed_now())
                    .await
                    .unwrap()
            }));
        }

        let mut new_quiz_facts = 0;
        let mut new_module_facts = 0;
        for handle in handles {
            let outcome = handle.await.unwrap();
            new_quiz_facts += u32::from(outcome.quiz_newly_completed);
            new_module_facts += u32::from(outcome.module_newly_completed);
        }
        assert_eq!(new_quiz_facts, 1);
        assert_eq!(new_module_facts, 1);
    }
}
