//! Lock checks and write-time prerequisite edge validation.
//!
//! Lock resolution is a single hop against the completion cache: a node's
//! lock state already folds in its whole chain, because each prerequisite
//! only completes once its own prerequisite did. The bounded cycle walk runs
//! only when an edge is written.

use std::collections::HashMap;

use tracing::debug;

use course_core::model::{ModuleId, QuizId, StudentId};
use course_core::prerequisite::walk_chain;
use storage::repository::{CompletionRepository, ContentRepository, Storage, StorageError};

use crate::error::PrerequisiteError;
use crate::view::LockStatus;

/// Resolves quiz locks and guards prerequisite writes.
#[derive(Clone)]
pub struct PrerequisiteService {
    storage: Storage,
}

impl PrerequisiteService {
    #[must_use]
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Lock state of a quiz for one student: the quiz's own prerequisite is
    /// checked first, then the owning module's.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` when the quiz or its module is
    /// missing, or another `StorageError` when the store fails.
    pub async fn check_lock(
        &self,
        student_id: StudentId,
        quiz_id: QuizId,
    ) -> Result<LockStatus, StorageError> {
        let quiz = self.storage.content.get_quiz(quiz_id).await?;

        if let Some(prerequisite) = quiz.prerequisite_id() {
            let done = self
                .storage
                .completions
                .has_quiz_fact(student_id, prerequisite)
                .await?;
            if !done {
                return Ok(LockStatus::LockedByQuiz { prerequisite });
            }
        }

        self.check_module_lock(student_id, quiz.module_id()).await
    }

    /// Lock state of a module for one student: a single hop on the module's
    /// own prerequisite edge.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` when the module is missing, or
    /// another `StorageError` when the store fails.
    pub async fn check_module_lock(
        &self,
        student_id: StudentId,
        module_id: ModuleId,
    ) -> Result<LockStatus, StorageError> {
        let module = self.storage.content.get_module(module_id).await?;
        if let Some(prerequisite) = module.prerequisite_id() {
            let done = self
                .storage
                .completions
                .has_module_fact(student_id, prerequisite)
                .await?;
            if !done {
                return Ok(LockStatus::LockedByModule { prerequisite });
            }
        }

        Ok(LockStatus::Unlocked)
    }

    /// Attach (or detach, with `None`) a module's prerequisite edge.
    ///
    /// # Errors
    ///
    /// Returns `PrerequisiteError::CrossScope` when the prerequisite lives in
    /// another classroom and `PrerequisiteError::Circular` when the edge
    /// would close a cycle (or the chain walk exhausts its depth bound).
    pub async fn attach_module_prerequisite(
        &self,
        module_id: ModuleId,
        prerequisite_id: Option<ModuleId>,
    ) -> Result<(), PrerequisiteError> {
        let module = self.storage.content.get_module(module_id).await?;

        if let Some(candidate) = prerequisite_id {
            if candidate == module_id {
                return Err(PrerequisiteError::Circular);
            }
            let candidate_module = self.storage.content.get_module(candidate).await?;
            if candidate_module.classroom_id() != module.classroom_id() {
                return Err(PrerequisiteError::CrossScope);
            }

            let siblings = self
                .storage
                .content
                .modules_in_classroom(module.classroom_id())
                .await?;
            let edges: HashMap<ModuleId, ModuleId> = siblings
                .iter()
                .filter_map(|m| m.prerequisite_id().map(|p| (m.id(), p)))
                .collect();
            walk_chain(module_id, candidate, |id| edges.get(&id).copied())?;
        }

        self.storage
            .content
            .set_module_prerequisite(module_id, prerequisite_id)
            .await?;
        debug!(module = %module_id, prerequisite = ?prerequisite_id, "module prerequisite updated");
        Ok(())
    }

    /// Attach (or detach, with `None`) a quiz's prerequisite edge.
    ///
    /// # Errors
    ///
    /// Returns `PrerequisiteError::CrossScope` when the prerequisite lives in
    /// another module and `PrerequisiteError::Circular` when the edge would
    /// close a cycle (or the chain walk exhausts its depth bound).
    pub async fn attach_quiz_prerequisite(
        &self,
        quiz_id: QuizId,
        prerequisite_id: Option<QuizId>,
    ) -> Result<(), PrerequisiteError> {
        let quiz = self.storage.content.get_quiz(quiz_id).await?;

        if let Some(candidate) = prerequisite_id {
            if candidate == quiz_id {
                return Err(PrerequisiteError::Circular);
            }
            let candidate_quiz = self.storage.content.get_quiz(candidate).await?;
            if candidate_quiz.module_id() != quiz.module_id() {
                return Err(PrerequisiteError::CrossScope);
            }

            let siblings = self
                .storage
                .content
                .quizzes_in_module(quiz.module_id())
                .await?;
            let edges: HashMap<QuizId, QuizId> = siblings
                .iter()
                .filter_map(|q| q.prerequisite_id().map(|p| (q.id(), p)))
                .collect();
            walk_chain(quiz_id, candidate, |id| edges.get(&id).copied())?;
        }

        self.storage
            .content
            .set_quiz_prerequisite(quiz_id, prerequisite_id)
            .await?;
        debug!(quiz = %quiz_id, prerequisite = ?prerequisite_id, "quiz prerequisite updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use course_core::model::{ClassroomId, Module, Quiz};
    use course_core::time::fixed_now;

    async fn seed_quizzes(storage: &Storage, count: u64) {
        let module = Module::new(ModuleId::new(1), ClassroomId::new(1), "Anatomy", None).unwrap();
        storage.content.upsert_module(&module).await.unwrap();
        for id in 1..=count {
            let quiz = Quiz::new(
                QuizId::new(id),
                module.id(),
                format!("Quiz {id}"),
                None,
                1,
                true,
            )
            .unwrap();
            storage.content.upsert_quiz(&quiz).await.unwrap();
        }
    }

    #[tokio::test]
    async fn quiz_without_prerequisite_is_unlocked() {
        let storage = Storage::in_memory();
        seed_quizzes(&storage, 1).await;
        let service = PrerequisiteService::new(storage);

        let status = service
            .check_lock(StudentId::new(1), QuizId::new(1))
            .await
            .unwrap();
        assert_eq!(status, LockStatus::Unlocked);
    }

    #[tokio::test]
    async fn lock_clears_when_the_immediate_prerequisite_completes() {
        let storage = Storage::in_memory();
        seed_quizzes(&storage, 2).await;
        let service = PrerequisiteService::new(storage.clone());
        service
            .attach_quiz_prerequisite(QuizId::new(2), Some(QuizId::new(1)))
            .await
            .unwrap();

        let student = StudentId::new(1);
        let status = service.check_lock(student, QuizId::new(2)).await.unwrap();
        assert_eq!(
            status,
            LockStatus::LockedByQuiz {
                prerequisite: QuizId::new(1)
            }
        );

        storage
            .completions
            .insert_quiz_fact(student, QuizId::new(1), fixed_now())
            .await
            .unwrap();
        let status = service.check_lock(student, QuizId::new(2)).await.unwrap();
        assert_eq!(status, LockStatus::Unlocked);
    }

    #[tokio::test]
    async fn three_node_cycle_is_rejected_at_the_closing_edge() {
        let storage = Storage::in_memory();
        seed_quizzes(&storage, 3).await;
        let service = PrerequisiteService::new(storage);

        service
            .attach_quiz_prerequisite(QuizId::new(1), Some(QuizId::new(2)))
            .await
            .unwrap();
        service
            .attach_quiz_prerequisite(QuizId::new(2), Some(QuizId::new(3)))
            .await
            .unwrap();

        let err = service
            .attach_quiz_prerequisite(QuizId::new(3), Some(QuizId::new(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, PrerequisiteError::Circular));
        assert_eq!(err.code(), "CIRCULAR_PREREQUISITE");
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn self_prerequisite_is_circular() {
        let storage = Storage::in_memory();
        seed_quizzes(&storage, 1).await;
        let service = PrerequisiteService::new(storage);

        let err = service
            .attach_quiz_prerequisite(QuizId::new(1), Some(QuizId::new(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, PrerequisiteError::Circular));
    }

    #[tokio::test]
    async fn cross_module_prerequisite_is_rejected() {
        let storage = Storage::in_memory();
        seed_quizzes(&storage, 1).await;
        let other_module =
            Module::new(ModuleId::new(2), ClassroomId::new(1), "Physiology", None).unwrap();
        storage.content.upsert_module(&other_module).await.unwrap();
        let foreign = Quiz::new(QuizId::new(9), other_module.id(), "Foreign", None, 1, true).unwrap();
        storage.content.upsert_quiz(&foreign).await.unwrap();

        let service = PrerequisiteService::new(storage);
        let err = service
            .attach_quiz_prerequisite(QuizId::new(1), Some(QuizId::new(9)))
            .await
            .unwrap_err();
        assert!(matches!(err, PrerequisiteError::CrossScope));
    }

    #[tokio::test]
    async fn module_lock_gates_all_quizzes_inside() {
        let storage = Storage::in_memory();
        let first = Module::new(ModuleId::new(1), ClassroomId::new(1), "Bones", None).unwrap();
        let second =
            Module::new(ModuleId::new(2), ClassroomId::new(1), "Muscles", Some(first.id()))
                .unwrap();
        storage.content.upsert_module(&first).await.unwrap();
        storage.content.upsert_module(&second).await.unwrap();
        let quiz = Quiz::new(QuizId::new(1), second.id(), "Biceps", None, 1, true).unwrap();
        storage.content.upsert_quiz(&quiz).await.unwrap();

        let service = PrerequisiteService::new(storage.clone());
        let student = StudentId::new(1);
        let status = service.check_lock(student, quiz.id()).await.unwrap();
        assert_eq!(
            status,
            LockStatus::LockedByModule {
                prerequisite: first.id()
            }
        );

        storage
            .completions
            .insert_module_fact(student, first.id(), fixed_now())
            .await
            .unwrap();
        let status = service.check_lock(student, quiz.id()).await.unwrap();
        assert_eq!(status, LockStatus::Unlocked);
    }

    #[tokio::test]
    async fn module_lock_is_queryable_without_a_quiz() {
        let storage = Storage::in_memory();
        let first = Module::new(ModuleId::new(1), ClassroomId::new(1), "Bones", None).unwrap();
        let second =
            Module::new(ModuleId::new(2), ClassroomId::new(1), "Muscles", Some(first.id()))
                .unwrap();
        storage.content.upsert_module(&first).await.unwrap();
        storage.content.upsert_module(&second).await.unwrap();

        let service = PrerequisiteService::new(storage.clone());
        let student = StudentId::new(1);

        assert_eq!(
            service.check_module_lock(student, first.id()).await.unwrap(),
            LockStatus::Unlocked
        );
        assert_eq!(
            service.check_module_lock(student, second.id()).await.unwrap(),
            LockStatus::LockedByModule {
                prerequisite: first.id()
            }
        );

        storage
            .completions
            .insert_module_fact(student, first.id(), fixed_now())
            .await
            .unwrap();
        assert_eq!(
            service.check_module_lock(student, second.id()).await.unwrap(),
            LockStatus::Unlocked
        );
    }
}
