use thiserror::Error;

use crate::model::{ClassroomId, ModuleId, QuizId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NodeError {
    #[error("title must not be empty")]
    EmptyTitle,

    #[error("a node cannot be its own prerequisite")]
    SelfPrerequisite,
}

/// A module groups quizzes inside one classroom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    id: ModuleId,
    classroom_id: ClassroomId,
    title: String,
    prerequisite_id: Option<ModuleId>,
}

impl Module {
    /// Create a module.
    ///
    /// # Errors
    ///
    /// Returns `NodeError::EmptyTitle` for a blank title and
    /// `NodeError::SelfPrerequisite` if the module points at itself.
    pub fn new(
        id: ModuleId,
        classroom_id: ClassroomId,
        title: impl Into<String>,
        prerequisite_id: Option<ModuleId>,
    ) -> Result<Self, NodeError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(NodeError::EmptyTitle);
        }
        if prerequisite_id == Some(id) {
            return Err(NodeError::SelfPrerequisite);
        }
        Ok(Self {
            id,
            classroom_id,
            title,
            prerequisite_id,
        })
    }

    #[must_use]
    pub fn id(&self) -> ModuleId {
        self.id
    }

    #[must_use]
    pub fn classroom_id(&self) -> ClassroomId {
        self.classroom_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn prerequisite_id(&self) -> Option<ModuleId> {
        self.prerequisite_id
    }
}

/// A quiz inside a module, with the pass threshold that gates progression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quiz {
    id: QuizId,
    module_id: ModuleId,
    title: String,
    prerequisite_id: Option<QuizId>,
    min_score_to_unlock_next: u32,
    is_active: bool,
}

impl Quiz {
    /// Create a quiz.
    ///
    /// # Errors
    ///
    /// Returns `NodeError::EmptyTitle` for a blank title and
    /// `NodeError::SelfPrerequisite` if the quiz points at itself.
    pub fn new(
        id: QuizId,
        module_id: ModuleId,
        title: impl Into<String>,
        prerequisite_id: Option<QuizId>,
        min_score_to_unlock_next: u32,
        is_active: bool,
    ) -> Result<Self, NodeError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(NodeError::EmptyTitle);
        }
        if prerequisite_id == Some(id) {
            return Err(NodeError::SelfPrerequisite);
        }
        Ok(Self {
            id,
            module_id,
            title,
            prerequisite_id,
            min_score_to_unlock_next,
            is_active,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuizId {
        self.id
    }

    #[must_use]
    pub fn module_id(&self) -> ModuleId {
        self.module_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn prerequisite_id(&self) -> Option<QuizId> {
        self.prerequisite_id
    }

    /// Score required before this quiz counts as completed.
    #[must_use]
    pub fn min_score_to_unlock_next(&self) -> u32 {
        self.min_score_to_unlock_next
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }
}
