use thiserror::Error;

use crate::model::{NodeError, QuestionError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error(transparent)]
    Question(#[from] QuestionError),
}
