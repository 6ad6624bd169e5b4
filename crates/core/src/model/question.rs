use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::{OptionId, QuestionId, QuizId, ZoneId};

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("choice question needs at least two options, got {got}")]
    TooFewOptions { got: usize },

    #[error("choice question needs at least one correct option")]
    NoCorrectOption,

    #[error("boolean question needs exactly two options with exactly one correct")]
    InvalidBooleanDomain,

    #[error("match question needs at least one pair")]
    NoPairs,

    #[error("zone question needs at least one zone")]
    NoZones,

    #[error("zone radius must be positive, got {got}")]
    InvalidRadius { got: f64 },

    #[error("accepted answer must not be empty")]
    EmptyAcceptedAnswer,
}

/// One selectable option on a choice or boolean question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub id: OptionId,
    pub text: String,
    pub is_correct: bool,
}

/// One canonical (left, right) association on a match question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPair {
    pub left: String,
    pub right: String,
}

/// A labeled circular click target on a zone question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickZone {
    pub id: ZoneId,
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
}

/// Structural kind of a question; determines canonical-answer format and
/// grading rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeKind {
    Choice,
    Boolean,
    Match,
    Zone,
    Text,
}

impl ShapeKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ShapeKind::Choice => "choice",
            ShapeKind::Boolean => "boolean",
            ShapeKind::Match => "match",
            ShapeKind::Zone => "zone",
            ShapeKind::Text => "text",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "choice" => Some(ShapeKind::Choice),
            "boolean" => Some(ShapeKind::Boolean),
            "match" => Some(ShapeKind::Match),
            "zone" => Some(ShapeKind::Zone),
            "text" => Some(ShapeKind::Text),
            _ => None,
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape-exclusive canonical-answer payload.
///
/// Modeled as a tagged variant rather than one struct with optional fields,
/// so invalid field combinations are unrepresentable and each grader stays
/// total and independently testable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionShape {
    Choice {
        options: Vec<ChoiceOption>,
    },
    Boolean {
        options: Vec<ChoiceOption>,
    },
    Match {
        pairs: Vec<MatchPair>,
    },
    Zone {
        zones: Vec<ClickZone>,
    },
    Text {
        accepted_answer: String,
        case_sensitive: bool,
        spelling_tolerance: bool,
    },
}

impl QuestionShape {
    #[must_use]
    pub fn kind(&self) -> ShapeKind {
        match self {
            QuestionShape::Choice { .. } => ShapeKind::Choice,
            QuestionShape::Boolean { .. } => ShapeKind::Boolean,
            QuestionShape::Match { .. } => ShapeKind::Match,
            QuestionShape::Zone { .. } => ShapeKind::Zone,
            QuestionShape::Text { .. } => ShapeKind::Text,
        }
    }

    fn validate(&self) -> Result<(), QuestionError> {
        match self {
            QuestionShape::Choice { options } => {
                if options.len() < 2 {
                    return Err(QuestionError::TooFewOptions { got: options.len() });
                }
                if !options.iter().any(|o| o.is_correct) {
                    return Err(QuestionError::NoCorrectOption);
                }
                Ok(())
            }
            QuestionShape::Boolean { options } => {
                let correct = options.iter().filter(|o| o.is_correct).count();
                if options.len() != 2 || correct != 1 {
                    return Err(QuestionError::InvalidBooleanDomain);
                }
                Ok(())
            }
            QuestionShape::Match { pairs } => {
                if pairs.is_empty() {
                    return Err(QuestionError::NoPairs);
                }
                Ok(())
            }
            QuestionShape::Zone { zones } => {
                if zones.is_empty() {
                    return Err(QuestionError::NoZones);
                }
                for zone in zones {
                    if zone.radius <= 0.0 || !zone.radius.is_finite() {
                        return Err(QuestionError::InvalidRadius { got: zone.radius });
                    }
                }
                Ok(())
            }
            QuestionShape::Text {
                accepted_answer, ..
            } => {
                if accepted_answer.trim().is_empty() {
                    return Err(QuestionError::EmptyAcceptedAnswer);
                }
                Ok(())
            }
        }
    }
}

/// A quiz question with its canonical-answer data.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    id: QuestionId,
    quiz_id: QuizId,
    prompt: String,
    explanation: Option<String>,
    shape: QuestionShape,
}

impl Question {
    /// Create a question, validating its shape payload.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the prompt is empty or the shape payload
    /// is malformed (see the variant docs).
    pub fn new(
        id: QuestionId,
        quiz_id: QuizId,
        prompt: impl Into<String>,
        explanation: Option<String>,
        shape: QuestionShape,
    ) -> Result<Self, QuestionError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(QuestionError::EmptyPrompt);
        }
        shape.validate()?;
        Ok(Self {
            id,
            quiz_id,
            prompt,
            explanation,
            shape,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn quiz_id(&self) -> QuizId {
        self.quiz_id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    #[must_use]
    pub fn shape(&self) -> &QuestionShape {
        &self.shape
    }
}

/// A learner's submitted answer, one variant per question shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    Choice { selected: Vec<OptionId> },
    Boolean { selected: OptionId },
    Match { pairs: Vec<(String, String)> },
    Zone { x: f64, y: f64 },
    Text { answer: String },
}

impl Response {
    #[must_use]
    pub fn kind(&self) -> ShapeKind {
        match self {
            Response::Choice { .. } => ShapeKind::Choice,
            Response::Boolean { .. } => ShapeKind::Boolean,
            Response::Match { .. } => ShapeKind::Match,
            Response::Zone { .. } => ShapeKind::Zone,
            Response::Text { .. } => ShapeKind::Text,
        }
    }
}
