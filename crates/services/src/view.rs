//! Presentation-agnostic DTOs returned by the services.
//!
//! Everything here is safe to hand to an untrusted client: question views
//! strip canonical answers, and verdicts only appear on completed sessions.

use serde::Serialize;

use course_core::grader::Verdict;
use course_core::leitner::{BoxDistribution, BoxLevel};
use course_core::model::{
    ModuleId, OptionId, Question, QuestionId, QuestionShape, QuizId, ReviewSessionId, SessionId,
    ShapeKind, ZoneId,
};

/// Lock state of a quiz for one student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LockStatus {
    Unlocked,
    LockedByQuiz { prerequisite: QuizId },
    LockedByModule { prerequisite: ModuleId },
}

/// A selectable option with its correctness withheld.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionView {
    pub id: OptionId,
    pub text: String,
}

/// A click target with its center and radius withheld.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneView {
    pub id: ZoneId,
    pub label: String,
}

/// Shape payload as presented to a learner mid-session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionBodyView {
    Choice { options: Vec<OptionView> },
    Boolean { options: Vec<OptionView> },
    /// Left column keeps authoring order; the right column is sorted so its
    /// ordering cannot leak the pairing.
    Match { left: Vec<String>, right: Vec<String> },
    Zone { zones: Vec<ZoneView> },
    Text,
}

/// One question with its canonical answer data stripped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionView {
    pub id: QuestionId,
    pub prompt: String,
    pub body: QuestionBodyView,
}

impl QuestionView {
    #[must_use]
    pub fn from_question(question: &Question) -> Self {
        let body = match question.shape() {
            QuestionShape::Choice { options } => QuestionBodyView::Choice {
                options: options
                    .iter()
                    .map(|o| OptionView {
                        id: o.id,
                        text: o.text.clone(),
                    })
                    .collect(),
            },
            QuestionShape::Boolean { options } => QuestionBodyView::Boolean {
                options: options
                    .iter()
                    .map(|o| OptionView {
                        id: o.id,
                        text: o.text.clone(),
                    })
                    .collect(),
            },
            QuestionShape::Match { pairs } => {
                let left = pairs.iter().map(|p| p.left.clone()).collect();
                let mut right: Vec<String> = pairs.iter().map(|p| p.right.clone()).collect();
                right.sort();
                QuestionBodyView::Match { left, right }
            }
            QuestionShape::Zone { zones } => QuestionBodyView::Zone {
                zones: zones
                    .iter()
                    .map(|z| ZoneView {
                        id: z.id,
                        label: z.label.clone(),
                    })
                    .collect(),
            },
            QuestionShape::Text { .. } => QuestionBodyView::Text,
        };
        Self {
            id: question.id(),
            prompt: question.prompt().to_owned(),
            body,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ShapeKind {
        match &self.body {
            QuestionBodyView::Choice { .. } => ShapeKind::Choice,
            QuestionBodyView::Boolean { .. } => ShapeKind::Boolean,
            QuestionBodyView::Match { .. } => ShapeKind::Match,
            QuestionBodyView::Zone { .. } => ShapeKind::Zone,
            QuestionBodyView::Text => ShapeKind::Text,
        }
    }
}

/// A freshly opened quiz session with its stripped question set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartedSession {
    pub session_id: SessionId,
    pub quiz_id: QuizId,
    pub questions: Vec<QuestionView>,
    pub max_score: u32,
}

/// The only feedback an in-progress session gets per answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnswerOutcome {
    pub question_id: QuestionId,
    pub correct: bool,
}

/// Outcome of finishing a quiz session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionResult {
    pub session_id: SessionId,
    pub score: u32,
    pub max_score: u32,
    pub passed: bool,
    pub quiz_newly_completed: bool,
    pub module_newly_completed: bool,
}

/// One reviewed question with its full verdict and explanation; only
/// produced for completed sessions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewEntry {
    pub question_id: QuestionId,
    pub prompt: String,
    pub explanation: Option<String>,
    pub verdict: Verdict,
}

/// Post-completion review of a quiz session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReview {
    pub session_id: SessionId,
    pub score: u32,
    pub max_score: u32,
    pub passed: bool,
    pub entries: Vec<ReviewEntry>,
}

/// Per-box counts and percentage distribution for one student.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LeitnerStatus {
    pub total: u64,
    pub counts: [u64; 5],
    pub percentages: [f64; 5],
}

impl LeitnerStatus {
    #[must_use]
    pub fn from_distribution(dist: &BoxDistribution) -> Self {
        Self {
            total: dist.total(),
            counts: dist.counts,
            percentages: dist.percentages(),
        }
    }
}

/// A freshly opened review session with its stripped question set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartedReview {
    pub session_id: ReviewSessionId,
    pub questions: Vec<QuestionView>,
}

/// Outcome of finishing a review session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReviewFinish {
    pub session_id: ReviewSessionId,
    pub correct: u32,
    pub wrong: u32,
    pub promoted: u32,
    pub demoted: u32,
    pub unchanged: u32,
}

/// One reviewed question with its box transition; only produced for
/// completed review sessions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeitnerReviewEntry {
    pub question_id: QuestionId,
    pub prompt: String,
    pub explanation: Option<String>,
    pub box_before: BoxLevel,
    pub box_after: BoxLevel,
    pub verdict: Option<Verdict>,
}

/// Post-completion review of a Leitner session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeitnerReview {
    pub session_id: ReviewSessionId,
    pub entries: Vec<LeitnerReviewEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::{ChoiceOption, ClickZone, MatchPair, QuestionShape};

    fn question(shape: QuestionShape) -> Question {
        Question::new(QuestionId::new(1), QuizId::new(1), "Prompt", None, shape).unwrap()
    }

    #[test]
    fn choice_view_drops_correctness() {
        let q = question(QuestionShape::Choice {
            options: vec![
                ChoiceOption {
                    id: OptionId::new(1),
                    text: "Tibia".into(),
                    is_correct: true,
                },
                ChoiceOption {
                    id: OptionId::new(2),
                    text: "Femur".into(),
                    is_correct: false,
                },
            ],
        });
        let view = QuestionView::from_question(&q);
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("is_correct"));
        assert!(json.contains("Tibia"));
    }

    #[test]
    fn match_view_sorts_right_column() {
        let q = question(QuestionShape::Match {
            pairs: vec![
                MatchPair {
                    left: "femur".into(),
                    right: "thigh".into(),
                },
                MatchPair {
                    left: "radius".into(),
                    right: "forearm".into(),
                },
            ],
        });
        let view = QuestionView::from_question(&q);
        match view.body {
            QuestionBodyView::Match { left, right } => {
                assert_eq!(left, vec!["femur", "radius"]);
                assert_eq!(right, vec!["forearm", "thigh"]);
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn zone_view_hides_geometry() {
        let q = question(QuestionShape::Zone {
            zones: vec![ClickZone {
                id: ZoneId::new(1),
                label: "heel".into(),
                x: 50.0,
                y: 60.0,
                radius: 15.0,
            }],
        });
        let view = QuestionView::from_question(&q);
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("radius"));
        assert!(!json.contains("50"));
        assert!(json.contains("heel"));
    }

    #[test]
    fn text_view_carries_nothing_but_the_prompt() {
        let q = question(QuestionShape::Text {
            accepted_answer: "Calcaneus".into(),
            case_sensitive: false,
            spelling_tolerance: true,
        });
        let view = QuestionView::from_question(&q);
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("Calcaneus"));
        assert_eq!(view.kind(), ShapeKind::Text);
    }
}
