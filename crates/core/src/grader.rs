use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::model::{OptionId, QuestionShape, Response, ShapeKind, ZoneId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GradeError {
    #[error("response shape {response} does not match question shape {question}")]
    ShapeMismatch {
        question: ShapeKind,
        response: ShapeKind,
    },
}

//
// ─── VERDICT ───────────────────────────────────────────────────────────────────
//

/// Outcome of grading one submitted answer.
///
/// The detail is for post-completion review display only; in-progress
/// sessions must surface nothing beyond `correct`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub correct: bool,
    pub detail: VerdictDetail,
}

/// Per-pair feedback on a match question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairVerdict {
    pub left: String,
    pub submitted_right: String,
    pub expected_right: Option<String>,
    pub correct: bool,
}

/// Shape-specific grading detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum VerdictDetail {
    Choice {
        selected: Vec<OptionId>,
        correct_options: Vec<OptionId>,
    },
    Boolean {
        selected: OptionId,
        correct_option: OptionId,
    },
    Match {
        pairs: Vec<PairVerdict>,
    },
    Zone {
        matched_zone: Option<ZoneId>,
        /// Distance to the nearest zone center divided by that zone's
        /// radius; values <= 1.0 are hits.
        nearest_distance: f64,
    },
    Text {
        submitted: String,
        accepted: String,
        distance: usize,
    },
}

//
// ─── GRADING ───────────────────────────────────────────────────────────────────
//

/// Grade a submitted response against a question's canonical answer.
///
/// Pure and total over well-formed shapes: no I/O, no clock, no randomness.
///
/// # Errors
///
/// Returns `GradeError::ShapeMismatch` when the response variant does not
/// match the question shape.
pub fn grade(shape: &QuestionShape, response: &Response) -> Result<Verdict, GradeError> {
    match (shape, response) {
        (QuestionShape::Choice { options }, Response::Choice { selected }) => {
            Ok(grade_choice(options, selected))
        }
        (QuestionShape::Boolean { options }, Response::Boolean { selected }) => {
            Ok(grade_boolean(options, *selected))
        }
        (QuestionShape::Match { pairs }, Response::Match { pairs: submitted }) => {
            Ok(grade_match(pairs, submitted))
        }
        (QuestionShape::Zone { zones }, Response::Zone { x, y }) => Ok(grade_zone(zones, *x, *y)),
        (
            QuestionShape::Text {
                accepted_answer,
                case_sensitive,
                spelling_tolerance,
            },
            Response::Text { answer },
        ) => Ok(grade_text(
            accepted_answer,
            *case_sensitive,
            *spelling_tolerance,
            answer,
        )),
        _ => Err(GradeError::ShapeMismatch {
            question: shape.kind(),
            response: response.kind(),
        }),
    }
}

/// Correct iff the selected id set exactly equals the canonical correct set.
/// No partial credit; order irrelevant.
fn grade_choice(options: &[crate::model::ChoiceOption], selected: &[OptionId]) -> Verdict {
    let correct_options: Vec<OptionId> = options
        .iter()
        .filter(|o| o.is_correct)
        .map(|o| o.id)
        .collect();

    let selected_set: HashSet<OptionId> = selected.iter().copied().collect();
    let correct_set: HashSet<OptionId> = correct_options.iter().copied().collect();

    Verdict {
        correct: selected_set == correct_set,
        detail: VerdictDetail::Choice {
            selected: selected.to_vec(),
            correct_options,
        },
    }
}

/// CHOICE restricted to a fixed two-option domain with a single selection.
fn grade_boolean(options: &[crate::model::ChoiceOption], selected: OptionId) -> Verdict {
    // Shape validation guarantees exactly one correct option.
    let correct_option = options
        .iter()
        .find(|o| o.is_correct)
        .map_or(OptionId::new(0), |o| o.id);

    Verdict {
        correct: selected == correct_option,
        detail: VerdictDetail::Boolean {
            selected,
            correct_option,
        },
    }
}

/// Correct iff every submitted pair is canonical and every canonical pair is
/// covered exactly once. Per-pair results are reported for feedback even
/// though scoring is all-or-nothing.
fn grade_match(pairs: &[crate::model::MatchPair], submitted: &[(String, String)]) -> Verdict {
    let mut remaining: Vec<&crate::model::MatchPair> = pairs.iter().collect();
    let mut pair_verdicts = Vec::with_capacity(submitted.len());
    let mut all_correct = true;

    for (left, right) in submitted {
        let expected_right = pairs
            .iter()
            .find(|p| &p.left == left)
            .map(|p| p.right.clone());

        // Consume at most one canonical pair per submission so duplicate
        // submissions of the same pair cannot double-cover it.
        let hit = remaining
            .iter()
            .position(|p| &p.left == left && &p.right == right);
        let correct = match hit {
            Some(idx) => {
                remaining.swap_remove(idx);
                true
            }
            None => false,
        };
        all_correct &= correct;

        pair_verdicts.push(PairVerdict {
            left: left.clone(),
            submitted_right: right.clone(),
            expected_right,
            correct,
        });
    }

    Verdict {
        correct: all_correct && remaining.is_empty(),
        detail: VerdictDetail::Match {
            pairs: pair_verdicts,
        },
    }
}

/// Correct iff the click falls within Euclidean distance `radius` of at
/// least one zone center; any containing zone counts on overlap ties.
fn grade_zone(zones: &[crate::model::ClickZone], x: f64, y: f64) -> Verdict {
    let mut matched_zone = None;
    let mut nearest = f64::INFINITY;

    for zone in zones {
        let distance = (x - zone.x).hypot(y - zone.y);
        let normalized = distance / zone.radius;
        if normalized < nearest {
            nearest = normalized;
        }
        if matched_zone.is_none() && distance <= zone.radius {
            matched_zone = Some(zone.id);
        }
    }

    Verdict {
        correct: matched_zone.is_some(),
        detail: VerdictDetail::Zone {
            matched_zone,
            nearest_distance: nearest,
        },
    }
}

/// Exact match after normalization, widened to a bounded edit distance when
/// spelling tolerance is enabled.
fn grade_text(
    accepted_answer: &str,
    case_sensitive: bool,
    spelling_tolerance: bool,
    answer: &str,
) -> Verdict {
    let submitted = normalize(answer, case_sensitive);
    let accepted = normalize(accepted_answer, case_sensitive);
    let distance = levenshtein(&submitted, &accepted);

    let correct = if spelling_tolerance {
        distance <= spelling_budget(accepted.chars().count())
    } else {
        distance == 0
    };

    Verdict {
        correct,
        detail: VerdictDetail::Text {
            submitted,
            accepted,
            distance,
        },
    }
}

fn normalize(s: &str, case_sensitive: bool) -> String {
    let trimmed = s.trim();
    if case_sensitive {
        trimmed.to_owned()
    } else {
        trimmed.to_lowercase()
    }
}

/// Edit budget for spelling tolerance: one edit for short answers, scaling
/// with length for longer ones.
fn spelling_budget(accepted_len: usize) -> usize {
    (accepted_len / 8).max(1)
}

/// Levenshtein distance (insertions, deletions, substitutions) over chars.
#[must_use]
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChoiceOption, ClickZone, MatchPair};

    fn option(id: u64, correct: bool) -> ChoiceOption {
        ChoiceOption {
            id: OptionId::new(id),
            text: format!("option {id}"),
            is_correct: correct,
        }
    }

    fn choice_shape() -> QuestionShape {
        QuestionShape::Choice {
            options: vec![option(1, true), option(2, false), option(3, true)],
        }
    }

    #[test]
    fn choice_requires_exact_set() {
        let shape = choice_shape();

        let full = grade(
            &shape,
            &Response::Choice {
                selected: vec![OptionId::new(3), OptionId::new(1)],
            },
        )
        .unwrap();
        assert!(full.correct);

        let partial = grade(
            &shape,
            &Response::Choice {
                selected: vec![OptionId::new(1)],
            },
        )
        .unwrap();
        assert!(!partial.correct);

        let superset = grade(
            &shape,
            &Response::Choice {
                selected: vec![OptionId::new(1), OptionId::new(2), OptionId::new(3)],
            },
        )
        .unwrap();
        assert!(!superset.correct);
    }

    #[test]
    fn boolean_matches_single_correct_option() {
        let shape = QuestionShape::Boolean {
            options: vec![option(10, true), option(11, false)],
        };

        let yes = grade(
            &shape,
            &Response::Boolean {
                selected: OptionId::new(10),
            },
        )
        .unwrap();
        assert!(yes.correct);

        let no = grade(
            &shape,
            &Response::Boolean {
                selected: OptionId::new(11),
            },
        )
        .unwrap();
        assert!(!no.correct);
    }

    fn match_shape() -> QuestionShape {
        QuestionShape::Match {
            pairs: vec![
                MatchPair {
                    left: "femur".into(),
                    right: "thigh".into(),
                },
                MatchPair {
                    left: "ulna".into(),
                    right: "forearm".into(),
                },
            ],
        }
    }

    #[test]
    fn match_is_all_or_nothing_with_pair_detail() {
        let shape = match_shape();

        let swapped = grade(
            &shape,
            &Response::Match {
                pairs: vec![
                    ("femur".into(), "forearm".into()),
                    ("ulna".into(), "thigh".into()),
                ],
            },
        )
        .unwrap();
        assert!(!swapped.correct);
        let VerdictDetail::Match { pairs } = &swapped.detail else {
            panic!("expected match detail");
        };
        assert!(pairs.iter().all(|p| !p.correct));
        assert_eq!(pairs[0].expected_right.as_deref(), Some("thigh"));

        let exact = grade(
            &shape,
            &Response::Match {
                pairs: vec![
                    ("ulna".into(), "forearm".into()),
                    ("femur".into(), "thigh".into()),
                ],
            },
        )
        .unwrap();
        assert!(exact.correct);
    }

    #[test]
    fn match_rejects_incomplete_coverage() {
        let shape = match_shape();
        let one_pair = grade(
            &shape,
            &Response::Match {
                pairs: vec![("femur".into(), "thigh".into())],
            },
        )
        .unwrap();
        // The submitted pair itself is right, but the canonical set is not
        // fully covered.
        assert!(!one_pair.correct);

        let duplicated = grade(
            &shape,
            &Response::Match {
                pairs: vec![
                    ("femur".into(), "thigh".into()),
                    ("femur".into(), "thigh".into()),
                ],
            },
        )
        .unwrap();
        assert!(!duplicated.correct);
    }

    #[test]
    fn zone_hit_test_uses_euclidean_radius() {
        let shape = QuestionShape::Zone {
            zones: vec![ClickZone {
                id: ZoneId::new(1),
                label: "calcaneus".into(),
                x: 50.0,
                y: 60.0,
                radius: 15.0,
            }],
        };

        let hit = grade(&shape, &Response::Zone { x: 58.0, y: 65.0 }).unwrap();
        assert!(hit.correct);
        let VerdictDetail::Zone {
            matched_zone,
            nearest_distance,
        } = hit.detail
        else {
            panic!("expected zone detail");
        };
        assert_eq!(matched_zone, Some(ZoneId::new(1)));
        assert!(nearest_distance <= 1.0);

        let miss = grade(&shape, &Response::Zone { x: 80.0, y: 80.0 }).unwrap();
        assert!(!miss.correct);
    }

    #[test]
    fn overlapping_zones_any_hit_counts() {
        let shape = QuestionShape::Zone {
            zones: vec![
                ClickZone {
                    id: ZoneId::new(1),
                    label: "a".into(),
                    x: 0.0,
                    y: 0.0,
                    radius: 10.0,
                },
                ClickZone {
                    id: ZoneId::new(2),
                    label: "b".into(),
                    x: 5.0,
                    y: 0.0,
                    radius: 10.0,
                },
            ],
        };
        let verdict = grade(&shape, &Response::Zone { x: 4.0, y: 0.0 }).unwrap();
        assert!(verdict.correct);
    }

    fn text_shape(tolerant: bool) -> QuestionShape {
        QuestionShape::Text {
            accepted_answer: "Calcaneus".into(),
            case_sensitive: false,
            spelling_tolerance: tolerant,
        }
    }

    #[test]
    fn text_case_insensitive_and_spelling_tolerant() {
        let shape = text_shape(true);

        for submitted in ["calcaneus", "Calcaneum", " Calcaneus "] {
            let verdict = grade(
                &shape,
                &Response::Text {
                    answer: submitted.into(),
                },
            )
            .unwrap();
            assert!(verdict.correct, "expected {submitted:?} to grade correct");
        }

        let wrong = grade(
            &shape,
            &Response::Text {
                answer: "Femur".into(),
            },
        )
        .unwrap();
        assert!(!wrong.correct);
    }

    #[test]
    fn text_exact_mode_rejects_near_misses() {
        let shape = text_shape(false);
        let near = grade(
            &shape,
            &Response::Text {
                answer: "Calcaneum".into(),
            },
        )
        .unwrap();
        assert!(!near.correct);

        let exact = grade(
            &shape,
            &Response::Text {
                answer: "CALCANEUS".into(),
            },
        )
        .unwrap();
        assert!(exact.correct);
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let err = grade(
            &choice_shape(),
            &Response::Text {
                answer: "nope".into(),
            },
        )
        .unwrap_err();
        assert_eq!(
            err,
            GradeError::ShapeMismatch {
                question: ShapeKind::Choice,
                response: ShapeKind::Text,
            }
        );
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("calcaneus", "calcaneum"), 1);
    }
}
