use chrono::Duration;
use course_core::model::{
    ChoiceOption, ClassroomId, ClickZone, Module, ModuleId, OptionId, Question, QuestionId,
    QuestionShape, Quiz, QuizId, Response, SessionStatus, StudentId, ZoneId,
};
use course_core::time::{Clock, fixed_now};
use services::error::{ErrorKind, SessionError};
use services::prerequisite_service::PrerequisiteService;
use services::session_service::QuizSessionService;
use storage::repository::{
    CompletionRepository, ContentRepository, LeitnerRepository, SessionRepository, Storage,
};

fn boolean_shape(correct_first: bool) -> QuestionShape {
    QuestionShape::Boolean {
        options: vec![
            ChoiceOption {
                id: OptionId::new(1),
                text: "True".into(),
                is_correct: correct_first,
            },
            ChoiceOption {
                id: OptionId::new(2),
                text: "False".into(),
                is_correct: !correct_first,
            },
        ],
    }
}

/// Module 1 in classroom 1 with two quizzes; quiz 1 has three questions:
/// two booleans, one text, one zone (so four total), pass threshold 3.
async fn seed_content(storage: &Storage) {
    let module = Module::new(ModuleId::new(1), ClassroomId::new(1), "Anatomy", None).unwrap();
    storage.content.upsert_module(&module).await.unwrap();

    for quiz_id in [1u64, 2] {
        let quiz = Quiz::new(
            QuizId::new(quiz_id),
            module.id(),
            format!("Quiz {quiz_id}"),
            None,
            3,
            true,
        )
        .unwrap();
        storage.content.upsert_quiz(&quiz).await.unwrap();
    }

    let questions = vec![
        Question::new(
            QuestionId::new(1),
            QuizId::new(1),
            "The femur is the longest bone.",
            Some("Hip to knee.".into()),
            boolean_shape(true),
        )
        .unwrap(),
        Question::new(
            QuestionId::new(2),
            QuizId::new(1),
            "The skull protects the heart.",
            None,
            boolean_shape(false),
        )
        .unwrap(),
        Question::new(
            QuestionId::new(3),
            QuizId::new(1),
            "Name the heel bone.",
            Some("Also called the heel bone.".into()),
            QuestionShape::Text {
                accepted_answer: "Calcaneus".into(),
                case_sensitive: false,
                spelling_tolerance: true,
            },
        )
        .unwrap(),
        Question::new(
            QuestionId::new(4),
            QuizId::new(1),
            "Click the heel.",
            None,
            QuestionShape::Zone {
                zones: vec![ClickZone {
                    id: ZoneId::new(1),
                    label: "heel".into(),
                    x: 50.0,
                    y: 60.0,
                    radius: 15.0,
                }],
            },
        )
        .unwrap(),
    ];
    for question in &questions {
        storage.content.upsert_question(question).await.unwrap();
    }

    // Quiz 2 has a single boolean so module completion is reachable.
    let q = Question::new(
        QuestionId::new(5),
        QuizId::new(2),
        "Bones are alive.",
        None,
        boolean_shape(true),
    )
    .unwrap();
    storage.content.upsert_question(&q).await.unwrap();
}

fn service(storage: &Storage) -> QuizSessionService {
    QuizSessionService::new(storage.clone()).with_clock(Clock::fixed(fixed_now()))
}

#[tokio::test]
async fn start_strips_canonical_answers() {
    let storage = Storage::in_memory();
    seed_content(&storage).await;
    let service = service(&storage);

    let started = service.start(StudentId::new(1), QuizId::new(1)).await.unwrap();
    assert_eq!(started.max_score, 4);
    assert_eq!(started.questions.len(), 4);

    let json = serde_json::to_string(&started).unwrap();
    assert!(!json.contains("is_correct"));
    assert!(!json.contains("Calcaneus"));
    assert!(!json.contains("radius"));
}

#[tokio::test]
async fn locked_quiz_refuses_to_start_until_prerequisite_passes() {
    let storage = Storage::in_memory();
    seed_content(&storage).await;
    let prerequisites = PrerequisiteService::new(storage.clone());
    prerequisites
        .attach_quiz_prerequisite(QuizId::new(2), Some(QuizId::new(1)))
        .await
        .unwrap();

    let service = service(&storage);
    let student = StudentId::new(1);

    let err = service.start(student, QuizId::new(2)).await.unwrap_err();
    assert_eq!(err.code(), "QUIZ_LOCKED");
    assert_eq!(err.kind(), ErrorKind::Locked);

    storage
        .completions
        .insert_quiz_fact(student, QuizId::new(1), fixed_now())
        .await
        .unwrap();
    service.start(student, QuizId::new(2)).await.unwrap();
}

#[tokio::test]
async fn inactive_quiz_refuses_to_start() {
    let storage = Storage::in_memory();
    seed_content(&storage).await;
    let inactive = Quiz::new(QuizId::new(3), ModuleId::new(1), "Draft", None, 1, false).unwrap();
    storage.content.upsert_quiz(&inactive).await.unwrap();

    let service = service(&storage);
    let err = service
        .start(StudentId::new(1), QuizId::new(3))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::QuizInactive));
    assert_eq!(err.code(), "QUIZ_INACTIVE");
}

#[tokio::test]
async fn passing_flow_records_facts_and_seeds_boxes() {
    let storage = Storage::in_memory();
    seed_content(&storage).await;
    let service = service(&storage);
    let student = StudentId::new(1);

    let started = service.start(student, QuizId::new(1)).await.unwrap();
    let sid = started.session_id;

    service
        .submit_answer(sid, QuestionId::new(1), &Response::Boolean {
            selected: OptionId::new(1),
        })
        .await
        .unwrap();
    service
        .submit_answer(sid, QuestionId::new(2), &Response::Boolean {
            selected: OptionId::new(2),
        })
        .await
        .unwrap();
    // Case-insensitive with spelling tolerance: a near-miss still counts.
    let text = service
        .submit_answer(sid, QuestionId::new(3), &Response::Text {
            answer: "calcaneum".into(),
        })
        .await
        .unwrap();
    assert!(text.correct);
    let zone = service
        .submit_answer(sid, QuestionId::new(4), &Response::Zone { x: 58.0, y: 65.0 })
        .await
        .unwrap();
    assert!(zone.correct);

    let result = service.finish(sid).await.unwrap();
    assert_eq!(result.score, 4);
    assert_eq!(result.max_score, 4);
    assert!(result.passed);
    assert!(result.quiz_newly_completed);
    assert!(!result.module_newly_completed);

    assert!(storage
        .completions
        .has_quiz_fact(student, QuizId::new(1))
        .await
        .unwrap());

    // Every quiz question now sits in box one.
    let counts = storage
        .leitner
        .box_counts(ClassroomId::new(1), student)
        .await
        .unwrap();
    assert_eq!(counts, [4, 0, 0, 0, 0]);
}

#[tokio::test]
async fn failing_score_records_nothing() {
    let storage = Storage::in_memory();
    seed_content(&storage).await;
    let service = service(&storage);
    let student = StudentId::new(1);

    let started = service.start(student, QuizId::new(1)).await.unwrap();
    let sid = started.session_id;

    let wrong = service
        .submit_answer(sid, QuestionId::new(1), &Response::Boolean {
            selected: OptionId::new(2),
        })
        .await
        .unwrap();
    assert!(!wrong.correct);
    let miss = service
        .submit_answer(sid, QuestionId::new(4), &Response::Zone { x: 80.0, y: 80.0 })
        .await
        .unwrap();
    assert!(!miss.correct);

    let result = service.finish(sid).await.unwrap();
    assert_eq!(result.score, 0);
    assert!(!result.passed);
    assert!(!result.quiz_newly_completed);

    assert!(!storage
        .completions
        .has_quiz_fact(student, QuizId::new(1))
        .await
        .unwrap());
    let counts = storage
        .leitner
        .box_counts(ClassroomId::new(1), student)
        .await
        .unwrap();
    assert_eq!(counts, [0, 0, 0, 0, 0]);
}

#[tokio::test]
async fn module_fact_appears_when_both_quizzes_pass() {
    let storage = Storage::in_memory();
    seed_content(&storage).await;
    let service = service(&storage);
    let student = StudentId::new(1);

    // Quiz 2's threshold (3) exceeds its single question; lower it so the
    // module can complete.
    let quiz2 = Quiz::new(QuizId::new(2), ModuleId::new(1), "Quiz 2", None, 1, true).unwrap();
    storage.content.upsert_quiz(&quiz2).await.unwrap();

    let first = service.start(student, QuizId::new(1)).await.unwrap();
    for (question, option) in [(1u64, 1u64), (2, 2)] {
        service
            .submit_answer(first.session_id, QuestionId::new(question), &Response::Boolean {
                selected: OptionId::new(option),
            })
            .await
            .unwrap();
    }
    service
        .submit_answer(first.session_id, QuestionId::new(3), &Response::Text {
            answer: "Calcaneus".into(),
        })
        .await
        .unwrap();
    let result = service.finish(first.session_id).await.unwrap();
    assert!(result.passed);
    assert!(!result.module_newly_completed);

    let second = service.start(student, QuizId::new(2)).await.unwrap();
    service
        .submit_answer(second.session_id, QuestionId::new(5), &Response::Boolean {
            selected: OptionId::new(1),
        })
        .await
        .unwrap();
    let result = service.finish(second.session_id).await.unwrap();
    assert!(result.passed);
    assert!(result.module_newly_completed);
    assert!(storage
        .completions
        .has_module_fact(student, ModuleId::new(1))
        .await
        .unwrap());
}

#[tokio::test]
async fn double_answer_and_foreign_question_are_rejected() {
    let storage = Storage::in_memory();
    seed_content(&storage).await;
    let service = service(&storage);

    let started = service.start(StudentId::new(1), QuizId::new(1)).await.unwrap();
    let sid = started.session_id;
    let answer = Response::Boolean {
        selected: OptionId::new(1),
    };

    service.submit_answer(sid, QuestionId::new(1), &answer).await.unwrap();
    let err = service
        .submit_answer(sid, QuestionId::new(1), &answer)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::AlreadyAnswered));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // Question 5 belongs to quiz 2.
    let err = service
        .submit_answer(sid, QuestionId::new(5), &answer)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotInQuiz));
}

#[tokio::test]
async fn completed_session_rejects_further_answers() {
    let storage = Storage::in_memory();
    seed_content(&storage).await;
    let service = service(&storage);

    let started = service.start(StudentId::new(1), QuizId::new(1)).await.unwrap();
    service.finish(started.session_id).await.unwrap();

    let err = service
        .submit_answer(started.session_id, QuestionId::new(1), &Response::Boolean {
            selected: OptionId::new(1),
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Closed {
            status: SessionStatus::Completed
        }
    ));
    assert_eq!(err.code(), "SESSION_ALREADY_FINISHED");
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn stale_session_is_swept_and_then_unfinishable() {
    let storage = Storage::in_memory();
    seed_content(&storage).await;
    let service = service(&storage);

    let started = service.start(StudentId::new(1), QuizId::new(1)).await.unwrap();

    // Three hours later, the sweep flips the session to abandoned.
    let later = QuizSessionService::new(storage.clone())
        .with_clock(Clock::fixed(fixed_now() + Duration::hours(3)));
    assert_eq!(later.sweep_abandoned().await.unwrap(), 1);

    let err = later.finish(started.session_id).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Closed {
            status: SessionStatus::Abandoned
        }
    ));
    assert_eq!(err.kind(), ErrorKind::State);
}

#[tokio::test]
async fn timed_out_session_is_abandoned_lazily_on_touch() {
    let storage = Storage::in_memory();
    seed_content(&storage).await;
    let service = service(&storage);

    let started = service.start(StudentId::new(1), QuizId::new(1)).await.unwrap();

    // No sweep ran, but touching the session after the timeout abandons it.
    let later = QuizSessionService::new(storage.clone())
        .with_clock(Clock::fixed(fixed_now() + Duration::hours(3)));
    let err = later
        .submit_answer(started.session_id, QuestionId::new(1), &Response::Boolean {
            selected: OptionId::new(1),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Closed { .. }));

    let record = storage.sessions.get_session(started.session_id).await.unwrap();
    assert_eq!(record.status, SessionStatus::Abandoned);
}

#[tokio::test]
async fn review_reveals_verdicts_only_after_completion() {
    let storage = Storage::in_memory();
    seed_content(&storage).await;
    let service = service(&storage);

    let started = service.start(StudentId::new(1), QuizId::new(1)).await.unwrap();
    let sid = started.session_id;
    service
        .submit_answer(sid, QuestionId::new(1), &Response::Boolean {
            selected: OptionId::new(1),
        })
        .await
        .unwrap();

    let err = service.review(sid).await.unwrap_err();
    assert!(matches!(err, SessionError::NotCompleted));

    service.finish(sid).await.unwrap();
    let review = service.review(sid).await.unwrap();
    assert_eq!(review.entries.len(), 1);
    assert_eq!(review.entries[0].question_id, QuestionId::new(1));
    assert!(review.entries[0].verdict.correct);
    assert_eq!(review.entries[0].explanation.as_deref(), Some("Hip to knee."));
}
