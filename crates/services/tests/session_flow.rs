use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use quiz_core::model::settings::{
    ALLOW_CONCURRENT_SESSIONS, FIXED_SEED, PASS_THRESHOLD, QUESTIONS_PER_SESSION,
    RANDOM_SEED_STRATEGY, SHORT_FILL_ALLOWED,
};
use quiz_core::model::{
    CategoryId, CategoryScope, OptionDraft, OptionId, QuestionDraft, QuestionId, QuestionKind,
    Session, SessionId, SessionScore, SessionStatus, StatsDelta, UserAnswer, UserId,
};
use quiz_core::scoring::ScoreReport;
use quiz_core::time::fixed_clock;
use services::{
    ContentError, ErrorKind, QuizEventSink, QuizServices, ServiceError, SessionError, SinkError,
    StartConfig,
};
use storage::repository::{
    AnswerRepository, CompletionPersistence, InMemoryRepository, Storage, StorageError,
};

fn user() -> UserId {
    UserId::new(1)
}

// Question n has options 10n (correct) and 10n + 1 (wrong).
fn draft(id: u64, category: u64) -> QuestionDraft {
    QuestionDraft {
        id: QuestionId::new(id),
        category_id: CategoryId::new(category),
        prompt: format!("Question {id}"),
        explanation: None,
        kind: QuestionKind::SingleChoice,
        options: vec![
            OptionDraft::new(OptionId::new(id * 10), "right", true),
            OptionDraft::new(OptionId::new(id * 10 + 1), "wrong", false),
        ],
    }
}

fn right(q: QuestionId) -> Option<OptionId> {
    Some(OptionId::new(q.value() * 10))
}

fn wrong(q: QuestionId) -> Option<OptionId> {
    Some(OptionId::new(q.value() * 10 + 1))
}

/// Category 1 holds questions 1..=math, category 2 holds the next `reading`.
async fn seed(services: &QuizServices, math: u64, reading: u64) {
    let content = services.content();
    content
        .create_category(CategoryId::new(1), "Math", None, 0)
        .await
        .unwrap();
    content
        .create_category(CategoryId::new(2), "Reading", None, 1)
        .await
        .unwrap();
    for id in 1..=math {
        content.save_question(draft(id, 1)).await.unwrap();
    }
    for id in math + 1..=math + reading {
        content.save_question(draft(id, 2)).await.unwrap();
    }
}

async fn services_with(math: u64, reading: u64, settings: &[(&str, &str)]) -> QuizServices {
    let services = QuizServices::in_memory(fixed_clock());
    seed(&services, math, reading).await;
    for (key, value) in settings {
        services.settings().update_option(key, value).await.unwrap();
    }
    services
}

fn math() -> CategoryScope {
    CategoryScope::Category(CategoryId::new(1))
}

#[tokio::test]
async fn full_session_scores_sixty_percent_and_folds_stats() {
    let services = services_with(5, 0, &[(QUESTIONS_PER_SESSION, "5")]).await;
    let sessions = services.sessions();

    let session = sessions
        .start_session(user(), math(), StartConfig::default())
        .await
        .unwrap();
    let ids = session.question_ids().to_vec();
    assert_eq!(ids.len(), 5);

    for q in &ids[..3] {
        sessions.submit_answer(session.id(), *q, right(*q)).await.unwrap();
    }
    sessions.submit_answer(session.id(), ids[3], wrong(ids[3])).await.unwrap();

    let progress = sessions.progress(session.id()).await.unwrap();
    assert_eq!(progress.answered, 4);
    assert_eq!(progress.remaining, 1);

    let completed = sessions.complete_session(session.id()).await.unwrap();
    assert_eq!(completed.report.total, 5);
    assert_eq!(completed.report.correct, 3);
    assert!((completed.report.percentage - 60.0).abs() < f64::EPSILON);
    assert!(!completed.report.passed);
    assert_eq!(completed.session.status(), SessionStatus::Completed);
    assert_eq!(completed.session.score(), Some(SessionScore { correct: 3, total: 5 }));

    let stats = services
        .stats()
        .get_stats(user(), CategoryId::new(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.attempted(), 5);
    assert_eq!(stats.correct(), 3);
    assert_eq!(stats.total_sessions(), 1);
}

#[tokio::test]
async fn second_completion_is_rejected_and_stats_are_not_doubled() {
    let services = services_with(3, 0, &[(QUESTIONS_PER_SESSION, "3")]).await;
    let sessions = services.sessions();
    let session = sessions
        .start_session(user(), math(), StartConfig::default())
        .await
        .unwrap();

    sessions.complete_session(session.id()).await.unwrap();
    let err = sessions.complete_session(session.id()).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::InvalidState {
            status: SessionStatus::Completed
        }
    ));

    let stats = services.stats().list_stats(user()).await.unwrap();
    assert_eq!(stats[0].total_sessions(), 1);
    assert_eq!(stats[0].attempted(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_completions_count_once() {
    let services = services_with(4, 0, &[(QUESTIONS_PER_SESSION, "4")]).await;
    let sessions = services.sessions();
    let session = sessions
        .start_session(user(), math(), StartConfig::default())
        .await
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let sessions = services.sessions();
            let id = session.id();
            tokio::spawn(async move { sessions.complete_session(id).await })
        })
        .collect();

    let mut ok = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(err) => assert_eq!(err.kind(), ErrorKind::InvalidState),
        }
    }
    assert_eq!(ok, 1);

    let stats = services.stats().list_stats(user()).await.unwrap();
    assert_eq!(stats[0].total_sessions(), 1);
    assert_eq!(stats[0].attempted(), 4);
}

#[tokio::test]
async fn resubmitting_the_same_option_is_idempotent() {
    let services = QuizServices::in_memory(fixed_clock());
    seed(&services, 3, 0).await;
    services
        .settings()
        .update_option(QUESTIONS_PER_SESSION, "3")
        .await
        .unwrap();
    let sessions = services.sessions();
    let session = sessions
        .start_session(user(), math(), StartConfig::default())
        .await
        .unwrap();
    let q = session.question_ids()[0];

    let first = sessions.submit_answer(session.id(), q, right(q)).await.unwrap();
    let again = sessions.submit_answer(session.id(), q, right(q)).await.unwrap();
    assert_eq!(first, again);

    let changed = sessions.submit_answer(session.id(), q, wrong(q)).await.unwrap();
    assert!(!changed.is_correct);
    let skipped = sessions.submit_answer(session.id(), q, None).await.unwrap();
    assert_eq!(skipped.selected_option_id, None);

    let answers = sessions.answers(session.id()).await.unwrap();
    assert_eq!(answers.len(), 1);
    assert!(answers.len() <= session.len());
}

#[tokio::test]
async fn submit_checks_session_question_and_option() {
    let services = services_with(3, 2, &[(QUESTIONS_PER_SESSION, "2")]).await;
    let sessions = services.sessions();
    let session = sessions
        .start_session(user(), math(), StartConfig::default())
        .await
        .unwrap();
    let q = session.question_ids()[0];

    let err = sessions
        .submit_answer(SessionId::new(999), q, right(q))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // question 4 lives in the reading category
    let err = sessions
        .submit_answer(session.id(), QuestionId::new(4), right(QuestionId::new(4)))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotInSession { .. }));

    let err = sessions
        .submit_answer(session.id(), q, Some(OptionId::new(41)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOption);

    sessions.abandon_session(session.id()).await.unwrap();
    let err = sessions.submit_answer(session.id(), q, right(q)).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::InvalidState {
            status: SessionStatus::Abandoned
        }
    ));
}

#[tokio::test]
async fn short_fill_decides_small_pools() {
    let strict = services_with(3, 0, &[(QUESTIONS_PER_SESSION, "10")]).await;
    let err = strict
        .sessions()
        .start_session(user(), math(), StartConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::InsufficientContent {
            available: 3,
            requested: 10
        }
    ));

    let lenient = services_with(
        3,
        0,
        &[(QUESTIONS_PER_SESSION, "10"), (SHORT_FILL_ALLOWED, "true")],
    )
    .await;
    let session = lenient
        .sessions()
        .start_session(user(), math(), StartConfig::default())
        .await
        .unwrap();
    assert_eq!(session.len(), 3);
}

#[tokio::test]
async fn second_start_conflicts_until_first_ends() {
    let services = services_with(4, 0, &[(QUESTIONS_PER_SESSION, "2")]).await;
    let sessions = services.sessions();
    let first = sessions
        .start_session(user(), math(), StartConfig::default())
        .await
        .unwrap();

    let err = sessions
        .start_session(user(), math(), StartConfig::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    let still = sessions.get_session(first.id()).await.unwrap();
    assert!(still.is_active());

    // other users are independent
    sessions
        .start_session(UserId::new(2), math(), StartConfig::default())
        .await
        .unwrap();

    sessions.complete_session(first.id()).await.unwrap();
    sessions
        .start_session(user(), math(), StartConfig::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn concurrent_sessions_when_allowed() {
    let services = services_with(
        4,
        0,
        &[(QUESTIONS_PER_SESSION, "2"), (ALLOW_CONCURRENT_SESSIONS, "1")],
    )
    .await;
    let sessions = services.sessions();
    for _ in 0..3 {
        sessions
            .start_session(user(), math(), StartConfig::default())
            .await
            .unwrap();
    }
    assert_eq!(sessions.active_sessions(user()).await.unwrap().len(), 3);
}

#[tokio::test]
async fn abandon_never_touches_stats() {
    let services = services_with(3, 0, &[(QUESTIONS_PER_SESSION, "3")]).await;
    let sessions = services.sessions();
    let session = sessions
        .start_session(user(), math(), StartConfig::default())
        .await
        .unwrap();
    for q in session.question_ids() {
        sessions.submit_answer(session.id(), *q, right(*q)).await.unwrap();
    }

    let abandoned = sessions.abandon_session(session.id()).await.unwrap();
    assert_eq!(abandoned.status(), SessionStatus::Abandoned);
    assert!(services.stats().list_stats(user()).await.unwrap().is_empty());

    let err = sessions.complete_session(session.id()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    let err = sessions.abandon_session(session.id()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert!(services.stats().list_stats(user()).await.unwrap().is_empty());
}

#[tokio::test]
async fn mixed_session_folds_stats_per_category() {
    let services = services_with(2, 2, &[(QUESTIONS_PER_SESSION, "4")]).await;
    let sessions = services.sessions();
    let session = sessions
        .start_session(user(), CategoryScope::Mixed, StartConfig::default())
        .await
        .unwrap();
    for q in session.question_ids() {
        let option = if q.value() <= 2 { right(*q) } else { wrong(*q) };
        sessions.submit_answer(session.id(), *q, option).await.unwrap();
    }
    sessions.complete_session(session.id()).await.unwrap();

    let stats = services.stats().list_stats(user()).await.unwrap();
    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0].category_id(), CategoryId::new(1));
    assert_eq!(stats[0].correct(), 2);
    assert_eq!(stats[0].total_sessions(), 1);
    assert_eq!(stats[1].correct(), 0);
    assert_eq!(stats[1].attempted(), 2);
    assert_eq!(stats[1].total_sessions(), 1);
}

#[tokio::test]
async fn fixed_seed_strategy_repeats_the_sequence() {
    let services = services_with(
        10,
        0,
        &[
            (QUESTIONS_PER_SESSION, "5"),
            (RANDOM_SEED_STRATEGY, "fixed"),
            (FIXED_SEED, "1234"),
            (ALLOW_CONCURRENT_SESSIONS, "true"),
        ],
    )
    .await;
    let sessions = services.sessions();
    let a = sessions
        .start_session(user(), math(), StartConfig::default())
        .await
        .unwrap();
    let b = sessions
        .start_session(UserId::new(2), math(), StartConfig::default())
        .await
        .unwrap();
    assert_eq!(a.seed(), 1234);
    assert_eq!(a.question_ids(), b.question_ids());

    let overridden = sessions
        .start_session(
            user(),
            math(),
            StartConfig {
                question_count: Some(2),
                seed: Some(77),
            },
        )
        .await
        .unwrap();
    assert_eq!(overridden.seed(), 77);
    assert_eq!(overridden.len(), 2);
}

#[tokio::test]
async fn settings_changes_do_not_touch_running_sessions() {
    let services = services_with(4, 0, &[(QUESTIONS_PER_SESSION, "4")]).await;
    let sessions = services.sessions();
    let session = sessions
        .start_session(user(), math(), StartConfig::default())
        .await
        .unwrap();
    assert_eq!(session.pass_threshold(), 70);

    services
        .settings()
        .update_option(PASS_THRESHOLD, "25")
        .await
        .unwrap();
    let q = session.question_ids()[0];
    sessions.submit_answer(session.id(), q, right(q)).await.unwrap();

    let completed = sessions.complete_session(session.id()).await.unwrap();
    assert_eq!(completed.session.pass_threshold(), 70);
    assert!(!completed.report.passed);
}

#[tokio::test]
async fn referenced_question_keeps_its_answer_key() {
    let services = services_with(2, 0, &[(QUESTIONS_PER_SESSION, "2")]).await;
    services
        .sessions()
        .start_session(user(), math(), StartConfig::default())
        .await
        .unwrap();

    let mut flipped = draft(1, 1);
    flipped.options[0].is_correct = false;
    flipped.options[1].is_correct = true;
    let err = services.content().save_question(flipped).await.unwrap_err();
    assert!(matches!(err, ContentError::QuestionInUse(_)));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let mut reworded = draft(1, 1);
    reworded.prompt = "Question one, reworded".into();
    let saved = services.content().save_question(reworded).await.unwrap();
    assert_eq!(saved.prompt(), "Question one, reworded");
}

#[tokio::test]
async fn delete_and_sweep() {
    let services = services_with(
        4,
        0,
        &[(QUESTIONS_PER_SESSION, "2"), (ALLOW_CONCURRENT_SESSIONS, "true")],
    )
    .await;
    let sessions = services.sessions();
    let stale = sessions
        .start_session(user(), math(), StartConfig::default())
        .await
        .unwrap();
    let done = sessions
        .start_session(user(), math(), StartConfig::default())
        .await
        .unwrap();
    sessions.complete_session(done.id()).await.unwrap();

    // clock is fixed, so everything created "now" is older than a negative age
    let swept = sessions.abandon_stale(Duration::minutes(-1)).await.unwrap();
    assert_eq!(swept, vec![stale.id()]);
    assert!(sessions.abandon_stale(Duration::minutes(-1)).await.unwrap().is_empty());

    sessions.delete_session(done.id()).await.unwrap();
    assert_eq!(
        sessions.get_session(done.id()).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(services.stats().list_stats(user()).await.unwrap().len(), 1);
    assert_eq!(sessions.list_sessions(user(), 10).await.unwrap().len(), 1);
}

#[derive(Default)]
struct RecordingSink {
    completed: Mutex<Vec<SessionId>>,
    abandoned: Mutex<Vec<SessionId>>,
}

impl QuizEventSink for RecordingSink {
    fn session_completed(&self, session: &Session, _report: &ScoreReport) -> Result<(), SinkError> {
        self.completed.lock().unwrap().push(session.id());
        Err(SinkError("webhook down".into()))
    }

    fn session_abandoned(&self, session: &Session) -> Result<(), SinkError> {
        self.abandoned.lock().unwrap().push(session.id());
        Ok(())
    }
}

#[tokio::test]
async fn sink_sees_events_and_its_failures_are_swallowed() {
    let storage = Storage::in_memory();
    let sink = Arc::new(RecordingSink::default());
    let services = QuizServices::with_events(&storage, fixed_clock(), sink.clone());
    seed(&services, 4, 0).await;
    services
        .settings()
        .update_option(QUESTIONS_PER_SESSION, "2")
        .await
        .unwrap();
    let sessions = services.sessions();

    let a = sessions
        .start_session(user(), math(), StartConfig::default())
        .await
        .unwrap();
    sessions.complete_session(a.id()).await.unwrap();
    let b = sessions
        .start_session(user(), math(), StartConfig::default())
        .await
        .unwrap();
    sessions.abandon_session(b.id()).await.unwrap();

    assert_eq!(*sink.completed.lock().unwrap(), vec![a.id()]);
    assert_eq!(*sink.abandoned.lock().unwrap(), vec![b.id()]);
}

struct FailingCompletion;

#[async_trait]
impl CompletionPersistence for FailingCompletion {
    async fn complete_session(
        &self,
        _id: SessionId,
        _at: DateTime<Utc>,
        _score: SessionScore,
        _deltas: &[StatsDelta],
    ) -> Result<bool, StorageError> {
        Err(StorageError::Connection("stats table locked".into()))
    }
}

#[tokio::test]
async fn failed_completion_leaves_session_active() {
    let mut storage = Storage::in_memory();
    storage.completion = Arc::new(FailingCompletion);
    let services = QuizServices::new(&storage, fixed_clock());
    seed(&services, 2, 0).await;
    services
        .settings()
        .update_option(QUESTIONS_PER_SESSION, "2")
        .await
        .unwrap();
    let sessions = services.sessions();
    let session = sessions
        .start_session(user(), math(), StartConfig::default())
        .await
        .unwrap();

    let err = sessions.complete_session(session.id()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(err.public_message(), "internal error");

    assert!(sessions.get_session(session.id()).await.unwrap().is_active());
    assert!(services.stats().list_stats(user()).await.unwrap().is_empty());
}

#[tokio::test]
async fn grade_session_reports_without_completing() {
    let services = services_with(3, 0, &[(QUESTIONS_PER_SESSION, "3")]).await;
    let sessions = services.sessions();
    let session = sessions
        .start_session(user(), math(), StartConfig::default())
        .await
        .unwrap();
    let q = session.question_ids()[1];
    sessions.submit_answer(session.id(), q, right(q)).await.unwrap();

    let report = services.scoring().grade_session(session.id()).await.unwrap();
    assert_eq!(report.correct, 1);
    assert_eq!(report.per_question_breakdown[1].question_id, q);
    assert!(sessions.get_session(session.id()).await.unwrap().is_active());
}

/// Stores one extra answer between grading and the status flip.
struct AnswerBeforeFlip {
    repo: InMemoryRepository,
    late: Mutex<Option<UserAnswer>>,
}

#[async_trait]
impl CompletionPersistence for AnswerBeforeFlip {
    async fn complete_session(
        &self,
        id: SessionId,
        at: DateTime<Utc>,
        score: SessionScore,
        deltas: &[StatsDelta],
    ) -> Result<bool, StorageError> {
        let late = self.late.lock().unwrap().take();
        if let Some(answer) = late {
            self.repo.upsert_answer(&answer).await?;
        }
        self.repo.complete_session(id, at, score, deltas).await
    }
}

#[tokio::test]
async fn answer_racing_completion_is_stored_but_not_scored() {
    let repo = InMemoryRepository::new();
    let completion = Arc::new(AnswerBeforeFlip {
        repo: repo.clone(),
        late: Mutex::new(None),
    });
    let mut storage = Storage::from_backend(repo);
    storage.completion = completion.clone();
    let services = QuizServices::new(&storage, fixed_clock());
    seed(&services, 2, 0).await;
    services
        .settings()
        .update_option(QUESTIONS_PER_SESSION, "2")
        .await
        .unwrap();
    let sessions = services.sessions();
    let session = sessions
        .start_session(user(), math(), StartConfig::default())
        .await
        .unwrap();
    let q = session.question_ids()[0];
    *completion.late.lock().unwrap() = Some(UserAnswer::new(
        session.id(),
        q,
        right(q),
        true,
        fixed_clock().now(),
    ));

    let completed = sessions.complete_session(session.id()).await.unwrap();
    assert_eq!(completed.report.correct, 0);
    assert_eq!(completed.session.score(), Some(SessionScore { correct: 0, total: 2 }));
    assert_eq!(sessions.answers(session.id()).await.unwrap().len(), 1);
}
