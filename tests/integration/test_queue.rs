//! End-to-end tests for review queues.
//!
//! These drive a `QueueOrchestrator` through whole runs with an in-memory
//! content provider and check what reaches the engine state and the event
//! stream.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use retake_engine::{
    Check, Config, ContentProvider, ContentRequest, EngineEvent, EngineState, ExactMatchValidator,
    LessonContent, MistakeRecord, QueueOrchestrator, QuestionKind, Result, RetakeError, RunEvent,
    RunMode, RunPhase, RunSession, Screen, Step,
};
use serde_json::json;
use tokio::sync::broadcast::Receiver;

/// Serves a two-screen lesson (intro, then one fill-in check) for any item.
///
/// Clones share their offline set and request log.
#[derive(Clone, Default)]
struct Lessons {
    offline: Arc<Mutex<HashSet<String>>>,
    requests: Arc<Mutex<Vec<ContentRequest>>>,
}

impl Lessons {
    fn set_offline(&self, item_id: &str, offline: bool) {
        let mut set = self.offline.lock().expect("offline lock");
        if offline {
            set.insert(item_id.to_string());
        } else {
            set.remove(item_id);
        }
    }

    fn requests(&self) -> Vec<ContentRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl ContentProvider for Lessons {
    async fn fetch(&self, request: &ContentRequest) -> Result<LessonContent> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        if self.offline.lock().expect("offline lock").contains(&request.item_id) {
            return Err(RetakeError::content_unavailable(
                &request.item_id,
                "lesson server offline",
            ));
        }
        Ok(lesson(&request.item_id))
    }
}

fn lesson(item_id: &str) -> LessonContent {
    LessonContent::new(vec![
        Screen::passive(json!({ "text": format!("Let's revisit {item_id}") })),
        Screen::with_check(
            json!({ "text": "Where does a fresh entry go?" }),
            Check::new(QuestionKind::FillIn, "insert at the head", json!("head")),
        ),
    ])
}

fn config(advance_delay_ms: u64, celebrate: bool) -> Config {
    let mut config = Config::default();
    config.queue.advance_delay_ms = advance_delay_ms;
    config.run.celebrate_daily_streak = celebrate;
    config
}

fn orchestrator(lessons: &Lessons, config: Config) -> QueueOrchestrator<Lessons> {
    QueueOrchestrator::new(
        lessons.clone(),
        Arc::new(ExactMatchValidator),
        EngineState::new(),
        config,
    )
}

/// Walks the active run to its summary screen.
async fn play(orch: &mut QueueOrchestrator<Lessons>, answer: &str) {
    orch.dispatch(RunEvent::Advance).await.expect("intro");
    orch.dispatch(RunEvent::Answer {
        input: json!(answer),
    })
    .await
    .expect("answer");
    let step = orch.dispatch(RunEvent::Advance).await.expect("last screen");
    assert_eq!(step, Step::Phase(RunPhase::Summary));
}

/// Same as [`play`], with every event stamped at `at`.
async fn play_at(orch: &mut QueueOrchestrator<Lessons>, answer: &str, at: DateTime<Utc>) {
    orch.dispatch_at(RunEvent::Advance, at).await.expect("intro");
    orch.dispatch_at(
        RunEvent::Answer {
            input: json!(answer),
        },
        at,
    )
    .await
    .expect("answer");
    let step = orch
        .dispatch_at(RunEvent::Advance, at)
        .await
        .expect("last screen");
    assert_eq!(step, Step::Phase(RunPhase::Summary));
}

fn at(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

fn drain(events: &mut Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

fn names(events: &[EngineEvent]) -> Vec<&'static str> {
    events.iter().map(EngineEvent::event_name).collect()
}

/// Three items complete in order, each folded into the state.
#[tokio::test]
async fn test_queue_runs_items_in_order() {
    let lessons = Lessons::default();
    let mut orch = orchestrator(&lessons, config(0, false));
    let mut events = orch.events().subscribe();

    orch.start_queue(["a", "b", "c"]).await.expect("start");
    for (item, answer) in [("a", "head"), ("b", "tail"), ("c", "head")] {
        assert_eq!(orch.active().expect("open run").item_id(), item);
        play(&mut orch, answer).await;
        let step = orch.dispatch(RunEvent::Continue).await.expect("continue");
        assert!(matches!(step, Step::Exit(ref exit) if exit.item_id == item));
    }

    assert!(orch.active().is_none());
    assert!(orch.queue().is_empty());

    let seen = drain(&mut events);
    assert_eq!(
        names(&seen),
        vec![
            "run_started",
            "phase_changed",
            "run_completed",
            "queue_advanced",
            "run_started",
            "phase_changed",
            "run_completed",
            "queue_advanced",
            "run_started",
            "phase_changed",
            "run_completed",
            "queue_drained",
        ]
    );
    assert_eq!(seen[3], EngineEvent::queue_advanced("b", 2));
    assert_eq!(seen[7], EngineEvent::queue_advanced("c", 1));
    assert_eq!(seen[11], EngineEvent::queue_drained(3));

    let state = orch.into_state();
    assert_eq!(state.schedule.len(), 3);
    assert_eq!(state.schedule.get("a").expect("a").streak, 1);
    assert_eq!(state.schedule.get("b").expect("b").streak, 0);
    assert_eq!(state.ledger.len(), 1);
    assert_eq!(state.ledger.records()[0].item_id, "b");
}

/// A run that fails gets a short interval and a mistake the next run sees.
#[tokio::test]
async fn test_failed_item_comes_back_with_its_mistakes() {
    let lessons = Lessons::default();
    let mut orch = orchestrator(&lessons, config(0, false));

    orch.start_queue(["lru-cache"]).await.expect("start");
    play(&mut orch, "tail").await;
    orch.dispatch(RunEvent::Continue).await.expect("continue");

    let record = orch.state().schedule.get("lru-cache").expect("record");
    assert_eq!(record.interval.days(), 1);

    orch.start_queue(["lru-cache"]).await.expect("restart");
    let requests = lessons.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].prior_mistakes.is_empty());
    assert_eq!(requests[1].prior_mistakes.len(), 1);
    assert_eq!(requests[1].prior_mistakes[0].context_snippet, "insert at the head");
}

/// The queue pauses between items for the configured delay.
#[tokio::test(start_paused = true)]
async fn test_advance_waits_for_configured_delay() {
    let lessons = Lessons::default();
    let mut orch = orchestrator(&lessons, config(800, false));

    orch.start_queue(["a", "b"]).await.expect("start");
    play(&mut orch, "head").await;

    let before = tokio::time::Instant::now();
    orch.dispatch(RunEvent::Continue).await.expect("continue");
    let waited = before.elapsed();

    assert!(waited >= std::time::Duration::from_millis(800));
    assert_eq!(orch.active().expect("next run").item_id(), "b");
}

/// Aborting leaves the state untouched but still moves the queue on.
#[tokio::test]
async fn test_abort_discards_run_and_advances() {
    let lessons = Lessons::default();
    let mut orch = orchestrator(&lessons, config(0, false));
    let mut events = orch.events().subscribe();

    orch.start_queue(["a", "b"]).await.expect("start");
    orch.dispatch(RunEvent::Advance).await.expect("intro");
    orch.dispatch(RunEvent::Answer {
        input: json!("wrong"),
    })
    .await
    .expect("answer");
    let step = orch.dispatch(RunEvent::Abort).await.expect("abort");

    let Step::Exit(exit) = step else {
        panic!("abort should exit");
    };
    assert!(!exit.should_persist);
    assert!(exit.session_mistakes.is_empty());
    assert_eq!(exit.stats.xp, 0);

    assert!(orch.state().schedule.is_empty());
    assert!(orch.state().ledger.is_empty());
    assert_eq!(orch.active().expect("next run").item_id(), "b");

    let seen = drain(&mut events);
    assert!(seen.contains(&EngineEvent::run_completed(
        "a".to_string(),
        false,
        None,
        0,
        0
    )));
}

/// Redo asks for the next content stage and reopens the same item.
#[tokio::test]
async fn test_redo_regenerates_content() {
    let lessons = Lessons::default();
    let mut orch = orchestrator(&lessons, config(0, false));

    orch.start_queue(["two-sum"]).await.expect("start");
    play(&mut orch, "tail").await;
    let step = orch.dispatch(RunEvent::Redo).await.expect("redo");
    assert_eq!(step, Step::Regenerate);

    let active = orch.active().expect("still open");
    assert_eq!(active.phase(), RunPhase::Active);
    assert_eq!(active.stage(), 1);
    assert!(active.session_mistakes().is_empty());

    let requests = lessons.requests();
    assert_eq!(requests.iter().map(|r| r.stage).collect::<Vec<_>>(), vec![0, 1]);
    assert!(orch.state().schedule.is_empty());
}

/// A provider failure keeps the item queued until `resume` succeeds, and
/// the run that finished just before still reports its exit.
#[tokio::test]
async fn test_unavailable_content_can_be_resumed() {
    let lessons = Lessons::default();
    lessons.set_offline("b", true);
    let cfg = config(0, false);
    let xp_per_screen = cfg.run.xp_per_screen;
    let mut orch = orchestrator(&lessons, cfg);
    let mut events = orch.events().subscribe();

    orch.start_queue(["a", "b"]).await.expect("start");
    play(&mut orch, "head").await;
    let step = orch
        .dispatch(RunEvent::Continue)
        .await
        .expect("exit survives a failed open");

    let Step::Exit(exit) = step else {
        panic!("continue should exit");
    };
    assert_eq!(exit.item_id, "a");
    assert!(exit.should_persist);
    assert_eq!(exit.stats.xp, 2 * xp_per_screen);
    assert_eq!(exit.stats.streak_delta, 1);
    assert!(exit.session_mistakes.is_empty());

    assert!(orch.state().schedule.get("a").is_some());
    assert!(orch.active().is_none());
    assert_eq!(orch.queue().front(), Some("b"));
    assert!(names(&drain(&mut events)).contains(&"error"));

    lessons.set_offline("b", false);
    orch.resume().await.expect("resume");
    assert_eq!(orch.active().expect("reopened").item_id(), "b");
}

/// The first run of the day celebrates; later ones exit directly.
#[tokio::test]
async fn test_first_run_of_day_celebrates() {
    let lessons = Lessons::default();
    let mut orch = orchestrator(&lessons, config(0, true));

    orch.start_queue(["a", "b"]).await.expect("start");
    play(&mut orch, "head").await;
    let step = orch.dispatch(RunEvent::Continue).await.expect("continue");
    assert_eq!(step, Step::Phase(RunPhase::Celebration));

    let step = orch
        .dispatch(RunEvent::FinishCelebration)
        .await
        .expect("finish");
    let Step::Exit(exit) = step else {
        panic!("celebration should exit");
    };
    assert_eq!(exit.stats.streak_delta, 1);
    assert_eq!(orch.state().streak.count, 1);

    play(&mut orch, "head").await;
    let step = orch.dispatch(RunEvent::Continue).await.expect("continue");
    assert!(matches!(step, Step::Exit(ref exit) if exit.stats.streak_delta == 0));
}

/// Runs opened and finished on the caller's clock: time spent comes from
/// that clock, and a run accepted after midnight celebrates the new day.
#[tokio::test]
async fn test_caller_clock_across_midnight() {
    let lessons = Lessons::default();
    let mut orch = orchestrator(&lessons, config(0, true));
    let opened = at("2026-10-22T23:50:00Z");

    orch.start_queue_at(["a", "b", "c"], opened)
        .await
        .expect("start");

    // a: two minutes of work, accepted the same evening
    play_at(&mut orch, "head", opened + Duration::minutes(2)).await;
    let accepted = opened + Duration::minutes(3);
    let step = orch
        .dispatch_at(RunEvent::Continue, accepted)
        .await
        .expect("continue");
    assert_eq!(step, Step::Phase(RunPhase::Celebration));
    let Step::Exit(exit) = orch
        .dispatch_at(RunEvent::FinishCelebration, accepted)
        .await
        .expect("finish")
    else {
        panic!("celebration should exit");
    };
    assert_eq!(exit.time_spent_secs(), 120);
    assert_eq!(exit.stats.streak_delta, 1);
    let a = orch.state().schedule.get("a").expect("a");
    assert_eq!(a.history[0].time_spent_secs, 120);

    // b: opened at 23:53, summary at 23:59, accepted after midnight
    assert_eq!(orch.active().expect("b open").item_id(), "b");
    play_at(&mut orch, "head", at("2026-10-22T23:59:00Z")).await;
    let after_midnight = at("2026-10-23T00:05:00Z");
    let step = orch
        .dispatch_at(RunEvent::Continue, after_midnight)
        .await
        .expect("continue");
    assert_eq!(step, Step::Phase(RunPhase::Celebration));
    let Step::Exit(exit) = orch
        .dispatch_at(RunEvent::FinishCelebration, after_midnight)
        .await
        .expect("finish")
    else {
        panic!("celebration should exit");
    };
    assert_eq!(exit.time_spent_secs(), 360);
    assert_eq!(exit.stats.streak_delta, 1);

    let streak = orch.state().streak;
    assert_eq!(streak.count, 2);
    assert_eq!(streak.last_completed, NaiveDate::from_ymd_opt(2026, 10, 23));

    // c: second completion of the new day
    play_at(&mut orch, "head", after_midnight + Duration::minutes(1)).await;
    let step = orch
        .dispatch_at(RunEvent::Continue, after_midnight + Duration::minutes(2))
        .await
        .expect("continue");
    assert!(matches!(step, Step::Exit(ref exit) if exit.stats.streak_delta == 0));
    assert_eq!(orch.state().streak.count, 2);
}

/// Practice runs go through the repair loop and report through the callback.
#[test]
fn test_practice_run_repairs_and_reports() {
    let received: Arc<Mutex<Option<(u32, bool, Vec<MistakeRecord>)>>> = Arc::default();
    let sink = Arc::clone(&received);

    let mut config = Config::default();
    config.run.celebrate_daily_streak = false;
    let mut session = RunSession::new(
        "lru-cache",
        RunMode::Practice,
        lesson("lru-cache"),
        Arc::new(ExactMatchValidator),
        Utc::now(),
    )
    .with_settings(config.run.clone())
    .on_complete(move |stats, persist, mistakes| {
        *sink.lock().expect("sink") = Some((stats.xp, persist, mistakes.to_vec()));
    });

    session.handle(RunEvent::Advance).expect("intro");
    session
        .handle(RunEvent::Answer {
            input: json!("tail"),
        })
        .expect("answer");
    assert_eq!(
        session.handle(RunEvent::Advance).expect("advance"),
        Step::Phase(RunPhase::RepairIntro)
    );
    assert_eq!(
        session.handle(RunEvent::StartRepair).expect("repair"),
        Step::Phase(RunPhase::RepairLoop)
    );
    assert_eq!(session.pending_repairs(), 1);
    session
        .handle(RunEvent::Answer {
            input: json!("head"),
        })
        .expect("repair answer");
    assert_eq!(
        session.handle(RunEvent::Advance).expect("advance"),
        Step::Phase(RunPhase::Summary)
    );

    let step = session.handle(RunEvent::Continue).expect("continue");
    assert!(matches!(step, Step::Exit(ref exit) if exit.should_persist));

    let (xp, persist, mistakes) = received
        .lock()
        .expect("received")
        .take()
        .expect("callback fired");
    // two screens plus one correct repair
    assert_eq!(xp, 2 * config.run.xp_per_screen + config.run.xp_per_repair);
    assert!(persist);
    assert_eq!(mistakes.len(), 1);
    assert_eq!(mistakes[0].question_kind, QuestionKind::FillIn);
}
