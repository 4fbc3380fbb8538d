use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use super::supervisor::advance_watermark;
use crate::{
    CircuitState, CommandResult, Event, EventKind, ExecOptions, ExecRequest, Executor,
    RuntimeError, SpawnError, Subscribe, Supervisor, SupervisorConfig, SupervisorError,
    exec::{CANCELLED_EXIT_CODE, TIMEOUT_EXIT_CODE},
};

/// Executor whose behavior is picked by the command name:
///
/// - `ok`: exits 0 echoing its arguments
/// - `fail`: exits 1
/// - `block`: waits for a gate permit (or cancellation), then exits 0
/// - `stubborn`: waits for a gate permit and ignores cancellation
/// - `hang`: runs until its timeout (reported as timed out) or cancellation
/// - `missing`: cannot be spawned
struct Script {
    gate: Semaphore,
    spawned: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
    started: Mutex<Vec<String>>,
}

impl Script {
    fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            spawned: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
        }
    }

    fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

fn exited(code: i32, stdout: String) -> CommandResult {
    CommandResult {
        exit_code: code,
        stdout,
        stderr: if code == 0 { String::new() } else { "failed\n".into() },
        duration_ms: 1,
        timed_out: false,
    }
}

#[async_trait]
impl Executor for Script {
    async fn run(&self, req: ExecRequest) -> Result<CommandResult, SpawnError> {
        if req.command == "missing" {
            let io = std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory");
            return Err(SpawnError::from_io(req.command, &io));
        }

        self.spawned.fetch_add(1, Ordering::SeqCst);
        let label = req.args.first().cloned().unwrap_or_else(|| req.command.clone());
        self.started.lock().unwrap().push(label);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let cancelled = exited(CANCELLED_EXIT_CODE, String::new());
        let result = match req.command.as_str() {
            "ok" => exited(0, format!("{}\n", req.args.join(" "))),
            "fail" => exited(1, String::new()),
            "block" => tokio::select! {
                permit = self.gate.acquire() => {
                    permit.unwrap().forget();
                    exited(0, "unblocked\n".into())
                }
                _ = req.cancel.cancelled() => cancelled,
            },
            "stubborn" => {
                self.gate.acquire().await.unwrap().forget();
                exited(0, String::new())
            }
            "hang" => {
                let limit = req.timeout.unwrap_or(Duration::from_secs(3600));
                tokio::select! {
                    _ = tokio::time::sleep(limit) => CommandResult {
                        exit_code: TIMEOUT_EXIT_CODE,
                        stdout: "partial\n".into(),
                        stderr: String::new(),
                        duration_ms: limit.as_millis() as u64,
                        timed_out: true,
                    },
                    _ = req.cancel.cancelled() => cancelled,
                }
            }
            other => panic!("unscripted command {other}"),
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(result)
    }
}

fn config(max_concurrent: usize, threshold: u32, reset: Duration) -> SupervisorConfig {
    let mut cfg = SupervisorConfig::default();
    cfg.max_concurrent = max_concurrent;
    cfg.circuit_breaker.threshold = threshold;
    cfg.circuit_breaker.reset_timeout = reset;
    cfg
}

fn scripted(cfg: SupervisorConfig) -> (Arc<Supervisor>, Arc<Script>) {
    let script = Arc::new(Script::new());
    let sup = Supervisor::builder(cfg)
        .with_executor(script.clone())
        .build();
    (sup, script)
}

fn spawn_exec(
    sup: &Arc<Supervisor>,
    command: &'static str,
    arg: &'static str,
) -> tokio::task::JoinHandle<Result<CommandResult, SupervisorError>> {
    let sup = Arc::clone(sup);
    tokio::spawn(async move { sup.execute(command, [arg]).await })
}

async fn until(cond: impl Fn() -> bool) {
    while !cond() {
        tokio::task::yield_now().await;
    }
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

#[tokio::test]
async fn opens_after_threshold_and_fails_fast_without_spawning() {
    let (sup, script) = scripted(config(4, 3, Duration::from_secs(60)));

    for _ in 0..3 {
        let err = sup.execute("fail", ["x"]).await.unwrap_err();
        assert!(matches!(err, SupervisorError::Execution { .. }));
    }
    assert_eq!(sup.circuit_state(), CircuitState::Open);
    assert_eq!(script.spawned(), 3);

    let err = sup.execute("ok", ["x"]).await.unwrap_err();
    assert!(matches!(err, SupervisorError::CircuitOpen));
    assert!(err.is_retryable());
    assert_eq!(script.spawned(), 3);
}

#[tokio::test]
async fn single_slot_threshold_two_scenario() {
    let (sup, script) = scripted(config(1, 2, Duration::from_secs(60)));

    assert!(matches!(
        sup.execute("fail", Vec::<String>::new()).await,
        Err(SupervisorError::Execution { .. })
    ));
    assert_eq!(sup.circuit_state(), CircuitState::Closed);
    assert!(matches!(
        sup.execute("fail", Vec::<String>::new()).await,
        Err(SupervisorError::Execution { .. })
    ));
    assert_eq!(sup.circuit_state(), CircuitState::Open);
    assert!(matches!(
        sup.execute("fail", Vec::<String>::new()).await,
        Err(SupervisorError::CircuitOpen)
    ));
    assert_eq!(script.spawned(), 2);
}

#[tokio::test(start_paused = true)]
async fn half_open_lets_exactly_one_trial_through() {
    let (sup, script) = scripted(config(4, 1, Duration::from_millis(100)));
    sup.execute("fail", ["x"]).await.unwrap_err();
    assert_eq!(sup.circuit_state(), CircuitState::Open);

    tokio::time::advance(Duration::from_millis(100)).await;
    let trial = spawn_exec(&sup, "block", "trial");
    until(|| script.spawned() == 2).await;
    assert_eq!(sup.circuit_state(), CircuitState::HalfOpen);

    let second = sup.execute("ok", ["second"]).await;
    assert!(matches!(second, Err(SupervisorError::CircuitOpen)));
    assert_eq!(script.spawned(), 2);

    script.release(1);
    trial.await.unwrap().unwrap();
    assert_eq!(sup.circuit_state(), CircuitState::Closed);
    assert_eq!(sup.stats().failure_count, 0);
}

#[tokio::test(start_paused = true)]
async fn failed_trial_reopens_the_circuit() {
    let (sup, _script) = scripted(config(4, 1, Duration::from_millis(100)));
    sup.execute("fail", ["1"]).await.unwrap_err();

    tokio::time::advance(Duration::from_millis(100)).await;
    let err = sup.execute("fail", ["2"]).await.unwrap_err();
    assert!(matches!(err, SupervisorError::Execution { .. }));
    assert_eq!(sup.circuit_state(), CircuitState::Open);
    assert!(matches!(
        sup.execute("ok", ["3"]).await,
        Err(SupervisorError::CircuitOpen)
    ));

    tokio::time::advance(Duration::from_millis(100)).await;
    sup.execute("ok", ["4"]).await.unwrap();
    assert_eq!(sup.circuit_state(), CircuitState::Closed);
}

#[tokio::test]
async fn excess_requests_queue_and_never_exceed_the_limit() {
    let (sup, script) = scripted(config(2, 5, Duration::from_secs(60)));

    let handles: Vec<_> = ["a", "b", "c", "d", "e"]
        .into_iter()
        .map(|arg| spawn_exec(&sup, "block", arg))
        .collect();
    until(|| script.spawned() == 2 && sup.stats().queued_count == 3).await;

    let stats = sup.stats();
    assert_eq!(stats.active_count, 2);
    assert_eq!(stats.queued_count, 3);

    script.release(5);
    for h in handles {
        h.await.unwrap().unwrap();
    }
    assert_eq!(script.peak.load(Ordering::SeqCst), 2);
    assert_eq!(sup.stats().active_count, 0);
}

#[tokio::test]
async fn queued_commands_start_in_submission_order() {
    let (sup, script) = scripted(config(1, 5, Duration::from_secs(60)));

    let first = spawn_exec(&sup, "block", "first");
    until(|| script.spawned() == 1).await;

    let mut handles = vec![first];
    for (n, arg) in ["A", "B", "C"].into_iter().enumerate() {
        handles.push(spawn_exec(&sup, "block", arg));
        until(|| sup.stats().queued_count == n + 1).await;
    }
    let queued: Vec<_> = sup.queued().into_iter().map(|p| p.args[0].clone()).collect();
    assert_eq!(queued, ["A", "B", "C"]);

    script.release(4);
    for h in handles {
        h.await.unwrap().unwrap();
    }
    assert_eq!(script.started(), ["first", "A", "B", "C"]);
}

#[tokio::test]
async fn clear_queue_rejects_waiting_and_spares_running() {
    let (sup, script) = scripted(config(1, 5, Duration::from_secs(60)));

    let running = spawn_exec(&sup, "block", "running");
    until(|| script.spawned() == 1).await;
    let q1 = spawn_exec(&sup, "block", "q1");
    let q2 = spawn_exec(&sup, "block", "q2");
    until(|| sup.stats().queued_count == 2).await;

    assert_eq!(sup.clear_queue(), 2);
    assert!(matches!(q1.await.unwrap(), Err(SupervisorError::Cancelled)));
    assert!(matches!(q2.await.unwrap(), Err(SupervisorError::Cancelled)));

    script.release(1);
    running.await.unwrap().unwrap();
    assert_eq!(script.spawned(), 1);
    assert_eq!(sup.stats().failure_count, 0);
}

#[tokio::test(start_paused = true)]
async fn timeout_is_reported_with_partial_output_and_counted() {
    let (sup, _script) = scripted(config(4, 1, Duration::from_secs(60)));

    let err = sup
        .execute_with(
            "hang",
            ["x"],
            ExecOptions::with_timeout(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
    match &err {
        SupervisorError::Timeout { timeout, result } => {
            assert_eq!(*timeout, Duration::from_millis(50));
            assert!(result.timed_out);
            assert_eq!(result.stdout, "partial\n");
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(sup.circuit_state(), CircuitState::Open);
}

#[tokio::test]
async fn spawn_failure_is_distinct_and_counted() {
    let (sup, script) = scripted(config(4, 5, Duration::from_secs(60)));

    match sup.execute("missing", ["x"]).await {
        Err(SupervisorError::Spawn(e)) => assert!(e.is_not_found()),
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(sup.stats().failure_count, 1);
    assert_eq!(script.spawned(), 0);
}

#[tokio::test]
async fn reset_circuit_closes_from_any_state() {
    let (sup, _script) = scripted(config(4, 1, Duration::from_secs(60)));

    sup.reset_circuit();
    assert_eq!(sup.circuit_state(), CircuitState::Closed);

    sup.execute("fail", ["x"]).await.unwrap_err();
    assert_eq!(sup.circuit_state(), CircuitState::Open);
    sup.reset_circuit();
    let stats = sup.stats();
    assert_eq!(stats.circuit_state, CircuitState::Closed);
    assert_eq!(stats.failure_count, 0);
    sup.execute("ok", ["x"]).await.unwrap();
}

#[tokio::test]
async fn identical_in_flight_requests_share_one_execution() {
    let (sup, script) = scripted(config(4, 5, Duration::from_secs(60)));

    let a = spawn_exec(&sup, "block", "same");
    let b = spawn_exec(&sup, "block", "same");
    until(|| script.spawned() == 1).await;
    tokio::task::yield_now().await;

    script.release(1);
    let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
    assert_eq!(a, b);
    assert_eq!(script.spawned(), 1);

    // Finished executions are forgotten.
    script.release(1);
    sup.execute("block", ["same"]).await.unwrap();
    assert_eq!(script.spawned(), 2);
}

#[tokio::test]
async fn dedup_can_be_disabled() {
    let mut cfg = config(4, 5, Duration::from_secs(60));
    cfg.dedup = false;
    let (sup, script) = scripted(cfg);

    let a = spawn_exec(&sup, "block", "same");
    let b = spawn_exec(&sup, "block", "same");
    until(|| script.spawned() == 2).await;
    script.release(2);
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();
}

#[tokio::test]
async fn events_follow_the_invocation_lifecycle() {
    let (sup, _script) = scripted(config(4, 1, Duration::from_secs(60)));
    let mut rx = sup.events();

    sup.execute("ok", ["x"]).await.unwrap();
    sup.execute("fail", ["y"]).await.unwrap_err();
    sup.execute("ok", ["z"]).await.unwrap_err();

    let events = drain(&mut rx);
    let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        [
            EventKind::CommandStart,
            EventKind::CommandComplete,
            EventKind::CommandStart,
            EventKind::CircuitChange,
            EventKind::CommandError,
            EventKind::CommandError,
        ]
    );

    let seqs: Vec<_> = events.iter().map(|e| e.seq).collect();
    assert!(seqs.windows(2).all(|w| w[0] < w[1]));

    assert_eq!(events[1].result.as_ref().unwrap().stdout, "x\n");
    assert_eq!(events[0].id, events[1].id);
    assert_eq!(events[3].to, Some(CircuitState::Open));
    assert_eq!(events[4].result.as_ref().unwrap().exit_code, 1);
    assert!(matches!(
        events[5].error,
        Some(SupervisorError::CircuitOpen)
    ));
    assert_eq!(events[5].args.as_deref(), Some(&["z".to_string()][..]));
}

#[tokio::test]
async fn panicking_listener_does_not_disturb_others() {
    let (sup, _script) = scripted(config(4, 5, Duration::from_secs(60)));
    let mut rx = sup.events();
    let hits = Arc::new(AtomicUsize::new(0));

    sup.on(EventKind::CommandComplete, |_| panic!("listener failure"));
    let h = Arc::clone(&hits);
    sup.on(EventKind::CommandComplete, move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });

    sup.execute("ok", ["1"]).await.unwrap();
    sup.execute("ok", ["2"]).await.unwrap();
    until(|| hits.load(Ordering::SeqCst) == 2).await;

    assert_eq!(sup.stats().failure_count, 0);
    assert_eq!(sup.circuit_state(), CircuitState::Closed);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(
        drain(&mut rx)
            .iter()
            .any(|e| e.kind == EventKind::SubscriberPanicked)
    );
}

#[tokio::test]
async fn off_stops_delivery() {
    let (sup, _script) = scripted(config(4, 5, Duration::from_secs(60)));
    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    let id = sup.on(EventKind::CommandStart, move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });

    sup.execute("ok", ["1"]).await.unwrap();
    until(|| hits.load(Ordering::SeqCst) == 1).await;

    assert!(sup.off(id));
    assert!(!sup.off(id));
    sup.execute("ok", ["2"]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn shutdown_kills_running_and_rejects_queued() {
    let (sup, script) = scripted(config(1, 1, Duration::from_secs(60)));

    let running = spawn_exec(&sup, "block", "running");
    until(|| script.spawned() == 1).await;
    let queued = spawn_exec(&sup, "block", "queued");
    until(|| sup.stats().queued_count == 1).await;

    sup.shutdown().await.unwrap();
    assert!(sup.is_shut_down());
    assert!(matches!(running.await.unwrap(), Err(SupervisorError::Shutdown)));
    assert!(matches!(queued.await.unwrap(), Err(SupervisorError::Shutdown)));

    // A killed run is not a breaker failure.
    assert_eq!(sup.circuit_state(), CircuitState::Closed);
    assert!(matches!(
        sup.execute("ok", ["late"]).await,
        Err(SupervisorError::Shutdown)
    ));
    assert_eq!(script.spawned(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_reports_processes_outliving_the_grace() {
    let mut cfg = config(2, 5, Duration::from_secs(60));
    cfg.grace = Duration::from_millis(50);
    let (sup, script) = scripted(cfg);

    let stuck = spawn_exec(&sup, "stubborn", "x");
    until(|| script.spawned() == 1).await;

    match sup.shutdown().await {
        Err(RuntimeError::GraceExceeded { grace, active }) => {
            assert_eq!(grace, Duration::from_millis(50));
            assert_eq!(active, 1);
        }
        other => panic!("unexpected: {other:?}"),
    }

    script.release(1);
    stuck.await.unwrap().unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn real_process_round_trip() {
    let sup = Supervisor::new(SupervisorConfig::default());

    let out = sup.execute("echo", ["hi"]).await.unwrap();
    assert_eq!(out.exit_code, 0);
    assert_eq!(out.stdout, "hi\n");
    assert!(!out.timed_out);

    match sup.execute("cmdvisor-no-such-binary", ["x"]).await {
        Err(SupervisorError::Spawn(e)) => assert!(e.is_not_found()),
        other => panic!("unexpected: {other:?}"),
    }
    sup.shutdown().await.unwrap();
}

#[test]
fn forwarded_watermark_never_moves_backwards() {
    let (tx, rx) = tokio::sync::watch::channel(0u64);
    assert!(advance_watermark(&tx, 5));
    assert!(!advance_watermark(&tx, 3));
    assert!(!advance_watermark(&tx, 5));
    assert_eq!(*rx.borrow(), 5);
    assert!(advance_watermark(&tx, 6));
    assert_eq!(*rx.borrow(), 6);
}

struct Counter(AtomicUsize);

#[async_trait]
impl Subscribe for Counter {
    async fn on_event(&self, _ev: &Event) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
    fn name(&self) -> &'static str {
        "counter"
    }
    fn queue_capacity(&self) -> usize {
        1 << 16
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn shutdown_flushes_every_event_under_parallel_load() {
    let mut cfg = config(3, 1_000, Duration::from_secs(60));
    cfg.grace = Duration::from_secs(5);
    let counter = Arc::new(Counter(AtomicUsize::new(0)));
    let script = Arc::new(Script::new());
    let subs: Vec<Arc<dyn Subscribe>> = vec![counter.clone()];
    let sup = Supervisor::builder(cfg)
        .with_subscribers(subs)
        .with_executor(script.clone())
        .build();

    let calls: Vec<_> = (0..64)
        .map(|i| {
            let sup = Arc::clone(&sup);
            let cmd = if i % 3 == 0 { "fail" } else { "ok" };
            tokio::spawn(async move { sup.execute(cmd, [i.to_string()]).await })
        })
        .collect();
    for c in calls {
        let _ = c.await.unwrap();
    }

    let published = sup.bus.published();
    let started = std::time::Instant::now();
    sup.shutdown().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2), "flush stalled");
    assert_eq!(counter.0.load(Ordering::SeqCst) as u64, published);
}
