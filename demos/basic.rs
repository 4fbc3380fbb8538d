//! # Demo: basic
//!
//! Supervises a handful of `sh`-free invocations of standard Unix tools.
//!
//! Shows how to:
//! - Configure a [`Supervisor`] with a small concurrency limit and breaker threshold.
//! - Attach the built-in [`LogWriter`] and a closure listener.
//! - Tell setup problems ([`SupervisorError::Spawn`]) apart from failed runs.
//!
//! ## Flow
//! ```text
//! 6 × execute("sleep", ["0.2"]) ──► 2 run, 4 queue (queue:change) ──► drain FIFO
//! 3 × execute("false")          ──► Execution errors ──► circuit:change closed → open
//! execute("echo", ["hi"])       ──► CircuitOpen (no process spawned)
//! reset_circuit()               ──► circuit:change open → closed
//! execute("echo", ["hi"])       ──► "hi\n"
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example basic
//! ```

use std::sync::Arc;
use std::time::Duration;

use cmdvisor::{
    EventKind, ExecOptions, LogWriter, Subscribe, Supervisor, SupervisorConfig, SupervisorError,
};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut cfg = SupervisorConfig::default();
    cfg.max_concurrent = 2;
    cfg.timeout = Duration::from_secs(5);
    cfg.circuit_breaker.threshold = 3;
    cfg.circuit_breaker.reset_timeout = Duration::from_secs(10);

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let sup = Supervisor::builder(cfg).with_subscribers(subs).build();

    sup.on(EventKind::CircuitChange, |ev| {
        println!("[listener] circuit {:?} -> {:?}", ev.from, ev.to);
    });

    // Burst: six sleeps, two at a time. Distinct arguments keep dedup out of the way.
    let burst: Vec<_> = (0..6)
        .map(|i| {
            let sup = Arc::clone(&sup);
            tokio::spawn(async move {
                let secs = format!("0.{}", i + 1);
                sup.execute("sleep", [secs]).await
            })
        })
        .collect();
    for h in burst {
        let res = h.await?;
        println!("[main] sleep finished ok={}", res.is_ok());
    }

    // Persistent failure trips the breaker.
    for _ in 0..3 {
        if let Err(e) = sup.execute("false", Vec::<String>::new()).await {
            println!("[main] false: {e} ({})", e.as_label());
        }
    }
    println!("[main] stats: {:?}", sup.stats());

    match sup.execute("echo", ["hi"]).await {
        Err(SupervisorError::CircuitOpen) => println!("[main] rejected fast: circuit open"),
        other => println!("[main] unexpected: {other:?}"),
    }

    sup.reset_circuit();
    let out = sup
        .execute_with("echo", ["hi"], ExecOptions::with_timeout(Duration::from_secs(1)))
        .await?;
    print!("[main] echo said: {}", out.stdout);

    match sup.execute("definitely-not-installed", ["--version"]).await {
        Err(SupervisorError::Spawn(e)) if e.is_not_found() => {
            println!("[main] setup problem: {e}");
        }
        other => println!("[main] unexpected: {other:?}"),
    }

    sup.shutdown().await?;
    Ok(())
}
