//! Simple queue example: notebooks flow from the queue into the spawner.
//!
//! Uses the in-memory ordered store, proxy info store and scripted
//! orchestrator from spawnq-testkit, so no external services are needed.
//!
//! Run with `RUST_LOG=spawnq=debug cargo run --example simple_queue` to see
//! the component spans.

use std::sync::Arc;
use std::time::Duration;

use spawnq::*;
use spawnq_testkit::{
    FakeOrchestrator, InMemoryOrderedStore, InMemoryProxyInfoStore, UNRESOLVABLE_IMAGE, notebook,
};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let queue = Arc::new(PriorityQueue::new(
        InMemoryOrderedStore::new(),
        QueueConfig::default().key,
    ));
    let orchestrator = Arc::new(FakeOrchestrator::new());
    let proxy_store = Arc::new(InMemoryProxyInfoStore::new());

    let (builder, events) = SpawnerBuilder::new(SpawnerConfig::default())
        .with_orchestrator(Arc::clone(&orchestrator))
        .with_proxy_store(Arc::clone(&proxy_store))
        .with_event_bus();
    let spawner = Arc::new(builder.build()?);

    let mut lifecycle = events.subscribe();
    tokio::spawn(async move {
        loop {
            match lifecycle.recv().await {
                Ok(event) => println!("[EVENT] {} {:?}", event.meta.workload, event.payload),
                Err(RecvError::Lagged(skipped)) => println!("[EVENT] skipped {skipped} events"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let notebooks = [
        (PriorityBand::Low, notebook("jupyter/minimal-notebook")),
        (PriorityBand::High, notebook("jupyter/scipy-notebook")),
        (PriorityBand::Medium, notebook(UNRESOLVABLE_IMAGE)),
    ];
    for (band, descriptor) in &notebooks {
        queue.enqueue_json(*band, descriptor).await?;
        println!("[QUEUE] {} queued at {}", descriptor.id, band.as_str());
    }

    let snapshot = queue.snapshot().await?;
    println!(
        "[QUEUE] depth {} (high {}, medium {}, low {})",
        snapshot.total,
        snapshot.band(PriorityBand::High),
        snapshot.band(PriorityBand::Medium),
        snapshot.band(PriorityBand::Low)
    );

    let dispatcher = QueueDispatcher::new(Arc::clone(&queue), Arc::clone(&spawner));
    dispatcher
        .spawn_workers(WorkerConfig::new("demo").with_poll_interval(20), 2)
        .await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    dispatcher.shutdown().await?;

    for (_, descriptor) in &notebooks {
        match spawner.proxy_info(descriptor).await? {
            Some(info) => println!(
                "[PROXY] {} phase={} address={} reason={}",
                descriptor.id,
                info.phase.as_str(),
                info.address,
                info.reason
            ),
            None => println!("[PROXY] {} not persisted", descriptor.id),
        }
        spawner.stop(descriptor).await?;
    }

    let cancelled = spawner.shutdown().await;
    println!("[DONE] cancelled {cancelled} remaining watchers");
    Ok(())
}
