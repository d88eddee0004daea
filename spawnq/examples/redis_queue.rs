//! Priority queue backed by Redis.
//!
//! Enqueues a few payloads in different bands, pages through them and pops
//! the high band with the atomic dequeue.
//!
//! Requires a running Redis; set `REDIS_URL` to override the default
//! `redis://127.0.0.1:6379/`.
//!
//! ```bash
//! cargo run --example redis_queue --features redis
//! ```

use spawnq::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut config = QueueConfig {
        key: "spawnq:example".to_string(),
        ..QueueConfig::default()
    };
    if let Ok(url) = std::env::var("REDIS_URL") {
        config.redis_url = url;
    }

    let store = RedisOrderedStore::from_config(&config)?;
    let queue = PriorityQueue::new(store, config.key.clone());
    queue.drain().await?;

    for (band, name) in [
        (PriorityBand::Low, "nightly-report"),
        (PriorityBand::High, "interactive-a"),
        (PriorityBand::Medium, "batch-etl"),
        (PriorityBand::High, "interactive-b"),
    ] {
        queue.enqueue_json(band, &name).await?;
    }

    let waiting: Vec<String> = queue.peek_json(ScoreRange::all(), 0, 10).await?;
    println!("waiting in dispatch order: {waiting:?}");

    loop {
        match queue
            .dequeue_json::<String>(PriorityBand::High.range())
            .await
        {
            Ok(name) => println!("dequeued {name}"),
            Err(err) if err.is_empty() => break,
            Err(err) => return Err(err.into()),
        }
    }

    println!("left in queue: {}", queue.size().await?);
    queue.drain().await?;
    Ok(())
}
