//! Priority queue over a live Redis sorted set.
//!
//! Skipped unless `TEST_REDIS` holds a connection URL.
//! Run with: `TEST_REDIS=redis://127.0.0.1/ cargo test --test redis_store --features redis`

#![cfg(feature = "redis")]

use std::collections::HashSet;
use std::sync::Arc;

use spawnq::*;
use uuid::Uuid;

fn redis_queue() -> Option<PriorityQueue<RedisOrderedStore>> {
    let Ok(url) = std::env::var("TEST_REDIS") else {
        eprintln!("TEST_REDIS not set; skipping");
        return None;
    };
    let store = RedisOrderedStore::new(&url).expect("valid TEST_REDIS url");
    let key = format!("spawnq:test:{}", Uuid::new_v4().simple());
    Some(PriorityQueue::new(store, key))
}

#[tokio::test]
async fn test_redis_queue_orders_by_score() {
    let Some(queue) = redis_queue() else {
        return;
    };

    queue.enqueue(10.0, b"a").await.unwrap();
    queue.enqueue(5.0, b"b").await.unwrap();
    queue.enqueue(20.0, b"c").await.unwrap();

    let peeked = queue
        .peek_range(ScoreRange::new(0.0, 100.0), 0, 2)
        .await
        .unwrap();
    assert_eq!(peeked, vec![b"b".to_vec(), b"a".to_vec()]);
    assert_eq!(
        queue
            .dequeue_highest(ScoreRange::new(0.0, 100.0))
            .await
            .unwrap(),
        b"b".to_vec()
    );
    assert_eq!(queue.size().await.unwrap(), 2);
    assert_eq!(queue.all().await.unwrap().len(), 2);

    assert_eq!(queue.remove(b"missing").await.unwrap(), 0);
    assert_eq!(queue.drain().await.unwrap(), 2);
    assert_eq!(queue.size().await.unwrap(), 0);
    assert!(
        queue
            .dequeue_highest(ScoreRange::all())
            .await
            .unwrap_err()
            .is_empty()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_redis_pop_is_atomic_under_contention() {
    let Some(queue) = redis_queue() else {
        return;
    };
    let queue = Arc::new(queue);
    for i in 0..100u32 {
        queue.enqueue(f64::from(i), &i.to_be_bytes()).await.unwrap();
    }

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let queue = Arc::clone(&queue);
        tasks.push(tokio::spawn(async move {
            let mut taken = Vec::new();
            while let Ok(payload) = queue.dequeue_highest(ScoreRange::all()).await {
                taken.push(payload);
            }
            taken
        }));
    }

    let mut seen = HashSet::new();
    for task in tasks {
        for payload in task.await.unwrap() {
            assert!(seen.insert(payload), "entry dequeued twice");
        }
    }
    assert_eq!(seen.len(), 100);
    queue.drain().await.unwrap();
}
