//! Queue dispatcher: descriptors flow from the queue into the spawner.

use std::sync::Arc;
use std::time::Duration;

use spawnq::*;
use spawnq_testkit::{
    FakeOrchestrator, InMemoryOrderedStore, InMemoryProxyInfoStore, InjectedFailure, notebook,
    running_notebook,
};
use tokio::time::{sleep, timeout};

type Dispatcher = QueueDispatcher<InMemoryOrderedStore, FakeOrchestrator, InMemoryProxyInfoStore>;

struct Harness {
    store: InMemoryOrderedStore,
    orchestrator: Arc<FakeOrchestrator>,
    proxy_store: Arc<InMemoryProxyInfoStore>,
    dispatcher: Dispatcher,
}

fn harness() -> Harness {
    let store = InMemoryOrderedStore::new();
    let orchestrator = Arc::new(FakeOrchestrator::new());
    let proxy_store = Arc::new(InMemoryProxyInfoStore::new());
    let queue = Arc::new(PriorityQueue::new(store.clone(), "spawnq:dispatch"));
    let spawner = SpawnerBuilder::new(SpawnerConfig::default())
        .with_orchestrator(Arc::clone(&orchestrator))
        .with_proxy_store(Arc::clone(&proxy_store))
        .build()
        .unwrap();
    let dispatcher = QueueDispatcher::new(queue, Arc::new(spawner));
    Harness {
        store,
        orchestrator,
        proxy_store,
        dispatcher,
    }
}

async fn eventually<F: Fn() -> bool>(check: F) {
    timeout(Duration::from_secs(5), async {
        while !check() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_dispatch_next_starts_highest_priority_first() {
    let h = harness();
    let queue = h.dispatcher.queue();
    let low = running_notebook();
    let high = running_notebook();
    queue.enqueue_json(PriorityBand::Low, &low).await.unwrap();
    queue.enqueue_json(PriorityBand::High, &high).await.unwrap();

    let handle = match h.dispatcher.dispatch_next(ScoreRange::all()).await.unwrap() {
        DispatchStatus::Started(handle) => handle,
        other => panic!("expected a started workload, got {other:?}"),
    };
    assert_eq!(handle.name(), format!("pod-{}", high.id));
    assert_eq!(queue.size().await.unwrap(), 1);

    let outcome = handle.wait().await.unwrap();
    assert_eq!(outcome.exit, WatchExit::Terminal(WorkloadPhase::Running));
}

#[tokio::test]
async fn test_dispatch_next_respects_range() {
    let h = harness();
    let queue = h.dispatcher.queue();
    queue
        .enqueue_json(PriorityBand::Low, &running_notebook())
        .await
        .unwrap();

    let status = h
        .dispatcher
        .dispatch_next(ScoreRange::through(PriorityBand::Medium))
        .await
        .unwrap();
    assert!(matches!(status, DispatchStatus::Idle));
    assert_eq!(queue.size().await.unwrap(), 1);
}

#[tokio::test]
async fn test_undecodable_entry_is_discarded() {
    let h = harness();
    let queue = h.dispatcher.queue();
    queue
        .enqueue(PriorityBand::High.score(), b"not json")
        .await
        .unwrap();

    let status = h.dispatcher.dispatch_next(ScoreRange::all()).await.unwrap();
    assert!(matches!(status, DispatchStatus::Discarded));
    assert_eq!(queue.size().await.unwrap(), 0);
    assert!(h.orchestrator.submitted().is_empty());
}

#[tokio::test]
async fn test_rejected_descriptor_is_not_requeued() {
    let h = harness();
    let queue = h.dispatcher.queue();
    h.orchestrator.fail_submit(Some(InjectedFailure::Transport));
    queue
        .enqueue_json(PriorityBand::High, &running_notebook())
        .await
        .unwrap();

    let status = h.dispatcher.dispatch_next(ScoreRange::all()).await.unwrap();
    assert!(matches!(
        status,
        DispatchStatus::Rejected(SpawnError::Submission { .. })
    ));
    assert_eq!(queue.size().await.unwrap(), 0);
}

#[tokio::test]
async fn test_store_outage_is_an_error() {
    let h = harness();
    h.store.set_unavailable(true);

    let err = h
        .dispatcher
        .dispatch_next(ScoreRange::all())
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::StoreUnavailable(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_pool_drains_queue_once_per_descriptor() {
    const NOTEBOOKS: usize = 20;

    let h = harness();
    let queue = h.dispatcher.queue();
    let mut ids = Vec::new();
    for _ in 0..NOTEBOOKS {
        let nb = running_notebook();
        ids.push(nb.deployment_id());
        queue.enqueue_json(PriorityBand::Medium, &nb).await.unwrap();
    }

    let config = WorkerConfig::new("pool").with_poll_interval(5);
    h.dispatcher.spawn_workers(config, 4).await;
    assert_eq!(h.dispatcher.worker_count().await, 4);

    let orchestrator = Arc::clone(&h.orchestrator);
    eventually(|| orchestrator.submitted().len() >= NOTEBOOKS).await;
    let proxy_store = Arc::clone(&h.proxy_store);
    eventually(|| ids.iter().all(|id| proxy_store.get(id).is_some())).await;

    h.dispatcher.shutdown().await.unwrap();
    assert_eq!(h.dispatcher.worker_count().await, 0);

    let mut names: Vec<String> = h
        .orchestrator
        .submitted()
        .into_iter()
        .map(|spec| spec.name)
        .collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), NOTEBOOKS);
    assert_eq!(queue.size().await.unwrap(), 0);
}

#[tokio::test]
async fn test_workers_survive_store_outage() {
    let h = harness();
    let queue = h.dispatcher.queue();
    h.store.set_unavailable(true);

    let config = WorkerConfig::new("flaky")
        .with_poll_interval(5)
        .with_backoff(5);
    h.dispatcher.spawn_workers(config, 1).await;
    sleep(Duration::from_millis(30)).await;

    h.store.set_unavailable(false);
    queue
        .enqueue_json(PriorityBand::High, &notebook("jupyter/scipy-notebook"))
        .await
        .unwrap();

    let orchestrator = Arc::clone(&h.orchestrator);
    eventually(|| orchestrator.submitted().len() == 1).await;
    h.dispatcher.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_idle_workers_promptly() {
    let h = harness();
    let config = WorkerConfig::new("idle").with_poll_interval(60_000);
    h.dispatcher.spawn_workers(config, 3).await;
    sleep(Duration::from_millis(20)).await;

    timeout(Duration::from_secs(2), h.dispatcher.shutdown())
        .await
        .expect("shutdown blocked on sleeping workers")
        .unwrap();
    assert!(h.dispatcher.shutdown_token().is_cancelled());
}
