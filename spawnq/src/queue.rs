use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{Instrument, Span};

use crate::band::{PriorityBand, ScoreRange};
use crate::error::{QueueError, StoreError};
use crate::telemetry;

/// Transport to a remote score-ordered collection.
///
/// Implementors must make [`OrderedStore::pop_min_in_range`] atomic on the
/// server side: observing and removing the lowest-scored member is one
/// indivisible step, so two concurrent callers never receive the same member.
#[async_trait]
pub trait OrderedStore: Send + Sync {
    /// Add `member` at `score`. Returns how many members were newly added
    /// (0 when the member already existed and only its score changed).
    async fn add(&self, key: &str, score: f64, member: &[u8]) -> Result<u64, StoreError>;

    /// Members with `range.min <= score <= range.max`, ascending, paged.
    async fn range_by_score(
        &self,
        key: &str,
        range: ScoreRange,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Vec<u8>>, StoreError>;

    /// Remove `member`; returns the number of members removed.
    async fn remove(&self, key: &str, member: &[u8]) -> Result<u64, StoreError>;

    /// Remove every member under `key`; returns how many there were.
    async fn remove_all(&self, key: &str) -> Result<u64, StoreError>;

    /// Number of members under `key`.
    async fn cardinality(&self, key: &str) -> Result<u64, StoreError>;

    /// Atomically remove and return the lowest-scored member in `range`.
    async fn pop_min_in_range(
        &self,
        key: &str,
        range: ScoreRange,
    ) -> Result<Option<Vec<u8>>, StoreError>;
}

#[async_trait]
impl<S: OrderedStore + ?Sized> OrderedStore for Arc<S> {
    async fn add(&self, key: &str, score: f64, member: &[u8]) -> Result<u64, StoreError> {
        (**self).add(key, score, member).await
    }

    async fn range_by_score(
        &self,
        key: &str,
        range: ScoreRange,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Vec<u8>>, StoreError> {
        (**self).range_by_score(key, range, offset, limit).await
    }

    async fn remove(&self, key: &str, member: &[u8]) -> Result<u64, StoreError> {
        (**self).remove(key, member).await
    }

    async fn remove_all(&self, key: &str) -> Result<u64, StoreError> {
        (**self).remove_all(key).await
    }

    async fn cardinality(&self, key: &str) -> Result<u64, StoreError> {
        (**self).cardinality(key).await
    }

    async fn pop_min_in_range(
        &self,
        key: &str,
        range: ScoreRange,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).pop_min_in_range(key, range).await
    }
}

/// Priority queue over a single key of an [`OrderedStore`].
///
/// Payloads are opaque bytes. Entries are ordered by ascending score and the
/// lowest score is dispatched first. Equal scores fall back to whatever order
/// the store keeps; nothing here depends on it.
pub struct PriorityQueue<S> {
    store: S,
    key: String,
    span: Span,
}

impl<S: OrderedStore> std::fmt::Debug for PriorityQueue<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityQueue")
            .field("key", &self.key)
            .field("store_type", &std::any::type_name::<S>())
            .finish()
    }
}

impl<S: OrderedStore> PriorityQueue<S> {
    pub fn new(store: S, key: impl Into<String>) -> Self {
        let key = key.into();
        let span = tracing::info_span!("spawnq.queue", key = %key);
        Self { store, key, span }
    }

    /// Replace the component span that operation spans are parented to.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Insert `payload` at `score`. Returns the number of newly added entries.
    pub async fn enqueue(&self, score: f64, payload: &[u8]) -> Result<u64, QueueError> {
        let span = telemetry::enqueue_span(&self.span, &self.key, score);
        let added = self
            .store
            .add(&self.key, score, payload)
            .instrument(span)
            .await?;
        telemetry::record_entry_enqueued(&self.key, added);
        Ok(added)
    }

    /// Up to `limit` payloads within `range`, ascending by score, from `offset`.
    ///
    /// Read-only. Two calls are not isolated from concurrent writers.
    pub async fn peek_range(
        &self,
        range: ScoreRange,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Vec<u8>>, QueueError> {
        if limit == 0 || range.is_empty() {
            return Ok(Vec::new());
        }
        let members = self
            .store
            .range_by_score(&self.key, range, offset, limit)
            .await?;
        Ok(members)
    }

    /// Atomically take the lowest-scored payload within `range`.
    ///
    /// Fails with [`QueueError::QueueEmpty`] when nothing matches.
    pub async fn dequeue_highest(&self, range: ScoreRange) -> Result<Vec<u8>, QueueError> {
        if range.is_empty() {
            return Err(QueueError::QueueEmpty {
                min: range.min,
                max: range.max,
            });
        }
        let span = telemetry::dequeue_span(&self.span, &self.key, range);
        let popped = self
            .store
            .pop_min_in_range(&self.key, range)
            .instrument(span.clone())
            .await?;
        match popped {
            Some(payload) => {
                telemetry::record_entry_dequeued(&self.key);
                Ok(payload)
            }
            None => {
                tracing::debug!(parent: &span, "no entry in range");
                Err(QueueError::QueueEmpty {
                    min: range.min,
                    max: range.max,
                })
            }
        }
    }

    /// Remove every entry equal to `payload`. Absent payloads return 0.
    pub async fn remove(&self, payload: &[u8]) -> Result<u64, QueueError> {
        let removed = self.store.remove(&self.key, payload).await?;
        tracing::debug!(parent: &self.span, removed, "queue entry removed");
        Ok(removed)
    }

    /// Remove every entry in the queue.
    pub async fn drain(&self) -> Result<u64, QueueError> {
        let removed = self.store.remove_all(&self.key).await?;
        tracing::info!(parent: &self.span, removed, "queue drained");
        Ok(removed)
    }

    pub async fn size(&self) -> Result<u64, QueueError> {
        let size = self.store.cardinality(&self.key).await?;
        telemetry::set_queue_depth(&self.key, size);
        Ok(size)
    }

    /// Every payload in the queue, in score order.
    pub async fn all(&self) -> Result<Vec<Vec<u8>>, QueueError> {
        let size = self.store.cardinality(&self.key).await?;
        if size == 0 {
            return Ok(Vec::new());
        }
        self.peek_range(ScoreRange::all(), 0, size as usize).await
    }

    /// Serialize `item` as JSON and enqueue it at the band's time-ordered score.
    pub async fn enqueue_json<T: Serialize>(
        &self,
        band: PriorityBand,
        item: &T,
    ) -> Result<u64, QueueError> {
        self.enqueue_json_at(band, Utc::now(), item).await
    }

    pub async fn enqueue_json_at<T: Serialize>(
        &self,
        band: PriorityBand,
        at: DateTime<Utc>,
        item: &T,
    ) -> Result<u64, QueueError> {
        let payload = serde_json::to_vec(item)?;
        self.enqueue(band.score_at(at), &payload).await
    }

    /// Dequeue the highest-priority entry in `range` and decode it as JSON.
    ///
    /// The entry is already removed when decoding fails.
    pub async fn dequeue_json<T: DeserializeOwned>(
        &self,
        range: ScoreRange,
    ) -> Result<T, QueueError> {
        let payload = self.dequeue_highest(range).await?;
        Ok(serde_json::from_slice(&payload)?)
    }

    pub async fn peek_json<T: DeserializeOwned>(
        &self,
        range: ScoreRange,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<T>, QueueError> {
        self.peek_range(range, offset, limit)
            .await?
            .iter()
            .map(|payload| serde_json::from_slice(payload).map_err(QueueError::from))
            .collect()
    }

    /// Per-band depth of the queue at this moment.
    pub async fn snapshot(&self) -> Result<QueueSnapshot, QueueError> {
        let mut snapshot = QueueSnapshot::new(self.key.clone(), Utc::now());
        snapshot.total = self.store.cardinality(&self.key).await?;
        for band in PriorityBand::ALL {
            let count = self
                .store
                .range_by_score(&self.key, band.range(), 0, usize::MAX)
                .await?
                .len();
            snapshot.bands.insert(band, count);
        }
        Ok(snapshot)
    }
}

/// Snapshot of queue depth at a point in time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub key: String,
    pub sampled_at: DateTime<Utc>,
    /// Total entries, including scores outside every band.
    pub total: u64,
    pub bands: BTreeMap<PriorityBand, usize>,
}

impl QueueSnapshot {
    pub fn new(key: impl Into<String>, sampled_at: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            sampled_at,
            total: 0,
            bands: BTreeMap::new(),
        }
    }

    pub fn band(&self, band: PriorityBand) -> usize {
        self.bands.get(&band).copied().unwrap_or_default()
    }
}
