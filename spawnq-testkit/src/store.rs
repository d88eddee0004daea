use async_trait::async_trait;
use parking_lot::Mutex;
use spawnq::*;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

/// Score with a total order so it can key a `BTreeMap`.
#[derive(Clone, Copy, Debug)]
struct Score(f64);

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// One sorted set: members unique, ordered by (score, insertion sequence).
#[derive(Default)]
struct SortedSet {
    members: HashMap<Vec<u8>, (Score, u64)>,
    ordered: BTreeMap<(Score, u64), Vec<u8>>,
    next_seq: u64,
}

impl SortedSet {
    fn add(&mut self, score: f64, member: &[u8]) -> u64 {
        if let Some((old_score, seq)) = self.members.get(member).copied() {
            self.ordered.remove(&(old_score, seq));
            self.ordered.insert((Score(score), seq), member.to_vec());
            self.members.insert(member.to_vec(), (Score(score), seq));
            return 0;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.members.insert(member.to_vec(), (Score(score), seq));
        self.ordered.insert((Score(score), seq), member.to_vec());
        1
    }

    fn remove(&mut self, member: &[u8]) -> u64 {
        match self.members.remove(member) {
            Some(key) => {
                self.ordered.remove(&key);
                1
            }
            None => 0,
        }
    }

    fn in_range(&self, range: ScoreRange) -> impl Iterator<Item = &Vec<u8>> {
        self.ordered
            .iter()
            .skip_while(move |((score, _), _)| score.0 < range.min)
            .take_while(move |((score, _), _)| score.0 <= range.max)
            .map(|(_, member)| member)
    }
}

/// [`OrderedStore`] held in process memory.
///
/// Every operation runs under one lock, which makes the pop atomic in the
/// same sense a server-side script is. Re-adding a member only moves it.
#[derive(Clone, Default)]
pub struct InMemoryOrderedStore {
    sets: Arc<Mutex<HashMap<String, SortedSet>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryOrderedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with [`StoreError::Unavailable`] until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, AtomicOrdering::SeqCst);
    }

    /// Members under `key` in score order, read directly.
    pub fn members(&self, key: &str) -> Vec<Vec<u8>> {
        self.sets
            .lock()
            .get(key)
            .map(|set| set.ordered.values().cloned().collect())
            .unwrap_or_default()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Unavailable("injected outage".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderedStore for InMemoryOrderedStore {
    async fn add(&self, key: &str, score: f64, member: &[u8]) -> Result<u64, StoreError> {
        self.check()?;
        if score.is_nan() {
            return Err(StoreError::Protocol("score is not a valid float".into()));
        }
        let mut sets = self.sets.lock();
        Ok(sets.entry(key.to_string()).or_default().add(score, member))
    }

    async fn range_by_score(
        &self,
        key: &str,
        range: ScoreRange,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Vec<u8>>, StoreError> {
        self.check()?;
        let sets = self.sets.lock();
        let Some(set) = sets.get(key) else {
            return Ok(Vec::new());
        };
        Ok(set.in_range(range).skip(offset).take(limit).cloned().collect())
    }

    async fn remove(&self, key: &str, member: &[u8]) -> Result<u64, StoreError> {
        self.check()?;
        let mut sets = self.sets.lock();
        Ok(sets.get_mut(key).map(|set| set.remove(member)).unwrap_or(0))
    }

    async fn remove_all(&self, key: &str) -> Result<u64, StoreError> {
        self.check()?;
        let mut sets = self.sets.lock();
        Ok(sets
            .remove(key)
            .map(|set| set.members.len() as u64)
            .unwrap_or(0))
    }

    async fn cardinality(&self, key: &str) -> Result<u64, StoreError> {
        self.check()?;
        let sets = self.sets.lock();
        Ok(sets.get(key).map(|set| set.members.len() as u64).unwrap_or(0))
    }

    async fn pop_min_in_range(
        &self,
        key: &str,
        range: ScoreRange,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        self.check()?;
        let mut sets = self.sets.lock();
        let Some(set) = sets.get_mut(key) else {
            return Ok(None);
        };
        let Some(member) = set.in_range(range).next().cloned() else {
            return Ok(None);
        };
        set.remove(&member);
        Ok(Some(member))
    }
}
