//! Bounded per-sender pool of protocol messages awaiting a quorum.

use attestor_types::OracleId;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Outcome of [`BoundedQuorumPool::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolPutResult {
    Ok,
    /// The sender already has an entry for this key.
    Duplicate,
    /// The sender has used up its budget of live entries.
    Full,
    /// The key is at or below the completion watermark.
    AlreadyCompleted,
}

/// One pooled item and its verification result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEntry<T> {
    pub item: T,
    /// `None` until verified; pinned to the first result afterwards.
    pub verified: Option<bool>,
}

/// Items keyed by `(key, sender)`, e.g. sequence number or epoch.
///
/// Memory is bounded per sender: nobody can hold more than
/// `max_items_per_sender` live entries across all keys. Entries leave the
/// pool only through [`reap_completed`](Self::reap_completed).
#[derive(Debug)]
pub struct BoundedQuorumPool<K, T> {
    max_items_per_sender: usize,
    entries: BTreeMap<K, BTreeMap<OracleId, PoolEntry<T>>>,
    live_per_sender: BTreeMap<OracleId, usize>,
    completed: Option<K>,
}

impl<K: Ord + Copy + Debug, T> BoundedQuorumPool<K, T> {
    pub fn new(max_items_per_sender: usize) -> Self {
        Self {
            max_items_per_sender,
            entries: BTreeMap::new(),
            live_per_sender: BTreeMap::new(),
            completed: None,
        }
    }

    /// Add `item` from `sender` under `key`.
    pub fn put(&mut self, key: K, sender: OracleId, item: T) -> PoolPutResult {
        if self.completed.is_some_and(|watermark| key <= watermark) {
            return PoolPutResult::AlreadyCompleted;
        }
        if self
            .entries
            .get(&key)
            .is_some_and(|by_sender| by_sender.contains_key(&sender))
        {
            return PoolPutResult::Duplicate;
        }
        let live = self.live_per_sender.entry(sender).or_insert(0);
        if *live >= self.max_items_per_sender {
            return PoolPutResult::Full;
        }
        *live += 1;
        self.entries.entry(key).or_default().insert(
            sender,
            PoolEntry {
                item,
                verified: None,
            },
        );
        PoolPutResult::Ok
    }

    /// Record the verification result for an entry.
    ///
    /// Only the first call for an entry has an effect; later calls (including
    /// for absent entries) are no-ops.
    pub fn store_verified(&mut self, key: K, sender: OracleId, verified: bool) {
        if let Some(entry) = self
            .entries
            .get_mut(&key)
            .and_then(|by_sender| by_sender.get_mut(&sender))
        {
            entry.verified.get_or_insert(verified);
        }
    }

    /// Drop every entry with key `<= watermark` and advance the watermark.
    ///
    /// The watermark never moves backwards.
    pub fn reap_completed(&mut self, watermark: K) {
        if self.completed.is_some_and(|current| watermark <= current) {
            return;
        }
        self.completed = Some(watermark);

        let keep = match self.entries.keys().find(|k| **k > watermark).copied() {
            Some(first_live) => self.entries.split_off(&first_live),
            None => BTreeMap::new(),
        };
        let reaped = std::mem::replace(&mut self.entries, keep);
        for sender in reaped.values().flat_map(BTreeMap::keys) {
            if let Some(live) = self.live_per_sender.get_mut(sender) {
                *live = live.saturating_sub(1);
            }
        }
        self.live_per_sender.retain(|_, live| *live > 0);
    }

    /// Entries under `key`, by sender.
    pub fn entries(&self, key: K) -> Option<&BTreeMap<OracleId, PoolEntry<T>>> {
        self.entries.get(&key)
    }

    /// Live entries held by `sender` across all keys.
    pub fn sender_count(&self, sender: OracleId) -> usize {
        self.live_per_sender.get(&sender).copied().unwrap_or(0)
    }

    pub fn completed_watermark(&self) -> Option<K> {
        self.completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attestor_types::SeqNr;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_put_results() {
        let mut pool: BoundedQuorumPool<SeqNr, &str> = BoundedQuorumPool::new(2);
        assert_eq!(pool.put(SeqNr(1), OracleId(0), "a"), PoolPutResult::Ok);
        assert_eq!(pool.put(SeqNr(1), OracleId(0), "b"), PoolPutResult::Duplicate);
        assert_eq!(pool.put(SeqNr(2), OracleId(0), "c"), PoolPutResult::Ok);
        assert_eq!(pool.put(SeqNr(3), OracleId(0), "d"), PoolPutResult::Full);
        // Other senders have their own budget.
        assert_eq!(pool.put(SeqNr(3), OracleId(1), "e"), PoolPutResult::Ok);

        pool.reap_completed(SeqNr(1));
        assert_eq!(pool.put(SeqNr(1), OracleId(2), "f"), PoolPutResult::AlreadyCompleted);
        // Reaping freed a slot for sender 0.
        assert_eq!(pool.put(SeqNr(3), OracleId(0), "g"), PoolPutResult::Ok);
    }

    #[test]
    fn test_first_verification_result_is_pinned() {
        let mut pool: BoundedQuorumPool<SeqNr, u32> = BoundedQuorumPool::new(4);
        pool.put(SeqNr(5), OracleId(3), 7);
        assert_eq!(pool.entries(SeqNr(5)).unwrap()[&OracleId(3)].verified, None);

        pool.store_verified(SeqNr(5), OracleId(3), false);
        pool.store_verified(SeqNr(5), OracleId(3), true);
        assert_eq!(
            pool.entries(SeqNr(5)).unwrap()[&OracleId(3)].verified,
            Some(false)
        );

        // Absent entries are ignored.
        pool.store_verified(SeqNr(6), OracleId(3), true);
        assert!(pool.entries(SeqNr(6)).is_none());
    }

    #[test]
    fn test_watermark_is_monotone() {
        let mut pool: BoundedQuorumPool<SeqNr, ()> = BoundedQuorumPool::new(4);
        pool.put(SeqNr(3), OracleId(0), ());
        pool.reap_completed(SeqNr(5));
        pool.reap_completed(SeqNr(2));
        assert_eq!(pool.completed_watermark(), Some(SeqNr(5)));
        assert_eq!(pool.put(SeqNr(4), OracleId(0), ()), PoolPutResult::AlreadyCompleted);
        assert_eq!(pool.sender_count(OracleId(0)), 0);
    }

    #[test]
    fn test_random_operations_respect_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);
        let max = 3;
        let mut pool: BoundedQuorumPool<SeqNr, u64> = BoundedQuorumPool::new(max);

        for step in 0..2_000u64 {
            let seq = SeqNr(rng.gen_range(0..40));
            let sender = OracleId(rng.gen_range(0..5));
            match rng.gen_range(0..10) {
                0 => {
                    pool.reap_completed(seq);
                    let watermark = pool.completed_watermark().unwrap();
                    for s in 0..=watermark.0 {
                        assert!(pool.entries(SeqNr(s)).is_none(), "step {step}: {s} survived reap");
                    }
                }
                1 | 2 => pool.store_verified(seq, sender, rng.gen()),
                _ => {
                    pool.put(seq, sender, step);
                }
            }
            for i in 0..5 {
                let live: usize = (0..40)
                    .filter_map(|s| pool.entries(SeqNr(s)))
                    .filter(|by_sender| by_sender.contains_key(&OracleId(i)))
                    .count();
                assert!(live <= max);
                assert_eq!(live, pool.sender_count(OracleId(i)));
            }
        }
    }
}
