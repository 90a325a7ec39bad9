use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::sample::{EntityId, Sample};

pub const DEFAULT_LIVE_CAP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    /// Discard everything and keep only the incoming batch as live samples.
    Replace,
    /// Append to the history samples without bound. Observations already held
    /// in history are skipped.
    Append,
    /// Replace the history samples with the incoming batch. Live samples are
    /// kept.
    ReplaceHistory,
    /// Append to the live samples, then keep only the given number of most
    /// recent live samples across all entities.
    AppendBounded(usize),
}

/// Which part of the store an entry belongs to. History and live samples are
/// merged only at query time, so neither can evict the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    History,
    Live,
}

#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    origin: Origin,
    sample: Sample,
}

/// Per-entity sample sequences of one feed session.
///
/// Samples are kept in insertion order; ordering by recency happens in the
/// projections. `revision` changes on every mutation, `epoch` only when the
/// owning session is reset.
#[derive(Debug, Default)]
pub struct TrackStore {
    tracks: BTreeMap<EntityId, Vec<Entry>>,
    next_seq: u64,
    revision: u64,
    epoch: u64,
}

impl TrackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn len(&self) -> usize {
        self.tracks.values().map(Vec::len).sum()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn ingest(&mut self, samples: Vec<Sample>, mode: IngestMode) {
        match mode {
            IngestMode::Replace => {
                self.tracks.clear();
                self.append(samples, Origin::Live);
            }
            IngestMode::Append => self.merge_history(samples),
            IngestMode::ReplaceHistory => {
                self.drop_origin(Origin::History);
                self.merge_history(samples);
            }
            IngestMode::AppendBounded(max_live) => {
                self.append(samples, Origin::Live);
                self.truncate_live(max_live);
            }
        }
        self.revision += 1;
    }

    fn append(&mut self, samples: Vec<Sample>, origin: Origin) {
        for sample in samples {
            self.push(sample, origin);
        }
    }

    fn push(&mut self, sample: Sample, origin: Origin) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.tracks
            .entry(sample.entity_id().to_string())
            .or_default()
            .push(Entry {
                seq,
                origin,
                sample,
            });
    }

    fn merge_history(&mut self, samples: Vec<Sample>) {
        for sample in samples {
            let held = self.tracks.get(sample.entity_id()).is_some_and(|entries| {
                entries.iter().any(|e| {
                    e.origin == Origin::History && e.sample.same_observation(&sample)
                })
            });
            if !held {
                self.push(sample, Origin::History);
            }
        }
    }

    fn drop_origin(&mut self, origin: Origin) {
        for entries in self.tracks.values_mut() {
            entries.retain(|e| e.origin != origin);
        }
        self.tracks.retain(|_, entries| !entries.is_empty());
    }

    fn truncate_live(&mut self, max_live: usize) {
        let mut keys: Vec<(DateTime<Utc>, u64)> = self
            .tracks
            .values()
            .flatten()
            .filter(|e| e.origin == Origin::Live)
            .map(|e| (e.sample.recency_key(), e.seq))
            .collect();
        if keys.len() <= max_live {
            return;
        }

        keys.sort_unstable();
        let cutoff = keys[keys.len() - max_live - 1];

        for entries in self.tracks.values_mut() {
            entries.retain(|e| {
                e.origin == Origin::History || (e.sample.recency_key(), e.seq) > cutoff
            });
        }
        self.tracks.retain(|_, entries| !entries.is_empty());
    }

    /// Snapshot of every track, samples in insertion order.
    pub fn query_all(&self) -> BTreeMap<EntityId, Vec<Sample>> {
        self.tracks
            .iter()
            .map(|(id, entries)| {
                (
                    id.clone(),
                    entries.iter().map(|e| e.sample.clone()).collect(),
                )
            })
            .collect()
    }

    /// All samples as one flat list, grouped by entity and in insertion order
    /// within each entity.
    pub fn samples(&self) -> Vec<Sample> {
        self.tracks
            .values()
            .flatten()
            .map(|e| e.sample.clone())
            .collect()
    }

    pub fn remove(&mut self, entity_id: &str) -> bool {
        let removed = self.tracks.remove(entity_id).is_some();
        if removed {
            self.revision += 1;
        }
        removed
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.revision += 1;
    }

    /// Clears the store and starts a new epoch. Results tagged with an older
    /// epoch must no longer be applied.
    pub fn reset(&mut self) -> u64 {
        self.clear();
        self.epoch += 1;
        self.epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracks::sample::Position;
    use chrono::TimeZone;

    fn sample(id: &str, secs: i64) -> Sample {
        let t = Utc.timestamp_opt(secs, 0).unwrap();
        Sample::new(id, Position { lat: secs as f64, lng: 0.0 }, Some(t), t)
    }

    fn lats(samples: &[Sample]) -> Vec<f64> {
        samples.iter().map(|s| s.position().lat).collect()
    }

    #[test]
    fn append_keeps_insertion_order_per_entity() {
        let mut store = TrackStore::new();
        store.ingest(vec![sample("A", 3), sample("B", 1), sample("A", 1)], IngestMode::Append);
        store.ingest(vec![sample("A", 2)], IngestMode::Append);

        let all = store.query_all();
        assert_eq!(all.len(), 2);
        assert_eq!(lats(&all["A"]), vec![3.0, 1.0, 2.0]);
        assert_eq!(lats(&all["B"]), vec![1.0]);
        assert_eq!(store.revision(), 2);
    }

    #[test]
    fn replace_discards_previous_content() {
        let mut store = TrackStore::new();
        store.ingest(vec![sample("A", 1), sample("B", 2)], IngestMode::Append);
        store.ingest(vec![sample("C", 3)], IngestMode::Replace);

        let all = store.query_all();
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["C"]);
    }

    #[test]
    fn bounded_keeps_most_recent_by_recency_key() {
        let mut store = TrackStore::new();
        let batch = (1..=7).map(|t| sample("A", t)).collect();
        store.ingest(batch, IngestMode::AppendBounded(5));

        assert_eq!(lats(&store.query_all()["A"]), vec![3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn bounded_evicts_older_samples_even_if_inserted_later() {
        let mut store = TrackStore::new();
        store.ingest(vec![sample("A", 10), sample("A", 11)], IngestMode::AppendBounded(2));
        store.ingest(vec![sample("A", 5)], IngestMode::AppendBounded(2));

        assert_eq!(lats(&store.query_all()["A"]), vec![10.0, 11.0]);
    }

    #[test]
    fn bounded_cap_is_global_and_busy_entity_starves_quiet_one() {
        let mut store = TrackStore::new();
        store.ingest(vec![sample("quiet", 1)], IngestMode::AppendBounded(100));
        for t in 2..=250 {
            store.ingest(vec![sample("busy", t)], IngestMode::AppendBounded(100));
        }

        assert_eq!(store.len(), 100);
        let all = store.query_all();
        assert!(!all.contains_key("quiet"));
        assert_eq!(all["busy"].len(), 100);
    }

    #[test]
    fn bounded_ties_prefer_later_insertion() {
        let mut store = TrackStore::new();
        let t = Utc.timestamp_opt(100, 0).unwrap();
        let first = Sample::new("A", Position { lat: 1.0, lng: 0.0 }, Some(t), t);
        let second = Sample::new("A", Position { lat: 2.0, lng: 0.0 }, Some(t), t);
        store.ingest(vec![first, second], IngestMode::AppendBounded(1));

        assert_eq!(lats(&store.query_all()["A"]), vec![2.0]);
    }

    #[test]
    fn live_cap_never_evicts_history() {
        let mut store = TrackStore::new();
        let history = (0..500).map(|t| sample(&format!("H-{}", t % 5), t)).collect();
        store.ingest(history, IngestMode::Append);
        assert_eq!(store.len(), 500);

        store.ingest(vec![sample("live", 1_000)], IngestMode::AppendBounded(100));
        assert_eq!(store.len(), 501);

        for t in 0..300 {
            store.ingest(vec![sample("live", 2_000 + t)], IngestMode::AppendBounded(100));
        }
        let all = store.query_all();
        assert_eq!(all["live"].len(), 100);
        assert_eq!(store.len(), 600);
    }

    #[test]
    fn repeated_history_load_is_idempotent() {
        let mut store = TrackStore::new();
        for _ in 0..1000 {
            store.ingest(vec![sample("A", 1)], IngestMode::Append);
        }
        assert_eq!(store.query_all()["A"].len(), 1);

        store.ingest(vec![sample("A", 1), sample("A", 2)], IngestMode::Append);
        assert_eq!(lats(&store.query_all()["A"]), vec![1.0, 2.0]);
    }

    #[test]
    fn history_dedup_ignores_live_samples() {
        let mut store = TrackStore::new();
        store.ingest(vec![sample("A", 1)], IngestMode::AppendBounded(100));
        store.ingest(vec![sample("A", 1)], IngestMode::Append);
        assert_eq!(store.query_all()["A"].len(), 2);
    }

    #[test]
    fn replace_history_keeps_live_samples() {
        let mut store = TrackStore::new();
        store.ingest(vec![sample("H", 1), sample("H", 2)], IngestMode::Append);
        store.ingest(vec![sample("P", 3)], IngestMode::AppendBounded(100));

        store.ingest(vec![sample("H", 4)], IngestMode::ReplaceHistory);
        let all = store.query_all();
        assert_eq!(lats(&all["H"]), vec![4.0]);
        assert_eq!(lats(&all["P"]), vec![3.0]);

        store.ingest(Vec::new(), IngestMode::ReplaceHistory);
        assert_eq!(store.query_all().keys().collect::<Vec<_>>(), vec!["P"]);
    }

    #[test]
    fn remove_clear_and_reset() {
        let mut store = TrackStore::new();
        store.ingest(vec![sample("A", 1), sample("B", 1)], IngestMode::Append);

        assert!(store.remove("A"));
        assert!(!store.remove("A"));
        assert_eq!(store.query_all().len(), 1);

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.epoch(), 0);

        store.ingest(vec![sample("C", 1)], IngestMode::Append);
        assert_eq!(store.reset(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn snapshot_is_detached_from_store() {
        let mut store = TrackStore::new();
        store.ingest(vec![sample("A", 1)], IngestMode::Append);
        let snapshot = store.query_all();
        store.clear();

        assert_eq!(snapshot["A"].len(), 1);
    }
}
