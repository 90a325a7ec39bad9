use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::error::TrackError;
use super::filter::{TrackFilter, TrackStats};
use super::normalizer::{NormalizedBatch, Normalizer};
use super::projection::{latest_positions, routes};
use super::sample::{EntityId, Sample};
use super::store::{IngestMode, TrackStore};
use super::types::{Faction, IngestReport, SchemaProfile, SourceKind};

/// Track aggregation for one faction feed.
///
/// Mutations go through a single writer lock; queries clone a snapshot under
/// the read lock and project outside of it, so a query never sees half of an
/// ingest.
pub struct TrackEngine {
    faction: Faction,
    normalizer: Normalizer,
    live_cap: usize,
    store: RwLock<TrackStore>,
    selection: RwLock<Option<EntityId>>,
}

impl TrackEngine {
    pub fn new(faction: Faction, profile: SchemaProfile, live_cap: usize) -> Self {
        Self {
            faction,
            normalizer: Normalizer::new(profile),
            live_cap,
            store: RwLock::new(TrackStore::new()),
            selection: RwLock::new(None),
        }
    }

    pub fn faction(&self) -> Faction {
        self.faction
    }

    pub fn mode_for(&self, source: SourceKind) -> IngestMode {
        match source {
            SourceKind::History => IngestMode::Append,
            SourceKind::Reload => IngestMode::ReplaceHistory,
            SourceKind::Live => IngestMode::AppendBounded(self.live_cap),
            SourceKind::Snapshot => IngestMode::Replace,
        }
    }

    pub fn ingest(&self, raw: &[Value], source: SourceKind) -> IngestReport {
        let batch = self.normalizer.normalize_batch(raw);
        let mut store = self.write_store();
        self.apply(&mut store, batch, raw.len(), source)
    }

    /// Like [`ingest`](Self::ingest), but only if the store is still in
    /// `epoch`. The check and the apply happen under the same lock.
    pub fn ingest_for_epoch(
        &self,
        epoch: u64,
        raw: &[Value],
        source: SourceKind,
    ) -> Result<IngestReport, TrackError> {
        let batch = self.normalizer.normalize_batch(raw);
        let mut store = self.write_store();
        if store.epoch() != epoch {
            return Err(TrackError::StaleResult {
                got: epoch,
                current: store.epoch(),
            });
        }
        Ok(self.apply(&mut store, batch, raw.len(), source))
    }

    fn apply(
        &self,
        store: &mut TrackStore,
        batch: NormalizedBatch,
        received: usize,
        source: SourceKind,
    ) -> IngestReport {
        let accepted = batch.samples.len();
        let dropped = batch.dropped.len();
        if dropped > 0 {
            log::warn!(
                "{} feed: dropped {} of {} {} records",
                self.faction,
                dropped,
                received,
                source
            );
        }

        // A replacing batch whose every record was unusable must not wipe the
        // store.
        let replaces = matches!(source, SourceKind::Snapshot | SourceKind::Reload);
        if replaces && accepted == 0 && received > 0 {
            log::warn!("{} feed: ignoring {} without usable records", self.faction, source);
        } else {
            store.ingest(batch.samples, self.mode_for(source));
        }

        log::debug!(
            "{} feed: ingested {} {} samples, {} held (revision {})",
            self.faction,
            accepted,
            source,
            store.len(),
            store.revision()
        );

        IngestReport {
            accepted,
            dropped,
            revision: store.revision(),
        }
    }

    pub fn query_all(&self) -> BTreeMap<EntityId, Vec<Sample>> {
        self.read_store().query_all()
    }

    pub fn query_latest(&self, filter: &TrackFilter) -> Vec<Sample> {
        latest_positions(&self.filtered(filter))
    }

    pub fn query_routes(&self, filter: &TrackFilter) -> BTreeMap<EntityId, Vec<Sample>> {
        routes(&self.filtered(filter))
    }

    pub fn query_stats(&self, filter: &TrackFilter) -> TrackStats {
        TrackStats::from_samples(&self.filtered(filter))
    }

    fn filtered(&self, filter: &TrackFilter) -> Vec<Sample> {
        let snapshot = self.read_store().samples();
        filter.apply(snapshot)
    }

    pub fn remove(&self, entity_id: &str) -> bool {
        let removed = self.write_store().remove(entity_id);
        if removed {
            log::info!("{} feed: removed track {}", self.faction, entity_id);
        }
        removed
    }

    pub fn clear(&self) {
        self.write_store().clear();
        log::info!("{} feed: cleared all tracks", self.faction);
    }

    /// Drops all tracks and the selection, and starts a new epoch.
    pub fn reset(&self) -> u64 {
        let epoch = self.write_store().reset();
        *self.selection.write().unwrap_or_else(PoisonError::into_inner) = None;
        epoch
    }

    pub fn epoch(&self) -> u64 {
        self.read_store().epoch()
    }

    pub fn revision(&self) -> u64 {
        self.read_store().revision()
    }

    /// Advisory selection kept for the caller; the engine never acts on it.
    pub fn select(&self, entity_id: Option<EntityId>) {
        *self.selection.write().unwrap_or_else(PoisonError::into_inner) = entity_id;
    }

    pub fn selection(&self) -> Option<EntityId> {
        self.selection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn read_store(&self) -> RwLockReadGuard<'_, TrackStore> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_store(&self) -> RwLockWriteGuard<'_, TrackStore> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }
}
