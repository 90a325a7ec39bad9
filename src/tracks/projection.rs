use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use super::sample::{EntityId, Sample};

/// Most recent sample per entity, ordered by entity id.
///
/// On equal recency keys the sample that comes later in `samples` wins.
pub fn latest_positions(samples: &[Sample]) -> Vec<Sample> {
    let mut latest: BTreeMap<&str, &Sample> = BTreeMap::new();
    for sample in samples {
        match latest.entry(sample.entity_id()) {
            Entry::Vacant(slot) => {
                slot.insert(sample);
            }
            Entry::Occupied(mut slot) => {
                if sample.recency_key() >= slot.get().recency_key() {
                    slot.insert(sample);
                }
            }
        }
    }
    latest.into_values().cloned().collect()
}

/// Samples grouped per entity and ordered by recency key, ties in input order.
///
/// A route with fewer than two samples is still returned; it carries no
/// direction and renderers should not draw a path for it.
pub fn routes(samples: &[Sample]) -> BTreeMap<EntityId, Vec<Sample>> {
    let mut grouped: BTreeMap<EntityId, Vec<Sample>> = BTreeMap::new();
    for sample in samples {
        grouped
            .entry(sample.entity_id().to_string())
            .or_default()
            .push(sample.clone());
    }
    for route in grouped.values_mut() {
        route.sort_by_key(Sample::recency_key);
    }
    grouped
}
