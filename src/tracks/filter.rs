use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::sample::{AttributeValue, Sample};

const ALL_SENTINEL: &str = "ALL";
const COLOR_KEY: &str = "color";
const GROUP_KEY: &str = "group";
const OBJECTIVE_KEYS: [&str; 2] = ["objective", "mission"];

/// User-supplied narrowing of the sample set. Every set predicate must match;
/// an empty value or `ALL` disables the predicate.
#[derive(
    Debug, Clone, Default, PartialEq, Deserialize, Serialize, utoipa::ToSchema, utoipa::IntoParams,
)]
#[into_params(parameter_in = Query)]
pub struct TrackFilter {
    /// Case-insensitive substring of the entity id, color or objective.
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub objective: Option<String>,
}

impl TrackFilter {
    #[cfg(test)]
    pub fn for_entity(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: Some(entity_id.into()),
            ..Self::default()
        }
    }

    pub fn is_noop(&self) -> bool {
        [&self.search, &self.entity_id, &self.group, &self.objective]
            .iter()
            .all(|v| active(v).is_none())
    }

    pub fn matches(&self, sample: &Sample) -> bool {
        if let Some(needle) = active(&self.search) {
            let needle = needle.to_lowercase();
            let hit = sample.entity_id().to_lowercase().contains(&needle)
                || sample
                    .attribute(COLOR_KEY)
                    .is_some_and(|c| c.to_string().to_lowercase().contains(&needle))
                || objective_of(sample)
                    .is_some_and(|o| o.to_string().to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }

        if let Some(id) = active(&self.entity_id) {
            if sample.entity_id() != id {
                return false;
            }
        }

        if let Some(group) = active(&self.group) {
            if !sample.attribute(GROUP_KEY).is_some_and(|g| group_matches(g, group)) {
                return false;
            }
        }

        if let Some(objective) = active(&self.objective) {
            if !objective_of(sample).is_some_and(|o| o.to_string() == objective) {
                return false;
            }
        }

        true
    }

    pub fn apply(&self, samples: Vec<Sample>) -> Vec<Sample> {
        if self.is_noop() {
            return samples;
        }
        samples.into_iter().filter(|s| self.matches(s)).collect()
    }
}

fn active(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case(ALL_SENTINEL))
}

fn objective_of(sample: &Sample) -> Option<&AttributeValue> {
    OBJECTIVE_KEYS.iter().find_map(|k| sample.attribute(k))
}

fn group_matches(value: &AttributeValue, wanted: &str) -> bool {
    if value.to_string() == wanted {
        return true;
    }
    match (value.as_f64(), wanted.parse::<f64>()) {
        (Some(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackStats {
    pub entity_count: usize,
    pub sample_count: usize,
    /// Rounded to the nearest integer, 0 when there are no entities.
    pub avg_per_entity: u64,
}

impl TrackStats {
    pub fn from_samples(samples: &[Sample]) -> Self {
        let entity_count = samples
            .iter()
            .map(Sample::entity_id)
            .collect::<HashSet<_>>()
            .len();
        let sample_count = samples.len();
        let avg_per_entity = if entity_count == 0 {
            0
        } else {
            (sample_count as f64 / entity_count as f64).round() as u64
        };
        Self {
            entity_count,
            sample_count,
            avg_per_entity,
        }
    }
}
