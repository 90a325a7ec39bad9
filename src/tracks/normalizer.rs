use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::error::TrackError;
use super::parsing::{coerce_f64, coerce_or_zero, parse_entity_id, parse_timestamp};
use super::sample::{AttributeValue, Position, Sample};
use super::types::SchemaProfile;

const LAT_FIELDS: [&str; 2] = ["lat", "latitude"];
const LNG_FIELDS: [&str; 3] = ["lng", "longitude", "lon"];
const ALTITUDE_FIELDS: [&str; 2] = ["altitude", "alt"];
const NESTED_POSITION_FIELDS: [&str; 2] = ["position", "location"];

/// Result of normalizing a batch: the usable samples plus one error per
/// dropped record.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub samples: Vec<Sample>,
    pub dropped: Vec<TrackError>,
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    profile: SchemaProfile,
}

impl Normalizer {
    pub fn new(profile: SchemaProfile) -> Self {
        Self { profile }
    }

    pub fn normalize_at(&self, raw: &Value, received_at: DateTime<Utc>) -> Result<Sample, TrackError> {
        let record = raw
            .as_object()
            .ok_or_else(|| TrackError::malformed("record is not an object"))?;

        let entity_id = record
            .get(&self.profile.id_field)
            .and_then(parse_entity_id)
            .ok_or_else(|| TrackError::malformed(format!("missing '{}'", self.profile.id_field)))?;

        let nested = NESTED_POSITION_FIELDS
            .iter()
            .find_map(|k| record.get(*k).and_then(Value::as_object));
        let position = Position {
            lat: coerce_or_zero(lookup(record, nested, &LAT_FIELDS)),
            lng: coerce_or_zero(lookup(record, nested, &LNG_FIELDS)),
        };
        let altitude = lookup(record, nested, &ALTITUDE_FIELDS).and_then(coerce_f64);

        let captured_at = self
            .profile
            .timestamp_fields
            .iter()
            .find_map(|k| record.get(k))
            .and_then(parse_timestamp);

        Ok(Sample::new(entity_id, position, captured_at, received_at)
            .with_altitude(altitude)
            .with_attributes(self.attributes(record)))
    }

    /// Normalizes every record independently. A malformed record is logged and
    /// reported but never stops the rest of the batch.
    pub fn normalize_batch(&self, raw: &[Value]) -> NormalizedBatch {
        self.normalize_batch_at(raw, Utc::now())
    }

    pub fn normalize_batch_at(&self, raw: &[Value], received_at: DateTime<Utc>) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();
        for (index, record) in raw.iter().enumerate() {
            match self.normalize_at(record, received_at) {
                Ok(sample) => batch.samples.push(sample),
                Err(e) => {
                    log::warn!("Dropping record {} of batch: {}", index, e);
                    batch.dropped.push(e);
                }
            }
        }
        batch
    }

    fn attributes(&self, record: &Map<String, Value>) -> BTreeMap<String, AttributeValue> {
        let mut attributes = BTreeMap::new();
        for (key, value) in record {
            if self.is_reserved(key) {
                continue;
            }
            if self.profile.numeric_attributes.iter().any(|k| k == key) {
                attributes.insert(key.clone(), AttributeValue::Number(coerce_or_zero(Some(value))));
                continue;
            }
            let attribute = match value {
                Value::Bool(b) => AttributeValue::Bool(*b),
                Value::Number(n) => match n.as_f64() {
                    Some(f) => AttributeValue::Number(f),
                    None => continue,
                },
                Value::String(s) => AttributeValue::Text(s.clone()),
                Value::Null | Value::Array(_) | Value::Object(_) => {
                    log::debug!("Skipping non-scalar attribute '{}'", key);
                    continue;
                }
            };
            attributes.insert(key.clone(), attribute);
        }
        attributes
    }

    fn is_reserved(&self, key: &str) -> bool {
        key == self.profile.id_field
            || self.profile.timestamp_fields.iter().any(|k| k == key)
            || LAT_FIELDS.contains(&key)
            || LNG_FIELDS.contains(&key)
            || ALTITUDE_FIELDS.contains(&key)
            || NESTED_POSITION_FIELDS.contains(&key)
    }
}

fn lookup<'a>(
    record: &'a Map<String, Value>,
    nested: Option<&'a Map<String, Value>>,
    keys: &[&str],
) -> Option<&'a Value> {
    keys.iter()
        .find_map(|k| record.get(*k))
        .or_else(|| nested.and_then(|n| keys.iter().find_map(|k| n.get(*k))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracks::types::Faction;
    use chrono::TimeZone;
    use serde_json::json;

    fn defense() -> Normalizer {
        Normalizer::new(SchemaProfile::for_faction(Faction::Defense))
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn detection_record_round_trips() {
        let raw = json!({
            "droneId": "D-1",
            "lat": 48.85,
            "lng": 2.35,
            "altitude": 120.5,
            "color": "red",
            "objective": "recon",
            "group": 3,
            "noiseInjected": false,
            "detectedAt": "2025-06-01T07:59:00Z"
        });

        let sample = defense().normalize_at(&raw, now()).unwrap();

        assert_eq!(sample.entity_id(), "D-1");
        assert_eq!(sample.position(), Position { lat: 48.85, lng: 2.35 });
        assert_eq!(sample.altitude(), Some(120.5));
        assert_eq!(
            sample.captured_at(),
            Some(Utc.with_ymd_and_hms(2025, 6, 1, 7, 59, 0).unwrap())
        );
        assert_eq!(sample.received_at(), now());
        assert_eq!(sample.attribute("color"), Some(&AttributeValue::Text("red".into())));
        assert_eq!(sample.attribute("objective"), Some(&AttributeValue::Text("recon".into())));
        assert_eq!(sample.attribute("group"), Some(&AttributeValue::Number(3.0)));
        assert_eq!(sample.attribute("noiseInjected"), Some(&AttributeValue::Bool(false)));
        assert!(sample.attribute("droneId").is_none());
        assert!(sample.attribute("lat").is_none());
        assert!(sample.attribute("detectedAt").is_none());
    }

    #[test]
    fn numeral_strings_are_coerced() {
        let raw = json!({
            "droneId": "D-2",
            "lat": "10.5",
            "lng": "-3",
            "altitude": "80m",
            "speed": "42",
            "size": "big"
        });

        let sample = defense().normalize_at(&raw, now()).unwrap();

        assert_eq!(sample.position(), Position { lat: 10.5, lng: -3.0 });
        assert_eq!(sample.altitude(), Some(80.0));
        assert_eq!(sample.attribute("speed"), Some(&AttributeValue::Number(42.0)));
        assert_eq!(sample.attribute("size"), Some(&AttributeValue::Number(0.0)));
    }

    #[test]
    fn unparsable_optional_fields_become_absent() {
        let raw = json!({
            "droneId": "D-3",
            "lat": 1,
            "lng": 2,
            "altitude": "unknown",
            "detectedAt": "not a time"
        });

        let sample = defense().normalize_at(&raw, now()).unwrap();

        assert_eq!(sample.altitude(), None);
        assert_eq!(sample.captured_at(), None);
        assert_eq!(sample.recency_key(), now());
    }

    #[test]
    fn nested_position_and_offense_profile() {
        let offense = Normalizer::new(SchemaProfile::for_faction(Faction::Offense));
        let raw = json!({
            "offenseDroneId": "O-9",
            "position": {"latitude": 5.5, "longitude": 6.5, "alt": 30},
            "mission": "strike",
            "movedAt": 1_700_000_000_000i64
        });

        let sample = offense.normalize_at(&raw, now()).unwrap();

        assert_eq!(sample.entity_id(), "O-9");
        assert_eq!(sample.position(), Position { lat: 5.5, lng: 6.5 });
        assert_eq!(sample.altitude(), Some(30.0));
        assert_eq!(sample.captured_at().unwrap().timestamp_millis(), 1_700_000_000_000);
        assert!(sample.attribute("position").is_none());
    }

    #[test]
    fn missing_id_is_malformed() {
        let err = defense().normalize_at(&json!({"lat": 1, "lng": 2}), now()).unwrap_err();
        assert!(matches!(err, TrackError::MalformedSample(_)));

        let err = defense().normalize_at(&json!([1, 2]), now()).unwrap_err();
        assert!(matches!(err, TrackError::MalformedSample(_)));
    }

    #[test]
    fn malformed_record_does_not_abort_batch() {
        let mut raw: Vec<Value> = (0..9)
            .map(|i| json!({"droneId": format!("D-{}", i), "lat": i, "lng": i}))
            .collect();
        raw.insert(4, json!({"lat": 1, "lng": 2}));

        let batch = defense().normalize_batch_at(&raw, now());

        assert_eq!(batch.samples.len(), 9);
        assert_eq!(batch.dropped.len(), 1);
        assert_eq!(batch.samples[4].entity_id(), "D-4");
    }

    #[test]
    fn nested_values_and_nulls_are_not_attributes() {
        let raw = json!({"droneId": "D", "lat": 0, "lng": 0, "meta": {"a": 1}, "tags": [1], "note": null});
        let sample = defense().normalize_at(&raw, now()).unwrap();
        assert!(sample.attributes().is_empty());
    }
}
