use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type EntityId = String;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
}

/// Scalar observation metadata. Untagged so it serializes as the bare JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl AttributeValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Number(n) => write!(f, "{}", n),
            AttributeValue::Text(s) => f.write_str(s),
        }
    }
}

/// One observation of a tracked drone.
///
/// Fields are private: a sample is never modified once it has been built, the
/// track store only ever clones it.
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    entity_id: EntityId,
    position: Position,
    #[serde(skip_serializing_if = "Option::is_none")]
    altitude: Option<f64>,
    attributes: BTreeMap<String, AttributeValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    captured_at: Option<DateTime<Utc>>,
    received_at: DateTime<Utc>,
    update_id: String,
}

impl Sample {
    pub fn new(
        entity_id: impl Into<EntityId>,
        position: Position,
        captured_at: Option<DateTime<Utc>>,
        received_at: DateTime<Utc>,
    ) -> Self {
        let entity_id = entity_id.into();
        let update_id = synthesize_update_id(&entity_id, received_at);
        Self {
            entity_id,
            position,
            altitude: None,
            attributes: BTreeMap::new(),
            captured_at,
            received_at,
            update_id,
        }
    }

    pub fn with_altitude(mut self, altitude: Option<f64>) -> Self {
        self.altitude = altitude;
        self
    }

    #[cfg(test)]
    pub fn with_attribute(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_attributes(mut self, attributes: BTreeMap<String, AttributeValue>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn altitude(&self) -> Option<f64> {
        self.altitude
    }

    #[cfg(test)]
    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        self.captured_at
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn update_id(&self) -> &str {
        &self.update_id
    }

    /// True when both samples describe the same report of the source: equal in
    /// everything except when and how often it was received.
    pub fn same_observation(&self, other: &Sample) -> bool {
        self.entity_id == other.entity_id
            && self.captured_at == other.captured_at
            && self.position == other.position
            && self.altitude == other.altitude
            && self.attributes == other.attributes
    }

    /// Timestamp used for merging and ordering: capture time when the source
    /// reported one, receipt time otherwise.
    pub fn recency_key(&self) -> DateTime<Utc> {
        self.captured_at.unwrap_or(self.received_at)
    }
}

fn synthesize_update_id(entity_id: &str, received_at: DateTime<Utc>) -> String {
    format!(
        "{}-{}-{}",
        entity_id,
        received_at.timestamp_millis(),
        uuid::Uuid::new_v4().simple()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn recency_key_prefers_capture_time() {
        let pos = Position { lat: 1.0, lng: 2.0 };
        let captured = Sample::new("A", pos, Some(at(10)), at(50));
        let received_only = Sample::new("A", pos, None, at(50));

        assert_eq!(captured.recency_key(), at(10));
        assert_eq!(received_only.recency_key(), at(50));
    }

    #[test]
    fn update_ids_are_unique_for_same_entity_and_time() {
        let pos = Position { lat: 0.0, lng: 0.0 };
        let ids: HashSet<String> = (0..500)
            .map(|_| Sample::new("A", pos, None, at(1)).update_id().to_string())
            .collect();
        assert_eq!(ids.len(), 500);
        assert!(ids.iter().all(|id| id.starts_with("A-1000-")));
    }

    #[test]
    fn same_observation_ignores_receipt() {
        let pos = Position { lat: 1.0, lng: 2.0 };
        let first = Sample::new("A", pos, Some(at(10)), at(50));
        let again = Sample::new("A", pos, Some(at(10)), at(90));
        let moved = Sample::new("A", Position { lat: 1.5, lng: 2.0 }, Some(at(10)), at(50));
        let other = Sample::new("B", pos, Some(at(10)), at(50));

        assert!(first.same_observation(&again));
        assert!(!first.same_observation(&moved));
        assert!(!first.same_observation(&other));
        assert!(!first.same_observation(&first.clone().with_altitude(Some(30.0))));
    }

    #[test]
    fn attribute_values_serialize_as_bare_json() {
        let sample = Sample::new("A", Position { lat: 1.5, lng: -2.0 }, None, at(0))
            .with_attribute("color", AttributeValue::Text("red".into()))
            .with_attribute("speed", AttributeValue::Number(12.0))
            .with_attribute("noise", AttributeValue::Bool(true));

        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["entityId"], "A");
        assert_eq!(json["attributes"]["color"], "red");
        assert_eq!(json["attributes"]["speed"], 12.0);
        assert_eq!(json["attributes"]["noise"], true);
        assert!(json.get("capturedAt").is_none());
    }

    #[test]
    fn integral_numbers_display_without_fraction() {
        assert_eq!(AttributeValue::Number(3.0).to_string(), "3");
        assert_eq!(AttributeValue::Number(2.5).to_string(), "2.5");
    }
}
