use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{Display, EnumString};

/// The two track feeds of the dashboard. They share the engine and differ only
/// in the payload schema.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    utoipa::ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Faction {
    /// Detections reported by the defense sensors.
    Defense,
    /// Moves reported by offense drones.
    Offense,
}

impl Faction {
    pub const ALL: [Faction; 2] = [Faction::Defense, Faction::Offense];
}

/// Field names the normalizer looks for in a raw record.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaProfile {
    pub id_field: String,
    pub timestamp_fields: Vec<String>,
    pub numeric_attributes: Vec<String>,
}

impl SchemaProfile {
    pub fn for_faction(faction: Faction) -> Self {
        let (id_field, timestamp_field) = match faction {
            Faction::Defense => ("droneId", "detectedAt"),
            Faction::Offense => ("offenseDroneId", "movedAt"),
        };
        Self {
            id_field: id_field.to_string(),
            timestamp_fields: vec![timestamp_field.to_string(), "timestamp".to_string()],
            numeric_attributes: vec!["speed".to_string(), "size".to_string()],
        }
    }

    pub fn with_id_field(mut self, id_field: Option<String>) -> Self {
        if let Some(field) = id_field.filter(|f| !f.trim().is_empty()) {
            self.id_field = field;
        }
        self
    }
}

/// Where a raw batch came from; decides how the store merges it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceKind {
    /// History load, appended without bound. Observations already held are
    /// skipped.
    History,
    /// History page that supersedes every earlier history load.
    Reload,
    /// Live push samples, appended to the capped live log.
    Live,
    /// Full active snapshot, replaces the whole store.
    Snapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PushKind {
    Sample,
    Batch,
    Snapshot,
}

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct PushEvent {
    pub kind: PushKind,
    /// A single record object, or an array of record objects.
    #[schema(value_type = Object)]
    pub payload: Value,
}

impl PushEvent {
    pub fn source_kind(&self) -> SourceKind {
        match self.kind {
            PushKind::Sample | PushKind::Batch => SourceKind::Live,
            PushKind::Snapshot => SourceKind::Snapshot,
        }
    }

    pub fn into_records(self) -> Vec<Value> {
        match self.payload {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        }
    }
}

/// One page of the history endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, utoipa::ToSchema)]
pub struct HistoryPage {
    #[schema(value_type = Vec<Object>)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct IngestReport {
    pub accepted: usize,
    pub dropped: usize,
    pub revision: u64,
}
