use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use strum_macros::Display;
use thiserror::Error;

use crate::tracks::{Faction, PollConfig, PollMode, RetryConfig, SchemaProfile, DEFAULT_LIVE_CAP};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub feeds: FeedsConfig,
    #[serde(default)]
    pub api_keys: Vec<ApiKey>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedsConfig {
    #[serde(default)]
    pub defense: FeedConfig,
    #[serde(default)]
    pub offense: FeedConfig,
}

impl FeedsConfig {
    pub fn get(&self, faction: Faction) -> &FeedConfig {
        match faction {
            Faction::Defense => &self.defense,
            Faction::Offense => &self.offense,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Overrides the identity field of the faction's record schema.
    #[serde(default)]
    pub id_field: Option<String>,
    #[serde(default = "default_live_cap")]
    pub live_cap: usize,
    #[serde(default = "default_poll_interval", deserialize_with = "deserialize_duration")]
    pub poll_interval: Duration,
    #[serde(default = "default_fetch_timeout", deserialize_with = "deserialize_duration")]
    pub fetch_timeout: Duration,
    #[serde(default)]
    pub history_file: Option<PathBuf>,
    #[serde(default)]
    pub poll_mode: PollMode,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            id_field: None,
            live_cap: default_live_cap(),
            poll_interval: default_poll_interval(),
            fetch_timeout: default_fetch_timeout(),
            history_file: None,
            poll_mode: PollMode::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl FeedConfig {
    pub fn profile(&self, faction: Faction) -> SchemaProfile {
        SchemaProfile::for_faction(faction).with_id_field(self.id_field.clone())
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: self.poll_interval,
            fetch_timeout: self.fetch_timeout,
            mode: self.poll_mode,
            retry: self.retry.clone(),
        }
    }
}

fn default_live_cap() -> usize {
    DEFAULT_LIVE_CAP
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(10)
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiKey {
    pub key: String,
    pub name: String,
    pub permissions: HashSet<Permission>,
    /// Restricts the key to these feeds; every feed when omitted.
    #[serde(default)]
    pub factions: Option<HashSet<Faction>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Permission {
    ReadTracks,
    IngestTracks,
    ManageFeeds,
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for faction in Faction::ALL {
            let feed = self.feeds.get(faction);
            if feed.live_cap == 0 {
                return Err(ConfigError::Invalid(format!(
                    "feeds.{}.live_cap must be at least 1",
                    faction
                )));
            }
            if feed.poll_interval.is_zero() {
                return Err(ConfigError::Invalid(format!(
                    "feeds.{}.poll_interval must be positive",
                    faction
                )));
            }
        }
        Ok(())
    }

    pub fn find_api_key(&self, key: &str) -> Option<&ApiKey> {
        self.api_keys.iter().find(|k| k.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FULL: &str = r#"
web:
  bind: "127.0.0.1:9000"
feeds:
  defense:
    live_cap: 50
    poll_interval: 30s
    fetch_timeout: 2s
    history_file: /var/lib/tracks/detections.json
    retry:
      base_delay_ms: 500
  offense:
    id_field: droneUid
    poll_mode: accumulate
api_keys:
  - key: secret
    name: console
    permissions: [read_tracks, manage_feeds]
  - key: gateway
    name: offense-gateway
    permissions: [ingest_tracks]
    factions: [offense]
"#;

    #[test]
    fn parses_full_config() {
        let config = Config::from_yaml(FULL).unwrap();

        assert_eq!(config.web.bind, "127.0.0.1:9000");
        let defense = config.feeds.get(Faction::Defense);
        assert_eq!(defense.live_cap, 50);
        assert_eq!(defense.poll_interval, Duration::from_secs(30));
        assert_eq!(defense.fetch_timeout, Duration::from_secs(2));
        assert_eq!(defense.retry.base_delay_ms, 500);
        assert_eq!(defense.retry.max_delay_ms, 30_000);
        assert_eq!(defense.poll_mode, PollMode::Refresh);

        let offense = config.feeds.get(Faction::Offense);
        assert_eq!(offense.live_cap, DEFAULT_LIVE_CAP);
        assert_eq!(offense.poll_mode, PollMode::Accumulate);
        assert_eq!(offense.profile(Faction::Offense).id_field, "droneUid");
        assert_eq!(
            config.feeds.get(Faction::Defense).profile(Faction::Defense).id_field,
            "droneId"
        );

        let key = config.find_api_key("secret").unwrap();
        assert!(key.permissions.contains(&Permission::ManageFeeds));
        assert!(!key.permissions.contains(&Permission::IngestTracks));
        assert!(key.factions.is_none());
        assert!(config.find_api_key("other").is_none());

        let gateway = config.find_api_key("gateway").unwrap();
        let factions = gateway.factions.as_ref().unwrap();
        assert!(factions.contains(&Faction::Offense));
        assert!(!factions.contains(&Faction::Defense));
        assert_eq!(Permission::IngestTracks.to_string(), "ingest_tracks");
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config.web.bind, "0.0.0.0:8080");
        assert_eq!(config.feeds.defense.poll_interval, Duration::from_secs(5));
        assert!(config.api_keys.is_empty());
    }

    #[test]
    fn rejects_bad_values() {
        let bad_duration = "feeds:\n  defense:\n    poll_interval: soon\n";
        assert!(matches!(
            Config::from_yaml(bad_duration),
            Err(ConfigError::Yaml(_))
        ));

        let zero_cap = "feeds:\n  offense:\n    live_cap: 0\n";
        assert!(matches!(
            Config::from_yaml(zero_cap),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();
        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.api_keys.len(), 2);

        assert!(matches!(
            Config::from_file("/nonexistent/track-o-mat.yaml"),
            Err(ConfigError::Io(_))
        ));
    }
}
