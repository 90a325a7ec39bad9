use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::tracks::{Faction, FeedSession, TrackEngine};

use super::config::Config;

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub feeds: Arc<FeedRegistry>,
}

/// One faction's engine and the session that owns its polling task.
pub struct Feed {
    engine: Arc<TrackEngine>,
    pub session: Mutex<FeedSession>,
    pub history_file: Option<PathBuf>,
}

impl Feed {
    pub fn engine(&self) -> &TrackEngine {
        &self.engine
    }
}

pub struct FeedRegistry {
    feeds: HashMap<Faction, Feed>,
}

impl FeedRegistry {
    pub fn from_config(config: &Config) -> Self {
        let feeds = Faction::ALL
            .into_iter()
            .map(|faction| {
                let feed_config = config.feeds.get(faction);
                let engine = Arc::new(TrackEngine::new(
                    faction,
                    feed_config.profile(faction),
                    feed_config.live_cap,
                ));
                let session = FeedSession::new(engine.clone(), feed_config.poll_config());
                let feed = Feed {
                    engine,
                    session: Mutex::new(session),
                    history_file: feed_config.history_file.clone(),
                };
                (faction, feed)
            })
            .collect();
        Self { feeds }
    }

    /// Every faction is registered at construction, so lookups cannot miss.
    pub fn get(&self, faction: Faction) -> &Feed {
        &self.feeds[&faction]
    }

    pub async fn stop_all(&self) {
        for feed in self.feeds.values() {
            feed.session.lock().await.stop().await;
        }
    }
}
