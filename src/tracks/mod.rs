mod engine;
mod error;
mod feed;
mod filter;
mod normalizer;
mod parsing;
mod projection;
mod retry;
mod sample;
mod store;
mod types;

pub use engine::TrackEngine;
pub use error::TrackError;
pub use feed::{FeedSession, FeedState, FeedStatus, FileHistorySource, PollConfig, PollMode};
pub use filter::{TrackFilter, TrackStats};
pub use normalizer::Normalizer;
pub use retry::RetryConfig;
pub use sample::{AttributeValue, Position, Sample};
pub use store::DEFAULT_LIVE_CAP;
pub use types::{Faction, HistoryPage, IngestReport, PushEvent, PushKind, SchemaProfile, SourceKind};
