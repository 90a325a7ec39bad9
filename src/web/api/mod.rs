pub mod error;
pub mod feeds;
