//! Network plumbing for lexera-moves: the tracker's HTTP move service and
//! its WebSocket realtime feed.

pub mod error;
pub mod feed;
pub mod http;
pub mod wire;

#[cfg(test)]
pub(crate) mod test_server;

pub use error::FeedError;
pub use feed::{feed_url, run_feed, spawn_feed};
pub use http::HttpBoardApi;
