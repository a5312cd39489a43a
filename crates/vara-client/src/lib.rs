//! Headless VARA client: catalog, playback, navigation and session state
//! behind a single-owner event loop.

pub mod api;
pub mod billing;
pub mod catalog;
pub mod core;
pub mod deep_link;
pub mod downloads;
pub mod error;
pub mod fetch_cache;
pub mod init;
pub mod loader;
pub mod media;
pub mod mpv;
pub mod navigation;
pub mod notify;
pub mod playback;
pub mod recommend;
pub mod session;
pub mod shell;
pub mod tracker;
pub mod version_watcher;

use vara_proto::protocol::{AppSnapshot, Notification};

/// Everything the core announces to front ends.
#[derive(Debug, Clone)]
pub enum BroadcastMessage {
    StateUpdated(Box<AppSnapshot>),
    Notification(Notification),
}
