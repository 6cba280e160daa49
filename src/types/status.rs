//! Session state and status snapshots.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection state machine.
///
/// `Disconnected → Handshaking → Ready → {Streaming, Syncing} → Disconnected`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Disconnected,
    Handshaking,
    Ready,
    Streaming,
    Syncing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Handshaking => "handshaking",
            SessionState::Ready => "ready",
            SessionState::Streaming => "streaming",
            SessionState::Syncing => "syncing",
        };
        f.write_str(name)
    }
}

/// Snapshot of a running session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationStatus {
    pub state: SessionState,
    pub model: Option<String>,
    pub latest_index: u16,
    pub last_consumed_index: Option<u16>,
    /// Ring occupancy in percent.
    pub occupancy: f64,
    pub heartbeats_sent: u64,
    pub samples_emitted: u64,
    pub frames_dropped: u64,
}
