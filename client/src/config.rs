//! Client tuning knobs. Defaults match the browser client.

use shared::{DEFAULT_SERVER_URL, INPUT_SEND_RATE};
use std::time::Duration;

/// Bounded fixed-interval reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive failed opens tolerated before giving up.
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            interval: Duration::from_millis(5000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub reconnect: ReconnectPolicy,
    /// Outbound INPUT messages per second.
    pub input_rate_hz: u32,
    /// Host simulation ticks per second. May exceed the input rate.
    pub tick_rate_hz: u32,
    /// Remove player proxies missing from a STATE snapshot.
    pub prune_players_on_snapshot: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            reconnect: ReconnectPolicy::default(),
            input_rate_hz: INPUT_SEND_RATE,
            tick_rate_hz: 120,
            prune_players_on_snapshot: true,
        }
    }
}

impl ClientConfig {
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn tick_interval(&self) -> Duration {
        shared::send_interval(self.tick_rate_hz)
    }
}
