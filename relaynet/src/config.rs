use std::path::Path;
use std::time::Duration;

use serde_derive::{Deserialize, Serialize};

/// Tunables for an [`crate::endpoint::Client`] or [`crate::endpoint::Server`]
/// and the [`crate::connection::Connection`]s it owns. Durations are stored
/// as whole milliseconds on the wire so the TOML file stays free of floats.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// How long a connection may go without receiving anything before it is
    /// considered dead.
    pub timeout_ms: u64,
    /// How often a ping is sent to refresh the latency estimate.
    pub ping_frequency_ms: u64,
    /// Largest payload handed to the socket in one datagram.
    pub mtu: usize,
    /// Floor on how often an unacknowledged message is retried, regardless
    /// of how low the measured round-trip time is.
    pub min_resend_delay_ms: u64,
    /// How many recently-seen message ids are remembered for duplicate
    /// suppression.
    pub recent_ids_capacity: usize,
    /// Sliding-window size for the round-trip latency sampler.
    pub ping_window: usize,
    /// Percentage (0-100) of outbound datagrams to drop, for exercising
    /// retransmission under loss. Zero disables it.
    pub simulated_loss_percent: u8,
}

impl Default for EndpointConfig {
    fn default() -> EndpointConfig {
        EndpointConfig {
            timeout_ms: 10_000,
            ping_frequency_ms: 2_000,
            mtu: 1400,
            min_resend_delay_ms: 10,
            recent_ids_capacity: 1000,
            ping_window: 4,
            simulated_loss_percent: 0,
        }
    }
}

impl EndpointConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn ping_frequency(&self) -> Duration {
        Duration::from_millis(self.ping_frequency_ms)
    }

    pub fn min_resend_delay(&self) -> Duration {
        Duration::from_millis(self.min_resend_delay_ms)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> EndpointConfig {
        serdeconv::from_toml_file(path).expect("error loading endpoint configuration file")
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) {
        serdeconv::to_toml_file(self, path).expect("error saving endpoint configuration file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_tunables() {
        let config = EndpointConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.ping_frequency(), Duration::from_secs(2));
        assert_eq!(config.mtu, 1400);
        assert_eq!(config.recent_ids_capacity, 1000);
        assert_eq!(config.ping_window, 4);
    }
}
