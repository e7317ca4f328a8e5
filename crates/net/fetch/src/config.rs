use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for a [`RetryingTask`](crate::task::RetryingTask).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// The number of consecutive non-progressing attempts allowed before the
    /// task fails permanently.
    pub max_retries: u32,
    /// How long a single attempt waits for a response before it counts as
    /// timed out.
    pub request_timeout: Duration,
    /// How long the task sleeps between peer-availability checks while no
    /// peer is connected.
    pub peer_recheck_interval: Duration,
    /// Whether a peer that already failed the current attempt sequence may
    /// be selected again once every other connected peer has failed as well.
    ///
    /// With this disabled the task waits for a new peer instead of retrying
    /// a known-bad one.
    pub reselect_failed_peer: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            request_timeout: Duration::from_secs(5),
            peer_recheck_interval: Duration::from_secs(1),
            reselect_failed_peer: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_roundtrip() {
        let config = RetryConfig { max_retries: 2, ..Default::default() };
        let encoded = serde_json::to_string(&config).unwrap();
        let decoded: RetryConfig = serde_json::from_str(&encoded).unwrap();
        assert_eq!(config, decoded);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let decoded: RetryConfig = serde_json::from_str(r#"{"max_retries":7}"#).unwrap();
        assert_eq!(decoded.max_retries, 7);
        assert_eq!(decoded.request_timeout, RetryConfig::default().request_timeout);
    }
}
