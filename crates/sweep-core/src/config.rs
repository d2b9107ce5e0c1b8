//! Event bridge configuration.

use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Default status poll interval.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default buffer size for pushed processor events, sized by the processor
/// that owns the channel.
pub const EVENT_CHANNEL_SIZE: usize = 100;

/// Configuration for the push/poll event bridge.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct BridgeConfig {
    /// Interval between status polls, in milliseconds.
    #[builder(default = "DEFAULT_POLL_INTERVAL_MS")]
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Consecutive "not running" polls needed before an active operation
    /// is forced to `Aborted`.
    #[builder(default = "1")]
    #[serde(default = "default_idle_polls")]
    pub idle_polls_before_abort: u32,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_idle_polls() -> u32 {
    1
}

impl BridgeConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.poll_interval_ms == Some(0) {
            return Err("Poll interval must be greater than zero".to_string());
        }
        if self.idle_polls_before_abort == Some(0) {
            return Err("At least one idle poll is required before aborting".to_string());
        }
        Ok(())
    }
}

impl BridgeConfig {
    /// Create a new bridge config builder.
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    /// The poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            idle_polls_before_abort: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = BridgeConfig::builder()
            .poll_interval_ms(250u64)
            .idle_polls_before_abort(3u32)
            .build()
            .unwrap();

        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.idle_polls_before_abort, 3);
    }

    #[test]
    fn test_config_rejects_zero_interval() {
        let result = BridgeConfig::builder().poll_interval_ms(0u64).build();
        assert!(result.is_err());

        let result = BridgeConfig::builder().idle_polls_before_abort(0u32).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_config_default() {
        let config = BridgeConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.idle_polls_before_abort, 1);
    }
}
