use std::env;

/// Engine tunables. Protocol constants (the typing idle window, the
/// protocol-code prefix) are fixed in their modules and intentionally not
/// configurable here.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Capacity of the store's change-event bus. A subscriber that lags
    /// behind by more than this many events re-reads the full view.
    pub event_bus_capacity: usize,
    /// Buffered depth of each live-view channel.
    pub live_channel_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_bus_capacity: 1000,
            live_channel_depth: 64,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the environment, falling back to defaults
    /// for anything unset or unparsable.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        Self {
            event_bus_capacity: env_usize(
                "HELPDESK_EVENT_BUS_CAPACITY",
                defaults.event_bus_capacity,
            ),
            live_channel_depth: env_usize("HELPDESK_LIVE_CHANNEL_DEPTH", defaults.live_channel_depth),
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|&v| v > 0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert!(cfg.event_bus_capacity >= 16);
        assert!(cfg.live_channel_depth >= 1);
    }

    #[test]
    fn from_env_produces_usable_values() {
        let cfg = EngineConfig::from_env();
        assert!(cfg.event_bus_capacity > 0);
        assert!(cfg.live_channel_depth > 0);
    }

    #[test]
    fn env_parsing_falls_back_on_garbage() {
        assert_eq!(env_usize("HELPDESK_TEST_UNSET_KEY", 7), 7);
        env::set_var("HELPDESK_TEST_GARBAGE_KEY", "not-a-number");
        assert_eq!(env_usize("HELPDESK_TEST_GARBAGE_KEY", 7), 7);
        env::set_var("HELPDESK_TEST_ZERO_KEY", "0");
        assert_eq!(env_usize("HELPDESK_TEST_ZERO_KEY", 7), 7);
        env::remove_var("HELPDESK_TEST_GARBAGE_KEY");
        env::remove_var("HELPDESK_TEST_ZERO_KEY");
    }
}
