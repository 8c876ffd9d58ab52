//! Configuration management.

use serde::Deserialize;

/// Main core configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoreConfig {
    /// Change source channel configuration
    #[serde(default)]
    pub channels: ChannelConfig,

    /// Reconciler configuration
    #[serde(default)]
    pub reconciler: ReconcilerConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    /// Per-source channel capacity
    #[serde(default = "default_channel_capacity")]
    pub capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: default_channel_capacity(),
        }
    }
}

/// Policy for child-group events whose parent entity is not yet in the store.
///
/// The change sources give no causal ordering guarantee, so a shirt or
/// attendance event can arrive before its person's identity event. `Drop`
/// loses the event (original behavior); `Buffer` parks it in a bounded
/// per-entity queue and replays it when the identity event lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    Drop,
    Buffer,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerConfig {
    /// What to do with child-group events for unknown entities
    #[serde(default = "default_orphan_policy")]
    pub orphan_policy: OrphanPolicy,

    /// Per-entity capacity of the orphan buffer
    #[serde(default = "default_orphan_buffer_capacity")]
    pub orphan_buffer_capacity: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            orphan_policy: default_orphan_policy(),
            orphan_buffer_capacity: default_orphan_buffer_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
        }
    }
}

// Default value functions
fn default_channel_capacity() -> usize { 256 }
fn default_orphan_policy() -> OrphanPolicy { OrphanPolicy::Buffer }
fn default_orphan_buffer_capacity() -> usize { 16 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }

impl CoreConfig {
    /// Load configuration from environment variables.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("ROSTER").separator("__"))
            .build()?;

        let cfg: CoreConfig = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("ROSTER").separator("__"))
            .build()?;

        let cfg: CoreConfig = config.try_deserialize()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.channels.capacity, 256);
        assert_eq!(cfg.reconciler.orphan_policy, OrphanPolicy::Buffer);
        assert_eq!(cfg.reconciler.orphan_buffer_capacity, 16);
        assert_eq!(cfg.observability.log_level, "info");
    }

    #[test]
    fn test_orphan_policy_deserializes_lowercase() {
        let policy: OrphanPolicy = serde_json::from_str("\"drop\"").unwrap();
        assert_eq!(policy, OrphanPolicy::Drop);
        let policy: OrphanPolicy = serde_json::from_str("\"buffer\"").unwrap();
        assert_eq!(policy, OrphanPolicy::Buffer);
    }
}
