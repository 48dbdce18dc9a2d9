//! # Store Configuration
//!
//! Capacities and stream behaviour, fixed when the store is built.
//!
//! ```toml
//! max_entities = 8192
//! chunk_arena_bytes = 131072
//! default_component_capacity = 512
//! submit_mode = "replace"
//! tick_hz = 30
//!
//! [component_capacity]
//! skin = 64
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::sync::SubmitMode;

/// Store configuration. Every field has a default.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Capacity of the entity pool and every per-entity side table.
    pub max_entities: usize,
    /// Size of the chunk arena in bytes.
    pub chunk_arena_bytes: usize,
    /// Maximum number of simultaneously live chunks.
    pub max_chunks: usize,
    /// Capacity of component caches with no override.
    pub default_component_capacity: usize,
    /// Per-type capacity overrides keyed by `Component::NAME`.
    pub component_capacity: HashMap<String, usize>,
    /// Events pre-allocated per render buffer. Follows `max_entities` when unset.
    pub render_events_capacity: Option<usize>,
    /// What `submit` does when the render thread lags.
    pub submit_mode: SubmitMode,
    /// Simulation ticks per second.
    pub tick_hz: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_entities: 4096,
            chunk_arena_bytes: 64 * 1024,
            max_chunks: 1024,
            default_component_capacity: 1024,
            component_capacity: HashMap::new(),
            render_events_capacity: None,
            submit_mode: SubmitMode::Block,
            tick_hz: 60,
        }
    }
}

impl StoreConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidConfig`] on parse or validation failure.
    pub fn from_toml_str(source: &str) -> StoreResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| StoreError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks capacities and rates.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> StoreResult<()> {
        let invalid = |msg: String| -> StoreResult<()> { Err(StoreError::InvalidConfig(msg)) };

        if self.max_entities == 0 || self.max_entities >= u32::MAX as usize {
            return invalid(format!(
                "max_entities must be in 1..{}, got {}",
                u32::MAX,
                self.max_entities
            ));
        }
        if self.max_chunks == 0 {
            return invalid("max_chunks must be greater than zero".into());
        }
        if self.default_component_capacity == 0 {
            return invalid("default_component_capacity must be greater than zero".into());
        }
        if let Some((name, _)) = self.component_capacity.iter().find(|(_, cap)| **cap == 0) {
            return invalid(format!("component_capacity.{name} must be greater than zero"));
        }
        if self.render_events_capacity == Some(0) {
            return invalid("render_events_capacity must be greater than zero".into());
        }
        if self.tick_hz == 0 {
            return invalid("tick_hz must be greater than zero".into());
        }
        Ok(())
    }

    /// Capacity for a component type, honouring overrides.
    #[must_use]
    pub fn component_capacity_for(&self, name: &str) -> usize {
        self.component_capacity
            .get(name)
            .copied()
            .unwrap_or(self.default_component_capacity)
    }

    /// Events pre-allocated per render buffer.
    #[must_use]
    pub fn events_capacity(&self) -> usize {
        self.render_events_capacity.unwrap_or(self.max_entities)
    }

    /// Length of one simulation tick.
    #[must_use]
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs(1) / self.tick_hz.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = StoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_entities, 4096);
        assert_eq!(config.chunk_arena_bytes, 65536);
        assert_eq!(config.submit_mode, SubmitMode::Block);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = StoreConfig::from_toml_str(
            r#"
            max_entities = 128
            submit_mode = "replace"
            tick_hz = 50

            [component_capacity]
            skin = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.max_entities, 128);
        assert_eq!(config.submit_mode, SubmitMode::Replace);
        assert_eq!(config.tick_duration(), Duration::from_millis(20));
        assert_eq!(config.component_capacity_for("skin"), 8);
        assert_eq!(config.component_capacity_for("health"), 1024);
        assert_eq!(config.max_chunks, 1024);
        assert_eq!(config.events_capacity(), 128);
    }

    #[test]
    fn test_events_capacity_override() {
        let config = StoreConfig::from_toml_str("render_events_capacity = 32").unwrap();
        assert_eq!(config.events_capacity(), 32);
        assert_eq!(StoreConfig::default().events_capacity(), 4096);

        let err = StoreConfig::from_toml_str("render_events_capacity = 0").unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfig(msg) if msg.contains("render_events")));
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let err = StoreConfig::from_toml_str("max_entities = 0").unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfig(_)));

        let err = StoreConfig::from_toml_str("[component_capacity]\nskin = 0").unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfig(msg) if msg.contains("skin")));
    }

    #[test]
    fn test_rejects_unknown_mode() {
        assert!(StoreConfig::from_toml_str("submit_mode = \"sometimes\"").is_err());
    }
}
