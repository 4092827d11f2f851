//! Configuration and presets for the engagement engine.
//!
//! Provides sensible defaults with the ability to customize behavior
//! through the builder pattern.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Preset configurations for common use cases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Preset {
    /// Balanced defaults for a foreground feed.
    #[default]
    Default,
    /// Tight timings for a chatty, always-visible feed.
    /// - Short confirmation window (2s)
    /// - Fast first reconnect (250ms)
    Responsive,
    /// Conservative timings for background or metered use.
    /// - Long confirmation window (10s)
    /// - Slow reconnect, capped at 5 minutes
    LowPower,
}

impl Preset {
    /// How long a mutation may wait for its echo before settling.
    pub fn confirm_window(&self) -> Duration {
        match self {
            Preset::Default => Duration::from_secs(5),
            Preset::Responsive => Duration::from_secs(2),
            Preset::LowPower => Duration::from_secs(10),
        }
    }

    /// First reconnect delay.
    pub fn backoff_base(&self) -> Duration {
        match self {
            Preset::Default => Duration::from_millis(500),
            Preset::Responsive => Duration::from_millis(250),
            Preset::LowPower => Duration::from_secs(2),
        }
    }

    /// Reconnect delay cap.
    pub fn backoff_max(&self) -> Duration {
        match self {
            Preset::Default => Duration::from_secs(60),
            Preset::Responsive => Duration::from_secs(30),
            Preset::LowPower => Duration::from_secs(300),
        }
    }
}

/// Configuration for the engagement engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Configuration preset this config was derived from.
    pub preset: Preset,
    /// Window after which an unconfirmed mutation settles without revert.
    #[serde(with = "duration_ms")]
    pub confirm_window: Duration,
    /// First reconnect delay.
    #[serde(with = "duration_ms")]
    pub backoff_base: Duration,
    /// Reconnect delay cap.
    #[serde(with = "duration_ms")]
    pub backoff_max: Duration,
    /// Consecutive connect failures before connectivity is reported degraded.
    pub degraded_after: u32,
    /// Add up to this fraction of random jitter to each reconnect delay.
    pub backoff_jitter: f64,
    /// Capacity of the record-change broadcast channel.
    pub change_capacity: usize,
    /// Capacity of the notification broadcast channel.
    pub notification_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_preset(Preset::Default)
    }
}

impl EngineConfig {
    /// Create a configuration from a preset.
    pub fn from_preset(preset: Preset) -> Self {
        Self {
            preset,
            confirm_window: preset.confirm_window(),
            backoff_base: preset.backoff_base(),
            backoff_max: preset.backoff_max(),
            degraded_after: 3,
            backoff_jitter: 0.2,
            change_capacity: 1024,
            notification_capacity: 256,
        }
    }

    /// Configuration for tests: no jitter, short windows.
    pub fn testing() -> Self {
        Self {
            confirm_window: Duration::from_millis(500),
            backoff_base: Duration::from_millis(10),
            backoff_max: Duration::from_millis(80),
            backoff_jitter: 0.0,
            ..Self::default()
        }
    }
}

/// Builder for an [`EngineConfig`].
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new builder with a preset configuration.
    pub fn with_preset(preset: Preset) -> Self {
        Self {
            config: EngineConfig::from_preset(preset),
        }
    }

    /// Set the confirmation window.
    pub fn confirm_window(mut self, window: Duration) -> Self {
        self.config.confirm_window = window;
        self
    }

    /// Set reconnect backoff bounds.
    pub fn backoff(mut self, base: Duration, max: Duration) -> Self {
        self.config.backoff_base = base;
        self.config.backoff_max = max.max(base);
        self
    }

    /// Set the jitter fraction (clamped to 0.0..=1.0).
    pub fn backoff_jitter(mut self, jitter: f64) -> Self {
        self.config.backoff_jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Set the degraded-connectivity threshold.
    pub fn degraded_after(mut self, failures: u32) -> Self {
        self.config.degraded_after = failures.max(1);
        self
    }

    /// Set broadcast channel capacities.
    pub fn channel_capacity(mut self, changes: usize, notifications: usize) -> Self {
        self.config.change_capacity = changes.max(1);
        self.config.notification_capacity = notifications.max(1);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> EngineConfig {
        self.config
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
