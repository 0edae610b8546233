use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu, ensure};

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::frame_queue::DEFAULT_FRAME_INTERVAL_MS;
use crate::viewport::{
    DEFAULT_DEBOUNCE_MS, DEFAULT_NEAR_BOTTOM_PX, DEFAULT_SCROLL_THRESHOLD_PX, ScrollBehavior,
    ViewportThresholds,
};

pub const CONFIG_DIRECTORY_NAME: &str = "scrollback";
pub const CONFIG_FILE_NAME: &str = "scrollback.json";
pub const ENV_PREFIX: &str = "SCROLLBACK_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollbackConfig {
    pub scroll_threshold_px: f32,
    pub near_bottom_px: f32,
    pub debounce_ms: u64,
    pub cache_capacity: usize,
    pub frame_interval_ms: u64,
    /// Mode used when restoring the anchor after a prepend.
    pub correction_behavior: ScrollBehavior,
    /// Mode used when following new messages to the bottom.
    pub follow_behavior: ScrollBehavior,
}

impl Default for ScrollbackConfig {
    fn default() -> Self {
        Self {
            scroll_threshold_px: DEFAULT_SCROLL_THRESHOLD_PX,
            near_bottom_px: DEFAULT_NEAR_BOTTOM_PX,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
            correction_behavior: ScrollBehavior::Immediate,
            follow_behavior: ScrollBehavior::Smooth,
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("failed to extract scrollback config on `{stage}`: {source}"))]
    Extract {
        stage: &'static str,
        source: figment::Error,
    },
    #[snafu(display("invalid scrollback config value for `{field}`: {details}"))]
    InvalidValue {
        stage: &'static str,
        field: &'static str,
        details: String,
    },
}

impl ScrollbackConfig {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(CONFIG_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".scrollback"))
            .join(CONFIG_FILE_NAME)
    }

    /// Defaults, then the JSON file (when present), then `SCROLLBACK_*` variables.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Json::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = Self::figment(path)
            .extract::<Self>()
            .context(ExtractSnafu {
                stage: "extract-scrollback-config",
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(error) => {
                tracing::warn!("failed to load scrollback config: {}. using defaults", error);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("scroll_threshold_px", self.scroll_threshold_px),
            ("near_bottom_px", self.near_bottom_px),
        ] {
            ensure!(
                value.is_finite() && value >= 0.0,
                InvalidValueSnafu {
                    stage: "validate-scrollback-config",
                    field,
                    details: format!("expected a finite, non-negative pixel value, got {value}"),
                }
            );
        }
        ensure!(
            self.frame_interval_ms > 0,
            InvalidValueSnafu {
                stage: "validate-scrollback-config",
                field: "frame_interval_ms",
                details: "frame interval must be at least 1ms".to_string(),
            }
        );
        ensure!(
            self.cache_capacity > 0,
            InvalidValueSnafu {
                stage: "validate-scrollback-config",
                field: "cache_capacity",
                details: "render cache needs room for at least one entry".to_string(),
            }
        );
        Ok(())
    }

    pub fn thresholds(&self) -> ViewportThresholds {
        ViewportThresholds {
            scroll_threshold_px: self.scroll_threshold_px,
            near_bottom_px: self.near_bottom_px,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}
