use crate::road_snap::SnapConfig;
use crate::shape_synthesis::cluster::ClusterConfig;
use crate::shape_synthesis::layout::LayoutConfig;
use crate::shape_synthesis::shape::ShapeConfig;
use crate::shape_synthesis::smoothing::SmoothingConfig;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Overrides `snap.base_url` when set.
pub const ROUTING_URL_ENV: &str = "LASTMILE_ROUTING_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

/// Every tuned number of the pipeline. Missing fields keep their defaults, so
/// a config file only lists what it changes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub cluster: ClusterConfig,
    pub shape: ShapeConfig,
    pub smoothing: SmoothingConfig,
    pub layout: LayoutConfig,
    pub snap: SnapConfig,
    /// Deadline for the whole optimise action, snapping included.
    pub optimise_deadline_ms: u64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            cluster: ClusterConfig::default(),
            shape: ShapeConfig::default(),
            smoothing: SmoothingConfig::default(),
            layout: LayoutConfig::default(),
            snap: SnapConfig::default(),
            optimise_deadline_ms: 5_000,
        }
    }
}

impl DashboardConfig {
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str::<DashboardConfig>(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron(&text)
    }

    /// Applies environment overrides on top of whatever was loaded.
    pub fn with_env_overrides(self) -> Self {
        self.with_routing_url(std::env::var(ROUTING_URL_ENV).ok())
    }

    fn with_routing_url(mut self, url: Option<String>) -> Self {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            tracing::info!("routing url overridden to {}", url);
            self.snap.base_url = url;
        }
        self
    }
}
