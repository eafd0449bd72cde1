//! Persisted settings - survives restarts
//!
//! A single pretty-printed JSON document holding the last timeframe, the
//! exchange backend and tuned parameter sets per strategy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};

const SETTINGS_FILE: &str = "settings.json";

/// Tuned parameters for one strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunedParams {
    pub params: Value,
    pub win_rate: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Kept as text so a stale value cannot poison the whole document
    pub timeframe: Option<String>,
    pub exchange_backend: Option<String>,
    pub tuned: BTreeMap<String, TunedParams>,
}

pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
}

impl SettingsStore {
    /// `<data dir>/trading-engine/settings.json`, or the working directory
    /// when the platform has no data dir.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .map(|d| d.join("trading-engine"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(SETTINGS_FILE)
    }

    /// Store that starts empty and is never read from disk until saved.
    pub fn in_memory(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            settings: Settings::default(),
        }
    }

    /// Load from `path`. A missing file yields empty settings.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let settings = match fs::read_to_string(&path).await {
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                EngineError::Settings(format!("{}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings file at {:?}, starting fresh", path);
                Settings::default()
            }
            Err(e) => return Err(e.into()),
        };
        info!("Settings loaded from {:?}", path);
        Ok(Self { path, settings })
    }

    /// Load, falling back to empty settings if the file is unreadable.
    pub async fn load_or_default(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::load(path.clone()).await {
            Ok(store) => store,
            Err(e) => {
                warn!("Ignoring unreadable settings: {}", e);
                Self::in_memory(path)
            }
        }
    }

    pub async fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.path, json).await?;
        debug!("Wrote {:?}", self.path);
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn timeframe(&self) -> Option<&str> {
        self.settings.timeframe.as_deref()
    }

    pub fn set_timeframe(&mut self, timeframe: &str) {
        self.settings.timeframe = Some(timeframe.to_string());
    }

    pub fn exchange_backend(&self) -> Option<&str> {
        self.settings.exchange_backend.as_deref()
    }

    pub fn set_exchange_backend(&mut self, backend: &str) {
        self.settings.exchange_backend = Some(backend.to_string());
    }

    pub fn tuned(&self, strategy: &str) -> Option<&TunedParams> {
        self.settings.tuned.get(strategy)
    }

    pub fn set_tuned(&mut self, strategy: &str, params: Value, win_rate: f64) {
        self.settings.tuned.insert(
            strategy.to_string(),
            TunedParams {
                params,
                win_rate,
                updated_at: Utc::now(),
            },
        );
    }
}
