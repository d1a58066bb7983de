use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Tunables that are not part of the fitted scene geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cuff_sound: String,
    pub uncuff_sound: String,
    pub sound_volume: f32,
    pub sound_distance: f32,
    pub prop_model: String,
    pub prop_search_radius: f32,
    pub tick_ms: u64,
    pub anim_load_retry_ms: u64,
    pub anim_load_budget_ms: u64,
    pub model_request_budget_ms: u64,
    pub model_load_budget_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cuff_sound: "handcuffsPutOn".to_string(),
            uncuff_sound: "handcuffsTakenOff".to_string(),
            sound_volume: 0.25,
            sound_distance: 0.2,
            prop_model: "p_cs_cuffs_02_s".to_string(),
            prop_search_radius: 4.0,
            tick_ms: 10,
            anim_load_retry_ms: 100,
            anim_load_budget_ms: 10_000,
            model_request_budget_ms: 250,
            model_load_budget_ms: 2_000,
        }
    }
}

impl EngineConfig {
    /// Reads a JSON config; a missing path yields the defaults.
    pub fn from_json_file(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config: {}", path.display()))?;
        let config: EngineConfig = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse engine config json: {}", path.display()))?;
        Ok(config)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn anim_load_retry(&self) -> Duration {
        Duration::from_millis(self.anim_load_retry_ms.max(1))
    }

    pub fn anim_load_budget(&self) -> Duration {
        Duration::from_millis(self.anim_load_budget_ms)
    }

    pub fn model_request_budget(&self) -> Duration {
        Duration::from_millis(self.model_request_budget_ms)
    }

    pub fn model_load_budget(&self) -> Duration {
        Duration::from_millis(self.model_load_budget_ms)
    }
}
