// =============================================================================
// Persistence — atomic load/save of the full engine snapshot
// =============================================================================
//
// Persists settings, runtime state, and price history to a single JSON
// file. Uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older snapshot.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::{GlobalRuntime, PricePoint, Side, UserSettings, MAX_PRICE_HISTORY};

/// Per-side settings, keyed explicitly rather than by a map so the JSON
/// shape is stable and self-documenting.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettingsBySide {
    #[serde(default)]
    pub buy: UserSettings,
    #[serde(default)]
    pub sell: UserSettings,
}

impl SettingsBySide {
    pub fn for_side(&self, side: Side) -> &UserSettings {
        match side {
            Side::Buy => &self.buy,
            Side::Sell => &self.sell,
        }
    }

    pub fn for_side_mut(&mut self, side: Side) -> &mut UserSettings {
        match side {
            Side::Buy => &mut self.buy,
            Side::Sell => &mut self.sell,
        }
    }
}

/// Bounded ring of recent mid-price samples, UI-only.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PriceHistory {
    #[serde(default)]
    pub points: Vec<PricePoint>,
}

impl PriceHistory {
    pub fn push(&mut self, mid: f64, timestamp: i64) {
        self.points.push(PricePoint { mid, timestamp });
        while self.points.len() > MAX_PRICE_HISTORY {
            self.points.remove(0);
        }
    }
}

/// The complete persisted state of the engine.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineSnapshot {
    #[serde(default)]
    pub settings: SettingsBySide,
    #[serde(default)]
    pub runtime: GlobalRuntime,
    #[serde(default)]
    pub last_update_ts: i64,
    #[serde(default)]
    pub price_history: PriceHistory,
}

impl EngineSnapshot {
    /// Load a snapshot from `path`. A missing or unreadable file is
    /// treated as a fresh start by the caller.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine state from {}", path.display()))?;

        let snapshot: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine state from {}", path.display()))?;

        info!(path = %path.display(), "engine state loaded");
        Ok(snapshot)
    }

    /// Persist the snapshot to `path` using an atomic write (write to
    /// `.tmp`, then rename), so a crash mid-write never leaves a
    /// half-written state file behind.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content =
            serde_json::to_string_pretty(self).context("failed to serialise engine state to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp engine state to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp engine state to {}", path.display()))?;

        Ok(())
    }

    /// Load from `path`, falling back to a fresh default snapshot (with a
    /// warning) when the file is missing or unreadable.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(&path) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(error = %err, "no usable engine state found, starting fresh");
                Self::default()
            }
        }
    }
}
