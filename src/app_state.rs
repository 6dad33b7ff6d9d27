// =============================================================================
// Central Application State — grid hedge engine
// =============================================================================
//
// The single source of truth for the engine. Every tick, settings update,
// and control request is serialised through one `parking_lot::Mutex`
// guarding the whole engine snapshot — there is no finer-grained locking,
// because every request is a read-modify-write and reads are never hot
// enough to justify an `RwLock`.
// =============================================================================

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;

use crate::persistence::EngineSnapshot;
use crate::types::{ErrorRecord, Side, MAX_RECENT_ERRORS};

/// Central application state shared across all request handlers via
/// `Arc<AppState>`.
pub struct AppState {
    /// Monotonically increasing counter, bumped on every mutating tick or
    /// control/settings call. Lets a UI cheaply detect "nothing changed
    /// since my last poll" without diffing the whole snapshot.
    pub state_version: AtomicU64,

    /// The full engine snapshot: settings, runtime session state, price
    /// history. Every tick handler holds this lock for its entire
    /// duration, including the synchronous file write.
    pub snapshot: Mutex<EngineSnapshot>,

    /// Append-only ring of freeze/conflict events, for UI observability.
    pub recent_errors: Mutex<Vec<ErrorRecord>>,

    /// Where the snapshot is persisted.
    pub state_path: PathBuf,

    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(snapshot: EngineSnapshot, state_path: PathBuf) -> Self {
        Self {
            state_version: AtomicU64::new(1),
            snapshot: Mutex::new(snapshot),
            recent_errors: Mutex::new(Vec::new()),
            state_path,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    /// Record a freeze/conflict event. The ring buffer is capped at
    /// [`MAX_RECENT_ERRORS`]; oldest entries are evicted when the limit is
    /// reached. Does not clear `error_status` itself — that is the
    /// reconciler's and the control endpoint's job.
    pub fn push_error(&self, message: String) {
        let record = ErrorRecord {
            message,
            timestamp: Utc::now().timestamp(),
        };
        let mut errors = self.recent_errors.lock();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
    }

    /// Persist the current snapshot, logging but not propagating failure —
    /// the engine keeps running in-memory even if the disk write fails.
    pub fn persist(&self) {
        let snapshot = self.snapshot.lock();
        if let Err(err) = snapshot.save(&self.state_path) {
            tracing::error!(error = %err, path = %self.state_path.display(), "failed to persist engine state");
        }
    }

    /// Build the read-only payload served by `GET /api/ui-data`.
    pub fn build_ui_snapshot(&self) -> UiSnapshot {
        let snapshot = self.snapshot.lock();
        UiSnapshot {
            state_version: self.current_state_version(),
            settings: snapshot.settings.clone(),
            runtime: snapshot.runtime.clone(),
            last_update_ts: snapshot.last_update_ts,
            price_history: snapshot.price_history.clone(),
            recent_errors: self.recent_errors.lock().clone(),
        }
    }

    /// Build the compact payload served by `GET /api/health`.
    pub fn build_health_snapshot(&self) -> HealthSnapshot {
        let snapshot = self.snapshot.lock();
        HealthSnapshot {
            status: if snapshot.runtime.error_status.is_empty() {
                "healthy".to_string()
            } else {
                "error".to_string()
            },
            error: if snapshot.runtime.error_status.is_empty() {
                None
            } else {
                Some(snapshot.runtime.error_status.clone())
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            buy: side_summary(&snapshot, Side::Buy),
            sell: side_summary(&snapshot, Side::Sell),
            price: snapshot.runtime.last_mid,
        }
    }
}

fn side_summary(snapshot: &EngineSnapshot, side: Side) -> SideSummary {
    let session = snapshot.runtime.session(side);
    SideSummary {
        enabled: session.enabled,
        session_id: session.session_id.clone(),
        is_closing: session.is_closing,
        hedge_triggered: session.hedge_triggered,
        executed_levels: session.exec_map.len(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SideSummary {
    pub enabled: bool,
    pub session_id: String,
    pub is_closing: bool,
    pub hedge_triggered: bool,
    pub executed_levels: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub version: String,
    pub buy: SideSummary,
    pub sell: SideSummary,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UiSnapshot {
    pub state_version: u64,
    pub settings: crate::persistence::SettingsBySide,
    pub runtime: crate::types::GlobalRuntime,
    pub last_update_ts: i64,
    pub price_history: crate::persistence::PriceHistory,
    pub recent_errors: Vec<ErrorRecord>,
}
