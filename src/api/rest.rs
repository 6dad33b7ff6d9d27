// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints are open: the terminal agent polling `/api/tick` has no
// separate credential, so CORS is permissive and no bearer auth gates any
// route. This mirrors the external interface's trust model — the server
// trusts whatever process can reach it on the configured bind address.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::app_state::AppState;
use crate::dispatcher::{evaluate_tick, SettingsPair};
use crate::types::{GridLevel, PendingClose, Side, TickRequest, UserSettings};

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/tick", post(tick))
        .route("/api/update-settings", post(update_settings))
        .route("/api/control", post(control))
        .route("/api/ui-data", get(ui_data))
        .route("/api/health", get(health))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// POST /api/tick
// =============================================================================

/// Strip trailing NULs and garbage after the final `}` before parsing —
/// some MT4/MT5 terminal clients pad their POST body.
fn sanitize_tick_body(raw: &str) -> &str {
    let trimmed = raw.trim_end_matches('\0').trim_end();
    match trimmed.rfind('}') {
        Some(idx) => &trimmed[..=idx],
        None => trimmed,
    }
}

async fn tick(State(state): State<Arc<AppState>>, body: String) -> impl IntoResponse {
    let cleaned = sanitize_tick_body(&body);
    let request: TickRequest = match serde_json::from_str(cleaned) {
        Ok(r) => r,
        Err(err) => {
            warn!(error = %err, "malformed tick body, returning WAIT");
            return Json(crate::types::Directive::wait()).into_response();
        }
    };

    let now_ts = chrono::Utc::now().timestamp();
    let directive = {
        let mut snapshot = state.snapshot.lock();
        let snapshot = &mut *snapshot;
        let mut settings = SettingsPair {
            buy: &mut snapshot.settings.buy,
            sell: &mut snapshot.settings.sell,
        };
        let directive = evaluate_tick(&mut snapshot.runtime, &mut settings, &request, now_ts);
        snapshot.last_update_ts = now_ts;
        let mid = snapshot.runtime.last_mid;
        snapshot.price_history.push(mid, now_ts);
        directive
    };

    state.increment_version();
    if let crate::types::Directive::Wait {
        error: Some(ref message),
    } = directive
    {
        state.push_error(message.clone());
    }
    state.persist();

    Json(directive).into_response()
}

// =============================================================================
// POST /api/update-settings
// =============================================================================

#[derive(Debug, Deserialize)]
struct UpdateSettingsRequest {
    buy: UserSettings,
    sell: UserSettings,
}

/// Rows whose index already appears in the side's execution map keep the
/// `dollar`/`lots` they were configured with before this update; only
/// `alert` may change through the settings endpoint once a level has
/// fired. Rows that have not executed are replaced wholesale by the
/// incoming list.
fn apply_locked_rows(
    incoming: Vec<GridLevel>,
    old_rows: &[GridLevel],
    exec_map: &std::collections::BTreeMap<u32, crate::types::ExecRecord>,
) -> Vec<GridLevel> {
    incoming
        .into_iter()
        .map(|mut row| {
            if exec_map.contains_key(&row.index) {
                if let Some(original) = old_rows.iter().find(|r| r.index == row.index) {
                    row.dollar = original.dollar;
                    row.lots = original.lots;
                }
            }
            row
        })
        .filter(|row| !row.is_pause_sentinel())
        .collect()
}

async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UpdateSettingsRequest>,
) -> impl IntoResponse {
    if payload.buy.tp_value < 0.0
        || payload.sell.tp_value < 0.0
        || payload.buy.hedge_value < 0.0
        || payload.sell.hedge_value < 0.0
    {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "tp_value and hedge_value must be non-negative" })),
        )
            .into_response();
    }

    {
        let mut snapshot = state.snapshot.lock();
        let buy_rows = apply_locked_rows(
            payload.buy.rows.clone(),
            &snapshot.settings.buy.rows,
            &snapshot.runtime.buy.exec_map,
        );
        let sell_rows = apply_locked_rows(
            payload.sell.rows.clone(),
            &snapshot.settings.sell.rows,
            &snapshot.runtime.sell.exec_map,
        );
        snapshot.settings.buy = UserSettings {
            rows: buy_rows,
            ..payload.buy
        };
        snapshot.settings.sell = UserSettings {
            rows: sell_rows,
            ..payload.sell
        };
    }

    state.increment_version();
    state.persist();
    StatusCode::OK.into_response()
}

// =============================================================================
// POST /api/control
// =============================================================================

#[derive(Debug, Deserialize, Default)]
struct ControlRequest {
    buy_switch: Option<bool>,
    sell_switch: Option<bool>,
    cyclic: Option<bool>,
    #[serde(default)]
    emergency_close: bool,
}

#[derive(Debug, Serialize)]
struct ControlResponse {
    ok: bool,
}

fn apply_switch(
    runtime: &mut crate::types::GlobalRuntime,
    side: Side,
    new_value: bool,
) {
    let session = runtime.session(side);
    let was_enabled = session.enabled;
    if was_enabled && !new_value && !session.session_id.is_empty() {
        let session_id = session.session_id.clone();
        runtime.session_mut(side).is_closing = true;
        runtime.pending_closes.push_back(PendingClose {
            side: Some(side),
            comment: session_id,
        });
    }
    runtime.session_mut(side).enabled = new_value;
}

async fn control(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ControlRequest>,
) -> impl IntoResponse {
    {
        let mut snapshot = state.snapshot.lock();
        if let Some(value) = payload.buy_switch {
            apply_switch(&mut snapshot.runtime, Side::Buy, value);
        }
        if let Some(value) = payload.sell_switch {
            apply_switch(&mut snapshot.runtime, Side::Sell, value);
        }
        if let Some(cyclic) = payload.cyclic {
            snapshot.runtime.cyclic_on = cyclic;
        }
        if payload.emergency_close {
            snapshot.runtime.buy.enabled = false;
            snapshot.runtime.sell.enabled = false;
            snapshot.runtime.cyclic_on = false;
            snapshot.runtime.buy.is_closing = true;
            snapshot.runtime.sell.is_closing = true;
            snapshot.runtime.pending_closes.push_back(PendingClose {
                side: None,
                comment: "server".to_string(),
            });
            snapshot.runtime.error_status.clear();
        }
    }

    state.increment_version();
    state.persist();
    Json(ControlResponse { ok: true })
}

// =============================================================================
// GET /api/ui-data
// =============================================================================

async fn ui_data(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_ui_snapshot())
}

// =============================================================================
// GET /api/health
// =============================================================================

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_health_snapshot())
}
