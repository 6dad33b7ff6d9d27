// =============================================================================
// Shared types for the grid hedge engine
// =============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Which leg of the grid a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn default_true() -> bool {
    true
}

/// One configured rung of the grid. A non-positive `dollar` or `lots` is a
/// pause sentinel: the side halts at that index without executing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridLevel {
    pub index: u32,
    pub dollar: f64,
    pub lots: f64,
    #[serde(default = "default_true")]
    pub alert: bool,
}

impl GridLevel {
    pub fn is_pause_sentinel(&self) -> bool {
        self.dollar <= 0.0 || self.lots <= 0.0
    }
}

/// Bookkeeping for one executed grid level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecRecord {
    pub index: u32,
    pub entry_price: f64,
    pub lots: f64,
    #[serde(default)]
    pub profit: f64,
    pub timestamp: i64,
    #[serde(default)]
    pub cumulative_lots: f64,
    #[serde(default)]
    pub cumulative_profit: f64,
}

/// Recompute `cumulative_lots` / `cumulative_profit` as ascending-index
/// prefix sums over the map. Called after any mutation.
pub fn rederive_cumulatives(map: &mut BTreeMap<u32, ExecRecord>) {
    let mut lots = 0.0;
    let mut profit = 0.0;
    for record in map.values_mut() {
        lots += record.lots;
        profit += record.profit;
        record.cumulative_lots = lots;
        record.cumulative_profit = profit;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TakeProfitType {
    EquityPct,
    BalancePct,
    FixedMoney,
}

impl Default for TakeProfitType {
    fn default() -> Self {
        Self::FixedMoney
    }
}

fn default_rows() -> Vec<GridLevel> {
    Vec::new()
}

/// User-controlled configuration for one side of the grid. Independent per
/// side; mutated only via the settings endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(default)]
    pub limit_price: f64,
    #[serde(default)]
    pub tp_type: TakeProfitType,
    #[serde(default)]
    pub tp_value: f64,
    #[serde(default)]
    pub hedge_value: f64,
    #[serde(default = "default_rows")]
    pub rows: Vec<GridLevel>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            limit_price: 0.0,
            tp_type: TakeProfitType::FixedMoney,
            tp_value: 0.0,
            hedge_value: 0.0,
            rows: Vec::new(),
        }
    }
}

/// Live state of a single side's grid session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub waiting_limit: bool,
    #[serde(default)]
    pub start_ref: f64,
    #[serde(default)]
    pub exec_map: BTreeMap<u32, ExecRecord>,
    #[serde(default)]
    pub is_closing: bool,
    #[serde(default)]
    pub hedge_triggered: bool,
    #[serde(default)]
    pub last_order_sent_ts: i64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            enabled: false,
            session_id: String::new(),
            waiting_limit: false,
            start_ref: 0.0,
            exec_map: BTreeMap::new(),
            is_closing: false,
            hedge_triggered: false,
            last_order_sent_ts: 0,
        }
    }
}

impl SessionState {
    pub fn reset(&mut self, keep_enabled: bool) {
        self.session_id.clear();
        self.waiting_limit = false;
        self.start_ref = 0.0;
        self.exec_map.clear();
        self.is_closing = false;
        self.hedge_triggered = false;
        self.enabled = keep_enabled;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceDirection {
    Up,
    Down,
    Neutral,
}

impl Default for PriceDirection {
    fn default() -> Self {
        Self::Neutral
    }
}

/// One queued one-shot close-all instruction. Drained before per-tick
/// evaluation resumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingClose {
    pub side: Option<Side>,
    pub comment: String,
}

/// State shared by both sides: freeze flag, pending close queue, last
/// observed market snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalRuntime {
    #[serde(default)]
    pub buy: SessionState,
    #[serde(default)]
    pub sell: SessionState,
    #[serde(default)]
    pub cyclic_on: bool,
    #[serde(default)]
    pub pending_closes: std::collections::VecDeque<PendingClose>,
    #[serde(default)]
    pub last_mid: f64,
    #[serde(default)]
    pub last_ask: f64,
    #[serde(default)]
    pub last_bid: f64,
    #[serde(default)]
    pub direction: PriceDirection,
    #[serde(default)]
    pub error_status: String,
}

impl Default for GlobalRuntime {
    fn default() -> Self {
        Self {
            buy: SessionState::default(),
            sell: SessionState::default(),
            cyclic_on: false,
            pending_closes: std::collections::VecDeque::new(),
            last_mid: 0.0,
            last_ask: 0.0,
            last_bid: 0.0,
            direction: PriceDirection::Neutral,
            error_status: String::new(),
        }
    }
}

impl GlobalRuntime {
    pub fn session(&self, side: Side) -> &SessionState {
        match side {
            Side::Buy => &self.buy,
            Side::Sell => &self.sell,
        }
    }

    pub fn session_mut(&mut self, side: Side) -> &mut SessionState {
        match side {
            Side::Buy => &mut self.buy,
            Side::Sell => &mut self.sell,
        }
    }
}

/// One sample in the UI price history ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub mid: f64,
    pub timestamp: i64,
}

pub const MAX_PRICE_HISTORY: usize = 100;
pub const MAX_RECENT_ERRORS: usize = 50;

/// One reported broker position, as carried in a tick request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionReport {
    pub ticket: String,
    pub symbol: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub volume: f64,
    pub price: f64,
    #[serde(default)]
    pub profit: f64,
    #[serde(default)]
    pub comment: String,
}

/// Incoming `/api/tick` body.
#[derive(Debug, Clone, Deserialize)]
pub struct TickRequest {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub equity: f64,
    #[serde(default)]
    pub balance: f64,
    #[serde(default)]
    pub symbol: String,
    pub ask: f64,
    pub bid: f64,
    #[serde(default)]
    pub positions: Vec<PositionReport>,
}

/// Outgoing tick response. Tagged on `action` so the wire format matches
/// the terminal agent's expectations exactly.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action")]
pub enum Directive {
    #[serde(rename = "WAIT")]
    Wait {
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename = "BUY")]
    Buy {
        volume: f64,
        comment: String,
        alert: bool,
    },
    #[serde(rename = "SELL")]
    Sell {
        volume: f64,
        comment: String,
        alert: bool,
    },
    #[serde(rename = "CLOSE_ALL")]
    CloseAll { comment: String },
}

impl Directive {
    pub fn wait() -> Self {
        Directive::Wait { error: None }
    }

    pub fn wait_with_error(error: impl Into<String>) -> Self {
        Directive::Wait {
            error: Some(error.into()),
        }
    }

    pub fn entry(side: Side, volume: f64, comment: String, alert: bool) -> Self {
        match side {
            Side::Buy => Directive::Buy {
                volume,
                comment,
                alert,
            },
            Side::Sell => Directive::Sell {
                volume,
                comment,
                alert,
            },
        }
    }
}

/// Append-only ring of frozen/conflict events, for UI observability only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    pub timestamp: i64,
}
