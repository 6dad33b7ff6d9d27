// =============================================================================
// Take-Profit Evaluator
// =============================================================================
//
// Compares a side's summed floating + realised profit against a configured
// target. The target shape depends on `tp_type`: a percentage of equity, a
// percentage of balance, or a flat money amount.
// =============================================================================

use crate::types::{PositionReport, TakeProfitType, UserSettings};

/// Sum `profit` across positions whose comment carries the given session
/// id. Per design, this sums raw broker-reported positions, not the
/// execution map — the two can diverge briefly after a partial close.
pub fn session_profit(positions: &[PositionReport], session_id: &str) -> f64 {
    if session_id.is_empty() {
        return 0.0;
    }
    positions
        .iter()
        .filter(|p| p.comment.starts_with(session_id))
        .map(|p| p.profit)
        .sum()
}

fn target(settings: &UserSettings, equity: f64, balance: f64) -> f64 {
    match settings.tp_type {
        TakeProfitType::EquityPct => equity * settings.tp_value / 100.0,
        TakeProfitType::BalancePct => balance * settings.tp_value / 100.0,
        TakeProfitType::FixedMoney => settings.tp_value,
    }
}

/// `true` when the side's profit has reached its configured take-profit
/// target. A side with no active session or a non-positive target is
/// never evaluated.
pub fn is_hit(
    session_id: &str,
    settings: &UserSettings,
    positions: &[PositionReport],
    equity: f64,
    balance: f64,
) -> bool {
    if session_id.is_empty() || settings.tp_value <= 0.0 {
        return false;
    }
    let t = target(settings, equity, balance);
    if t <= 0.0 {
        return false;
    }
    session_profit(positions, session_id) >= t
}
