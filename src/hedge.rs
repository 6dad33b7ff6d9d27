// =============================================================================
// Cross-Hedge Controller
// =============================================================================
//
// Reacts to one side's floating loss by injecting a lump-sum volume into
// the opposite side. Mode A starts a fresh session on the opposite side
// when it is idle, replacing its configured rows with a single absorbing
// level. Mode B appends a new level sized to close the distance between
// the opposite side's last execution and the current market, so the
// injected level coincides with the present tick rather than waiting for
// the planner to walk down to it. Both modes mutate the opposite side's
// `rows` as well as its `exec_map`, keeping the two in sync.
// =============================================================================

use crate::ids::new_session_id;
use crate::types::{Directive, ExecRecord, GlobalRuntime, GridLevel, PositionReport, Side, UserSettings};

/// Sum of `volume` across positions carrying the given session id.
fn session_volume(positions: &[PositionReport], session_id: &str) -> f64 {
    positions
        .iter()
        .filter(|p| p.comment.starts_with(session_id))
        .map(|p| p.volume)
        .sum()
}

/// Check side `a` for a hedge-triggering loss and, if triggered, inject
/// volume into the opposite side. Returns the entry directive to issue for
/// the opposite side this tick, if any. `b_settings` is the opposite
/// side's configured rows, mutated in place to reflect the injected level.
pub fn evaluate(
    a_side: Side,
    runtime: &mut GlobalRuntime,
    hedge_value: f64,
    positions: &[PositionReport],
    now_ts: i64,
    opposite_ask: f64,
    opposite_bid: f64,
    b_settings: &mut UserSettings,
) -> Option<Directive> {
    let a = runtime.session(a_side);
    if !a.enabled
        || a.session_id.is_empty()
        || a.is_closing
        || a.hedge_triggered
        || hedge_value <= 0.0
    {
        return None;
    }
    let a_profit = session_profit(positions, &a.session_id);
    if a_profit > -hedge_value {
        return None;
    }

    let hedge_lots = session_volume(positions, &a.session_id);
    runtime.session_mut(a_side).hedge_triggered = true;
    if hedge_lots <= 0.0 {
        return None;
    }

    let b_side = a_side.opposite();
    let b = runtime.session(b_side);
    if b.is_closing {
        return None;
    }

    let b_entry_price = match b_side {
        Side::Buy => opposite_ask,
        Side::Sell => opposite_bid,
    };

    if !b.enabled || b.session_id.is_empty() || b.exec_map.is_empty() {
        // Mode A: opposite side is idle, start a fresh absorbing session.
        let session_id = new_session_id(b_side);
        let index = 0u32;
        b_settings.rows = vec![GridLevel {
            index,
            dollar: 0.0,
            lots: hedge_lots,
            alert: true,
        }];
        let b = runtime.session_mut(b_side);
        b.enabled = true;
        b.session_id = session_id.clone();
        b.start_ref = b_entry_price;
        b.waiting_limit = false;
        b.exec_map.clear();
        b.exec_map.insert(
            index,
            ExecRecord {
                index,
                entry_price: b_entry_price,
                lots: hedge_lots,
                profit: 0.0,
                timestamp: now_ts,
                cumulative_lots: hedge_lots,
                cumulative_profit: 0.0,
            },
        );
        b.last_order_sent_ts = now_ts;
        Some(Directive::entry(
            b_side,
            hedge_lots,
            format!("{session_id}_idx{index}"),
            true,
        ))
    } else {
        // Mode B: opposite side already running, append an absorbing level.
        let last_index = *b.exec_map.keys().next_back().expect("checked non-empty");
        let last_price = b
            .exec_map
            .get(&last_index)
            .map(|r| r.entry_price)
            .unwrap_or(b_entry_price);
        let new_index = last_index + 1;
        let gap = (b_entry_price - last_price).abs();
        let session_id = b.session_id.clone();
        b_settings.rows.push(GridLevel {
            index: new_index,
            dollar: gap,
            lots: hedge_lots,
            alert: true,
        });
        let b = runtime.session_mut(b_side);
        b.exec_map.insert(
            new_index,
            ExecRecord {
                index: new_index,
                entry_price: b_entry_price,
                lots: hedge_lots,
                profit: 0.0,
                timestamp: now_ts,
                cumulative_lots: 0.0,
                cumulative_profit: 0.0,
            },
        );
        crate::types::rederive_cumulatives(&mut b.exec_map);
        b.last_order_sent_ts = now_ts;
        Some(Directive::entry(
            b_side,
            hedge_lots,
            format!("{session_id}_idx{new_index}"),
            true,
        ))
    }
}

fn session_profit(positions: &[PositionReport], session_id: &str) -> f64 {
    positions
        .iter()
        .filter(|p| p.comment.starts_with(session_id))
        .map(|p| p.profit)
        .sum()
}
