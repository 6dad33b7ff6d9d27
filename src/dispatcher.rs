// =============================================================================
// Tick Dispatcher
// =============================================================================
//
// The single function that threads every subsystem together into one
// decision per tick: freeze check, market update, reconciliation, pending
// closes, close-confirmation, cross-hedge, take-profit, external-close,
// and finally entry evaluation for both sides. Exactly one directive is
// returned per call.
// =============================================================================

use tracing::{info, warn};

use crate::close_monitor::{check_confirmation, check_external_close};
use crate::hedge;
use crate::ids::new_session_id;
use crate::planner::{evaluate_level, PlanOutcome};
use crate::reconcile::reconcile;
use crate::take_profit;
use crate::types::{Directive, ExecRecord, GlobalRuntime, PriceDirection, Side, TickRequest, UserSettings};

/// Settings for both sides, as currently configured. Mutable because the
/// cross-hedge controller injects rows into the opposite side's grid
/// while a tick is being evaluated.
pub struct SettingsPair<'a> {
    pub buy: &'a mut UserSettings,
    pub sell: &'a mut UserSettings,
}

impl<'a> SettingsPair<'a> {
    pub fn for_side(&self, side: Side) -> &UserSettings {
        match side {
            Side::Buy => self.buy,
            Side::Sell => self.sell,
        }
    }

    pub fn for_side_mut(&mut self, side: Side) -> &mut UserSettings {
        match side {
            Side::Buy => self.buy,
            Side::Sell => self.sell,
        }
    }
}

/// Evaluate one tick against the current runtime state and settings.
/// Mutates `runtime` and `settings` in place and returns the directive to
/// send back to the terminal agent. The caller is responsible for
/// persisting state after any mutating branch.
pub fn evaluate_tick(
    runtime: &mut GlobalRuntime,
    settings: &mut SettingsPair<'_>,
    tick: &TickRequest,
    now_ts: i64,
) -> Directive {
    // 1. Frozen — refuse to do anything until an operator clears it.
    if !runtime.error_status.is_empty() {
        return Directive::wait_with_error(runtime.error_status.clone());
    }

    // 2. Market update.
    let mid = (tick.ask + tick.bid) / 2.0;
    runtime.direction = if mid > runtime.last_mid {
        PriceDirection::Up
    } else {
        PriceDirection::Down
    };
    runtime.last_mid = mid;
    runtime.last_ask = tick.ask;
    runtime.last_bid = tick.bid;

    // 3. Reconcile.
    let result = reconcile(runtime, &tick.positions);
    if let Some(conflict) = result.conflict {
        runtime.error_status = conflict.clone();
        warn!(error = %conflict, "engine frozen due to reconciliation conflict");
        return Directive::wait_with_error(conflict);
    }

    // 4. Pending one-shot close.
    if let Some(pending) = runtime.pending_closes.pop_front() {
        return Directive::CloseAll {
            comment: pending.comment,
        };
    }

    // 5. Close-confirmation, buy then sell.
    for side in [Side::Buy, Side::Sell] {
        if let Some(directive) = check_confirmation(side, runtime, &tick.positions, mid) {
            return directive;
        }
    }

    // 6. Hedge check, buy then sell.
    for side in [Side::Buy, Side::Sell] {
        let opposite = side.opposite();
        let (opp_ask, opp_bid) = (tick.ask, tick.bid);
        let hedge_value = settings.for_side(side).hedge_value;
        let opposite_settings = settings.for_side_mut(opposite);
        if let Some(directive) = hedge::evaluate(
            side,
            runtime,
            hedge_value,
            &tick.positions,
            now_ts,
            opp_ask,
            opp_bid,
            opposite_settings,
        ) {
            info!(side = %opposite, "cross-hedge absorption issued");
            return directive;
        }
    }

    // 7. Take-profit, buy then sell.
    for side in [Side::Buy, Side::Sell] {
        let session_id = runtime.session(side).session_id.clone();
        if session_id.is_empty() || runtime.session(side).is_closing {
            continue;
        }
        if take_profit::is_hit(
            &session_id,
            settings.for_side(side),
            &tick.positions,
            tick.equity,
            tick.balance,
        ) {
            runtime.session_mut(side).is_closing = true;
            info!(side = %side, session_id = %session_id, "take-profit target reached");
            return Directive::CloseAll {
                comment: session_id,
            };
        }
    }

    // 8. External-close detection (does not short-circuit).
    for side in [Side::Buy, Side::Sell] {
        check_external_close(side, runtime, &tick.positions, now_ts);
    }

    // 9 & 10. Entry evaluation, buy then sell.
    for side in [Side::Buy, Side::Sell] {
        if let Some(directive) = evaluate_entry(side, runtime, settings.for_side(side), tick, now_ts) {
            return directive;
        }
    }

    Directive::wait()
}

fn evaluate_entry(
    side: Side,
    runtime: &mut GlobalRuntime,
    settings: &UserSettings,
    tick: &TickRequest,
    now_ts: i64,
) -> Option<Directive> {
    {
        let session = runtime.session(side);
        if !session.enabled || session.is_closing || session.hedge_triggered {
            return None;
        }
    }

    let market_price = match side {
        Side::Buy => tick.ask,
        Side::Sell => tick.bid,
    };

    if runtime.session(side).session_id.is_empty() {
        let session_id = new_session_id(side);
        let session = runtime.session_mut(side);
        session.session_id = session_id;
        if settings.limit_price > 0.0 {
            session.start_ref = settings.limit_price;
            session.waiting_limit = true;
        } else {
            session.start_ref = market_price;
            session.waiting_limit = false;
        }
        return None;
    }

    if runtime.session(side).waiting_limit {
        let limit_reached = match side {
            Side::Buy => tick.ask <= settings.limit_price,
            Side::Sell => tick.bid >= settings.limit_price,
        };
        if limit_reached {
            let session = runtime.session_mut(side);
            session.waiting_limit = false;
            session.start_ref = market_price;
        }
        return None;
    }

    let idx = runtime.session(side).exec_map.len();
    let start_ref = runtime.session(side).start_ref;
    match evaluate_level(side, start_ref, &settings.rows, idx, market_price) {
        PlanOutcome::NoRow | PlanOutcome::Paused | PlanOutcome::NotTriggered => None,
        PlanOutcome::Fire(row, _trigger) => {
            let lots = row.lots;
            let alert = row.alert;
            let session_id = runtime.session(side).session_id.clone();
            let session = runtime.session_mut(side);
            session.exec_map.insert(
                idx as u32,
                ExecRecord {
                    index: idx as u32,
                    entry_price: market_price,
                    lots,
                    profit: 0.0,
                    timestamp: now_ts,
                    cumulative_lots: 0.0,
                    cumulative_profit: 0.0,
                },
            );
            crate::types::rederive_cumulatives(&mut session.exec_map);
            session.last_order_sent_ts = now_ts;
            Some(Directive::entry(
                side,
                lots,
                format!("{session_id}_idx{idx}"),
                alert,
            ))
        }
    }
}
