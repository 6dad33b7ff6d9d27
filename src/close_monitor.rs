// =============================================================================
// Close-Confirmation Monitor & External-Close Detector
// =============================================================================
//
// The confirmation monitor re-issues CLOSE_ALL until the broker reports
// zero positions for a closing session, then either recycles the side
// (cyclic mode) or disables it. The external-close detector declares a
// session manually terminated when its positions vanish without the
// engine having asked for a close, guarded by a grace period so a just
// dispatched order is never mistaken for an external close.
// =============================================================================

use crate::types::{Directive, GlobalRuntime, PositionReport, Side};

const EXTERNAL_CLOSE_GRACE_SECONDS: i64 = 5;

fn has_positions_for(positions: &[PositionReport], session_id: &str) -> bool {
    !session_id.is_empty() && positions.iter().any(|p| p.comment.starts_with(session_id))
}

/// If `side` is mid close, either confirm completion or re-issue the
/// close. Returns `Some` directive when this side should short-circuit
/// the rest of the dispatch for this tick.
pub fn check_confirmation(
    side: Side,
    runtime: &mut GlobalRuntime,
    positions: &[PositionReport],
    mid: f64,
) -> Option<Directive> {
    let session_id = runtime.session(side).session_id.clone();
    if !runtime.session(side).is_closing {
        return None;
    }

    if has_positions_for(positions, &session_id) {
        return Some(Directive::CloseAll {
            comment: session_id,
        });
    }

    let cyclic_on = runtime.cyclic_on;
    let session = runtime.session_mut(side);
    session.exec_map.clear();
    session.hedge_triggered = false;
    session.is_closing = false;
    if cyclic_on {
        session.session_id.clear();
        session.start_ref = mid;
        session.enabled = true;
    } else {
        session.reset(false);
    }
    Some(Directive::wait())
}

/// Detect a session that was closed outside the engine (e.g. manually in
/// the terminal) and reconcile local state to match. Does not
/// short-circuit dispatch: callers should continue evaluating the rest of
/// the tick afterwards.
pub fn check_external_close(
    side: Side,
    runtime: &mut GlobalRuntime,
    positions: &[PositionReport],
    now_ts: i64,
) {
    let session_id = runtime.session(side).session_id.clone();
    let session = runtime.session(side);
    if session_id.is_empty()
        || session.exec_map.is_empty()
        || session.is_closing
        || now_ts - session.last_order_sent_ts < EXTERNAL_CLOSE_GRACE_SECONDS
    {
        return;
    }
    if has_positions_for(positions, &session_id) {
        return;
    }

    let cyclic_on = runtime.cyclic_on;
    let mid = runtime.last_mid;
    let session = runtime.session_mut(side);
    session.exec_map.clear();
    session.hedge_triggered = false;
    if cyclic_on {
        session.session_id.clear();
        session.start_ref = mid;
        session.enabled = true;
    } else {
        session.reset(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExecRecord;

    fn pos(comment: &str) -> PositionReport {
        PositionReport {
            ticket: "1".into(),
            symbol: "EURUSD".into(),
            kind: "BUY".into(),
            volume: 0.1,
            price: 100.0,
            profit: 0.0,
            comment: comment.into(),
        }
    }

    #[test]
    fn not_closing_returns_none() {
        let mut runtime = GlobalRuntime::default();
        assert!(check_confirmation(Side::Buy, &mut runtime, &[], 100.0).is_none());
    }

    #[test]
    fn reissues_close_while_positions_remain() {
        let mut runtime = GlobalRuntime::default();
        runtime.buy.session_id = "buy_1a2b3c4d".into();
        runtime.buy.is_closing = true;
        let positions = vec![pos("buy_1a2b3c4d_idx0")];
        let directive = check_confirmation(Side::Buy, &mut runtime, &positions, 100.0);
        assert!(matches!(directive, Some(Directive::CloseAll { .. })));
        assert!(runtime.buy.is_closing);
    }

    #[test]
    fn confirms_and_disables_when_not_cyclic() {
        let mut runtime = GlobalRuntime::default();
        runtime.buy.session_id = "buy_1a2b3c4d".into();
        runtime.buy.is_closing = true;
        runtime.buy.enabled = true;
        let directive = check_confirmation(Side::Buy, &mut runtime, &[], 100.0);
        assert!(matches!(directive, Some(Directive::Wait { .. })));
        assert!(!runtime.buy.enabled);
        assert!(runtime.buy.session_id.is_empty());
    }

    #[test]
    fn confirms_and_recycles_when_cyclic() {
        let mut runtime = GlobalRuntime::default();
        runtime.cyclic_on = true;
        runtime.buy.session_id = "buy_1a2b3c4d".into();
        runtime.buy.is_closing = true;
        runtime.buy.enabled = true;
        let directive = check_confirmation(Side::Buy, &mut runtime, &[], 105.0);
        assert!(matches!(directive, Some(Directive::Wait { .. })));
        assert!(runtime.buy.enabled);
        assert!(runtime.buy.session_id.is_empty());
        assert_eq!(runtime.buy.start_ref, 105.0);
    }

    #[test]
    fn external_close_ignored_within_grace_period() {
        let mut runtime = GlobalRuntime::default();
        runtime.buy.session_id = "buy_1a2b3c4d".into();
        runtime.buy.last_order_sent_ts = 100;
        runtime.buy.exec_map.insert(
            0,
            ExecRecord {
                index: 0,
                entry_price: 100.0,
                lots: 0.1,
                profit: 0.0,
                timestamp: 100,
                cumulative_lots: 0.1,
                cumulative_profit: 0.0,
            },
        );
        check_external_close(Side::Buy, &mut runtime, &[], 102);
        assert!(!runtime.buy.session_id.is_empty());
    }

    #[test]
    fn external_close_detected_after_grace_period() {
        let mut runtime = GlobalRuntime::default();
        runtime.buy.session_id = "buy_1a2b3c4d".into();
        runtime.buy.enabled = true;
        runtime.buy.last_order_sent_ts = 100;
        runtime.buy.exec_map.insert(
            0,
            ExecRecord {
                index: 0,
                entry_price: 100.0,
                lots: 0.1,
                profit: 0.0,
                timestamp: 100,
                cumulative_lots: 0.1,
                cumulative_profit: 0.0,
            },
        );
        check_external_close(Side::Buy, &mut runtime, &[], 106);
        assert!(runtime.buy.session_id.is_empty());
        assert!(!runtime.buy.enabled);
    }
}
