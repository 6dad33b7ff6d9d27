// =============================================================================
// Execution Reconciler
// =============================================================================
//
// SAFETY POLICY: this module never corrects the broker's book and never
// silently drops a conflict. A position whose comment names a side/session
// combination we do not recognise means our view of the world has diverged
// from the broker's — the only safe response is to freeze the engine and
// wait for an operator to intervene via emergency close.
// =============================================================================

use std::collections::BTreeMap;

use tracing::warn;

use crate::types::{rederive_cumulatives, ExecRecord, GlobalRuntime, PositionReport, Side};

/// A position comment parsed into its side, session id, and level index.
struct ParsedComment<'a> {
    side: Side,
    session_id: &'a str,
    index: u32,
}

/// Parse `<side>_<8-hex>_idx<n>`. Returns `None` for anything that doesn't
/// match the canonical shape, including comments belonging to other tools.
fn parse_comment(comment: &str) -> Option<ParsedComment<'_>> {
    let (side_str, rest) = comment.split_once('_')?;
    let side = match side_str {
        "buy" => Side::Buy,
        "sell" => Side::Sell,
        _ => return None,
    };
    let (hex, idx_part) = rest.split_once("_idx")?;
    if hex.len() != 8 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let index: u32 = idx_part.parse().ok()?;
    let session_id = &comment[..side_str.len() + 1 + hex.len()];
    Some(ParsedComment {
        side,
        session_id,
        index,
    })
}

/// Outcome of a reconciliation pass.
pub struct ReconcileResult {
    pub conflict: Option<String>,
}

/// Fold the tick's reported positions into each side's execution map.
/// Aborts and returns a conflict the moment a position's session id
/// disagrees with the side's currently active session.
pub fn reconcile(runtime: &mut GlobalRuntime, positions: &[PositionReport]) -> ReconcileResult {
    let mut updates: BTreeMap<Side, Vec<(u32, ExecRecord)>> = BTreeMap::new();

    for position in positions {
        let Some(parsed) = parse_comment(&position.comment) else {
            continue;
        };
        let session = runtime.session(parsed.side);
        if session.session_id.is_empty() || session.session_id != parsed.session_id {
            let message = format!(
                "CRITICAL: Conflict detected. Unknown {} trade {}.",
                parsed.side, position.ticket
            );
            warn!(
                side = %parsed.side,
                ticket = %position.ticket,
                comment = %position.comment,
                "execution reconciler detected an unrecognised session id"
            );
            return ReconcileResult {
                conflict: Some(message),
            };
        }

        let record = ExecRecord {
            index: parsed.index,
            entry_price: position.price,
            lots: position.volume,
            profit: position.profit,
            timestamp: 0,
            cumulative_lots: 0.0,
            cumulative_profit: 0.0,
        };
        updates
            .entry(parsed.side)
            .or_default()
            .push((parsed.index, record));
    }

    for (side, records) in updates {
        let session = runtime.session_mut(side);
        for (index, mut record) in records {
            if let Some(existing) = session.exec_map.get(&index) {
                record.timestamp = existing.timestamp;
            }
            session.exec_map.insert(index, record);
        }
        rederive_cumulatives(&mut session.exec_map);
    }

    ReconcileResult { conflict: None }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(ticket: &str, volume: f64, price: f64, profit: f64, comment: &str) -> PositionReport {
        PositionReport {
            ticket: ticket.to_string(),
            symbol: "EURUSD".to_string(),
            kind: "BUY".to_string(),
            volume,
            price,
            profit,
            comment: comment.to_string(),
        }
    }

    #[test]
    fn ignores_comments_from_other_tools() {
        let mut runtime = GlobalRuntime::default();
        let positions = vec![position("1", 0.1, 100.0, 1.0, "manual trade")];
        let result = reconcile(&mut runtime, &positions);
        assert!(result.conflict.is_none());
        assert!(runtime.buy.exec_map.is_empty());
    }

    #[test]
    fn upserts_matching_session() {
        let mut runtime = GlobalRuntime::default();
        runtime.buy.session_id = "buy_1a2b3c4d".to_string();
        let positions = vec![position("1", 0.1, 100.0, 5.0, "buy_1a2b3c4d_idx0")];
        let result = reconcile(&mut runtime, &positions);
        assert!(result.conflict.is_none());
        let record = runtime.buy.exec_map.get(&0).expect("record inserted");
        assert_eq!(record.entry_price, 100.0);
        assert_eq!(record.cumulative_lots, 0.1);
        assert_eq!(record.cumulative_profit, 5.0);
    }

    #[test]
    fn mismatched_session_id_freezes() {
        let mut runtime = GlobalRuntime::default();
        runtime.buy.session_id = "buy_1a2b3c4d".to_string();
        let positions = vec![position("99", 0.1, 100.0, 0.0, "buy_deadbeef_idx0")];
        let result = reconcile(&mut runtime, &positions);
        assert!(result.conflict.is_some());
    }

    #[test]
    fn cumulatives_are_prefix_sums() {
        let mut runtime = GlobalRuntime::default();
        runtime.buy.session_id = "buy_1a2b3c4d".to_string();
        let positions = vec![
            position("1", 0.1, 100.0, 2.0, "buy_1a2b3c4d_idx0"),
            position("2", 0.2, 90.0, -1.0, "buy_1a2b3c4d_idx1"),
        ];
        reconcile(&mut runtime, &positions);
        let last = runtime.buy.exec_map.get(&1).unwrap();
        assert_eq!(last.cumulative_lots, 0.1 + 0.2);
        assert_eq!(last.cumulative_profit, 2.0 - 1.0);
    }

    #[test]
    fn preserves_timestamp_across_repeated_reconciliation() {
        let mut runtime = GlobalRuntime::default();
        runtime.buy.session_id = "buy_1a2b3c4d".to_string();
        runtime.buy.exec_map.insert(
            0,
            ExecRecord {
                index: 0,
                entry_price: 100.0,
                lots: 0.1,
                profit: 0.0,
                timestamp: 12345,
                cumulative_lots: 0.1,
                cumulative_profit: 0.0,
            },
        );
        let positions = vec![position("1", 0.1, 100.0, 3.0, "buy_1a2b3c4d_idx0")];
        reconcile(&mut runtime, &positions);
        assert_eq!(runtime.buy.exec_map.get(&0).unwrap().timestamp, 12345);
    }

    #[test]
    fn parse_comment_rejects_bad_hex() {
        assert!(parse_comment("buy_ghijklmn_idx0").is_none());
    }

    #[test]
    fn parse_comment_accepts_canonical_shape() {
        let parsed = parse_comment("sell_0123abcd_idx7").unwrap();
        assert_eq!(parsed.side, Side::Sell);
        assert_eq!(parsed.session_id, "sell_0123abcd");
        assert_eq!(parsed.index, 7);
    }
}
