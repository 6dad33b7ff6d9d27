// =============================================================================
// Grid Level Planner
// =============================================================================
//
// Pure functions over a side's configured rows and its current execution
// map. Computes the trigger price of the next unexecuted level and decides
// whether that level should be skipped as a pause sentinel.
// =============================================================================

use crate::types::{GridLevel, Side};

/// The price at which level `idx` should fire, measured from `start_ref`.
/// Buy levels step down from the reference; sell levels step up.
pub fn level_price(side: Side, start_ref: f64, rows: &[GridLevel], idx: usize) -> Option<f64> {
    if idx >= rows.len() {
        return None;
    }
    let gap: f64 = rows[..=idx].iter().map(|r| r.dollar).sum();
    Some(match side {
        Side::Buy => start_ref - gap,
        Side::Sell => start_ref + gap,
    })
}

/// Index of the next level to consider: one past the highest executed
/// index, i.e. the size of the execution map.
pub fn next_index(exec_count: usize) -> usize {
    exec_count
}

/// Outcome of evaluating whether the next level should fire this tick.
pub enum PlanOutcome<'a> {
    /// No configured row exists at this index; the side has exhausted its
    /// grid and is idle until settings add more rows.
    NoRow,
    /// The row at this index is a pause sentinel; the side halts here.
    Paused,
    /// The row is live but the market has not reached its trigger yet.
    NotTriggered,
    /// The trigger condition is met; fire this row.
    Fire(&'a GridLevel, f64),
}

/// Evaluate level `idx` against the current market price for `side`.
pub fn evaluate_level<'a>(
    side: Side,
    start_ref: f64,
    rows: &'a [GridLevel],
    idx: usize,
    market_price: f64,
) -> PlanOutcome<'a> {
    let Some(row) = rows.get(idx) else {
        return PlanOutcome::NoRow;
    };
    if row.is_pause_sentinel() {
        return PlanOutcome::Paused;
    }
    let Some(trigger) = level_price(side, start_ref, rows, idx) else {
        return PlanOutcome::NoRow;
    };
    let hit = match side {
        Side::Buy => market_price <= trigger,
        Side::Sell => market_price >= trigger,
    };
    if hit {
        PlanOutcome::Fire(row, trigger)
    } else {
        PlanOutcome::NotTriggered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<GridLevel> {
        vec![
            GridLevel {
                index: 0,
                dollar: 10.0,
                lots: 0.1,
                alert: true,
            },
            GridLevel {
                index: 1,
                dollar: 20.0,
                lots: 0.2,
                alert: false,
            },
            GridLevel {
                index: 2,
                dollar: 0.0,
                lots: 0.3,
                alert: false,
            },
        ]
    }

    #[test]
    fn buy_level_price_steps_down() {
        let r = rows();
        assert_eq!(level_price(Side::Buy, 100.0, &r, 0), Some(90.0));
        assert_eq!(level_price(Side::Buy, 100.0, &r, 1), Some(70.0));
    }

    #[test]
    fn sell_level_price_steps_up() {
        let r = rows();
        assert_eq!(level_price(Side::Sell, 100.0, &r, 0), Some(110.0));
        assert_eq!(level_price(Side::Sell, 100.0, &r, 1), Some(130.0));
    }

    #[test]
    fn out_of_range_index_returns_none() {
        let r = rows();
        assert_eq!(level_price(Side::Buy, 100.0, &r, 5), None);
    }

    #[test]
    fn pause_sentinel_halts_progression() {
        let r = rows();
        let outcome = evaluate_level(Side::Buy, 100.0, &r, 2, 1.0);
        assert!(matches!(outcome, PlanOutcome::Paused));
    }

    #[test]
    fn missing_row_is_no_row() {
        let r = rows();
        let outcome = evaluate_level(Side::Buy, 100.0, &r, 10, 1.0);
        assert!(matches!(outcome, PlanOutcome::NoRow));
    }

    #[test]
    fn buy_fires_when_price_at_or_below_trigger() {
        let r = rows();
        let outcome = evaluate_level(Side::Buy, 100.0, &r, 0, 90.0);
        assert!(matches!(outcome, PlanOutcome::Fire(_, 90.0)));
        let outcome = evaluate_level(Side::Buy, 100.0, &r, 0, 95.0);
        assert!(matches!(outcome, PlanOutcome::NotTriggered));
    }

    #[test]
    fn sell_fires_when_price_at_or_above_trigger() {
        let r = rows();
        let outcome = evaluate_level(Side::Sell, 100.0, &r, 0, 110.0);
        assert!(matches!(outcome, PlanOutcome::Fire(_, 110.0)));
        let outcome = evaluate_level(Side::Sell, 100.0, &r, 0, 105.0);
        assert!(matches!(outcome, PlanOutcome::NotTriggered));
    }
}
