//! # PnL Ledger
//!
//! Append-only log of per-leg daily PnL records. Aggregates (daily
//! totals, cumulative curve, per-leg slices) are pure folds over the
//! stored records, recomputable at any time; they are never stored as
//! separately mutated state.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One leg's PnL for one date. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PnlRecord {
    pub date: NaiveDate,
    pub leg: String,
    pub dollar_pnl: f64,
    pub percent_pnl: f64,
}

/// Date-ordered, append-only collection of [`PnlRecord`]s.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PnlLedger {
    records: Vec<PnlRecord>,
}

impl PnlLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: PnlRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[PnlRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total dollar PnL per date, summed across legs.
    pub fn total_pnl_by_date(&self) -> BTreeMap<NaiveDate, f64> {
        let mut totals = BTreeMap::new();
        for record in &self.records {
            *totals.entry(record.date).or_insert(0.0) += record.dollar_pnl;
        }
        totals
    }

    /// Running sum of daily total dollar PnL, in date order.
    pub fn cumulative_pnl(&self) -> Vec<(NaiveDate, f64)> {
        let mut cumulative = 0.0;
        self.total_pnl_by_date()
            .into_iter()
            .map(|(date, pnl)| {
                cumulative += pnl;
                (date, cumulative)
            })
            .collect()
    }

    /// All records for one leg, in insertion (date) order.
    pub fn pnl_by_leg(&self, leg: &str) -> Vec<&PnlRecord> {
        self.records.iter().filter(|r| r.leg == leg).collect()
    }

    /// Grand total dollar PnL over the whole run.
    pub fn total_dollar_pnl(&self) -> f64 {
        self.records.iter().map(|r| r.dollar_pnl).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(date: NaiveDate, leg: &str, dollar: f64) -> PnlRecord {
        PnlRecord {
            date,
            leg: leg.to_string(),
            dollar_pnl: dollar,
            percent_pnl: 0.0,
        }
    }

    #[test]
    fn test_daily_totals_are_additive_across_legs() {
        let d1 = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();

        let mut ledger = PnlLedger::new();
        ledger.append(rec(d1, "AAPL", -3.0));
        ledger.append(rec(d1, "SPX", 5.0));
        ledger.append(rec(d2, "AAPL", 1.0));
        ledger.append(rec(d2, "SPX", -0.5));

        let totals = ledger.total_pnl_by_date();
        assert!((totals[&d1] - 2.0).abs() < 1e-12);
        assert!((totals[&d2] - 0.5).abs() < 1e-12);

        // Sum of per-leg PnL equals the per-date totals.
        let leg_sum: f64 = ledger.pnl_by_leg("AAPL").iter().map(|r| r.dollar_pnl).sum::<f64>()
            + ledger.pnl_by_leg("SPX").iter().map(|r| r.dollar_pnl).sum::<f64>();
        assert!((leg_sum - ledger.total_dollar_pnl()).abs() < 1e-12);
    }

    #[test]
    fn test_cumulative_pnl_in_date_order() {
        let d1 = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();

        let mut ledger = PnlLedger::new();
        // Appended out of date order; the fold re-orders by date.
        ledger.append(rec(d2, "AAPL", 1.0));
        ledger.append(rec(d1, "AAPL", 2.0));

        let curve = ledger.cumulative_pnl();
        assert_eq!(curve.len(), 2);
        assert_eq!(curve[0], (d1, 2.0));
        assert_eq!(curve[1], (d2, 3.0));
    }
}
