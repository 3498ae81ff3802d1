//! Run report assembly and JSON output (offline).

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

use crate::export::PositionSnapshot;
use crate::hedge::HedgeDecision;
use crate::ledger::PnlLedger;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// One leg's contribution inside a [`DailyRecord`].
#[derive(Debug, Clone, Serialize)]
pub struct LegPnl {
    pub leg: String,
    pub dollar_pnl: f64,
    pub percent_pnl: f64,
}

/// Everything the run produced for a single simulated day.
#[derive(Debug, Clone, Serialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub legs: Vec<LegPnl>,
    pub net_vega_before: f64,
    pub net_vega_after: f64,
    pub hedge_trade_qty: f64,
    pub suppressed: bool,
    pub net_delta: f64,
}

/// Headline metrics computed from the completed ledger.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub total_dollar_pnl: f64,
    /// Total PnL as a percentage of the first-day gross notional.
    pub total_return_pct: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub trading_days: usize,
    pub hedge_trades: u32,
    pub suppressed_days: u32,
}

impl RunSummary {
    /// Fold the ledger's equity curve into headline metrics.
    ///
    /// Equity starts at `capital_base` (the book's gross notional on
    /// the first observed day) and moves by daily total PnL; Sharpe is
    /// annualized over 252 trading days using sample variance.
    pub fn compute(capital_base: f64, ledger: &PnlLedger, decisions: &[HedgeDecision]) -> Self {
        let daily_totals = ledger.total_pnl_by_date();
        let trading_days = daily_totals.len();
        let total_dollar_pnl = ledger.total_dollar_pnl();

        let total_return_pct = if capital_base.abs() > f64::EPSILON {
            total_dollar_pnl / capital_base * 100.0
        } else {
            0.0
        };

        // Equity curve and drawdown.
        let mut equity = capital_base;
        let mut peak = capital_base;
        let mut max_drawdown = 0.0f64;
        let mut returns = Vec::with_capacity(trading_days);
        for pnl in daily_totals.values() {
            let prev_equity = equity;
            equity += pnl;
            if prev_equity.abs() > f64::EPSILON {
                returns.push((equity - prev_equity) / prev_equity);
            }
            if equity > peak {
                peak = equity;
            }
            if peak.abs() > f64::EPSILON {
                max_drawdown = max_drawdown.max((peak - equity) / peak);
            }
        }

        let sharpe_ratio = if returns.len() > 1 {
            let mean = returns.iter().sum::<f64>() / returns.len() as f64;
            let variance = returns
                .iter()
                .map(|r| (r - mean).powi(2))
                .sum::<f64>()
                / (returns.len() - 1) as f64;
            let std_dev = variance.sqrt();
            if std_dev > 0.0 {
                mean / std_dev * TRADING_DAYS_PER_YEAR.sqrt()
            } else {
                0.0
            }
        } else {
            0.0
        };

        let hedge_trades = decisions
            .iter()
            .filter(|d| d.proxy_trade_qty.abs() > f64::EPSILON)
            .count() as u32;
        let suppressed_days = decisions.iter().filter(|d| d.suppressed).count() as u32;

        Self {
            total_dollar_pnl,
            total_return_pct,
            sharpe_ratio,
            max_drawdown,
            trading_days,
            hedge_trades,
            suppressed_days,
        }
    }
}

/// Complete artifact of one backtest run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Gross notional of the book on the first observed day.
    pub capital_base: f64,
    /// True when the data ran out before `end_date`.
    pub partial: bool,
    /// Dates inside the range that were skipped for missing data.
    pub gaps: Vec<NaiveDate>,
    pub daily: Vec<DailyRecord>,
    /// Hedge engine audit log, one decision per simulated day.
    pub decisions: Vec<HedgeDecision>,
    pub ledger: PnlLedger,
    /// End-of-day position snapshots for the dashboard export.
    pub positions: Vec<PositionSnapshot>,
    pub summary: RunSummary,
}

impl RunReport {
    /// Write the report as pretty JSON under `dir/report.json`.
    pub fn write_json(&self, dir: &Path) -> anyhow::Result<()> {
        std::fs::create_dir_all(dir)?;
        std::fs::write(dir.join("report.json"), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
