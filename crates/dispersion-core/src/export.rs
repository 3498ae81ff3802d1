//! # Positions Log Export
//!
//! Writes the end-of-day position snapshots to `positions_log.csv` in
//! the schema the dispersion dashboard reads:
//!
//! `date,ticker,underlying,type,quantity,price_today,delta,vega,mv`
//!
//! Quantities are unsigned with a `long`/`short` type column; delta and
//! vega are per-unit greeks (the consumer applies the direction sign).

use chrono::NaiveDate;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::observation::DailyObservation;
use crate::position::Position;

/// One row of the positions log: a leg as it stood at end of day.
#[derive(Debug, Clone, Serialize)]
pub struct PositionSnapshot {
    pub date: NaiveDate,
    pub ticker: String,
    pub underlying: String,
    /// `long` or `short`.
    pub position_type: String,
    pub quantity: f64,
    pub price_today: f64,
    pub delta: f64,
    pub vega: f64,
    /// Unsigned market value: price x quantity.
    pub mv: f64,
}

impl PositionSnapshot {
    /// Snapshot a leg against the day's observation. Returns `None`
    /// when the leg's instrument has no quote (the day was a gap for
    /// that leg and was already skipped by the loop).
    pub fn capture(position: &Position, obs: &DailyObservation) -> Option<Self> {
        let quote = obs.get(&position.instrument.underlying)?;
        Some(Self {
            date: obs.date,
            ticker: position.instrument.ticker(),
            underlying: position.instrument.underlying.clone(),
            position_type: position.direction.label().to_string(),
            quantity: position.quantity,
            price_today: quote.price,
            delta: quote.delta,
            vega: quote.vega,
            mv: quote.price * position.quantity,
        })
    }
}

/// Write the snapshots as `positions_log.csv` under `dir`.
///
/// Returns the written path.
pub fn write_positions_log(snapshots: &[PositionSnapshot], dir: &Path) -> anyhow::Result<String> {
    std::fs::create_dir_all(dir)?;

    let path = dir.join("positions_log.csv");
    let file = File::create(&path)?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "date,ticker,underlying,type,quantity,price_today,delta,vega,mv")?;
    for snap in snapshots {
        writeln!(
            writer,
            "{},{},{},{},{:.6},{:.4},{:.6},{:.6},{:.4}",
            snap.date,
            snap.ticker,
            snap.underlying,
            snap.position_type,
            snap.quantity,
            snap.price_today,
            snap.delta,
            snap.vega,
            snap.mv,
        )?;
    }
    writer.flush()?;

    Ok(path.to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::{Direction, LegRole, Straddle};
    use crate::observation::InstrumentQuote;

    #[test]
    fn test_capture_snapshot() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let expiry = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();

        let mut obs = DailyObservation::new(date);
        obs.insert(
            "AAPL",
            InstrumentQuote { price: 10.0, vega: 0.5, delta: 0.05, days_to_expiry: 30 },
        );

        let pos = Position::open(
            Straddle::new("AAPL", expiry, 190.0),
            Direction::Short,
            2.0,
            LegRole::SingleName,
            10.0,
        );

        let snap = PositionSnapshot::capture(&pos, &obs).unwrap();
        assert_eq!(snap.position_type, "short");
        assert_eq!(snap.ticker, "AAPL190STRD");
        assert!((snap.mv - 20.0).abs() < 1e-12);

        // Missing quote -> no snapshot.
        let empty = DailyObservation::new(date);
        assert!(PositionSnapshot::capture(&pos, &empty).is_none());
    }
}
