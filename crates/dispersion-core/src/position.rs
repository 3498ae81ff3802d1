//! # Positions & Portfolio
//!
//! A [`Position`] is one leg of the book: a straddle, a direction, a
//! quantity, and the role the leg plays. The [`Portfolio`] holds the
//! fixed strategy legs (one index, any number of single names) plus at
//! most one hedge-proxy leg whose quantity is owned exclusively by the
//! hedge engine.
//!
//! Percentage PnL uses a fixed entry notional chosen when the leg is
//! opened (or last re-based, for the proxy) so daily percentages stay
//! additive across the run.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SimError;
use crate::instrument::{Direction, LegRole, Straddle};
use crate::ledger::PnlRecord;
use crate::observation::DailyObservation;

/// One leg of the dispersion book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub instrument: Straddle,
    pub direction: Direction,
    /// Unsigned size; may be fractional (hedge ratios).
    pub quantity: f64,
    pub role: LegRole,
    /// Unit price when the leg was opened or last re-based.
    pub entry_price: f64,
    /// Fixed denominator for percentage PnL: entry price x quantity.
    pub entry_notional: f64,
}

impl Position {
    /// Open a leg, fixing its entry notional at `entry_price * quantity`.
    pub fn open(
        instrument: Straddle,
        direction: Direction,
        quantity: f64,
        role: LegRole,
        entry_price: f64,
    ) -> Self {
        let entry_notional = entry_price * quantity;
        Self {
            instrument,
            direction,
            quantity,
            role,
            entry_price,
            entry_notional,
        }
    }

    /// Leg label used in the PnL ledger and reports.
    pub fn label(&self) -> &str {
        &self.instrument.underlying
    }

    /// Quantity with the direction sign applied.
    pub fn signed_quantity(&self) -> f64 {
        self.quantity * self.direction.sign()
    }

    /// Signed vega contribution for the day.
    pub fn signed_vega(&self, obs: &DailyObservation) -> Result<f64, SimError> {
        let quote = obs.quote(&self.instrument.underlying)?;
        Ok(quote.vega * self.signed_quantity())
    }

    /// Signed delta contribution for the day.
    pub fn signed_delta(&self, obs: &DailyObservation) -> Result<f64, SimError> {
        let quote = obs.quote(&self.instrument.underlying)?;
        Ok(quote.delta * self.signed_quantity())
    }

    /// One day of mark-to-market PnL against the previous observation.
    ///
    /// Dollar PnL is the unit price change times signed quantity;
    /// percentage PnL divides by the fixed entry notional. Legs with a
    /// (near-)zero notional report 0% rather than NaN.
    pub fn mark_to_market(
        &self,
        prev: &DailyObservation,
        curr: &DailyObservation,
    ) -> Result<PnlRecord, SimError> {
        let prev_price = prev.quote(&self.instrument.underlying)?.price;
        let curr_price = curr.quote(&self.instrument.underlying)?.price;

        let dollar_pnl = (curr_price - prev_price) * self.signed_quantity();
        let percent_pnl = if self.entry_notional.abs() > f64::EPSILON {
            dollar_pnl / self.entry_notional * 100.0
        } else {
            0.0
        };

        Ok(PnlRecord {
            date: curr.date,
            leg: self.label().to_string(),
            dollar_pnl,
            percent_pnl,
        })
    }

    /// Re-base the leg to a new quantity and price, resetting the
    /// percentage-PnL denominator. Hedge-proxy only.
    pub(crate) fn rebase(&mut self, quantity: f64, price: f64) {
        self.quantity = quantity;
        self.entry_price = price;
        self.entry_notional = price * quantity;
    }
}

/// The fixed strategy legs plus the engine-owned hedge leg.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    legs: Vec<Position>,
    hedge: Option<Position>,
}

impl Portfolio {
    /// Build from one index leg and the single-name legs.
    ///
    /// Role mismatches are configuration errors: exactly one `Index`
    /// leg, only `SingleName` legs beside it, no pre-seeded proxy.
    pub fn new(index: Position, single_names: Vec<Position>) -> Result<Self, SimError> {
        if index.role != LegRole::Index {
            return Err(SimError::ConfigInvalid(format!(
                "index leg {} does not carry the Index role",
                index.label()
            )));
        }
        for leg in &single_names {
            if leg.role != LegRole::SingleName {
                return Err(SimError::ConfigInvalid(format!(
                    "leg {} must carry the SingleName role",
                    leg.label()
                )));
            }
        }

        let mut legs = vec![index];
        legs.extend(single_names);
        Ok(Self { legs, hedge: None })
    }

    /// Fixed strategy legs (index + single names), no proxy.
    pub fn strategy_legs(&self) -> &[Position] {
        &self.legs
    }

    /// Current hedge-proxy leg, if one exists.
    pub fn hedge(&self) -> Option<&Position> {
        self.hedge.as_ref()
    }

    /// All legs including the proxy, for MTM and snapshots.
    pub fn all_positions(&self) -> impl Iterator<Item = &Position> {
        self.legs.iter().chain(self.hedge.iter())
    }

    /// Signed proxy quantity, 0.0 when no proxy leg exists.
    pub fn hedge_signed_quantity(&self) -> f64 {
        self.hedge.as_ref().map_or(0.0, Position::signed_quantity)
    }

    /// Net vega over every leg including the current proxy.
    pub fn net_vega(&self, obs: &DailyObservation) -> Result<f64, SimError> {
        let mut total = 0.0;
        for pos in self.all_positions() {
            total += pos.signed_vega(obs)?;
        }
        Ok(total)
    }

    /// Net vega over the strategy legs only (what the proxy must offset).
    pub fn strategy_net_vega(&self, obs: &DailyObservation) -> Result<f64, SimError> {
        let mut total = 0.0;
        for pos in &self.legs {
            total += pos.signed_vega(obs)?;
        }
        Ok(total)
    }

    /// Net delta over every leg; reported, never hedged here.
    pub fn net_delta(&self, obs: &DailyObservation) -> Result<f64, SimError> {
        let mut total = 0.0;
        for pos in self.all_positions() {
            total += pos.signed_delta(obs)?;
        }
        Ok(total)
    }

    /// Largest single strategy-leg |vega|; the default reference for
    /// the relative-imbalance test.
    pub fn reference_vega(&self, obs: &DailyObservation) -> Result<f64, SimError> {
        let mut largest = 0.0f64;
        for pos in &self.legs {
            largest = largest.max(pos.signed_vega(obs)?.abs());
        }
        Ok(largest)
    }

    /// Unsigned market value summed over every leg. Used as the
    /// capital base for percentage metrics.
    pub fn gross_notional(&self, obs: &DailyObservation) -> Result<f64, SimError> {
        let mut total = 0.0;
        for pos in self.all_positions() {
            let quote = obs.quote(&pos.instrument.underlying)?;
            total += quote.price * pos.quantity;
        }
        Ok(total)
    }

    /// Replace the hedge-proxy leg with a new signed target quantity.
    ///
    /// The proxy is re-based (not accumulated): its quantity becomes
    /// exactly `signed_quantity` and its percentage-PnL denominator
    /// resets at `price`. Only the hedge engine calls this.
    pub(crate) fn set_hedge(&mut self, instrument: Straddle, signed_quantity: f64, price: f64) {
        let direction = if signed_quantity < 0.0 {
            Direction::Short
        } else {
            Direction::Long
        };
        let quantity = signed_quantity.abs();

        match self.hedge.as_mut() {
            Some(pos) => {
                debug!(
                    ticker = %pos.instrument.ticker(),
                    old_qty = pos.signed_quantity(),
                    new_qty = signed_quantity,
                    "rebasing hedge proxy"
                );
                pos.direction = direction;
                pos.rebase(quantity, price);
            }
            None => {
                self.hedge = Some(Position::open(
                    instrument,
                    direction,
                    quantity,
                    LegRole::HedgeProxy,
                    price,
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::InstrumentQuote;
    use chrono::NaiveDate;

    fn expiry() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 21).unwrap()
    }

    fn obs(date: NaiveDate, quotes: &[(&str, f64, f64)]) -> DailyObservation {
        let mut o = DailyObservation::new(date);
        for (sym, price, vega) in quotes {
            o.insert(
                *sym,
                InstrumentQuote {
                    price: *price,
                    vega: *vega,
                    delta: 0.1,
                    days_to_expiry: 30,
                },
            );
        }
        o
    }

    fn short_leg(symbol: &str, qty: f64) -> Position {
        Position::open(
            Straddle::new(symbol, expiry(), 100.0),
            Direction::Short,
            qty,
            LegRole::SingleName,
            10.0,
        )
    }

    fn index_leg(qty: f64) -> Position {
        Position::open(
            Straddle::new("SPX", expiry(), 5000.0),
            Direction::Long,
            qty,
            LegRole::Index,
            50.0,
        )
    }

    #[test]
    fn test_signed_vega() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let o = obs(date, &[("AAPL", 10.0, 0.5)]);
        let pos = short_leg("AAPL", 1.0);
        assert!((pos.signed_vega(&o).unwrap() + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_mark_to_market_short_leg() {
        let d1 = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let prev = obs(d1, &[("AAPL", 10.0, 0.5)]);
        let curr = obs(d2, &[("AAPL", 12.0, 0.5)]);

        let pos = short_leg("AAPL", 2.0);
        let rec = pos.mark_to_market(&prev, &curr).unwrap();
        // Short 2 units, price up 2.0 -> -4.0 dollars.
        assert!((rec.dollar_pnl + 4.0).abs() < 1e-12);
        // Entry notional 20.0 -> -20%.
        assert!((rec.percent_pnl + 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_notional_percent_pnl() {
        let d1 = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let prev = obs(d1, &[("SPY", 10.0, 0.8)]);
        let curr = obs(d2, &[("SPY", 11.0, 0.8)]);

        let pos = Position::open(
            Straddle::new("SPY", expiry(), 500.0),
            Direction::Long,
            0.0,
            LegRole::HedgeProxy,
            10.0,
        );
        let rec = pos.mark_to_market(&prev, &curr).unwrap();
        assert_eq!(rec.dollar_pnl, 0.0);
        assert_eq!(rec.percent_pnl, 0.0);
    }

    #[test]
    fn test_portfolio_rejects_wrong_roles() {
        let bad_index = short_leg("AAPL", 1.0);
        assert!(matches!(
            Portfolio::new(bad_index, vec![]),
            Err(SimError::ConfigInvalid(_))
        ));

        let bad_single = index_leg(1.0);
        assert!(matches!(
            Portfolio::new(index_leg(1.0), vec![bad_single]),
            Err(SimError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn test_net_vega_includes_hedge() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let o = obs(date, &[("AAPL", 10.0, 0.5), ("SPX", 50.0, 0.3), ("SPY", 20.0, 0.8)]);

        let mut pf = Portfolio::new(index_leg(1.0), vec![short_leg("AAPL", 1.0)]).unwrap();
        assert!((pf.strategy_net_vega(&o).unwrap() + 0.2).abs() < 1e-12);

        pf.set_hedge(Straddle::new("SPY", expiry(), 500.0), 0.25, 20.0);
        assert!(pf.net_vega(&o).unwrap().abs() < 1e-9);
        assert!((pf.hedge_signed_quantity() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_set_hedge_replaces_not_accumulates() {
        let mut pf = Portfolio::new(index_leg(1.0), vec![short_leg("AAPL", 1.0)]).unwrap();
        let spy = Straddle::new("SPY", expiry(), 500.0);

        pf.set_hedge(spy.clone(), 0.25, 20.0);
        pf.set_hedge(spy, -0.10, 21.0);

        let hedge = pf.hedge().unwrap();
        assert!((pf.hedge_signed_quantity() + 0.10).abs() < 1e-12);
        assert_eq!(hedge.direction, Direction::Short);
        // Re-based denominator follows the new quantity and price.
        assert!((hedge.entry_notional - 2.1).abs() < 1e-12);
    }

    #[test]
    fn test_reference_vega_is_largest_strategy_leg() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let o = obs(date, &[("AAPL", 10.0, 0.5), ("SPX", 50.0, 0.3)]);
        let pf = Portfolio::new(index_leg(1.0), vec![short_leg("AAPL", 1.0)]).unwrap();
        assert!((pf.reference_vega(&o).unwrap() - 0.5).abs() < 1e-12);
    }
}
