//! # Simulation Loop
//!
//! Date-ordered replay of the dispersion book over prefetched market
//! data: Initializing -> Running(day) -> Finished.
//!
//! The first observed day builds the portfolio from configured weights
//! and fixes every leg's entry notional; its PnL is zero by convention.
//! Each later day marks every leg to market against the previous
//! observation, lets the hedge engine resize the proxy, and appends the
//! PnL records and hedge decision to the run's audit trail.
//!
//! Per-day data problems are recovered locally: the day is skipped with
//! a logged gap and the loop continues. Exhausted data ends the run
//! early with a partial (not failed) result. The portfolio and ledger
//! are owned exclusively by the running loop; parameter sweeps must
//! construct one [`Backtest`] per run.

use chrono::{Datelike, NaiveDate, Weekday};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SimError;
use crate::export::PositionSnapshot;
use crate::hedge::{HedgeConfig, HedgeDecision, HedgeEngine};
use crate::instrument::{Direction, LegRole, Straddle};
use crate::ledger::{PnlLedger, PnlRecord};
use crate::observation::{DailyObservation, MarketDataProvider};
use crate::position::{Portfolio, Position};
use crate::report::{DailyRecord, LegPnl, RunReport, RunSummary};

/// Full configuration for one backtest run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SimConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// The long index straddle and its weight.
    pub index: Straddle,
    pub index_weight: f64,
    /// Short single-name straddles with their weights.
    pub single_names: Vec<(Straddle, f64)>,
    pub hedge: HedgeConfig,
}

impl SimConfig {
    /// Fatal-at-initialization validation; the run never starts on a
    /// bad configuration.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.start_date > self.end_date {
            return Err(SimError::ConfigInvalid(format!(
                "start_date {} is after end_date {}",
                self.start_date, self.end_date
            )));
        }
        if self.index.underlying.is_empty() {
            return Err(SimError::ConfigInvalid(
                "index underlying symbol is empty".to_string(),
            ));
        }
        if !self.index_weight.is_finite() || self.index_weight <= 0.0 {
            return Err(SimError::ConfigInvalid(format!(
                "index_weight must be positive, got {}",
                self.index_weight
            )));
        }
        if self.single_names.is_empty() {
            return Err(SimError::ConfigInvalid(
                "single_name_weights is empty".to_string(),
            ));
        }
        for (instrument, weight) in &self.single_names {
            if !weight.is_finite() || *weight <= 0.0 {
                return Err(SimError::ConfigInvalid(format!(
                    "weight for {} must be positive, got {weight}",
                    instrument.underlying
                )));
            }
        }
        self.hedge.validate()
    }
}

/// Everything one successfully simulated day produced.
struct DayOutcome {
    records: Vec<PnlRecord>,
    decision: HedgeDecision,
    net_delta: f64,
    snapshots: Vec<PositionSnapshot>,
}

/// Owns one run of the simulation: portfolio, ledger, audit trail.
pub struct Backtest {
    config: SimConfig,
    engine: HedgeEngine,
    stop: Arc<AtomicBool>,
}

impl Backtest {
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        let engine = HedgeEngine::new(config.hedge.clone())?;
        Ok(Self {
            config,
            engine,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Cooperative stop flag, checked once per simulated day.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Run the simulation to completion (or early partial termination)
    /// and produce the run report.
    pub fn run(self, provider: &dyn MarketDataProvider) -> Result<RunReport, SimError> {
        info!(
            start = %self.config.start_date,
            end = %self.config.end_date,
            legs = self.config.single_names.len() + 1,
            proxy = %self.config.hedge.proxy.underlying,
            "starting dispersion backtest"
        );

        let mut portfolio: Option<Portfolio> = None;
        let mut prev_obs: Option<DailyObservation> = None;
        let mut ledger = PnlLedger::new();
        let mut decisions: Vec<HedgeDecision> = Vec::new();
        let mut daily: Vec<DailyRecord> = Vec::new();
        let mut gaps: Vec<NaiveDate> = Vec::new();
        let mut snapshots: Vec<PositionSnapshot> = Vec::new();
        let mut capital_base = 0.0;
        let mut partial = false;

        let mut date = self.config.start_date;
        if let Some(first) = provider.first_available() {
            if first > date {
                debug!(%first, "no data at window start; jumping to inception");
                date = first;
            }
        }
        while date <= self.config.end_date {
            if self.stop.load(Ordering::SeqCst) {
                warn!(%date, "stop requested; ending run after previous day");
                partial = true;
                break;
            }

            let obs = match provider.get_observation(date) {
                Ok(obs) => obs,
                Err(_) => {
                    if provider.last_available().map_or(true, |last| date > last) {
                        info!(%date, "observation data exhausted; reporting partial result");
                        partial = true;
                        break;
                    }
                    // Weekends and pre-inception days are expected
                    // holes, not data gaps.
                    if portfolio.is_some() && !is_weekend(date) {
                        warn!(%date, "missing observation; day skipped");
                        gaps.push(date);
                    }
                    date = next_day(date);
                    continue;
                }
            };

            let outcome = if portfolio.is_none() {
                match self.initialize(&obs) {
                    Ok((built, base, outcome)) => {
                        portfolio = Some(built);
                        capital_base = base;
                        outcome
                    }
                    Err(err) => {
                        warn!(%date, %err, "cannot open book; day skipped");
                        gaps.push(date);
                        date = next_day(date);
                        continue;
                    }
                }
            } else {
                let pf = portfolio
                    .as_mut()
                    .expect("portfolio checked above");
                let prev = prev_obs
                    .as_ref()
                    .expect("previous observation exists once the book is open");
                match self.simulate_day(pf, prev, &obs) {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        warn!(%date, %err, "day skipped");
                        gaps.push(date);
                        date = next_day(date);
                        continue;
                    }
                }
            };

            let legs = outcome
                .records
                .iter()
                .map(|r| LegPnl {
                    leg: r.leg.clone(),
                    dollar_pnl: r.dollar_pnl,
                    percent_pnl: r.percent_pnl,
                })
                .collect();
            daily.push(DailyRecord {
                date,
                legs,
                net_vega_before: outcome.decision.net_vega_before,
                net_vega_after: outcome.decision.net_vega_after,
                hedge_trade_qty: outcome.decision.proxy_trade_qty,
                suppressed: outcome.decision.suppressed,
                net_delta: outcome.net_delta,
            });
            for record in outcome.records {
                ledger.append(record);
            }
            decisions.push(outcome.decision);
            snapshots.extend(outcome.snapshots);

            prev_obs = Some(obs);
            date = next_day(date);
        }

        if portfolio.is_none() {
            warn!("no observation day could open the book; report is empty");
            partial = true;
        }

        let summary = RunSummary::compute(capital_base, &ledger, &decisions);
        info!(
            trading_days = summary.trading_days,
            total_pnl = summary.total_dollar_pnl,
            hedge_trades = summary.hedge_trades,
            suppressed_days = summary.suppressed_days,
            gaps = gaps.len(),
            partial,
            "dispersion backtest finished"
        );

        Ok(RunReport {
            run_id: Uuid::new_v4(),
            created_at: chrono::Utc::now(),
            start_date: self.config.start_date,
            end_date: self.config.end_date,
            capital_base,
            partial,
            gaps,
            daily,
            decisions,
            ledger,
            positions: snapshots,
            summary,
        })
    }

    /// Open the book on the first observed day. Entry prices and the
    /// fixed percentage-PnL notionals come from this day's quotes; the
    /// capital base is the gross notional of the strategy legs before
    /// any hedge. Day-one PnL is zero by convention.
    fn initialize(
        &self,
        obs: &DailyObservation,
    ) -> Result<(Portfolio, f64, DayOutcome), SimError> {
        let index_price = obs.quote(&self.config.index.underlying)?.price;
        let index = Position::open(
            self.config.index.clone(),
            Direction::Long,
            self.config.index_weight,
            LegRole::Index,
            index_price,
        );

        let mut singles = Vec::with_capacity(self.config.single_names.len());
        for (instrument, weight) in &self.config.single_names {
            let price = obs.quote(&instrument.underlying)?.price;
            singles.push(Position::open(
                instrument.clone(),
                Direction::Short,
                *weight,
                LegRole::SingleName,
                price,
            ));
        }

        let mut portfolio = Portfolio::new(index, singles)?;
        let capital_base = portfolio.gross_notional(obs)?;
        debug!(date = %obs.date, capital_base, "book opened");

        let decision = self.engine.evaluate(&mut portfolio, obs)?;

        let records = portfolio
            .all_positions()
            .map(|pos| PnlRecord {
                date: obs.date,
                leg: pos.label().to_string(),
                dollar_pnl: 0.0,
                percent_pnl: 0.0,
            })
            .collect();
        let net_delta = portfolio.net_delta(obs)?;
        let snapshots = portfolio
            .all_positions()
            .filter_map(|pos| PositionSnapshot::capture(pos, obs))
            .collect();

        let outcome = DayOutcome {
            records,
            decision,
            net_delta,
            snapshots,
        };
        Ok((portfolio, capital_base, outcome))
    }

    /// One running-state day: MTM against the previous observation with
    /// the quantities carried into the day, then rehedge.
    ///
    /// Nothing is committed on error; the caller records the gap and
    /// the portfolio is untouched (the engine only mutates after all of
    /// its lookups succeed).
    fn simulate_day(
        &self,
        portfolio: &mut Portfolio,
        prev: &DailyObservation,
        obs: &DailyObservation,
    ) -> Result<DayOutcome, SimError> {
        let mut records = Vec::new();
        for pos in portfolio.all_positions() {
            records.push(pos.mark_to_market(prev, obs)?);
        }

        let decision = self.engine.evaluate(portfolio, obs)?;
        let net_delta = portfolio.net_delta(obs)?;
        let snapshots = portfolio
            .all_positions()
            .filter_map(|pos| PositionSnapshot::capture(pos, obs))
            .collect();

        Ok(DayOutcome {
            records,
            decision,
            net_delta,
            snapshots,
        })
    }
}

fn next_day(date: NaiveDate) -> NaiveDate {
    date.succ_opt().expect("date range stays within chrono bounds")
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::{InstrumentQuote, PrefetchedMarketData};

    fn expiry() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 21).unwrap()
    }

    fn config(start: NaiveDate, end: NaiveDate) -> SimConfig {
        SimConfig {
            start_date: start,
            end_date: end,
            index: Straddle::new("SPX", expiry(), 5000.0),
            index_weight: 1.0,
            single_names: vec![(Straddle::new("AAPL", expiry(), 190.0), 1.0)],
            hedge: HedgeConfig::new(Straddle::new("SPY", expiry(), 500.0)),
        }
    }

    fn day(
        date: NaiveDate,
        aapl: (f64, f64),
        spx: (f64, f64),
        spy: (f64, f64),
        days_to_expiry: i64,
    ) -> DailyObservation {
        let mut obs = DailyObservation::new(date);
        obs.insert(
            "AAPL",
            InstrumentQuote { price: aapl.0, vega: aapl.1, delta: 0.05, days_to_expiry },
        );
        obs.insert(
            "SPX",
            InstrumentQuote { price: spx.0, vega: spx.1, delta: -0.02, days_to_expiry },
        );
        obs.insert(
            "SPY",
            InstrumentQuote { price: spy.0, vega: spy.1, delta: 0.01, days_to_expiry: 45 },
        );
        obs
    }

    fn d(day_of_march: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day_of_march).unwrap()
    }

    #[test]
    fn test_flat_prices_give_zero_pnl() {
        // Monday 2024-03-04 and Tuesday 2024-03-05, identical prices.
        let data = PrefetchedMarketData::from_observations(vec![
            day(d(4), (10.0, 0.5), (50.0, 0.3), (20.0, 0.8), 30),
            day(d(5), (10.0, 0.5), (50.0, 0.3), (20.0, 0.8), 29),
        ]);

        let report = Backtest::new(config(d(4), d(5))).unwrap().run(&data).unwrap();
        assert!(!report.partial);
        assert_eq!(report.daily.len(), 2);
        for record in report.ledger.records() {
            assert_eq!(record.dollar_pnl, 0.0);
            assert_eq!(record.percent_pnl, 0.0);
        }
    }

    #[test]
    fn test_day_one_hedges_and_later_pnl_is_additive() {
        let data = PrefetchedMarketData::from_observations(vec![
            day(d(4), (10.0, 0.5), (50.0, 0.3), (20.0, 0.8), 30),
            day(d(5), (11.0, 0.5), (49.0, 0.3), (20.5, 0.8), 29),
        ]);

        let report = Backtest::new(config(d(4), d(5))).unwrap().run(&data).unwrap();

        // Day one: net vega -0.20 vs reference 0.50 -> 40% imbalance,
        // proxy bought to flatten.
        let first = &report.decisions[0];
        assert!((first.proxy_trade_qty - 0.25).abs() < 1e-12);
        assert!(first.net_vega_after.abs() < 1e-9);

        // Day two has a proxy PnL record alongside the strategy legs.
        let day2: Vec<_> = report
            .ledger
            .records()
            .iter()
            .filter(|r| r.date == d(5))
            .collect();
        assert_eq!(day2.len(), 3);

        // Additivity: per-leg sum equals the date total.
        let leg_sum: f64 = day2.iter().map(|r| r.dollar_pnl).sum();
        let totals = report.ledger.total_pnl_by_date();
        assert!((leg_sum - totals[&d(5)]).abs() < 1e-12);

        // AAPL short loses 1.0, SPX long loses 1.0, proxy long 0.25
        // gains 0.125.
        assert!((leg_sum + 1.875).abs() < 1e-12);
    }

    #[test]
    fn test_gap_day_is_skipped_and_recorded() {
        // Wednesday 2024-03-06 is missing; Thursday marks against
        // Tuesday's prices.
        let data = PrefetchedMarketData::from_observations(vec![
            day(d(4), (10.0, 0.5), (50.0, 0.3), (20.0, 0.8), 30),
            day(d(5), (10.0, 0.5), (50.0, 0.3), (20.0, 0.8), 29),
            day(d(7), (12.0, 0.5), (50.0, 0.3), (20.0, 0.8), 27),
        ]);

        let report = Backtest::new(config(d(4), d(7))).unwrap().run(&data).unwrap();
        assert!(!report.partial);
        assert_eq!(report.gaps, vec![d(6)]);
        assert_eq!(report.daily.len(), 3);

        // Thursday's AAPL short: price 10 -> 12 against Tuesday.
        let aapl: Vec<_> = report.ledger.pnl_by_leg("AAPL");
        let thursday = aapl.iter().find(|r| r.date == d(7)).unwrap();
        assert!((thursday.dollar_pnl + 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_weekend_is_not_a_gap() {
        // Friday 2024-03-08 to Monday 2024-03-11.
        let data = PrefetchedMarketData::from_observations(vec![
            day(d(8), (10.0, 0.5), (50.0, 0.3), (20.0, 0.8), 30),
            day(d(11), (10.0, 0.5), (50.0, 0.3), (20.0, 0.8), 27),
        ]);

        let report = Backtest::new(config(d(8), d(11))).unwrap().run(&data).unwrap();
        assert!(report.gaps.is_empty());
        assert_eq!(report.daily.len(), 2);
    }

    #[test]
    fn test_partial_run_when_data_exhausted() {
        let data = PrefetchedMarketData::from_observations(vec![
            day(d(4), (10.0, 0.5), (50.0, 0.3), (20.0, 0.8), 30),
            day(d(5), (10.0, 0.5), (50.0, 0.3), (20.0, 0.8), 29),
        ]);

        let report = Backtest::new(config(d(4), d(15))).unwrap().run(&data).unwrap();
        assert!(report.partial);
        assert_eq!(report.daily.len(), 2);
        // Days past the data's end are not gaps.
        assert!(report.gaps.is_empty());
    }

    #[test]
    fn test_suppression_near_expiry_in_run() {
        let data = PrefetchedMarketData::from_observations(vec![
            day(d(4), (10.0, 0.5), (50.0, 0.3), (20.0, 0.8), 2),
        ]);

        let report = Backtest::new(config(d(4), d(4))).unwrap().run(&data).unwrap();
        let decision = &report.decisions[0];
        assert!(decision.suppressed);
        assert_eq!(decision.proxy_trade_qty, 0.0);
        assert_eq!(decision.net_vega_after, decision.net_vega_before);
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let mut bad = config(d(5), d(4));
        assert!(matches!(Backtest::new(bad.clone()), Err(SimError::ConfigInvalid(_))));

        bad = config(d(4), d(5));
        bad.single_names.clear();
        assert!(Backtest::new(bad).is_err());

        let mut bad = config(d(4), d(5));
        bad.single_names[0].1 = -1.0;
        assert!(Backtest::new(bad).is_err());

        let mut bad = config(d(4), d(5));
        bad.index = Straddle::new("", expiry(), 5000.0);
        assert!(matches!(Backtest::new(bad), Err(SimError::ConfigInvalid(_))));
    }

    #[test]
    fn test_run_jumps_to_first_available_observation() {
        // Window opens Friday 2024-03-01 but data starts Monday; the
        // book opens on the first available day with no gaps logged.
        let data = PrefetchedMarketData::from_observations(vec![
            day(d(4), (10.0, 0.5), (50.0, 0.3), (20.0, 0.8), 30),
        ]);

        let report = Backtest::new(config(d(1), d(4))).unwrap().run(&data).unwrap();
        assert!(!report.partial);
        assert!(report.gaps.is_empty());
        assert_eq!(report.daily.len(), 1);
        assert_eq!(report.daily[0].date, d(4));
    }

    #[test]
    fn test_stop_flag_ends_run_early() {
        let data = PrefetchedMarketData::from_observations(vec![
            day(d(4), (10.0, 0.5), (50.0, 0.3), (20.0, 0.8), 30),
        ]);

        let bt = Backtest::new(config(d(4), d(8))).unwrap();
        bt.stop_handle().store(true, Ordering::SeqCst);
        let report = bt.run(&data).unwrap();
        assert!(report.partial);
        assert!(report.daily.is_empty());
    }

    #[test]
    fn test_positions_log_snapshots_cover_all_legs() {
        let data = PrefetchedMarketData::from_observations(vec![
            day(d(4), (10.0, 0.5), (50.0, 0.3), (20.0, 0.8), 30),
        ]);

        let report = Backtest::new(config(d(4), d(4))).unwrap().run(&data).unwrap();
        // Index + single name + hedge proxy created on day one.
        assert_eq!(report.positions.len(), 3);
        assert!(report
            .positions
            .iter()
            .any(|s| s.underlying == "SPY" && s.position_type == "long"));
    }
}
