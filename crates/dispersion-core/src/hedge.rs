//! # Vega Hedge Engine
//!
//! Keeps the book's aggregate vega near flat by resizing one proxy
//! straddle leg, subject to two gates evaluated in order:
//!
//! 1. **Expiry suppression** - no trade when any strategy leg is within
//!    the configured number of days of expiry, regardless of imbalance.
//!    Greeks are unreliable that close to expiry.
//! 2. **Imbalance threshold** - no trade unless |net vega| relative to a
//!    reference vega exceeds the configured percentage. Hysteresis
//!    against churn from sub-threshold noise.
//!
//! Sizing uses the replace policy: the proxy quantity after a
//! qualifying rehedge is exactly the quantity that flattens the current
//! net vega of the strategy legs, not an increment on prior builds.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::SimError;
use crate::instrument::Straddle;
use crate::observation::DailyObservation;
use crate::position::Portfolio;

const VEGA_EPS: f64 = 1e-12;

/// Hedge engine parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgeConfig {
    /// Proxy straddle traded to neutralize vega.
    pub proxy: Straddle,
    /// Relative imbalance that must be exceeded before trading.
    pub max_vega_imbalance_pct: f64,
    /// Suppress hedging when a strategy leg is this close to expiry.
    pub expiry_suppression_days: i64,
    /// Fixed reference vega for the imbalance ratio; when unset, the
    /// largest single strategy-leg |vega| is used.
    pub reference_vega: Option<f64>,
}

impl HedgeConfig {
    pub fn new(proxy: Straddle) -> Self {
        Self {
            proxy,
            max_vega_imbalance_pct: 0.10,
            expiry_suppression_days: 3,
            reference_vega: None,
        }
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if !self.max_vega_imbalance_pct.is_finite() || self.max_vega_imbalance_pct < 0.0 {
            return Err(SimError::ConfigInvalid(format!(
                "max_vega_imbalance_pct must be non-negative, got {}",
                self.max_vega_imbalance_pct
            )));
        }
        if self.expiry_suppression_days < 0 {
            return Err(SimError::ConfigInvalid(format!(
                "expiry_suppression_days must be non-negative, got {}",
                self.expiry_suppression_days
            )));
        }
        if self.proxy.underlying.is_empty() {
            return Err(SimError::ConfigInvalid(
                "proxy underlying symbol is empty".to_string(),
            ));
        }
        if let Some(reference) = self.reference_vega {
            if !reference.is_finite() || reference <= 0.0 {
                return Err(SimError::ConfigInvalid(format!(
                    "reference_vega must be positive, got {reference}"
                )));
            }
        }
        Ok(())
    }
}

/// Audit record of one day's hedge evaluation. Append-only.
#[derive(Debug, Clone, Serialize)]
pub struct HedgeDecision {
    pub date: NaiveDate,
    pub net_vega_before: f64,
    /// Signed proxy quantity traded (target minus prior holding).
    pub proxy_trade_qty: f64,
    pub net_vega_after: f64,
    pub suppressed: bool,
    /// Recovered-condition note (e.g. unusable proxy vega).
    pub note: Option<String>,
}

impl HedgeDecision {
    fn no_trade(date: NaiveDate, net_vega: f64, suppressed: bool, note: Option<String>) -> Self {
        Self {
            date,
            net_vega_before: net_vega,
            proxy_trade_qty: 0.0,
            net_vega_after: net_vega,
            suppressed,
            note,
        }
    }
}

/// Threshold- and expiry-gated vega neutralizer.
pub struct HedgeEngine {
    config: HedgeConfig,
}

impl HedgeEngine {
    /// Validates the configuration up front; invalid limits never make
    /// it into a running engine.
    pub fn new(config: HedgeConfig) -> Result<Self, SimError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &HedgeConfig {
        &self.config
    }

    /// Evaluate one day and, on a qualifying rehedge, resize the
    /// portfolio's proxy leg. Deterministic for a given portfolio and
    /// observation.
    pub fn evaluate(
        &self,
        portfolio: &mut Portfolio,
        obs: &DailyObservation,
    ) -> Result<HedgeDecision, SimError> {
        let date = obs.date;
        let net_before = portfolio.net_vega(obs)?;

        // Gate 1: expiry proximity of the legs being hedged.
        let mut nearest_expiry = i64::MAX;
        for leg in portfolio.strategy_legs() {
            let quote = obs.quote(&leg.instrument.underlying)?;
            nearest_expiry = nearest_expiry.min(quote.days_to_expiry);
        }
        if nearest_expiry <= self.config.expiry_suppression_days {
            debug!(
                %date,
                days_to_expiry = nearest_expiry,
                net_vega = net_before,
                "hedge suppressed near expiry"
            );
            return Ok(HedgeDecision::no_trade(date, net_before, true, None));
        }

        // Gate 2: relative imbalance hysteresis.
        let reference = match self.config.reference_vega {
            Some(reference) => reference,
            None => portfolio.reference_vega(obs)?,
        };
        if reference <= VEGA_EPS {
            warn!(%date, "reference vega is zero; skipping hedge evaluation");
            return Ok(HedgeDecision::no_trade(
                date,
                net_before,
                false,
                Some("reference vega is zero".to_string()),
            ));
        }
        let imbalance = net_before.abs() / reference;
        if imbalance <= self.config.max_vega_imbalance_pct {
            return Ok(HedgeDecision::no_trade(date, net_before, false, None));
        }

        // Proxy vega guard: zero or missing vega means no trade and a
        // recorded warning, never an aborted run.
        let proxy_symbol = &self.config.proxy.underlying;
        let proxy_quote = match obs.get(proxy_symbol) {
            Some(quote) if quote.vega.is_finite() && quote.vega.abs() > VEGA_EPS => *quote,
            _ => {
                let condition = SimError::ZeroVegaHedge {
                    date,
                    symbol: proxy_symbol.clone(),
                };
                warn!(%date, proxy = %proxy_symbol, "unusable proxy vega; no hedge trade");
                return Ok(HedgeDecision::no_trade(
                    date,
                    net_before,
                    false,
                    Some(condition.to_string()),
                ));
            }
        };

        // Replace policy: size the proxy to flatten the strategy legs'
        // current net vega, discarding the prior proxy quantity.
        let strategy_vega = portfolio.strategy_net_vega(obs)?;
        let target_qty = -strategy_vega / proxy_quote.vega;
        let trade_qty = target_qty - portfolio.hedge_signed_quantity();

        portfolio.set_hedge(self.config.proxy.clone(), target_qty, proxy_quote.price);
        let net_after = portfolio.net_vega(obs)?;

        info!(
            %date,
            net_vega_before = net_before,
            net_vega_after = net_after,
            trade_qty,
            imbalance_pct = imbalance * 100.0,
            "rehedged proxy straddle"
        );

        Ok(HedgeDecision {
            date,
            net_vega_before: net_before,
            proxy_trade_qty: trade_qty,
            net_vega_after: net_after,
            suppressed: false,
            note: None,
        })
    }
}
