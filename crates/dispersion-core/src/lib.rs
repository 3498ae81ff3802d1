//! # Dispersion Backtest Core
//!
//! Daily simulation engine for a vega-hedged reverse dispersion book.
//!
//! ## Description
//! The book is short single-name straddles against one long index
//! straddle. Each simulated day the engine aggregates signed vega across
//! all legs and, when the imbalance is large enough and no leg is about
//! to expire, trades a proxy straddle to flatten it. PnL is attributed
//! per leg, per day, into an append-only ledger.
//!
//! ### Core Subsystems
//! - **Instruments**: straddle definitions, directions, and leg roles.
//! - **Portfolio**: fixed strategy legs plus the engine-owned hedge leg.
//! - **Hedge Engine**: threshold- and expiry-gated vega neutralization.
//! - **Simulation Loop**: date-ordered replay over prefetched market data.
//! - **Reporting**: JSON run report and dashboard-compatible CSV export.

pub mod error;
pub mod export;
pub mod hedge;
pub mod instrument;
pub mod ledger;
pub mod loader;
pub mod observation;
pub mod position;
pub mod report;
pub mod sim;

pub use error::SimError;
pub use export::{write_positions_log, PositionSnapshot};
pub use hedge::{HedgeConfig, HedgeDecision, HedgeEngine};
pub use instrument::{Direction, LegRole, Straddle};
pub use ledger::{PnlLedger, PnlRecord};
pub use loader::{load_market_csv, parse_market_csv};
pub use observation::{DailyObservation, InstrumentQuote, MarketDataProvider, PrefetchedMarketData};
pub use position::{Portfolio, Position};
pub use report::{DailyRecord, LegPnl, RunReport, RunSummary};
pub use sim::{Backtest, SimConfig};
