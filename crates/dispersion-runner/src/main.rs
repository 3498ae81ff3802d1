//! # Dispersion Backtest Runner
//!
//! Application entry point: loads the TOML run configuration and the
//! market data CSV, runs the vega-hedged dispersion simulation, and
//! writes the run artifacts (`report.json`, `positions_log.csv`).

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use dispersion_core::{
    load_market_csv, write_positions_log, Backtest, HedgeConfig, RunReport, SimConfig, Straddle,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, Level};

#[derive(Debug, Parser)]
#[command(name = "dispersion-runner", about = "Vega-hedged dispersion backtest")]
struct Cli {
    /// Path to the run configuration.
    #[arg(long, default_value = "configs/dispersion.toml")]
    config: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RunnerConfig {
    backtest: BacktestSection,
    book: BookSection,
    hedge: HedgeSection,
    /// Straddle definitions for every symbol the run touches.
    instruments: Vec<InstrumentDef>,
}

#[derive(Debug, Deserialize)]
struct BacktestSection {
    data_path: PathBuf,
    out_dir: PathBuf,
    start_date: NaiveDate,
    end_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct BookSection {
    index_symbol: String,
    index_weight: f64,
    single_name_weights: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct HedgeSection {
    proxy_symbol: String,
    #[serde(default = "default_imbalance_pct")]
    max_vega_imbalance_pct: f64,
    #[serde(default = "default_suppression_days")]
    expiry_suppression_days: i64,
    reference_vega: Option<f64>,
}

fn default_imbalance_pct() -> f64 {
    0.10
}

fn default_suppression_days() -> i64 {
    3
}

impl RunnerConfig {
    fn instrument(&self, symbol: &str) -> Result<Straddle> {
        self.instruments
            .iter()
            .find(|def| def.underlying == symbol)
            .map(|def| Straddle::new(def.underlying.clone(), def.expiry, def.strike))
            .ok_or_else(|| anyhow!("no [[instruments]] entry for {symbol}"))
    }

    fn into_sim_config(self) -> Result<SimConfig> {
        let index = self.instrument(&self.book.index_symbol)?;
        let proxy = self.instrument(&self.hedge.proxy_symbol)?;

        let mut single_names = Vec::with_capacity(self.book.single_name_weights.len());
        for (symbol, weight) in &self.book.single_name_weights {
            single_names.push((self.instrument(symbol)?, *weight));
        }

        let mut hedge = HedgeConfig::new(proxy);
        hedge.max_vega_imbalance_pct = self.hedge.max_vega_imbalance_pct;
        hedge.expiry_suppression_days = self.hedge.expiry_suppression_days;
        hedge.reference_vega = self.hedge.reference_vega;

        Ok(SimConfig {
            start_date: self.backtest.start_date,
            end_date: self.backtest.end_date,
            index,
            index_weight: self.book.index_weight,
            single_names,
            hedge,
        })
    }
}

#[derive(Debug, Deserialize)]
struct InstrumentDef {
    underlying: String,
    expiry: NaiveDate,
    strike: f64,
}

fn report_summary(report: &RunReport) {
    let s = &report.summary;
    info!("═══════════════════════════════════════════");
    info!("        DISPERSION BACKTEST RESULTS        ");
    info!("═══════════════════════════════════════════");
    info!("Run ID:          {}", report.run_id);
    info!("Period:          {} → {}", report.start_date, report.end_date);
    info!("Trading Days:    {}", s.trading_days);
    info!("Gap Days:        {}", report.gaps.len());
    info!("Partial Run:     {}", report.partial);
    info!("───────────────────────────────────────────");
    info!("Capital Base:    ${:.2}", report.capital_base);
    info!("Total PnL:       ${:.2}", s.total_dollar_pnl);
    info!("Total Return:    {:.2}%", s.total_return_pct);
    info!("Sharpe Ratio:    {:.2}", s.sharpe_ratio);
    info!("Max Drawdown:    {:.2}%", s.max_drawdown * 100.0);
    info!("───────────────────────────────────────────");
    info!("Hedge Trades:    {}", s.hedge_trades);
    info!("Suppressed Days: {}", s.suppressed_days);
    info!("═══════════════════════════════════════════");
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("reading config from {}", cli.config.display()))?;
    let runner_config: RunnerConfig =
        toml::from_str(&config_str).context("parsing run configuration")?;

    let data_path = runner_config.backtest.data_path.clone();
    let out_dir = runner_config.backtest.out_dir.clone();

    info!("Loading market data from {}", data_path.display());
    let data = load_market_csv(&data_path)?;
    info!("Loaded {} observation days", data.len());

    let sim_config = runner_config.into_sim_config()?;
    let backtest = Backtest::new(sim_config)?;
    let report = backtest.run(&data)?;

    report_summary(&report);

    report.write_json(Path::new(&out_dir))?;
    let log_path = write_positions_log(&report.positions, Path::new(&out_dir))?;
    info!("Report written to {}", out_dir.join("report.json").display());
    info!("Positions log written to {log_path}");

    Ok(())
}
