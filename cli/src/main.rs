#![forbid(unsafe_code)]

//! `ferrotrade` — the process entry points the orchestrator spawns
//! (`spec.md` §6): `backend run`, `backtest run`, `deployment run`, and
//! `pipeline run`. Each subcommand assembles its own store/bus handles from
//! [`config::AppConfig`] and exits with a status code reflecting the
//! outcome, the way the teacher's xtask dispatches subcommands.

mod commands;
mod config;
mod error;

pub use error::CliError;

use clap::{Parser, Subcommand};
use config::AppConfig;
use ferrotrade_types::MarketType;
use std::path::PathBuf;
use std::process::ExitCode;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "ferrotrade", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the aggregator and the order/snapshot event handler.
    Backend {
        /// Size of the tokio runtime's worker-thread pool.
        #[arg(long, default_value_t = 4)]
        workers: usize,
    },
    /// Run one backtest to completion.
    Backtest {
        #[command(subcommand)]
        action: BacktestAction,
    },
    /// Run one deployment until stopped.
    Deployment {
        #[command(subcommand)]
        action: DeploymentAction,
    },
    /// Stream ticks from one venue connection onto the bus.
    Pipeline {
        #[command(subcommand)]
        action: PipelineAction,
    },
}

#[derive(Subcommand)]
enum BacktestAction {
    Run {
        #[arg(long)]
        backtest_id: Uuid,
        /// Path to a DSL program to register under the backtest's
        /// `strategy_id`. Until the strategy registry is wired to a real
        /// strategy store, this is how a strategy is supplied standalone.
        #[arg(long)]
        strategy_dsl_file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum DeploymentAction {
    Run {
        #[arg(long)]
        deployment_id: Uuid,
        #[arg(long)]
        strategy_dsl_file: Option<PathBuf>,
        #[arg(long, env = "BROKER_BASE_URL")]
        broker_base_url: url::Url,
        #[arg(long, env = "BROKER_API_KEY")]
        broker_api_key: String,
        #[arg(long, env = "BROKER_API_SECRET")]
        broker_api_secret: String,
        #[arg(long, env = "BROKER_SOURCE")]
        broker_source: String,
        #[arg(long, default_value_t = 200)]
        broker_rate_limit_per_minute: u32,
    },
}

#[derive(Subcommand)]
enum PipelineAction {
    Run {
        #[arg(long)]
        broker: String,
        #[arg(long)]
        market: MarketTypeArg,
        #[arg(long)]
        symbol: String,
        #[arg(long, env = "PIPELINE_WS_URL")]
        ws_url: url::Url,
    },
}

#[derive(Clone, clap::ValueEnum)]
enum MarketTypeArg {
    Spot,
    Future,
    Perpetual,
    Option,
}

impl From<MarketTypeArg> for MarketType {
    fn from(value: MarketTypeArg) -> Self {
        match value {
            MarketTypeArg::Spot => MarketType::Spot,
            MarketTypeArg::Future => MarketType::Future,
            MarketTypeArg::Perpetual => MarketType::Perpetual,
            MarketTypeArg::Option => MarketType::Option,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let workers = match &cli.command {
        Commands::Backend { workers } => *workers,
        _ => 2,
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers.max(1))
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(dispatch(cli.command)) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(command: Commands) -> Result<ExitCode, CliError> {
    let config = AppConfig::from_env();

    match command {
        Commands::Backend { .. } => {
            let handles = config.build_stores().await?;
            let bus = config.build_bus().await?;
            commands::backend_run(handles, bus, config.redis_url.clone()).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Backtest {
            action: BacktestAction::Run { backtest_id, strategy_dsl_file },
        } => {
            let handles = config.build_stores().await?;
            commands::backtest_run(handles, backtest_id, strategy_dsl_file).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Deployment {
            action:
                DeploymentAction::Run {
                    deployment_id,
                    strategy_dsl_file,
                    broker_base_url,
                    broker_api_key,
                    broker_api_secret,
                    broker_source,
                    broker_rate_limit_per_minute,
                },
        } => {
            let handles = config.build_stores().await?;
            let bus = config.build_bus().await?;
            let credentials = commands::deployment::BrokerCredentials {
                base_url: broker_base_url,
                api_key: broker_api_key,
                api_secret: broker_api_secret,
                source: broker_source,
                rate_limit_per_minute: broker_rate_limit_per_minute,
            };
            let code = commands::deployment_run(handles, bus, deployment_id, strategy_dsl_file, credentials).await?;
            Ok(if code == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Commands::Pipeline {
            action:
                PipelineAction::Run {
                    broker,
                    market,
                    symbol,
                    ws_url,
                },
        } => {
            let bus = config.build_bus().await?;
            commands::pipeline_run(bus, ws_url, broker, market.into(), symbol).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_type_arg_maps_onto_every_market_type_variant() {
        assert_eq!(MarketType::from(MarketTypeArg::Spot), MarketType::Spot);
        assert_eq!(MarketType::from(MarketTypeArg::Future), MarketType::Future);
        assert_eq!(MarketType::from(MarketTypeArg::Perpetual), MarketType::Perpetual);
        assert_eq!(MarketType::from(MarketTypeArg::Option), MarketType::Option);
    }

    #[test]
    fn cli_parses_backend_run_with_default_workers() {
        let cli = Cli::parse_from(["ferrotrade", "backend"]);
        match cli.command {
            Commands::Backend { workers } => assert_eq!(workers, 4),
            _ => panic!("expected Backend command"),
        }
    }

    #[test]
    fn cli_parses_backtest_run_with_backtest_id() {
        let id = Uuid::new_v4();
        let cli = Cli::parse_from(["ferrotrade", "backtest", "run", "--backtest-id", &id.to_string()]);
        match cli.command {
            Commands::Backtest {
                action: BacktestAction::Run { backtest_id, strategy_dsl_file },
            } => {
                assert_eq!(backtest_id, id);
                assert!(strategy_dsl_file.is_none());
            }
            _ => panic!("expected Backtest::Run command"),
        }
    }
}
