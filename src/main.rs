use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use thiserror::Error;

use union_scoring::api::handler::TodayStatus;
use union_scoring::api::server::{self, AppState, RouteError, SharedGateway};
use union_scoring::db::prelude::*;
use union_scoring::identity::IdentityResolver;
use union_scoring::identity::provider::HttpIdentityProvider;
use union_scoring::identity::storage::FileStorage;
use union_scoring::scoring::{ScoringService, WindowError};
use union_scoring::util::env::{EnvErr, Var};
use union_scoring::util::photo::PhotoStorage;
use union_scoring::util::telemetry::{LogFormat, Telemetry, TelemetryErr};
use union_scoring::var;

#[derive(Parser, Debug)]
#[command(version, about = "Daily connection points and monthly rankings")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record today's connection for the current user
    Connect,
    /// Show whether the current user already connected today
    Status,
    /// Month-to-date points for the current user
    Score(WindowArgs),
    /// Connection history for the current user
    History(WindowArgs),
    /// Monthly leaderboard
    Ranking(WindowArgs),
    /// Print the resolved identity
    Whoami,
    /// Run the HTTP API
    Serve,
}

#[derive(Args, Debug, Clone, Copy)]
struct WindowArgs {
    /// Defaults to the current year
    #[arg(long)]
    year: Option<i32>,

    /// 1-12, defaults to the current month
    #[arg(long)]
    month: Option<u32>,
}

#[derive(Debug, Error)]
enum RunnerErr {
    #[error(transparent)]
    Telemetry(#[from] TelemetryErr),

    #[error(transparent)]
    Env(#[from] EnvErr),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Window(#[from] WindowError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

type Result<T> = core::result::Result<T, RunnerErr>;

type Resolver = IdentityResolver<FileStorage, Option<HttpIdentityProvider>>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = match cli.json_logs {
        true => LogFormat::Json,
        false => LogFormat::Pretty,
    };

    let telemetry = Telemetry::new(format).await?.register()?;
    tracing::debug!(command = ?cli.command, "starting");

    let res = run(cli.command).await;
    if let Err(e) = &res {
        tracing::error!(error = ?e, "command failed");
    }

    telemetry.shutdown();
    res
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Whoami => print_json(&resolver().await?.resolve().await),

        Command::Connect => {
            let identity = resolver().await?.resolve().await;
            let scoring = scoring_service().await?;
            print_json(&scoring.record_connection(&identity).await)
        }

        Command::Status => {
            let identity = resolver().await?.resolve().await;
            let scoring = scoring_service().await?;
            print_json(&TodayStatus {
                connected_today: scoring.has_connected_today(&identity).await,
            })
        }

        Command::Score(args) => {
            let identity = resolver().await?.resolve().await;
            let scoring = scoring_service().await?;
            let window = scoring.window(args.year, args.month)?;
            print_json(&scoring.user_score(Some(&identity), Some(window)).await)
        }

        Command::History(args) => {
            let identity = resolver().await?.resolve().await;
            let scoring = scoring_service().await?;
            let window = scoring.window(args.year, args.month)?;
            print_json(&scoring.user_connections(&identity, Some(window)).await)
        }

        Command::Ranking(args) => {
            let scoring = scoring_service().await?;
            let window = scoring.window(args.year, args.month)?;
            print_json(&scoring.monthly_ranking(Some(window)).await)
        }

        Command::Serve => {
            let scoring = scoring_service().await?;
            Ok(server::serve(AppState::new(scoring)).await?)
        }
    }
}

async fn scoring_service() -> Result<ScoringService<SharedGateway>> {
    let pool = db_pool().await?;
    run_migrations(pool).await?;

    let gateway: SharedGateway = Arc::new(ConnectionRepository::new(pool));
    Ok(ScoringService::new(gateway, PhotoStorage::from_env().await?))
}

async fn resolver() -> Result<Resolver> {
    let storage = FileStorage::new(var!(Var::SessionStorePath).await?);
    let provider = HttpIdentityProvider::from_env().await?;

    Ok(IdentityResolver::new(storage, provider))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
