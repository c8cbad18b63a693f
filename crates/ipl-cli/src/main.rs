// `ipl` command-line front end.
//
// Every subcommand follows the same startup:
// 1. Load config
// 2. Initialize tracing (the log directory comes from config)
// 3. Open database
// 4. Run the command and print its result as JSON on stdout

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use ipl_analytics::artifacts::generate_version;
use ipl_analytics::predict::{PredictionRequest, Predictor};
use ipl_analytics::stats::{get_bowler_stats, get_player_stats};
use ipl_analytics::training::{self, TrainingOptions};
use ipl_core::config::{self, Config};
use ipl_core::db::Database;
use ipl_core::ingest;

#[derive(Parser)]
#[command(name = "ipl")]
#[command(about = "IPL match records, career statistics and innings run prediction", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the raw CSV exports into the database
    Ingest,
    /// Build the feature frame, fit the model and write artifacts
    Train {
        /// Override the first held-out season
        #[arg(long)]
        test_season_start: Option<i32>,
        /// Override the ridge penalty
        #[arg(long)]
        l2: Option<f64>,
    },
    /// Career batting statistics for a player
    Stats { player_id: i64 },
    /// Career bowling figures for a player
    Bowling { player_id: i64 },
    /// List players, optionally filtered by name
    Players {
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value = "50")]
        limit: usize,
        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// Predict the runs a team will score in an innings
    Predict {
        #[arg(long)]
        season: i32,
        #[arg(long)]
        venue: String,
        #[arg(long)]
        team: String,
        #[arg(long)]
        opposition: String,
        #[arg(long)]
        toss_winner: String,
        #[arg(long)]
        toss_choice: String,
        #[arg(long)]
        innings: i32,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = config::load_config().context("failed to load configuration")?;
    init_tracing(&config, cli.verbose)?;
    info!(db = %config.database.path, "ipl starting");

    let db = Database::open(&config.database.path).context("failed to open database")?;

    match cli.command {
        Commands::Ingest => {
            let summary = ingest::ingest_all(&db, &config.data).context("ingestion failed")?;
            print_json(&summary)
        }
        Commands::Train {
            test_season_start,
            l2,
        } => {
            let options = TrainingOptions {
                recent_window: config.features.recent_window,
                test_season_start: test_season_start.unwrap_or(config.training.test_season_start),
                l2: l2.unwrap_or(config.training.l2),
                version: generate_version(),
            };
            let report = training::train(&db, &options, Path::new(&config.artifacts.dir))
                .context("training failed")?;
            print_json(&report)
        }
        Commands::Stats { player_id } => {
            let stats = get_player_stats(&db, player_id)
                .with_context(|| format!("failed to compute stats for player {player_id}"))?;
            print_json(&stats)
        }
        Commands::Bowling { player_id } => {
            let stats = get_bowler_stats(&db, player_id)
                .with_context(|| format!("failed to compute bowling figures for player {player_id}"))?;
            print_json(&stats)
        }
        Commands::Players {
            search,
            limit,
            offset,
        } => {
            let players = db
                .list_players(search.as_deref(), limit, offset)
                .context("failed to list players")?;
            print_json(&players)
        }
        Commands::Predict {
            season,
            venue,
            team,
            opposition,
            toss_winner,
            toss_choice,
            innings,
        } => {
            let request = PredictionRequest {
                season,
                venue,
                team,
                opposition,
                toss_winner,
                toss_choice,
                innings,
            };
            let predictor = Predictor::new(
                &config.artifacts.dir,
                Duration::from_secs(config.serving.snapshot_ttl_secs),
            );
            let prediction = predictor
                .predict(&db, &request)
                .context("prediction failed")?;
            print_json(&prediction)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{text}");
    Ok(())
}

/// Install the fmt subscriber. Logs go to `<logging.dir>/ipl.log` when a
/// directory is configured, otherwise to stderr so stdout stays pure JSON.
fn init_tracing(config: &Config, verbose: bool) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let default_filter = if verbose { "ipl=debug,info" } else { "ipl=info,warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    match &config.logging.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {dir}"))?;
            let log_file = std::fs::File::create(Path::new(dir).join("ipl.log"))
                .context("failed to create log file")?;
            let subscriber = fmt::Subscriber::builder()
                .with_env_filter(filter)
                .with_writer(log_file)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("failed to set tracing subscriber")?;
        }
        None => {
            let subscriber = fmt::Subscriber::builder()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("failed to set tracing subscriber")?;
        }
    }

    Ok(())
}
