mod report;
mod track;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use mousetrack_core::{default_data_dir, parse_day, FileLedgerRepository, ReportUseCase, TrackerConfig};

#[derive(Parser)]
#[command(name = "mousetrack")]
#[command(about = "Logs how far the mouse pointer travels, per day and per hour", long_about = None)]
struct Cli {
    /// Directory holding data.json and config.json
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Track pointer movement read from stdin, one "x y" pair per line
    Track(track::TrackArgs),
    /// Show recorded distances (all days by default)
    Report {
        /// Hourly breakdown of one day (today, yesterday, -3d, 2024-01-31)
        #[arg(long, conflicts_with_all = ["week", "top"])]
        day: Option<String>,
        /// The last seven calendar days, ending today
        #[arg(long, conflicts_with = "top")]
        week: bool,
        /// The N days with the most distance (10 if N is omitted)
        #[arg(long, value_name = "N", num_args = 0..=1, default_missing_value = "10")]
        top: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let base_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    let config = TrackerConfig::load_from_dir(&base_dir)?;
    let ledger_dir = config.data_dir.clone().unwrap_or_else(|| base_dir.clone());

    match cli.command {
        Some(Commands::Track(args)) => {
            track::run(ledger_dir, config, args).await?;
        }
        Some(Commands::Report { day, week, top }) => {
            let repo = FileLedgerRepository::new(Some(ledger_dir))?;
            let usecase = ReportUseCase::new(&repo);

            if let Some(day) = day {
                let date = parse_day(&day)?;
                report::show_day(&usecase.day(date)?, config.unit);
            } else if let Some(count) = top {
                let title = format!("Top {} days", count);
                report::show_range(&title, &usecase.top_days(count)?, config.unit);
            } else if week {
                let today = chrono::Local::now().date_naive();
                report::show_range("Last 7 days", &usecase.last_days(today, 7)?, config.unit);
            } else {
                report::show_range("All time", &usecase.all_time()?, config.unit);
            }
        }
        None => {
            // Tracking is what the binary is normally launched for.
            track::run(ledger_dir, config, track::TrackArgs::default())
                .await
                .context("tracker exited with an error")?;
        }
    }
    Ok(())
}
