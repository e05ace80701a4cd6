use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Args;
use log::{debug, info};
use mousetrack_core::{
    parse_duration, DisplayConfig, DisplayGeometry, DisplayQuery, DistanceUnit,
    FileLedgerRepository, Sample, TrackerConfig, TrackingService,
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Args, Default)]
pub struct TrackArgs {
    /// Flush interval (e.g. 60, 90s, 5m)
    #[arg(long)]
    interval: Option<String>,
    /// Screen width in pixels
    #[arg(long, requires = "height")]
    width: Option<u32>,
    /// Screen height in pixels
    #[arg(long, requires = "width")]
    height: Option<u32>,
    /// Physical screen diagonal in inches
    #[arg(long, requires = "width", conflicts_with = "dpi")]
    diagonal: Option<f64>,
    /// Dots per inch reported by the desktop
    #[arg(long, requires = "width")]
    dpi: Option<f64>,
    /// Density to use when the display cannot be calibrated
    #[arg(long)]
    fallback_ppi: Option<f64>,
    /// Unit recorded in the ledger: m, cm, in, ft
    #[arg(long)]
    unit: Option<String>,
}

impl TrackArgs {
    fn apply(self, config: &mut TrackerConfig) -> Result<()> {
        if let Some(interval) = self.interval {
            let secs = parse_duration(&interval)?.num_seconds();
            if secs <= 0 {
                return Err(anyhow!("Flush interval must be positive: {}", interval));
            }
            config.flush_interval_secs = secs as u64;
        }

        if let (Some(width_px), Some(height_px)) = (self.width, self.height) {
            config.display = match (self.diagonal, self.dpi) {
                (Some(diagonal_inches), _) => Some(DisplayConfig::Diagonal {
                    width_px,
                    height_px,
                    diagonal_inches,
                }),
                (None, Some(dpi)) => Some(DisplayConfig::Dpi {
                    width_px,
                    height_px,
                    dpi,
                }),
                (None, None) => {
                    return Err(anyhow!("--width/--height need either --diagonal or --dpi"))
                }
            };
        }

        if let Some(ppi) = self.fallback_ppi {
            config.fallback_ppi = Some(ppi);
        }
        if let Some(unit) = self.unit {
            config.unit = unit.parse::<DistanceUnit>()?;
        }
        Ok(())
    }
}

/// Stands in for the display query when no geometry was configured, so the
/// fallback density (if any) is used.
struct UnconfiguredDisplay;

impl DisplayQuery for UnconfiguredDisplay {
    fn geometry(&self) -> Result<DisplayGeometry> {
        Err(anyhow!(
            "display geometry not configured (pass --width/--height with --diagonal or --dpi)"
        ))
    }
}

pub async fn run(ledger_dir: PathBuf, mut config: TrackerConfig, args: TrackArgs) -> Result<()> {
    args.apply(&mut config)?;

    let repo = FileLedgerRepository::new(Some(ledger_dir))?;
    info!("recording to {}", repo.path().display());

    let service = Arc::new(
        TrackingService::new(repo, config.unit)
            .with_max_consecutive_failures(config.max_consecutive_failures),
    );

    let query: Box<dyn DisplayQuery> = match config.display {
        Some(display) => display.to_query(),
        None => Box::new(UnconfiguredDisplay),
    };
    service
        .calibrate(query.as_ref(), config.fallback_ppi)
        .context("Display calibration failed")?;
    service.start(config.flush_interval())?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("failed to read pointer samples")? {
                    Some(line) => match Sample::parse_line(&line) {
                        Some(sample) => {
                            service.observe(sample.x, sample.y);
                        }
                        None => debug!("skipping malformed sample {:?}", line),
                    },
                    None => {
                        info!("pointer source closed");
                        break;
                    }
                }
            }
            _ = &mut ctrl_c => {
                info!("interrupted, shutting down");
                break;
            }
        }
    }

    service.stop().await?;
    Ok(())
}
