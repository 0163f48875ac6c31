use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "idleglow",
    author,
    version,
    about = "Headless soak runner for the ambient idle-mode engine"
)]
pub struct Cli {
    /// Surface size in pixels (e.g. `1920x1080`).
    #[arg(long, value_name = "WIDTHxHEIGHT", default_value = "1920x1080")]
    pub size: String,

    /// RNG seed; identical seeds replay identical runs.
    #[arg(long, default_value_t = 7)]
    pub seed: u64,

    /// Simulated run length (e.g. `90s`, `10m`).
    #[arg(
        long,
        value_name = "DURATION",
        default_value = "120s",
        value_parser = humantime::parse_duration
    )]
    pub run_for: Duration,

    /// Simulated tick interval.
    #[arg(
        long,
        value_name = "DURATION",
        default_value = "250ms",
        value_parser = humantime::parse_duration
    )]
    pub step: Duration,

    /// TOML configuration overriding the built-in ambience defaults.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Resize the surface once, this long into the run.
    #[arg(
        long,
        value_name = "DURATION",
        requires = "resize_to",
        value_parser = humantime::parse_duration
    )]
    pub resize_at: Option<Duration>,

    /// Size the mid-run resize switches to.
    #[arg(long, value_name = "WIDTHxHEIGHT", requires = "resize_at")]
    pub resize_to: Option<String>,

    /// Attach the informational overlay element.
    #[arg(long)]
    pub overlay: bool,

    /// Print the final stats summary as JSON on stdout.
    #[arg(long)]
    pub stats_json: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}
