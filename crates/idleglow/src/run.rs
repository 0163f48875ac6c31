use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use ambience::{AmbienceConfig, AmbientMode, Stats};
use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run(cli: Cli) -> Result<()> {
    let (width, height) = parse_surface_size(&cli.size)?;
    let config = load_config(cli.config.as_deref())?;
    let resize = match (cli.resize_at, cli.resize_to.as_deref()) {
        (Some(at), Some(spec)) => Some((at, parse_surface_size(spec)?)),
        _ => None,
    };
    if cli.step.is_zero() {
        anyhow::bail!("--step must be greater than zero");
    }

    let mut mode =
        AmbientMode::new(config, width, height, cli.seed).context("invalid ambience configuration")?;
    let start = Instant::now();
    mode.activate(cli.overlay, start);
    tracing::info!(
        width,
        height,
        seed = cli.seed,
        run_for = %humantime::format_duration(cli.run_for),
        "ambient mode activated"
    );

    let mut elapsed = Duration::ZERO;
    let mut resized = false;
    while elapsed < cli.run_for {
        elapsed += cli.step;
        let now = start + elapsed;
        if let Some((at, (w, h))) = resize {
            if !resized && elapsed >= at {
                tracing::info!(width = w, height = h, "resizing surface mid-run");
                mode.resize(w, h, now);
                resized = true;
            }
        }
        mode.tick(now);
    }

    let stats = mode.stats();
    mode.deactivate(false);
    tracing::info!(
        layers_retired = stats.layers_retired,
        particles_replaced = stats.particles_replaced,
        "ambient mode deactivated"
    );
    report(&stats, cli.stats_json)?;
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<AmbienceConfig> {
    let Some(path) = path else {
        return Ok(AmbienceConfig::default());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration file {}", path.display()))?;
    AmbienceConfig::from_toml_str(&raw)
        .with_context(|| format!("invalid configuration in {}", path.display()))
}

fn report(stats: &Stats, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(stats)?);
        return Ok(());
    }
    println!("Ambient run summary:");
    println!("  layers spawned:     {}", stats.layers_spawned);
    println!("  layers retired:     {}", stats.layers_retired);
    println!("  particles spawned:  {}", stats.particles_spawned);
    println!("  particles replaced: {}", stats.particles_replaced);
    println!("  field sessions:     {}", stats.field_sessions);
    println!("  live layers:        {}", stats.live_layers);
    println!("  live particles:     {}", stats.live_particles);
    println!("  active timelines:   {}", stats.active_timelines);
    Ok(())
}

pub fn parse_surface_size(spec: &str) -> Result<(u32, u32)> {
    let trimmed = spec.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| anyhow::anyhow!("expected WxH format, e.g. 1920x1080"))?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid width in size specification"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid height in size specification"))?;

    if width == 0 || height == 0 {
        anyhow::bail!("surface dimensions must be greater than zero");
    }

    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_size_formats() {
        assert_eq!(parse_surface_size("1920x1080").unwrap(), (1920, 1080));
        assert_eq!(parse_surface_size(" 640 X 480 ").unwrap(), (640, 480));
        assert_eq!(parse_surface_size("800×600").unwrap(), (800, 600));
    }

    #[test]
    fn rejects_malformed_sizes() {
        assert!(parse_surface_size("1920").is_err());
        assert!(parse_surface_size("0x600").is_err());
        assert!(parse_surface_size("widexhigh").is_err());
    }
}
