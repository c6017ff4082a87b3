//! visreg CLI - Main Entry Point
//!
//! Compares every sample image against its reference pattern, excluding the
//! regions covered by the configured masks, and reports the outcome.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

use visreg_core::config::keys;
use visreg_core::{merge, Configuration, ListenerRegistry, SuiteRunner};

mod output;

/// visreg - visual regression runner
#[derive(Parser, Debug)]
#[command(name = "visreg")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file with a [properties] table
    #[arg(short, long, env = "VISREG_CONFIG", default_value = visreg_core::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Directory of sample images
    #[arg(long, env = "VISREG_SAMPLES")]
    samples: Option<PathBuf>,

    /// Directory of reference pattern images
    #[arg(long, env = "VISREG_PATTERNS")]
    patterns: Option<PathBuf>,

    /// Flat directory of mask images
    #[arg(long, env = "VISREG_MASKS")]
    masks: Option<PathBuf>,

    /// Directory diff images are written to
    #[arg(long, env = "VISREG_DIFFS")]
    diffs: Option<PathBuf>,

    /// File the JSON results are written to by the json-report listener
    #[arg(long, env = "VISREG_OUTPUT")]
    output: Option<PathBuf>,

    /// Result listener type name (log, json-report)
    #[arg(long, env = "VISREG_LISTENER")]
    listener: Option<String>,

    /// Allowed percentage of differing pixels
    #[arg(long, env = "VISREG_THRESHOLD")]
    threshold: Option<f64>,

    /// Per-channel tolerance
    #[arg(long, env = "VISREG_TOLERANCE")]
    tolerance: Option<u8>,

    /// Skip masks that cannot be loaded instead of aborting
    #[arg(long)]
    skip_invalid_masks: bool,

    /// Additional property as key=value (repeatable)
    #[arg(short = 'D', long = "property", value_parser = parse_property)]
    properties: Vec<(String, String)>,

    /// Output format
    #[arg(long, default_value = "table")]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

/// Configuration layer made of the command-line flags
fn flag_layer(cli: &Cli) -> Configuration {
    let mut layer: Configuration = cli.properties.iter().cloned().collect();

    let paths = [
        (keys::SAMPLES_DIRECTORY, &cli.samples),
        (keys::PATTERNS_DIRECTORY, &cli.patterns),
        (keys::MASKS_DIRECTORY, &cli.masks),
        (keys::FILE_STORAGE_DIRECTORY, &cli.diffs),
        (keys::RESULT_OUTPUT_FILE, &cli.output),
    ];
    for (key, path) in paths {
        if let Some(path) = path {
            layer.insert(key, path.to_string_lossy());
        }
    }

    if let Some(listener) = &cli.listener {
        layer.insert(keys::SUITE_LISTENER, listener.as_str());
    }
    if let Some(threshold) = cli.threshold {
        layer.insert(keys::DIFF_THRESHOLD, threshold.to_string());
    }
    if let Some(tolerance) = cli.tolerance {
        layer.insert(keys::PIXEL_TOLERANCE, tolerance.to_string());
    }
    if cli.skip_invalid_masks {
        layer.insert(keys::MASK_LOAD_POLICY, "skip-invalid");
    }
    layer
}

/// The frozen global configuration: file properties overridden by flags
fn global_configuration(cli: &Cli) -> anyhow::Result<Configuration> {
    let file = Configuration::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    Ok(merge(&file, &flag_layer(cli)))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let configuration = global_configuration(&cli)?;
    tracing::debug!("Effective configuration: {:?}", configuration);

    let registry = ListenerRegistry::with_builtins();
    let mut runner =
        SuiteRunner::from_config(configuration, &registry).context("failed to prepare suite")?;
    let summary = runner.run()?;

    output::print_summary(&summary, cli.format);
    if !summary.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
