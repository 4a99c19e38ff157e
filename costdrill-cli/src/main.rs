//! costdrill CLI - drill into daily cloud cost data from the command line

#![deny(warnings)]

// Global invariants enforced:
// - Deterministic output ordering
// - Identical input yields byte-for-byte identical output

use anyhow::Context;
use clap::{Parser, Subcommand};
use costdrill_core::config::{self, CostdrillConfig, ResolvedConfig};
use costdrill_core::report::{self, ChartReport};
use costdrill_core::{CurrencyMode, Dimension, FacetKey};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "costdrill")]
#[command(about = "Hierarchical cost drill-down over daily cloud cost records")]
#[command(version = env!("COSTDRILL_VERSION"))]
struct Cli {
    /// Log engine decisions to stderr (overrides RUST_LOG)
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank cost series for a selection
    Series {
        /// Cost records (.json array, or .jsonl/.ndjson)
        records: PathBuf,

        /// Dimension to stack the chart by (overrides config file)
        #[arg(long)]
        stack_by: Option<DimensionArg>,

        /// Number of ranked series before "Other" (overrides config file)
        #[arg(long)]
        top: Option<usize>,

        /// Cost column to report (overrides config file)
        #[arg(long)]
        currency: Option<CurrencyArg>,

        /// Toggle a facet, e.g. "Sub-A > Storage" (repeatable, applied in order)
        #[arg(long = "select", value_name = "PATH", value_parser = parse_facet)]
        select: Vec<FacetKey>,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        /// Path to config file (default: auto-discover next to the records)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List the facet values of one dimension
    Facets {
        /// Cost records (.json array, or .jsonl/.ndjson)
        records: PathBuf,

        /// Dimension to list
        #[arg(long, default_value = "subscription")]
        dimension: DimensionArg,

        /// Cost column to show in text output
        #[arg(long, default_value = "local")]
        currency: CurrencyArg,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
    /// Validate or show configuration
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a config file without loading cost data
    Validate {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show the resolved configuration (merged defaults + config file)
    Show {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum DimensionArg {
    Subscription,
    Category,
    Subcategory,
    Meter,
    Resource,
}

impl From<DimensionArg> for Dimension {
    fn from(arg: DimensionArg) -> Self {
        match arg {
            DimensionArg::Subscription => Dimension::Subscription,
            DimensionArg::Category => Dimension::Category,
            DimensionArg::Subcategory => Dimension::Subcategory,
            DimensionArg::Meter => Dimension::Meter,
            DimensionArg::Resource => Dimension::Resource,
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CurrencyArg {
    Local,
    Usd,
}

impl From<CurrencyArg> for CurrencyMode {
    fn from(arg: CurrencyArg) -> Self {
        match arg {
            CurrencyArg::Local => CurrencyMode::Local,
            CurrencyArg::Usd => CurrencyMode::Usd,
        }
    }
}

fn parse_facet(s: &str) -> Result<FacetKey, String> {
    FacetKey::parse(s).ok_or_else(|| {
        format!(
            "expected 1 to {} non-empty values separated by '>'",
            Dimension::ALL.len()
        )
    })
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Series {
            records,
            stack_by,
            top,
            currency,
            select,
            format,
            config: config_path,
        } => {
            let records = normalize_path(records)?;

            // Load configuration
            let data_dir = records
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            let resolved_config = config::load_and_resolve(&data_dir, config_path.as_deref())
                .context("failed to load configuration")?;

            if let Some(config_path) = &resolved_config.config_path {
                eprintln!("Using config: {}", config_path.display());
            }

            // CLI flags override config file values
            let overrides = CostdrillConfig {
                top,
                stack_by: stack_by.map(Dimension::from),
                currency: currency.map(CurrencyMode::from),
            };
            let settings = resolved_config.with_overrides(&overrides)?.view_settings();
            tracing::debug!(?settings, selections = select.len(), "running series");

            let explorer = costdrill_core::explore(&records, settings, &select)?;
            let chart = ChartReport::from_explorer(&explorer);

            match format {
                OutputFormat::Text => print!("{}", report::render_text(&chart)),
                OutputFormat::Json => println!("{}", report::render_json(&chart)),
            }
        }
        Commands::Facets {
            records,
            dimension,
            currency,
            format,
        } => {
            let records = normalize_path(records)?;
            let store = costdrill_core::load_store(&records)
                .with_context(|| format!("failed to load cost data from {}", records.display()))?;
            let entries = report::facet_listing(&store, dimension.into());

            match format {
                OutputFormat::Text => {
                    print!("{}", report::render_facets_text(&entries, currency.into()))
                }
                OutputFormat::Json => println!("{}", report::render_facets_json(&entries)),
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Validate { path } => {
                let data_dir = std::env::current_dir()?;
                let resolved = config::load_and_resolve(&data_dir, path.as_deref());

                match resolved {
                    Ok(config) => {
                        if let Some(ref p) = config.config_path {
                            println!("Config valid: {}", p.display());
                        } else {
                            println!("No config file found. Using defaults.");
                        }
                    }
                    Err(e) => {
                        eprintln!("Config validation failed: {:#}", e);
                        std::process::exit(1);
                    }
                }
            }
            ConfigAction::Show { path } => {
                let data_dir = std::env::current_dir()?;
                let resolved = config::load_and_resolve(&data_dir, path.as_deref())
                    .context("failed to load configuration")?;
                print_config(&resolved);
            }
        },
    }

    Ok(())
}

fn print_config(resolved: &ResolvedConfig) {
    println!("Configuration:");
    if let Some(ref p) = resolved.config_path {
        println!("  Source: {}", p.display());
    } else {
        println!("  Source: defaults (no config file found)");
    }
    println!();
    println!("Chart:");
    println!("  stack_by: {}", resolved.stack_by);
    println!("  top: {}", resolved.top_n);
    println!("  currency: {}", resolved.currency);
}

/// Resolve a relative path against the working directory and check it exists
fn normalize_path(path: PathBuf) -> anyhow::Result<PathBuf> {
    let normalized = if path.is_relative() {
        std::env::current_dir()?.join(&path)
    } else {
        path
    };

    if !normalized.exists() {
        anyhow::bail!("Path does not exist: {}", normalized.display());
    }

    Ok(normalized)
}
