use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use gridcache::{CacheValue, GridCache, SettingsFile, Timeout};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "gridcache-cli")]
#[command(about = "gridcache CLI - inspect and edit a data grid cache", long_about = None)]
struct Args {
    /// Settings file (YAML, or JSON by extension)
    #[arg(short = 'c', long, default_value = "gridcache.yaml")]
    config: PathBuf,

    /// Cache name in the settings file
    #[arg(long, default_value = "default")]
    cache: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read a key
    Get {
        key: String,
        #[arg(long)]
        version: Option<i64>,
    },
    /// Write a key (value parsed as JSON, else taken as a string)
    Set {
        key: String,
        value: String,
        /// Expiry in seconds (default: the cache's TIMEOUT)
        #[arg(long, conflicts_with = "no_expiry")]
        ttl: Option<u64>,
        #[arg(long)]
        no_expiry: bool,
        #[arg(long)]
        version: Option<i64>,
    },
    /// Write a key only if it is absent
    Add {
        key: String,
        value: String,
        #[arg(long)]
        version: Option<i64>,
    },
    /// Remove a key
    Delete {
        key: String,
        #[arg(long)]
        version: Option<i64>,
    },
    /// Read several keys
    Mget {
        #[arg(required = true)]
        keys: Vec<String>,
        #[arg(long)]
        version: Option<i64>,
    },
    /// Write several key=value pairs
    Mset {
        #[arg(required = true)]
        pairs: Vec<String>,
        #[arg(long, conflicts_with = "no_expiry")]
        ttl: Option<u64>,
        #[arg(long)]
        no_expiry: bool,
        #[arg(long)]
        version: Option<i64>,
    },
    /// Remove several keys
    Mdel {
        #[arg(required = true)]
        keys: Vec<String>,
        #[arg(long)]
        version: Option<i64>,
    },
    /// Atomically add to an integer
    Incr {
        key: String,
        #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
        by: i64,
        #[arg(long)]
        version: Option<i64>,
    },
    /// Move a key to another version
    IncrVersion {
        key: String,
        #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
        by: i64,
        #[arg(long)]
        version: Option<i64>,
    },
    /// Remove every entry, or only one version
    Clear {
        #[arg(long)]
        version: Option<i64>,
    },
}

/// JSON if it parses, otherwise the raw string
fn parse_value(raw: &str) -> CacheValue {
    serde_json::from_str(raw).unwrap_or_else(|_| CacheValue::from(raw))
}

fn parse_pair(pair: &str) -> Result<(String, CacheValue)> {
    let (key, value) = pair
        .split_once('=')
        .with_context(|| format!("expected key=value, got '{}'", pair))?;
    Ok((key.to_string(), parse_value(value)))
}

fn timeout_arg(ttl: Option<u64>, no_expiry: bool) -> Timeout {
    match (ttl, no_expiry) {
        (_, true) => Timeout::Never,
        (Some(secs), false) => Timeout::Seconds(secs),
        (None, false) => Timeout::Default,
    }
}

fn format_value(value: &CacheValue) -> String {
    match value {
        CacheValue::Int(n) => format!("(integer) {}", n),
        CacheValue::Str(s) => format!("\"{}\"", s),
        CacheValue::Null => "(null)".dimmed().to_string(),
        other => other.to_string(),
    }
}

fn nil() -> String {
    "(nil)".dimmed().to_string()
}

/// Key with an optional explicit version
fn key_arg(key: &str, version: Option<i64>) -> gridcache::KeyInput {
    match version {
        Some(version) => (key, version).into(),
        None => key.into(),
    }
}

async fn execute(cache: &GridCache, command: Command) -> Result<String> {
    let output = match command {
        Command::Get { key, version } => match cache.get(key_arg(&key, version)).await? {
            Some(value) => format_value(&value),
            None => nil(),
        },
        Command::Set {
            key,
            value,
            ttl,
            no_expiry,
            version,
        } => {
            cache
                .set(
                    key_arg(&key, version),
                    parse_value(&value),
                    timeout_arg(ttl, no_expiry),
                )
                .await?;
            "OK".green().to_string()
        }
        Command::Add {
            key,
            value,
            version,
        } => {
            let stored = cache.add(key_arg(&key, version), parse_value(&value)).await?;
            format!("(integer) {}", u8::from(stored))
        }
        Command::Delete { key, version } => {
            let removed = cache.delete(key_arg(&key, version)).await?;
            format!("(integer) {}", u8::from(removed))
        }
        Command::Mget { keys, version } => {
            let found = cache
                .get_many(keys.iter().map(|k| key_arg(k, version)))
                .await?;
            keys.iter()
                .enumerate()
                .map(|(i, key)| match found.get(key) {
                    Some(value) => format!("{}) {}", i + 1, format_value(value)),
                    None => format!("{}) {}", i + 1, nil()),
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
        Command::Mset {
            pairs,
            ttl,
            no_expiry,
            version,
        } => {
            let entries = pairs
                .iter()
                .map(|pair| parse_pair(pair))
                .collect::<Result<Vec<_>>>()?;
            cache
                .set_many(
                    entries
                        .into_iter()
                        .map(|(key, value)| (key_arg(&key, version), value)),
                    timeout_arg(ttl, no_expiry),
                )
                .await?;
            "OK".green().to_string()
        }
        Command::Mdel { keys, version } => {
            let removed = cache
                .delete_many(keys.iter().map(|k| key_arg(k, version)))
                .await?;
            format!("(integer) {}", removed)
        }
        Command::Incr { key, by, version } => {
            let value = cache.incr(key_arg(&key, version), by).await?;
            format!("(integer) {}", value)
        }
        Command::IncrVersion { key, by, version } => {
            let new_version = cache.incr_version(key_arg(&key, version), by).await?;
            format!("(integer) {}", new_version)
        }
        Command::Clear { version } => {
            let removed = cache.clear(version).await?;
            format!("(integer) {}", removed)
        }
    };
    Ok(output)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for CLI output
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout)
        .with_env_filter(tracing_subscriber::EnvFilter::new(log_level))
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let args = Args::parse();

    let settings = SettingsFile::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let cache_settings = settings.cache(&args.cache)?;
    let cache = GridCache::from_settings(cache_settings)
        .await
        .with_context(|| format!("connecting cache '{}'", args.cache))?;

    let start = Instant::now();
    match execute(&cache, args.command).await {
        Ok(output) => {
            let elapsed = start.elapsed();
            info!("{}\n{}", output, format!("({:.2?})", elapsed).dimmed());
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "{}", format!("Error: {}", e).red());
            std::process::exit(1);
        }
    }
}
