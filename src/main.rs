use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use autosync::config::{LogFormat, LogLevel, LoggingConfig, Overrides};
use autosync::{Config, Daemon};

#[derive(Parser)]
#[command(name = "autosync")]
#[command(about = "Watch a directory and sync its git repository on every change")]
#[command(version)]
struct Cli {
    /// Path to watch
    #[arg(long)]
    path: Option<String>,

    /// Device name used in commit messages
    #[arg(long)]
    device: Option<String>,

    /// Log level
    #[arg(long, value_enum)]
    level: Option<LogLevel>,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config)?;
    config.apply_overrides(Overrides {
        path: cli.path,
        device: cli.device,
        level: cli.level,
    });
    config.expand_paths()?;

    init_logging(&config.logging)?;
    info!("Starting autosync v{}", env!("CARGO_PKG_VERSION"));

    let mut daemon = Daemon::new(config)?;
    daemon.run().await
}

/// Initialize logging from the configured level and format; RUST_LOG takes precedence
fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_filter()));

    let layer = match logging.format {
        LogFormat::Full => fmt::layer().with_ansi(logging.color).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_ansi(logging.color).boxed(),
        LogFormat::Json => fmt::layer().json().boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()?;

    Ok(())
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<std::path::PathBuf>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(&path),
        None => Config::load_or_default(),
    }
}
