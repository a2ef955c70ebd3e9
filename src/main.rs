use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use lipstream::app::{run_player, run_replay, run_synthesizer};
use lipstream::cli::{Cli, Commands, ConfigAction};
use lipstream::config::Config;
use std::path::{Path, PathBuf};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level());
    tracing::debug!("lipstream {}", lipstream::version_string());

    match &cli.command {
        Commands::Synthesize { .. } => {
            let config = load_config(&cli)?;
            run_synthesizer(config).await?;
        }
        Commands::Play { .. } => {
            let config = load_config(&cli)?;
            run_player(config).await?;
        }
        Commands::Replay { source, interval } => {
            let config = load_config(&cli)?;
            run_replay(config, source.clone(), *interval).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let config = load_config(&cli)?;
                print!("{}", config.to_toml()?);
            }
            ConfigAction::Path => {
                println!("{}", config_path(cli.config.as_deref())?.display());
            }
        },
        Commands::Completions { shell } => {
            clap_complete::generate(
                *shell,
                &mut Cli::command(),
                "lipstream",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise the level comes from `-q`/`-v`.
fn init_tracing(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn config_path(custom_path: Option<&Path>) -> Result<PathBuf> {
    match custom_path {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(Config::default_path()?),
    }
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. CLI flags
/// 2. Environment variables (LIPSTREAM_*)
/// 3. Config file (--config, else ~/.config/lipstream/config.toml)
/// 4. Built-in defaults
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match cli.config.as_deref() {
        // An explicit path must exist
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load_or_default(&Config::default_path()?)?,
    }
    .with_env_overrides()?;

    cli.apply_overrides(&mut config);
    Ok(config)
}
