//! Command-line interface for lipstream
//!
//! Provides argument parsing using clap derive macros.

use crate::config::{Config, OutputAction, PlayerBackend, StrategyKind};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Streaming lip-to-speech synthesis over MQTT
#[derive(Parser, Debug)]
#[command(
    name = "lipstream",
    version,
    about = "Streaming lip-to-speech synthesis over MQTT"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// MQTT broker host (overrides config)
    #[arg(long, global = true, value_name = "HOST")]
    pub host: Option<String>,

    /// MQTT broker port (overrides config)
    #[arg(long, global = true, value_name = "PORT")]
    pub port: Option<u16>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Subscribe to frames, synthesize audio per window and persist or forward it
    Synthesize {
        /// Synthesis strategy (incremental, direct)
        #[arg(long, value_name = "STRATEGY")]
        strategy: Option<StrategyKind>,

        /// What to do with each output (persist, forward)
        #[arg(long, value_name = "ACTION")]
        action: Option<OutputAction>,

        /// Directory for persisted WAV files
        #[arg(long, value_name = "DIR")]
        results_root: Option<PathBuf>,

        /// Frames per window
        #[arg(long, value_name = "N")]
        context_frames: Option<usize>,

        /// Windows combined into one output (incremental strategy)
        #[arg(long, value_name = "K")]
        batches: Option<usize>,
    },

    /// Subscribe to audio clips and play them in arrival order
    Play {
        /// Play through the default output device instead of an external command
        #[arg(long)]
        device_output: bool,

        /// Leave staged clips on disk after playback
        #[arg(long)]
        keep_files: bool,
    },

    /// Publish pre-cut face frames from disk to the frames topic
    Replay {
        /// A cut directory or a directory of cut_<n> directories
        source: PathBuf,

        /// Minimum time between frames (e.g., 33ms, 1s)
        #[arg(long, short = 'i', value_name = "DURATION", value_parser = parse_interval)]
        interval: Option<Duration>,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}

/// Parse a pacing interval.
///
/// Bare numbers are milliseconds; anything else goes through `humantime`.
fn parse_interval(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(ms) = s.parse::<u64>() {
        return Ok(Duration::from_millis(ms));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

impl Cli {
    /// Apply command-line overrides on top of file and environment settings.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.broker.host = host.clone();
        }
        if let Some(port) = self.port {
            config.broker.port = port;
        }

        match &self.command {
            Commands::Synthesize {
                strategy,
                action,
                results_root,
                context_frames,
                batches,
            } => {
                if let Some(strategy) = strategy {
                    config.synthesis.strategy = *strategy;
                }
                if let Some(action) = action {
                    config.output.action = *action;
                }
                if let Some(root) = results_root {
                    config.output.results_root = root.clone();
                }
                if let Some(n) = context_frames {
                    config.synthesis.context_frames = *n;
                }
                if let Some(k) = batches {
                    config.synthesis.batches_per_output = *k;
                }
            }
            Commands::Play {
                device_output,
                keep_files,
            } => {
                if *device_output {
                    config.player.backend = PlayerBackend::Cpal;
                }
                if *keep_files {
                    config.player.keep_files = true;
                }
            }
            _ => {}
        }
    }

    /// Log filter directive derived from `-q`/`-v`.
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_synthesize_defaults() {
        let cli = Cli::try_parse_from(["lipstream", "synthesize"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Synthesize {
                strategy: None,
                action: None,
                ..
            }
        ));
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["lipstream"]).is_err());
    }

    #[test]
    fn test_parse_verbose_double() {
        let cli = Cli::try_parse_from(["lipstream", "play", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.log_level(), "trace");
    }

    #[test]
    fn test_quiet_wins_over_verbose() {
        let cli = Cli::try_parse_from(["lipstream", "-q", "-v", "play"]).unwrap();
        assert_eq!(cli.log_level(), "warn");
    }

    #[test]
    fn test_synthesize_overrides_config() {
        let cli = Cli::try_parse_from([
            "lipstream",
            "synthesize",
            "--strategy",
            "direct",
            "--action",
            "persist",
            "--results-root",
            "/tmp/out",
            "--context-frames",
            "30",
            "--batches",
            "3",
            "--host",
            "broker.local",
        ])
        .unwrap();

        let mut config = Config::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.synthesis.strategy, StrategyKind::Direct);
        assert_eq!(config.output.action, OutputAction::Persist);
        assert_eq!(config.output.results_root, PathBuf::from("/tmp/out"));
        assert_eq!(config.synthesis.context_frames, 30);
        assert_eq!(config.synthesis.batches_per_output, 3);
        assert_eq!(config.broker.host, "broker.local");
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        assert!(Cli::try_parse_from(["lipstream", "synthesize", "--strategy", "fast"]).is_err());
    }

    #[test]
    fn test_play_flags() {
        let cli =
            Cli::try_parse_from(["lipstream", "play", "--device-output", "--keep-files"]).unwrap();
        let mut config = Config::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.player.backend, PlayerBackend::Cpal);
        assert!(config.player.keep_files);
    }

    #[test]
    fn test_replay_interval_parsing() {
        let cli =
            Cli::try_parse_from(["lipstream", "replay", "faces/", "--interval", "40ms"]).unwrap();
        match cli.command {
            Commands::Replay { source, interval } => {
                assert_eq!(source, PathBuf::from("faces/"));
                assert_eq!(interval, Some(Duration::from_millis(40)));
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let cli = Cli::try_parse_from(["lipstream", "replay", "faces/", "-i", "250"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Replay {
                interval: Some(d),
                ..
            } if d == Duration::from_millis(250)
        ));
    }

    #[test]
    fn test_invalid_interval_rejected() {
        assert!(Cli::try_parse_from(["lipstream", "replay", "faces/", "-i", "soon"]).is_err());
    }

    #[test]
    fn test_config_subcommands() {
        let cli = Cli::try_parse_from(["lipstream", "config", "show"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Show
            }
        ));
        let cli = Cli::try_parse_from(["lipstream", "config", "path"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Path
            }
        ));
    }

    #[test]
    fn test_completions() {
        let cli = Cli::try_parse_from(["lipstream", "completions", "bash"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Completions { shell: Shell::Bash }
        ));
    }
}
