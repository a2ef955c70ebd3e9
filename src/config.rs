use crate::defaults;
use crate::error::{LipstreamError, Result};
use crate::transport::{Endpoint, Qos};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub broker: BrokerConfig,
    pub frames: FramesConfig,
    pub audio: AudioConfig,
    pub synthesis: SynthesisConfig,
    pub output: OutputConfig,
    pub player: PlayerConfig,
    pub pipeline: PipelineConfig,
}

/// MQTT broker connection settings shared by every client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub keep_alive_secs: u64,
    pub connect_timeout_secs: u64,
    pub connect_poll_ms: u64,
    pub max_packet_bytes: usize,
}

/// Inbound frame topic (synthesizer subscribes, replay publishes)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FramesConfig {
    pub topic: String,
    pub qos: u8,
    pub subscriber_id: String,
    pub publisher_id: String,
    /// Broker host override for this topic's clients.
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Outbound audio topic (synthesizer publishes, player subscribes)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub topic: String,
    pub qos: u8,
    pub subscriber_id: String,
    pub publisher_id: String,
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Synthesis strategy, fixed for the lifetime of the process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Spectrogram per window, concatenated and inverted every K windows.
    #[serde(alias = "cpu")]
    Incremental,
    /// Complete waveform per window.
    #[serde(alias = "gpu")]
    Direct,
}

impl std::str::FromStr for StrategyKind {
    type Err = LipstreamError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "incremental" | "cpu" => Ok(StrategyKind::Incremental),
            "direct" | "gpu" => Ok(StrategyKind::Direct),
            other => Err(LipstreamError::ConfigInvalidValue {
                key: "synthesis.strategy".to_string(),
                message: format!("unknown strategy '{}' (expected incremental or direct)", other),
            }),
        }
    }
}

/// Synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SynthesisConfig {
    pub model: String,
    pub strategy: StrategyKind,
    /// Frames per window (N).
    pub context_frames: usize,
    pub image_size: u32,
    /// Windows per incremental output unit (K).
    pub batches_per_output: usize,
    /// Leading time steps trimmed from every fragment after the first.
    pub overlap: usize,
    pub bins: usize,
    pub steps_per_window: usize,
    pub hop_size: usize,
    pub sample_rate: u32,
    pub target_peak: f32,
    pub peak_floor: f32,
    /// Run one throwaway inference at startup so the first real window is not
    /// delayed by model initialization.
    pub warm_up: bool,
}

/// What to do with synthesized waveforms
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputAction {
    #[serde(alias = "save")]
    Persist,
    Forward,
}

impl std::str::FromStr for OutputAction {
    type Err = LipstreamError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "persist" | "save" => Ok(OutputAction::Persist),
            "forward" => Ok(OutputAction::Forward),
            other => Err(LipstreamError::ConfigInvalidValue {
                key: "output.action".to_string(),
                message: format!("unknown action '{}' (expected persist or forward)", other),
            }),
        }
    }
}

/// Output dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub action: OutputAction,
    pub results_root: PathBuf,
}

/// Playback backend selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlayerBackend {
    /// cpal when compiled in, otherwise the external command.
    Auto,
    Command,
    Cpal,
}

/// Player configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    pub backend: PlayerBackend,
    /// Program and leading arguments; the clip path is appended.
    pub command: Vec<String>,
    pub device: Option<String>,
    pub staging_dir: Option<PathBuf>,
    /// Leave staged clips on disk after playback.
    pub keep_files: bool,
}

/// Queueing and shutdown behavior
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// Bound the ingest queue; frames arriving while it is full are dropped. Unbounded if unset.
    pub ingest_capacity: Option<usize>,
    /// Pad and synthesize the partial window (and flush pending fragments) on shutdown.
    pub flush_partial_on_shutdown: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: defaults::BROKER_HOST.to_string(),
            port: defaults::BROKER_PORT,
            keep_alive_secs: defaults::KEEP_ALIVE_SECS,
            connect_timeout_secs: defaults::CONNECT_TIMEOUT_SECS,
            connect_poll_ms: defaults::CONNECT_POLL_MS,
            max_packet_bytes: defaults::MAX_PACKET_BYTES,
        }
    }
}

impl Default for FramesConfig {
    fn default() -> Self {
        Self {
            topic: defaults::FRAMES_TOPIC.to_string(),
            qos: defaults::QOS,
            subscriber_id: defaults::FRAMES_SUBSCRIBER_ID.to_string(),
            publisher_id: defaults::FRAMES_PUBLISHER_ID.to_string(),
            host: None,
            port: None,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            topic: defaults::AUDIO_TOPIC.to_string(),
            qos: defaults::QOS,
            subscriber_id: defaults::AUDIO_SUBSCRIBER_ID.to_string(),
            publisher_id: defaults::AUDIO_PUBLISHER_ID.to_string(),
            host: None,
            port: None,
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            model: defaults::DEFAULT_MODEL.to_string(),
            strategy: StrategyKind::Direct,
            context_frames: defaults::CONTEXT_FRAMES,
            image_size: defaults::IMAGE_SIZE,
            batches_per_output: defaults::BATCHES_PER_OUTPUT,
            overlap: defaults::OVERLAP_STEPS,
            bins: defaults::SPECTROGRAM_BINS,
            steps_per_window: defaults::STEPS_PER_WINDOW,
            hop_size: defaults::HOP_SIZE,
            sample_rate: defaults::SAMPLE_RATE,
            target_peak: defaults::TARGET_PEAK,
            peak_floor: defaults::PEAK_FLOOR,
            warm_up: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            action: OutputAction::Forward,
            results_root: PathBuf::from(defaults::RESULTS_ROOT),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            backend: PlayerBackend::Auto,
            command: defaults::PLAYER_COMMAND
                .iter()
                .map(|s| s.to_string())
                .collect(),
            device: None,
            staging_dir: None,
            keep_files: false,
        }
    }
}

impl BrokerConfig {
    fn endpoint(
        &self,
        host: Option<&String>,
        port: Option<u16>,
        client_id: &str,
        topic: &str,
        qos: u8,
    ) -> Result<Endpoint> {
        Ok(Endpoint {
            host: host.cloned().unwrap_or_else(|| self.host.clone()),
            port: port.unwrap_or(self.port),
            client_id: client_id.to_string(),
            topic: topic.to_string(),
            qos: Qos::from_level(qos)?,
            keep_alive: Duration::from_secs(self.keep_alive_secs),
            reconnect_delay: Duration::from_millis(self.connect_poll_ms),
            max_packet_bytes: self.max_packet_bytes,
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn connect_poll(&self) -> Duration {
        Duration::from_millis(self.connect_poll_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LipstreamError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                LipstreamError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(LipstreamError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - LIPSTREAM_BROKER_HOST → broker.host
    /// - LIPSTREAM_BROKER_PORT → broker.port
    /// - LIPSTREAM_STRATEGY → synthesis.strategy
    /// - LIPSTREAM_RESULTS_ROOT → output.results_root
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(host) = std::env::var("LIPSTREAM_BROKER_HOST")
            && !host.is_empty()
        {
            self.broker.host = host;
        }

        if let Ok(port) = std::env::var("LIPSTREAM_BROKER_PORT")
            && !port.is_empty()
        {
            self.broker.port = port
                .parse()
                .map_err(|e| LipstreamError::ConfigInvalidValue {
                    key: "LIPSTREAM_BROKER_PORT".to_string(),
                    message: format!("{}", e),
                })?;
        }

        if let Ok(strategy) = std::env::var("LIPSTREAM_STRATEGY")
            && !strategy.is_empty()
        {
            self.synthesis.strategy = strategy.parse()?;
        }

        if let Ok(root) = std::env::var("LIPSTREAM_RESULTS_ROOT")
            && !root.is_empty()
        {
            self.output.results_root = PathBuf::from(root);
        }

        Ok(self)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        fn invalid(key: &str, message: &str) -> LipstreamError {
            LipstreamError::ConfigInvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            }
        }

        let s = &self.synthesis;
        if s.context_frames == 0 {
            return Err(invalid("synthesis.context_frames", "must be at least 1"));
        }
        if s.batches_per_output == 0 {
            return Err(invalid("synthesis.batches_per_output", "must be at least 1"));
        }
        if s.image_size == 0 {
            return Err(invalid("synthesis.image_size", "must be at least 1"));
        }
        if s.bins == 0 || s.steps_per_window == 0 || s.hop_size == 0 {
            return Err(invalid(
                "synthesis",
                "bins, steps_per_window and hop_size must be at least 1",
            ));
        }
        if s.overlap >= s.steps_per_window {
            return Err(invalid(
                "synthesis.overlap",
                "must be smaller than steps_per_window",
            ));
        }
        if s.sample_rate == 0 {
            return Err(invalid("synthesis.sample_rate", "must be positive"));
        }
        if s.target_peak.is_nan() || s.target_peak <= 0.0 {
            return Err(invalid("synthesis.target_peak", "must be positive"));
        }
        if s.peak_floor.is_nan() || s.peak_floor <= 0.0 {
            return Err(invalid("synthesis.peak_floor", "must be positive"));
        }
        Qos::from_level(self.frames.qos)?;
        Qos::from_level(self.audio.qos)?;
        if self.pipeline.ingest_capacity == Some(0) {
            return Err(invalid("pipeline.ingest_capacity", "must be at least 1"));
        }
        if self.player.backend == PlayerBackend::Command && self.player.command.is_empty() {
            return Err(invalid("player.command", "must name a program"));
        }
        Ok(())
    }

    /// Endpoint the synthesizer subscribes to for frames.
    pub fn frames_subscriber(&self) -> Result<Endpoint> {
        self.broker.endpoint(
            self.frames.host.as_ref(),
            self.frames.port,
            &self.frames.subscriber_id,
            &self.frames.topic,
            self.frames.qos,
        )
    }

    /// Endpoint the replay tool publishes frames to.
    pub fn frames_publisher(&self) -> Result<Endpoint> {
        self.broker.endpoint(
            self.frames.host.as_ref(),
            self.frames.port,
            &self.frames.publisher_id,
            &self.frames.topic,
            self.frames.qos,
        )
    }

    /// Endpoint the synthesizer forwards audio to.
    pub fn audio_publisher(&self) -> Result<Endpoint> {
        self.broker.endpoint(
            self.audio.host.as_ref(),
            self.audio.port,
            &self.audio.publisher_id,
            &self.audio.topic,
            self.audio.qos,
        )
    }

    /// Endpoint the player subscribes to for audio.
    pub fn audio_subscriber(&self) -> Result<Endpoint> {
        self.broker.endpoint(
            self.audio.host.as_ref(),
            self.audio.port,
            &self.audio.subscriber_id,
            &self.audio.topic,
            self.audio.qos,
        )
    }

    /// Staging directory for player clips, defaulting under the system temp dir.
    pub fn staging_dir(&self) -> PathBuf {
        self.player
            .staging_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(defaults::STAGING_DIR_NAME))
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/lipstream/config.toml on Linux
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("lipstream").join("config.toml"))
            .ok_or_else(|| LipstreamError::Other("Could not determine config directory".to_string()))
    }

    /// Render as TOML (for `config show`).
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| LipstreamError::ConfigParse {
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_lipstream_env() {
        remove_env("LIPSTREAM_BROKER_HOST");
        remove_env("LIPSTREAM_BROKER_PORT");
        remove_env("LIPSTREAM_STRATEGY");
        remove_env("LIPSTREAM_RESULTS_ROOT");
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.broker.host, "localhost");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.frames.topic, "jetson/faces");
        assert_eq!(config.frames.subscriber_id, "jetson-face-receiver");
        assert_eq!(config.audio.topic, "jetson/audio");
        assert_eq!(config.audio.publisher_id, "jetson-audio-sender");
        assert_eq!(config.frames.qos, 2);

        assert_eq!(config.synthesis.strategy, StrategyKind::Direct);
        assert_eq!(config.synthesis.context_frames, 90);
        assert_eq!(config.synthesis.batches_per_output, 1);
        assert_eq!(config.synthesis.overlap, 40);

        assert_eq!(config.output.action, OutputAction::Forward);
        assert!(!config.pipeline.flush_partial_on_shutdown);
        assert_eq!(config.pipeline.ingest_capacity, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [broker]
            host = "jetson.local"
            port = 1884

            [frames]
            topic = "cam/faces"
            qos = 1

            [synthesis]
            strategy = "incremental"
            context_frames = 30
            batches_per_output = 3

            [output]
            action = "persist"
            results_root = "/srv/wavs"

            [pipeline]
            ingest_capacity = 512
            flush_partial_on_shutdown = true
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.broker.host, "jetson.local");
        assert_eq!(config.broker.port, 1884);
        assert_eq!(config.frames.topic, "cam/faces");
        assert_eq!(config.frames.qos, 1);
        // Untouched fields in a present table keep their own defaults
        assert_eq!(config.frames.subscriber_id, "jetson-face-receiver");
        assert_eq!(config.synthesis.strategy, StrategyKind::Incremental);
        assert_eq!(config.synthesis.context_frames, 30);
        assert_eq!(config.synthesis.batches_per_output, 3);
        assert_eq!(config.output.action, OutputAction::Persist);
        assert_eq!(config.output.results_root, PathBuf::from("/srv/wavs"));
        assert_eq!(config.pipeline.ingest_capacity, Some(512));
        assert!(config.pipeline.flush_partial_on_shutdown);

        // Missing tables are defaults
        assert_eq!(config.audio, AudioConfig::default());
    }

    #[test]
    fn test_legacy_strategy_and_action_names() {
        let toml_content = r#"
            [synthesis]
            strategy = "cpu"

            [output]
            action = "save"
        "#;
        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.synthesis.strategy, StrategyKind::Incremental);
        assert_eq!(config.output.action, OutputAction::Persist);

        assert_eq!("gpu".parse::<StrategyKind>().unwrap(), StrategyKind::Direct);
        assert!("tpu".parse::<StrategyKind>().is_err());
        assert_eq!("forward".parse::<OutputAction>().unwrap(), OutputAction::Forward);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[broker\nhost = \"broken").unwrap();

        assert!(Config::load(temp_file.path()).is_err());
        assert!(Config::load_or_default(temp_file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let missing_path = Path::new("/tmp/nonexistent_lipstream_config_12345.toml");
        let config = Config::load_or_default(missing_path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_lipstream_env();

        set_env("LIPSTREAM_BROKER_HOST", "10.0.0.2");
        set_env("LIPSTREAM_BROKER_PORT", "2883");
        set_env("LIPSTREAM_STRATEGY", "incremental");
        set_env("LIPSTREAM_RESULTS_ROOT", "/data/out");

        let config = Config::default().with_env_overrides().unwrap();

        assert_eq!(config.broker.host, "10.0.0.2");
        assert_eq!(config.broker.port, 2883);
        assert_eq!(config.synthesis.strategy, StrategyKind::Incremental);
        assert_eq!(config.output.results_root, PathBuf::from("/data/out"));

        clear_lipstream_env();
    }

    #[test]
    fn test_env_override_invalid_port_is_error() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_lipstream_env();

        set_env("LIPSTREAM_BROKER_PORT", "not-a-port");
        let result = Config::default().with_env_overrides();
        assert!(matches!(
            result,
            Err(LipstreamError::ConfigInvalidValue { .. })
        ));

        clear_lipstream_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_lipstream_env();

        set_env("LIPSTREAM_BROKER_HOST", "");
        let config = Config::default().with_env_overrides().unwrap();
        assert_eq!(config.broker.host, "localhost");

        clear_lipstream_env();
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.synthesis.context_frames = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.synthesis.batches_per_output = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.frames.qos = 3;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.synthesis.peak_floor = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.synthesis.overlap = config.synthesis.steps_per_window;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pipeline.ingest_capacity = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_endpoints_use_topic_overrides() {
        let mut config = Config::default();
        config.audio.host = Some("speaker.local".to_string());
        config.audio.port = Some(1999);

        let frames = config.frames_subscriber().unwrap();
        assert_eq!(frames.host, "localhost");
        assert_eq!(frames.port, 1883);
        assert_eq!(frames.client_id, "jetson-face-receiver");
        assert_eq!(frames.qos, Qos::ExactlyOnce);

        let audio = config.audio_publisher().unwrap();
        assert_eq!(audio.host, "speaker.local");
        assert_eq!(audio.port, 1999);
        assert_eq!(audio.topic, "jetson/audio");
        assert_eq!(audio.client_id, "jetson-audio-sender");
    }

    #[test]
    fn test_to_toml_round_trips() {
        let config = Config::default();
        let rendered = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_default_path_is_xdg_compliant() {
        if let Ok(path) = Config::default_path() {
            let path_str = path.to_string_lossy();
            assert!(path_str.contains("lipstream"));
            assert!(path_str.ends_with("config.toml"));
        }
    }
}
