//! Configuration for the AudioConnector gateway.
//!
//! Configuration is assembled from three layers, highest priority first:
//! YAML file values, environment variables, then built-in defaults. The
//! pacing and audio constants are empirically tuned defaults, not
//! protocol-mandated values; deployments interoperating with a specific
//! peer should override them here rather than in code.
//!
//! # Example
//! ```rust,no_run
//! use audioconnector_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::from_env()?;
//! println!("listening on {}", config.address());
//!
//! let config = ServerConfig::from_file(&PathBuf::from("config.yaml"))?;
//! # Ok(())
//! # }
//! ```

mod yaml;

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::audio::FilterConfig;
use crate::pacer::AudioPacing;
use yaml::YamlConfig;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The YAML file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The YAML file could not be parsed.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A value failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Pacing configuration for the outbound channel.
#[derive(Debug, Clone, Copy)]
pub struct PacingConfig {
    /// Delay between paced control messages, in milliseconds.
    pub message_delay_ms: u64,

    /// Audio flush interval, in milliseconds.
    pub audio_flush_interval_ms: u64,

    /// Accumulated audio size that forces a flush, in bytes.
    pub audio_flush_threshold_bytes: usize,

    /// Wire frame size flushed audio is re-chunked to, in bytes.
    pub audio_chunk_bytes: usize,

    /// Delay between wire frames of one flushed unit, in milliseconds.
    pub audio_chunk_delay_ms: u64,

    /// Hard cap on a single binary frame, in bytes.
    pub max_binary_frame_bytes: usize,

    /// Minimum interval between non-final transcripts, in milliseconds.
    pub transcript_min_interval_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            message_delay_ms: 20,
            audio_flush_interval_ms: 50,
            audio_flush_threshold_bytes: 16_000,
            audio_chunk_bytes: 1_600,
            audio_chunk_delay_ms: 10,
            max_binary_frame_bytes: 64_000,
            transcript_min_interval_ms: 1_000,
        }
    }
}

impl PacingConfig {
    /// Pacing parameters for the audio pacer.
    pub fn audio_pacing(&self) -> AudioPacing {
        AudioPacing {
            flush_interval: Duration::from_millis(self.audio_flush_interval_ms),
            flush_threshold: self.audio_flush_threshold_bytes,
            chunk_size: self.audio_chunk_bytes.min(self.max_binary_frame_bytes),
            chunk_delay: Duration::from_millis(self.audio_chunk_delay_ms),
        }
    }

    /// Delay between paced control messages.
    pub fn message_delay(&self) -> Duration {
        Duration::from_millis(self.message_delay_ms)
    }

    /// Minimum interval between non-final transcripts.
    pub fn transcript_min_interval(&self) -> Duration {
        Duration::from_millis(self.transcript_min_interval_ms)
    }
}

/// DTMF collection policy.
#[derive(Debug, Clone)]
pub struct DtmfConfig {
    /// Digit that completes collection.
    pub terminator: char,

    /// Inter-digit timeout, in milliseconds.
    pub inter_digit_timeout_ms: u64,

    /// Maximum digits before the collector errors out.
    pub max_digits: usize,
}

impl Default for DtmfConfig {
    fn default() -> Self {
        Self {
            terminator: '#',
            inter_digit_timeout_ms: 5_000,
            max_digits: 32,
        }
    }
}

impl DtmfConfig {
    /// Inter-digit timeout.
    pub fn inter_digit_timeout(&self) -> Duration {
        Duration::from_millis(self.inter_digit_timeout_ms)
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,

    /// Bind port.
    pub port: u16,

    /// Shared API key checked on the WebSocket upgrade. Auth is disabled
    /// when unset.
    pub api_key: Option<String>,

    /// Outbound pacing tunables.
    pub pacing: PacingConfig,

    /// Audio filter tunables.
    pub filters: FilterConfig,

    /// DTMF collection policy.
    pub dtmf: DtmfConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            api_key: None,
            pacing: PacingConfig::default(),
            filters: FilterConfig::default(),
            dtmf: DtmfConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables over defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, with environment variables
    /// filling anything the file leaves unset.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let yaml: YamlConfig = serde_yaml::from_str(&raw)?;

        let mut config = Self::default();
        config.apply_env();
        yaml.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// `host:port` bind address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("GATEWAY_HOST") {
            self.host = host;
        }
        if let Ok(port) = std::env::var("GATEWAY_PORT")
            && let Ok(port) = port.parse()
        {
            self.port = port;
        }
        if let Ok(key) = std::env::var("GATEWAY_API_KEY")
            && !key.is_empty()
        {
            self.api_key = Some(key);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".to_string()));
        }
        let alpha = self.filters.smoothing_alpha;
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "smoothing_alpha must be in (0, 1], got {alpha}"
            )));
        }
        if self.pacing.audio_chunk_bytes == 0 {
            return Err(ConfigError::Invalid(
                "audio_chunk_bytes must be positive".to_string(),
            ));
        }
        if self.pacing.audio_chunk_bytes > self.pacing.max_binary_frame_bytes {
            return Err(ConfigError::Invalid(format!(
                "audio_chunk_bytes ({}) exceeds max_binary_frame_bytes ({})",
                self.pacing.audio_chunk_bytes, self.pacing.max_binary_frame_bytes
            )));
        }
        if !self.dtmf.terminator.is_ascii() {
            return Err(ConfigError::Invalid(
                "dtmf terminator must be an ASCII digit, '*' or '#'".to_string(),
            ));
        }
        Ok(())
    }
}
