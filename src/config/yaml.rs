//! YAML configuration file structure.
//!
//! All fields are optional so a file can override any subset of the
//! defaults. Values present in the file win over environment variables.
//!
//! # Example YAML structure
//! ```yaml
//! server:
//!   host: "0.0.0.0"
//!   port: 8080
//!
//! auth:
//!   api_key: "shared-secret"
//!
//! pacing:
//!   message_delay_ms: 20
//!   audio_flush_interval_ms: 50
//!   audio_flush_threshold_bytes: 16000
//!   audio_chunk_bytes: 1600
//!   audio_chunk_delay_ms: 10
//!   max_binary_frame_bytes: 64000
//!   transcript_min_interval_ms: 1000
//!
//! filters:
//!   noise_gate_threshold: 50.0
//!   limiter_ceiling: 30000.0
//!   smoothing_alpha: 0.95
//!
//! dtmf:
//!   terminator: "#"
//!   inter_digit_timeout_ms: 5000
//!   max_digits: 32
//! ```

use serde::Deserialize;

use super::ServerConfig;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub auth: Option<AuthYaml>,
    pub pacing: Option<PacingYaml>,
    pub filters: Option<FiltersYaml>,
    pub dtmf: Option<DtmfYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AuthYaml {
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PacingYaml {
    pub message_delay_ms: Option<u64>,
    pub audio_flush_interval_ms: Option<u64>,
    pub audio_flush_threshold_bytes: Option<usize>,
    pub audio_chunk_bytes: Option<usize>,
    pub audio_chunk_delay_ms: Option<u64>,
    pub max_binary_frame_bytes: Option<usize>,
    pub transcript_min_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct FiltersYaml {
    pub noise_gate_threshold: Option<f32>,
    pub limiter_ceiling: Option<f32>,
    pub smoothing_alpha: Option<f32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DtmfYaml {
    pub terminator: Option<char>,
    pub inter_digit_timeout_ms: Option<u64>,
    pub max_digits: Option<usize>,
}

impl YamlConfig {
    /// Overlay file values onto `config`.
    pub fn apply(&self, config: &mut ServerConfig) {
        if let Some(server) = &self.server {
            if let Some(host) = &server.host {
                config.host = host.clone();
            }
            if let Some(port) = server.port {
                config.port = port;
            }
        }
        if let Some(auth) = &self.auth
            && let Some(key) = &auth.api_key
        {
            config.api_key = Some(key.clone());
        }
        if let Some(pacing) = &self.pacing {
            let p = &mut config.pacing;
            if let Some(v) = pacing.message_delay_ms {
                p.message_delay_ms = v;
            }
            if let Some(v) = pacing.audio_flush_interval_ms {
                p.audio_flush_interval_ms = v;
            }
            if let Some(v) = pacing.audio_flush_threshold_bytes {
                p.audio_flush_threshold_bytes = v;
            }
            if let Some(v) = pacing.audio_chunk_bytes {
                p.audio_chunk_bytes = v;
            }
            if let Some(v) = pacing.audio_chunk_delay_ms {
                p.audio_chunk_delay_ms = v;
            }
            if let Some(v) = pacing.max_binary_frame_bytes {
                p.max_binary_frame_bytes = v;
            }
            if let Some(v) = pacing.transcript_min_interval_ms {
                p.transcript_min_interval_ms = v;
            }
        }
        if let Some(filters) = &self.filters {
            if let Some(v) = filters.noise_gate_threshold {
                config.filters.noise_gate_threshold = v;
            }
            if let Some(v) = filters.limiter_ceiling {
                config.filters.limiter_ceiling = v;
            }
            if let Some(v) = filters.smoothing_alpha {
                config.filters.smoothing_alpha = v;
            }
        }
        if let Some(dtmf) = &self.dtmf {
            if let Some(v) = dtmf.terminator {
                config.dtmf.terminator = v;
            }
            if let Some(v) = dtmf.inter_digit_timeout_ms {
                config.dtmf.inter_digit_timeout_ms = v;
            }
            if let Some(v) = dtmf.max_digits {
                config.dtmf.max_digits = v;
            }
        }
    }
}
