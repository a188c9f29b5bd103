//! Audio transcoding between the telephony wire format and the agent format.
//!
//! The telephony side speaks 8 kHz G.711 µ-law (PCMU, one byte per sample);
//! the agent side expects 16-bit signed linear PCM. [`PcmuTranscoder`]
//! converts between the two in both directions and runs every frame through
//! a short quality chain (noise gate, soft limiter, single-pole smoother).
//!
//! The smoother carries one sample of state per direction across frames so
//! that chunk boundaries do not click. That state lives on the transcoder
//! instance and must never be shared between sessions or directions.
//!
//! # Example
//!
//! ```rust
//! use audioconnector_gateway::audio::{FilterConfig, PcmuTranscoder};
//!
//! let mut transcoder = PcmuTranscoder::new(FilterConfig::default());
//! let linear = transcoder.pcmu_to_linear(&[0xFF, 0x7E, 0x00]);
//! let pcmu = transcoder.linear_to_pcmu(&linear).unwrap();
//! assert_eq!(pcmu.len(), 3);
//! ```

mod codec;
mod filters;

pub use codec::{AudioError, AudioResult, PcmuTranscoder, linear_to_pcmu_sample, pcmu_to_linear_sample};
pub use filters::{FilterConfig, FilterState, noise_gate, smooth_frame, soft_limit};
