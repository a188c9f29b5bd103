//! G.711 µ-law codec with per-direction smoothing state.
//!
//! Conversion follows the standard µ-law companding law (bias 0x84, eight
//! segments, sign-magnitude, one's-complement codewords). Both directions
//! go through precomputed lookup tables built once on first use: 256
//! entries for decode and 65536 entries for encode. Per-frame computation
//! of the companding math is the dominant cost otherwise.

use bytes::Bytes;
use once_cell::sync::Lazy;
use thiserror::Error;

use super::filters::{FilterConfig, FilterState, noise_gate, smooth_frame, soft_limit};

/// µ-law companding bias.
const BIAS: i32 = 0x84;

/// Clip level applied before encoding.
const CLIP: i32 = 32635;

/// Errors produced by the codec.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AudioError {
    /// A 16-bit linear buffer arrived with an odd byte count. The codec
    /// never silently drops a trailing byte.
    #[error("invalid linear frame: odd byte length {0}")]
    InvalidFrame(usize),
}

/// Result type for codec operations.
pub type AudioResult<T> = Result<T, AudioError>;

/// µ-law codeword to 16-bit linear sample, 256 entries.
static PCMU_DECODE: Lazy<[i16; 256]> = Lazy::new(|| {
    let mut table = [0i16; 256];
    for (codeword, entry) in table.iter_mut().enumerate() {
        *entry = decode_sample(codeword as u8);
    }
    table
});

/// 16-bit linear sample (as u16 bit pattern) to µ-law codeword.
static PCMU_ENCODE: Lazy<Box<[u8; 65536]>> = Lazy::new(|| {
    let mut table = Box::new([0u8; 65536]);
    for (bits, entry) in table.iter_mut().enumerate() {
        *entry = encode_sample(bits as u16 as i16);
    }
    table
});

/// Expand one µ-law codeword to a linear sample.
fn decode_sample(codeword: u8) -> i16 {
    let inverted = !codeword;
    let sign = inverted & 0x80;
    let exponent = (inverted >> 4) & 0x07;
    let mantissa = inverted & 0x0F;

    let magnitude = ((((mantissa as i32) << 3) + BIAS) << exponent) - BIAS;
    if sign != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Compress one linear sample to a µ-law codeword.
fn encode_sample(sample: i16) -> u8 {
    let mut value = sample as i32;
    let sign: u8 = if value < 0 {
        value = -value;
        0x80
    } else {
        0
    };
    if value > CLIP {
        value = CLIP;
    }
    value += BIAS;

    let mut exponent: u8 = 7;
    let mut mask = 0x4000;
    while exponent > 0 && value & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = ((value >> (exponent + 3)) & 0x0F) as u8;

    !(sign | (exponent << 4) | mantissa)
}

/// Decode one µ-law byte via the lookup table.
#[inline]
pub fn pcmu_to_linear_sample(codeword: u8) -> i16 {
    PCMU_DECODE[codeword as usize]
}

/// Encode one linear sample via the lookup table.
#[inline]
pub fn linear_to_pcmu_sample(sample: i16) -> u8 {
    PCMU_ENCODE[sample as u16 as usize]
}

/// Bidirectional PCMU/PCM16 transcoder for one session.
///
/// Each direction owns its own [`FilterState`] so that the smoother's
/// carried sample survives across frames of that direction without ever
/// leaking into the other. State lifetime equals the session lifetime.
#[derive(Debug)]
pub struct PcmuTranscoder {
    config: FilterConfig,
    /// Peer -> agent smoothing state.
    inbound: FilterState,
    /// Agent -> peer smoothing state.
    outbound: FilterState,
}

impl PcmuTranscoder {
    /// Create a transcoder with fresh filter state in both directions.
    pub fn new(config: FilterConfig) -> Self {
        Self {
            config,
            inbound: FilterState::default(),
            outbound: FilterState::default(),
        }
    }

    /// Decode a µ-law frame into filtered 16-bit little-endian PCM.
    ///
    /// Accepts any frame length, including empty. Uses the inbound
    /// (peer -> agent) smoothing state.
    pub fn pcmu_to_linear(&mut self, frame: &[u8]) -> Bytes {
        let mut samples: Vec<f32> = frame
            .iter()
            .map(|&codeword| pcmu_to_linear_sample(codeword) as f32)
            .collect();
        self.filter(&mut samples, Direction::Inbound);

        let mut out = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            out.extend_from_slice(&quantize(sample).to_le_bytes());
        }
        Bytes::from(out)
    }

    /// Encode a 16-bit little-endian PCM frame into filtered µ-law bytes.
    ///
    /// Uses the outbound (agent -> peer) smoothing state. Fails with
    /// [`AudioError::InvalidFrame`] on an odd byte count.
    pub fn linear_to_pcmu(&mut self, frame: &[u8]) -> AudioResult<Bytes> {
        if frame.len() % 2 != 0 {
            return Err(AudioError::InvalidFrame(frame.len()));
        }

        let mut samples: Vec<f32> = frame
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32)
            .collect();
        self.filter(&mut samples, Direction::Outbound);

        let out: Vec<u8> = samples
            .into_iter()
            .map(|sample| linear_to_pcmu_sample(quantize(sample)))
            .collect();
        Ok(Bytes::from(out))
    }

    /// Run the three-stage filter chain over a frame in place.
    fn filter(&mut self, samples: &mut [f32], direction: Direction) {
        for sample in samples.iter_mut() {
            let gated = noise_gate(*sample, self.config.noise_gate_threshold);
            *sample = soft_limit(gated, self.config.limiter_ceiling);
        }
        let state = match direction {
            Direction::Inbound => &mut self.inbound,
            Direction::Outbound => &mut self.outbound,
        };
        smooth_frame(samples, self.config.smoothing_alpha, state);
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Inbound,
    Outbound,
}

/// Round to nearest and clamp to the 16-bit signed range.
#[inline]
fn quantize(sample: f32) -> i16 {
    sample.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
