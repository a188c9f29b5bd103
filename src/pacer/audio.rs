//! Buffer-and-flush pacer for outbound audio.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::SinkFn;

/// Tunables for the audio flush/chunk cycle.
#[derive(Debug, Clone, Copy)]
pub struct AudioPacing {
    /// Wall-clock interval between flushes of accumulated audio.
    pub flush_interval: Duration,

    /// Accumulated size that triggers an early flush.
    pub flush_threshold: usize,

    /// Wire frame size each flushed unit is re-chunked to.
    pub chunk_size: usize,

    /// Delay between wire frames of one flushed unit.
    pub chunk_delay: Duration,
}

impl Default for AudioPacing {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_millis(50),
            // 2 seconds of 8 kHz µ-law.
            flush_threshold: 16_000,
            // 200 ms of 8 kHz µ-law.
            chunk_size: 1_600,
            chunk_delay: Duration::from_millis(10),
        }
    }
}

/// Accumulates audio and flushes it to the sink in paced wire frames.
///
/// One background task owns the flush cycle, so there is never more than
/// one in-flight write. `enqueue` only appends to the buffer; crossing the
/// size threshold nudges the task instead of flushing inline.
pub struct AudioPacer {
    inner: Arc<Inner>,
}

struct Inner {
    buffer: Mutex<BytesMut>,
    notify: Notify,
    pacing: AudioPacing,
    sink: SinkFn<Bytes>,
    cancel: CancellationToken,
}

impl AudioPacer {
    /// Create the pacer and spawn its flush task.
    pub fn new(pacing: AudioPacing, cancel: CancellationToken, sink: SinkFn<Bytes>) -> Self {
        let inner = Arc::new(Inner {
            buffer: Mutex::new(BytesMut::new()),
            notify: Notify::new(),
            pacing,
            sink,
            cancel,
        });
        tokio::spawn(Inner::run(inner.clone()));
        Self { inner }
    }

    /// Append audio to the accumulation buffer.
    pub fn enqueue(&self, audio: Bytes) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        let over_threshold = {
            let mut buffer = self.inner.buffer.lock();
            buffer.extend_from_slice(&audio);
            buffer.len() >= self.inner.pacing.flush_threshold
        };
        if over_threshold {
            self.inner.notify.notify_one();
        }
    }

    /// Discard audio not yet flushed. Used when playback is interrupted.
    pub fn clear(&self) -> usize {
        let mut buffer = self.inner.buffer.lock();
        let dropped = buffer.len();
        buffer.clear();
        dropped
    }

    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.inner.buffer.lock().len()
    }
}

impl Inner {
    async fn run(inner: Arc<Self>) {
        let mut tick = tokio::time::interval(inner.pacing.flush_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = inner.cancel.cancelled() => return,
                _ = tick.tick() => {}
                _ = inner.notify.notified() => {}
            }

            let pending = {
                let mut buffer = inner.buffer.lock();
                if buffer.is_empty() {
                    continue;
                }
                buffer.split().freeze()
            };

            if !Self::flush(&inner, pending).await {
                return;
            }
        }
    }

    /// Send one flushed unit re-chunked to the wire frame size.
    /// Returns false when the sink is gone.
    async fn flush(inner: &Arc<Self>, pending: Bytes) -> bool {
        let chunk_size = inner.pacing.chunk_size.max(1);
        let mut offset = 0;
        while offset < pending.len() {
            let end = (offset + chunk_size).min(pending.len());
            if (inner.sink)(pending.slice(offset..end)).await.is_err() {
                let dropped = pending.len() - end + inner.buffer.lock().len();
                inner.buffer.lock().clear();
                trace!(dropped, "audio pacer sink closed");
                return false;
            }
            offset = end;

            if offset < pending.len() {
                tokio::select! {
                    _ = inner.cancel.cancelled() => return false,
                    _ = tokio::time::sleep(inner.pacing.chunk_delay) => {}
                }
            }
        }
        true
    }
}

impl Clone for AudioPacer {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pacer::channel_sink;
    use tokio::sync::mpsc;

    fn fast_pacing() -> AudioPacing {
        AudioPacing {
            flush_interval: Duration::from_millis(5),
            flush_threshold: 1_000,
            chunk_size: 4,
            chunk_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_flush_rechunks_to_wire_frames() {
        let (tx, mut rx) = mpsc::channel(16);
        let pacer = AudioPacer::new(fast_pacing(), CancellationToken::new(), channel_sink(tx));

        pacer.enqueue(Bytes::from_static(&[1u8; 10]));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        let third = rx.recv().await.unwrap();
        assert_eq!(first.len(), 4);
        assert_eq!(second.len(), 4);
        assert_eq!(third.len(), 2);
    }

    #[tokio::test]
    async fn test_threshold_triggers_early_flush() {
        let pacing = AudioPacing {
            flush_interval: Duration::from_secs(3600),
            flush_threshold: 8,
            chunk_size: 8,
            chunk_delay: Duration::from_millis(1),
        };
        let (tx, mut rx) = mpsc::channel(16);
        let pacer = AudioPacer::new(pacing, CancellationToken::new(), channel_sink(tx));

        pacer.enqueue(Bytes::from_static(&[7u8; 8]));
        let flushed = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("threshold flush should not wait for the interval")
            .unwrap();
        assert_eq!(flushed.len(), 8);
    }

    #[tokio::test]
    async fn test_concatenates_small_enqueues() {
        let (tx, mut rx) = mpsc::channel(16);
        let pacer = AudioPacer::new(fast_pacing(), CancellationToken::new(), channel_sink(tx));

        pacer.enqueue(Bytes::from_static(&[1, 2]));
        pacer.enqueue(Bytes::from_static(&[3, 4]));

        let frame = rx.recv().await.unwrap();
        assert_eq!(&frame[..], &[1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_clear_discards_buffered_audio() {
        let pacing = AudioPacing {
            flush_interval: Duration::from_secs(3600),
            flush_threshold: 1_000,
            chunk_size: 8,
            chunk_delay: Duration::from_millis(1),
        };
        let (tx, mut rx) = mpsc::channel(16);
        let pacer = AudioPacer::new(pacing, CancellationToken::new(), channel_sink(tx));

        pacer.enqueue(Bytes::from_static(&[1u8; 6]));
        assert_eq!(pacer.clear(), 6);
        assert_eq!(pacer.buffered(), 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cancel_stops_flush_task() {
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(16);
        let pacer = AudioPacer::new(fast_pacing(), cancel.clone(), channel_sink(tx));

        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(5)).await;
        pacer.enqueue(Bytes::from_static(&[1u8; 10]));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }
}
