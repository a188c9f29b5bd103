//! Rate-limited delivery primitives for the outbound channel.
//!
//! A session never writes paced traffic to the socket directly. It hands
//! items to one of three pacers, each draining into an async sink at its
//! own cadence:
//!
//! - [`MessagePacer`] - FIFO queue drained one item at a time with a fixed
//!   delay between dispatches. Used for ordinary control messages.
//! - [`AudioPacer`] - accumulates audio until a wall-clock interval elapses
//!   or a size threshold is crossed, then flushes the buffer re-chunked to
//!   the wire frame size with a short inter-chunk delay. Used for agent
//!   audio.
//! - [`TranscriptDebouncer`] - keeps at most one pending non-final item;
//!   finals flush immediately, non-finals are spaced by a minimum
//!   interval. Used for transcripts.
//!
//! All pacers guarantee FIFO dispatch order within themselves and run at
//! most one drain at a time. Their timers are tied to a shared
//! [`CancellationToken`] so a session close cancels everything as a unit.
//! A sink that reports [`SinkClosed`] causes the pacer to drop whatever is
//! still queued and go idle; the session's own closed checks are the
//! authoritative guard against writing to a dead connection.

mod audio;
mod debounce;
mod message;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub use audio::{AudioPacer, AudioPacing};
pub use debounce::TranscriptDebouncer;
pub use message::MessagePacer;

/// The dispatch sink has gone away; queued items should be dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkClosed;

/// Async dispatch sink invoked for each drained item.
pub type SinkFn<T> =
    Arc<dyn Fn(T) -> Pin<Box<dyn Future<Output = Result<(), SinkClosed>> + Send>> + Send + Sync>;

/// Wrap an `mpsc` sender into a [`SinkFn`].
pub fn channel_sink<T: Send + 'static>(tx: tokio::sync::mpsc::Sender<T>) -> SinkFn<T> {
    Arc::new(move |item: T| {
        let tx = tx.clone();
        Box::pin(async move { tx.send(item).await.map_err(|_| SinkClosed) })
    })
}
