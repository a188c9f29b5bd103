//! Debounced pacer for transcript events.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::SinkFn;

/// Debounces non-final items while letting finals through immediately.
///
/// At most one pending non-final item is retained; a newer one overwrites
/// it. A non-final item is dispatched immediately when the minimum
/// inter-send interval has already elapsed, otherwise it waits out the
/// remainder. A final item always dispatches immediately and cancels any
/// pending timer (dropping the pending non-final it superseded).
///
/// A single worker task owns all state, so dispatch order matches offer
/// order.
pub struct TranscriptDebouncer<T> {
    commands: mpsc::UnboundedSender<Offer<T>>,
}

struct Offer<T> {
    item: T,
    is_final: bool,
}

impl<T: Send + 'static> TranscriptDebouncer<T> {
    /// Create the debouncer and spawn its worker task.
    pub fn new(min_interval: Duration, cancel: CancellationToken, sink: SinkFn<T>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx, min_interval, cancel, sink));
        Self { commands: tx }
    }

    /// Offer an item for dispatch, debounced unless final.
    pub fn offer(&self, item: T, is_final: bool) {
        let _ = self.commands.send(Offer { item, is_final });
    }
}

async fn run<T: Send + 'static>(
    mut rx: mpsc::UnboundedReceiver<Offer<T>>,
    min_interval: Duration,
    cancel: CancellationToken,
    sink: SinkFn<T>,
) {
    let mut pending: Option<T> = None;
    let mut deadline: Option<Instant> = None;
    let mut last_sent: Option<Instant> = None;

    loop {
        // A far-future deadline stands in for "no timer pending" so the
        // select arm below stays simple.
        let wake_at = deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(86_400));

        tokio::select! {
            _ = cancel.cancelled() => return,
            offer = rx.recv() => {
                let Some(Offer { item, is_final }) = offer else { return };

                if is_final {
                    if pending.take().is_some() {
                        trace!("final transcript superseded a pending partial");
                    }
                    deadline = None;
                    last_sent = Some(Instant::now());
                    if (sink)(item).await.is_err() {
                        return;
                    }
                    continue;
                }

                let elapsed_enough = last_sent
                    .map(|sent| sent.elapsed() >= min_interval)
                    .unwrap_or(true);
                if elapsed_enough {
                    pending = None;
                    deadline = None;
                    last_sent = Some(Instant::now());
                    if (sink)(item).await.is_err() {
                        return;
                    }
                } else {
                    // Overwrite any previously retained partial and keep
                    // (or reset) the timer for the remaining interval.
                    pending = Some(item);
                    if deadline.is_none() {
                        let sent = last_sent.expect("last_sent set when interval not elapsed");
                        deadline = Some(sent + min_interval);
                    }
                }
            }
            _ = tokio::time::sleep_until(wake_at), if deadline.is_some() => {
                deadline = None;
                if let Some(item) = pending.take() {
                    last_sent = Some(Instant::now());
                    if (sink)(item).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}
