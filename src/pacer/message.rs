//! Fixed-interval FIFO pacer for control messages.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::SinkFn;

/// FIFO queue drained at a fixed cadence by a background task.
///
/// `enqueue` never blocks; it starts a drain task if none is running. The
/// drain pops one item, dispatches it, sleeps the configured delay, and
/// repeats until the queue empties. At most one drain runs per instance,
/// which also serializes writes to the sink.
pub struct MessagePacer<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    queue: Mutex<VecDeque<T>>,
    draining: AtomicBool,
    delay: Duration,
    sink: SinkFn<T>,
    cancel: CancellationToken,
}

impl<T: Send + 'static> MessagePacer<T> {
    /// Create a pacer dispatching to `sink` with `delay` between items.
    pub fn new(delay: Duration, cancel: CancellationToken, sink: SinkFn<T>) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(VecDeque::new()),
                draining: AtomicBool::new(false),
                delay,
                sink,
                cancel,
            }),
        }
    }

    /// Queue an item for paced dispatch, starting a drain if idle.
    pub fn enqueue(&self, item: T) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        self.inner.queue.lock().push_back(item);
        self.start_drain();
    }

    /// Number of items still queued. Mainly useful in tests.
    pub fn len(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.queue.lock().is_empty()
    }

    fn start_drain(&self) {
        if self.inner.draining.swap(true, Ordering::AcqRel) {
            return;
        }
        let inner = self.inner.clone();
        tokio::spawn(async move {
            loop {
                Inner::drain(&inner).await;
                inner.draining.store(false, Ordering::Release);

                // An enqueue may have raced the drain going idle; take the
                // drain back if so, otherwise stay idle.
                if inner.cancel.is_cancelled() || inner.queue.lock().is_empty() {
                    return;
                }
                if inner.draining.swap(true, Ordering::AcqRel) {
                    return;
                }
            }
        });
    }
}

impl<T: Send + 'static> Inner<T> {
    async fn drain(inner: &Arc<Self>) {
        loop {
            let item = inner.queue.lock().pop_front();
            let Some(item) = item else {
                return;
            };

            if (inner.sink)(item).await.is_err() {
                // Sink is gone; drop the backlog and go idle.
                let dropped = {
                    let mut queue = inner.queue.lock();
                    let n = queue.len();
                    queue.clear();
                    n
                };
                trace!(dropped, "message pacer sink closed");
                return;
            }

            tokio::select! {
                _ = inner.cancel.cancelled() => {
                    inner.queue.lock().clear();
                    return;
                }
                _ = tokio::time::sleep(inner.delay) => {}
            }
        }
    }
}

impl<T> Clone for MessagePacer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}
