//! DTMF digit collection.
//!
//! The session owns at most one collector at a time and replaces it once
//! it reaches a terminal state. Collection policy (terminator digit,
//! inter-digit timeout, digit cap) is the collector's concern; the session
//! only forwards digits and reacts to the emitted events.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::DtmfConfig;

/// Collector lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtmfState {
    /// No digit received yet.
    Idle,
    /// Digits are being collected.
    Collecting,
    /// Collection finished; `FinalDigits` was emitted.
    Complete,
    /// Collection failed; `Error` was emitted.
    Error,
}

/// Events a collector emits toward its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DtmfEvent {
    /// Collection completed with the gathered digits.
    FinalDigits(String),
    /// Collection failed.
    Error(String),
}

/// A DTMF digit-sequence collector.
pub trait DtmfCollector: Send + Sync {
    /// Feed one digit into the collector.
    fn process_digit(&mut self, digit: char);

    /// Current lifecycle state.
    fn state(&self) -> DtmfState;
}

/// Factory the session uses to create collectors on demand.
pub type DtmfCollectorFactory =
    Arc<dyn Fn(mpsc::Sender<DtmfEvent>) -> Box<dyn DtmfCollector> + Send + Sync>;

/// Returns the default factory producing [`TimeoutDtmfCollector`]s.
pub fn default_collector_factory(
    config: DtmfConfig,
    cancel: CancellationToken,
) -> DtmfCollectorFactory {
    Arc::new(move |events| {
        Box::new(TimeoutDtmfCollector::new(
            config.clone(),
            cancel.clone(),
            events,
        ))
    })
}

struct Shared {
    digits: String,
    state: DtmfState,
}

/// Collector that finalizes on a terminator digit or inter-digit timeout.
///
/// Exceeding the digit cap moves the collector to `Error`. Each accepted
/// digit restarts the timeout; the generation counter invalidates timers
/// superseded by a newer digit.
pub struct TimeoutDtmfCollector {
    shared: Arc<Mutex<Shared>>,
    generation: Arc<AtomicU64>,
    config: DtmfConfig,
    cancel: CancellationToken,
    events: mpsc::Sender<DtmfEvent>,
}

impl TimeoutDtmfCollector {
    /// Create an idle collector emitting on `events`.
    pub fn new(
        config: DtmfConfig,
        cancel: CancellationToken,
        events: mpsc::Sender<DtmfEvent>,
    ) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                digits: String::new(),
                state: DtmfState::Idle,
            })),
            generation: Arc::new(AtomicU64::new(0)),
            config,
            cancel,
            events,
        }
    }

    fn emit(&self, event: DtmfEvent) {
        let events = self.events.clone();
        tokio::spawn(async move {
            let _ = events.send(event).await;
        });
    }

    fn arm_timeout(&self) {
        let my_generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let generation = self.generation.clone();
        let shared = self.shared.clone();
        let events = self.events.clone();
        let cancel = self.cancel.clone();
        let timeout = self.config.inter_digit_timeout();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(timeout) => {}
            }

            let digits = {
                let mut locked = shared.lock();
                if locked.state != DtmfState::Collecting
                    || generation.load(Ordering::Acquire) != my_generation
                {
                    return;
                }
                locked.state = DtmfState::Complete;
                std::mem::take(&mut locked.digits)
            };
            debug!(digits = %digits, "dtmf collection timed out, finalizing");
            let _ = events.send(DtmfEvent::FinalDigits(digits)).await;
        });
    }
}

impl DtmfCollector for TimeoutDtmfCollector {
    fn process_digit(&mut self, digit: char) {
        let mut shared = self.shared.lock();
        match shared.state {
            DtmfState::Idle => shared.state = DtmfState::Collecting,
            DtmfState::Collecting => {}
            // Terminal; the session replaces the collector.
            DtmfState::Complete | DtmfState::Error => return,
        }

        if digit == self.config.terminator {
            shared.state = DtmfState::Complete;
            let digits = std::mem::take(&mut shared.digits);
            drop(shared);
            self.generation.fetch_add(1, Ordering::AcqRel);
            self.emit(DtmfEvent::FinalDigits(digits));
            return;
        }

        shared.digits.push(digit);
        if shared.digits.len() > self.config.max_digits {
            shared.state = DtmfState::Error;
            drop(shared);
            self.generation.fetch_add(1, Ordering::AcqRel);
            self.emit(DtmfEvent::Error("maximum digit count exceeded".to_string()));
            return;
        }
        drop(shared);
        self.arm_timeout();
    }

    fn state(&self) -> DtmfState {
        self.shared.lock().state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn collector(timeout_ms: u64, max_digits: usize) -> (TimeoutDtmfCollector, mpsc::Receiver<DtmfEvent>) {
        let (tx, rx) = mpsc::channel(4);
        let config = DtmfConfig {
            terminator: '#',
            inter_digit_timeout_ms: timeout_ms,
            max_digits,
        };
        (
            TimeoutDtmfCollector::new(config, CancellationToken::new(), tx),
            rx,
        )
    }

    #[tokio::test]
    async fn test_terminator_finalizes() {
        let (mut collector, mut rx) = collector(5_000, 32);
        collector.process_digit('1');
        collector.process_digit('2');
        collector.process_digit('#');

        assert_eq!(rx.recv().await, Some(DtmfEvent::FinalDigits("12".to_string())));
        assert_eq!(collector.state(), DtmfState::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_finalizes() {
        let (mut collector, mut rx) = collector(100, 32);
        collector.process_digit('4');
        collector.process_digit('2');

        assert_eq!(rx.recv().await, Some(DtmfEvent::FinalDigits("42".to_string())));
        assert_eq!(collector.state(), DtmfState::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_digit_restarts_timeout() {
        let (mut collector, mut rx) = collector(100, 32);
        collector.process_digit('1');
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(collector.state(), DtmfState::Collecting);

        collector.process_digit('2');
        tokio::time::sleep(Duration::from_millis(60)).await;
        // Still collecting: the second digit rearmed the timer.
        assert_eq!(collector.state(), DtmfState::Collecting);
        assert!(rx.try_recv().is_err());

        assert_eq!(rx.recv().await, Some(DtmfEvent::FinalDigits("12".to_string())));
    }

    #[tokio::test]
    async fn test_digit_cap_errors() {
        let (mut collector, mut rx) = collector(5_000, 2);
        collector.process_digit('1');
        collector.process_digit('2');
        collector.process_digit('3');

        assert!(matches!(rx.recv().await, Some(DtmfEvent::Error(_))));
        assert_eq!(collector.state(), DtmfState::Error);
    }

    #[tokio::test]
    async fn test_terminal_collector_ignores_digits() {
        let (mut collector, mut rx) = collector(5_000, 32);
        collector.process_digit('#');
        assert_eq!(rx.recv().await, Some(DtmfEvent::FinalDigits(String::new())));

        collector.process_digit('9');
        assert_eq!(collector.state(), DtmfState::Complete);
        assert!(rx.try_recv().is_err());
    }
}
