//! Deferred, cancelable retry timers.
//!
//! A timer never runs an attempt itself. When it fires it posts a
//! [`RetryTicket`] back into the serialized event loop, which decides whether
//! the ticket still belongs to the live sequence.

use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Generation id of a retry sequence. Strictly increasing per scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceId(u64);

impl SequenceId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// "Attempt `attempt` of sequence `sequence` is due."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryTicket {
    pub sequence: SequenceId,
    pub attempt: u8,
}

/// Schedules tickets to be handed back after a delay.
pub trait RetryTimer {
    /// Deliver `ticket` after `delay`.
    fn schedule(&mut self, ticket: RetryTicket, delay: Duration);

    /// Drop anything still pending for `sequence`. Safe to call after it fired.
    fn cancel(&mut self, sequence: SequenceId);
}

/// Tokio-backed timer. Each pending ticket is a sleeping task that can be
/// cancelled through the sequence's token.
pub struct TokioRetryTimer {
    tickets: mpsc::UnboundedSender<RetryTicket>,
    pending: HashMap<SequenceId, CancellationToken>,
}

impl TokioRetryTimer {
    /// Create a timer and the receiver its tickets arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RetryTicket>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tickets: tx,
                pending: HashMap::new(),
            },
            rx,
        )
    }

    /// Number of sequences with a live cancellation token.
    pub fn pending_sequences(&self) -> usize {
        self.pending.len()
    }
}

impl RetryTimer for TokioRetryTimer {
    /// Must be called from within a tokio runtime.
    fn schedule(&mut self, ticket: RetryTicket, delay: Duration) {
        let token = self
            .pending
            .entry(ticket.sequence)
            .or_insert_with(CancellationToken::new)
            .clone();
        let tx = self.tickets.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Retry timer for {} attempt {} cancelled", ticket.sequence, ticket.attempt);
                }
                _ = tokio::time::sleep(delay) => {
                    // Receiver gone means the event loop has shut down
                    let _ = tx.send(ticket);
                }
            }
        });
    }

    fn cancel(&mut self, sequence: SequenceId) {
        if let Some(token) = self.pending.remove(&sequence) {
            token.cancel();
        }
    }
}
