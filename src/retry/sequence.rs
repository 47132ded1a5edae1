//! Bounded, linearly backed-off credential retry sequence.
//!
//! # State Machine
//!
//! ```text
//! Idle ──enable──► Scheduled(1) ──miss──► Scheduled(2) ──miss──► Scheduled(3)
//!                       │                      │                      │
//!                     valid                  valid            valid / miss
//!                       ▼                      ▼                      ▼
//!                 Succeeded | Failed    Succeeded | Failed    Succeeded | Failed
//! ```
//!
//! Attempt `n` waits `n * base_delay` from the moment it is scheduled, so a
//! sequence that exhausts all attempts observes delays of 1×, 2× and 3× the
//! base. A second enable while a sequence is pending cancels it and starts a
//! fresh one under a new [`SequenceId`]; tickets from the old one are ignored.

use super::timer::{RetryTicket, RetryTimer, SequenceId};
use crate::config::RetryConfig;
use crate::credentials::InvalidReason;
use crate::link::{DeliveryError, PeerId};
use log::{debug, info, warn};
use std::fmt;
use std::time::Duration;

/// Attempts per sequence.
pub const MAX_ATTEMPTS: u8 = 3;

/// Why an attempt did not produce a deliverable pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptMiss {
    /// Source returned nothing (or failed).
    Absent,
    /// Source returned a pair that failed validation.
    Invalid(InvalidReason),
}

/// Terminal failure after every attempt missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialFailure {
    /// No attempt ever got a pair from the source.
    SourceNeverProducedPair,
    /// At least one pair was produced, none passed validation.
    PairAlwaysInvalid(InvalidReason),
}

impl fmt::Display for CredentialFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceNeverProducedPair => write!(f, "source never produced a pair"),
            Self::PairAlwaysInvalid(last) => {
                write!(f, "pair was always invalid (last: {})", last)
            }
        }
    }
}

impl std::error::Error for CredentialFailure {}

/// How a finished sequence ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceOutcome {
    Succeeded,
    CredentialsUnavailable(CredentialFailure),
    DeliveryFailed(DeliveryError),
}

/// What the scheduler did after a miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    /// Next attempt is pending.
    Scheduled { attempt: u8, delay: Duration },
    /// No attempts left; the sequence is gone.
    Exhausted(CredentialFailure),
}

/// Current scheduler state, for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    Scheduled { sequence: SequenceId, attempt: u8 },
}

/// The live sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySequence {
    id: SequenceId,
    /// Peer whose enable started this sequence; credentials go back to it.
    peer: PeerId,
    /// Attempt currently scheduled (1-based).
    attempt: u8,
    produced_pair: bool,
    last_invalid: Option<InvalidReason>,
}

impl RetrySequence {
    fn new(id: SequenceId, peer: PeerId) -> Self {
        Self {
            id,
            peer,
            attempt: 1,
            produced_pair: false,
            last_invalid: None,
        }
    }

    pub fn id(&self) -> SequenceId {
        self.id
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    pub fn attempt(&self) -> u8 {
        self.attempt
    }

    fn failure(&self) -> CredentialFailure {
        match (self.produced_pair, self.last_invalid) {
            (true, Some(reason)) => CredentialFailure::PairAlwaysInvalid(reason),
            _ => CredentialFailure::SourceNeverProducedPair,
        }
    }
}

/// An attempt that is due now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueAttempt {
    pub sequence: SequenceId,
    pub attempt: u8,
    pub peer: PeerId,
}

/// Owns at most one [`RetrySequence`] and drives it through its timer.
pub struct RetryScheduler<T> {
    config: RetryConfig,
    timer: T,
    active: Option<RetrySequence>,
    last_outcome: Option<SequenceOutcome>,
    next_id: u64,
}

impl<T: RetryTimer> RetryScheduler<T> {
    pub fn new(config: RetryConfig, timer: T) -> Self {
        Self {
            config,
            timer,
            active: None,
            last_outcome: None,
            next_id: 0,
        }
    }

    /// Start a sequence for `peer`, replacing any pending one.
    pub fn start(&mut self, peer: PeerId) -> SequenceId {
        if let Some(previous) = self.active.take() {
            info!(
                "Enable while sequence {} pending (attempt {}): restarting",
                previous.id, previous.attempt
            );
            self.timer.cancel(previous.id);
        }

        self.next_id += 1;
        let id = SequenceId::new(self.next_id);
        self.active = Some(RetrySequence::new(id, peer));
        let delay = self.schedule(id, 1);
        info!("Credential sequence {} started, first attempt in {:?}", id, delay);
        id
    }

    /// Claim a fired ticket. Returns `None` if it belongs to a cancelled or
    /// finished sequence, or to an attempt other than the one scheduled.
    pub fn take_due(&mut self, ticket: RetryTicket) -> Option<DueAttempt> {
        match &self.active {
            Some(seq) if seq.id == ticket.sequence && seq.attempt == ticket.attempt => {
                Some(DueAttempt {
                    sequence: seq.id,
                    attempt: seq.attempt,
                    peer: seq.peer.clone(),
                })
            }
            _ => {
                debug!(
                    "Dropping stale ticket {} attempt {}",
                    ticket.sequence, ticket.attempt
                );
                None
            }
        }
    }

    /// Record that the current attempt missed and either schedule the next one
    /// or end the sequence. Returns `None` if no sequence is active.
    pub fn record_miss(&mut self, miss: AttemptMiss) -> Option<RetryStep> {
        let seq = self.active.as_mut()?;
        if let AttemptMiss::Invalid(reason) = miss {
            seq.produced_pair = true;
            seq.last_invalid = Some(reason);
        }

        if seq.attempt < MAX_ATTEMPTS {
            seq.attempt += 1;
            let (id, attempt) = (seq.id, seq.attempt);
            let delay = self.schedule(id, attempt);
            debug!("Sequence {} attempt {} in {:?}", id, attempt, delay);
            return Some(RetryStep::Scheduled { attempt, delay });
        }

        let failure = seq.failure();
        warn!("Sequence {} exhausted {} attempts: {}", seq.id, MAX_ATTEMPTS, failure);
        self.finish(SequenceOutcome::CredentialsUnavailable(failure));
        Some(RetryStep::Exhausted(failure))
    }

    /// End the active sequence with `outcome`.
    pub fn finish(&mut self, outcome: SequenceOutcome) -> Option<RetrySequence> {
        let seq = self.active.take()?;
        self.timer.cancel(seq.id);
        debug!("Sequence {} finished: {:?}", seq.id, outcome);
        self.last_outcome = Some(outcome);
        Some(seq)
    }

    pub fn state(&self) -> RetryState {
        match &self.active {
            Some(seq) => RetryState::Scheduled {
                sequence: seq.id,
                attempt: seq.attempt,
            },
            None => RetryState::Idle,
        }
    }

    pub fn active(&self) -> Option<&RetrySequence> {
        self.active.as_ref()
    }

    pub fn last_outcome(&self) -> Option<&SequenceOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    fn schedule(&mut self, sequence: SequenceId, attempt: u8) -> Duration {
        let delay = self.config.delay_for(attempt);
        self.timer.schedule(RetryTicket { sequence, attempt }, delay);
        delay
    }
}
