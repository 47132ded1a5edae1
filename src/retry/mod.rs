//! Credential retrieval retries.
//!
//! # Components
//!
//! - [`sequence`] - the bounded retry state machine
//! - [`timer`] - cancelable deferred tickets (tokio-backed)

mod sequence;
mod timer;

pub use sequence::{
    AttemptMiss, CredentialFailure, DueAttempt, RetryScheduler, RetrySequence, RetryState,
    RetryStep, SequenceOutcome, MAX_ATTEMPTS,
};
pub use timer::{RetryTicket, RetryTimer, SequenceId, TokioRetryTimer};
