//! Recording fakes for the peripheral's collaborators.

use crate::credentials::{FetchCredentials, FetchResult};
use crate::link::{LinkTransport, PeerId, TransportError};
use crate::peripheral::PeripheralListener;
use crate::retry::{RetryTicket, RetryTimer, SequenceId};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Transport that records instead of sending.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    notifications: Vec<(PeerId, Vec<u8>)>,
    responses: Vec<(PeerId, u8)>,
    notify_error: Option<TransportError>,
    response_error: Option<TransportError>,
}

impl RecordingTransport {
    /// Make every subsequent notify fail with `err`.
    pub fn fail_notify(&mut self, err: TransportError) {
        self.notify_error = Some(err);
    }

    /// Make every subsequent write response fail with `err`.
    pub fn fail_responses(&mut self, err: TransportError) {
        self.response_error = Some(err);
    }

    pub fn notifications(&self) -> &[(PeerId, Vec<u8>)] {
        &self.notifications
    }

    pub fn responses(&self) -> &[(PeerId, u8)] {
        &self.responses
    }
}

impl LinkTransport for RecordingTransport {
    fn notify(&mut self, peer: &PeerId, value: &[u8]) -> Result<(), TransportError> {
        if let Some(err) = &self.notify_error {
            return Err(err.clone());
        }
        self.notifications.push((peer.clone(), value.to_vec()));
        Ok(())
    }

    fn send_response(&mut self, peer: &PeerId, att_code: u8) -> Result<(), TransportError> {
        if let Some(err) = &self.response_error {
            return Err(err.clone());
        }
        self.responses.push((peer.clone(), att_code));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    Enable,
    Disable,
    Sent(String),
    SendFailed(String),
}

#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Vec<ListenerEvent>,
}

impl RecordingListener {
    pub fn events(&self) -> &[ListenerEvent] {
        &self.events
    }
}

impl PeripheralListener for RecordingListener {
    fn on_enable(&mut self) {
        self.events.push(ListenerEvent::Enable);
    }

    fn on_disable(&mut self) {
        self.events.push(ListenerEvent::Disable);
    }

    fn on_credentials_sent(&mut self, ssid: &str) {
        self.events.push(ListenerEvent::Sent(ssid.to_string()));
    }

    fn on_credential_send_failed(&mut self, reason: &str) {
        self.events.push(ListenerEvent::SendFailed(reason.to_string()));
    }
}

/// Timer that only records; tests fire tickets by hand.
#[derive(Debug, Default)]
pub struct RecordingTimer {
    scheduled: Vec<(RetryTicket, Duration)>,
    cancelled: Vec<SequenceId>,
}

impl RecordingTimer {
    pub fn scheduled(&self) -> &[(RetryTicket, Duration)] {
        &self.scheduled
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.scheduled.iter().map(|(_, delay)| *delay).collect()
    }

    pub fn cancelled(&self) -> Vec<SequenceId> {
        self.cancelled.clone()
    }
}

impl RetryTimer for RecordingTimer {
    fn schedule(&mut self, ticket: RetryTicket, delay: Duration) {
        self.scheduled.push((ticket, delay));
    }

    fn cancel(&mut self, sequence: SequenceId) {
        self.cancelled.push(sequence);
    }
}

/// Shared view of when a [`ScriptedSource`] was asked for credentials.
pub type FetchLog = Arc<Mutex<Vec<Instant>>>;

/// Source that replays a script, then reports "not ready" forever.
pub struct ScriptedSource {
    script: VecDeque<FetchResult>,
    log: FetchLog,
}

impl ScriptedSource {
    pub fn new(script: Vec<FetchResult>) -> Self {
        Self {
            script: script.into(),
            log: FetchLog::default(),
        }
    }

    /// Handle to the fetch timestamps; stays valid after the source is boxed.
    pub fn fetch_log(&self) -> FetchLog {
        Arc::clone(&self.log)
    }
}

impl FetchCredentials for ScriptedSource {
    fn fetch(&mut self) -> FetchResult {
        if let Ok(mut log) = self.log.lock() {
            log.push(Instant::now());
        }
        self.script.pop_front().unwrap_or(Ok(None))
    }
}
