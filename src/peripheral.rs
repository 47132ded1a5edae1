//! The hotspot peripheral: command channel, connection tracking and the
//! credential handshake, tied together.
//!
//! Every method here runs inside the single serialized event loop (see
//! [`crate::runtime`]). Nothing is shared, so nothing is locked.
//!
//! ```text
//!   write(0x01) ──► on_enable ──► RetryScheduler::start
//!                                       │ delay n×D
//!                                       ▼
//!                      on_retry_due ──► fetch ──► validate ──► deliver
//!                                         │miss                    │
//!                                         └── next attempt         └──► listener
//! ```

use crate::credentials::{validate, CredentialPair, CredentialSource, Validation};
use crate::link::{deliver, ConnectionTracker, LinkTransport, PeerId, PeerLink};
use crate::protocol::{
    AckOutcome, Command, RejectReason, Subscription, ATT_SUCCESS, ATT_UNLIKELY_ERROR, CCCD_UUID,
    COMMAND_CHAR_UUID,
};
use crate::retry::{
    AttemptMiss, RetryScheduler, RetryState, RetryStep, RetryTicket, RetryTimer, SequenceId,
    SequenceOutcome,
};
use log::{debug, info, warn};
use uuid::Uuid;

/// Outward events. Injected at construction; the peripheral never reaches
/// for a global.
pub trait PeripheralListener {
    /// Peer asked for the hotspot to be turned on.
    fn on_enable(&mut self);

    /// Peer asked for the hotspot to be turned off.
    fn on_disable(&mut self);

    /// Credentials reached the peer.
    fn on_credentials_sent(&mut self, ssid: &str);

    /// The handshake ended without delivering credentials.
    fn on_credential_send_failed(&mut self, reason: &str);
}

/// Listener that only logs. Used when nothing acts on the events.
#[derive(Debug, Default)]
pub struct LogListener;

impl PeripheralListener for LogListener {
    fn on_enable(&mut self) {
        info!("[listener] hotspot enable requested");
    }

    fn on_disable(&mut self) {
        info!("[listener] hotspot disable requested");
    }

    fn on_credentials_sent(&mut self, ssid: &str) {
        info!("[listener] credentials for {:?} sent", ssid);
    }

    fn on_credential_send_failed(&mut self, reason: &str) {
        warn!("[listener] credential send failed: {}", reason);
    }
}

/// A write on some attribute of our GATT table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub peer: PeerId,
    /// Attribute the peer wrote to.
    pub characteristic: Uuid,
    pub value: Vec<u8>,
    /// Peer used Write Request (not Write Command) and waits for a status.
    pub response_needed: bool,
}

impl WriteRequest {
    /// Write to the command characteristic that expects a response.
    pub fn command(peer: PeerId, value: impl Into<Vec<u8>>) -> Self {
        Self {
            peer,
            characteristic: COMMAND_CHAR_UUID,
            value: value.into(),
            response_needed: true,
        }
    }

    /// The ack this write earns. Depends only on the request, never on
    /// peripheral state, so platform glue can answer without waiting for the
    /// event loop.
    pub fn classify(&self) -> AckOutcome {
        if self.characteristic != COMMAND_CHAR_UUID {
            return AckOutcome::Rejected(RejectReason::WrongChannel);
        }
        match self.value.first() {
            None => AckOutcome::Rejected(RejectReason::EmptyPayload),
            Some(&byte) => match Command::from_byte(byte) {
                Some(command) => AckOutcome::Accepted(command),
                None => AckOutcome::Ignored(byte),
            },
        }
    }
}

/// Point-in-time view of the peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralStatus {
    /// Tracked peer with its subscription and MTU.
    pub link: Option<PeerLink>,
    pub retry: RetryState,
    pub last_outcome: Option<SequenceOutcome>,
}

/// The peripheral state machine.
pub struct Peripheral<T, R, L> {
    tracker: ConnectionTracker,
    transport: T,
    retry: RetryScheduler<R>,
    source: CredentialSource,
    listener: L,
}

impl<T, R, L> Peripheral<T, R, L>
where
    T: LinkTransport,
    R: RetryTimer,
    L: PeripheralListener,
{
    pub fn new(
        transport: T,
        retry: RetryScheduler<R>,
        source: CredentialSource,
        listener: L,
    ) -> Self {
        info!("Peripheral up, credential source: {}", source.kind());
        Self {
            tracker: ConnectionTracker::new(),
            transport,
            retry,
            source,
            listener,
        }
    }

    // ==================== Link Events ====================

    pub fn on_connect(&mut self, peer: PeerId) {
        self.tracker.on_connect(peer);
    }

    /// A pending sequence is left alone; its delivery will fail instead.
    pub fn on_disconnect(&mut self, peer: &PeerId) {
        if self.tracker.on_disconnect(peer) {
            if let Some(seq) = self.retry.active().filter(|seq| seq.peer() == peer) {
                debug!(
                    "Sequence {} still pending for departed peer {}",
                    seq.id(),
                    peer
                );
            }
        }
    }

    pub fn on_mtu_changed(&mut self, peer: &PeerId, mtu: u16) {
        if !self.tracker.on_mtu_changed(peer, mtu) {
            debug!("MTU update from untracked peer {}", peer);
        }
    }

    /// Handle a write to a descriptor. Only the CCCD of the tracked peer is
    /// accepted. Returns whether the write was taken.
    pub fn on_descriptor_write(
        &mut self,
        peer: &PeerId,
        descriptor: Uuid,
        value: &[u8],
        response_needed: bool,
    ) -> bool {
        let accepted = if descriptor != CCCD_UUID {
            warn!("Write to unknown descriptor {} from {}", descriptor, peer);
            false
        } else {
            match Subscription::from_cccd(value) {
                Some(subscription) => self.tracker.on_subscription(peer, subscription),
                None => {
                    warn!("Malformed CCCD value {:02x?} from {}", value, peer);
                    false
                }
            }
        };

        if response_needed {
            let code = if accepted { ATT_SUCCESS } else { ATT_UNLIKELY_ERROR };
            self.respond(peer, code);
        }
        accepted
    }

    // ==================== Command Channel ====================

    /// Validate and dispatch a write. Listener events fire before the
    /// acknowledgment goes out.
    pub fn on_write(&mut self, request: &WriteRequest) -> AckOutcome {
        let outcome = self.dispatch(request);
        if request.response_needed {
            self.respond(&request.peer, outcome.att_code());
        }
        outcome
    }

    fn dispatch(&mut self, request: &WriteRequest) -> AckOutcome {
        let outcome = request.classify();
        match outcome {
            AckOutcome::Rejected(RejectReason::WrongChannel) => {
                warn!(
                    "Write from {} on {} rejected: not the command channel",
                    request.peer, request.characteristic
                );
                return outcome;
            }
            AckOutcome::Rejected(RejectReason::EmptyPayload) => {
                warn!("Empty write from {} rejected", request.peer);
                return outcome;
            }
            _ => {}
        }
        if request.value.len() > 1 {
            debug!("Ignoring {} trailing bytes", request.value.len() - 1);
        }

        match outcome {
            AckOutcome::Accepted(Command::Enable) => {
                info!("Enable from {}", request.peer);
                self.listener.on_enable();
                self.retry.start(request.peer.clone());
            }
            AckOutcome::Accepted(Command::Disable) => {
                info!("Disable from {}", request.peer);
                self.listener.on_disable();
            }
            AckOutcome::Ignored(byte) => {
                debug!("Ignoring unknown command byte {:#04x} from {}", byte, request.peer);
            }
            AckOutcome::Rejected(_) => {}
        }
        outcome
    }

    fn respond(&mut self, peer: &PeerId, att_code: u8) {
        if let Err(e) = self.transport.send_response(peer, att_code) {
            warn!("Write response to {} failed: {}", peer, e);
        }
    }

    // ==================== Credential Handshake ====================

    /// Run the attempt a fired ticket stands for. Stale tickets are dropped.
    pub fn on_retry_due(&mut self, ticket: RetryTicket) {
        let Some(due) = self.retry.take_due(ticket) else {
            return;
        };
        debug!("Sequence {} attempt {} running", due.sequence, due.attempt);

        let miss = match self.source.fetch() {
            None => AttemptMiss::Absent,
            Some(pair) => match validate(&pair) {
                Validation::Valid { warnings } => {
                    for warning in &warnings {
                        warn!("Credentials for {:?}: {}", pair.ssid, warning);
                    }
                    self.send_credentials(due.sequence, &due.peer, &pair);
                    return;
                }
                Validation::Invalid(reason) => {
                    warn!("Attempt {} produced invalid credentials: {}", due.attempt, reason);
                    AttemptMiss::Invalid(reason)
                }
            },
        };

        if let Some(RetryStep::Exhausted(failure)) = self.retry.record_miss(miss) {
            self.listener.on_credential_send_failed(&failure.to_string());
        }
    }

    fn send_credentials(&mut self, sequence: SequenceId, peer: &PeerId, pair: &CredentialPair) {
        match deliver(&mut self.transport, &self.tracker, peer, pair) {
            Ok(()) => {
                self.retry.finish(SequenceOutcome::Succeeded);
                self.listener.on_credentials_sent(&pair.ssid);
            }
            Err(e) => {
                warn!("Sequence {} delivery failed: {}", sequence, e);
                let reason = e.to_string();
                self.retry.finish(SequenceOutcome::DeliveryFailed(e));
                self.listener.on_credential_send_failed(&reason);
            }
        }
    }

    // ==================== Accessors ====================

    pub fn status(&self) -> PeripheralStatus {
        PeripheralStatus {
            link: self.tracker.link().cloned(),
            retry: self.retry.state(),
            last_outcome: self.retry.last_outcome().cloned(),
        }
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn retry(&self) -> &RetryScheduler<R> {
        &self.retry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::credentials::FetchResult;
    use crate::link::{DeliveryError, TransportError};
    use crate::protocol::{ATT_INVALID_LENGTH, ATT_REQUEST_NOT_SUPPORTED};
    use crate::retry::{CredentialFailure, MAX_ATTEMPTS};
    use crate::testutil::{
        ListenerEvent, RecordingListener, RecordingTimer, RecordingTransport, ScriptedSource,
    };
    use std::time::Duration;

    type TestPeripheral = Peripheral<RecordingTransport, RecordingTimer, RecordingListener>;

    const PEER: &str = "AA:BB:CC:DD:EE:01";

    fn peer() -> PeerId {
        PeerId::from(PEER)
    }

    fn peripheral(script: Vec<FetchResult>) -> TestPeripheral {
        let source = CredentialSource::Primary(Box::new(ScriptedSource::new(script)));
        Peripheral::new(
            RecordingTransport::default(),
            RetryScheduler::new(RetryConfig::default(), RecordingTimer::default()),
            source,
            RecordingListener::default(),
        )
    }

    fn connected(script: Vec<FetchResult>) -> TestPeripheral {
        let mut p = peripheral(script);
        p.on_connect(peer());
        p.on_descriptor_write(&peer(), CCCD_UUID, &[0x01, 0x00], false);
        p
    }

    fn pair(ssid: &str, password: &str) -> FetchResult {
        Ok(Some(CredentialPair::new(ssid, password)))
    }

    /// Fire whatever the timer last scheduled.
    fn fire_next(p: &mut TestPeripheral) {
        let (ticket, _) = *p.retry().timer().scheduled().last().unwrap();
        p.on_retry_due(ticket);
    }

    // ==================== Command Channel Tests ====================

    #[test]
    fn test_enable_dispatches_and_starts_one_sequence() {
        let mut p = connected(vec![]);
        let outcome = p.on_write(&WriteRequest::command(peer(), [0x01]));

        assert_eq!(outcome, AckOutcome::Accepted(Command::Enable));
        assert_eq!(p.listener().events(), &[ListenerEvent::Enable]);
        assert_eq!(p.retry().timer().scheduled().len(), 1);
        assert!(matches!(p.status().retry, RetryState::Scheduled { attempt: 1, .. }));
        assert_eq!(p.transport().responses(), &[(peer(), ATT_SUCCESS)]);
    }

    #[test]
    fn test_disable_never_starts_sequence() {
        let mut p = connected(vec![]);
        let outcome = p.on_write(&WriteRequest::command(peer(), [0x00]));

        assert_eq!(outcome, AckOutcome::Accepted(Command::Disable));
        assert_eq!(p.listener().events(), &[ListenerEvent::Disable]);
        assert!(p.retry().timer().scheduled().is_empty());
        assert_eq!(p.status().retry, RetryState::Idle);
    }

    #[test]
    fn test_unknown_bytes_change_nothing() {
        let mut p = connected(vec![]);
        let before = p.status();

        for byte in 0x02..=0xFF_u8 {
            let outcome = p.on_write(&WriteRequest::command(peer(), [byte]));
            assert_eq!(outcome, AckOutcome::Ignored(byte));
        }

        assert!(p.listener().events().is_empty());
        assert!(p.retry().timer().scheduled().is_empty());
        assert_eq!(p.status(), before);
        assert!(p
            .transport()
            .responses()
            .iter()
            .all(|(_, code)| *code == ATT_REQUEST_NOT_SUPPORTED));
    }

    #[test]
    fn test_only_first_byte_counts() {
        let mut p = connected(vec![]);
        let outcome = p.on_write(&WriteRequest::command(peer(), [0x00, 0x01, 0x01]));
        assert_eq!(outcome, AckOutcome::Accepted(Command::Disable));
    }

    #[test]
    fn test_empty_write_rejected() {
        let mut p = connected(vec![]);
        let outcome = p.on_write(&WriteRequest::command(peer(), Vec::new()));

        assert_eq!(outcome, AckOutcome::Rejected(RejectReason::EmptyPayload));
        assert!(p.listener().events().is_empty());
        assert_eq!(p.transport().responses(), &[(peer(), ATT_INVALID_LENGTH)]);
    }

    #[test]
    fn test_wrong_channel_rejected() {
        let mut p = connected(vec![]);
        let mut request = WriteRequest::command(peer(), [0x01]);
        request.characteristic = Uuid::from_u128(0x1234);

        assert_eq!(p.on_write(&request), AckOutcome::Rejected(RejectReason::WrongChannel));
        assert!(p.listener().events().is_empty());
        assert!(p.retry().timer().scheduled().is_empty());
    }

    #[test]
    fn test_classify_matches_dispatched_ack() {
        let mut p = connected(vec![]);
        let mut wrong_channel = WriteRequest::command(peer(), [0x01]);
        wrong_channel.characteristic = Uuid::from_u128(0x1234);

        let mut requests = vec![wrong_channel, WriteRequest::command(peer(), Vec::new())];
        requests.extend((0x00..=0xFF_u8).map(|byte| WriteRequest::command(peer(), [byte])));

        for request in &requests {
            let expected = request.classify();
            assert_eq!(p.on_write(request), expected, "request {:?}", request.value);
        }
    }

    #[test]
    fn test_no_response_when_not_requested() {
        let mut p = connected(vec![]);
        let mut request = WriteRequest::command(peer(), [0x01]);
        request.response_needed = false;

        p.on_write(&request);
        assert!(p.transport().responses().is_empty());
    }

    #[test]
    fn test_failed_response_is_not_fatal() {
        let mut p = connected(vec![]);
        p.transport_mut().fail_responses(TransportError::NotConnected);
        let outcome = p.on_write(&WriteRequest::command(peer(), [0x01]));
        assert_eq!(outcome, AckOutcome::Accepted(Command::Enable));
    }

    // ==================== Descriptor Tests ====================

    #[test]
    fn test_cccd_subscription_tracked() {
        let mut p = peripheral(vec![]);
        p.on_connect(peer());
        assert!(p.on_descriptor_write(&peer(), CCCD_UUID, &[0x02, 0x00], true));
        assert_eq!(p.status().link.unwrap().subscription, Subscription::Indicate);
        assert_eq!(p.transport().responses(), &[(peer(), ATT_SUCCESS)]);
    }

    #[test]
    fn test_descriptor_write_rejections() {
        let mut p = peripheral(vec![]);
        p.on_connect(peer());

        assert!(!p.on_descriptor_write(&peer(), Uuid::from_u128(7), &[0x01, 0x00], false));
        assert!(!p.on_descriptor_write(&peer(), CCCD_UUID, &[0x05], false));
        assert!(!p.on_descriptor_write(&PeerId::from("other"), CCCD_UUID, &[0x01, 0x00], false));
        assert_eq!(p.status().link.unwrap().subscription, Subscription::Disabled);
    }

    // ==================== Handshake Tests ====================

    #[test]
    fn test_valid_first_attempt_delivers_immediately() {
        let mut p = connected(vec![pair("Net", "short123")]);
        p.on_write(&WriteRequest::command(peer(), [0x01]));
        fire_next(&mut p);

        assert_eq!(
            p.listener().events(),
            &[ListenerEvent::Enable, ListenerEvent::Sent("Net".into())]
        );
        assert_eq!(
            p.transport().notifications()[0].1,
            br#"{"ssid":"Net","password":"short123"}"#.to_vec()
        );
        // No further attempts
        assert_eq!(p.retry().timer().scheduled().len(), 1);
        assert_eq!(p.status().retry, RetryState::Idle);
        assert_eq!(p.status().last_outcome, Some(SequenceOutcome::Succeeded));
    }

    #[test]
    fn test_absent_then_valid_uses_two_delays() {
        let mut p = connected(vec![Ok(None), pair("Net2", "longpass1")]);
        p.on_write(&WriteRequest::command(peer(), [0x01]));
        fire_next(&mut p);
        fire_next(&mut p);

        assert_eq!(
            p.retry().timer().delays(),
            vec![Duration::from_secs(3), Duration::from_secs(6)]
        );
        assert_eq!(
            p.listener().events().last(),
            Some(&ListenerEvent::Sent("Net2".into()))
        );
    }

    #[test]
    fn test_exhaustion_reports_once() {
        let mut p = connected(vec![Ok(None), Ok(None), Ok(None)]);
        p.on_write(&WriteRequest::command(peer(), [0x01]));
        for _ in 0..MAX_ATTEMPTS {
            fire_next(&mut p);
        }
        // A late duplicate ticket changes nothing
        fire_next(&mut p);

        let failures: Vec<_> = p
            .listener()
            .events()
            .iter()
            .filter(|e| matches!(e, ListenerEvent::SendFailed(_)))
            .collect();
        assert_eq!(
            failures,
            vec![&ListenerEvent::SendFailed("source never produced a pair".into())]
        );
        assert_eq!(
            p.retry().timer().delays(),
            vec![Duration::from_secs(3), Duration::from_secs(6), Duration::from_secs(9)]
        );
        assert!(p.transport().notifications().is_empty());
    }

    #[test]
    fn test_invalid_pairs_exhaust_with_reason() {
        let mut p = connected(vec![
            pair("Net", "short12"),
            pair("", "longpass1"),
            pair("Net", "pass\0word"),
        ]);
        p.on_write(&WriteRequest::command(peer(), [0x01]));
        for _ in 0..MAX_ATTEMPTS {
            fire_next(&mut p);
        }

        assert_eq!(
            p.status().last_outcome,
            Some(SequenceOutcome::CredentialsUnavailable(
                CredentialFailure::PairAlwaysInvalid(crate::credentials::InvalidReason::ContainsNullByte)
            ))
        );
        assert!(matches!(
            p.listener().events().last(),
            Some(ListenerEvent::SendFailed(reason)) if reason.starts_with("pair was always invalid")
        ));
    }

    #[test]
    fn test_source_errors_count_as_absent() {
        let mut p = connected(vec![
            Err(crate::credentials::SourceError::Platform("busy".into())),
            pair("Net", "longpass1"),
        ]);
        p.on_write(&WriteRequest::command(peer(), [0x01]));
        fire_next(&mut p);
        fire_next(&mut p);
        assert_eq!(
            p.listener().events().last(),
            Some(&ListenerEvent::Sent("Net".into()))
        );
    }

    #[test]
    fn test_disconnect_before_delivery() {
        let mut p = connected(vec![pair("Net", "longpass1")]);
        p.on_write(&WriteRequest::command(peer(), [0x01]));
        p.on_disconnect(&peer());
        fire_next(&mut p);

        assert_eq!(
            p.listener().events().last(),
            Some(&ListenerEvent::SendFailed("no connected device".into()))
        );
        assert_eq!(
            p.status().last_outcome,
            Some(SequenceOutcome::DeliveryFailed(DeliveryError::NoConnectedPeer))
        );
        assert!(p.transport().notifications().is_empty());
    }

    #[test]
    fn test_transport_rejection_reported() {
        let mut p = connected(vec![pair("Net", "longpass1")]);
        p.transport_mut().fail_notify(TransportError::Rejected("no buffers".into()));
        p.on_write(&WriteRequest::command(peer(), [0x01]));
        fire_next(&mut p);

        assert_eq!(
            p.listener().events().last(),
            Some(&ListenerEvent::SendFailed("transport rejected notification".into()))
        );
        // Not re-sent
        assert_eq!(p.retry().timer().scheduled().len(), 1);
    }

    #[test]
    fn test_second_enable_restarts_for_new_peer() {
        let mut p = connected(vec![Ok(None), pair("Net", "longpass1")]);
        p.on_write(&WriteRequest::command(peer(), [0x01]));
        fire_next(&mut p);
        let (stale, _) = *p.retry().timer().scheduled().last().unwrap();

        let other = PeerId::from("AA:BB:CC:DD:EE:02");
        p.on_connect(other.clone());
        p.on_write(&WriteRequest::command(other.clone(), [0x01]));

        // Old sequence's pending ticket is ignored
        p.on_retry_due(stale);
        assert_eq!(
            p.listener().events(),
            &[ListenerEvent::Enable, ListenerEvent::Enable]
        );

        fire_next(&mut p);
        assert_eq!(p.transport().notifications()[0].0, other);
        assert_eq!(
            p.retry().timer().delays(),
            vec![Duration::from_secs(3), Duration::from_secs(6), Duration::from_secs(3)]
        );
    }

    #[test]
    fn test_long_ssid_still_delivered() {
        let long = "N".repeat(40);
        let mut p = connected(vec![pair(&long, "longpass1")]);
        p.on_write(&WriteRequest::command(peer(), [0x01]));
        fire_next(&mut p);
        assert_eq!(p.listener().events().last(), Some(&ListenerEvent::Sent(long)));
    }

    impl TestPeripheral {
        fn transport_mut(&mut self) -> &mut RecordingTransport {
            &mut self.transport
        }
    }
}
