//! Serialized event loop around a [`Peripheral`].
//!
//! Platform callbacks (which may fire on the radio stack's own task) never
//! touch peripheral state directly. They post a [`LinkEvent`] through a
//! [`PeripheralHandle`]; the loop applies events and fired retry tickets one
//! at a time, so retry delays never block the command channel.

use crate::config::PeripheralConfig;
use crate::credentials::CredentialSource;
use crate::link::{LinkTransport, PeerId, DEFAULT_ATT_MTU};
use crate::peripheral::{Peripheral, PeripheralListener, WriteRequest};
use crate::protocol::{AckOutcome, ATT_INSUFFICIENT_RESOURCES, ATT_UNLIKELY_ERROR};
use crate::retry::{RetryScheduler, RetryTicket, TokioRetryTimer};
use log::{debug, info, warn};
use std::fmt;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Something the radio stack reported.
#[derive(Debug)]
pub enum LinkEvent {
    Connected(PeerId),
    Disconnected(PeerId),
    /// Write on a characteristic. `reply` receives the outcome once handled.
    Write {
        request: WriteRequest,
        reply: Option<oneshot::Sender<AckOutcome>>,
    },
    DescriptorWrite {
        peer: PeerId,
        descriptor: Uuid,
        value: Vec<u8>,
        response_needed: bool,
    },
    MtuChanged {
        peer: PeerId,
        mtu: u16,
    },
}

/// The event loop is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeClosed;

impl fmt::Display for RuntimeClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peripheral event loop has stopped")
    }
}

impl std::error::Error for RuntimeClosed {}

/// A non-blocking forward did not reach the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardError {
    /// The event queue is full; the event was dropped.
    QueueFull,
    /// The loop has stopped.
    Closed,
}

impl ForwardError {
    /// ATT status to reject a write with.
    pub fn att_code(&self) -> u8 {
        match self {
            Self::QueueFull => ATT_INSUFFICIENT_RESOURCES,
            Self::Closed => ATT_UNLIKELY_ERROR,
        }
    }
}

impl fmt::Display for ForwardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull => write!(f, "peripheral event queue full"),
            Self::Closed => write!(f, "peripheral event loop has stopped"),
        }
    }
}

impl std::error::Error for ForwardError {}

/// Cloneable sender side of the event loop.
#[derive(Debug, Clone)]
pub struct PeripheralHandle {
    events: mpsc::Sender<LinkEvent>,
    shutdown: CancellationToken,
}

impl PeripheralHandle {
    pub async fn send(&self, event: LinkEvent) -> Result<(), RuntimeClosed> {
        self.events.send(event).await.map_err(|_| RuntimeClosed)
    }

    pub async fn connect(&self, peer: PeerId) -> Result<(), RuntimeClosed> {
        self.send(LinkEvent::Connected(peer)).await
    }

    pub async fn disconnect(&self, peer: PeerId) -> Result<(), RuntimeClosed> {
        self.send(LinkEvent::Disconnected(peer)).await
    }

    pub async fn mtu_changed(&self, peer: PeerId, mtu: u16) -> Result<(), RuntimeClosed> {
        self.send(LinkEvent::MtuChanged { peer, mtu }).await
    }

    pub async fn descriptor_write(
        &self,
        peer: PeerId,
        descriptor: Uuid,
        value: Vec<u8>,
    ) -> Result<(), RuntimeClosed> {
        self.send(LinkEvent::DescriptorWrite {
            peer,
            descriptor,
            value,
            response_needed: false,
        })
        .await
    }

    /// Submit a write and wait for the loop's verdict.
    pub async fn write(&self, request: WriteRequest) -> Result<AckOutcome, RuntimeClosed> {
        let (tx, rx) = oneshot::channel();
        self.send(LinkEvent::Write {
            request,
            reply: Some(tx),
        })
        .await?;
        rx.await.map_err(|_| RuntimeClosed)
    }

    /// Queue an event without waiting. For callbacks on the radio stack's own
    /// task (e.g. the NimBLE host), which must never wait on the loop.
    pub fn try_send(&self, event: LinkEvent) -> Result<(), ForwardError> {
        self.events.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ForwardError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ForwardError::Closed,
        })
    }

    /// Connection plus its current ATT MTU. The MTU event is skipped while
    /// it is still the default.
    pub fn try_connect(&self, peer: PeerId, mtu: u16) -> Result<(), ForwardError> {
        self.try_send(LinkEvent::Connected(peer.clone()))?;
        if mtu != DEFAULT_ATT_MTU {
            self.try_send(LinkEvent::MtuChanged { peer, mtu })?;
        }
        Ok(())
    }

    /// Queue a write and answer it immediately from
    /// [`WriteRequest::classify`]; the loop applies it afterwards.
    pub fn try_write(&self, request: WriteRequest) -> Result<AckOutcome, ForwardError> {
        let outcome = request.classify();
        self.try_send(LinkEvent::Write {
            request,
            reply: None,
        })?;
        Ok(outcome)
    }

    /// Ask the loop to stop. Pending retries are abandoned.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Receiving side of [`event_channel`], consumed by [`PeripheralRuntime::new`].
#[derive(Debug)]
pub struct EventQueue {
    events: mpsc::Receiver<LinkEvent>,
    shutdown: CancellationToken,
}

/// Create the link event channel.
///
/// Split from the runtime so platform glue can be wired to the handle before
/// the transport it provides exists.
pub fn event_channel(depth: usize) -> (PeripheralHandle, EventQueue) {
    let (tx, rx) = mpsc::channel(depth);
    let shutdown = CancellationToken::new();
    (
        PeripheralHandle {
            events: tx,
            shutdown: shutdown.clone(),
        },
        EventQueue {
            events: rx,
            shutdown,
        },
    )
}

/// Owns the peripheral and the channels that feed it.
pub struct PeripheralRuntime<T, L> {
    peripheral: Peripheral<T, TokioRetryTimer, L>,
    events: mpsc::Receiver<LinkEvent>,
    tickets: mpsc::UnboundedReceiver<RetryTicket>,
    shutdown: CancellationToken,
}

impl<T, L> PeripheralRuntime<T, L>
where
    T: LinkTransport,
    L: PeripheralListener,
{
    pub fn new(
        config: &PeripheralConfig,
        queue: EventQueue,
        transport: T,
        source: CredentialSource,
        listener: L,
    ) -> Self {
        let (timer, tickets) = TokioRetryTimer::new();
        let retry = RetryScheduler::new(config.retry, timer);
        Self {
            peripheral: Peripheral::new(transport, retry, source, listener),
            events: queue.events,
            tickets,
            shutdown: queue.shutdown,
        }
    }

    /// Process events until shutdown or until every handle is dropped.
    /// Hands the peripheral back for inspection.
    pub async fn run(mut self) -> Peripheral<T, TokioRetryTimer, L> {
        info!("Peripheral event loop running");
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!("Peripheral event loop shutting down");
                    break;
                }

                event = self.events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => {
                        info!("All peripheral handles dropped, stopping");
                        break;
                    }
                },

                Some(ticket) = self.tickets.recv() => {
                    self.peripheral.on_retry_due(ticket);
                }
            }
        }
        self.peripheral
    }

    fn handle(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Connected(peer) => self.peripheral.on_connect(peer),
            LinkEvent::Disconnected(peer) => self.peripheral.on_disconnect(&peer),
            LinkEvent::Write { request, reply } => {
                let outcome = self.peripheral.on_write(&request);
                if let Some(reply) = reply {
                    if reply.send(outcome).is_err() {
                        debug!("Write from {} answered after caller left", request.peer);
                    }
                }
            }
            LinkEvent::DescriptorWrite {
                peer,
                descriptor,
                value,
                response_needed,
            } => {
                if !self
                    .peripheral
                    .on_descriptor_write(&peer, descriptor, &value, response_needed)
                {
                    warn!("Descriptor write from {} not applied", peer);
                }
            }
            LinkEvent::MtuChanged { peer, mtu } => self.peripheral.on_mtu_changed(&peer, mtu),
        }
    }
}
