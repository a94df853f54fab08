//! Message transport between the gatekeeper and its callers.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use crate::types::Envelope;

/// Delivers envelopes out of the gatekeeper.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Deliver a settled envelope back to its origin.
    async fn send(&self, envelope: Envelope);

    /// Forward an envelope to the extension's own views (e.g. the approval
    /// prompt showing which origin is asking).
    async fn broadcast(&self, envelope: Envelope);
}

/// Outbound message produced by [`ChannelTransport`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Response(Envelope),
    Broadcast(Envelope),
}

/// Transport writing every outbound envelope to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        (Self { outbound }, rx)
    }
}

#[async_trait]
impl MessageTransport for ChannelTransport {
    async fn send(&self, envelope: Envelope) {
        if self.outbound.send(Outbound::Response(envelope)).is_err() {
            warn!("transport receiver dropped, response lost");
        }
    }

    async fn broadcast(&self, envelope: Envelope) {
        if self.outbound.send(Outbound::Broadcast(envelope)).is_err() {
            warn!("transport receiver dropped, broadcast lost");
        }
    }
}
