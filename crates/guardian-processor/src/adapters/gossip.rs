//! Bounded channel gossip adapter

use crate::domain::TransportError;
use crate::ports::GossipTransport;
use tokio::sync::mpsc;

/// Pushes encoded gossip onto a bounded queue drained by the network layer.
#[derive(Clone)]
pub struct ChannelGossip {
    tx: mpsc::Sender<Vec<u8>>,
}

impl ChannelGossip {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl GossipTransport for ChannelGossip {
    fn send(&self, message: Vec<u8>) -> Result<(), TransportError> {
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }
}
