//! Re-observation request channel

use crate::events::ObservationRequest;
use crate::ports::ReobservationSink;
use tokio::sync::mpsc;

/// Forwards re-observation requests to the watchers over a bounded queue.
/// Never blocks; a full queue is reported to the caller.
#[derive(Clone)]
pub struct ChannelReobservationSink {
    tx: mpsc::Sender<ObservationRequest>,
}

impl ChannelReobservationSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ObservationRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl ReobservationSink for ChannelReobservationSink {
    fn request_reobservation(&self, request: ObservationRequest) -> Result<(), String> {
        self.tx
            .try_send(request)
            .map_err(|e| format!("failed to queue observation request: {e}"))
    }
}
