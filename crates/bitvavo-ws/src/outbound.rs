//! Outbound control message channel.
//!
//! Every producer (registries, the authenticator) enqueues through an
//! [`OutboundSender`]. Exactly one writer drains the [`OutboundReceiver`]
//! and writes to the socket, so messages reach the venue in enqueue order.
//!
//! The channel is unbounded. Enqueueing never blocks, which lets the
//! registries send while holding their lock.

use crate::error::{WsError, WsResult};
use crate::message::ControlMessage;
use tokio::sync::mpsc;
use tracing::debug;

/// Create a connected sender/receiver pair.
pub fn outbound_channel() -> (OutboundSender, OutboundReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (OutboundSender { tx }, OutboundReceiver { rx })
}

/// Cloneable producer side.
#[derive(Debug, Clone)]
pub struct OutboundSender {
    tx: mpsc::UnboundedSender<ControlMessage>,
}

impl OutboundSender {
    /// Enqueue a control message.
    ///
    /// Fails with [`WsError::ChannelClosed`] once the writer is gone.
    pub fn send(&self, msg: ControlMessage) -> WsResult<()> {
        let action = msg.action;
        self.tx.send(msg).map_err(|_| {
            debug!(%action, "Outbound channel closed, control message discarded");
            WsError::ChannelClosed
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Single consumer side, owned by the writer.
#[derive(Debug)]
pub struct OutboundReceiver {
    rx: mpsc::UnboundedReceiver<ControlMessage>,
}

impl OutboundReceiver {
    pub async fn recv(&mut self) -> Option<ControlMessage> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ControlMessage> {
        self.rx.try_recv().ok()
    }

    /// Discard everything queued so far. Returns the number of messages dropped.
    pub fn drain(&mut self) -> usize {
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }

    /// Stop accepting new messages. Queued messages can still be received.
    pub fn close(&mut self) {
        self.rx.close();
    }
}
