//! Bidirectional message channel between host and view
//!
//! Each side owns a [`Channel`] for outbound traffic and the receiving half of
//! a [`Link`] for inbound frames. Outbound messages are held in an ordered
//! queue until the peer signals readiness; the `init`/`open` handshake is the
//! only traffic that bypasses the queue.

use serde::Serialize;
use std::collections::VecDeque;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::envelope::{Envelope, ProtocolError};
use crate::messages::{CommandName, Side};
use crate::ready::{Readiness, ReadySignal};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("peer link closed")]
    Closed,
    #[error("{name} cannot be sent from the {side}")]
    WrongDirection { name: String, side: Side },
}

/// One end of a frame pipe
#[derive(Debug)]
pub struct Link {
    pub tx: mpsc::UnboundedSender<Vec<u8>>,
    pub rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Two connected ends: `(host, view)`
pub fn link_pair() -> (Link, Link) {
    let (host_tx, view_rx) = mpsc::unbounded_channel();
    let (view_tx, host_rx) = mpsc::unbounded_channel();
    (
        Link {
            tx: host_tx,
            rx: host_rx,
        },
        Link {
            tx: view_tx,
            rx: view_rx,
        },
    )
}

/// Outbound half of one side of the conversation
#[derive(Debug)]
pub struct Channel {
    side: Side,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    pending: VecDeque<(CommandName, Vec<u8>)>,
    peer: Readiness,
}

impl Channel {
    pub fn new(side: Side, tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self {
            side,
            tx,
            pending: VecDeque::new(),
            peer: Readiness::new(),
        }
    }

    pub const fn side(&self) -> Side {
        self.side
    }

    /// Send a typed payload under `name`
    pub fn emit<P: Serialize + ?Sized>(&mut self, name: CommandName, payload: &P) -> Result<(), ChannelError> {
        self.emit_envelope(Envelope::new(name, payload)?)
    }

    pub fn emit_envelope(&mut self, envelope: Envelope) -> Result<(), ChannelError> {
        let frame = envelope.encode()?;
        self.send_frame(envelope.name, frame)
    }

    /// Deliver an encoded frame, or queue it if the peer is not ready
    pub fn send_frame(&mut self, name: CommandName, frame: Vec<u8>) -> Result<(), ChannelError> {
        if let Some(sender) = name.sender() {
            if sender != self.side {
                return Err(ChannelError::WrongDirection {
                    name: name.to_string(),
                    side: self.side,
                });
            }
        }

        if name.is_handshake() || self.peer.is_ready() {
            trace!(side = %self.side, command = %name, "send");
            self.tx.send(frame).map_err(|_| ChannelError::Closed)
        } else {
            trace!(side = %self.side, command = %name, queued = self.pending.len() + 1, "buffer");
            self.pending.push_back((name, frame));
            Ok(())
        }
    }

    /// Record that the peer can accept traffic and flush the queue in order
    ///
    /// Returns the number of frames flushed. Calling this again is harmless.
    pub fn mark_peer_ready(&mut self) -> Result<usize, ChannelError> {
        if self.peer.mark() {
            debug!(side = %self.side, pending = self.pending.len(), "peer ready");
        }

        let mut flushed = 0;
        while let Some((name, frame)) = self.pending.pop_front() {
            if self.tx.send(frame).is_err() {
                // Drop the rest; the peer is gone
                self.pending.clear();
                return Err(ChannelError::Closed);
            }
            trace!(side = %self.side, command = %name, "flush");
            flushed += 1;
        }
        Ok(flushed)
    }

    pub fn peer_ready(&self) -> bool {
        self.peer.is_ready()
    }

    pub fn readiness(&self) -> ReadySignal {
        self.peer.signal()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
