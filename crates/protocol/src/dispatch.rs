//! Command dispatch table
//!
//! Maps command names to handlers for one receiving side. Every failure mode
//! (undecodable frame, unknown name, wrong direction, bad payload, handler
//! error) is logged and the message dropped; nothing here is fatal to the
//! caller's loop.

use rmpv::Value;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::envelope::Envelope;
use crate::messages::{CommandName, Side};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("bad payload: {0}")]
    Payload(String),
    #[error("handler failed: {0:#}")]
    Handler(anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    Undecodable,
    Unknown,
    NotHandledHere,
    NoHandler,
    BadPayload,
    HandlerFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    Handled(CommandName),
    Dropped(DropReason),
}

impl Dispatched {
    pub const fn is_handled(&self) -> bool {
        matches!(self, Self::Handled(_))
    }
}

type Handler<C> = Box<dyn Fn(&mut C, Value) -> Result<(), DispatchError> + Send + Sync>;

pub struct Dispatcher<C> {
    side: Side,
    handlers: HashMap<CommandName, Handler<C>>,
}

impl<C: 'static> Dispatcher<C> {
    /// Create an empty table for messages arriving at `side`
    pub fn new(side: Side) -> Self {
        Self {
            side,
            handlers: HashMap::new(),
        }
    }

    /// Register a handler whose payload deserializes into `P`
    #[must_use]
    pub fn on<P, F>(self, name: CommandName, handler: F) -> Self
    where
        P: DeserializeOwned + 'static,
        F: Fn(&mut C, P) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_value(name, move |ctx, value| {
            let payload: P = rmpv::ext::from_value(value).map_err(|e| DispatchError::Payload(e.to_string()))?;
            handler(ctx, payload).map_err(DispatchError::Handler)
        })
    }

    /// Register a handler that takes the raw payload value
    #[must_use]
    pub fn on_value<F>(mut self, name: CommandName, handler: F) -> Self
    where
        F: Fn(&mut C, Value) -> Result<(), DispatchError> + Send + Sync + 'static,
    {
        self.handlers.insert(name, Box::new(handler));
        self
    }

    pub fn handles(&self, name: &CommandName) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn dispatch(&self, ctx: &mut C, frame: &[u8]) -> Dispatched {
        match Envelope::decode(frame) {
            Ok(envelope) => self.dispatch_envelope(ctx, envelope),
            Err(e) => {
                warn!(side = %self.side, "dropping frame: {}", e);
                Dispatched::Dropped(DropReason::Undecodable)
            }
        }
    }

    pub fn dispatch_envelope(&self, ctx: &mut C, envelope: Envelope) -> Dispatched {
        let Envelope { name, payload } = envelope;

        match name.sender() {
            None => {
                warn!(side = %self.side, command = %name, "unknown command");
                return Dispatched::Dropped(DropReason::Unknown);
            }
            Some(sender) if sender == self.side => {
                warn!(side = %self.side, command = %name, "command not accepted on this side");
                return Dispatched::Dropped(DropReason::NotHandledHere);
            }
            Some(_) => {}
        }

        let Some(handler) = self.handlers.get(&name) else {
            debug!(side = %self.side, command = %name, "no handler registered");
            return Dispatched::Dropped(DropReason::NoHandler);
        };

        match handler(ctx, payload) {
            Ok(()) => Dispatched::Handled(name),
            Err(DispatchError::Payload(e)) => {
                warn!(side = %self.side, command = %name, "bad payload: {}", e);
                Dispatched::Dropped(DropReason::BadPayload)
            }
            Err(e) => {
                warn!(side = %self.side, command = %name, "{}", e);
                Dispatched::Dropped(DropReason::HandlerFailed)
            }
        }
    }
}

impl<C> std::fmt::Debug for Dispatcher<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("side", &self.side)
            .field("commands", &self.handlers.len())
            .finish()
    }
}
