//! Shared protocol types for md-web
//!
//! Defines the message vocabulary exchanged between the host (document
//! authority) and the view (editor widget), the msgpack envelope codec, and the
//! channel/dispatcher pair both contexts are built on.

pub mod channel;
pub mod dispatch;
pub mod envelope;
pub mod gate;
pub mod messages;
pub mod ready;

pub use channel::{link_pair, Channel, ChannelError, Link};
pub use dispatch::{Dispatched, DispatchError, Dispatcher, DropReason};
pub use envelope::{Envelope, ProtocolError};
pub use gate::{IntervalGate, RateGate, TokenBucket};
pub use messages::*;
pub use ready::{Readiness, ReadySignal};
