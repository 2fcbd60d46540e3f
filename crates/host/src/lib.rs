// md-web-host library
// Document authority for md-web editor views

// Session loop and command table
pub mod commands;
pub mod runtime;
pub mod session;

// Document model and storage
pub mod bridge;
pub mod persist;
pub mod upload;

// IDE services
pub mod services;

// Configuration
pub mod config;

// WebSocket transport
pub mod ws;

pub use bridge::{DocumentBridge, EditOutcome, ExternalOrigin};
pub use config::Config;
pub use persist::{DocumentStore, FsDocumentStore, PersistPolicy, Snapshot, StoreError};
pub use runtime::{load_session, spawn_session, Host, HostDeps, HostEvent, HostHandle, HostOptions, SessionStatus};
pub use services::{HostServices, TracingServices};
pub use session::{Session, SessionError, SessionManager};
pub use upload::{AttachmentStore, FsAttachmentStore};
