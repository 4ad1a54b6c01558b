//! # roomsync - Collaborative Workspace Sync Client
//!
//! roomsync keeps a local directory continuously synchronized with a
//! remote collaborative workspace. It watches local filesystem events,
//! turns content changes into compact patches sent over a persistent TLS
//! connection, and applies patches received from the peer back onto local
//! files, suppressing the echo of its own writes.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use roomsync::connection::Connection;
//! use roomsync::sync::{SyncClient, SyncOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), roomsync::SyncError> {
//!     let conn = Connection::new(
//!         "example.com".into(), 3448,
//!         "alice".into(), "secret".into(),
//!         "project".into(), "alice".into(),
//!     );
//!     SyncClient::new("./project".into(), conn, SyncOptions::default())
//!         .run()
//!         .await
//! }
//! ```

pub mod api;
pub mod buffer;
pub mod config;
pub mod connection;
pub mod error;
pub mod hooks;
pub mod ignore;
pub mod logging;
pub mod patch;
pub mod protocol;
pub mod sync;
pub mod util;
pub mod watcher;

// Re-export commonly used types
pub use buffer::{Buffer, BufferStore, Encoding};
pub use connection::{Backoff, ConnState, Connection};
pub use error::{ApiError, ConfigError, ConnectionError, PatchError, ProtocolError, SyncError};
pub use patch::PatchEngine;
pub use sync::{reconcile_plan, ConflictPolicy, ReconcilePlan, SyncClient, SyncOptions};

// vim: ts=4
