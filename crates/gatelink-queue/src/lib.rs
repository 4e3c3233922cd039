//! Persisted command queue for bridge-attached access controllers.
//!
//! This crate owns the lifecycle of every command destined for a controller:
//! creation through the coalescing dispatcher, draining by the (external)
//! bridge transport, terminal outcomes reported back, and the periodic
//! timeout sweep and garbage collection that bound queue growth.
//!
//! # Architecture
//!
//! - [`Database`] — SQLite connection pool with automatic migrations
//! - [`Command`] — the queued unit of work and its state machine
//! - [`CommandRepository`] — data access trait over the `commands` table
//! - [`CommandDispatcher`] — the single entry point for new command intents;
//!   applies the per-code coalescing policy and the rights merge
//! - [`transaction`] — transaction-scoped operations for the atomic
//!   read-merge-write sequence
//!
//! # Write discipline
//!
//! The command store is the only shared mutable resource. All mutation goes
//! through the dispatcher, the transport outcome callback, or the sweeper —
//! and every submission path serializes per destination key, so the merge
//! algorithm never sees a concurrent writer for the same (controller, card).
//!
//! # Example
//!
//! ```no_run
//! use gatelink_core::{BridgeId, ControllerId, ControllerRef};
//! use gatelink_queue::{CommandDispatcher, Database, DatabaseConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(DatabaseConfig::new("gatelink.db")).await?;
//! let dispatcher = CommandDispatcher::new(db);
//!
//! let ctrl = ControllerRef {
//!     bridge_id: BridgeId::new(1),
//!     controller_id: ControllerId::new(4),
//!     name: "Lobby".to_string(),
//!     relay_mode: None,
//! };
//!
//! // Queue a clock sync; a duplicate before drain is a no-op.
//! let cmd = dispatcher.synchronize_clock(&ctrl).await?;
//! println!("queued {}", cmd.name());
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod locks;
pub mod models;
pub mod repository;
pub mod transaction;

pub use connection::{Database, DatabaseConfig};
pub use dispatcher::{CommandDispatcher, StoreConfig};
pub use error::{QueueError, QueueResult};
pub use locks::{KeyedLocks, QueueKey};
pub use models::{Command, CommandStatus, NewCommand};
pub use repository::{CommandRepository, SqliteCommandRepository};
