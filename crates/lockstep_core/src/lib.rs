//! # lockstep core
//!
//! An in-memory store of numeric records processed by fixed-shape,
//! three-step transactions: read one record, then write two others, under
//! a fairness-preserving reader/writer lock per record, cooperative
//! deadlock avoidance, and a global commit sequencer that yields a
//! strictly ordered audit log.
//!
//! This crate provides:
//! - [`FairRwLock`] — arrival-ordered shared/exclusive locking
//! - [`Record`] — an overflow-checked numeric cell under its own lock
//! - [`Container`] — transaction building, commit sequencing, and
//!   deadlock detection over per-record wait lists
//!
//! Durability and general transaction schedules are out of scope: the
//! store is memory-only and the transaction shape is fixed.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod container;
pub mod deadlock;
pub mod error;
pub mod lock;
pub mod operation;
pub mod record;
pub mod types;

pub use config::ContainerConfig;
pub use container::{CommitInfo, Container};
pub use deadlock::DeadlockDetector;
pub use error::{EngineError, EngineResult};
pub use lock::FairRwLock;
pub use operation::{OpKind, Operation};
pub use record::Record;
pub use types::{BuildId, CommitOrder, OpId, WorkerId};

/// Crate version, re-exported for tooling.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
