//! # Outbox Engine
//!
//! Offline mutation queue and reconciliation engine.
//!
//! This crate provides:
//! - A durable, ordered operation log of pending mutations
//! - A connectivity monitor fed by the host platform
//! - A single-flight reconciliation engine with a bounded retry ceiling
//! - A drain scheduler (timer, online transitions, enqueue wake-ups)
//! - A pending-count observer for sync-status indicators
//! - A remote API abstraction with an HTTP adapter
//! - An offline repository for optimistic local writes
//!
//! ## Architecture
//!
//! A user action writes the domain record to the durable store and appends
//! a [`MutationRecord`] to the [`OperationLog`]. Every trigger converges on
//! [`Reconciler::drain`], which snapshots the log, replays the snapshot in
//! order through a [`RemoteApi`], and commits the outcome in one write.
//!
//! ## Key Invariants
//!
//! - At most one drain pass runs at a time
//! - Replay order equals enqueue order
//! - A record is removed exactly once: on success or at the retry ceiling
//! - Drops at the ceiling are always reported through [`ReconcileEvent::Dropped`]
//! - Delivery is at-least-once; creates carry an idempotency key the
//!   server must deduplicate on

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connectivity;
mod error;
mod http;
mod observer;
mod oplog;
mod reconciler;
mod record;
mod remote;
mod repository;
mod scheduler;
mod service;

pub use config::{OutboxConfig, DEFAULT_PARTITION, LOG_KEY};
pub use connectivity::ConnectivityMonitor;
pub use error::{OutboxError, OutboxResult, RemoteError};
pub use http::{HttpClient, HttpRemote, HttpRemoteConfig, HttpRequest, HttpResponse, IDEMPOTENCY_HEADER};
pub use observer::PendingCountObserver;
pub use oplog::{read_persisted, LoadReport, OperationLog};
pub use reconciler::{
    DrainOutcome, DrainReport, DrainState, DroppedRecord, ReconcileEvent, ReconcileStats, Reconciler,
    SkipReason,
};
pub use record::{decode_log, encode_log, DecodedLog, MutationKind, MutationRecord, OperationId};
pub use remote::{MockRemote, MockResponse, RemoteApi, RemoteRequest};
pub use repository::OfflineRepository;
pub use scheduler::{Scheduler, SchedulerHandle, Trigger};
pub use service::Outbox;
