//! # SocialHands Work Queue
//!
//! Job lifecycle for the agent control plane.
//!
//! ## Features
//!
//! - Durable job store (SQLite) with an atomic claim
//! - Dispatcher gate consulted on every claim
//! - Handler registry keyed by job type
//! - Worker loop with transient retry and terminal failure

pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod job;
pub mod queue;
pub mod store;
pub mod store_sqlite;
pub mod worker;

pub use dispatcher::Dispatcher;
pub use error::QueueError;
pub use handler::{HandlerError, HandlerRegistry, JobContext, JobHandler};
pub use job::{
    ErrorKind, Job, JobCounts, JobError, JobFilter, JobOutcome, JobResult, JobStatus, SlotRef,
    job_types,
};
pub use queue::JobQueue;
pub use store::{JobStore, MemoryJobStore};
pub use store_sqlite::SqliteJobStore;
pub use worker::{JobListener, RetryPolicy, Worker};
