//! Filesystem-backed durable state for jobs, their event logs, and the
//! pickup queue.
//!
//! There is no database: a job's `record.json` is the single source of
//! truth, `events.jsonl` is its append-only history, and the `pending/` /
//! `processing/` directories under the queue root form a FIFO work queue
//! whose only synchronization primitive is `rename()`.

pub mod config;
pub mod error;
pub mod event_log;
pub mod fslock;
pub mod job_store;
pub mod models;
pub mod queue;

pub use config::StateRootConfig;
pub use error::{StoreError, StoreResult};
