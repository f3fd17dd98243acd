//! The team engine: scheduling, claim/lease bookkeeping, mailbox delivery,
//! and role execution for one job's run, plus the dispatcher that pulls
//! jobs off the work queue and drives them to completion.

pub mod claim;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod executor;
pub mod mailbox;
pub mod plan;
pub mod scheduler;

pub use config::EngineConfig;
pub use dispatcher::dispatch_one;
pub use engine::EngineOutcome;
pub use error::{EngineError, EngineResult};
