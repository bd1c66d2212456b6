//! Bulk account synchronization.
//!
//! This module moves account records between a local delimited-text file
//! and the remote record store:
//!
//! - **Export**: remote → file, one result chunk at a time
//! - **Upsert**: file → remote, one bulk job per planned batch
//! - **Create**: file → remote, one create call per record
//! - **Delete-all**: remove every remote record, attempting each one
//!
//! # Pipeline
//!
//! ```text
//! codec (decode) → validate → model (parse_row) → planner → engine → report
//! ```
//!
//! # Example
//!
//! ```ignore
//! use acctsync::sync::{Reporter, SyncEngine};
//!
//! let outcome = SyncEngine::new(&store, &settings, Reporter::new(std::io::stdout()))
//!     .upsert(Path::new("accounts.csv"))
//!     .await?;
//! println!("{} failed", outcome.summary.failed);
//! ```

pub mod codec;
mod engine;
mod file;
mod planner;
mod report;
mod types;

pub use engine::{RunOutcome, SyncEngine};
pub use file::ScopedOutput;
pub use planner::{BatchPlanner, DEFAULT_BATCH_SIZE, plan};
pub use report::{BatchLine, Reporter, RunSummary};
pub use types::{Batch, BatchSummary, FailureDetail, RunState, SyncRun, WorkflowKind};
