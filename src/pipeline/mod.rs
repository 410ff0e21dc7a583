//! The staged refresh pipeline: adaptive fetching, bounded fan-out, staged
//! writes, and atomic-per-dataset promotion.

pub mod batch;
pub mod fetcher;
pub mod ladders;
pub mod runner;
pub mod stages;

pub use runner::{PipelineConfig, PipelineRunner, RunReport, Scope};

use crate::data::staging::StagingWriteError;
use crate::data::swap::SwapError;

/// Errors that abort a refresh run. Per-target and per-attempt fetch errors
/// never reach this level; they are absorbed by the ladder and the batch
/// orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("a refresh run is already in progress")]
    LockContention,
    #[error("update lock operation failed")]
    Lock(#[source] sqlx::Error),
    #[error(transparent)]
    StagingWrite(#[from] StagingWriteError),
    #[error(transparent)]
    Swap(#[from] SwapError),
    #[error("staging maintenance query failed")]
    StageQuery(#[source] sqlx::Error),
}
