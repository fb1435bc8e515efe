//! Subcommand implementations.

pub mod collection;
pub mod errors;

pub use collection::CollectionAction;

use thiserror::Error;
use yoraa_store::StoreError;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to render output: {0}")]
    Json(#[from] serde_json::Error),
}
