//! Command line application
//!
//! Wires the library into commands that read and write the on-disk storage.

mod commands;
mod layers;
pub mod logging;
mod settings;
pub mod state;
pub mod storage;

pub use layers::{ClickAction, JsonLayerAdapter, Layer};
pub use settings::{
    AddArgs, CategoryCommand, ClusterArgs, Command, MeasureArgs, ReplayArgs, Settings,
};
pub use state::MapState;

use storage::{StorageError, default_storage_backend};
use svampkarta_lib::SvampError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Svamp(#[from] SvampError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type AppResult<T> = Result<T, AppError>;

/// Run one command against the configured storage, printing to stdout
pub async fn run(settings: Settings) -> AppResult<()> {
    let backend = default_storage_backend(settings.storage)?;
    let mut out = std::io::stdout().lock();
    commands::execute(settings.command, backend.as_ref(), &mut out).await
}
