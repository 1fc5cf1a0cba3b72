use std::io;

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("stream error: {0}")]
    Stream(String),
    #[error("failed to parse analysis payload: {0}")]
    Parse(String),
    #[error("{0}")]
    Config(String),
    #[error(transparent)]
    Tauri(#[from] tauri::Error),
}
