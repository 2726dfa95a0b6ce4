use thiserror::Error;

#[derive(Error, Debug)]
pub enum CovmapError {
    #[error("Invalid coverage JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid source map: {0}")]
    InvalidSourceMap(String),

    #[error("Unknown source map resolution mode: '{0}'. Supported: embedded, adjacent, dir, auto")]
    UnknownMapMode(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CovmapError>;
