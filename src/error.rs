use thiserror::Error;

#[derive(Error, Debug)]
pub enum SptsError {
    #[error("Mapping load error: {0}")]
    MappingLoad(String),

    #[error("Oracle call error: {0}")]
    Oracle(String),

    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<rusqlite::Error> for SptsError {
    fn from(err: rusqlite::Error) -> Self {
        SptsError::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SptsError>;
