use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Version conflict on '{key}' in collection '{collection}'")]
    VersionConflict { collection: String, key: String },

    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Documents not found: {}", keys.join(", "))]
    MissingDocuments { keys: Vec<String> },

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Cluster error ({status}): {reason}")]
    Cluster { status: u16, reason: String },

    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
