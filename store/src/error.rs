use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no row found for {entity} {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Other(String),
}
