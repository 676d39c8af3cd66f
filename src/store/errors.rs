//! # Store Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error during {operation}: {message}")]
    Database { operation: String, message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Record serialization error: {message}")]
    Serialization { message: String },

    #[error("Store unavailable: {message}")]
    Unavailable { message: String },
}

impl StoreError {
    /// Create a database error
    pub fn database(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Database {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn job_not_found(job_id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "job",
            id: job_id.into(),
        }
    }

    pub fn task_not_found(task_id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "task",
            id: task_id.into(),
        }
    }

    /// Create an unavailable error (store cannot be reached at all)
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => StoreError::database("query", db_err.to_string()),
            sqlx::Error::PoolTimedOut => StoreError::unavailable("database pool timed out"),
            sqlx::Error::PoolClosed => StoreError::unavailable("database pool is closed"),
            other => StoreError::database("connection", other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization {
            message: err.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
