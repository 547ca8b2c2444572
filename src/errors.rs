use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContentSyncError {
    #[error("connection error: {0}")]
    ConnectionError(String),
    #[error("query error: {0}")]
    QueryError(String),
    #[error("config error: {0}")]
    ConfigError(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ContentSyncError {
    pub fn connection<T: Into<String>>(msg: T) -> Self {
        ContentSyncError::ConnectionError(msg.into())
    }

    pub fn query<T: Into<String>>(msg: T) -> Self {
        ContentSyncError::QueryError(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        ContentSyncError::ConfigError(msg.into())
    }

    pub fn invalid_input<T: Into<String>>(msg: T) -> Self {
        ContentSyncError::InvalidInput(msg.into())
    }
}
