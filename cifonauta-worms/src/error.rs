//! WoRMS client errors

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WormsError>;

#[derive(Debug, Error)]
pub enum WormsError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] cifonauta_common::Error),
}

impl WormsError {
    /// Connection failures and server-side errors are worth another attempt
    pub fn is_transient(&self) -> bool {
        match self {
            WormsError::Network(_) => true,
            WormsError::Api(status, _) => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
