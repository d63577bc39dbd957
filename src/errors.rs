use thiserror::Error;

/// Failures raised by a document store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("driver error: {0}")]
    Driver(#[from] mongodb::error::Error),

    #[error("BSON decode error: {0}")]
    Decode(#[from] bson::de::Error),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("connection closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("Query failed: {0}")]
    QueryFailed(#[source] StoreError),

    #[error("Invalid review: {0}")]
    InvalidReview(String),

    #[error("Review already exists for user {user_id} and book {book_id}")]
    DuplicateReview { user_id: String, book_id: String },

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for CatalogError {
    fn from(e: StoreError) -> Self {
        Self::QueryFailed(e)
    }
}

impl From<toml::de::Error> for CatalogError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

pub type Result<T, E = CatalogError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn store_errors_become_query_failed_with_source() {
        let err: CatalogError = StoreError::InvalidQuery("bad $project".into()).into();
        assert!(matches!(err, CatalogError::QueryFailed(StoreError::InvalidQuery(_))));
        let src = err.source().map(ToString::to_string).unwrap_or_default();
        assert_eq!(src, "invalid query: bad $project");
    }

    #[test]
    fn duplicate_review_message_names_both_ids() {
        let err = CatalogError::DuplicateReview { user_id: "u1".into(), book_id: "b1".into() };
        assert_eq!(err.to_string(), "Review already exists for user u1 and book b1");
    }
}
