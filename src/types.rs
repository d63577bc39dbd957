use crate::errors::CatalogError;
use bson::Bson;
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type CollectionName = &'static str;

pub const BOOKS: CollectionName = "book";
pub const AUTHORS: CollectionName = "author";
pub const GENRES: CollectionName = "genres";
pub const NEWS: CollectionName = "news";
pub const USERS: CollectionName = "user";
pub const USER_BOOKS: CollectionName = "user-books";
pub const REVIEWS: CollectionName = "reviews";

/// Native document identity: a 12-byte `ObjectId`, written as 24 hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub ObjectId);

impl DocumentId {
    #[must_use]
    pub fn new() -> Self {
        Self(ObjectId::new())
    }

    /// # Errors
    /// Returns `CatalogError::InvalidIdentity` when `s` is not a 24-character hex string.
    pub fn parse(s: &str) -> Result<Self, CatalogError> {
        ObjectId::parse_str(s).map(Self).map_err(|_| CatalogError::InvalidIdentity(s.to_string()))
    }

    #[must_use]
    pub const fn oid(&self) -> ObjectId {
        self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for DocumentId {
    type Err = CatalogError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

impl From<ObjectId> for DocumentId {
    fn from(oid: ObjectId) -> Self {
        Self(oid)
    }
}

impl From<DocumentId> for Bson {
    fn from(id: DocumentId) -> Self {
        Self::ObjectId(id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_24_hex_characters() {
        let id = DocumentId::parse("65a1f0c2e4b0a1b2c3d4e5f6").unwrap();
        assert_eq!(id.to_string(), "65a1f0c2e4b0a1b2c3d4e5f6");
        assert_eq!(Bson::from(id), Bson::ObjectId(id.oid()));
    }

    #[test]
    fn rejects_malformed_identity() {
        for bad in ["abc", "", "65a1f0c2e4b0a1b2c3d4e5fz", "65a1f0c2e4b0a1b2c3d4e5f6aa"] {
            let err = DocumentId::parse(bad).unwrap_err();
            assert!(matches!(err, CatalogError::InvalidIdentity(s) if s == bad));
        }
    }
}
