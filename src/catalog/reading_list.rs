use bson::{Bson, DateTime, Document, doc};

use crate::connection::Connection;
use crate::errors::Result;
use crate::query::{FindOptions, Lookup, QueryComposer};
use crate::rating::RatingAggregator;
use crate::types::{BOOKS, DocumentId, USER_BOOKS};

/// Fields written on every save of a reading-list entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryUpdate {
    pub status: String,
    /// Defaults to the time of the save.
    pub added_at: Option<DateTime>,
    pub rating: Option<f64>,
}

impl EntryUpdate {
    pub fn new(status: impl Into<String>) -> Self {
        Self { status: status.into(), added_at: None, rating: None }
    }

    #[must_use]
    pub const fn with_rating(mut self, rating: f64) -> Self {
        self.rating = Some(rating);
        self
    }

    #[must_use]
    pub const fn with_added_at(mut self, at: DateTime) -> Self {
        self.added_at = Some(at);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SavedEntry {
    /// `true` when the entry did not exist before.
    pub upserted: bool,
    /// The book rating after the recompute.
    pub book_rating: Option<f64>,
}

fn entry_key(user_id: &DocumentId, book_id: &DocumentId) -> Document {
    doc! { "userId": *user_id, "bookId": *book_id }
}

/// Per-user reading lists, keyed on `(userId, bookId)`.
///
/// Every change to an entry's rating goes through here and is followed by a book rating
/// recompute that finishes before the call returns.
#[derive(Debug, Clone)]
pub struct ReadingList {
    conn: Connection,
    composer: QueryComposer,
    ratings: RatingAggregator,
}

impl ReadingList {
    #[must_use]
    pub fn new(conn: Connection) -> Self {
        Self { composer: QueryComposer::new(conn.clone()), ratings: RatingAggregator::new(conn.clone()), conn }
    }

    /// Upserts the entry, then recomputes the book's rating.
    ///
    /// # Errors
    /// `CatalogError::QueryFailed` from the store. When the recompute fails the entry write
    /// has already happened.
    pub async fn save(&self, user_id: &DocumentId, book_id: &DocumentId, update: &EntryUpdate) -> Result<SavedEntry> {
        let set = doc! {
            "status": update.status.clone(),
            "addedAt": update.added_at.unwrap_or_else(DateTime::now),
            "rating": update.rating.map_or(Bson::Null, Bson::Double),
        };
        let report = self.conn.update(USER_BOOKS, &entry_key(user_id, book_id), set, true).await?;
        let book_rating = self.ratings.recalc(book_id).await?;
        Ok(SavedEntry { upserted: report.upserted_id.is_some(), book_rating })
    }

    /// [`ReadingList::save`] with hex ids.
    ///
    /// # Errors
    /// `CatalogError::InvalidIdentity` when either id is malformed.
    pub async fn save_str(&self, user_id: &str, book_id: &str, update: &EntryUpdate) -> Result<SavedEntry> {
        let user_id = DocumentId::parse(user_id)?;
        let book_id = DocumentId::parse(book_id)?;
        self.save(&user_id, &book_id, update).await
    }

    /// # Errors
    /// `CatalogError::QueryFailed` from the store.
    pub async fn entry(&self, user_id: &DocumentId, book_id: &DocumentId) -> Result<Option<Document>> {
        self.composer.find_one(USER_BOOKS, entry_key(user_id, book_id), &FindOptions::new()).await
    }

    /// Deletes the entry and recomputes the book's rating. Returns whether an entry existed.
    ///
    /// # Errors
    /// `CatalogError::QueryFailed` from the store.
    pub async fn remove(&self, user_id: &DocumentId, book_id: &DocumentId) -> Result<bool> {
        let report = self.conn.delete(USER_BOOKS, &entry_key(user_id, book_id)).await?;
        if report.deleted == 0 {
            return Ok(false);
        }
        self.ratings.recalc(book_id).await?;
        Ok(true)
    }

    /// # Errors
    /// `CatalogError::InvalidIdentity` when either id is malformed.
    pub async fn remove_str(&self, user_id: &str, book_id: &str) -> Result<bool> {
        let user_id = DocumentId::parse(user_id)?;
        let book_id = DocumentId::parse(book_id)?;
        self.remove(&user_id, &book_id).await
    }

    /// The user's entries, each with the joined book under `book`.
    ///
    /// # Errors
    /// `CatalogError::QueryFailed` from the store.
    pub async fn for_user(&self, user_id: &DocumentId) -> Result<Vec<Document>> {
        let opts = FindOptions::new().with_populate(Lookup::new(BOOKS, "bookId", "_id", "book"));
        self.composer.find(USER_BOOKS, doc! { "userId": *user_id }, &opts).await
    }

    /// Every entry of every user.
    ///
    /// # Errors
    /// `CatalogError::QueryFailed` from the store.
    pub async fn all(&self) -> Result<Vec<Document>> {
        self.composer.find(USER_BOOKS, doc! {}, &FindOptions::new()).await
    }
}
