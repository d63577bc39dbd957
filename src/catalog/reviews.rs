use bson::oid::ObjectId;
use bson::{Bson, DateTime, Document, doc};
use serde::Serialize;
use std::collections::HashMap;

use crate::connection::Connection;
use crate::errors::{CatalogError, Result};
use crate::query::eval::as_f64;
use crate::query::{FindOptions, Lookup, QueryComposer, SortSpec};
use crate::types::{DocumentId, REVIEWS, USER_BOOKS, USERS};

pub const MIN_REVIEW_LEN: usize = 3;

/// A review as shown under a book.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewView {
    pub id: Bson,
    pub text: String,
    pub added_at: Option<DateTime>,
    pub username: String,
    /// The reviewer's own rating of the book, from their reading list.
    pub rating: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Reviews {
    conn: Connection,
    composer: QueryComposer,
}

impl Reviews {
    #[must_use]
    pub fn new(conn: Connection) -> Self {
        Self { composer: QueryComposer::new(conn.clone()), conn }
    }

    /// Stores a review of `book_id` by `user_id`. One review per user and book.
    ///
    /// # Errors
    /// - `CatalogError::InvalidIdentity` when `book_id` is malformed.
    /// - `CatalogError::InvalidReview` when the trimmed text is shorter than three characters.
    /// - `CatalogError::DuplicateReview` when the user already reviewed the book.
    pub async fn add(&self, user_id: &DocumentId, book_id: &str, text: &str) -> Result<Document> {
        let book_id = DocumentId::parse(book_id)?;
        let text = text.trim();
        if text.chars().count() < MIN_REVIEW_LEN {
            return Err(CatalogError::InvalidReview(format!(
                "text must be at least {MIN_REVIEW_LEN} characters"
            )));
        }
        let key = doc! { "bookId": book_id, "userId": *user_id };
        if self.composer.find_one(REVIEWS, key, &FindOptions::new()).await?.is_some() {
            return Err(CatalogError::DuplicateReview { user_id: user_id.to_hex(), book_id: book_id.to_hex() });
        }
        let review = doc! {
            "bookId": book_id,
            "userId": *user_id,
            "text": text,
            "addedAt": DateTime::now(),
        };
        self.conn.insert(REVIEWS, review).await
    }

    /// Reviews of `book_id`, newest first. Reviews by users that no longer exist are left out.
    ///
    /// # Errors
    /// `CatalogError::InvalidIdentity` for a malformed id, `QueryFailed` from the store.
    pub async fn for_book(&self, book_id: &str) -> Result<Vec<ReviewView>> {
        let book_id = DocumentId::parse(book_id)?;
        let opts = FindOptions::new()
            .with_populate(Lookup::new(USERS, "userId", "_id", "user"))
            .with_sort(SortSpec::desc("addedAt"));
        let reviews = self.composer.find(REVIEWS, doc! { "bookId": book_id }, &opts).await?;

        let entries = self.composer.find(USER_BOOKS, doc! { "bookId": book_id }, &FindOptions::new()).await?;
        let mut ratings: HashMap<ObjectId, f64> = HashMap::with_capacity(entries.len());
        for e in &entries {
            if let (Some(Bson::ObjectId(uid)), Some(r)) = (e.get("userId"), e.get("rating").and_then(as_f64)) {
                ratings.insert(*uid, r);
            }
        }

        Ok(reviews.iter().filter_map(|r| view(r, &ratings)).collect())
    }
}

fn view(review: &Document, ratings: &HashMap<ObjectId, f64>) -> Option<ReviewView> {
    let user = match review.get("user") {
        Some(Bson::Array(users)) => users.iter().find_map(Bson::as_document)?,
        _ => return None,
    };
    let rating = match review.get("userId") {
        Some(Bson::ObjectId(uid)) => ratings.get(uid).copied(),
        _ => None,
    };
    Some(ReviewView {
        id: review.get("_id").cloned().unwrap_or(Bson::Null),
        text: review.get_str("text").unwrap_or_default().to_string(),
        added_at: review.get_datetime("addedAt").ok().copied(),
        username: user.get_str("username").unwrap_or_default().to_string(),
        rating,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reviewer_rating_is_looked_up_by_user_id() {
        let (ann, ben) = (ObjectId::new(), ObjectId::new());
        let ratings = HashMap::from([(ann, 4.5), (ben, 2.0)]);
        let review = doc! {
            "_id": 1,
            "userId": ben,
            "text": "fine",
            "user": [ { "_id": ben, "username": "ben" } ],
        };
        let v = view(&review, &ratings).unwrap();
        assert_eq!(v.username, "ben");
        assert_eq!(v.rating, Some(2.0));

        let stranger = doc! { "userId": ObjectId::new(), "user": [ { "username": "cy" } ] };
        assert_eq!(view(&stranger, &ratings).unwrap().rating, None);
        assert!(view(&doc! { "userId": ann, "user": [] }, &ratings).is_none());
    }
}
