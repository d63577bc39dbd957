//! Catalog services built on the query composer: listings, reading lists and reviews.

mod reading_list;
mod reviews;

pub use reading_list::{EntryUpdate, ReadingList, SavedEntry};
pub use reviews::{MIN_REVIEW_LEN, ReviewView, Reviews};

use bson::{Document, doc};

use crate::connection::Connection;
use crate::errors::Result;
use crate::query::{FindOptions, Lookup, Projection, QueryComposer, SortSpec};
use crate::rating::RatingAggregator;
use crate::types::{AUTHORS, BOOKS, GENRES, NEWS, USERS};

/// Page size public book listings use.
pub const PUBLIC_BOOK_LIMIT: u64 = 100;

fn author_lookup() -> Lookup {
    Lookup::new(AUTHORS, "author", "_id", "author")
}

#[derive(Debug, Clone)]
pub struct Catalog {
    composer: QueryComposer,
    ratings: RatingAggregator,
    reading_list: ReadingList,
    reviews: Reviews,
}

impl Catalog {
    #[must_use]
    pub fn new(conn: Connection) -> Self {
        Self {
            composer: QueryComposer::new(conn.clone()),
            ratings: RatingAggregator::new(conn.clone()),
            reading_list: ReadingList::new(conn.clone()),
            reviews: Reviews::new(conn),
        }
    }

    #[must_use]
    pub const fn connection(&self) -> &Connection {
        self.composer.connection()
    }

    #[must_use]
    pub const fn composer(&self) -> &QueryComposer {
        &self.composer
    }

    #[must_use]
    pub const fn ratings(&self) -> &RatingAggregator {
        &self.ratings
    }

    #[must_use]
    pub const fn reading_list(&self) -> &ReadingList {
        &self.reading_list
    }

    #[must_use]
    pub const fn reviews(&self) -> &Reviews {
        &self.reviews
    }

    /// Newest books first, each with its author joined. `0` lists everything.
    ///
    /// # Errors
    /// `CatalogError::QueryFailed` from the store.
    pub async fn books(&self, limit: u64) -> Result<Vec<Document>> {
        let opts = FindOptions::new()
            .with_sort(SortSpec::desc("createdAt"))
            .with_limit(limit)
            .with_populate(author_lookup());
        self.composer.find(BOOKS, doc! {}, &opts).await
    }

    /// # Errors
    /// `CatalogError::InvalidIdentity` for a malformed id, `QueryFailed` from the store.
    pub async fn book(&self, id: &str) -> Result<Option<Document>> {
        let opts = FindOptions::new().with_populate(author_lookup());
        self.composer.find_by_id(BOOKS, id, &opts).await
    }

    /// # Errors
    /// `CatalogError::QueryFailed` from the store.
    pub async fn authors(&self) -> Result<Vec<Document>> {
        self.composer.find(AUTHORS, doc! {}, &FindOptions::new()).await
    }

    /// # Errors
    /// `CatalogError::QueryFailed` from the store.
    pub async fn genres(&self) -> Result<Vec<Document>> {
        self.composer.find(GENRES, doc! {}, &FindOptions::new()).await
    }

    /// # Errors
    /// `CatalogError::QueryFailed` from the store.
    pub async fn news(&self) -> Result<Vec<Document>> {
        self.composer.find(NEWS, doc! {}, &FindOptions::new()).await
    }

    /// The user document without `passwordHash`.
    ///
    /// # Errors
    /// `CatalogError::QueryFailed` from the store.
    pub async fn user_profile(&self, username: &str) -> Result<Option<Document>> {
        let opts = FindOptions::new().with_projection(Projection::new().exclude("passwordHash"));
        self.composer.find_one(USERS, doc! { "username": username }, &opts).await
    }

    /// # Errors
    /// `CatalogError::QueryFailed` from the store.
    pub async fn usernames(&self) -> Result<Vec<String>> {
        let opts = FindOptions::new().with_projection(Projection::new().include("username").exclude("_id"));
        let users = self.composer.find(USERS, doc! {}, &opts).await?;
        Ok(users.iter().filter_map(|u| u.get_str("username").ok().map(str::to_string)).collect())
    }
}
