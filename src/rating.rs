use bson::{Bson, DateTime, doc};

use crate::connection::Connection;
use crate::errors::Result;
use crate::logger::AUDIT_TARGET;
use crate::query::eval::as_f64;
use crate::query::{Group, Projection, Stage};
use crate::store::FindSpec;
use crate::types::{BOOKS, DocumentId, USER_BOOKS};

/// Rounds half away from zero to two decimal places.
#[must_use]
pub fn round_to_cents(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Keeps `book.rating` equal to the rounded mean of the non-null reading-list ratings.
#[derive(Debug, Clone)]
pub struct RatingAggregator {
    conn: Connection,
}

impl RatingAggregator {
    #[must_use]
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Recomputes and stores the rating of `book_id`, returning the stored value.
    ///
    /// A book with no rated entries gets `None`. A book that does not exist is not an error;
    /// nothing is written and the computed value is still returned.
    ///
    /// # Errors
    /// `CatalogError::InvalidIdentity` for a malformed id, `QueryFailed` from the store.
    pub async fn recalc_rating(&self, book_id: &str) -> Result<Option<f64>> {
        let id = DocumentId::parse(book_id)?;
        self.recalc(&id).await
    }

    /// # Errors
    /// `CatalogError::QueryFailed` from the store.
    pub async fn recalc(&self, book_id: &DocumentId) -> Result<Option<f64>> {
        let pipeline = [
            Stage::Match(doc! { "bookId": *book_id, "rating": { "$ne": Bson::Null } }),
            Stage::Group(Group::all().avg("avgRating", "rating")),
        ];
        let rows = self.conn.store().aggregate(USER_BOOKS, &pipeline).await.map_err(|e| {
            log::error!("rating aggregation for book {book_id} failed: {e}");
            e
        })?;
        let rating = rows.first().and_then(|r| r.get("avgRating")).and_then(as_f64).map(round_to_cents);

        let set = doc! {
            "rating": rating.map_or(Bson::Null, Bson::Double),
            "updatedAt": DateTime::now(),
        };
        let report = self.conn.update(BOOKS, &doc! { "_id": *book_id }, set, false).await?;
        log::info!(
            target: AUDIT_TARGET,
            "rating recalculated book={book_id} matched={} modified={} rating={}",
            report.matched,
            report.modified,
            rating.map_or_else(|| "null".to_string(), |r| format!("{r:.2}"))
        );
        Ok(rating)
    }

    /// Recomputes every book and returns how many were processed.
    ///
    /// Books whose `_id` is not an `ObjectId` cannot be referenced by reading-list entries
    /// and are skipped.
    ///
    /// # Errors
    /// `CatalogError::QueryFailed` from the store; books already processed keep their new rating.
    pub async fn recalc_all(&self) -> Result<usize> {
        let filter = doc! {};
        let projection = Projection::new().include("_id");
        let spec = FindSpec { filter: &filter, projection: Some(&projection), sort: &[], limit: 0 };
        let books = self.conn.store().find(BOOKS, spec).await?;
        let mut done = 0;
        for book in books {
            match book.get("_id") {
                Some(Bson::ObjectId(oid)) => {
                    self.recalc(&DocumentId(*oid)).await?;
                    done += 1;
                }
                other => log::warn!("skipping book with non-ObjectId _id {other:?}"),
            }
        }
        log::info!("recalculated ratings for {done} books");
        Ok(done)
    }
}
