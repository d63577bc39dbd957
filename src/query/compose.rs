use bson::{Document, doc};
use std::borrow::Cow;

use super::pipeline::build_pipeline;
use super::types::FindOptions;
use crate::connection::Connection;
use crate::errors::{CatalogError, Result};
use crate::store::FindSpec;
use crate::types::DocumentId;

/// Turns `(collection, filter, FindOptions)` into a store read.
///
/// Without `populate` the read is a plain filtered find. With it, the read runs as the
/// staged pipeline from [`build_pipeline`]. Both paths apply the projection, so callers get
/// field-equivalent documents either way.
#[derive(Debug, Clone)]
pub struct QueryComposer {
    conn: Connection,
}

impl QueryComposer {
    #[must_use]
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }

    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// # Errors
    /// `CatalogError::QueryFailed` when the store rejects the read.
    pub async fn find(&self, collection: &str, filter: Document, opts: &FindOptions) -> Result<Vec<Document>> {
        let store = self.conn.store();
        let res = if opts.populate.is_empty() {
            let spec = FindSpec {
                filter: &filter,
                projection: opts.effective_projection(),
                sort: &opts.sort,
                limit: opts.limit,
            };
            store.find(collection, spec).await
        } else {
            let pipeline = build_pipeline(filter, opts);
            log::debug!("find on {collection} via {} stage pipeline", pipeline.len());
            store.aggregate(collection, &pipeline).await
        };
        res.map_err(|e| {
            log::error!("find on {collection} failed: {e}");
            CatalogError::from(e)
        })
    }

    /// First document matching `filter`, after sort. An unbounded limit is narrowed to one.
    ///
    /// # Errors
    /// `CatalogError::QueryFailed` when the store rejects the read.
    pub async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        opts: &FindOptions,
    ) -> Result<Option<Document>> {
        let opts = if opts.limit == 0 { Cow::Owned(opts.clone().with_limit(1)) } else { Cow::Borrowed(opts) };
        Ok(self.find(collection, filter, &opts).await?.into_iter().next())
    }

    /// Lookup by identity. `id` must be 24 hex characters.
    ///
    /// # Errors
    /// `CatalogError::InvalidIdentity` for a malformed id, `QueryFailed` from the store.
    pub async fn find_by_id(&self, collection: &str, id: &str, opts: &FindOptions) -> Result<Option<Document>> {
        let id = DocumentId::parse(id)?;
        self.find_by_object_id(collection, id, opts).await
    }

    /// # Errors
    /// `CatalogError::QueryFailed` when the store rejects the read.
    pub async fn find_by_object_id(
        &self,
        collection: &str,
        id: DocumentId,
        opts: &FindOptions,
    ) -> Result<Option<Document>> {
        self.find_one(collection, doc! { "_id": id }, opts).await
    }
}
