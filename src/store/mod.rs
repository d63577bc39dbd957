//! Document store backends.
//!
//! `DocumentStore` is the contract the query composer and the rating aggregator need
//! from a driver: a filtered read with projection/sort/limit, an aggregation pipeline,
//! and single-document insert/update/delete.

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use crate::errors::StoreError;
use crate::query::{DeleteReport, Projection, SortSpec, Stage, UpdateReport};
use async_trait::async_trait;
use bson::{Bson, Document};

/// A plain filtered read.
#[derive(Debug, Clone, Copy)]
pub struct FindSpec<'a> {
    pub filter: &'a Document,
    pub projection: Option<&'a Projection>,
    pub sort: &'a [SortSpec],
    /// `0` means unbounded.
    pub limit: u64,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(&self, collection: &str, spec: FindSpec<'_>) -> Result<Vec<Document>, StoreError>;

    async fn aggregate(&self, collection: &str, pipeline: &[Stage]) -> Result<Vec<Document>, StoreError>;

    /// Inserts `doc`, assigning an `_id` when it has none, and returns that id.
    async fn insert_one(&self, collection: &str, doc: Document) -> Result<Bson, StoreError>;

    /// `$set`s `set` on the first document matching `filter`. With `upsert`, a missing
    /// document is created from the filter's equality fields plus `set`.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Document,
        set: Document,
        upsert: bool,
    ) -> Result<UpdateReport, StoreError>;

    async fn delete_one(&self, collection: &str, filter: &Document) -> Result<DeleteReport, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;

    async fn shutdown(&self) -> Result<(), StoreError>;

    fn backend_name(&self) -> &'static str;
}
