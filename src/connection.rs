use bson::{Bson, Document};
use std::fmt;
use std::sync::Arc;

use crate::config::{BackendKind, StoreConfig};
use crate::errors::{CatalogError, Result, StoreError};
use crate::logger::AUDIT_TARGET;
use crate::query::{DeleteReport, UpdateReport};
use crate::store::{DocumentStore, MemoryStore, MongoStore};

/// Shared handle to one document store. Clones share the same pool.
///
/// Established once with [`Connection::connect`] and closed with [`Connection::disconnect`];
/// there is no process-wide instance.
#[derive(Clone)]
pub struct Connection {
    store: Arc<dyn DocumentStore>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("backend", &self.store.backend_name()).finish()
    }
}

fn logged(op: &str, collection: &str) -> impl FnOnce(StoreError) -> CatalogError {
    let op = op.to_string();
    let collection = collection.to_string();
    move |e| {
        log::error!("{op} on {collection} failed: {e}");
        CatalogError::from(e)
    }
}

impl Connection {
    /// # Errors
    /// `CatalogError::QueryFailed` when the server cannot be reached.
    pub async fn connect(cfg: &StoreConfig) -> Result<Self> {
        match cfg.backend {
            BackendKind::Mongo => {
                let store = MongoStore::connect(cfg).await.map_err(|e| {
                    log::error!("failed to connect to {}: {e}", cfg.database);
                    CatalogError::from(e)
                })?;
                Ok(Self::from_store(store))
            }
            BackendKind::Memory => {
                log::info!("using in-memory store");
                Ok(Self::in_memory())
            }
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_store(MemoryStore::new())
    }

    pub fn from_store(store: impl DocumentStore + 'static) -> Self {
        Self { store: Arc::new(store) }
    }

    #[must_use]
    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// # Errors
    /// `CatalogError::QueryFailed` when the store does not answer.
    pub async fn ping(&self) -> Result<()> {
        self.store.ping().await.map_err(logged("ping", "admin"))
    }

    /// Closes the pool. Other clones of this handle fail with `StoreError::Closed` afterwards.
    ///
    /// # Errors
    /// `CatalogError::QueryFailed` when the backend fails to shut down cleanly.
    pub async fn disconnect(&self) -> Result<()> {
        self.store.shutdown().await.map_err(logged("disconnect", "admin"))?;
        log::info!("{} store disconnected", self.backend_name());
        Ok(())
    }

    /// Inserts `doc` and returns it with its `_id`.
    ///
    /// # Errors
    /// `CatalogError::QueryFailed` when the store rejects the write.
    pub async fn insert(&self, collection: &str, doc: Document) -> Result<Document> {
        let id = self.store.insert_one(collection, doc.clone()).await.map_err(logged("insert", collection))?;
        log::info!(target: AUDIT_TARGET, "insert {collection} _id={id}");
        if doc.contains_key("_id") {
            return Ok(doc);
        }
        let mut out = Document::new();
        out.insert("_id", id);
        for (k, v) in doc {
            out.insert(k, v);
        }
        Ok(out)
    }

    /// `$set`s `set` on the first document matching `filter`.
    ///
    /// # Errors
    /// `CatalogError::QueryFailed` when the store rejects the write.
    pub async fn update(
        &self,
        collection: &str,
        filter: &Document,
        set: Document,
        upsert: bool,
    ) -> Result<UpdateReport> {
        let report =
            self.store.update_one(collection, filter, set, upsert).await.map_err(logged("update", collection))?;
        log::info!(
            target: AUDIT_TARGET,
            "update {collection} matched={} modified={} upserted={}",
            report.matched,
            report.modified,
            report.upserted_id.as_ref().map_or_else(|| "-".to_string(), Bson::to_string)
        );
        Ok(report)
    }

    /// # Errors
    /// `CatalogError::QueryFailed` when the store rejects the write.
    pub async fn delete(&self, collection: &str, filter: &Document) -> Result<DeleteReport> {
        let report = self.store.delete_one(collection, filter).await.map_err(logged("delete", collection))?;
        log::info!(target: AUDIT_TARGET, "delete {collection} deleted={}", report.deleted);
        Ok(report)
    }
}
