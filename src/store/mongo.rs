use async_trait::async_trait;
use bson::{Bson, Document, doc};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Cursor, Database};
use std::time::Duration;

use super::{DocumentStore, FindSpec};
use crate::config::StoreConfig;
use crate::errors::StoreError;
use crate::query::pipeline::{projection_document, sort_document};
use crate::query::{DeleteReport, Stage, UpdateReport};

/// `DocumentStore` over a MongoDB deployment, one pooled client per store.
#[derive(Debug, Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    /// Builds the pool and pings the server so a bad URI fails here rather than on first use.
    ///
    /// # Errors
    /// Returns `StoreError::Driver` when the URI does not parse or the server is unreachable
    /// within the configured selection timeout.
    pub async fn connect(cfg: &StoreConfig) -> Result<Self, StoreError> {
        let mut opts = ClientOptions::parse(&cfg.uri).await?;
        opts.max_pool_size = Some(cfg.max_pool_size);
        opts.server_selection_timeout = Some(Duration::from_millis(cfg.server_selection_timeout_ms));
        opts.app_name.clone_from(&cfg.app_name);
        let client = Client::with_options(opts)?;
        let db = client.database(&cfg.database);
        db.run_command(doc! { "ping": 1 }).await?;
        log::info!("connected to MongoDB database {} (pool {})", cfg.database, cfg.max_pool_size);
        Ok(Self { client, db })
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }
}

async fn drain(mut cursor: Cursor<Document>) -> Result<Vec<Document>, StoreError> {
    let mut out = Vec::new();
    while cursor.advance().await? {
        out.push(cursor.deserialize_current()?);
    }
    Ok(out)
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn find(&self, collection: &str, spec: FindSpec<'_>) -> Result<Vec<Document>, StoreError> {
        let coll = self.collection(collection);
        let mut find = coll.find(spec.filter.clone());
        if let Some(p) = spec.projection.filter(|p| !p.is_empty()) {
            find = find.projection(projection_document(p));
        }
        if !spec.sort.is_empty() {
            find = find.sort(sort_document(spec.sort));
        }
        if spec.limit > 0 {
            find = find.limit(i64::try_from(spec.limit).unwrap_or(i64::MAX));
        }
        drain(find.await?).await
    }

    async fn aggregate(&self, collection: &str, pipeline: &[Stage]) -> Result<Vec<Document>, StoreError> {
        let stages: Vec<Document> = pipeline.iter().map(Stage::to_document).collect();
        let cursor = self.collection(collection).aggregate(stages).await?;
        drain(cursor).await
    }

    async fn insert_one(&self, collection: &str, doc: Document) -> Result<Bson, StoreError> {
        Ok(self.collection(collection).insert_one(doc).await?.inserted_id)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Document,
        set: Document,
        upsert: bool,
    ) -> Result<UpdateReport, StoreError> {
        let res = self
            .collection(collection)
            .update_one(filter.clone(), doc! { "$set": set })
            .upsert(upsert)
            .await?;
        Ok(UpdateReport { matched: res.matched_count, modified: res.modified_count, upserted_id: res.upserted_id })
    }

    async fn delete_one(&self, collection: &str, filter: &Document) -> Result<DeleteReport, StoreError> {
        let res = self.collection(collection).delete_one(filter.clone()).await?;
        Ok(DeleteReport { deleted: res.deleted_count })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), StoreError> {
        self.client.clone().shutdown().await;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "mongo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Projection, SortSpec};

    // The client connects lazily, so reads run the full request path before failing selection.
    async fn unreachable() -> MongoStore {
        let mut opts = ClientOptions::parse("mongodb://127.0.0.1:1/?directConnection=true").await.unwrap();
        opts.server_selection_timeout = Some(Duration::from_millis(100));
        let client = Client::with_options(opts).unwrap();
        let db = client.database("libra_test");
        MongoStore { client, db }
    }

    #[tokio::test]
    async fn find_with_every_option_surfaces_driver_errors() {
        let store = unreachable().await;
        let filter = doc! { "rating": { "$gte": 4 } };
        let sort = [SortSpec::desc("createdAt")];
        let projection = Projection::new().include("title");
        let spec = FindSpec { filter: &filter, projection: Some(&projection), sort: &sort, limit: 5 };
        let err = store.find("book", spec).await.unwrap_err();
        assert!(matches!(err, StoreError::Driver(_)));
        assert_eq!(store.backend_name(), "mongo");
    }
}
