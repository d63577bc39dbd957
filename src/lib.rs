pub mod catalog;
pub mod cli;
pub mod config;
pub mod connection;
pub mod errors;
pub mod logger;
pub mod query;
pub mod rating;
pub mod store;
pub mod types;

pub use catalog::{Catalog, EntryUpdate, ReadingList, ReviewView, Reviews, SavedEntry};
pub use config::{AppConfig, BackendKind, LogConfig, StoreConfig};
pub use connection::Connection;
pub use errors::{CatalogError, Result, StoreError};
pub use query::{FindOptions, Lookup, Order, Projection, QueryComposer, SortSpec, build_pipeline};
pub use rating::{RatingAggregator, round_to_cents};
pub use types::DocumentId;

/// Configures logging from `cfg.log`, connects to `cfg.store` and returns the catalog over
/// that connection.
///
/// # Errors
/// `CatalogError::Config` or `Io` when logging cannot be set up, `QueryFailed` when the
/// store is unreachable.
pub async fn init(cfg: &AppConfig) -> Result<Catalog> {
    logger::configure_logging(&cfg.log)?;
    let conn = Connection::connect(&cfg.store).await?;
    log::info!("libra-catalog ready on {} backend", conn.backend_name());
    Ok(Catalog::new(conn))
}
