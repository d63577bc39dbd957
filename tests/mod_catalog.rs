mod support;

use libra_catalog::catalog::PUBLIC_BOOK_LIMIT;
use libra_catalog::{Catalog, CatalogError, EntryUpdate};

#[tokio::test]
async fn books_are_newest_first_with_author() {
    let fx = support::fixture().await;
    let catalog = Catalog::new(fx.conn.clone());
    let books = catalog.books(PUBLIC_BOOK_LIMIT).await.unwrap();
    let titles: Vec<&str> = books.iter().map(|b| b.get_str("title").unwrap()).collect();
    assert_eq!(titles, ["Anna Karenina", "War and Peace"]);
    assert!(books.iter().all(|b| b.get_array("author").map_or(0, |a| a.len()) == 1));
    assert_eq!(catalog.books(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn single_book_by_identity() {
    let fx = support::fixture().await;
    let catalog = Catalog::new(fx.conn.clone());
    let book = catalog.book(&fx.older_book.to_hex()).await.unwrap().unwrap();
    assert_eq!(book.get_str("title").unwrap(), "War and Peace");
    assert_eq!(book.get_array("author").unwrap().len(), 1);
    assert!(catalog.book(&libra_catalog::DocumentId::new().to_hex()).await.unwrap().is_none());
    assert!(matches!(catalog.book("42").await, Err(CatalogError::InvalidIdentity(_))));
}

#[tokio::test]
async fn reference_listings() {
    let fx = support::fixture().await;
    let catalog = Catalog::new(fx.conn.clone());
    assert_eq!(catalog.authors().await.unwrap().len(), 1);
    assert_eq!(catalog.genres().await.unwrap()[0].get_str("name").unwrap(), "Novel");
    assert_eq!(catalog.news().await.unwrap().len(), 1);
}

#[tokio::test]
async fn profile_hides_password_hash() {
    let fx = support::fixture().await;
    let catalog = Catalog::new(fx.conn.clone());
    let profile = catalog.user_profile("alice").await.unwrap().unwrap();
    assert!(profile.get("passwordHash").is_none());
    assert_eq!(profile.get_str("email").unwrap(), "alice@example.com");
    assert_eq!(profile.get_object_id("_id").unwrap(), fx.alice);
    assert!(catalog.user_profile("nobody").await.unwrap().is_none());
}

#[tokio::test]
async fn usernames_lists_every_user() {
    let fx = support::fixture().await;
    let catalog = Catalog::new(fx.conn.clone());
    assert_eq!(catalog.usernames().await.unwrap(), ["alice", "bob"]);
}

#[tokio::test]
async fn services_share_one_connection() {
    let fx = support::fixture().await;
    let catalog = Catalog::new(fx.conn.clone());
    catalog
        .reading_list()
        .save(&fx.alice_id(), &fx.newer_id(), &EntryUpdate::new("read").with_rating(3.0))
        .await
        .unwrap();
    let book = catalog.book(&fx.newer_book.to_hex()).await.unwrap().unwrap();
    assert_eq!(book.get_f64("rating").unwrap(), 3.0);
    assert_eq!(catalog.ratings().recalc(&fx.newer_id()).await.unwrap(), Some(3.0));
    assert_eq!(catalog.connection().backend_name(), "memory");
}
