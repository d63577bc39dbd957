#![allow(dead_code)]

use bson::oid::ObjectId;
use bson::{Bson, DateTime, Document, doc};
use libra_catalog::query::Stage;
use libra_catalog::types::{AUTHORS, BOOKS, GENRES, NEWS, USER_BOOKS, USERS};
use libra_catalog::{Connection, DocumentId};

/// Two books by one author, two users, a genre and a news item in a fresh in-memory store.
pub struct Fixture {
    pub conn: Connection,
    pub author: ObjectId,
    pub older_book: ObjectId,
    pub newer_book: ObjectId,
    pub alice: ObjectId,
    pub bob: ObjectId,
}

impl Fixture {
    pub fn older_id(&self) -> DocumentId {
        DocumentId(self.older_book)
    }

    pub fn newer_id(&self) -> DocumentId {
        DocumentId(self.newer_book)
    }

    pub fn alice_id(&self) -> DocumentId {
        DocumentId(self.alice)
    }

    pub fn bob_id(&self) -> DocumentId {
        DocumentId(self.bob)
    }

    /// Writes a reading-list entry directly, bypassing any recompute.
    pub async fn rate(&self, user: ObjectId, book: ObjectId, rating: Option<i32>) {
        let rating = rating.map_or(Bson::Null, Bson::Int32);
        self.conn
            .insert(USER_BOOKS, doc! { "userId": user, "bookId": book, "status": "read", "rating": rating })
            .await
            .unwrap();
    }

    pub async fn get(&self, collection: &str, id: ObjectId) -> Option<Document> {
        let docs = self.conn.store().aggregate(collection, &[Stage::Match(doc! { "_id": id })]).await.unwrap();
        docs.into_iter().next()
    }

    pub async fn book(&self, id: ObjectId) -> Document {
        self.get(BOOKS, id).await.unwrap()
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.conn.store().aggregate(collection, &[]).await.unwrap().len()
    }
}

pub async fn fixture() -> Fixture {
    let conn = Connection::in_memory();
    let author = ObjectId::new();
    let older_book = ObjectId::new();
    let newer_book = ObjectId::new();
    let alice = ObjectId::new();
    let bob = ObjectId::new();

    conn.insert(AUTHORS, doc! { "_id": author, "name": "Leo Tolstoy" }).await.unwrap();
    conn.insert(
        BOOKS,
        doc! {
            "_id": older_book,
            "title": "War and Peace",
            "author": author,
            "rating": Bson::Null,
            "createdAt": DateTime::from_millis(1_704_067_200_000),
        },
    )
    .await
    .unwrap();
    conn.insert(
        BOOKS,
        doc! {
            "_id": newer_book,
            "title": "Anna Karenina",
            "author": author,
            "rating": Bson::Null,
            "createdAt": DateTime::from_millis(1_706_745_600_000),
        },
    )
    .await
    .unwrap();
    conn.insert(
        USERS,
        doc! { "_id": alice, "username": "alice", "email": "alice@example.com", "passwordHash": "x", "role": "admin" },
    )
    .await
    .unwrap();
    conn.insert(
        USERS,
        doc! { "_id": bob, "username": "bob", "email": "bob@example.com", "passwordHash": "y", "role": "user" },
    )
    .await
    .unwrap();
    conn.insert(GENRES, doc! { "name": "Novel" }).await.unwrap();
    conn.insert(NEWS, doc! { "title": "Catalog opened" }).await.unwrap();

    Fixture { conn, author, older_book, newer_book, alice, bob }
}
