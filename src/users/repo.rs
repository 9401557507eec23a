use anyhow::Context;
use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Document};
use futures::TryStreamExt;
use mongodb::{Collection, Database};

use super::repo_types::{UserDocument, COLLECTION};

/// Persistence for user documents.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: &UserDocument) -> anyhow::Result<ObjectId>;
    async fn list(&self) -> anyhow::Result<Vec<UserDocument>>;
    async fn find_by_id(&self, id: ObjectId) -> anyhow::Result<Option<UserDocument>>;
    /// First document whose email matches exactly.
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<UserDocument>>;
    /// `$set` the given fields and return the matched count.
    async fn set_fields(&self, id: ObjectId, fields: Document) -> anyhow::Result<u64>;
    /// Returns the deleted count.
    async fn delete(&self, id: ObjectId) -> anyhow::Result<u64>;
}

#[derive(Clone)]
pub struct MongoUserStore {
    users: Collection<UserDocument>,
}

impl MongoUserStore {
    pub fn new(db: &Database) -> Self {
        Self {
            users: db.collection(COLLECTION),
        }
    }
}

#[async_trait]
impl UserStore for MongoUserStore {
    async fn insert(&self, user: &UserDocument) -> anyhow::Result<ObjectId> {
        let res = self.users.insert_one(user).await.context("insert user")?;
        res.inserted_id
            .as_object_id()
            .context("inserted id is not an ObjectId")
    }

    async fn list(&self) -> anyhow::Result<Vec<UserDocument>> {
        let cursor = self.users.find(doc! {}).await.context("find users")?;
        cursor
            .try_collect::<Vec<_>>()
            .await
            .context("read users cursor")
    }

    async fn find_by_id(&self, id: ObjectId) -> anyhow::Result<Option<UserDocument>> {
        self.users
            .find_one(doc! { "_id": id })
            .await
            .context("find user by id")
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<UserDocument>> {
        self.users
            .find_one(doc! { "email": email })
            .await
            .context("find user by email")
    }

    async fn set_fields(&self, id: ObjectId, fields: Document) -> anyhow::Result<u64> {
        let res = self
            .users
            .update_one(doc! { "_id": id }, doc! { "$set": fields })
            .await
            .context("update user")?;
        Ok(res.matched_count)
    }

    async fn delete(&self, id: ObjectId) -> anyhow::Result<u64> {
        let res = self
            .users
            .delete_one(doc! { "_id": id })
            .await
            .context("delete user")?;
        Ok(res.deleted_count)
    }
}
