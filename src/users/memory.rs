use anyhow::Context;
use async_trait::async_trait;
use bson::{oid::ObjectId, Bson, Document};
use tokio::sync::RwLock;

use super::{repo::UserStore, repo_types::UserDocument};

/// Keeps raw documents in process, mirroring the collection semantics:
/// `$set` merges keys (dotted keys reach into sub-documents) and decoding
/// happens on read.
#[derive(Default)]
pub struct MemoryUserStore {
    docs: RwLock<Vec<Document>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn id_of(doc: &Document) -> Option<ObjectId> {
    doc.get_object_id("_id").ok()
}

/// Applies one `$set` entry. Missing parents are created; a parent that is
/// not a document is an error, as in MongoDB.
fn set_path(doc: &mut Document, path: &str, value: Bson) -> anyhow::Result<()> {
    let Some((head, rest)) = path.split_once('.') else {
        doc.insert(path, value);
        return Ok(());
    };
    let child = doc
        .entry(head.to_string())
        .or_insert_with(|| Bson::Document(Document::new()));
    match child {
        Bson::Document(inner) => set_path(inner, rest, value),
        other => anyhow::bail!(
            "cannot set `{rest}` inside `{head}` of type {:?}",
            other.element_type()
        ),
    }
}

fn decode(doc: &Document) -> anyhow::Result<UserDocument> {
    bson::from_document(doc.clone()).context("decode user document")
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: &UserDocument) -> anyhow::Result<ObjectId> {
        let mut doc = bson::to_document(user).context("encode user document")?;
        let id = user.id.unwrap_or_else(ObjectId::new);
        doc.insert("_id", id);
        self.docs.write().await.push(doc);
        Ok(id)
    }

    async fn list(&self) -> anyhow::Result<Vec<UserDocument>> {
        self.docs.read().await.iter().map(decode).collect()
    }

    async fn find_by_id(&self, id: ObjectId) -> anyhow::Result<Option<UserDocument>> {
        let docs = self.docs.read().await;
        docs.iter()
            .find(|d| id_of(d) == Some(id))
            .map(decode)
            .transpose()
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<UserDocument>> {
        let docs = self.docs.read().await;
        docs.iter()
            .find(|d| d.get_str("email").ok() == Some(email))
            .map(decode)
            .transpose()
    }

    async fn set_fields(&self, id: ObjectId, fields: Document) -> anyhow::Result<u64> {
        let mut docs = self.docs.write().await;
        let Some(doc) = docs.iter_mut().find(|d| id_of(d) == Some(id)) else {
            return Ok(0);
        };
        let mut updated = doc.clone();
        for (k, v) in fields {
            set_path(&mut updated, &k, v)?;
        }
        *doc = updated;
        Ok(1)
    }

    async fn delete(&self, id: ObjectId) -> anyhow::Result<u64> {
        let mut docs = self.docs.write().await;
        let before = docs.len();
        docs.retain(|d| id_of(d) != Some(id));
        Ok((before - docs.len()) as u64)
    }
}
