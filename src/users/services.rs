use std::{future::Future, sync::Arc, time::Duration};

use bson::{doc, oid::ObjectId, DateTime, Document};
use bytes::Bytes;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{ChangePasswordRequest, PublicUser, RegisterRequest},
    repo::UserStore,
    repo_types::UserDocument,
};
use crate::{
    auth::{jwt::TokenIssuer, password::Hasher},
    error::AccountError,
    storage::StorageClient,
};

/// Fields a generic update may never touch.
const PROTECTED_FIELDS: [&str; 6] = [
    "_id",
    "id",
    "password",
    "created_at",
    "updated_at",
    "last_login",
];

pub struct UploadItem {
    pub body: Bytes,
    pub content_type: Option<String>,
}

#[derive(Debug)]
pub struct LoginOutcome {
    pub token: String,
    pub user: PublicUser,
}

/// Account operations over an injected store, hasher, token issuer and file storage.
pub struct AccountService {
    store: Arc<dyn UserStore>,
    hasher: Arc<dyn Hasher>,
    tokens: Arc<dyn TokenIssuer>,
    storage: Arc<dyn StorageClient>,
    db_timeout: Duration,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn UserStore>,
        hasher: Arc<dyn Hasher>,
        tokens: Arc<dyn TokenIssuer>,
        storage: Arc<dyn StorageClient>,
        db_timeout: Duration,
    ) -> Self {
        Self {
            store,
            hasher,
            tokens,
            storage,
            db_timeout,
        }
    }

    /// Runs one store call under the request timeout.
    async fn timed<T>(
        &self,
        what: &'static str,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T, AccountError> {
        match tokio::time::timeout(self.db_timeout, fut).await {
            Ok(res) => res.map_err(AccountError::internal(what)),
            Err(_) => {
                warn!(operation = what, timeout = ?self.db_timeout, "store call timed out");
                Err(AccountError::Timeout)
            }
        }
    }

    async fn fetch(&self, id: ObjectId) -> Result<UserDocument, AccountError> {
        self.timed("failed to load user", self.store.find_by_id(id))
            .await?
            .ok_or_else(|| AccountError::not_found("user not found"))
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<ObjectId, AccountError> {
        if req.password.is_empty() {
            return Err(AccountError::bad_request("password must not be empty"));
        }

        let password = self
            .hasher
            .hash(&req.password)
            .map_err(AccountError::internal("failed to hash password"))?;

        let now = DateTime::now();
        let user = UserDocument {
            id: None,
            first_name: req.first_name,
            last_name: req.last_name,
            email: req.email,
            password,
            address: req.address.into(),
            phone: req.phone,
            role: req.role,
            created_at: now,
            updated_at: now,
            last_login: None,
            profile_picture: None,
        };

        let id = self
            .timed("failed to insert user", self.store.insert(&user))
            .await?;
        info!(user_id = %id, email = %user.email, "user registered");
        Ok(id)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AccountError> {
        let Some(mut user) = self
            .timed("failed to look up user", self.store.find_by_email(email))
            .await?
        else {
            warn!(email = %email, "login unknown email");
            return Err(AccountError::not_found("user not found"));
        };
        let id = user
            .id
            .ok_or_else(|| anyhow::anyhow!("stored user has no _id"))
            .map_err(AccountError::internal("failed to look up user"))?;

        let ok = self
            .hasher
            .verify(password, &user.password)
            .map_err(AccountError::internal("failed to verify password"))?;
        if !ok {
            warn!(email = %email, user_id = %id, "login invalid password");
            return Err(AccountError::unauthorized("incorrect password"));
        }

        let now = DateTime::now();
        self.timed(
            "failed to update last login",
            self.store.set_fields(id, doc! { "last_login": now }),
        )
        .await?;
        user.last_login = Some(now);

        let token = self
            .tokens
            .issue(&id.to_hex(), &user.role)
            .map_err(AccountError::internal("failed to generate token"))?;

        info!(user_id = %id, "user logged in");
        Ok(LoginOutcome {
            token,
            user: user.into(),
        })
    }

    pub async fn list(&self) -> Result<Vec<PublicUser>, AccountError> {
        let users = self.timed("failed to list users", self.store.list()).await?;
        Ok(users.into_iter().map(PublicUser::from).collect())
    }

    pub async fn get(&self, id: &str) -> Result<PublicUser, AccountError> {
        let id = parse_id(id)?;
        Ok(self.fetch(id).await?.into())
    }

    pub async fn change_password(
        &self,
        id: &str,
        req: ChangePasswordRequest,
    ) -> Result<(), AccountError> {
        let id = parse_id(id)?;
        if req.current_password.is_empty() || req.new_password.is_empty() {
            return Err(AccountError::bad_request("passwords must not be empty"));
        }

        let user = self.fetch(id).await?;
        let ok = self
            .hasher
            .verify(&req.current_password, &user.password)
            .map_err(AccountError::internal("failed to verify password"))?;
        if !ok {
            warn!(user_id = %id, "change password with wrong current password");
            return Err(AccountError::unauthorized("current password is incorrect"));
        }

        let password = self
            .hasher
            .hash(&req.new_password)
            .map_err(AccountError::internal("failed to hash password"))?;
        let fields = doc! { "password": password, "updated_at": DateTime::now() };
        self.set_existing(id, fields, "failed to update password").await?;

        info!(user_id = %id, "password changed");
        Ok(())
    }

    pub async fn update_role(&self, id: &str, role: &str) -> Result<(), AccountError> {
        let id = parse_id(id)?;
        if role.is_empty() {
            return Err(AccountError::bad_request("role must not be empty"));
        }

        let fields = doc! { "role": role, "updated_at": DateTime::now() };
        self.set_existing(id, fields, "failed to update role").await?;
        info!(user_id = %id, role = %role, "role updated");
        Ok(())
    }

    /// Writes every supplied field verbatim, except the protected ones.
    pub async fn update(&self, id: &str, patch: Value) -> Result<(), AccountError> {
        let id = parse_id(id)?;
        let Value::Object(patch) = patch else {
            return Err(AccountError::bad_request("expected a JSON object"));
        };

        let mut fields = Document::new();
        for (key, value) in patch {
            if PROTECTED_FIELDS.contains(&key.as_str()) {
                continue;
            }
            let value = bson::to_bson(&value)
                .map_err(|e| AccountError::bad_request(format!("field `{key}`: {e}")))?;
            fields.insert(key, value);
        }
        fields.insert("updated_at", DateTime::now());

        let keys: Vec<&str> = fields.keys().map(String::as_str).collect();
        info!(user_id = %id, fields = ?keys, "user updated");
        self.set_existing(id, fields, "failed to update user").await
    }

    /// Removes the user; an id that matches nothing is still a success.
    pub async fn delete(&self, id: &str) -> Result<(), AccountError> {
        let id = parse_id(id)?;
        let deleted = self
            .timed("failed to delete user", self.store.delete(id))
            .await?;
        info!(user_id = %id, deleted, "user deleted");
        Ok(())
    }

    /// Stores the picture and records its public path on the user.
    pub async fn upload_picture(&self, id: &str, item: UploadItem) -> Result<String, AccountError> {
        let id = parse_id(id)?;

        let ext = item
            .content_type
            .as_deref()
            .and_then(ext_from_mime)
            .unwrap_or("jpg");
        let key = format!("{}.{}", Uuid::new_v4(), ext);
        let path = self
            .storage
            .put_object(&key, item.body)
            .await
            .map_err(AccountError::internal("failed to save image"))?;

        let fields = doc! { "profile_picture": path.as_str(), "updated_at": DateTime::now() };
        if let Err(e) = self.set_existing(id, fields, "failed to update profile picture").await {
            if let Err(cleanup) = self.storage.delete_object(&key).await {
                warn!(error = %cleanup, key = %key, "failed to remove orphaned upload");
            }
            return Err(e);
        }

        info!(user_id = %id, path = %path, "profile picture uploaded");
        Ok(path)
    }

    async fn set_existing(
        &self,
        id: ObjectId,
        fields: Document,
        what: &'static str,
    ) -> Result<(), AccountError> {
        let matched = self.timed(what, self.store.set_fields(id, fields)).await?;
        if matched == 0 {
            return Err(AccountError::not_found("user not found"));
        }
        Ok(())
    }
}

fn parse_id(id: &str) -> Result<ObjectId, AccountError> {
    ObjectId::parse_str(id).map_err(|_| AccountError::InvalidId)
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}
