use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::repo_types::{from_bson_datetime, AddressDocument, UserDocument};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub zip: String,
}

impl From<Address> for AddressDocument {
    fn from(a: Address) -> Self {
        Self {
            street: a.street,
            city: a.city,
            state: a.state,
            country: a.country,
            zip: a.zip,
        }
    }
}

impl From<AddressDocument> for Address {
    fn from(a: AddressDocument) -> Self {
        Self {
            street: a.street,
            city: a.city,
            state: a.state,
            country: a.country,
            zip: a.zip,
        }
    }
}

/// Request body for registration. Missing fields default to empty.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub address: Address,
    pub phone: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfilePictureResponse {
    pub message: String,
    pub profile_picture: String,
}

/// User as returned to clients; the password hash is never included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub address: Address,
    pub phone: String,
    pub role: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(
        with = "time::serde::rfc3339::option",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_login: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
}

impl From<UserDocument> for PublicUser {
    fn from(u: UserDocument) -> Self {
        Self {
            id: u.id.map(|id| id.to_hex()).unwrap_or_default(),
            first_name: u.first_name,
            last_name: u.last_name,
            email: u.email,
            address: u.address.into(),
            phone: u.phone,
            role: u.role,
            created_at: from_bson_datetime(u.created_at),
            updated_at: from_bson_datetime(u.updated_at),
            last_login: u.last_login.map(from_bson_datetime),
            profile_picture: u.profile_picture,
        }
    }
}
