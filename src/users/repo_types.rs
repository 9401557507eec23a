use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

pub const COLLECTION: &str = "users";

/// Reads a `null` written by a permissive update as the type's default.
fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressDocument {
    #[serde(default, deserialize_with = "null_as_default")]
    pub street: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub city: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub state: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub country: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub zip: String,
}

/// User document in the `users` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub first_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub last_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub password: String, // Argon2 PHC string
    #[serde(default, deserialize_with = "null_as_default")]
    pub address: AddressDocument,
    #[serde(default, deserialize_with = "null_as_default")]
    pub phone: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub role: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
}

pub fn to_bson_datetime(t: OffsetDateTime) -> DateTime {
    DateTime::from_millis((t.unix_timestamp_nanos() / 1_000_000) as i64)
}

pub fn from_bson_datetime(t: DateTime) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(t.timestamp_millis() as i128 * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn datetime_conversion_keeps_millis() {
        let t = time::macros::datetime!(2024-03-01 12:30:45.123 UTC);
        assert_eq!(from_bson_datetime(to_bson_datetime(t)), t);
    }

    #[test]
    fn sparse_document_decodes_with_defaults() {
        let now = DateTime::now();
        let doc = doc! { "_id": ObjectId::new(), "email": "a@x.com", "created_at": now, "updated_at": now };
        let user: UserDocument = bson::from_document(doc).expect("decode");
        assert_eq!(user.email, "a@x.com");
        assert!(user.role.is_empty());
        assert_eq!(user.address, AddressDocument::default());
        assert!(user.last_login.is_none());
    }

    #[test]
    fn null_fields_decode_as_empty() {
        let now = DateTime::now();
        let doc = doc! {
            "_id": ObjectId::new(),
            "email": "a@x.com",
            "phone": null,
            "role": null,
            "address": { "city": null, "zip": "12345" },
            "profile_picture": null,
            "last_login": null,
            "created_at": now,
            "updated_at": now,
        };
        let user: UserDocument = bson::from_document(doc).expect("decode");
        assert!(user.phone.is_empty());
        assert!(user.role.is_empty());
        assert!(user.address.city.is_empty());
        assert_eq!(user.address.zip, "12345");
        assert!(user.profile_picture.is_none());
        assert!(user.last_login.is_none());

        let doc = doc! { "address": null, "created_at": now, "updated_at": now };
        let user: UserDocument = bson::from_document(doc).expect("decode null address");
        assert_eq!(user.address, AddressDocument::default());
    }

    #[test]
    fn new_document_has_no_id_field() {
        let now = DateTime::now();
        let user = UserDocument {
            id: None,
            first_name: "Ada".into(),
            last_name: String::new(),
            email: "a@x.com".into(),
            password: "hash".into(),
            address: AddressDocument::default(),
            phone: String::new(),
            role: String::new(),
            created_at: now,
            updated_at: now,
            last_login: None,
            profile_picture: None,
        };
        let doc = bson::to_document(&user).unwrap();
        assert!(!doc.contains_key("_id"));
        assert!(!doc.contains_key("profile_picture"));
        assert_eq!(doc.get_str("first_name").unwrap(), "Ada");
    }
}
