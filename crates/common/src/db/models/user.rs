//! User account record (auth collaborator, interface-level only)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn create(email: &str, full_name: Option<String>, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            full_name,
            password_hash,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

/// Public view returned by the API (no credential material)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserPublic {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    pub is_active: bool,
}

impl From<&User> for UserPublic {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            is_active: user.is_active,
        }
    }
}
