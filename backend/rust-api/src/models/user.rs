use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::bson_datetime_as_chrono;

/// Canonical account stored in the MongoDB "users" collection.
/// Role-specific profile records reference it 1:1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub phone: String,
    pub password_hash: String,
    pub role: Role,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl Account {
    pub fn full_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim();
        if name.is_empty() {
            self.username.clone()
        } else {
            name.to_string()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

/// Nested account payload used when an admin creates a teacher or student.
/// Password defaults to "{username}123" when omitted.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewAccountPayload {
    #[validate(length(min = 1, max = 150))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub phone: String,
    pub password: Option<String>,
}

/// Account fields exposed to clients (no credential hash).
#[derive(Debug, Serialize)]
pub struct AccountOut {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub role: Role,
    pub is_active: bool,
}

impl From<Account> for AccountOut {
    fn from(account: Account) -> Self {
        AccountOut {
            id: account.id.map(|id| id.to_hex()).unwrap_or_default(),
            username: account.username,
            email: account.email,
            first_name: account.first_name,
            last_name: account.last_name,
            phone: account.phone,
            role: account.role,
            is_active: account.is_active,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access: String,
    pub refresh: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetConfirm {
    pub uid: String,
    pub token: String,
    #[validate(length(min = 8))]
    pub new_password: String,
}

/// Refresh token stored SHA-256-hashed in the "refresh_tokens" collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub token_hash: String,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub revoked: bool,
}

/// Password reset token, hashed at rest, single use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordResetToken {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub token_hash: String,
    #[serde(with = "bson_datetime_as_chrono")]
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub used: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_name_falls_back_to_username() {
        let account = Account {
            id: None,
            username: "rvasya".to_string(),
            email: "v@example.com".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            phone: String::new(),
            password_hash: String::new(),
            role: Role::Student,
            is_active: true,
            created_at: Utc::now(),
        };
        assert_eq!(account.full_name(), "rvasya");
    }

    #[test]
    fn role_labels_match_stored_strings() {
        assert_eq!(Role::Admin.as_str(), "admin");
        assert_eq!(Role::Teacher.as_str(), "teacher");
        assert_eq!(Role::Student.as_str(), "student");
    }
}
