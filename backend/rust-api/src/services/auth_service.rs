use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::Database;
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ApiError;
use crate::middlewares::auth::{JwtClaims, JwtService};
use crate::models::user::{
    Account, AuthResponse, LoginRequest, PasswordResetConfirm, PasswordResetRequest,
    PasswordResetToken, RefreshToken,
};
use crate::services::email_service::EmailService;

const RESET_TOKEN_TTL_SECONDS: i64 = 3600;

pub struct AuthService {
    mongo: Database,
    jwt_service: JwtService,
    access_token_ttl_seconds: i64,
    refresh_token_ttl_seconds: i64,
}

impl AuthService {
    pub fn new(mongo: Database, jwt_service: JwtService) -> Self {
        let access_token_ttl_seconds = std::env::var("JWT_ACCESS_TOKEN_TTL_SECONDS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(3600);

        let refresh_token_ttl_seconds = std::env::var("JWT_REFRESH_TOKEN_TTL_SECONDS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(86400);

        Self {
            mongo,
            jwt_service,
            access_token_ttl_seconds,
            refresh_token_ttl_seconds,
        }
    }

    pub fn hash_password(&self, password: &str) -> Result<String, ApiError> {
        hash(password, DEFAULT_COST)
            .map_err(|e| ApiError::internal(anyhow::anyhow!("Failed to hash password: {e}")))
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool, ApiError> {
        verify(password, hash)
            .map_err(|e| ApiError::internal(anyhow::anyhow!("Failed to verify password: {e}")))
    }

    /// Username/password login. Inactive accounts are rejected with the
    /// same message as a bad password so probing cannot tell them apart.
    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse, ApiError> {
        let users = self.mongo.collection::<Account>("users");

        let account = users
            .find_one(doc! { "username": &req.username })
            .await?
            .ok_or_else(|| ApiError::authentication("Invalid username or password"))?;

        if !account.is_active || !self.verify_password(&req.password, &account.password_hash)? {
            tracing::warn!(username = %req.username, "Failed login attempt");
            return Err(ApiError::authentication("Invalid username or password"));
        }

        let user_id = account
            .id
            .ok_or_else(|| ApiError::internal(anyhow::anyhow!("Account has no id")))?;

        let access = self.generate_access_token(&account, &user_id)?;
        let refresh = self.create_refresh_token(&user_id).await?;

        tracing::info!(user_id = %user_id.to_hex(), role = account.role.as_str(), "Successful login");

        Ok(AuthResponse {
            access,
            refresh,
            role: account.role,
        })
    }

    /// Exchange a valid refresh token for a fresh access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, ApiError> {
        let token_hash = hash_token(refresh_token);
        let tokens = self.mongo.collection::<RefreshToken>("refresh_tokens");

        let token_doc = tokens
            .find_one(doc! { "token_hash": &token_hash, "revoked": false })
            .await?
            .ok_or_else(|| ApiError::authentication("Invalid or expired refresh token"))?;

        if token_doc.expires_at < Utc::now() {
            return Err(ApiError::authentication("Refresh token has expired"));
        }

        let account = self
            .mongo
            .collection::<Account>("users")
            .find_one(doc! { "_id": token_doc.user_id })
            .await?
            .filter(|a| a.is_active)
            .ok_or_else(|| ApiError::authentication("Account no longer active"))?;

        self.generate_access_token(&account, &token_doc.user_id)
    }

    /// Revoke the presented refresh token. Revoking an unknown token is
    /// reported as success; the end state is the same.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), ApiError> {
        let token_hash = hash_token(refresh_token);
        self.mongo
            .collection::<RefreshToken>("refresh_tokens")
            .update_one(
                doc! { "token_hash": &token_hash, "revoked": false },
                doc! { "$set": { "revoked": true } },
            )
            .await?;
        Ok(())
    }

    /// Issue a single-use password reset token and mail it to the account
    /// owner. Unknown emails are a validation error, matching the legacy
    /// API contract.
    pub async fn request_password_reset(
        &self,
        req: PasswordResetRequest,
        email_service: &EmailService,
    ) -> Result<(), ApiError> {
        let account = self
            .mongo
            .collection::<Account>("users")
            .find_one(doc! { "email": &req.email, "is_active": true })
            .await?
            .ok_or_else(|| ApiError::validation("No account found with this email"))?;

        let user_id = account
            .id
            .ok_or_else(|| ApiError::internal(anyhow::anyhow!("Account has no id")))?;

        let mut raw = [0u8; 32];
        rand::rng().fill_bytes(&mut raw);
        let token = hex::encode(raw);

        let reset = PasswordResetToken {
            id: None,
            user_id,
            token_hash: hash_token(&token),
            expires_at: Utc::now() + Duration::seconds(RESET_TOKEN_TTL_SECONDS),
            used: false,
        };
        self.mongo
            .collection::<PasswordResetToken>("password_resets")
            .insert_one(&reset)
            .await?;

        email_service
            .send_password_reset_email(&account, &user_id.to_hex(), &token)
            .await?;

        Ok(())
    }

    /// Consume a reset token and set the new password.
    pub async fn confirm_password_reset(&self, req: PasswordResetConfirm) -> Result<(), ApiError> {
        let user_id = ObjectId::parse_str(&req.uid)
            .map_err(|_| ApiError::validation("Invalid reset link"))?;
        let token_hash = hash_token(&req.token);

        let resets = self.mongo.collection::<PasswordResetToken>("password_resets");
        let reset = resets
            .find_one(doc! { "user_id": user_id, "token_hash": &token_hash, "used": false })
            .await?
            .ok_or_else(|| ApiError::validation("Invalid reset link"))?;

        if reset.expires_at < Utc::now() {
            return Err(ApiError::validation("Reset link has expired"));
        }

        let password_hash = self.hash_password(&req.new_password)?;
        self.mongo
            .collection::<Account>("users")
            .update_one(
                doc! { "_id": user_id },
                doc! { "$set": { "password_hash": password_hash } },
            )
            .await?;

        resets
            .update_one(
                doc! { "_id": reset.id },
                doc! { "$set": { "used": true } },
            )
            .await?;

        // Force re-login everywhere after a reset.
        self.mongo
            .collection::<RefreshToken>("refresh_tokens")
            .update_many(
                doc! { "user_id": user_id, "revoked": false },
                doc! { "$set": { "revoked": true } },
            )
            .await?;

        tracing::info!(user_id = %user_id.to_hex(), "Password reset completed");
        Ok(())
    }

    fn generate_access_token(
        &self,
        account: &Account,
        user_id: &ObjectId,
    ) -> Result<String, ApiError> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.access_token_ttl_seconds);

        let claims = JwtClaims {
            sub: user_id.to_hex(),
            role: account.role.as_str().to_string(),
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        self.jwt_service
            .generate_token(claims)
            .map_err(|e| ApiError::internal(anyhow::anyhow!("Failed to generate token: {e}")))
    }

    async fn create_refresh_token(&self, user_id: &ObjectId) -> Result<String, ApiError> {
        let token = Uuid::new_v4().to_string();
        let now = Utc::now();

        let refresh_token = RefreshToken {
            id: None,
            user_id: *user_id,
            token_hash: hash_token(&token),
            created_at: now,
            expires_at: now + Duration::seconds(self.refresh_token_ttl_seconds),
            revoked: false,
        };

        self.mongo
            .collection::<RefreshToken>("refresh_tokens")
            .insert_one(&refresh_token)
            .await?;

        Ok(token)
    }
}

/// SHA-256 hex digest used for refresh and reset tokens at rest.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_hash_is_stable_and_hex() {
        let a = hash_token("abc");
        let b = hash_token("abc");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, hash_token("abd"));
    }
}
