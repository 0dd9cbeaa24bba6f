use anyhow::{Context, Result};
use bcrypt::{hash, DEFAULT_COST};
use mongodb::{
    bson::{doc, Document},
    Database,
};

/// Bootstrap the initial admin account from ADMIN_USERNAME / ADMIN_PASSWORD.
/// Upsert on username, so reruns against a seeded database are no-ops and
/// never overwrite a changed password.
pub async fn bootstrap(mongo: &Database) -> Result<()> {
    let username = match std::env::var("ADMIN_USERNAME") {
        Ok(v) if !v.is_empty() => v,
        _ => {
            tracing::debug!("ADMIN_USERNAME not set, skipping admin bootstrap");
            return Ok(());
        }
    };
    let password = std::env::var("ADMIN_PASSWORD")
        .context("ADMIN_PASSWORD must be set when ADMIN_USERNAME is provided")?;

    let password_hash = hash(&password, DEFAULT_COST).context("Failed to hash admin password")?;
    let email = std::env::var("ADMIN_EMAIL").unwrap_or_else(|_| format!("{username}@localhost"));

    let seed = doc! {
        "username": &username,
        "email": email,
        "first_name": "",
        "last_name": "",
        "phone": "",
        "password_hash": password_hash,
        "role": "admin",
        "is_active": true,
        "created_at": mongodb::bson::DateTime::now(),
    };

    let update = mongo
        .collection::<Document>("users")
        .update_one(
            doc! { "username": &username },
            doc! { "$setOnInsert": seed },
        )
        .upsert(true)
        .await
        .context("Failed to upsert admin account")?;

    if update.upserted_id.is_some() {
        tracing::info!(username = %username, "Admin account bootstrapped");
    } else {
        tracing::debug!(username = %username, "Admin account already exists, seed skipped");
    }

    Ok(())
}
