use bcrypt::{hash, DEFAULT_COST};
use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use mongodb::{
    bson::{doc, Document},
    options::IndexOptions,
    Client as MongoClient, Database, IndexModel,
};

use crate::config::Config;
use crate::error::ApiError;
use crate::models::user::{Account, NewAccountPayload, Role};

use chat_hub::ChatHub;

pub struct AppState {
    pub config: Config,
    pub mongo: Database,
    pub hub: ChatHub,
}

impl AppState {
    pub async fn new(config: Config, mongo_client: MongoClient) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        ensure_indexes(&mongo).await?;

        Ok(Self {
            config,
            mongo,
            hub: ChatHub::new(),
        })
    }
}

/// Unique indexes are the concurrency-control mechanism: duplicate concurrent
/// attempt creation and duplicate identifiers resolve at the storage layer.
async fn ensure_indexes(mongo: &Database) -> anyhow::Result<()> {
    let unique = |keys: Document| {
        IndexModel::builder()
            .keys(keys)
            .options(IndexOptions::builder().unique(true).build())
            .build()
    };

    mongo
        .collection::<Document>("users")
        .create_index(unique(doc! { "username": 1 }))
        .await?;

    mongo
        .collection::<Document>("teachers")
        .create_index(unique(doc! { "employee_id": 1 }))
        .await?;

    mongo
        .collection::<Document>("students")
        .create_index(unique(doc! { "roll_number": 1 }))
        .await?;

    mongo
        .collection::<Document>("attempts")
        .create_index(unique(doc! { "student_id": 1, "exam_id": 1 }))
        .await?;

    mongo
        .collection::<Document>("refresh_tokens")
        .create_index(unique(doc! { "token_hash": 1 }))
        .await?;

    // Message reads are always per-chat, ordered by time.
    mongo
        .collection::<Document>("messages")
        .create_index(
            IndexModel::builder()
                .keys(doc! { "chat_id": 1, "timestamp": 1 })
                .build(),
        )
        .await?;

    tracing::info!("MongoDB indexes ensured");
    Ok(())
}

/// Create the account backing a teacher or student profile. When the admin
/// omits a password the account gets "{username}123", the onboarding default
/// the frontend presents to new users.
pub(crate) async fn create_account(
    mongo: &Database,
    payload: NewAccountPayload,
    role: Role,
) -> Result<(ObjectId, Account), ApiError> {
    let users = mongo.collection::<Account>("users");

    if users
        .find_one(doc! { "username": &payload.username })
        .await?
        .is_some()
    {
        return Err(ApiError::validation("Username is already taken"));
    }

    let password = payload
        .password
        .unwrap_or_else(|| format!("{}123", payload.username));
    let password_hash = hash(&password, DEFAULT_COST)
        .map_err(|e| ApiError::internal(anyhow::anyhow!("Failed to hash password: {e}")))?;

    let account = Account {
        id: None,
        username: payload.username,
        email: payload.email,
        first_name: payload.first_name,
        last_name: payload.last_name,
        phone: payload.phone,
        password_hash,
        role,
        is_active: true,
        created_at: Utc::now(),
    };

    let insert = users.insert_one(&account).await?;
    let account_id = insert
        .inserted_id
        .as_object_id()
        .ok_or_else(|| ApiError::internal(anyhow::anyhow!("Missing inserted account id")))?;

    let mut account = account;
    account.id = Some(account_id);
    Ok((account_id, account))
}

pub mod admin_seed;
pub mod auth_service;
pub mod chat_hub;
pub mod chat_service;
pub mod email_service;
pub mod exam_service;
pub mod grading;
pub mod results_service;
pub mod student_service;
pub mod teacher_service;
