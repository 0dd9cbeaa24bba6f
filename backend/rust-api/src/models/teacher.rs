use chrono::NaiveDate;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::user::{AccountOut, NewAccountPayload};

/// Teacher profile stored in the "teachers" collection. Owns exactly one
/// Account; soft-deleted (status=inactive) so authored exams stay attributable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeacherProfile {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    #[serde(default)]
    pub phone: String,
    pub subject_specialization: String,
    pub employee_id: String,
    pub date_of_joining: NaiveDate,
    pub status: ProfileStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProfileStatus {
    Active,
    Inactive,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTeacherRequest {
    #[validate(nested)]
    pub user: NewAccountPayload,
    #[serde(default)]
    pub phone: String,
    #[validate(length(min = 1))]
    pub subject_specialization: String,
    #[validate(length(min = 1))]
    pub employee_id: String,
    pub date_of_joining: NaiveDate,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTeacherRequest {
    pub phone: Option<String>,
    pub subject_specialization: Option<String>,
    pub status: Option<ProfileStatus>,
}

#[derive(Debug, Serialize)]
pub struct TeacherOut {
    pub id: String,
    pub user: AccountOut,
    pub phone: String,
    pub subject_specialization: String,
    pub employee_id: String,
    pub date_of_joining: NaiveDate,
    pub status: ProfileStatus,
}

impl TeacherOut {
    pub fn from_parts(profile: TeacherProfile, account: super::user::Account) -> Self {
        TeacherOut {
            id: profile.id.map(|id| id.to_hex()).unwrap_or_default(),
            user: account.into(),
            phone: profile.phone,
            subject_specialization: profile.subject_specialization,
            employee_id: profile.employee_id,
            date_of_joining: profile.date_of_joining,
            status: profile.status,
        }
    }
}
