use chrono::NaiveDate;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::teacher::ProfileStatus;
use super::user::{AccountOut, NewAccountPayload};

/// Student profile stored in the "students" collection. At most one assigned
/// teacher at a time; the assignment drives exam visibility and chat pairing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentProfile {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    #[serde(default)]
    pub phone: String,
    pub roll_number: String,
    pub student_class: String,
    pub date_of_birth: NaiveDate,
    pub admission_date: NaiveDate,
    pub status: ProfileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_teacher: Option<ObjectId>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateStudentRequest {
    #[validate(nested)]
    pub user: NewAccountPayload,
    #[serde(default)]
    pub phone: String,
    #[validate(length(min = 1))]
    pub roll_number: String,
    #[validate(length(min = 1))]
    pub student_class: String,
    pub date_of_birth: NaiveDate,
    pub admission_date: NaiveDate,
    /// TeacherProfile id (hex), optional
    pub assigned_teacher: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateStudentRequest {
    pub phone: Option<String>,
    pub student_class: Option<String>,
    pub status: Option<ProfileStatus>,
    /// Some(None) clears the assignment
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_double_option"
    )]
    pub assigned_teacher: Option<Option<String>>,
}

// Distinguishes "field absent" from "field set to null" for assigned_teacher.
mod serde_double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer).map(Some)
    }
}

#[derive(Debug, Serialize)]
pub struct StudentOut {
    pub id: String,
    pub user: AccountOut,
    pub phone: String,
    pub roll_number: String,
    pub student_class: String,
    pub date_of_birth: NaiveDate,
    pub admission_date: NaiveDate,
    pub status: ProfileStatus,
    pub assigned_teacher: Option<String>,
}

impl StudentOut {
    pub fn from_parts(profile: StudentProfile, account: super::user::Account) -> Self {
        StudentOut {
            id: profile.id.map(|id| id.to_hex()).unwrap_or_default(),
            user: account.into(),
            phone: profile.phone,
            roll_number: profile.roll_number,
            student_class: profile.student_class,
            date_of_birth: profile.date_of_birth,
            admission_date: profile.admission_date,
            status: profile.status,
            assigned_teacher: profile.assigned_teacher.map(|id| id.to_hex()),
        }
    }
}
