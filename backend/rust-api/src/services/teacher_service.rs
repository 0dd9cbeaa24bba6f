use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::Database;
use validator::Validate;

use crate::error::ApiError;
use crate::models::student::{StudentOut, StudentProfile};
use crate::models::teacher::{
    CreateTeacherRequest, ProfileStatus, TeacherOut, TeacherProfile, UpdateTeacherRequest,
};
use crate::models::user::{Account, Role};
use crate::policy::Principal;

pub struct TeacherService {
    mongo: Database,
}

impl TeacherService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    /// Admin-only. Creates the account and the profile in one call.
    pub async fn create_teacher(
        &self,
        principal: &Principal,
        req: CreateTeacherRequest,
    ) -> Result<TeacherOut, ApiError> {
        if !principal.is_admin() {
            return Err(ApiError::permission("Only admins can create teachers"));
        }
        req.validate()
            .map_err(|e| ApiError::validation(e.to_string()))?;

        let teachers = self.mongo.collection::<TeacherProfile>("teachers");
        if teachers
            .find_one(doc! { "employee_id": &req.employee_id })
            .await?
            .is_some()
        {
            return Err(ApiError::validation("Employee id is already taken"));
        }

        let (user_id, account) =
            super::create_account(&self.mongo, req.user, Role::Teacher).await?;

        let profile = TeacherProfile {
            id: None,
            user_id,
            phone: req.phone,
            subject_specialization: req.subject_specialization,
            employee_id: req.employee_id,
            date_of_joining: req.date_of_joining,
            status: ProfileStatus::Active,
        };
        let insert = teachers.insert_one(&profile).await?;

        let mut profile = profile;
        profile.id = insert.inserted_id.as_object_id();

        tracing::info!(user_id = %user_id.to_hex(), "Teacher created");
        Ok(TeacherOut::from_parts(profile, account))
    }

    /// Admins see the full roster; a teacher sees only their own record.
    pub async fn list_teachers(&self, principal: &Principal) -> Result<Vec<TeacherOut>, ApiError> {
        let filter = match principal {
            Principal::Admin(_) => doc! {},
            Principal::Teacher(_, profile) => doc! { "_id": profile.id },
            Principal::Student(_, _) => {
                return Err(ApiError::permission("Students cannot list teachers"))
            }
        };

        let profiles: Vec<TeacherProfile> = self
            .mongo
            .collection::<TeacherProfile>("teachers")
            .find(filter)
            .await?
            .try_collect()
            .await?;

        self.join_accounts(profiles).await
    }

    pub async fn get_teacher(
        &self,
        principal: &Principal,
        teacher_id: &str,
    ) -> Result<TeacherOut, ApiError> {
        let profile = self.load_profile(teacher_id).await?;

        let allowed = match principal {
            Principal::Admin(_) => true,
            Principal::Teacher(_, own) => own.id == profile.id,
            Principal::Student(_, _) => false,
        };
        if !allowed {
            return Err(ApiError::not_found("Teacher not found"));
        }

        let account = self.account_of(&profile.user_id).await?;
        Ok(TeacherOut::from_parts(profile, account))
    }

    /// The authenticated teacher's own profile.
    pub async fn me(&self, principal: &Principal) -> Result<TeacherOut, ApiError> {
        let Principal::Teacher(account, profile) = principal else {
            return Err(ApiError::permission("Not a teacher account"));
        };
        Ok(TeacherOut::from_parts(profile.clone(), account.clone()))
    }

    /// Admin-only partial update of mutable profile fields.
    pub async fn update_teacher(
        &self,
        principal: &Principal,
        teacher_id: &str,
        req: UpdateTeacherRequest,
    ) -> Result<TeacherOut, ApiError> {
        if !principal.is_admin() {
            return Err(ApiError::permission("Only admins can update teachers"));
        }
        let profile = self.load_profile(teacher_id).await?;

        let mut set = Document::new();
        if let Some(phone) = req.phone {
            set.insert("phone", phone);
        }
        if let Some(subject) = req.subject_specialization {
            if subject.is_empty() {
                return Err(ApiError::validation("Subject specialization cannot be empty"));
            }
            set.insert("subject_specialization", subject);
        }
        if let Some(status) = req.status {
            set.insert(
                "status",
                match status {
                    ProfileStatus::Active => "active",
                    ProfileStatus::Inactive => "inactive",
                },
            );
        }

        if !set.is_empty() {
            self.mongo
                .collection::<TeacherProfile>("teachers")
                .update_one(doc! { "_id": profile.id }, doc! { "$set": set })
                .await?;
        }

        let profile = self.load_profile(teacher_id).await?;
        let account = self.account_of(&profile.user_id).await?;
        Ok(TeacherOut::from_parts(profile, account))
    }

    /// Admin-only soft delete. The profile is marked inactive, the login is
    /// disabled, and assigned students are released. Authored exams keep
    /// their teacher reference.
    pub async fn delete_teacher(
        &self,
        principal: &Principal,
        teacher_id: &str,
    ) -> Result<(), ApiError> {
        if !principal.is_admin() {
            return Err(ApiError::permission("Only admins can delete teachers"));
        }
        let profile = self.load_profile(teacher_id).await?;

        self.mongo
            .collection::<TeacherProfile>("teachers")
            .update_one(
                doc! { "_id": profile.id },
                doc! { "$set": { "status": "inactive" } },
            )
            .await?;

        self.mongo
            .collection::<Account>("users")
            .update_one(
                doc! { "_id": profile.user_id },
                doc! { "$set": { "is_active": false } },
            )
            .await?;

        self.mongo
            .collection::<StudentProfile>("students")
            .update_many(
                doc! { "assigned_teacher": profile.id },
                doc! { "$unset": { "assigned_teacher": "" } },
            )
            .await?;

        tracing::info!(teacher_id = %teacher_id, "Teacher deactivated");
        Ok(())
    }

    /// Students currently assigned to the given teacher. A teacher can only
    /// query their own roster; admins can query anyone's.
    pub async fn list_assigned_students(
        &self,
        principal: &Principal,
        teacher_id: &str,
    ) -> Result<Vec<StudentOut>, ApiError> {
        let profile = self.load_profile(teacher_id).await?;

        let allowed = match principal {
            Principal::Admin(_) => true,
            Principal::Teacher(_, own) => own.id == profile.id,
            Principal::Student(_, _) => false,
        };
        if !allowed {
            return Err(ApiError::permission("Cannot view another teacher's students"));
        }

        let students: Vec<StudentProfile> = self
            .mongo
            .collection::<StudentProfile>("students")
            .find(doc! { "assigned_teacher": profile.id })
            .await?
            .try_collect()
            .await?;

        let mut out = Vec::with_capacity(students.len());
        for student in students {
            let account = self.account_of(&student.user_id).await?;
            out.push(StudentOut::from_parts(student, account));
        }
        Ok(out)
    }

    async fn load_profile(&self, teacher_id: &str) -> Result<TeacherProfile, ApiError> {
        let oid = ObjectId::parse_str(teacher_id)
            .map_err(|_| ApiError::not_found("Teacher not found"))?;
        self.mongo
            .collection::<TeacherProfile>("teachers")
            .find_one(doc! { "_id": oid })
            .await?
            .ok_or_else(|| ApiError::not_found("Teacher not found"))
    }

    async fn account_of(&self, user_id: &ObjectId) -> Result<Account, ApiError> {
        self.mongo
            .collection::<Account>("users")
            .find_one(doc! { "_id": user_id })
            .await?
            .ok_or_else(|| ApiError::internal(anyhow::anyhow!("Profile has no backing account")))
    }

    async fn join_accounts(
        &self,
        profiles: Vec<TeacherProfile>,
    ) -> Result<Vec<TeacherOut>, ApiError> {
        let mut out = Vec::with_capacity(profiles.len());
        for profile in profiles {
            let account = self.account_of(&profile.user_id).await?;
            out.push(TeacherOut::from_parts(profile, account));
        }
        Ok(out)
    }
}
