use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Bson, Document};
use mongodb::Database;
use validator::Validate;

use crate::error::ApiError;
use crate::models::student::{
    CreateStudentRequest, StudentOut, StudentProfile, UpdateStudentRequest,
};
use crate::models::teacher::{ProfileStatus, TeacherProfile};
use crate::models::user::{Account, Role};
use crate::policy::Principal;

pub struct StudentService {
    mongo: Database,
}

impl StudentService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    /// Admin-only. Creates the account and the profile; the optional
    /// assigned teacher must exist and be active.
    pub async fn create_student(
        &self,
        principal: &Principal,
        req: CreateStudentRequest,
    ) -> Result<StudentOut, ApiError> {
        if !principal.is_admin() {
            return Err(ApiError::permission("Only admins can create students"));
        }
        req.validate()
            .map_err(|e| ApiError::validation(e.to_string()))?;

        let students = self.mongo.collection::<StudentProfile>("students");
        if students
            .find_one(doc! { "roll_number": &req.roll_number })
            .await?
            .is_some()
        {
            return Err(ApiError::validation("Roll number is already taken"));
        }

        let assigned_teacher = match req.assigned_teacher.as_deref() {
            Some(id) => Some(self.resolve_teacher(id).await?),
            None => None,
        };

        let (user_id, account) =
            super::create_account(&self.mongo, req.user, Role::Student).await?;

        let profile = StudentProfile {
            id: None,
            user_id,
            phone: req.phone,
            roll_number: req.roll_number,
            student_class: req.student_class,
            date_of_birth: req.date_of_birth,
            admission_date: req.admission_date,
            status: ProfileStatus::Active,
            assigned_teacher,
        };
        let insert = students.insert_one(&profile).await?;

        let mut profile = profile;
        profile.id = insert.inserted_id.as_object_id();

        tracing::info!(user_id = %user_id.to_hex(), "Student created");
        Ok(StudentOut::from_parts(profile, account))
    }

    /// Admins see every student, teachers see students assigned to them,
    /// students see only themselves.
    pub async fn list_students(&self, principal: &Principal) -> Result<Vec<StudentOut>, ApiError> {
        let filter = match principal {
            Principal::Admin(_) => doc! {},
            Principal::Teacher(_, profile) => doc! { "assigned_teacher": profile.id },
            Principal::Student(_, profile) => doc! { "_id": profile.id },
        };

        let profiles: Vec<StudentProfile> = self
            .mongo
            .collection::<StudentProfile>("students")
            .find(filter)
            .await?
            .try_collect()
            .await?;

        let mut out = Vec::with_capacity(profiles.len());
        for profile in profiles {
            let account = self.account_of(&profile.user_id).await?;
            out.push(StudentOut::from_parts(profile, account));
        }
        Ok(out)
    }

    pub async fn get_student(
        &self,
        principal: &Principal,
        student_id: &str,
    ) -> Result<StudentOut, ApiError> {
        let profile = self.load_profile(student_id).await?;
        if !can_view(principal, &profile) {
            return Err(ApiError::not_found("Student not found"));
        }
        let account = self.account_of(&profile.user_id).await?;
        Ok(StudentOut::from_parts(profile, account))
    }

    /// The authenticated student's own profile.
    pub async fn me(&self, principal: &Principal) -> Result<StudentOut, ApiError> {
        let Principal::Student(account, profile) = principal else {
            return Err(ApiError::permission("Not a student account"));
        };
        Ok(StudentOut::from_parts(profile.clone(), account.clone()))
    }

    /// Admins update anything; teachers may update only students assigned
    /// to them, and cannot reassign them to another teacher.
    pub async fn update_student(
        &self,
        principal: &Principal,
        student_id: &str,
        req: UpdateStudentRequest,
    ) -> Result<StudentOut, ApiError> {
        let profile = self.load_profile(student_id).await?;

        match principal {
            Principal::Admin(_) => {}
            Principal::Teacher(_, own) => {
                if profile.assigned_teacher != own.id {
                    return Err(ApiError::permission(
                        "Teachers can only update their assigned students",
                    ));
                }
                if req.assigned_teacher.is_some() {
                    return Err(ApiError::permission(
                        "Only admins can change teacher assignments",
                    ));
                }
            }
            Principal::Student(_, _) => {
                return Err(ApiError::permission("Students cannot update profiles"))
            }
        }

        let mut set = Document::new();
        let mut unset = Document::new();
        if let Some(phone) = req.phone {
            set.insert("phone", phone);
        }
        if let Some(class) = req.student_class {
            if class.is_empty() {
                return Err(ApiError::validation("Class cannot be empty"));
            }
            set.insert("student_class", class);
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
        match req.assigned_teacher {
            Some(Some(teacher_id)) => {
                let oid = self.resolve_teacher(&teacher_id).await?;
                set.insert("assigned_teacher", Bson::ObjectId(oid));
            }
            Some(None) => {
                unset.insert("assigned_teacher", "");
            }
            None => {}
        }

        let mut update = Document::new();
        if !set.is_empty() {
            update.insert("$set", set);
        }
        if !unset.is_empty() {
            update.insert("$unset", unset);
        }
        if !update.is_empty() {
            self.mongo
                .collection::<StudentProfile>("students")
                .update_one(doc! { "_id": profile.id }, update)
                .await?;
        }

        let profile = self.load_profile(student_id).await?;
        let account = self.account_of(&profile.user_id).await?;
        Ok(StudentOut::from_parts(profile, account))
    }

    /// Admin-only soft delete: profile inactive, login disabled. Attempt
    /// history stays for the results views.
    pub async fn delete_student(
        &self,
        principal: &Principal,
        student_id: &str,
    ) -> Result<(), ApiError> {
        if !principal.is_admin() {
            return Err(ApiError::permission("Only admins can delete students"));
        }
        let profile = self.load_profile(student_id).await?;

        self.mongo
            .collection::<StudentProfile>("students")
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

        tracing::info!(student_id = %student_id, "Student deactivated");
        Ok(())
    }

    async fn resolve_teacher(&self, teacher_id: &str) -> Result<ObjectId, ApiError> {
        let oid = ObjectId::parse_str(teacher_id)
            .map_err(|_| ApiError::validation("Invalid assigned teacher id"))?;
        let teacher = self
            .mongo
            .collection::<TeacherProfile>("teachers")
            .find_one(doc! { "_id": oid })
            .await?
            .ok_or_else(|| ApiError::validation("Assigned teacher does not exist"))?;
        if teacher.status != ProfileStatus::Active {
            return Err(ApiError::validation("Assigned teacher is not active"));
        }
        Ok(oid)
    }

    async fn load_profile(&self, student_id: &str) -> Result<StudentProfile, ApiError> {
        let oid = ObjectId::parse_str(student_id)
            .map_err(|_| ApiError::not_found("Student not found"))?;
        self.mongo
            .collection::<StudentProfile>("students")
            .find_one(doc! { "_id": oid })
            .await?
            .ok_or_else(|| ApiError::not_found("Student not found"))
    }

    async fn account_of(&self, user_id: &ObjectId) -> Result<Account, ApiError> {
        self.mongo
            .collection::<Account>("users")
            .find_one(doc! { "_id": user_id })
            .await?
            .ok_or_else(|| ApiError::internal(anyhow::anyhow!("Profile has no backing account")))
    }
}

fn can_view(principal: &Principal, profile: &StudentProfile) -> bool {
    match principal {
        Principal::Admin(_) => true,
        Principal::Teacher(_, own) => profile.assigned_teacher == own.id,
        Principal::Student(_, own) => own.id == profile.id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::Role;
    use chrono::{NaiveDate, Utc};

    fn account(role: Role) -> Account {
        Account {
            id: Some(ObjectId::new()),
            username: "u".to_string(),
            email: "u@example.com".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            phone: String::new(),
            password_hash: String::new(),
            role,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn student_profile(assigned: Option<ObjectId>) -> StudentProfile {
        StudentProfile {
            id: Some(ObjectId::new()),
            user_id: ObjectId::new(),
            phone: String::new(),
            roll_number: "10-01".to_string(),
            student_class: "10A".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(2010, 1, 1).unwrap(),
            admission_date: NaiveDate::from_ymd_opt(2020, 9, 1).unwrap(),
            status: ProfileStatus::Active,
            assigned_teacher: assigned,
        }
    }

    fn teacher_profile(id: ObjectId) -> TeacherProfile {
        TeacherProfile {
            id: Some(id),
            user_id: ObjectId::new(),
            phone: String::new(),
            subject_specialization: "Maths".to_string(),
            employee_id: "T-1".to_string(),
            date_of_joining: NaiveDate::from_ymd_opt(2018, 8, 1).unwrap(),
            status: ProfileStatus::Active,
        }
    }

    #[test]
    fn teacher_sees_only_assigned_students() {
        let teacher_id = ObjectId::new();
        let teacher = Principal::Teacher(account(Role::Teacher), teacher_profile(teacher_id));

        assert!(can_view(&teacher, &student_profile(Some(teacher_id))));
        assert!(!can_view(&teacher, &student_profile(Some(ObjectId::new()))));
        assert!(!can_view(&teacher, &student_profile(None)));
    }

    #[test]
    fn student_sees_only_themselves() {
        let own = student_profile(None);
        let principal = Principal::Student(account(Role::Student), own.clone());

        assert!(can_view(&principal, &own));
        assert!(!can_view(&principal, &student_profile(None)));
    }

    #[test]
    fn admin_sees_everyone() {
        let admin = Principal::Admin(account(Role::Admin));
        assert!(can_view(&admin, &student_profile(None)));
    }
}
