//! Authorization policy engine: a closed principal type plus independent
//! predicates composed at each call site. Every role decision in the crate is
//! an exhaustive match on `Principal`, so a new operation cannot silently
//! forget a role.

use mongodb::bson::{doc, oid::ObjectId};
use mongodb::Database;

use crate::error::ApiError;
use crate::middlewares::auth::JwtClaims;
use crate::models::exam::Exam;
use crate::models::student::StudentProfile;
use crate::models::teacher::TeacherProfile;
use crate::models::user::{Account, Role};

#[derive(Debug, Clone)]
pub enum Principal {
    Admin(Account),
    Teacher(Account, TeacherProfile),
    Student(Account, StudentProfile),
}

impl Principal {
    pub fn account(&self) -> &Account {
        match self {
            Principal::Admin(account) => account,
            Principal::Teacher(account, _) => account,
            Principal::Student(account, _) => account,
        }
    }

    pub fn account_id(&self) -> ObjectId {
        // Accounts loaded from the store always carry an id.
        self.account().id.unwrap_or_default()
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Principal::Admin(_))
    }

    pub fn teacher_profile(&self) -> Option<&TeacherProfile> {
        match self {
            Principal::Teacher(_, profile) => Some(profile),
            _ => None,
        }
    }

    pub fn student_profile(&self) -> Option<&StudentProfile> {
        match self {
            Principal::Student(_, profile) => Some(profile),
            _ => None,
        }
    }

    /// Ownership predicate: teacher-principal whose profile authored the exam.
    pub fn owns_exam(&self, exam: &Exam) -> bool {
        match self {
            Principal::Teacher(_, profile) => {
                exam.teacher_id.is_some() && exam.teacher_id == profile.id
            }
            Principal::Admin(_) | Principal::Student(..) => false,
        }
    }

    /// Visibility predicate for exam reads and listings.
    /// Students match by class prefix whether the exam is teacher- or
    /// admin-authored; an empty prefix never matches.
    pub fn can_see_exam(&self, exam: &Exam) -> bool {
        match self {
            Principal::Admin(_) => true,
            Principal::Teacher(_, profile) => {
                exam.teacher_id.is_some() && exam.teacher_id == profile.id
            }
            Principal::Student(_, profile) => {
                let own = class_prefix(&profile.student_class);
                !own.is_empty() && own == class_prefix(&exam.target_class)
            }
        }
    }

    /// Results are restricted to admins and the owning teacher.
    pub fn can_view_exam_results(&self, exam: &Exam) -> bool {
        match self {
            Principal::Admin(_) => true,
            Principal::Teacher(..) => self.owns_exam(exam),
            Principal::Student(..) => false,
        }
    }

    pub fn can_manage_exam(&self, exam: &Exam) -> bool {
        match self {
            Principal::Admin(_) => true,
            Principal::Teacher(..) => self.owns_exam(exam),
            Principal::Student(..) => false,
        }
    }
}

/// Coarse class level from a class label: strip every non-digit character.
/// "10-A" and "10B" both map to "10"; "junior" maps to "".
pub fn class_prefix(label: &str) -> String {
    label.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Resolve the authenticated principal from validated JWT claims.
/// Inactive accounts and claims whose role no longer matches a profile are
/// rejected as authentication failures.
pub async fn resolve_principal(
    mongo: &Database,
    claims: &JwtClaims,
) -> Result<Principal, ApiError> {
    let account_id = ObjectId::parse_str(&claims.sub)
        .map_err(|_| ApiError::authentication("Invalid token subject"))?;

    let accounts = mongo.collection::<Account>("users");
    let account = accounts
        .find_one(doc! { "_id": account_id })
        .await?
        .ok_or_else(|| ApiError::authentication("Account not found"))?;

    if !account.is_active {
        return Err(ApiError::authentication("Account is deactivated"));
    }

    match account.role {
        Role::Admin => Ok(Principal::Admin(account)),
        Role::Teacher => {
            let profile = mongo
                .collection::<TeacherProfile>("teachers")
                .find_one(doc! { "user_id": account_id })
                .await?
                .ok_or_else(|| ApiError::authentication("Teacher profile not found"))?;
            Ok(Principal::Teacher(account, profile))
        }
        Role::Student => {
            let profile = mongo
                .collection::<StudentProfile>("students")
                .find_one(doc! { "user_id": account_id })
                .await?
                .ok_or_else(|| ApiError::authentication("Student profile not found"))?;
            Ok(Principal::Student(account, profile))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::teacher::ProfileStatus;
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

    fn teacher_principal() -> (Principal, ObjectId) {
        let profile_id = ObjectId::new();
        let profile = TeacherProfile {
            id: Some(profile_id),
            user_id: ObjectId::new(),
            phone: String::new(),
            subject_specialization: "Math".to_string(),
            employee_id: "T001".to_string(),
            date_of_joining: NaiveDate::from_ymd_opt(2020, 9, 1).unwrap(),
            status: ProfileStatus::Active,
        };
        (Principal::Teacher(account(Role::Teacher), profile), profile_id)
    }

    fn student_principal(class: &str) -> Principal {
        let profile = StudentProfile {
            id: Some(ObjectId::new()),
            user_id: ObjectId::new(),
            phone: String::new(),
            roll_number: "R1".to_string(),
            student_class: class.to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(2010, 5, 1).unwrap(),
            admission_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            status: ProfileStatus::Active,
            assigned_teacher: None,
        };
        Principal::Student(account(Role::Student), profile)
    }

    fn exam_for(teacher_id: Option<ObjectId>, target_class: &str) -> Exam {
        Exam {
            id: Some(ObjectId::new()),
            title: "Exam".to_string(),
            description: String::new(),
            teacher_id,
            target_class: target_class.to_string(),
            start_time: Utc::now(),
            duration_min: 60,
            created_at: Utc::now(),
            questions: Vec::new(),
        }
    }

    #[test]
    fn class_prefix_strips_non_digits() {
        assert_eq!(class_prefix("10-A"), "10");
        assert_eq!(class_prefix("10B"), "10");
        assert_eq!(class_prefix("9"), "9");
        assert_eq!(class_prefix("junior"), "");
    }

    #[test]
    fn admin_sees_everything() {
        let admin = Principal::Admin(account(Role::Admin));
        let exam = exam_for(Some(ObjectId::new()), "10");
        assert!(admin.can_see_exam(&exam));
        assert!(admin.can_manage_exam(&exam));
        assert!(admin.can_view_exam_results(&exam));
    }

    #[test]
    fn teacher_sees_only_own_exams() {
        let (teacher, profile_id) = teacher_principal();
        let own = exam_for(Some(profile_id), "10");
        let foreign = exam_for(Some(ObjectId::new()), "10");
        let admin_authored = exam_for(None, "10");

        assert!(teacher.can_see_exam(&own));
        assert!(teacher.owns_exam(&own));
        assert!(!teacher.can_see_exam(&foreign));
        assert!(!teacher.can_view_exam_results(&foreign));
        assert!(!teacher.can_see_exam(&admin_authored));
    }

    #[test]
    fn student_matches_by_class_prefix() {
        let student = student_principal("10-A");
        assert!(student.can_see_exam(&exam_for(Some(ObjectId::new()), "10")));
        assert!(student.can_see_exam(&exam_for(None, "10-B")));
        assert!(!student.can_see_exam(&exam_for(None, "9")));
    }

    #[test]
    fn student_with_non_numeric_class_sees_nothing() {
        let student = student_principal("junior");
        assert!(!student.can_see_exam(&exam_for(None, "junior")));
    }

    #[test]
    fn students_never_manage_or_view_results() {
        let student = student_principal("10-A");
        let exam = exam_for(None, "10");
        assert!(!student.can_manage_exam(&exam));
        assert!(!student.can_view_exam_results(&exam));
    }
}
