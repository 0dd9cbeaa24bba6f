use chrono::{NaiveDate, Utc};
use mongodb::bson::oid::ObjectId;

use school_mgmt_api::models::exam::Exam;
use school_mgmt_api::models::student::StudentProfile;
use school_mgmt_api::models::teacher::{ProfileStatus, TeacherProfile};
use school_mgmt_api::models::user::{Account, Role};
use school_mgmt_api::policy::{class_prefix, Principal};

fn account(role: Role) -> Account {
    Account {
        id: Some(ObjectId::new()),
        username: "someone".to_string(),
        email: "someone@example.com".to_string(),
        first_name: String::new(),
        last_name: String::new(),
        phone: String::new(),
        password_hash: String::new(),
        role,
        is_active: true,
        created_at: Utc::now(),
    }
}

fn admin() -> Principal {
    Principal::Admin(account(Role::Admin))
}

fn teacher(profile_id: ObjectId) -> Principal {
    Principal::Teacher(
        account(Role::Teacher),
        TeacherProfile {
            id: Some(profile_id),
            user_id: ObjectId::new(),
            phone: String::new(),
            subject_specialization: "Physics".to_string(),
            employee_id: "T-42".to_string(),
            date_of_joining: NaiveDate::from_ymd_opt(2019, 9, 1).unwrap(),
            status: ProfileStatus::Active,
        },
    )
}

fn student(class: &str) -> Principal {
    Principal::Student(
        account(Role::Student),
        StudentProfile {
            id: Some(ObjectId::new()),
            user_id: ObjectId::new(),
            phone: String::new(),
            roll_number: "R-1".to_string(),
            student_class: class.to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(2009, 5, 12).unwrap(),
            admission_date: NaiveDate::from_ymd_opt(2019, 9, 1).unwrap(),
            status: ProfileStatus::Active,
            assigned_teacher: None,
        },
    )
}

fn exam(teacher_id: Option<ObjectId>, target_class: &str) -> Exam {
    Exam {
        id: Some(ObjectId::new()),
        title: "Exam".to_string(),
        description: String::new(),
        teacher_id,
        target_class: target_class.to_string(),
        start_time: Utc::now(),
        duration_min: 45,
        created_at: Utc::now(),
        questions: Vec::new(),
    }
}

#[test]
fn test_admin_sees_and_manages_everything() {
    let admin = admin();
    let owned = exam(Some(ObjectId::new()), "10-A");
    let orphan = exam(None, "11");

    for exam in [&owned, &orphan] {
        assert!(admin.can_see_exam(exam));
        assert!(admin.can_manage_exam(exam));
        assert!(admin.can_view_exam_results(exam));
    }
}

#[test]
fn test_teacher_is_scoped_to_own_exams() {
    let own_id = ObjectId::new();
    let teacher = teacher(own_id);

    let own = exam(Some(own_id), "10-A");
    let foreign = exam(Some(ObjectId::new()), "10-A");
    let admin_authored = exam(None, "10-A");

    assert!(teacher.can_see_exam(&own));
    assert!(teacher.can_manage_exam(&own));
    assert!(teacher.can_view_exam_results(&own));

    for exam in [&foreign, &admin_authored] {
        assert!(!teacher.can_see_exam(exam));
        assert!(!teacher.can_manage_exam(exam));
        assert!(!teacher.can_view_exam_results(exam));
    }
}

#[test]
fn test_student_visibility_follows_class_prefix() {
    let student = student("10-B");

    assert!(student.can_see_exam(&exam(Some(ObjectId::new()), "10-A")));
    assert!(student.can_see_exam(&exam(None, "10")));
    assert!(!student.can_see_exam(&exam(None, "11")));
}

#[test]
fn test_student_without_numeric_class_sees_no_exams() {
    let student = student("junior");
    assert!(!student.can_see_exam(&exam(None, "junior")));
    assert!(!student.can_see_exam(&exam(None, "10")));
}

#[test]
fn test_students_never_manage_or_view_results() {
    let student = student("10");
    let target = exam(Some(ObjectId::new()), "10");

    assert!(student.can_see_exam(&target));
    assert!(!student.can_manage_exam(&target));
    assert!(!student.can_view_exam_results(&target));
}

#[test]
fn test_class_prefix_strips_non_digits() {
    assert_eq!(class_prefix("10-A"), "10");
    assert_eq!(class_prefix("10B"), "10");
    assert_eq!(class_prefix("Grade 7"), "7");
    assert_eq!(class_prefix("junior"), "");
}
