use chrono::{DateTime, Duration, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{bson_datetime_as_chrono, bson_datetime_as_chrono_option};

/// Exam aggregate stored in the "exams" collection. Questions and options are
/// embedded so authoring and the replace-children update are single-document
/// writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exam {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// TeacherProfile id; None means authored by an admin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_id: Option<ObjectId>,
    pub target_class: String,
    #[serde(with = "bson_datetime_as_chrono")]
    pub start_time: DateTime<Utc>,
    pub duration_min: u32,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    pub questions: Vec<Question>,
}

impl Exam {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + Duration::minutes(i64::from(self.duration_min))
    }

    pub fn question(&self, question_id: &ObjectId) -> Option<&Question> {
        self.questions.iter().find(|q| &q.id == question_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub text: String,
    pub options: Vec<AnswerOption>,
}

impl Question {
    pub fn option(&self, option_id: &ObjectId) -> Option<&AnswerOption> {
        self.options.iter().find(|o| &o.id == option_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerOption {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

// ── Authoring payloads ──────────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
pub struct ExamPayload {
    #[validate(length(min = 1, max = 120))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// TeacherProfile id (hex); ignored unless the caller is an admin.
    pub teacher: Option<String>,
    #[validate(length(min = 1))]
    pub target_class: String,
    pub start_time: DateTime<Utc>,
    #[validate(range(min = 1))]
    pub duration_min: u32,
    pub questions: Vec<QuestionInput>,
}

#[derive(Debug, Deserialize)]
pub struct QuestionInput {
    pub text: String,
    pub options: Vec<OptionInput>,
}

#[derive(Debug, Deserialize)]
pub struct OptionInput {
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

// ── Read DTOs (student-safe: no is_correct) ─────────────────────────

#[derive(Debug, Serialize)]
pub struct OptionOut {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct QuestionOut {
    pub id: String,
    pub text: String,
    pub options: Vec<OptionOut>,
}

#[derive(Debug, Serialize)]
pub struct ExamOut {
    pub id: String,
    pub title: String,
    pub description: String,
    pub teacher_name: Option<String>,
    pub target_class: String,
    pub start_time: DateTime<Utc>,
    pub duration_min: u32,
    pub end_time: DateTime<Utc>,
    pub questions: Vec<QuestionOut>,
}

impl ExamOut {
    pub fn from_exam(exam: Exam, teacher_name: Option<String>) -> Self {
        let end_time = exam.end_time();
        ExamOut {
            id: exam.id.map(|id| id.to_hex()).unwrap_or_default(),
            title: exam.title,
            description: exam.description,
            teacher_name,
            target_class: exam.target_class,
            start_time: exam.start_time,
            duration_min: exam.duration_min,
            end_time,
            questions: exam
                .questions
                .into_iter()
                .map(|q| QuestionOut {
                    id: q.id.to_hex(),
                    text: q.text,
                    options: q
                        .options
                        .into_iter()
                        .map(|o| OptionOut {
                            id: o.id.to_hex(),
                            text: o.text,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

// ── Attempts ────────────────────────────────────────────────────────

/// One student's single try at one exam; unique on (student_id, exam_id).
/// Answers are embedded so the finalize step is one atomic document update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamAttempt {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub student_id: ObjectId,
    pub exam_id: ObjectId,
    #[serde(with = "bson_datetime_as_chrono")]
    pub started_at: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub status: AttemptStatus,
    #[serde(default)]
    pub answers: Vec<AnswerRecord>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Unattempted,
    Attempted,
}

/// At most one recorded answer per question per attempt; latest choice wins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerRecord {
    pub question_id: ObjectId,
    pub option_id: ObjectId,
}

#[derive(Debug, Deserialize)]
pub struct SubmitExamRequest {
    pub answers: Vec<AnswerInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnswerInput {
    pub question_id: String,
    pub option_id: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitExamResponse {
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_time_is_start_plus_duration() {
        let start = Utc::now();
        let exam = Exam {
            id: None,
            title: "Algebra".to_string(),
            description: String::new(),
            teacher_id: None,
            target_class: "10".to_string(),
            start_time: start,
            duration_min: 45,
            created_at: start,
            questions: Vec::new(),
        };
        assert_eq!(exam.end_time(), start + Duration::minutes(45));
    }

    #[test]
    fn exam_out_hides_correct_flags() {
        let question = Question {
            id: ObjectId::new(),
            text: "2+2?".to_string(),
            options: vec![AnswerOption {
                id: ObjectId::new(),
                text: "4".to_string(),
                is_correct: true,
            }],
        };
        let exam = Exam {
            id: Some(ObjectId::new()),
            title: "Math".to_string(),
            description: String::new(),
            teacher_id: None,
            target_class: "10".to_string(),
            start_time: Utc::now(),
            duration_min: 30,
            created_at: Utc::now(),
            questions: vec![question],
        };

        let out = ExamOut::from_exam(exam, None);
        let json = serde_json::to_string(&out).unwrap();
        assert!(!json.contains("is_correct"));
    }
}
