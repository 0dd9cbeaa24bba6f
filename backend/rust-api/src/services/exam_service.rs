use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, to_bson};
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};
use mongodb::Database;
use validator::Validate;

use crate::error::ApiError;
use crate::metrics::EXAM_SUBMISSIONS_TOTAL;
use crate::models::exam::{
    AnswerOption, Exam, ExamAttempt, ExamOut, ExamPayload, Question, SubmitExamRequest,
};
use crate::models::teacher::TeacherProfile;
use crate::models::user::Account;
use crate::policy::Principal;

use super::grading::grade_submission;

pub struct ExamService {
    mongo: Database,
}

impl ExamService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    /// Create an exam with its embedded questions/options in one insert.
    /// A teacher principal always authors under their own profile; only an
    /// admin may set (or omit) the teacher field from the payload.
    pub async fn create_exam(
        &self,
        principal: &Principal,
        payload: ExamPayload,
    ) -> Result<ExamOut, ApiError> {
        payload
            .validate()
            .map_err(|e| ApiError::validation(e.to_string()))?;
        let teacher_id = self.resolve_author(principal, &payload).await?;
        let questions = build_questions(&payload)?;

        let exam = Exam {
            id: None,
            title: payload.title,
            description: payload.description,
            teacher_id,
            target_class: payload.target_class,
            start_time: payload.start_time,
            duration_min: payload.duration_min,
            created_at: Utc::now(),
            questions,
        };

        let insert = self
            .mongo
            .collection::<Exam>("exams")
            .insert_one(&exam)
            .await?;

        let exam_id = insert
            .inserted_id
            .as_object_id()
            .ok_or_else(|| ApiError::internal(anyhow::anyhow!("Missing inserted exam id")))?;

        tracing::info!(exam_id = %exam_id.to_hex(), "Exam created");

        let mut created = exam;
        created.id = Some(exam_id);
        let teacher_name = self.teacher_name(created.teacher_id).await?;
        Ok(ExamOut::from_exam(created, teacher_name))
    }

    /// Replace-children update: the whole questions array is rebuilt from the
    /// payload with fresh ids; no incremental diffing.
    pub async fn update_exam(
        &self,
        principal: &Principal,
        exam_id: &str,
        payload: ExamPayload,
    ) -> Result<ExamOut, ApiError> {
        payload
            .validate()
            .map_err(|e| ApiError::validation(e.to_string()))?;
        let exam_oid = parse_object_id(exam_id)?;
        let exams = self.mongo.collection::<Exam>("exams");

        let existing = exams
            .find_one(doc! { "_id": exam_oid })
            .await?
            .ok_or_else(|| ApiError::not_found("Exam not found"))?;

        if !principal.can_manage_exam(&existing) {
            return Err(ApiError::permission("Not allowed to modify this exam"));
        }

        let teacher_id = self.resolve_author(principal, &payload).await?;
        let questions = build_questions(&payload)?;

        let updated = Exam {
            id: Some(exam_oid),
            title: payload.title,
            description: payload.description,
            teacher_id,
            target_class: payload.target_class,
            start_time: payload.start_time,
            duration_min: payload.duration_min,
            created_at: existing.created_at,
            questions,
        };

        exams.replace_one(doc! { "_id": exam_oid }, &updated).await?;
        tracing::info!(exam_id = %exam_oid.to_hex(), "Exam updated (children replaced)");

        let teacher_name = self.teacher_name(updated.teacher_id).await?;
        Ok(ExamOut::from_exam(updated, teacher_name))
    }

    /// Delete an exam; cascades to its attempts (questions/options/answers die
    /// with their parent documents).
    pub async fn delete_exam(&self, principal: &Principal, exam_id: &str) -> Result<(), ApiError> {
        let exam_oid = parse_object_id(exam_id)?;
        let exams = self.mongo.collection::<Exam>("exams");

        let existing = exams
            .find_one(doc! { "_id": exam_oid })
            .await?
            .ok_or_else(|| ApiError::not_found("Exam not found"))?;

        if !principal.can_manage_exam(&existing) {
            return Err(ApiError::permission("Not allowed to delete this exam"));
        }

        exams.delete_one(doc! { "_id": exam_oid }).await?;
        self.mongo
            .collection::<ExamAttempt>("attempts")
            .delete_many(doc! { "exam_id": exam_oid })
            .await?;

        tracing::info!(exam_id = %exam_oid.to_hex(), "Exam deleted with attempts");
        Ok(())
    }

    /// Role-filtered listing (admin: all, teacher: own, student: class-prefix
    /// match). The student rule lives in `Principal::can_see_exam`.
    pub async fn list_exams(&self, principal: &Principal) -> Result<Vec<ExamOut>, ApiError> {
        let exams = self.visible_exams(principal).await?;

        let mut out = Vec::with_capacity(exams.len());
        for exam in exams {
            let teacher_name = self.teacher_name(exam.teacher_id).await?;
            out.push(ExamOut::from_exam(exam, teacher_name));
        }
        Ok(out)
    }

    pub async fn get_exam(&self, principal: &Principal, exam_id: &str) -> Result<ExamOut, ApiError> {
        let exam = self.load_visible_exam(principal, exam_id).await?;
        let teacher_name = self.teacher_name(exam.teacher_id).await?;
        Ok(ExamOut::from_exam(exam, teacher_name))
    }

    /// Backlog view for students: exams whose end time has passed and which
    /// this student never attempted.
    pub async fn unattempted_exams(&self, principal: &Principal) -> Result<Vec<ExamOut>, ApiError> {
        let student = principal
            .student_profile()
            .ok_or_else(|| ApiError::permission("Only students have an exam backlog"))?;
        let student_id = student.id.unwrap_or_default();

        let now = Utc::now();
        let visible = self.visible_exams(principal).await?;

        let attempts = self.mongo.collection::<ExamAttempt>("attempts");
        let attempted: Vec<ObjectId> = attempts
            .find(doc! { "student_id": student_id })
            .await?
            .try_collect::<Vec<ExamAttempt>>()
            .await?
            .into_iter()
            .map(|a| a.exam_id)
            .collect();

        let mut out = Vec::new();
        for exam in visible {
            let id = exam.id.unwrap_or_default();
            if exam.end_time() < now && !attempted.contains(&id) {
                let teacher_name = self.teacher_name(exam.teacher_id).await?;
                out.push(ExamOut::from_exam(exam, teacher_name));
            }
        }
        Ok(out)
    }

    /// One-shot submission: get-or-create the attempt, grade leniently, and
    /// finalize with a single conditional document update so no reader ever
    /// sees answers without a score. A finished attempt rejects resubmission.
    pub async fn submit_exam(
        &self,
        principal: &Principal,
        exam_id: &str,
        req: SubmitExamRequest,
    ) -> Result<f64, ApiError> {
        let student = principal
            .student_profile()
            .ok_or_else(|| ApiError::permission("Only students can submit exams"))?;
        let student_id = student.id.unwrap_or_default();

        let exam = self.load_visible_exam(principal, exam_id).await?;
        let exam_oid = exam.id.unwrap_or_default();

        let attempts = self.mongo.collection::<ExamAttempt>("attempts");

        // Get-or-create under the unique (student_id, exam_id) index; the
        // upsert makes concurrent duplicate creation resolve to a single row.
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        let attempt = attempts
            .find_one_and_update(
                doc! { "student_id": student_id, "exam_id": exam_oid },
                doc! {
                    "$setOnInsert": {
                        "student_id": student_id,
                        "exam_id": exam_oid,
                        "started_at": mongodb::bson::DateTime::now(),
                        "status": "unattempted",
                        "answers": [],
                    }
                },
            )
            .with_options(options)
            .await?
            .ok_or_else(|| ApiError::internal(anyhow::anyhow!("Attempt upsert returned nothing")))?;

        if attempt.finished_at.is_some() {
            EXAM_SUBMISSIONS_TOTAL.with_label_values(&["rejected"]).inc();
            return Err(ApiError::AlreadySubmitted);
        }

        let graded = grade_submission(&exam, &req.answers);
        let answers_bson = to_bson(&graded.answers).map_err(ApiError::internal)?;

        // The finished_at guard serializes racing submissions: the loser
        // matches zero documents and is rejected.
        let update = attempts
            .update_one(
                doc! { "_id": attempt.id, "finished_at": { "$eq": null } },
                doc! {
                    "$set": {
                        "answers": answers_bson,
                        "score": graded.score,
                        "status": "attempted",
                        "finished_at": mongodb::bson::DateTime::now(),
                    }
                },
            )
            .await?;

        if update.modified_count == 0 {
            EXAM_SUBMISSIONS_TOTAL.with_label_values(&["rejected"]).inc();
            return Err(ApiError::AlreadySubmitted);
        }

        EXAM_SUBMISSIONS_TOTAL.with_label_values(&["scored"]).inc();
        tracing::info!(
            exam_id = %exam_oid.to_hex(),
            student_id = %student_id.to_hex(),
            score = graded.score,
            total = graded.total,
            "Exam submission scored"
        );

        Ok(graded.score)
    }

    async fn visible_exams(&self, principal: &Principal) -> Result<Vec<Exam>, ApiError> {
        let exams = self.mongo.collection::<Exam>("exams");

        let filter = match principal {
            Principal::Teacher(_, profile) => doc! { "teacher_id": profile.id },
            Principal::Admin(_) | Principal::Student(..) => doc! {},
        };

        let all: Vec<Exam> = exams.find(filter).await?.try_collect().await?;
        Ok(all
            .into_iter()
            .filter(|exam| principal.can_see_exam(exam))
            .collect())
    }

    /// Visibility doubles as existence: an exam outside the principal's view
    /// is reported as absent, not forbidden.
    async fn load_visible_exam(
        &self,
        principal: &Principal,
        exam_id: &str,
    ) -> Result<Exam, ApiError> {
        let exam_oid = parse_object_id(exam_id)?;
        let exam = self
            .mongo
            .collection::<Exam>("exams")
            .find_one(doc! { "_id": exam_oid })
            .await?
            .filter(|exam| principal.can_see_exam(exam))
            .ok_or_else(|| ApiError::not_found("Exam not found"))?;
        Ok(exam)
    }

    async fn resolve_author(
        &self,
        principal: &Principal,
        payload: &ExamPayload,
    ) -> Result<Option<ObjectId>, ApiError> {
        match principal {
            // A teacher cannot author on behalf of anyone else.
            Principal::Teacher(_, profile) => Ok(profile.id),
            Principal::Admin(_) => match &payload.teacher {
                Some(raw) => {
                    let teacher_oid = ObjectId::parse_str(raw)
                        .map_err(|_| ApiError::validation("Invalid teacher id"))?;
                    self.mongo
                        .collection::<TeacherProfile>("teachers")
                        .find_one(doc! { "_id": teacher_oid })
                        .await?
                        .ok_or_else(|| ApiError::validation("Teacher not found"))?;
                    Ok(Some(teacher_oid))
                }
                None => Ok(None),
            },
            Principal::Student(..) => Err(ApiError::permission("Students cannot author exams")),
        }
    }

    async fn teacher_name(&self, teacher_id: Option<ObjectId>) -> Result<Option<String>, ApiError> {
        let Some(teacher_id) = teacher_id else {
            return Ok(None);
        };
        let Some(profile) = self
            .mongo
            .collection::<TeacherProfile>("teachers")
            .find_one(doc! { "_id": teacher_id })
            .await?
        else {
            return Ok(None);
        };
        let account = self
            .mongo
            .collection::<Account>("users")
            .find_one(doc! { "_id": profile.user_id })
            .await?;
        Ok(account.map(|a| a.full_name()))
    }
}

/// Authoring-boundary validation: every exam needs at least one question,
/// every question at least one option with exactly one marked correct.
pub fn validate_exam_payload(payload: &ExamPayload) -> Result<(), ApiError> {
    if payload.questions.is_empty() {
        return Err(ApiError::validation("At least one question required."));
    }
    for (index, question) in payload.questions.iter().enumerate() {
        if question.text.trim().is_empty() {
            return Err(ApiError::validation(format!(
                "Question {} has no text.",
                index + 1
            )));
        }
        if question.options.is_empty() {
            return Err(ApiError::validation("Each question needs options."));
        }
        let correct = question.options.iter().filter(|o| o.is_correct).count();
        if correct != 1 {
            return Err(ApiError::validation(format!(
                "Question {} must have exactly one correct option.",
                index + 1
            )));
        }
    }
    Ok(())
}

fn build_questions(payload: &ExamPayload) -> Result<Vec<Question>, ApiError> {
    validate_exam_payload(payload)?;

    Ok(payload
        .questions
        .iter()
        .map(|q| Question {
            id: ObjectId::new(),
            text: q.text.clone(),
            options: q
                .options
                .iter()
                .map(|o| AnswerOption {
                    id: ObjectId::new(),
                    text: o.text.clone(),
                    is_correct: o.is_correct,
                })
                .collect(),
        })
        .collect())
}

fn parse_object_id(raw: &str) -> Result<ObjectId, ApiError> {
    // Unparseable ids can't reference anything, so they read as absent.
    ObjectId::parse_str(raw).map_err(|_| ApiError::not_found("Exam not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::exam::{OptionInput, QuestionInput};
    use chrono::Utc;

    fn payload(questions: Vec<QuestionInput>) -> ExamPayload {
        ExamPayload {
            title: "Midterm".to_string(),
            description: String::new(),
            teacher: None,
            target_class: "10".to_string(),
            start_time: Utc::now(),
            duration_min: 45,
            questions,
        }
    }

    fn question(options: Vec<(bool, &str)>) -> QuestionInput {
        QuestionInput {
            text: "What?".to_string(),
            options: options
                .into_iter()
                .map(|(is_correct, text)| OptionInput {
                    text: text.to_string(),
                    is_correct,
                })
                .collect(),
        }
    }

    #[test]
    fn rejects_exam_without_questions() {
        let err = validate_exam_payload(&payload(vec![])).unwrap_err();
        assert!(err.to_string().contains("At least one question"));
    }

    #[test]
    fn rejects_question_without_options() {
        let err = validate_exam_payload(&payload(vec![question(vec![])])).unwrap_err();
        assert!(err.to_string().contains("needs options"));
    }

    #[test]
    fn rejects_question_without_a_correct_option() {
        let q = question(vec![(false, "A"), (false, "B")]);
        assert!(validate_exam_payload(&payload(vec![q])).is_err());
    }

    #[test]
    fn rejects_question_with_two_correct_options() {
        let q = question(vec![(true, "A"), (true, "B")]);
        assert!(validate_exam_payload(&payload(vec![q])).is_err());
    }

    #[test]
    fn accepts_single_correct_questions() {
        let q1 = question(vec![(true, "A"), (false, "B")]);
        let q2 = question(vec![(false, "C"), (true, "D")]);
        assert!(validate_exam_payload(&payload(vec![q1, q2])).is_ok());
    }

    #[test]
    fn build_questions_preserves_order_and_assigns_ids() {
        let q1 = question(vec![(true, "A"), (false, "B")]);
        let q2 = question(vec![(false, "C"), (true, "D")]);
        let built = build_questions(&payload(vec![q1, q2])).unwrap();

        assert_eq!(built.len(), 2);
        assert_eq!(built[0].options.len(), 2);
        assert_eq!(built[0].options[0].text, "A");
        assert_eq!(built[1].options[1].text, "D");
        assert_ne!(built[0].id, built[1].id);
    }
}
