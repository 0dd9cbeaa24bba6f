use std::collections::HashMap;

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::Database;
use serde::Serialize;

use crate::error::ApiError;
use crate::models::exam::{Exam, ExamAttempt};
use crate::models::student::StudentProfile;
use crate::models::user::Account;
use crate::policy::Principal;

#[derive(Debug, Serialize)]
pub struct AttemptRow {
    pub student_name: String,
    pub score: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ExamResults {
    pub exam: String,
    pub average_score: Option<f64>,
    pub attempts: Vec<AttemptRow>,
}

#[derive(Debug, Serialize)]
pub struct ClassResultRow {
    pub exam: String,
    pub student_name: String,
    pub score: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct MyResultRow {
    pub exam: String,
    pub score: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

pub struct ResultsService {
    mongo: Database,
}

impl ResultsService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    /// Per-exam aggregation, restricted to admins and the owning teacher.
    pub async fn exam_results(
        &self,
        principal: &Principal,
        exam_id: &str,
    ) -> Result<ExamResults, ApiError> {
        let exam_oid = ObjectId::parse_str(exam_id)
            .map_err(|_| ApiError::not_found("Exam not found"))?;

        let exam = self
            .mongo
            .collection::<Exam>("exams")
            .find_one(doc! { "_id": exam_oid })
            .await?
            .ok_or_else(|| ApiError::not_found("Exam not found"))?;

        if !principal.can_view_exam_results(&exam) {
            return Err(ApiError::permission("Not allowed to view these results"));
        }

        let attempts: Vec<ExamAttempt> = self
            .mongo
            .collection::<ExamAttempt>("attempts")
            .find(doc! { "exam_id": exam_oid })
            .await?
            .try_collect()
            .await?;

        let names = self.student_names(&attempts).await?;

        let rows: Vec<AttemptRow> = attempts
            .iter()
            .map(|attempt| AttemptRow {
                student_name: names
                    .get(&attempt.student_id)
                    .cloned()
                    .unwrap_or_else(|| "Unknown".to_string()),
                score: attempt.score,
                started_at: attempt.started_at,
                finished_at: attempt.finished_at,
            })
            .collect();

        Ok(ExamResults {
            exam: exam.title,
            average_score: average(attempts.iter().filter_map(|a| a.score)),
            attempts: rows,
        })
    }

    /// Flat projection of every attempt across every exam of one class; no
    /// aggregation, one row per attempt.
    pub async fn class_results(
        &self,
        principal: &Principal,
        class_id: &str,
    ) -> Result<Vec<ClassResultRow>, ApiError> {
        match principal {
            Principal::Admin(_) | Principal::Teacher(..) => {}
            Principal::Student(..) => {
                return Err(ApiError::permission("Not allowed to view class results"))
            }
        }

        let exams: Vec<Exam> = self
            .mongo
            .collection::<Exam>("exams")
            .find(doc! { "target_class": class_id })
            .await?
            .try_collect()
            .await?;

        let mut rows = Vec::new();
        for exam in exams {
            let exam_oid = exam.id.unwrap_or_default();
            let attempts: Vec<ExamAttempt> = self
                .mongo
                .collection::<ExamAttempt>("attempts")
                .find(doc! { "exam_id": exam_oid })
                .await?
                .try_collect()
                .await?;

            let names = self.student_names(&attempts).await?;
            for attempt in attempts {
                rows.push(ClassResultRow {
                    exam: exam.title.clone(),
                    student_name: names
                        .get(&attempt.student_id)
                        .cloned()
                        .unwrap_or_else(|| "Unknown".to_string()),
                    score: attempt.score,
                    started_at: attempt.started_at,
                    finished_at: attempt.finished_at,
                });
            }
        }
        Ok(rows)
    }

    /// The requesting student's own attempt history.
    pub async fn my_results(&self, principal: &Principal) -> Result<Vec<MyResultRow>, ApiError> {
        let student = principal
            .student_profile()
            .ok_or_else(|| ApiError::permission("Only students have personal results"))?;
        let student_id = student.id.unwrap_or_default();

        let attempts: Vec<ExamAttempt> = self
            .mongo
            .collection::<ExamAttempt>("attempts")
            .find(doc! { "student_id": student_id })
            .await?
            .try_collect()
            .await?;

        let mut rows = Vec::with_capacity(attempts.len());
        for attempt in attempts {
            let title = self
                .mongo
                .collection::<Exam>("exams")
                .find_one(doc! { "_id": attempt.exam_id })
                .await?
                .map(|e| e.title)
                .unwrap_or_else(|| "Deleted exam".to_string());

            rows.push(MyResultRow {
                exam: title,
                score: attempt.score,
                started_at: attempt.started_at,
                finished_at: attempt.finished_at,
            });
        }
        Ok(rows)
    }

    /// Batched student-name lookup: attempts -> profiles -> accounts.
    async fn student_names(
        &self,
        attempts: &[ExamAttempt],
    ) -> Result<HashMap<ObjectId, String>, ApiError> {
        let student_ids: Vec<ObjectId> = attempts.iter().map(|a| a.student_id).collect();
        if student_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let profiles: Vec<StudentProfile> = self
            .mongo
            .collection::<StudentProfile>("students")
            .find(doc! { "_id": { "$in": student_ids } })
            .await?
            .try_collect()
            .await?;

        let user_ids: Vec<ObjectId> = profiles.iter().map(|p| p.user_id).collect();
        let accounts: Vec<Account> = self
            .mongo
            .collection::<Account>("users")
            .find(doc! { "_id": { "$in": user_ids } })
            .await?
            .try_collect()
            .await?;

        let accounts_by_id: HashMap<ObjectId, &Account> = accounts
            .iter()
            .filter_map(|a| a.id.map(|id| (id, a)))
            .collect();

        Ok(profiles
            .into_iter()
            .filter_map(|profile| {
                let name = accounts_by_id.get(&profile.user_id)?.full_name();
                Some((profile.id?, name))
            })
            .collect())
    }
}

fn average(scores: impl Iterator<Item = f64>) -> Option<f64> {
    let collected: Vec<f64> = scores.collect();
    if collected.is_empty() {
        return None;
    }
    Some(collected.iter().sum::<f64>() / collected.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_of_no_scores_is_none() {
        assert_eq!(average(std::iter::empty()), None);
    }

    #[test]
    fn average_ignores_nothing_once_filtered() {
        let avg = average([100.0, 50.0, 0.0].into_iter()).unwrap();
        assert!((avg - 50.0).abs() < f64::EPSILON);
    }
}
