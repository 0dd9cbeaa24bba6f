//! Pure scoring rules for exam submissions. Kept free of storage concerns so
//! the grading semantics are testable in isolation.

use mongodb::bson::oid::ObjectId;

use crate::models::exam::{AnswerInput, AnswerRecord, Exam};

#[derive(Debug, PartialEq)]
pub struct GradedSubmission {
    /// One record per question, latest choice wins.
    pub answers: Vec<AnswerRecord>,
    /// 0..=100, two decimal places; 0 when nothing was submitted.
    pub score: f64,
    pub correct: u32,
    pub total: u32,
}

/// Grade a raw answer set against an exam.
///
/// Every submitted entry counts toward the denominator, including entries
/// whose question/option reference is invalid or mismatched; those entries
/// are otherwise skipped rather than failing the submission. Entries that
/// repeat a question overwrite the recorded answer but still count as
/// processed entries.
pub fn grade_submission(exam: &Exam, answers: &[AnswerInput]) -> GradedSubmission {
    let mut recorded: Vec<AnswerRecord> = Vec::new();
    let mut correct: u32 = 0;
    let mut total: u32 = 0;

    for entry in answers {
        total += 1;

        let (question_id, option_id) = match (
            ObjectId::parse_str(&entry.question_id),
            ObjectId::parse_str(&entry.option_id),
        ) {
            (Ok(q), Ok(o)) => (q, o),
            _ => continue,
        };

        let Some(question) = exam.question(&question_id) else {
            continue;
        };
        let Some(option) = question.option(&option_id) else {
            continue;
        };

        match recorded.iter_mut().find(|r| r.question_id == question_id) {
            Some(record) => record.option_id = option_id,
            None => recorded.push(AnswerRecord {
                question_id,
                option_id,
            }),
        }

        if option.is_correct {
            correct += 1;
        }
    }

    let score = if total == 0 {
        0.0
    } else {
        round2(f64::from(correct) / f64::from(total) * 100.0)
    };

    GradedSubmission {
        answers: recorded,
        score,
        correct,
        total,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::exam::{AnswerOption, Question};
    use chrono::Utc;

    fn exam_with_two_questions() -> Exam {
        let q1 = Question {
            id: ObjectId::new(),
            text: "Q1".to_string(),
            options: vec![
                AnswerOption {
                    id: ObjectId::new(),
                    text: "A".to_string(),
                    is_correct: true,
                },
                AnswerOption {
                    id: ObjectId::new(),
                    text: "B".to_string(),
                    is_correct: false,
                },
            ],
        };
        let q2 = Question {
            id: ObjectId::new(),
            text: "Q2".to_string(),
            options: vec![
                AnswerOption {
                    id: ObjectId::new(),
                    text: "C".to_string(),
                    is_correct: false,
                },
                AnswerOption {
                    id: ObjectId::new(),
                    text: "D".to_string(),
                    is_correct: true,
                },
            ],
        };
        Exam {
            id: Some(ObjectId::new()),
            title: "Exam".to_string(),
            description: String::new(),
            teacher_id: None,
            target_class: "10".to_string(),
            start_time: Utc::now(),
            duration_min: 60,
            created_at: Utc::now(),
            questions: vec![q1, q2],
        }
    }

    fn answer(q: &ObjectId, o: &ObjectId) -> AnswerInput {
        AnswerInput {
            question_id: q.to_hex(),
            option_id: o.to_hex(),
        }
    }

    #[test]
    fn all_correct_scores_100() {
        let exam = exam_with_two_questions();
        let a = answer(&exam.questions[0].id, &exam.questions[0].options[0].id);
        let d = answer(&exam.questions[1].id, &exam.questions[1].options[1].id);

        let graded = grade_submission(&exam, &[a, d]);
        assert_eq!(graded.score, 100.0);
        assert_eq!(graded.answers.len(), 2);
    }

    #[test]
    fn one_wrong_scores_50() {
        let exam = exam_with_two_questions();
        let b = answer(&exam.questions[0].id, &exam.questions[0].options[1].id);
        let d = answer(&exam.questions[1].id, &exam.questions[1].options[1].id);

        let graded = grade_submission(&exam, &[b, d]);
        assert_eq!(graded.score, 50.0);
    }

    #[test]
    fn empty_submission_scores_zero() {
        let exam = exam_with_two_questions();
        let graded = grade_submission(&exam, &[]);
        assert_eq!(graded.score, 0.0);
        assert_eq!(graded.total, 0);
        assert!(graded.answers.is_empty());
    }

    #[test]
    fn invalid_option_reference_still_counts_toward_denominator() {
        let exam = exam_with_two_questions();
        let a = answer(&exam.questions[0].id, &exam.questions[0].options[0].id);
        // Option from Q1 submitted against Q2: mismatched, skipped, counted.
        let mismatched = answer(&exam.questions[1].id, &exam.questions[0].options[0].id);

        let graded = grade_submission(&exam, &[a, mismatched]);
        assert_eq!(graded.total, 2);
        assert_eq!(graded.correct, 1);
        assert_eq!(graded.score, 50.0);
        assert_eq!(graded.answers.len(), 1);
    }

    #[test]
    fn unknown_question_is_skipped_but_counted() {
        let exam = exam_with_two_questions();
        let stray = AnswerInput {
            question_id: ObjectId::new().to_hex(),
            option_id: ObjectId::new().to_hex(),
        };
        let a = answer(&exam.questions[0].id, &exam.questions[0].options[0].id);

        let graded = grade_submission(&exam, &[stray, a]);
        assert_eq!(graded.total, 2);
        assert_eq!(graded.answers.len(), 1);
        assert_eq!(graded.score, 50.0);
    }

    #[test]
    fn malformed_ids_are_skipped_but_counted() {
        let exam = exam_with_two_questions();
        let garbage = AnswerInput {
            question_id: "not-an-id".to_string(),
            option_id: "also-not".to_string(),
        };
        let graded = grade_submission(&exam, &[garbage]);
        assert_eq!(graded.total, 1);
        assert_eq!(graded.score, 0.0);
    }

    #[test]
    fn repeated_question_overwrites_answer_keeping_one_record() {
        let exam = exam_with_two_questions();
        let q1 = &exam.questions[0];
        let first = answer(&q1.id, &q1.options[1].id);
        let second = answer(&q1.id, &q1.options[0].id);

        let graded = grade_submission(&exam, &[first, second]);
        assert_eq!(graded.answers.len(), 1);
        assert_eq!(graded.answers[0].option_id, q1.options[0].id);
        // Both entries were processed: denominator 2, only the second correct.
        assert_eq!(graded.total, 2);
        assert_eq!(graded.correct, 1);
        assert_eq!(graded.score, 50.0);
    }

    #[test]
    fn score_rounds_to_two_decimals() {
        let exam = exam_with_two_questions();
        let a = answer(&exam.questions[0].id, &exam.questions[0].options[0].id);
        let c = answer(&exam.questions[1].id, &exam.questions[1].options[0].id);
        let d = answer(&exam.questions[1].id, &exam.questions[1].options[1].id);

        // 2 correct of 3 processed entries -> 66.67
        let graded = grade_submission(&exam, &[a, c, d]);
        assert_eq!(graded.score, 66.67);
    }
}
