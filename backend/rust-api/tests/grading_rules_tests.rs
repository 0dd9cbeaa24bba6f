use chrono::{Duration, Utc};
use mongodb::bson::oid::ObjectId;

use school_mgmt_api::models::exam::{AnswerInput, AnswerOption, Exam, ExamOut, Question};
use school_mgmt_api::services::grading::grade_submission;

fn option(text: &str, is_correct: bool) -> AnswerOption {
    AnswerOption {
        id: ObjectId::new(),
        text: text.to_string(),
        is_correct,
    }
}

fn exam(questions: Vec<Question>) -> Exam {
    Exam {
        id: Some(ObjectId::new()),
        title: "History midterm".to_string(),
        description: "Chapters 1-4".to_string(),
        teacher_id: Some(ObjectId::new()),
        target_class: "10-A".to_string(),
        start_time: Utc::now() - Duration::hours(1),
        duration_min: 60,
        created_at: Utc::now() - Duration::days(1),
        questions,
    }
}

fn four_question_exam() -> Exam {
    exam(
        (0..4)
            .map(|i| Question {
                id: ObjectId::new(),
                text: format!("Question {}", i + 1),
                options: vec![
                    option("right", true),
                    option("wrong", false),
                    option("also wrong", false),
                ],
            })
            .collect(),
    )
}

fn pick(exam: &Exam, question: usize, option: usize) -> AnswerInput {
    AnswerInput {
        question_id: exam.questions[question].id.to_hex(),
        option_id: exam.questions[question].options[option].id.to_hex(),
    }
}

#[test]
fn test_full_correct_submission_scores_100() {
    let exam = four_question_exam();
    let answers: Vec<AnswerInput> = (0..4).map(|q| pick(&exam, q, 0)).collect();

    let graded = grade_submission(&exam, &answers);
    assert_eq!(graded.score, 100.0);
    assert_eq!(graded.correct, 4);
    assert_eq!(graded.total, 4);
    assert_eq!(graded.answers.len(), 4);
}

#[test]
fn test_partial_submission_is_scored_against_submitted_entries_only() {
    let exam = four_question_exam();
    // Two of four questions answered, both correctly. The denominator is
    // what was submitted, not the question count.
    let answers = vec![pick(&exam, 0, 0), pick(&exam, 1, 0)];

    let graded = grade_submission(&exam, &answers);
    assert_eq!(graded.score, 100.0);
    assert_eq!(graded.total, 2);
}

#[test]
fn test_stray_entries_dilute_the_score_without_failing_submission() {
    let exam = four_question_exam();
    let stray = AnswerInput {
        question_id: ObjectId::new().to_hex(),
        option_id: ObjectId::new().to_hex(),
    };
    let garbage = AnswerInput {
        question_id: "###".to_string(),
        option_id: "".to_string(),
    };
    let answers = vec![pick(&exam, 0, 0), stray, garbage, pick(&exam, 1, 0)];

    let graded = grade_submission(&exam, &answers);
    assert_eq!(graded.total, 4);
    assert_eq!(graded.correct, 2);
    assert_eq!(graded.score, 50.0);
    assert_eq!(graded.answers.len(), 2);
}

#[test]
fn test_changing_an_answer_keeps_one_record_per_question() {
    let exam = four_question_exam();
    let answers = vec![pick(&exam, 0, 1), pick(&exam, 0, 2), pick(&exam, 0, 0)];

    let graded = grade_submission(&exam, &answers);
    assert_eq!(graded.answers.len(), 1);
    assert_eq!(graded.answers[0].option_id, exam.questions[0].options[0].id);
    // Three processed entries, one correct.
    assert_eq!(graded.total, 3);
    assert_eq!(graded.correct, 1);
    assert_eq!(graded.score, 33.33);
}

#[test]
fn test_exam_out_never_leaks_answer_keys() {
    let exam = four_question_exam();
    let out = ExamOut::from_exam(exam, Some("Ivan Petrov".to_string()));

    let json = serde_json::to_value(&out).unwrap();
    let serialized = json.to_string();
    assert!(!serialized.contains("is_correct"));

    let questions = json["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 4);
    assert_eq!(questions[0]["options"].as_array().unwrap().len(), 3);
    assert_eq!(json["teacher_name"], "Ivan Petrov");
}

#[test]
fn test_end_time_reflects_duration() {
    let exam = four_question_exam();
    assert_eq!(exam.end_time(), exam.start_time + Duration::minutes(60));
}
