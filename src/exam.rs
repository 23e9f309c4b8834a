//! Exam attempt lifecycle: eligibility gates, attempt creation, answer
//! validation, grading and finalization.
//!
//! An attempt moves NotStarted -> InProgress (`finished_at` null) ->
//! Finalized, and is finalized exactly once. A retry is a fresh attempt row
//! with the next `attempt_number`.

use std::collections::HashMap;

use uuid::Uuid;

use crate::certificate;
use crate::config::ExamConfig;
use crate::db::Db;
use crate::error::ApiError;
use crate::models::*;
use crate::sequencer;

/// Answer key for one question: every option id paired with whether it is
/// the correct one. Authoring guarantees exactly one correct option.
#[derive(Debug, Clone)]
pub(crate) struct QuestionKey {
    pub id: Uuid,
    pub options: Vec<(Uuid, bool)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Graded {
    pub correct: i64,
    pub total: i64,
    pub score_percent: i32,
}

/// Validates a submitted answer set against the exam's questions and counts
/// the correct choices. Checks run in the same order the caller reports
/// them: completeness over every question first, then option integrity,
/// then grading.
pub(crate) fn grade(
    questions: &[QuestionKey],
    chosen: &HashMap<Uuid, Uuid>,
) -> Result<Graded, ApiError> {
    for q in questions {
        if !chosen.contains_key(&q.id) {
            return Err(ApiError::IncompleteSubmission);
        }
    }

    for q in questions {
        let option_id = chosen[&q.id];
        if !q.options.iter().any(|(id, _)| *id == option_id) {
            return Err(ApiError::InvalidOption);
        }
    }

    let mut correct = 0i64;
    for q in questions {
        let option_id = chosen[&q.id];
        if q.options.iter().any(|(id, ok)| *id == option_id && *ok) {
            correct += 1;
        }
    }

    let total = questions.len() as i64;
    let score_percent = ((correct as f64 / total as f64) * 100.0).round() as i32;
    Ok(Graded { correct, total, score_percent })
}

async fn load_question_keys(db: &Db, exam_id: Uuid) -> Result<Vec<QuestionKey>, ApiError> {
    let questions = sqlx::query_as::<_, ExamQuestion>(
        "SELECT * FROM exam_questions WHERE exam_id = $1 ORDER BY position ASC",
    )
    .bind(exam_id)
    .fetch_all(db)
    .await?;

    let options = sqlx::query_as::<_, ExamOption>(
        r#"
        SELECT o.* FROM exam_options o
        JOIN exam_questions q ON q.id = o.question_id
        WHERE q.exam_id = $1
        "#,
    )
    .bind(exam_id)
    .fetch_all(db)
    .await?;

    let mut by_question: HashMap<Uuid, Vec<(Uuid, bool)>> = HashMap::new();
    for o in options {
        by_question.entry(o.question_id).or_default().push((o.id, o.is_correct));
    }

    Ok(questions
        .into_iter()
        .map(|q| QuestionKey { id: q.id, options: by_question.remove(&q.id).unwrap_or_default() })
        .collect())
}

async fn load_exam_view(db: &Db, exam: &Exam) -> Result<ExamView, ApiError> {
    let questions = sqlx::query_as::<_, ExamQuestion>(
        "SELECT * FROM exam_questions WHERE exam_id = $1 ORDER BY position ASC",
    )
    .bind(exam.id)
    .fetch_all(db)
    .await?;

    let options = sqlx::query_as::<_, ExamOption>(
        r#"
        SELECT o.* FROM exam_options o
        JOIN exam_questions q ON q.id = o.question_id
        WHERE q.exam_id = $1
        "#,
    )
    .bind(exam.id)
    .fetch_all(db)
    .await?;

    let mut by_question: HashMap<Uuid, Vec<ExamOptionView>> = HashMap::new();
    for o in options {
        // the answer key never leaves the server
        by_question
            .entry(o.question_id)
            .or_default()
            .push(ExamOptionView { id: o.id, label: o.label });
    }

    Ok(ExamView {
        id: exam.id,
        course_id: exam.course_id,
        title: exam.title.clone(),
        pass_score: exam.pass_score,
        is_active: exam.is_active,
        questions: questions
            .into_iter()
            .map(|q| ExamQuestionView {
                id: q.id,
                title: q.title,
                position: q.position,
                options: by_question.remove(&q.id).unwrap_or_default(),
            })
            .collect(),
    })
}

/// Exam as presented to a student: exists, active, course completed, answer
/// key stripped. Both the view endpoint and attempt start run through here.
pub async fn student_exam_view(
    db: &Db,
    exam_id: Uuid,
    student_id: Uuid,
) -> Result<(Exam, ExamView), ApiError> {
    let exam = sqlx::query_as::<_, Exam>("SELECT * FROM exams WHERE id = $1")
        .bind(exam_id)
        .fetch_optional(db)
        .await?
        .ok_or(ApiError::NotFound("exam"))?;

    if !exam.is_active {
        return Err(ApiError::ExamInactive);
    }
    if !sequencer::is_course_completed(db, student_id, exam.course_id).await? {
        return Err(ApiError::NotEligible);
    }

    let view = load_exam_view(db, &exam).await?;
    Ok((exam, view))
}

async fn has_passed_attempt(db: &Db, student_id: Uuid, exam_id: Uuid) -> Result<bool, ApiError> {
    let passed = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM exam_attempts WHERE student_id = $1 AND exam_id = $2 AND passed",
    )
    .bind(student_id)
    .bind(exam_id)
    .fetch_one(db)
    .await?;
    Ok(passed > 0)
}

/// Opens a new attempt. Gates, first failure wins: exam exists and is
/// active, course completed, no prior pass, attempt budget not exhausted.
pub async fn start_attempt(
    db: &Db,
    cfg: ExamConfig,
    exam_id: Uuid,
    student_id: Uuid,
) -> Result<StartAttemptResp, ApiError> {
    let (_, exam_view) = student_exam_view(db, exam_id, student_id).await?;

    if has_passed_attempt(db, student_id, exam_id).await? {
        return Err(ApiError::AlreadyPassed);
    }

    let prior = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM exam_attempts WHERE student_id = $1 AND exam_id = $2",
    )
    .bind(student_id)
    .bind(exam_id)
    .fetch_one(db)
    .await?;
    if prior >= cfg.max_attempts {
        return Err(ApiError::AttemptLimitReached(cfg.max_attempts));
    }

    let attempt = sqlx::query_as::<_, ExamAttempt>(
        r#"
        INSERT INTO exam_attempts (student_id, exam_id, attempt_number, score_percent, passed)
        VALUES ($1, $2, $3, 0, FALSE)
        RETURNING *
        "#,
    )
    .bind(student_id)
    .bind(exam_id)
    .bind((prior + 1) as i32)
    .fetch_one(db)
    .await?;

    tracing::info!(%student_id, %exam_id, attempt = attempt.attempt_number, "attempt started");

    Ok(StartAttemptResp {
        attempt_id: attempt.id,
        attempt_number: attempt.attempt_number,
        max_attempts: cfg.max_attempts,
        pass_threshold: cfg.pass_threshold,
        exam: exam_view,
    })
}

/// Finalizes an attempt: validates ownership and state, re-checks the
/// eligibility gates, grades, then applies the result as one transaction
/// (replace answers, finalize attempt, certificate upsert on pass). A
/// failed validation leaves the attempt untouched.
pub async fn submit_attempt(
    db: &Db,
    cfg: ExamConfig,
    attempt_id: Uuid,
    student_id: Uuid,
    answers: &[AnswerReq],
) -> Result<SubmitAttemptResp, ApiError> {
    let attempt = sqlx::query_as::<_, ExamAttempt>("SELECT * FROM exam_attempts WHERE id = $1")
        .bind(attempt_id)
        .fetch_optional(db)
        .await?
        .ok_or(ApiError::NotFound("attempt"))?;

    if attempt.student_id != student_id {
        return Err(ApiError::Forbidden);
    }
    if attempt.finished_at.is_some() {
        return Err(ApiError::AlreadyFinalized);
    }

    let exam = sqlx::query_as::<_, Exam>("SELECT * FROM exams WHERE id = $1")
        .bind(attempt.exam_id)
        .fetch_optional(db)
        .await?
        .ok_or(ApiError::NotFound("exam"))?;
    if !exam.is_active {
        return Err(ApiError::ExamInactive);
    }

    // eligibility may have changed between start and submit
    if has_passed_attempt(db, student_id, exam.id).await? {
        return Err(ApiError::AlreadyPassed);
    }
    if !sequencer::is_course_completed(db, student_id, exam.course_id).await? {
        return Err(ApiError::NotEligible);
    }

    let questions = load_question_keys(db, exam.id).await?;
    if questions.is_empty() {
        return Err(ApiError::EmptyExam);
    }

    let mut chosen: HashMap<Uuid, Uuid> = HashMap::new();
    for a in answers {
        chosen.insert(a.question_id, a.option_id);
    }

    let graded = grade(&questions, &chosen)?;
    let passed = i64::from(graded.score_percent) >= cfg.pass_threshold;

    let mut tx = db.begin().await?;

    sqlx::query("DELETE FROM exam_answers WHERE attempt_id = $1")
        .bind(attempt_id)
        .execute(&mut *tx)
        .await?;

    for q in &questions {
        sqlx::query(
            "INSERT INTO exam_answers (attempt_id, question_id, option_id) VALUES ($1, $2, $3)",
        )
        .bind(attempt_id)
        .bind(q.id)
        .bind(chosen[&q.id])
        .execute(&mut *tx)
        .await?;
    }

    let finalized = sqlx::query_as::<_, ExamAttempt>(
        r#"
        UPDATE exam_attempts
        SET score_percent = $2, passed = $3, finished_at = now()
        WHERE id = $1 AND finished_at IS NULL
        RETURNING *
        "#,
    )
    .bind(attempt_id)
    .bind(graded.score_percent)
    .bind(passed)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(ApiError::AlreadyFinalized)?;

    if passed {
        certificate::issue(&mut tx, student_id, exam.course_id, finalized.id, finalized.score_percent)
            .await?;
    }

    tx.commit().await?;

    tracing::info!(
        %student_id,
        exam_id = %exam.id,
        score = finalized.score_percent,
        passed,
        "attempt finalized"
    );

    Ok(SubmitAttemptResp {
        attempt_id: finalized.id,
        attempt_number: finalized.attempt_number,
        score_percent: finalized.score_percent,
        passed: finalized.passed,
        finished_at: finalized.finished_at,
        correct_answers: graded.correct,
        total_questions: graded.total,
        pass_threshold: cfg.pass_threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // 4 questions, 4 options each; the first option is always correct.
    fn questions() -> Vec<QuestionKey> {
        (0..4)
            .map(|_| QuestionKey {
                id: Uuid::new_v4(),
                options: (0..4).map(|i| (Uuid::new_v4(), i == 0)).collect(),
            })
            .collect()
    }

    fn pick(qs: &[QuestionKey], correct_for: usize) -> HashMap<Uuid, Uuid> {
        qs.iter()
            .enumerate()
            .map(|(i, q)| {
                let option = if i < correct_for { q.options[0].0 } else { q.options[1].0 };
                (q.id, option)
            })
            .collect()
    }

    #[test]
    fn three_of_four_rounds_to_75() {
        let qs = questions();
        let graded = grade(&qs, &pick(&qs, 3)).unwrap();
        assert_eq!(graded, Graded { correct: 3, total: 4, score_percent: 75 });
        // the default threshold passes exactly at the boundary
        assert!(i64::from(graded.score_percent) >= ExamConfig::default().pass_threshold);
    }

    #[test]
    fn perfect_and_zero_scores() {
        let qs = questions();
        assert_eq!(grade(&qs, &pick(&qs, 4)).unwrap().score_percent, 100);
        assert_eq!(grade(&qs, &pick(&qs, 0)).unwrap().score_percent, 0);
    }

    #[test]
    fn one_of_three_rounds_to_33() {
        let qs: Vec<QuestionKey> = questions().into_iter().take(3).collect();
        let graded = grade(&qs, &pick(&qs, 1)).unwrap();
        assert_eq!(graded.score_percent, 33);
    }

    #[test]
    fn missing_answer_is_incomplete() {
        let qs = questions();
        let mut chosen = pick(&qs, 4);
        chosen.remove(&qs[3].id);
        assert!(matches!(grade(&qs, &chosen), Err(ApiError::IncompleteSubmission)));
    }

    #[test]
    fn foreign_option_is_invalid() {
        let qs = questions();
        let mut chosen = pick(&qs, 4);
        // an option belonging to another question
        chosen.insert(qs[0].id, qs[1].options[0].0);
        assert!(matches!(grade(&qs, &chosen), Err(ApiError::InvalidOption)));
    }

    #[test]
    fn completeness_is_checked_before_integrity() {
        let qs = questions();
        let mut chosen = pick(&qs, 4);
        chosen.insert(qs[0].id, Uuid::new_v4()); // bogus option
        chosen.remove(&qs[3].id); // and a missing answer
        assert!(matches!(grade(&qs, &chosen), Err(ApiError::IncompleteSubmission)));
    }
}
