use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---- rows ----

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub workload_hours: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct CourseModule {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub position: i32,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Lesson {
    pub id: Uuid,
    pub module_id: Uuid,
    pub title: String,
    pub position: i32,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Enrollment {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub status: String, // ACTIVE | COMPLETED
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct LessonProgress {
    pub id: Uuid,
    pub student_id: Uuid,
    pub lesson_id: Uuid,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub watched_seconds: i32,
    pub last_position: i32,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Exam {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub pass_score: i32,
    pub is_active: bool,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct ExamQuestion {
    pub id: Uuid,
    pub exam_id: Uuid,
    pub title: String,
    pub position: i32,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct ExamOption {
    pub id: Uuid,
    pub question_id: Uuid,
    pub label: String,
    pub is_correct: bool,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct ExamAttempt {
    pub id: Uuid,
    pub student_id: Uuid,
    pub exam_id: Uuid,
    pub attempt_number: i32,
    pub score_percent: i32,
    pub passed: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Certificate {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub attempt_id: Uuid,
    pub score_percent: i32,
    pub issued_at: DateTime<Utc>,
}

// ---- requests ----

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EnrollReq {
    pub student_id: Uuid,
    pub course_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WatchLessonReq {
    pub student_id: Uuid,
    pub current_time: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CompleteLessonReq {
    pub student_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StartAttemptReq {
    pub student_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AnswerReq {
    pub question_id: Uuid,
    pub option_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SubmitAttemptReq {
    pub student_id: Uuid,
    pub answers: Vec<AnswerReq>,
}

// ---- views ----

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LessonStatus {
    Completed,
    Unlocked,
    Blocked,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LessonView {
    pub id: Uuid,
    pub title: String,
    pub position: i32,
    pub status: LessonStatus,
    pub completed: bool,
    pub locked: bool,
    pub watched_seconds: i32,
    pub last_position: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ModuleView {
    pub id: Uuid,
    pub title: String,
    pub position: i32,
    pub lessons: Vec<LessonView>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CourseProgressView {
    pub course_id: Uuid,
    pub course_title: String,
    pub progress_percent: i32,
    pub modules: Vec<ModuleView>,
}

/// Exam as shown to a student: options carry no is_correct flag.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExamOptionView {
    pub id: Uuid,
    pub label: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExamQuestionView {
    pub id: Uuid,
    pub title: String,
    pub position: i32,
    pub options: Vec<ExamOptionView>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExamView {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub pass_score: i32,
    pub is_active: bool,
    pub questions: Vec<ExamQuestionView>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StartAttemptResp {
    pub attempt_id: Uuid,
    pub attempt_number: i32,
    pub max_attempts: i64,
    pub pass_threshold: i64,
    pub exam: ExamView,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SubmitAttemptResp {
    pub attempt_id: Uuid,
    pub attempt_number: i32,
    pub score_percent: i32,
    pub passed: bool,
    pub finished_at: Option<DateTime<Utc>>,
    pub correct_answers: i64,
    pub total_questions: i64,
    pub pass_threshold: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CertificateSummary {
    pub id: Uuid,
    pub course_id: Uuid,
    pub course_title: String,
    pub score_percent: i32,
    pub issued_at: DateTime<Utc>,
}

/// Template payload consumed by the external certificate renderer.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CertificateRenderData {
    pub student_name: String,
    pub student_cpf: String,
    pub course_title: String,
    pub workload_hours: i32,
    pub score_percent: i32,
    pub verification_code: Uuid,
    pub start_date: String,
    pub end_date: String,
    pub expiration_date: String,
}
