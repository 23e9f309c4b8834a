use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;

use crate::config::ExamConfig;
use crate::db::Db;
use crate::error::ApiError;
use crate::models::*;
use crate::{certificate, exam, sequencer};

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: ExamConfig,
}

pub fn router(db: Db, config: ExamConfig) -> Router {
    Router::new()
        // enrollment (admin glue; the engine's gates read these rows)
        .route("/api/enrollments", post(enroll))
        // progression
        .route(
            "/api/students/:student_id/courses/:course_id/progress",
            get(course_progress),
        )
        .route("/api/lessons/:lesson_id/watch", post(watch_lesson))
        .route("/api/lessons/:lesson_id/complete", post(complete_lesson))
        // assessment
        .route("/api/exams/:exam_id/view", get(exam_view))
        .route("/api/exams/:exam_id/attempts", post(start_attempt))
        .route("/api/attempts/:attempt_id/submit", post(submit_attempt))
        // certificates
        .route("/api/students/:student_id/certificates", get(list_certificates))
        .route(
            "/api/certificates/:certificate_id/render-data",
            get(certificate_render_data),
        )
        .with_state(AppState { db, config })
}

async fn enroll(
    State(state): State<AppState>,
    Json(req): Json<EnrollReq>,
) -> Result<Json<Enrollment>, ApiError> {
    let enrollment = sequencer::enroll(&state.db, req.student_id, req.course_id).await?;
    Ok(Json(enrollment))
}

async fn course_progress(
    State(state): State<AppState>,
    Path((student_id, course_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<CourseProgressView>, ApiError> {
    let view = sequencer::course_view(&state.db, student_id, course_id).await?;
    Ok(Json(view))
}

async fn watch_lesson(
    State(state): State<AppState>,
    Path(lesson_id): Path<Uuid>,
    Json(req): Json<WatchLessonReq>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let allowed =
        sequencer::watch_lesson(&state.db, req.student_id, lesson_id, req.current_time).await?;
    Ok(Json(json!({ "ok": true, "allowed_time": allowed })))
}

async fn complete_lesson(
    State(state): State<AppState>,
    Path(lesson_id): Path<Uuid>,
    Json(req): Json<CompleteLessonReq>,
) -> Result<Json<LessonProgress>, ApiError> {
    let progress = sequencer::complete_lesson(&state.db, req.student_id, lesson_id).await?;
    Ok(Json(progress))
}

async fn exam_view(
    State(state): State<AppState>,
    Path(exam_id): Path<Uuid>,
    axum::extract::Query(q): axum::extract::Query<StartAttemptReq>,
) -> Result<Json<ExamView>, ApiError> {
    let (_, view) = exam::student_exam_view(&state.db, exam_id, q.student_id).await?;
    Ok(Json(view))
}

async fn start_attempt(
    State(state): State<AppState>,
    Path(exam_id): Path<Uuid>,
    Json(req): Json<StartAttemptReq>,
) -> Result<Json<StartAttemptResp>, ApiError> {
    let resp = exam::start_attempt(&state.db, state.config, exam_id, req.student_id).await?;
    Ok(Json(resp))
}

async fn submit_attempt(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
    Json(req): Json<SubmitAttemptReq>,
) -> Result<Json<SubmitAttemptResp>, ApiError> {
    let resp =
        exam::submit_attempt(&state.db, state.config, attempt_id, req.student_id, &req.answers)
            .await?;
    Ok(Json(resp))
}

async fn list_certificates(
    State(state): State<AppState>,
    Path(student_id): Path<Uuid>,
) -> Result<Json<Vec<CertificateSummary>>, ApiError> {
    let certificates = certificate::list_by_student(&state.db, student_id).await?;
    Ok(Json(certificates))
}

async fn certificate_render_data(
    State(state): State<AppState>,
    Path(certificate_id): Path<Uuid>,
) -> Result<Json<CertificateRenderData>, ApiError> {
    let data = certificate::render_data(&state.db, certificate_id).await?;
    Ok(Json(data))
}
