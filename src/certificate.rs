//! Certificate issuance and the data handed to the external renderer.

use chrono::{DateTime, Datelike, Duration, Utc};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::cpf;
use crate::db::Db;
use crate::error::ApiError;
use crate::models::*;

/// Idempotent upsert keyed by (student, course). A later passing attempt
/// overwrites score, attempt reference and issue date; the unique pair
/// guarantees a single certificate no matter how submits race. Only called
/// from a passing submit, inside its transaction.
pub async fn issue(
    tx: &mut Transaction<'_, Postgres>,
    student_id: Uuid,
    course_id: Uuid,
    attempt_id: Uuid,
    score_percent: i32,
) -> Result<Certificate, ApiError> {
    let certificate = sqlx::query_as::<_, Certificate>(
        r#"
        INSERT INTO certificates (student_id, course_id, attempt_id, score_percent, issued_at)
        VALUES ($1, $2, $3, $4, now())
        ON CONFLICT (student_id, course_id)
        DO UPDATE SET attempt_id = EXCLUDED.attempt_id,
                      score_percent = EXCLUDED.score_percent,
                      issued_at = now()
        RETURNING *
        "#,
    )
    .bind(student_id)
    .bind(course_id)
    .bind(attempt_id)
    .bind(score_percent)
    .fetch_one(&mut **tx)
    .await?;

    tracing::info!(%student_id, %course_id, %attempt_id, score_percent, "certificate issued");
    Ok(certificate)
}

pub async fn list_by_student(
    db: &Db,
    student_id: Uuid,
) -> Result<Vec<CertificateSummary>, ApiError> {
    let rows = sqlx::query_as::<_, Certificate>(
        "SELECT * FROM certificates WHERE student_id = $1 ORDER BY issued_at DESC",
    )
    .bind(student_id)
    .fetch_all(db)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for c in rows {
        let title = sqlx::query_scalar::<_, String>("SELECT title FROM courses WHERE id = $1")
            .bind(c.course_id)
            .fetch_optional(db)
            .await?
            .unwrap_or_default();
        out.push(CertificateSummary {
            id: c.id,
            course_id: c.course_id,
            course_title: title,
            score_percent: c.score_percent,
            issued_at: c.issued_at,
        });
    }
    Ok(out)
}

/// Training start, conclusion and expiration as shown on the rendered
/// certificate: conclusion minus 5 days, conclusion, conclusion plus 2
/// years, all dd/mm/yyyy.
pub(crate) fn render_dates(conclusion: DateTime<Utc>) -> (String, String, String) {
    let start = conclusion - Duration::days(5);
    let expiration = conclusion
        .with_year(conclusion.year() + 2)
        // Feb 29 two years out lands on Feb 28
        .unwrap_or(conclusion + Duration::days(730));
    (
        start.format("%d/%m/%Y").to_string(),
        conclusion.format("%d/%m/%Y").to_string(),
        expiration.format("%d/%m/%Y").to_string(),
    )
}

/// Assembles the payload the external PDF renderer consumes, verifying the
/// enrollment is actually concluded. The certificate id doubles as the
/// verification code.
pub async fn render_data(db: &Db, certificate_id: Uuid) -> Result<CertificateRenderData, ApiError> {
    let certificate = sqlx::query_as::<_, Certificate>("SELECT * FROM certificates WHERE id = $1")
        .bind(certificate_id)
        .fetch_optional(db)
        .await?
        .ok_or(ApiError::NotFound("certificate"))?;

    let enrollment = sqlx::query_as::<_, Enrollment>(
        "SELECT * FROM enrollments WHERE student_id = $1 AND course_id = $2",
    )
    .bind(certificate.student_id)
    .bind(certificate.course_id)
    .fetch_optional(db)
    .await?
    .ok_or(ApiError::NotFound("enrollment"))?;
    let conclusion = enrollment.completed_at.ok_or(ApiError::NotEligible)?;

    let course = sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = $1")
        .bind(certificate.course_id)
        .fetch_optional(db)
        .await?
        .ok_or(ApiError::NotFound("course"))?;

    let (full_name, raw_cpf) = sqlx::query_as::<_, (String, String)>(
        "SELECT full_name, cpf FROM students WHERE id = $1",
    )
    .bind(certificate.student_id)
    .fetch_optional(db)
    .await?
    .ok_or(ApiError::NotFound("student"))?;

    let normalized = cpf::normalize(&raw_cpf);
    if !cpf::is_valid(&normalized) {
        // a malformed stored CPF is a data problem, not a reason to block
        tracing::warn!(student_id = %certificate.student_id, "student record has an invalid cpf");
    }

    let (start_date, end_date, expiration_date) = render_dates(conclusion);

    Ok(CertificateRenderData {
        student_name: full_name,
        student_cpf: cpf::format(&normalized),
        course_title: course.title,
        workload_hours: course.workload_hours,
        score_percent: certificate.score_percent,
        verification_code: certificate.id,
        start_date,
        end_date,
        expiration_date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn dates_bracket_the_conclusion() {
        let conclusion = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let (start, end, expiration) = render_dates(conclusion);
        assert_eq!(start, "05/03/2026");
        assert_eq!(end, "10/03/2026");
        assert_eq!(expiration, "10/03/2028");
    }

    #[test]
    fn leap_day_expiration_falls_back() {
        let conclusion = Utc.with_ymd_and_hms(2028, 2, 29, 8, 0, 0).unwrap();
        let (_, _, expiration) = render_dates(conclusion);
        assert_eq!(expiration, "28/02/2030");
    }
}
