//! Course completion detection. Runs only as a side effect of lesson
//! completion, inside the same transaction.

use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::error::ApiError;

/// Promotes the enrollment to COMPLETED once every lesson in the course has
/// a completed progress row. One-way transition: `completed_at` is written
/// once and the guard keeps re-runs from touching the terminal values. A
/// course with no lessons never auto-completes.
pub async fn try_finish_course(
    tx: &mut Transaction<'_, Postgres>,
    student_id: Uuid,
    course_id: Uuid,
) -> Result<(), ApiError> {
    let total = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM lessons l
        JOIN course_modules m ON m.id = l.module_id
        WHERE m.course_id = $1
        "#,
    )
    .bind(course_id)
    .fetch_one(&mut **tx)
    .await?;

    if total == 0 {
        return Ok(());
    }

    let completed = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM lesson_progress p
        JOIN lessons l ON l.id = p.lesson_id
        JOIN course_modules m ON m.id = l.module_id
        WHERE p.student_id = $1 AND m.course_id = $2 AND p.completed
        "#,
    )
    .bind(student_id)
    .bind(course_id)
    .fetch_one(&mut **tx)
    .await?;

    if completed < total {
        return Ok(());
    }

    let updated = sqlx::query(
        r#"
        UPDATE enrollments
        SET status = 'COMPLETED', completed_at = now()
        WHERE student_id = $1 AND course_id = $2 AND completed_at IS NULL
        "#,
    )
    .bind(student_id)
    .bind(course_id)
    .execute(&mut **tx)
    .await?;

    if updated.rows_affected() > 0 {
        tracing::info!(%student_id, %course_id, "course completed");
    }

    Ok(())
}
