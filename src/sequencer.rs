//! Lesson sequencing: the flattened module/lesson order, the per-student
//! course view, the watch heartbeat and lesson completion.
//!
//! The one true lesson order of a course is its modules sorted by
//! `position`, then each module's lessons sorted by `position`. Gating
//! walks that flattened sequence: a lesson is unlocked only while every
//! lesson before it is completed, which leaves exactly one
//! unlocked-but-incomplete lesson at a time.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::completion;
use crate::db::Db;
use crate::error::ApiError;
use crate::models::*;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ProgressLite {
    pub completed: bool,
    pub watched_seconds: i32,
    pub last_position: i32,
}

/// Walks the flattened sequence and annotates every lesson with its
/// completed/unlocked/blocked status. Returns the module tree plus the
/// completed and total lesson counts.
pub(crate) fn annotate_modules(
    modules: &[CourseModule],
    lessons_by_module: &HashMap<Uuid, Vec<Lesson>>,
    progress: &HashMap<Uuid, ProgressLite>,
) -> (Vec<ModuleView>, i64, i64) {
    let mut previous_done = true;
    let mut total = 0i64;
    let mut completed_count = 0i64;

    let views = modules
        .iter()
        .map(|m| {
            let lessons = lessons_by_module
                .get(&m.id)
                .map(Vec::as_slice)
                .unwrap_or(&[])
                .iter()
                .map(|l| {
                    total += 1;
                    let p = progress.get(&l.id).copied().unwrap_or_default();
                    if p.completed {
                        completed_count += 1;
                    }
                    let locked = !previous_done;
                    let status = if p.completed {
                        LessonStatus::Completed
                    } else if locked {
                        LessonStatus::Blocked
                    } else {
                        LessonStatus::Unlocked
                    };
                    previous_done = p.completed;
                    LessonView {
                        id: l.id,
                        title: l.title.clone(),
                        position: l.position,
                        status,
                        completed: p.completed,
                        locked,
                        watched_seconds: p.watched_seconds,
                        last_position: p.last_position,
                    }
                })
                .collect();
            ModuleView { id: m.id, title: m.title.clone(), position: m.position, lessons }
        })
        .collect();

    (views, completed_count, total)
}

pub(crate) fn progress_percent(completed: i64, total: i64) -> i32 {
    if total == 0 {
        0
    } else {
        ((completed as f64 / total as f64) * 100.0).round() as i32
    }
}

/// First lesson strictly before `target_idx` in the flattened order with no
/// completed progress row, if any. Any hit means the completion request is
/// skipping ahead.
pub(crate) fn first_missing_prior(
    flat: &[Uuid],
    target_idx: usize,
    done: &HashSet<Uuid>,
) -> Option<Uuid> {
    flat[..target_idx].iter().find(|id| !done.contains(id)).copied()
}

async fn load_modules(db: &Db, course_id: Uuid) -> Result<Vec<CourseModule>, ApiError> {
    let modules = sqlx::query_as::<_, CourseModule>(
        "SELECT * FROM course_modules WHERE course_id = $1 ORDER BY position ASC",
    )
    .bind(course_id)
    .fetch_all(db)
    .await?;
    Ok(modules)
}

async fn load_lessons(db: &Db, course_id: Uuid) -> Result<Vec<Lesson>, ApiError> {
    let lessons = sqlx::query_as::<_, Lesson>(
        r#"
        SELECT l.* FROM lessons l
        JOIN course_modules m ON m.id = l.module_id
        WHERE m.course_id = $1
        ORDER BY m.position ASC, l.position ASC
        "#,
    )
    .bind(course_id)
    .fetch_all(db)
    .await?;
    Ok(lessons)
}

/// Per-student course tree with lesson statuses. Pure read; requires an
/// enrollment for the course.
pub async fn course_view(
    db: &Db,
    student_id: Uuid,
    course_id: Uuid,
) -> Result<CourseProgressView, ApiError> {
    let enrollment = sqlx::query_as::<_, Enrollment>(
        "SELECT * FROM enrollments WHERE student_id = $1 AND course_id = $2",
    )
    .bind(student_id)
    .bind(course_id)
    .fetch_optional(db)
    .await?;
    if enrollment.is_none() {
        return Err(ApiError::NotEligible);
    }

    let course = sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = $1")
        .bind(course_id)
        .fetch_optional(db)
        .await?
        .ok_or(ApiError::NotFound("course"))?;

    let modules = load_modules(db, course_id).await?;
    let lessons = load_lessons(db, course_id).await?;

    let rows = sqlx::query_as::<_, LessonProgress>(
        r#"
        SELECT p.* FROM lesson_progress p
        JOIN lessons l ON l.id = p.lesson_id
        JOIN course_modules m ON m.id = l.module_id
        WHERE p.student_id = $1 AND m.course_id = $2
        "#,
    )
    .bind(student_id)
    .bind(course_id)
    .fetch_all(db)
    .await?;

    let progress: HashMap<Uuid, ProgressLite> = rows
        .into_iter()
        .map(|p| {
            (
                p.lesson_id,
                ProgressLite {
                    completed: p.completed,
                    watched_seconds: p.watched_seconds,
                    last_position: p.last_position,
                },
            )
        })
        .collect();

    let mut lessons_by_module: HashMap<Uuid, Vec<Lesson>> = HashMap::new();
    for l in lessons {
        lessons_by_module.entry(l.module_id).or_default().push(l);
    }

    let (module_views, completed, total) =
        annotate_modules(&modules, &lessons_by_module, &progress);

    Ok(CourseProgressView {
        course_id: course.id,
        course_title: course.title,
        progress_percent: progress_percent(completed, total),
        modules: module_views,
    })
}

/// Video heartbeat. Clamps the reported position to a non-negative whole
/// second and upserts it; never touches `completed` and enforces no
/// ordering.
pub async fn watch_lesson(
    db: &Db,
    student_id: Uuid,
    lesson_id: Uuid,
    current_time: f64,
) -> Result<i32, ApiError> {
    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM lessons WHERE id = $1")
        .bind(lesson_id)
        .fetch_one(db)
        .await?;
    if exists == 0 {
        return Err(ApiError::NotFound("lesson"));
    }

    let allowed = if current_time.is_finite() { current_time.max(0.0).floor() as i32 } else { 0 };

    sqlx::query(
        r#"
        INSERT INTO lesson_progress (student_id, lesson_id, watched_seconds, last_position, completed)
        VALUES ($1, $2, $3, $3, FALSE)
        ON CONFLICT (student_id, lesson_id)
        DO UPDATE SET watched_seconds = EXCLUDED.watched_seconds,
                      last_position = EXCLUDED.last_position
        "#,
    )
    .bind(student_id)
    .bind(lesson_id)
    .bind(allowed)
    .execute(db)
    .await?;

    Ok(allowed)
}

/// Marks a lesson completed after validating that every lesson before it in
/// the flattened order is already done. Validation and upsert run in one
/// transaction with the student's progress rows for the course locked, so
/// racing completions on adjacent lessons serialize instead of both passing
/// the prior-lesson check. Re-completing a completed lesson is a no-op
/// success. Runs the course completion detector before returning.
pub async fn complete_lesson(
    db: &Db,
    student_id: Uuid,
    lesson_id: Uuid,
) -> Result<LessonProgress, ApiError> {
    let course_id = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT m.course_id FROM lessons l
        JOIN course_modules m ON m.id = l.module_id
        WHERE l.id = $1
        "#,
    )
    .bind(lesson_id)
    .fetch_optional(db)
    .await?
    .ok_or(ApiError::NotFound("lesson"))?;

    let mut tx = db.begin().await?;

    let flat: Vec<Uuid> = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT l.id FROM lessons l
        JOIN course_modules m ON m.id = l.module_id
        WHERE m.course_id = $1
        ORDER BY m.position ASC, l.position ASC
        "#,
    )
    .bind(course_id)
    .fetch_all(&mut *tx)
    .await?;

    let target_idx =
        flat.iter().position(|id| *id == lesson_id).ok_or(ApiError::NotFound("lesson"))?;

    let done: HashSet<Uuid> = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT p.lesson_id FROM lesson_progress p
        JOIN lessons l ON l.id = p.lesson_id
        JOIN course_modules m ON m.id = l.module_id
        WHERE p.student_id = $1 AND m.course_id = $2 AND p.completed
        FOR UPDATE OF p
        "#,
    )
    .bind(student_id)
    .bind(course_id)
    .fetch_all(&mut *tx)
    .await?
    .into_iter()
    .collect();

    if first_missing_prior(&flat, target_idx, &done).is_some() {
        return Err(ApiError::SequenceViolation);
    }

    let progress = sqlx::query_as::<_, LessonProgress>(
        r#"
        INSERT INTO lesson_progress (student_id, lesson_id, completed, completed_at)
        VALUES ($1, $2, TRUE, now())
        ON CONFLICT (student_id, lesson_id)
        DO UPDATE SET completed = TRUE,
                      completed_at = COALESCE(lesson_progress.completed_at, now())
        RETURNING *
        "#,
    )
    .bind(student_id)
    .bind(lesson_id)
    .fetch_one(&mut *tx)
    .await?;

    completion::try_finish_course(&mut tx, student_id, course_id).await?;

    tx.commit().await?;
    Ok(progress)
}

/// Shared eligibility helper: course complete means the enrollment carries
/// `completed_at`, or (fallback) every lesson in the course has a completed
/// progress row.
pub async fn is_course_completed(
    db: &Db,
    student_id: Uuid,
    course_id: Uuid,
) -> Result<bool, ApiError> {
    let completed_at = sqlx::query_scalar::<_, Option<chrono::DateTime<chrono::Utc>>>(
        "SELECT completed_at FROM enrollments WHERE student_id = $1 AND course_id = $2",
    )
    .bind(student_id)
    .bind(course_id)
    .fetch_optional(db)
    .await?;
    if let Some(Some(_)) = completed_at {
        return Ok(true);
    }

    let (total, done) = lesson_counts_pool(db, student_id, course_id).await?;
    Ok(total > 0 && done >= total)
}

async fn lesson_counts_pool(
    db: &Db,
    student_id: Uuid,
    course_id: Uuid,
) -> Result<(i64, i64), ApiError> {
    let total = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM lessons l
        JOIN course_modules m ON m.id = l.module_id
        WHERE m.course_id = $1
        "#,
    )
    .bind(course_id)
    .fetch_one(db)
    .await?;

    let done = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM lesson_progress p
        JOIN lessons l ON l.id = p.lesson_id
        JOIN course_modules m ON m.id = l.module_id
        WHERE p.student_id = $1 AND m.course_id = $2 AND p.completed
        "#,
    )
    .bind(student_id)
    .bind(course_id)
    .fetch_one(db)
    .await?;

    Ok((total, done))
}

/// Idempotent enrollment upsert. Enrollment lifecycle is otherwise owned by
/// admin tooling; the engine only needs the row to exist for its gates.
pub async fn enroll(db: &Db, student_id: Uuid, course_id: Uuid) -> Result<Enrollment, ApiError> {
    let enrollment = sqlx::query_as::<_, Enrollment>(
        r#"
        INSERT INTO enrollments (student_id, course_id)
        VALUES ($1, $2)
        ON CONFLICT (student_id, course_id) DO UPDATE SET student_id = EXCLUDED.student_id
        RETURNING *
        "#,
    )
    .bind(student_id)
    .bind(course_id)
    .fetch_one(db)
    .await?;
    Ok(enrollment)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lesson(module_id: Uuid, position: i32) -> Lesson {
        Lesson { id: Uuid::new_v4(), module_id, title: format!("lesson {position}"), position }
    }

    fn course_fixture() -> (Vec<CourseModule>, HashMap<Uuid, Vec<Lesson>>, Vec<Uuid>) {
        let course_id = Uuid::new_v4();
        let m1 = CourseModule {
            id: Uuid::new_v4(),
            course_id,
            title: "intro".into(),
            position: 1,
        };
        let m2 = CourseModule {
            id: Uuid::new_v4(),
            course_id,
            title: "practice".into(),
            position: 2,
        };
        let l1 = lesson(m1.id, 1);
        let l2 = lesson(m1.id, 2);
        let l3 = lesson(m2.id, 1);
        let flat = vec![l1.id, l2.id, l3.id];
        let mut by_module = HashMap::new();
        by_module.insert(m1.id, vec![l1, l2]);
        by_module.insert(m2.id, vec![l3]);
        (vec![m1, m2], by_module, flat)
    }

    fn done(lessons: &[Uuid]) -> HashMap<Uuid, ProgressLite> {
        lessons
            .iter()
            .map(|id| (*id, ProgressLite { completed: true, watched_seconds: 10, last_position: 10 }))
            .collect()
    }

    #[test]
    fn first_lesson_done_second_current_third_blocked() {
        let (modules, by_module, flat) = course_fixture();
        let progress = done(&flat[..1]);

        let (views, completed, total) = annotate_modules(&modules, &by_module, &progress);
        let statuses: Vec<LessonStatus> =
            views.iter().flat_map(|m| m.lessons.iter().map(|l| l.status)).collect();

        assert_eq!(
            statuses,
            vec![LessonStatus::Completed, LessonStatus::Unlocked, LessonStatus::Blocked]
        );
        assert_eq!((completed, total), (1, 3));
    }

    #[test]
    fn fresh_course_unlocks_only_the_first_lesson() {
        let (modules, by_module, _) = course_fixture();
        let (views, _, _) = annotate_modules(&modules, &by_module, &HashMap::new());
        let statuses: Vec<LessonStatus> =
            views.iter().flat_map(|m| m.lessons.iter().map(|l| l.status)).collect();

        assert_eq!(
            statuses,
            vec![LessonStatus::Unlocked, LessonStatus::Blocked, LessonStatus::Blocked]
        );
    }

    #[test]
    fn unlock_crosses_module_boundary() {
        let (modules, by_module, flat) = course_fixture();
        let progress = done(&flat[..2]);
        let (views, _, _) = annotate_modules(&modules, &by_module, &progress);

        let last = &views[1].lessons[0];
        assert_eq!(last.status, LessonStatus::Unlocked);
        assert!(!last.locked);
    }

    #[test]
    fn fully_done_course_has_no_locks() {
        let (modules, by_module, flat) = course_fixture();
        let (views, completed, total) = annotate_modules(&modules, &by_module, &done(&flat));
        assert_eq!((completed, total), (3, 3));
        assert!(views.iter().flat_map(|m| &m.lessons).all(|l| l.status == LessonStatus::Completed));
    }

    #[test]
    fn skipping_ahead_is_detected() {
        let (_, _, flat) = course_fixture();
        let done: HashSet<Uuid> = [flat[0]].into_iter().collect();

        // lesson 3 with lesson 2 missing
        assert_eq!(first_missing_prior(&flat, 2, &done), Some(flat[1]));
        // lesson 2 with lesson 1 done
        assert_eq!(first_missing_prior(&flat, 1, &done), None);
        // first lesson never has prerequisites
        assert_eq!(first_missing_prior(&flat, 0, &HashSet::new()), None);
    }

    #[test]
    fn percent_rounds_and_handles_empty() {
        assert_eq!(progress_percent(0, 0), 0);
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 67);
        assert_eq!(progress_percent(3, 3), 100);
    }
}
