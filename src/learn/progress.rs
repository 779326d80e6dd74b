//! Progress Aggregator.
//!
//! A lesson progress write and the enrollment recompute it triggers share one
//! transaction, with the enrollment row locked so concurrent updates to the
//! same enrollment serialise instead of losing increments.

use chrono::Utc;
use log::{debug, info};

use super::error::{LearnError, LearnResult};
use super::store::{LearnStore, LearnTx, NewLessonProgressRow};
use super::types::*;
use super::LearnEngine;

/// Completed share of a course's lessons as a percentage, capped at 100.
/// A course without lessons is 0% complete.
pub fn completion_percent(completed: i64, total_lessons: i64) -> f64 {
    if total_lessons <= 0 {
        return 0.0;
    }
    (completed as f64 / total_lessons as f64 * 100.0).min(100.0)
}

/// Recomputes `progress_percent` from the enrollment's lesson progress rows.
/// Reaching 100% completes the enrollment; a completed enrollment never goes
/// back to ACTIVE and keeps its first completion time.
fn recompute(tx: &mut dyn LearnTx, mut enrollment: Enrollment) -> LearnResult<Enrollment> {
    let total = tx.count_lessons(enrollment.course_id)?;
    let completed = tx.count_completed_lessons(enrollment.id)?;
    enrollment.progress_percent = completion_percent(completed, total);

    if enrollment.progress_percent >= 100.0 && enrollment.status != EnrollmentStatus::Completed {
        enrollment.status = EnrollmentStatus::Completed;
        enrollment.completed_at = Some(Utc::now());
        info!(
            "Enrollment {} completed course {}",
            enrollment.id, enrollment.course_id
        );
    }

    tx.save_enrollment(&enrollment)?;
    debug!(
        "Enrollment {} progress {}/{} lessons ({:.1}%)",
        enrollment.id, completed, total, enrollment.progress_percent
    );
    Ok(enrollment)
}

/// Recomputes every enrollment of a course after its lesson set changed.
pub(crate) fn recompute_course_enrollments(
    tx: &mut dyn LearnTx,
    course_id: i32,
) -> LearnResult<usize> {
    let enrollments = tx.enrollments_for_course(course_id)?;
    let count = enrollments.len();
    for enrollment in enrollments {
        if let Some(locked) = tx.lock_enrollment(enrollment.id)? {
            recompute(tx, locked)?;
        }
    }
    Ok(count)
}

fn accumulate(current: i32, added_seconds: u32) -> LearnResult<i32> {
    i32::try_from(added_seconds)
        .ok()
        .and_then(|added| current.checked_add(added))
        .ok_or_else(|| LearnError::validation("time spent exceeds the supported range"))
}

impl<S: LearnStore> LearnEngine<S> {
    /// Records progress on one lesson and recomputes the enrollment.
    pub async fn record_lesson_progress(
        &self,
        actor: Actor,
        enrollment_id: i32,
        lesson_id: i32,
        status: LessonStatus,
        added_seconds: u32,
    ) -> LearnResult<ProgressOutcome> {
        self.store
            .transaction(move |tx| {
                let enrollment = tx
                    .lock_enrollment(enrollment_id)?
                    .ok_or_else(|| LearnError::not_found("enrollment", enrollment_id))?;
                if enrollment.user_id != actor.user_id && !actor.is_super_admin() {
                    return Err(LearnError::forbidden("not your enrollment"));
                }

                let lesson = tx
                    .lesson(lesson_id)?
                    .filter(|l| l.course_id == enrollment.course_id)
                    .ok_or_else(|| LearnError::not_found("lesson", lesson_id))?;

                let now = Utc::now();
                let progress = match tx.lesson_progress(enrollment.id, lesson.id)? {
                    Some(mut progress) => {
                        progress.status = status;
                        progress.time_spent_seconds =
                            accumulate(progress.time_spent_seconds, added_seconds)?;
                        if progress.started_at.is_none() && status != LessonStatus::NotStarted {
                            progress.started_at = Some(now);
                        }
                        if status == LessonStatus::Completed {
                            progress.completed_at = Some(now);
                        }
                        tx.save_lesson_progress(&progress)?;
                        progress
                    }
                    None => tx.insert_lesson_progress(NewLessonProgressRow {
                        enrollment_id: enrollment.id,
                        lesson_id: lesson.id,
                        status,
                        time_spent_seconds: accumulate(0, added_seconds)?,
                        started_at: (status != LessonStatus::NotStarted).then_some(now),
                        completed_at: (status == LessonStatus::Completed).then_some(now),
                    })?,
                };

                let enrollment = recompute(tx, enrollment)?;
                Ok(ProgressOutcome {
                    progress,
                    enrollment,
                })
            })
            .await
            .map_err(|e| e.during("lesson progress update"))
    }

    /// Recomputes an enrollment's completion from its lesson progress rows.
    pub async fn recompute_course_progress(&self, enrollment_id: i32) -> LearnResult<Enrollment> {
        self.store
            .transaction(move |tx| {
                let enrollment = tx
                    .lock_enrollment(enrollment_id)?
                    .ok_or_else(|| LearnError::not_found("enrollment", enrollment_id))?;
                recompute(tx, enrollment)
            })
            .await
            .map_err(|e| e.during("progress recompute"))
    }
}
