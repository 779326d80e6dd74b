//! Enrollment Manager.
//!
//! `enroll` is an upsert: the first call creates the membership, every later
//! call returns the existing row untouched. Two concurrent first calls race on
//! `uq_enrollment_user_course`; the loser re-reads and returns the winner's row.

use chrono::Utc;
use log::{debug, info};

use super::error::{LearnError, LearnResult};
use super::store::{LearnStore, LearnTx, NewEnrollmentRow};
use super::types::*;
use super::{ensure_manager, LearnEngine};

const ENROLLMENT_UNIQUE: &str = "uq_enrollment_user_course";

fn detail(tx: &mut dyn LearnTx, enrollment: Enrollment) -> LearnResult<EnrollmentDetail> {
    let lesson_progress = tx.progress_for_enrollment(enrollment.id)?;
    Ok(EnrollmentDetail {
        enrollment,
        lesson_progress,
    })
}

impl<S: LearnStore> LearnEngine<S> {
    /// Enrolls the actor in a course, or returns the existing enrollment.
    pub async fn enroll(&self, actor: Actor, course_id: i32) -> LearnResult<EnrollmentDetail> {
        let first = self
            .store
            .transaction(move |tx| {
                let course = tx
                    .course(course_id)?
                    .ok_or_else(|| LearnError::not_found("course", course_id))?;
                tx.user(actor.user_id)?
                    .ok_or_else(|| LearnError::not_found("user", actor.user_id))?;

                if course.status == CourseStatus::Draft && !actor.can_manage(course.teacher_id) {
                    return Err(LearnError::forbidden(
                        "draft courses are only open to their owner",
                    ));
                }

                if let Some(existing) = tx.enrollment_for(actor.user_id, course_id)? {
                    debug!(
                        "User {} already enrolled in course {} (enrollment {})",
                        actor.user_id, course_id, existing.id
                    );
                    return detail(tx, existing);
                }

                let enrollment = tx.insert_enrollment(NewEnrollmentRow {
                    user_id: actor.user_id,
                    course_id,
                    status: EnrollmentStatus::Active,
                    progress_percent: 0.0,
                    enrolled_at: Utc::now(),
                })?;
                info!(
                    "User {} enrolled in course {} (enrollment {})",
                    actor.user_id, course_id, enrollment.id
                );
                Ok(EnrollmentDetail {
                    enrollment,
                    lesson_progress: Vec::new(),
                })
            })
            .await;

        match first {
            Err(e) if e.is_unique_violation(ENROLLMENT_UNIQUE) => {
                debug!(
                    "Concurrent enrollment of user {} in course {}, returning existing row",
                    actor.user_id, course_id
                );
                self.store
                    .transaction(move |tx| {
                        let existing = tx
                            .enrollment_for(actor.user_id, course_id)?
                            .ok_or_else(|| LearnError::not_found("enrollment", course_id))?;
                        detail(tx, existing)
                    })
                    .await
                    .map_err(|e| e.during("enrollment"))
            }
            other => other.map_err(|e| e.during("enrollment")),
        }
    }

    /// Enrolls through a join code. Drafts never resolve by code.
    pub async fn enroll_by_code(&self, actor: Actor, code: &str) -> LearnResult<EnrollmentDetail> {
        let course = self.find_course_by_code(code).await?;
        self.enroll(actor, course.id).await
    }

    /// Marks an ACTIVE enrollment as DROPPED. Completed or already dropped
    /// enrollments are returned unchanged.
    pub async fn drop_enrollment(&self, actor: Actor, course_id: i32) -> LearnResult<Enrollment> {
        self.store
            .transaction(move |tx| {
                let mut enrollment = tx
                    .enrollment_for(actor.user_id, course_id)?
                    .ok_or_else(|| LearnError::not_found("enrollment", course_id))?;
                if enrollment.status == EnrollmentStatus::Active {
                    enrollment.status = EnrollmentStatus::Dropped;
                    tx.save_enrollment(&enrollment)?;
                    info!("User {} dropped course {}", actor.user_id, course_id);
                }
                Ok(enrollment)
            })
            .await
            .map_err(|e| e.during("enrollment drop"))
    }

    pub async fn enrollment_detail(
        &self,
        actor: Actor,
        enrollment_id: i32,
    ) -> LearnResult<EnrollmentDetail> {
        self.store
            .transaction(move |tx| {
                let enrollment = tx
                    .enrollment(enrollment_id)?
                    .ok_or_else(|| LearnError::not_found("enrollment", enrollment_id))?;
                if enrollment.user_id != actor.user_id && !actor.is_super_admin() {
                    return Err(LearnError::forbidden("not your enrollment"));
                }
                detail(tx, enrollment)
            })
            .await
    }

    /// Every enrollment of a user with its completed lesson count.
    pub async fn enrollments_for_user(&self, user_id: i32) -> LearnResult<Vec<EnrollmentSummary>> {
        self.store
            .transaction(move |tx| {
                let mut summaries = Vec::new();
                for enrollment in tx.enrollments_for_user(user_id)? {
                    let completed_lessons = tx.count_completed_lessons(enrollment.id)?;
                    summaries.push(EnrollmentSummary {
                        enrollment,
                        completed_lessons,
                    });
                }
                Ok(summaries)
            })
            .await
    }

    pub async fn course_stats(&self, actor: Actor, course_id: i32) -> LearnResult<CourseStats> {
        self.store
            .transaction(move |tx| {
                let course = tx
                    .course(course_id)?
                    .ok_or_else(|| LearnError::not_found("course", course_id))?;
                ensure_manager(&actor, course.teacher_id, "course")?;

                let enrollments = tx.enrollments_for_course(course_id)?;
                let count_status = |status: EnrollmentStatus| {
                    enrollments.iter().filter(|e| e.status == status).count() as i64
                };
                let average_progress = if enrollments.is_empty() {
                    0.0
                } else {
                    enrollments.iter().map(|e| e.progress_percent).sum::<f64>()
                        / enrollments.len() as f64
                };

                Ok(CourseStats {
                    total_enrollments: enrollments.len() as i64,
                    active_students: count_status(EnrollmentStatus::Active),
                    completed_students: count_status(EnrollmentStatus::Completed),
                    average_progress: round1(average_progress),
                    total_lessons: tx.count_lessons(course_id)?,
                })
            })
            .await
    }

    /// The course roster for its owner, in enrollment order.
    pub async fn course_students(&self, actor: Actor, course_id: i32) -> LearnResult<Vec<CourseStudent>> {
        self.store
            .transaction(move |tx| {
                let course = tx
                    .course(course_id)?
                    .ok_or_else(|| LearnError::not_found("course", course_id))?;
                ensure_manager(&actor, course.teacher_id, "course")?;

                let mut students = Vec::new();
                for enrollment in tx.enrollments_for_course(course_id)? {
                    let Some(user) = tx.user(enrollment.user_id)? else {
                        continue;
                    };
                    let completed_lessons = tx.count_completed_lessons(enrollment.id)?;
                    students.push(CourseStudent {
                        enrollment,
                        email: user.email,
                        full_name: user.full_name,
                        completed_lessons,
                    });
                }
                Ok(students)
            })
            .await
    }
}
