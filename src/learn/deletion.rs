//! Cascading Deletion Protocol.
//!
//! Removing a user, quiz or course runs as one transaction of ordered stages.
//! Each stage clears the rows that would make the next one trip a foreign key:
//! attempts and participations reference a quiz and a user independently, and
//! lessons may point at a quiz owned by somebody else. Any failure rolls the
//! whole sequence back.

use log::{debug, info, warn};

use super::error::{LearnError, LearnResult};
use super::store::{LearnStore, LearnTx};
use super::types::*;
use super::{ensure_manager, LearnEngine};

fn stage(name: &str, rows: usize) -> usize {
    debug!("deletion stage {}: {} rows", name, rows);
    rows
}

/// Stage 5 of user deletion, also the whole of quiz deletion: unlink lessons,
/// drop every attempt and participation on the quizzes regardless of who made
/// them, then the quizzes. Questions and choices cascade.
fn purge_quizzes(
    tx: &mut dyn LearnTx,
    quizzes: &[Quiz],
    report: &mut DeletionReport,
) -> LearnResult<()> {
    if quizzes.is_empty() {
        return Ok(());
    }
    let ids: Vec<i32> = quizzes.iter().map(|q| q.id).collect();
    let codes: Vec<String> = quizzes.iter().map(|q| q.access_code.clone()).collect();

    report.lessons_unlinked += stage(
        "unlink lessons",
        tx.unlink_lessons_from_quizzes(&ids, &codes)?,
    );
    report.participations += stage(
        "quiz participations",
        tx.delete_participations_for_quizzes(&ids)?,
    );
    report.attempts += stage("quiz attempts", tx.delete_attempts_for_quizzes(&ids)?);
    report.quizzes += stage("quizzes", tx.delete_quizzes(&ids)?);
    Ok(())
}

impl<S: LearnStore> LearnEngine<S> {
    /// Deletes a user and everything that depends on them. Super-admin only;
    /// deleting yourself is refused before anything runs.
    pub async fn delete_user(&self, actor: Actor, target_id: i32) -> LearnResult<DeletionReport> {
        if !actor.is_super_admin() {
            return Err(LearnError::forbidden("only a super-admin can delete users"));
        }
        if actor.user_id == target_id {
            warn!("Super-admin {} tried to delete their own account", actor.user_id);
            return Err(LearnError::forbidden("you cannot delete your own account"));
        }

        let report = self
            .store
            .transaction(move |tx| {
                tx.user(target_id)?
                    .ok_or_else(|| LearnError::not_found("user", target_id))?;
                let mut report = DeletionReport::default();

                report.participations += stage(
                    "participations by user",
                    tx.delete_participations_by_user(target_id)?,
                );
                report.attempts += stage("attempts by user", tx.delete_attempts_by_user(target_id)?);
                report.enrollments += stage("enrollments", tx.delete_enrollments_by_user(target_id)?);
                report.messages += stage("community messages", tx.delete_messages_by_user(target_id)?);
                report.feedback += stage("course feedback", tx.delete_feedback_by_user(target_id)?);

                let owned_quizzes = tx.quizzes_by_teacher(target_id)?;
                purge_quizzes(tx, &owned_quizzes, &mut report)?;

                let owned_courses: Vec<i32> = tx
                    .courses_by_teacher(target_id)?
                    .into_iter()
                    .map(|c| c.id)
                    .collect();
                report.courses += stage("owned courses", tx.delete_courses(&owned_courses)?);

                report.users += stage("user", tx.delete_user(target_id)?);
                Ok(report)
            })
            .await
            .map_err(|e| e.during("user deletion"))?;

        info!(
            "User {} deleted by {}: {} quizzes, {} courses, {} attempts, {} enrollments removed",
            target_id,
            actor.user_id,
            report.quizzes,
            report.courses,
            report.attempts,
            report.enrollments
        );
        Ok(report)
    }

    pub async fn delete_quiz(&self, actor: Actor, quiz_id: i32) -> LearnResult<DeletionReport> {
        let report = self
            .store
            .transaction(move |tx| {
                let quiz = tx
                    .quiz(quiz_id)?
                    .ok_or_else(|| LearnError::not_found("quiz", quiz_id))?;
                ensure_manager(&actor, quiz.teacher_id, "quiz")?;

                let mut report = DeletionReport::default();
                purge_quizzes(tx, &[quiz], &mut report)?;
                Ok(report)
            })
            .await
            .map_err(|e| e.during("quiz deletion"))?;

        info!(
            "Quiz {} deleted by {} ({} lessons unlinked, {} attempts removed)",
            quiz_id, actor.user_id, report.lessons_unlinked, report.attempts
        );
        Ok(report)
    }

    /// Lessons, enrollments with their progress, messages and feedback are
    /// owned by the course alone and go with it through storage cascades.
    pub async fn delete_course(&self, actor: Actor, course_id: i32) -> LearnResult<DeletionReport> {
        let report = self
            .store
            .transaction(move |tx| {
                let course = tx
                    .course(course_id)?
                    .ok_or_else(|| LearnError::not_found("course", course_id))?;
                ensure_manager(&actor, course.teacher_id, "course")?;

                Ok(DeletionReport {
                    courses: stage("course", tx.delete_courses(&[course_id])?),
                    ..Default::default()
                })
            })
            .await
            .map_err(|e| e.during("course deletion"))?;

        info!("Course {} deleted by {}", course_id, actor.user_id);
        Ok(report)
    }
}
