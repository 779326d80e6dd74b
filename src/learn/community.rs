//! Course community messages and feedback.

use chrono::Utc;

use super::error::{LearnError, LearnResult};
use super::store::{LearnStore, LearnTx, NewFeedbackRow, NewMessageRow};
use super::types::*;
use super::{ensure_manager, LearnEngine};

const FEEDBACK_UNIQUE: &str = "uq_course_feedback_user_course";

/// Course members are enrolled students, the owner and super-admins.
fn ensure_member(tx: &mut dyn LearnTx, actor: &Actor, course_id: i32) -> LearnResult<()> {
    let course = tx
        .course(course_id)?
        .ok_or_else(|| LearnError::not_found("course", course_id))?;
    tx.user(actor.user_id)?
        .ok_or_else(|| LearnError::not_found("user", actor.user_id))?;
    if actor.can_manage(course.teacher_id) || tx.enrollment_for(actor.user_id, course_id)?.is_some() {
        Ok(())
    } else {
        Err(LearnError::forbidden("enroll in the course to take part"))
    }
}

fn clean_content(content: &str) -> LearnResult<String> {
    let content = content.trim();
    if content.is_empty() {
        return Err(LearnError::validation("content cannot be empty"));
    }
    Ok(content.to_string())
}

impl<S: LearnStore> LearnEngine<S> {
    pub async fn post_message(
        &self,
        actor: Actor,
        course_id: i32,
        content: &str,
    ) -> LearnResult<CommunityMessage> {
        let content = clean_content(content)?;
        self.store
            .transaction(move |tx| {
                ensure_member(tx, &actor, course_id)?;
                Ok(tx.insert_message(NewMessageRow {
                    course_id,
                    user_id: actor.user_id,
                    content,
                    created_at: Utc::now(),
                })?)
            })
            .await
            .map_err(|e| e.during("message post"))
    }

    pub async fn post_feedback(
        &self,
        actor: Actor,
        course_id: i32,
        content: &str,
        rating: i32,
    ) -> LearnResult<CourseFeedback> {
        let content = clean_content(content)?;
        if !(1..=5).contains(&rating) {
            return Err(LearnError::validation("rating must be between 1 and 5"));
        }
        self.store
            .transaction(move |tx| {
                ensure_member(tx, &actor, course_id)?;
                tx.insert_feedback(NewFeedbackRow {
                    course_id,
                    user_id: actor.user_id,
                    content,
                    rating,
                    created_at: Utc::now(),
                })
                .map_err(LearnError::from)
                .map_err(|e| {
                    if e.is_unique_violation(FEEDBACK_UNIQUE) {
                        LearnError::Conflict("feedback already submitted for this course".into())
                    } else {
                        e
                    }
                })
            })
            .await
            .map_err(|e| e.during("feedback post"))
    }

    /// Course discussion, oldest first, with each author's name and role.
    pub async fn course_messages(&self, actor: Actor, course_id: i32) -> LearnResult<Vec<MessageView>> {
        self.store
            .transaction(move |tx| {
                ensure_member(tx, &actor, course_id)?;
                let mut views = Vec::new();
                for message in tx.messages_for_course(course_id)? {
                    let Some(author) = tx.user(message.user_id)? else {
                        continue;
                    };
                    views.push(MessageView {
                        message,
                        user_name: author.full_name,
                        user_role: author.role,
                    });
                }
                Ok(views)
            })
            .await
    }

    /// Feedback is anonymous and readable by the course owner only.
    pub async fn course_feedback(&self, actor: Actor, course_id: i32) -> LearnResult<Vec<FeedbackEntry>> {
        self.store
            .transaction(move |tx| {
                let course = tx
                    .course(course_id)?
                    .ok_or_else(|| LearnError::not_found("course", course_id))?;
                ensure_manager(&actor, course.teacher_id, "course feedback")?;
                Ok(tx
                    .feedback_for_course(course_id)?
                    .into_iter()
                    .map(FeedbackEntry::from)
                    .collect())
            })
            .await
    }
}
