//! Postgres [`LearnStore`] backed by the shared r2d2 pool.
//!
//! Diesel is synchronous, so each transaction runs on the blocking thread pool
//! with a connection checked out for its whole duration.

use std::future::Future;

use diesel::prelude::*;

use super::*;
use crate::core::shared::schema::learn::{
    choices, community_messages, course_feedback, courses, enrollments, lesson_progress, lessons,
    questions, quiz_attempts, quiz_participations, quizzes, users,
};
use crate::core::shared::utils::DbPool;
use crate::learn::error::StorageError;

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStore").finish_non_exhaustive()
    }
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl LearnStore for PgStore {
    fn transaction<T, F>(&self, f: F) -> impl Future<Output = Result<T, LearnError>> + Send
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn LearnTx) -> Result<T, LearnError> + Send + 'static,
    {
        let pool = self.pool.clone();
        async move {
            tokio::task::spawn_blocking(move || {
                let mut pooled = pool
                    .get()
                    .map_err(|e| LearnError::persistence("connection checkout", e.into()))?;
                let conn: &mut PgConnection = &mut pooled;
                conn.transaction::<T, LearnError, _>(|conn| f(&mut PgTx { conn }))
            })
            .await
            .map_err(|e| {
                LearnError::persistence("blocking task", StorageError::Backend(e.to_string()))
            })?
        }
    }
}

struct PgTx<'a> {
    conn: &'a mut PgConnection,
}

impl LearnTx for PgTx<'_> {
    fn user(&mut self, id: i32) -> StoreResult<Option<User>> {
        Ok(users::table
            .find(id)
            .first::<User>(self.conn)
            .optional()?)
    }

    fn insert_user(&mut self, row: NewUserRow) -> StoreResult<User> {
        Ok(diesel::insert_into(users::table)
            .values((
                users::email.eq(&row.email),
                users::full_name.eq(&row.full_name),
                users::role.eq(row.role.as_str()),
                users::created_at.eq(row.created_at),
            ))
            .get_result::<User>(self.conn)?)
    }

    fn delete_user(&mut self, id: i32) -> StoreResult<usize> {
        Ok(diesel::delete(users::table.find(id)).execute(self.conn)?)
    }

    fn quiz(&mut self, id: i32) -> StoreResult<Option<Quiz>> {
        Ok(quizzes::table
            .find(id)
            .first::<Quiz>(self.conn)
            .optional()?)
    }

    fn quiz_by_code(&mut self, code: &str) -> StoreResult<Option<Quiz>> {
        Ok(quizzes::table
            .filter(quizzes::access_code.eq(code))
            .first::<Quiz>(self.conn)
            .optional()?)
    }

    fn quizzes_by_teacher(&mut self, teacher_id: i32) -> StoreResult<Vec<Quiz>> {
        Ok(quizzes::table
            .filter(quizzes::teacher_id.eq(teacher_id))
            .order(quizzes::id.asc())
            .load::<Quiz>(self.conn)?)
    }

    fn insert_quiz(&mut self, row: NewQuizRow) -> StoreResult<Quiz> {
        Ok(diesel::insert_into(quizzes::table)
            .values((
                quizzes::title.eq(&row.title),
                quizzes::description.eq(&row.description),
                quizzes::access_code.eq(&row.access_code),
                quizzes::is_public.eq(row.is_public),
                quizzes::teacher_id.eq(row.teacher_id),
                quizzes::created_at.eq(row.created_at),
            ))
            .get_result::<Quiz>(self.conn)?)
    }

    fn insert_question(&mut self, row: NewQuestionRow) -> StoreResult<Question> {
        Ok(diesel::insert_into(questions::table)
            .values((
                questions::quiz_id.eq(row.quiz_id),
                questions::text.eq(&row.text),
                questions::question_type.eq(row.question_type.as_str()),
                questions::points.eq(row.points),
                questions::time_limit.eq(row.time_limit),
                questions::position.eq(row.position),
            ))
            .get_result::<Question>(self.conn)?)
    }

    fn insert_choice(&mut self, row: NewChoiceRow) -> StoreResult<Choice> {
        Ok(diesel::insert_into(choices::table)
            .values((
                choices::question_id.eq(row.question_id),
                choices::text.eq(&row.text),
                choices::is_correct.eq(row.is_correct),
            ))
            .get_result::<Choice>(self.conn)?)
    }

    fn questions_for_quiz(&mut self, quiz_id: i32) -> StoreResult<Vec<Question>> {
        Ok(questions::table
            .filter(questions::quiz_id.eq(quiz_id))
            .order((questions::position.asc(), questions::id.asc()))
            .load::<Question>(self.conn)?)
    }

    fn choices_for_question(&mut self, question_id: i32) -> StoreResult<Vec<Choice>> {
        Ok(choices::table
            .filter(choices::question_id.eq(question_id))
            .order(choices::id.asc())
            .load::<Choice>(self.conn)?)
    }

    fn save_quiz(&mut self, quiz: &Quiz) -> StoreResult<()> {
        diesel::update(quizzes::table.find(quiz.id))
            .set((
                quizzes::title.eq(&quiz.title),
                quizzes::description.eq(&quiz.description),
                quizzes::is_public.eq(quiz.is_public),
            ))
            .execute(self.conn)?;
        Ok(())
    }

    fn delete_questions_for_quiz(&mut self, quiz_id: i32) -> StoreResult<usize> {
        Ok(
            diesel::delete(questions::table.filter(questions::quiz_id.eq(quiz_id)))
                .execute(self.conn)?,
        )
    }

    fn delete_quizzes(&mut self, ids: &[i32]) -> StoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        Ok(diesel::delete(quizzes::table.filter(quizzes::id.eq_any(ids))).execute(self.conn)?)
    }

    fn access_code_taken(&mut self, target: CodeTarget, code: &str) -> StoreResult<bool> {
        let taken = match target {
            CodeTarget::Quiz => diesel::select(diesel::dsl::exists(
                quizzes::table.filter(quizzes::access_code.eq(code)),
            ))
            .get_result::<bool>(self.conn)?,
            CodeTarget::Course => diesel::select(diesel::dsl::exists(
                courses::table.filter(courses::access_code.eq(code)),
            ))
            .get_result::<bool>(self.conn)?,
        };
        Ok(taken)
    }

    fn course(&mut self, id: i32) -> StoreResult<Option<Course>> {
        Ok(courses::table
            .find(id)
            .first::<Course>(self.conn)
            .optional()?)
    }

    fn course_by_code(&mut self, code: &str) -> StoreResult<Option<Course>> {
        Ok(courses::table
            .filter(courses::access_code.eq(code))
            .first::<Course>(self.conn)
            .optional()?)
    }

    fn courses_by_teacher(&mut self, teacher_id: i32) -> StoreResult<Vec<Course>> {
        Ok(courses::table
            .filter(courses::teacher_id.eq(teacher_id))
            .order(courses::id.asc())
            .load::<Course>(self.conn)?)
    }

    fn insert_course(&mut self, row: NewCourseRow) -> StoreResult<Course> {
        Ok(diesel::insert_into(courses::table)
            .values((
                courses::title.eq(&row.title),
                courses::description.eq(&row.description),
                courses::category.eq(&row.category),
                courses::status.eq(row.status.as_str()),
                courses::access_code.eq(&row.access_code),
                courses::teacher_id.eq(row.teacher_id),
                courses::created_at.eq(row.created_at),
            ))
            .get_result::<Course>(self.conn)?)
    }

    fn save_course(&mut self, course: &Course) -> StoreResult<()> {
        diesel::update(courses::table.find(course.id))
            .set((
                courses::title.eq(&course.title),
                courses::description.eq(&course.description),
                courses::category.eq(&course.category),
                courses::status.eq(course.status.as_str()),
                courses::access_code.eq(&course.access_code),
            ))
            .execute(self.conn)?;
        Ok(())
    }

    fn delete_courses(&mut self, ids: &[i32]) -> StoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        Ok(diesel::delete(courses::table.filter(courses::id.eq_any(ids))).execute(self.conn)?)
    }

    fn lesson(&mut self, id: i32) -> StoreResult<Option<Lesson>> {
        Ok(lessons::table
            .find(id)
            .first::<Lesson>(self.conn)
            .optional()?)
    }

    fn lessons_for_course(&mut self, course_id: i32) -> StoreResult<Vec<Lesson>> {
        Ok(lessons::table
            .filter(lessons::course_id.eq(course_id))
            .order((lessons::order_index.asc(), lessons::id.asc()))
            .load::<Lesson>(self.conn)?)
    }

    fn count_lessons(&mut self, course_id: i32) -> StoreResult<i64> {
        Ok(lessons::table
            .filter(lessons::course_id.eq(course_id))
            .count()
            .get_result::<i64>(self.conn)?)
    }

    fn insert_lesson(&mut self, row: NewLessonRow) -> StoreResult<Lesson> {
        Ok(diesel::insert_into(lessons::table)
            .values((
                lessons::course_id.eq(row.course_id),
                lessons::title.eq(&row.title),
                lessons::order_index.eq(row.order_index),
                lessons::duration_minutes.eq(row.duration_minutes),
                lessons::linked_quiz_id.eq(row.linked_quiz_id),
                lessons::quiz_code.eq(&row.quiz_code),
                lessons::created_at.eq(row.created_at),
            ))
            .get_result::<Lesson>(self.conn)?)
    }

    fn delete_lessons(&mut self, ids: &[i32]) -> StoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        Ok(diesel::delete(lessons::table.filter(lessons::id.eq_any(ids))).execute(self.conn)?)
    }

    fn unlink_lessons_from_quizzes(
        &mut self,
        ids: &[i32],
        codes: &[String],
    ) -> StoreResult<usize> {
        if ids.is_empty() && codes.is_empty() {
            return Ok(0);
        }
        Ok(diesel::update(
            lessons::table.filter(
                lessons::linked_quiz_id
                    .eq_any(ids)
                    .or(lessons::quiz_code.eq_any(codes)),
            ),
        )
        .set((
            lessons::linked_quiz_id.eq(None::<i32>),
            lessons::quiz_code.eq(None::<String>),
        ))
        .execute(self.conn)?)
    }

    fn enrollment(&mut self, id: i32) -> StoreResult<Option<Enrollment>> {
        Ok(enrollments::table
            .find(id)
            .first::<Enrollment>(self.conn)
            .optional()?)
    }

    fn lock_enrollment(&mut self, id: i32) -> StoreResult<Option<Enrollment>> {
        Ok(enrollments::table
            .find(id)
            .for_update()
            .first::<Enrollment>(self.conn)
            .optional()?)
    }

    fn enrollment_for(&mut self, user_id: i32, course_id: i32) -> StoreResult<Option<Enrollment>> {
        Ok(enrollments::table
            .filter(enrollments::user_id.eq(user_id))
            .filter(enrollments::course_id.eq(course_id))
            .first::<Enrollment>(self.conn)
            .optional()?)
    }

    fn enrollments_for_user(&mut self, user_id: i32) -> StoreResult<Vec<Enrollment>> {
        Ok(enrollments::table
            .filter(enrollments::user_id.eq(user_id))
            .order(enrollments::enrolled_at.desc())
            .load::<Enrollment>(self.conn)?)
    }

    fn enrollments_for_course(&mut self, course_id: i32) -> StoreResult<Vec<Enrollment>> {
        Ok(enrollments::table
            .filter(enrollments::course_id.eq(course_id))
            .load::<Enrollment>(self.conn)?)
    }

    fn insert_enrollment(&mut self, row: NewEnrollmentRow) -> StoreResult<Enrollment> {
        Ok(diesel::insert_into(enrollments::table)
            .values((
                enrollments::user_id.eq(row.user_id),
                enrollments::course_id.eq(row.course_id),
                enrollments::status.eq(row.status.as_str()),
                enrollments::progress_percent.eq(row.progress_percent),
                enrollments::enrolled_at.eq(row.enrolled_at),
            ))
            .get_result::<Enrollment>(self.conn)?)
    }

    fn save_enrollment(&mut self, enrollment: &Enrollment) -> StoreResult<()> {
        diesel::update(enrollments::table.find(enrollment.id))
            .set((
                enrollments::status.eq(enrollment.status.as_str()),
                enrollments::progress_percent.eq(enrollment.progress_percent),
                enrollments::completed_at.eq(enrollment.completed_at),
            ))
            .execute(self.conn)?;
        Ok(())
    }

    fn delete_enrollments_by_user(&mut self, user_id: i32) -> StoreResult<usize> {
        Ok(
            diesel::delete(enrollments::table.filter(enrollments::user_id.eq(user_id)))
                .execute(self.conn)?,
        )
    }

    fn lesson_progress(
        &mut self,
        enrollment_id: i32,
        lesson_id: i32,
    ) -> StoreResult<Option<LessonProgress>> {
        Ok(lesson_progress::table
            .filter(lesson_progress::enrollment_id.eq(enrollment_id))
            .filter(lesson_progress::lesson_id.eq(lesson_id))
            .first::<LessonProgress>(self.conn)
            .optional()?)
    }

    fn progress_for_enrollment(&mut self, enrollment_id: i32) -> StoreResult<Vec<LessonProgress>> {
        Ok(lesson_progress::table
            .filter(lesson_progress::enrollment_id.eq(enrollment_id))
            .order(lesson_progress::id.asc())
            .load::<LessonProgress>(self.conn)?)
    }

    fn count_completed_lessons(&mut self, enrollment_id: i32) -> StoreResult<i64> {
        Ok(lesson_progress::table
            .filter(lesson_progress::enrollment_id.eq(enrollment_id))
            .filter(lesson_progress::status.eq(LessonStatus::Completed.as_str()))
            .count()
            .get_result::<i64>(self.conn)?)
    }

    fn insert_lesson_progress(
        &mut self,
        row: NewLessonProgressRow,
    ) -> StoreResult<LessonProgress> {
        Ok(diesel::insert_into(lesson_progress::table)
            .values((
                lesson_progress::enrollment_id.eq(row.enrollment_id),
                lesson_progress::lesson_id.eq(row.lesson_id),
                lesson_progress::status.eq(row.status.as_str()),
                lesson_progress::time_spent_seconds.eq(row.time_spent_seconds),
                lesson_progress::started_at.eq(row.started_at),
                lesson_progress::completed_at.eq(row.completed_at),
            ))
            .get_result::<LessonProgress>(self.conn)?)
    }

    fn save_lesson_progress(&mut self, progress: &LessonProgress) -> StoreResult<()> {
        diesel::update(lesson_progress::table.find(progress.id))
            .set((
                lesson_progress::status.eq(progress.status.as_str()),
                lesson_progress::time_spent_seconds.eq(progress.time_spent_seconds),
                lesson_progress::started_at.eq(progress.started_at),
                lesson_progress::completed_at.eq(progress.completed_at),
            ))
            .execute(self.conn)?;
        Ok(())
    }

    fn insert_attempt(&mut self, row: NewAttemptRow) -> StoreResult<QuizAttempt> {
        Ok(diesel::insert_into(quiz_attempts::table)
            .values((
                quiz_attempts::quiz_id.eq(row.quiz_id),
                quiz_attempts::user_id.eq(row.user_id),
                quiz_attempts::score.eq(row.score),
                quiz_attempts::total_questions.eq(row.total_questions),
                quiz_attempts::correct_answers.eq(row.correct_answers),
                quiz_attempts::rank.eq(row.rank.as_str()),
                quiz_attempts::completed_at.eq(row.completed_at),
            ))
            .get_result::<QuizAttempt>(self.conn)?)
    }

    fn attempts_by_user(&mut self, user_id: i32) -> StoreResult<Vec<QuizAttempt>> {
        Ok(quiz_attempts::table
            .filter(quiz_attempts::user_id.eq(user_id))
            .order((quiz_attempts::completed_at.desc(), quiz_attempts::id.desc()))
            .load::<QuizAttempt>(self.conn)?)
    }

    fn attempts_for_quizzes(&mut self, quiz_ids: &[i32]) -> StoreResult<Vec<QuizAttempt>> {
        if quiz_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(quiz_attempts::table
            .filter(quiz_attempts::quiz_id.eq_any(quiz_ids))
            .load::<QuizAttempt>(self.conn)?)
    }

    fn delete_attempts_by_user(&mut self, user_id: i32) -> StoreResult<usize> {
        Ok(
            diesel::delete(quiz_attempts::table.filter(quiz_attempts::user_id.eq(user_id)))
                .execute(self.conn)?,
        )
    }

    fn delete_attempts_for_quizzes(&mut self, quiz_ids: &[i32]) -> StoreResult<usize> {
        if quiz_ids.is_empty() {
            return Ok(0);
        }
        Ok(
            diesel::delete(quiz_attempts::table.filter(quiz_attempts::quiz_id.eq_any(quiz_ids)))
                .execute(self.conn)?,
        )
    }

    fn insert_participation(
        &mut self,
        row: NewParticipationRow,
    ) -> StoreResult<QuizParticipation> {
        Ok(diesel::insert_into(quiz_participations::table)
            .values((
                quiz_participations::quiz_id.eq(row.quiz_id),
                quiz_participations::user_id.eq(row.user_id),
                quiz_participations::joined_at.eq(row.joined_at),
            ))
            .get_result::<QuizParticipation>(self.conn)?)
    }

    fn participations_for_quiz(&mut self, quiz_id: i32) -> StoreResult<Vec<QuizParticipation>> {
        Ok(quiz_participations::table
            .filter(quiz_participations::quiz_id.eq(quiz_id))
            .load::<QuizParticipation>(self.conn)?)
    }

    fn delete_participations_by_user(&mut self, user_id: i32) -> StoreResult<usize> {
        Ok(diesel::delete(
            quiz_participations::table.filter(quiz_participations::user_id.eq(user_id)),
        )
        .execute(self.conn)?)
    }

    fn delete_participations_for_quizzes(&mut self, quiz_ids: &[i32]) -> StoreResult<usize> {
        if quiz_ids.is_empty() {
            return Ok(0);
        }
        Ok(diesel::delete(
            quiz_participations::table.filter(quiz_participations::quiz_id.eq_any(quiz_ids)),
        )
        .execute(self.conn)?)
    }

    fn insert_message(&mut self, row: NewMessageRow) -> StoreResult<CommunityMessage> {
        Ok(diesel::insert_into(community_messages::table)
            .values((
                community_messages::course_id.eq(row.course_id),
                community_messages::user_id.eq(row.user_id),
                community_messages::content.eq(&row.content),
                community_messages::created_at.eq(row.created_at),
            ))
            .get_result::<CommunityMessage>(self.conn)?)
    }

    fn insert_feedback(&mut self, row: NewFeedbackRow) -> StoreResult<CourseFeedback> {
        Ok(diesel::insert_into(course_feedback::table)
            .values((
                course_feedback::course_id.eq(row.course_id),
                course_feedback::user_id.eq(row.user_id),
                course_feedback::content.eq(&row.content),
                course_feedback::rating.eq(row.rating),
                course_feedback::created_at.eq(row.created_at),
            ))
            .get_result::<CourseFeedback>(self.conn)?)
    }

    fn messages_for_course(&mut self, course_id: i32) -> StoreResult<Vec<CommunityMessage>> {
        Ok(community_messages::table
            .filter(community_messages::course_id.eq(course_id))
            .order((community_messages::created_at.asc(), community_messages::id.asc()))
            .load::<CommunityMessage>(self.conn)?)
    }

    fn feedback_for_course(&mut self, course_id: i32) -> StoreResult<Vec<CourseFeedback>> {
        Ok(course_feedback::table
            .filter(course_feedback::course_id.eq(course_id))
            .order((course_feedback::created_at.desc(), course_feedback::id.desc()))
            .load::<CourseFeedback>(self.conn)?)
    }

    fn delete_messages_by_user(&mut self, user_id: i32) -> StoreResult<usize> {
        Ok(diesel::delete(
            community_messages::table.filter(community_messages::user_id.eq(user_id)),
        )
        .execute(self.conn)?)
    }

    fn delete_feedback_by_user(&mut self, user_id: i32) -> StoreResult<usize> {
        Ok(
            diesel::delete(course_feedback::table.filter(course_feedback::user_id.eq(user_id)))
                .execute(self.conn)?,
        )
    }
}
