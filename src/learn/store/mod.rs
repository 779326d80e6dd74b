//! Storage seam for the learn core.
//!
//! [`LearnStore`] hands out transactions; everything the engine reads or writes
//! goes through the object-safe [`LearnTx`] so one closure can run unchanged
//! against Postgres or the in-memory store used by tests.

use std::future::Future;

use chrono::{DateTime, Utc};

use super::codes::CodeTarget;
use super::error::{LearnError, StoreResult};
use super::types::*;

pub mod memory;
pub mod pg;

pub use memory::InMemoryLearnStore;
pub use pg::PgStore;

#[derive(Debug, Clone)]
pub struct NewUserRow {
    pub email: String,
    pub full_name: Option<String>,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewQuizRow {
    pub title: String,
    pub description: Option<String>,
    pub access_code: String,
    pub is_public: bool,
    pub teacher_id: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewQuestionRow {
    pub quiz_id: i32,
    pub text: String,
    pub question_type: QuestionType,
    pub points: i32,
    pub time_limit: i32,
    pub position: i32,
}

#[derive(Debug, Clone)]
pub struct NewChoiceRow {
    pub question_id: i32,
    pub text: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone)]
pub struct NewCourseRow {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub status: CourseStatus,
    pub access_code: Option<String>,
    pub teacher_id: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLessonRow {
    pub course_id: i32,
    pub title: String,
    pub order_index: i32,
    pub duration_minutes: i32,
    pub linked_quiz_id: Option<i32>,
    pub quiz_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEnrollmentRow {
    pub user_id: i32,
    pub course_id: i32,
    pub status: EnrollmentStatus,
    pub progress_percent: f64,
    pub enrolled_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLessonProgressRow {
    pub enrollment_id: i32,
    pub lesson_id: i32,
    pub status: LessonStatus,
    pub time_spent_seconds: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewAttemptRow {
    pub quiz_id: i32,
    pub user_id: i32,
    pub score: i32,
    pub total_questions: i32,
    pub correct_answers: i32,
    pub rank: Rank,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewParticipationRow {
    pub quiz_id: i32,
    pub user_id: i32,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMessageRow {
    pub course_id: i32,
    pub user_id: i32,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFeedbackRow {
    pub course_id: i32,
    pub user_id: i32,
    pub content: String,
    pub rating: i32,
    pub created_at: DateTime<Utc>,
}

/// Operations available inside one storage transaction.
///
/// Deletes return the number of rows removed. Bulk deletes taking an id slice
/// are no-ops on an empty slice.
pub trait LearnTx {
    // users
    fn user(&mut self, id: i32) -> StoreResult<Option<User>>;
    fn insert_user(&mut self, row: NewUserRow) -> StoreResult<User>;
    fn delete_user(&mut self, id: i32) -> StoreResult<usize>;

    // quizzes
    fn quiz(&mut self, id: i32) -> StoreResult<Option<Quiz>>;
    fn quiz_by_code(&mut self, code: &str) -> StoreResult<Option<Quiz>>;
    fn quizzes_by_teacher(&mut self, teacher_id: i32) -> StoreResult<Vec<Quiz>>;
    fn insert_quiz(&mut self, row: NewQuizRow) -> StoreResult<Quiz>;
    fn insert_question(&mut self, row: NewQuestionRow) -> StoreResult<Question>;
    fn insert_choice(&mut self, row: NewChoiceRow) -> StoreResult<Choice>;
    /// Persists title, description and is_public.
    fn save_quiz(&mut self, quiz: &Quiz) -> StoreResult<()>;
    /// Removes every question of the quiz; their choices cascade.
    fn delete_questions_for_quiz(&mut self, quiz_id: i32) -> StoreResult<usize>;
    fn questions_for_quiz(&mut self, quiz_id: i32) -> StoreResult<Vec<Question>>;
    fn choices_for_question(&mut self, question_id: i32) -> StoreResult<Vec<Choice>>;
    fn delete_quizzes(&mut self, ids: &[i32]) -> StoreResult<usize>;

    fn access_code_taken(&mut self, target: CodeTarget, code: &str) -> StoreResult<bool>;

    // courses and lessons
    fn course(&mut self, id: i32) -> StoreResult<Option<Course>>;
    fn course_by_code(&mut self, code: &str) -> StoreResult<Option<Course>>;
    fn courses_by_teacher(&mut self, teacher_id: i32) -> StoreResult<Vec<Course>>;
    fn insert_course(&mut self, row: NewCourseRow) -> StoreResult<Course>;
    /// Persists title, description, category, status and access_code.
    fn save_course(&mut self, course: &Course) -> StoreResult<()>;
    fn delete_courses(&mut self, ids: &[i32]) -> StoreResult<usize>;
    fn lesson(&mut self, id: i32) -> StoreResult<Option<Lesson>>;
    /// Lessons of a course in `order_index` order.
    fn lessons_for_course(&mut self, course_id: i32) -> StoreResult<Vec<Lesson>>;
    fn count_lessons(&mut self, course_id: i32) -> StoreResult<i64>;
    fn insert_lesson(&mut self, row: NewLessonRow) -> StoreResult<Lesson>;
    /// Removes lessons; their progress rows cascade.
    fn delete_lessons(&mut self, ids: &[i32]) -> StoreResult<usize>;
    /// Clears `linked_quiz_id` and `quiz_code` on lessons pointing at any of the
    /// quizzes, whether by id or by code.
    fn unlink_lessons_from_quizzes(&mut self, ids: &[i32], codes: &[String])
        -> StoreResult<usize>;

    // enrollments
    fn enrollment(&mut self, id: i32) -> StoreResult<Option<Enrollment>>;
    /// Reads the enrollment and holds a write lock on it until the transaction ends.
    fn lock_enrollment(&mut self, id: i32) -> StoreResult<Option<Enrollment>>;
    fn enrollment_for(&mut self, user_id: i32, course_id: i32) -> StoreResult<Option<Enrollment>>;
    fn enrollments_for_user(&mut self, user_id: i32) -> StoreResult<Vec<Enrollment>>;
    fn enrollments_for_course(&mut self, course_id: i32) -> StoreResult<Vec<Enrollment>>;
    fn insert_enrollment(&mut self, row: NewEnrollmentRow) -> StoreResult<Enrollment>;
    /// Persists status, progress_percent and completed_at.
    fn save_enrollment(&mut self, enrollment: &Enrollment) -> StoreResult<()>;
    fn delete_enrollments_by_user(&mut self, user_id: i32) -> StoreResult<usize>;

    // lesson progress
    fn lesson_progress(
        &mut self,
        enrollment_id: i32,
        lesson_id: i32,
    ) -> StoreResult<Option<LessonProgress>>;
    fn progress_for_enrollment(&mut self, enrollment_id: i32) -> StoreResult<Vec<LessonProgress>>;
    fn count_completed_lessons(&mut self, enrollment_id: i32) -> StoreResult<i64>;
    fn insert_lesson_progress(&mut self, row: NewLessonProgressRow)
        -> StoreResult<LessonProgress>;
    /// Persists status, time_spent_seconds, started_at and completed_at.
    fn save_lesson_progress(&mut self, progress: &LessonProgress) -> StoreResult<()>;

    // attempts and participations
    fn insert_attempt(&mut self, row: NewAttemptRow) -> StoreResult<QuizAttempt>;
    /// Most recent first.
    fn attempts_by_user(&mut self, user_id: i32) -> StoreResult<Vec<QuizAttempt>>;
    fn attempts_for_quizzes(&mut self, quiz_ids: &[i32]) -> StoreResult<Vec<QuizAttempt>>;
    fn delete_attempts_by_user(&mut self, user_id: i32) -> StoreResult<usize>;
    fn delete_attempts_for_quizzes(&mut self, quiz_ids: &[i32]) -> StoreResult<usize>;
    fn insert_participation(&mut self, row: NewParticipationRow)
        -> StoreResult<QuizParticipation>;
    fn participations_for_quiz(&mut self, quiz_id: i32) -> StoreResult<Vec<QuizParticipation>>;
    fn delete_participations_by_user(&mut self, user_id: i32) -> StoreResult<usize>;
    fn delete_participations_for_quizzes(&mut self, quiz_ids: &[i32]) -> StoreResult<usize>;

    // community
    fn insert_message(&mut self, row: NewMessageRow) -> StoreResult<CommunityMessage>;
    fn insert_feedback(&mut self, row: NewFeedbackRow) -> StoreResult<CourseFeedback>;
    /// Oldest first.
    fn messages_for_course(&mut self, course_id: i32) -> StoreResult<Vec<CommunityMessage>>;
    /// Newest first.
    fn feedback_for_course(&mut self, course_id: i32) -> StoreResult<Vec<CourseFeedback>>;
    fn delete_messages_by_user(&mut self, user_id: i32) -> StoreResult<usize>;
    fn delete_feedback_by_user(&mut self, user_id: i32) -> StoreResult<usize>;
}

/// A transactional store. The closure's writes commit when it returns `Ok`
/// and are discarded when it returns `Err`.
pub trait LearnStore: Send + Sync + 'static {
    fn transaction<T, F>(&self, f: F) -> impl Future<Output = Result<T, LearnError>> + Send
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn LearnTx) -> Result<T, LearnError> + Send + 'static;
}
