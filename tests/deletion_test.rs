mod common;

use common::*;
use learnserver::learn::error::StoreResult;
use learnserver::learn::store::{
    NewAttemptRow, NewChoiceRow, NewCourseRow, NewEnrollmentRow, NewFeedbackRow, NewLessonProgressRow,
    NewLessonRow, NewMessageRow, NewParticipationRow, NewQuestionRow, NewQuizRow, NewUserRow,
};
use learnserver::learn::*;

#[tokio::test]
async fn test_delete_quiz_purges_dependents_and_unlinks_lessons() {
    let engine = engine();
    let quiz_owner = user(&engine, "q@example.com", UserRole::Teacher).await;
    let course_owner = user(&engine, "c@example.com", UserRole::Teacher).await;
    let student = user(&engine, "s@example.com", UserRole::Student).await;
    let quiz = quiz(&engine, quiz_owner, "Linked").await;

    let by_id = NewLesson {
        linked_quiz_id: Some(quiz.id),
        ..lesson("linked by id")
    };
    let by_code = NewLesson {
        quiz_code: Some(quiz.access_code.to_lowercase()),
        ..lesson("linked by code")
    };
    let course = course(
        &engine,
        course_owner,
        CourseStatus::Published,
        vec![by_id, by_code, lesson("unlinked")],
    )
    .await;
    assert!(course.lessons.iter().take(2).all(|l| l.linked_quiz_id == Some(quiz.id)));

    engine.join_quiz(student, &quiz.access_code).await.unwrap();
    engine
        .record_attempt(student, quiz.id, submission(1000, 1, 2, "Novice"))
        .await
        .unwrap();

    let err = engine.delete_quiz(course_owner, quiz.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let report = engine.delete_quiz(quiz_owner, quiz.id).await.unwrap();
    assert_eq!(report.quizzes, 1);
    assert_eq!(report.lessons_unlinked, 2);
    assert_eq!(report.attempts, 1);
    assert_eq!(report.participations, 1);

    let tables = engine.store().snapshot().await;
    assert!(!tables.references_quiz(quiz.id));
    assert!(tables.quizzes.is_empty());
    assert!(tables.questions.is_empty());
    assert!(tables.choices.is_empty());
    assert_eq!(tables.lessons.len(), 3);
    assert!(tables
        .lessons
        .values()
        .all(|l| l.linked_quiz_id.is_none() && l.quiz_code.is_none()));
}

#[tokio::test]
async fn test_delete_user_leaves_no_references() {
    let engine = engine();
    let admin = user(&engine, "admin@example.com", UserRole::SuperAdmin).await;
    let doomed = user(&engine, "doomed@example.com", UserRole::Teacher).await;
    let other_teacher = user(&engine, "other@example.com", UserRole::Teacher).await;
    let student = user(&engine, "student@example.com", UserRole::Student).await;

    // content the doomed teacher owns, used by others
    let owned_quiz = quiz(&engine, doomed, "Doomed quiz").await;
    let owned_course = course(&engine, doomed, CourseStatus::Published, vec![lesson("a")]).await;
    engine.join_quiz(student, &owned_quiz.access_code).await.unwrap();
    engine
        .record_attempt(student, owned_quiz.id, submission(100, 1, 2, "Novice"))
        .await
        .unwrap();
    let student_enrollment = engine
        .enroll(student, owned_course.course.id)
        .await
        .unwrap()
        .enrollment;
    engine
        .record_lesson_progress(
            student,
            student_enrollment.id,
            owned_course.lessons[0].id,
            LessonStatus::Completed,
            30,
        )
        .await
        .unwrap();

    // someone else's course linking the doomed quiz
    let foreign_course = course(
        &engine,
        other_teacher,
        CourseStatus::Published,
        vec![NewLesson {
            linked_quiz_id: Some(owned_quiz.id),
            ..lesson("uses doomed quiz")
        }],
    )
    .await;
    let foreign_quiz = quiz(&engine, other_teacher, "Other quiz").await;

    // the doomed user's own activity as a participant
    engine.join_quiz(doomed, &foreign_quiz.access_code).await.unwrap();
    engine
        .record_attempt(doomed, foreign_quiz.id, submission(50, 1, 2, "None"))
        .await
        .unwrap();
    let doomed_enrollment = engine
        .enroll(doomed, foreign_course.course.id)
        .await
        .unwrap()
        .enrollment;
    engine
        .record_lesson_progress(
            doomed,
            doomed_enrollment.id,
            foreign_course.lessons[0].id,
            LessonStatus::InProgress,
            10,
        )
        .await
        .unwrap();
    engine
        .post_message(doomed, foreign_course.course.id, "hello")
        .await
        .unwrap();
    engine
        .post_feedback(doomed, foreign_course.course.id, "great", 5)
        .await
        .unwrap();

    let report = engine.delete_user(admin, doomed.user_id).await.unwrap();
    assert_eq!(report.users, 1);
    assert_eq!(report.quizzes, 1);
    assert_eq!(report.courses, 1);
    assert_eq!(report.lessons_unlinked, 1);
    assert_eq!(report.messages, 1);
    assert_eq!(report.feedback, 1);

    let tables = engine.store().snapshot().await;
    assert!(!tables.users.contains_key(&doomed.user_id));
    assert!(!tables.references_user(doomed.user_id));
    assert!(!tables.quizzes.contains_key(&owned_quiz.id));
    assert!(!tables.references_quiz(owned_quiz.id));
    assert!(!tables.courses.contains_key(&owned_course.course.id));
    assert!(!tables.references_course(owned_course.course.id));
    assert!(tables
        .lesson_progress
        .values()
        .all(|p| p.enrollment_id != student_enrollment.id && p.enrollment_id != doomed_enrollment.id));

    // unrelated content survives
    assert!(tables.quizzes.contains_key(&foreign_quiz.id));
    assert!(tables.courses.contains_key(&foreign_course.course.id));
    assert_eq!(tables.lessons.values().filter(|l| l.course_id == foreign_course.course.id).count(), 1);
}

#[tokio::test]
async fn test_self_deletion_is_forbidden_and_changes_nothing() {
    let engine = engine();
    let admin = user(&engine, "admin@example.com", UserRole::SuperAdmin).await;
    quiz(&engine, admin, "Admin quiz").await;
    let before = engine.store().snapshot().await;

    let err = engine.delete_user(admin, admin.user_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let after = engine.store().snapshot().await;
    assert_eq!(before.users, after.users);
    assert_eq!(before.quizzes, after.quizzes);
    assert_eq!(before.questions.len(), after.questions.len());
}

#[tokio::test]
async fn test_only_super_admin_deletes_users() {
    let engine = engine();
    let teacher = user(&engine, "t@example.com", UserRole::Teacher).await;
    let student = user(&engine, "s@example.com", UserRole::Student).await;

    let err = engine.delete_user(teacher, student.user_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let admin = user(&engine, "a@example.com", UserRole::SuperAdmin).await;
    let err = engine.delete_user(admin, 9999).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_delete_course_cascades() {
    let engine = engine();
    let teacher = user(&engine, "t@example.com", UserRole::Teacher).await;
    let student = user(&engine, "s@example.com", UserRole::Student).await;
    let course = course(&engine, teacher, CourseStatus::Published, vec![lesson("a")]).await;
    let enrollment = engine.enroll(student, course.course.id).await.unwrap().enrollment;
    engine
        .record_lesson_progress(
            student,
            enrollment.id,
            course.lessons[0].id,
            LessonStatus::Completed,
            5,
        )
        .await
        .unwrap();
    engine
        .post_feedback(student, course.course.id, "nice", 4)
        .await
        .unwrap();

    let err = engine.delete_course(student, course.course.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    engine.delete_course(teacher, course.course.id).await.unwrap();
    let tables = engine.store().snapshot().await;
    assert!(tables.courses.is_empty());
    assert!(!tables.references_course(course.course.id));
    assert!(tables.lesson_progress.is_empty());
    assert!(tables.users.contains_key(&student.user_id));
}

#[tokio::test]
async fn test_super_admin_can_delete_any_quiz() {
    let engine = engine();
    let teacher = user(&engine, "t@example.com", UserRole::Teacher).await;
    let admin = user(&engine, "a@example.com", UserRole::SuperAdmin).await;
    let quiz = quiz(&engine, teacher, "Q").await;

    engine.delete_quiz(admin, quiz.id).await.unwrap();
    let err = engine.quiz_detail(admin, quiz.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

/// Store whose transactions fail when lessons are unlinked from quizzes.
#[derive(Debug, Clone)]
struct UnlinkFailsStore {
    inner: InMemoryLearnStore,
}

struct UnlinkFailsTx<'a> {
    inner: &'a mut dyn LearnTx,
}

impl LearnStore for UnlinkFailsStore {
    fn transaction<T, F>(&self, f: F) -> impl std::future::Future<Output = Result<T, LearnError>> + Send
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn LearnTx) -> Result<T, LearnError> + Send + 'static,
    {
        self.inner
            .transaction(move |tx| f(&mut UnlinkFailsTx { inner: tx }))
    }
}

impl LearnTx for UnlinkFailsTx<'_> {
    fn unlink_lessons_from_quizzes(&mut self, _ids: &[i32], _codes: &[String]) -> StoreResult<usize> {
        Err(StorageError::Backend("connection reset during unlink".into()))
    }

    fn user(&mut self, id: i32) -> StoreResult<Option<User>> {
        self.inner.user(id)
    }
    fn insert_user(&mut self, row: NewUserRow) -> StoreResult<User> {
        self.inner.insert_user(row)
    }
    fn delete_user(&mut self, id: i32) -> StoreResult<usize> {
        self.inner.delete_user(id)
    }
    fn quiz(&mut self, id: i32) -> StoreResult<Option<Quiz>> {
        self.inner.quiz(id)
    }
    fn quiz_by_code(&mut self, code: &str) -> StoreResult<Option<Quiz>> {
        self.inner.quiz_by_code(code)
    }
    fn quizzes_by_teacher(&mut self, teacher_id: i32) -> StoreResult<Vec<Quiz>> {
        self.inner.quizzes_by_teacher(teacher_id)
    }
    fn insert_quiz(&mut self, row: NewQuizRow) -> StoreResult<Quiz> {
        self.inner.insert_quiz(row)
    }
    fn insert_question(&mut self, row: NewQuestionRow) -> StoreResult<Question> {
        self.inner.insert_question(row)
    }
    fn insert_choice(&mut self, row: NewChoiceRow) -> StoreResult<Choice> {
        self.inner.insert_choice(row)
    }
    fn save_quiz(&mut self, quiz: &Quiz) -> StoreResult<()> {
        self.inner.save_quiz(quiz)
    }
    fn delete_questions_for_quiz(&mut self, quiz_id: i32) -> StoreResult<usize> {
        self.inner.delete_questions_for_quiz(quiz_id)
    }
    fn questions_for_quiz(&mut self, quiz_id: i32) -> StoreResult<Vec<Question>> {
        self.inner.questions_for_quiz(quiz_id)
    }
    fn choices_for_question(&mut self, question_id: i32) -> StoreResult<Vec<Choice>> {
        self.inner.choices_for_question(question_id)
    }
    fn delete_quizzes(&mut self, ids: &[i32]) -> StoreResult<usize> {
        self.inner.delete_quizzes(ids)
    }
    fn access_code_taken(&mut self, target: CodeTarget, code: &str) -> StoreResult<bool> {
        self.inner.access_code_taken(target, code)
    }
    fn course(&mut self, id: i32) -> StoreResult<Option<Course>> {
        self.inner.course(id)
    }
    fn course_by_code(&mut self, code: &str) -> StoreResult<Option<Course>> {
        self.inner.course_by_code(code)
    }
    fn courses_by_teacher(&mut self, teacher_id: i32) -> StoreResult<Vec<Course>> {
        self.inner.courses_by_teacher(teacher_id)
    }
    fn insert_course(&mut self, row: NewCourseRow) -> StoreResult<Course> {
        self.inner.insert_course(row)
    }
    fn save_course(&mut self, course: &Course) -> StoreResult<()> {
        self.inner.save_course(course)
    }
    fn delete_courses(&mut self, ids: &[i32]) -> StoreResult<usize> {
        self.inner.delete_courses(ids)
    }
    fn lesson(&mut self, id: i32) -> StoreResult<Option<Lesson>> {
        self.inner.lesson(id)
    }
    fn lessons_for_course(&mut self, course_id: i32) -> StoreResult<Vec<Lesson>> {
        self.inner.lessons_for_course(course_id)
    }
    fn count_lessons(&mut self, course_id: i32) -> StoreResult<i64> {
        self.inner.count_lessons(course_id)
    }
    fn insert_lesson(&mut self, row: NewLessonRow) -> StoreResult<Lesson> {
        self.inner.insert_lesson(row)
    }
    fn delete_lessons(&mut self, ids: &[i32]) -> StoreResult<usize> {
        self.inner.delete_lessons(ids)
    }
    fn enrollment(&mut self, id: i32) -> StoreResult<Option<Enrollment>> {
        self.inner.enrollment(id)
    }
    fn lock_enrollment(&mut self, id: i32) -> StoreResult<Option<Enrollment>> {
        self.inner.lock_enrollment(id)
    }
    fn enrollment_for(&mut self, user_id: i32, course_id: i32) -> StoreResult<Option<Enrollment>> {
        self.inner.enrollment_for(user_id, course_id)
    }
    fn enrollments_for_user(&mut self, user_id: i32) -> StoreResult<Vec<Enrollment>> {
        self.inner.enrollments_for_user(user_id)
    }
    fn enrollments_for_course(&mut self, course_id: i32) -> StoreResult<Vec<Enrollment>> {
        self.inner.enrollments_for_course(course_id)
    }
    fn insert_enrollment(&mut self, row: NewEnrollmentRow) -> StoreResult<Enrollment> {
        self.inner.insert_enrollment(row)
    }
    fn save_enrollment(&mut self, enrollment: &Enrollment) -> StoreResult<()> {
        self.inner.save_enrollment(enrollment)
    }
    fn delete_enrollments_by_user(&mut self, user_id: i32) -> StoreResult<usize> {
        self.inner.delete_enrollments_by_user(user_id)
    }
    fn lesson_progress(
        &mut self,
        enrollment_id: i32,
        lesson_id: i32,
    ) -> StoreResult<Option<LessonProgress>> {
        self.inner.lesson_progress(enrollment_id, lesson_id)
    }
    fn progress_for_enrollment(&mut self, enrollment_id: i32) -> StoreResult<Vec<LessonProgress>> {
        self.inner.progress_for_enrollment(enrollment_id)
    }
    fn count_completed_lessons(&mut self, enrollment_id: i32) -> StoreResult<i64> {
        self.inner.count_completed_lessons(enrollment_id)
    }
    fn insert_lesson_progress(&mut self, row: NewLessonProgressRow) -> StoreResult<LessonProgress> {
        self.inner.insert_lesson_progress(row)
    }
    fn save_lesson_progress(&mut self, progress: &LessonProgress) -> StoreResult<()> {
        self.inner.save_lesson_progress(progress)
    }
    fn insert_attempt(&mut self, row: NewAttemptRow) -> StoreResult<QuizAttempt> {
        self.inner.insert_attempt(row)
    }
    fn attempts_by_user(&mut self, user_id: i32) -> StoreResult<Vec<QuizAttempt>> {
        self.inner.attempts_by_user(user_id)
    }
    fn attempts_for_quizzes(&mut self, quiz_ids: &[i32]) -> StoreResult<Vec<QuizAttempt>> {
        self.inner.attempts_for_quizzes(quiz_ids)
    }
    fn delete_attempts_by_user(&mut self, user_id: i32) -> StoreResult<usize> {
        self.inner.delete_attempts_by_user(user_id)
    }
    fn delete_attempts_for_quizzes(&mut self, quiz_ids: &[i32]) -> StoreResult<usize> {
        self.inner.delete_attempts_for_quizzes(quiz_ids)
    }
    fn insert_participation(&mut self, row: NewParticipationRow) -> StoreResult<QuizParticipation> {
        self.inner.insert_participation(row)
    }
    fn participations_for_quiz(&mut self, quiz_id: i32) -> StoreResult<Vec<QuizParticipation>> {
        self.inner.participations_for_quiz(quiz_id)
    }
    fn delete_participations_by_user(&mut self, user_id: i32) -> StoreResult<usize> {
        self.inner.delete_participations_by_user(user_id)
    }
    fn delete_participations_for_quizzes(&mut self, quiz_ids: &[i32]) -> StoreResult<usize> {
        self.inner.delete_participations_for_quizzes(quiz_ids)
    }
    fn insert_message(&mut self, row: NewMessageRow) -> StoreResult<CommunityMessage> {
        self.inner.insert_message(row)
    }
    fn insert_feedback(&mut self, row: NewFeedbackRow) -> StoreResult<CourseFeedback> {
        self.inner.insert_feedback(row)
    }
    fn messages_for_course(&mut self, course_id: i32) -> StoreResult<Vec<CommunityMessage>> {
        self.inner.messages_for_course(course_id)
    }
    fn feedback_for_course(&mut self, course_id: i32) -> StoreResult<Vec<CourseFeedback>> {
        self.inner.feedback_for_course(course_id)
    }
    fn delete_messages_by_user(&mut self, user_id: i32) -> StoreResult<usize> {
        self.inner.delete_messages_by_user(user_id)
    }
    fn delete_feedback_by_user(&mut self, user_id: i32) -> StoreResult<usize> {
        self.inner.delete_feedback_by_user(user_id)
    }
}

#[tokio::test]
async fn test_failed_user_deletion_rolls_back_earlier_stages() {
    let engine = engine();
    let admin = user(&engine, "a@example.com", UserRole::SuperAdmin).await;
    let teacher = user(&engine, "t@example.com", UserRole::Teacher).await;
    let student = user(&engine, "s@example.com", UserRole::Student).await;

    // The teacher has rows in every stage before quiz purging.
    let other_quiz = quiz(&engine, admin, "Other").await;
    engine.join_quiz(teacher, &other_quiz.access_code).await.unwrap();
    engine
        .record_attempt(teacher, other_quiz.id, submission(10, 1, 2, "Novice"))
        .await
        .unwrap();
    let admin_course = course(&engine, admin, CourseStatus::Published, vec![lesson("a")]).await;
    engine.enroll(teacher, admin_course.course.id).await.unwrap();
    engine
        .post_message(teacher, admin_course.course.id, "hello")
        .await
        .unwrap();
    engine
        .post_feedback(teacher, admin_course.course.id, "fine", 4)
        .await
        .unwrap();

    let owned = quiz(&engine, teacher, "Owned").await;
    engine.join_quiz(student, &owned.access_code).await.unwrap();
    course(&engine, teacher, CourseStatus::Published, vec![]).await;

    let before = engine.store().snapshot().await;
    let failing = LearnEngine::with_codes(
        UnlinkFailsStore {
            inner: engine.store().clone(),
        },
        CodeAllocator::default(),
    );

    let err = failing.delete_user(admin, teacher.user_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persistence);

    let after = engine.store().snapshot().await;
    assert_eq!(after.users, before.users);
    assert_eq!(after.participations, before.participations);
    assert_eq!(after.attempts, before.attempts);
    assert_eq!(after.enrollments, before.enrollments);
    assert_eq!(after.messages, before.messages);
    assert_eq!(after.feedback, before.feedback);
    assert_eq!(after.quizzes, before.quizzes);
    assert_eq!(after.courses, before.courses);
    assert_eq!(after.lessons, before.lessons);
}
