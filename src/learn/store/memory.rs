//! In-memory [`LearnStore`] for tests and local runs.
//!
//! Mirrors the constraints the migration declares: unique keys, foreign keys
//! with the same RESTRICT/CASCADE behaviour, and the check constraints. A
//! transaction works on a copy of the tables which replaces the committed state
//! only when the closure succeeds.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::*;
use crate::learn::error::StorageError;

#[derive(Debug, Clone, Default)]
pub struct MemoryTables {
    pub users: BTreeMap<i32, User>,
    pub quizzes: BTreeMap<i32, Quiz>,
    pub questions: BTreeMap<i32, Question>,
    pub choices: BTreeMap<i32, Choice>,
    pub courses: BTreeMap<i32, Course>,
    pub lessons: BTreeMap<i32, Lesson>,
    pub enrollments: BTreeMap<i32, Enrollment>,
    pub lesson_progress: BTreeMap<i32, LessonProgress>,
    pub attempts: BTreeMap<i32, QuizAttempt>,
    pub participations: BTreeMap<i32, QuizParticipation>,
    pub messages: BTreeMap<i32, CommunityMessage>,
    pub feedback: BTreeMap<i32, CourseFeedback>,
    next_id: i32,
}

impl MemoryTables {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    /// Whether any row anywhere still points at this user.
    pub fn references_user(&self, user_id: i32) -> bool {
        self.quizzes.values().any(|q| q.teacher_id == user_id)
            || self.courses.values().any(|c| c.teacher_id == user_id)
            || self.enrollments.values().any(|e| e.user_id == user_id)
            || self.attempts.values().any(|a| a.user_id == user_id)
            || self.participations.values().any(|p| p.user_id == user_id)
            || self.messages.values().any(|m| m.user_id == user_id)
            || self.feedback.values().any(|f| f.user_id == user_id)
    }

    /// Whether any row anywhere still points at this quiz.
    pub fn references_quiz(&self, quiz_id: i32) -> bool {
        self.questions.values().any(|q| q.quiz_id == quiz_id)
            || self.lessons.values().any(|l| l.linked_quiz_id == Some(quiz_id))
            || self.attempts.values().any(|a| a.quiz_id == quiz_id)
            || self.participations.values().any(|p| p.quiz_id == quiz_id)
    }

    /// Whether any row anywhere still points at this course.
    pub fn references_course(&self, course_id: i32) -> bool {
        self.lessons.values().any(|l| l.course_id == course_id)
            || self.enrollments.values().any(|e| e.course_id == course_id)
            || self.messages.values().any(|m| m.course_id == course_id)
            || self.feedback.values().any(|f| f.course_id == course_id)
    }

    fn require(&self, exists: bool, constraint: &str) -> StoreResult<()> {
        if exists {
            Ok(())
        } else {
            Err(StorageError::foreign_key(constraint))
        }
    }

    fn check(&self, holds: bool, constraint: &str) -> StoreResult<()> {
        if holds {
            Ok(())
        } else {
            Err(StorageError::check(constraint))
        }
    }

    fn cascade_lesson_progress<P>(&mut self, pred: P) -> usize
    where
        P: Fn(&LessonProgress) -> bool,
    {
        let before = self.lesson_progress.len();
        self.lesson_progress.retain(|_, p| !pred(p));
        before - self.lesson_progress.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryLearnStore {
    tables: Arc<Mutex<MemoryTables>>,
}

impl InMemoryLearnStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the committed state.
    pub async fn snapshot(&self) -> MemoryTables {
        self.tables.lock().await.clone()
    }
}

impl LearnStore for InMemoryLearnStore {
    fn transaction<T, F>(&self, f: F) -> impl Future<Output = Result<T, LearnError>> + Send
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn LearnTx) -> Result<T, LearnError> + Send + 'static,
    {
        let tables = Arc::clone(&self.tables);
        async move {
            let mut committed = tables.lock().await;
            let mut working = committed.clone();
            let result = f(&mut MemoryTx {
                tables: &mut working,
            })?;
            *committed = working;
            Ok(result)
        }
    }
}

struct MemoryTx<'a> {
    tables: &'a mut MemoryTables,
}

fn collect<T: Clone>(rows: &BTreeMap<i32, T>, pred: impl Fn(&T) -> bool) -> Vec<T> {
    rows.values().filter(|r| pred(r)).cloned().collect()
}

fn remove_where<T>(rows: &mut BTreeMap<i32, T>, pred: impl Fn(&T) -> bool) -> usize {
    let before = rows.len();
    rows.retain(|_, r| !pred(r));
    before - rows.len()
}

impl LearnTx for MemoryTx<'_> {
    fn user(&mut self, id: i32) -> StoreResult<Option<User>> {
        Ok(self.tables.users.get(&id).cloned())
    }

    fn insert_user(&mut self, row: NewUserRow) -> StoreResult<User> {
        let t = &mut *self.tables;
        if t.users.values().any(|u| u.email == row.email) {
            return Err(StorageError::unique("uq_users_email"));
        }
        let user = User {
            id: t.next_id(),
            email: row.email,
            full_name: row.full_name,
            role: row.role,
            is_active: true,
            streak_count: 0,
            last_streak_date: None,
            created_at: row.created_at,
        };
        t.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn delete_user(&mut self, id: i32) -> StoreResult<usize> {
        let t = &*self.tables;
        let restrictions = [
            (t.quizzes.values().any(|q| q.teacher_id == id), "fk_quizzes_teacher"),
            (t.courses.values().any(|c| c.teacher_id == id), "fk_courses_teacher"),
            (t.enrollments.values().any(|e| e.user_id == id), "fk_enrollments_user"),
            (t.attempts.values().any(|a| a.user_id == id), "fk_quiz_attempts_user"),
            (
                t.participations.values().any(|p| p.user_id == id),
                "fk_quiz_participations_user",
            ),
            (t.messages.values().any(|m| m.user_id == id), "fk_community_messages_user"),
            (t.feedback.values().any(|f| f.user_id == id), "fk_course_feedback_user"),
        ];
        if let Some((_, constraint)) = restrictions.iter().find(|(hit, _)| *hit) {
            return Err(StorageError::foreign_key(constraint));
        }
        Ok(usize::from(self.tables.users.remove(&id).is_some()))
    }

    fn quiz(&mut self, id: i32) -> StoreResult<Option<Quiz>> {
        Ok(self.tables.quizzes.get(&id).cloned())
    }

    fn quiz_by_code(&mut self, code: &str) -> StoreResult<Option<Quiz>> {
        Ok(self
            .tables
            .quizzes
            .values()
            .find(|q| q.access_code == code)
            .cloned())
    }

    fn quizzes_by_teacher(&mut self, teacher_id: i32) -> StoreResult<Vec<Quiz>> {
        Ok(collect(&self.tables.quizzes, |q| q.teacher_id == teacher_id))
    }

    fn insert_quiz(&mut self, row: NewQuizRow) -> StoreResult<Quiz> {
        let t = &mut *self.tables;
        if t.quizzes.values().any(|q| q.access_code == row.access_code) {
            return Err(StorageError::unique("uq_quizzes_access_code"));
        }
        t.check(
            row.access_code == row.access_code.to_uppercase(),
            "ck_quizzes_access_code_upper",
        )?;
        t.require(t.users.contains_key(&row.teacher_id), "fk_quizzes_teacher")?;
        let quiz = Quiz {
            id: t.next_id(),
            title: row.title,
            description: row.description,
            access_code: row.access_code,
            is_public: row.is_public,
            teacher_id: row.teacher_id,
            created_at: row.created_at,
        };
        t.quizzes.insert(quiz.id, quiz.clone());
        Ok(quiz)
    }

    fn insert_question(&mut self, row: NewQuestionRow) -> StoreResult<Question> {
        let t = &mut *self.tables;
        t.check(row.points > 0, "ck_question_points_positive")?;
        t.check(row.time_limit > 0, "ck_question_time_limit_positive")?;
        t.require(t.quizzes.contains_key(&row.quiz_id), "fk_questions_quiz")?;
        let question = Question {
            id: t.next_id(),
            quiz_id: row.quiz_id,
            text: row.text,
            question_type: row.question_type,
            points: row.points,
            time_limit: row.time_limit,
            position: row.position,
        };
        t.questions.insert(question.id, question.clone());
        Ok(question)
    }

    fn insert_choice(&mut self, row: NewChoiceRow) -> StoreResult<Choice> {
        let t = &mut *self.tables;
        t.require(t.questions.contains_key(&row.question_id), "fk_choices_question")?;
        let choice = Choice {
            id: t.next_id(),
            question_id: row.question_id,
            text: row.text,
            is_correct: row.is_correct,
        };
        t.choices.insert(choice.id, choice.clone());
        Ok(choice)
    }

    fn save_quiz(&mut self, quiz: &Quiz) -> StoreResult<()> {
        let row = self
            .tables
            .quizzes
            .get_mut(&quiz.id)
            .ok_or_else(|| StorageError::Backend(format!("quiz {} vanished", quiz.id)))?;
        row.title = quiz.title.clone();
        row.description = quiz.description.clone();
        row.is_public = quiz.is_public;
        Ok(())
    }

    fn delete_questions_for_quiz(&mut self, quiz_id: i32) -> StoreResult<usize> {
        let t = &mut *self.tables;
        let question_ids: Vec<i32> = t
            .questions
            .values()
            .filter(|q| q.quiz_id == quiz_id)
            .map(|q| q.id)
            .collect();
        remove_where(&mut t.choices, |c| question_ids.contains(&c.question_id));
        Ok(remove_where(&mut t.questions, |q| q.quiz_id == quiz_id))
    }

    fn questions_for_quiz(&mut self, quiz_id: i32) -> StoreResult<Vec<Question>> {
        let mut questions = collect(&self.tables.questions, |q| q.quiz_id == quiz_id);
        questions.sort_by_key(|q| (q.position, q.id));
        Ok(questions)
    }

    fn choices_for_question(&mut self, question_id: i32) -> StoreResult<Vec<Choice>> {
        Ok(collect(&self.tables.choices, |c| c.question_id == question_id))
    }

    fn delete_quizzes(&mut self, ids: &[i32]) -> StoreResult<usize> {
        let t = &mut *self.tables;
        let restrictions = [
            (
                t.lessons
                    .values()
                    .any(|l| l.linked_quiz_id.is_some_and(|q| ids.contains(&q))),
                "fk_lessons_linked_quiz",
            ),
            (
                t.attempts.values().any(|a| ids.contains(&a.quiz_id)),
                "fk_quiz_attempts_quiz",
            ),
            (
                t.participations.values().any(|p| ids.contains(&p.quiz_id)),
                "fk_quiz_participations_quiz",
            ),
        ];
        if let Some((_, constraint)) = restrictions.iter().find(|(hit, _)| *hit) {
            return Err(StorageError::foreign_key(constraint));
        }

        let question_ids: Vec<i32> = t
            .questions
            .values()
            .filter(|q| ids.contains(&q.quiz_id))
            .map(|q| q.id)
            .collect();
        remove_where(&mut t.choices, |c| question_ids.contains(&c.question_id));
        remove_where(&mut t.questions, |q| ids.contains(&q.quiz_id));
        Ok(remove_where(&mut t.quizzes, |q| ids.contains(&q.id)))
    }

    fn access_code_taken(&mut self, target: CodeTarget, code: &str) -> StoreResult<bool> {
        Ok(match target {
            CodeTarget::Quiz => self.tables.quizzes.values().any(|q| q.access_code == code),
            CodeTarget::Course => self
                .tables
                .courses
                .values()
                .any(|c| c.access_code.as_deref() == Some(code)),
        })
    }

    fn course(&mut self, id: i32) -> StoreResult<Option<Course>> {
        Ok(self.tables.courses.get(&id).cloned())
    }

    fn course_by_code(&mut self, code: &str) -> StoreResult<Option<Course>> {
        Ok(self
            .tables
            .courses
            .values()
            .find(|c| c.access_code.as_deref() == Some(code))
            .cloned())
    }

    fn courses_by_teacher(&mut self, teacher_id: i32) -> StoreResult<Vec<Course>> {
        Ok(collect(&self.tables.courses, |c| c.teacher_id == teacher_id))
    }

    fn insert_course(&mut self, row: NewCourseRow) -> StoreResult<Course> {
        let t = &mut *self.tables;
        if let Some(code) = row.access_code.as_deref() {
            if t.courses.values().any(|c| c.access_code.as_deref() == Some(code)) {
                return Err(StorageError::unique("uq_courses_access_code"));
            }
        }
        t.check(
            row.status == CourseStatus::Draft || row.access_code.is_some(),
            "ck_courses_access_code_required",
        )?;
        t.require(t.users.contains_key(&row.teacher_id), "fk_courses_teacher")?;
        let course = Course {
            id: t.next_id(),
            title: row.title,
            description: row.description,
            category: row.category,
            status: row.status,
            access_code: row.access_code,
            teacher_id: row.teacher_id,
            created_at: row.created_at,
        };
        t.courses.insert(course.id, course.clone());
        Ok(course)
    }

    fn save_course(&mut self, course: &Course) -> StoreResult<()> {
        let t = &mut *self.tables;
        if let Some(code) = course.access_code.as_deref() {
            if t
                .courses
                .values()
                .any(|c| c.id != course.id && c.access_code.as_deref() == Some(code))
            {
                return Err(StorageError::unique("uq_courses_access_code"));
            }
        }
        t.check(
            course.status == CourseStatus::Draft || course.access_code.is_some(),
            "ck_courses_access_code_required",
        )?;
        let row = t
            .courses
            .get_mut(&course.id)
            .ok_or_else(|| StorageError::Backend(format!("course {} vanished", course.id)))?;
        row.title = course.title.clone();
        row.description = course.description.clone();
        row.category = course.category.clone();
        row.status = course.status;
        row.access_code = course.access_code.clone();
        Ok(())
    }

    fn delete_courses(&mut self, ids: &[i32]) -> StoreResult<usize> {
        let t = &mut *self.tables;
        let lesson_ids: Vec<i32> = t
            .lessons
            .values()
            .filter(|l| ids.contains(&l.course_id))
            .map(|l| l.id)
            .collect();
        let enrollment_ids: Vec<i32> = t
            .enrollments
            .values()
            .filter(|e| ids.contains(&e.course_id))
            .map(|e| e.id)
            .collect();
        t.cascade_lesson_progress(|p| {
            lesson_ids.contains(&p.lesson_id) || enrollment_ids.contains(&p.enrollment_id)
        });
        remove_where(&mut t.lessons, |l| ids.contains(&l.course_id));
        remove_where(&mut t.enrollments, |e| ids.contains(&e.course_id));
        remove_where(&mut t.messages, |m| ids.contains(&m.course_id));
        remove_where(&mut t.feedback, |f| ids.contains(&f.course_id));
        Ok(remove_where(&mut t.courses, |c| ids.contains(&c.id)))
    }

    fn lesson(&mut self, id: i32) -> StoreResult<Option<Lesson>> {
        Ok(self.tables.lessons.get(&id).cloned())
    }

    fn lessons_for_course(&mut self, course_id: i32) -> StoreResult<Vec<Lesson>> {
        let mut lessons = collect(&self.tables.lessons, |l| l.course_id == course_id);
        lessons.sort_by_key(|l| (l.order_index, l.id));
        Ok(lessons)
    }

    fn count_lessons(&mut self, course_id: i32) -> StoreResult<i64> {
        Ok(self
            .tables
            .lessons
            .values()
            .filter(|l| l.course_id == course_id)
            .count() as i64)
    }

    fn insert_lesson(&mut self, row: NewLessonRow) -> StoreResult<Lesson> {
        let t = &mut *self.tables;
        t.check(row.order_index >= 0, "ck_lessons_order_non_negative")?;
        t.check(row.duration_minutes >= 0, "ck_lessons_duration_non_negative")?;
        t.require(t.courses.contains_key(&row.course_id), "fk_lessons_course")?;
        if let Some(quiz_id) = row.linked_quiz_id {
            t.require(t.quizzes.contains_key(&quiz_id), "fk_lessons_linked_quiz")?;
        }
        let lesson = Lesson {
            id: t.next_id(),
            course_id: row.course_id,
            title: row.title,
            order_index: row.order_index,
            duration_minutes: row.duration_minutes,
            linked_quiz_id: row.linked_quiz_id,
            quiz_code: row.quiz_code,
            created_at: row.created_at,
        };
        t.lessons.insert(lesson.id, lesson.clone());
        Ok(lesson)
    }

    fn delete_lessons(&mut self, ids: &[i32]) -> StoreResult<usize> {
        let t = &mut *self.tables;
        t.cascade_lesson_progress(|p| ids.contains(&p.lesson_id));
        Ok(remove_where(&mut t.lessons, |l| ids.contains(&l.id)))
    }

    fn unlink_lessons_from_quizzes(
        &mut self,
        ids: &[i32],
        codes: &[String],
    ) -> StoreResult<usize> {
        let mut unlinked = 0;
        for lesson in self.tables.lessons.values_mut() {
            let by_id = lesson.linked_quiz_id.is_some_and(|q| ids.contains(&q));
            let by_code = lesson
                .quiz_code
                .as_ref()
                .is_some_and(|code| codes.contains(code));
            if by_id || by_code {
                lesson.linked_quiz_id = None;
                lesson.quiz_code = None;
                unlinked += 1;
            }
        }
        Ok(unlinked)
    }

    fn enrollment(&mut self, id: i32) -> StoreResult<Option<Enrollment>> {
        Ok(self.tables.enrollments.get(&id).cloned())
    }

    fn lock_enrollment(&mut self, id: i32) -> StoreResult<Option<Enrollment>> {
        // The store-wide mutex already serialises transactions.
        self.enrollment(id)
    }

    fn enrollment_for(&mut self, user_id: i32, course_id: i32) -> StoreResult<Option<Enrollment>> {
        Ok(self
            .tables
            .enrollments
            .values()
            .find(|e| e.user_id == user_id && e.course_id == course_id)
            .cloned())
    }

    fn enrollments_for_user(&mut self, user_id: i32) -> StoreResult<Vec<Enrollment>> {
        Ok(collect(&self.tables.enrollments, |e| e.user_id == user_id))
    }

    fn enrollments_for_course(&mut self, course_id: i32) -> StoreResult<Vec<Enrollment>> {
        Ok(collect(&self.tables.enrollments, |e| e.course_id == course_id))
    }

    fn insert_enrollment(&mut self, row: NewEnrollmentRow) -> StoreResult<Enrollment> {
        let t = &mut *self.tables;
        if t
            .enrollments
            .values()
            .any(|e| e.user_id == row.user_id && e.course_id == row.course_id)
        {
            return Err(StorageError::unique("uq_enrollment_user_course"));
        }
        t.check(
            (0.0..=100.0).contains(&row.progress_percent),
            "ck_enrollment_progress_range",
        )?;
        t.require(t.users.contains_key(&row.user_id), "fk_enrollments_user")?;
        t.require(t.courses.contains_key(&row.course_id), "fk_enrollments_course")?;
        let enrollment = Enrollment {
            id: t.next_id(),
            user_id: row.user_id,
            course_id: row.course_id,
            status: row.status,
            progress_percent: row.progress_percent,
            enrolled_at: row.enrolled_at,
            completed_at: None,
        };
        t.enrollments.insert(enrollment.id, enrollment.clone());
        Ok(enrollment)
    }

    fn save_enrollment(&mut self, enrollment: &Enrollment) -> StoreResult<()> {
        let t = &mut *self.tables;
        t.check(
            (0.0..=100.0).contains(&enrollment.progress_percent),
            "ck_enrollment_progress_range",
        )?;
        let row = t
            .enrollments
            .get_mut(&enrollment.id)
            .ok_or_else(|| StorageError::Backend(format!("enrollment {} vanished", enrollment.id)))?;
        row.status = enrollment.status;
        row.progress_percent = enrollment.progress_percent;
        row.completed_at = enrollment.completed_at;
        Ok(())
    }

    fn delete_enrollments_by_user(&mut self, user_id: i32) -> StoreResult<usize> {
        let t = &mut *self.tables;
        let ids: Vec<i32> = t
            .enrollments
            .values()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.id)
            .collect();
        t.cascade_lesson_progress(|p| ids.contains(&p.enrollment_id));
        Ok(remove_where(&mut t.enrollments, |e| e.user_id == user_id))
    }

    fn lesson_progress(
        &mut self,
        enrollment_id: i32,
        lesson_id: i32,
    ) -> StoreResult<Option<LessonProgress>> {
        Ok(self
            .tables
            .lesson_progress
            .values()
            .find(|p| p.enrollment_id == enrollment_id && p.lesson_id == lesson_id)
            .cloned())
    }

    fn progress_for_enrollment(&mut self, enrollment_id: i32) -> StoreResult<Vec<LessonProgress>> {
        Ok(collect(&self.tables.lesson_progress, |p| {
            p.enrollment_id == enrollment_id
        }))
    }

    fn count_completed_lessons(&mut self, enrollment_id: i32) -> StoreResult<i64> {
        Ok(self
            .tables
            .lesson_progress
            .values()
            .filter(|p| p.enrollment_id == enrollment_id && p.status == LessonStatus::Completed)
            .count() as i64)
    }

    fn insert_lesson_progress(
        &mut self,
        row: NewLessonProgressRow,
    ) -> StoreResult<LessonProgress> {
        let t = &mut *self.tables;
        if t
            .lesson_progress
            .values()
            .any(|p| p.enrollment_id == row.enrollment_id && p.lesson_id == row.lesson_id)
        {
            return Err(StorageError::unique("uq_lesson_progress_enrollment_lesson"));
        }
        t.check(
            row.time_spent_seconds >= 0,
            "ck_lesson_progress_time_non_negative",
        )?;
        t.require(
            t.enrollments.contains_key(&row.enrollment_id),
            "fk_lesson_progress_enrollment",
        )?;
        t.require(t.lessons.contains_key(&row.lesson_id), "fk_lesson_progress_lesson")?;
        let progress = LessonProgress {
            id: t.next_id(),
            enrollment_id: row.enrollment_id,
            lesson_id: row.lesson_id,
            status: row.status,
            time_spent_seconds: row.time_spent_seconds,
            started_at: row.started_at,
            completed_at: row.completed_at,
        };
        t.lesson_progress.insert(progress.id, progress.clone());
        Ok(progress)
    }

    fn save_lesson_progress(&mut self, progress: &LessonProgress) -> StoreResult<()> {
        let t = &mut *self.tables;
        t.check(
            progress.time_spent_seconds >= 0,
            "ck_lesson_progress_time_non_negative",
        )?;
        let row = t
            .lesson_progress
            .get_mut(&progress.id)
            .ok_or_else(|| StorageError::Backend(format!("lesson progress {} vanished", progress.id)))?;
        row.status = progress.status;
        row.time_spent_seconds = progress.time_spent_seconds;
        row.started_at = progress.started_at;
        row.completed_at = progress.completed_at;
        Ok(())
    }

    fn insert_attempt(&mut self, row: NewAttemptRow) -> StoreResult<QuizAttempt> {
        let t = &mut *self.tables;
        t.check(row.score >= 0, "ck_quiz_attempt_score_positive")?;
        t.check(
            row.correct_answers >= 0 && row.correct_answers <= row.total_questions,
            "ck_quiz_attempt_correct_answers_valid",
        )?;
        t.require(t.quizzes.contains_key(&row.quiz_id), "fk_quiz_attempts_quiz")?;
        t.require(t.users.contains_key(&row.user_id), "fk_quiz_attempts_user")?;
        let attempt = QuizAttempt {
            id: t.next_id(),
            quiz_id: row.quiz_id,
            user_id: row.user_id,
            score: row.score,
            total_questions: row.total_questions,
            correct_answers: row.correct_answers,
            rank: row.rank,
            completed_at: row.completed_at,
        };
        t.attempts.insert(attempt.id, attempt.clone());
        Ok(attempt)
    }

    fn attempts_by_user(&mut self, user_id: i32) -> StoreResult<Vec<QuizAttempt>> {
        let mut attempts = collect(&self.tables.attempts, |a| a.user_id == user_id);
        attempts.sort_by(|a, b| b.completed_at.cmp(&a.completed_at).then(b.id.cmp(&a.id)));
        Ok(attempts)
    }

    fn attempts_for_quizzes(&mut self, quiz_ids: &[i32]) -> StoreResult<Vec<QuizAttempt>> {
        Ok(collect(&self.tables.attempts, |a| quiz_ids.contains(&a.quiz_id)))
    }

    fn delete_attempts_by_user(&mut self, user_id: i32) -> StoreResult<usize> {
        Ok(remove_where(&mut self.tables.attempts, |a| a.user_id == user_id))
    }

    fn delete_attempts_for_quizzes(&mut self, quiz_ids: &[i32]) -> StoreResult<usize> {
        Ok(remove_where(&mut self.tables.attempts, |a| {
            quiz_ids.contains(&a.quiz_id)
        }))
    }

    fn insert_participation(
        &mut self,
        row: NewParticipationRow,
    ) -> StoreResult<QuizParticipation> {
        let t = &mut *self.tables;
        t.require(
            t.quizzes.contains_key(&row.quiz_id),
            "fk_quiz_participations_quiz",
        )?;
        t.require(t.users.contains_key(&row.user_id), "fk_quiz_participations_user")?;
        let participation = QuizParticipation {
            id: t.next_id(),
            quiz_id: row.quiz_id,
            user_id: row.user_id,
            joined_at: row.joined_at,
        };
        t.participations
            .insert(participation.id, participation.clone());
        Ok(participation)
    }

    fn participations_for_quiz(&mut self, quiz_id: i32) -> StoreResult<Vec<QuizParticipation>> {
        Ok(collect(&self.tables.participations, |p| p.quiz_id == quiz_id))
    }

    fn delete_participations_by_user(&mut self, user_id: i32) -> StoreResult<usize> {
        Ok(remove_where(&mut self.tables.participations, |p| {
            p.user_id == user_id
        }))
    }

    fn delete_participations_for_quizzes(&mut self, quiz_ids: &[i32]) -> StoreResult<usize> {
        Ok(remove_where(&mut self.tables.participations, |p| {
            quiz_ids.contains(&p.quiz_id)
        }))
    }

    fn insert_message(&mut self, row: NewMessageRow) -> StoreResult<CommunityMessage> {
        let t = &mut *self.tables;
        t.require(
            t.courses.contains_key(&row.course_id),
            "fk_community_messages_course",
        )?;
        t.require(t.users.contains_key(&row.user_id), "fk_community_messages_user")?;
        let message = CommunityMessage {
            id: t.next_id(),
            course_id: row.course_id,
            user_id: row.user_id,
            content: row.content,
            created_at: row.created_at,
        };
        t.messages.insert(message.id, message.clone());
        Ok(message)
    }

    fn insert_feedback(&mut self, row: NewFeedbackRow) -> StoreResult<CourseFeedback> {
        let t = &mut *self.tables;
        if t
            .feedback
            .values()
            .any(|f| f.user_id == row.user_id && f.course_id == row.course_id)
        {
            return Err(StorageError::unique("uq_course_feedback_user_course"));
        }
        t.check((1..=5).contains(&row.rating), "ck_course_feedback_rating")?;
        t.require(
            t.courses.contains_key(&row.course_id),
            "fk_course_feedback_course",
        )?;
        t.require(t.users.contains_key(&row.user_id), "fk_course_feedback_user")?;
        let feedback = CourseFeedback {
            id: t.next_id(),
            course_id: row.course_id,
            user_id: row.user_id,
            content: row.content,
            rating: row.rating,
            created_at: row.created_at,
        };
        t.feedback.insert(feedback.id, feedback.clone());
        Ok(feedback)
    }

    fn messages_for_course(&mut self, course_id: i32) -> StoreResult<Vec<CommunityMessage>> {
        let mut messages = collect(&self.tables.messages, |m| m.course_id == course_id);
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(messages)
    }

    fn feedback_for_course(&mut self, course_id: i32) -> StoreResult<Vec<CourseFeedback>> {
        let mut feedback = collect(&self.tables.feedback, |f| f.course_id == course_id);
        feedback.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(feedback)
    }

    fn delete_messages_by_user(&mut self, user_id: i32) -> StoreResult<usize> {
        Ok(remove_where(&mut self.tables.messages, |m| m.user_id == user_id))
    }

    fn delete_feedback_by_user(&mut self, user_id: i32) -> StoreResult<usize> {
        Ok(remove_where(&mut self.tables.feedback, |f| f.user_id == user_id))
    }
}
