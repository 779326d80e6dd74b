//! Quiz and course authoring.
//!
//! These operations create the entities the rest of the engine governs. All
//! validation happens before the first write.

use chrono::Utc;
use log::info;

use super::codes::{
    is_draft_placeholder, normalize_code, validate_custom_code, CodeAllocator, CodeTarget,
    MAX_CODE_LENGTH,
};
use super::error::{LearnError, LearnResult};
use super::progress::recompute_course_enrollments;
use super::store::{LearnStore, LearnTx, NewChoiceRow, NewCourseRow, NewLessonRow, NewQuestionRow, NewQuizRow};
use super::types::*;
use super::{ensure_manager, ensure_max_len, LearnEngine};

pub const DEFAULT_QUESTION_POINTS: i32 = 1000;
pub const DEFAULT_TIME_LIMIT_SECS: i32 = 30;

/// Column widths of the learn schema.
pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_CATEGORY_LEN: usize = 100;
pub const MAX_CHOICE_LEN: usize = 255;

/// Checks a quiz definition before anything is written.
pub fn validate_quiz(quiz: &NewQuiz) -> LearnResult<()> {
    if quiz.title.trim().is_empty() {
        return Err(LearnError::validation("quiz title cannot be empty"));
    }
    ensure_max_len("quiz title", quiz.title.trim(), MAX_TITLE_LEN)?;
    if quiz.questions.is_empty() {
        return Err(LearnError::validation("a quiz needs at least one question"));
    }

    for (idx, question) in quiz.questions.iter().enumerate() {
        let n = idx + 1;
        if question.text.trim().is_empty() {
            return Err(LearnError::validation(format!("question {n} has no text")));
        }
        if question.points <= 0 {
            return Err(LearnError::validation(format!(
                "question {n}: points must be positive"
            )));
        }
        if question.time_limit <= 0 {
            return Err(LearnError::validation(format!(
                "question {n}: time limit must be positive"
            )));
        }
        if question.choices.is_empty() {
            return Err(LearnError::validation(format!("question {n} has no choices")));
        }
        if question.choices.iter().any(|c| c.text.trim().is_empty()) {
            return Err(LearnError::validation(format!(
                "question {n} has an empty choice"
            )));
        }
        for choice in &question.choices {
            ensure_max_len(&format!("question {n} choice"), choice.text.trim(), MAX_CHOICE_LEN)?;
        }

        let correct = question.choices.iter().filter(|c| c.is_correct).count();
        if question.question_type.allows_multiple_correct() {
            if correct == 0 {
                return Err(LearnError::validation(format!(
                    "question {n} needs at least one correct choice"
                )));
            }
        } else if correct != 1 {
            return Err(LearnError::validation(format!(
                "question {n} needs exactly one correct choice, found {correct}"
            )));
        }
    }

    Ok(())
}

fn validate_lesson(lesson: &NewLesson) -> LearnResult<()> {
    if lesson.title.trim().is_empty() {
        return Err(LearnError::validation("lesson title cannot be empty"));
    }
    ensure_max_len("lesson title", lesson.title.trim(), MAX_TITLE_LEN)?;
    if let Some(code) = lesson.quiz_code.as_deref() {
        ensure_max_len("lesson quiz code", &normalize_code(code), MAX_CODE_LENGTH)?;
    }
    if lesson.duration_minutes < 0 {
        return Err(LearnError::validation("lesson duration cannot be negative"));
    }
    if lesson.order_index.is_some_and(|i| i < 0) {
        return Err(LearnError::validation("lesson order cannot be negative"));
    }
    Ok(())
}

fn validate_course_fields(title: &str, category: Option<&str>) -> LearnResult<()> {
    if title.trim().is_empty() {
        return Err(LearnError::validation("course title cannot be empty"));
    }
    ensure_max_len("course title", title.trim(), MAX_TITLE_LEN)?;
    if let Some(category) = category {
        ensure_max_len("course category", category, MAX_CATEGORY_LEN)?;
    }
    Ok(())
}

/// Normalises a caller-chosen course code. Blank means "none".
fn explicit_course_code(code: Option<&str>) -> LearnResult<Option<String>> {
    match code.map(normalize_code) {
        Some(code) if !code.is_empty() => {
            validate_custom_code(&code)?;
            Ok(Some(code))
        }
        _ => Ok(None),
    }
}

/// Gives a course the code its status calls for: a real join code once it
/// leaves DRAFT, a placeholder while it is a draft without one.
fn assign_join_code(
    tx: &mut dyn LearnTx,
    codes: &CodeAllocator,
    course: &mut Course,
) -> LearnResult<()> {
    let needs_code = course
        .access_code
        .as_deref()
        .map_or(true, is_draft_placeholder);
    if course.status != CourseStatus::Draft && needs_code {
        course.access_code =
            Some(codes.allocate(tx, CodeTarget::Course, CodeTarget::Course.default_length())?);
    } else if course.access_code.is_none() {
        course.access_code = Some(codes.allocate_draft_placeholder(tx)?);
    }
    Ok(())
}

fn ensure_author(tx: &mut dyn LearnTx, actor: &Actor) -> LearnResult<()> {
    if !actor.can_author() {
        return Err(LearnError::forbidden("only teachers can author content"));
    }
    tx.user(actor.user_id)?
        .ok_or_else(|| LearnError::not_found("user", actor.user_id))?;
    Ok(())
}

fn load_quiz_detail(tx: &mut dyn LearnTx, quiz: Quiz) -> LearnResult<QuizDetail> {
    let mut questions = Vec::new();
    for question in tx.questions_for_quiz(quiz.id)? {
        let choices = tx.choices_for_question(question.id)?;
        questions.push(QuestionDetail { question, choices });
    }
    Ok(QuizDetail { quiz, questions })
}

/// Resolves a lesson's quiz link. An explicit id must exist; a code is
/// normalised and fills in the id when it resolves.
fn resolve_quiz_link(
    tx: &mut dyn LearnTx,
    lesson: &NewLesson,
) -> LearnResult<(Option<i32>, Option<String>)> {
    let mut linked_quiz_id = None;
    if let Some(quiz_id) = lesson.linked_quiz_id {
        tx.quiz(quiz_id)?
            .ok_or_else(|| LearnError::not_found("quiz", quiz_id))?;
        linked_quiz_id = Some(quiz_id);
    }

    let quiz_code = lesson
        .quiz_code
        .as_deref()
        .map(normalize_code)
        .filter(|code| !code.is_empty());

    if let Some(code) = quiz_code.as_deref() {
        if linked_quiz_id.is_none() {
            linked_quiz_id = tx.quiz_by_code(code)?.map(|q| q.id);
        }
    }

    Ok((linked_quiz_id, quiz_code))
}

fn insert_lesson(
    tx: &mut dyn LearnTx,
    course_id: i32,
    lesson: &NewLesson,
    default_order: i32,
) -> LearnResult<Lesson> {
    let (linked_quiz_id, quiz_code) = resolve_quiz_link(tx, lesson)?;
    Ok(tx.insert_lesson(NewLessonRow {
        course_id,
        title: lesson.title.trim().to_string(),
        order_index: lesson.order_index.unwrap_or(default_order),
        duration_minutes: lesson.duration_minutes,
        linked_quiz_id,
        quiz_code,
        created_at: Utc::now(),
    })?)
}

fn insert_questions(
    tx: &mut dyn LearnTx,
    quiz_id: i32,
    questions: Vec<NewQuestion>,
) -> LearnResult<()> {
    for (position, question) in questions.into_iter().enumerate() {
        let row = tx.insert_question(NewQuestionRow {
            quiz_id,
            text: question.text.trim().to_string(),
            question_type: question.question_type,
            points: question.points,
            time_limit: question.time_limit,
            position: position as i32,
        })?;
        for choice in question.choices {
            tx.insert_choice(NewChoiceRow {
                question_id: row.id,
                text: choice.text.trim().to_string(),
                is_correct: choice.is_correct,
            })?;
        }
    }
    Ok(())
}

fn unique_code_conflict(target: CodeTarget) -> impl Fn(LearnError) -> LearnError {
    move |e| {
        if e.is_unique_violation(target.constraint()) {
            LearnError::Conflict(format!("{target} access code already in use"))
        } else {
            e
        }
    }
}

impl<S: LearnStore> LearnEngine<S> {
    // ----- Quiz Operations -----

    pub async fn create_quiz(&self, actor: Actor, req: NewQuiz) -> LearnResult<QuizDetail> {
        validate_quiz(&req)?;
        let codes = self.codes.clone();

        let detail = self
            .store
            .transaction(move |tx| {
                ensure_author(tx, &actor)?;
                let access_code = codes.allocate(tx, CodeTarget::Quiz, CodeTarget::Quiz.default_length())?;

                let quiz = tx
                    .insert_quiz(NewQuizRow {
                        title: req.title.trim().to_string(),
                        description: req.description,
                        access_code,
                        is_public: req.is_public,
                        teacher_id: actor.user_id,
                        created_at: Utc::now(),
                    })
                    .map_err(LearnError::from)
                    .map_err(unique_code_conflict(CodeTarget::Quiz))?;

                insert_questions(tx, quiz.id, req.questions)?;
                load_quiz_detail(tx, quiz)
            })
            .await
            .map_err(|e| e.during("quiz creation"))?;

        info!(
            "Created quiz {} ({}) with {} questions",
            detail.quiz.id,
            detail.quiz.access_code,
            detail.questions.len()
        );
        Ok(detail)
    }

    /// Replaces a quiz's metadata and its whole question set. The access code
    /// is kept; attempts already recorded stay attached to the quiz.
    pub async fn update_quiz(
        &self,
        actor: Actor,
        quiz_id: i32,
        req: NewQuiz,
    ) -> LearnResult<QuizDetail> {
        validate_quiz(&req)?;

        let detail = self
            .store
            .transaction(move |tx| {
                let mut quiz = tx
                    .quiz(quiz_id)?
                    .ok_or_else(|| LearnError::not_found("quiz", quiz_id))?;
                ensure_manager(&actor, quiz.teacher_id, "quiz")?;

                quiz.title = req.title.trim().to_string();
                quiz.description = req.description;
                quiz.is_public = req.is_public;
                tx.save_quiz(&quiz)?;

                tx.delete_questions_for_quiz(quiz_id)?;
                insert_questions(tx, quiz_id, req.questions)?;
                load_quiz_detail(tx, quiz)
            })
            .await
            .map_err(|e| e.during("quiz update"))?;

        info!(
            "Updated quiz {} with {} questions",
            detail.quiz.id,
            detail.questions.len()
        );
        Ok(detail)
    }

    /// Owners and super-admins see the answer key; everyone else gets the
    /// questions without `is_correct`.
    pub async fn quiz_detail(&self, actor: Actor, quiz_id: i32) -> LearnResult<QuizView> {
        self.store
            .transaction(move |tx| {
                let quiz = tx
                    .quiz(quiz_id)?
                    .ok_or_else(|| LearnError::not_found("quiz", quiz_id))?;
                let managed = actor.can_manage(quiz.teacher_id);
                let detail = load_quiz_detail(tx, quiz)?;
                Ok(if managed {
                    QuizView::Full(detail)
                } else {
                    QuizView::Preview(detail.into())
                })
            })
            .await
    }

    /// Looks a quiz up by access code. The code is trimmed and upper-cased first.
    pub async fn find_quiz_by_code(&self, code: &str) -> LearnResult<Quiz> {
        let code = normalize_code(code);
        self.store
            .transaction(move |tx| {
                tx.quiz_by_code(&code)?
                    .ok_or_else(|| LearnError::not_found("quiz", code))
            })
            .await
    }

    pub async fn quizzes_for_teacher(&self, teacher_id: i32) -> LearnResult<Vec<Quiz>> {
        self.store
            .transaction(move |tx| Ok(tx.quizzes_by_teacher(teacher_id)?))
            .await
    }

    // ----- Course Operations -----

    pub async fn create_course(&self, actor: Actor, req: NewCourse) -> LearnResult<CourseDetail> {
        validate_course_fields(&req.title, req.category.as_deref())?;
        for lesson in &req.lessons {
            validate_lesson(lesson)?;
        }
        let explicit_code = explicit_course_code(req.access_code.as_deref())?;
        let codes = self.codes.clone();

        let detail = self
            .store
            .transaction(move |tx| {
                ensure_author(tx, &actor)?;

                let access_code = match explicit_code {
                    Some(code) => {
                        if tx.access_code_taken(CodeTarget::Course, &code)? {
                            return Err(LearnError::Conflict(format!(
                                "course access code {code} already in use"
                            )));
                        }
                        code
                    }
                    None if req.status == CourseStatus::Draft => {
                        codes.allocate_draft_placeholder(tx)?
                    }
                    None => codes.allocate(tx, CodeTarget::Course, CodeTarget::Course.default_length())?,
                };

                let course = tx
                    .insert_course(NewCourseRow {
                        title: req.title.trim().to_string(),
                        description: req.description,
                        category: req.category,
                        status: req.status,
                        access_code: Some(access_code),
                        teacher_id: actor.user_id,
                        created_at: Utc::now(),
                    })
                    .map_err(LearnError::from)
                    .map_err(unique_code_conflict(CodeTarget::Course))?;

                let mut lessons = Vec::with_capacity(req.lessons.len());
                for (idx, lesson) in req.lessons.iter().enumerate() {
                    lessons.push(insert_lesson(tx, course.id, lesson, idx as i32)?);
                }
                lessons.sort_by_key(|l| (l.order_index, l.id));

                Ok(CourseDetail { course, lessons })
            })
            .await
            .map_err(|e| e.during("course creation"))?;

        info!(
            "Created {} course {} with {} lessons",
            detail.course.status,
            detail.course.id,
            detail.lessons.len()
        );
        Ok(detail)
    }

    pub async fn add_lesson(
        &self,
        actor: Actor,
        course_id: i32,
        req: NewLesson,
    ) -> LearnResult<Lesson> {
        validate_lesson(&req)?;

        self.store
            .transaction(move |tx| {
                let course = tx
                    .course(course_id)?
                    .ok_or_else(|| LearnError::not_found("course", course_id))?;
                ensure_manager(&actor, course.teacher_id, "course")?;
                let next_order = tx.count_lessons(course_id)? as i32;
                let lesson = insert_lesson(tx, course_id, &req, next_order)?;
                recompute_course_enrollments(tx, course_id)?;
                Ok(lesson)
            })
            .await
            .map_err(|e| e.during("lesson creation"))
    }

    /// Removes one lesson. Its progress rows go with it and every enrollment
    /// of the course is recomputed against the smaller lesson set.
    pub async fn delete_lesson(
        &self,
        actor: Actor,
        course_id: i32,
        lesson_id: i32,
    ) -> LearnResult<Lesson> {
        let lesson = self
            .store
            .transaction(move |tx| {
                let course = tx
                    .course(course_id)?
                    .ok_or_else(|| LearnError::not_found("course", course_id))?;
                ensure_manager(&actor, course.teacher_id, "course")?;
                let lesson = tx
                    .lesson(lesson_id)?
                    .filter(|l| l.course_id == course_id)
                    .ok_or_else(|| LearnError::not_found("lesson", lesson_id))?;

                tx.delete_lessons(&[lesson.id])?;
                recompute_course_enrollments(tx, course_id)?;
                Ok(lesson)
            })
            .await
            .map_err(|e| e.during("lesson deletion"))?;

        info!("Deleted lesson {} from course {}", lesson.id, course_id);
        Ok(lesson)
    }

    /// Changes a course's visibility. Leaving DRAFT swaps a placeholder for a
    /// real join code.
    pub async fn set_course_status(
        &self,
        actor: Actor,
        course_id: i32,
        status: CourseStatus,
    ) -> LearnResult<Course> {
        let codes = self.codes.clone();

        self.store
            .transaction(move |tx| {
                let mut course = tx
                    .course(course_id)?
                    .ok_or_else(|| LearnError::not_found("course", course_id))?;
                ensure_manager(&actor, course.teacher_id, "course")?;

                course.status = status;
                assign_join_code(tx, &codes, &mut course)?;
                tx.save_course(&course)?;
                Ok(course)
            })
            .await
            .map_err(|e| e.during("course status update"))
    }

    /// Applies a partial update. A new lesson list replaces the old one, and
    /// the progress of every enrollment is recomputed against it.
    pub async fn update_course(
        &self,
        actor: Actor,
        course_id: i32,
        req: CourseUpdate,
    ) -> LearnResult<CourseDetail> {
        if let Some(title) = req.title.as_deref() {
            validate_course_fields(title, req.category.as_deref())?;
        } else if let Some(category) = req.category.as_deref() {
            ensure_max_len("course category", category, MAX_CATEGORY_LEN)?;
        }
        for lesson in req.lessons.iter().flatten() {
            validate_lesson(lesson)?;
        }
        let explicit_code = explicit_course_code(req.access_code.as_deref())?;
        let clear_code = req.access_code.is_some() && explicit_code.is_none();
        let codes = self.codes.clone();

        let detail = self
            .store
            .transaction(move |tx| {
                let mut course = tx
                    .course(course_id)?
                    .ok_or_else(|| LearnError::not_found("course", course_id))?;
                ensure_manager(&actor, course.teacher_id, "course")?;

                if let Some(title) = req.title {
                    course.title = title.trim().to_string();
                }
                if req.description.is_some() {
                    course.description = req.description;
                }
                if req.category.is_some() {
                    course.category = req.category;
                }
                if let Some(status) = req.status {
                    course.status = status;
                }
                if let Some(code) = explicit_code {
                    if course.access_code.as_deref() != Some(code.as_str())
                        && tx.access_code_taken(CodeTarget::Course, &code)?
                    {
                        return Err(LearnError::Conflict(format!(
                            "course access code {code} already in use"
                        )));
                    }
                    course.access_code = Some(code);
                } else if clear_code {
                    course.access_code = None;
                }
                assign_join_code(tx, &codes, &mut course)?;
                tx.save_course(&course)
                    .map_err(LearnError::from)
                    .map_err(unique_code_conflict(CodeTarget::Course))?;

                if let Some(replacement) = req.lessons {
                    let old: Vec<i32> =
                        tx.lessons_for_course(course_id)?.iter().map(|l| l.id).collect();
                    tx.delete_lessons(&old)?;
                    for (idx, lesson) in replacement.iter().enumerate() {
                        insert_lesson(tx, course_id, lesson, idx as i32)?;
                    }
                }
                recompute_course_enrollments(tx, course_id)?;

                let lessons = tx.lessons_for_course(course_id)?;
                Ok(CourseDetail { course, lessons })
            })
            .await
            .map_err(|e| e.during("course update"))?;

        info!(
            "Updated {} course {} ({} lessons)",
            detail.course.status,
            detail.course.id,
            detail.lessons.len()
        );
        Ok(detail)
    }

    /// Resolves a join code to a course students may see. Drafts and
    /// placeholder codes never resolve.
    pub async fn find_course_by_code(&self, code: &str) -> LearnResult<Course> {
        let code = normalize_code(code);
        self.store
            .transaction(move |tx| {
                if is_draft_placeholder(&code) {
                    return Err(LearnError::not_found("course", code));
                }
                match tx.course_by_code(&code)? {
                    Some(course) if course.status != CourseStatus::Draft => Ok(course),
                    _ => Err(LearnError::not_found("course", code)),
                }
            })
            .await
    }

    /// Drafts are visible to their owner and super-admins only.
    pub async fn course_detail(&self, actor: Actor, course_id: i32) -> LearnResult<CourseDetail> {
        self.store
            .transaction(move |tx| {
                let course = tx
                    .course(course_id)?
                    .ok_or_else(|| LearnError::not_found("course", course_id))?;
                if course.status == CourseStatus::Draft {
                    ensure_manager(&actor, course.teacher_id, "draft course")?;
                }
                let lessons = tx.lessons_for_course(course_id)?;
                Ok(CourseDetail { course, lessons })
            })
            .await
    }

    pub async fn courses_for_teacher(&self, teacher_id: i32) -> LearnResult<Vec<Course>> {
        self.store
            .transaction(move |tx| Ok(tx.courses_by_teacher(teacher_id)?))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(question_type: QuestionType, correct: &[bool]) -> NewQuestion {
        NewQuestion {
            text: "Pick one".into(),
            question_type,
            points: DEFAULT_QUESTION_POINTS,
            time_limit: DEFAULT_TIME_LIMIT_SECS,
            choices: correct
                .iter()
                .enumerate()
                .map(|(i, &is_correct)| NewChoice {
                    text: format!("choice {i}"),
                    is_correct,
                })
                .collect(),
        }
    }

    fn quiz(questions: Vec<NewQuestion>) -> NewQuiz {
        NewQuiz {
            title: "Basics".into(),
            description: None,
            is_public: false,
            questions,
        }
    }

    #[test]
    fn test_valid_quiz_passes() {
        let q = quiz(vec![
            question(QuestionType::SingleChoice, &[true, false, false, false]),
            question(QuestionType::TrueFalse, &[false, true]),
            question(QuestionType::MultiSelect, &[true, true, false]),
        ]);
        assert!(validate_quiz(&q).is_ok());
    }

    #[test]
    fn test_single_choice_needs_exactly_one_correct() {
        let none = quiz(vec![question(QuestionType::SingleChoice, &[false, false])]);
        let two = quiz(vec![question(QuestionType::TrueFalse, &[true, true])]);
        assert!(validate_quiz(&none).is_err());
        assert!(validate_quiz(&two).is_err());
    }

    #[test]
    fn test_multi_select_needs_a_correct_choice() {
        let q = quiz(vec![question(QuestionType::MultiSelect, &[false, false])]);
        assert!(validate_quiz(&q).is_err());
    }

    #[test]
    fn test_rejects_non_positive_points_and_time() {
        let mut q = question(QuestionType::SingleChoice, &[true]);
        q.points = 0;
        assert!(validate_quiz(&quiz(vec![q])).is_err());

        let mut q = question(QuestionType::SingleChoice, &[true]);
        q.time_limit = -5;
        assert!(validate_quiz(&quiz(vec![q])).is_err());
    }

    #[test]
    fn test_rejects_empty_choice_set_and_text() {
        assert!(validate_quiz(&quiz(vec![question(QuestionType::SingleChoice, &[])])).is_err());
        let mut q = question(QuestionType::SingleChoice, &[true, false]);
        q.choices[1].text = "  ".into();
        assert!(validate_quiz(&quiz(vec![q])).is_err());
        assert!(validate_quiz(&quiz(vec![])).is_err());
    }

    #[test]
    fn test_lesson_validation() {
        let mut lesson = NewLesson {
            title: "Intro".into(),
            ..Default::default()
        };
        assert!(validate_lesson(&lesson).is_ok());
        lesson.duration_minutes = -1;
        assert!(validate_lesson(&lesson).is_err());
    }

    #[test]
    fn test_lesson_quiz_code_fits_the_column() {
        let mut lesson = NewLesson {
            title: "Intro".into(),
            quiz_code: Some(" abc123 ".into()),
            ..Default::default()
        };
        assert!(validate_lesson(&lesson).is_ok());
        lesson.quiz_code = Some("ABCDEFGHIJK".into());
        assert!(validate_lesson(&lesson).is_err());
        lesson.quiz_code = None;
        lesson.title = "x".repeat(MAX_TITLE_LEN + 1);
        assert!(validate_lesson(&lesson).is_err());
    }

    #[test]
    fn test_title_and_choice_lengths() {
        let mut q = quiz(vec![question(QuestionType::SingleChoice, &[true, false])]);
        q.title = "t".repeat(MAX_TITLE_LEN);
        assert!(validate_quiz(&q).is_ok());
        q.title = "t".repeat(MAX_TITLE_LEN + 1);
        assert!(validate_quiz(&q).is_err());

        let mut long_choice = question(QuestionType::SingleChoice, &[true, false]);
        long_choice.choices[1].text = "c".repeat(MAX_CHOICE_LEN + 1);
        assert!(validate_quiz(&quiz(vec![long_choice])).is_err());

        let category = "c".repeat(MAX_CATEGORY_LEN + 1);
        assert!(validate_course_fields("Rust", Some(category.as_str())).is_err());
        assert!(validate_course_fields("Rust", Some("Programming")).is_ok());
    }
}
