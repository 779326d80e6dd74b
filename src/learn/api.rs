//! HTTP surface for the learn engine.
//!
//! The caller identity arrives in `X-User-Id` / `X-User-Role`, set by the
//! upstream identity provider. The engine performs its own ownership and role
//! checks on top of it.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};

use super::error::{LearnError, LearnResult};
use super::questions::Difficulty;
use super::store::LearnStore;
use super::types::*;
use crate::core::shared::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = LearnError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let user_id = header(USER_ID_HEADER)
            .and_then(|v| v.parse::<i32>().ok())
            .ok_or_else(|| LearnError::forbidden("missing or invalid caller identity"))?;
        let role = match header(USER_ROLE_HEADER).map(str::to_uppercase).as_deref() {
            Some("STUDENT") => UserRole::Student,
            Some("TEACHER") => UserRole::Teacher,
            Some("SUPER_ADMIN") | Some("ADMIN") => UserRole::SuperAdmin,
            _ => return Err(LearnError::forbidden("missing or invalid caller role")),
        };

        Ok(Actor::new(user_id, role))
    }
}

fn ok<T: Serialize>(data: T) -> Response {
    Json(serde_json::json!({
        "success": true,
        "data": data
    }))
    .into_response()
}

fn created<T: Serialize>(data: T) -> Response {
    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "data": data
        })),
    )
        .into_response()
}

type LearnState<S> = State<Arc<AppState<S>>>;

// ============================================================================
// REQUEST BODIES
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: CourseStatus,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub content: String,
    pub rating: i32,
}

#[derive(Debug, Deserialize)]
pub struct GenerateQuizRequest {
    pub title: String,
    pub content: String,
    pub count: u32,
    pub difficulty: String,
}

// ============================================================================
// HTTP HANDLERS
// ============================================================================

/// Register a user record (super-admin only)
pub async fn create_user<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Json(req): Json<NewUser>,
) -> LearnResult<Response> {
    if !actor.is_super_admin() {
        return Err(LearnError::forbidden("only a super-admin can register users"));
    }
    Ok(created(state.engine.create_user(req).await?))
}

/// Delete a user and everything that depends on them
pub async fn delete_user<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Path(user_id): Path<i32>,
) -> LearnResult<Response> {
    Ok(ok(state.engine.delete_user(actor, user_id).await?))
}

pub async fn create_quiz<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Json(req): Json<NewQuiz>,
) -> LearnResult<Response> {
    Ok(created(state.engine.create_quiz(actor, req).await?))
}

/// Generate a quiz from text content through the question source
pub async fn generate_quiz<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Json(req): Json<GenerateQuizRequest>,
) -> LearnResult<Response> {
    let difficulty = Difficulty::parse(&req.difficulty)?;
    let source = state
        .question_source
        .as_deref()
        .ok_or_else(|| LearnError::Upstream("question source not configured".into()))?;
    let quiz = state
        .engine
        .create_quiz_from_source(actor, source, req.title, &req.content, req.count, difficulty)
        .await?;
    Ok(created(quiz))
}

/// Quiz with questions; the answer key only for its owner
pub async fn get_quiz<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Path(quiz_id): Path<i32>,
) -> LearnResult<Response> {
    Ok(ok(state.engine.quiz_detail(actor, quiz_id).await?))
}

pub async fn update_quiz<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Path(quiz_id): Path<i32>,
    Json(req): Json<NewQuiz>,
) -> LearnResult<Response> {
    Ok(ok(state.engine.update_quiz(actor, quiz_id, req).await?))
}

pub async fn find_quiz<S: LearnStore>(
    State(state): LearnState<S>,
    _actor: Actor,
    Path(code): Path<String>,
) -> LearnResult<Response> {
    Ok(ok(state.engine.find_quiz_by_code(&code).await?))
}

pub async fn delete_quiz<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Path(quiz_id): Path<i32>,
) -> LearnResult<Response> {
    Ok(ok(state.engine.delete_quiz(actor, quiz_id).await?))
}

/// Enter a quiz session by access code
pub async fn join_quiz<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Json(req): Json<CodeRequest>,
) -> LearnResult<Response> {
    Ok(created(state.engine.join_quiz(actor, &req.code).await?))
}

pub async fn get_participations<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Path(quiz_id): Path<i32>,
) -> LearnResult<Response> {
    Ok(ok(state.engine.participations_for_quiz(actor, quiz_id).await?))
}

/// Record a finished quiz attempt
pub async fn submit_attempt<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Path(quiz_id): Path<i32>,
    Json(req): Json<AttemptSubmission>,
) -> LearnResult<Response> {
    Ok(created(state.engine.record_attempt(actor, quiz_id, req).await?))
}

pub async fn create_course<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Json(req): Json<NewCourse>,
) -> LearnResult<Response> {
    Ok(created(state.engine.create_course(actor, req).await?))
}

/// Course details with lessons in order
pub async fn get_course<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Path(course_id): Path<i32>,
) -> LearnResult<Response> {
    Ok(ok(state.engine.course_detail(actor, course_id).await?))
}

pub async fn update_course<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Path(course_id): Path<i32>,
    Json(req): Json<CourseUpdate>,
) -> LearnResult<Response> {
    Ok(ok(state.engine.update_course(actor, course_id, req).await?))
}

pub async fn find_course<S: LearnStore>(
    State(state): LearnState<S>,
    _actor: Actor,
    Path(code): Path<String>,
) -> LearnResult<Response> {
    Ok(ok(state.engine.find_course_by_code(&code).await?))
}

pub async fn delete_course<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Path(course_id): Path<i32>,
) -> LearnResult<Response> {
    Ok(ok(state.engine.delete_course(actor, course_id).await?))
}

pub async fn set_course_status<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Path(course_id): Path<i32>,
    Json(req): Json<StatusRequest>,
) -> LearnResult<Response> {
    Ok(ok(state
        .engine
        .set_course_status(actor, course_id, req.status)
        .await?))
}

pub async fn create_lesson<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Path(course_id): Path<i32>,
    Json(req): Json<NewLesson>,
) -> LearnResult<Response> {
    Ok(created(state.engine.add_lesson(actor, course_id, req).await?))
}

pub async fn delete_lesson<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Path((course_id, lesson_id)): Path<(i32, i32)>,
) -> LearnResult<Response> {
    Ok(ok(state
        .engine
        .delete_lesson(actor, course_id, lesson_id)
        .await?))
}

/// Enrolled students with their progress
pub async fn course_students<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Path(course_id): Path<i32>,
) -> LearnResult<Response> {
    Ok(ok(state.engine.course_students(actor, course_id).await?))
}

pub async fn course_stats<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Path(course_id): Path<i32>,
) -> LearnResult<Response> {
    Ok(ok(state.engine.course_stats(actor, course_id).await?))
}

pub async fn enroll<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Path(course_id): Path<i32>,
) -> LearnResult<Response> {
    Ok(ok(state.engine.enroll(actor, course_id).await?))
}

pub async fn enroll_by_code<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Json(req): Json<CodeRequest>,
) -> LearnResult<Response> {
    Ok(ok(state.engine.enroll_by_code(actor, &req.code).await?))
}

pub async fn drop_course<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Path(course_id): Path<i32>,
) -> LearnResult<Response> {
    Ok(ok(state.engine.drop_enrollment(actor, course_id).await?))
}

pub async fn post_message<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Path(course_id): Path<i32>,
    Json(req): Json<MessageRequest>,
) -> LearnResult<Response> {
    Ok(created(
        state
            .engine
            .post_message(actor, course_id, &req.content)
            .await?,
    ))
}

pub async fn get_messages<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Path(course_id): Path<i32>,
) -> LearnResult<Response> {
    Ok(ok(state.engine.course_messages(actor, course_id).await?))
}

pub async fn get_feedback<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Path(course_id): Path<i32>,
) -> LearnResult<Response> {
    Ok(ok(state.engine.course_feedback(actor, course_id).await?))
}

pub async fn post_feedback<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Path(course_id): Path<i32>,
    Json(req): Json<FeedbackRequest>,
) -> LearnResult<Response> {
    Ok(created(
        state
            .engine
            .post_feedback(actor, course_id, &req.content, req.rating)
            .await?,
    ))
}

/// The caller's enrollments
pub async fn my_enrollments<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
) -> LearnResult<Response> {
    Ok(ok(state.engine.enrollments_for_user(actor.user_id).await?))
}

pub async fn get_enrollment<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Path(enrollment_id): Path<i32>,
) -> LearnResult<Response> {
    Ok(ok(state.engine.enrollment_detail(actor, enrollment_id).await?))
}

/// Record progress on one lesson of an enrollment
pub async fn update_lesson_progress<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Path((enrollment_id, lesson_id)): Path<(i32, i32)>,
    Json(req): Json<LessonProgressUpdate>,
) -> LearnResult<Response> {
    Ok(ok(state
        .engine
        .record_lesson_progress(
            actor,
            enrollment_id,
            lesson_id,
            req.status,
            req.time_spent_seconds,
        )
        .await?))
}

pub async fn student_stats<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
) -> LearnResult<Response> {
    Ok(ok(state.engine.student_stats(actor.user_id).await?))
}

pub async fn performance_history<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
) -> LearnResult<Response> {
    Ok(ok(state.engine.performance_history(actor.user_id).await?))
}

pub async fn teacher_stats<S: LearnStore>(
    State(state): LearnState<S>,
    actor: Actor,
    Path(teacher_id): Path<i32>,
) -> LearnResult<Response> {
    Ok(ok(state.engine.teacher_stats(actor, teacher_id).await?))
}

// ============================================================================
// ROUTE CONFIGURATION
// ============================================================================

/// Configure all Learn module routes
pub fn configure_learn_routes<S: LearnStore>() -> Router<Arc<AppState<S>>> {
    Router::new()
        // Users
        .route("/api/learn/users", post(create_user::<S>))
        .route("/api/learn/users/:id", delete(delete_user::<S>))
        // Quizzes
        .route("/api/learn/quizzes", post(create_quiz::<S>))
        .route("/api/learn/quiz-generation", post(generate_quiz::<S>))
        .route(
            "/api/learn/quizzes/:id",
            get(get_quiz::<S>)
                .put(update_quiz::<S>)
                .delete(delete_quiz::<S>),
        )
        .route("/api/learn/quiz-codes/:code", get(find_quiz::<S>))
        .route("/api/learn/quiz-sessions", post(join_quiz::<S>))
        .route(
            "/api/learn/quizzes/:id/participations",
            get(get_participations::<S>),
        )
        .route("/api/learn/quizzes/:id/attempts", post(submit_attempt::<S>))
        // Courses
        .route("/api/learn/courses", post(create_course::<S>))
        .route(
            "/api/learn/courses/:id",
            get(get_course::<S>)
                .put(update_course::<S>)
                .delete(delete_course::<S>),
        )
        .route("/api/learn/course-codes/:code", get(find_course::<S>))
        .route("/api/learn/courses/:id/status", put(set_course_status::<S>))
        .route("/api/learn/courses/:id/lessons", post(create_lesson::<S>))
        .route(
            "/api/learn/courses/:id/lessons/:lesson_id",
            delete(delete_lesson::<S>),
        )
        .route("/api/learn/courses/:id/students", get(course_students::<S>))
        .route("/api/learn/courses/:id/stats", get(course_stats::<S>))
        .route("/api/learn/courses/:id/enroll", post(enroll::<S>))
        .route("/api/learn/courses/:id/drop", post(drop_course::<S>))
        .route(
            "/api/learn/courses/:id/messages",
            get(get_messages::<S>).post(post_message::<S>),
        )
        .route(
            "/api/learn/courses/:id/feedback",
            get(get_feedback::<S>).post(post_feedback::<S>),
        )
        // Enrollments
        .route("/api/learn/enroll", post(enroll_by_code::<S>))
        .route("/api/learn/enrollments", get(my_enrollments::<S>))
        .route("/api/learn/enrollments/:id", get(get_enrollment::<S>))
        .route(
            "/api/learn/enrollments/:id/lessons/:lesson_id/progress",
            post(update_lesson_progress::<S>),
        )
        // Statistics
        .route("/api/learn/stats/student", get(student_stats::<S>))
        .route("/api/learn/stats/history", get(performance_history::<S>))
        .route("/api/learn/stats/teacher/:id", get(teacher_stats::<S>))
}
