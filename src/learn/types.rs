//! Types for the Learn module
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

// ============================================================================
// ENUMS
// ============================================================================

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $label:literal),+ $(,)? } default $default:ident) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                match s {
                    $($label => Self::$variant,)+
                    _ => Self::$default,
                }
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::from(s.as_str())
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.as_str().to_string()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Student,
    Teacher,
    SuperAdmin,
}

text_enum!(UserRole {
    Student => "STUDENT",
    Teacher => "TEACHER",
    SuperAdmin => "SUPER_ADMIN",
} default Student);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    TrueFalse,
    MultiSelect,
}

text_enum!(QuestionType {
    SingleChoice => "single_choice",
    TrueFalse => "true_false",
    MultiSelect => "multi_select",
} default SingleChoice);

impl QuestionType {
    /// Whether more than one choice may be marked correct.
    pub fn allows_multiple_correct(&self) -> bool {
        matches!(self, Self::MultiSelect)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseStatus {
    Draft,
    Published,
    Private,
}

text_enum!(CourseStatus {
    Draft => "draft",
    Published => "published",
    Private => "private",
} default Draft);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Dropped,
}

text_enum!(EnrollmentStatus {
    Active => "active",
    Completed => "completed",
    Dropped => "dropped",
} default Active);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonStatus {
    NotStarted,
    InProgress,
    Completed,
}

text_enum!(LessonStatus {
    NotStarted => "not_started",
    InProgress => "in_progress",
    Completed => "completed",
} default NotStarted);

/// Rank label awarded at the end of a quiz run. Variant order is the ranking
/// order, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rank {
    None,
    Novice,
    Intermediate,
    Expert,
    #[serde(rename = "Legendary!")]
    Legendary,
}

text_enum!(Rank {
    None => "None",
    Novice => "Novice",
    Intermediate => "Intermediate",
    Expert => "Expert",
    Legendary => "Legendary!",
} default None);

impl Rank {
    /// Strict parse, used where an unknown label must be rejected.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim() {
            "None" | "" => Some(Self::None),
            "Novice" => Some(Self::Novice),
            "Intermediate" => Some(Self::Intermediate),
            "Expert" => Some(Self::Expert),
            "Legendary!" => Some(Self::Legendary),
            _ => None,
        }
    }
}

// ============================================================================
// IDENTITY
// ============================================================================

/// The authenticated caller, as supplied by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: i32,
    pub role: UserRole,
}

impl Actor {
    pub fn new(user_id: i32, role: UserRole) -> Self {
        Self { user_id, role }
    }

    pub fn is_super_admin(&self) -> bool {
        self.role == UserRole::SuperAdmin
    }

    pub fn can_author(&self) -> bool {
        matches!(self.role, UserRole::Teacher | UserRole::SuperAdmin)
    }

    /// Owner of the resource, or a super-admin acting on anyone's behalf.
    pub fn can_manage(&self, owner_id: i32) -> bool {
        self.user_id == owner_id || self.is_super_admin()
    }
}

// ============================================================================
// DATA MODELS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable)]
#[diesel(table_name = crate::core::shared::schema::learn::users)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub full_name: Option<String>,
    #[diesel(deserialize_as = String)]
    pub role: UserRole,
    pub is_active: bool,
    pub streak_count: i32,
    pub last_streak_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable)]
#[diesel(table_name = crate::core::shared::schema::learn::quizzes)]
pub struct Quiz {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub access_code: String,
    pub is_public: bool,
    pub teacher_id: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable)]
#[diesel(table_name = crate::core::shared::schema::learn::questions)]
pub struct Question {
    pub id: i32,
    pub quiz_id: i32,
    pub text: String,
    #[diesel(deserialize_as = String)]
    pub question_type: QuestionType,
    pub points: i32,
    pub time_limit: i32,
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable)]
#[diesel(table_name = crate::core::shared::schema::learn::choices)]
pub struct Choice {
    pub id: i32,
    pub question_id: i32,
    pub text: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable)]
#[diesel(table_name = crate::core::shared::schema::learn::courses)]
pub struct Course {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    #[diesel(deserialize_as = String)]
    pub status: CourseStatus,
    pub access_code: Option<String>,
    pub teacher_id: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable)]
#[diesel(table_name = crate::core::shared::schema::learn::lessons)]
pub struct Lesson {
    pub id: i32,
    pub course_id: i32,
    pub title: String,
    pub order_index: i32,
    pub duration_minutes: i32,
    pub linked_quiz_id: Option<i32>,
    pub quiz_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable)]
#[diesel(table_name = crate::core::shared::schema::learn::enrollments)]
pub struct Enrollment {
    pub id: i32,
    pub user_id: i32,
    pub course_id: i32,
    #[diesel(deserialize_as = String)]
    pub status: EnrollmentStatus,
    pub progress_percent: f64,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable)]
#[diesel(table_name = crate::core::shared::schema::learn::lesson_progress)]
pub struct LessonProgress {
    pub id: i32,
    pub enrollment_id: i32,
    pub lesson_id: i32,
    #[diesel(deserialize_as = String)]
    pub status: LessonStatus,
    pub time_spent_seconds: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable)]
#[diesel(table_name = crate::core::shared::schema::learn::quiz_attempts)]
pub struct QuizAttempt {
    pub id: i32,
    pub quiz_id: i32,
    pub user_id: i32,
    pub score: i32,
    pub total_questions: i32,
    pub correct_answers: i32,
    #[diesel(deserialize_as = String)]
    pub rank: Rank,
    pub completed_at: DateTime<Utc>,
}

impl QuizAttempt {
    /// Percentage of questions answered correctly; 0 when the attempt had no questions.
    pub fn accuracy_percent(&self) -> f64 {
        if self.total_questions > 0 {
            f64::from(self.correct_answers) * 100.0 / f64::from(self.total_questions)
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable)]
#[diesel(table_name = crate::core::shared::schema::learn::quiz_participations)]
pub struct QuizParticipation {
    pub id: i32,
    pub quiz_id: i32,
    pub user_id: i32,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable)]
#[diesel(table_name = crate::core::shared::schema::learn::community_messages)]
pub struct CommunityMessage {
    pub id: i32,
    pub course_id: i32,
    pub user_id: i32,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable)]
#[diesel(table_name = crate::core::shared::schema::learn::course_feedback)]
pub struct CourseFeedback {
    pub id: i32,
    pub course_id: i32,
    pub user_id: i32,
    pub content: String,
    pub rating: i32,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// REQUESTS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub full_name: Option<String>,
    pub role: UserRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewChoice {
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQuestion {
    pub text: String,
    pub question_type: QuestionType,
    pub points: i32,
    pub time_limit: i32,
    pub choices: Vec<NewChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQuiz {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    pub questions: Vec<NewQuestion>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewLesson {
    pub title: String,
    pub order_index: Option<i32>,
    #[serde(default)]
    pub duration_minutes: i32,
    pub linked_quiz_id: Option<i32>,
    pub quiz_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCourse {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub status: CourseStatus,
    pub access_code: Option<String>,
    #[serde(default)]
    pub lessons: Vec<NewLesson>,
}

/// Partial course update. Absent fields are left as they are; `lessons`, when
/// present, replaces the whole lesson list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub status: Option<CourseStatus>,
    pub access_code: Option<String>,
    pub lessons: Option<Vec<NewLesson>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptSubmission {
    pub score: i32,
    pub total_questions: i32,
    pub correct_answers: i32,
    pub rank: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonProgressUpdate {
    pub status: LessonStatus,
    #[serde(default)]
    pub time_spent_seconds: u32,
}

// ============================================================================
// RESPONSES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionDetail {
    #[serde(flatten)]
    pub question: Question,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizDetail {
    #[serde(flatten)]
    pub quiz: Quiz,
    pub questions: Vec<QuestionDetail>,
}

/// A choice as shown to players: the answer key stays with the quiz owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoicePreview {
    pub id: i32,
    pub question_id: i32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionPreview {
    #[serde(flatten)]
    pub question: Question,
    pub choices: Vec<ChoicePreview>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizPreview {
    #[serde(flatten)]
    pub quiz: Quiz,
    pub questions: Vec<QuestionPreview>,
}

impl From<QuizDetail> for QuizPreview {
    fn from(detail: QuizDetail) -> Self {
        let questions = detail
            .questions
            .into_iter()
            .map(|q| QuestionPreview {
                question: q.question,
                choices: q
                    .choices
                    .into_iter()
                    .map(|c| ChoicePreview {
                        id: c.id,
                        question_id: c.question_id,
                        text: c.text,
                    })
                    .collect(),
            })
            .collect();
        Self {
            quiz: detail.quiz,
            questions,
        }
    }
}

/// Quiz owners and super-admins see the answer key, everyone else a preview.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum QuizView {
    Full(QuizDetail),
    Preview(QuizPreview),
}

impl QuizView {
    pub fn quiz(&self) -> &Quiz {
        match self {
            Self::Full(detail) => &detail.quiz,
            Self::Preview(preview) => &preview.quiz,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseDetail {
    #[serde(flatten)]
    pub course: Course,
    pub lessons: Vec<Lesson>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentDetail {
    #[serde(flatten)]
    pub enrollment: Enrollment,
    pub lesson_progress: Vec<LessonProgress>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentSummary {
    #[serde(flatten)]
    pub enrollment: Enrollment,
    pub completed_lessons: i64,
}

/// One row of a course roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseStudent {
    #[serde(flatten)]
    pub enrollment: Enrollment,
    pub email: String,
    pub full_name: Option<String>,
    pub completed_lessons: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: CommunityMessage,
    pub user_name: Option<String>,
    pub user_role: UserRole,
}

/// Feedback as the course owner sees it, without the author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub id: i32,
    pub course_id: i32,
    pub content: String,
    pub rating: i32,
    pub created_at: DateTime<Utc>,
}

impl From<CourseFeedback> for FeedbackEntry {
    fn from(f: CourseFeedback) -> Self {
        Self {
            id: f.id,
            course_id: f.course_id,
            content: f.content,
            rating: f.rating,
            created_at: f.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressOutcome {
    pub progress: LessonProgress,
    pub enrollment: Enrollment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptSummary {
    #[serde(flatten)]
    pub attempt: QuizAttempt,
    pub quiz_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentStats {
    pub quizzes_taken: i64,
    pub avg_score: f64,
    pub best_rank: Rank,
    pub performance_history: Vec<AttemptSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizStats {
    pub id: i32,
    pub title: String,
    pub access_code: String,
    pub attempt_count: i64,
    pub avg_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeacherStats {
    pub total_quizzes: i64,
    pub total_students: i64,
    pub avg_score: f64,
    pub avg_completion_rate: f64,
    pub quizzes: Vec<QuizStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseStats {
    pub total_enrollments: i64,
    pub active_students: i64,
    pub completed_students: i64,
    pub average_progress: f64,
    pub total_lessons: i64,
}

/// Row counts removed or unlinked by a deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionReport {
    pub participations: usize,
    pub attempts: usize,
    pub enrollments: usize,
    pub messages: usize,
    pub feedback: usize,
    pub lessons_unlinked: usize,
    pub quizzes: usize,
    pub courses: usize,
    pub users: usize,
}

/// Rounds to one decimal place, the precision statistics are reported in.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enrollment_status_conversion() {
        assert_eq!(EnrollmentStatus::from("active"), EnrollmentStatus::Active);
        assert_eq!(EnrollmentStatus::from("completed"), EnrollmentStatus::Completed);
        assert_eq!(EnrollmentStatus::from("dropped"), EnrollmentStatus::Dropped);
        assert_eq!(EnrollmentStatus::from("unknown"), EnrollmentStatus::Active);
    }

    #[test]
    fn test_lesson_status_display() {
        assert_eq!(LessonStatus::NotStarted.to_string(), "not_started");
        assert_eq!(LessonStatus::InProgress.to_string(), "in_progress");
        assert_eq!(LessonStatus::Completed.to_string(), "completed");
    }

    #[test]
    fn test_rank_order() {
        assert!(Rank::Legendary > Rank::Expert);
        assert!(Rank::Expert > Rank::Intermediate);
        assert!(Rank::Intermediate > Rank::Novice);
        assert!(Rank::Novice > Rank::None);
        assert_eq!(Rank::parse("Legendary!"), Some(Rank::Legendary));
        assert_eq!(Rank::parse("Legendary"), None);
        assert_eq!(Rank::Legendary.to_string(), "Legendary!");
    }

    #[test]
    fn test_rank_serialization() {
        let json = serde_json::to_string(&Rank::Legendary).unwrap();
        assert_eq!(json, "\"Legendary!\"");
    }

    #[test]
    fn test_accuracy_guards_zero_questions() {
        let attempt = QuizAttempt {
            id: 1,
            quiz_id: 1,
            user_id: 1,
            score: 0,
            total_questions: 0,
            correct_answers: 0,
            rank: Rank::None,
            completed_at: Utc::now(),
        };
        assert_eq!(attempt.accuracy_percent(), 0.0);
    }

    #[test]
    fn test_actor_permissions() {
        let teacher = Actor::new(7, UserRole::Teacher);
        assert!(teacher.can_author());
        assert!(teacher.can_manage(7));
        assert!(!teacher.can_manage(8));
        assert!(Actor::new(1, UserRole::SuperAdmin).can_manage(8));
        assert!(!Actor::new(2, UserRole::Student).can_author());
    }

    #[test]
    fn test_round1() {
        assert_eq!(round1(66.666), 66.7);
        assert_eq!(round1(80.0), 80.0);
    }
}
