diesel::table! {
    users (id) {
        id -> Int4,
        email -> Varchar,
        full_name -> Nullable<Varchar>,
        role -> Varchar,
        is_active -> Bool,
        streak_count -> Int4,
        last_streak_date -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    quizzes (id) {
        id -> Int4,
        title -> Varchar,
        description -> Nullable<Text>,
        access_code -> Varchar,
        is_public -> Bool,
        teacher_id -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    questions (id) {
        id -> Int4,
        quiz_id -> Int4,
        text -> Text,
        question_type -> Varchar,
        points -> Int4,
        time_limit -> Int4,
        position -> Int4,
    }
}

diesel::table! {
    choices (id) {
        id -> Int4,
        question_id -> Int4,
        text -> Varchar,
        is_correct -> Bool,
    }
}

diesel::table! {
    courses (id) {
        id -> Int4,
        title -> Varchar,
        description -> Nullable<Text>,
        category -> Nullable<Varchar>,
        status -> Varchar,
        access_code -> Nullable<Varchar>,
        teacher_id -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    lessons (id) {
        id -> Int4,
        course_id -> Int4,
        title -> Varchar,
        order_index -> Int4,
        duration_minutes -> Int4,
        linked_quiz_id -> Nullable<Int4>,
        quiz_code -> Nullable<Varchar>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    enrollments (id) {
        id -> Int4,
        user_id -> Int4,
        course_id -> Int4,
        status -> Varchar,
        progress_percent -> Float8,
        enrolled_at -> Timestamptz,
        completed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    lesson_progress (id) {
        id -> Int4,
        enrollment_id -> Int4,
        lesson_id -> Int4,
        status -> Varchar,
        time_spent_seconds -> Int4,
        started_at -> Nullable<Timestamptz>,
        completed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    quiz_attempts (id) {
        id -> Int4,
        quiz_id -> Int4,
        user_id -> Int4,
        score -> Int4,
        total_questions -> Int4,
        correct_answers -> Int4,
        rank -> Varchar,
        completed_at -> Timestamptz,
    }
}

diesel::table! {
    quiz_participations (id) {
        id -> Int4,
        quiz_id -> Int4,
        user_id -> Int4,
        joined_at -> Timestamptz,
    }
}

diesel::table! {
    community_messages (id) {
        id -> Int4,
        course_id -> Int4,
        user_id -> Int4,
        content -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    course_feedback (id) {
        id -> Int4,
        course_id -> Int4,
        user_id -> Int4,
        content -> Text,
        rating -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(quizzes -> users (teacher_id));
diesel::joinable!(questions -> quizzes (quiz_id));
diesel::joinable!(choices -> questions (question_id));
diesel::joinable!(courses -> users (teacher_id));
diesel::joinable!(lessons -> courses (course_id));
diesel::joinable!(lessons -> quizzes (linked_quiz_id));
diesel::joinable!(enrollments -> courses (course_id));
diesel::joinable!(enrollments -> users (user_id));
diesel::joinable!(lesson_progress -> enrollments (enrollment_id));
diesel::joinable!(lesson_progress -> lessons (lesson_id));
diesel::joinable!(quiz_attempts -> quizzes (quiz_id));
diesel::joinable!(quiz_attempts -> users (user_id));
diesel::joinable!(quiz_participations -> quizzes (quiz_id));
diesel::joinable!(quiz_participations -> users (user_id));
diesel::joinable!(community_messages -> courses (course_id));
diesel::joinable!(community_messages -> users (user_id));
diesel::joinable!(course_feedback -> courses (course_id));
diesel::joinable!(course_feedback -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    quizzes,
    questions,
    choices,
    courses,
    lessons,
    enrollments,
    lesson_progress,
    quiz_attempts,
    quiz_participations,
    community_messages,
    course_feedback,
);
