mod common;

use common::*;
use learnserver::learn::*;

async fn setup(
    lessons: usize,
) -> (LearnEngine<InMemoryLearnStore>, Actor, CourseDetail, Enrollment) {
    let engine = engine();
    let teacher = user(&engine, "t@example.com", UserRole::Teacher).await;
    let student = user(&engine, "s@example.com", UserRole::Student).await;
    let lessons = (0..lessons).map(|i| lesson(&format!("lesson {i}"))).collect();
    let detail = course(&engine, teacher, CourseStatus::Published, lessons).await;
    let enrollment = engine
        .enroll(student, detail.course.id)
        .await
        .unwrap()
        .enrollment;
    (engine, student, detail, enrollment)
}

#[tokio::test]
async fn test_progress_is_completed_share_of_lessons() {
    let n = 3;
    let (engine, student, course, enrollment) = setup(n).await;

    for (k, lesson) in course.lessons.iter().enumerate() {
        let outcome = engine
            .record_lesson_progress(student, enrollment.id, lesson.id, LessonStatus::Completed, 30)
            .await
            .unwrap();
        let done = k + 1;
        assert_eq!(
            outcome.enrollment.progress_percent,
            done as f64 / n as f64 * 100.0
        );
        let expect_complete = done == n;
        assert_eq!(
            outcome.enrollment.status == EnrollmentStatus::Completed,
            expect_complete
        );
    }
}

#[tokio::test]
async fn test_in_progress_lessons_do_not_count() {
    let (engine, student, course, enrollment) = setup(2).await;
    let outcome = engine
        .record_lesson_progress(
            student,
            enrollment.id,
            course.lessons[0].id,
            LessonStatus::InProgress,
            45,
        )
        .await
        .unwrap();
    assert_eq!(outcome.enrollment.progress_percent, 0.0);
    assert_eq!(outcome.progress.status, LessonStatus::InProgress);
    assert!(outcome.progress.started_at.is_some());
    assert!(outcome.progress.completed_at.is_none());
}

#[tokio::test]
async fn test_time_accumulates_and_row_is_reused() {
    let (engine, student, course, enrollment) = setup(2).await;
    let lesson_id = course.lessons[0].id;

    let first = engine
        .record_lesson_progress(student, enrollment.id, lesson_id, LessonStatus::NotStarted, 0)
        .await
        .unwrap();
    assert!(first.progress.started_at.is_none());

    engine
        .record_lesson_progress(student, enrollment.id, lesson_id, LessonStatus::InProgress, 40)
        .await
        .unwrap();
    let last = engine
        .record_lesson_progress(student, enrollment.id, lesson_id, LessonStatus::Completed, 20)
        .await
        .unwrap();

    assert_eq!(last.progress.id, first.progress.id);
    assert_eq!(last.progress.time_spent_seconds, 60);
    assert!(last.progress.started_at.is_some());
    assert!(last.progress.completed_at.is_some());
    assert_eq!(engine.store().snapshot().await.lesson_progress.len(), 1);
}

#[tokio::test]
async fn test_course_without_lessons_stays_at_zero() {
    let (engine, _student, _course, enrollment) = setup(0).await;
    let recomputed = engine.recompute_course_progress(enrollment.id).await.unwrap();
    assert_eq!(recomputed.progress_percent, 0.0);
    assert_eq!(recomputed.status, EnrollmentStatus::Active);
}

#[tokio::test]
async fn test_completed_enrollment_never_reverts() {
    let (engine, student, course, enrollment) = setup(1).await;
    let done = engine
        .record_lesson_progress(
            student,
            enrollment.id,
            course.lessons[0].id,
            LessonStatus::Completed,
            10,
        )
        .await
        .unwrap();
    assert_eq!(done.enrollment.status, EnrollmentStatus::Completed);
    let completed_at = done.enrollment.completed_at;

    let teacher = Actor::new(course.course.teacher_id, UserRole::Teacher);
    engine
        .add_lesson(teacher, course.course.id, lesson("bonus"))
        .await
        .unwrap();

    let recomputed = engine.recompute_course_progress(enrollment.id).await.unwrap();
    assert_eq!(recomputed.progress_percent, 50.0);
    assert_eq!(recomputed.status, EnrollmentStatus::Completed);
    assert_eq!(recomputed.completed_at, completed_at);
}

#[tokio::test]
async fn test_concurrent_updates_keep_every_increment() {
    let (engine, student, course, enrollment) = setup(1).await;
    let lesson_id = course.lessons[0].id;
    let enrollment_id = enrollment.id;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .record_lesson_progress(
                    student,
                    enrollment_id,
                    lesson_id,
                    LessonStatus::InProgress,
                    5,
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let tables = engine.store().snapshot().await;
    assert_eq!(tables.lesson_progress.len(), 1);
    let progress = tables.lesson_progress.values().next().unwrap();
    assert_eq!(progress.time_spent_seconds, 40);
}

#[tokio::test]
async fn test_lesson_from_another_course_is_not_found() {
    let (engine, student, course, enrollment) = setup(1).await;
    let teacher = Actor::new(course.course.teacher_id, UserRole::Teacher);
    let other = common::course(&engine, teacher, CourseStatus::Published, vec![lesson("x")]).await;

    let err = engine
        .record_lesson_progress(
            student,
            enrollment.id,
            other.lessons[0].id,
            LessonStatus::Completed,
            0,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_someone_elses_enrollment_is_forbidden() {
    let (engine, _student, course, enrollment) = setup(1).await;
    let intruder = user(&engine, "i@example.com", UserRole::Student).await;
    let err = engine
        .record_lesson_progress(
            intruder,
            enrollment.id,
            course.lessons[0].id,
            LessonStatus::Completed,
            0,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert!(engine.store().snapshot().await.lesson_progress.is_empty());
}

#[tokio::test]
async fn test_deleting_unfinished_lesson_completes_enrollment() {
    let (engine, student, course, enrollment) = setup(2).await;
    let teacher = Actor::new(course.course.teacher_id, UserRole::Teacher);
    let outcome = engine
        .record_lesson_progress(
            student,
            enrollment.id,
            course.lessons[0].id,
            LessonStatus::Completed,
            10,
        )
        .await
        .unwrap();
    assert_eq!(outcome.enrollment.progress_percent, 50.0);

    engine
        .delete_lesson(teacher, course.course.id, course.lessons[1].id)
        .await
        .unwrap();

    let detail = engine.enrollment_detail(student, enrollment.id).await.unwrap();
    assert_eq!(detail.enrollment.progress_percent, 100.0);
    assert_eq!(detail.enrollment.status, EnrollmentStatus::Completed);
    assert!(detail.enrollment.completed_at.is_some());
}

#[tokio::test]
async fn test_deleting_finished_lesson_keeps_completion() {
    let (engine, student, course, enrollment) = setup(2).await;
    let teacher = Actor::new(course.course.teacher_id, UserRole::Teacher);
    let mut done = None;
    for lesson in &course.lessons {
        done = Some(
            engine
                .record_lesson_progress(student, enrollment.id, lesson.id, LessonStatus::Completed, 5)
                .await
                .unwrap(),
        );
    }
    let completed_at = done.unwrap().enrollment.completed_at;

    engine
        .delete_lesson(teacher, course.course.id, course.lessons[0].id)
        .await
        .unwrap();
    engine
        .add_lesson(teacher, course.course.id, lesson("extra"))
        .await
        .unwrap();

    let recomputed = engine.recompute_course_progress(enrollment.id).await.unwrap();
    assert_eq!(recomputed.progress_percent, 50.0);
    assert_eq!(recomputed.status, EnrollmentStatus::Completed);
    assert_eq!(recomputed.completed_at, completed_at);

    let tables = engine.store().snapshot().await;
    assert_eq!(tables.lesson_progress.len(), 1);
    assert!(!tables.lessons.contains_key(&course.lessons[0].id));
}

#[tokio::test]
async fn test_added_lesson_counts_toward_progress() {
    let (engine, student, course, enrollment) = setup(1).await;
    let teacher = Actor::new(course.course.teacher_id, UserRole::Teacher);
    engine
        .record_lesson_progress(
            student,
            enrollment.id,
            course.lessons[0].id,
            LessonStatus::InProgress,
            5,
        )
        .await
        .unwrap();
    engine
        .add_lesson(teacher, course.course.id, lesson("second"))
        .await
        .unwrap();
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

    let detail = engine.enrollment_detail(student, enrollment.id).await.unwrap();
    assert_eq!(detail.enrollment.progress_percent, 50.0);
    assert_eq!(detail.enrollment.status, EnrollmentStatus::Active);
}

#[tokio::test]
async fn test_lesson_delete_checks_owner_and_course() {
    let (engine, student, course, _enrollment) = setup(2).await;
    let teacher = Actor::new(course.course.teacher_id, UserRole::Teacher);
    let other = other_course(&engine, teacher).await;

    let err = engine
        .delete_lesson(student, course.course.id, course.lessons[0].id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = engine
        .delete_lesson(teacher, other.course.id, course.lessons[0].id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(engine.store().snapshot().await.lessons.len(), 3);
}

async fn other_course(engine: &LearnEngine<InMemoryLearnStore>, teacher: Actor) -> CourseDetail {
    course(engine, teacher, CourseStatus::Published, vec![lesson("other")]).await
}
