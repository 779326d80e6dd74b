mod common;

use std::time::Duration;

use common::*;
use learnserver::learn::questions::{draft_questions, Difficulty, HttpQuestionSource, QuestionSource};
use learnserver::learn::*;
use mockito::Matcher;
use serde_json::json;

fn question(text: &str, correct: usize) -> serde_json::Value {
    json!({
        "text": text,
        "choices": (0..4)
            .map(|i| json!({ "text": format!("option {i}"), "is_correct": i < correct }))
            .collect::<Vec<_>>(),
    })
}

fn source(server: &mockito::ServerGuard) -> HttpQuestionSource {
    HttpQuestionSource::new(
        format!("{}/generate", server.url()),
        Some("test-key".into()),
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn test_http_source_posts_request_and_parses_questions() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/generate")
        .match_header("authorization", "Bearer test-key")
        .match_body(Matcher::PartialJson(json!({
            "content": "The solar system",
            "count": 2,
            "difficulty": "advanced",
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "questions": [question("Largest planet?", 1), question("Hottest?", 1)] }).to_string())
        .create_async()
        .await;

    let questions = source(&server)
        .generate("The solar system", 2, Difficulty::Advanced)
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(questions.len(), 2);
    assert_eq!(questions[0].text, "Largest planet?");
    assert!(questions[0].choices[0].is_correct);
}

#[tokio::test]
async fn test_http_source_error_status_is_upstream() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/generate")
        .with_status(503)
        .create_async()
        .await;

    let err = source(&server)
        .generate("anything", 3, Difficulty::Beginner)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Upstream);
}

#[tokio::test]
async fn test_malformed_output_is_rejected() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/generate")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "questions": [question("Two right answers?", 2)] }).to_string())
        .create_async()
        .await;

    let err = draft_questions(&source(&server), "content", 1, Difficulty::Medium)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Upstream);

    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/generate")
        .with_status(200)
        .with_body("not json")
        .create_async()
        .await;
    let err = source(&server)
        .generate("content", 1, Difficulty::Medium)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Upstream);
}

#[tokio::test]
async fn test_create_quiz_from_source() {
    let engine = engine();
    let teacher = user(&engine, "t@example.com", UserRole::Teacher).await;
    let source = StaticQuestionSource { questions: 5 };

    let detail = engine
        .create_quiz_from_source(teacher, &source, "Photosynthesis".into(), "plants", 3, Difficulty::Beginner)
        .await
        .unwrap();

    assert_eq!(detail.questions.len(), 3);
    for q in &detail.questions {
        assert_eq!(q.question.points, 1000);
        assert_eq!(q.question.time_limit, 30);
        assert_eq!(q.choices.len(), 4);
        assert_eq!(q.choices.iter().filter(|c| c.is_correct).count(), 1);
    }
    assert_eq!(detail.quiz.access_code.len(), 6);
}

#[tokio::test]
async fn test_source_is_not_called_for_bad_input() {
    let engine = engine();
    let teacher = user(&engine, "t@example.com", UserRole::Teacher).await;
    let student = user(&engine, "s@example.com", UserRole::Student).await;
    let source = StaticQuestionSource { questions: 0 };

    let err = engine
        .create_quiz_from_source(teacher, &source, "t".into(), "   ", 3, Difficulty::Beginner)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = engine
        .create_quiz_from_source(teacher, &source, "t".into(), "text", 21, Difficulty::Beginner)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = engine
        .create_quiz_from_source(student, &source, "t".into(), "text", 3, Difficulty::Beginner)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    // an empty answer from the source is an upstream failure
    let err = engine
        .create_quiz_from_source(teacher, &source, "t".into(), "text", 3, Difficulty::Beginner)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Upstream);
    assert!(engine.store().snapshot().await.quizzes.is_empty());
}
