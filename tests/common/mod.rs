#![allow(dead_code)]

use async_trait::async_trait;
use learnserver::learn::questions::{Difficulty, GeneratedChoice, GeneratedQuestion, QuestionSource};
use learnserver::learn::*;

pub fn engine() -> LearnEngine<InMemoryLearnStore> {
    LearnEngine::new(InMemoryLearnStore::new())
}

pub async fn user(engine: &LearnEngine<InMemoryLearnStore>, email: &str, role: UserRole) -> Actor {
    let user = engine
        .create_user(NewUser {
            email: email.to_string(),
            full_name: None,
            role,
        })
        .await
        .expect("user");
    Actor::new(user.id, user.role)
}

pub fn single_choice(text: &str) -> NewQuestion {
    NewQuestion {
        text: text.to_string(),
        question_type: QuestionType::SingleChoice,
        points: 1000,
        time_limit: 30,
        choices: vec![
            NewChoice {
                text: "right".into(),
                is_correct: true,
            },
            NewChoice {
                text: "wrong".into(),
                is_correct: false,
            },
        ],
    }
}

pub async fn quiz(engine: &LearnEngine<InMemoryLearnStore>, teacher: Actor, title: &str) -> Quiz {
    engine
        .create_quiz(
            teacher,
            NewQuiz {
                title: title.to_string(),
                description: None,
                is_public: true,
                questions: vec![single_choice("first?"), single_choice("second?")],
            },
        )
        .await
        .expect("quiz")
        .quiz
}

pub fn lesson(title: &str) -> NewLesson {
    NewLesson {
        title: title.to_string(),
        duration_minutes: 10,
        ..Default::default()
    }
}

pub async fn course(
    engine: &LearnEngine<InMemoryLearnStore>,
    teacher: Actor,
    status: CourseStatus,
    lessons: Vec<NewLesson>,
) -> CourseDetail {
    engine
        .create_course(
            teacher,
            NewCourse {
                title: "Rust for beginners".into(),
                description: None,
                category: Some("programming".into()),
                status,
                access_code: None,
                lessons,
            },
        )
        .await
        .expect("course")
}

pub fn submission(score: i32, correct: i32, total: i32, rank: &str) -> AttemptSubmission {
    AttemptSubmission {
        score,
        total_questions: total,
        correct_answers: correct,
        rank: Some(rank.to_string()),
    }
}

/// Question source returning a fixed set of well-formed questions.
pub struct StaticQuestionSource {
    pub questions: usize,
}

#[async_trait]
impl QuestionSource for StaticQuestionSource {
    async fn generate(
        &self,
        content: &str,
        _count: u32,
        _difficulty: Difficulty,
    ) -> Result<Vec<GeneratedQuestion>, LearnError> {
        Ok((0..self.questions)
            .map(|i| GeneratedQuestion {
                text: format!("Question {} about {}", i + 1, content),
                choices: (0..4)
                    .map(|c| GeneratedChoice {
                        text: format!("option {c}"),
                        is_correct: c == 0,
                    })
                    .collect(),
            })
            .collect())
    }
}
