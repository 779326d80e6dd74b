//! Question generation through an external source.
//!
//! The source is an opaque collaborator: given text content it returns
//! questions with four choices, exactly one correct. One client is built at
//! startup and handed to whoever needs it.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::authoring::{DEFAULT_QUESTION_POINTS, DEFAULT_TIME_LIMIT_SECS};
use super::error::{LearnError, LearnResult};
use super::store::LearnStore;
use super::types::*;
use super::LearnEngine;

pub const MIN_QUESTION_COUNT: u32 = 1;
pub const MAX_QUESTION_COUNT: u32 = 20;
pub const CHOICES_PER_QUESTION: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Medium,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Medium => "medium",
            Self::Advanced => "advanced",
        }
    }

    pub fn parse(s: &str) -> LearnResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Ok(Self::Beginner),
            "medium" => Ok(Self::Medium),
            "advanced" => Ok(Self::Advanced),
            other => Err(LearnError::validation(format!(
                "difficulty must be beginner, medium or advanced, got {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedChoice {
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    pub text: String,
    pub choices: Vec<GeneratedChoice>,
}

#[async_trait]
pub trait QuestionSource: Send + Sync {
    async fn generate(
        &self,
        content: &str,
        count: u32,
        difficulty: Difficulty,
    ) -> Result<Vec<GeneratedQuestion>, LearnError>;
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    content: &'a str,
    count: u32,
    difficulty: Difficulty,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    questions: Vec<GeneratedQuestion>,
}

/// Posts `{content, count, difficulty}` as JSON to a generation endpoint.
pub struct HttpQuestionSource {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpQuestionSource {
    pub fn new(
        endpoint: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl QuestionSource for HttpQuestionSource {
    async fn generate(
        &self,
        content: &str,
        count: u32,
        difficulty: Difficulty,
    ) -> Result<Vec<GeneratedQuestion>, LearnError> {
        let mut request = self.client.post(&self.endpoint).json(&GenerationRequest {
            content,
            count,
            difficulty,
        });
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| LearnError::Upstream(format!("request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            warn!("Question source answered {}", status);
            return Err(LearnError::Upstream(format!("question source returned {status}")));
        }

        let body: GenerationResponse = response
            .json()
            .await
            .map_err(|e| LearnError::Upstream(format!("unreadable response: {e}")))?;
        debug!("Question source produced {} questions", body.questions.len());
        Ok(body.questions)
    }
}

/// Checks generated output and turns it into quiz questions with the default
/// points and time limit. Extra questions beyond `count` are dropped.
pub fn into_new_questions(
    generated: Vec<GeneratedQuestion>,
    count: u32,
) -> LearnResult<Vec<NewQuestion>> {
    if generated.is_empty() {
        return Err(LearnError::Upstream("question source returned no questions".into()));
    }

    generated
        .into_iter()
        .take(count as usize)
        .enumerate()
        .map(|(idx, q)| {
            let correct = q.choices.iter().filter(|c| c.is_correct).count();
            if q.text.trim().is_empty()
                || q.choices.len() != CHOICES_PER_QUESTION
                || correct != 1
                || q.choices.iter().any(|c| c.text.trim().is_empty())
            {
                return Err(LearnError::Upstream(format!(
                    "question source returned a malformed question at position {}",
                    idx + 1
                )));
            }
            Ok(NewQuestion {
                text: q.text,
                question_type: QuestionType::SingleChoice,
                points: DEFAULT_QUESTION_POINTS,
                time_limit: DEFAULT_TIME_LIMIT_SECS,
                choices: q
                    .choices
                    .into_iter()
                    .map(|c| NewChoice {
                        text: c.text,
                        is_correct: c.is_correct,
                    })
                    .collect(),
            })
        })
        .collect()
}

/// Asks the source for questions and validates what comes back.
pub async fn draft_questions(
    source: &dyn QuestionSource,
    content: &str,
    count: u32,
    difficulty: Difficulty,
) -> LearnResult<Vec<NewQuestion>> {
    if content.trim().is_empty() {
        return Err(LearnError::validation("content cannot be empty"));
    }
    if !(MIN_QUESTION_COUNT..=MAX_QUESTION_COUNT).contains(&count) {
        return Err(LearnError::validation(format!(
            "question count must be between {MIN_QUESTION_COUNT} and {MAX_QUESTION_COUNT}"
        )));
    }

    let generated = source.generate(content, count, difficulty).await?;
    into_new_questions(generated, count)
}

impl<S: LearnStore> LearnEngine<S> {
    /// Generates questions from `content` and saves them as a new quiz.
    pub async fn create_quiz_from_source(
        &self,
        actor: Actor,
        source: &dyn QuestionSource,
        title: String,
        content: &str,
        count: u32,
        difficulty: Difficulty,
    ) -> LearnResult<QuizDetail> {
        if !actor.can_author() {
            return Err(LearnError::forbidden("only teachers can author content"));
        }
        let questions = draft_questions(source, content, count, difficulty).await?;
        self.create_quiz(
            actor,
            NewQuiz {
                title,
                description: Some(format!("Generated {difficulty} quiz")),
                is_public: false,
                questions,
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generated(correct: usize) -> GeneratedQuestion {
        GeneratedQuestion {
            text: "Which planet is largest?".into(),
            choices: ["Jupiter", "Mars", "Venus", "Mercury"]
                .iter()
                .enumerate()
                .map(|(i, text)| GeneratedChoice {
                    text: text.to_string(),
                    is_correct: i < correct,
                })
                .collect(),
        }
    }

    #[test]
    fn test_difficulty_parse() {
        assert_eq!(Difficulty::parse(" Medium ").unwrap(), Difficulty::Medium);
        assert!(Difficulty::parse("expert").is_err());
    }

    #[test]
    fn test_conversion_applies_defaults() {
        let questions = into_new_questions(vec![generated(1)], 5).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].points, 1000);
        assert_eq!(questions[0].time_limit, 30);
        assert_eq!(questions[0].question_type, QuestionType::SingleChoice);
    }

    #[test]
    fn test_conversion_rejects_malformed_output() {
        assert!(into_new_questions(vec![generated(2)], 1).is_err());
        assert!(into_new_questions(vec![generated(0)], 1).is_err());
        assert!(into_new_questions(vec![], 1).is_err());
    }

    #[test]
    fn test_conversion_truncates_to_count() {
        let questions = into_new_questions(vec![generated(1), generated(1), generated(1)], 2).unwrap();
        assert_eq!(questions.len(), 2);
    }
}
