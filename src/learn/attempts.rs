//! Attempt Recorder.
//!
//! Attempts are append-only. Statistics are derived on read and never stored.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use log::info;

use super::codes::normalize_code;
use super::error::{LearnError, LearnResult};
use super::store::{LearnStore, LearnTx, NewAttemptRow, NewParticipationRow};
use super::types::*;
use super::{ensure_manager, LearnEngine};

const HISTORY_PREVIEW: usize = 5;

pub fn validate_attempt(submission: &AttemptSubmission) -> LearnResult<Rank> {
    if submission.score < 0 {
        return Err(LearnError::validation("score cannot be negative"));
    }
    if submission.total_questions < 0 {
        return Err(LearnError::validation("total questions cannot be negative"));
    }
    if submission.correct_answers < 0 {
        return Err(LearnError::validation("correct answers cannot be negative"));
    }
    if submission.correct_answers > submission.total_questions {
        return Err(LearnError::validation(format!(
            "correct answers ({}) exceed total questions ({})",
            submission.correct_answers, submission.total_questions
        )));
    }
    match submission.rank.as_deref() {
        None => Ok(Rank::None),
        Some(label) => Rank::parse(label)
            .ok_or_else(|| LearnError::validation(format!("unknown rank {label:?}"))),
    }
}

/// Mean of the per-attempt accuracy percentages. Attempts without questions
/// contribute 0.
pub fn average_score(attempts: &[QuizAttempt]) -> f64 {
    if attempts.is_empty() {
        return 0.0;
    }
    attempts.iter().map(QuizAttempt::accuracy_percent).sum::<f64>() / attempts.len() as f64
}

pub fn best_rank(attempts: &[QuizAttempt]) -> Rank {
    attempts.iter().map(|a| a.rank).max().unwrap_or(Rank::None)
}

/// sum(correct) / sum(total) * 100 across all attempts. This is a pooled
/// ratio, so long quizzes weigh more than short ones.
pub fn pooled_completion_rate(attempts: &[QuizAttempt]) -> f64 {
    let (correct, total) = attempts.iter().fold((0i64, 0i64), |(c, t), a| {
        (c + i64::from(a.correct_answers), t + i64::from(a.total_questions))
    });
    if total == 0 {
        0.0
    } else {
        correct as f64 * 100.0 / total as f64
    }
}

fn mean_raw_score<'a>(attempts: impl IntoIterator<Item = &'a QuizAttempt>) -> f64 {
    let (sum, count) = attempts
        .into_iter()
        .fold((0i64, 0usize), |(s, n), a| (s + i64::from(a.score), n + 1));
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}

fn summarize(tx: &mut dyn LearnTx, attempts: Vec<QuizAttempt>) -> LearnResult<Vec<AttemptSummary>> {
    let mut titles: HashMap<i32, Option<String>> = HashMap::new();
    let mut summaries = Vec::with_capacity(attempts.len());
    for attempt in attempts {
        let quiz_title = match titles.get(&attempt.quiz_id) {
            Some(title) => title.clone(),
            None => {
                let title = tx.quiz(attempt.quiz_id)?.map(|q| q.title);
                titles.insert(attempt.quiz_id, title.clone());
                title
            }
        };
        summaries.push(AttemptSummary {
            attempt,
            quiz_title,
        });
    }
    Ok(summaries)
}

impl<S: LearnStore> LearnEngine<S> {
    /// Appends a finished attempt for the actor.
    pub async fn record_attempt(
        &self,
        actor: Actor,
        quiz_id: i32,
        submission: AttemptSubmission,
    ) -> LearnResult<QuizAttempt> {
        let rank = validate_attempt(&submission)?;

        let attempt = self
            .store
            .transaction(move |tx| {
                tx.quiz(quiz_id)?
                    .ok_or_else(|| LearnError::not_found("quiz", quiz_id))?;
                tx.user(actor.user_id)?
                    .ok_or_else(|| LearnError::not_found("user", actor.user_id))?;
                Ok(tx.insert_attempt(NewAttemptRow {
                    quiz_id,
                    user_id: actor.user_id,
                    score: submission.score,
                    total_questions: submission.total_questions,
                    correct_answers: submission.correct_answers,
                    rank,
                    completed_at: Utc::now(),
                })?)
            })
            .await
            .map_err(|e| e.during("attempt recording"))?;

        info!(
            "User {} finished quiz {}: {}/{} correct, score {}, rank {}",
            attempt.user_id,
            attempt.quiz_id,
            attempt.correct_answers,
            attempt.total_questions,
            attempt.score,
            attempt.rank
        );
        Ok(attempt)
    }

    /// Enters a quiz session by access code. Repeated joins add repeated rows.
    pub async fn join_quiz(&self, actor: Actor, code: &str) -> LearnResult<QuizParticipation> {
        let code = normalize_code(code);
        self.store
            .transaction(move |tx| {
                let quiz = tx
                    .quiz_by_code(&code)?
                    .ok_or_else(|| LearnError::not_found("quiz", code))?;
                tx.user(actor.user_id)?
                    .ok_or_else(|| LearnError::not_found("user", actor.user_id))?;
                Ok(tx.insert_participation(NewParticipationRow {
                    quiz_id: quiz.id,
                    user_id: actor.user_id,
                    joined_at: Utc::now(),
                })?)
            })
            .await
            .map_err(|e| e.during("quiz join"))
    }

    pub async fn participations_for_quiz(
        &self,
        actor: Actor,
        quiz_id: i32,
    ) -> LearnResult<Vec<QuizParticipation>> {
        self.store
            .transaction(move |tx| {
                let quiz = tx
                    .quiz(quiz_id)?
                    .ok_or_else(|| LearnError::not_found("quiz", quiz_id))?;
                ensure_manager(&actor, quiz.teacher_id, "quiz")?;
                Ok(tx.participations_for_quiz(quiz_id)?)
            })
            .await
    }

    pub async fn student_stats(&self, user_id: i32) -> LearnResult<StudentStats> {
        self.store
            .transaction(move |tx| {
                let attempts = tx.attempts_by_user(user_id)?;
                let quizzes_taken = attempts.len() as i64;
                let avg_score = round1(average_score(&attempts));
                let best_rank = best_rank(&attempts);
                let recent = attempts.into_iter().take(HISTORY_PREVIEW).collect();
                Ok(StudentStats {
                    quizzes_taken,
                    avg_score,
                    best_rank,
                    performance_history: summarize(tx, recent)?,
                })
            })
            .await
    }

    /// All attempts of a user, most recent first.
    pub async fn performance_history(&self, user_id: i32) -> LearnResult<Vec<AttemptSummary>> {
        self.store
            .transaction(move |tx| {
                let attempts = tx.attempts_by_user(user_id)?;
                summarize(tx, attempts)
            })
            .await
    }

    /// Aggregates every attempt on quizzes the teacher owns.
    pub async fn teacher_stats(&self, actor: Actor, teacher_id: i32) -> LearnResult<TeacherStats> {
        ensure_manager(&actor, teacher_id, "teacher's statistics")?;

        self.store
            .transaction(move |tx| {
                let quizzes = tx.quizzes_by_teacher(teacher_id)?;
                let quiz_ids: Vec<i32> = quizzes.iter().map(|q| q.id).collect();
                let attempts = tx.attempts_for_quizzes(&quiz_ids)?;

                let total_students = attempts
                    .iter()
                    .map(|a| a.user_id)
                    .collect::<HashSet<_>>()
                    .len() as i64;

                let quiz_stats = quizzes
                    .into_iter()
                    .map(|quiz| {
                        let on_quiz: Vec<&QuizAttempt> =
                            attempts.iter().filter(|a| a.quiz_id == quiz.id).collect();
                        QuizStats {
                            id: quiz.id,
                            title: quiz.title,
                            access_code: quiz.access_code,
                            attempt_count: on_quiz.len() as i64,
                            avg_score: round1(mean_raw_score(on_quiz)),
                        }
                    })
                    .collect::<Vec<_>>();

                Ok(TeacherStats {
                    total_quizzes: quiz_stats.len() as i64,
                    total_students,
                    avg_score: round1(mean_raw_score(&attempts)),
                    avg_completion_rate: round1(pooled_completion_rate(&attempts)),
                    quizzes: quiz_stats,
                })
            })
            .await
    }
}
