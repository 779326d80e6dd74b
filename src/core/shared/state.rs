use std::sync::Arc;

use crate::learn::questions::QuestionSource;
use crate::learn::{LearnEngine, LearnStore};

/// Shared handler state. The question source is optional; without one the
/// generation endpoints report it as unavailable.
pub struct AppState<S: LearnStore> {
    pub engine: LearnEngine<S>,
    pub question_source: Option<Arc<dyn QuestionSource>>,
}

impl<S: LearnStore> AppState<S> {
    pub fn new(engine: LearnEngine<S>) -> Self {
        Self {
            engine,
            question_source: None,
        }
    }

    pub fn with_question_source(mut self, source: Arc<dyn QuestionSource>) -> Self {
        self.question_source = Some(source);
        self
    }
}
