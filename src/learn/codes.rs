//! Access code allocation for quizzes and courses.
//!
//! Codes are drawn from `A-Z0-9` and checked against the store inside the
//! caller's transaction. The unique constraints on `quizzes.access_code` and
//! `courses.access_code` remain the final arbiter: a concurrent writer that
//! wins the race surfaces as a unique violation at insert time.

use std::fmt;
use std::sync::Arc;

use log::{debug, error};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::error::{LearnError, LearnResult};
use super::store::LearnTx;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub const QUIZ_CODE_LENGTH: usize = 6;
pub const COURSE_CODE_LENGTH: usize = 8;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
/// Width of the `access_code` and `quiz_code` columns.
pub const MAX_CODE_LENGTH: usize = 10;

const DRAFT_PREFIX: &str = "DRAFT_";
const DRAFT_SUFFIX_LENGTH: usize = 4;

/// Which code space a code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeTarget {
    Quiz,
    Course,
}

impl CodeTarget {
    pub fn default_length(&self) -> usize {
        match self {
            Self::Quiz => QUIZ_CODE_LENGTH,
            Self::Course => COURSE_CODE_LENGTH,
        }
    }

    /// Name of the unique constraint guarding this code space.
    pub fn constraint(&self) -> &'static str {
        match self {
            Self::Quiz => "uq_quizzes_access_code",
            Self::Course => "uq_courses_access_code",
        }
    }
}

impl fmt::Display for CodeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quiz => f.write_str("quiz"),
            Self::Course => f.write_str("course"),
        }
    }
}

type Generator = Arc<dyn Fn(usize) -> String + Send + Sync>;

#[derive(Clone)]
pub struct CodeAllocator {
    max_attempts: u32,
    generator: Generator,
}

impl fmt::Debug for CodeAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeAllocator")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl Default for CodeAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl CodeAllocator {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            generator: Arc::new(random_code),
        }
    }

    /// Replaces the random source. Used by tests to force collisions.
    pub fn with_generator<G>(max_attempts: u32, generator: G) -> Self
    where
        G: Fn(usize) -> String + Send + Sync + 'static,
    {
        Self {
            max_attempts: max_attempts.max(1),
            generator: Arc::new(generator),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns a code of `length` characters not yet used by `target`.
    pub fn allocate(
        &self,
        tx: &mut dyn LearnTx,
        target: CodeTarget,
        length: usize,
    ) -> LearnResult<String> {
        for attempt in 1..=self.max_attempts {
            let candidate = (self.generator)(length);
            if !tx
                .access_code_taken(target, &candidate)
                .map_err(|e| LearnError::persistence("access code lookup", e))?
            {
                return Ok(candidate);
            }
            debug!("{} code {} taken (attempt {})", target, candidate, attempt);
        }

        error!(
            "Exhausted {} attempts allocating a {} access code of length {}",
            self.max_attempts, target, length
        );
        Err(LearnError::CodeSpaceExhausted {
            target,
            attempts: self.max_attempts,
        })
    }

    /// Placeholder stored on draft courses so the column stays non-null and unique.
    /// Placeholders never resolve through a code lookup.
    pub fn allocate_draft_placeholder(&self, tx: &mut dyn LearnTx) -> LearnResult<String> {
        for _ in 0..self.max_attempts {
            let candidate = format!("{DRAFT_PREFIX}{}", (self.generator)(DRAFT_SUFFIX_LENGTH));
            if !tx
                .access_code_taken(CodeTarget::Course, &candidate)
                .map_err(|e| LearnError::persistence("access code lookup", e))?
            {
                return Ok(candidate);
            }
        }

        error!("Exhausted {} attempts allocating a draft placeholder", self.max_attempts);
        Err(LearnError::CodeSpaceExhausted {
            target: CodeTarget::Course,
            attempts: self.max_attempts,
        })
    }
}

fn random_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Trims and upper-cases a user-supplied code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

pub fn is_draft_placeholder(code: &str) -> bool {
    code.starts_with(DRAFT_PREFIX)
}

/// A custom code must be 1 to 10 alphanumeric characters and not look like a
/// placeholder.
pub fn validate_custom_code(code: &str) -> LearnResult<()> {
    if code.is_empty() {
        return Err(LearnError::validation("access code cannot be empty"));
    }
    if code.chars().count() > MAX_CODE_LENGTH {
        return Err(LearnError::validation(format!(
            "access code cannot be longer than {MAX_CODE_LENGTH} characters"
        )));
    }
    if is_draft_placeholder(code) {
        return Err(LearnError::validation("access code cannot use the DRAFT_ prefix"));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(LearnError::validation("access code must be alphanumeric"));
    }
    Ok(())
}
