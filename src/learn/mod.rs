//! # Learn Module - Enrollment & Attempt Consistency Engine
//!
//! Governs how a student's relationship to a course or quiz is created, kept
//! consistent and torn down:
//! - Access code allocation for quizzes and courses
//! - Idempotent enrollment
//! - Lesson progress aggregation into course completion
//! - Quiz attempt recording and read-side statistics
//! - Cascading deletion of users, quizzes and courses
//!
//! ## Architecture
//!
//! Every operation runs inside one storage transaction obtained from a
//! [`store::LearnStore`]. Postgres (Diesel + r2d2) backs production; the
//! in-memory store enforces the same constraints for tests.

use chrono::Utc;
use log::info;

pub mod api;
pub mod attempts;
pub mod authoring;
pub mod codes;
pub mod community;
pub mod deletion;
pub mod enrollment;
pub mod error;
pub mod progress;
pub mod questions;
pub mod store;
pub mod types;

pub use codes::{CodeAllocator, CodeTarget};
pub use error::{ErrorKind, LearnError, LearnResult, StorageError};
pub use store::{InMemoryLearnStore, LearnStore, LearnTx, PgStore};
pub use types::*;

use store::NewUserRow;

// ============================================================================
// LEARN ENGINE
// ============================================================================

/// Entry point for all learn operations. Generic over the storage backend.
#[derive(Debug, Clone)]
pub struct LearnEngine<S: LearnStore> {
    store: S,
    codes: CodeAllocator,
}

impl<S: LearnStore> LearnEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            codes: CodeAllocator::default(),
        }
    }

    pub fn with_codes(store: S, codes: CodeAllocator) -> Self {
        Self { store, codes }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ----- User Operations -----

    /// Registers a user record. Credentials live with the identity provider.
    pub async fn create_user(&self, req: NewUser) -> LearnResult<User> {
        let email = req.email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(LearnError::validation("a valid email is required"));
        }
        ensure_max_len("email", &email, MAX_EMAIL_LEN)?;
        if let Some(name) = req.full_name.as_deref() {
            ensure_max_len("full name", name, MAX_NAME_LEN)?;
        }

        let user = self
            .store
            .transaction(move |tx| {
                let user = tx
                    .insert_user(NewUserRow {
                        email,
                        full_name: req.full_name,
                        role: req.role,
                        created_at: Utc::now(),
                    })
                    .map_err(|e| {
                        if e.is_unique_violation("uq_users_email") {
                            LearnError::Conflict("email already registered".to_string())
                        } else {
                            e.into()
                        }
                    })?;
                Ok(user)
            })
            .await
            .map_err(|e| e.during("user registration"))?;

        info!("Registered user {} as {}", user.id, user.role);
        Ok(user)
    }

    pub async fn get_user(&self, user_id: i32) -> LearnResult<User> {
        self.store
            .transaction(move |tx| {
                tx.user(user_id)?
                    .ok_or_else(|| LearnError::not_found("user", user_id))
            })
            .await
    }
}

pub const MAX_EMAIL_LEN: usize = 255;
pub const MAX_NAME_LEN: usize = 100;

/// Rejects text longer than its column allows, counted in characters.
pub(crate) fn ensure_max_len(field: &str, value: &str, max: usize) -> LearnResult<()> {
    if value.chars().count() > max {
        return Err(LearnError::validation(format!(
            "{field} cannot be longer than {max} characters"
        )));
    }
    Ok(())
}

/// Fails with Forbidden unless the actor owns the resource or is a super-admin.
pub(crate) fn ensure_manager(actor: &Actor, owner_id: i32, what: &str) -> LearnResult<()> {
    if actor.can_manage(owner_id) {
        Ok(())
    } else {
        Err(LearnError::forbidden(format!(
            "only the owner or a super-admin may modify this {what}"
        )))
    }
}
