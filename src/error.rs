use thiserror::Error;

use crate::db::DbError;

/// Errors surfaced by `AppService` operations.
///
/// Validation errors carry the form field they belong to so a page can point
/// at the offending input.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("You need to be signed in to do that")]
    Unauthenticated,
    #[error("Exercise not found: ID {0}")]
    ExerciseNotFound(i64),
    #[error("Workout not found: ID {0}")]
    WorkoutNotFound(i64),
    #[error("User not found: ID {0}")]
    UserNotFound(i64),
    #[error("Add at least one exercise before saving the workout")]
    EmptyDraft,
    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
    #[error("Could not write cookie: {0}")]
    Cookie(String),
    #[error("Storage operation failed")]
    Storage(#[source] DbError),
}

impl AppError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field,
            message: message.into(),
        }
    }

    /// The form field this error should be reported against, if any.
    pub const fn field(&self) -> Option<&'static str> {
        match self {
            AppError::Validation { field, .. } => Some(*field),
            AppError::EmptyDraft => Some("exercises"),
            _ => None,
        }
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            AppError::ExerciseNotFound(_) | AppError::WorkoutNotFound(_) | AppError::UserNotFound(_)
        )
    }
}

impl From<DbError> for AppError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::ExerciseNotFound(id) => AppError::ExerciseNotFound(id),
            DbError::WorkoutNotFound(id) => AppError::WorkoutNotFound(id),
            DbError::UserNotFound(id) => AppError::UserNotFound(id),
            DbError::EmailTaken(_) => {
                AppError::validation("email", "A user already exists with this email")
            }
            other => AppError::Storage(other),
        }
    }
}
