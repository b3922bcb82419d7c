use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// --- Declare modules ---
pub mod auth;
pub mod combobox;
mod config;
pub mod cookies;
pub mod db;
pub mod draft;
mod error;
pub mod intent;
pub mod server;

// --- Expose public types ---
pub use config::{
    generate_secret, get_config_path as get_config_path_util, load as load_config_util,
    save as save_config_util, Config, ConfigError,
};

pub use db::{
    get_db_path as get_db_path_util, DbError, Exercise, NewExercise, Unit, User, Workout,
};

pub use draft::{DraftBuffer, DraftEntry, DraftError};
pub use error::AppError;
pub use intent::{DraftIntent, ExerciseFields, ExerciseIntent};

/// A workout together with its exercises in the order they were staged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkoutDetail {
    #[serde(flatten)]
    pub workout: Workout,
    pub exercises: Vec<Exercise>,
}

/// Result of a successful commit. `draft` is the cleared buffer the caller
/// must hand back to the client.
#[derive(Debug)]
pub struct CommitOutcome {
    pub workout: Workout,
    pub draft: DraftBuffer,
}

pub struct AppService {
    pub config: Config,
    pub conn: Connection,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
}

fn require_user(user_id: Option<i64>) -> Result<i64, AppError> {
    user_id.ok_or(AppError::Unauthenticated)
}

impl AppService {
    /// Initializes the application service.
    /// # Errors
    /// Returns `anyhow::Error` if config/db path determination, loading, or initialization fails.
    pub fn initialize() -> Result<Self> {
        let config_path =
            config::get_config_path().context("Failed to determine configuration file path")?;
        let config = config::load(&config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"))?;

        let db_path = match &config.database_path {
            Some(path) => path.clone(),
            None => db::get_db_path().context("Failed to determine database path")?,
        };
        let conn = db::open_db(&db_path)
            .with_context(|| format!("Failed to open database at {db_path:?}"))?;

        db::init_db(&conn).context("Failed to initialize database schema")?;

        Ok(Self {
            config,
            conn,
            db_path,
            config_path,
        })
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn get_config_path(&self) -> &Path {
        &self.config_path
    }

    // ---- Accounts ----

    /// Registers a new account.
    /// # Errors
    /// - `AppError::Validation` for a blank name, malformed email, weak password or taken email.
    pub fn register(&self, name: &str, email: &str, password: &str) -> Result<User, AppError> {
        self.check_registration(name, email, password)?;
        let password_hash = auth::hash_password(password)?;
        self.insert_user(name, email, &password_hash)
    }

    /// The validation half of `register`, without hashing anything.
    /// # Errors
    /// Same validation errors as `register`.
    pub fn check_registration(&self, name: &str, email: &str, password: &str) -> Result<(), AppError> {
        if name.trim().is_empty() {
            return Err(AppError::validation("name", "Name is required"));
        }
        let email = email.trim();
        auth::validate_email(email)?;
        auth::validate_password(password)?;
        if db::get_user_credentials(&self.conn, email)?.is_some() {
            return Err(AppError::validation(
                "email",
                "A user already exists with this email",
            ));
        }
        Ok(())
    }

    /// Stores an account whose password was already hashed.
    /// # Errors
    /// `AppError::Validation` on `email` if the address was taken in the meantime.
    pub fn insert_user(&self, name: &str, email: &str, password_hash: &str) -> Result<User, AppError> {
        let user = db::create_user(&self.conn, name.trim(), email.trim(), password_hash)?;
        info!("Registered user {} ({})", user.id, user.email);
        Ok(user)
    }

    /// Checks an email/password pair.
    /// # Errors
    /// `AppError::Validation` on `email` when the pair doesn't match an account.
    pub fn verify_login(&self, email: &str, password: &str) -> Result<User, AppError> {
        match self.login_candidate(email, password)? {
            Some((user, hash)) if auth::verify_password(password, &hash) => Ok(user),
            _ => Err(auth::invalid_credentials()),
        }
    }

    /// Validates the login form and fetches the account with its stored hash.
    /// The password itself is not checked here.
    pub fn login_candidate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<(User, String)>, AppError> {
        let email = email.trim();
        auth::validate_email(email)?;
        auth::validate_password(password)?;
        Ok(db::get_user_credentials(&self.conn, email)?)
    }

    pub fn get_user(&self, id: i64) -> Result<User, AppError> {
        db::get_user_by_id(&self.conn, id)?.ok_or(AppError::UserNotFound(id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<User, AppError> {
        db::get_user_credentials(&self.conn, email.trim())?
            .map(|(user, _)| user)
            .ok_or_else(|| AppError::validation("email", format!("No account for '{}'", email.trim())))
    }

    // ---- Exercise catalog ----

    /// Lists every exercise the user owns.
    /// # Errors
    /// `AppError::Storage` if the query fails.
    pub fn list_exercises(&self, user_id: i64) -> Result<Vec<Exercise>, AppError> {
        db::list_exercises(&self.conn, user_id).map_err(Into::into)
    }

    /// Distinct names of the user's exercises, for name autocompletion.
    pub fn list_distinct_exercise_names(&self, user_id: i64) -> Result<BTreeSet<String>, AppError> {
        Ok(self
            .list_exercises(user_id)?
            .into_iter()
            .map(|exercise| exercise.name)
            .collect())
    }

    /// # Errors
    /// `AppError::ExerciseNotFound` if no exercise has this ID.
    pub fn get_exercise(&self, id: i64) -> Result<Exercise, AppError> {
        db::get_exercise_by_id(&self.conn, id)?.ok_or(AppError::ExerciseNotFound(id))
    }

    /// Looks up an exercise in the user's own catalog. Exercises belonging to
    /// someone else are reported as not found.
    pub fn get_owned_exercise(&self, user_id: i64, id: i64) -> Result<Exercise, AppError> {
        match self.get_exercise(id)? {
            exercise if exercise.user_id == user_id => Ok(exercise),
            _ => Err(AppError::ExerciseNotFound(id)),
        }
    }

    /// Creates a new exercise owned by the signed-in user.
    /// # Errors
    /// - `AppError::Unauthenticated` without a user.
    /// - `AppError::Storage` if the insert fails.
    pub fn create_exercise(
        &self,
        user_id: Option<i64>,
        fields: ExerciseFields,
    ) -> Result<Exercise, AppError> {
        let user_id = require_user(user_id)?;
        let exercise = db::create_exercise(
            &self.conn,
            &NewExercise {
                user_id,
                name: fields.name,
                load: fields.load,
                unit: fields.unit,
                repetitions: fields.repetitions,
            },
        )?;
        debug!("Created exercise {} '{}' for user {}", exercise.id, exercise.name, user_id);
        Ok(exercise)
    }

    /// Same as `create_exercise`, taking the raw form text.
    /// # Errors
    /// Also `AppError::Validation` for a blank name or unparseable numbers.
    pub fn create_exercise_from_text(
        &self,
        user_id: Option<i64>,
        name: &str,
        load: Option<&str>,
        unit: Option<&str>,
        repetitions: Option<&str>,
    ) -> Result<Exercise, AppError> {
        let user_id = require_user(user_id)?;
        let fields = ExerciseFields::parse(name, load, unit, repetitions)?;
        self.create_exercise(Some(user_id), fields)
    }

    // ---- Drafts ----

    /// Stages one of the user's existing exercises.
    /// # Errors
    /// `AppError::ExerciseNotFound` if the ID is not in the user's catalog.
    pub fn add_existing_to_draft(
        &self,
        user_id: Option<i64>,
        draft: DraftBuffer,
        exercise_id: i64,
    ) -> Result<DraftBuffer, AppError> {
        let user_id = require_user(user_id)?;
        let exercise = self.get_owned_exercise(user_id, exercise_id)?;
        Ok(draft.append(exercise))
    }

    /// Creates a new exercise and stages it.
    pub fn create_into_draft(
        &self,
        user_id: Option<i64>,
        draft: DraftBuffer,
        fields: ExerciseFields,
    ) -> Result<DraftBuffer, AppError> {
        let exercise = self.create_exercise(user_id, fields)?;
        Ok(draft.append(exercise))
    }

    // ---- Workouts ----

    /// Saves the draft as a new workout.
    ///
    /// Exercises staged more than once are linked once, at the position of
    /// their first occurrence. On error nothing is written and the caller's
    /// draft is left as it was.
    /// # Errors
    /// - `AppError::Unauthenticated` without a user.
    /// - `AppError::Validation` on `title` for a blank title.
    /// - `AppError::EmptyDraft` when nothing is staged.
    /// - `AppError::ExerciseNotFound` if a staged exercise no longer exists or isn't the user's.
    pub fn commit_workout(
        &mut self,
        user_id: Option<i64>,
        title: &str,
        draft: &DraftBuffer,
    ) -> Result<CommitOutcome, AppError> {
        let user_id = require_user(user_id)?;
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::validation("title", "Workout title is required"));
        }
        if draft.is_empty() {
            return Err(AppError::EmptyDraft);
        }

        let exercise_ids = draft.distinct_exercise_ids();
        let workout = db::create_workout(&mut self.conn, user_id, title, &exercise_ids)?;
        info!(
            "Created workout {} '{}' with {} exercise(s) for user {}",
            workout.id,
            workout.title,
            exercise_ids.len(),
            user_id
        );

        Ok(CommitOutcome {
            workout,
            draft: draft.clone().clear(),
        })
    }

    /// Lists the user's workouts, most recent first.
    pub fn list_workouts(&self, user_id: i64) -> Result<Vec<Workout>, AppError> {
        db::list_workouts(&self.conn, user_id).map_err(Into::into)
    }

    /// Fetches one of the user's workouts with its exercises.
    /// # Errors
    /// `AppError::WorkoutNotFound` if it doesn't exist or belongs to someone else.
    pub fn get_workout_detail(&self, user_id: i64, workout_id: i64) -> Result<WorkoutDetail, AppError> {
        let workout = db::get_workout_by_id(&self.conn, workout_id)?
            .filter(|w| w.user_id == user_id)
            .ok_or(AppError::WorkoutNotFound(workout_id))?;
        let exercises = db::list_workout_exercises(&self.conn, workout.id)?;
        Ok(WorkoutDetail { workout, exercises })
    }
}
