// src/db.rs
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Mass unit attached to an exercise load.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Unit {
    Kg,
    Lb,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub load: Option<f64>,
    pub unit: Option<Unit>,
    pub repetitions: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Already validated input for a new exercise row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewExercise {
    pub user_id: i64,
    pub name: String,
    pub load: Option<f64>,
    pub unit: Option<Unit>,
    pub repetitions: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workout {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database connection failed")]
    Connection(#[from] rusqlite::Error),
    #[error("Failed to get application data directory")]
    DataDir,
    #[error("I/O error accessing database file")]
    Io(#[from] std::io::Error),
    #[error("Exercise not found: ID {0}")]
    ExerciseNotFound(i64),
    #[error("Workout not found: ID {0}")]
    WorkoutNotFound(i64),
    #[error("User not found: ID {0}")]
    UserNotFound(i64),
    #[error("A user already exists with email '{0}'")]
    EmailTaken(String),
    #[error("Database query failed: {0}")]
    QueryFailed(rusqlite::Error),
    #[error("Database insert failed: {0}")]
    InsertFailed(rusqlite::Error),
}

const DB_FILE_NAME: &str = "gym.sqlite";
const APP_DATA_DIR: &str = "gym-app";

/// Gets the path to the SQLite database file within the app's data directory.
/// Creates the directory if it doesn't exist.
pub fn get_db_path() -> Result<PathBuf, DbError> {
    let data_dir = dirs::data_dir().ok_or(DbError::DataDir)?;
    let app_dir = data_dir.join(APP_DATA_DIR);
    if !app_dir.exists() {
        std::fs::create_dir_all(&app_dir)?;
    }
    Ok(app_dir.join(DB_FILE_NAME))
}

/// Opens a connection to the SQLite database.
pub fn open_db<P: AsRef<Path>>(path: P) -> Result<Connection, DbError> {
    Connection::open(path).map_err(DbError::Connection)
}

/// Initializes the database tables if they don't exist.
pub fn init_db(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE COLLATE NOCASE,
            name TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL           -- RFC3339
        );

        CREATE TABLE IF NOT EXISTS exercises (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id),
            name TEXT NOT NULL,                -- duplicates allowed per user
            load REAL,
            unit TEXT CHECK(unit IN ('kg', 'lb')),
            repetitions INTEGER,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_exercises_user ON exercises(user_id);

        CREATE TABLE IF NOT EXISTS workouts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id),
            title TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_workouts_user ON workouts(user_id);

        CREATE TABLE IF NOT EXISTS workout_exercises (
            workout_id INTEGER NOT NULL REFERENCES workouts(id),
            exercise_id INTEGER NOT NULL REFERENCES exercises(id),
            position INTEGER NOT NULL,
            PRIMARY KEY (workout_id, exercise_id)
        );",
    )
    .map_err(DbError::Connection)
}

fn parse_timestamp(value: &str, column: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

// ---- Users ----

fn map_row_to_user(row: &Row) -> Result<User, rusqlite::Error> {
    let created_at: String = row.get(3)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        created_at: parse_timestamp(&created_at, 3)?,
    })
}

/// Inserts a new user. The email must not be registered yet (case-insensitive).
pub fn create_user(
    conn: &Connection,
    name: &str,
    email: &str,
    password_hash: &str,
) -> Result<User, DbError> {
    let created_at = Utc::now();
    let result = conn.execute(
        "INSERT INTO users (email, name, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![email, name, password_hash, created_at.to_rfc3339()],
    );

    match result {
        Ok(_) => Ok(User {
            id: conn.last_insert_rowid(),
            email: email.to_string(),
            name: name.to_string(),
            created_at,
        }),
        Err(rusqlite::Error::SqliteFailure(ref err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(DbError::EmailTaken(email.to_string()))
        }
        Err(e) => Err(DbError::InsertFailed(e)),
    }
}

/// Retrieves a user and their stored password hash by email (case-insensitive).
pub fn get_user_credentials(
    conn: &Connection,
    email: &str,
) -> Result<Option<(User, String)>, DbError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, email, name, created_at, password_hash FROM users WHERE email = ?1 COLLATE NOCASE",
        )
        .map_err(DbError::QueryFailed)?;
    stmt.query_row(params![email], |row| {
        Ok((map_row_to_user(row)?, row.get::<_, String>(4)?))
    })
    .optional()
    .map_err(DbError::QueryFailed)
}

/// Retrieves a user by ID.
pub fn get_user_by_id(conn: &Connection, id: i64) -> Result<Option<User>, DbError> {
    let mut stmt = conn
        .prepare("SELECT id, email, name, created_at FROM users WHERE id = ?1")
        .map_err(DbError::QueryFailed)?;
    stmt.query_row(params![id], map_row_to_user)
        .optional()
        .map_err(DbError::QueryFailed)
}

// ---- Exercises ----

const EXERCISE_COLUMNS: &str = "id, user_id, name, load, unit, repetitions, created_at";

// Helper to map row to Exercise, handling a unit string the enum doesn't know
fn map_row_to_exercise(row: &Row) -> Result<Exercise, rusqlite::Error> {
    let unit_str: Option<String> = row.get(4)?;
    let unit = unit_str
        .map(|s| {
            s.parse::<Unit>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    4,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })
        })
        .transpose()?;
    let created_at: String = row.get(6)?;

    Ok(Exercise {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        load: row.get(3)?,
        unit,
        repetitions: row.get(5)?,
        created_at: parse_timestamp(&created_at, 6)?,
    })
}

/// Creates a new exercise row and returns it. Never deduplicates.
pub fn create_exercise(conn: &Connection, new: &NewExercise) -> Result<Exercise, DbError> {
    let created_at = Utc::now();
    conn.execute(
        "INSERT INTO exercises (user_id, name, load, unit, repetitions, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            new.user_id,
            new.name,
            new.load,
            new.unit.map(|u| u.to_string()),
            new.repetitions,
            created_at.to_rfc3339()
        ],
    )
    .map_err(DbError::InsertFailed)?;

    Ok(Exercise {
        id: conn.last_insert_rowid(),
        user_id: new.user_id,
        name: new.name.clone(),
        load: new.load,
        unit: new.unit,
        repetitions: new.repetitions,
        created_at,
    })
}

/// Retrieves an exercise by its ID.
pub fn get_exercise_by_id(conn: &Connection, id: i64) -> Result<Option<Exercise>, DbError> {
    let mut stmt = conn
        .prepare(&format!("SELECT {EXERCISE_COLUMNS} FROM exercises WHERE id = ?1"))
        .map_err(DbError::QueryFailed)?;
    stmt.query_row(params![id], map_row_to_exercise)
        .optional()
        .map_err(DbError::QueryFailed)
}

/// Lists every exercise owned by a user, ordered by name then ID.
pub fn list_exercises(conn: &Connection, user_id: i64) -> Result<Vec<Exercise>, DbError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {EXERCISE_COLUMNS} FROM exercises WHERE user_id = ?1 ORDER BY name ASC, id ASC"
        ))
        .map_err(DbError::QueryFailed)?;
    let exercise_iter = stmt
        .query_map(params![user_id], map_row_to_exercise)
        .map_err(DbError::QueryFailed)?;

    let mut exercises = Vec::new();
    for exercise_result in exercise_iter {
        exercises.push(exercise_result.map_err(DbError::QueryFailed)?);
    }
    Ok(exercises)
}

// ---- Workouts ----

fn map_row_to_workout(row: &Row) -> Result<Workout, rusqlite::Error> {
    let created_at: String = row.get(3)?;
    Ok(Workout {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: parse_timestamp(&created_at, 3)?,
    })
}

/// Creates a workout linked to `exercise_ids` in one transaction.
///
/// `exercise_ids` must already be distinct; their slice order becomes the
/// stored `position`. Every ID has to name an exercise owned by `user_id`,
/// otherwise nothing is written and `ExerciseNotFound` is returned.
pub fn create_workout(
    conn: &mut Connection,
    user_id: i64,
    title: &str,
    exercise_ids: &[i64],
) -> Result<Workout, DbError> {
    let created_at = Utc::now();
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO workouts (user_id, title, created_at) VALUES (?1, ?2, ?3)",
        params![user_id, title, created_at.to_rfc3339()],
    )
    .map_err(DbError::InsertFailed)?;
    let workout_id = tx.last_insert_rowid();

    {
        let mut owner_stmt = tx
            .prepare("SELECT user_id FROM exercises WHERE id = ?1")
            .map_err(DbError::QueryFailed)?;
        let mut link_stmt = tx
            .prepare(
                "INSERT INTO workout_exercises (workout_id, exercise_id, position) VALUES (?1, ?2, ?3)",
            )
            .map_err(DbError::QueryFailed)?;

        for (position, exercise_id) in exercise_ids.iter().enumerate() {
            let owner: Option<i64> = owner_stmt
                .query_row(params![exercise_id], |row| row.get(0))
                .optional()
                .map_err(DbError::QueryFailed)?;
            if owner != Some(user_id) {
                // Dropping `tx` without commit rolls the workout row back
                return Err(DbError::ExerciseNotFound(*exercise_id));
            }
            link_stmt
                .execute(params![workout_id, exercise_id, position as i64])
                .map_err(DbError::InsertFailed)?;
        }
    }

    tx.commit()?;

    Ok(Workout {
        id: workout_id,
        user_id,
        title: title.to_string(),
        created_at,
    })
}

/// Retrieves a workout by its ID.
pub fn get_workout_by_id(conn: &Connection, id: i64) -> Result<Option<Workout>, DbError> {
    let mut stmt = conn
        .prepare("SELECT id, user_id, title, created_at FROM workouts WHERE id = ?1")
        .map_err(DbError::QueryFailed)?;
    stmt.query_row(params![id], map_row_to_workout)
        .optional()
        .map_err(DbError::QueryFailed)
}

/// Lists a user's workouts, most recent first.
pub fn list_workouts(conn: &Connection, user_id: i64) -> Result<Vec<Workout>, DbError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, user_id, title, created_at FROM workouts
             WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
        )
        .map_err(DbError::QueryFailed)?;
    let workout_iter = stmt
        .query_map(params![user_id], map_row_to_workout)
        .map_err(DbError::QueryFailed)?;

    let mut workouts = Vec::new();
    for workout_result in workout_iter {
        workouts.push(workout_result.map_err(DbError::QueryFailed)?);
    }
    Ok(workouts)
}

/// Lists the exercises linked to a workout in their stored position order.
pub fn list_workout_exercises(
    conn: &Connection,
    workout_id: i64,
) -> Result<Vec<Exercise>, DbError> {
    let mut stmt = conn
        .prepare(
            "SELECT e.id, e.user_id, e.name, e.load, e.unit, e.repetitions, e.created_at
             FROM workout_exercises we
             JOIN exercises e ON e.id = we.exercise_id
             WHERE we.workout_id = ?1
             ORDER BY we.position ASC",
        )
        .map_err(DbError::QueryFailed)?;
    let exercise_iter = stmt
        .query_map(params![workout_id], map_row_to_exercise)
        .map_err(DbError::QueryFailed)?;

    let mut exercises = Vec::new();
    for exercise_result in exercise_iter {
        exercises.push(exercise_result.map_err(DbError::QueryFailed)?);
    }
    Ok(exercises)
}
