//! Form submissions parsed into closed sets of intents.
//!
//! Each page that accepts a POST has one enum listing everything it can be
//! asked to do. Parsing checks the `_action` discriminator and the fields that
//! action needs, so handlers only ever see well-formed requests.

use std::collections::HashMap;
use strum::IntoEnumIterator;

use crate::db::Unit;
use crate::error::AppError;

pub type FormFields = HashMap<String, String>;

const ACTION_FIELD: &str = "_action";

/// Validated fields for a brand-new exercise.
#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseFields {
    pub name: String,
    pub load: Option<f64>,
    pub unit: Option<Unit>,
    pub repetitions: Option<i64>,
}

impl ExerciseFields {
    /// Parses the raw text of the "new exercise" form.
    ///
    /// Blank `load`, `unit` and `repetitions` mean "not supplied" and are
    /// stored as NULL rather than zero.
    ///
    /// # Errors
    /// `AppError::Validation` naming the first offending field.
    pub fn parse(
        name: &str,
        load: Option<&str>,
        unit: Option<&str>,
        repetitions: Option<&str>,
    ) -> Result<Self, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::validation("exerciseName", "Exercise name is required"));
        }

        let load = match non_blank(load) {
            None => None,
            Some(raw) => match raw.parse::<f64>() {
                Ok(value) if value.is_finite() => Some(value),
                _ => return Err(AppError::validation("load", format!("'{raw}' is not a number"))),
            },
        };

        let unit = match non_blank(unit) {
            None => None,
            Some(raw) => Some(raw.parse::<Unit>().map_err(|_| {
                let known: Vec<String> = Unit::iter().map(|u| u.to_string()).collect();
                AppError::validation(
                    "unity",
                    format!("Unknown unit '{raw}', expected one of: {}", known.join(", ")),
                )
            })?),
        };

        let repetitions = match non_blank(repetitions) {
            None => None,
            Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
                AppError::validation("repetitions", format!("'{raw}' is not a whole number"))
            })?),
        };

        Ok(Self {
            name: name.to_string(),
            load,
            unit,
            repetitions,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn field<'a>(form: &'a FormFields, name: &str) -> Option<&'a str> {
    form.get(name).map(String::as_str)
}

fn required<'a>(form: &'a FormFields, name: &'static str) -> Result<&'a str, AppError> {
    non_blank(field(form, name)).ok_or_else(|| AppError::validation(name, format!("{name} is required")))
}

fn action(form: &FormFields) -> Result<&str, AppError> {
    non_blank(field(form, ACTION_FIELD))
        .ok_or_else(|| AppError::validation(ACTION_FIELD, "No action given"))
}

/// Everything the workout creation page can ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftIntent {
    /// Drop one staged exercise by its draft key.
    Remove { key: String },
    /// Save the staged exercises as a workout.
    Commit { title: String },
    /// Throw the draft away.
    Cancel,
}

impl DraftIntent {
    pub fn from_form(form: &FormFields) -> Result<Self, AppError> {
        match action(form)? {
            "remove" => Ok(DraftIntent::Remove {
                key: required(form, "key")?.to_string(),
            }),
            "create" => Ok(DraftIntent::Commit {
                title: field(form, "title").unwrap_or_default().trim().to_string(),
            }),
            "cancel" => Ok(DraftIntent::Cancel),
            other => Err(AppError::validation(
                ACTION_FIELD,
                format!("Unknown action '{other}'"),
            )),
        }
    }
}

/// Everything the "add exercise" page can ask for. Both carry the title the
/// user has typed so far so it survives the redirect back.
#[derive(Debug, Clone, PartialEq)]
pub enum ExerciseIntent {
    Add { workout: String, exercise_id: i64 },
    Create { workout: String, fields: ExerciseFields },
}

impl ExerciseIntent {
    pub fn from_form(form: &FormFields) -> Result<Self, AppError> {
        let workout = field(form, "workout").unwrap_or_default().to_string();
        match action(form)? {
            "add" => {
                // The picker posts `exercise[id]`; plain forms may use `exerciseId`.
                let raw = non_blank(field(form, "exercise[id]"))
                    .or_else(|| non_blank(field(form, "exerciseId")))
                    .ok_or_else(|| AppError::validation("exercise", "Choose an exercise"))?;
                let exercise_id = raw
                    .parse::<i64>()
                    .map_err(|_| AppError::validation("exercise", "Invalid exercise"))?;
                Ok(ExerciseIntent::Add {
                    workout,
                    exercise_id,
                })
            }
            "create" => Ok(ExerciseIntent::Create {
                workout,
                fields: ExerciseFields::parse(
                    field(form, "exerciseName").unwrap_or_default(),
                    field(form, "load"),
                    field(form, "unity"),
                    field(form, "repetitions"),
                )?,
            }),
            other => Err(AppError::validation(
                ACTION_FIELD,
                format!("Unknown action '{other}'"),
            )),
        }
    }

    pub fn workout_title(&self) -> &str {
        match self {
            ExerciseIntent::Add { workout, .. } | ExerciseIntent::Create { workout, .. } => workout,
        }
    }
}
