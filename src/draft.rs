//! In-progress workout drafts.
//!
//! A draft is never held by the server between requests. Every request of the
//! creation flow rebuilds it from the client's cookie with [`DraftBuffer::load`],
//! applies at most one operation and writes the serialized result back. All
//! operations take the old buffer by value and return the new one.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::db::Exercise;

/// Serialized format version. Bump when `DraftEntry` changes shape.
pub const DRAFT_FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum DraftError {
    #[error("Draft state could not be parsed: {0}")]
    MalformedDraftState(#[from] serde_json::Error),
    #[error("Unsupported draft format version {0}")]
    UnsupportedVersion(u32),
    #[error("Draft state could not be encoded: {0}")]
    Encode(#[source] serde_json::Error),
}

/// One line of the draft: a removal key plus a snapshot of the exercise as it
/// was when it was added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftEntry {
    pub key: String,
    #[serde(flatten)]
    pub exercise: Exercise,
}

impl DraftEntry {
    pub fn exercise_id(&self) -> i64 {
        self.exercise.id
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DraftBuffer {
    entries: Vec<DraftEntry>,
}

#[derive(Serialize, Deserialize)]
struct DraftPayload {
    version: u32,
    exercises: Vec<DraftEntry>,
}

impl DraftBuffer {
    /// Rebuilds a buffer from previously serialized state.
    /// Absent or malformed state degrades to an empty buffer.
    pub fn load(existing: Option<&str>) -> Self {
        match existing {
            None => Self::default(),
            Some(raw) => Self::deserialize(raw).unwrap_or_else(|e| {
                warn!("Discarding unreadable draft state: {}", e);
                Self::default()
            }),
        }
    }

    pub fn entries(&self) -> &[DraftEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends a snapshot of `exercise` under a freshly generated key.
    pub fn append(self, exercise: Exercise) -> Self {
        let mut key = new_key();
        while self.contains_key(&key) {
            key = new_key();
        }
        self.append_entry(DraftEntry { key, exercise })
    }

    /// Appends an entry whose key the caller already generated.
    /// An entry whose key is already present is ignored.
    pub fn append_entry(mut self, entry: DraftEntry) -> Self {
        if !self.contains_key(&entry.key) {
            self.entries.push(entry);
        }
        self
    }

    /// Drops the entry with `key`. Unknown keys leave the buffer unchanged.
    pub fn remove(mut self, key: &str) -> Self {
        if let Some(index) = self.entries.iter().position(|e| e.key == key) {
            self.entries.remove(index);
        }
        self
    }

    pub fn clear(self) -> Self {
        Self::default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.key == key)
    }

    /// Distinct exercise IDs in order of first appearance.
    pub fn distinct_exercise_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            if !ids.contains(&entry.exercise_id()) {
                ids.push(entry.exercise_id());
            }
        }
        ids
    }

    pub fn serialize(&self) -> Result<String, DraftError> {
        let payload = DraftPayload {
            version: DRAFT_FORMAT_VERSION,
            exercises: self.entries.clone(),
        };
        serde_json::to_string(&payload).map_err(DraftError::Encode)
    }

    pub fn deserialize(raw: &str) -> Result<Self, DraftError> {
        let payload: DraftPayload = serde_json::from_str(raw)?;
        if payload.version != DRAFT_FORMAT_VERSION {
            return Err(DraftError::UnsupportedVersion(payload.version));
        }
        Ok(payload
            .exercises
            .into_iter()
            .fold(Self::default(), Self::append_entry))
    }
}

fn new_key() -> String {
    Uuid::new_v4().simple().to_string()
}
