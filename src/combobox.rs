//! Typeahead matching for the exercise pickers.

use crate::db::Exercise;

/// Anything the picker can list by a display name.
pub trait Candidate {
    fn label(&self) -> &str;
}

impl Candidate for Exercise {
    fn label(&self) -> &str {
        &self.name
    }
}

impl Candidate for String {
    fn label(&self) -> &str {
        self
    }
}

impl Candidate for &str {
    fn label(&self) -> &str {
        self
    }
}

fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Whether `label` matches `query`, ignoring case and all whitespace.
pub fn matches(label: &str, query: &str) -> bool {
    normalize(label).contains(&normalize(query))
}

/// Keeps the candidates matching `query`, in their original order.
/// A blank query keeps everything.
pub fn filter<'a, T: Candidate>(candidates: &'a [T], query: &str) -> Vec<&'a T> {
    let needle = normalize(query);
    candidates
        .iter()
        .filter(|c| needle.is_empty() || normalize(c.label()).contains(&needle))
        .collect()
}
