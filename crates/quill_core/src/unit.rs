use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One chapter to generate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub number: u32,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Unit {
    pub fn new(number: u32, title: impl Into<String>) -> Self {
        Self {
            number,
            title: title.into(),
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Content of an already completed unit, sent as generation input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub number: u32,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OutlineError {
    #[error("outline has no units")]
    Empty,
    #[error("unit numbers must be positive (got 0 for '{title}')")]
    ZeroNumber { title: String },
    #[error("unit number {0} appears more than once")]
    DuplicateNumber(u32),
}

/// Validated, ordered list of units supplied before a run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Outline {
    pub units: Vec<Unit>,
}

impl Outline {
    /// Validate and sort units by number.
    pub fn new(mut units: Vec<Unit>) -> Result<Self, OutlineError> {
        if units.is_empty() {
            return Err(OutlineError::Empty);
        }
        let mut seen = BTreeSet::new();
        for unit in &units {
            if unit.number == 0 {
                return Err(OutlineError::ZeroNumber {
                    title: unit.title.clone(),
                });
            }
            if !seen.insert(unit.number) {
                return Err(OutlineError::DuplicateNumber(unit.number));
            }
        }
        units.sort_by_key(|unit| unit.number);
        Ok(Self { units })
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
