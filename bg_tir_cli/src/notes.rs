use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::wallclock;

/// Free-text label pinned to a moment, drawn on charts.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Note {
    pub at: f64,
    pub text: String,
}

#[derive(Deserialize)]
struct RawNote {
    date: String,
    text: String,
}

/// Notes file: a JSON array of `{"date": ..., "text": ...}` objects.
pub fn load_notes(path: &Path) -> Result<Vec<Note>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read notes {}", path.display()))?;
    parse_notes(&text).with_context(|| format!("failed to parse notes {}", path.display()))
}

pub fn parse_notes(text: &str) -> Result<Vec<Note>> {
    let raw: Vec<RawNote> = serde_json::from_str(text).context("notes must be a JSON array")?;
    raw.into_iter()
        .map(|note| {
            let at = wallclock::parse(&note.date)
                .ok_or_else(|| anyhow!("invalid note date '{}'", note.date))?;
            Ok(Note {
                at: wallclock::to_seconds(at),
                text: note.text,
            })
        })
        .collect()
}
