//! LibreView CSV exports.
//!
//! The first line names the account that produced the export, the second is
//! the header row. Columns are located by header name.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use bg_tir::Sample;

use crate::notes::Note;
use crate::wallclock;

const DEVICE_TIMESTAMP: &str = "Device Timestamp";
const HISTORIC_GLUCOSE: &str = "Historic Glucose mg/dL";
const SCAN_GLUCOSE: &str = "Scan Glucose mg/dL";
const NOTES: &str = "Notes";

/// Line number of the first data row, for error messages.
const FIRST_DATA_LINE: usize = 3;

#[derive(Clone, Debug, Default)]
pub struct Export {
    pub samples: Vec<Sample>,
    pub notes: Vec<Note>,
    /// Rows without a glucose reading (insulin, food, note-only rows).
    pub skipped: usize,
}

pub fn load_export(path: &Path) -> Result<Export> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_export(&text).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn parse_export(text: &str) -> Result<Export> {
    let body = text
        .split_once('\n')
        .map(|(_, rest)| rest)
        .ok_or_else(|| anyhow!("missing header row"))?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(body.as_bytes());
    let headers = reader.headers().context("unreadable header row")?.clone();
    let column = |name: &str| headers.iter().position(|h| h.trim() == name);

    let ts_col = column(DEVICE_TIMESTAMP)
        .ok_or_else(|| anyhow!("missing '{}' column", DEVICE_TIMESTAMP))?;
    // Scan readings take precedence over the periodic historic ones.
    let value_cols: Vec<usize> = [column(SCAN_GLUCOSE), column(HISTORIC_GLUCOSE)]
        .into_iter()
        .flatten()
        .collect();
    if value_cols.is_empty() {
        return Err(anyhow!(
            "missing '{}' and '{}' columns",
            SCAN_GLUCOSE,
            HISTORIC_GLUCOSE
        ));
    }
    let notes_col = column(NOTES);

    let mut export = Export::default();
    for (idx, record) in reader.records().enumerate() {
        let line = idx + FIRST_DATA_LINE;
        let record = record.with_context(|| format!("malformed row on line {}", line))?;
        let raw_ts = record.get(ts_col).unwrap_or("").trim();
        if raw_ts.is_empty() {
            export.skipped += 1;
            continue;
        }
        let at = wallclock::parse(raw_ts)
            .ok_or_else(|| anyhow!("line {}: invalid timestamp '{}'", line, raw_ts))?;
        let t = wallclock::to_seconds(at);

        match value_cols
            .iter()
            .find_map(|&col| record.get(col).and_then(parse_reading))
        {
            Some(value) => export.samples.push(Sample::new(t, value)),
            None => export.skipped += 1,
        }

        if let Some(text) = notes_col
            .and_then(|col| record.get(col))
            .map(str::trim)
            .filter(|text| !text.is_empty())
        {
            export.notes.push(Note {
                at: t,
                text: text.to_string(),
            });
        }
    }
    Ok(export)
}

fn parse_reading(raw: &str) -> Option<f64> {
    let value: f64 = raw.trim().parse().ok()?;
    value.is_finite().then_some(value)
}
