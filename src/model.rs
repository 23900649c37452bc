use anyhow::{Context, Result};
use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

pub const OUTPUT_HEADER: [&str; 6] = ["matricule_repere", "fuseau", "y", "x", "z", "Note"];

/// Written in place of any absent field.
pub const BLANK: &str = " ";

pub const NOTE_NO_COORDINATES: &str = "no coordinates";
pub const NOTE_NO_ELEVATION: &str = "no elevation";
pub const NOTE_ELEVATION_NOT_FOUND: &str = "elevation exists but not found";
pub const NOTE_DOWNLOAD_FAILED: &str = "download failed";

/// One output row for one coordinate set of one record sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    pub identifier: String,
    pub zone: Option<String>,
    pub y: Option<String>,
    pub x: Option<String>,
    pub elevation: Option<String>,
    pub note: Option<String>,
}

impl ExtractionResult {
    /// A row with no geometry at all, explained by `note`.
    pub fn without_geometry(identifier: &str, elevation: Option<String>, note: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            zone: None,
            y: None,
            x: None,
            elevation,
            note: Some(note.to_string()),
        }
    }

    pub fn failed(identifier: &str) -> Self {
        Self::without_geometry(identifier, None, NOTE_DOWNLOAD_FAILED)
    }

    pub fn has_geometry(&self) -> bool {
        self.zone.is_some() || self.y.is_some() || self.x.is_some()
    }

    /// Fields in output column order, blanks already substituted.
    pub fn to_record(&self) -> [String; 6] {
        [
            sanitize_field(Some(&self.identifier)),
            sanitize_field(self.zone.as_deref()),
            sanitize_field(self.y.as_deref()),
            sanitize_field(self.x.as_deref()),
            sanitize_field(self.elevation.as_deref()),
            sanitize_field(self.note.as_deref()),
        ]
    }
}

// Unquoted TSV: a stray tab or newline would shift every following column.
fn sanitize_field(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => v.replace(['\t', '\r', '\n'], " "),
        _ => BLANK.to_string(),
    }
}

/// Reads the identifier list, one per line. Trailing whitespace (including a `\r` left by
/// CRLF files) is dropped and whitespace-only lines are skipped.
pub fn read_identifiers(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open identifier list: {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut identifiers = Vec::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line.with_context(|| {
            format!("Failed to read line {} of {}", line_num + 1, path.display())
        })?;
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            debug!("Skipping blank line {} in {}", line_num + 1, path.display());
            continue;
        }
        identifiers.push(trimmed.to_string());
    }
    Ok(identifiers)
}
