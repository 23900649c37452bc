//! Field extraction from the text rendition of a record sheet.
//!
//! The converter keeps the sheet's visual layout as one text box per block, each box
//! followed by a blank line. The coordinate table therefore shows up as a column of row
//! labels right after the `Coordonnées` heading, and the zone, latitude and longitude
//! columns appear as separate boxes further down. A row's values are found by applying
//! its offset inside the label column to each of those boxes.

use crate::error::ParseError;
use crate::model::{
    ExtractionResult, NOTE_ELEVATION_NOT_FOUND, NOTE_NO_COORDINATES, NOTE_NO_ELEVATION,
};

pub const TABLE_MARKER: &str = "Coordonnées";
pub const PRIMARY_ROW: &str = "SCOPQ";
pub const OVERLAP_ROW: &str = "Recouv.";
pub const LATITUDE_HEADER: &str = " Latitude/y (m)";
pub const LONGITUDE_HEADER: &str = " Longitude/x (m)";
pub const ELEVATION_MARKER: &str = "Altitude orthométrique (m) :";

/// Removes every space and turns decimal commas into periods.
pub fn normalize(raw: &str) -> String {
    raw.replace(' ', "").replace(',', ".")
}

pub fn is_number(value: &str) -> bool {
    value.parse::<f64>().is_ok()
}

fn find_line(lines: &[&str], needle: &str) -> Option<usize> {
    lines.iter().position(|line| *line == needle)
}

fn require_line(lines: &[&str], needle: &'static str) -> Result<usize, ParseError> {
    find_line(lines, needle).ok_or(ParseError::MissingMarker(needle))
}

fn line_at<'a>(lines: &[&'a str], field: &'static str, index: usize) -> Result<&'a str, ParseError> {
    lines
        .get(index)
        .copied()
        .ok_or(ParseError::LineOutOfRange { field, index })
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Line offsets of the coordinate table, valid for one parse call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    pub table_start: usize,
    pub table_len: usize,
    pub primary_offset: usize,
    pub overlap_offset: Option<usize>,
    pub latitude_index: usize,
    pub longitude_index: usize,
}

impl TableLayout {
    /// `Ok(None)` when the sheet has no coordinate table at all.
    pub fn locate(lines: &[&str]) -> Result<Option<Self>, ParseError> {
        let table_start = match find_line(lines, TABLE_MARKER) {
            Some(marker) => marker + 1,
            None => return Ok(None),
        };

        let latitude_index = require_line(lines, LATITUDE_HEADER)?;
        let longitude_index = require_line(lines, LONGITUDE_HEADER)?;

        let table = lines.get(table_start..).unwrap_or_default();
        let table_len = require_line(table, "")?;
        let primary_offset = require_line(table, PRIMARY_ROW)?;
        let overlap_offset = find_line(table, OVERLAP_ROW);

        Ok(Some(Self {
            table_start,
            table_len,
            primary_offset,
            overlap_offset,
            latitude_index,
            longitude_index,
        }))
    }

    pub fn row_offsets(&self) -> impl Iterator<Item = usize> {
        std::iter::once(self.primary_offset).chain(self.overlap_offset)
    }

    /// Zone, y and x for the row at table-relative `offset`.
    fn coordinates(
        &self,
        lines: &[&str],
        offset: usize,
    ) -> Result<(Option<String>, Option<String>, Option<String>), ParseError> {
        // The zone box starts right after the table's blank terminator and carries two
        // header lines fewer than the label column.
        let zone_index = (self.table_start + self.table_len + offset)
            .checked_sub(1)
            .ok_or(ParseError::LineOutOfRange { field: "zone", index: 0 })?;
        let zone = line_at(lines, "zone", zone_index)?;
        let y = line_at(lines, "latitude", self.latitude_index + offset)?;
        let x = line_at(lines, "longitude", self.longitude_index + offset)?;
        Ok((
            non_empty(zone.to_string()),
            non_empty(normalize(y)),
            non_empty(normalize(x)),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Elevation {
    pub value: Option<String>,
    pub note: Option<&'static str>,
}

/// Looks for the orthometric elevation next to its label, below first, then above.
pub fn locate_elevation(lines: &[&str]) -> Elevation {
    let Some(marker) = find_line(lines, ELEVATION_MARKER) else {
        return Elevation {
            value: None,
            note: Some(NOTE_NO_ELEVATION),
        };
    };

    let below = lines.get(marker + 1);
    let above = marker.checked_sub(1).and_then(|i| lines.get(i));
    let value = [below, above]
        .into_iter()
        .flatten()
        .map(|line| normalize(line))
        .find(|candidate| is_number(candidate));

    match value {
        Some(value) => Elevation {
            value: Some(value),
            note: None,
        },
        None => Elevation {
            value: None,
            note: Some(NOTE_ELEVATION_NOT_FOUND),
        },
    }
}

/// Extracts one row per coordinate set of the sheet (one or two), or a single
/// `no coordinates` row when the sheet has no coordinate table.
pub fn extract_fxyz(identifier: &str, text: &str) -> Result<Vec<ExtractionResult>, ParseError> {
    let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    let elevation = locate_elevation(&lines);

    let Some(layout) = TableLayout::locate(&lines)? else {
        return Ok(vec![ExtractionResult::without_geometry(
            identifier,
            elevation.value,
            NOTE_NO_COORDINATES,
        )]);
    };

    layout
        .row_offsets()
        .map(|offset| {
            let (zone, y, x) = layout.coordinates(&lines, offset)?;
            Ok(ExtractionResult {
                identifier: identifier.to_string(),
                zone,
                y,
                x,
                elevation: elevation.value.clone(),
                note: elevation.note.map(str::to_string),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(rows: &[&str], zones: &[&str], ys: &[&str], xs: &[&str], tail: &[&str]) -> String {
        let mut lines = vec!["Fiche signalétique", "", "Coordonnées", "Type", "Système", "Datum"];
        lines.extend_from_slice(rows);
        lines.push("");
        lines.push("Fuseau");
        lines.extend_from_slice(zones);
        lines.push("");
        lines.push(LATITUDE_HEADER);
        lines.push("(NAD83)");
        lines.push("   ");
        lines.extend_from_slice(ys);
        lines.push("");
        lines.push(LONGITUDE_HEADER);
        lines.push("(NAD83)");
        lines.push("");
        lines.extend_from_slice(xs);
        lines.push("");
        lines.extend_from_slice(tail);
        lines.join("\n")
    }

    #[test]
    fn normalize_strips_spaces_and_commas() {
        assert_eq!(normalize("1 234,5"), "1234.5");
        assert_eq!(normalize(" -71,456 "), "-71.456");
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in ["1 234,5", "5 012 345,678", "abc", "", "12.5"] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn is_number_after_normalization() {
        assert!(is_number(&normalize("123,45")));
        assert!(is_number(&normalize("- 12")));
        assert!(!is_number(&normalize("Oui")));
        assert!(!is_number(""));
    }

    #[test]
    fn missing_table_marker_gives_single_blank_row() {
        let rows = extract_fxyz("12345", "Fiche\n\nAucune donnée\n").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].note.as_deref(), Some(NOTE_NO_COORDINATES));
        assert!(!rows[0].has_geometry());
        assert_eq!(rows[0].elevation, None);
    }

    #[test]
    fn elevation_is_reported_even_without_table() {
        let text = format!("Fiche\n{ELEVATION_MARKER}\n152,31\n");
        let rows = extract_fxyz("12345", &text).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].elevation.as_deref(), Some("152.31"));
        assert_eq!(rows[0].note.as_deref(), Some(NOTE_NO_COORDINATES));
    }

    #[test]
    fn primary_row_only() {
        let text = sheet(
            &["SCOPQ"],
            &["8"],
            &["5 012 345,678"],
            &["250 123,456"],
            &[ELEVATION_MARKER, "98,7"],
        );
        let rows = extract_fxyz("12345", &text).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].zone.as_deref(), Some("8"));
        assert_eq!(rows[0].y.as_deref(), Some("5012345.678"));
        assert_eq!(rows[0].x.as_deref(), Some("250123.456"));
        assert_eq!(rows[0].elevation.as_deref(), Some("98.7"));
        assert_eq!(rows[0].note, None);
    }

    #[test]
    fn overlap_row_yields_second_result() {
        let text = sheet(
            &["SCOPQ", "Recouv."],
            &["8", "7"],
            &["45,123", "46,001"],
            &["-71,456", "-72,002"],
            &[ELEVATION_MARKER, "10,0"],
        );
        let rows = extract_fxyz("12345", &text).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].zone.as_deref(), Some("8"));
        assert_eq!(rows[1].zone.as_deref(), Some("7"));
        assert_eq!(rows[0].y.as_deref(), Some("45.123"));
        assert_eq!(rows[1].y.as_deref(), Some("46.001"));
        assert_eq!(rows[0].x.as_deref(), Some("-71.456"));
        assert_eq!(rows[1].x.as_deref(), Some("-72.002"));
        assert_eq!(rows[0].elevation, rows[1].elevation);
        assert_eq!(rows[0].note, rows[1].note);
        assert_eq!(rows[0].identifier, rows[1].identifier);
    }

    #[test]
    fn layout_offsets_are_table_relative() {
        let text = sheet(&["SCOPQ", "Recouv."], &["8", "7"], &["1", "2"], &["3", "4"], &[]);
        let lines: Vec<&str> = text.lines().collect();
        let layout = TableLayout::locate(&lines).unwrap().unwrap();
        assert_eq!(layout.table_start, 3);
        assert_eq!(layout.table_len, 5);
        assert_eq!(layout.primary_offset, 3);
        assert_eq!(layout.overlap_offset, Some(4));
        assert_eq!(layout.row_offsets().collect::<Vec<_>>(), vec![3, 4]);
    }

    #[test]
    fn elevation_falls_back_to_preceding_line() {
        let text = sheet(
            &["SCOPQ"],
            &["8"],
            &["1"],
            &["2"],
            &["203,4", ELEVATION_MARKER, "CGVD28"],
        );
        let rows = extract_fxyz("1", &text).unwrap();
        assert_eq!(rows[0].elevation.as_deref(), Some("203.4"));
        assert_eq!(rows[0].note, None);
    }

    #[test]
    fn unreadable_elevation_keeps_geometry() {
        let text = sheet(
            &["SCOPQ"],
            &["8"],
            &["1"],
            &["2"],
            &["Précision", ELEVATION_MARKER, "Non disponible"],
        );
        let rows = extract_fxyz("1", &text).unwrap();
        assert_eq!(rows[0].elevation, None);
        assert_eq!(rows[0].note.as_deref(), Some(NOTE_ELEVATION_NOT_FOUND));
        assert_eq!(rows[0].y.as_deref(), Some("1"));
    }

    #[test]
    fn missing_elevation_marker_keeps_geometry() {
        let text = sheet(&["SCOPQ"], &["8"], &["1"], &["2"], &[]);
        let rows = extract_fxyz("1", &text).unwrap();
        assert_eq!(rows[0].note.as_deref(), Some(NOTE_NO_ELEVATION));
        assert_eq!(rows[0].x.as_deref(), Some("2"));
    }

    #[test]
    fn missing_primary_row_is_a_parse_error() {
        let text = sheet(&["NAD27"], &["8"], &["1"], &["2"], &[]);
        assert_eq!(
            extract_fxyz("1", &text),
            Err(ParseError::MissingMarker(PRIMARY_ROW))
        );
    }

    #[test]
    fn missing_latitude_header_is_a_parse_error() {
        let text = "Coordonnées\nSCOPQ\n\n8\n Longitude/x (m)\n1\n";
        assert_eq!(
            extract_fxyz("1", text),
            Err(ParseError::MissingMarker(LATITUDE_HEADER))
        );
    }

    #[test]
    fn offsets_past_end_of_text_are_reported() {
        let text = format!("{LATITUDE_HEADER}\n{LONGITUDE_HEADER}\nCoordonnées\nSCOPQ\n");
        // The blank terminator is the only thing missing here.
        assert_eq!(
            extract_fxyz("1", &text),
            Err(ParseError::MissingMarker(""))
        );

        let text = format!("Coordonnées\nX\nY\nSCOPQ\n\n{LATITUDE_HEADER}\n{LONGITUDE_HEADER}");
        assert!(matches!(
            extract_fxyz("1", &text),
            Err(ParseError::LineOutOfRange { .. })
        ));
    }

    #[test]
    fn trailing_whitespace_does_not_hide_markers() {
        let text = sheet(&["SCOPQ"], &["8"], &["1"], &["2"], &[])
            .replace("Coordonnées", "Coordonnées   ")
            .replace("SCOPQ", "SCOPQ\t");
        let rows = extract_fxyz("1", &text).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].has_geometry());
    }
}
