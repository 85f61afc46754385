use crate::layout::{field, SUBMISSION_BASE_COLUMNS};
use crate::{Record, RecordSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const LABEL_WIDTH: usize = 20;
pub const MAX_POPULATED_CELLS: usize = 13;
/// Matches the text already sitting in existing sheets, trailing space and all.
pub const TOO_MUCH_DATA: &str =
    "Too much data to display \nUse ctr + f to find persons data\nin Interest Form or Data Entry sheet";

/// A submission sheet as read from the spreadsheet: a header row and the
/// data rows below it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionSheet {
    pub header: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionLayout {
    /// Names of the leading columns, in sheet order.
    pub base_columns: Vec<&'static str>,
    /// Index of the first free-text column.
    pub boundary: usize,
    /// Field the compiled free text is written to.
    pub output_field: &'static str,
    pub label_width: usize,
    pub max_populated: usize,
}

impl SubmissionLayout {
    pub fn interest_form() -> Self {
        Self::with_output(field::INTEREST_FORM_RESPONSES)
    }

    pub fn data_entry() -> Self {
        Self::with_output(field::DATA_ENTRY_DATA)
    }

    fn with_output(output_field: &'static str) -> Self {
        Self {
            base_columns: SUBMISSION_BASE_COLUMNS.to_vec(),
            boundary: SUBMISSION_BASE_COLUMNS.len(),
            output_field,
            label_width: LABEL_WIDTH,
            max_populated: MAX_POPULATED_CELLS,
        }
    }

    fn email_column(&self) -> Option<usize> {
        self.base_columns
            .iter()
            .position(|column| *column == field::EMAIL)
    }
}

/// Collapses every submission for one email into a single record carrying the
/// base fields of the first submission plus one display cell of all the
/// free-text answers. Output order is first appearance.
pub fn compile_submissions(sheet: &SubmissionSheet, layout: &SubmissionLayout) -> RecordSet {
    let Some(email_column) = layout.email_column() else {
        return RecordSet::new();
    };

    let mut order: Vec<Vec<String>> = Vec::new();
    let mut by_email: HashMap<String, usize> = HashMap::new();

    for row in &sheet.rows {
        let email = row
            .get(email_column)
            .map(|cell| cell.trim())
            .unwrap_or_default();
        if email.is_empty() {
            continue;
        }

        match by_email.get(email) {
            Some(&idx) => join_trailing_cells(&mut order[idx], row, layout.boundary),
            None => {
                by_email.insert(email.to_string(), order.len());
                order.push(row.clone());
            }
        }
    }

    order
        .into_iter()
        .map(|row| compiled_record(&sheet.header, row, layout))
        .collect()
}

/// Renders the display cell for one compiled row: `label: value` per populated
/// free-text column, newline terminated, in column order.
pub fn concatenate_fields(
    header: &[String],
    row: &[String],
    layout: &SubmissionLayout,
) -> String {
    let populated = row.iter().filter(|cell| !cell.is_empty()).count();
    if populated > layout.max_populated {
        return TOO_MUCH_DATA.to_string();
    }

    let mut text = String::new();
    for (idx, value) in row.iter().enumerate().skip(layout.boundary) {
        if value.is_empty() {
            continue;
        }
        let label = header
            .get(idx)
            .map(|label| truncate_chars(label, layout.label_width))
            .unwrap_or_default();
        text.push_str(label);
        text.push_str(": ");
        text.push_str(value);
        text.push('\n');
    }
    text
}

fn join_trailing_cells(existing: &mut Vec<String>, row: &[String], boundary: usize) {
    if existing.len() < row.len() {
        existing.resize(row.len(), String::new());
    }
    for (idx, value) in row.iter().enumerate().skip(boundary) {
        if value.is_empty() {
            continue;
        }
        let cell = &mut existing[idx];
        if cell.is_empty() {
            cell.push_str(value);
        } else {
            cell.push_str(", ");
            cell.push_str(value);
        }
    }
}

fn compiled_record(header: &[String], row: Vec<String>, layout: &SubmissionLayout) -> Record {
    let display = concatenate_fields(header, &row, layout);
    let mut record = Record::new(String::new());
    for (idx, column) in layout.base_columns.iter().enumerate() {
        let value = row.get(idx).map(|cell| cell.trim()).unwrap_or_default();
        record.set(*column, value);
    }
    record.set(layout.output_field, display);
    record
}

fn truncate_chars(value: &str, width: usize) -> &str {
    match value.char_indices().nth(width) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn sheet(rows: Vec<Vec<String>>) -> SubmissionSheet {
        SubmissionSheet {
            header: cells(&[
                "Timestamp",
                "First Name",
                "Last Name",
                "Email Address",
                "Phone Number",
                "Zipcode",
                "Birth Year",
                "What issues do you care about most?",
                "Availability",
            ]),
            rows,
        }
    }

    #[test]
    fn merges_repeat_submissions_and_labels_answers() {
        let compiled = compile_submissions(
            &sheet(vec![
                cells(&[
                    "03/01/2026 10:00:00",
                    "Ana",
                    "Reyes",
                    "ana@example.org",
                    "555",
                    "19104",
                    "1999",
                    "transit",
                    "",
                ]),
                cells(&["", "", "", "bo@example.org", "", "", "", "", "weekends"]),
                cells(&[
                    "03/09/2026 10:00:00",
                    "Ana B",
                    "",
                    "ana@example.org",
                    "",
                    "",
                    "",
                    "housing",
                    "evenings",
                ]),
            ]),
            &SubmissionLayout::interest_form(),
        );

        assert_eq!(compiled.len(), 2);
        let ana = &compiled.as_slice()[0];
        assert_eq!(ana.email(), "ana@example.org");
        assert_eq!(ana.get(field::FIRST_NAME), "Ana");
        assert_eq!(ana.get(field::DATE_JOINED), "03/01/2026 10:00:00");
        assert_eq!(
            ana.get(field::INTEREST_FORM_RESPONSES),
            "What issues do you c: transit, housing\nAvailability: evenings\n"
        );
        assert_eq!(
            compiled.as_slice()[1].get(field::INTEREST_FORM_RESPONSES),
            "Availability: weekends\n"
        );
    }

    #[test]
    fn skips_rows_without_email() {
        let compiled = compile_submissions(
            &sheet(vec![cells(&["", "Nobody", "", "  ", "", "", "", "x", ""])]),
            &SubmissionLayout::data_entry(),
        );
        assert!(compiled.is_empty());
    }

    #[test]
    fn oversized_rows_get_placeholder() {
        let mut header = Vec::new();
        let mut row = Vec::new();
        for idx in 0..16 {
            header.push(format!("Question {idx}"));
            row.push(format!("answer {idx}"));
        }
        row[3] = "big@example.org".to_string();
        let compiled = compile_submissions(
            &SubmissionSheet {
                header,
                rows: vec![row],
            },
            &SubmissionLayout::data_entry(),
        );

        assert_eq!(
            compiled.as_slice()[0].get(field::DATA_ENTRY_DATA),
            "Too much data to display \nUse ctr + f to find persons data\nin Interest Form or Data Entry sheet"
        );
    }

    #[test]
    fn labels_follow_source_column_order() {
        let layout = SubmissionLayout::interest_form();
        let header = cells(&["", "", "", "", "", "", "", "a", "b", "c"]);
        let row = cells(&["", "", "", "x@example.org", "", "", "", "1", "2", "3"]);
        let text = concatenate_fields(&header, &row, &layout);

        let a = text.find("a: ").expect("a label");
        let b = text.find("b: ").expect("b label");
        let c = text.find("c: ").expect("c label");
        assert!(a < b && b < c);
    }
}
