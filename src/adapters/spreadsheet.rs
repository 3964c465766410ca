//! Recipient extraction from uploaded spreadsheets.
//!
//! The first row is treated as the header. The address column is picked by name, falling
//! back to the first column, and its values are trimmed, deduplicated in first-seen order
//! and filtered down to e-mail shaped strings.

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use std::collections::HashSet;
use std::io::Cursor;
use thiserror::Error;

const ADDRESS_HEADERS: [&str; 6] = ["email", "mail", "email_address", "emailaddress", "e-mail", "email address"];
const WORKBOOK_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xls", "xlsb", "ods"];
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Invalid file format. Please upload an Excel or CSV file")]
    UnsupportedFormat,
    #[error("{0}")]
    Parse(String),
    #[error("No valid email addresses found in the file")]
    NoRecipients,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SheetFormat {
    Delimited,
    Workbook,
}

impl SheetFormat {
    fn from_filename(filename: &str) -> Option<Self> {
        let (_, extension) = filename.trim().rsplit_once('.')?;
        let extension = extension.to_ascii_lowercase();
        if extension == "csv" {
            Some(Self::Delimited)
        } else if WORKBOOK_EXTENSIONS.contains(&extension.as_str()) {
            Some(Self::Workbook)
        } else {
            None
        }
    }
}

/// Returns `true` if the filename has an extension the extractor can read.
#[must_use]
pub fn is_supported(filename: &str) -> bool {
    SheetFormat::from_filename(filename).is_some()
}

/// Extracts the ordered, deduplicated recipient list from an uploaded file.
///
/// # Errors
/// Returns `ExtractError::UnsupportedFormat` for unknown extensions,
/// `ExtractError::Parse` if the content is not valid tabular data and
/// `ExtractError::NoRecipients` if no e-mail shaped value survives filtering.
pub fn extract_recipients(filename: &str, content: &[u8]) -> Result<Vec<String>, ExtractError> {
    let format = SheetFormat::from_filename(filename).ok_or(ExtractError::UnsupportedFormat)?;
    let table = match format {
        SheetFormat::Delimited => read_delimited(content)?,
        SheetFormat::Workbook => read_workbook(content)?,
    };

    let recipients = recipients_from_table(&table);
    if recipients.is_empty() {
        return Err(ExtractError::NoRecipients);
    }
    tracing::debug!(count = recipients.len(), rows = table.len(), "Recipients extracted");
    Ok(recipients)
}

fn read_delimited(content: &[u8]) -> Result<Vec<Vec<String>>, ExtractError> {
    let content = content.strip_prefix(UTF8_BOM).unwrap_or(content);
    let mut reader = csv::ReaderBuilder::new().has_headers(false).flexible(true).from_reader(content);

    let mut table = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ExtractError::Parse(e.to_string()))?;
        table.push(record.iter().map(ToString::to_string).collect());
    }

    if table.is_empty() {
        return Err(ExtractError::Parse("No columns to parse from file".into()));
    }
    Ok(table)
}

fn read_workbook(content: &[u8]) -> Result<Vec<Vec<String>>, ExtractError> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(content.to_vec())).map_err(|e| ExtractError::Parse(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ExtractError::Parse("Workbook contains no worksheets".into()))?
        .map_err(|e| ExtractError::Parse(e.to_string()))?;

    let table: Vec<Vec<String>> = range.rows().map(|row| row.iter().map(cell_to_string).collect()).collect();

    if table.is_empty() {
        return Err(ExtractError::Parse("No columns to parse from file".into()));
    }
    Ok(table)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        other => other.to_string(),
    }
}

/// Applies column selection, trimming, dedup and the e-mail shape filter to a table whose
/// first row is the header.
pub(crate) fn recipients_from_table(table: &[Vec<String>]) -> Vec<String> {
    let Some((header, rows)) = table.split_first() else {
        return Vec::new();
    };
    let column = address_column(header);

    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(|row| row.get(column))
        .map(|cell| cell.trim())
        .filter(|value| !value.is_empty())
        .filter(|value| seen.insert(value.to_string()))
        .filter(|value| looks_like_address(value))
        .map(ToString::to_string)
        .collect()
}

fn address_column(header: &[String]) -> usize {
    header
        .iter()
        .position(|name| {
            let name = name.trim().to_lowercase();
            ADDRESS_HEADERS.contains(&name.as_str())
        })
        .unwrap_or(0)
}

fn looks_like_address(value: &str) -> bool {
    value.contains('@') && value.contains('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter().map(|row| row.iter().map(ToString::to_string).collect()).collect()
    }

    #[test]
    fn test_dedups_and_filters_email_column() {
        let csv = b"Email\na@x.com\na@x.com\n\nbad\n";
        assert_eq!(extract_recipients("list.csv", csv).unwrap(), vec!["a@x.com"]);
    }

    #[test]
    fn test_preserves_first_seen_order() {
        let t = table(&[&["email"], &["c@x.com"], &["a@x.com"], &["c@x.com"], &["b@x.com"], &["a@x.com"]]);
        assert_eq!(recipients_from_table(&t), vec!["c@x.com", "a@x.com", "b@x.com"]);
    }

    #[test]
    fn test_header_match_is_case_insensitive() {
        let t = table(&[&["Name", "E-Mail"], &["Ann", "ann@x.com"], &["Bob", "bob@x.com"]]);
        assert_eq!(recipients_from_table(&t), vec!["ann@x.com", "bob@x.com"]);

        let t = table(&[&["name", "EMAIL_ADDRESS"], &["Ann", "ann@x.com"]]);
        assert_eq!(recipients_from_table(&t), vec!["ann@x.com"]);
    }

    #[test]
    fn test_falls_back_to_first_column() {
        let csv = b"Contact,Name\nann@x.com,Ann\nbob@x.com,Bob\n";
        assert_eq!(extract_recipients("people.CSV", csv).unwrap(), vec!["ann@x.com", "bob@x.com"]);
    }

    #[test]
    fn test_trims_before_deduplicating() {
        let t = table(&[&["mail"], &["  a@x.com"], &["a@x.com  "], &["\tb@x.com"]]);
        assert_eq!(recipients_from_table(&t), vec!["a@x.com", "b@x.com"]);
    }

    #[test]
    fn test_short_rows_are_skipped() {
        let csv = b"Name,Email\nAnn,ann@x.com\nBob\nCid,cid@x.com\n";
        assert_eq!(extract_recipients("list.csv", csv).unwrap(), vec!["ann@x.com", "cid@x.com"]);
    }

    #[test]
    fn test_byte_order_mark_is_ignored() {
        let csv = b"\xEF\xBB\xBFEmail\nann@x.com\n";
        assert_eq!(extract_recipients("list.csv", csv).unwrap(), vec!["ann@x.com"]);
    }

    #[test]
    fn test_no_recipients_after_filtering() {
        let csv = b"Email\nnot-an-address\n\n";
        assert_eq!(extract_recipients("list.csv", csv), Err(ExtractError::NoRecipients));
    }

    #[test]
    fn test_header_only_has_no_recipients() {
        assert_eq!(extract_recipients("list.csv", b"Email\n"), Err(ExtractError::NoRecipients));
    }

    #[test]
    fn test_empty_file_is_a_parse_error() {
        assert!(matches!(extract_recipients("list.csv", b""), Err(ExtractError::Parse(_))));
    }

    #[test]
    fn test_garbage_workbook_is_a_parse_error() {
        let result = extract_recipients("list.xlsx", b"definitely not a zip archive");
        assert!(matches!(result, Err(ExtractError::Parse(_))));
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        assert_eq!(extract_recipients("list.pdf", b"Email\na@x.com\n"), Err(ExtractError::UnsupportedFormat));
        assert_eq!(extract_recipients("no_extension", b"Email\na@x.com\n"), Err(ExtractError::UnsupportedFormat));
        assert!(is_supported("Contacts.XLSX"));
        assert!(is_supported("contacts.ods"));
    }
}
