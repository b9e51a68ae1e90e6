//! Excel workbooks uploaded as "CSV". Banks routinely export .xlsx and let
//! users rename it; the CSV decoder detects the ZIP container and converts
//! the first worksheet before running its normal path.

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::io::Cursor;

use crate::error::DecodeError;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const CONTENT_TYPES_MARKER: &[u8] = b"[Content_Types].xml";
const EXCEL_EXTENSIONS: &[&str] = &[".xlsx", ".xlsm", ".xlsb", ".xls"];

/// Is this upload actually a spreadsheet? Extension first, then the OOXML
/// signature: a ZIP container carrying `[Content_Types].xml`.
pub fn is_excel_payload(bytes: &[u8], file_name: &str) -> bool {
    let name = file_name.to_lowercase();
    if EXCEL_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
        return true;
    }

    bytes.starts_with(ZIP_MAGIC)
        && bytes
            .windows(CONTENT_TYPES_MARKER.len())
            .any(|w| w == CONTENT_TYPES_MARKER)
}

/// Render the first worksheet as a CSV string for the standard CSV path.
pub fn worksheet_to_csv(bytes: &[u8]) -> Result<String, DecodeError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| DecodeError::Excel(format!("Failed to read Excel file: {e}")))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| DecodeError::Excel("Workbook has no worksheets".to_string()))?
        .map_err(|e| DecodeError::Excel(format!("Failed to read first worksheet: {e}")))?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut rows_written = 0usize;
    for row in range.rows() {
        let record: Vec<String> = row.iter().map(cell_to_string).collect();
        writer
            .write_record(&record)
            .map_err(|e| DecodeError::Excel(e.to_string()))?;
        rows_written += 1;
    }

    if rows_written == 0 {
        return Err(DecodeError::Excel(
            "Excel file does not contain any rows to import".to_string(),
        ));
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| DecodeError::Excel(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| DecodeError::Excel(e.to_string()))
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}
