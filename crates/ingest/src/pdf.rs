//! PDF statement decoder. Text is extracted with `pdf_extract`, then a
//! best-effort table reconstruction splits lines on runs of whitespace and
//! looks for a header row with recognizable column names. PDF layouts vary
//! wildly, so failures here produce an actionable message rather than a
//! guess.

use chrono::Utc;
use concilia_core::{BankStatement, BankTransaction, StatementFormat, TransactionType};
use rust_decimal::Decimal;

use crate::error::DecodeError;
use crate::normalize::{self, ColumnKey, NormalizedRow};
use crate::parser::ImportContext;
use crate::rows::{transaction_from_row, RowOptions, StatementAccumulator};

const MIN_TABLE_ROWS: usize = 2;

/// Split a text line into cells on runs of two or more spaces (or tabs).
/// Extracted PDF text preserves column gaps as wide whitespace.
pub(crate) fn split_cells(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut space_run = 0usize;
    for ch in line.chars() {
        if ch == '\t' {
            if !current.is_empty() {
                cells.push(std::mem::take(&mut current));
            }
            space_run = 0;
        } else if ch == ' ' {
            space_run += 1;
            if space_run >= 2 {
                if !current.trim().is_empty() {
                    cells.push(current.trim().to_string());
                }
                current.clear();
            } else {
                current.push(ch);
            }
        } else {
            space_run = 0;
            current.push(ch);
        }
    }
    if !current.trim().is_empty() {
        cells.push(current.trim().to_string());
    }
    cells
}

fn is_header_row(cells: &[String]) -> bool {
    if cells.len() < 2 {
        return false;
    }
    let recognized = cells
        .iter()
        .filter(|c| matches!(normalize::resolve_column(c), Some(k) if !matches!(k, ColumnKey::Other(_))))
        .count();
    recognized >= 2
}

/// Find the first plausible transaction table in extracted text: a header
/// row with at least two recognizable column names, followed by data rows
/// of a compatible width.
pub(crate) fn tables_from_text(text: &str) -> Option<(Vec<String>, Vec<Vec<String>>)> {
    let lines: Vec<&str> = text.lines().collect();
    let mut idx = 0;
    while idx < lines.len() {
        let cells = split_cells(lines[idx]);
        if is_header_row(&cells) {
            let width = cells.len();
            let mut rows = Vec::new();
            for line in &lines[idx + 1..] {
                let row = split_cells(line);
                if row.is_empty() {
                    if !rows.is_empty() {
                        break;
                    }
                    continue;
                }
                // Tolerate ragged rows within one cell of the header width.
                if row.len() + 1 >= width && row.len() <= width + 1 {
                    rows.push(row);
                } else if !rows.is_empty() {
                    break;
                }
            }
            if !rows.is_empty() {
                return Some((cells, rows));
            }
        }
        idx += 1;
    }
    None
}

/// Decode already-extracted PDF text. Split out from [`decode_pdf`] so the
/// table logic is testable without binary PDF fixtures.
pub fn decode_pdf_text(
    ctx: &ImportContext<'_>,
    text: &str,
) -> Result<(BankStatement, Vec<BankTransaction>), DecodeError> {
    let (header_cells, data_rows) = tables_from_text(text).ok_or_else(|| {
        DecodeError::Pdf(
            "Could not locate a transaction table in the PDF text. \
             If the statement is available as CSV or CAMT.053, import that instead."
                .to_string(),
        )
    })?;

    if data_rows.len() + 1 < MIN_TABLE_ROWS {
        return Err(DecodeError::Pdf(
            "PDF transaction table too short to be usable.".to_string(),
        ));
    }

    let headers: Vec<Option<ColumnKey>> = header_cells
        .iter()
        .map(|h| normalize::resolve_column(h))
        .collect();

    let now = Utc::now();
    let mut transactions = Vec::new();
    let mut accumulator = StatementAccumulator::default();
    let mut errors: Vec<String> = Vec::new();

    for (i, cells) in data_rows.iter().enumerate() {
        let row = NormalizedRow::from_record(&headers, cells.iter().map(String::as_str));
        let mut raw = serde_json::Map::new();
        for (key, value) in header_cells.iter().zip(cells.iter()) {
            raw.insert(key.clone(), serde_json::Value::String(value.clone()));
        }
        match transaction_from_row(ctx, &row, raw, "EUR", &RowOptions { require_date: true }) {
            Ok(built) => {
                accumulator.observe(&built);
                transactions.push(built.transaction);
            }
            Err(e) => errors.push(format!("Row {}: {}", i + 1, e)),
        }
    }

    if transactions.is_empty() {
        let sample = errors
            .iter()
            .take(3)
            .cloned()
            .collect::<Vec<_>>()
            .join("; ");
        return Err(DecodeError::NoTransactions(format!(
            "No transactions could be extracted from the PDF table. {sample}"
        )));
    }
    if !errors.is_empty() {
        tracing::warn!(
            skipped = errors.len(),
            parsed = transactions.len(),
            "some PDF table rows could not be parsed"
        );
    }

    let today = now.date_naive();
    let statement = BankStatement {
        id: None,
        organization_id: ctx.organization_id.to_string(),
        bank_account_id: ctx.bank_account_id,
        statement_number: None,
        format: StatementFormat::Pdf,
        statement_date: now,
        from_date: accumulator.min_date.unwrap_or(today),
        to_date: accumulator.max_date.unwrap_or(today),
        opening_balance: accumulator.opening_balance.unwrap_or(Decimal::ZERO),
        closing_balance: accumulator.closing_balance.unwrap_or(Decimal::ZERO),
        total_debits: accumulator.total_debits,
        total_credits: accumulator.total_credits,
        transaction_count: transactions.len(),
        file_name: ctx.file_name.to_string(),
        file_hash: ctx.file_hash.to_string(),
        is_processed: false,
        processed_at: None,
        currency: accumulator.currency.clone().unwrap_or_else(|| "EUR".to_string()),
        created_at: now,
        imported_by: ctx.imported_by.map(str::to_string),
    };

    Ok((statement, transactions))
}

pub fn decode_pdf(
    ctx: &ImportContext<'_>,
    bytes: &[u8],
) -> Result<(BankStatement, Vec<BankTransaction>), DecodeError> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| DecodeError::Pdf(format!("failed to extract PDF text: {e}")))?;
    if text.trim().is_empty() {
        return Err(DecodeError::Pdf(
            "PDF contains no extractable text (possibly a scanned image). \
             Import the statement as CSV or CAMT.053 instead."
                .to_string(),
        ));
    }
    decode_pdf_text(ctx, &text)
}
