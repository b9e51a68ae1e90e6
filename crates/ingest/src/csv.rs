//! CSV statement decoder. Tolerates unknown schemas (header synonym
//! resolution), bank preamble lines before the header, legacy single-byte
//! encodings, and Excel workbooks masquerading as CSV.

use concilia_core::{BankStatement, BankTransaction, StatementFormat};
use chrono::Utc;
use rust_decimal::Decimal;

use crate::error::DecodeError;
use crate::excel;
use crate::normalize::{resolve_column, ColumnKey};
use crate::normalize::NormalizedRow;
use crate::parser::ImportContext;
use crate::rows::{transaction_from_row, RowOptions, StatementAccumulator};

const HEADER_KEYWORDS: &[&str] = &[
    "date", "transaction", "amount", "debit", "credit", "balance", "description", "details",
    "reference",
];
const DELIMITERS: &[char] = &[',', ';', '\t', '|'];

pub fn decode_csv(
    ctx: &ImportContext<'_>,
    bytes: &[u8],
) -> Result<(BankStatement, Vec<BankTransaction>), DecodeError> {
    let content = if excel::is_excel_payload(bytes, ctx.file_name) {
        excel::worksheet_to_csv(bytes)?
    } else {
        decode_text(bytes)?
    };

    let content = content.replace("\r\n", "\n").replace('\r', "\n");
    let content = strip_leading_metadata(&content);
    let delimiter = sniff_delimiter(content.lines().next().unwrap_or(""));

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.to_string())
        .collect();
    let columns: Vec<Option<ColumnKey>> = headers.iter().map(|h| resolve_column(h)).collect();

    let mut transactions = Vec::new();
    let mut acc = StatementAccumulator::default();
    let mut row_errors: Vec<String> = Vec::new();
    let options = RowOptions { require_date: false };

    for (idx, record) in reader.records().enumerate() {
        let row_num = idx + 1;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(format!("Row {row_num}: {e}"));
                tracing::warn!(row = row_num, error = %e, "skipping malformed CSV record");
                continue;
            }
        };
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        let row = NormalizedRow::from_record(&columns, record.iter());
        let raw = raw_row_json(&headers, &record);

        match transaction_from_row(ctx, &row, raw, "EUR", &options) {
            Ok(built) => {
                acc.observe(&built);
                transactions.push(built.transaction);
            }
            Err(e) => {
                row_errors.push(format!("Row {row_num}: {e}"));
                tracing::warn!(row = row_num, error = %e, "skipping CSV row");
            }
        }
    }

    if transactions.is_empty() {
        let sample = if row_errors.is_empty() {
            "No parsable rows found.".to_string()
        } else {
            row_errors
                .iter()
                .take(3)
                .cloned()
                .collect::<Vec<_>>()
                .join("; ")
        };
        return Err(DecodeError::NoTransactions(sample));
    }

    if !row_errors.is_empty() {
        tracing::warn!(
            skipped = row_errors.len(),
            sample = %row_errors.iter().take(3).cloned().collect::<Vec<_>>().join("; "),
            "CSV parsing skipped rows with validation errors"
        );
    }

    let now = Utc::now();
    let today = now.date_naive();
    let statement = BankStatement {
        id: None,
        organization_id: ctx.organization_id.to_string(),
        bank_account_id: ctx.bank_account_id,
        statement_number: None,
        format: StatementFormat::Csv,
        statement_date: now,
        from_date: acc.min_date.unwrap_or(today),
        to_date: acc.max_date.unwrap_or(today),
        opening_balance: acc.opening_balance.unwrap_or(Decimal::ZERO),
        closing_balance: acc.closing_balance.unwrap_or(Decimal::ZERO),
        total_debits: acc.total_debits,
        total_credits: acc.total_credits,
        transaction_count: transactions.len(),
        file_name: ctx.file_name.to_string(),
        file_hash: ctx.file_hash.to_string(),
        is_processed: false,
        processed_at: None,
        currency: acc.currency.unwrap_or_else(|| "EUR".to_string()),
        created_at: now,
        imported_by: ctx.imported_by.map(str::to_string),
    };

    Ok((statement, transactions))
}

/// Decode upload bytes to text: UTF-8 (BOM tolerated) first, then the
/// WINDOWS-1252 family that covers latin-1 / iso-8859-1 / cp1252 exports.
fn decode_text(bytes: &[u8]) -> Result<String, DecodeError> {
    let bytes = bytes.strip_prefix(b"\xef\xbb\xbf".as_slice()).unwrap_or(bytes);
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(text.to_string());
    }
    let (decoded, _, had_errors) = encoding_rs::WINDOWS_1252.decode(bytes);
    if had_errors {
        return Err(DecodeError::Encoding);
    }
    tracing::info!("decoded CSV with windows-1252 fallback encoding");
    Ok(decoded.into_owned())
}

/// Drop bank-specific preamble lines so the parse starts at the real
/// header: the first line containing both a delimiter and a header keyword.
fn strip_leading_metadata(content: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    for (idx, line) in lines.iter().enumerate() {
        let lower = line.to_lowercase();
        let has_delimiter = DELIMITERS.iter().any(|d| line.contains(*d));
        let has_keyword = HEADER_KEYWORDS.iter().any(|kw| lower.contains(kw));
        if has_delimiter && has_keyword {
            if idx > 0 {
                tracing::info!(skipped = idx, "skipped metadata lines before CSV header");
            }
            return lines[idx..].join("\n");
        }
    }
    content.to_string()
}

/// Pick the most frequent of the known delimiters on the header line.
fn sniff_delimiter(header_line: &str) -> u8 {
    DELIMITERS
        .iter()
        .map(|d| (*d, header_line.matches(*d).count()))
        .max_by_key(|(_, count)| *count)
        .filter(|(_, count)| *count > 0)
        .map(|(d, _)| d as u8)
        .unwrap_or(b',')
}

fn raw_row_json(
    headers: &[String],
    record: &csv::StringRecord,
) -> serde_json::Map<String, serde_json::Value> {
    let mut map = serde_json::Map::new();
    for (header, value) in headers.iter().zip(record.iter()) {
        if header.trim().is_empty() {
            continue;
        }
        map.insert(
            header.clone(),
            serde_json::Value::String(value.to_string()),
        );
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use concilia_core::TransactionType;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn ctx<'a>() -> ImportContext<'a> {
        ImportContext {
            organization_id: "org-1",
            bank_account_id: 7,
            file_name: "statement.csv",
            file_hash: "deadbeef",
            imported_by: Some("tester"),
        }
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn signed_amount_column_basic() {
        let data = b"date,amount,description\n2024-01-05,-42.00,Office Supplies\n";
        let (stmt, txs) = decode_csv(&ctx(), data).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].transaction_type, TransactionType::Debit);
        assert_eq!(txs[0].amount, dec("42.00"));
        assert_eq!(txs[0].description.as_deref(), Some("Office Supplies"));
        assert_eq!(stmt.total_debits, dec("42.00"));
        assert_eq!(stmt.total_credits, Decimal::ZERO);
        assert_eq!(stmt.transaction_count, 1);
        assert_eq!(stmt.from_date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
    }

    #[test]
    fn debit_credit_columns() {
        let data = b"Date,Debit,Credit,Balance\n05/01/2024,50.00,,950.00\n06/01/2024,,200.00,1150.00\n";
        let (stmt, txs) = decode_csv(&ctx(), data).unwrap();
        assert_eq!(txs[0].transaction_type, TransactionType::Debit);
        assert_eq!(txs[0].amount, dec("50.00"));
        assert_eq!(txs[1].transaction_type, TransactionType::Credit);
        assert_eq!(txs[1].amount, dec("200.00"));
        assert_eq!(stmt.opening_balance, dec("950.00"));
        assert_eq!(stmt.closing_balance, dec("1150.00"));
    }

    #[test]
    fn metadata_preamble_is_stripped() {
        let data = b"Acme Bank plc\nAccount: 00012345\n\nDate,Amount,Description\n2024-02-01,10.00,Interest\n";
        let (_, txs) = decode_csv(&ctx(), data).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].transaction_type, TransactionType::Credit);
    }

    #[test]
    fn semicolon_delimiter_with_comma_decimals() {
        let data = b"Date;Amount;Description\n2024-02-01;-5,50;Fee\n";
        let (_, txs) = decode_csv(&ctx(), data).unwrap();
        assert_eq!(txs[0].amount, dec("5.50"));
        assert_eq!(txs[0].transaction_type, TransactionType::Debit);
    }

    #[test]
    fn bad_rows_are_skipped_not_fatal() {
        let data =
            b"date,amount,description\n2024-01-05,not-a-number,junk\n2024-01-06,12.00,ok\n";
        let (_, txs) = decode_csv(&ctx(), data).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].amount, dec("12.00"));
    }

    #[test]
    fn zero_valid_rows_fails_naming_columns() {
        let data = b"date,description\n2024-01-05,no amount here\n";
        let err = decode_csv(&ctx(), data).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Available columns"), "{msg}");
        assert!(msg.contains("description"), "{msg}");
    }

    #[test]
    fn unparseable_date_defaults_with_flag() {
        let data = b"date,amount\nsometime,10.00\n";
        let (_, txs) = decode_csv(&ctx(), data).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].raw_data.get("date_defaulted"), Some(&serde_json::Value::Bool(true)));
    }

    #[test]
    fn latin1_bytes_decode() {
        // "Café" in latin-1; invalid as UTF-8.
        let data = b"date,amount,description\n2024-01-05,-9.00,Caf\xe9\n";
        let (_, txs) = decode_csv(&ctx(), data).unwrap();
        assert_eq!(txs[0].description.as_deref(), Some("Café"));
    }

    #[test]
    fn raw_data_preserves_original_row() {
        let data = b"Txn Date,Amount,Narration\n2024-01-05,-42.00,Supplies\n";
        let (_, txs) = decode_csv(&ctx(), data).unwrap();
        assert_eq!(
            txs[0].raw_data.get("Narration"),
            Some(&serde_json::Value::String("Supplies".to_string()))
        );
    }
}
