//! Parse orchestration. Detects the likely format, tries its decoder, and
//! falls back to the remaining candidates when decoding fails. Every
//! attempted format and its failure reason is kept so the final error names
//! everything that was tried.

use concilia_core::{BankStatement, BankTransaction, StatementFormat};

use crate::error::DecodeError;
use crate::{camt053, csv, detect, hash, mt940, pdf};

/// Per-file context threaded through the decoders.
#[derive(Debug, Clone, Copy)]
pub struct ImportContext<'a> {
    pub organization_id: &'a str,
    pub bank_account_id: i64,
    pub file_name: &'a str,
    pub file_hash: &'a str,
    pub imported_by: Option<&'a str>,
}

/// One failed decode attempt.
#[derive(Debug)]
pub struct FormatAttempt {
    pub format: StatementFormat,
    pub error: DecodeError,
}

/// All candidate formats failed. Carries every attempt in order.
#[derive(Debug)]
pub struct ParseError {
    pub attempts: Vec<FormatAttempt>,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let formats: Vec<String> = self.attempts.iter().map(|a| a.format.to_string()).collect();
        let details: Vec<String> = self
            .attempts
            .iter()
            .map(|a| format!("{}: {}", a.format, a.error))
            .collect();
        write!(
            f,
            "Failed to parse bank statement. Tried formats: {}. Details: {}",
            formats.join(", "),
            details.join("; ")
        )
    }
}

impl std::error::Error for ParseError {}

pub struct StatementParser {
    organization_id: String,
    bank_account_id: i64,
}

impl StatementParser {
    pub fn new(organization_id: &str, bank_account_id: i64) -> Self {
        StatementParser {
            organization_id: organization_id.to_string(),
            bank_account_id,
        }
    }

    /// Parse a raw statement file. The hint (usually from a user's explicit
    /// format selection) is tried first, then the sniffed format, then any
    /// remaining candidates. A decoder that returns zero transactions counts
    /// as a failure and triggers fallback.
    pub fn parse_file(
        &self,
        bytes: &[u8],
        file_name: &str,
        format_hint: Option<StatementFormat>,
        imported_by: Option<&str>,
    ) -> Result<(BankStatement, Vec<BankTransaction>), ParseError> {
        let file_hash = hash::sha256_hex(bytes);
        let ctx = ImportContext {
            organization_id: &self.organization_id,
            bank_account_id: self.bank_account_id,
            file_name,
            file_hash: &file_hash,
            imported_by,
        };

        let candidates = detect::candidate_formats(bytes, file_name, format_hint);
        tracing::debug!(file = file_name, ?candidates, "parsing bank statement");

        let mut attempts = Vec::new();
        for format in candidates {
            match decode(format, &ctx, bytes) {
                Ok((statement, transactions)) => {
                    tracing::info!(
                        file = file_name,
                        %format,
                        transactions = transactions.len(),
                        "parsed bank statement"
                    );
                    return Ok((statement, transactions));
                }
                Err(error) => {
                    tracing::debug!(file = file_name, %format, %error, "decoder failed, trying next format");
                    attempts.push(FormatAttempt { format, error });
                }
            }
        }

        Err(ParseError { attempts })
    }
}

fn decode(
    format: StatementFormat,
    ctx: &ImportContext<'_>,
    bytes: &[u8],
) -> Result<(BankStatement, Vec<BankTransaction>), DecodeError> {
    match format {
        StatementFormat::Csv => csv::decode_csv(ctx, bytes),
        StatementFormat::Camt053 => camt053::decode_camt053(ctx, bytes),
        StatementFormat::Mt940 => mt940::decode_mt940(ctx, bytes),
        StatementFormat::Pdf => pdf::decode_pdf(ctx, bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concilia_core::TransactionType;
    use rust_decimal::Decimal;

    const MT940_TEXT: &str = "\
:20:REF01
:25:ACCT/1
:28C:1/1
:60F:C240101EUR100,00
:61:240105C50,00NTRFINV-9
:86:PAYMENT INV-9
:62F:C240131EUR150,00";

    #[test]
    fn csv_parses_on_first_attempt() {
        let data = b"Date,Description,Amount\n2024-01-05,Invoice INV-1,100.00\n";
        let parser = StatementParser::new("org-1", 1);
        let (stmt, txs) = parser.parse_file(data, "jan.csv", None, None).unwrap();
        assert_eq!(stmt.format, StatementFormat::Csv);
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].amount, Decimal::new(10000, 2));
    }

    #[test]
    fn mt940_content_in_csv_named_file_falls_back() {
        // Extension says CSV, content says MT940. The CSV decoder fails
        // (no usable rows) and the MT940 decoder is tried next.
        let parser = StatementParser::new("org-1", 1);
        let (stmt, txs) = parser
            .parse_file(MT940_TEXT.as_bytes(), "export.csv", None, None)
            .unwrap();
        assert_eq!(stmt.format, StatementFormat::Mt940);
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].transaction_type, TransactionType::Credit);
    }

    #[test]
    fn hint_is_tried_first() {
        let parser = StatementParser::new("org-1", 1);
        let (stmt, _) = parser
            .parse_file(
                MT940_TEXT.as_bytes(),
                "export.dat",
                Some(StatementFormat::Mt940),
                None,
            )
            .unwrap();
        assert_eq!(stmt.format, StatementFormat::Mt940);
    }

    #[test]
    fn multibyte_statement_line_yields_error_not_panic() {
        let text = "\
:20:REF01
:25:ACCT/1
:60F:C240101EUR100,00
:61:24010é5C50,00NTRF
:62F:C240131EUR150,00";
        let parser = StatementParser::new("org-1", 1);
        let err = parser
            .parse_file(text.as_bytes(), "export.sta", None, None)
            .unwrap_err();
        assert!(err
            .attempts
            .iter()
            .any(|a| a.format == StatementFormat::Mt940));
    }

    #[test]
    fn all_failures_are_reported() {
        let parser = StatementParser::new("org-1", 1);
        let err = parser
            .parse_file(b"not a statement at all", "junk.csv", None, None)
            .unwrap_err();
        assert!(!err.attempts.is_empty());
        let msg = err.to_string();
        assert!(msg.starts_with("Failed to parse bank statement. Tried formats:"));
        assert!(msg.contains("csv"));
    }

    #[test]
    fn file_hash_is_attached_to_statement() {
        let data = b"Date,Description,Amount\n2024-01-05,X,1.00\n";
        let parser = StatementParser::new("org-1", 1);
        let (stmt, _) = parser.parse_file(data, "a.csv", None, None).unwrap();
        assert_eq!(stmt.file_hash, crate::hash::sha256_hex(data));
        assert_eq!(stmt.file_name, "a.csv");
    }
}
