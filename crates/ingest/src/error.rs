use thiserror::Error;

/// Failure of a single format decoder. The orchestrator collects these per
/// attempted format; none of them escape to the caller on their own.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Could not decode file with any supported encoding")]
    Encoding,
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Excel error: {0}")]
    Excel(String),
    #[error("XML error: {0}")]
    Xml(String),
    #[error("MT940 error: {0}")]
    Mt940(String),
    #[error("PDF error: {0}")]
    Pdf(String),
    #[error("No valid transactions were parsed. {0}")]
    NoTransactions(String),
}

/// Row-level validation failure. Bad rows are skipped and logged; they only
/// become a decoder failure when a whole file produces zero transactions.
#[derive(Debug, Clone, Error)]
pub enum RowError {
    #[error(
        "Unable to determine transaction amount (missing amount/credit/debit values). \
         Available columns: {available}"
    )]
    AmountMissing { available: String },
    #[error("Missing transaction date")]
    MissingDate,
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}
