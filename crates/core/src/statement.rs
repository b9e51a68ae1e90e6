use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported bank statement file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementFormat {
    Csv,
    Camt053,
    Mt940,
    Pdf,
}

impl fmt::Display for StatementFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementFormat::Csv => write!(f, "csv"),
            StatementFormat::Camt053 => write!(f, "camt053"),
            StatementFormat::Mt940 => write!(f, "mt940"),
            StatementFormat::Pdf => write!(f, "pdf"),
        }
    }
}

impl std::str::FromStr for StatementFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(StatementFormat::Csv),
            "camt053" | "camt" | "xml" => Ok(StatementFormat::Camt053),
            "mt940" | "sta" => Ok(StatementFormat::Mt940),
            "pdf" => Ok(StatementFormat::Pdf),
            other => Err(format!("Unknown statement format: '{other}'")),
        }
    }
}

/// One import unit: a parsed statement file. Immutable after creation
/// except for the processing flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankStatement {
    pub id: Option<i64>,
    pub organization_id: String,
    pub bank_account_id: i64,

    pub statement_number: Option<String>,
    pub format: StatementFormat,
    pub statement_date: DateTime<Utc>,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,

    pub opening_balance: Decimal,
    pub closing_balance: Decimal,
    pub total_debits: Decimal,
    pub total_credits: Decimal,
    pub transaction_count: usize,

    pub file_name: String,
    /// SHA-256 of the raw upload bytes; the dedup key for repeat imports.
    pub file_hash: String,

    pub is_processed: bool,
    pub processed_at: Option<DateTime<Utc>>,

    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub imported_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_display_round_trips() {
        for fmt in [
            StatementFormat::Csv,
            StatementFormat::Camt053,
            StatementFormat::Mt940,
            StatementFormat::Pdf,
        ] {
            let parsed: StatementFormat = fmt.to_string().parse().unwrap();
            assert_eq!(parsed, fmt);
        }
    }

    #[test]
    fn format_parse_aliases() {
        assert_eq!("XML".parse::<StatementFormat>().unwrap(), StatementFormat::Camt053);
        assert_eq!("sta".parse::<StatementFormat>().unwrap(), StatementFormat::Mt940);
        assert!("ofx".parse::<StatementFormat>().is_err());
    }
}
