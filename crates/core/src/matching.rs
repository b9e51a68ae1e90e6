use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::transaction::MatchStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    Automated,
    Manual,
}

impl std::fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchMethod::Automated => write!(f, "automated"),
            MatchMethod::Manual => write!(f, "manual"),
        }
    }
}

/// A transaction↔invoice pairing. Match records are audit history: an
/// unmatch resets the transaction but never deletes these rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInvoiceMatch {
    pub id: Option<i64>,
    pub organization_id: String,

    pub transaction_id: i64,
    pub invoice_id: Option<String>,
    pub voucher_id: Option<String>,

    pub match_status: MatchStatus,
    /// Confidence score in [0, 100].
    pub match_score: f64,
    pub match_method: MatchMethod,
    pub matched_amount: Decimal,

    /// Names of the scoring rules this match satisfied, in rule order.
    pub criteria_matched: Vec<String>,

    pub matched_by: Option<String>,
    pub matched_at: DateTime<Utc>,
    pub notes: Option<String>,
}
