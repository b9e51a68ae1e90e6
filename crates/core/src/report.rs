use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Point-in-time summary of matched vs. unmatched activity for one account
/// over a period. Derived, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub organization_id: String,
    pub bank_account_id: i64,

    pub from_date: NaiveDate,
    pub to_date: NaiveDate,

    pub opening_balance: Decimal,
    pub closing_balance: Decimal,
    pub book_balance: Decimal,
    pub bank_balance: Decimal,
    pub difference: Decimal,

    pub total_transactions: usize,
    pub matched_transactions: usize,
    pub unmatched_transactions: usize,

    pub matched_debits: Decimal,
    pub matched_credits: Decimal,
    pub unmatched_debits: Decimal,
    pub unmatched_credits: Decimal,

    pub is_reconciled: bool,
    pub created_at: DateTime<Utc>,
}
