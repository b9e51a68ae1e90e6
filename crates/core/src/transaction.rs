use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Direction of a bank transaction. The amount itself is always positive;
/// sign lives here and only here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Debit,
    Credit,
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::Debit => write!(f, "debit"),
            TransactionType::Credit => write!(f, "credit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Matched,
    Unmatched,
    Reconciled,
    Disputed,
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Matched => "matched",
            TransactionStatus::Unmatched => "unmatched",
            TransactionStatus::Reconciled => "reconciled",
            TransactionStatus::Disputed => "disputed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Unmatched,
    AutoMatched,
    ManualMatched,
    PartiallyMatched,
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MatchStatus::Unmatched => "unmatched",
            MatchStatus::AutoMatched => "auto_matched",
            MatchStatus::ManualMatched => "manual_matched",
            MatchStatus::PartiallyMatched => "partially_matched",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Error)]
pub enum TransactionError {
    #[error("Transaction amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),
}

/// Canonical bank transaction, the unit every decoder produces and the
/// matching engine consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankTransaction {
    pub id: Option<i64>,
    pub organization_id: String,
    pub bank_account_id: i64,
    pub statement_id: Option<i64>,

    pub transaction_date: NaiveDate,
    pub value_date: NaiveDate,
    pub booking_date: Option<NaiveDate>,
    pub transaction_type: TransactionType,
    /// Always > 0; direction is carried by `transaction_type`.
    pub amount: Decimal,
    pub currency: String,

    /// Bank-assigned transaction id, when the format provides one.
    pub transaction_id: Option<String>,
    pub reference: Option<String>,
    pub end_to_end_id: Option<String>,

    pub counterparty_name: Option<String>,
    pub counterparty_account: Option<String>,

    pub description: Option<String>,
    pub additional_info: Option<String>,

    pub balance_after: Option<Decimal>,

    pub status: TransactionStatus,
    pub match_status: MatchStatus,
    pub matched_invoice_id: Option<String>,
    pub matched_voucher_id: Option<String>,
    pub ledger_entry_id: Option<String>,
    pub reconciled_at: Option<DateTime<Utc>>,

    /// Original row/node as parsed, preserved for audit.
    pub raw_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub imported_by: Option<String>,
}

impl BankTransaction {
    /// A fresh, unmatched transaction with the fields every decoder must
    /// supply. Rejects zero and negative amounts.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        organization_id: &str,
        bank_account_id: i64,
        transaction_date: NaiveDate,
        value_date: NaiveDate,
        transaction_type: TransactionType,
        amount: Decimal,
        currency: &str,
    ) -> Result<Self, TransactionError> {
        if amount <= Decimal::ZERO {
            return Err(TransactionError::NonPositiveAmount(amount));
        }
        Ok(BankTransaction {
            id: None,
            organization_id: organization_id.to_string(),
            bank_account_id,
            statement_id: None,
            transaction_date,
            value_date,
            booking_date: None,
            transaction_type,
            amount,
            currency: currency.to_string(),
            transaction_id: None,
            reference: None,
            end_to_end_id: None,
            counterparty_name: None,
            counterparty_account: None,
            description: None,
            additional_info: None,
            balance_after: None,
            status: TransactionStatus::Pending,
            match_status: MatchStatus::Unmatched,
            matched_invoice_id: None,
            matched_voucher_id: None,
            ledger_entry_id: None,
            reconciled_at: None,
            raw_data: serde_json::Value::Null,
            created_at: Utc::now(),
            imported_by: None,
        })
    }

    pub fn is_unmatched(&self) -> bool {
        self.match_status == MatchStatus::Unmatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn new_accepts_positive_amount() {
        let tx = BankTransaction::new(
            "org-1",
            1,
            date(2024, 1, 5),
            date(2024, 1, 5),
            TransactionType::Debit,
            Decimal::new(4200, 2),
            "EUR",
        )
        .unwrap();
        assert_eq!(tx.amount, Decimal::new(4200, 2));
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.match_status, MatchStatus::Unmatched);
    }

    #[test]
    fn new_rejects_zero_and_negative_amounts() {
        for cents in [0i64, -100] {
            let res = BankTransaction::new(
                "org-1",
                1,
                date(2024, 1, 5),
                date(2024, 1, 5),
                TransactionType::Credit,
                Decimal::new(cents, 2),
                "EUR",
            );
            assert!(matches!(res, Err(TransactionError::NonPositiveAmount(_))));
        }
    }
}
