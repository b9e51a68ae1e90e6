//! Ports the matching engine talks through. Storage backends implement
//! these; the engine itself never sees a database handle.

use async_trait::async_trait;
use chrono::NaiveDate;
use concilia_core::{BankTransaction, MatchStatus, PaymentInvoiceMatch, TransactionStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Backend failure, already rendered to text. Keeps this crate free of any
/// particular database error type.
#[derive(Debug, Error)]
#[error("repository error: {0}")]
pub struct RepositoryError(pub String);

/// An open invoice (or voucher) eligible for matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateInvoice {
    pub invoice_id: String,
    pub voucher_id: Option<String>,
    pub invoice_number: Option<String>,
    pub voucher_number: Option<String>,
    pub customer_name: Option<String>,
    pub supplier_name: Option<String>,
    pub total_amount: Decimal,
    pub invoice_date: Option<NaiveDate>,
}

/// Candidate pre-filter: same organization, open status, amount within
/// ±5%, invoice dated in the 90 days up to the transaction date, capped
/// at 20 rows.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub organization_id: String,
    pub amount_min: Decimal,
    pub amount_max: Decimal,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub limit: usize,
}

impl CandidateQuery {
    pub fn for_transaction(tx: &BankTransaction) -> Self {
        let tolerance = tx.amount * Decimal::new(5, 2);
        CandidateQuery {
            organization_id: tx.organization_id.clone(),
            amount_min: tx.amount - tolerance,
            amount_max: tx.amount + tolerance,
            date_from: tx.transaction_date - chrono::Duration::days(90),
            date_to: tx.transaction_date,
            limit: 20,
        }
    }
}

/// Bank-side persistence used by the matcher.
#[async_trait]
pub trait BankRepository: Send + Sync {
    async fn get_transaction(&self, id: i64) -> Result<Option<BankTransaction>, RepositoryError>;

    async fn get_unmatched_transactions(
        &self,
        organization_id: &str,
        bank_account_id: Option<i64>,
    ) -> Result<Vec<BankTransaction>, RepositoryError>;

    async fn create_payment_match(
        &self,
        payment_match: &PaymentInvoiceMatch,
    ) -> Result<i64, RepositoryError>;

    async fn update_transaction_status(
        &self,
        transaction_id: i64,
        status: TransactionStatus,
        match_status: MatchStatus,
    ) -> Result<(), RepositoryError>;

    async fn attach_invoice_to_transaction(
        &self,
        transaction_id: i64,
        invoice_id: Option<&str>,
        voucher_id: Option<&str>,
    ) -> Result<(), RepositoryError>;

    async fn record_ledger_entry(
        &self,
        transaction_id: i64,
        ledger_entry_id: &str,
    ) -> Result<(), RepositoryError>;
}

/// Accounting-side source of open invoices.
#[async_trait]
pub trait InvoiceSource: Send + Sync {
    async fn candidate_invoices(
        &self,
        query: &CandidateQuery,
    ) -> Result<Vec<CandidateInvoice>, RepositoryError>;
}

/// Destination for ledger entries created from matched transactions.
/// Returns the new entry's identifier.
#[async_trait]
pub trait LedgerSink: Send + Sync {
    async fn create_ledger_entry(
        &self,
        transaction: &BankTransaction,
        payment_match: &PaymentInvoiceMatch,
    ) -> Result<String, RepositoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use concilia_core::TransactionType;

    #[test]
    fn candidate_query_window() {
        let tx = BankTransaction::new(
            "org-1",
            1,
            NaiveDate::from_ymd_opt(2024, 4, 10).unwrap(),
            NaiveDate::from_ymd_opt(2024, 4, 10).unwrap(),
            TransactionType::Credit,
            Decimal::new(100000, 2),
            "EUR",
        )
        .unwrap();

        let q = CandidateQuery::for_transaction(&tx);
        assert_eq!(q.amount_min, Decimal::new(95000, 2));
        assert_eq!(q.amount_max, Decimal::new(105000, 2));
        assert_eq!(q.date_from, NaiveDate::from_ymd_opt(2024, 1, 11).unwrap());
        assert_eq!(q.date_to, NaiveDate::from_ymd_opt(2024, 4, 10).unwrap());
        assert_eq!(q.limit, 20);
    }
}
