//! [`SqliteStore`] adapts the query layer to the matcher's ports:
//! [`BankRepository`] and [`InvoiceSource`] over the local database, and
//! [`LedgerSink`] writing into the local ledger_entries table.

use async_trait::async_trait;
use concilia_core::{BankTransaction, MatchStatus, PaymentInvoiceMatch, TransactionStatus};
use concilia_match::{
    BankRepository, CandidateInvoice, CandidateQuery, InvoiceSource, LedgerSink, RepositoryError,
};

use crate::db::{self, DbPool};

#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        SqliteStore { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn repo_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError(e.to_string())
}

#[async_trait]
impl BankRepository for SqliteStore {
    async fn get_transaction(&self, id: i64) -> Result<Option<BankTransaction>, RepositoryError> {
        db::get_transaction(&self.pool, id).await.map_err(repo_err)
    }

    async fn get_unmatched_transactions(
        &self,
        organization_id: &str,
        bank_account_id: Option<i64>,
    ) -> Result<Vec<BankTransaction>, RepositoryError> {
        db::get_unmatched_transactions(&self.pool, organization_id, bank_account_id)
            .await
            .map_err(repo_err)
    }

    async fn create_payment_match(
        &self,
        payment_match: &PaymentInvoiceMatch,
    ) -> Result<i64, RepositoryError> {
        db::create_payment_match(&self.pool, payment_match)
            .await
            .map_err(repo_err)
    }

    async fn update_transaction_status(
        &self,
        transaction_id: i64,
        status: TransactionStatus,
        match_status: MatchStatus,
    ) -> Result<(), RepositoryError> {
        db::update_transaction_status(&self.pool, transaction_id, status, match_status)
            .await
            .map_err(repo_err)
    }

    async fn attach_invoice_to_transaction(
        &self,
        transaction_id: i64,
        invoice_id: Option<&str>,
        voucher_id: Option<&str>,
    ) -> Result<(), RepositoryError> {
        db::attach_invoice(&self.pool, transaction_id, invoice_id, voucher_id)
            .await
            .map_err(repo_err)
    }

    async fn record_ledger_entry(
        &self,
        transaction_id: i64,
        ledger_entry_id: &str,
    ) -> Result<(), RepositoryError> {
        db::set_ledger_entry(&self.pool, transaction_id, ledger_entry_id)
            .await
            .map_err(repo_err)
    }
}

#[async_trait]
impl InvoiceSource for SqliteStore {
    async fn candidate_invoices(
        &self,
        query: &CandidateQuery,
    ) -> Result<Vec<CandidateInvoice>, RepositoryError> {
        db::candidate_invoices(&self.pool, query)
            .await
            .map_err(repo_err)
    }
}

#[async_trait]
impl LedgerSink for SqliteStore {
    async fn create_ledger_entry(
        &self,
        transaction: &BankTransaction,
        payment_match: &PaymentInvoiceMatch,
    ) -> Result<String, RepositoryError> {
        let id = db::create_ledger_entry(&self.pool, transaction, payment_match)
            .await
            .map_err(repo_err)?;
        Ok(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, InvoiceRecord, InvoiceStatus};
    use chrono::NaiveDate;
    use concilia_core::{BankAccount, TransactionType};
    use concilia_match::{MatchOutcome, PaymentMatcher};
    use rust_decimal::Decimal;

    async fn setup() -> (DbPool, i64) {
        let pool = db::create_db_in_memory().await.unwrap();
        let account = BankAccount::new("org-1", "Main", "NL91ABNA0417164300", "ABN AMRO", "EUR");
        let account_id = db::create_bank_account(&pool, &account).await.unwrap();
        (pool, account_id)
    }

    fn tx(account_id: i64, amount: i64, reference: &str) -> BankTransaction {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let mut t = BankTransaction::new(
            "org-1",
            account_id,
            date,
            date,
            TransactionType::Credit,
            Decimal::new(amount, 2),
            "EUR",
        )
        .unwrap();
        t.reference = Some(reference.to_string());
        t.counterparty_name = Some("ACME CORP".to_string());
        t.raw_data = serde_json::json!({"reference": reference});
        t
    }

    fn invoice(amount: i64, number: &str) -> InvoiceRecord {
        InvoiceRecord {
            id: None,
            organization_id: "org-1".to_string(),
            invoice_number: Some(number.to_string()),
            voucher_number: None,
            customer_name: Some("ACME CORP".to_string()),
            supplier_name: None,
            total_amount: Decimal::new(amount, 2),
            invoice_date: NaiveDate::from_ymd_opt(2024, 3, 12),
            status: InvoiceStatus::Unpaid,
        }
    }

    #[tokio::test]
    async fn account_round_trip() {
        let (pool, account_id) = setup().await;
        let loaded = db::get_bank_account(&pool, account_id).await.unwrap().unwrap();
        assert_eq!(loaded.account_name, "Main");
        assert_eq!(loaded.currency, "EUR");
        assert!(loaded.is_active);

        db::update_account_balance(&pool, account_id, Decimal::new(123456, 2))
            .await
            .unwrap();
        let loaded = db::get_bank_account(&pool, account_id).await.unwrap().unwrap();
        assert_eq!(loaded.current_balance, Decimal::new(123456, 2));
    }

    #[tokio::test]
    async fn statement_import_and_hash_dedup() {
        let (pool, account_id) = setup().await;
        let (statement, transactions) = concilia_ingest::parse(
            "org-1",
            account_id,
            b"Date,Description,Amount\n2024-03-15,INV-2024-001 ACME,1000.00\n2024-03-16,RENT,-500.00\n",
            "march.csv",
            None,
            Some("tester"),
        )
        .unwrap();

        assert_eq!(
            db::get_statement_by_hash(&pool, "org-1", &statement.file_hash)
                .await
                .unwrap(),
            None
        );
        let statement_id = db::create_statement(&pool, &statement).await.unwrap();
        assert_eq!(
            db::get_statement_by_hash(&pool, "org-1", &statement.file_hash)
                .await
                .unwrap(),
            Some(statement_id)
        );

        let n = db::bulk_create_transactions(&pool, statement_id, &transactions)
            .await
            .unwrap();
        assert_eq!(n, 2);

        db::mark_statement_processed(&pool, statement_id).await.unwrap();
        let stored = db::get_statement(&pool, statement_id).await.unwrap().unwrap();
        assert!(stored.is_processed);
        assert_eq!(stored.transaction_count, 2);
        assert_eq!(stored.total_credits, Decimal::new(100000, 2));

        // Same bytes again: the hash collides.
        let dup = db::create_statement(&pool, &statement).await;
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn transaction_round_trip_preserves_raw_data() {
        let (pool, account_id) = setup().await;
        let statement_id = seed_statement(&pool, account_id).await;
        db::bulk_create_transactions(&pool, statement_id, &[tx(account_id, 100000, "INV-1")])
            .await
            .unwrap();

        let unmatched = db::get_unmatched_transactions(&pool, "org-1", Some(account_id))
            .await
            .unwrap();
        assert_eq!(unmatched.len(), 1);
        let t = &unmatched[0];
        assert_eq!(t.amount, Decimal::new(100000, 2));
        assert_eq!(t.reference.as_deref(), Some("INV-1"));
        assert_eq!(t.raw_data["reference"], "INV-1");
        assert_eq!(t.statement_id, Some(statement_id));
    }

    #[tokio::test]
    async fn full_match_flow_through_sqlite() {
        let (pool, account_id) = setup().await;
        let statement_id = seed_statement(&pool, account_id).await;
        db::bulk_create_transactions(
            &pool,
            statement_id,
            &[tx(account_id, 100000, "PAYMENT INV-2024-001")],
        )
        .await
        .unwrap();
        db::insert_invoice(&pool, &invoice(100000, "INV-2024-001"))
            .await
            .unwrap();

        let store = SqliteStore::new(pool.clone());
        let matcher = PaymentMatcher::new(store.clone(), store.clone());
        let stats = matcher.match_all_unmatched("org-1", None).await.unwrap();
        assert_eq!(stats.total_processed, 1);
        assert_eq!(stats.exact_matches, 1);

        let unmatched = db::get_unmatched_transactions(&pool, "org-1", None).await.unwrap();
        assert!(unmatched.is_empty());

        let txs = db::transactions_in_period(
            &pool,
            "org-1",
            account_id,
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(txs.len(), 1);
        let matched_tx = &txs[0];
        assert_eq!(matched_tx.status, TransactionStatus::Matched);
        assert_eq!(matched_tx.match_status, MatchStatus::AutoMatched);

        let matches = db::get_matches_for_transaction(&pool, matched_tx.id.unwrap())
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].match_score, 100.0);
        assert!(matches[0]
            .criteria_matched
            .contains(&"reference_match".to_string()));

        // Export to ledger and verify the entry id lands on the transaction.
        let entry_id = matcher
            .export_to_ledger(&store, matched_tx.id.unwrap(), &matches[0])
            .await
            .unwrap();
        let reloaded = db::get_transaction(&pool, matched_tx.id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.ledger_entry_id, Some(entry_id));
    }

    #[tokio::test]
    async fn candidate_filter_respects_status_amount_and_window() {
        let (pool, account_id) = setup().await;
        db::insert_invoice(&pool, &invoice(100000, "IN-RANGE")).await.unwrap();
        let mut paid = invoice(100000, "PAID");
        paid.status = InvoiceStatus::Paid;
        db::insert_invoice(&pool, &paid).await.unwrap();
        db::insert_invoice(&pool, &invoice(500000, "TOO-BIG")).await.unwrap();
        let mut old = invoice(100000, "TOO-OLD");
        old.invoice_date = NaiveDate::from_ymd_opt(2023, 10, 1);
        db::insert_invoice(&pool, &old).await.unwrap();
        let mut undated = invoice(100000, "NO-DATE");
        undated.invoice_date = None;
        db::insert_invoice(&pool, &undated).await.unwrap();

        let query = CandidateQuery::for_transaction(&tx(account_id, 100000, "x"));
        let candidates = db::candidate_invoices(&pool, &query).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].invoice_number.as_deref(), Some("IN-RANGE"));
    }

    async fn seed_statement(pool: &DbPool, account_id: i64) -> i64 {
        let (statement, _) = concilia_ingest::parse(
            "org-1",
            account_id,
            b"Date,Description,Amount\n2024-03-01,SEED,1.00\n",
            "seed.csv",
            None,
            None,
        )
        .unwrap();
        db::create_statement(pool, &statement).await.unwrap()
    }
}
