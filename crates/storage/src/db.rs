//! SQLite persistence: pool setup, migrations, and the query layer.
//! Amounts are stored as TEXT to keep full decimal precision; dates go
//! through sqlx's chrono support.

use chrono::NaiveDate;
use concilia_core::{
    BankAccount, BankStatement, BankTransaction, MatchMethod, MatchStatus, PaymentInvoiceMatch,
    StatementFormat, TransactionStatus, TransactionType,
};
use concilia_match::{CandidateInvoice, CandidateQuery};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::str::FromStr;

pub type DbPool = Pool<Sqlite>;

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite:{}?mode=rwc", path.display()))
        .await?;
    configure(&pool).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Private in-memory database, used by tests.
pub async fn create_db_in_memory() -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    configure(&pool).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

async fn configure(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(pool)
        .await?;
    Ok(())
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bank_accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            organization_id TEXT NOT NULL,
            account_name TEXT NOT NULL,
            account_number TEXT NOT NULL,
            iban TEXT,
            swift_bic TEXT,
            bank_name TEXT NOT NULL,
            currency TEXT NOT NULL,
            opening_balance TEXT NOT NULL DEFAULT '0',
            current_balance TEXT NOT NULL DEFAULT '0',
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bank_statements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            organization_id TEXT NOT NULL,
            bank_account_id INTEGER NOT NULL,
            statement_number TEXT,
            format TEXT NOT NULL,
            statement_date TEXT NOT NULL,
            from_date TEXT NOT NULL,
            to_date TEXT NOT NULL,
            opening_balance TEXT NOT NULL,
            closing_balance TEXT NOT NULL,
            total_debits TEXT NOT NULL,
            total_credits TEXT NOT NULL,
            transaction_count INTEGER NOT NULL,
            file_name TEXT NOT NULL,
            file_hash TEXT NOT NULL UNIQUE,
            is_processed INTEGER NOT NULL DEFAULT 0,
            processed_at TEXT,
            currency TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            imported_by TEXT,
            FOREIGN KEY (bank_account_id) REFERENCES bank_accounts(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bank_transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            organization_id TEXT NOT NULL,
            bank_account_id INTEGER NOT NULL,
            statement_id INTEGER,
            transaction_date TEXT NOT NULL,
            value_date TEXT NOT NULL,
            booking_date TEXT,
            transaction_type TEXT NOT NULL,
            amount TEXT NOT NULL,
            currency TEXT NOT NULL,
            transaction_id TEXT,
            reference TEXT,
            end_to_end_id TEXT,
            counterparty_name TEXT,
            counterparty_account TEXT,
            description TEXT,
            additional_info TEXT,
            balance_after TEXT,
            status TEXT NOT NULL,
            match_status TEXT NOT NULL,
            matched_invoice_id TEXT,
            matched_voucher_id TEXT,
            ledger_entry_id TEXT,
            reconciled_at TEXT,
            raw_data TEXT NOT NULL DEFAULT 'null',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            imported_by TEXT,
            FOREIGN KEY (bank_account_id) REFERENCES bank_accounts(id),
            FOREIGN KEY (statement_id) REFERENCES bank_statements(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_bank_transactions_unmatched \
         ON bank_transactions (organization_id, match_status)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS payment_invoice_matches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            organization_id TEXT NOT NULL,
            transaction_id INTEGER NOT NULL,
            invoice_id TEXT,
            voucher_id TEXT,
            match_status TEXT NOT NULL,
            match_score REAL NOT NULL,
            match_method TEXT NOT NULL,
            matched_amount TEXT NOT NULL,
            criteria_matched TEXT NOT NULL,
            matched_by TEXT,
            matched_at TEXT NOT NULL,
            notes TEXT,
            FOREIGN KEY (transaction_id) REFERENCES bank_transactions(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS invoices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            organization_id TEXT NOT NULL,
            invoice_number TEXT,
            voucher_number TEXT,
            customer_name TEXT,
            supplier_name TEXT,
            total_amount TEXT NOT NULL,
            invoice_date TEXT,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ledger_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            organization_id TEXT NOT NULL,
            transaction_id INTEGER NOT NULL,
            invoice_id TEXT,
            amount TEXT NOT NULL,
            entry_date TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (transaction_id) REFERENCES bank_transactions(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Open invoice as stored locally. The matcher only ever sees the
/// [`CandidateInvoice`] projection of this.
#[derive(Debug, Clone)]
pub struct InvoiceRecord {
    pub id: Option<i64>,
    pub organization_id: String,
    pub invoice_number: Option<String>,
    pub voucher_number: Option<String>,
    pub customer_name: Option<String>,
    pub supplier_name: Option<String>,
    pub total_amount: Decimal,
    pub invoice_date: Option<NaiveDate>,
    pub status: InvoiceStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceStatus {
    Unpaid,
    PartiallyPaid,
    Pending,
    Paid,
}

impl InvoiceStatus {
    fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Unpaid => "unpaid",
            InvoiceStatus::PartiallyPaid => "partially_paid",
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Paid => "paid",
        }
    }
}

impl FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(InvoiceStatus::Unpaid),
            "partially_paid" => Ok(InvoiceStatus::PartiallyPaid),
            "pending" => Ok(InvoiceStatus::Pending),
            "paid" => Ok(InvoiceStatus::Paid),
            other => Err(format!("unknown invoice status '{other}'")),
        }
    }
}

fn decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    let text: String = row.try_get(column)?;
    Decimal::from_str(&text)
        .map_err(|e| sqlx::Error::Decode(format!("column '{column}': {e}").into()))
}

fn opt_decimal_column(row: &SqliteRow, column: &str) -> Result<Option<Decimal>, sqlx::Error> {
    let text: Option<String> = row.try_get(column)?;
    match text {
        Some(t) => Decimal::from_str(&t)
            .map(Some)
            .map_err(|e| sqlx::Error::Decode(format!("column '{column}': {e}").into())),
        None => Ok(None),
    }
}

fn tx_from_row(row: &SqliteRow) -> Result<BankTransaction, sqlx::Error> {
    let type_str: String = row.try_get("transaction_type")?;
    let transaction_type = match type_str.as_str() {
        "credit" => TransactionType::Credit,
        _ => TransactionType::Debit,
    };
    let status_str: String = row.try_get("status")?;
    let status = match status_str.as_str() {
        "matched" => TransactionStatus::Matched,
        "unmatched" => TransactionStatus::Unmatched,
        "reconciled" => TransactionStatus::Reconciled,
        "disputed" => TransactionStatus::Disputed,
        _ => TransactionStatus::Pending,
    };
    let match_str: String = row.try_get("match_status")?;
    let match_status = match match_str.as_str() {
        "auto_matched" => MatchStatus::AutoMatched,
        "manual_matched" => MatchStatus::ManualMatched,
        "partially_matched" => MatchStatus::PartiallyMatched,
        _ => MatchStatus::Unmatched,
    };
    let raw_text: String = row.try_get("raw_data")?;
    let raw_data = serde_json::from_str(&raw_text).unwrap_or(serde_json::Value::Null);

    Ok(BankTransaction {
        id: Some(row.try_get("id")?),
        organization_id: row.try_get("organization_id")?,
        bank_account_id: row.try_get("bank_account_id")?,
        statement_id: row.try_get("statement_id")?,
        transaction_date: row.try_get("transaction_date")?,
        value_date: row.try_get("value_date")?,
        booking_date: row.try_get("booking_date")?,
        transaction_type,
        amount: decimal_column(row, "amount")?,
        currency: row.try_get("currency")?,
        transaction_id: row.try_get("transaction_id")?,
        reference: row.try_get("reference")?,
        end_to_end_id: row.try_get("end_to_end_id")?,
        counterparty_name: row.try_get("counterparty_name")?,
        counterparty_account: row.try_get("counterparty_account")?,
        description: row.try_get("description")?,
        additional_info: row.try_get("additional_info")?,
        balance_after: opt_decimal_column(row, "balance_after")?,
        status,
        match_status,
        matched_invoice_id: row.try_get("matched_invoice_id")?,
        matched_voucher_id: row.try_get("matched_voucher_id")?,
        ledger_entry_id: row.try_get("ledger_entry_id")?,
        reconciled_at: row.try_get("reconciled_at")?,
        raw_data,
        created_at: row.try_get("created_at")?,
        imported_by: row.try_get("imported_by")?,
    })
}

pub async fn create_bank_account(
    pool: &DbPool,
    account: &BankAccount,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO bank_accounts \
         (organization_id, account_name, account_number, iban, swift_bic, bank_name, currency, \
          opening_balance, current_balance, is_active) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&account.organization_id)
    .bind(&account.account_name)
    .bind(&account.account_number)
    .bind(&account.iban)
    .bind(&account.swift_bic)
    .bind(&account.bank_name)
    .bind(&account.currency)
    .bind(account.opening_balance.to_string())
    .bind(account.current_balance.to_string())
    .bind(account.is_active as i64)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn get_bank_account(
    pool: &DbPool,
    id: i64,
) -> Result<Option<BankAccount>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM bank_accounts WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(|r| {
        Ok(BankAccount {
            id: Some(r.try_get("id")?),
            organization_id: r.try_get("organization_id")?,
            account_name: r.try_get("account_name")?,
            account_number: r.try_get("account_number")?,
            iban: r.try_get("iban")?,
            swift_bic: r.try_get("swift_bic")?,
            bank_name: r.try_get("bank_name")?,
            currency: r.try_get("currency")?,
            opening_balance: decimal_column(&r, "opening_balance")?,
            current_balance: decimal_column(&r, "current_balance")?,
            is_active: r.try_get::<i64, _>("is_active")? != 0,
            created_at: r.try_get("created_at")?,
            updated_at: r.try_get("updated_at")?,
        })
    })
    .transpose()
}

pub async fn update_account_balance(
    pool: &DbPool,
    account_id: i64,
    balance: Decimal,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE bank_accounts SET current_balance = ?, updated_at = datetime('now') WHERE id = ?",
    )
    .bind(balance.to_string())
    .bind(account_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Duplicate-import guard: statements are unique by file hash.
pub async fn get_statement_by_hash(
    pool: &DbPool,
    organization_id: &str,
    file_hash: &str,
) -> Result<Option<i64>, sqlx::Error> {
    let row = sqlx::query_as::<_, (i64,)>(
        "SELECT id FROM bank_statements WHERE organization_id = ? AND file_hash = ?",
    )
    .bind(organization_id)
    .bind(file_hash)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| r.0))
}

pub async fn create_statement(
    pool: &DbPool,
    statement: &BankStatement,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO bank_statements \
         (organization_id, bank_account_id, statement_number, format, statement_date, \
          from_date, to_date, opening_balance, closing_balance, total_debits, total_credits, \
          transaction_count, file_name, file_hash, is_processed, processed_at, currency, imported_by) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&statement.organization_id)
    .bind(statement.bank_account_id)
    .bind(&statement.statement_number)
    .bind(statement.format.to_string())
    .bind(statement.statement_date)
    .bind(statement.from_date)
    .bind(statement.to_date)
    .bind(statement.opening_balance.to_string())
    .bind(statement.closing_balance.to_string())
    .bind(statement.total_debits.to_string())
    .bind(statement.total_credits.to_string())
    .bind(statement.transaction_count as i64)
    .bind(&statement.file_name)
    .bind(&statement.file_hash)
    .bind(statement.is_processed as i64)
    .bind(statement.processed_at)
    .bind(&statement.currency)
    .bind(&statement.imported_by)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn get_statement(
    pool: &DbPool,
    id: i64,
) -> Result<Option<BankStatement>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM bank_statements WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(|r| {
        let format_str: String = r.try_get("format")?;
        let format = StatementFormat::from_str(&format_str).unwrap_or(StatementFormat::Csv);
        Ok(BankStatement {
            id: Some(r.try_get("id")?),
            organization_id: r.try_get("organization_id")?,
            bank_account_id: r.try_get("bank_account_id")?,
            statement_number: r.try_get("statement_number")?,
            format,
            statement_date: r.try_get("statement_date")?,
            from_date: r.try_get("from_date")?,
            to_date: r.try_get("to_date")?,
            opening_balance: decimal_column(&r, "opening_balance")?,
            closing_balance: decimal_column(&r, "closing_balance")?,
            total_debits: decimal_column(&r, "total_debits")?,
            total_credits: decimal_column(&r, "total_credits")?,
            transaction_count: r.try_get::<i64, _>("transaction_count")? as usize,
            file_name: r.try_get("file_name")?,
            file_hash: r.try_get("file_hash")?,
            is_processed: r.try_get::<i64, _>("is_processed")? != 0,
            processed_at: r.try_get("processed_at")?,
            currency: r.try_get("currency")?,
            created_at: r.try_get("created_at")?,
            imported_by: r.try_get("imported_by")?,
        })
    })
    .transpose()
}

pub async fn mark_statement_processed(pool: &DbPool, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE bank_statements SET is_processed = 1, processed_at = datetime('now') WHERE id = ?",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Insert all transactions of one statement. Returns the number inserted.
pub async fn bulk_create_transactions(
    pool: &DbPool,
    statement_id: i64,
    transactions: &[BankTransaction],
) -> Result<usize, sqlx::Error> {
    let mut db_tx = pool.begin().await?;
    for tx in transactions {
        sqlx::query(
            "INSERT INTO bank_transactions \
             (organization_id, bank_account_id, statement_id, transaction_date, value_date, \
              booking_date, transaction_type, amount, currency, transaction_id, reference, \
              end_to_end_id, counterparty_name, counterparty_account, description, \
              additional_info, balance_after, status, match_status, matched_invoice_id, \
              matched_voucher_id, ledger_entry_id, reconciled_at, raw_data, imported_by) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&tx.organization_id)
        .bind(tx.bank_account_id)
        .bind(statement_id)
        .bind(tx.transaction_date)
        .bind(tx.value_date)
        .bind(tx.booking_date)
        .bind(tx.transaction_type.to_string())
        .bind(tx.amount.to_string())
        .bind(&tx.currency)
        .bind(&tx.transaction_id)
        .bind(&tx.reference)
        .bind(&tx.end_to_end_id)
        .bind(&tx.counterparty_name)
        .bind(&tx.counterparty_account)
        .bind(&tx.description)
        .bind(&tx.additional_info)
        .bind(tx.balance_after.map(|b| b.to_string()))
        .bind(tx.status.to_string())
        .bind(tx.match_status.to_string())
        .bind(&tx.matched_invoice_id)
        .bind(&tx.matched_voucher_id)
        .bind(&tx.ledger_entry_id)
        .bind(tx.reconciled_at)
        .bind(serde_json::to_string(&tx.raw_data).unwrap_or_else(|_| "null".to_string()))
        .bind(&tx.imported_by)
        .execute(&mut *db_tx)
        .await?;
    }
    db_tx.commit().await?;
    Ok(transactions.len())
}

pub async fn get_transaction(
    pool: &DbPool,
    id: i64,
) -> Result<Option<BankTransaction>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM bank_transactions WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.map(|r| tx_from_row(&r)).transpose()
}

pub async fn get_unmatched_transactions(
    pool: &DbPool,
    organization_id: &str,
    bank_account_id: Option<i64>,
) -> Result<Vec<BankTransaction>, sqlx::Error> {
    let rows = match bank_account_id {
        Some(account_id) => {
            sqlx::query(
                "SELECT * FROM bank_transactions \
                 WHERE organization_id = ? AND match_status = 'unmatched' AND bank_account_id = ? \
                 ORDER BY transaction_date, id",
            )
            .bind(organization_id)
            .bind(account_id)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(
                "SELECT * FROM bank_transactions \
                 WHERE organization_id = ? AND match_status = 'unmatched' \
                 ORDER BY transaction_date, id",
            )
            .bind(organization_id)
            .fetch_all(pool)
            .await?
        }
    };
    rows.iter().map(tx_from_row).collect()
}

pub async fn transactions_in_period(
    pool: &DbPool,
    organization_id: &str,
    bank_account_id: i64,
    from_date: NaiveDate,
    to_date: NaiveDate,
) -> Result<Vec<BankTransaction>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT * FROM bank_transactions \
         WHERE organization_id = ? AND bank_account_id = ? \
           AND transaction_date >= ? AND transaction_date <= ? \
         ORDER BY transaction_date, id",
    )
    .bind(organization_id)
    .bind(bank_account_id)
    .bind(from_date)
    .bind(to_date)
    .fetch_all(pool)
    .await?;
    rows.iter().map(tx_from_row).collect()
}

pub async fn update_transaction_status(
    pool: &DbPool,
    transaction_id: i64,
    status: TransactionStatus,
    match_status: MatchStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE bank_transactions SET status = ?, match_status = ? WHERE id = ?")
        .bind(status.to_string())
        .bind(match_status.to_string())
        .bind(transaction_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn attach_invoice(
    pool: &DbPool,
    transaction_id: i64,
    invoice_id: Option<&str>,
    voucher_id: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE bank_transactions SET matched_invoice_id = ?, matched_voucher_id = ? WHERE id = ?",
    )
    .bind(invoice_id)
    .bind(voucher_id)
    .bind(transaction_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_ledger_entry(
    pool: &DbPool,
    transaction_id: i64,
    ledger_entry_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE bank_transactions SET ledger_entry_id = ? WHERE id = ?")
        .bind(ledger_entry_id)
        .bind(transaction_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn create_payment_match(
    pool: &DbPool,
    payment_match: &PaymentInvoiceMatch,
) -> Result<i64, sqlx::Error> {
    let criteria = serde_json::to_string(&payment_match.criteria_matched)
        .unwrap_or_else(|_| "[]".to_string());
    let result = sqlx::query(
        "INSERT INTO payment_invoice_matches \
         (organization_id, transaction_id, invoice_id, voucher_id, match_status, match_score, \
          match_method, matched_amount, criteria_matched, matched_by, matched_at, notes) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&payment_match.organization_id)
    .bind(payment_match.transaction_id)
    .bind(&payment_match.invoice_id)
    .bind(&payment_match.voucher_id)
    .bind(payment_match.match_status.to_string())
    .bind(payment_match.match_score)
    .bind(payment_match.match_method.to_string())
    .bind(payment_match.matched_amount.to_string())
    .bind(criteria)
    .bind(&payment_match.matched_by)
    .bind(payment_match.matched_at)
    .bind(&payment_match.notes)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn get_matches_for_transaction(
    pool: &DbPool,
    transaction_id: i64,
) -> Result<Vec<PaymentInvoiceMatch>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT * FROM payment_invoice_matches WHERE transaction_id = ? ORDER BY matched_at, id",
    )
    .bind(transaction_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|r| {
            let match_str: String = r.try_get("match_status")?;
            let match_status = match match_str.as_str() {
                "auto_matched" => MatchStatus::AutoMatched,
                "manual_matched" => MatchStatus::ManualMatched,
                "partially_matched" => MatchStatus::PartiallyMatched,
                _ => MatchStatus::Unmatched,
            };
            let method_str: String = r.try_get("match_method")?;
            let match_method = match method_str.as_str() {
                "manual" => MatchMethod::Manual,
                _ => MatchMethod::Automated,
            };
            let criteria_text: String = r.try_get("criteria_matched")?;
            let criteria_matched = serde_json::from_str(&criteria_text).unwrap_or_default();
            Ok(PaymentInvoiceMatch {
                id: Some(r.try_get("id")?),
                organization_id: r.try_get("organization_id")?,
                transaction_id: r.try_get("transaction_id")?,
                invoice_id: r.try_get("invoice_id")?,
                voucher_id: r.try_get("voucher_id")?,
                match_status,
                match_score: r.try_get("match_score")?,
                match_method,
                matched_amount: decimal_column(r, "matched_amount")?,
                criteria_matched,
                matched_by: r.try_get("matched_by")?,
                matched_at: r.try_get("matched_at")?,
                notes: r.try_get("notes")?,
            })
        })
        .collect()
}

pub async fn insert_invoice(pool: &DbPool, invoice: &InvoiceRecord) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO invoices \
         (organization_id, invoice_number, voucher_number, customer_name, supplier_name, \
          total_amount, invoice_date, status) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&invoice.organization_id)
    .bind(&invoice.invoice_number)
    .bind(&invoice.voucher_number)
    .bind(&invoice.customer_name)
    .bind(&invoice.supplier_name)
    .bind(invoice.total_amount.to_string())
    .bind(invoice.invoice_date)
    .bind(invoice.status.as_str())
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Candidate pre-filter. Amounts are stored as TEXT, so the range check is
/// done in Rust after a coarse fetch on organization, status, and dates.
/// Undated invoices never qualify; the date window has nothing to hold
/// them against.
pub async fn candidate_invoices(
    pool: &DbPool,
    query: &CandidateQuery,
) -> Result<Vec<CandidateInvoice>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, voucher_number, invoice_number, customer_name, supplier_name, \
                total_amount, invoice_date \
         FROM invoices \
         WHERE organization_id = ? \
           AND status IN ('unpaid', 'partially_paid', 'pending') \
           AND invoice_date IS NOT NULL \
           AND invoice_date >= ? AND invoice_date <= ? \
         ORDER BY id",
    )
    .bind(&query.organization_id)
    .bind(query.date_from)
    .bind(query.date_to)
    .fetch_all(pool)
    .await?;

    let mut candidates = Vec::new();
    for r in &rows {
        let total_amount = decimal_column(r, "total_amount")?;
        if total_amount < query.amount_min || total_amount > query.amount_max {
            continue;
        }
        let id: i64 = r.try_get("id")?;
        let voucher_number: Option<String> = r.try_get("voucher_number")?;
        candidates.push(CandidateInvoice {
            invoice_id: id.to_string(),
            voucher_id: voucher_number.clone(),
            invoice_number: r.try_get("invoice_number")?,
            voucher_number,
            customer_name: r.try_get("customer_name")?,
            supplier_name: r.try_get("supplier_name")?,
            total_amount,
            invoice_date: r.try_get("invoice_date")?,
        });
        if candidates.len() >= query.limit {
            break;
        }
    }
    Ok(candidates)
}

pub async fn create_ledger_entry(
    pool: &DbPool,
    transaction: &BankTransaction,
    payment_match: &PaymentInvoiceMatch,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO ledger_entries (organization_id, transaction_id, invoice_id, amount, entry_date) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&transaction.organization_id)
    .bind(payment_match.transaction_id)
    .bind(&payment_match.invoice_id)
    .bind(payment_match.matched_amount.to_string())
    .bind(transaction.transaction_date)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}
