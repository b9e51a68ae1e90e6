//! Command implementations over the storage, ingest, and match crates.

use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use concilia_core::{BankAccount, StatementFormat};
use concilia_ingest::StatementParser;
use concilia_match::{reconciliation, PaymentMatcher};
use concilia_storage::{db, SqliteStore};
use rust_decimal::Decimal;

pub async fn cmd_add_account(
    pool: &db::DbPool,
    org: &str,
    name: &str,
    number: &str,
    bank: &str,
    currency: &str,
) -> Result<()> {
    let account = BankAccount::new(org, name, number, bank, currency);
    let id = db::create_bank_account(pool, &account).await?;
    println!("Created bank account {id} ({name})");
    Ok(())
}

pub async fn cmd_add_invoice(
    pool: &db::DbPool,
    org: &str,
    number: &str,
    amount: &str,
    customer: Option<String>,
    date: Option<String>,
) -> Result<()> {
    let total_amount =
        Decimal::from_str(amount).with_context(|| format!("invalid amount '{amount}'"))?;
    let invoice_date = date.map(|d| parse_date(&d)).transpose()?;

    let invoice = db::InvoiceRecord {
        id: None,
        organization_id: org.to_string(),
        invoice_number: Some(number.to_string()),
        voucher_number: None,
        customer_name: customer,
        supplier_name: None,
        total_amount,
        invoice_date,
        status: db::InvoiceStatus::Unpaid,
    };
    let id = db::insert_invoice(pool, &invoice).await?;
    println!("Created invoice {id} ({number})");
    Ok(())
}

pub async fn cmd_import(
    pool: &db::DbPool,
    org: &str,
    file: &Path,
    account: i64,
    format: Option<String>,
) -> Result<()> {
    if db::get_bank_account(pool, account).await?.is_none() {
        bail!("bank account {account} does not exist");
    }

    let bytes =
        std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());

    let format_hint = format
        .map(|f| {
            StatementFormat::from_str(&f)
                .map_err(|_| anyhow::anyhow!("unknown statement format '{f}'"))
        })
        .transpose()?;

    let parser = StatementParser::new(org, account);
    let (statement, transactions) = parser
        .parse_file(&bytes, &file_name, format_hint, Some("cli"))
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    if let Some(existing) = db::get_statement_by_hash(pool, org, &statement.file_hash).await? {
        bail!(
            "this file was already imported as statement {existing} (hash {})",
            statement.file_hash
        );
    }

    let statement_id = db::create_statement(pool, &statement).await?;
    let inserted = db::bulk_create_transactions(pool, statement_id, &transactions).await?;
    db::mark_statement_processed(pool, statement_id).await?;
    db::update_account_balance(pool, account, statement.closing_balance).await?;

    println!(
        "Imported statement {statement_id} ({}) with {inserted} transactions \
         ({} credits / {} debits)",
        statement.format, statement.total_credits, statement.total_debits
    );
    Ok(())
}

pub async fn cmd_match_all(pool: &db::DbPool, org: &str, account: Option<i64>) -> Result<()> {
    let store = SqliteStore::new(pool.clone());
    let matcher = PaymentMatcher::new(store.clone(), store);
    let stats = matcher.match_all_unmatched(org, account).await?;

    println!("Processed {} transactions", stats.total_processed);
    println!("  exact matches:             {}", stats.exact_matches);
    println!("  high confidence matches:   {}", stats.high_confidence_matches);
    println!("  medium confidence matches: {}", stats.medium_confidence_matches);
    println!("  unmatched:                 {}", stats.unmatched);
    if stats.failed > 0 {
        println!("  failed:                    {}", stats.failed);
    }
    Ok(())
}

pub async fn cmd_manual_match(
    pool: &db::DbPool,
    transaction: i64,
    invoice: &str,
    user: &str,
    notes: Option<String>,
) -> Result<()> {
    let store = SqliteStore::new(pool.clone());
    let matcher = PaymentMatcher::new(store.clone(), store);
    let m = matcher
        .manual_match(transaction, invoice, None, user, notes)
        .await?;
    println!(
        "Matched transaction {transaction} to invoice {invoice} (match {})",
        m.id.unwrap_or(0)
    );
    Ok(())
}

pub async fn cmd_unmatch(pool: &db::DbPool, transaction: i64) -> Result<()> {
    let store = SqliteStore::new(pool.clone());
    let matcher = PaymentMatcher::new(store.clone(), store);
    matcher.unmatch_transaction(transaction).await?;
    println!("Unmatched transaction {transaction}");
    Ok(())
}

pub async fn cmd_report(
    pool: &db::DbPool,
    org: &str,
    account: i64,
    from: &str,
    to: &str,
) -> Result<()> {
    let from_date = parse_date(from)?;
    let to_date = parse_date(to)?;
    let account_row = db::get_bank_account(pool, account)
        .await?
        .with_context(|| format!("bank account {account} does not exist"))?;

    let transactions =
        db::transactions_in_period(pool, org, account, from_date, to_date).await?;

    // Best effort: opening balance from the account, closing from its
    // current running balance.
    let report = reconciliation::build_report(
        org,
        account,
        from_date,
        to_date,
        account_row.opening_balance,
        account_row.current_balance,
        &transactions,
    );

    println!("Reconciliation {} .. {}", report.from_date, report.to_date);
    println!(
        "  transactions: {} total, {} matched, {} unmatched",
        report.total_transactions, report.matched_transactions, report.unmatched_transactions
    );
    println!(
        "  matched:   {} credits / {} debits",
        report.matched_credits, report.matched_debits
    );
    println!(
        "  unmatched: {} credits / {} debits",
        report.unmatched_credits, report.unmatched_debits
    );
    println!(
        "  book balance {} vs bank balance {} (difference {})",
        report.book_balance, report.bank_balance, report.difference
    );
    println!(
        "  status: {}",
        if report.is_reconciled { "reconciled" } else { "NOT reconciled" }
    );
    Ok(())
}

pub async fn cmd_list(pool: &db::DbPool, org: &str, account: Option<i64>) -> Result<()> {
    let transactions = db::get_unmatched_transactions(pool, org, account).await?;
    if transactions.is_empty() {
        println!("No unmatched transactions");
        return Ok(());
    }
    for tx in &transactions {
        println!(
            "{:>6}  {}  {:>12} {}  {:<6}  {}",
            tx.id.unwrap_or(0),
            tx.transaction_date,
            tx.amount,
            tx.currency,
            tx.transaction_type,
            tx.description
                .as_deref()
                .or(tx.reference.as_deref())
                .unwrap_or("-"),
        );
    }
    Ok(())
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{raw}', expected YYYY-MM-DD"))
}
