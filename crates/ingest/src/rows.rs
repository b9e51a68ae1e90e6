//! Row-to-transaction assembly shared by the schemaless decoders.

use chrono::{NaiveDate, Utc};
use concilia_core::{BankTransaction, TransactionType};
use rust_decimal::Decimal;

use crate::error::RowError;
use crate::normalize::{extract_amount_and_type, parse_date, parse_decimal, ColumnKey, NormalizedRow};
use crate::parser::ImportContext;

/// Decoder-specific knobs for row assembly.
pub(crate) struct RowOptions {
    /// When set, a row without a parsable date is rejected instead of
    /// defaulting to today.
    pub require_date: bool,
}

pub(crate) struct BuiltRow {
    pub transaction: BankTransaction,
    pub balance: Option<Decimal>,
}

/// Build one canonical transaction from a normalized row. The raw original
/// row travels along in `raw_data`; when a date had to be defaulted the
/// row is flagged there too, so the fallback is auditable per transaction.
pub(crate) fn transaction_from_row(
    ctx: &ImportContext<'_>,
    row: &NormalizedRow,
    mut raw_data: serde_json::Map<String, serde_json::Value>,
    default_currency: &str,
    options: &RowOptions,
) -> Result<BuiltRow, RowError> {
    let date_raw = row.first(&[ColumnKey::Date, ColumnKey::BookingDate]);
    let transaction_date = match date_raw.and_then(parse_date) {
        Some(date) => date,
        None if options.require_date => return Err(RowError::MissingDate),
        None => {
            tracing::warn!(raw = ?date_raw, "could not parse transaction date, defaulting to today");
            raw_data.insert("date_defaulted".to_string(), serde_json::Value::Bool(true));
            Utc::now().date_naive()
        }
    };

    let value_date = row
        .get(&ColumnKey::ValueDate)
        .and_then(parse_date)
        .unwrap_or(transaction_date);
    let booking_date = row.get(&ColumnKey::BookingDate).and_then(parse_date);

    let (amount, transaction_type) = extract_amount_and_type(row)?;

    let currency = row
        .get(&ColumnKey::Currency)
        .unwrap_or(default_currency)
        .to_string();

    let balance = row.get(&ColumnKey::Balance).and_then(parse_decimal);

    let mut tx = BankTransaction::new(
        ctx.organization_id,
        ctx.bank_account_id,
        transaction_date,
        value_date,
        transaction_type,
        amount,
        &currency,
    )
    .map_err(|e| RowError::InvalidAmount(e.to_string()))?;

    tx.booking_date = booking_date;
    tx.reference = row.get(&ColumnKey::Reference).map(str::to_string);
    tx.description = row.get(&ColumnKey::Description).map(str::to_string);
    tx.counterparty_name = row.get(&ColumnKey::CounterpartyName).map(str::to_string);
    tx.counterparty_account = row.get(&ColumnKey::CounterpartyAccount).map(str::to_string);
    tx.balance_after = balance;
    tx.raw_data = serde_json::Value::Object(raw_data);
    tx.imported_by = ctx.imported_by.map(str::to_string);

    Ok(BuiltRow {
        transaction: tx,
        balance,
    })
}

/// Running statement aggregates over the accepted rows of one file.
#[derive(Debug, Default)]
pub(crate) struct StatementAccumulator {
    pub opening_balance: Option<Decimal>,
    pub closing_balance: Option<Decimal>,
    pub total_debits: Decimal,
    pub total_credits: Decimal,
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
    pub currency: Option<String>,
}

impl StatementAccumulator {
    pub fn observe(&mut self, built: &BuiltRow) {
        let tx = &built.transaction;
        match tx.transaction_type {
            TransactionType::Debit => self.total_debits += tx.amount,
            TransactionType::Credit => self.total_credits += tx.amount,
        }

        let date = tx.transaction_date;
        if self.min_date.map_or(true, |d| date < d) {
            self.min_date = Some(date);
        }
        if self.max_date.map_or(true, |d| date > d) {
            self.max_date = Some(date);
        }

        if let Some(balance) = built.balance {
            if self.opening_balance.is_none() {
                self.opening_balance = Some(balance);
            }
            self.closing_balance = Some(balance);
        }

        if self.currency.is_none() {
            self.currency = Some(tx.currency.clone());
        }
    }
}
