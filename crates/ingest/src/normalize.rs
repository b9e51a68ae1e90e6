//! Shared row normalization for the schemaless decoders (CSV, PDF tables).
//!
//! Headers from arbitrary bank exports are folded onto a closed set of
//! canonical column keys; values go through locale-tolerant decimal and
//! date parsing; amount/type inference runs a fixed rule cascade so a
//! debit can never silently turn into a credit.

use chrono::NaiveDate;
use concilia_core::TransactionType;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::RowError;

/// Canonical column identity after header synonym resolution. Columns that
/// match no synonym keep their normalized name in `Other` so the fallback
/// amount scan can still see them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnKey {
    Date,
    ValueDate,
    BookingDate,
    Description,
    Reference,
    Amount,
    Debit,
    Credit,
    Balance,
    Currency,
    CounterpartyName,
    CounterpartyAccount,
    Indicator,
    Other(String),
}

impl std::fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ColumnKey::Date => "date",
            ColumnKey::ValueDate => "value_date",
            ColumnKey::BookingDate => "booking_date",
            ColumnKey::Description => "description",
            ColumnKey::Reference => "reference",
            ColumnKey::Amount => "amount",
            ColumnKey::Debit => "debit",
            ColumnKey::Credit => "credit",
            ColumnKey::Balance => "balance",
            ColumnKey::Currency => "currency",
            ColumnKey::CounterpartyName => "counterparty_name",
            ColumnKey::CounterpartyAccount => "counterparty_account",
            ColumnKey::Indicator => "indicator",
            ColumnKey::Other(name) => name,
        };
        write!(f, "{s}")
    }
}

/// Lowercase a header, collapse whitespace and punctuation to `_`.
fn normalize_header(header: &str) -> String {
    let mut out = String::with_capacity(header.len());
    let mut last_underscore = true;
    for ch in header.trim().chars() {
        if ch.is_alphanumeric() {
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
            last_underscore = false;
        } else if !last_underscore {
            out.push('_');
            last_underscore = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Map a raw header cell to its canonical column. Exact synonyms first,
/// then the substring rules for headers that embed extra words
/// ("Txn Date", "Debit Amount (EUR)"). Returns `None` for blank headers.
pub fn resolve_column(header: &str) -> Option<ColumnKey> {
    let text = normalize_header(header);
    if text.is_empty() {
        return None;
    }

    let exact = match text.as_str() {
        "date" | "txn_date" | "transaction_date" | "trans_date" | "transaction_dt"
        | "posting_date" => Some(ColumnKey::Date),
        "booking_date" => Some(ColumnKey::BookingDate),
        "value_date" | "valuedate" | "value_dt" => Some(ColumnKey::ValueDate),
        "description" | "details" | "narration" | "particulars" | "remarks" | "memo" => {
            Some(ColumnKey::Description)
        }
        "reference" | "ref" | "ref_no" | "utr" | "utr_no" | "instrument_no" | "cheque_no"
        | "payment_reference" => Some(ColumnKey::Reference),
        "amount" | "amt" | "transaction_amount" | "value" => Some(ColumnKey::Amount),
        "debit" | "dr" | "withdrawal" | "debit_amount" | "amount_dr" | "paid_out"
        | "money_out" => Some(ColumnKey::Debit),
        "credit" | "cr" | "deposit" | "credit_amount" | "amount_cr" | "paid_in" | "money_in" => {
            Some(ColumnKey::Credit)
        }
        "balance" | "balance_amount" | "balance_amt" | "running_balance" | "closing_balance"
        | "opening_balance" | "balance_after" => Some(ColumnKey::Balance),
        "currency" | "currency_code" | "ccy" => Some(ColumnKey::Currency),
        "counterparty_name" | "counterparty" | "beneficiary" | "payer" | "payee"
        | "customer_name" => Some(ColumnKey::CounterpartyName),
        "counterparty_account" | "counterparty_iban" | "account_number" | "account_no"
        | "account" | "iban" | "iban_no" => Some(ColumnKey::CounterpartyAccount),
        "transaction_type" | "type" | "credit_debit_indicator" | "credit_debit" | "cr_dr"
        | "dr_cr" | "direction" | "indicator" | "debitcredit" => Some(ColumnKey::Indicator),
        _ => None,
    };
    if let Some(key) = exact {
        return Some(key);
    }

    // Fuzzy rules, most specific first.
    if text.contains("date") {
        if text.contains("value") {
            return Some(ColumnKey::ValueDate);
        }
        if text.contains("booking") || text.contains("posting") {
            return Some(ColumnKey::BookingDate);
        }
        if text.contains("transaction") || text.contains("txn") {
            return Some(ColumnKey::Date);
        }
    }
    if text.contains("balance") {
        return Some(ColumnKey::Balance);
    }
    if text.contains("debit") || text.ends_with("_dr") {
        return Some(ColumnKey::Debit);
    }
    if text.contains("credit") || text.ends_with("_cr") {
        return Some(ColumnKey::Credit);
    }
    if text.contains("amount") || text.contains("amt") {
        return Some(ColumnKey::Amount);
    }
    if text.contains("currency") || text.contains("ccy") {
        return Some(ColumnKey::Currency);
    }
    if text.contains("reference") || text.contains("ref") || text.contains("utr") {
        return Some(ColumnKey::Reference);
    }
    if text.contains("beneficiary") || text.contains("payee") || text.contains("payer") {
        return Some(ColumnKey::CounterpartyName);
    }

    Some(ColumnKey::Other(text))
}

/// One data row with canonical keys, in source column order. Blank cells
/// are dropped at construction.
#[derive(Debug, Clone, Default)]
pub struct NormalizedRow {
    cols: Vec<(ColumnKey, String)>,
}

impl NormalizedRow {
    pub fn new() -> Self {
        NormalizedRow { cols: Vec::new() }
    }

    /// Pair a header row with a data record. Cells beyond the header are
    /// ignored; missing trailing cells are fine.
    pub fn from_record<'a, I>(headers: &[Option<ColumnKey>], values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut row = NormalizedRow::new();
        for (key, value) in headers.iter().zip(values) {
            if let Some(key) = key {
                row.push(key.clone(), value);
            }
        }
        row
    }

    pub fn push(&mut self, key: ColumnKey, value: &str) {
        let value = value.trim();
        if !value.is_empty() {
            self.cols.push((key, value.to_string()));
        }
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &ColumnKey) -> Option<&str> {
        self.cols
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First value present among `keys`, in the order given.
    pub fn first(&self, keys: &[ColumnKey]) -> Option<&str> {
        keys.iter().find_map(|k| self.get(k))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ColumnKey, &str)> {
        self.cols.iter().map(|(k, v)| (k, v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.cols.is_empty()
    }

    /// Comma-separated column names, for row-level error messages.
    pub fn column_names(&self) -> String {
        self.cols
            .iter()
            .map(|(k, _)| k.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Parse a monetary string that may carry locale or bank decoration.
///
/// Grammar: optional surrounding parentheses (negative), spaces and leading
/// `$`/`€`/`£`/`+` stripped, trailing `CR` keeps the sign and trailing `DR`
/// flips it, then comma/dot disambiguation via `normalize_separators`.
/// Anything else unparseable yields `None`, never a panic.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let mut text = raw.trim();
    if text.is_empty() {
        return None;
    }

    let mut sign = Decimal::ONE;
    if text.starts_with('(') && text.ends_with(')') {
        sign = -sign;
        text = &text[1..text.len() - 1];
    }

    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, ' ' | '$' | '€' | '£' | '+'))
        .collect();
    let mut cleaned = cleaned.as_str();

    let upper = cleaned.to_uppercase();
    if upper.ends_with("CR") {
        cleaned = &cleaned[..cleaned.len() - 2];
    } else if upper.ends_with("DR") {
        sign = -sign;
        cleaned = &cleaned[..cleaned.len() - 2];
    }

    let normalized = normalize_separators(cleaned.trim());
    Decimal::from_str(&normalized).ok().map(|d| d * sign)
}

/// Decide which of `.` and `,` is the decimal separator. When both appear
/// the rightmost one wins ("1,234.56" and "1.234,56" both work). A lone
/// comma is a decimal separator ("-5,50") unless it reads as thousands
/// grouping: every group after the first has exactly three digits and the
/// leading group is short ("1,234", "1,234,567").
fn normalize_separators(text: &str) -> String {
    match (text.rfind('.'), text.rfind(',')) {
        (Some(dot), Some(comma)) => {
            if dot > comma {
                text.replace(',', "")
            } else {
                text.replace('.', "").replace(',', ".")
            }
        }
        (None, Some(_)) => {
            let groups: Vec<&str> = text.split(',').collect();
            let tail_grouped = groups[1..]
                .iter()
                .all(|g| g.len() == 3 && g.bytes().all(|b| b.is_ascii_digit()));
            let lead = groups[0].trim_start_matches('-');
            if tail_grouped && (groups.len() > 2 || lead.len() <= 3) {
                text.replace(',', "")
            } else {
                text.replace(',', ".")
            }
        }
        _ => text.to_string(),
    }
}

pub const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y", "%Y%m%d", "%d-%m-%Y", "%Y/%m/%d",
];

/// Try the supported date layouts in order; first success wins.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Interpret a direction indicator cell ("CR", "debit", "OUT", "+", …).
pub fn infer_type_from_indicator(indicator: &str) -> Option<TransactionType> {
    let text = indicator.trim().to_lowercase();
    if text.is_empty() {
        return None;
    }

    const CREDIT_TOKENS: &[&str] = &["credit", "cr", "c", "in", "+", "deposit"];
    const DEBIT_TOKENS: &[&str] = &["debit", "dr", "d", "out", "-", "withdrawal"];

    if CREDIT_TOKENS.contains(&text.as_str()) {
        return Some(TransactionType::Credit);
    }
    if DEBIT_TOKENS.contains(&text.as_str()) {
        return Some(TransactionType::Debit);
    }
    if text.contains("credit") {
        return Some(TransactionType::Credit);
    }
    if text.contains("debit") {
        return Some(TransactionType::Debit);
    }
    None
}

/// Determine the transaction amount and direction from a normalized row.
///
/// Rules, tried in order until one yields a nonzero amount:
/// 1. a signed amount column — sign decides the type, magnitude is abs;
/// 2. a credit/debit column pair — whichever is present and positive wins;
/// 3. any leftover column whose name mentions amount/amt (balances
///    excluded), with the type taken from the column name, an indicator
///    column, or finally the sign.
pub fn extract_amount_and_type(row: &NormalizedRow) -> Result<(Decimal, TransactionType), RowError> {
    let indicator_type = row
        .get(&ColumnKey::Indicator)
        .and_then(infer_type_from_indicator);

    // 1. Signed single-amount column.
    for (key, value) in row.iter() {
        if *key != ColumnKey::Amount {
            continue;
        }
        if let Some(parsed) = parse_decimal(value) {
            if parsed > Decimal::ZERO {
                return Ok((parsed, TransactionType::Credit));
            }
            if parsed < Decimal::ZERO {
                return Ok((parsed.abs(), TransactionType::Debit));
            }
        }
    }

    // 2. Credit/debit column pair (covers paid in/out, deposit/withdrawal,
    //    money in/out through the synonym table).
    if let Some(credit) = row.get(&ColumnKey::Credit).and_then(parse_decimal) {
        if credit > Decimal::ZERO {
            return Ok((credit, TransactionType::Credit));
        }
    }
    if let Some(debit) = row.get(&ColumnKey::Debit).and_then(parse_decimal) {
        if debit > Decimal::ZERO {
            return Ok((debit, TransactionType::Debit));
        }
    }

    // 3. Fallback scan over unresolved columns that still smell like an
    //    amount.
    for (key, value) in row.iter() {
        let name = match key {
            ColumnKey::Other(name) => name,
            _ => continue,
        };
        if !name.contains("amount") && !name.contains("amt") {
            continue;
        }
        if name.contains("balance") {
            continue;
        }
        let parsed = match parse_decimal(value) {
            Some(p) if !p.is_zero() => p,
            _ => continue,
        };

        if name.contains("credit") || name.ends_with("cr") {
            return Ok((parsed.abs(), TransactionType::Credit));
        }
        if name.contains("debit") || name.ends_with("dr") {
            return Ok((parsed.abs(), TransactionType::Debit));
        }
        if let Some(t) = indicator_type {
            return Ok((parsed.abs(), t));
        }
        if parsed > Decimal::ZERO {
            return Ok((parsed, TransactionType::Credit));
        }
        return Ok((parsed.abs(), TransactionType::Debit));
    }

    Err(RowError::AmountMissing {
        available: row.column_names(),
    })
}
