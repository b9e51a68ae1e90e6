//! SWIFT MT940 decoder. The format is line-oriented: each field starts
//! with a `:NN:` tag and may continue on following lines until the next
//! tag. Statement lines (`:61:`) carry a compact fixed grammar; the `:86:`
//! field that follows holds free-form information for that line.

use chrono::{Datelike, NaiveDate, Utc};
use concilia_core::{BankStatement, BankTransaction, StatementFormat, TransactionType};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::DecodeError;
use crate::parser::ImportContext;

/// A `:60F:`/`:62F:` balance: `C240131EUR1234,56`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mt940Balance {
    pub date: NaiveDate,
    pub amount: Decimal,
}

/// One `:61:` statement line plus its trailing `:86:` information.
#[derive(Debug, Clone, Default)]
pub struct Mt940Line {
    pub value_date: Option<NaiveDate>,
    pub booking_date: Option<NaiveDate>,
    pub transaction_type: Option<TransactionType>,
    pub amount: Decimal,
    pub type_code: Option<String>,
    pub customer_reference: Option<String>,
    pub bank_reference: Option<String>,
    pub information: Option<String>,
}

#[derive(Debug, Default)]
pub struct Mt940Statement {
    pub transaction_reference: Option<String>,
    pub account_id: Option<String>,
    pub statement_number: Option<String>,
    pub currency: Option<String>,
    pub opening_balance: Option<Mt940Balance>,
    pub closing_balance: Option<Mt940Balance>,
    pub lines: Vec<Mt940Line>,
}

/// Split raw text into `(tag, body)` fields. Continuation lines are folded
/// into the preceding field separated by newlines.
fn split_fields(text: &str) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = Vec::new();
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line == "-" {
            continue;
        }
        if let Some(rest) = line.strip_prefix(':') {
            if let Some(end) = rest.find(':') {
                let tag = &rest[..end];
                if !tag.is_empty() && tag.len() <= 3 {
                    fields.push((tag.to_string(), rest[end + 1..].to_string()));
                    continue;
                }
            }
        }
        if let Some((_, body)) = fields.last_mut() {
            body.push('\n');
            body.push_str(line);
        }
    }
    fields
}

/// `C240105EUR1234,56` or `D240105EUR12,00`. Debit balances come back
/// negative.
fn parse_balance(body: &str) -> Result<(Mt940Balance, String), DecodeError> {
    let body = body.trim();
    let bad = || DecodeError::Mt940(format!("malformed balance field '{body}'"));
    let mut chars = body.chars();
    let mark = chars.next().ok_or_else(bad)?;
    let rest: String = chars.collect();
    // SWIFT fields are ASCII; anything else would break byte indexing.
    if rest.len() < 10 || !rest.is_ascii() {
        return Err(bad());
    }
    let date = parse_yymmdd(&rest[..6]).ok_or_else(bad)?;
    let currency = rest[6..9].to_string();
    let mut amount = parse_swift_amount(&rest[9..]).ok_or_else(bad)?;
    if mark == 'D' || mark == 'd' {
        amount = -amount;
    }
    Ok((Mt940Balance { date, amount }, currency))
}

/// Comma decimal separator, no thousands grouping.
fn parse_swift_amount(text: &str) -> Option<Decimal> {
    let normalized = text.trim().replace(',', ".");
    Decimal::from_str(&normalized).ok()
}

fn parse_yymmdd(text: &str) -> Option<NaiveDate> {
    if text.len() != 6 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let yy: i32 = text[..2].parse().ok()?;
    let mm: u32 = text[2..4].parse().ok()?;
    let dd: u32 = text[4..6].parse().ok()?;
    NaiveDate::from_ymd_opt(2000 + yy, mm, dd)
}

/// `:61:` grammar: value date YYMMDD, optional booking date MMDD, a
/// debit/credit mark (C, D, RC, RD, with an optional funds code letter),
/// amount with comma decimals, transaction type (N/S/F + 3 chars), then
/// customer reference, optionally `//` and a bank reference.
fn parse_statement_line(body: &str) -> Result<Mt940Line, DecodeError> {
    let first_line = body.lines().next().unwrap_or("").trim();
    let bad = |what: &str| DecodeError::Mt940(format!("{what} in statement line '{first_line}'"));

    let bytes = first_line.as_bytes();
    if bytes.len() < 10 {
        return Err(bad("truncated field"));
    }
    if !first_line.is_ascii() {
        return Err(bad("non-ASCII characters"));
    }
    let value_date = parse_yymmdd(&first_line[..6]).ok_or_else(|| bad("invalid value date"))?;
    let mut pos = 6;

    // Optional booking date: 4 digits, month/day within the value year.
    let mut booking_date = None;
    if bytes.len() >= pos + 4 && bytes[pos..pos + 4].iter().all(u8::is_ascii_digit) {
        let mm: u32 = first_line[pos..pos + 2].parse().unwrap_or(0);
        let dd: u32 = first_line[pos + 2..pos + 4].parse().unwrap_or(0);
        if let Some(d) = NaiveDate::from_ymd_opt(value_date.year(), mm, dd) {
            booking_date = Some(d);
            pos += 4;
        }
    }

    // Debit/credit mark. Reversals flip direction.
    let (transaction_type, mark_len) = match &first_line[pos..] {
        s if s.starts_with("RC") => (TransactionType::Debit, 2),
        s if s.starts_with("RD") => (TransactionType::Credit, 2),
        s if s.starts_with('C') => (TransactionType::Credit, 1),
        s if s.starts_with('D') => (TransactionType::Debit, 1),
        _ => return Err(bad("missing debit/credit mark")),
    };
    pos += mark_len;

    // Optional single-letter funds code before the amount.
    if bytes.get(pos).is_some_and(|b| b.is_ascii_alphabetic()) {
        pos += 1;
    }

    let amount_end = first_line[pos..]
        .find(|c: char| !c.is_ascii_digit() && c != ',')
        .map(|i| pos + i)
        .unwrap_or(first_line.len());
    let amount =
        parse_swift_amount(&first_line[pos..amount_end]).ok_or_else(|| bad("invalid amount"))?;
    pos = amount_end;

    let mut line = Mt940Line {
        value_date: Some(value_date),
        booking_date,
        transaction_type: Some(transaction_type),
        amount,
        ..Default::default()
    };

    let remainder = &first_line[pos..];
    if remainder.len() >= 4 {
        line.type_code = Some(remainder[..4].to_string());
        let refs = &remainder[4..];
        match refs.split_once("//") {
            Some((customer, bank)) => {
                if !customer.is_empty() {
                    line.customer_reference = Some(customer.to_string());
                }
                if !bank.is_empty() {
                    line.bank_reference = Some(bank.to_string());
                }
            }
            None => {
                if !refs.is_empty() {
                    line.customer_reference = Some(refs.to_string());
                }
            }
        }
    }

    Ok(line)
}

pub fn parse_mt940(text: &str) -> Result<Mt940Statement, DecodeError> {
    let fields = split_fields(text);
    if fields.is_empty() {
        return Err(DecodeError::Mt940("no MT940 fields found".to_string()));
    }
    if !fields.iter().any(|(tag, _)| tag == "20") {
        return Err(DecodeError::Mt940(
            "missing :20: transaction reference field".to_string(),
        ));
    }

    let mut stmt = Mt940Statement::default();
    let mut blocks = 0u32;
    for (tag, body) in fields {
        if tag == "20" {
            blocks += 1;
            if blocks > 1 {
                // Multi-statement files: only the first block.
                tracing::warn!("MT940 file has multiple statement blocks, ignoring all but the first");
                break;
            }
        }
        match tag.as_str() {
            "20" => stmt.transaction_reference = Some(body.trim().to_string()),
            "25" => stmt.account_id = Some(body.trim().to_string()),
            "28C" | "28" => stmt.statement_number = Some(body.trim().to_string()),
            "60F" | "60M" => {
                let (balance, currency) = parse_balance(&body)?;
                if stmt.opening_balance.is_none() {
                    stmt.opening_balance = Some(balance);
                    stmt.currency = Some(currency);
                }
            }
            "62F" | "62M" => {
                let (balance, currency) = parse_balance(&body)?;
                stmt.closing_balance = Some(balance);
                if stmt.currency.is_none() {
                    stmt.currency = Some(currency);
                }
            }
            "61" => stmt.lines.push(parse_statement_line(&body)?),
            "86" => {
                // Information belongs to the preceding :61: line.
                if let Some(line) = stmt.lines.last_mut() {
                    let info = body.replace('\n', " ").trim().to_string();
                    if !info.is_empty() {
                        line.information = Some(info);
                    }
                }
            }
            _ => {}
        }
    }

    Ok(stmt)
}

pub fn decode_mt940(
    ctx: &ImportContext<'_>,
    bytes: &[u8],
) -> Result<(BankStatement, Vec<BankTransaction>), DecodeError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| DecodeError::Mt940("MT940 file is not valid UTF-8".to_string()))?;
    let parsed = parse_mt940(text)?;

    let now = Utc::now();
    let today = now.date_naive();
    let currency = parsed.currency.clone().unwrap_or_else(|| "EUR".to_string());

    let mut transactions = Vec::new();
    let mut total_debits = Decimal::ZERO;
    let mut total_credits = Decimal::ZERO;

    for line in &parsed.lines {
        let transaction_type = match line.transaction_type {
            Some(t) => t,
            None => continue,
        };
        let amount = line.amount.abs();
        let value_date = line.value_date.unwrap_or(today);
        let transaction_date = line.booking_date.or(line.value_date).unwrap_or(today);

        let mut tx = match BankTransaction::new(
            ctx.organization_id,
            ctx.bank_account_id,
            transaction_date,
            value_date,
            transaction_type,
            amount,
            &currency,
        ) {
            Ok(tx) => tx,
            Err(e) => {
                tracing::warn!(error = %e, "skipping MT940 statement line");
                continue;
            }
        };

        match transaction_type {
            TransactionType::Debit => total_debits += amount,
            TransactionType::Credit => total_credits += amount,
        }

        tx.booking_date = line.booking_date;
        tx.reference = line.customer_reference.clone();
        tx.transaction_id = line.bank_reference.clone();
        tx.description = line.information.clone();
        tx.imported_by = ctx.imported_by.map(str::to_string);
        tx.raw_data = serde_json::json!({
            "value_date": line.value_date.map(|d| d.to_string()),
            "booking_date": line.booking_date.map(|d| d.to_string()),
            "amount": line.amount.to_string(),
            "type_code": line.type_code,
            "customer_reference": line.customer_reference,
            "bank_reference": line.bank_reference,
            "information": line.information,
        });

        transactions.push(tx);
    }

    if transactions.is_empty() {
        return Err(DecodeError::NoTransactions(
            "MT940 statement contained no :61: lines.".to_string(),
        ));
    }

    let from_date = parsed
        .opening_balance
        .map(|b| b.date)
        .or_else(|| transactions.iter().map(|t| t.transaction_date).min())
        .unwrap_or(today);
    let to_date = parsed
        .closing_balance
        .map(|b| b.date)
        .or_else(|| transactions.iter().map(|t| t.transaction_date).max())
        .unwrap_or(today);

    let statement = BankStatement {
        id: None,
        organization_id: ctx.organization_id.to_string(),
        bank_account_id: ctx.bank_account_id,
        statement_number: parsed
            .statement_number
            .clone()
            .or_else(|| parsed.transaction_reference.clone()),
        format: StatementFormat::Mt940,
        statement_date: now,
        from_date,
        to_date,
        opening_balance: parsed.opening_balance.map(|b| b.amount).unwrap_or(Decimal::ZERO),
        closing_balance: parsed.closing_balance.map(|b| b.amount).unwrap_or(Decimal::ZERO),
        total_debits,
        total_credits,
        transaction_count: transactions.len(),
        file_name: ctx.file_name.to_string(),
        file_hash: ctx.file_hash.to_string(),
        is_processed: false,
        processed_at: None,
        currency,
        created_at: now,
        imported_by: ctx.imported_by.map(str::to_string),
    };

    Ok((statement, transactions))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
:20:STARTUMSE
:25:DEUTDEFF/1234567890
:28C:00001/001
:60F:C240101EUR5000,00
:61:2401050105CN100,50NTRFINV-2024-001//BANKREF1
:86:PAYMENT INVOICE INV-2024-001 ACME CORP
:61:240110D25,00NCHGFEES
:86:ACCOUNT MAINTENANCE FEE
:62F:C240131EUR5075,50
-";

    fn ctx<'a>() -> ImportContext<'a> {
        ImportContext {
            organization_id: "org-1",
            bank_account_id: 9,
            file_name: "january.sta",
            file_hash: "deadbeef",
            imported_by: Some("tester"),
        }
    }

    #[test]
    fn balance_grammar() {
        let (bal, ccy) = parse_balance("C240105EUR1234,56").unwrap();
        assert_eq!(ccy, "EUR");
        assert_eq!(bal.date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(bal.amount, Decimal::new(123456, 2));

        let (bal, _) = parse_balance("D240105EUR12,00").unwrap();
        assert_eq!(bal.amount, Decimal::new(-1200, 2));
    }

    #[test]
    fn statement_line_with_booking_date_and_refs() {
        let line = parse_statement_line("2401050105CN100,50NTRFINV-2024-001//BANKREF1").unwrap();
        assert_eq!(line.value_date, NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(line.booking_date, NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(line.transaction_type, Some(TransactionType::Credit));
        assert_eq!(line.amount, Decimal::new(10050, 2));
        assert_eq!(line.type_code.as_deref(), Some("NTRF"));
        assert_eq!(line.customer_reference.as_deref(), Some("INV-2024-001"));
        assert_eq!(line.bank_reference.as_deref(), Some("BANKREF1"));
    }

    #[test]
    fn statement_line_without_booking_date() {
        let line = parse_statement_line("240110D25,00NCHGFEES").unwrap();
        assert_eq!(line.booking_date, None);
        assert_eq!(line.transaction_type, Some(TransactionType::Debit));
        assert_eq!(line.amount, Decimal::new(2500, 2));
        assert_eq!(line.customer_reference.as_deref(), Some("FEES"));
    }

    #[test]
    fn reversal_marks_flip_direction() {
        let line = parse_statement_line("240110RC25,00NRTI").unwrap();
        assert_eq!(line.transaction_type, Some(TransactionType::Debit));
        let line = parse_statement_line("240110RD25,00NRTI").unwrap();
        assert_eq!(line.transaction_type, Some(TransactionType::Credit));
    }

    #[test]
    fn multibyte_input_is_an_error_not_a_panic() {
        let err = parse_statement_line("24010é5C50,00NTRF").unwrap_err();
        assert!(matches!(err, DecodeError::Mt940(_)));
        let err = parse_balance("C24010éEUR1,00").unwrap_err();
        assert!(matches!(err, DecodeError::Mt940(_)));
    }

    #[test]
    fn only_first_statement_block_is_processed() {
        let two = "\
:20:FIRST
:25:ACCT
:60F:C240101EUR0,00
:61:240105C10,00NTRFNONREF
:62F:C240131EUR10,00
:20:SECOND
:25:ACCT
:60F:C240201EUR10,00
:61:240205C99,00NTRFNONREF
:62F:C240229EUR109,00";
        let parsed = parse_mt940(two).unwrap();
        assert_eq!(parsed.transaction_reference.as_deref(), Some("FIRST"));
        assert_eq!(parsed.lines.len(), 1);
        assert_eq!(
            parsed.closing_balance.map(|b| b.amount),
            Some(Decimal::new(1000, 2))
        );
    }

    #[test]
    fn full_statement_decodes() {
        let (stmt, txs) = decode_mt940(&ctx(), SAMPLE.as_bytes()).unwrap();
        assert_eq!(stmt.format, StatementFormat::Mt940);
        assert_eq!(stmt.statement_number.as_deref(), Some("00001/001"));
        assert_eq!(stmt.opening_balance, Decimal::new(500000, 2));
        assert_eq!(stmt.closing_balance, Decimal::new(507550, 2));
        assert_eq!(stmt.from_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(stmt.to_date, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        assert_eq!(stmt.currency, "EUR");

        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].transaction_type, TransactionType::Credit);
        assert_eq!(txs[0].reference.as_deref(), Some("INV-2024-001"));
        assert_eq!(
            txs[0].description.as_deref(),
            Some("PAYMENT INVOICE INV-2024-001 ACME CORP")
        );
        assert_eq!(txs[1].transaction_type, TransactionType::Debit);
        assert_eq!(txs[1].amount, Decimal::new(2500, 2));
    }

    #[test]
    fn multiline_information_is_folded() {
        let text = "\
:20:REF
:25:ACCT
:60F:C240101EUR0,00
:61:240105C10,00NTRFNONREF
:86:LINE ONE
LINE TWO
:62F:C240131EUR10,00";
        let parsed = parse_mt940(text).unwrap();
        assert_eq!(
            parsed.lines[0].information.as_deref(),
            Some("LINE ONE LINE TWO")
        );
    }

    #[test]
    fn text_without_header_tag_fails() {
        let err = parse_mt940("just,a,csv\n1,2,3").unwrap_err();
        assert!(matches!(err, DecodeError::Mt940(_)));
    }

    #[test]
    fn header_but_no_lines_is_no_transactions() {
        let text = ":20:REF\n:25:ACCT\n:60F:C240101EUR0,00\n:62F:C240131EUR0,00";
        let err = decode_mt940(&ctx(), text.as_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::NoTransactions(_)));
    }
}
