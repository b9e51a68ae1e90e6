//! ISO 20022 CAMT.053 decoder. A dedicated parser type walks the XML once
//! and exposes statement metadata plus a flat entry list; the decoder then
//! maps those onto the canonical model. Only the first `<Stmt>` element of
//! a file is processed.

use chrono::{NaiveDate, Utc};
use concilia_core::{BankStatement, BankTransaction, StatementFormat, TransactionType};
use quick_xml::events::Event;
use quick_xml::Reader;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::DecodeError;
use crate::parser::ImportContext;

#[derive(Debug, Default, Clone)]
pub struct CamtStatementInfo {
    pub statement_id: Option<String>,
    pub account_iban: Option<String>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub opening_balance: Option<Decimal>,
    pub closing_balance: Option<Decimal>,
    pub currency: Option<String>,
}

/// One `<Ntry>` element, flattened.
#[derive(Debug, Default, Clone)]
pub struct CamtEntry {
    pub amount: Decimal,
    pub currency: Option<String>,
    /// "CRDT" or "DBIT" as found in the file.
    pub credit_debit_indicator: String,
    pub booking_date: Option<NaiveDate>,
    pub value_date: Option<NaiveDate>,
    pub entry_reference: Option<String>,
    pub end_to_end_id: Option<String>,
    pub remittance_information: Option<String>,
    pub debtor_name: Option<String>,
    pub creditor_name: Option<String>,
    pub debtor_account: Option<String>,
    pub creditor_account: Option<String>,
}

impl CamtEntry {
    pub fn is_credit(&self) -> bool {
        self.credit_debit_indicator == "CRDT"
    }

    /// The party on the other side of the entry: the debtor for money in,
    /// the creditor for money out.
    pub fn counterparty_name(&self) -> Option<&str> {
        if self.is_credit() {
            self.debtor_name.as_deref().or(self.creditor_name.as_deref())
        } else {
            self.creditor_name.as_deref().or(self.debtor_name.as_deref())
        }
    }

    pub fn counterparty_account(&self) -> Option<&str> {
        if self.is_credit() {
            self.debtor_account.as_deref().or(self.creditor_account.as_deref())
        } else {
            self.creditor_account.as_deref().or(self.debtor_account.as_deref())
        }
    }
}

/// Single-pass CAMT.053 reader: statement metadata and entries, nothing of
/// the canonical model. Keeps decoder logic testable against plain XML.
pub struct Camt053Parser {
    info: CamtStatementInfo,
    entries: Vec<CamtEntry>,
    skipped: usize,
}

impl Camt053Parser {
    pub fn parse(xml: &str) -> Result<Self, DecodeError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut info = CamtStatementInfo::default();
        let mut entries: Vec<CamtEntry> = Vec::new();
        let mut pending: Option<CamtEntry> = None;
        let mut pending_bad = false;
        let mut skipped = 0usize;

        // Cursor position flags; CAMT reuses tag names at several depths,
        // so parent context is tracked alongside the leaf tags.
        let mut stmt_count = 0u32;
        let mut in_stmt = false;
        let mut in_bal = false;
        let mut bal_code = String::new();
        let mut bal_amount: Option<Decimal> = None;
        let mut in_cd = false;
        let mut in_amt = false;
        let mut amt_ccy = String::new();
        let mut in_cdt_dbt = false;
        let mut in_bookg = false;
        let mut in_val = false;
        let mut in_dt = false;
        let mut in_fr_dt = false;
        let mut in_to_dt = false;
        let mut in_ntry_ref = false;
        let mut in_ustrd = false;
        let mut in_end_to_end = false;
        let mut in_dbtr = false;
        let mut in_cdtr = false;
        let mut in_dbtr_acct = false;
        let mut in_cdtr_acct = false;
        let mut in_nm = false;
        let mut in_iban = false;
        let mut in_acct = false;
        let mut stmt_id_seen = false;
        let mut in_id = false;

        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => match e.local_name().as_ref() {
                    b"Stmt" => {
                        stmt_count += 1;
                        if stmt_count > 1 {
                            // Multi-statement batches: only the first one.
                            tracing::warn!("CAMT.053 file has multiple statements, ignoring all but the first");
                            break;
                        }
                        in_stmt = true;
                    }
                    b"Id" => in_id = true,
                    b"Acct" => in_acct = true,
                    b"IBAN" => in_iban = true,
                    b"Bal" => {
                        in_bal = true;
                        bal_code.clear();
                        bal_amount = None;
                    }
                    b"Cd" => in_cd = true,
                    b"Amt" => {
                        in_amt = true;
                        amt_ccy.clear();
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"Ccy" {
                                if let Ok(v) = String::from_utf8(attr.value.into_owned()) {
                                    amt_ccy = v;
                                }
                            }
                        }
                    }
                    b"CdtDbtInd" => in_cdt_dbt = true,
                    b"BookgDt" => in_bookg = true,
                    b"ValDt" => in_val = true,
                    b"Dt" | b"DtTm" => in_dt = true,
                    b"FrDtTm" | b"FrDt" => in_fr_dt = true,
                    b"ToDtTm" | b"ToDt" => in_to_dt = true,
                    b"NtryRef" => in_ntry_ref = true,
                    b"Ustrd" => in_ustrd = true,
                    b"EndToEndId" => in_end_to_end = true,
                    b"Dbtr" => in_dbtr = true,
                    b"Cdtr" => in_cdtr = true,
                    b"DbtrAcct" => in_dbtr_acct = true,
                    b"CdtrAcct" => in_cdtr_acct = true,
                    b"Nm" => in_nm = true,
                    b"Ntry" => {
                        pending = Some(CamtEntry::default());
                        pending_bad = false;
                    }
                    _ => {}
                },
                Ok(Event::Text(t)) => {
                    let text = t
                        .unescape()
                        .map_err(|e| DecodeError::Xml(e.to_string()))?
                        .to_string();

                    if let Some(entry) = pending.as_mut() {
                        if in_amt {
                            match parse_camt_decimal(&text) {
                                Some(amount) => entry.amount = amount,
                                None => {
                                    // One bad entry must not sink the file.
                                    tracing::warn!(value = %text, "skipping CAMT entry with unparseable amount");
                                    pending_bad = true;
                                }
                            }
                            if !amt_ccy.is_empty() {
                                entry.currency = Some(amt_ccy.clone());
                            }
                        } else if in_cdt_dbt {
                            entry.credit_debit_indicator = text;
                        } else if in_bookg && in_dt {
                            entry.booking_date = parse_camt_date(&text);
                        } else if in_val && in_dt {
                            entry.value_date = parse_camt_date(&text);
                        } else if in_ntry_ref {
                            entry.entry_reference = Some(text);
                        } else if in_end_to_end {
                            entry.end_to_end_id = Some(text);
                        } else if in_ustrd {
                            // Unstructured remittance lines may repeat.
                            match entry.remittance_information.as_mut() {
                                Some(existing) => {
                                    existing.push(' ');
                                    existing.push_str(&text);
                                }
                                None => entry.remittance_information = Some(text),
                            }
                        } else if in_nm && in_dbtr {
                            entry.debtor_name = Some(text);
                        } else if in_nm && in_cdtr {
                            entry.creditor_name = Some(text);
                        } else if in_iban && in_dbtr_acct {
                            entry.debtor_account = Some(text);
                        } else if in_iban && in_cdtr_acct {
                            entry.creditor_account = Some(text);
                        }
                    } else if in_stmt {
                        if in_bal {
                            if in_cd {
                                bal_code = text;
                            } else if in_amt {
                                bal_amount = parse_camt_decimal(&text);
                                if bal_amount.is_none() {
                                    tracing::warn!(value = %text, "unparseable CAMT balance amount");
                                }
                                if info.currency.is_none() && !amt_ccy.is_empty() {
                                    info.currency = Some(amt_ccy.clone());
                                }
                            }
                        } else if in_acct && in_iban {
                            info.account_iban = Some(text);
                        } else if in_id && !stmt_id_seen && !in_acct {
                            info.statement_id = Some(text);
                            stmt_id_seen = true;
                        } else if in_fr_dt {
                            info.from_date = parse_camt_date(&text);
                        } else if in_to_dt {
                            info.to_date = parse_camt_date(&text);
                        }
                    }
                }
                Ok(Event::End(e)) => match e.local_name().as_ref() {
                    b"Stmt" => in_stmt = false,
                    b"Id" => in_id = false,
                    b"Acct" => in_acct = false,
                    b"IBAN" => in_iban = false,
                    b"Bal" => {
                        match bal_code.as_str() {
                            "OPBD" => info.opening_balance = bal_amount,
                            "CLBD" => info.closing_balance = bal_amount,
                            _ => {}
                        }
                        in_bal = false;
                    }
                    b"Cd" => in_cd = false,
                    b"Amt" => in_amt = false,
                    b"CdtDbtInd" => in_cdt_dbt = false,
                    b"BookgDt" => in_bookg = false,
                    b"ValDt" => in_val = false,
                    b"Dt" | b"DtTm" => in_dt = false,
                    b"FrDtTm" | b"FrDt" => in_fr_dt = false,
                    b"ToDtTm" | b"ToDt" => in_to_dt = false,
                    b"NtryRef" => in_ntry_ref = false,
                    b"Ustrd" => in_ustrd = false,
                    b"EndToEndId" => in_end_to_end = false,
                    b"Dbtr" => in_dbtr = false,
                    b"Cdtr" => in_cdtr = false,
                    b"DbtrAcct" => in_dbtr_acct = false,
                    b"CdtrAcct" => in_cdtr_acct = false,
                    b"Nm" => in_nm = false,
                    b"Ntry" => {
                        match pending.take() {
                            Some(entry) if !pending_bad => entries.push(entry),
                            Some(_) => skipped += 1,
                            None => {}
                        }
                        pending_bad = false;
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => return Err(DecodeError::Xml(e.to_string())),
                _ => {}
            }
            buf.clear();
        }

        Ok(Camt053Parser {
            info,
            entries,
            skipped,
        })
    }

    pub fn statement_info(&self) -> &CamtStatementInfo {
        &self.info
    }

    pub fn transactions(&self) -> &[CamtEntry] {
        &self.entries
    }

    /// Entries dropped for unparseable content.
    pub fn skipped_entries(&self) -> usize {
        self.skipped
    }
}

fn parse_camt_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text.trim()).ok()
}

/// CAMT dates may be plain dates or full ISO date-times.
fn parse_camt_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    let date_part = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

pub fn decode_camt053(
    ctx: &ImportContext<'_>,
    bytes: &[u8],
) -> Result<(BankStatement, Vec<BankTransaction>), DecodeError> {
    let xml = std::str::from_utf8(bytes)
        .map_err(|_| DecodeError::Xml("CAMT.053 file is not valid UTF-8".to_string()))?;
    let parser = Camt053Parser::parse(xml)?;
    if parser.skipped_entries() > 0 {
        tracing::warn!(
            skipped = parser.skipped_entries(),
            "CAMT.053 decoding skipped malformed entries"
        );
    }
    let info = parser.statement_info().clone();
    let default_currency = info.currency.clone().unwrap_or_else(|| "EUR".to_string());

    let now = Utc::now();
    let today = now.date_naive();

    let mut transactions = Vec::new();
    let mut total_debits = Decimal::ZERO;
    let mut total_credits = Decimal::ZERO;

    for entry in parser.transactions() {
        let transaction_type = if entry.is_credit() {
            TransactionType::Credit
        } else {
            TransactionType::Debit
        };
        let amount = entry.amount.abs();

        let transaction_date = entry.booking_date.or(entry.value_date).unwrap_or(today);
        let value_date = entry.value_date.or(entry.booking_date).unwrap_or(today);
        let currency = entry.currency.clone().unwrap_or_else(|| default_currency.clone());

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
                tracing::warn!(error = %e, "skipping CAMT entry");
                continue;
            }
        };

        match transaction_type {
            TransactionType::Debit => total_debits += amount,
            TransactionType::Credit => total_credits += amount,
        }

        tx.booking_date = entry.booking_date;
        tx.transaction_id = entry.entry_reference.clone();
        tx.end_to_end_id = entry.end_to_end_id.clone();
        tx.reference = entry.remittance_information.clone();
        tx.description = entry.remittance_information.clone();
        tx.counterparty_name = entry.counterparty_name().map(str::to_string);
        tx.counterparty_account = entry.counterparty_account().map(str::to_string);
        tx.imported_by = ctx.imported_by.map(str::to_string);
        tx.raw_data = serde_json::json!({
            "credit_debit_indicator": entry.credit_debit_indicator,
            "amount": entry.amount.to_string(),
            "currency": entry.currency,
            "booking_date": entry.booking_date.map(|d| d.to_string()),
            "value_date": entry.value_date.map(|d| d.to_string()),
            "entry_reference": entry.entry_reference,
            "end_to_end_id": entry.end_to_end_id,
            "remittance_information": entry.remittance_information,
        });

        transactions.push(tx);
    }

    if transactions.is_empty() {
        return Err(DecodeError::NoTransactions(
            "CAMT.053 statement contained no entries.".to_string(),
        ));
    }

    let statement = BankStatement {
        id: None,
        organization_id: ctx.organization_id.to_string(),
        bank_account_id: ctx.bank_account_id,
        statement_number: info.statement_id.clone(),
        format: StatementFormat::Camt053,
        statement_date: now,
        from_date: info.from_date.unwrap_or(today),
        to_date: info.to_date.unwrap_or(today),
        opening_balance: info.opening_balance.unwrap_or(Decimal::ZERO),
        closing_balance: info.closing_balance.unwrap_or(Decimal::ZERO),
        total_debits,
        total_credits,
        transaction_count: transactions.len(),
        file_name: ctx.file_name.to_string(),
        file_hash: ctx.file_hash.to_string(),
        is_processed: false,
        processed_at: None,
        currency: default_currency,
        created_at: now,
        imported_by: ctx.imported_by.map(str::to_string),
    };

    Ok((statement, transactions))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Document xmlns="urn:iso:std:iso:20022:tech:xsd:camt.053.001.02">
  <BkToCstmrStmt>
    <Stmt>
      <Id>STMT-2024-001</Id>
      <FrToDt>
        <FrDtTm>2024-01-01T00:00:00</FrDtTm>
        <ToDtTm>2024-01-31T23:59:59</ToDtTm>
      </FrToDt>
      <Acct><Id><IBAN>NL91ABNA0417164300</IBAN></Id></Acct>
      <Bal>
        <Tp><CdOrPrtry><Cd>OPBD</Cd></CdOrPrtry></Tp>
        <Amt Ccy="EUR">1000.00</Amt>
        <CdtDbtInd>CRDT</CdtDbtInd>
        <Dt><Dt>2024-01-01</Dt></Dt>
      </Bal>
      <Bal>
        <Tp><CdOrPrtry><Cd>CLBD</Cd></CdOrPrtry></Tp>
        <Amt Ccy="EUR">1080.00</Amt>
        <CdtDbtInd>CRDT</CdtDbtInd>
        <Dt><Dt>2024-01-31</Dt></Dt>
      </Bal>
      <Ntry>
        <NtryRef>ENTRY-1</NtryRef>
        <Amt Ccy="EUR">100.00</Amt>
        <CdtDbtInd>CRDT</CdtDbtInd>
        <BookgDt><Dt>2024-01-10</Dt></BookgDt>
        <ValDt><Dt>2024-01-11</Dt></ValDt>
        <NtryDtls><TxDtls>
          <Refs><EndToEndId>E2E-42</EndToEndId></Refs>
          <RltdPties>
            <Dbtr><Nm>ACME SUPPLIES BV</Nm></Dbtr>
            <DbtrAcct><Id><IBAN>DE89370400440532013000</IBAN></Id></DbtrAcct>
          </RltdPties>
          <RmtInf><Ustrd>INV-2024-17 payment</Ustrd></RmtInf>
        </TxDtls></NtryDtls>
      </Ntry>
      <Ntry>
        <Amt Ccy="EUR">20.00</Amt>
        <CdtDbtInd>DBIT</CdtDbtInd>
        <BookgDt><Dt>2024-01-12</Dt></BookgDt>
        <ValDt><Dt>2024-01-12</Dt></ValDt>
      </Ntry>
    </Stmt>
  </BkToCstmrStmt>
</Document>"#;

    fn ctx<'a>() -> ImportContext<'a> {
        ImportContext {
            organization_id: "org-1",
            bank_account_id: 3,
            file_name: "statement.xml",
            file_hash: "cafebabe",
            imported_by: None,
        }
    }

    #[test]
    fn parser_exposes_statement_info() {
        let parser = Camt053Parser::parse(SAMPLE).unwrap();
        let info = parser.statement_info();
        assert_eq!(info.statement_id.as_deref(), Some("STMT-2024-001"));
        assert_eq!(info.account_iban.as_deref(), Some("NL91ABNA0417164300"));
        assert_eq!(info.opening_balance, Some(Decimal::new(100000, 2)));
        assert_eq!(info.closing_balance, Some(Decimal::new(108000, 2)));
        assert_eq!(info.from_date, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(info.to_date, NaiveDate::from_ymd_opt(2024, 1, 31));
    }

    #[test]
    fn credit_indicator_yields_credit_transaction() {
        let (_, txs) = decode_camt053(&ctx(), SAMPLE.as_bytes()).unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].transaction_type, TransactionType::Credit);
        assert_eq!(txs[0].amount, Decimal::new(10000, 2));
        assert_eq!(txs[0].counterparty_name.as_deref(), Some("ACME SUPPLIES BV"));
        assert_eq!(txs[0].counterparty_account.as_deref(), Some("DE89370400440532013000"));
        assert_eq!(txs[0].reference.as_deref(), Some("INV-2024-17 payment"));
        assert_eq!(txs[0].end_to_end_id.as_deref(), Some("E2E-42"));
        assert_eq!(txs[1].transaction_type, TransactionType::Debit);
    }

    #[test]
    fn statement_totals_and_metadata() {
        let (stmt, _) = decode_camt053(&ctx(), SAMPLE.as_bytes()).unwrap();
        assert_eq!(stmt.format, StatementFormat::Camt053);
        assert_eq!(stmt.statement_number.as_deref(), Some("STMT-2024-001"));
        assert_eq!(stmt.total_credits, Decimal::new(10000, 2));
        assert_eq!(stmt.total_debits, Decimal::new(2000, 2));
        assert_eq!(stmt.opening_balance, Decimal::new(100000, 2));
    }

    #[test]
    fn entry_with_bad_amount_is_skipped_not_fatal() {
        let corrupted = SAMPLE.replace(
            "<Amt Ccy=\"EUR\">100.00</Amt>",
            "<Amt Ccy=\"EUR\">abc</Amt>",
        );
        let (stmt, txs) = decode_camt053(&ctx(), corrupted.as_bytes()).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].transaction_type, TransactionType::Debit);
        assert_eq!(txs[0].amount, Decimal::new(2000, 2));
        assert_eq!(stmt.transaction_count, 1);
    }

    #[test]
    fn only_first_statement_is_processed() {
        let two = SAMPLE.replace(
            "</Stmt>\n  </BkToCstmrStmt>",
            "</Stmt><Stmt><Id>SECOND</Id><Ntry><Amt Ccy=\"EUR\">5.00</Amt><CdtDbtInd>DBIT</CdtDbtInd></Ntry></Stmt>\n  </BkToCstmrStmt>",
        );
        let (stmt, txs) = decode_camt053(&ctx(), two.as_bytes()).unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(stmt.statement_number.as_deref(), Some("STMT-2024-001"));
    }

    #[test]
    fn malformed_xml_is_a_decode_error() {
        let res = Camt053Parser::parse("<Document><Stmt><Ntry>");
        // quick-xml tolerates unclosed tags at EOF, so at minimum we must
        // not panic and must produce zero usable entries.
        if let Ok(parser) = res {
            assert!(parser.transactions().iter().all(|e| e.amount.is_zero()));
        }
    }

    #[test]
    fn zero_entries_is_no_transactions() {
        let empty = r#"<?xml version="1.0"?><Document><BkToCstmrStmt><Stmt><Id>X</Id></Stmt></BkToCstmrStmt></Document>"#;
        let err = decode_camt053(&ctx(), empty.as_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::NoTransactions(_)));
    }
}
