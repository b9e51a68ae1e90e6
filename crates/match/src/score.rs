//! Confidence scoring between a bank transaction and a candidate invoice.
//!
//! Four weighted rule groups, 100 points total:
//!   amount proximity (40), reference/invoice number (30 + 15 from the
//!   description), counterparty name (20), date proximity (10).

use concilia_core::BankTransaction;
use rust_decimal::prelude::ToPrimitive;

use crate::repo::CandidateInvoice;
use crate::util::similarity_ratio;

pub const EXACT_MATCH_THRESHOLD: f64 = 100.0;
pub const HIGH_CONFIDENCE_THRESHOLD: f64 = 90.0;
pub const MEDIUM_CONFIDENCE_THRESHOLD: f64 = 70.0;
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 50.0;

const SIMILARITY_THRESHOLD: f64 = 0.7;

fn upper(value: Option<&str>) -> String {
    value.unwrap_or("").trim().to_uppercase()
}

/// Score one candidate against one transaction. Returns the total score
/// and the names of the rules it satisfied, in rule order.
pub fn score_candidate(
    transaction: &BankTransaction,
    invoice: &CandidateInvoice,
) -> (f64, Vec<String>) {
    let mut score = 0.0;
    let mut criteria: Vec<String> = Vec::new();
    let mut hit = |points: f64, name: &str, score: &mut f64, criteria: &mut Vec<String>| {
        *score += points;
        criteria.push(name.to_string());
    };

    // Amount proximity, relative to the invoice total. A zero-amount
    // invoice can never satisfy an amount rule.
    if !invoice.total_amount.is_zero() {
        let diff = (transaction.amount - invoice.total_amount).abs() / invoice.total_amount;
        let diff = diff.to_f64().unwrap_or(f64::INFINITY);
        if diff < 0.01 {
            hit(40.0, "exact_amount", &mut score, &mut criteria);
        } else if diff < 0.03 {
            hit(35.0, "close_amount", &mut score, &mut criteria);
        } else if diff < 0.05 {
            hit(25.0, "similar_amount", &mut score, &mut criteria);
        }
    }

    // Reference against invoice/voucher number.
    let reference = upper(transaction.reference.as_deref());
    let invoice_number = upper(invoice.invoice_number.as_deref());
    let voucher_number = upper(invoice.voucher_number.as_deref());

    if !reference.is_empty()
        && ((!invoice_number.is_empty() && reference.contains(&invoice_number))
            || (!voucher_number.is_empty() && reference.contains(&voucher_number)))
    {
        hit(30.0, "reference_match", &mut score, &mut criteria);
    } else if !reference.is_empty()
        && !invoice_number.is_empty()
        && similarity_ratio(&reference, &invoice_number) > SIMILARITY_THRESHOLD
    {
        hit(20.0, "partial_reference_match", &mut score, &mut criteria);
    }

    // The description can carry the invoice number too, independently of
    // the reference field.
    let description = upper(transaction.description.as_deref());
    if !invoice_number.is_empty() && description.contains(&invoice_number) {
        hit(15.0, "description_match", &mut score, &mut criteria);
    }

    // Counterparty name against customer/supplier.
    let counterparty = upper(transaction.counterparty_name.as_deref());
    let customer = upper(invoice.customer_name.as_deref());
    let supplier = upper(invoice.supplier_name.as_deref());

    if !counterparty.is_empty()
        && ((!customer.is_empty() && customer.contains(&counterparty))
            || (!supplier.is_empty() && supplier.contains(&counterparty)))
    {
        hit(20.0, "name_exact_match", &mut score, &mut criteria);
    } else if !counterparty.is_empty() && (!customer.is_empty() || !supplier.is_empty()) {
        let name = if customer.is_empty() { &supplier } else { &customer };
        if similarity_ratio(&counterparty, name) > SIMILARITY_THRESHOLD {
            hit(15.0, "name_partial_match", &mut score, &mut criteria);
        }
    }

    // Date proximity.
    if let Some(invoice_date) = invoice.invoice_date {
        let days = (transaction.transaction_date - invoice_date).num_days().abs();
        if days <= 7 {
            hit(10.0, "date_exact", &mut score, &mut criteria);
        } else if days <= 30 {
            hit(7.0, "date_close", &mut score, &mut criteria);
        } else if days <= 60 {
            hit(4.0, "date_similar", &mut score, &mut criteria);
        }
    }

    // Reference and description rules can both fire; cap the reported
    // confidence at 100.
    (score.min(100.0), criteria)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use concilia_core::TransactionType;
    use rust_decimal::Decimal;

    fn tx(amount: i64) -> BankTransaction {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        BankTransaction::new(
            "org-1",
            1,
            date,
            date,
            TransactionType::Credit,
            Decimal::new(amount, 2),
            "EUR",
        )
        .unwrap()
    }

    fn invoice(amount: i64) -> CandidateInvoice {
        CandidateInvoice {
            invoice_id: "inv-1".to_string(),
            voucher_id: None,
            invoice_number: Some("INV-2024-001".to_string()),
            voucher_number: None,
            customer_name: Some("ACME CORP".to_string()),
            supplier_name: None,
            total_amount: Decimal::new(amount, 2),
            invoice_date: NaiveDate::from_ymd_opt(2024, 3, 12),
        }
    }

    #[test]
    fn perfect_match_scores_100() {
        let mut t = tx(100000);
        t.reference = Some("PAYMENT INV-2024-001".to_string());
        t.description = Some("INV-2024-001 settlement".to_string());
        t.counterparty_name = Some("ACME CORP".to_string());

        let (score, criteria) = score_candidate(&t, &invoice(100000));
        // 40 + 30 + 15 + 20 + 10, capped at 100.
        assert_eq!(score, EXACT_MATCH_THRESHOLD);
        assert!(criteria.contains(&"exact_amount".to_string()));
        assert!(criteria.contains(&"reference_match".to_string()));
        assert!(criteria.contains(&"description_match".to_string()));
        assert!(criteria.contains(&"name_exact_match".to_string()));
        assert!(criteria.contains(&"date_exact".to_string()));
    }

    #[test]
    fn amount_tiers() {
        let inv = invoice(100000);
        let (_, c) = score_candidate(&tx(100000), &inv);
        assert!(c.contains(&"exact_amount".to_string()));
        let (_, c) = score_candidate(&tx(102000), &inv); // 2% off
        assert!(c.contains(&"close_amount".to_string()));
        let (_, c) = score_candidate(&tx(104000), &inv); // 4% off
        assert!(c.contains(&"similar_amount".to_string()));
        let (_, c) = score_candidate(&tx(110000), &inv); // 10% off
        assert!(!c.iter().any(|s| s.ends_with("_amount")));
    }

    #[test]
    fn zero_amount_invoice_scores_no_amount_points() {
        let mut inv = invoice(100000);
        inv.total_amount = Decimal::ZERO;
        let (score, criteria) = score_candidate(&tx(100000), &inv);
        assert!(!criteria.iter().any(|s| s.ends_with("_amount")));
        assert!(score < 100.0);
    }

    #[test]
    fn partial_reference_uses_similarity() {
        let mut t = tx(100000);
        t.reference = Some("INV-2024-0O1".to_string()); // one character off
        let (_, criteria) = score_candidate(&t, &invoice(200000));
        assert!(criteria.contains(&"partial_reference_match".to_string()));
    }

    #[test]
    fn name_partial_match_via_similarity() {
        let mut t = tx(100000);
        t.counterparty_name = Some("ACME CORP BV".to_string());
        let (_, criteria) = score_candidate(&t, &invoice(100000));
        assert!(criteria.contains(&"name_partial_match".to_string()));
    }

    #[test]
    fn date_tiers() {
        let mut inv = invoice(100000);
        inv.invoice_date = NaiveDate::from_ymd_opt(2024, 2, 25); // 19 days
        let (_, c) = score_candidate(&tx(100000), &inv);
        assert!(c.contains(&"date_close".to_string()));
        inv.invoice_date = NaiveDate::from_ymd_opt(2024, 1, 20); // 55 days
        let (_, c) = score_candidate(&tx(100000), &inv);
        assert!(c.contains(&"date_similar".to_string()));
        inv.invoice_date = NaiveDate::from_ymd_opt(2023, 12, 1); // 105 days
        let (_, c) = score_candidate(&tx(100000), &inv);
        assert!(!c.iter().any(|s| s.starts_with("date_")));
    }

    #[test]
    fn blank_fields_score_nothing() {
        let t = tx(100000);
        let mut inv = invoice(300000);
        inv.invoice_date = None;
        inv.customer_name = None;
        let (score, criteria) = score_candidate(&t, &inv);
        assert_eq!(score, 0.0);
        assert!(criteria.is_empty());
    }
}
