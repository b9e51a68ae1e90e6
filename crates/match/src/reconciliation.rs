//! Reconciliation report over a set of transactions. Pure aggregation; the
//! caller supplies the period's transactions and statement balances.

use chrono::{NaiveDate, Utc};
use concilia_core::{BankTransaction, ReconciliationReport, TransactionType};
use rust_decimal::Decimal;

/// Build a report for one account and period. `opening_balance` and
/// `closing_balance` come from the bank statements; the book balance is
/// recomputed from the transactions themselves, so `difference` exposes
/// anything the statements claim that the transactions do not show.
pub fn build_report(
    organization_id: &str,
    bank_account_id: i64,
    from_date: NaiveDate,
    to_date: NaiveDate,
    opening_balance: Decimal,
    closing_balance: Decimal,
    transactions: &[BankTransaction],
) -> ReconciliationReport {
    let mut matched_debits = Decimal::ZERO;
    let mut matched_credits = Decimal::ZERO;
    let mut unmatched_debits = Decimal::ZERO;
    let mut unmatched_credits = Decimal::ZERO;
    let mut matched = 0usize;

    for tx in transactions {
        let is_matched = !tx.is_unmatched();
        if is_matched {
            matched += 1;
        }
        match (tx.transaction_type, is_matched) {
            (TransactionType::Debit, true) => matched_debits += tx.amount,
            (TransactionType::Debit, false) => unmatched_debits += tx.amount,
            (TransactionType::Credit, true) => matched_credits += tx.amount,
            (TransactionType::Credit, false) => unmatched_credits += tx.amount,
        }
    }

    let total_credits = matched_credits + unmatched_credits;
    let total_debits = matched_debits + unmatched_debits;
    let book_balance = opening_balance + total_credits - total_debits;
    let bank_balance = closing_balance;
    let difference = bank_balance - book_balance;
    let unmatched_count = transactions.len() - matched;

    ReconciliationReport {
        organization_id: organization_id.to_string(),
        bank_account_id,
        from_date,
        to_date,
        opening_balance,
        closing_balance,
        book_balance,
        bank_balance,
        difference,
        total_transactions: transactions.len(),
        matched_transactions: matched,
        unmatched_transactions: unmatched_count,
        matched_debits,
        matched_credits,
        unmatched_debits,
        unmatched_credits,
        is_reconciled: difference.is_zero() && unmatched_count == 0,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concilia_core::{MatchStatus, TransactionStatus};

    fn tx(amount: i64, tt: TransactionType, matched: bool) -> BankTransaction {
        let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let mut t = BankTransaction::new("org-1", 1, date, date, tt, Decimal::new(amount, 2), "EUR")
            .unwrap();
        if matched {
            t.status = TransactionStatus::Matched;
            t.match_status = MatchStatus::AutoMatched;
        }
        t
    }

    fn period() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
    }

    #[test]
    fn balanced_period_reconciles() {
        let (from, to) = period();
        let txs = vec![
            tx(10000, TransactionType::Credit, true),
            tx(4000, TransactionType::Debit, true),
        ];
        // 1000 + 100 - 40 = 1060
        let report = build_report(
            "org-1",
            1,
            from,
            to,
            Decimal::new(100000, 2),
            Decimal::new(106000, 2),
            &txs,
        );
        assert!(report.is_reconciled);
        assert_eq!(report.difference, Decimal::ZERO);
        assert_eq!(report.matched_transactions, 2);
        assert_eq!(report.unmatched_transactions, 0);
        assert_eq!(report.matched_credits, Decimal::new(10000, 2));
        assert_eq!(report.matched_debits, Decimal::new(4000, 2));
    }

    #[test]
    fn unmatched_activity_blocks_reconciliation() {
        let (from, to) = period();
        let txs = vec![
            tx(10000, TransactionType::Credit, true),
            tx(2500, TransactionType::Debit, false),
        ];
        let report = build_report(
            "org-1",
            1,
            from,
            to,
            Decimal::new(100000, 2),
            Decimal::new(107500, 2),
            &txs,
        );
        // Balances line up but an unmatched debit remains.
        assert_eq!(report.difference, Decimal::ZERO);
        assert!(!report.is_reconciled);
        assert_eq!(report.unmatched_debits, Decimal::new(2500, 2));
    }

    #[test]
    fn balance_gap_shows_in_difference() {
        let (from, to) = period();
        let txs = vec![tx(10000, TransactionType::Credit, true)];
        let report = build_report(
            "org-1",
            1,
            from,
            to,
            Decimal::new(100000, 2),
            Decimal::new(115000, 2),
            &txs,
        );
        // Bank claims 1150 but 1000 + 100 books only 1100.
        assert_eq!(report.difference, Decimal::new(5000, 2));
        assert!(!report.is_reconciled);
    }
}
