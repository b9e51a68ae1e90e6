//! The payment matcher: candidate retrieval, scoring, match record
//! creation, manual overrides, and the batch pass over unmatched
//! transactions.

use chrono::Utc;
use concilia_core::{
    BankTransaction, MatchMethod, MatchStatus, PaymentInvoiceMatch, TransactionStatus,
};
use thiserror::Error;

use crate::repo::{BankRepository, CandidateQuery, InvoiceSource, LedgerSink, RepositoryError};
use crate::score::{
    score_candidate, EXACT_MATCH_THRESHOLD, HIGH_CONFIDENCE_THRESHOLD, LOW_CONFIDENCE_THRESHOLD,
    MEDIUM_CONFIDENCE_THRESHOLD,
};

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("transaction {0} not found")]
    TransactionNotFound(i64),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Result of a single automatic match attempt.
#[derive(Debug)]
pub enum MatchOutcome {
    /// A match record was created; the transaction is now matched.
    Matched(PaymentInvoiceMatch),
    /// No candidate reached the confidence floor. Carries the best score
    /// seen, zero when there were no candidates at all.
    NoMatch { best_score: f64 },
}

/// Counters for one batch run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MatchStats {
    pub total_processed: usize,
    pub exact_matches: usize,
    pub high_confidence_matches: usize,
    pub medium_confidence_matches: usize,
    pub unmatched: usize,
    pub failed: usize,
}

pub struct PaymentMatcher<R, S> {
    repo: R,
    invoices: S,
}

impl<R: BankRepository, S: InvoiceSource> PaymentMatcher<R, S> {
    pub fn new(repo: R, invoices: S) -> Self {
        PaymentMatcher { repo, invoices }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Try to match one transaction automatically. Candidates below the
    /// low-confidence floor are never considered; a best candidate below
    /// the medium threshold is reported but not recorded.
    pub async fn match_transaction(&self, transaction_id: i64) -> Result<MatchOutcome, MatchError> {
        let transaction = self
            .repo
            .get_transaction(transaction_id)
            .await?
            .ok_or(MatchError::TransactionNotFound(transaction_id))?;

        self.match_loaded(&transaction).await
    }

    async fn match_loaded(&self, transaction: &BankTransaction) -> Result<MatchOutcome, MatchError> {
        let transaction_id = match transaction.id {
            Some(id) => id,
            None => return Ok(MatchOutcome::NoMatch { best_score: 0.0 }),
        };

        let query = CandidateQuery::for_transaction(transaction);
        let candidates = self.invoices.candidate_invoices(&query).await?;
        if candidates.is_empty() {
            tracing::debug!(transaction_id, "no candidate invoices");
            return Ok(MatchOutcome::NoMatch { best_score: 0.0 });
        }

        let mut best: Option<(f64, Vec<String>, &crate::repo::CandidateInvoice)> = None;
        let mut best_score = 0.0_f64;
        for invoice in &candidates {
            let (score, criteria) = score_candidate(transaction, invoice);
            best_score = best_score.max(score);
            if score >= LOW_CONFIDENCE_THRESHOLD
                && best.as_ref().map_or(true, |(s, _, _)| score > *s)
            {
                best = Some((score, criteria, invoice));
            }
        }

        let (score, criteria, invoice) = match best {
            Some(b) if b.0 >= MEDIUM_CONFIDENCE_THRESHOLD => b,
            _ => return Ok(MatchOutcome::NoMatch { best_score }),
        };

        let match_status = if score >= HIGH_CONFIDENCE_THRESHOLD {
            MatchStatus::AutoMatched
        } else {
            MatchStatus::PartiallyMatched
        };

        let mut payment_match = PaymentInvoiceMatch {
            id: None,
            organization_id: transaction.organization_id.clone(),
            transaction_id,
            invoice_id: Some(invoice.invoice_id.clone()),
            voucher_id: invoice.voucher_id.clone(),
            match_status,
            match_score: score,
            match_method: MatchMethod::Automated,
            matched_amount: transaction.amount,
            criteria_matched: criteria,
            matched_by: None,
            matched_at: Utc::now(),
            notes: Some(format!("Auto-matched with {score}% confidence")),
        };

        let match_id = self.repo.create_payment_match(&payment_match).await?;
        payment_match.id = Some(match_id);

        self.repo
            .attach_invoice_to_transaction(
                transaction_id,
                payment_match.invoice_id.as_deref(),
                payment_match.voucher_id.as_deref(),
            )
            .await?;
        self.repo
            .update_transaction_status(transaction_id, TransactionStatus::Matched, match_status)
            .await?;

        tracing::info!(
            transaction_id,
            match_id,
            score,
            invoice_id = %invoice.invoice_id,
            "created payment match"
        );
        Ok(MatchOutcome::Matched(payment_match))
    }

    /// Run the matcher over every unmatched transaction of an organization
    /// (optionally narrowed to one account). Safe to re-run: transactions
    /// matched by an earlier pass are no longer returned as unmatched.
    pub async fn match_all_unmatched(
        &self,
        organization_id: &str,
        bank_account_id: Option<i64>,
    ) -> Result<MatchStats, MatchError> {
        let transactions = self
            .repo
            .get_unmatched_transactions(organization_id, bank_account_id)
            .await?;

        let mut stats = MatchStats::default();
        for transaction in &transactions {
            stats.total_processed += 1;
            match self.match_loaded(transaction).await {
                Ok(MatchOutcome::Matched(m)) => {
                    if m.match_score >= EXACT_MATCH_THRESHOLD {
                        stats.exact_matches += 1;
                    } else if m.match_score >= HIGH_CONFIDENCE_THRESHOLD {
                        stats.high_confidence_matches += 1;
                    } else {
                        stats.medium_confidence_matches += 1;
                    }
                }
                Ok(MatchOutcome::NoMatch { .. }) => stats.unmatched += 1,
                Err(e) => {
                    tracing::error!(transaction_id = ?transaction.id, error = %e, "match attempt failed");
                    stats.failed += 1;
                }
            }
        }

        tracing::info!(
            organization_id,
            total = stats.total_processed,
            exact = stats.exact_matches,
            high = stats.high_confidence_matches,
            medium = stats.medium_confidence_matches,
            unmatched = stats.unmatched,
            failed = stats.failed,
            "auto-match pass finished"
        );
        Ok(stats)
    }

    /// Record a user-confirmed match. Always full confidence, regardless of
    /// what the scoring rules would say.
    pub async fn manual_match(
        &self,
        transaction_id: i64,
        invoice_id: &str,
        voucher_id: Option<&str>,
        matched_by: &str,
        notes: Option<String>,
    ) -> Result<PaymentInvoiceMatch, MatchError> {
        let transaction = self
            .repo
            .get_transaction(transaction_id)
            .await?
            .ok_or(MatchError::TransactionNotFound(transaction_id))?;

        let mut payment_match = PaymentInvoiceMatch {
            id: None,
            organization_id: transaction.organization_id.clone(),
            transaction_id,
            invoice_id: Some(invoice_id.to_string()),
            voucher_id: voucher_id.map(str::to_string),
            match_status: MatchStatus::ManualMatched,
            match_score: 100.0,
            match_method: MatchMethod::Manual,
            matched_amount: transaction.amount,
            criteria_matched: vec!["manual".to_string()],
            matched_by: Some(matched_by.to_string()),
            matched_at: Utc::now(),
            notes: Some(notes.unwrap_or_else(|| "Manually matched by user".to_string())),
        };

        let match_id = self.repo.create_payment_match(&payment_match).await?;
        payment_match.id = Some(match_id);

        self.repo
            .attach_invoice_to_transaction(transaction_id, Some(invoice_id), voucher_id)
            .await?;
        self.repo
            .update_transaction_status(
                transaction_id,
                TransactionStatus::Matched,
                MatchStatus::ManualMatched,
            )
            .await?;

        tracing::info!(transaction_id, matched_by, "manual match created");
        Ok(payment_match)
    }

    /// Detach a transaction from its invoice. The match record stays as
    /// audit history; only the transaction state is reset.
    pub async fn unmatch_transaction(&self, transaction_id: i64) -> Result<(), MatchError> {
        self.repo
            .get_transaction(transaction_id)
            .await?
            .ok_or(MatchError::TransactionNotFound(transaction_id))?;

        self.repo
            .attach_invoice_to_transaction(transaction_id, None, None)
            .await?;
        self.repo
            .update_transaction_status(
                transaction_id,
                TransactionStatus::Pending,
                MatchStatus::Unmatched,
            )
            .await?;

        tracing::info!(transaction_id, "transaction unmatched");
        Ok(())
    }

    /// Push a matched transaction into the ledger and record the resulting
    /// entry id on the transaction.
    pub async fn export_to_ledger<L: LedgerSink>(
        &self,
        ledger: &L,
        transaction_id: i64,
        payment_match: &PaymentInvoiceMatch,
    ) -> Result<String, MatchError> {
        let transaction = self
            .repo
            .get_transaction(transaction_id)
            .await?
            .ok_or(MatchError::TransactionNotFound(transaction_id))?;

        let entry_id = ledger.create_ledger_entry(&transaction, payment_match).await?;
        self.repo
            .record_ledger_entry(transaction_id, &entry_id)
            .await?;
        tracing::info!(transaction_id, entry_id = %entry_id, "ledger entry recorded");
        Ok(entry_id)
    }
}
