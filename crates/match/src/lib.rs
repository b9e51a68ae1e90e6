pub mod engine;
pub mod reconciliation;
pub mod repo;
pub mod score;
pub mod util;

pub use engine::{MatchError, MatchOutcome, MatchStats, PaymentMatcher};
pub use reconciliation::build_report;
pub use repo::{
    BankRepository, CandidateInvoice, CandidateQuery, InvoiceSource, LedgerSink, RepositoryError,
};
pub use score::{
    score_candidate, EXACT_MATCH_THRESHOLD, HIGH_CONFIDENCE_THRESHOLD, LOW_CONFIDENCE_THRESHOLD,
    MEDIUM_CONFIDENCE_THRESHOLD,
};
