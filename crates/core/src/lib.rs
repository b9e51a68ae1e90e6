pub mod account;
pub mod matching;
pub mod report;
pub mod statement;
pub mod transaction;

pub use account::BankAccount;
pub use matching::{MatchMethod, PaymentInvoiceMatch};
pub use report::ReconciliationReport;
pub use statement::{BankStatement, StatementFormat};
pub use transaction::{BankTransaction, MatchStatus, TransactionStatus, TransactionType};
