pub mod db;
pub mod store;

pub use db::{
    attach_invoice, bulk_create_transactions, candidate_invoices, create_bank_account,
    create_db, create_db_in_memory, create_ledger_entry, create_payment_match, create_statement,
    get_bank_account, get_matches_for_transaction, get_statement, get_statement_by_hash,
    get_transaction, get_unmatched_transactions, insert_invoice, mark_statement_processed,
    set_ledger_entry, transactions_in_period, update_account_balance, update_transaction_status,
    DbPool, InvoiceRecord, InvoiceStatus,
};
pub use store::SqliteStore;
