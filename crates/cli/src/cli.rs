//! Clap argument definitions. Command implementations live in `commands`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Concilia - bank statement ingestion and payment matching
#[derive(Parser)]
#[command(name = "concilia")]
#[command(about = "Import bank statements and match payments to invoices", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "concilia.db", global = true)]
    pub db: PathBuf,

    /// Organization all commands operate on
    #[arg(long, default_value = "default", global = true)]
    pub org: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a bank account
    AddAccount {
        /// Display name
        #[arg(long)]
        name: String,

        /// Account number or IBAN
        #[arg(long)]
        number: String,

        /// Bank name
        #[arg(long)]
        bank: String,

        /// Account currency
        #[arg(long, default_value = "EUR")]
        currency: String,
    },

    /// Register an open invoice for matching
    AddInvoice {
        /// Invoice number (e.g. INV-2024-001)
        #[arg(long)]
        number: String,

        /// Invoice total
        #[arg(long)]
        amount: String,

        /// Customer name
        #[arg(long)]
        customer: Option<String>,

        /// Invoice date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
    },

    /// Import a bank statement file (CSV, CAMT.053, MT940, or PDF)
    Import {
        /// Statement file to import
        file: PathBuf,

        /// Target bank account id
        #[arg(long)]
        account: i64,

        /// Skip auto-detection and parse as this format
        #[arg(long)]
        format: Option<String>,
    },

    /// Auto-match all unmatched transactions
    MatchAll {
        /// Restrict to one bank account
        #[arg(long)]
        account: Option<i64>,
    },

    /// Manually match a transaction to an invoice
    ManualMatch {
        /// Transaction id
        #[arg(long)]
        transaction: i64,

        /// Invoice id
        #[arg(long)]
        invoice: String,

        /// User recording the match
        #[arg(long, default_value = "cli")]
        user: String,

        /// Free-form note
        #[arg(long)]
        notes: Option<String>,
    },

    /// Detach a transaction from its matched invoice
    Unmatch {
        /// Transaction id
        transaction: i64,
    },

    /// Reconciliation report for an account and period
    Report {
        /// Bank account id
        #[arg(long)]
        account: i64,

        /// Period start (YYYY-MM-DD)
        #[arg(long)]
        from: String,

        /// Period end (YYYY-MM-DD)
        #[arg(long)]
        to: String,
    },

    /// List unmatched transactions
    List {
        /// Restrict to one bank account
        #[arg(long)]
        account: Option<i64>,
    },
}
