//! Concilia CLI
//!
//! Usage:
//!   concilia add-account --name Main --number NL91... --bank "ABN AMRO"
//!   concilia add-invoice --number INV-2024-001 --amount 1250.00
//!   concilia import statement.csv --account 1
//!   concilia match-all
//!   concilia report --account 1 --from 2024-01-01 --to 2024-01-31

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let pool = concilia_storage::create_db(&cli.db).await?;

    match cli.command {
        Commands::AddAccount {
            name,
            number,
            bank,
            currency,
        } => commands::cmd_add_account(&pool, &cli.org, &name, &number, &bank, &currency).await,
        Commands::AddInvoice {
            number,
            amount,
            customer,
            date,
        } => commands::cmd_add_invoice(&pool, &cli.org, &number, &amount, customer, date).await,
        Commands::Import {
            file,
            account,
            format,
        } => commands::cmd_import(&pool, &cli.org, &file, account, format).await,
        Commands::MatchAll { account } => commands::cmd_match_all(&pool, &cli.org, account).await,
        Commands::ManualMatch {
            transaction,
            invoice,
            user,
            notes,
        } => commands::cmd_manual_match(&pool, transaction, &invoice, &user, notes).await,
        Commands::Unmatch { transaction } => commands::cmd_unmatch(&pool, transaction).await,
        Commands::Report { account, from, to } => {
            commands::cmd_report(&pool, &cli.org, account, &from, &to).await
        }
        Commands::List { account } => commands::cmd_list(&pool, &cli.org, account).await,
    }
}
