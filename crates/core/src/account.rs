use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Organization-scoped bank account identity. The running balance is only
/// mutated by statement import (closing balance) or ledger export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankAccount {
    pub id: Option<i64>,
    pub organization_id: String,
    pub account_name: String,
    pub account_number: String,
    pub iban: Option<String>,
    pub swift_bic: Option<String>,
    pub bank_name: String,
    pub currency: String,
    pub opening_balance: Decimal,
    pub current_balance: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BankAccount {
    pub fn new(
        organization_id: &str,
        account_name: &str,
        account_number: &str,
        bank_name: &str,
        currency: &str,
    ) -> Self {
        let now = Utc::now();
        BankAccount {
            id: None,
            organization_id: organization_id.to_string(),
            account_name: account_name.to_string(),
            account_number: account_number.to_string(),
            iban: None,
            swift_bic: None,
            bank_name: bank_name.to_string(),
            currency: currency.to_string(),
            opening_balance: Decimal::ZERO,
            current_balance: Decimal::ZERO,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}
