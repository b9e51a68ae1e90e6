pub mod camt053;
pub mod csv;
pub mod detect;
pub mod error;
pub mod excel;
pub mod hash;
pub mod mt940;
pub mod normalize;
pub mod parser;
pub mod pdf;
pub(crate) mod rows;

pub use detect::{candidate_formats, detect_format};
pub use error::{DecodeError, RowError};
pub use normalize::{ColumnKey, NormalizedRow};
pub use parser::{FormatAttempt, ParseError, StatementParser};

use concilia_core::{BankStatement, BankTransaction, StatementFormat};

/// One-shot parse entry point for callers that do not need to keep a
/// configured [`StatementParser`] around.
pub fn parse(
    organization_id: &str,
    bank_account_id: i64,
    bytes: &[u8],
    file_name: &str,
    format_hint: Option<StatementFormat>,
    imported_by: Option<&str>,
) -> Result<(BankStatement, Vec<BankTransaction>), ParseError> {
    StatementParser::new(organization_id, bank_account_id).parse_file(
        bytes,
        file_name,
        format_hint,
        imported_by,
    )
}
