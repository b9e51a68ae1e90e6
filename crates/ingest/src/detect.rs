use concilia_core::StatementFormat;

const EXCEL_EXTENSIONS: &[&str] = &[".xlsx", ".xlsm", ".xlsb", ".xls"];

/// Best-guess format for a statement upload, from the filename extension
/// first and the byte content second. Never fails; the worst case is the
/// CSV default.
pub fn detect_format(bytes: &[u8], file_name: &str) -> StatementFormat {
    let name = file_name.to_lowercase();

    if name.ends_with(".xml") {
        if let Ok(text) = std::str::from_utf8(bytes) {
            if text.contains("camt.053") || text.contains("BkToCstmrStmt") {
                return StatementFormat::Camt053;
            }
        }
    }

    if name.ends_with(".csv") || EXCEL_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
        // Workbook uploads ride the CSV path; the CSV decoder owns the
        // worksheet conversion.
        return StatementFormat::Csv;
    }

    if name.ends_with(".txt") || name.ends_with(".mt940") || name.ends_with(".sta") {
        return StatementFormat::Mt940;
    }

    if name.ends_with(".pdf") {
        return StatementFormat::Pdf;
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => {
            if text.contains("<?xml") && text.contains("camt.053") {
                StatementFormat::Camt053
            } else if text.contains(":20:") && text.contains(":25:") {
                StatementFormat::Mt940
            } else {
                StatementFormat::Csv
            }
        }
        Err(_) => {
            if bytes.starts_with(b"%PDF") {
                StatementFormat::Pdf
            } else {
                StatementFormat::Csv
            }
        }
    }
}

/// Ordered, de-duplicated list of formats the orchestrator should attempt:
/// caller hint first, then the extension-based detection, then a pure
/// content sniff (catches mislabeled files like MT940 text saved as .csv),
/// then PDF when the byte stream is sniffable as one.
pub fn candidate_formats(
    bytes: &[u8],
    file_name: &str,
    hint: Option<StatementFormat>,
) -> Vec<StatementFormat> {
    let mut formats = Vec::with_capacity(4);
    let mut push = |fmt: StatementFormat, formats: &mut Vec<StatementFormat>| {
        if !formats.contains(&fmt) {
            formats.push(fmt);
        }
    };

    if let Some(fmt) = hint {
        push(fmt, &mut formats);
    }
    push(detect_format(bytes, file_name), &mut formats);
    push(detect_format(bytes, ""), &mut formats);
    if looks_like_pdf(bytes, file_name) {
        push(StatementFormat::Pdf, &mut formats);
    }

    formats
}

fn looks_like_pdf(bytes: &[u8], file_name: &str) -> bool {
    file_name.to_lowercase().ends_with(".pdf") || bytes.starts_with(b"%PDF")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_rules() {
        assert_eq!(detect_format(b"a,b,c", "export.csv"), StatementFormat::Csv);
        assert_eq!(detect_format(b"", "statement.mt940"), StatementFormat::Mt940);
        assert_eq!(detect_format(b"", "statement.sta"), StatementFormat::Mt940);
        assert_eq!(detect_format(b"%PDF-1.7", "scan.pdf"), StatementFormat::Pdf);
        assert_eq!(detect_format(b"", "book.xlsx"), StatementFormat::Csv);
    }

    #[test]
    fn xml_extension_requires_camt_marker() {
        let camt = br#"<?xml version="1.0"?><Document xmlns="urn:iso:std:iso:20022:tech:xsd:camt.053.001.02"/>"#;
        assert_eq!(detect_format(camt, "stmt.xml"), StatementFormat::Camt053);
        // Unrelated XML falls through to content rules, then the CSV default.
        assert_eq!(detect_format(b"<?xml version=\"1.0\"?><foo/>", "stmt.xml"), StatementFormat::Csv);
    }

    #[test]
    fn content_rules_without_extension() {
        assert_eq!(
            detect_format(b":20:REF001\n:25:NL91ABNA0417164300\n", "upload"),
            StatementFormat::Mt940
        );
        assert_eq!(detect_format(b"date,amount\n2024-01-05,1.00\n", "upload"), StatementFormat::Csv);
    }

    #[test]
    fn detection_is_pure() {
        let bytes = b":20:REF\n:25:ACCT\n";
        let first = candidate_formats(bytes, "upload.csv", None);
        let second = candidate_formats(bytes, "upload.csv", None);
        assert_eq!(first, second);
    }

    #[test]
    fn candidates_hint_first_then_detected_then_pdf() {
        let bytes = b"%PDF-1.4 binary";
        let formats = candidate_formats(bytes, "statement.csv", Some(StatementFormat::Mt940));
        assert_eq!(
            formats,
            vec![StatementFormat::Mt940, StatementFormat::Csv, StatementFormat::Pdf]
        );
    }

    #[test]
    fn mislabeled_mt940_gets_a_content_candidate() {
        let formats = candidate_formats(b":20:REF\n:25:ACCT\n", "export.csv", None);
        assert_eq!(formats, vec![StatementFormat::Csv, StatementFormat::Mt940]);
    }

    #[test]
    fn candidates_never_duplicate() {
        let formats = candidate_formats(b"a,b\n", "t.csv", Some(StatementFormat::Csv));
        assert_eq!(formats, vec![StatementFormat::Csv]);
    }
}
