//! CSV ingest and emit for bulk validation
//!
//! Uploads are plain RFC 4180 CSV with a header line; one column must name
//! the address (`email`, `address` or `mail`, any casing). On the way out
//! the original columns pass through untouched and the validation verdict is
//! appended as extra columns.

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::io::Read;
use thiserror::Error;

use crate::ValidationResult;

/// Header names accepted for the address column, matched case-insensitively.
pub const EMAIL_COLUMNS: &[&str] = &["email", "address", "mail"];

/// Columns appended to the output after the originals.
pub const RESULT_COLUMNS: &[&str] = &[
    "validation_result",
    "validation_reason",
    "mx_check",
    "dns_check",
    "spf_check",
    "mailbox_check",
    "smtp_check",
    "catch_all",
];

#[derive(Error, Debug)]
pub enum CsvError {
    #[error("no email column found in CSV header (expected one of: email, address, mail)")]
    MissingEmailColumn,
    #[error("CSV parse error: {0}")]
    Parse(#[from] csv::Error),
    #[error("CSV write error: {0}")]
    Write(#[from] std::io::Error),
}

/// A parsed upload: original header, rows, and the located address column.
#[derive(Debug, Clone)]
pub struct CsvTable {
    pub headers: StringRecord,
    pub rows: Vec<StringRecord>,
    pub email_column: usize,
}

impl CsvTable {
    /// Parse CSV content and locate the address column.
    pub fn parse(input: impl Read) -> Result<Self, CsvError> {
        let mut reader = ReaderBuilder::new().flexible(true).from_reader(input);
        let headers = reader.headers()?.clone();

        let email_column = headers
            .iter()
            .position(|header| {
                let header = header.trim();
                EMAIL_COLUMNS.iter().any(|c| header.eq_ignore_ascii_case(c))
            })
            .ok_or(CsvError::MissingEmailColumn)?;

        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?);
        }

        Ok(Self {
            headers,
            rows,
            email_column,
        })
    }

    /// The addresses in row order. Blank or missing cells come through as
    /// empty strings so results stay row-aligned.
    pub fn emails(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| {
                row.get(self.email_column)
                    .unwrap_or_default()
                    .trim()
                    .to_string()
            })
            .collect()
    }

    /// Serialize the table with validation columns appended.
    ///
    /// The original columns keep their content and order; the header is
    /// extended, never reordered. Commas inside the reason are replaced with
    /// semicolons so downstream comma-naive tooling stays happy.
    pub fn with_results(&self, results: &[ValidationResult]) -> Result<String, CsvError> {
        let mut writer = WriterBuilder::new().flexible(true).from_writer(Vec::new());

        let mut header = self.headers.clone();
        for column in RESULT_COLUMNS {
            header.push_field(column);
        }
        writer.write_record(&header)?;

        for (row, result) in self.rows.iter().zip(results) {
            let mut record = row.clone();
            record.push_field(if result.valid { "Valid" } else { "Invalid" });
            record.push_field(&result.reason.replace(',', ";"));
            record.push_field(&result.checks.mx.to_string());
            record.push_field(&result.checks.dns.to_string());
            record.push_field(&result.checks.spf.to_string());
            record.push_field(&result.checks.mailbox.to_string());
            record.push_field(&result.checks.smtp.to_string());
            record.push_field(&result.checks.catch_all.to_string());
            writer.write_record(&record)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| CsvError::Write(e.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Checks, Details};

    fn result(email: &str, valid: bool, reason: &str) -> ValidationResult {
        ValidationResult {
            email: email.to_string(),
            valid,
            reason: reason.to_string(),
            checks: Checks {
                format: true,
                dns: valid,
                ..Checks::default()
            },
            details: Details::default(),
        }
    }

    #[test]
    fn finds_email_column_case_insensitively() {
        for header in ["email", "Email", "EMAIL", "Address", "MAIL"] {
            let input = format!("{header},name\na@b.com,Alice\n");
            let table = CsvTable::parse(input.as_bytes()).unwrap();
            assert_eq!(table.email_column, 0);
            assert_eq!(table.emails(), vec!["a@b.com"]);
        }
    }

    #[test]
    fn email_column_may_sit_anywhere() {
        let input = "id,name,E-Mail-ish,mail\n1,Alice,x,a@b.com\n";
        let table = CsvTable::parse(input.as_bytes()).unwrap();
        assert_eq!(table.email_column, 3);
        assert_eq!(table.emails(), vec!["a@b.com"]);
    }

    #[test]
    fn missing_email_column_is_an_error() {
        let input = "id,name\n1,Alice\n";
        let err = CsvTable::parse(input.as_bytes()).unwrap_err();
        assert!(matches!(err, CsvError::MissingEmailColumn));
    }

    #[test]
    fn quoted_fields_parse_per_rfc_4180() {
        let input = "email,note\n\"a@b.com\",\"says \"\"hi\"\", twice\"\n";
        let table = CsvTable::parse(input.as_bytes()).unwrap();
        assert_eq!(table.emails(), vec!["a@b.com"]);
        assert_eq!(table.rows[0].get(1).unwrap(), "says \"hi\", twice");
    }

    #[test]
    fn appended_columns_extend_header_without_reordering() {
        let input = "id,email,name\n1,a@b.com,Alice\n2,c@d.com,Bob\n";
        let table = CsvTable::parse(input.as_bytes()).unwrap();
        let results = vec![
            result("a@b.com", true, "Email is valid"),
            result("c@d.com", false, "Domain does not exist"),
        ];

        let output = table.with_results(&results).unwrap();
        let mut lines = output.lines();
        assert_eq!(
            lines.next().unwrap(),
            "id,email,name,validation_result,validation_reason,mx_check,dns_check,spf_check,mailbox_check,smtp_check,catch_all"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("1,a@b.com,Alice,Valid,"));
        assert!(row.ends_with("false,true,false,false,false,false"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("2,c@d.com,Bob,Invalid,"));
    }

    #[test]
    fn commas_in_reason_become_semicolons() {
        let input = "email\na@b.com\n";
        let table = CsvTable::parse(input.as_bytes()).unwrap();
        let results = vec![result("a@b.com", false, "Risky: catch-all, greylisted")];

        let output = table.with_results(&results).unwrap();
        assert!(output.contains("Risky: catch-all; greylisted"));
    }

    #[test]
    fn output_round_trips_through_the_parser() {
        let input = "email,name\na@b.com,\"Doe, Alice\"\n";
        let table = CsvTable::parse(input.as_bytes()).unwrap();
        let results = vec![result("a@b.com", true, "Email is valid")];

        let output = table.with_results(&results).unwrap();
        let reparsed = CsvTable::parse(output.as_bytes()).unwrap();
        assert_eq!(reparsed.rows.len(), 1);
        assert_eq!(reparsed.emails(), vec!["a@b.com"]);
        assert_eq!(reparsed.rows[0].get(1).unwrap(), "Doe, Alice");
        assert_eq!(reparsed.rows[0].get(2).unwrap(), "Valid");
    }
}
