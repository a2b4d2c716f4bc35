//! Structural checks on source files before they are loaded: expected header,
//! no blank cells, non-negative amounts and a GDP share within [0, 100].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::{EtlError, Result};

static NON_NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\d.\-]").expect("numeric filter pattern is valid"));

const MONETARY_FIELDS: [&str; 4] = [RAW_REVENUE, RAW_EXPENSES, RAW_TAX_INCOME, RAW_DEBT];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    /// 1-based data row (header excluded); None for file-level problems
    pub row: Option<usize>,
    pub field: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub path: PathBuf,
    pub rows: usize,
    pub violations: Vec<Violation>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

fn clean_numeric(value: &str) -> Option<f64> {
    NON_NUMERIC.replace_all(value, "").parse().ok()
}

fn file_violation(message: String) -> Violation {
    Violation {
        row: None,
        field: None,
        message,
    }
}

fn field_violation(row: usize, field: &str, message: String) -> Violation {
    Violation {
        row: Some(row),
        field: Some(field.to_string()),
        message,
    }
}

pub fn check_csv(path: &Path, content: &str) -> Result<IntegrityReport> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content.as_bytes());
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut violations = Vec::new();
    if headers != RAW_FIELDS {
        violations.push(file_violation(format!("Unexpected CSV headers: {headers:?}")));
    }

    let mut rows = 0;
    for (idx, result) in reader.records().enumerate() {
        let record = result?;
        let row = idx + 1;
        rows += 1;
        let value = |field: &str| {
            headers
                .iter()
                .position(|h| h == field)
                .and_then(|i| record.get(i))
                .unwrap_or("")
        };

        for field in RAW_FIELDS {
            if value(field).trim().is_empty() {
                violations.push(field_violation(row, field, format!("Missing {field}")));
            }
        }

        for field in MONETARY_FIELDS {
            let raw = value(field);
            if raw.trim().is_empty() {
                continue;
            }
            match clean_numeric(raw) {
                Some(v) if v < 0.0 => {
                    violations.push(field_violation(row, field, format!("Negative {field} found: {raw}")))
                }
                Some(_) => {}
                None => violations.push(field_violation(
                    row,
                    field,
                    format!("Could not convert '{raw}' to a number"),
                )),
            }
        }

        let gdp = value(RAW_GDP_CONTRIBUTION);
        if !gdp.trim().is_empty() {
            match gdp.replace('%', "").trim().parse::<f64>() {
                Ok(v) if (0.0..=100.0).contains(&v) => {}
                _ => violations.push(field_violation(
                    row,
                    RAW_GDP_CONTRIBUTION,
                    format!("Invalid GDP Contribution: {gdp}"),
                )),
            }
        }
    }

    if rows == 0 {
        violations.push(file_violation("CSV file is empty (no data rows found)".to_string()));
    }

    Ok(IntegrityReport {
        path: path.to_path_buf(),
        rows,
        violations,
    })
}

/// Check one CSV source file.
pub fn check_file(path: &Path) -> Result<IntegrityReport> {
    if !path.exists() {
        return Err(EtlError::MissingSource {
            path: path.to_path_buf(),
        });
    }
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    if !is_csv {
        return Err(EtlError::UnsupportedFile {
            path: path.to_path_buf(),
        });
    }
    let content = fs::read_to_string(path)?;
    check_csv(path, &content)
}
