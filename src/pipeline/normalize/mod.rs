use serde::Serialize;

use crate::constants::*;
use crate::types::{CanonicalRecord, Quarter, RawRecord};

pub mod fields;

pub use fields::{IssueKind, Parsed};

/// A raw value that could not be used and was replaced by null (or passed
/// through, for currencies).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldIssue {
    /// Zero-based index of the row within the input
    pub row: usize,
    pub field: &'static str,
    pub raw: String,
    pub kind: IssueKind,
}

/// Canonical rows plus every leniency applied while producing them
#[derive(Debug, Clone, Default, Serialize)]
pub struct NormalizeReport {
    pub records: Vec<CanonicalRecord>,
    pub issues: Vec<FieldIssue>,
}

impl NormalizeReport {
    /// Indices of rows left without a date.
    pub fn undated_rows(&self) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.date.is_none())
            .map(|(i, _)| i)
            .collect()
    }
}

/// Normalize raw rows into canonical rows. Pure; bad fields become null.
pub fn normalize(rows: &[RawRecord]) -> Vec<CanonicalRecord> {
    normalize_with_report(rows).records
}

pub fn normalize_with_report(rows: &[RawRecord]) -> NormalizeReport {
    let mut report = NormalizeReport {
        records: Vec::with_capacity(rows.len()),
        issues: Vec::new(),
    };
    for (idx, raw) in rows.iter().enumerate() {
        let record = normalize_record(idx, raw, &mut report.issues);
        report.records.push(record);
    }
    report
}

struct RowContext<'a> {
    row: usize,
    issues: &'a mut Vec<FieldIssue>,
}

impl RowContext<'_> {
    fn take<T>(&mut self, field: &'static str, raw: Option<&str>, clean: fn(&str) -> Parsed<T>) -> Option<T> {
        let raw = raw?;
        let parsed = clean(raw);
        if let Some(kind) = parsed.issue() {
            self.flag(field, raw, kind);
        }
        parsed.value()
    }

    fn flag(&mut self, field: &'static str, raw: &str, kind: IssueKind) {
        self.issues.push(FieldIssue {
            row: self.row,
            field,
            raw: raw.to_string(),
            kind,
        });
    }
}

/// Map one raw row to its canonical form, recording issues against `row`.
pub fn normalize_record(row: usize, raw: &RawRecord, issues: &mut Vec<FieldIssue>) -> CanonicalRecord {
    let mut ctx = RowContext { row, issues };

    let date = ctx.take(RAW_DATE, raw.date.as_deref(), fields::parse_date);
    let quarter = date.map(Quarter::from_date);

    let currency = raw
        .currency
        .as_deref()
        .and_then(|value| match fields::normalize_currency(value) {
            Parsed::Value(code) => Some(code),
            Parsed::Empty => None,
            Parsed::Invalid(kind) => {
                ctx.flag(RAW_CURRENCY, value, kind);
                Some(fields::passthrough_currency(value))
            }
        });

    CanonicalRecord {
        date,
        currency,
        revenue: ctx.take(RAW_REVENUE, raw.revenue.as_deref(), fields::clean_monetary),
        expenses: ctx.take(RAW_EXPENSES, raw.expenses.as_deref(), fields::clean_monetary),
        tax_income: ctx.take(RAW_TAX_INCOME, raw.tax_income.as_deref(), fields::clean_monetary),
        debt: ctx.take(RAW_DEBT, raw.debt.as_deref(), fields::clean_monetary),
        gdp_contribution_percentage: ctx.take(
            RAW_GDP_CONTRIBUTION,
            raw.gdp_contribution.as_deref(),
            fields::clean_percentage,
        ),
        quarter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn raw(
        date: &str,
        revenue: &str,
        expenses: &str,
        tax_income: &str,
        debt: &str,
        gdp: &str,
        currency: &str,
    ) -> RawRecord {
        RawRecord {
            date: Some(date.to_string()),
            revenue: Some(revenue.to_string()),
            expenses: Some(expenses.to_string()),
            tax_income: Some(tax_income.to_string()),
            debt: Some(debt.to_string()),
            gdp_contribution: Some(gdp.to_string()),
            currency: Some(currency.to_string()),
        }
    }

    fn quarter(label: &str) -> Option<Quarter> {
        Some(label.parse().unwrap())
    }

    #[test]
    fn transforms_financial_data() {
        let input = vec![
            raw("2024/01/01", "$130.27", "81.47 MXN", "56.11 pesos", "619.40 MEX$", "3.76%", "mxn"),
            raw("2024/01/02", "$150.50", "100.00 MXN", "70.20 pesos", "500.50 MEX$", "4.50%", "Pesos"),
        ];

        let expected = vec![
            CanonicalRecord {
                date: NaiveDate::from_ymd_opt(2024, 1, 1),
                currency: Some("MXN".to_string()),
                revenue: Some(130.27),
                expenses: Some(81.47),
                tax_income: Some(56.11),
                debt: Some(619.40),
                gdp_contribution_percentage: Some(3.76),
                quarter: quarter("2024Q1"),
            },
            CanonicalRecord {
                date: NaiveDate::from_ymd_opt(2024, 1, 2),
                currency: Some("MXN".to_string()),
                revenue: Some(150.50),
                expenses: Some(100.00),
                tax_income: Some(70.20),
                debt: Some(500.50),
                gdp_contribution_percentage: Some(4.50),
                quarter: quarter("2024Q1"),
            },
        ];

        let report = normalize_with_report(&input);
        assert_eq!(report.records, expected);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn bad_fields_become_null_without_touching_the_rest() {
        let input = vec![raw("yesterday", "n/a", "81.47 MXN", "", "619.40 MEX$", "lots%", "mxn")];

        let report = normalize_with_report(&input);
        let record = &report.records[0];
        assert_eq!(record.date, None);
        assert_eq!(record.quarter, None);
        assert_eq!(record.revenue, None);
        assert_eq!(record.tax_income, None);
        assert_eq!(record.gdp_contribution_percentage, None);
        assert_eq!(record.expenses, Some(81.47));
        assert_eq!(record.debt, Some(619.40));
        assert_eq!(record.currency.as_deref(), Some("MXN"));

        let flagged: Vec<(&str, IssueKind)> = report.issues.iter().map(|i| (i.field, i.kind)).collect();
        assert_eq!(
            flagged,
            vec![
                (RAW_DATE, IssueKind::UnparseableDate),
                (RAW_REVENUE, IssueKind::UnparseableNumber),
                (RAW_GDP_CONTRIBUTION, IssueKind::UnparseableNumber),
            ]
        );
        assert_eq!(report.undated_rows(), vec![0]);
    }

    #[test]
    fn day_first_dates_derive_their_quarter() {
        let input = vec![raw("30-09-2023", "1", "2", "3", "4", "5%", "pesoss")];
        let records = normalize(&input);
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2023, 9, 30));
        assert_eq!(records[0].quarter, quarter("2023Q3"));
        assert_eq!(records[0].currency.as_deref(), Some("MXN"));
    }

    #[test]
    fn unmapped_currency_passes_through_lower_cased() {
        let input = vec![raw("2024/04/01", "1", "2", "3", "4", "5%", "USD")];
        let report = normalize_with_report(&input);
        assert_eq!(report.records[0].currency.as_deref(), Some("usd"));
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, IssueKind::UnmappedCurrency);
        assert_eq!(report.issues[0].raw, "USD");
    }

    #[test]
    fn missing_fields_stay_null_silently() {
        let input = vec![RawRecord {
            date: Some("2024/05/05".to_string()),
            ..RawRecord::default()
        }];
        let report = normalize_with_report(&input);
        let record = &report.records[0];
        assert_eq!(record.quarter, quarter("2024Q2"));
        assert_eq!(record.currency, None);
        assert_eq!(record.revenue, None);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn issue_rows_point_at_their_input_index() {
        let input = vec![
            raw("2024/01/01", "1", "2", "3", "4", "5%", "mxn"),
            raw("2024/01/02", "1", "oops", "3", "4", "5%", "mxn"),
        ];
        let report = normalize_with_report(&input);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].row, 1);
        assert_eq!(report.issues[0].field, RAW_EXPENSES);
    }
}
