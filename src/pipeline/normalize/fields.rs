//! Field-level cleaning rules. Every function here is total: bad input becomes
//! `Parsed::Invalid` or `Parsed::Empty`, never a panic or an error.

use crate::constants::{
    CURRENCY_SYNONYMS, DATE_FORMATS, MONETARY_STRIP_TOKENS, RAW_GDP_CONTRIBUTION,
};
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

/// Why a non-empty raw value could not be used as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    UnparseableDate,
    UnparseableNumber,
    OutOfRange,
    UnmappedCurrency,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IssueKind::UnparseableDate => "unparseable date",
            IssueKind::UnparseableNumber => "unparseable number",
            IssueKind::OutOfRange => "value out of range",
            IssueKind::UnmappedCurrency => "unmapped currency",
        };
        f.write_str(s)
    }
}

/// Outcome of cleaning one raw field
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed<T> {
    Value(T),
    Empty,
    Invalid(IssueKind),
}

impl<T> Parsed<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Parsed::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn issue(&self) -> Option<IssueKind> {
        match self {
            Parsed::Invalid(kind) => Some(*kind),
            _ => None,
        }
    }
}

type DateParser = fn(&str) -> Option<NaiveDate>;

// chrono's %Y takes any number of digits; source years are always four.
fn is_four_digit_year(token: Option<&str>) -> bool {
    token.is_some_and(|t| t.len() == 4 && t.bytes().all(|b| b.is_ascii_digit()))
}

fn year_month_day(s: &str) -> Option<NaiveDate> {
    if !is_four_digit_year(s.split('/').next()) {
        return None;
    }
    NaiveDate::parse_from_str(s, DATE_FORMATS[0]).ok()
}

fn day_month_year(s: &str) -> Option<NaiveDate> {
    if !is_four_digit_year(s.rsplit('-').next()) {
        return None;
    }
    NaiveDate::parse_from_str(s, DATE_FORMATS[1]).ok()
}

/// Tried in order; the first parser that accepts the input wins.
const DATE_PARSERS: [DateParser; 2] = [year_month_day, day_month_year];

pub fn parse_date(raw: &str) -> Parsed<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return Parsed::Empty;
    }
    DATE_PARSERS
        .iter()
        .find_map(|parse| parse(s))
        .map(Parsed::Value)
        .unwrap_or(Parsed::Invalid(IssueKind::UnparseableDate))
}

/// Lower-case and map through the synonym table. Unmapped spellings pass
/// through lower-cased and are flagged.
pub fn normalize_currency(raw: &str) -> Parsed<String> {
    let lower = raw.trim().to_lowercase();
    if lower.is_empty() {
        return Parsed::Empty;
    }
    match CURRENCY_SYNONYMS.iter().find(|(spelling, _)| *spelling == lower) {
        Some((_, code)) => Parsed::Value(code.to_string()),
        None => Parsed::Invalid(IssueKind::UnmappedCurrency),
    }
}

/// The pass-through value for a currency the synonym table does not know.
pub fn passthrough_currency(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn parse_finite(s: &str) -> Parsed<f64> {
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => Parsed::Value(v),
        _ => Parsed::Invalid(IssueKind::UnparseableNumber),
    }
}

/// Strip currency markers and thousands separators, then parse.
pub fn clean_monetary(raw: &str) -> Parsed<f64> {
    let stripped = MONETARY_STRIP_TOKENS
        .iter()
        .fold(raw.to_string(), |acc, token| acc.replace(token, ""));
    let s = stripped.trim();
    if s.is_empty() {
        return Parsed::Empty;
    }
    parse_finite(s)
}

/// Strip a trailing `%` and parse; the result must lie in [0, 100].
pub fn clean_percentage(raw: &str) -> Parsed<f64> {
    let trimmed = raw.trim();
    let s = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
    if s.is_empty() {
        return Parsed::Empty;
    }
    match parse_finite(s) {
        Parsed::Value(v) if !(0.0..=100.0).contains(&v) => Parsed::Invalid(IssueKind::OutOfRange),
        other => other,
    }
}

/// Upper-case with spaces replaced by underscores; `GDP Contribution` is
/// renamed to carry its unit.
pub fn canonical_field_name(raw: &str) -> String {
    let name = if raw == RAW_GDP_CONTRIBUTION {
        "GDP Contribution Percentage"
    } else {
        raw
    };
    name.to_uppercase().replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{CANONICAL_COLUMNS, RAW_FIELDS};

    #[test]
    fn parses_both_date_formats() {
        assert_eq!(
            parse_date("2024/01/02").value(),
            NaiveDate::from_ymd_opt(2024, 1, 2)
        );
        assert_eq!(
            parse_date("15-03-2024").value(),
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
        assert_eq!(
            parse_date(" 2024/12/31 ").value(),
            NaiveDate::from_ymd_opt(2024, 12, 31)
        );
    }

    #[test]
    fn bad_dates_are_invalid_not_errors() {
        assert_eq!(parse_date("2024-01-02"), Parsed::Invalid(IssueKind::UnparseableDate));
        assert_eq!(parse_date("31/02/2024"), Parsed::Invalid(IssueKind::UnparseableDate));
        assert_eq!(parse_date("2024/02/30"), Parsed::Invalid(IssueKind::UnparseableDate));
        assert_eq!(parse_date("not a date"), Parsed::Invalid(IssueKind::UnparseableDate));
        assert_eq!(parse_date(""), Parsed::Empty);
    }

    #[test]
    fn short_years_are_not_accepted() {
        for raw in ["24/03/15", "15-03-24", "1/2/3", "15-03-02024", "02024/03/15"] {
            assert_eq!(parse_date(raw), Parsed::Invalid(IssueKind::UnparseableDate), "{raw}");
        }
    }

    #[test]
    fn currency_synonyms_map_to_mxn() {
        for raw in ["pesos", "Pesos", "MEX$", "mex", "pesoss", "mxn", "MXN", "PESOS"] {
            assert_eq!(normalize_currency(raw), Parsed::Value("MXN".to_string()), "{raw}");
        }
    }

    #[test]
    fn unmapped_currency_is_flagged() {
        assert_eq!(
            normalize_currency("USD"),
            Parsed::Invalid(IssueKind::UnmappedCurrency)
        );
        assert_eq!(passthrough_currency("USD"), "usd");
        assert_eq!(normalize_currency("  "), Parsed::Empty);
    }

    #[test]
    fn monetary_values_are_stripped() {
        assert_eq!(clean_monetary("$130.27"), Parsed::Value(130.27));
        assert_eq!(clean_monetary("81.47 MXN"), Parsed::Value(81.47));
        assert_eq!(clean_monetary("56.11 pesos"), Parsed::Value(56.11));
        assert_eq!(clean_monetary("619.40 MEX$"), Parsed::Value(619.40));
        assert_eq!(clean_monetary("$1,234,567.89"), Parsed::Value(1_234_567.89));
        assert_eq!(clean_monetary("-12.5 MEX"), Parsed::Value(-12.5));
    }

    #[test]
    fn strip_order_is_significant() {
        // `$` goes first, so a lower-case `mex$` is left as `mex` and never matches.
        assert_eq!(
            clean_monetary("42 mex$"),
            Parsed::Invalid(IssueKind::UnparseableNumber)
        );
        assert_eq!(clean_monetary("42 MEX$"), Parsed::Value(42.0));
    }

    #[test]
    fn monetary_garbage_becomes_null() {
        assert_eq!(clean_monetary(""), Parsed::Empty);
        assert_eq!(clean_monetary("$ MXN"), Parsed::Empty);
        assert_eq!(
            clean_monetary("twelve pesos"),
            Parsed::Invalid(IssueKind::UnparseableNumber)
        );
        assert_eq!(
            clean_monetary("12.5 USD"),
            Parsed::Invalid(IssueKind::UnparseableNumber)
        );
        assert_eq!(clean_monetary("NaN"), Parsed::Invalid(IssueKind::UnparseableNumber));
    }

    #[test]
    fn percentages_strip_sign_and_check_range() {
        assert_eq!(clean_percentage("3.76%"), Parsed::Value(3.76));
        assert_eq!(clean_percentage("4.50"), Parsed::Value(4.5));
        assert_eq!(clean_percentage(" 100 % "), Parsed::Value(100.0));
        assert_eq!(clean_percentage(""), Parsed::Empty);
        assert_eq!(clean_percentage("%"), Parsed::Empty);
        assert_eq!(
            clean_percentage("abc%"),
            Parsed::Invalid(IssueKind::UnparseableNumber)
        );
        assert_eq!(clean_percentage("150%"), Parsed::Invalid(IssueKind::OutOfRange));
        assert_eq!(clean_percentage("-1%"), Parsed::Invalid(IssueKind::OutOfRange));
    }

    #[test]
    fn raw_headers_rename_to_canonical_columns() {
        let mut renamed: Vec<String> = RAW_FIELDS.iter().map(|f| canonical_field_name(f)).collect();
        renamed.push("QUARTER".to_string());
        renamed.sort();
        let mut expected: Vec<String> = CANONICAL_COLUMNS.iter().map(|c| c.to_string()).collect();
        expected.sort();
        assert_eq!(renamed, expected);
    }
}
