use calamine::{open_workbook_auto, Data, Reader};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::constants::{SOURCE_EXTENSIONS, SOURCE_FILE_PREFIX};
use crate::error::{EtlError, Result};
use crate::types::{Quarter, RawRecord};

static SOURCE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"_(\d{4})_(Q[1-4])(?:_|\.)").expect("source file name pattern is valid")
});

/// Path of the daily file for one quarter:
/// `<data_dir>/Nuevo_Leon_Financials_<year>_<Qn>_daily.csv`
pub fn source_path(data_dir: &Path, year: i32, quarter: &str) -> Result<PathBuf> {
    let quarter = quarter.trim().to_uppercase();
    if !matches!(quarter.as_str(), "Q1" | "Q2" | "Q3" | "Q4") {
        return Err(EtlError::Config(format!(
            "quarter must be one of Q1, Q2, Q3, Q4, got '{quarter}'"
        )));
    }
    Ok(data_dir.join(format!("{SOURCE_FILE_PREFIX}_{year}_{quarter}_daily.csv")))
}

/// Year and quarter encoded in a source file name, when it follows the naming scheme.
pub fn quarter_from_file_name(path: &Path) -> Option<Quarter> {
    let name = path.file_name()?.to_str()?;
    let caps = SOURCE_NAME.captures(name)?;
    format!("{}{}", &caps[1], &caps[2]).parse().ok()
}

/// Read the daily file for `year`/`quarter`, returning its path with the rows.
/// A missing file is a configuration error.
pub fn extract_quarter(data_dir: &Path, year: i32, quarter: &str) -> Result<(PathBuf, Vec<RawRecord>)> {
    let path = source_path(data_dir, year, quarter)?;
    if !path.exists() {
        warn!("400 | File {} not found", path.display());
        return Err(EtlError::MissingSource { path });
    }
    let rows = read_raw_records(&path)?;
    Ok((path, rows))
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Read a source file into raw rows, dispatching on extension.
pub fn read_raw_records(path: &Path) -> Result<Vec<RawRecord>> {
    if !path.exists() {
        return Err(EtlError::MissingSource {
            path: path.to_path_buf(),
        });
    }
    let extension = extension_of(path);
    if !SOURCE_EXTENSIONS.contains(&extension.as_str()) {
        return Err(EtlError::UnsupportedFile {
            path: path.to_path_buf(),
        });
    }
    let rows = match extension.as_str() {
        "csv" => read_csv(path)?,
        _ => read_spreadsheet(path)?,
    };
    info!("200 | Extracted {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Column positions of the recognised raw fields; unknown headers are skipped.
fn map_headers<'a>(headers: impl Iterator<Item = &'a str>) -> Vec<Option<String>> {
    headers
        .map(|h| {
            let h = h.trim();
            let mut probe = RawRecord::default();
            if probe.set_field(h, None) {
                Some(h.to_string())
            } else {
                debug!("Ignoring unknown column '{}'", h);
                None
            }
        })
        .collect()
}

fn build_record(columns: &[Option<String>], cells: impl Iterator<Item = Option<String>>) -> RawRecord {
    let mut record = RawRecord::default();
    for (column, cell) in columns.iter().zip(cells) {
        if let Some(name) = column {
            record.set_field(name, cell);
        }
    }
    record
}

pub fn parse_csv(content: &str) -> Result<Vec<RawRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(content.as_bytes());
    let columns = map_headers(reader.headers()?.iter());

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let cells = record
            .iter()
            .map(|c| (!c.is_empty()).then(|| c.to_string()));
        rows.push(build_record(&columns, cells));
    }
    Ok(rows)
}

fn read_csv(path: &Path) -> Result<Vec<RawRecord>> {
    let content = fs::read_to_string(path)?;
    parse_csv(&content)
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) if s.is_empty() => None,
        Data::String(s) => Some(s.clone()),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%Y/%m/%d").to_string())
            .or_else(|| Some(dt.as_f64().to_string())),
        other => Some(other.to_string()),
    }
}

fn read_spreadsheet(path: &Path) -> Result<Vec<RawRecord>> {
    let mut workbook = open_workbook_auto(path)?;
    let sheet_names = workbook.sheet_names().to_vec();
    let Some(sheet) = sheet_names.first() else {
        return Ok(Vec::new());
    };
    debug!("Reading sheet '{}' of {}", sheet, path.display());
    let range = workbook.worksheet_range(sheet)?;

    let mut sheet_rows = range.rows();
    let Some(header_row) = sheet_rows.next() else {
        return Ok(Vec::new());
    };
    let headers: Vec<String> = header_row
        .iter()
        .map(|c| cell_text(c).unwrap_or_default())
        .collect();
    let columns = map_headers(headers.iter().map(String::as_str));

    Ok(sheet_rows
        .map(|row| build_record(&columns, row.iter().map(cell_text)))
        .collect())
}

/// Source files in `dir`, sorted by name.
pub fn discover_sources(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(EtlError::MissingSource {
            path: dir.to_path_buf(),
        });
    }
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && SOURCE_EXTENSIONS.contains(&extension_of(p).as_str()))
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Date,Revenue,Expenses,Tax Income,Debt,GDP Contribution,Currency\n\
2024/01/01,$130.27,81.47 MXN,56.11 pesos,619.40 MEX$,3.76%,mxn\n\
2024/01/02,\"$1,150.50\",100.00 MXN,,500.50 MEX$,4.50%,Pesos\n";

    #[test]
    fn source_path_follows_naming_scheme() {
        let path = source_path(Path::new("data"), 2024, "q1").unwrap();
        assert_eq!(
            path,
            Path::new("data").join("Nuevo_Leon_Financials_2024_Q1_daily.csv")
        );
        assert!(source_path(Path::new("data"), 2024, "Q5").is_err());
    }

    #[test]
    fn quarter_is_read_back_from_file_name() {
        let q = quarter_from_file_name(Path::new("x/Nuevo_Leon_Financials_2024_Q3_daily.csv"));
        assert_eq!(q.map(|q| q.to_string()), Some("2024Q3".to_string()));
        assert_eq!(quarter_from_file_name(Path::new("notes.csv")), None);
    }

    #[test]
    fn parses_csv_with_quoted_thousands() {
        let rows = parse_csv(SAMPLE).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].revenue.as_deref(), Some("$130.27"));
        assert_eq!(rows[1].revenue.as_deref(), Some("$1,150.50"));
        assert_eq!(rows[1].tax_income, None);
        assert_eq!(rows[1].currency.as_deref(), Some("Pesos"));
    }

    #[test]
    fn unknown_and_missing_columns_are_tolerated() {
        let rows = parse_csv("Notes, Date ,Revenue\nhello,2024/01/01,$5\n").unwrap();
        assert_eq!(rows[0].date.as_deref(), Some("2024/01/01"));
        assert_eq!(rows[0].revenue.as_deref(), Some("$5"));
        assert_eq!(rows[0].debt, None);
    }

    #[test]
    fn missing_quarter_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = extract_quarter(dir.path(), 2024, "Q2").unwrap_err();
        assert!(matches!(err, EtlError::MissingSource { .. }));
        assert!(err.is_config());
    }

    #[test]
    fn quarter_file_is_read_with_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().join("Nuevo_Leon_Financials_2024_Q1_daily.csv");
        fs::write(&expected, SAMPLE).unwrap();
        let (path, rows) = extract_quarter(dir.path(), 2024, "Q1").unwrap();
        assert_eq!(path, expected);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn discovers_only_source_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.csv", "a.xlsx", "readme.txt", "c.CSV", "d.ods", "e.xls"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        let found: Vec<String> = discover_sources(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(found, vec!["a.xlsx", "b.csv", "c.CSV", "d.ods", "e.xls"]);
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, "{}").unwrap();
        assert!(matches!(
            read_raw_records(&path),
            Err(EtlError::UnsupportedFile { .. })
        ));
    }
}
