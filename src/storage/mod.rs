use crate::constants::*;
use crate::error::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// A single cell as handed to or read back from a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Total order used for key comparison and for stable row ordering.
    /// Nulls sort first, numbers before text.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        use Value::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (Integer(a), Integer(b)) => a.cmp(b),
            (Real(a), Real(b)) => a.total_cmp(b),
            (Integer(a), Real(b)) => (*a as f64).total_cmp(b),
            (Real(a), Integer(b)) => a.total_cmp(&(*b as f64)),
            (Text(a), Text(b)) => a.cmp(b),
            (Text(_), _) => Ordering::Greater,
            (_, Text(_)) => Ordering::Less,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => write!(f, "'{s}'"),
        }
    }
}

impl From<Option<f64>> for Value {
    fn from(v: Option<f64>) -> Self {
        v.map(Value::Real).unwrap_or(Value::Null)
    }
}

impl From<Option<String>> for Value {
    fn from(v: Option<String>) -> Self {
        v.map(Value::Text).unwrap_or(Value::Null)
    }
}

impl From<Option<NaiveDate>> for Value {
    fn from(v: Option<NaiveDate>) -> Self {
        v.map(|d| Value::Text(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

/// Column name to value. Columns absent from a row are written as NULL.
pub type Row = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Calendar date, persisted as ISO `YYYY-MM-DD` text
    Date,
    Text,
    Real,
    Integer,
}

impl ColumnType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Date | ColumnType::Text => "TEXT",
            ColumnType::Real => "REAL",
            ColumnType::Integer => "INTEGER",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub kind: ColumnType,
    #[serde(default)]
    pub primary_key: bool,
}

impl ColumnDef {
    pub fn new(name: &str, kind: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            kind,
            primary_key: false,
        }
    }

    pub fn key(name: &str, kind: ColumnType) -> Self {
        Self {
            primary_key: true,
            ..Self::new(name, kind)
        }
    }
}

/// Target table definition: ordered columns, some of which form the primary key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    pub fn new(name: &str, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.to_string(),
            columns,
        }
    }

    /// The canonical quarterly financials table, keyed by `DATE`.
    pub fn financials(name: &str) -> Self {
        Self::new(
            name,
            vec![
                ColumnDef::key(COL_DATE, ColumnType::Date),
                ColumnDef::new(COL_CURRENCY, ColumnType::Text),
                ColumnDef::new(COL_REVENUE, ColumnType::Real),
                ColumnDef::new(COL_EXPENSES, ColumnType::Real),
                ColumnDef::new(COL_TAX_INCOME, ColumnType::Real),
                ColumnDef::new(COL_DEBT, ColumnType::Real),
                ColumnDef::new(COL_GDP_CONTRIBUTION_PERCENTAGE, ColumnType::Real),
                ColumnDef::new(COL_QUARTER, ColumnType::Text),
            ],
        )
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Values of `row` in column order, NULL for missing columns.
    pub fn values_of(&self, row: &Row) -> Vec<Value> {
        self.columns
            .iter()
            .map(|c| row.get(&c.name).cloned().unwrap_or(Value::Null))
            .collect()
    }

    pub fn key_of(&self, row: &Row) -> Vec<Value> {
        self.primary_key()
            .into_iter()
            .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

/// Relational store handle used by the load stage.
///
/// `insert` fails on a conflicting primary key; `upsert` updates every non-key
/// column of an existing row. Both apply a batch atomically.
pub trait Store {
    fn table_exists(&self, name: &str) -> Result<bool>;

    /// Create the table if it does not exist yet.
    fn create_table(&mut self, table: &TableDef) -> Result<()>;

    /// Drop the table if it exists.
    fn drop_table(&mut self, name: &str) -> Result<()>;

    fn insert(&mut self, table: &TableDef, rows: &[Row]) -> Result<usize>;

    fn upsert(&mut self, table: &TableDef, rows: &[Row]) -> Result<usize>;

    /// Drop, recreate and fill the table as one unit: if any row is refused
    /// the previous contents stay in place.
    fn replace(&mut self, table: &TableDef, rows: &[Row]) -> Result<usize>;

    /// All rows, ordered by primary key when one is declared.
    fn select_all(&self, table: &TableDef) -> Result<Vec<Row>>;
}
