use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{info, instrument};

use crate::error::{EtlError, Result};
use crate::storage::{Row, Store, TableDef};

/// How canonical rows are written to the target table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMethod {
    /// Append only; an existing primary key is a constraint violation.
    Insert,
    /// Insert new keys, overwrite non-key columns of existing ones.
    Upsert,
    /// Drop and recreate the table, then insert.
    Overwrite,
}

impl FromStr for LoadMethod {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "insert" => Ok(LoadMethod::Insert),
            "upsert" => Ok(LoadMethod::Upsert),
            "overwrite" => Ok(LoadMethod::Overwrite),
            _ => Err(EtlError::UnknownLoadMethod(s.to_string())),
        }
    }
}

impl fmt::Display for LoadMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadMethod::Insert => "insert",
            LoadMethod::Upsert => "upsert",
            LoadMethod::Overwrite => "overwrite",
        };
        f.write_str(s)
    }
}

/// Reject rows the store could never accept, before anything is written.
fn validate(rows: &[Row], table: &TableDef, method: LoadMethod) -> Result<()> {
    let pk = table.primary_key();
    if method == LoadMethod::Upsert && pk.is_empty() {
        return Err(EtlError::MissingPrimaryKey {
            table: table.name.clone(),
        });
    }
    for (idx, row) in rows.iter().enumerate() {
        if let Some(column) = row.keys().find(|c| !table.has_column(c)) {
            return Err(EtlError::UnknownColumn {
                table: table.name.clone(),
                column: column.clone(),
            });
        }
        if let Some(column) = pk.iter().find(|c| row.get(**c).map_or(true, |v| v.is_null())) {
            return Err(EtlError::NullKey {
                table: table.name.clone(),
                column: column.to_string(),
                row: idx,
            });
        }
    }
    Ok(())
}

/// Write `rows` into `table` with the given method. The table is created if
/// it does not exist. Returns the number of rows written.
#[instrument(skip(store, rows, table), fields(table = %table.name, rows = rows.len()))]
pub fn apply(store: &mut dyn Store, rows: &[Row], table: &TableDef, method: LoadMethod) -> Result<usize> {
    validate(rows, table, method)?;

    let written = match method {
        LoadMethod::Insert => {
            store.create_table(table)?;
            store.insert(table, rows)?
        }
        LoadMethod::Upsert => {
            store.create_table(table)?;
            store.upsert(table, rows)?
        }
        LoadMethod::Overwrite => store.replace(table, rows)?,
    };
    info!("200 | {} wrote {} rows to {}", method, written, table.name);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ColumnDef, ColumnType, InMemoryStore, SqliteStore, Value};

    fn table() -> TableDef {
        TableDef::new(
            "sample_table",
            vec![
                ColumnDef::key("id", ColumnType::Integer),
                ColumnDef::new("content", ColumnType::Text),
            ],
        )
    }

    fn row(id: i64, content: &str) -> Row {
        let mut r = Row::new();
        r.insert("id".to_string(), Value::Integer(id));
        r.insert("content".to_string(), Value::from(content));
        r
    }

    fn stores() -> Vec<Box<dyn Store>> {
        vec![
            Box::new(InMemoryStore::new()),
            Box::new(SqliteStore::open_in_memory().unwrap()),
        ]
    }

    #[test]
    fn load_method_parses_case_insensitively() {
        assert_eq!("UPSERT".parse::<LoadMethod>().unwrap(), LoadMethod::Upsert);
        assert_eq!(" insert ".parse::<LoadMethod>().unwrap(), LoadMethod::Insert);
        assert_eq!(LoadMethod::Overwrite.to_string(), "overwrite");
        let err = "merge".parse::<LoadMethod>().unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn unknown_method_touches_nothing() {
        for mut store in stores() {
            let err = "append"
                .parse::<LoadMethod>()
                .and_then(|method| apply(store.as_mut(), &[row(1, "a")], &table(), method))
                .unwrap_err();
            assert!(matches!(err, EtlError::UnknownLoadMethod(_)));
            assert!(!store.table_exists("sample_table").unwrap());
        }
    }

    #[test]
    fn insert_creates_table_and_rejects_conflicts() {
        for mut store in stores() {
            apply(store.as_mut(), &[row(1, "super"), row(2, "fake")], &table(), LoadMethod::Insert).unwrap();
            assert!(apply(store.as_mut(), &[row(2, "again")], &table(), LoadMethod::Insert).is_err());
            assert_eq!(store.select_all(&table()).unwrap(), vec![row(1, "super"), row(2, "fake")]);
        }
    }

    #[test]
    fn upsert_is_idempotent() {
        for mut store in stores() {
            let rows = vec![row(1, "a"), row(2, "b")];
            apply(store.as_mut(), &rows, &table(), LoadMethod::Upsert).unwrap();
            let once = store.select_all(&table()).unwrap();
            apply(store.as_mut(), &rows, &table(), LoadMethod::Upsert).unwrap();
            assert_eq!(store.select_all(&table()).unwrap(), once);
        }
    }

    #[test]
    fn upsert_overwrites_non_key_columns() {
        for mut store in stores() {
            apply(store.as_mut(), &[row(1, "old"), row(2, "keep")], &table(), LoadMethod::Upsert).unwrap();
            apply(store.as_mut(), &[row(1, "new")], &table(), LoadMethod::Upsert).unwrap();
            assert_eq!(store.select_all(&table()).unwrap(), vec![row(1, "new"), row(2, "keep")]);
        }
    }

    #[test]
    fn overwrite_replaces_prior_contents() {
        for mut store in stores() {
            apply(store.as_mut(), &[row(1, "a"), row(2, "b")], &table(), LoadMethod::Insert).unwrap();
            apply(store.as_mut(), &[row(3, "c")], &table(), LoadMethod::Overwrite).unwrap();
            assert_eq!(store.select_all(&table()).unwrap(), vec![row(3, "c")]);
        }
    }

    #[test]
    fn failed_overwrite_keeps_prior_contents() {
        for mut store in stores() {
            apply(store.as_mut(), &[row(1, "a"), row(2, "b")], &table(), LoadMethod::Upsert).unwrap();
            let err = apply(store.as_mut(), &[row(3, "c"), row(3, "d")], &table(), LoadMethod::Overwrite);
            assert!(err.is_err());
            assert_eq!(store.select_all(&table()).unwrap(), vec![row(1, "a"), row(2, "b")]);
        }
    }

    #[test]
    fn overwrite_then_empty_insert_leaves_empty_table() {
        for mut store in stores() {
            apply(store.as_mut(), &[row(1, "a")], &table(), LoadMethod::Insert).unwrap();
            apply(store.as_mut(), &[], &table(), LoadMethod::Overwrite).unwrap();
            assert_eq!(apply(store.as_mut(), &[], &table(), LoadMethod::Insert).unwrap(), 0);
            assert!(store.select_all(&table()).unwrap().is_empty());
        }
    }

    #[test]
    fn upsert_without_primary_key_is_refused() {
        let keyless = TableDef::new("keyless", vec![ColumnDef::new("content", ColumnType::Text)]);
        for mut store in stores() {
            let err = apply(store.as_mut(), &[], &keyless, LoadMethod::Upsert).unwrap_err();
            assert!(matches!(err, EtlError::MissingPrimaryKey { .. }));
            assert!(!store.table_exists("keyless").unwrap());
        }
    }

    #[test]
    fn null_keys_and_unknown_columns_are_refused_up_front() {
        for mut store in stores() {
            let mut null_key = row(1, "a");
            null_key.insert("id".to_string(), Value::Null);
            let err = apply(store.as_mut(), &[row(2, "b"), null_key], &table(), LoadMethod::Upsert).unwrap_err();
            assert!(matches!(err, EtlError::NullKey { row: 1, .. }));

            let mut extra = row(3, "c");
            extra.insert("bogus".to_string(), Value::Integer(0));
            let err = apply(store.as_mut(), &[extra], &table(), LoadMethod::Insert).unwrap_err();
            assert!(matches!(err, EtlError::UnknownColumn { .. }));

            assert!(!store.table_exists("sample_table").unwrap());
        }
    }
}
