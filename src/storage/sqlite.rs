use super::{Row, Store, TableDef, Value};
use crate::error::Result;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection};
use std::path::Path;
use tracing::{debug, info, warn};

/// SQLite-backed store
pub struct SqliteStore {
    conn: Connection,
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Real(r) => SqlValue::Real(*r),
        Value::Text(s) => SqlValue::Text(s.clone()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Text(t) | ValueRef::Blob(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
    }
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |r| r.get(0))?;
        debug!("journal_mode={}", mode);
        info!("200 | SQLite store opened at {}", path.display());
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    fn create_table_sql(table: &TableDef) -> String {
        let mut defs: Vec<String> = table
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.kind.sql_type()))
            .collect();
        let pk = table.primary_key();
        if !pk.is_empty() {
            let cols: Vec<String> = pk.iter().map(|c| quote_ident(c)).collect();
            defs.push(format!("PRIMARY KEY ({})", cols.join(", ")));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&table.name),
            defs.join(", ")
        )
    }

    fn insert_sql(table: &TableDef) -> String {
        let cols: Vec<String> = table.column_names().map(quote_ident).collect();
        let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("?{i}")).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&table.name),
            cols.join(", "),
            placeholders.join(", ")
        )
    }

    fn upsert_sql(table: &TableDef) -> String {
        let pk = table.primary_key();
        let conflict: Vec<String> = pk.iter().map(|c| quote_ident(c)).collect();
        let updates: Vec<String> = table
            .columns
            .iter()
            .filter(|c| !c.primary_key)
            .map(|c| format!("{0} = excluded.{0}", quote_ident(&c.name)))
            .collect();
        let action = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };
        format!(
            "{} ON CONFLICT ({}) {}",
            Self::insert_sql(table),
            conflict.join(", "),
            action
        )
    }

    fn execute_rows(conn: &Connection, table: &TableDef, rows: &[Row], sql: &str) -> Result<usize> {
        let mut stmt = conn.prepare(sql)?;
        let mut written = 0;
        for row in rows {
            let values: Vec<SqlValue> = table.values_of(row).iter().map(to_sql).collect();
            written += stmt.execute(params_from_iter(values))?;
        }
        Ok(written)
    }

    fn write_batch(&mut self, table: &TableDef, rows: &[Row], sql: &str) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let written = Self::execute_rows(&tx, table, rows, sql)?;
        tx.commit()?;
        Ok(written)
    }
}

impl Store for SqliteStore {
    fn table_exists(&self, name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    fn create_table(&mut self, table: &TableDef) -> Result<()> {
        debug!("100 | Creating table {} if absent", table.name);
        self.conn.execute(&Self::create_table_sql(table), [])?;
        Ok(())
    }

    fn drop_table(&mut self, name: &str) -> Result<()> {
        warn!("400 | Dropping table if exists: {}", name);
        self.conn
            .execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(name)), [])?;
        Ok(())
    }

    fn insert(&mut self, table: &TableDef, rows: &[Row]) -> Result<usize> {
        info!("100 | Inserting {} rows into table: {}", rows.len(), table.name);
        let sql = Self::insert_sql(table);
        self.write_batch(table, rows, &sql)
    }

    fn upsert(&mut self, table: &TableDef, rows: &[Row]) -> Result<usize> {
        info!("100 | Upserting {} rows into table: {}", rows.len(), table.name);
        let sql = Self::upsert_sql(table);
        let written = self.write_batch(table, rows, &sql)?;
        info!("200 | Upsert operation completed for table: {}", table.name);
        Ok(written)
    }

    fn replace(&mut self, table: &TableDef, rows: &[Row]) -> Result<usize> {
        warn!("400 | Replacing contents of table: {}", table.name);
        let tx = self.conn.transaction()?;
        tx.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(&table.name)), [])?;
        tx.execute(&Self::create_table_sql(table), [])?;
        let written = Self::execute_rows(&tx, table, rows, &Self::insert_sql(table))?;
        tx.commit()?;
        info!("200 | Replaced table {} with {} rows", table.name, written);
        Ok(written)
    }

    fn select_all(&self, table: &TableDef) -> Result<Vec<Row>> {
        debug!("100 | Selecting all data from table: {}", table.name);
        let cols: Vec<String> = table.column_names().map(quote_ident).collect();
        let pk: Vec<String> = table.primary_key().into_iter().map(quote_ident).collect();
        let order = if pk.is_empty() {
            "rowid".to_string()
        } else {
            pk.join(", ")
        };
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            cols.join(", "),
            quote_ident(&table.name),
            order
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(r) = rows.next()? {
            let mut row = Row::new();
            for (i, col) in table.columns.iter().enumerate() {
                row.insert(col.name.clone(), from_sql(r.get_ref(i)?));
            }
            out.push(row);
        }
        Ok(out)
    }
}
