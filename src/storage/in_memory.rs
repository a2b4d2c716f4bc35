use super::{Row, Store, TableDef, Value};
use crate::error::{EtlError, Result};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

struct MemTable {
    def: TableDef,
    rows: Vec<Row>,
}

impl MemTable {
    fn position(&self, key: &[Value]) -> Option<usize> {
        if key.is_empty() {
            return None;
        }
        self.rows.iter().position(|r| self.def.key_of(r) == key)
    }

    /// Current rows plus `rows`; a key already present fails the whole batch.
    fn staged_insert(&self, rows: &[Row]) -> Result<Vec<Row>> {
        let mut staged = self.rows.clone();
        for row in rows {
            let key = self.def.key_of(row);
            if !key.is_empty() && staged.iter().any(|r| self.def.key_of(r) == key) {
                return Err(EtlError::DuplicateKey {
                    table: self.def.name.clone(),
                    key: render_key(&key),
                });
            }
            staged.push(self.project(row));
        }
        Ok(staged)
    }

    /// Keep only the columns the table declares.
    fn project(&self, row: &Row) -> Row {
        self.def
            .columns
            .iter()
            .map(|c| (c.name.clone(), row.get(&c.name).cloned().unwrap_or(Value::Null)))
            .collect()
    }
}

fn render_key(key: &[Value]) -> String {
    let parts: Vec<String> = key.iter().map(Value::to_string).collect();
    format!("({})", parts.join(", "))
}

fn cmp_keys(a: &[Value], b: &[Value]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.sort_cmp(y))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// In-memory store for development/testing, same semantics as the SQLite store.
#[derive(Default)]
pub struct InMemoryStore {
    tables: HashMap<String, MemTable>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemTable> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| EtlError::Config(format!("no such table: {name}")))
    }
}

impl Store for InMemoryStore {
    fn table_exists(&self, name: &str) -> Result<bool> {
        Ok(self.tables.contains_key(name))
    }

    fn create_table(&mut self, table: &TableDef) -> Result<()> {
        self.tables
            .entry(table.name.clone())
            .or_insert_with(|| MemTable {
                def: table.clone(),
                rows: Vec::new(),
            });
        Ok(())
    }

    fn drop_table(&mut self, name: &str) -> Result<()> {
        if self.tables.remove(name).is_some() {
            debug!("Dropped in-memory table {}", name);
        }
        Ok(())
    }

    fn insert(&mut self, table: &TableDef, rows: &[Row]) -> Result<usize> {
        let mem = self.table_mut(&table.name)?;
        mem.rows = mem.staged_insert(rows)?;
        Ok(rows.len())
    }

    fn replace(&mut self, table: &TableDef, rows: &[Row]) -> Result<usize> {
        let fresh = MemTable {
            def: table.clone(),
            rows: Vec::new(),
        };
        let rows_in = fresh.staged_insert(rows)?;
        self.tables.insert(
            table.name.clone(),
            MemTable {
                rows: rows_in,
                ..fresh
            },
        );
        Ok(rows.len())
    }

    fn upsert(&mut self, table: &TableDef, rows: &[Row]) -> Result<usize> {
        let mem = self.table_mut(&table.name)?;
        for row in rows {
            let projected = mem.project(row);
            match mem.position(&mem.def.key_of(row)) {
                Some(idx) => mem.rows[idx] = projected,
                None => mem.rows.push(projected),
            }
        }
        Ok(rows.len())
    }

    fn select_all(&self, table: &TableDef) -> Result<Vec<Row>> {
        let mem = self
            .tables
            .get(&table.name)
            .ok_or_else(|| EtlError::Config(format!("no such table: {}", table.name)))?;
        let mut rows = mem.rows.clone();
        if !mem.def.primary_key().is_empty() {
            rows.sort_by(|a, b| cmp_keys(&mem.def.key_of(a), &mem.def.key_of(b)));
        }
        Ok(rows)
    }
}
