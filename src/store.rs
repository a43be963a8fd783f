//! Generic, table-by-name access to the tracking database.

use crate::error::Result;
use crate::models::{Record, Value};
use crate::tables::Table;

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `field = value`, or `field IS NULL` for a null value
    Eq(String, Value),
    /// `field LIKE pattern`
    Like(String, String),
}

/// A conjunction of conditions on one table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
    /// Restrict to the current version of versioned rows (`latest = 1`)
    pub latest_only: bool,
}

impl Filter {
    pub fn new() -> Self {
        Filter::default()
    }

    pub fn eq<V: Into<Value>>(mut self, field: &str, value: V) -> Self {
        self.conditions.push(Condition::Eq(field.to_string(), value.into()));
        self
    }

    pub fn like(mut self, field: &str, pattern: &str) -> Self {
        self.conditions.push(Condition::Like(field.to_string(), pattern.to_string()));
        self
    }

    pub fn latest(mut self) -> Self {
        self.latest_only = true;
        self
    }

    /// `latest = 1` only if the table keeps versions.
    pub fn latest_for(self, table: Table) -> Self {
        if table.is_versioned() {
            self.latest()
        } else {
            self
        }
    }

    /// Field names this filter refers to, including `latest`.
    #[cfg(test)]
    pub fn fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = self
            .conditions
            .iter()
            .map(|c| match c {
                Condition::Eq(f, _) | Condition::Like(f, _) => f.as_str(),
            })
            .collect();
        if self.latest_only {
            fields.push("latest");
        }
        fields
    }
}

/// Everything the importer needs from the database.
///
/// Implementations bind every value as a parameter; table names come from
/// [`Table`] and field names are validated before they reach SQL.
pub trait Store {
    /// Column names of a table, in schema order.
    fn columns(&mut self, table: Table) -> Result<Vec<String>>;

    /// All rows matching `filter`, with every column present (null if unset).
    fn find(&mut self, table: Table, filter: &Filter) -> Result<Vec<Record>>;

    /// Non-null values of one column, rendered as text.
    fn column_values(&mut self, table: Table, field: &str) -> Result<Vec<String>>;

    /// Highest `<table>_id` in use, 0 for an empty table.
    fn max_id(&mut self, table: Table) -> Result<i64>;

    fn insert(&mut self, table: Table, record: &Record) -> Result<()>;

    /// Sets the fields of `changes` on every row matching `filter`; returns the row count.
    fn update(&mut self, table: Table, changes: &Record, filter: &Filter) -> Result<usize>;

    fn begin(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
}
