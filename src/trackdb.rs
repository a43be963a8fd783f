//! MySQL implementation of [`Store`] on top of diesel.
//!
//! The schema differs between database epochs, so nothing is generated at
//! compile time. Column lists come from `information_schema`, rows are read
//! back through `JSON_OBJECT` and every value is a bound parameter.

use std::collections::HashMap;

use diesel::connection::{AnsiTransactionManager, TransactionManager};
use diesel::mysql::{Mysql, MysqlConnection};
use diesel::prelude::*;
use diesel::query_builder::{BoxedSqlQuery, SqlQuery};
use diesel::sql_types::{BigInt, Nullable, Text};
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Error, Result};
use crate::models::{Record, Value};
use crate::store::{Condition, Filter, Store};
use crate::tables::Table;

#[derive(QueryableByName)]
struct JsonRow {
    #[diesel(sql_type = Text)]
    row_json: String,
}

#[derive(QueryableByName)]
struct ColumnName {
    #[diesel(sql_type = Text)]
    column_name: String,
}

#[derive(QueryableByName)]
struct TextValue {
    #[diesel(sql_type = Nullable<Text>)]
    value: Option<String>,
}

#[derive(QueryableByName)]
struct MaxId {
    #[diesel(sql_type = BigInt)]
    max_id: i64,
}

pub struct MysqlStore {
    conn: MysqlConnection,
    columns: HashMap<Table, Vec<String>>,
}

/// Backtick-quotes a column name after making sure it is a plain identifier.
fn quote(ident: &str) -> Result<String> {
    lazy_static! {
        static ref RE_IDENT: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    }
    if RE_IDENT.is_match(ident) {
        Ok(format!("`{}`", ident))
    } else {
        Err(Error::InvalidIdentifier(ident.to_string()))
    }
}

/// Renders the WHERE clause of `filter` and collects its bind values.
fn where_clause(filter: &Filter, binds: &mut Vec<Option<String>>) -> Result<String> {
    let mut parts = Vec::new();
    for c in &filter.conditions {
        match c {
            Condition::Eq(field, Value::Null) => parts.push(format!("{} IS NULL", quote(field)?)),
            Condition::Eq(field, value) => {
                parts.push(format!("{} = ?", quote(field)?));
                binds.push(value.to_sql());
            }
            Condition::Like(field, pattern) => {
                parts.push(format!("{} LIKE ?", quote(field)?));
                binds.push(Some(pattern.clone()));
            }
        }
    }
    if filter.latest_only {
        parts.push(String::from("`latest` = 1"));
    }
    if parts.is_empty() {
        Ok(String::new())
    } else {
        Ok(format!(" WHERE {}", parts.join(" AND ")))
    }
}

fn insert_statement(table: Table, record: &Record) -> Result<(String, Vec<Option<String>>)> {
    let fields = record.fields().map(quote).collect::<Result<Vec<String>>>()?;
    let binds = record.iter().map(|(_, v)| v.to_sql()).collect();
    let sql = format!(
        "INSERT INTO `{}` ({}) VALUES ({})",
        table.name(),
        fields.join(", "),
        vec!["?"; fields.len()].join(", ")
    );
    Ok((sql, binds))
}

/// SET values are bound before the WHERE values.
fn update_statement(table: Table, changes: &Record, filter: &Filter) -> Result<(String, Vec<Option<String>>)> {
    let mut binds = Vec::new();
    let mut sets = Vec::new();
    for (field, value) in changes.iter() {
        sets.push(format!("{} = ?", quote(field)?));
        binds.push(value.to_sql());
    }
    let sql = format!(
        "UPDATE `{}` SET {}{}",
        table.name(),
        sets.join(", "),
        where_clause(filter, &mut binds)?
    );
    Ok((sql, binds))
}

fn bound(sql: String, binds: Vec<Option<String>>) -> BoxedSqlQuery<'static, Mysql, SqlQuery> {
    let mut query = diesel::sql_query(sql).into_boxed::<Mysql>();
    for b in binds {
        query = query.bind::<Nullable<Text>, _>(b);
    }
    query
}

impl MysqlStore {
    pub fn connect(url: &str) -> Result<Self> {
        let conn = MysqlConnection::establish(url)?;
        Ok(MysqlStore {
            conn,
            columns: HashMap::new(),
        })
    }

    fn parse_row(json: &str) -> Result<Record> {
        let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;
        Ok(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
    }
}

impl Store for MysqlStore {
    fn columns(&mut self, table: Table) -> Result<Vec<String>> {
        if let Some(cols) = self.columns.get(&table) {
            return Ok(cols.clone());
        }
        let rows: Vec<ColumnName> = bound(
            String::from(
                "SELECT CAST(column_name AS CHAR) AS column_name FROM information_schema.columns \
                 WHERE table_schema = DATABASE() AND table_name = ? ORDER BY ordinal_position",
            ),
            vec![Some(table.name().to_string())],
        )
        .load(&mut self.conn)?;
        if rows.is_empty() {
            return Err(Error::InvalidInput(format!("table {} doesn't exist", table)));
        }
        let cols: Vec<String> = rows.into_iter().map(|r| r.column_name).collect();
        debug!("{}: columns {:?}", table, cols);
        self.columns.insert(table, cols.clone());
        Ok(cols)
    }

    fn find(&mut self, table: Table, filter: &Filter) -> Result<Vec<Record>> {
        let cols = self.columns(table)?;
        let pairs = cols
            .iter()
            .map(|c| Ok(format!("'{}', {}", c, quote(c)?)))
            .collect::<Result<Vec<String>>>()?;
        let mut binds = Vec::new();
        let sql = format!(
            "SELECT CAST(JSON_OBJECT({}) AS CHAR) AS row_json FROM `{}`{}",
            pairs.join(", "),
            table.name(),
            where_clause(filter, &mut binds)?
        );
        debug!("Q: {} {:?}", sql, binds);
        let rows: Vec<JsonRow> = bound(sql, binds).load(&mut self.conn)?;
        rows.iter().map(|r| Self::parse_row(&r.row_json)).collect()
    }

    fn column_values(&mut self, table: Table, field: &str) -> Result<Vec<String>> {
        let col = quote(field)?;
        let sql = format!(
            "SELECT CAST({col} AS CHAR) AS value FROM `{}` WHERE {col} IS NOT NULL",
            table.name(),
            col = col
        );
        let rows: Vec<TextValue> = diesel::sql_query(sql).load(&mut self.conn)?;
        Ok(rows.into_iter().filter_map(|r| r.value).collect())
    }

    fn max_id(&mut self, table: Table) -> Result<i64> {
        let sql = format!(
            "SELECT CAST(COALESCE(MAX({}), 0) AS SIGNED) AS max_id FROM `{}`",
            quote(&table.id_column())?,
            table.name()
        );
        let row: MaxId = diesel::sql_query(sql).get_result(&mut self.conn)?;
        Ok(row.max_id)
    }

    fn insert(&mut self, table: Table, record: &Record) -> Result<()> {
        let (sql, binds) = insert_statement(table, record)?;
        debug!("Q: {} {:?}", sql, binds);
        bound(sql, binds).execute(&mut self.conn)?;
        Ok(())
    }

    fn update(&mut self, table: Table, changes: &Record, filter: &Filter) -> Result<usize> {
        let (sql, binds) = update_statement(table, changes, filter)?;
        debug!("Q: {} {:?}", sql, binds);
        Ok(bound(sql, binds).execute(&mut self.conn)?)
    }

    fn begin(&mut self) -> Result<()> {
        <AnsiTransactionManager as TransactionManager<MysqlConnection>>::begin_transaction(&mut self.conn)?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        <AnsiTransactionManager as TransactionManager<MysqlConnection>>::commit_transaction(&mut self.conn)?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        <AnsiTransactionManager as TransactionManager<MysqlConnection>>::rollback_transaction(&mut self.conn)?;
        Ok(())
    }
}
