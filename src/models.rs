//! Values, records and the parsed form of an input source.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::NaiveDate;

use crate::tables::Table;

/// A single cell, either parsed from an input source or read back from the database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Null,
    Int(i64),
    Text(String),
    Date(NaiveDate),
}

impl Value {
    /// Null and blank text carry no information and are never written.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// The representation bound as a SQL parameter. MySQL coerces the text
    /// into numeric and date columns.
    pub fn to_sql(&self) -> Option<String> {
        match self {
            Value::Null => None,
            v => Some(v.to_string()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Compares an incoming value with a stored one the way the database would
    /// show them: textually, but `12.50` and `12.5` are the same coordinate.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            (a, b) => {
                let (a, b) = (a.to_string(), b.to_string());
                if a.trim() == b.trim() {
                    return true;
                }
                match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
                    (Ok(x), Ok(y)) => (x - y).abs() < f64::EPSILON,
                    _ => false,
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Text(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match v {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Int(b as i64),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Text(n.to_string()),
            },
            Json::String(s) => Value::Text(s),
            other => Value::Text(other.to_string()),
        }
    }
}

/// One row of one table, field name to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record(BTreeMap<String, Value>);

impl Record {
    pub fn new() -> Self {
        Record(BTreeMap::new())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Text content of a field, `None` for missing, null or non-text values.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    pub fn id(&self, field: &str) -> Option<i64> {
        self.0.get(field).and_then(Value::as_i64)
    }

    pub fn set<V: Into<Value>>(&mut self, field: &str, value: V) {
        self.0.insert(field.to_string(), value.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    pub fn retain<F: FnMut(&String, &mut Value) -> bool>(&mut self, f: F) {
        self.0.retain(f)
    }

    /// Copy of `self` with every field of `other` written over it.
    pub fn merged(&self, other: &Record) -> Record {
        let mut out = self.clone();
        for (k, v) in other.iter() {
            out.0.insert(k.clone(), v.clone());
        }
        out
    }
}

impl<K: Into<String>, V: Into<Value>> std::iter::FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Record(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Per-row instruction of the input template's `record` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOption {
    /// Keep history: retire the current row and write a new version.
    Update,
    /// Replace the differing fields in place.
    Overwrite,
    /// Like `Overwrite`, but the row's measurement columns are ignored.
    NewRecord,
}

impl RecordOption {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" => None,
            "update" => Some(RecordOption::Update),
            "new_record" => Some(RecordOption::NewRecord),
            _ => Some(RecordOption::Overwrite),
        }
    }
}

/// Free-text note attached to a row of the table its category points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub category: String,
    pub value: String,
}

/// An `individual_data` value qualified by a controlled-vocabulary term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurement {
    /// `cv.attribute` of the term
    pub attribute: String,
    /// `cv.comment` used when the term has to be created
    pub comment: Option<String>,
    pub value: String,
    pub unit: Option<String>,
    /// `individual_data.comment`
    pub note: Option<String>,
}

impl Measurement {
    pub fn new(attribute: &str, value: &str) -> Self {
        Measurement {
            attribute: attribute.to_string(),
            comment: None,
            value: value.to_string(),
            unit: None,
            note: None,
        }
    }
}

/// Everything one spreadsheet line or one JSON data object says about an individual.
#[derive(Debug, Clone, Default)]
pub struct Entry {
    pub tables: BTreeMap<Table, Record>,
    pub option: Option<RecordOption>,
    pub annotation: Option<Annotation>,
    pub measurements: Vec<Measurement>,
}

impl Entry {
    pub fn record(&self, table: Table) -> Option<&Record> {
        self.tables.get(&table)
    }

    /// The record for `table`, created empty if the entry has none yet.
    pub fn record_mut(&mut self, table: Table) -> &mut Record {
        self.tables.entry(table).or_default()
    }

    /// Drops empty values, then tables left without any field.
    pub fn prune(&mut self) {
        for record in self.tables.values_mut() {
            record.retain(|_, v| !v.is_empty());
        }
        self.tables.retain(|_, r| !r.is_empty());
    }
}

/// A parsed input source: entries grouped by individual name, in input order.
#[derive(Debug, Default)]
pub struct Batch {
    /// Name of the spreadsheet layout or JSON file, used in logs and cv terms
    pub source: String,
    individuals: Vec<(String, Vec<Entry>)>,
    index: HashMap<String, usize>,
}

impl Batch {
    pub fn new(source: &str) -> Self {
        Batch {
            source: source.to_string(),
            ..Default::default()
        }
    }

    pub fn push(&mut self, individual: &str, entry: Entry) {
        match self.index.get(individual) {
            Some(&idx) => self.individuals[idx].1.push(entry),
            None => {
                self.index.insert(individual.to_string(), self.individuals.len());
                self.individuals.push((individual.to_string(), vec![entry]));
            }
        }
    }

    pub fn individuals(&self) -> impl Iterator<Item = (&str, &[Entry])> {
        self.individuals.iter().map(|(n, e)| (n.as_str(), e.as_slice()))
    }

    #[cfg(test)]
    pub fn entries(&self, individual: &str) -> Option<&[Entry]> {
        self.index.get(individual).map(|&i| self.individuals[i].1.as_slice())
    }

    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    pub fn entry_count(&self) -> usize {
        self.individuals.iter().map(|(_, e)| e.len()).sum()
    }
}
