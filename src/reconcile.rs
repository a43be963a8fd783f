//! Deciding, row by row, whether incoming data is new, unchanged, or
//! replaces what the database holds.

use chrono::NaiveDate;

use crate::error::Result;
use crate::models::{Record, Value};
use crate::store::{Filter, Store};
use crate::tables::Table;

/// What to do with a row whose stored fields differ from the incoming ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// Retire the current row (`latest = 0`) and insert the merged data as the new current version.
    NewVersion,
    /// Write the differing fields into the current row.
    Overwrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Action {
    Inserted,
    Updated,
    Unchanged,
    Skipped,
}

impl Action {
    pub fn is_change(self) -> bool {
        matches!(self, Action::Inserted | Action::Updated)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub action: Action,
    /// `<table>_id` of the row written or matched, for tables that have one
    pub id: Option<i64>,
}

impl Outcome {
    fn new(action: Action, id: Option<i64>) -> Self {
        Outcome { action, id }
    }
}

/// Stamps writes with the import date.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    today: NaiveDate,
}

fn key_filter(table: Table, key: &[(&str, Value)]) -> Filter {
    key.iter()
        .fold(Filter::new(), |f, (field, value)| f.eq(field, value.clone()))
        .latest_for(table)
}

impl Reconciler {
    pub fn new(today: NaiveDate) -> Self {
        Reconciler { today }
    }

    /// Brings the row identified by `key` in line with `record`.
    ///
    /// Only fields present both in `record` and in the stored row are
    /// compared; empty incoming values never clear stored ones.
    pub fn reconcile<S: Store + ?Sized>(
        &self,
        store: &mut S,
        table: Table,
        key: &[(&str, Value)],
        record: &Record,
        policy: WritePolicy,
    ) -> Result<Outcome> {
        if key.is_empty() || key.iter().any(|(_, v)| v.is_empty()) {
            debug!("{}: no identifier, skipping", table);
            return Ok(Outcome::new(Action::Skipped, None));
        }

        let mut record = record.clone();
        record.retain(|k, v| !v.is_empty() && k != "row_id");
        for (field, value) in key {
            record.set(field, value.clone());
        }

        let current = match store.find(table, &key_filter(table, key))?.into_iter().next() {
            Some(row) => row,
            None => {
                debug!("{}: no previous record for {:?}, inserting", table, key);
                return self.insert(store, table, record);
            }
        };
        let id = if table.owns_id() {
            current.id(&table.id_column())
        } else {
            None
        };

        let diff: Record = record
            .iter()
            .filter(|(k, v)| match current.get(k) {
                Some(old) => !old.same_as(v),
                None => false,
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if diff.is_empty() {
            return Ok(Outcome::new(Action::Unchanged, id));
        }

        let row = match id {
            Some(id) => Filter::new().eq(&table.id_column(), id).latest_for(table),
            None => key_filter(table, key),
        };

        if policy == WritePolicy::NewVersion && table.is_versioned() {
            info!("{}: new version of {:?}, changed {:?}", table, key, diff.fields().collect::<Vec<_>>());
            let mut retire = Record::new();
            retire.set("changed", self.today);
            retire.set("latest", 0);
            store.update(table, &retire, &row)?;

            let mut next = current.merged(&diff);
            next.retain(|k, v| *v != Value::Null && k != "row_id");
            next.set("changed", self.today);
            next.set("latest", 1);
            store.insert(table, &next)?;
        } else {
            info!("{}: overwriting {:?}, changed {:?}", table, key, diff.fields().collect::<Vec<_>>());
            let mut changes = diff;
            if table.is_versioned() {
                changes.set("changed", self.today);
            }
            store.update(table, &changes, &row)?;
        }
        Ok(Outcome::new(Action::Updated, id))
    }

    /// Returns the matching row's id, inserting `record` if there is none.
    /// Stored rows are never compared or changed.
    pub fn ensure<S: Store + ?Sized>(
        &self,
        store: &mut S,
        table: Table,
        key: &[(&str, Value)],
        record: &Record,
    ) -> Result<Outcome> {
        if let Some(row) = store.find(table, &key_filter(table, key))?.into_iter().next() {
            let id = row.id(&table.id_column());
            return Ok(Outcome::new(Action::Unchanged, id));
        }
        let mut record = record.clone();
        record.retain(|_, v| !v.is_empty());
        for (field, value) in key {
            record.set(field, value.clone());
        }
        self.insert(store, table, record)
    }

    fn insert<S: Store + ?Sized>(&self, store: &mut S, table: Table, mut record: Record) -> Result<Outcome> {
        let id = if table.owns_id() {
            let id = store.max_id(table)? + 1;
            record.set(&table.id_column(), id);
            Some(id)
        } else {
            None
        };
        if table.is_versioned() {
            record.set("changed", self.today);
            record.set("latest", 1);
        }
        store.insert(table, &record)?;
        Ok(Outcome::new(Action::Inserted, id))
    }
}
