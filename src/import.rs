//! Writes a parsed batch into the tracking database, one source per
//! transaction.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::NaiveDate;

use crate::error::Result;
use crate::models::{Annotation, Batch, Entry, Measurement, Record, RecordOption, Value};
use crate::reconcile::{Action, Outcome, Reconciler, WritePolicy};
use crate::store::{Filter, Store};
use crate::tables::{IdentifierScheme, Table, PROCESSING_ORDER};

/// How many rows of each table were inserted, updated, left alone or skipped.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    counts: BTreeMap<Table, BTreeMap<Action, usize>>,
}

impl Summary {
    pub fn add(&mut self, table: Table, action: Action) {
        *self.counts.entry(table).or_default().entry(action).or_default() += 1;
    }

    pub fn count(&self, table: Table, action: Action) -> usize {
        self.counts
            .get(&table)
            .and_then(|c| c.get(&action))
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self, action: Action) -> usize {
        self.counts.values().filter_map(|c| c.get(&action)).sum()
    }

    pub fn has_changes(&self) -> bool {
        self.counts
            .values()
            .flat_map(|c| c.iter())
            .any(|(action, n)| action.is_change() && *n > 0)
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for table in self.counts.keys() {
            writeln!(
                f,
                "{:>20}: {} inserted, {} updated, {} unchanged, {} skipped",
                table.name(),
                self.count(*table, Action::Inserted),
                self.count(*table, Action::Updated),
                self.count(*table, Action::Unchanged),
                self.count(*table, Action::Skipped)
            )?;
        }
        Ok(())
    }
}

/// Table an annotation category is attached to.
fn annotation_target(category: &str) -> Option<Table> {
    match category.trim().to_lowercase().as_str() {
        "individual" | "morphology" | "general" => Some(Table::IndividualData),
        "material" | "extraction" | "lab_note" => Some(Table::Material),
        "sequencing" => Some(Table::Sample),
        "image" => Some(Table::Image),
        "files" => Some(Table::File),
        _ => None,
    }
}

pub struct Importer<'s, S: Store + ?Sized> {
    store: &'s mut S,
    reconciler: Reconciler,
    policy: WritePolicy,
    summary: Summary,
}

impl<'s, S: Store + ?Sized> Importer<'s, S> {
    pub fn new(store: &'s mut S, today: NaiveDate, policy: WritePolicy) -> Self {
        Importer {
            store,
            reconciler: Reconciler::new(today),
            policy,
            summary: Summary::default(),
        }
    }

    pub fn import(mut self, batch: &Batch, scheme: IdentifierScheme) -> Result<Summary> {
        for (individual, entries) in batch.individuals() {
            info!("Working on individual {}", individual);
            for entry in entries {
                self.import_entry(entry, scheme)?;
            }
        }
        Ok(self.summary)
    }

    fn import_entry(&mut self, entry: &Entry, scheme: IdentifierScheme) -> Result<()> {
        let policy = match entry.option {
            Some(RecordOption::Update) => WritePolicy::NewVersion,
            Some(RecordOption::Overwrite) | Some(RecordOption::NewRecord) => WritePolicy::Overwrite,
            None => self.policy,
        };

        let mut ids: HashMap<Table, i64> = HashMap::new();
        for table in PROCESSING_ORDER.iter().copied() {
            let record = match entry.record(table) {
                Some(r) => r.clone(),
                None => continue,
            };
            let record = self.prepare(table, record, &ids)?;
            let field = scheme.identifier(table);
            let id_value = record.get(field).cloned().unwrap_or(Value::Null);
            let outcome = self.reconciler.reconcile(
                &mut *self.store,
                table,
                &[(field, id_value)],
                &record,
                policy,
            )?;
            self.tally(table, outcome);
            if let Some(id) = outcome.id {
                ids.insert(table, id);
            }
        }

        let individual_id = ids.get(&Table::Individual).copied();

        if let (Some(individual_id), Some(project_id)) = (individual_id, ids.get(&Table::Project).copied()) {
            let link = [("project_id", Value::Int(project_id)), ("individual_id", Value::Int(individual_id))];
            let outcome = self.reconciler.ensure(&mut *self.store, Table::Allocation, &link, &Record::new())?;
            self.tally(Table::Allocation, outcome);
        }

        if entry.option == Some(RecordOption::NewRecord) {
            if !entry.measurements.is_empty() {
                debug!("new_record line: ignoring {} measurements", entry.measurements.len());
            }
        } else {
            for m in &entry.measurements {
                match individual_id {
                    Some(id) => self.measurement(id, m, policy)?,
                    None => warn!("No individual to attach {} = {} to", m.attribute, m.value),
                }
            }
        }

        if let Some(annotation) = &entry.annotation {
            self.annotation(annotation, &ids)?;
        }
        Ok(())
    }

    fn tally(&mut self, table: Table, outcome: Outcome) {
        self.summary.add(table, outcome.action);
    }

    /// Attaches the ids of the parents already written for this entry and
    /// drops fields the table doesn't have in this database.
    fn prepare(&mut self, table: Table, mut record: Record, ids: &HashMap<Table, i64>) -> Result<Record> {
        let columns = self.store.columns(table)?;
        for parent in table.parents() {
            let column = parent.id_column();
            if record.contains(&column) || !columns.contains(&column) {
                continue;
            }
            let id = match parent {
                Table::Ontology => match record.text("name").map(str::to_string) {
                    Some(name) => self.ontology_id(&name)?,
                    None => None,
                },
                p => ids.get(p).copied(),
            };
            if let Some(id) = id {
                record.set(&column, id);
            }
        }
        let unknown: Vec<String> = record
            .fields()
            .filter(|f| !columns.iter().any(|c| c == f))
            .map(str::to_string)
            .collect();
        if !unknown.is_empty() {
            warn!("{} has no column {}, ignoring it", table, unknown.join(", "));
            record.retain(|k, _| !unknown.contains(k));
        }
        Ok(record)
    }

    /// Ontology terms are looked up, never created: exact name, plural,
    /// then any term starting with the name.
    fn ontology_id(&mut self, name: &str) -> Result<Option<i64>> {
        let filters = [
            Filter::new().eq("name", name),
            Filter::new().eq("name", format!("{}s", name)),
            Filter::new().like("name", &format!("{}%", name)),
        ];
        for filter in filters.iter() {
            if let Some(id) = self
                .store
                .find(Table::Ontology, filter)?
                .first()
                .and_then(|r| r.id("ontology_id"))
            {
                return Ok(Some(id));
            }
        }
        warn!("No ontology term for {}", name);
        Ok(None)
    }

    fn measurement(&mut self, individual_id: i64, m: &Measurement, policy: WritePolicy) -> Result<()> {
        let mut term = Record::new();
        if let Some(comment) = &m.comment {
            term.set("comment", comment.as_str());
        }
        let cv = self.reconciler.ensure(
            &mut *self.store,
            Table::Cv,
            &[("attribute", Value::from(m.attribute.as_str()))],
            &term,
        )?;
        self.tally(Table::Cv, cv);
        let cv_id = match cv.id {
            Some(id) => id,
            None => return Ok(()),
        };

        let mut data = Record::new();
        data.set("value", m.value.as_str());
        if let Some(unit) = &m.unit {
            data.set("unit", unit.as_str());
        }
        if let Some(note) = &m.note {
            data.set("comment", note.as_str());
        }
        let outcome = self.reconciler.reconcile(
            &mut *self.store,
            Table::IndividualData,
            &[("individual_id", Value::Int(individual_id)), ("cv_id", Value::Int(cv_id))],
            &data,
            policy,
        )?;
        self.tally(Table::IndividualData, outcome);
        Ok(())
    }

    /// Notes accumulate: a value already among the `; `-separated notes is
    /// not added twice.
    fn annotation(&mut self, annotation: &Annotation, ids: &HashMap<Table, i64>) -> Result<()> {
        let target = match annotation_target(&annotation.category) {
            Some(t) => t,
            None => {
                warn!("Unknown annotation category {}, ignoring it", annotation.category);
                return Ok(());
            }
        };
        let owner = if target == Table::IndividualData {
            Table::Individual
        } else {
            target
        };
        let owner_id = match ids.get(&owner) {
            Some(id) => *id,
            None => {
                warn!("No {} row to annotate with {:?}", owner, annotation.value);
                return Ok(());
            }
        };

        let term: Record = vec![("comment", format!("entry for table {}", target.name()))]
            .into_iter()
            .collect();
        let cv = self.reconciler.ensure(
            &mut *self.store,
            Table::Cv,
            &[
                ("attribute", Value::from("notes")),
                ("comment", Value::from(format!("entry for table {}", target.name()))),
            ],
            &term,
        )?;
        self.tally(Table::Cv, cv);
        let cv_id = match cv.id {
            Some(id) => id,
            None => return Ok(()),
        };

        let (table, row_key) = if target == Table::IndividualData {
            (
                Table::IndividualData,
                vec![("individual_id", Value::Int(owner_id)), ("cv_id", Value::Int(cv_id))],
            )
        } else {
            (
                Table::Annotations,
                vec![
                    ("table_name", Value::from(target.name())),
                    ("table_id", Value::Int(owner_id)),
                    ("cv_id", Value::Int(cv_id)),
                ],
            )
        };

        let filter = row_key
            .iter()
            .fold(Filter::new(), |f, (k, v)| f.eq(k, v.clone()))
            .latest_for(table);
        let value = annotation.value.trim();
        let current = self
            .store
            .find(table, &filter)?
            .first()
            .and_then(|r| r.text("value").map(str::to_string));
        let merged = match current {
            Some(old) if old.trim().is_empty() => value.to_string(),
            Some(old) if old.split("; ").any(|part| part == value) => old,
            Some(old) => format!("{}; {}", old, value),
            None => value.to_string(),
        };

        let record: Record = vec![("value", merged)].into_iter().collect();
        let outcome = self.reconciler.reconcile(&mut *self.store, table, &row_key, &record, WritePolicy::Overwrite)?;
        self.tally(table, outcome);
        Ok(())
    }
}

/// Imports one source in its own transaction. Changes are committed only if
/// there are any and this is not a dry run; any error rolls everything back.
pub fn import_source<S: Store + ?Sized>(
    store: &mut S,
    batch: &Batch,
    scheme: IdentifierScheme,
    kind: &str,
    today: NaiveDate,
    policy: WritePolicy,
    dry_run: bool,
) -> Result<Summary> {
    if batch.is_empty() {
        warn!("Nothing to import from the {} {}", kind, batch.source);
    }
    store.begin()?;
    let result = Importer::new(&mut *store, today, policy).import(batch, scheme);
    match result {
        Ok(summary) => {
            info!("Summary for the {} {}:\n{}", kind, batch.source, summary);
            info!(
                "{} rows inserted, {} updated",
                summary.total(Action::Inserted),
                summary.total(Action::Updated)
            );
            if summary.has_changes() && !dry_run {
                info!("Committing data from the {} {} to the database", kind, batch.source);
                store.commit()?;
            } else {
                if dry_run {
                    info!("Dry run, discarding changes from the {} {}", kind, batch.source);
                } else {
                    info!("Nothing to change from the {} {}", kind, batch.source);
                }
                store.rollback()?;
            }
            Ok(summary)
        }
        Err(e) => {
            error!("Rolling back database changes...");
            if let Err(rollback) = store.rollback() {
                error!("Rollback failed: {}", rollback);
            }
            error!(
                "The program failed to import data from the {} {} with the below exception:",
                kind, batch.source
            );
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::store::memory::MemoryStore;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2019, 8, 1).unwrap()
    }

    fn rec(pairs: &[(&str, &str)]) -> Record {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    fn store() -> MemoryStore {
        let mut s = MemoryStore::cichlid();
        s.seed(Table::Ontology, vec![("ontology_id", Value::Int(10)), ("name", Value::from("fins"))].into_iter().collect());
        s.seed(Table::Ontology, vec![("ontology_id", Value::Int(11)), ("name", Value::from("juvenile stage"))].into_iter().collect());
        s
    }

    fn fish(sex: &str, weight: &str) -> Entry {
        let mut e = Entry::default();
        e.tables.insert(Table::Species, rec(&[("name", "Cyrtocara moorii")]));
        e.tables.insert(Table::Location, rec(&[("source_location", "Chilumba"), ("latitude", "-10.4170")]));
        e.tables.insert(Table::Project, rec(&[("name", "malawi"), ("alias", "mm")]));
        e.tables.insert(Table::DevelopmentalStage, rec(&[("name", "juvenile")]));
        e.tables.insert(Table::OrganismPart, rec(&[("name", "fin")]));
        e.tables.insert(Table::Individual, rec(&[("name", "D02-C04"), ("sex", sex)]));
        e.tables.insert(Table::Material, rec(&[("name", "D02-C04.fin1")]));
        e.tables.insert(Table::Sample, rec(&[("name", "cichlid1234")]));
        let mut m = Measurement::new("Weight obtained from Sequenced_master Cichlid spreadsheet", weight);
        m.unit = Some("g".into());
        m.comment = Some("extracted the 2019-08-01".into());
        e.measurements.push(m);
        e
    }

    fn batch(entries: Vec<(&str, Entry)>) -> Batch {
        let mut b = Batch::new("Sequenced_master");
        for (name, e) in entries {
            b.push(name, e);
        }
        b
    }

    fn run(s: &mut MemoryStore, b: &Batch, policy: WritePolicy) -> Result<Summary> {
        import_source(s, b, IdentifierScheme::LegacySheet, "spreadsheet", today(), policy, false)
    }

    #[test]
    fn entries_are_linked_through_parent_ids() -> Result<()> {
        let mut s = store();
        let summary = run(&mut s, &batch(vec![("D02-C04", fish("male", "12.5"))]), WritePolicy::NewVersion)?;
        assert!(summary.has_changes());
        assert_eq!(s.commits, 1);

        let ind = &s.rows(Table::Individual)[0];
        assert_eq!(ind.id("species_id"), Some(1));
        assert_eq!(ind.id("location_id"), Some(1));
        let stage = &s.rows(Table::DevelopmentalStage)[0];
        assert_eq!(stage.id("ontology_id"), Some(11));
        let part = &s.rows(Table::OrganismPart)[0];
        assert_eq!(part.id("ontology_id"), Some(10));
        let material = &s.rows(Table::Material)[0];
        assert_eq!(material.id("individual_id"), Some(1));
        assert_eq!(material.id("organism_part_id"), Some(1));
        assert_eq!(material.id("developmental_stage_id"), Some(1));
        assert_eq!(s.rows(Table::Sample)[0].id("material_id"), Some(1));
        assert_eq!(s.rows(Table::Allocation).len(), 1);
        assert!(s.rows(Table::Ontology).len() == 2);

        let data = &s.rows(Table::IndividualData)[0];
        assert_eq!(data.text("value"), Some("12.5"));
        assert_eq!(data.text("unit"), Some("g"));
        assert_eq!(data.id("cv_id"), Some(1));
        Ok(())
    }

    #[test]
    fn reimporting_the_same_data_changes_nothing() -> Result<()> {
        let mut s = store();
        let b = batch(vec![("D02-C04", fish("male", "12.5"))]);
        run(&mut s, &b, WritePolicy::NewVersion)?;
        let again = run(&mut s, &b, WritePolicy::NewVersion)?;
        assert!(!again.has_changes());
        assert_eq!(again.count(Table::Individual, Action::Unchanged), 1);
        assert_eq!(s.commits, 1);
        assert_eq!(s.rollbacks, 1);
        assert_eq!(s.rows(Table::Allocation).len(), 1);
        Ok(())
    }

    #[test]
    fn changed_data_creates_versions_or_overwrites() -> Result<()> {
        let mut s = store();
        run(&mut s, &batch(vec![("D02-C04", fish("male", "12.5"))]), WritePolicy::NewVersion)?;

        let summary = run(&mut s, &batch(vec![("D02-C04", fish("female", "13"))]), WritePolicy::NewVersion)?;
        assert_eq!(summary.count(Table::Individual, Action::Updated), 1);
        assert_eq!(summary.count(Table::IndividualData, Action::Updated), 1);
        assert_eq!(s.rows(Table::Individual).len(), 2);
        let current = s.latest_rows(Table::Individual);
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].text("sex"), Some("female"));
        assert_eq!(current[0].id("individual_id"), Some(1));
        assert_eq!(current[0].id("species_id"), Some(1));

        run(&mut s, &batch(vec![("D02-C04", fish("m", "13"))]), WritePolicy::Overwrite)?;
        assert_eq!(s.rows(Table::Individual).len(), 2);
        assert_eq!(s.latest_rows(Table::Individual)[0].text("sex"), Some("m"));
        Ok(())
    }

    #[test]
    fn record_options_override_the_command_line() -> Result<()> {
        let mut s = store();
        run(&mut s, &batch(vec![("D02-C04", fish("male", "12.5"))]), WritePolicy::Overwrite)?;

        let mut e = fish("female", "99");
        e.option = Some(RecordOption::Update);
        run(&mut s, &batch(vec![("D02-C04", e)]), WritePolicy::Overwrite)?;
        assert_eq!(s.rows(Table::Individual).len(), 2);

        let mut e = fish("male", "50");
        e.option = Some(RecordOption::NewRecord);
        run(&mut s, &batch(vec![("D02-C04", e)]), WritePolicy::NewVersion)?;
        assert_eq!(s.rows(Table::Individual).len(), 2);
        assert_eq!(s.latest_rows(Table::Individual)[0].text("sex"), Some("male"));
        assert_eq!(s.latest_rows(Table::IndividualData)[0].text("value"), Some("99"));
        Ok(())
    }

    #[test]
    fn annotations_accumulate() -> Result<()> {
        let mut s = store();
        let note = |category: &str, value: &str| {
            let mut e = Entry::default();
            e.tables.insert(Table::Individual, rec(&[("name", "CAMBRIDGE-1")]));
            e.tables.insert(Table::Material, rec(&[("name", "CAMBRIDGE-1")]));
            e.annotation = Some(Annotation {
                category: category.into(),
                value: value.into(),
            });
            e
        };
        run(&mut s, &batch(vec![("CAMBRIDGE-1", note("lab_note", "fin clip"))]), WritePolicy::Overwrite)?;
        run(&mut s, &batch(vec![("CAMBRIDGE-1", note("extraction", "re-extracted"))]), WritePolicy::Overwrite)?;
        let summary = run(&mut s, &batch(vec![("CAMBRIDGE-1", note("lab_note", "fin clip"))]), WritePolicy::Overwrite)?;
        assert!(!summary.has_changes());

        let rows = s.rows(Table::Annotations);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text("table_name"), Some("material"));
        assert_eq!(rows[0].text("value"), Some("fin clip; re-extracted"));
        let cv = s.rows(Table::Cv);
        assert_eq!(cv[0].text("attribute"), Some("notes"));
        assert_eq!(cv[0].text("comment"), Some("entry for table material"));

        run(&mut s, &batch(vec![("CAMBRIDGE-1", note("morphology", "yellow chin"))]), WritePolicy::Overwrite)?;
        let data = s.latest_rows(Table::IndividualData);
        assert_eq!(data[0].text("value"), Some("yellow chin"));
        assert_eq!(s.rows(Table::Cv).len(), 2);
        Ok(())
    }

    #[test]
    fn parents_missing_from_the_schema_are_not_attached() -> Result<()> {
        let mut s = MemoryStore::new()
            .with_table(Table::Individual, &["row_id", "changed", "latest", "individual_id", "name"])
            .with_table(Table::Species, &["row_id", "changed", "latest", "species_id", "name"]);
        let mut e = Entry::default();
        e.tables.insert(Table::Species, rec(&[("name", "Aulonocara")]));
        e.tables.insert(Table::Individual, rec(&[("name", "A1"), ("geographical_region", "north")]));
        run(&mut s, &batch(vec![("A1", e)]), WritePolicy::NewVersion)?;
        let ind = &s.rows(Table::Individual)[0];
        assert!(!ind.contains("species_id"));
        assert!(!ind.contains("geographical_region"));
        Ok(())
    }

    #[test]
    fn failures_roll_back_and_dry_runs_never_commit() {
        let mut s = store();
        let ok = batch(vec![("D02-C04", fish("male", "1"))]);
        let summary = import_source(&mut s, &ok, IdentifierScheme::LegacySheet, "spreadsheet", today(), WritePolicy::NewVersion, true).unwrap();
        assert!(summary.has_changes());
        assert_eq!(s.commits, 0);
        assert!(s.rows(Table::Individual).is_empty());

        let mut broken = MemoryStore::new().with_table(Table::Species, &["row_id", "changed", "latest", "species_id", "name"]);
        let mut e = Entry::default();
        e.tables.insert(Table::Species, rec(&[("name", "Aulonocara")]));
        e.tables.insert(Table::Individual, rec(&[("name", "A1")]));
        let result = run(&mut broken, &batch(vec![("A1", e)]), WritePolicy::NewVersion);
        assert!(result.is_err());
        assert_eq!(broken.rollbacks, 1);
        assert!(broken.rows(Table::Species).is_empty());
    }

    #[test]
    fn failed_rollback_keeps_the_import_error() {
        let mut broken = MemoryStore::new().with_table(Table::Species, &["row_id", "changed", "latest", "species_id", "name"]);
        broken.broken_rollback = true;
        let mut e = Entry::default();
        e.tables.insert(Table::Species, rec(&[("name", "Aulonocara")]));
        e.tables.insert(Table::Individual, rec(&[("name", "A1")]));
        match run(&mut broken, &batch(vec![("A1", e)]), WritePolicy::NewVersion) {
            Err(Error::InvalidInput(msg)) => assert_eq!(msg, "table individual doesn't exist"),
            other => panic!("expected the import error, got {:?}", other),
        }
    }

    #[test]
    fn records_without_identifier_are_skipped() -> Result<()> {
        let mut s = store();
        let mut e = fish("male", "1");
        e.tables.insert(Table::Species, rec(&[("common_name", "moorii")]));
        let summary = run(&mut s, &batch(vec![("D02-C04", e)]), WritePolicy::NewVersion)?;
        assert_eq!(summary.count(Table::Species, Action::Skipped), 1);
        assert!(s.rows(Table::Species).is_empty());
        let ind = &s.latest_rows(Table::Individual)[0];
        assert_eq!(ind.id("species_id"), None);
        assert_eq!(ind.id("location_id"), Some(1));
        Ok(())
    }
}
