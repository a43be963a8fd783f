//! Metadata exported from iRODS as JSON: one object per data object (a
//! BAM or CRAM file), described by attribute-value pairs.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::models::{Batch, Entry};
use crate::normalize::split_organism_part;
use crate::tables::Table;
use crate::taxonomy::enrich_species;

#[derive(Debug, Deserialize)]
struct DataObject {
    data_object: String,
    avus: Vec<Avu>,
}

#[derive(Debug, Deserialize)]
struct Avu {
    attribute: String,
    value: serde_json::Value,
}

impl Avu {
    fn text(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        }
    }
}

/// iRODS attribute to table field.
const ATTRIBUTES: [(&str, Table, &str); 17] = [
    ("ebi_run_acc", Table::File, "accession"),
    ("is_paired_read", Table::File, "type"),
    ("total_reads", Table::File, "nber_reads"),
    ("md5", Table::File, "md5"),
    ("study", Table::Project, "name"),
    ("study_accession_number", Table::Project, "accession"),
    ("study_id", Table::Project, "ssid"),
    ("study_title", Table::Project, "alias"),
    ("sample", Table::Sample, "name"),
    ("sample_accession_number", Table::Sample, "accession"),
    ("sample_id", Table::Sample, "ssid"),
    ("library_id", Table::Library, "ssid"),
    ("library_type", Table::LibraryType, "name"),
    ("lane", Table::Lane, "name"),
    ("sample_common_name", Table::Species, "name"),
    ("sample_public_name", Table::Individual, "alias"),
    ("sample_donor_id", Table::Sample, "name"),
];

/// Fields holding integers in the database.
const INTEGER_FIELDS: [&str; 2] = ["ssid", "nber_reads"];

fn lookup(attribute: &str) -> Option<(Table, &'static str)> {
    ATTRIBUTES
        .iter()
        .find(|(a, _, _)| *a == attribute)
        .map(|(_, t, f)| (*t, *f))
}

pub fn read_export(path: &Path, ctx: &Context) -> Result<Batch> {
    info!("Reading iRODS export {}", path.display());
    let json = std::fs::read_to_string(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    parse_export(&json, &name, ctx)
}

pub fn parse_export(json: &str, name: &str, ctx: &Context) -> Result<Batch> {
    let objects: Vec<DataObject> = serde_json::from_str(json)?;
    let mut batch = Batch::new(name);
    for object in &objects {
        match entry(object, ctx)? {
            Some((individual, entry)) => batch.push(&individual, entry),
            None => warn!("{} has no sample_supplier_name, skipping it", object.data_object),
        }
    }
    info!(
        "{}: {} data objects for {} individuals",
        batch.source,
        batch.entry_count(),
        batch.len()
    );
    Ok(batch)
}

fn entry(object: &DataObject, ctx: &Context) -> Result<Option<(String, Entry)>> {
    let avus: HashMap<&str, String> = object
        .avus
        .iter()
        .map(|a| (a.attribute.as_str(), a.text()))
        .collect();
    let supplier_name = match avus.get("sample_supplier_name").filter(|n| !n.is_empty()) {
        Some(n) => n.clone(),
        None => return Ok(None),
    };

    let mut entry = Entry::default();
    for (attribute, value) in &avus {
        let (table, field) = match lookup(attribute) {
            Some(m) => m,
            None => continue,
        };
        // the donor id names the sample only for data without a sample name
        if *attribute == "sample_donor_id" && avus.contains_key("sample") {
            continue;
        }
        let record = entry.record_mut(table);
        if *attribute == "is_paired_read" {
            record.set(field, "PE");
        } else if INTEGER_FIELDS.contains(&field) {
            let n: i64 = value.parse().map_err(|_| {
                Error::InvalidInput(format!(
                    "{}: {} should be an integer, got {:?}",
                    object.data_object, attribute, value
                ))
            })?;
            record.set(field, n);
        } else {
            record.set(field, value.as_str());
        }
    }

    let (individual, part) = if supplier_name.contains('.') || supplier_name.contains("gDNA") {
        split_organism_part(&supplier_name, &ctx.ontology)
    } else {
        (supplier_name.clone(), None)
    };
    entry.record_mut(Table::Individual).set("name", individual.as_str());
    entry.record_mut(Table::Material).set("name", supplier_name.as_str());
    if let Some(part) = part {
        entry.record_mut(Table::OrganismPart).set("name", part);
    }

    let (file_name, format) = match object.data_object.rfind('.') {
        Some(pos) => (&object.data_object[..pos], Some(&object.data_object[pos + 1..])),
        None => (object.data_object.as_str(), None),
    };
    let file = entry.record_mut(Table::File);
    file.set("name", file_name);
    if let Some(format) = format {
        file.set("format", format);
    }
    let run_lane = object.data_object.split('.').next().unwrap_or_default();
    entry.record_mut(Table::Lane).set("accession", run_lane);

    if let Some(species) = entry.tables.get_mut(&Table::Species) {
        enrich_species(species, ctx.taxonomy);
    }
    entry.prune();
    Ok(Some((individual, entry)))
}
