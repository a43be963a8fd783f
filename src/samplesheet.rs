//! This module reads the cichlid spreadsheets (published Google sheet tabs,
//! local TSV dumps or Excel workbooks) and turns their lines into entries.
//!
//! Each spreadsheet epoch has its own fixed column order, described by a
//! [`Layout`]. Column specs are `table-field`; an empty spec skips the column.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use calamine::{open_workbook, Reader, Xlsx};
use reqwest::Url;

use crate::context::{Context, IMAGE_PROVIDER, MALINSKY_PROVIDER};
use crate::error::{Error, Result};
use crate::models::{Annotation, Batch, Entry, Measurement, RecordOption};
use crate::normalize::{self, Sex};
use crate::tables::{IdentifierScheme, Table};
use crate::taxonomy::enrich_species;

const SEQUENCED_MASTER: [&str; 30] = [
    "sample-name", "individual-name", "individual-alias", "species-name",
    "location-geographical_region", "location-source_location", "individual-date_collected",
    "species-common_name", "", "", "", "", "location-latitude", "", "location-longitude", "", "",
    "individual_data-value", "individual_data-value3", "", "", "individual-collection_details",
    "individual-collection_method", "project-alias2", "individual-sex", "individual-alias2",
    "", "", "", "individual_data-value4",
];

const SAMPLE_MASTER: [&str; 25] = [
    "individual-name", "", "", "", "individual_data-value", "individual-sex",
    "location-geographical_region", "location-source_location", "individual-collection_method",
    "individual-collection_details", "individual-date_collected", "", "", "",
    "individual_data-value4", "species-common_name", "location-latitude", "", "location-longitude",
    "", "species-name", "individual_data-value3", "", "project-alias2", "individual-alias",
];

const MLW_DB: [&str; 13] = [
    "individual-name", "sample-name", "project-ssid", "project-alias", "project-name",
    "project-accession", "sample-name", "material-name", "sample-name", "sample-name",
    "individual-sex", "species-taxon_id", "individual-geographical_region",
];

const CICHLID_ORG: [&str; 2] = ["individual-name", "image-name"];

const INPUT_TEMPLATE: [&str; 51] = [
    "individual-name", "record-option", "individual-alias", "species-name", "species-taxon_id",
    "species-common_name", "species-taxon_position", "individual-sex", "developmental_stage-name",
    "organism_part-name", "individual-date_collected", "image-filename", "image-filepath",
    "image-comment", "project-name", "project-alias", "project-ssid", "project-accession",
    "location-country", "location-location", "location-sub_location", "location-latitude",
    "location-longitude", "material-name", "material-accession", "material-type",
    "material-date_received", "material-storage_condition", "material-volume",
    "provider-provider_name", "cv-attribute", "individual_data-value", "individual_data-unit",
    "individual_data-comment", "sample-name", "sample-accession", "sample-ssid", "lane-name",
    "lane-accession", "library_type-name", "library-ssid", "file-name", "file-accession",
    "file-format", "file-type", "file-md5", "file-nber_reads", "seq_centre-name",
    "seq_tech-name", "Annotations-value", "Annotations-category",
];

/// Google sheet tab ids of the published cichlid spreadsheet.
const GID_SEQUENCED: &str = "911220955";
const GID_SAMPLES: &str = "386735776";
const GID_INPUT: &str = "1978536442";

const MLW_FILE: &str = "mlw_db_data.txt";
const IMAGES_FILE: &str = "2016_Sanger_Malawi_cichlid_sampling_trip.tsv";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    SequencedMaster,
    SampleMaster,
    Mlw,
    CichlidOrg,
    InputTemplate,
}

impl Layout {
    /// Name of the spreadsheet, also used in the cv terms derived from it.
    pub fn name(self) -> &'static str {
        match self {
            Layout::SequencedMaster => "Sequenced_master",
            Layout::SampleMaster => "Sample_master",
            Layout::Mlw => "mlw_db",
            Layout::CichlidOrg => "Cichlid.org",
            Layout::InputTemplate => "input_template",
        }
    }

    fn columns(self) -> &'static [&'static str] {
        match self {
            Layout::SequencedMaster => &SEQUENCED_MASTER,
            Layout::SampleMaster => &SAMPLE_MASTER,
            Layout::Mlw => &MLW_DB,
            Layout::CichlidOrg => &CICHLID_ORG,
            Layout::InputTemplate => &INPUT_TEMPLATE,
        }
    }

    fn header_lines(self) -> usize {
        match self {
            Layout::InputTemplate => 2,
            _ => 1,
        }
    }

    pub fn scheme(self) -> IdentifierScheme {
        match self {
            Layout::InputTemplate => IdentifierScheme::Template,
            _ => IdentifierScheme::LegacySheet,
        }
    }

    /// Guesses the layout from a sheet URL or file name.
    pub fn detect(location: &str) -> Option<Layout> {
        if location.contains(GID_SEQUENCED) {
            Some(Layout::SequencedMaster)
        } else if location.contains(GID_SAMPLES) {
            Some(Layout::SampleMaster)
        } else if location.contains(GID_INPUT) {
            Some(Layout::InputTemplate)
        } else if location.contains("mlw") {
            Some(Layout::Mlw)
        } else if location.ends_with(".tsv") {
            Some(Layout::CichlidOrg)
        } else {
            None
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Layout {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sequenced_master" | "sequenced" => Ok(Layout::SequencedMaster),
            "sample_master" | "samples" => Ok(Layout::SampleMaster),
            "mlw_db" | "mlw" => Ok(Layout::Mlw),
            "cichlid.org" | "images" => Ok(Layout::CichlidOrg),
            "input_template" | "input" => Ok(Layout::InputTemplate),
            other => Err(Error::Config(format!("unknown spreadsheet layout {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// A sheet published as TSV
    Url(String),
    File(PathBuf),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Url(u) => f.write_str(u),
            Location::File(p) => write!(f, "{}", p.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spreadsheet {
    pub location: Location,
    pub layout: Layout,
}

impl Spreadsheet {
    /// Resolves a `-s` argument: one of the named sheets, a URL or a path.
    pub fn resolve(selector: &str, base_url: &str, data_dir: &Path, layout: Option<Layout>) -> Result<Self> {
        let published = |gid: &str| Location::Url(format!("{}pub?gid={}", base_url, gid));
        let location = match selector {
            "sequenced" => published(GID_SEQUENCED),
            "samples" => published(GID_SAMPLES),
            "input" => published(GID_INPUT),
            "mlw" => Location::File(data_dir.join(MLW_FILE)),
            "images" => Location::File(data_dir.join(IMAGES_FILE)),
            s if s.starts_with("http://") || s.starts_with("https://") => Location::Url(s.to_string()),
            s => Location::File(PathBuf::from(s)),
        };
        let layout = match layout.or_else(|| Layout::detect(&location.to_string())) {
            Some(l) => l,
            None => {
                return Err(Error::Config(format!(
                    "cannot tell the layout of {}, please give --layout",
                    location
                )))
            }
        };
        Ok(Spreadsheet { location, layout })
    }

    /// All lines of the sheet, header included, cell by cell.
    pub fn read(&self) -> Result<Vec<Vec<String>>> {
        match &self.location {
            Location::Url(url) => {
                let url = tsv_url(url)?;
                info!("Fetching spreadsheet {}", url);
                parse_tsv(&fetch(url)?)
            }
            Location::File(path) if path.extension().map_or(false, |e| e == "xlsx") => read_xlsx(path),
            Location::File(path) => {
                info!("Reading spreadsheet {}", path.display());
                parse_tsv(&std::fs::read_to_string(path)?)
            }
        }
    }
}

/// The published sheet's URL asking for tab separated output.
fn tsv_url(published: &str) -> Result<Url> {
    let mut url = Url::parse(published).map_err(|_| Error::InvalidUrl(published.to_string()))?;
    url.query_pairs_mut().append_pair("output", "tsv");
    Ok(url)
}

fn fetch(url: Url) -> Result<String> {
    let http = |source| Error::Http {
        url: url.to_string(),
        source,
    };
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .map_err(http)?;
    client
        .get(url.clone())
        .send()
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.text())
        .map_err(http)
}

/// Tab separated, no quoting: published sheets never quote, and cells hold
/// literal `"` characters.
fn parse_tsv(text: &str) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(text.as_bytes());
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(|c| c.to_string()).collect());
    }
    Ok(rows)
}

fn read_xlsx(path: &Path) -> Result<Vec<Vec<String>>> {
    info!("Reading workbook {}", path.display());
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let sheetname = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| Error::Workbook(format!("{} has no sheets", path.display())))?;
    let sheet = workbook
        .worksheet_range(&sheetname)
        .ok_or_else(|| Error::Workbook(format!("cannot read sheet {}", sheetname)))??;
    Ok(sheet
        .rows()
        .map(|row| row.iter().map(|d| d.to_string()).collect())
        .collect())
}

/// Cells of one line grouped by the table part of their column spec.
type Cells = BTreeMap<String, BTreeMap<String, String>>;

fn cells(columns: &[&str], row: &[String]) -> Cells {
    let mut cells = Cells::new();
    for (spec, cell) in columns.iter().zip(row) {
        let cell = cell.trim();
        if spec.is_empty() || cell.is_empty() || cell == "NULL" {
            continue;
        }
        if let Some((table, field)) = spec.split_once('-') {
            cells
                .entry(table.to_string())
                .or_default()
                .insert(field.to_string(), cell.to_string());
        }
    }
    cells
}

/// Moves the cells that name real tables into the entry.
fn fill_tables(entry: &mut Entry, cells: Cells) {
    for (table, fields) in cells {
        match table.parse::<Table>() {
            Ok(t) => {
                let record = entry.record_mut(t);
                for (field, value) in fields {
                    record.set(&field, value);
                }
            }
            Err(_) => debug!("Ignoring cells for {}: {:?}", table, fields),
        }
    }
}

/// Species cells: a non-numeric taxon id is really a common name.
fn species_from_cells(fields: &mut BTreeMap<String, String>) {
    if let Some(taxon_id) = fields.get("taxon_id").cloned() {
        if taxon_id.parse::<i64>().is_err() {
            fields.remove("taxon_id");
            fields.insert(String::from("common_name"), taxon_id);
        }
    }
}

pub struct SheetParser<'c, 't> {
    layout: Layout,
    ctx: &'c Context<'t>,
    temp_names: usize,
}

impl<'c, 't> SheetParser<'c, 't> {
    pub fn new(layout: Layout, ctx: &'c Context<'t>) -> Self {
        SheetParser {
            layout,
            ctx,
            temp_names: 0,
        }
    }

    /// Parses every line after the header into a batch named after the layout.
    pub fn parse(&mut self, rows: &[Vec<String>]) -> Batch {
        let mut batch = Batch::new(self.layout.name());
        let columns = self.layout.columns();
        for (idx, row) in rows.iter().enumerate().skip(self.layout.header_lines()) {
            let line = cells(columns, row);
            if line.is_empty() {
                continue;
            }
            let parsed = match self.layout {
                Layout::InputTemplate => self.template_line(line),
                _ => self.legacy_line(line),
            };
            match parsed {
                Some((name, mut entry)) => {
                    entry.prune();
                    batch.push(&name, entry);
                }
                None => warn!("{} line {}: no individual, skipping it", self.layout.name(), idx + 1),
            }
        }
        info!(
            "{}: {} lines for {} individuals",
            batch.source,
            batch.entry_count(),
            batch.len()
        );
        batch
    }

    fn legacy_line(&mut self, mut line: Cells) -> Option<(String, Entry)> {
        let mut individual = line.remove("individual")?;
        let mut entry = Entry::default();
        let sheet = self.layout.name();
        let extracted = format!("extracted the {}", self.ctx.today.format("%Y-%m-%d"));

        let mut data = line.remove("individual_data").unwrap_or_default();

        if let Some(species) = line.get_mut("species") {
            species_from_cells(species);
        }
        if line.get("species").and_then(|s| s.get("name")).map_or(false, |n| n.chars().count() < 3) {
            line.remove("species");
        }

        if let Some(location) = line.get_mut("location") {
            if let Some(source) = location.get("source_location").cloned() {
                let (place, note) = normalize::split_previous_label(&source);
                if let Some(note) = note {
                    location.insert(String::from("source_location"), place);
                    data.insert(String::from("value"), note);
                }
            }
        }

        if let Some(mut image) = line.remove("image") {
            if let Some(path) = image.remove("name") {
                let (filepath, filename) = match path.rfind('/') {
                    Some(pos) => (path[..pos].to_string(), path[pos + 1..].to_string()),
                    None => (String::new(), path.clone()),
                };
                let record = entry.record_mut(Table::Image);
                record.set("filename", filename);
                record.set("filepath", filepath);
                record.set("comment", "from https://cambridgecichlids.org");
                match self.ctx.provider_id(IMAGE_PROVIDER) {
                    Some(id) => record.set("provider_id", id),
                    None => warn!("Provider {} not found, image {} has no provider", IMAGE_PROVIDER, path),
                }
            }
        }

        let raw_name = match individual.remove("name") {
            Some(n) => n,
            None => {
                self.temp_names += 1;
                format!("temp_name{}", self.temp_names)
            }
        };
        let mut name = raw_name.clone();
        if raw_name.contains('.') {
            let (stripped, part) = normalize::split_organism_part(&raw_name, &self.ctx.ontology);
            name = stripped;
            if let Some(part) = part {
                entry.record_mut(Table::OrganismPart).set("name", part);
            }
        }

        if let Some(sex) = individual.remove("sex") {
            match normalize::parse_sex(&sex) {
                Sex::Known(s) => {
                    individual.insert(String::from("sex"), s);
                }
                Sex::Juvenile => entry.record_mut(Table::DevelopmentalStage).set("name", "juvenile"),
                Sex::Misfiled(s) => {
                    data.insert(String::from("value2"), s);
                }
            }
        }

        let material = line.entry(String::from("material")).or_default();
        material.entry(String::from("name")).or_insert_with(|| raw_name.clone());

        if let Some(alias2) = individual.remove("alias2") {
            if !individual.contains_key("alias") {
                individual.insert(String::from("alias"), alias2);
            } else if material.get("name") == Some(&name) {
                material.insert(String::from("name"), alias2);
            } else {
                debug!("{}: dropping second alias {}", name, alias2);
            }
        }

        if let Some(alias2) = line.get_mut("project").and_then(|p| p.remove("alias2")) {
            if alias2.contains("milan") {
                if let Some(id) = self.ctx.provider_id(MALINSKY_PROVIDER) {
                    individual.insert(String::from("provider_id"), id.to_string());
                }
            }
        }

        if let Some(raw) = individual.remove("date_collected") {
            match normalize::collection_date(&raw) {
                Some(d) => entry.record_mut(Table::Individual).set("date_collected", d),
                None => warn!("{}: cannot read collection date {:?}, ignoring it", name, raw),
            }
        }

        individual.insert(String::from("name"), name.clone());
        line.insert(String::from("individual"), individual);
        fill_tables(&mut entry, line);

        if let Some(species) = entry.tables.get_mut(&Table::Species) {
            enrich_species(species, self.ctx.taxonomy);
        }

        if let Some(value) = data.remove("value") {
            entry.measurements.push(Measurement::new("morphology", &value));
        }
        if let Some(value) = data.remove("value2") {
            let mut m = Measurement::new(&format!("Wrongly set as \"sex\" from \"{}\" Cichlid spreadsheet", sheet), &value);
            m.comment = Some(extracted.clone());
            entry.measurements.push(m);
        }
        if let Some(value) = data.remove("value4") {
            let mut m = Measurement::new(&format!("Weight obtained from {} Cichlid spreadsheet", sheet), &value);
            m.comment = Some(extracted);
            m.unit = Some(String::from("g"));
            entry.measurements.push(m);
        }
        for (slot, value) in data {
            debug!("{}: no cv term for {} ({}), ignoring it", name, slot, value);
        }

        Some((name, entry))
    }

    fn template_line(&mut self, mut line: Cells) -> Option<(String, Entry)> {
        let name = line.get("individual")?.get("name")?.clone();
        let mut entry = Entry::default();

        entry.option = line
            .remove("record")
            .and_then(|r| r.get("option").and_then(|o| RecordOption::parse(o)));

        if let Some(ann) = line.remove("Annotations") {
            match (ann.get("category"), ann.get("value")) {
                (Some(category), Some(value)) => {
                    entry.annotation = Some(Annotation {
                        category: category.clone(),
                        value: value.clone(),
                    })
                }
                _ => warn!("{}: annotation without category or value, ignoring it", name),
            }
        }

        let cv = line.remove("cv");
        let data = line.remove("individual_data");
        match (cv.as_ref().and_then(|c| c.get("attribute")), data) {
            (Some(attribute), Some(mut data)) => match data.remove("value") {
                Some(value) => entry.measurements.push(Measurement {
                    attribute: attribute.clone(),
                    comment: Some(String::from("entry extracted from input spreadsheet")),
                    value,
                    unit: data.remove("unit"),
                    note: data.remove("comment"),
                }),
                None => warn!("{}: {} has no value, ignoring it", name, attribute),
            },
            (None, Some(_)) => warn!("{}: individual data without cv attribute, ignoring it", name),
            _ => {}
        }

        if let Some(species) = line.get_mut("species") {
            species_from_cells(species);
        }
        if line
            .get("species")
            .and_then(|s| s.get("name"))
            .map_or(false, |n| n.chars().count() < 4)
        {
            line.remove("species");
        }

        if let Some(file) = line.get_mut("file") {
            if file.contains_key("type") {
                file.insert(String::from("type"), String::from("PE"));
            }
        }

        let material = line.entry(String::from("material")).or_default();
        material.entry(String::from("name")).or_insert_with(|| name.clone());

        fill_tables(&mut entry, line);

        for (table, field) in [(Table::Individual, "date_collected"), (Table::Material, "date_received")].iter() {
            if let Some(record) = entry.tables.get_mut(table) {
                if let Some(raw) = record.text(field).map(str::to_string) {
                    record.set(field, normalize::template_date(&raw));
                }
            }
        }
        if let Some(species) = entry.tables.get_mut(&Table::Species) {
            enrich_species(species, self.ctx.taxonomy);
        }

        Some((name, entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Record, Value};
    use crate::taxonomy::stub::StubTaxonomy;
    use chrono::NaiveDate;

    fn first<'b>(batch: &'b Batch, individual: &str, table: Table) -> Option<&'b Record> {
        batch.entries(individual)?.first()?.record(table)
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2019, 8, 1).unwrap()
    }

    fn line(n: usize, cells: &[(usize, &str)]) -> Vec<String> {
        let mut row = vec![String::new(); n];
        for (i, c) in cells {
            row[*i] = c.to_string();
        }
        row
    }

    #[test]
    fn selectors_resolve_to_locations() -> Result<()> {
        let base = "https://docs.google.com/spreadsheets/d/e/X/";
        let data = Path::new("/data");
        let s = Spreadsheet::resolve("sequenced", base, data, None)?;
        assert_eq!(s.location, Location::Url(format!("{}pub?gid=911220955", base)));
        assert_eq!(s.layout, Layout::SequencedMaster);
        let s = Spreadsheet::resolve("images", base, data, None)?;
        assert_eq!(s.location, Location::File(PathBuf::from("/data/2016_Sanger_Malawi_cichlid_sampling_trip.tsv")));
        assert_eq!(s.layout, Layout::CichlidOrg);
        assert_eq!(Spreadsheet::resolve("/tmp/fish.txt", base, data, Some(Layout::Mlw))?.layout, Layout::Mlw);
        assert!(Spreadsheet::resolve("/tmp/fish.txt", base, data, None).is_err());
        assert_eq!("input".parse::<Layout>()?, Layout::InputTemplate);
        Ok(())
    }

    #[test]
    fn published_sheets_are_fetched_as_tsv() -> Result<()> {
        let url = tsv_url("https://docs.google.com/spreadsheets/d/e/X/pub?gid=911220955")?;
        assert_eq!(url.as_str(), "https://docs.google.com/spreadsheets/d/e/X/pub?gid=911220955&output=tsv");
        let url = tsv_url("https://docs.google.com/spreadsheets/d/e/X/pub")?;
        assert_eq!(url.query(), Some("output=tsv"));
        assert!(matches!(tsv_url("not a url"), Err(Error::InvalidUrl(_))));
        Ok(())
    }

    #[test]
    fn tsv_keeps_quotes_and_ragged_lines() -> Result<()> {
        let rows = parse_tsv("a\tb\tc\nAulonocara \"gold\"\tx\n")?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec!["Aulonocara \"gold\"", "x"]);
        Ok(())
    }

    #[test]
    fn image_list_lines() {
        let tax = StubTaxonomy::default();
        let ctx = Context::new(today(), &tax).with_provider(IMAGE_PROVIDER, 3);
        let rows = vec![
            line(2, &[(0, "header"), (1, "header")]),
            line(3, &[(0, "D23-D10"), (1, "2016/Chilumba/D23-D10.jpg"), (2, "ignored")]),
        ];
        let batch = SheetParser::new(Layout::CichlidOrg, &ctx).parse(&rows);
        let image = first(&batch, "D23-D10", Table::Image).unwrap();
        assert_eq!(image.text("filename"), Some("D23-D10.jpg"));
        assert_eq!(image.text("filepath"), Some("2016/Chilumba"));
        assert_eq!(image.text("comment"), Some("from https://cambridgecichlids.org"));
        assert_eq!(image.get("provider_id"), Some(&Value::Int(3)));
        assert_eq!(first(&batch, "D23-D10", Table::Material).unwrap().text("name"), Some("D23-D10"));
    }

    #[test]
    fn sample_master_lines() {
        let tax = StubTaxonomy::default().with("Labeotropheus fuelleborni", "blue mbuna", "species", 32508);
        let ctx = Context::new(today(), &tax).with_provider(MALINSKY_PROVIDER, 8);
        let rows = vec![
            line(25, &[(0, "header")]),
            line(25, &[
                (0, "D23-D10"),
                (4, "orange blotch"),
                (5, "F"),
                (7, "Nkhata Bay"),
                (10, "12/03/2017"),
                (14, "8.4"),
                (15, "mbuna"),
                (20, "Labeotropheus cf. fuelleborni"),
                (21, "dropped"),
                (23, "milan_2017"),
                (24, "LabFue1"),
            ]),
            line(25, &[(7, "Monkey Bay"), (20, "Aulonocara")]),
        ];
        let batch = SheetParser::new(Layout::SampleMaster, &ctx).parse(&rows);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.source, "Sample_master");

        let entry = &batch.entries("D23-D10").unwrap()[0];
        let ind = entry.record(Table::Individual).unwrap();
        assert_eq!(ind.text("sex"), Some("F"));
        assert_eq!(ind.text("alias"), Some("LabFue1"));
        assert_eq!(ind.text("provider_id"), Some("8"));
        assert_eq!(ind.get("date_collected"), Some(&Value::Date(NaiveDate::from_ymd_opt(2017, 3, 12).unwrap())));
        assert_eq!(entry.record(Table::Location).unwrap().text("source_location"), Some("Nkhata Bay"));
        assert_eq!(entry.record(Table::Material).unwrap().text("name"), Some("D23-D10"));
        let species = entry.record(Table::Species).unwrap();
        assert_eq!(species.text("name"), Some("Labeotropheus fuelleborni"));
        assert_eq!(species.text("common_name"), Some("blue mbuna"));
        assert!(entry.record(Table::Project).is_none());

        let measured: Vec<(&str, &str)> = entry
            .measurements
            .iter()
            .map(|m| (m.attribute.as_str(), m.value.as_str()))
            .collect();
        assert_eq!(
            measured,
            vec![
                ("morphology", "orange blotch"),
                ("Weight obtained from Sample_master Cichlid spreadsheet", "8.4"),
            ]
        );
    }

    #[test]
    fn sequenced_master_lines() {
        let tax = StubTaxonomy::default().with("Cyrtocara moorii", "blue dolphin", "species", 94965);
        let ctx = Context::new(today(), &tax)
            .with_provider(MALINSKY_PROVIDER, 8)
            .with_ontology(&["fin"]);
        let rows = vec![
            line(30, &[(0, "header")]),
            line(30, &[
                (0, "cichlid1234"),
                (1, "D02-C04.fin1"),
                (3, "Cyrtocara moorii"),
                (5, "Chilumba; previously labelled Chiweta"),
                (6, "26.03.16"),
                (17, "blue morph"),
                (23, "milan_201706"),
                (24, "J"),
                (25, "G10J04"),
                (29, "12.5"),
            ]),
            line(30, &[(3, "?"), (24, "yellow"), (6, "whenever")]),
        ];
        let batch = SheetParser::new(Layout::SequencedMaster, &ctx).parse(&rows);
        assert_eq!(batch.len(), 2);

        let entry = &batch.entries("D02-C04").unwrap()[0];
        let ind = entry.record(Table::Individual).unwrap();
        assert_eq!(ind.text("alias"), Some("G10J04"));
        assert_eq!(ind.get("provider_id"), Some(&Value::from("8")));
        assert_eq!(ind.get("date_collected"), Some(&Value::Date(NaiveDate::from_ymd_opt(2016, 3, 26).unwrap())));
        assert!(!ind.contains("sex"));
        assert_eq!(entry.record(Table::Material).unwrap().text("name"), Some("D02-C04.fin1"));
        assert_eq!(entry.record(Table::OrganismPart).unwrap().text("name"), Some("fin"));
        assert_eq!(entry.record(Table::DevelopmentalStage).unwrap().text("name"), Some("juvenile"));
        assert_eq!(entry.record(Table::Location).unwrap().text("source_location"), Some("Chilumba"));
        assert_eq!(entry.record(Table::Species).unwrap().text("common_name"), Some("blue dolphin"));
        assert!(entry.record(Table::Project).is_none());

        let attributes: Vec<&str> = entry.measurements.iter().map(|m| m.attribute.as_str()).collect();
        assert_eq!(attributes, vec!["morphology", "Weight obtained from Sequenced_master Cichlid spreadsheet"]);
        assert_eq!(entry.measurements[0].value, "previously labelled Chiweta");
        assert_eq!(entry.measurements[1].unit.as_deref(), Some("g"));
        assert_eq!(entry.measurements[1].comment.as_deref(), Some("extracted the 2019-08-01"));

        let temp = &batch.entries("temp_name1").unwrap()[0];
        assert!(temp.record(Table::Species).is_none());
        assert!(!temp.record(Table::Individual).unwrap().contains("date_collected"));
        assert_eq!(temp.measurements[0].attribute, "Wrongly set as \"sex\" from \"Sequenced_master\" Cichlid spreadsheet");
        assert_eq!(temp.measurements[0].value, "yellow");
    }

    #[test]
    fn mlw_taxon_ids_that_are_names() {
        let tax = StubTaxonomy::default();
        let ctx = Context::new(today(), &tax);
        let rows = vec![
            line(13, &[(0, "header")]),
            line(13, &[(0, "cichlid7"), (2, "4711"), (8, "S1"), (11, "mbuna"), (10, "Male")]),
        ];
        let batch = SheetParser::new(Layout::Mlw, &ctx).parse(&rows);
        let entry = &batch.entries("cichlid7").unwrap()[0];
        assert_eq!(entry.record(Table::Species).unwrap().text("common_name"), Some("mbuna"));
        assert_eq!(entry.record(Table::Project).unwrap().text("ssid"), Some("4711"));
        assert_eq!(entry.record(Table::Sample).unwrap().text("name"), Some("S1"));
        assert_eq!(entry.record(Table::Individual).unwrap().text("sex"), Some("Male"));
    }

    #[test]
    fn input_template_lines() {
        let tax = StubTaxonomy::default();
        let ctx = Context::new(today(), &tax);
        let rows = vec![
            line(51, &[(0, "header")]),
            line(51, &[(0, "explanations")]),
            line(51, &[
                (0, "CAMBRIDGE-1"),
                (1, "update"),
                (3, "Tropheops"),
                (10, "05/11/2018"),
                (12, "images/2018"),
                (21, "NULL"),
                (26, "Nov 2018"),
                (30, "standard length"),
                (31, "10.2"),
                (32, "cm"),
                (44, "paired"),
                (49, "fin clip in ethanol"),
                (50, "lab_note"),
            ]),
            line(51, &[(3, "Aulonocara")]),
        ];
        let batch = SheetParser::new(Layout::InputTemplate, &ctx).parse(&rows);
        assert_eq!(batch.len(), 1);
        let entry = &batch.entries("CAMBRIDGE-1").unwrap()[0];
        assert_eq!(entry.option, Some(RecordOption::Update));
        assert_eq!(
            entry.record(Table::Individual).unwrap().get("date_collected"),
            Some(&Value::Date(NaiveDate::from_ymd_opt(2018, 11, 5).unwrap()))
        );
        assert_eq!(entry.record(Table::Material).unwrap().text("date_received"), Some("Nov 2018"));
        assert_eq!(entry.record(Table::Material).unwrap().text("name"), Some("CAMBRIDGE-1"));
        assert_eq!(entry.record(Table::Image).unwrap().text("filepath"), Some("images/2018"));
        assert_eq!(entry.record(Table::File).unwrap().text("type"), Some("PE"));
        assert!(entry.record(Table::Location).is_none());
        assert!(entry.record(Table::Species).is_some());
        assert_eq!(
            entry.measurements,
            vec![Measurement {
                attribute: "standard length".into(),
                comment: Some("entry extracted from input spreadsheet".into()),
                value: "10.2".into(),
                unit: Some("cm".into()),
                note: None,
            }]
        );
        assert_eq!(
            entry.annotation,
            Some(Annotation { category: "lab_note".into(), value: "fin clip in ethanol".into() })
        );
    }
}
