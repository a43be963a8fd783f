//! Clean-up rules for the free-form cells of the spreadsheets and exports.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;

use crate::models::Value;

// Full names first, so that "june" is not turned into "06e".
const MONTHS: [(&str, &str); 23] = [
    ("january", "01"),
    ("february", "02"),
    ("march", "03"),
    ("april", "04"),
    ("june", "06"),
    ("july", "07"),
    ("august", "08"),
    ("september", "09"),
    ("october", "10"),
    ("november", "11"),
    ("december", "12"),
    ("jan", "01"),
    ("feb", "02"),
    ("mar", "03"),
    ("apr", "04"),
    ("may", "05"),
    ("jun", "06"),
    ("jul", "07"),
    ("aug", "08"),
    ("sep", "09"),
    ("oct", "10"),
    ("nov", "11"),
    ("dec", "12"),
];

fn ymd(y: &str, m: &str, d: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
}

fn century(yy: &str) -> String {
    if yy.len() == 2 {
        format!("20{}", yy)
    } else {
        yy.to_string()
    }
}

/// Parses the collection dates of the legacy sheets.
///
/// Only the first token counts (the rest is usually a time). Month names
/// become numbers, then `DD.MM.YY`, `DD/MM/YYYY`, `MM/DD/YY`, `YYYY-MM-DD`
/// and `DD-MM-YYYY` are recognised.
pub fn collection_date(raw: &str) -> Option<NaiveDate> {
    lazy_static! {
        static ref RE_DOTTED: Regex = Regex::new(r"^(\d{1,2})\.(\d{1,2})\.(\d{2}|\d{4})$").unwrap();
        static ref RE_SLASHED: Regex = Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{2}|\d{4})$").unwrap();
        static ref RE_ISO: Regex = Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})$").unwrap();
        static ref RE_DASHED: Regex = Regex::new(r"^(\d{1,2})-(\d{1,2})-(\d{4})$").unwrap();
    }

    let mut token = raw.trim().to_lowercase().split_whitespace().next()?.to_string();
    for (name, number) in MONTHS.iter() {
        token = token.replace(name, number);
    }

    if let Some(c) = RE_DOTTED.captures(&token) {
        return ymd(&century(&c[3]), &c[2], &c[1]);
    }
    if let Some(c) = RE_SLASHED.captures(&token) {
        // four-digit years come from the sample sheet (day first), two-digit
        // ones from the sequencing sheet (month first)
        return if c[3].len() == 4 {
            ymd(&c[3], &c[2], &c[1])
        } else {
            ymd(&century(&c[3]), &c[1], &c[2])
        };
    }
    if let Some(c) = RE_ISO.captures(&token) {
        return ymd(&c[1], &c[2], &c[3]);
    }
    if let Some(c) = RE_DASHED.captures(&token) {
        return ymd(&c[3], &c[2], &c[1]);
    }
    None
}

/// Input-template dates are `DD/MM/YYYY`; anything else is kept as typed.
pub fn template_date(raw: &str) -> Value {
    lazy_static! {
        static ref RE_DATE: Regex = Regex::new(r"^(\d{2})/(\d{2})/(\d{4})$").unwrap();
    }
    let raw = raw.trim();
    RE_DATE
        .captures(raw)
        .and_then(|c| ymd(&c[3], &c[2], &c[1]))
        .map(Value::Date)
        .unwrap_or_else(|| Value::from(raw))
}

/// Splits an individual name such as `D23-D10.fin2` into the individual
/// (`D23-D10`) and the organism part (`fin`).
///
/// The part is returned only when it, or its plural, is one of the
/// `ontology` names; otherwise the whole name stays the individual's.
pub fn split_organism_part(original: &str, ontology: &[String]) -> (String, Option<String>) {
    let name: String = original.chars().filter(|c| *c != ' ').collect();
    let mut kept = name.clone();
    let mut stripped = name.clone();
    let mut part = String::new();

    if let Some(pos) = name.find("gDNA") {
        stripped = name[..pos].to_string();
        part = String::from("DNA");
    }
    if name.contains('.') {
        let mut pieces = name.split('.');
        stripped = pieces.next().unwrap_or_default().to_string();
        part = pieces
            .next()
            .unwrap_or_default()
            .trim_end_matches('?')
            .trim_end_matches(|c: char| c.is_ascii_digit())
            .to_string();
        part = match part.to_lowercase().as_str() {
            "wholeblood" => String::from("blood"),
            "middle" | "rest" => String::from("body"),
            "plugs" => String::from("dna"),
            "ova" => String::from("ovary"),
            "fry" => {
                kept = stripped.clone();
                part
            }
            _ => part,
        };
    }

    let part = part.to_lowercase();
    let plural = format!("{}s", part);
    let known = !part.is_empty()
        && ontology
            .iter()
            .any(|o| o.eq_ignore_ascii_case(&part) || o.eq_ignore_ascii_case(&plural));
    if known {
        (stripped, Some(part))
    } else {
        (kept, None)
    }
}

/// What a `sex` cell of the legacy sheets actually holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sex {
    Known(String),
    /// `J` marks juveniles
    Juvenile,
    /// Anything else was typed into the wrong column
    Misfiled(String),
}

pub fn parse_sex(raw: &str) -> Sex {
    let raw = raw.trim();
    let lower = raw.to_lowercase();
    if lower.contains("male") || lower == "m" || lower == "f" {
        Sex::Known(raw.to_string())
    } else if raw == "J" {
        Sex::Juvenile
    } else {
        Sex::Misfiled(raw.to_string())
    }
}

/// Removes the open-nomenclature qualifiers (`sp.`, `cf.`) from a species name.
pub fn clean_species_name(raw: &str) -> String {
    lazy_static! {
        static ref RE_SPACES: Regex = Regex::new(r"\s\s+").unwrap();
    }
    let name = raw.replace("sp.", "").replace("c.f.", "").replace("cf.", "");
    RE_SPACES.replace_all(&name, " ").trim().to_string()
}

/// `"Chilumba; previously labelled Chiweta"` is a location plus a morphology note.
pub fn split_previous_label(source_location: &str) -> (String, Option<String>) {
    let mut parts = source_location.splitn(2, ';');
    let location = parts.next().unwrap_or_default();
    match parts.next() {
        Some(note) if note.contains("previously labelled") => {
            (location.trim().to_string(), Some(note.trim().to_string()))
        }
        _ => (source_location.to_string(), None),
    }
}
