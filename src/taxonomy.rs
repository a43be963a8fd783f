//! Species look-ups against the NCBI taxonomy browser.

use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Url;

use crate::error::{Error, Result};
use crate::models::Record;
use crate::normalize::clean_species_name;

const NCBI_BROWSER: &str = "https://www.ncbi.nlm.nih.gov/Taxonomy/Browser/wwwtax.cgi";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaxonInfo {
    pub scientific_name: String,
    pub common_name: String,
    pub rank: String,
    pub taxon_id: i64,
}

pub trait Taxonomy {
    /// Looks up a scientific name or a numeric taxon id. Lookup failures are
    /// not errors: the species is then imported as given.
    fn lookup(&self, query: &str) -> Option<TaxonInfo>;
}

/// Used with `--offline`: every lookup comes back empty.
pub struct Offline;

impl Taxonomy for Offline {
    fn lookup(&self, _query: &str) -> Option<TaxonInfo> {
        None
    }
}

pub struct NcbiTaxonomy {
    client: reqwest::blocking::Client,
}

impl NcbiTaxonomy {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|source| Error::Http {
                url: NCBI_BROWSER.to_string(),
                source,
            })?;
        Ok(NcbiTaxonomy { client })
    }

    fn url(query: &str) -> Result<Url> {
        let query = query.trim();
        let mut url = Url::parse(NCBI_BROWSER).map_err(|_| Error::InvalidUrl(NCBI_BROWSER.to_string()))?;
        let key = if !query.is_empty() && query.chars().all(|c| c.is_ascii_digit()) {
            "id"
        } else {
            "name"
        };
        url.query_pairs_mut().append_pair(key, query).append_pair("lvl", "0");
        Ok(url)
    }

    fn fetch(&self, url: Url) -> Result<String> {
        let http = |source| Error::Http {
            url: url.to_string(),
            source,
        };
        self.client
            .get(url.clone())
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .map_err(http)
    }
}

/// Pulls the taxon out of a taxonomy browser page. `None` if the page
/// doesn't describe a taxon.
fn parse_page(html: &str) -> Option<TaxonInfo> {
    lazy_static! {
        static ref RE_TITLE: Regex = Regex::new(r"<title>Taxonomy browser \((.*)\)</title>").unwrap();
        static ref RE_COMMON: Regex = Regex::new(r"Genbank common name: <strong>([^<]*)</strong>").unwrap();
        static ref RE_RANK: Regex = Regex::new(r"Rank: <strong>([^<]*)</strong>").unwrap();
        static ref RE_TAXID: Regex = Regex::new(r"Taxonomy ID: (\d+)").unwrap();
    }
    let scientific_name = RE_TITLE.captures(html)?[1].trim().to_string();
    if scientific_name.is_empty() {
        return None;
    }
    let capture = |re: &Regex| {
        re.captures(html)
            .map(|c| c[1].trim().to_string())
            .unwrap_or_default()
    };
    Some(TaxonInfo {
        scientific_name,
        common_name: capture(&RE_COMMON),
        rank: capture(&RE_RANK),
        taxon_id: capture(&RE_TAXID).parse().unwrap_or(0),
    })
}

impl Taxonomy for NcbiTaxonomy {
    fn lookup(&self, query: &str) -> Option<TaxonInfo> {
        let page = Self::url(query).and_then(|url| {
            debug!("Taxonomy lookup: {}", url);
            self.fetch(url)
        });
        match page {
            Ok(page) => {
                let info = parse_page(&page);
                if info.is_none() {
                    info!("No taxon found for {:?}", query);
                }
                info
            }
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }
}

/// Completes a species record from the taxonomy: by name if there is one,
/// otherwise by taxon id.
///
/// Names of two characters or fewer are placeholders and are removed.
pub fn enrich_species(species: &mut Record, taxonomy: &dyn Taxonomy) {
    if let Some(raw) = species.text("name").map(str::to_string) {
        let name = clean_species_name(&raw);
        if name.chars().count() <= 2 {
            debug!("Dropping species name {:?}", raw);
            species.remove("name");
            return;
        }
        species.set("name", name.as_str());
        if let Some(info) = taxonomy.lookup(&name) {
            if !info.common_name.is_empty() {
                species.set("common_name", info.common_name);
            }
            if !info.rank.is_empty() {
                species.set("taxon_position", info.rank);
            }
            if info.taxon_id != 0 && !species.contains("taxon_id") {
                species.set("taxon_id", info.taxon_id);
            }
        }
    } else if let Some(taxon_id) = species.get("taxon_id").filter(|v| !v.is_empty()).map(|v| v.to_string()) {
        if let Some(info) = taxonomy.lookup(&taxon_id) {
            if !info.common_name.is_empty() {
                species.set("common_name", info.common_name);
            }
            if !info.rank.is_empty() {
                species.set("taxon_position", info.rank);
            }
            species.set("name", info.scientific_name);
        }
    }
}
