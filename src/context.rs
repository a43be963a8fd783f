//! Reference data the parsers need from the database before reading a source.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::error::Result;
use crate::store::{Filter, Store};
use crate::tables::Table;
use crate::taxonomy::Taxonomy;

/// Providers the legacy sheets refer to implicitly.
pub const IMAGE_PROVIDER: &str = "Hannes Svardal";
pub const MALINSKY_PROVIDER: &str = "Milan Malinsky";

pub struct Context<'t> {
    pub today: NaiveDate,
    /// `ontology.name` of every term, for organism part extraction
    pub ontology: Vec<String>,
    providers: HashMap<String, i64>,
    pub taxonomy: &'t dyn Taxonomy,
}

impl<'t> Context<'t> {
    pub fn new(today: NaiveDate, taxonomy: &'t dyn Taxonomy) -> Self {
        Context {
            today,
            ontology: Vec::new(),
            providers: HashMap::new(),
            taxonomy,
        }
    }

    pub fn load<S: Store + ?Sized>(store: &mut S, today: NaiveDate, taxonomy: &'t dyn Taxonomy) -> Result<Self> {
        let mut ctx = Context::new(today, taxonomy);
        ctx.ontology = store.column_values(Table::Ontology, "name")?;
        for name in [IMAGE_PROVIDER, MALINSKY_PROVIDER].iter() {
            let filter = Filter::new().eq("provider_name", *name).latest();
            match store.find(Table::Provider, &filter)?.first().and_then(|r| r.id("provider_id")) {
                Some(id) => {
                    ctx.providers.insert(name.to_string(), id);
                }
                None => debug!("Provider {} is not in the database", name),
            }
        }
        debug!("{} ontology terms, {} known providers", ctx.ontology.len(), ctx.providers.len());
        Ok(ctx)
    }

    #[cfg(test)]
    pub fn with_provider(mut self, name: &str, id: i64) -> Self {
        self.providers.insert(name.to_string(), id);
        self
    }

    #[cfg(test)]
    pub fn with_ontology(mut self, names: &[&str]) -> Self {
        self.ontology = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn provider_id(&self, name: &str) -> Option<i64> {
        self.providers.get(name).copied()
    }
}
