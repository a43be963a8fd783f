//! The tables of the tracking schema and how the importer treats each of them.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    Species,
    Location,
    Project,
    Provider,
    LibraryType,
    SeqTech,
    SeqCentre,
    Ontology,
    DevelopmentalStage,
    OrganismPart,
    Individual,
    Image,
    Material,
    Sample,
    Library,
    Lane,
    File,
    Cv,
    IndividualData,
    Allocation,
    Annotations,
}

/// Order in which the tables of an entry are written: every table after its parents.
pub const PROCESSING_ORDER: [Table; 16] = [
    Table::Species,
    Table::Location,
    Table::Project,
    Table::Provider,
    Table::LibraryType,
    Table::SeqTech,
    Table::SeqCentre,
    Table::DevelopmentalStage,
    Table::OrganismPart,
    Table::Individual,
    Table::Image,
    Table::Material,
    Table::Sample,
    Table::Library,
    Table::Lane,
    Table::File,
];

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Species => "species",
            Table::Location => "location",
            Table::Project => "project",
            Table::Provider => "provider",
            Table::LibraryType => "library_type",
            Table::SeqTech => "seq_tech",
            Table::SeqCentre => "seq_centre",
            Table::Ontology => "ontology",
            Table::DevelopmentalStage => "developmental_stage",
            Table::OrganismPart => "organism_part",
            Table::Individual => "individual",
            Table::Image => "image",
            Table::Material => "material",
            Table::Sample => "sample",
            Table::Library => "library",
            Table::Lane => "lane",
            Table::File => "file",
            Table::Cv => "cv",
            Table::IndividualData => "individual_data",
            Table::Allocation => "allocation",
            Table::Annotations => "annotations",
        }
    }

    /// Versioned tables carry `changed` and `latest`; an update retires the
    /// current row instead of editing it.
    pub fn is_versioned(self) -> bool {
        !matches!(
            self,
            Table::Project
                | Table::DevelopmentalStage
                | Table::OrganismPart
                | Table::Location
                | Table::Cv
                | Table::SeqCentre
                | Table::LibraryType
                | Table::SeqTech
                | Table::Ontology
                | Table::Allocation
                | Table::Annotations
        )
    }

    /// Whether rows are numbered by a `<table>_id` column the importer assigns.
    pub fn owns_id(self) -> bool {
        !matches!(
            self,
            Table::IndividualData | Table::Allocation | Table::Annotations
        )
    }

    /// Name of the `<table>_id` column.
    pub fn id_column(self) -> String {
        format!("{}_id", self.name())
    }

    pub fn parents(self) -> &'static [Table] {
        match self {
            Table::DevelopmentalStage | Table::OrganismPart => &[Table::Ontology],
            Table::Individual => &[
                Table::Species,
                Table::Location,
                Table::Provider,
                Table::DevelopmentalStage,
            ],
            Table::Image => &[Table::Individual],
            Table::Material => &[
                Table::Individual,
                Table::OrganismPart,
                Table::Provider,
                Table::DevelopmentalStage,
            ],
            Table::Sample => &[Table::Material],
            Table::Library => &[Table::LibraryType],
            Table::Lane => &[
                Table::SeqTech,
                Table::Sample,
                Table::Library,
                Table::SeqCentre,
            ],
            Table::File => &[Table::Lane],
            Table::IndividualData => &[Table::Individual, Table::Cv],
            _ => &[],
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Table {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = match s {
            "species" => Table::Species,
            "location" => Table::Location,
            "project" => Table::Project,
            "provider" => Table::Provider,
            "library_type" => Table::LibraryType,
            "seq_tech" => Table::SeqTech,
            "seq_centre" => Table::SeqCentre,
            "ontology" => Table::Ontology,
            "developmental_stage" => Table::DevelopmentalStage,
            "organism_part" => Table::OrganismPart,
            "individual" => Table::Individual,
            "image" => Table::Image,
            "material" => Table::Material,
            "sample" => Table::Sample,
            "library" => Table::Library,
            "lane" => Table::Lane,
            "file" => Table::File,
            "cv" => Table::Cv,
            "individual_data" => Table::IndividualData,
            "allocation" => Table::Allocation,
            "annotations" => Table::Annotations,
            other => return Err(Error::InvalidInput(format!("unknown table {}", other))),
        };
        Ok(t)
    }
}

/// Which field identifies a row of a table depends on where the data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierScheme {
    /// iRODS JSON exports: studies and samples are known by their sequencing-system id
    Irods,
    /// The master spreadsheets, the mlw dump and the image list
    LegacySheet,
    /// The curated input template
    Template,
}

impl IdentifierScheme {
    pub fn identifier(self, table: Table) -> &'static str {
        match (self, table) {
            (IdentifierScheme::Irods, Table::Project) | (IdentifierScheme::Irods, Table::Sample) => "ssid",
            (IdentifierScheme::LegacySheet, Table::Location) => "source_location",
            (_, Table::Location) => "location",
            (_, Table::Provider) => "provider_name",
            (_, Table::Image) => "filename",
            (_, Table::Cv) => "attribute",
            (_, Table::Library) => "ssid",
            (_, Table::Lane) => "accession",
            _ => "name",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parents_come_first() {
        for (pos, table) in PROCESSING_ORDER.iter().enumerate() {
            for parent in table.parents() {
                if let Some(ppos) = PROCESSING_ORDER.iter().position(|t| t == parent) {
                    assert!(ppos < pos, "{} must come before {}", parent, table);
                }
            }
        }
    }

    #[test]
    fn names_round_trip_through_from_str() {
        for t in PROCESSING_ORDER.iter() {
            assert_eq!(t.name().parse::<Table>().unwrap(), *t);
        }
        assert!("Annotations".parse::<Table>().is_err());
    }

    #[test]
    fn identifiers_depend_on_the_source() {
        assert_eq!(IdentifierScheme::Irods.identifier(Table::Sample), "ssid");
        assert_eq!(IdentifierScheme::Template.identifier(Table::Sample), "name");
        assert_eq!(IdentifierScheme::LegacySheet.identifier(Table::Location), "source_location");
        assert_eq!(IdentifierScheme::Template.identifier(Table::Location), "location");
        assert_eq!(IdentifierScheme::Irods.identifier(Table::Lane), "accession");
    }

    #[test]
    fn versioning_flags() {
        assert!(Table::Individual.is_versioned());
        assert!(Table::IndividualData.is_versioned());
        assert!(!Table::Project.is_versioned());
        assert!(!Table::IndividualData.owns_id());
        assert_eq!(Table::SeqTech.id_column(), "seq_tech_id");
    }
}
