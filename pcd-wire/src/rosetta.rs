//! Rosetta terminology tables: raw terms, harmonized terms and units.
//!
//! All derived lookups are computed while loading, so a `Rosetta` is immutable
//! and can be shared between threads without locking.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use pcd_core::{PcdError, PcdResult};
use tracing::debug;

use crate::xml::Element;

pub const TERMS_FILE: &str = "rosetta_terms.xml";
pub const HARMONIZED_FILE: &str = "rosetta_harmonized.xml";
pub const UNITS_FILE: &str = "rosetta_units.xml";

/// Canonical unit reported for unknown or unmapped unit codes.
pub const UNIT_NOT_AVAILABLE: &str = "n/a";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct HarmonizedTerm {
    description: String,
    ucum_unit: String,
    /// Empty when the term has no synonym in either direction.
    synonym: String,
}

#[derive(Debug, Clone)]
pub struct Rosetta {
    raw_terms: HashSet<String>,
    harmonized: HashMap<String, HarmonizedTerm>,
    units: HashMap<String, String>,
}

impl Rosetta {
    /// Build the tables from the XML text of the three sources.
    /// Any malformed source fails the whole load.
    pub fn load(raw_terms: &str, harmonized_terms: &str, units: &str) -> PcdResult<Self> {
        let raw_doc = parse_table(TERMS_FILE, raw_terms, "Rosetta")?;
        let harmonized_doc = parse_table(HARMONIZED_FILE, harmonized_terms, "HRTM")?;
        let units_doc = parse_table(UNITS_FILE, units, "RTM")?;

        let rosetta = Self {
            raw_terms: load_raw_terms(&raw_doc),
            harmonized: load_harmonized(&harmonized_doc),
            units: load_units(&units_doc),
        };

        debug!(
            raw_terms = rosetta.raw_terms.len(),
            harmonized_terms = rosetta.harmonized.len(),
            units = rosetta.units.len(),
            "loaded rosetta tables"
        );

        Ok(rosetta)
    }

    /// Load `rosetta_terms.xml`, `rosetta_harmonized.xml` and `rosetta_units.xml` from `dir`.
    pub fn load_dir(dir: &Path) -> PcdResult<Self> {
        let read = |name: &str| {
            let path = dir.join(name);
            std::fs::read_to_string(&path).map_err(|err| {
                PcdError::RosettaInitialization(format!("{}: {err}", path.display()))
            })
        };

        Self::load(&read(TERMS_FILE)?, &read(HARMONIZED_FILE)?, &read(UNITS_FILE)?)
    }

    pub fn is_harmonized(&self, refid: &str) -> bool {
        self.harmonized.contains_key(refid)
    }

    pub fn is_raw_term(&self, refid: &str) -> bool {
        self.raw_terms.contains(refid)
    }

    /// Harmonized description, or `""` when the refid is not harmonized.
    pub fn description(&self, refid: &str) -> &str {
        self.harmonized
            .get(refid)
            .map(|term| term.description.as_str())
            .unwrap_or_default()
    }

    /// Harmonized UCUM unit, or `""` when the refid is not harmonized.
    pub fn ucum_unit(&self, refid: &str) -> &str {
        self.harmonized
            .get(refid)
            .map(|term| term.ucum_unit.as_str())
            .unwrap_or_default()
    }

    /// Synonym of a harmonized term, looking both ways.
    ///
    /// `None` means the refid is not in the harmonized table; `Some("")` means it is,
    /// but no synonym exists.
    pub fn synonym(&self, refid: &str) -> Option<&str> {
        self.harmonized
            .get(refid)
            .map(|term| term.synonym.as_str())
    }

    /// UCUM unit for an MDC unit code, `"n/a"` when unknown or unmapped.
    pub fn canonical_unit(&self, mdc_unit: &str) -> &str {
        self.units
            .get(mdc_unit)
            .map(String::as_str)
            .unwrap_or(UNIT_NOT_AVAILABLE)
    }
}

fn parse_table(source: &str, xml: &str, root_name: &str) -> PcdResult<Element> {
    let root = Element::parse(xml)
        .map_err(|err| PcdError::RosettaInitialization(format!("{source}: {err}")))?;

    if root.name != root_name {
        return Err(PcdError::RosettaInitialization(format!(
            "{source}: expected root element {root_name}, found {}",
            root.name
        )));
    }

    Ok(root)
}

fn terms<'a>(table: &'a Element) -> impl Iterator<Item = &'a Element> {
    table.children.iter().filter(|child| child.name == "term")
}

fn child_texts<'a>(term: &'a Element, name: &'a str) -> impl Iterator<Item = &'a str> {
    term.children
        .iter()
        .filter(move |child| child.name == name)
        .map(|child| child.text.as_str())
}

fn first_child_text<'a>(term: &'a Element, name: &'a str) -> Option<&'a str> {
    child_texts(term, name).next()
}

fn load_raw_terms(root: &Element) -> HashSet<String> {
    terms(root)
        .flat_map(|term| child_texts(term, "REFID"))
        .map(str::to_string)
        .collect()
}

fn load_harmonized(root: &Element) -> HashMap<String, HarmonizedTerm> {
    let mut harmonized: HashMap<String, HarmonizedTerm> = HashMap::new();
    let mut listed_as_synonym: HashMap<String, String> = HashMap::new();

    for table in root.children.iter().filter(|child| child.name == "HRosetta") {
        for term in terms(table) {
            let description = first_child_text(term, "Vendor_Description").unwrap_or_default();
            let ucum_unit = first_child_text(term, "UOM_UCUM").unwrap_or_default();
            let synonym = first_child_text(term, "Synonym").unwrap_or_default();

            if !synonym.is_empty() {
                if let Some(refid) = first_child_text(term, "REFID") {
                    listed_as_synonym
                        .entry(synonym.to_string())
                        .or_insert_with(|| refid.to_string());
                }
            }

            for refid in child_texts(term, "REFID") {
                harmonized
                    .entry(refid.to_string())
                    .or_insert_with(|| HarmonizedTerm {
                        description: description.to_string(),
                        ucum_unit: ucum_unit.to_string(),
                        synonym: synonym.to_string(),
                    });
            }
        }
    }

    for (refid, term) in harmonized.iter_mut() {
        if term.synonym.is_empty() {
            if let Some(other) = listed_as_synonym.get(refid) {
                term.synonym = other.clone();
            }
        }
    }

    harmonized
}

fn load_units(root: &Element) -> HashMap<String, String> {
    let mut units = HashMap::new();

    for table in root.children.iter().filter(|child| child.name == "Units") {
        for term in terms(table) {
            let ucum = first_child_text(term, "UOM_UCUM").unwrap_or(UNIT_NOT_AVAILABLE);
            for mdc in child_texts(term, "UOM_MDC") {
                units
                    .entry(mdc.to_string())
                    .or_insert_with(|| ucum.to_string());
            }
        }
    }

    units
}
