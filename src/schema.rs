//! Static safety-record schema and the fused record type.
//!
//! Sixteen sections, each with a fixed ordered field list. A [`SafetyRecord`]
//! is always built from [`SCHEMA`], so every field exists from construction
//! onward and holds either a known value or [`Value::Unknown`].

use crate::error::{Result, SdsError};
use serde::{Serialize, Serializer};
use std::fmt;
use tracing::debug;

/// Text shown for unresolved fields.
pub const NOT_AVAILABLE: &str = "Not available";

/// A field value: resolved text or the unknown marker.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Value {
    Known(String),
    #[default]
    Unknown,
}

static UNKNOWN: Value = Value::Unknown;

impl Value {
    pub fn known(text: impl Into<String>) -> Self {
        Value::Known(text.into())
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Value::Known(_))
    }

    pub fn as_known(&self) -> Option<&str> {
        match self {
            Value::Known(text) => Some(text),
            Value::Unknown => None,
        }
    }

    /// Display text; `Unknown` renders as [`NOT_AVAILABLE`].
    pub fn as_str(&self) -> &str {
        self.as_known().unwrap_or(NOT_AVAILABLE)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// The sixteen SDS sections, in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKey {
    Identification,
    Composition,
    HazardIdentification,
    FirstAid,
    FireFighting,
    AccidentalRelease,
    HandlingStorage,
    ExposureControls,
    PhysicalProperties,
    StabilityReactivity,
    Toxicological,
    Ecological,
    Disposal,
    Transport,
    Regulatory,
    OtherInformation,
}

impl SectionKey {
    pub const ALL: [SectionKey; 16] = [
        SectionKey::Identification,
        SectionKey::Composition,
        SectionKey::HazardIdentification,
        SectionKey::FirstAid,
        SectionKey::FireFighting,
        SectionKey::AccidentalRelease,
        SectionKey::HandlingStorage,
        SectionKey::ExposureControls,
        SectionKey::PhysicalProperties,
        SectionKey::StabilityReactivity,
        SectionKey::Toxicological,
        SectionKey::Ecological,
        SectionKey::Disposal,
        SectionKey::Transport,
        SectionKey::Regulatory,
        SectionKey::OtherInformation,
    ];

    /// Zero-based position in [`SectionKey::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// SDS section number, 1 to 16.
    pub fn number(self) -> u8 {
        self as u8 + 1
    }

    pub fn from_number(number: u8) -> Option<Self> {
        Self::ALL.get(usize::from(number).checked_sub(1)?).copied()
    }

    pub fn as_str(self) -> &'static str {
        SCHEMA[self.index()].1
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }

    pub fn title(self) -> &'static str {
        SCHEMA[self.index()].2
    }

    pub fn fields(self) -> &'static [&'static str] {
        SCHEMA[self.index()].3
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// (section, key, title, fields)
type SectionSpec = (
    SectionKey,
    &'static str,
    &'static str,
    &'static [&'static str],
);

pub static SCHEMA: [SectionSpec; 16] = [
    (
        SectionKey::Identification,
        "identification",
        "Chemical Product and Company Identification",
        &[
            "Product Identifier",
            "Other Names",
            "CAS Number",
            "PubChem CID",
            "ECHA Preferred Name",
            "Molecular Formula",
            "Molecular Weight",
        ],
    ),
    (
        SectionKey::Composition,
        "composition",
        "Composition and Information on Ingredients",
        &["Chemical Name", "IUPAC Name", "EC Number", "InChI Key"],
    ),
    (
        SectionKey::HazardIdentification,
        "hazard_identification",
        "Hazards Identification",
        &[
            "GHS Classification",
            "Signal Word",
            "Hazard Statements",
            "Precautionary Statements",
            "Pictograms",
        ],
    ),
    (
        SectionKey::FirstAid,
        "first_aid",
        "First Aid Measures",
        &[
            "Inhalation",
            "Skin Contact",
            "Eye Contact",
            "Ingestion",
            "General First Aid",
            "Most Important Symptoms",
            "Notes to Physician",
        ],
    ),
    (
        SectionKey::FireFighting,
        "fire_fighting",
        "Fire-Fighting Measures",
        &[
            "Extinguishing Media",
            "Unsuitable Extinguishing Media",
            "Special Hazards",
            "Special Protective Equipment",
            "Hazardous Combustion Products",
        ],
    ),
    (
        SectionKey::AccidentalRelease,
        "accidental_release",
        "Accidental Release Measures",
        &[
            "Personal Precautions",
            "Environmental Precautions",
            "Methods of Containment",
            "Methods of Cleaning Up",
            "Reference to Other Sections",
        ],
    ),
    (
        SectionKey::HandlingStorage,
        "handling_storage",
        "Handling and Storage",
        &[
            "Handling",
            "Storage",
            "Precautions for Safe Handling",
            "Conditions for Safe Storage",
            "Storage Temperature",
            "Incompatible Materials",
        ],
    ),
    (
        SectionKey::ExposureControls,
        "exposure_controls",
        "Exposure Controls/Personal Protection",
        &[
            "TLV-TWA",
            "TLV-STEL",
            "PEL",
            "IDLH",
            "Engineering Controls",
            "Personal Protection",
            "Eye Protection",
            "Skin Protection",
            "Respiratory Protection",
            "Thermal Hazards",
        ],
    ),
    (
        SectionKey::PhysicalProperties,
        "physical_properties",
        "Physical and Chemical Properties",
        &[
            "Physical State",
            "Appearance",
            "Color",
            "Odor",
            "Odor Threshold",
            "pH",
            "Melting Point",
            "Boiling Point",
            "Flash Point",
            "Evaporation Rate",
            "Flammability",
            "Upper Explosive Limit",
            "Lower Explosive Limit",
            "Vapor Pressure",
            "Vapor Density",
            "Density",
            "Relative Density",
            "Solubility in Water",
            "Partition Coefficient",
            "Auto-ignition Temperature",
            "Decomposition Temperature",
            "Viscosity",
            "Refractive Index",
        ],
    ),
    (
        SectionKey::StabilityReactivity,
        "stability_reactivity",
        "Stability and Reactivity",
        &[
            "Stability",
            "Reactivity",
            "Chemical Stability",
            "Conditions to Avoid",
            "Incompatible Materials",
            "Hazardous Decomposition",
            "Hazardous Polymerization",
            "Possibility of Hazardous Reactions",
        ],
    ),
    (
        SectionKey::Toxicological,
        "toxicological",
        "Toxicological Information",
        &[
            "Acute Toxicity",
            "LD50 Oral",
            "LD50 Dermal",
            "LC50 Inhalation",
            "Skin Corrosion",
            "Serious Eye Damage",
            "Respiratory Sensitization",
            "Skin Sensitization",
            "Germ Cell Mutagenicity",
            "Carcinogenicity",
            "Reproductive Toxicity",
            "STOT Single Exposure",
            "STOT Repeated Exposure",
            "Aspiration Hazard",
        ],
    ),
    (
        SectionKey::Ecological,
        "ecological",
        "Ecological Information",
        &[
            "Ecotoxicity",
            "LC50 Fish",
            "EC50 Daphnia",
            "EC50 Algae",
            "Persistence",
            "Biodegradability",
            "Bioaccumulation",
            "Mobility in Soil",
            "Other Adverse Effects",
        ],
    ),
    (
        SectionKey::Disposal,
        "disposal",
        "Disposal Considerations",
        &[
            "Disposal Method",
            "Waste Treatment Methods",
            "Contaminated Packaging",
            "Waste Disposal Methods",
        ],
    ),
    (
        SectionKey::Transport,
        "transport",
        "Transport Information",
        &[
            "UN Number",
            "UN Proper Shipping Name",
            "Transport Hazard Class",
            "Packing Group",
            "Environmental Hazards",
            "Marine Pollutant",
            "Special Precautions",
        ],
    ),
    (
        SectionKey::Regulatory,
        "regulatory",
        "Regulatory Information",
        &[
            "TSCA",
            "DSL/NDSL",
            "EINECS/ELINCS",
            "ENCS",
            "IECSC",
            "KECL",
            "PICCS",
            "AICS",
            "WHMIS",
            "GHS Classification",
            "SARA 313",
            "California Proposition 65",
        ],
    ),
    (
        SectionKey::OtherInformation,
        "other_information",
        "Other Information",
        &["PubChem Record", "ECHA Substance Page"],
    ),
];

/// Check the static schema: sections in number order, unique keys, non-empty
/// and duplicate-free field lists.
pub fn validate_schema() -> Result<()> {
    let mut keys = Vec::with_capacity(SCHEMA.len());
    for (position, (section, key, title, fields)) in SCHEMA.iter().enumerate() {
        if section.index() != position {
            return Err(SdsError::Config(format!(
                "section {key} declared at position {position}"
            )));
        }
        if keys.contains(key) {
            return Err(SdsError::Config(format!("duplicate section key {key}")));
        }
        keys.push(*key);
        if title.is_empty() || fields.is_empty() {
            return Err(SdsError::Config(format!("section {key} is incomplete")));
        }
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].contains(field) {
                return Err(SdsError::Config(format!("duplicate field {key}.{field}")));
            }
        }
    }
    Ok(())
}

/// Address of one schema field. Only constructible for names in the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    pub section: SectionKey,
    pub field: &'static str,
}

impl FieldKey {
    pub fn resolve(section: SectionKey, name: &str) -> Option<Self> {
        section
            .fields()
            .iter()
            .find(|f| **f == name)
            .map(|field| FieldKey { section, field })
    }

    fn position(&self) -> Option<usize> {
        self.section.fields().iter().position(|f| *f == self.field)
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section, self.field)
    }
}

/// Where a fused value came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Provenance {
    CompoundLookup,
    Source(String),
    StructuralRules,
    PropertyPrediction,
    Generative,
    CannedFallback,
}

impl Provenance {
    pub fn label(&self) -> &str {
        match self {
            Provenance::CompoundLookup => "PubChem",
            Provenance::Source(name) => name,
            Provenance::StructuralRules => "Structural analysis",
            Provenance::PropertyPrediction => "Property predictions",
            Provenance::Generative => "Generative model",
            Provenance::CannedFallback => "Standard safety text",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Slot {
    pub value: Value,
    pub provenance: Option<Provenance>,
}

/// The fused record: every schema field, always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyRecord {
    sections: Vec<Vec<Slot>>,
}

impl SafetyRecord {
    pub fn new() -> Self {
        let sections = SectionKey::ALL
            .iter()
            .map(|s| vec![Slot::default(); s.fields().len()])
            .collect();
        Self { sections }
    }

    pub fn slot(&self, key: FieldKey) -> Option<&Slot> {
        let pos = key.position()?;
        self.sections.get(key.section.index())?.get(pos)
    }

    pub(crate) fn slot_mut(&mut self, key: FieldKey) -> Option<&mut Slot> {
        let pos = key.position()?;
        self.sections.get_mut(key.section.index())?.get_mut(pos)
    }

    pub fn get(&self, key: FieldKey) -> &Value {
        self.slot(key).map(|s| &s.value).unwrap_or(&UNKNOWN)
    }

    /// Lookup by field name; names outside the schema read as unknown.
    pub fn value(&self, section: SectionKey, name: &str) -> &Value {
        FieldKey::resolve(section, name)
            .map(|key| self.get(key))
            .unwrap_or(&UNKNOWN)
    }

    /// Known text for a field, if any.
    pub fn text(&self, section: SectionKey, name: &str) -> Option<&str> {
        self.value(section, name).as_known()
    }

    /// Every field with its slot, in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (FieldKey, &Slot)> + '_ {
        SectionKey::ALL.into_iter().flat_map(move |section| {
            section
                .fields()
                .iter()
                .zip(self.sections[section.index()].iter())
                .map(move |(field, slot)| (FieldKey { section, field }, slot))
        })
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (FieldKey, &mut Slot)> + '_ {
        SectionKey::ALL
            .into_iter()
            .zip(self.sections.iter_mut())
            .flat_map(|(section, slots)| {
                section
                    .fields()
                    .iter()
                    .zip(slots.iter_mut())
                    .map(move |(field, slot)| (FieldKey { section, field }, slot))
            })
    }

    /// Fields still unknown, in schema order.
    pub fn unknown_fields(&self) -> Vec<FieldKey> {
        self.iter()
            .filter(|(_, slot)| !slot.value.is_known())
            .map(|(key, _)| key)
            .collect()
    }

    pub fn known_count(&self) -> usize {
        self.iter().filter(|(_, slot)| slot.value.is_known()).count()
    }

    /// Distinct provenances of a section's known fields, in field order.
    pub fn section_provenance(&self, section: SectionKey) -> Vec<&Provenance> {
        let mut out: Vec<&Provenance> = Vec::new();
        for slot in &self.sections[section.index()] {
            if let Some(p) = &slot.provenance {
                if slot.value.is_known() && !out.contains(&p) {
                    out.push(p);
                }
            }
        }
        out
    }
}

impl Default for SafetyRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// One contributor's proposed values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialSafetyRecord {
    provenance: Provenance,
    entries: Vec<(FieldKey, String)>,
}

impl PartialSafetyRecord {
    pub fn new(provenance: Provenance) -> Self {
        Self {
            provenance,
            entries: Vec::new(),
        }
    }

    /// Add a value. Names outside the schema are ignored; a repeated field
    /// keeps its first value.
    pub fn insert(&mut self, section: SectionKey, field: &str, value: impl Into<String>) -> bool {
        let Some(key) = FieldKey::resolve(section, field) else {
            debug!(section = %section, field = %field, "Ignoring field outside the schema");
            return false;
        };
        if self.contains(key) {
            return false;
        }
        self.entries.push((key, value.into()));
        true
    }

    pub fn contains(&self, key: FieldKey) -> bool {
        self.entries.iter().any(|(k, _)| *k == key)
    }

    pub fn get(&self, section: SectionKey, field: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.section == section && k.field == field)
            .map(|(_, v)| v.as_str())
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn entries(&self) -> &[(FieldKey, String)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_valid() {
        validate_schema().unwrap();
        assert_eq!(SectionKey::FirstAid.number(), 4);
        assert_eq!(SectionKey::OtherInformation.number(), 16);
        assert_eq!(SectionKey::from_number(3), Some(SectionKey::HazardIdentification));
        assert_eq!(SectionKey::from_number(0), None);
        assert_eq!(SectionKey::from_number(17), None);
    }

    #[test]
    fn test_section_names_round_trip() {
        for section in SectionKey::ALL {
            assert_eq!(SectionKey::parse(section.as_str()), Some(section));
        }
        assert_eq!(
            serde_json::to_value(SectionKey::StabilityReactivity).unwrap(),
            "stability_reactivity"
        );
    }

    #[test]
    fn test_new_record_is_all_unknown() {
        let record = SafetyRecord::new();
        let total: usize = SectionKey::ALL.iter().map(|s| s.fields().len()).sum();
        assert_eq!(record.iter().count(), total);
        assert_eq!(record.unknown_fields().len(), total);
        assert_eq!(record.value(SectionKey::FirstAid, "Inhalation"), &Value::Unknown);
    }

    #[test]
    fn test_unknown_serializes_as_sentinel() {
        assert_eq!(serde_json::to_string(&Value::Unknown).unwrap(), "\"Not available\"");
        assert_eq!(Value::known("Stable").as_str(), "Stable");
    }

    #[test]
    fn test_field_key_resolution() {
        assert!(FieldKey::resolve(SectionKey::FirstAid, "Inhalation").is_some());
        assert!(FieldKey::resolve(SectionKey::FirstAid, "Flash Point").is_none());
        let key = FieldKey::resolve(SectionKey::Transport, "UN Number").unwrap();
        assert_eq!(key.to_string(), "transport.UN Number");
    }

    #[test]
    fn test_partial_ignores_unknown_and_duplicate_fields() {
        let mut partial = PartialSafetyRecord::new(Provenance::Source("NIST".into()));
        assert!(partial.insert(SectionKey::PhysicalProperties, "Density", "0.79 g/cm3"));
        assert!(!partial.insert(SectionKey::PhysicalProperties, "Density", "0.80 g/cm3"));
        assert!(!partial.insert(SectionKey::PhysicalProperties, "Colour Index", "12"));
        assert_eq!(partial.len(), 1);
        assert_eq!(
            partial.get(SectionKey::PhysicalProperties, "Density"),
            Some("0.79 g/cm3")
        );
    }
}
