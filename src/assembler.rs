//! Assembly of the fused record into the 16-section SDS document.
//!
//! Every schema field appears in its section under its schema name: the
//! fused value when known, otherwise a value derived from the compound,
//! descriptors, toxicity and hazards, otherwise [`NOT_AVAILABLE`]. Each
//! section then appends supplementary rows and groups, and records where
//! its data came from.

use crate::backfill::BackfillReport;
use crate::compound::CompoundRecord;
use crate::error::SourceError;
use crate::hazards::{HazardCategory, StructuralHazard};
use crate::molecule::Descriptors;
use crate::schema::{FieldKey, Provenance, SafetyRecord, SectionKey, NOT_AVAILABLE};
use crate::toxicity::{Confidence, ToxicityAssessment};
use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use tracing::debug;

/// Lipophilicity above which a compound is treated as flammable.
pub const FLAMMABILITY_LOGP: f64 = 1.5;

const BIOACCUMULATION_LOGP: f64 = 3.5;

/// Shortest text a document field may carry; anything shorter is emitted
/// as [`NOT_AVAILABLE`].
pub const MIN_FIELD_CHARS: usize = 3;

const GENERATIVE_NOTE: &str =
    "Some fields were completed by a generative model and must be verified before use";
const CANNED_NOTE: &str =
    "Some fields use standard safety text because no compound-specific data was found";
const SUCCESS_NOTE: &str = "SDS generated successfully";

const DISCLAIMER: &str = "This SDS is generated for research purposes using computational methods. \
Users must verify all information through laboratory testing and consult authoritative sources. \
No warranty is provided for accuracy or completeness.";

const ABBREVIATIONS: &[(&str, &str)] = &[
    ("ACGIH", "American Conference of Governmental Industrial Hygienists"),
    ("CAS", "Chemical Abstracts Service"),
    ("DOT", "Department of Transportation"),
    ("EPA", "Environmental Protection Agency"),
    ("GHS", "Globally Harmonized System"),
    ("NIOSH", "National Institute for Occupational Safety and Health"),
    ("OSHA", "Occupational Safety and Health Administration"),
    ("PEL", "Permissible Exposure Limit"),
    ("PPE", "Personal Protective Equipment"),
    ("SARA", "Superfund Amendments and Reauthorization Act"),
    ("SDS", "Safety Data Sheet"),
    ("STEL", "Short Term Exposure Limit"),
    ("TLV", "Threshold Limit Value"),
    ("TSCA", "Toxic Substances Control Act"),
    ("TWA", "Time Weighted Average"),
];

/// A section field: plain text or an ordered group of sub-fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Group(FieldMap),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            FieldValue::Group(_) => None,
        }
    }
}

/// Insertion-ordered field map. Serializes as a JSON object in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    entries: Vec<(String, FieldValue)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace, keeping the original position on replace.
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn text(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.insert(name, FieldValue::Text(value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> + '_ {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = FieldMap::new();
        for (k, v) in iter {
            map.text(k, v);
        }
        map
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub number: u8,
    pub key: SectionKey,
    pub title: String,
    pub fields: FieldMap,
    pub data_sources: Vec<String>,
    pub notes: Vec<String>,
}

/// The finished Safety Data Sheet.
#[derive(Debug, Clone, Serialize)]
pub struct SdsDocument {
    pub compound_name: String,
    pub identifier: String,
    pub generated_at: DateTime<Utc>,
    pub sections: Vec<Section>,
    pub source_errors: Vec<SourceError>,
    /// Schema fields left at the sentinel, as `section.field`
    pub unresolved_fields: Vec<String>,
    pub toxicity: ToxicityAssessment,
    pub hazards: Vec<StructuralHazard>,
    pub backfill: BackfillReport,
}

impl SdsDocument {
    pub fn section(&self, key: SectionKey) -> Option<&Section> {
        self.sections.iter().find(|s| s.key == key)
    }

    /// Top-level text of a section field.
    pub fn field(&self, key: SectionKey, name: &str) -> Option<&str> {
        self.section(key).and_then(|s| s.fields.get_text(name))
    }

    pub fn is_complete(&self) -> bool {
        self.unresolved_fields.is_empty()
    }
}

/// Everything the assembler reads.
pub struct AssemblyInput<'a> {
    pub compound: &'a CompoundRecord,
    pub descriptors: &'a Descriptors,
    pub toxicity: &'a ToxicityAssessment,
    pub hazards: &'a [StructuralHazard],
    pub fused: &'a SafetyRecord,
    pub identifier: &'a str,
    pub generated_at: DateTime<Utc>,
    pub source_errors: &'a [SourceError],
    /// Names of contributors that returned data
    pub sources_used: &'a [String],
}

impl AssemblyInput<'_> {
    fn logp(&self) -> f64 {
        self.compound.logp.unwrap_or(self.descriptors.logp)
    }

    fn molecular_weight(&self) -> f64 {
        self.compound
            .molecular_weight
            .unwrap_or(self.descriptors.molecular_weight)
    }

    fn is_toxic(&self) -> bool {
        self.toxicity.class.is_high_severity()
    }

    fn is_flammable(&self) -> bool {
        self.logp() > FLAMMABILITY_LOGP
    }

    fn has_hazard(&self, categories: &[HazardCategory]) -> bool {
        self.hazards.iter().any(|h| categories.contains(&h.category))
    }

    fn target_organs(&self) -> String {
        self.toxicity.target_organs.join(", ")
    }
}

/// GHS classification derived from toxicity and flammability.
pub fn ghs_classification(is_toxic: bool, is_flammable: bool) -> &'static str {
    match (is_toxic, is_flammable) {
        (true, true) => "Acute Tox. 3, Flam. Liq. 3",
        (true, false) => "Acute Tox. 3",
        (false, true) => "Flam. Liq. 3",
        (false, false) => "Not classified",
    }
}

/// "Danger" for Class I/II toxicity or any explosive or corrosive group.
pub fn signal_word(toxicity: &ToxicityAssessment, hazards: &[StructuralHazard]) -> &'static str {
    let severe_group = hazards
        .iter()
        .any(|h| matches!(h.category, HazardCategory::Explosive | HazardCategory::Corrosive));
    if toxicity.class.is_high_severity() || severe_group {
        "Danger"
    } else {
        "Warning"
    }
}

pub fn pictograms(is_toxic: bool, is_flammable: bool) -> Vec<&'static str> {
    let mut out = Vec::new();
    if is_flammable {
        out.push("GHS02 (Flame)");
    }
    if is_toxic {
        out.push("GHS06 (Skull and crossbones)");
        out.push("GHS08 (Health hazard)");
    }
    if out.is_empty() {
        out.push("GHS07 (Exclamation mark)");
    }
    out
}

fn confidence_label(confidence: Confidence) -> &'static str {
    match confidence {
        Confidence::High => "High",
        Confidence::Medium => "Medium",
        Confidence::Low => "Low",
    }
}

/// Collects one section: schema fields first, then supplementary rows.
struct SectionBuilder<'a> {
    key: SectionKey,
    fused: &'a SafetyRecord,
    fields: FieldMap,
    sources: Vec<String>,
    notes: Vec<String>,
    generative: bool,
    canned: bool,
}

impl<'a> SectionBuilder<'a> {
    fn new(key: SectionKey, fused: &'a SafetyRecord) -> Self {
        Self {
            key,
            fused,
            fields: FieldMap::new(),
            sources: Vec::new(),
            notes: Vec::new(),
            generative: false,
            canned: false,
        }
    }

    /// Every schema field: fused, else derived, else the sentinel.
    fn schema(mut self, derive: impl Fn(&str) -> Option<String>) -> Self {
        for field in self.key.fields() {
            let slot = FieldKey::resolve(self.key, field).and_then(|k| self.fused.slot(k));
            let value = match slot {
                Some(slot) if slot.value.is_known() => {
                    match &slot.provenance {
                        Some(Provenance::Generative) => self.generative = true,
                        Some(Provenance::CannedFallback) => self.canned = true,
                        _ => {}
                    }
                    slot.value.as_str().to_string()
                }
                _ => derive(field).unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            };
            self.fields.text(*field, substantive(value));
        }
        for provenance in self.fused.section_provenance(self.key) {
            push_distinct(&mut self.sources, provenance.label());
        }
        self
    }

    fn row(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.text(name, substantive(value.into()));
        self
    }

    fn group(mut self, name: &str, group: FieldMap) -> Self {
        self.fields.insert(name, FieldValue::Group(substantive_group(group)));
        self
    }

    fn source(mut self, source: &str) -> Self {
        push_distinct(&mut self.sources, source);
        self
    }

    fn note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    fn build(mut self) -> Section {
        if self.generative {
            self.notes.push(GENERATIVE_NOTE.to_string());
        }
        if self.canned {
            self.notes.push(CANNED_NOTE.to_string());
        }
        Section {
            number: self.key.number(),
            key: self.key,
            title: self.key.title().to_string(),
            fields: self.fields,
            data_sources: self.sources,
            notes: self.notes,
        }
    }
}

fn substantive(value: String) -> String {
    if value.trim().chars().count() >= MIN_FIELD_CHARS {
        value
    } else {
        NOT_AVAILABLE.to_string()
    }
}

/// Keep a short value readable by naming what it is, e.g. `O2 (Hill formula)`.
fn labelled(value: &str, label: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        NOT_AVAILABLE.to_string()
    } else if value.chars().count() < MIN_FIELD_CHARS {
        format!("{} ({})", value, label)
    } else {
        value.to_string()
    }
}

fn substantive_group(group: FieldMap) -> FieldMap {
    let mut out = FieldMap::new();
    for (name, value) in group.entries {
        let value = match value {
            FieldValue::Text(text) => FieldValue::Text(substantive(text)),
            FieldValue::Group(inner) => FieldValue::Group(substantive_group(inner)),
        };
        out.insert(name, value);
    }
    out
}

fn push_distinct(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|existing| existing == item) {
        list.push(item.to_string());
    }
}

fn identification(input: &AssemblyInput) -> Section {
    let compound = input.compound;
    let product_code = compound
        .cid
        .map(|cid| format!("CID-{}", cid))
        .unwrap_or_else(|| "Not assigned".to_string());
    let synonyms = if compound.synonyms.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        compound.synonyms.join(", ")
    };

    SectionBuilder::new(SectionKey::Identification, input.fused)
        .schema(|field| match field {
            "Product Identifier" => Some(compound.display_name().to_string()),
            "Molecular Formula" => Some(labelled(&input.descriptors.formula, "Hill formula")),
            "Molecular Weight" => Some(format!("{:.2} g/mol", input.molecular_weight())),
            _ => None,
        })
        .row("Synonyms", synonyms)
        .row("Product Code", product_code)
        .row("Date of SDS", input.generated_at.format("%Y-%m-%d").to_string())
        .row("Recommended Use", "Research and development use only")
        .source("Descriptor calculations")
        .note("This SDS is generated for research purposes only")
        .build()
}

fn composition(input: &AssemblyInput) -> Section {
    let d = input.descriptors;
    let descriptors: FieldMap = [
        ("Heavy Atoms", format!("{} heavy atoms", d.heavy_atom_count)),
        (
            "Hydrogen Bonding",
            format!("{} donor(s), {} acceptor(s)", d.h_bond_donors, d.h_bond_acceptors),
        ),
        ("LogP", format!("{:.2} (calculated)", input.logp())),
        ("Formal Charge", format!("{:+} (net)", d.formal_charge)),
    ]
    .into_iter()
    .collect();

    SectionBuilder::new(SectionKey::Composition, input.fused)
        .schema(|field| match field {
            "Chemical Name" => Some(input.compound.display_name().to_string()),
            _ => None,
        })
        .row("SMILES", labelled(input.identifier, "as entered"))
        .row("Concentration/Purity", "≥95% (typical research grade)")
        .row("Impurities", "May contain trace organic impurities (<5%)")
        .row("Chemical Family", "Organic compound")
        .row("Hazardous Ingredients", "This entire product")
        .group("Additional Identifiers", descriptors)
        .source("Descriptor calculations")
        .note("Composition based on theoretical structure")
        .build()
}

fn hazard_identification(input: &AssemblyInput) -> Section {
    let toxic = input.is_toxic();
    let flammable = input.is_flammable();
    let class = input.toxicity.class.label();
    let alerts = if input.hazards.is_empty() {
        "None detected".to_string()
    } else {
        input
            .hazards
            .iter()
            .map(|h| format!("{} ({})", h.functional_group, h.category))
            .collect::<Vec<_>>()
            .join(", ")
    };

    SectionBuilder::new(SectionKey::HazardIdentification, input.fused)
        .schema(|field| match field {
            "GHS Classification" => Some(ghs_classification(toxic, flammable).to_string()),
            "Signal Word" => Some(signal_word(input.toxicity, input.hazards).to_string()),
            "Pictograms" => Some(pictograms(toxic, flammable).join(", ")),
            _ => None,
        })
        .row(
            "Physical Hazards",
            if flammable { "Flammable liquid" } else { "Combustible material" },
        )
        .row("Health Hazards", format!("Acute toxicity ({})", class))
        .row(
            "Environmental Hazards",
            if input.logp() > 3.0 {
                "Harmful to aquatic life"
            } else {
                "May cause environmental effects"
            },
        )
        .row("Routes of Exposure", "Inhalation, dermal contact, eye contact, ingestion")
        .row("Target Organs", input.target_organs())
        .row("Structural Alerts", alerts)
        .row("Hazard Class", class)
        .row(
            "Most Important Hazards",
            format!(
                "Toxicity: {}; Flammability: {}",
                class,
                if flammable { "Yes" } else { "Low" }
            ),
        )
        .source("Toxicity predictions")
        .source("GHS guidelines")
        .note("Classification based on computational predictions")
        .build()
}

fn first_aid(input: &AssemblyInput) -> Section {
    SectionBuilder::new(SectionKey::FirstAid, input.fused)
        .schema(|_| None)
        .row(
            "Immediate Medical Attention",
            "Required for significant exposures or persistent symptoms",
        )
        .row("Specific Treatment", "No specific antidote. Provide supportive care.")
        .row(
            "Protection of First Aiders",
            "Use appropriate protective equipment to avoid exposure.",
        )
        .source("Standard first aid protocols")
        .note("Follow standard chemical exposure first aid procedures")
        .build()
}

fn fire_fighting(input: &AssemblyInput) -> Section {
    let fused = input.fused;
    let flammable = input.is_flammable();
    let flash_point = fused
        .text(SectionKey::PhysicalProperties, "Flash Point")
        .map(str::to_string)
        .unwrap_or_else(|| predicted_flash_point(flammable).to_string());
    let limits = format!(
        "LEL: {} | UEL: {}",
        fused
            .value(SectionKey::PhysicalProperties, "Lower Explosive Limit")
            .as_str(),
        fused
            .value(SectionKey::PhysicalProperties, "Upper Explosive Limit")
            .as_str()
    );

    SectionBuilder::new(SectionKey::FireFighting, fused)
        .schema(|_| None)
        .row("Flash Point", flash_point)
        .row("Flammable Limits (LEL/UEL)", limits)
        .row(
            "Special Fire Fighting Procedures",
            "Use water spray to cool containers. Fight fire from upwind position.",
        )
        .row(
            "Sensitivity to Static Discharge",
            if flammable { "May be sensitive" } else { "Not sensitive" },
        )
        .source("Fire safety guidelines")
        .note("Fire fighting procedures based on chemical class")
        .build()
}

fn predicted_flash_point(flammable: bool) -> &'static str {
    if flammable {
        "< 23°C (predicted)"
    } else {
        "> 93°C (predicted)"
    }
}

fn accidental_release(input: &AssemblyInput) -> Section {
    SectionBuilder::new(SectionKey::AccidentalRelease, input.fused)
        .schema(|field| match field {
            "Reference to Other Sections" => {
                Some("See Sections 8 and 13 for exposure controls and disposal".to_string())
            }
            _ => None,
        })
        .row("Small Spills", "Absorb with paper towels or cloth. Dispose as chemical waste.")
        .row(
            "Large Spills",
            "Evacuate area. Use appropriate absorbents. Prevent environmental release.",
        )
        .row("Equipment Needed", "Absorbent materials, non-sparking tools, appropriate containers")
        .source("Spill response guidelines")
        .note("Follow institutional spill response procedures")
        .build()
}

fn handling_storage(input: &AssemblyInput) -> Section {
    let incompatible = input
        .fused
        .text(SectionKey::StabilityReactivity, "Incompatible Materials")
        .map(str::to_string)
        .unwrap_or_else(|| crate::hazards::incompatibles_for(input.hazards));

    SectionBuilder::new(SectionKey::HandlingStorage, input.fused)
        .schema(|field| match field {
            "Incompatible Materials" => Some(incompatible.clone()),
            _ => None,
        })
        .row("Container Materials", "Glass, PTFE, stainless steel. Avoid reactive metals.")
        .row(
            "Storage Requirements",
            "Secondary containment recommended. Proper labeling required.",
        )
        .row(
            "Special Precautions",
            "Secure against unauthorized access. Follow local regulations.",
        )
        .source("Chemical storage guidelines")
        .note("Follow institutional chemical storage procedures")
        .build()
}

fn exposure_controls(input: &AssemblyInput) -> Section {
    let ppe: FieldMap = [
        (
            "Foot Protection",
            "Closed-toe shoes. Chemical-resistant boots for large quantities.",
        ),
        (
            "Hygiene Measures",
            "Wash hands thoroughly after handling. No eating, drinking, or smoking in work areas.",
        ),
        (
            "Environmental Controls",
            "Prevent release to environment. Use appropriate containment.",
        ),
    ]
    .into_iter()
    .collect();

    SectionBuilder::new(SectionKey::ExposureControls, input.fused)
        .schema(|field| match field {
            "Personal Protection" => Some(
                "Safety glasses with side shields, chemical-resistant gloves and a laboratory coat"
                    .to_string(),
            ),
            _ => None,
        })
        .group("Additional Protective Measures", ppe)
        .source("Exposure control guidelines")
        .note("Adjust PPE based on quantity and exposure potential")
        .build()
}

fn physical_properties(input: &AssemblyInput) -> Section {
    let d = input.descriptors;
    let liquid = input.molecular_weight() < 300.0;
    let flammable = input.is_flammable();
    let logp = input.logp();
    let computed: FieldMap = [
        ("Molecular Weight", format!("{:.2} g/mol", input.molecular_weight())),
        ("Molecular Formula", labelled(&d.formula, "Hill formula")),
        ("Heavy Atoms", format!("{} heavy atoms", d.heavy_atom_count)),
        ("Rotatable Bonds", format!("{} rotatable bond(s)", d.rotatable_bonds)),
        ("Topological Polar Surface Area", format!("{:.2} Å²", d.tpsa)),
        (
            "Rings",
            format!("{} ring(s), {} aromatic", d.ring_count, d.aromatic_ring_count),
        ),
        ("Fraction sp3 Carbon", format!("{:.2} (calculated)", d.fraction_csp3)),
    ]
    .into_iter()
    .collect();

    SectionBuilder::new(SectionKey::PhysicalProperties, input.fused)
        .schema(|field| match field {
            "Physical State" => Some(if liquid { "Liquid" } else { "Solid" }.to_string()),
            "Appearance" => Some(
                if liquid {
                    "Clear liquid"
                } else {
                    "White to off-white solid"
                }
                .to_string(),
            ),
            "Flash Point" => Some(predicted_flash_point(flammable).to_string()),
            "Partition Coefficient" => Some(format!("log P = {:.2} (calculated)", logp)),
            _ => None,
        })
        .group("Computed Descriptors", computed)
        .source("Descriptor calculations")
        .source("Property predictions")
        .note("Physical properties estimated from molecular structure where not sourced")
        .build()
}

fn stability_reactivity(input: &AssemblyInput) -> Section {
    let incompatible = crate::hazards::incompatibles_for(input.hazards);
    SectionBuilder::new(SectionKey::StabilityReactivity, input.fused)
        .schema(|field| match field {
            "Incompatible Materials" => Some(incompatible.clone()),
            _ => None,
        })
        .row("Reactivity Hazards", "May react with incompatible materials")
        .source("Chemical stability guidelines")
        .note("Stability assessment based on chemical structure")
        .build()
}

fn toxicological(input: &AssemblyInput) -> Section {
    let tox = input.toxicity;
    let organs = input.target_organs();
    let has_organs = tox.target_organs.iter().any(|o| o != "Not specified");
    let predicted: FieldMap = [
        ("Toxicity Classification", tox.class.label().to_string()),
        ("Hazard Endpoints", tox.endpoints.join(", ")),
        ("Target Organs", organs.clone()),
        ("Structural Alerts", format!("{} alert(s)", tox.structural_alerts)),
        ("Prediction Confidence", confidence_label(tox.confidence).to_string()),
    ]
    .into_iter()
    .collect();

    SectionBuilder::new(SectionKey::Toxicological, input.fused)
        .schema(|field| match field {
            "Acute Toxicity" => Some(format!(
                "{}: estimated oral LD50 {}",
                tox.class.label(),
                tox.ld50_range
            )),
            "LD50 Oral" => Some(format!("{} (predicted)", tox.ld50_range)),
            "LC50 Inhalation" => Some(format!("{} (predicted)", tox.lc50_inhalation)),
            "STOT Repeated Exposure" if has_organs => {
                Some(format!("May cause damage to organs: {} (predicted)", organs))
            }
            _ => None,
        })
        .row("Routes of Exposure", "Inhalation, dermal contact, eye contact, ingestion")
        .row("Symptoms", "Irritation, nausea, dizziness, headache")
        .group("Predicted Toxicity", predicted)
        .source("Toxicity predictions")
        .source("Structure-activity relationships")
        .note("Toxicity data based on computational predictions")
        .build()
}

fn ecological(input: &AssemblyInput) -> Section {
    let logp = input.logp();
    SectionBuilder::new(SectionKey::Ecological, input.fused)
        .schema(|field| match field {
            "Bioaccumulation" => Some(format!(
                "{} bioaccumulation potential (log P = {:.2})",
                if logp > BIOACCUMULATION_LOGP { "High" } else { "Low" },
                logp
            )),
            "Mobility in Soil" => Some(
                if logp < 2.0 {
                    "Mobile"
                } else if logp < 4.0 {
                    "Moderately mobile"
                } else {
                    "Low mobility"
                }
                .to_string(),
            ),
            _ => None,
        })
        .row(
            "Environmental Fate",
            "Expected to partition between water, sediment, and biota",
        )
        .row("Terrestrial Toxicity", "Limited data available")
        .source("Property-based predictions")
        .note("Environmental fate based on physicochemical properties")
        .build()
}

fn disposal(input: &AssemblyInput) -> Section {
    SectionBuilder::new(SectionKey::Disposal, input.fused)
        .schema(|field| match field {
            "Waste Disposal Methods" => {
                Some("Incineration or treatment at a licensed hazardous waste facility".to_string())
            }
            _ => None,
        })
        .row("Special Precautions", "Do not dispose in regular trash or sewage system")
        .row("Recommended Method", "Contract with licensed waste disposal company")
        .row(
            "Preparation for Disposal",
            "Collect waste in appropriate containers. Label clearly.",
        )
        .row(
            "Waste Code",
            "Consult local regulations for appropriate waste classification",
        )
        .source("Waste disposal guidelines")
        .note("Consult local environmental regulations before disposal")
        .build()
}

fn transport(input: &AssemblyInput) -> Section {
    let flammable = input.is_flammable();
    SectionBuilder::new(SectionKey::Transport, input.fused)
        .schema(|field| {
            let value = match (field, flammable) {
                ("UN Number", true) => "UN1993",
                ("UN Number", false) => "Not regulated",
                ("UN Proper Shipping Name", true) => "Flammable liquid, n.o.s.",
                ("UN Proper Shipping Name", false) => "Research chemical",
                ("Transport Hazard Class", true) => "Class 3",
                ("Packing Group", true) => "III",
                ("Transport Hazard Class" | "Packing Group", false) => "Not applicable",
                _ => return None,
            };
            Some(value.to_string())
        })
        .row("Transport by Road/Rail", "Follow ADR/RID regulations where applicable")
        .row("Transport by Sea", "Follow IMDG Code where applicable")
        .row("Transport by Air", "Follow IATA regulations where applicable")
        .source("Transport guidelines")
        .note("Verify current transport regulations before shipping")
        .build()
}

fn regulatory(input: &AssemblyInput) -> Section {
    let sara: FieldMap = [
        ("Section 302 EHS", "Not listed"),
        ("Section 311/312 Categories", "Not listed"),
    ]
    .into_iter()
    .collect();
    let see_hazards = format!("See Section {}", SectionKey::HazardIdentification.number());

    SectionBuilder::new(SectionKey::Regulatory, input.fused)
        .schema(|field| match field {
            "GHS Classification" => Some(see_hazards.clone()),
            _ => None,
        })
        .group("SARA Title III", sara)
        .row("RCRA Hazardous Waste", "Not listed")
        .row("CERCLA Reportable Quantity", "Not established")
        .row(
            "International Regulations",
            "Subject to country-specific chemical regulations",
        )
        .source("Regulatory databases")
        .note("Regulatory status may change. Verify current requirements.")
        .build()
}

fn other_information(input: &AssemblyInput) -> Section {
    let date = input.generated_at.format("%Y-%m-%d").to_string();
    let sources_used = if input.sources_used.is_empty() {
        "Computational predictions".to_string()
    } else {
        input.sources_used.join(", ")
    };
    let pubchem_ref = input
        .compound
        .cid
        .map(|cid| format!("CID: {}", cid))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());
    let references: FieldMap = [
        ("PubChem Database", pubchem_ref),
        (
            "Structure Analysis",
            "SMILES parsing and descriptor calculations".to_string(),
        ),
        (
            "Toxicity Predictions",
            "Structure-activity relationship rules".to_string(),
        ),
        ("Regulatory Guidelines", "GHS, OSHA, EPA standards".to_string()),
    ]
    .into_iter()
    .collect();
    let abbreviations: FieldMap = ABBREVIATIONS.iter().copied().collect();

    let mut builder = SectionBuilder::new(SectionKey::OtherInformation, input.fused)
        .schema(|_| None)
        .row("Date of Preparation", date.clone())
        .row("Date of Last Revision", date)
        .row("Revision Number", "1.0")
        .row(
            "Prepared By",
            format!("rustsds {}", env!("CARGO_PKG_VERSION")),
        )
        .row("Data Sources Used", sources_used)
        .group("References", references)
        .group("Abbreviations", abbreviations)
        .row(
            "Data Limitations",
            "Some values are computationally predicted. Laboratory verification recommended.",
        )
        .row("Disclaimer", DISCLAIMER)
        .source("System metadata");

    if input.source_errors.is_empty() {
        builder = builder.note(SUCCESS_NOTE);
    } else {
        for err in input.source_errors {
            builder = builder.note(format!("{}: {}", err.source, err.message));
        }
    }
    builder.build()
}

/// Build the 16-section document.
pub fn assemble(input: AssemblyInput) -> SdsDocument {
    let sections: Vec<Section> = SectionKey::ALL
        .into_iter()
        .map(|key| match key {
            SectionKey::Identification => identification(&input),
            SectionKey::Composition => composition(&input),
            SectionKey::HazardIdentification => hazard_identification(&input),
            SectionKey::FirstAid => first_aid(&input),
            SectionKey::FireFighting => fire_fighting(&input),
            SectionKey::AccidentalRelease => accidental_release(&input),
            SectionKey::HandlingStorage => handling_storage(&input),
            SectionKey::ExposureControls => exposure_controls(&input),
            SectionKey::PhysicalProperties => physical_properties(&input),
            SectionKey::StabilityReactivity => stability_reactivity(&input),
            SectionKey::Toxicological => toxicological(&input),
            SectionKey::Ecological => ecological(&input),
            SectionKey::Disposal => disposal(&input),
            SectionKey::Transport => transport(&input),
            SectionKey::Regulatory => regulatory(&input),
            SectionKey::OtherInformation => other_information(&input),
        })
        .collect();

    let unresolved_fields: Vec<String> = sections
        .iter()
        .flat_map(|section| {
            section.key.fields().iter().filter_map(move |field| {
                (section.fields.get_text(field) == Some(NOT_AVAILABLE))
                    .then(|| format!("{}.{}", section.key, field))
            })
        })
        .collect();

    debug!(
        sections = sections.len(),
        unresolved = unresolved_fields.len(),
        "Assembled document"
    );

    SdsDocument {
        compound_name: input.compound.display_name().to_string(),
        identifier: input.identifier.to_string(),
        generated_at: input.generated_at,
        sections,
        source_errors: input.source_errors.to_vec(),
        unresolved_fields,
        toxicity: input.toxicity.clone(),
        hazards: input.hazards.to_vec(),
        backfill: BackfillReport::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hazards::HazardRuleSet;
    use crate::molecule::parse_smiles;
    use crate::schema::PartialSafetyRecord;
    use crate::toxicity::predict;

    struct Fixture {
        compound: CompoundRecord,
        descriptors: Descriptors,
        toxicity: ToxicityAssessment,
        hazards: Vec<StructuralHazard>,
        fused: SafetyRecord,
    }

    fn fixture(smiles: &str) -> Fixture {
        let mol = parse_smiles(smiles).unwrap();
        let descriptors = Descriptors::compute(&mol);
        let hazards = HazardRuleSet::standard().scan(&mol);
        let toxicity = predict(&mol, &descriptors, &hazards);
        Fixture {
            compound: CompoundRecord::empty(),
            descriptors,
            toxicity,
            hazards,
            fused: SafetyRecord::new(),
        }
    }

    fn build(f: &Fixture, smiles: &str, errors: &[SourceError]) -> SdsDocument {
        assemble(AssemblyInput {
            compound: &f.compound,
            descriptors: &f.descriptors,
            toxicity: &f.toxicity,
            hazards: &f.hazards,
            fused: &f.fused,
            identifier: smiles,
            generated_at: Utc::now(),
            source_errors: errors,
            sources_used: &[],
        })
    }

    #[test]
    fn test_every_schema_field_present() {
        let f = fixture("CCO");
        let doc = build(&f, "CCO", &[]);
        assert_eq!(doc.sections.len(), 16);
        for (i, section) in doc.sections.iter().enumerate() {
            assert_eq!(section.number as usize, i + 1);
            for field in section.key.fields() {
                let value = section.fields.get_text(field).unwrap();
                assert!(value == NOT_AVAILABLE || value.chars().count() >= 3, "{field}: {value}");
            }
            assert!(!section.data_sources.is_empty());
            assert!(!section.notes.is_empty());
        }
    }

    fn assert_substantive(name: &str, value: &FieldValue, smiles: &str) {
        match value {
            FieldValue::Text(text) => assert!(
                text == NOT_AVAILABLE || text.trim().chars().count() >= MIN_FIELD_CHARS,
                "{smiles}: {name} = {text:?}"
            ),
            FieldValue::Group(group) => {
                for (inner, value) in group.iter() {
                    assert_substantive(inner, value, smiles);
                }
            }
        }
    }

    #[test]
    fn test_small_molecules_keep_fields_substantive() {
        for smiles in ["O=O", "N#N", "[He]", "[H][H]", "C"] {
            let f = fixture(smiles);
            let doc = build(&f, smiles, &[]);
            for section in &doc.sections {
                for (name, value) in section.fields.iter() {
                    assert_substantive(name, value, smiles);
                }
            }
        }

        let f = fixture("O=O");
        let doc = build(&f, "O=O", &[]);
        assert_eq!(
            doc.field(SectionKey::Identification, "Molecular Formula"),
            Some("O2 (Hill formula)")
        );
        let f = fixture("C");
        let doc = build(&f, "C", &[]);
        let composition = doc.section(SectionKey::Composition).unwrap();
        assert_eq!(composition.fields.get_text("SMILES"), Some("C (as entered)"));
    }

    #[test]
    fn test_short_rows_become_sentinel() {
        assert_eq!(substantive("ab".into()), NOT_AVAILABLE);
        assert_eq!(substantive("abc".into()), "abc");
        assert_eq!(labelled("", "Hill formula"), NOT_AVAILABLE);
        assert_eq!(labelled("CH4", "Hill formula"), "CH4");
        let group: FieldMap = [("Short", "x"), ("Long", "long enough")].into_iter().collect();
        let group = substantive_group(group);
        assert_eq!(group.get_text("Short"), Some(NOT_AVAILABLE));
        assert_eq!(group.get_text("Long"), Some("long enough"));
    }

    #[test]
    fn test_reference_and_protection_fields_derived() {
        let f = fixture("CCO");
        let doc = build(&f, "CCO", &[]);
        assert_eq!(
            doc.field(SectionKey::AccidentalRelease, "Reference to Other Sections"),
            Some("See Sections 8 and 13 for exposure controls and disposal")
        );
        assert!(doc
            .field(SectionKey::ExposureControls, "Personal Protection")
            .is_some_and(|v| v.contains("gloves")));
        assert!(doc
            .field(SectionKey::Disposal, "Waste Disposal Methods")
            .is_some_and(|v| v.contains("licensed")));
        assert!(!doc
            .unresolved_fields
            .iter()
            .any(|f| f == "exposure_controls.Personal Protection"));
    }

    #[test]
    fn test_fused_values_verbatim() {
        let mut f = fixture("CCO");
        let mut partial = PartialSafetyRecord::new(Provenance::Source("NIST WebBook".into()));
        partial.insert(SectionKey::PhysicalProperties, "Boiling Point", "351.4 K (NIST)");
        partial.insert(SectionKey::HazardIdentification, "Signal Word", "Danger");
        crate::fusion::merge(&mut f.fused, &partial);

        let doc = build(&f, "CCO", &[]);
        assert_eq!(
            doc.field(SectionKey::PhysicalProperties, "Boiling Point"),
            Some("351.4 K (NIST)")
        );
        assert_eq!(doc.field(SectionKey::HazardIdentification, "Signal Word"), Some("Danger"));
        let section = doc.section(SectionKey::PhysicalProperties).unwrap();
        assert_eq!(section.data_sources[0], "NIST WebBook");
    }

    #[test]
    fn test_signal_word_derivation() {
        let benign = fixture("CCO");
        assert_eq!(signal_word(&benign.toxicity, &benign.hazards), "Warning");
        let doc = build(&benign, "CCO", &[]);
        assert_eq!(doc.field(SectionKey::HazardIdentification, "Signal Word"), Some("Warning"));

        let nitro = fixture("C[N+](=O)[O-]");
        assert_eq!(signal_word(&nitro.toxicity, &nitro.hazards), "Danger");
    }

    #[test]
    fn test_ghs_and_pictograms() {
        assert_eq!(ghs_classification(true, true), "Acute Tox. 3, Flam. Liq. 3");
        assert_eq!(ghs_classification(false, false), "Not classified");
        assert_eq!(pictograms(false, false), vec!["GHS07 (Exclamation mark)"]);
        assert_eq!(
            pictograms(true, true),
            vec!["GHS02 (Flame)", "GHS06 (Skull and crossbones)", "GHS08 (Health hazard)"]
        );
    }

    #[test]
    fn test_flammability_heuristic() {
        // Hexane: logP well above the threshold
        let f = fixture("CCCCCC");
        assert!(f.descriptors.logp > FLAMMABILITY_LOGP);
        let doc = build(&f, "CCCCCC", &[]);
        assert_eq!(doc.field(SectionKey::Transport, "UN Number"), Some("UN1993"));
        assert_eq!(
            doc.field(SectionKey::PhysicalProperties, "Flash Point"),
            Some("< 23°C (predicted)")
        );
        assert_eq!(doc.field(SectionKey::PhysicalProperties, "Physical State"), Some("Liquid"));
    }

    #[test]
    fn test_other_information_notes() {
        let f = fixture("CCO");
        let ok = build(&f, "CCO", &[]);
        let s16 = ok.section(SectionKey::OtherInformation).unwrap();
        assert_eq!(s16.notes, vec![SUCCESS_NOTE.to_string()]);
        assert!(matches!(s16.fields.get("Abbreviations"), Some(FieldValue::Group(g)) if g.len() == 15));

        let errors = vec![SourceError::new("PubChem", "timed out after 10s")];
        let degraded = build(&f, "CCO", &errors);
        let s16 = degraded.section(SectionKey::OtherInformation).unwrap();
        assert_eq!(s16.notes, vec!["PubChem: timed out after 10s".to_string()]);
        assert_eq!(degraded.source_errors, errors);
    }

    #[test]
    fn test_generative_note_and_unresolved() {
        let mut f = fixture("CCO");
        let mut generated = PartialSafetyRecord::new(Provenance::Generative);
        generated.insert(SectionKey::FireFighting, "Special Hazards", "Vapours may form explosive mixtures with air.");
        crate::fusion::merge(&mut f.fused, &generated);

        let doc = build(&f, "CCO", &[]);
        let fire = doc.section(SectionKey::FireFighting).unwrap();
        assert!(fire.notes.iter().any(|n| n == GENERATIVE_NOTE));
        assert!(fire.data_sources.iter().any(|s| s == "Generative model"));
        assert!(!doc.is_complete());
        assert!(doc.unresolved_fields.contains(&"regulatory.TSCA".to_string()));
        assert!(!doc.unresolved_fields.contains(&"fire_fighting.Special Hazards".to_string()));
    }

    #[test]
    fn test_field_map_serializes_in_order() {
        let mut map = FieldMap::new();
        map.text("b", "second");
        map.text("a", "first");
        map.text("b", "replaced");
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"b":"replaced","a":"first"}"#);
    }
}
