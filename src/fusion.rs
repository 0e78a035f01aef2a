//! Non-destructive merging of contributions into a [`SafetyRecord`].
//!
//! A field is written only while it is still unknown and only with a value
//! that passes [`is_valid_value`]. Contributions are merged in a fixed
//! priority order by a single owner, so the first valid contributor for a
//! field always wins regardless of arrival order.
//!
//! Besides the merge itself this module derives the two rule-based
//! contributions: stability, reactivity and first aid from structural
//! hazards, and environmental fate, exposure limits and transport
//! classification from predicted properties.

use crate::config::PipelineConfig;
use crate::hazards::{HazardCategory, StructuralHazard};
use crate::molecule::Descriptors;
use crate::schema::{PartialSafetyRecord, Provenance, SafetyRecord, SectionKey, Value, NOT_AVAILABLE};
use crate::toxicity::{ToxicityAssessment, ToxicityClass};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// Substrings that mark scraped or generated text as junk.
pub const JUNK_MARKERS: &[&str] = &[
    "not found",
    "no data",
    "unknown",
    "error",
    "invalid",
    "loading",
    "please wait",
    "404",
    "access denied",
];

const DEFAULT_MIN_LEN: usize = 3;
const DEFAULT_MAX_LEN: usize = 500;

static FLASH_POINT_CELSIUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(-?\d+(?:\.\d+)?)\s*°\s*C").expect("valid regex"));

/// Substantive-value check with the default minimum length.
pub fn is_valid_value(value: &str) -> bool {
    is_valid_value_with(value, DEFAULT_MIN_LEN)
}

pub fn is_valid_value_with(value: &str, min_len: usize) -> bool {
    let trimmed = value.trim();
    if trimmed.chars().count() < min_len || trimmed.eq_ignore_ascii_case(NOT_AVAILABLE) {
        return false;
    }
    let lower = trimmed.to_lowercase();
    !JUNK_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Outcome of one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Values written into unknown fields
    pub admitted: usize,
    /// Values dropped because the field was already resolved
    pub already_known: usize,
    /// Values dropped by the validity filter
    pub rejected: usize,
}

/// Merge and final-validation rules with configurable thresholds.
#[derive(Debug, Clone, Copy)]
pub struct FusionEngine {
    min_value_len: usize,
    max_value_len: usize,
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self {
            min_value_len: DEFAULT_MIN_LEN,
            max_value_len: DEFAULT_MAX_LEN,
        }
    }
}

impl FusionEngine {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            min_value_len: config.min_value_len,
            max_value_len: config.max_value_len,
        }
    }

    pub fn is_valid(&self, value: &str) -> bool {
        is_valid_value_with(value, self.min_value_len)
    }

    /// Write each valid contribution value into a still-unknown field.
    pub fn merge(&self, record: &mut SafetyRecord, contribution: &PartialSafetyRecord) -> MergeReport {
        let mut report = MergeReport::default();
        for (key, value) in contribution.entries() {
            let Some(slot) = record.slot_mut(*key) else {
                continue;
            };
            if slot.value.is_known() {
                report.already_known += 1;
                continue;
            }
            if !self.is_valid(value) {
                debug!(field = %key, source = %contribution.provenance(), "Rejected invalid value");
                report.rejected += 1;
                continue;
            }
            slot.value = Value::known(value.trim());
            slot.provenance = Some(contribution.provenance().clone());
            report.admitted += 1;
        }
        debug!(
            source = %contribution.provenance(),
            admitted = report.admitted,
            already_known = report.already_known,
            rejected = report.rejected,
            "Merged contribution"
        );
        report
    }

    /// Re-apply the validity filter to every field, trim, and truncate long
    /// values. Returns the number of values reset to unknown.
    pub fn finalize(&self, record: &mut SafetyRecord) -> usize {
        let mut reset = 0;
        for (key, slot) in record.iter_mut() {
            let Value::Known(text) = &slot.value else {
                continue;
            };
            if !self.is_valid(text) {
                debug!(field = %key, "Final validation reset value");
                slot.value = Value::Unknown;
                slot.provenance = None;
                reset += 1;
                continue;
            }
            let cleaned = truncate(text.trim(), self.max_value_len);
            slot.value = Value::Known(cleaned);
        }
        reset
    }
}

/// Merge with default thresholds.
pub fn merge(record: &mut SafetyRecord, contribution: &PartialSafetyRecord) -> MergeReport {
    FusionEngine::default().merge(record, contribution)
}

/// Cut to `max` characters including a trailing "...".
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

fn push_distinct(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|existing| existing == item) {
        list.push(item.to_string());
    }
}

fn has(hazards: &[StructuralHazard], categories: &[HazardCategory]) -> bool {
    hazards.iter().any(|h| categories.contains(&h.category))
}

/// Stability, reactivity and first-aid text derived from structural hazards.
///
/// Inhalation advice is left to the fallback table and generative backfill.
pub fn structural_contribution(
    hazards: &[StructuralHazard],
    descriptors: &Descriptors,
) -> PartialSafetyRecord {
    use HazardCategory::*;
    use SectionKey::{FirstAid, StabilityReactivity as Sr};

    let mut out = PartialSafetyRecord::new(Provenance::StructuralRules);

    if hazards.is_empty() {
        out.insert(Sr, "Stability", "Stable under normal conditions");
        out.insert(Sr, "Reactivity", "No highly reactive groups detected");
        out.insert(Sr, "Chemical Stability", "Stable under recommended storage conditions");
    } else {
        let stability = if has(hazards, &[Unstable, Explosive]) {
            "Unstable - may decompose under heat, light, or shock"
        } else {
            "Stable under normal conditions"
        };
        out.insert(Sr, "Stability", stability);

        let descriptions: Vec<&str> = hazards.iter().map(|h| h.description.as_str()).collect();
        out.insert(Sr, "Reactivity", descriptions.join("; "));

        let chemical = if has(hazards, &[Unstable]) {
            "May be chemically unstable under certain conditions"
        } else {
            "Stable under recommended storage conditions"
        };
        out.insert(Sr, "Chemical Stability", chemical);

        let mut conditions = Vec::new();
        if has(hazards, &[Unstable, Explosive]) {
            push_distinct(&mut conditions, "Heat, light, friction, shock");
        }
        if has(hazards, &[Reactive, Pyrophoric]) {
            push_distinct(&mut conditions, "Moisture, air exposure");
        }
        if has(hazards, &[Polymerizable]) {
            push_distinct(&mut conditions, "Heat, light, radical initiators");
        }
        let conditions = if conditions.is_empty() {
            "Extreme temperatures, ignition sources".to_string()
        } else {
            conditions.join(", ")
        };
        out.insert(Sr, "Conditions to Avoid", conditions);

        let mut incompatible = Vec::new();
        for hazard in hazards {
            for item in hazard.category.incompatible_materials().split(", ") {
                push_distinct(&mut incompatible, item);
            }
        }
        out.insert(Sr, "Incompatible Materials", incompatible.join(", "));

        let mut products = Vec::new();
        for hazard in hazards {
            let desc = hazard.description.to_lowercase();
            if desc.contains("nitro") || desc.contains("nitrate") {
                push_distinct(&mut products, "Nitrogen oxides (NOx, toxic fumes)");
            }
            if desc.contains("peroxide") {
                push_distinct(&mut products, "Oxygen gas, free radicals");
            }
            if desc.contains("acid") {
                push_distinct(&mut products, "Carbon monoxide, carbon dioxide");
            }
            if desc.contains("halide") {
                push_distinct(&mut products, "Hydrogen halides (corrosive gases)");
            }
            if desc.contains("sulfur") || desc.contains("disulfide") {
                push_distinct(&mut products, "Sulfur oxides (SOx)");
            }
        }
        let products = if products.is_empty() {
            "Carbon monoxide, carbon dioxide".to_string()
        } else {
            products.join(", ")
        };
        out.insert(Sr, "Hazardous Decomposition", products);

        let polymerization = if has(hazards, &[Polymerizable]) {
            "May polymerize exothermically if contaminated or heated"
        } else {
            "Will not occur under normal conditions"
        };
        out.insert(Sr, "Hazardous Polymerization", polymerization);
        out.insert(
            Sr,
            "Possibility of Hazardous Reactions",
            format!("Yes - {} reactive functional groups identified", hazards.len()),
        );
    }

    let logp = descriptors.logp;
    let corrosive = has(hazards, &[Corrosive]);
    let corrosive_or_reactive = has(hazards, &[Corrosive, Reactive]);

    let skin = if logp > 3.0 {
        "Remove contaminated clothing immediately. Wash skin thoroughly with soap and water for at least 15 minutes. May be readily absorbed through skin; seek medical attention."
    } else if corrosive {
        "Remove contaminated clothing. Flush skin with large amounts of water for at least 15 minutes. Get medical attention immediately."
    } else {
        "Remove contaminated clothing. Wash with soap and water. If irritation persists, seek medical attention."
    };
    out.insert(FirstAid, "Skin Contact", skin);

    let eye = if corrosive_or_reactive {
        "Flush eyes with clean water for at least 15 minutes, lifting eyelids occasionally. Remove contact lenses if present. Get immediate medical attention."
    } else {
        "Flush eyes with water for at least 15 minutes. If irritation persists, seek medical attention."
    };
    out.insert(FirstAid, "Eye Contact", eye);

    let ingestion = if descriptors.molecular_weight < 300.0 && logp < 2.0 {
        "Do NOT induce vomiting. Rinse mouth with water. Drink large amounts of water. Get medical attention immediately."
    } else if corrosive_or_reactive {
        "Do NOT induce vomiting or give anything by mouth. Rinse mouth if conscious. Get immediate medical attention."
    } else {
        "If conscious and alert, rinse mouth and drink water. Do not induce vomiting unless directed by medical personnel. Seek medical attention."
    };
    out.insert(FirstAid, "Ingestion", ingestion);

    let mut symptoms = Vec::new();
    if corrosive {
        symptoms.push("Burns to skin, eyes, and mucous membranes");
    }
    if has(hazards, &[Basic]) {
        symptoms.push("Respiratory irritation");
    }
    if logp > 4.0 {
        symptoms.push("Central nervous system depression");
    }
    let symptoms = if symptoms.is_empty() {
        "Irritation to eyes, skin, and respiratory tract".to_string()
    } else {
        symptoms.join("; ")
    };
    out.insert(FirstAid, "Most Important Symptoms", symptoms);

    let mut notes = Vec::new();
    if has(hazards, &[Explosive, Unstable]) {
        notes.push("Compound may be unstable; handle contaminated materials carefully");
    }
    if logp > 3.0 {
        notes.push("High lipophilicity; may cause systemic toxicity");
    }
    let notes = if notes.is_empty() {
        "Treat symptomatically".to_string()
    } else {
        notes.join("; ")
    };
    out.insert(FirstAid, "Notes to Physician", notes);

    out
}

/// Environmental fate, exposure limits and transport classification
/// predicted from descriptors, toxicity class and hazards.
///
/// `flash_point` is the already-fused flash point, if any.
pub fn prediction_contribution(
    toxicity: &ToxicityAssessment,
    descriptors: &Descriptors,
    hazards: &[StructuralHazard],
    flash_point: Option<&str>,
) -> PartialSafetyRecord {
    let mut out = PartialSafetyRecord::new(Provenance::PropertyPrediction);
    environmental_fate(&mut out, descriptors);
    exposure_limits(&mut out, toxicity.class, descriptors);
    transport_classification(&mut out, hazards, flash_point);
    out
}

fn environmental_fate(out: &mut PartialSafetyRecord, d: &Descriptors) {
    let (mw, logp) = (d.molecular_weight, d.logp);
    let biodegradability = if mw < 500.0 && logp < 4.0 {
        "Readily biodegradable (predicted)"
    } else if mw > 1000.0 || logp > 6.0 {
        "Not readily biodegradable (predicted)"
    } else {
        "Potentially biodegradable (predicted)"
    };
    let bioaccumulation = if logp > 3.0 {
        "High potential for bioaccumulation"
    } else if logp > 2.0 {
        "Moderate potential for bioaccumulation"
    } else {
        "Low potential for bioaccumulation"
    };
    let mobility = if logp < 2.0 {
        "High mobility in soil/water"
    } else if logp < 4.0 {
        "Moderate mobility in soil"
    } else {
        "Low mobility, tends to adsorb to sediments"
    };
    out.insert(SectionKey::Ecological, "Biodegradability", biodegradability);
    out.insert(SectionKey::Ecological, "Bioaccumulation", bioaccumulation);
    out.insert(SectionKey::Ecological, "Mobility in Soil", mobility);
}

fn exposure_limits(out: &mut PartialSafetyRecord, class: ToxicityClass, d: &Descriptors) {
    use SectionKey::ExposureControls as Ec;

    let (twa, stel) = match class {
        ToxicityClass::ExtremelyHigh => ("0.01 mg/m³ (predicted)", "0.03 mg/m³ (predicted)"),
        ToxicityClass::VeryHigh => ("0.1 mg/m³ (predicted)", "0.3 mg/m³ (predicted)"),
        ToxicityClass::High => ("1 mg/m³ (predicted)", "3 mg/m³ (predicted)"),
        ToxicityClass::Moderate => ("10 mg/m³ (predicted)", "20 mg/m³ (predicted)"),
        ToxicityClass::Low => ("Not established", "Not established"),
    };

    // Small molecules without H-bond donors are treated as volatile.
    let volatile = d.molecular_weight < 200.0 && d.h_bond_donors == 0;
    let engineering = if volatile {
        "Use in well-ventilated area or fume hood. Local exhaust ventilation recommended."
    } else if class >= ToxicityClass::VeryHigh {
        "Use in enclosed system or under local exhaust ventilation. Avoid dust formation."
    } else {
        "Good general ventilation should be sufficient."
    };
    let respiratory = if class == ToxicityClass::Low {
        "Not normally required"
    } else {
        "NIOSH approved respirator if exposure limits exceeded"
    };

    out.insert(Ec, "TLV-TWA", twa);
    out.insert(Ec, "TLV-STEL", stel);
    out.insert(Ec, "Engineering Controls", engineering);
    out.insert(Ec, "Respiratory Protection", respiratory);
    out.insert(Ec, "Eye Protection", "Chemical safety goggles recommended");
    out.insert(Ec, "Skin Protection", "Chemical resistant gloves recommended");
}

/// Leading Celsius value of a flash point string.
pub fn parse_flash_point(text: &str) -> Option<f64> {
    FLASH_POINT_CELSIUS
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn transport_classification(
    out: &mut PartialSafetyRecord,
    hazards: &[StructuralHazard],
    flash_point: Option<&str>,
) {
    use SectionKey::Transport as T;

    if has(hazards, &[HazardCategory::Explosive]) {
        out.insert(T, "Transport Hazard Class", "Class 1 (Explosives)");
        out.insert(T, "Packing Group", "I, II, or III (depends on explosive type)");
        out.insert(T, "UN Proper Shipping Name", "EXPLOSIVE SUBSTANCE, N.O.S.");
        return;
    }
    if has(hazards, &[HazardCategory::Corrosive]) {
        out.insert(T, "Transport Hazard Class", "Class 8 (Corrosive)");
        out.insert(T, "Packing Group", "II or III (depends on corrosivity)");
        out.insert(T, "UN Proper Shipping Name", "CORROSIVE SOLID, N.O.S.");
        return;
    }
    match flash_point.and_then(parse_flash_point) {
        Some(fp) if fp < 23.0 => {
            out.insert(T, "Transport Hazard Class", "Class 3 (Flammable Liquid)");
            out.insert(T, "Packing Group", "I or II");
            out.insert(T, "UN Proper Shipping Name", "FLAMMABLE LIQUID, N.O.S.");
        }
        Some(fp) if fp < 60.0 => {
            out.insert(T, "Transport Hazard Class", "Class 3 (Flammable Liquid)");
            out.insert(T, "Packing Group", "III");
            out.insert(T, "UN Proper Shipping Name", "FLAMMABLE LIQUID, N.O.S.");
        }
        _ => {
            out.insert(T, "Transport Hazard Class", "Not classified as dangerous goods (predicted)");
            out.insert(T, "UN Number", "Not applicable");
            out.insert(T, "Packing Group", "Not applicable");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hazards::HazardRuleSet;
    use crate::molecule::parse_smiles;
    use crate::schema::FieldKey;
    use crate::toxicity;

    fn analyse(smiles: &str) -> (Descriptors, Vec<StructuralHazard>, ToxicityAssessment) {
        let mol = parse_smiles(smiles).unwrap();
        let d = Descriptors::compute(&mol);
        let hazards = HazardRuleSet::standard().scan(&mol);
        let tox = toxicity::predict(&mol, &d, &hazards);
        (d, hazards, tox)
    }

    fn source(name: &str, entries: &[(SectionKey, &str, &str)]) -> PartialSafetyRecord {
        let mut partial = PartialSafetyRecord::new(Provenance::Source(name.into()));
        for (section, field, value) in entries {
            partial.insert(*section, field, *value);
        }
        partial
    }

    #[test]
    fn test_is_valid_value() {
        assert!(is_valid_value("Stable"));
        assert!(!is_valid_value("  ab "));
        assert!(!is_valid_value("not available"));
        assert!(!is_valid_value("Error 404: page missing"));
        assert!(!is_valid_value("Loading..."));
        assert!(!is_valid_value("ACCESS DENIED"));
        assert!(is_valid_value("Not applicable"));
    }

    #[test]
    fn test_first_valid_contribution_wins() {
        let mut record = SafetyRecord::new();
        let a = source("PubChem", &[(SectionKey::PhysicalProperties, "Density", "1.05 g/cm3")]);
        let b = source("NIST", &[(SectionKey::PhysicalProperties, "Density", "1.10 g/cm3")]);
        assert_eq!(merge(&mut record, &a).admitted, 1);
        let report = merge(&mut record, &b);
        assert_eq!(report.already_known, 1);
        assert_eq!(record.text(SectionKey::PhysicalProperties, "Density"), Some("1.05 g/cm3"));
        let key = FieldKey::resolve(SectionKey::PhysicalProperties, "Density").unwrap();
        assert_eq!(
            record.slot(key).unwrap().provenance,
            Some(Provenance::Source("PubChem".into()))
        );
    }

    #[test]
    fn test_invalid_value_leaves_field_open() {
        let mut record = SafetyRecord::new();
        let junk = source("ECHA", &[(SectionKey::HazardIdentification, "Signal Word", "Page not found")]);
        let good = source("NIST", &[(SectionKey::HazardIdentification, "Signal Word", "Danger")]);
        assert_eq!(merge(&mut record, &junk).rejected, 1);
        merge(&mut record, &good);
        assert_eq!(record.text(SectionKey::HazardIdentification, "Signal Word"), Some("Danger"));
    }

    #[test]
    fn test_merged_values_are_trimmed() {
        let mut record = SafetyRecord::new();
        merge(&mut record, &source("X", &[(SectionKey::Disposal, "Disposal Method", "  Incinerate  ")]));
        assert_eq!(record.text(SectionKey::Disposal, "Disposal Method"), Some("Incinerate"));
    }

    #[test]
    fn test_finalize_truncates_and_resets() {
        let mut record = SafetyRecord::new();
        let long = "x".repeat(800);
        let key = FieldKey::resolve(SectionKey::Ecological, "Ecotoxicity").unwrap();
        let slot = record.slot_mut(key).unwrap();
        slot.value = Value::known(long);
        let bad = FieldKey::resolve(SectionKey::Ecological, "Persistence").unwrap();
        record.slot_mut(bad).unwrap().value = Value::known("unknown");

        let engine = FusionEngine::default();
        assert_eq!(engine.finalize(&mut record), 1);
        let text = record.get(key).as_known().unwrap();
        assert_eq!(text.chars().count(), 500);
        assert!(text.ends_with("..."));
        assert_eq!(record.get(bad), &Value::Unknown);
    }

    #[test]
    fn test_structural_contribution_without_hazards() {
        let (d, hazards, _) = analyse("CCCC");
        assert!(hazards.is_empty());
        let partial = structural_contribution(&hazards, &d);
        assert_eq!(
            partial.get(SectionKey::StabilityReactivity, "Reactivity"),
            Some("No highly reactive groups detected")
        );
        assert!(partial.get(SectionKey::StabilityReactivity, "Conditions to Avoid").is_none());
        assert!(partial.get(SectionKey::FirstAid, "Inhalation").is_none());
    }

    #[test]
    fn test_structural_contribution_for_nitro() {
        let (d, hazards, _) = analyse("c1ccccc1[N+](=O)[O-]");
        let partial = structural_contribution(&hazards, &d);
        assert!(partial
            .get(SectionKey::StabilityReactivity, "Stability")
            .unwrap()
            .starts_with("Unstable"));
        assert!(partial
            .get(SectionKey::StabilityReactivity, "Hazardous Decomposition")
            .unwrap()
            .contains("Nitrogen oxides"));
        assert_eq!(
            partial.get(SectionKey::FirstAid, "Most Important Symptoms"),
            Some("Respiratory irritation")
        );
    }

    #[test]
    fn test_prediction_contribution() {
        let (d, hazards, tox) = analyse("CCO");
        let partial = prediction_contribution(&tox, &d, &hazards, Some("13 °C (55 °F)"));
        assert_eq!(partial.get(SectionKey::ExposureControls, "TLV-TWA"), Some("Not established"));
        assert_eq!(partial.get(SectionKey::Transport, "Packing Group"), Some("I or II"));
        assert_eq!(
            partial.get(SectionKey::Ecological, "Mobility in Soil"),
            Some("High mobility in soil/water")
        );

        let (d, hazards, tox) = analyse("CC(=O)O");
        let partial = prediction_contribution(&tox, &d, &hazards, None);
        assert_eq!(
            partial.get(SectionKey::Transport, "Transport Hazard Class"),
            Some("Class 8 (Corrosive)")
        );
    }

    #[test]
    fn test_parse_flash_point() {
        assert_eq!(parse_flash_point("-20 °C"), Some(-20.0));
        assert_eq!(parse_flash_point("Flash point 12.5°C closed cup"), Some(12.5));
        assert_eq!(parse_flash_point("55 °F"), None);
    }
}
