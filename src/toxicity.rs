//! Rule-based toxicity prediction.
//!
//! Structural flags and descriptors accumulate an integer score which selects
//! one of five ordered classes. The function is pure and total for any
//! parsed structure.

use crate::hazards::{HazardCategory, StructuralHazard};
use crate::molecule::{Descriptors, Molecule};
use serde::Serialize;
use std::fmt;

const HEAVY_METALS: [&str; 4] = ["Hg", "Pb", "Cd", "Co"];
const HALOGENS: [&str; 4] = ["F", "Cl", "Br", "I"];

/// Severity classes, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ToxicityClass {
    Low,
    Moderate,
    High,
    VeryHigh,
    ExtremelyHigh,
}

impl ToxicityClass {
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 6 => ToxicityClass::ExtremelyHigh,
            5 => ToxicityClass::VeryHigh,
            3 | 4 => ToxicityClass::High,
            1 | 2 => ToxicityClass::Moderate,
            _ => ToxicityClass::Low,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ToxicityClass::ExtremelyHigh => "Class I (Extremely High)",
            ToxicityClass::VeryHigh => "Class I (Very High)",
            ToxicityClass::High => "Class II (High)",
            ToxicityClass::Moderate => "Class III (Moderate)",
            ToxicityClass::Low => "Class IV (Low)",
        }
    }

    /// Illustrative oral LD50 range.
    pub fn ld50_range(&self) -> &'static str {
        match self {
            ToxicityClass::ExtremelyHigh => "1-5 mg/kg",
            ToxicityClass::VeryHigh => "5-50 mg/kg",
            ToxicityClass::High => "50-500 mg/kg",
            ToxicityClass::Moderate => "500-2000 mg/kg",
            ToxicityClass::Low => ">2000 mg/kg",
        }
    }

    /// Illustrative inhalation LC50 range.
    pub fn lc50_range(&self) -> &'static str {
        match self {
            ToxicityClass::ExtremelyHigh => "1-10 mg/m³",
            ToxicityClass::VeryHigh => "10-100 mg/m³",
            ToxicityClass::High => "100-1000 mg/m³",
            ToxicityClass::Moderate => "1000-5000 mg/m³",
            ToxicityClass::Low => ">5000 mg/m³",
        }
    }

    /// Class I or II.
    pub fn is_high_severity(&self) -> bool {
        *self >= ToxicityClass::High
    }
}

impl fmt::Display for ToxicityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Boolean structural and property flags feeding the score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToxicityFlags {
    pub charged_nitro: bool,
    pub aromatic_amine: bool,
    pub halogen: bool,
    pub heavy_metal: bool,
    /// logP > 5
    pub very_lipophilic: bool,
    /// logP > 3
    pub lipophilic: bool,
    /// MW > 500
    pub high_mw: bool,
    /// TPSA < 60
    pub low_tpsa: bool,
    pub explosive_hazard: bool,
    pub corrosive_hazard: bool,
    /// Any Explosive, Unstable or Corrosive structural hazard
    pub severe_hazard: bool,
}

impl ToxicityFlags {
    pub fn detect(mol: &Molecule, descriptors: &Descriptors, hazards: &[StructuralHazard]) -> Self {
        let atoms = mol.atoms();
        Self {
            charged_nitro: atoms.iter().any(|a| a.is("N") && a.charge == 1),
            aromatic_amine: atoms.iter().any(|a| a.is("N") && a.aromatic),
            halogen: atoms.iter().any(|a| HALOGENS.contains(&a.symbol())),
            heavy_metal: atoms.iter().any(|a| HEAVY_METALS.contains(&a.symbol())),
            very_lipophilic: descriptors.logp > 5.0,
            lipophilic: descriptors.logp > 3.0,
            high_mw: descriptors.molecular_weight > 500.0,
            low_tpsa: descriptors.tpsa < 60.0,
            explosive_hazard: hazards.iter().any(|h| h.category == HazardCategory::Explosive),
            corrosive_hazard: hazards.iter().any(|h| h.category == HazardCategory::Corrosive),
            severe_hazard: hazards.iter().any(|h| h.category.is_severe()),
        }
    }

    pub(crate) fn score(&self) -> u32 {
        let weights = [
            (self.charged_nitro, 3),
            (self.aromatic_amine, 2),
            (self.halogen, 1),
            (self.heavy_metal, 4),
            (self.very_lipophilic, 2),
            (self.high_mw, 1),
            (self.severe_hazard, 2),
        ];
        weights.iter().filter(|(set, _)| *set).map(|(_, w)| w).sum()
    }

    fn structural_alerts(&self) -> usize {
        [self.charged_nitro, self.aromatic_amine, self.halogen, self.heavy_metal]
            .iter()
            .filter(|f| **f)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToxicityAssessment {
    pub class: ToxicityClass,
    pub ld50_range: &'static str,
    pub lc50_inhalation: &'static str,
    pub target_organs: Vec<String>,
    pub endpoints: Vec<String>,
    pub structural_alerts: usize,
    pub confidence: Confidence,
    #[serde(skip)]
    score: u32,
}

impl ToxicityAssessment {
    pub(crate) fn score(&self) -> u32 {
        self.score
    }
}

fn push_unique(list: &mut Vec<String>, items: &[&str]) {
    for item in items {
        if !list.iter().any(|existing| existing == item) {
            list.push(item.to_string());
        }
    }
}

/// Assess toxicity from precomputed flags.
pub fn assess(flags: &ToxicityFlags) -> ToxicityAssessment {
    let score = flags.score();
    let class = ToxicityClass::from_score(score);

    let mut organs = Vec::new();
    if flags.charged_nitro || flags.aromatic_amine {
        push_unique(&mut organs, &["Liver", "Blood"]);
    }
    if flags.heavy_metal {
        push_unique(&mut organs, &["Kidneys", "CNS", "Blood"]);
    }
    if flags.lipophilic {
        push_unique(&mut organs, &["CNS"]);
    }
    if flags.low_tpsa {
        push_unique(&mut organs, &["Brain"]);
    }
    if flags.corrosive_hazard {
        push_unique(&mut organs, &["Skin", "Eyes", "Respiratory tract"]);
    }
    if organs.is_empty() {
        organs.push("Not specified".to_string());
    }

    let mut endpoints = Vec::new();
    if flags.charged_nitro {
        push_unique(&mut endpoints, &["Hepatotoxicity", "Methemoglobinemia"]);
    }
    if flags.aromatic_amine {
        push_unique(&mut endpoints, &["Carcinogenicity"]);
    }
    if flags.halogen {
        push_unique(&mut endpoints, &["Nephrotoxicity"]);
    }
    if flags.heavy_metal {
        push_unique(&mut endpoints, &["Neurotoxicity", "Nephrotoxicity"]);
    }
    if flags.corrosive_hazard {
        push_unique(&mut endpoints, &["Skin/Eye Corrosion"]);
    }
    if flags.explosive_hazard {
        push_unique(&mut endpoints, &["Physical Explosion Hazard"]);
    }
    if endpoints.is_empty() {
        endpoints.push("None predicted".to_string());
    }

    let confidence = match score {
        s if s > 3 => Confidence::High,
        s if s > 0 => Confidence::Medium,
        _ => Confidence::Low,
    };

    ToxicityAssessment {
        class,
        ld50_range: class.ld50_range(),
        lc50_inhalation: class.lc50_range(),
        target_organs: organs,
        endpoints,
        structural_alerts: flags.structural_alerts(),
        confidence,
        score,
    }
}

/// Predict toxicity for a parsed structure.
pub fn predict(
    mol: &Molecule,
    descriptors: &Descriptors,
    hazards: &[StructuralHazard],
) -> ToxicityAssessment {
    assess(&ToxicityFlags::detect(mol, descriptors, hazards))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hazards::HazardRuleSet;
    use crate::molecule::{parse_smiles, Descriptors};
    use proptest::prelude::*;

    fn predict_smiles(smiles: &str) -> ToxicityAssessment {
        let mol = parse_smiles(smiles).unwrap();
        let descriptors = Descriptors::compute(&mol);
        let hazards = HazardRuleSet::standard().scan(&mol);
        predict(&mol, &descriptors, &hazards)
    }

    #[test]
    fn test_class_thresholds() {
        assert_eq!(ToxicityClass::from_score(0), ToxicityClass::Low);
        assert_eq!(ToxicityClass::from_score(1), ToxicityClass::Moderate);
        assert_eq!(ToxicityClass::from_score(3), ToxicityClass::High);
        assert_eq!(ToxicityClass::from_score(5), ToxicityClass::VeryHigh);
        assert_eq!(ToxicityClass::from_score(6), ToxicityClass::ExtremelyHigh);
        assert_eq!(ToxicityClass::from_score(40), ToxicityClass::ExtremelyHigh);
    }

    #[test]
    fn test_nitrobenzene() {
        let result = predict_smiles("c1ccccc1[N+](=O)[O-]");
        // nitro +3, explosive hazard +2
        assert_eq!(result.score(), 5);
        assert_eq!(result.class, ToxicityClass::VeryHigh);
        assert_eq!(result.ld50_range, "5-50 mg/kg");
        assert_eq!(result.target_organs[..2], ["Liver", "Blood"]);
        assert!(result.endpoints.contains(&"Methemoglobinemia".to_string()));
        assert!(result.endpoints.contains(&"Physical Explosion Hazard".to_string()));
    }

    #[test]
    fn test_ethanol_defaults() {
        let result = predict_smiles("CCO");
        assert_eq!(result.class, ToxicityClass::Low);
        assert_eq!(result.lc50_inhalation, ">5000 mg/m³");
        assert_eq!(result.endpoints, vec!["None predicted"]);
        assert_eq!(result.confidence, Confidence::Low);
    }

    #[test]
    fn test_heavy_metal_organs_deduplicated() {
        let result = predict_smiles("[Hg]");
        assert_eq!(result.class, ToxicityClass::High);
        let blood = result.target_organs.iter().filter(|o| *o == "Blood").count();
        assert_eq!(blood, 1);
        assert_eq!(
            result.endpoints,
            vec!["Neurotoxicity", "Nephrotoxicity"]
        );
    }

    #[test]
    fn test_score_not_serialized() {
        let json = serde_json::to_value(predict_smiles("CCO")).unwrap();
        assert!(json.get("score").is_none());
        assert_eq!(json["class"], "Low");
    }

    fn arb_flags() -> impl Strategy<Value = ToxicityFlags> {
        proptest::collection::vec(any::<bool>(), 11).prop_map(|b| ToxicityFlags {
            charged_nitro: b[0],
            aromatic_amine: b[1],
            halogen: b[2],
            heavy_metal: b[3],
            very_lipophilic: b[4],
            lipophilic: b[5],
            high_mw: b[6],
            low_tpsa: b[7],
            explosive_hazard: b[8],
            corrosive_hazard: b[9],
            severe_hazard: b[10],
        })
    }

    fn union(a: &ToxicityFlags, b: &ToxicityFlags) -> ToxicityFlags {
        ToxicityFlags {
            charged_nitro: a.charged_nitro || b.charged_nitro,
            aromatic_amine: a.aromatic_amine || b.aromatic_amine,
            halogen: a.halogen || b.halogen,
            heavy_metal: a.heavy_metal || b.heavy_metal,
            very_lipophilic: a.very_lipophilic || b.very_lipophilic,
            lipophilic: a.lipophilic || b.lipophilic,
            high_mw: a.high_mw || b.high_mw,
            low_tpsa: a.low_tpsa || b.low_tpsa,
            explosive_hazard: a.explosive_hazard || b.explosive_hazard,
            corrosive_hazard: a.corrosive_hazard || b.corrosive_hazard,
            severe_hazard: a.severe_hazard || b.severe_hazard,
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_superset_flags_never_lower_class(a in arb_flags(), b in arb_flags()) {
            let superset = union(&a, &b);
            let base = assess(&a);
            let more = assess(&superset);
            prop_assert!(more.score() >= base.score());
            prop_assert!(more.class >= base.class);
        }

        #[test]
        fn prop_assessment_is_pure(a in arb_flags()) {
            prop_assert_eq!(assess(&a), assess(&a));
        }
    }
}
