//! Structural hazard rules.
//!
//! A fixed, ordered table of SMARTS patterns flags reactive or unstable
//! functional groups. Matches are reported in table order.

use crate::molecule::{Molecule, Pattern};
use serde::{Serialize, Serializer};
use std::fmt;
use tracing::{debug, warn};

/// Incompatible materials for categories missing from the lookup table.
pub const GENERIC_INCOMPATIBLES: &str = "Strong oxidizers, acids, bases";

/// Hazard category attached to a structural rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HazardCategory {
    Explosive,
    Unstable,
    Reactive,
    Pyrophoric,
    Basic,
    Corrosive,
    Hydrolysis,
    Polymerizable,
    Tautomer,
    /// Category introduced by a custom rule set
    Other(&'static str),
}

impl HazardCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            HazardCategory::Explosive => "Explosive",
            HazardCategory::Unstable => "Unstable",
            HazardCategory::Reactive => "Reactive",
            HazardCategory::Pyrophoric => "Pyrophoric",
            HazardCategory::Basic => "Basic",
            HazardCategory::Corrosive => "Corrosive",
            HazardCategory::Hydrolysis => "Hydrolysis",
            HazardCategory::Polymerizable => "Polymerizable",
            HazardCategory::Tautomer => "Tautomer",
            HazardCategory::Other(name) => *name,
        }
    }

    /// Materials this category should be kept away from.
    pub fn incompatible_materials(&self) -> &'static str {
        match self {
            HazardCategory::Explosive => "Strong acids, bases, reducing agents, heat, shock, friction",
            HazardCategory::Unstable => "Heat, light, friction, contaminants, metal ions",
            HazardCategory::Reactive => "Water, alcohols, amines, oxidizers",
            HazardCategory::Pyrophoric => "Air, moisture, oxidizers",
            HazardCategory::Basic => "Strong acids, acid chlorides, oxidizing agents",
            HazardCategory::Corrosive => "Metals, bases, organic materials",
            HazardCategory::Hydrolysis => "Water, moisture, humid conditions",
            HazardCategory::Polymerizable => "Heat, light, peroxides, radical initiators",
            HazardCategory::Tautomer => "Strong bases, acids, heat",
            HazardCategory::Other(_) => GENERIC_INCOMPATIBLES,
        }
    }

    /// Categories that raise the toxicity score and force a "Danger" signal word.
    pub fn is_severe(&self) -> bool {
        matches!(
            self,
            HazardCategory::Explosive | HazardCategory::Unstable | HazardCategory::Corrosive
        )
    }
}

impl fmt::Display for HazardCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for HazardCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One matched functional group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuralHazard {
    pub functional_group: String,
    pub category: HazardCategory,
    pub description: String,
    pub caution: String,
}

/// Rule definition: (SMARTS, category, functional group, description).
pub type RuleSpec = (&'static str, HazardCategory, &'static str, &'static str);

pub const STANDARD_RULES: &[RuleSpec] = &[
    ("[O-][N+](=O)[O]", HazardCategory::Explosive, "Nitrate ester", "Potentially explosive nitrate ester"),
    ("[N+]([O-])=O", HazardCategory::Explosive, "Nitro group", "Nitro compounds may be shock or heat sensitive"),
    ("[O]~[O]", HazardCategory::Unstable, "Peroxide", "Peroxides may decompose violently"),
    ("[F,Cl,Br,I][C;!$(C=O)]", HazardCategory::Hydrolysis, "Alkyl halide", "Alkyl halides may hydrolyze to release acid"),
    ("C(=O)Cl", HazardCategory::Reactive, "Acid chloride", "Acid chlorides react violently with water"),
    ("[C,Si]-[Li,Na,K]", HazardCategory::Pyrophoric, "Organometallic", "May ignite spontaneously in air"),
    ("[N]", HazardCategory::Basic, "Amine", "Basic nitrogen; reacts with acids"),
    ("[C](=[O])[OH]", HazardCategory::Corrosive, "Carboxylic acid", "Acidic; may be corrosive"),
    ("[N]~[N]", HazardCategory::Unstable, "Hydrazine/azo", "Nitrogen-nitrogen bonds may be unstable"),
    ("[S](=O)(=O)[OH]", HazardCategory::Corrosive, "Sulfonic acid", "Strong acid; corrosive"),
    ("[P](=[O])([OH])[OH]", HazardCategory::Reactive, "Phosphonic acid", "Acidic phosphorus compound"),
    ("[C]=O.[OH]", HazardCategory::Tautomer, "Carbonyl with hydroxyl", "May undergo tautomerization"),
    ("[C]=[C]", HazardCategory::Polymerizable, "Alkene", "Unsaturated bond may polymerize"),
    ("[C]#[C]", HazardCategory::Polymerizable, "Alkyne", "Triple bond may polymerize or decompose"),
    ("[OH][OH]", HazardCategory::Unstable, "Hydrogen peroxide-like diol", "Adjacent hydroxyls may be unstable"),
    ("[S][S]", HazardCategory::Reactive, "Disulfide", "Disulfide bonds may cleave under reducing conditions"),
];

struct CompiledRule {
    pattern: Pattern,
    category: HazardCategory,
    functional_group: &'static str,
    description: &'static str,
}

/// Ordered set of compiled rules.
pub struct HazardRuleSet {
    rules: Vec<CompiledRule>,
}

impl HazardRuleSet {
    /// Compile `specs`; patterns that fail to compile are logged and skipped.
    pub fn new(specs: &[RuleSpec]) -> Self {
        let rules = specs
            .iter()
            .filter_map(|(smarts, category, group, description)| match Pattern::compile(smarts) {
                Ok(pattern) => Some(CompiledRule {
                    pattern,
                    category: *category,
                    functional_group: *group,
                    description: *description,
                }),
                Err(e) => {
                    warn!(smarts = %smarts, error = %e, "Skipping hazard rule with invalid pattern");
                    None
                }
            })
            .collect();
        Self { rules }
    }

    /// The built-in rule table.
    pub fn standard() -> Self {
        Self::new(STANDARD_RULES)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate every rule against `mol`, in table order.
    pub fn scan(&self, mol: &Molecule) -> Vec<StructuralHazard> {
        let hazards: Vec<StructuralHazard> = self
            .rules
            .iter()
            .filter(|rule| rule.pattern.is_match(mol))
            .map(|rule| StructuralHazard {
                functional_group: rule.functional_group.to_string(),
                category: rule.category,
                description: rule.description.to_string(),
                caution: format!("May react with: {}", rule.category.incompatible_materials()),
            })
            .collect();
        debug!(
            smiles = %mol.source(),
            count = hazards.len(),
            "Structural hazard scan complete"
        );
        hazards
    }
}

impl Default for HazardRuleSet {
    fn default() -> Self {
        Self::standard()
    }
}

/// Distinct incompatible-material strings for a hazard list, joined with "; ".
pub fn incompatibles_for(hazards: &[StructuralHazard]) -> String {
    let mut seen: Vec<&str> = Vec::new();
    for hazard in hazards {
        let text = hazard.category.incompatible_materials();
        if !seen.contains(&text) {
            seen.push(text);
        }
    }
    if seen.is_empty() {
        GENERIC_INCOMPATIBLES.to_string()
    } else {
        seen.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molecule::parse_smiles;

    fn categories(smiles: &str) -> Vec<HazardCategory> {
        HazardRuleSet::standard()
            .scan(&parse_smiles(smiles).unwrap())
            .into_iter()
            .map(|h| h.category)
            .collect()
    }

    #[test]
    fn test_all_standard_rules_compile() {
        assert_eq!(HazardRuleSet::standard().len(), STANDARD_RULES.len());
    }

    #[test]
    fn test_invalid_rule_is_skipped() {
        let specs: &[RuleSpec] = &[
            ("[C", HazardCategory::Reactive, "Broken", "never compiles"),
            ("[C]#[C]", HazardCategory::Polymerizable, "Alkyne", "ok"),
        ];
        let rules = HazardRuleSet::new(specs);
        assert_eq!(rules.len(), 1);
        let hits = rules.scan(&parse_smiles("CC#C").unwrap());
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_nitromethane() {
        let cats = categories("C[N+](=O)[O-]");
        assert_eq!(cats[0], HazardCategory::Explosive);
        assert!(cats.contains(&HazardCategory::Basic));
    }

    #[test]
    fn test_acetic_acid_in_table_order() {
        assert_eq!(
            categories("CC(=O)O"),
            vec![HazardCategory::Corrosive, HazardCategory::Tautomer]
        );
    }

    #[test]
    fn test_acid_chloride_not_alkyl_halide() {
        let cats = categories("CC(=O)Cl");
        assert!(cats.contains(&HazardCategory::Reactive));
        assert!(!cats.contains(&HazardCategory::Hydrolysis));
    }

    #[test]
    fn test_benzene_has_no_alkene_hazard() {
        assert!(categories("c1ccccc1").is_empty());
        assert!(categories("C1=CC=CC=C1").is_empty());
    }

    #[test]
    fn test_scan_is_deterministic() {
        let rules = HazardRuleSet::standard();
        let mol = parse_smiles("C=CC(=O)OCCCl").unwrap();
        assert_eq!(rules.scan(&mol), rules.scan(&mol));
    }

    #[test]
    fn test_caution_and_fallback_text() {
        let hazards = HazardRuleSet::standard().scan(&parse_smiles("CC#C").unwrap());
        assert_eq!(
            hazards[0].caution,
            "May react with: Heat, light, peroxides, radical initiators"
        );
        assert_eq!(
            HazardCategory::Other("Lachrymator").incompatible_materials(),
            GENERIC_INCOMPATIBLES
        );
        assert_eq!(incompatibles_for(&[]), GENERIC_INCOMPATIBLES);
    }
}
