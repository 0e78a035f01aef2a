//! PubChem PUG-View adapter: maps the compound's heading tree onto schema
//! fields by keyword.

use super::{apply_keyword_rules, KeywordRule, SourceAdapter, SourceIdentity};
use crate::compound::CompoundDatabase;
use crate::error::{Result, SdsError};
use crate::schema::SectionKey::{
    Ecological as Eco, FireFighting as Fire, FirstAid as Aid, HandlingStorage as Store,
    HazardIdentification as Hazard, PhysicalProperties as Phys, Toxicological as Tox,
};
use crate::schema::{PartialSafetyRecord, Provenance};
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use tracing::debug;

pub const NAME: &str = "PubChem";

/// Heading keywords per field, evaluated in order.
pub static PUG_VIEW_RULES: &[KeywordRule] = &[
    // physical
    KeywordRule::new(&["melting point", "m.p.", "mp", "melting", "fusion"], Phys, "Melting Point"),
    KeywordRule::new(&["boiling point", "b.p.", "bp", "boiling"], Phys, "Boiling Point"),
    KeywordRule::new(&["flash point", "fp", "flash"], Phys, "Flash Point"),
    KeywordRule::new(&["density", "specific gravity"], Phys, "Density"),
    KeywordRule::new(&["solubility", "water solubility"], Phys, "Solubility in Water"),
    KeywordRule::new(&["vapor pressure", "vp"], Phys, "Vapor Pressure"),
    KeywordRule::new(&["vapor density"], Phys, "Vapor Density"),
    KeywordRule::new(&["physical description", "appearance"], Phys, "Appearance"),
    KeywordRule::new(&["color", "colour"], Phys, "Color"),
    KeywordRule::new(&["odor", "odour"], Phys, "Odor"),
    KeywordRule::new(&["ph", "acidity"], Phys, "pH"),
    KeywordRule::new(&["refractive index", "ri"], Phys, "Refractive Index"),
    KeywordRule::new(&["viscosity"], Phys, "Viscosity"),
    KeywordRule::new(&["autoignition", "auto-ignition"], Phys, "Auto-ignition Temperature"),
    KeywordRule::new(&["decomposition"], Phys, "Decomposition Temperature"),
    KeywordRule::new(&["logp", "log kow", "octanol/water"], Phys, "Partition Coefficient"),
    // toxicology
    KeywordRule::new(&["ld50"], Tox, "LD50 Oral"),
    KeywordRule::new(&["lc50"], Tox, "LC50 Inhalation"),
    KeywordRule::new(&["dermal toxicity"], Tox, "LD50 Dermal"),
    KeywordRule::new(&["carcinogen"], Tox, "Carcinogenicity"),
    KeywordRule::new(&["mutagen"], Tox, "Germ Cell Mutagenicity"),
    KeywordRule::new(&["reproductive", "teratogen"], Tox, "Reproductive Toxicity"),
    KeywordRule::new(&["skin irritation", "skin corrosion"], Tox, "Skin Corrosion"),
    KeywordRule::new(&["eye irritation", "eye damage"], Tox, "Serious Eye Damage"),
    KeywordRule::new(&["acute effects", "toxicity summary"], Tox, "Acute Toxicity"),
    // first aid
    KeywordRule::new(&["first aid"], Aid, "General First Aid"),
    KeywordRule::new(&["inhalation first aid", "inhalation"], Aid, "Inhalation"),
    KeywordRule::new(&["skin first aid", "skin contact"], Aid, "Skin Contact"),
    KeywordRule::new(&["eye first aid", "eye contact"], Aid, "Eye Contact"),
    KeywordRule::new(&["ingestion first aid", "ingestion"], Aid, "Ingestion"),
    // fire
    KeywordRule::new(&["fire fighting", "firefighting", "extinguishing"], Fire, "Extinguishing Media"),
    KeywordRule::new(&["combustion products", "hazardous combustion"], Fire, "Hazardous Combustion Products"),
    KeywordRule::new(&["fire hazard", "flammability", "explosion hazard"], Fire, "Special Hazards"),
    // handling
    KeywordRule::new(&["storage conditions", "storage"], Store, "Storage"),
    KeywordRule::new(&["safe handling", "handling", "precautions"], Store, "Handling"),
    KeywordRule::new(&["incompatible", "incompatibilities", "avoid"], Store, "Incompatible Materials"),
    // ecology
    KeywordRule::new(&["ecotoxicity", "environmental"], Eco, "Ecotoxicity"),
    KeywordRule::new(&["fish toxicity", "fish"], Eco, "LC50 Fish"),
    KeywordRule::new(&["daphnia"], Eco, "EC50 Daphnia"),
    KeywordRule::new(&["algae"], Eco, "EC50 Algae"),
    KeywordRule::new(&["biodegradation", "biodegradability"], Eco, "Biodegradability"),
    // hazard identification
    KeywordRule::new(&["ghs classification", "ghs"], Hazard, "GHS Classification"),
    KeywordRule::new(&["hazard statement"], Hazard, "Hazard Statements"),
    KeywordRule::new(&["precautionary statement"], Hazard, "Precautionary Statements"),
    KeywordRule::new(&["signal"], Hazard, "Signal Word"),
];

/// Reads the PUG-View tree for the resolved CID.
pub struct PubChemSource {
    database: Arc<dyn CompoundDatabase>,
}

impl PubChemSource {
    pub fn new(database: Arc<dyn CompoundDatabase>) -> Self {
        Self { database }
    }

    async fn fetch_impl(&self, identity: &SourceIdentity) -> Result<PartialSafetyRecord> {
        let cid = identity
            .cid
            .ok_or_else(|| SdsError::unavailable(NAME, "no PubChem CID for this compound"))?;
        let tree = self.database.detail(cid).await?;
        let partial = apply_keyword_rules(&tree, PUG_VIEW_RULES, Provenance::Source(NAME.to_string()));
        debug!(cid, fields = partial.len(), "PUG-View fields mapped");
        Ok(partial)
    }
}

impl SourceAdapter for PubChemSource {
    fn name(&self) -> &str {
        NAME
    }

    fn fetch<'a>(&'a self, identity: &'a SourceIdentity) -> BoxFuture<'a, Result<PartialSafetyRecord>> {
        self.fetch_impl(identity).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compound::CompoundHit;
    use crate::schema::FieldKey;
    use crate::sources::HeadingNode;

    #[test]
    fn test_rules_name_schema_fields() {
        for rule in PUG_VIEW_RULES {
            assert!(
                FieldKey::resolve(rule.section, rule.field).is_some(),
                "{}.{}",
                rule.section,
                rule.field
            );
        }
    }

    struct FixedTree;

    impl CompoundDatabase for FixedTree {
        fn find<'a>(&'a self, _smiles: &'a str) -> BoxFuture<'a, Result<Option<CompoundHit>>> {
            async { Ok(None) }.boxed()
        }

        fn detail(&self, _cid: u64) -> BoxFuture<'_, Result<Vec<HeadingNode>>> {
            async {
                Ok(vec![HeadingNode::new("Safety and Hazards", None).with_children(vec![
                    HeadingNode::new("GHS Classification", Some("Flam. Liq. 2")),
                    HeadingNode::new("First Aid Measures", Some("Move to fresh air and rest.")),
                    HeadingNode::new("Storage Conditions", Some("Keep container tightly closed.")),
                ])])
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_fetch_maps_tree() {
        let source = PubChemSource::new(Arc::new(FixedTree));
        let identity = SourceIdentity {
            smiles: "CCO".into(),
            cid: Some(702),
            ..Default::default()
        };
        let partial = source.fetch(&identity).await.unwrap();
        assert_eq!(partial.get(Hazard, "GHS Classification"), Some("Flam. Liq. 2"));
        assert_eq!(partial.get(Aid, "General First Aid"), Some("Move to fresh air and rest."));
        assert_eq!(partial.get(Store, "Storage"), Some("Keep container tightly closed."));
    }

    #[tokio::test]
    async fn test_fetch_without_cid() {
        let source = PubChemSource::new(Arc::new(FixedTree));
        let result = source.fetch(&SourceIdentity::default()).await;
        assert!(matches!(result, Err(SdsError::SourceUnavailable { .. })));
    }
}
