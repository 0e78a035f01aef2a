//! Compound identity lookup.
//!
//! Resolves a SMILES string to a [`CompoundRecord`] through a
//! [`CompoundDatabase`]. The bundled implementation talks to PubChem
//! PUG-REST for identity and PUG-View for the detailed heading tree used by
//! the source adapters.

use crate::error::{Result, SdsError, SourceError};
use crate::molecule::DescriptorProvider;
use crate::schema::{PartialSafetyRecord, Provenance, SectionKey, Value};
use crate::sources::HeadingNode;
use futures::future::{BoxFuture, FutureExt};
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Name used when nothing better can be resolved.
pub const UNKNOWN_COMPOUND: &str = "Unknown Compound";

/// Synonyms kept on a record.
pub const MAX_SYNONYMS: usize = 10;

/// Common names preferred over any other synonym.
pub const COMMON_NAMES: &[&str] = &[
    "Aspirin",
    "Caffeine",
    "Curcumin",
    "Morphine",
    "Nicotine",
    "Quinine",
    "Ibuprofen",
    "Paracetamol",
    "Acetaminophen",
    "Resveratrol",
    "Capsaicin",
    "Theophylline",
    "Atropine",
    "Codeine",
    "Penicillin",
    "Digitalis",
    "Artemisinin",
    "Vanillin",
    "Menthol",
    "Thymol",
    "Eugenol",
    "Limonene",
    "Linalool",
];

const SOURCE_NAME: &str = "PubChem";
const USER_AGENT: &str = concat!("rustsds/", env!("CARGO_PKG_VERSION"));

static CAS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{2,7})-(\d{2})-(\d)$").expect("valid regex"));

/// Raw identity data as returned by a compound database.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompoundHit {
    pub cid: u64,
    pub iupac_name: Option<String>,
    pub formula: Option<String>,
    pub molecular_weight: Option<f64>,
    pub xlogp: Option<f64>,
    pub synonyms: Vec<String>,
}

/// Identity database consulted once per request.
pub trait CompoundDatabase: Send + Sync {
    /// Find a compound by SMILES; `Ok(None)` when the database has no match.
    fn find<'a>(&'a self, smiles: &'a str) -> BoxFuture<'a, Result<Option<CompoundHit>>>;

    /// Nested heading/value tree describing a compound.
    fn detail(&self, cid: u64) -> BoxFuture<'_, Result<Vec<HeadingNode>>>;
}

/// Resolved identity of the requested compound. Immutable after lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompoundRecord {
    pub name: Value,
    pub cas: Value,
    pub iupac_name: Value,
    pub formula: Value,
    pub molecular_weight: Option<f64>,
    pub cid: Option<u64>,
    pub logp: Option<f64>,
    pub synonyms: Vec<String>,
}

impl CompoundRecord {
    /// Record used when the database is unavailable.
    pub fn empty() -> Self {
        Self {
            name: Value::Unknown,
            cas: Value::Unknown,
            iupac_name: Value::Unknown,
            formula: Value::Unknown,
            molecular_weight: None,
            cid: None,
            logp: None,
            synonyms: Vec::new(),
        }
    }

    pub fn from_hit(hit: CompoundHit) -> Self {
        let name = resolve_name(&hit.synonyms, hit.iupac_name.as_deref());
        let cas = extract_cas(&hit.synonyms);
        let mut synonyms = hit.synonyms;
        synonyms.truncate(MAX_SYNONYMS);
        Self {
            name: Value::known(name),
            cas: cas.map_or(Value::Unknown, Value::Known),
            iupac_name: hit.iupac_name.map_or(Value::Unknown, Value::Known),
            formula: hit.formula.map_or(Value::Unknown, Value::Known),
            molecular_weight: hit.molecular_weight,
            cid: (hit.cid > 0).then_some(hit.cid),
            logp: hit.xlogp,
            synonyms,
        }
    }

    /// Display name, falling back to [`UNKNOWN_COMPOUND`].
    pub fn display_name(&self) -> &str {
        self.name.as_known().unwrap_or(UNKNOWN_COMPOUND)
    }

    /// Identity fields for the fused record.
    pub fn contribution(&self) -> PartialSafetyRecord {
        use SectionKey::{Composition, Identification, OtherInformation};

        let mut out = PartialSafetyRecord::new(Provenance::CompoundLookup);
        if let Some(name) = self.name.as_known() {
            out.insert(Identification, "Product Identifier", name);
            out.insert(Composition, "Chemical Name", name);
        }
        if !self.synonyms.is_empty() {
            let other: Vec<&str> = self.synonyms.iter().take(3).map(String::as_str).collect();
            out.insert(Identification, "Other Names", other.join(", "));
        }
        if let Some(cas) = self.cas.as_known() {
            out.insert(Identification, "CAS Number", cas);
        }
        if let Some(cid) = self.cid {
            out.insert(Identification, "PubChem CID", cid.to_string());
            out.insert(
                OtherInformation,
                "PubChem Record",
                format!("https://pubchem.ncbi.nlm.nih.gov/compound/{cid}"),
            );
        }
        if let Some(formula) = self.formula.as_known() {
            out.insert(Identification, "Molecular Formula", formula);
        }
        if let Some(mw) = self.molecular_weight {
            out.insert(Identification, "Molecular Weight", format!("{mw:.2} g/mol"));
        }
        if let Some(iupac) = self.iupac_name.as_known() {
            out.insert(Composition, "IUPAC Name", iupac);
        }
        out
    }
}

fn normalize_name(s: &str) -> String {
    s.to_lowercase()
        .replace([' ', '-', '_'], "")
        .replace("acid", "")
}

/// Pick the display name from synonyms and the IUPAC name.
pub fn resolve_name(synonyms: &[String], iupac: Option<&str>) -> String {
    for synonym in synonyms {
        let normalized = normalize_name(synonym);
        if let Some(common) = COMMON_NAMES.iter().find(|c| normalize_name(c) == normalized) {
            return common.to_string();
        }
    }

    for synonym in synonyms {
        let candidate = synonym.trim();
        let lower = candidate.to_lowercase();
        let readable = candidate.chars().count() <= 50
            && candidate.chars().next().is_some_and(char::is_alphabetic)
            && !["smiles", "iupac", "cas", "cid"].iter().any(|t| lower.contains(t));
        if readable {
            return candidate.to_string();
        }
    }

    if let Some(iupac) = iupac.filter(|s| !s.trim().is_empty()) {
        let lower = iupac.to_lowercase();
        if lower.contains("acetyloxy") && lower.contains("benzoic") {
            return "Aspirin".to_string();
        }
        if lower.contains("caffeine") || lower.contains("trimethylpurine-2,6-dione") {
            return "Caffeine".to_string();
        }
        return iupac.trim().to_string();
    }

    UNKNOWN_COMPOUND.to_string()
}

/// True when `candidate` is a CAS registry number with a valid check digit.
pub fn is_valid_cas(candidate: &str) -> bool {
    let Some(caps) = CAS_PATTERN.captures(candidate) else {
        return false;
    };
    let body: Vec<u32> = caps[1]
        .chars()
        .chain(caps[2].chars())
        .filter_map(|c| c.to_digit(10))
        .collect();
    let check = caps[3].chars().next().and_then(|c| c.to_digit(10));
    let sum: u32 = body
        .iter()
        .rev()
        .enumerate()
        .map(|(i, d)| (i as u32 + 1) * d)
        .sum();
    check == Some(sum % 10)
}

/// First synonym that is a valid CAS registry number.
pub fn extract_cas(synonyms: &[String]) -> Option<String> {
    synonyms
        .iter()
        .map(|s| s.trim())
        .find(|s| is_valid_cas(s))
        .map(str::to_string)
}

/// Identifier validation plus database lookup with graceful degradation.
pub struct CompoundLookup {
    database: Arc<dyn CompoundDatabase>,
    provider: Arc<dyn DescriptorProvider>,
    timeout: Duration,
}

impl CompoundLookup {
    pub fn new(
        database: Arc<dyn CompoundDatabase>,
        provider: Arc<dyn DescriptorProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            database,
            provider,
            timeout,
        }
    }

    /// Resolve `identifier`. Only an unparseable identifier is an error; a
    /// failing database yields [`CompoundRecord::empty`] plus a source error.
    pub async fn lookup(&self, identifier: &str) -> Result<(CompoundRecord, Option<SourceError>)> {
        if self.provider.parse(identifier).is_none() {
            return Err(SdsError::InvalidStructure(identifier.to_string()));
        }

        let outcome = tokio::time::timeout(self.timeout, self.database.find(identifier)).await;
        let failure = match outcome {
            Ok(Ok(Some(hit))) => {
                let record = CompoundRecord::from_hit(hit);
                info!(
                    name = %record.display_name(),
                    cid = ?record.cid,
                    "Compound resolved"
                );
                return Ok((record, None));
            }
            Ok(Ok(None)) => SdsError::unavailable(SOURCE_NAME, "no matching compound"),
            Ok(Err(e)) => e,
            Err(_) => SdsError::Timeout {
                name: SOURCE_NAME.to_string(),
                secs: self.timeout.as_secs(),
            },
        };
        warn!(identifier = %identifier, error = %failure, "Compound lookup failed, continuing without identity");
        Ok((
            CompoundRecord::empty(),
            Some(SourceError::from_error(SOURCE_NAME, &failure)),
        ))
    }
}

/// PubChem PUG-REST / PUG-View client.
pub struct PubChemClient {
    client: reqwest::Client,
    rest_url: String,
    view_url: String,
}

impl PubChemClient {
    pub fn new(rest_url: &str, view_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| SdsError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            rest_url: rest_url.trim_end_matches('/').to_string(),
            view_url: view_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Option<serde_json::Value>> {
        let response = self.client.get(url).query(query).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(SdsError::Api {
                code: response.status().as_u16() as i32,
                message: format!("PubChem API error: {}", response.status()),
            });
        }
        Ok(Some(response.json().await?))
    }

    async fn find_impl(&self, smiles: &str) -> Result<Option<CompoundHit>> {
        let url = format!(
            "{}/compound/smiles/property/MolecularFormula,MolecularWeight,XLogP,IUPACName/JSON",
            self.rest_url
        );
        let Some(json) = self.get_json(&url, &[("smiles", smiles)]).await? else {
            return Ok(None);
        };
        let Some(mut hit) = parse_property_table(&json) else {
            return Ok(None);
        };
        debug!(cid = hit.cid, "PubChem property lookup hit");

        let synonyms_url = format!("{}/compound/cid/{}/synonyms/JSON", self.rest_url, hit.cid);
        match self.get_json(&synonyms_url, &[]).await {
            Ok(Some(json)) => hit.synonyms = parse_synonyms(&json),
            Ok(None) => {}
            Err(e) => debug!(cid = hit.cid, error = %e, "Synonym lookup failed"),
        }
        Ok(Some(hit))
    }

    async fn detail_impl(&self, cid: u64) -> Result<Vec<HeadingNode>> {
        let url = format!("{}/data/compound/{}/JSON", self.view_url, cid);
        let json = self
            .get_json(&url, &[])
            .await?
            .ok_or_else(|| SdsError::unavailable(SOURCE_NAME, format!("no PUG-View record for CID {cid}")))?;
        let sections = json
            .pointer("/Record/Section")
            .and_then(|s| s.as_array())
            .ok_or_else(|| SdsError::Parse("PUG-View record without sections".to_string()))?;
        Ok(sections.iter().map(HeadingNode::from_pug_view).collect())
    }
}

impl CompoundDatabase for PubChemClient {
    fn find<'a>(&'a self, smiles: &'a str) -> BoxFuture<'a, Result<Option<CompoundHit>>> {
        self.find_impl(smiles).boxed()
    }

    fn detail(&self, cid: u64) -> BoxFuture<'_, Result<Vec<HeadingNode>>> {
        self.detail_impl(cid).boxed()
    }
}

fn as_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// First entry of a PUG-REST `PropertyTable`; CID 0 means no match.
pub fn parse_property_table(json: &serde_json::Value) -> Option<CompoundHit> {
    let props = json.pointer("/PropertyTable/Properties/0")?;
    let cid = props.get("CID").and_then(|v| v.as_u64()).filter(|cid| *cid > 0)?;
    let text = |key: &str| {
        props
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    Some(CompoundHit {
        cid,
        iupac_name: text("IUPACName"),
        formula: text("MolecularFormula"),
        molecular_weight: props.get("MolecularWeight").and_then(as_f64),
        xlogp: props.get("XLogP").and_then(as_f64),
        synonyms: Vec::new(),
    })
}

pub fn parse_synonyms(json: &serde_json::Value) -> Vec<String> {
    json.pointer("/InformationList/Information/0/Synonym")
        .and_then(|v| v.as_array())
        .map(|list| {
            list.iter()
                .filter_map(|s| s.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molecule::SmilesToolkit;
    use serde_json::json;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_common_name_wins() {
        let synonyms = names(&["2-acetyloxybenzoic acid", "Acetylsalicylic acid", "Aspirin", "50-78-2"]);
        assert_eq!(resolve_name(&synonyms, None), "Aspirin");
    }

    #[test]
    fn test_common_name_normalization() {
        let synonyms = names(&["VANILLIN", "4-hydroxy-3-methoxybenzaldehyde"]);
        assert_eq!(resolve_name(&synonyms, None), "Vanillin");
    }

    #[test]
    fn test_readable_synonym_skips_identifiers() {
        let synonyms = names(&["64-17-5", "CAS-64-17-5", "ethanol", "Ethyl alcohol"]);
        assert_eq!(resolve_name(&synonyms, None), "ethanol");
    }

    #[test]
    fn test_iupac_special_cases() {
        assert_eq!(resolve_name(&[], Some("2-acetyloxybenzoic acid")), "Aspirin");
        assert_eq!(
            resolve_name(&[], Some("1,3,7-trimethylpurine-2,6-dione")),
            "Caffeine"
        );
        assert_eq!(resolve_name(&[], Some("propan-2-ol")), "propan-2-ol");
        assert_eq!(resolve_name(&[], None), UNKNOWN_COMPOUND);
    }

    #[test]
    fn test_cas_checksum() {
        assert!(is_valid_cas("50-78-2"));
        assert!(is_valid_cas("7732-18-5"));
        assert!(!is_valid_cas("50-78-3"));
        assert!(!is_valid_cas("DTXSID5020108"));
        let synonyms = names(&["Aspirin", "50-78-3", "50-78-2"]);
        assert_eq!(extract_cas(&synonyms).as_deref(), Some("50-78-2"));
    }

    #[test]
    fn test_parse_property_table() {
        let payload = json!({"PropertyTable": {"Properties": [{
            "CID": 2244, "MolecularFormula": "C9H8O4", "MolecularWeight": "180.16",
            "XLogP": 1.2, "IUPACName": "2-acetyloxybenzoic acid"
        }]}});
        let hit = parse_property_table(&payload).unwrap();
        assert_eq!(hit.cid, 2244);
        assert_eq!(hit.molecular_weight, Some(180.16));
        assert_eq!(hit.xlogp, Some(1.2));

        let missing = json!({"PropertyTable": {"Properties": [{"CID": 0}]}});
        assert!(parse_property_table(&missing).is_none());
    }

    #[test]
    fn test_record_contribution() {
        let record = CompoundRecord::from_hit(CompoundHit {
            cid: 2244,
            iupac_name: Some("2-acetyloxybenzoic acid".into()),
            formula: Some("C9H8O4".into()),
            molecular_weight: Some(180.159),
            xlogp: Some(1.2),
            synonyms: names(&["aspirin", "ACETYLSALICYLIC ACID", "50-78-2", "Easprin"]),
        });
        assert_eq!(record.display_name(), "Aspirin");
        let partial = record.contribution();
        assert_eq!(partial.get(SectionKey::Identification, "CAS Number"), Some("50-78-2"));
        assert_eq!(
            partial.get(SectionKey::Identification, "Molecular Weight"),
            Some("180.16 g/mol")
        );
        assert_eq!(
            partial.get(SectionKey::Identification, "Other Names"),
            Some("aspirin, ACETYLSALICYLIC ACID, 50-78-2")
        );
    }

    struct Unreachable;

    impl CompoundDatabase for Unreachable {
        fn find<'a>(&'a self, _smiles: &'a str) -> BoxFuture<'a, Result<Option<CompoundHit>>> {
            async { Err(SdsError::unavailable("PubChem", "connection refused")) }.boxed()
        }

        fn detail(&self, _cid: u64) -> BoxFuture<'_, Result<Vec<HeadingNode>>> {
            async { Ok(Vec::new()) }.boxed()
        }
    }

    fn lookup() -> CompoundLookup {
        CompoundLookup::new(
            Arc::new(Unreachable),
            Arc::new(SmilesToolkit),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_unreachable_database_degrades() {
        let (record, error) = lookup().lookup("CCO").await.unwrap();
        assert_eq!(record, CompoundRecord::empty());
        assert_eq!(record.display_name(), UNKNOWN_COMPOUND);
        let error = error.unwrap();
        assert_eq!(error.source, "PubChem");
        assert_eq!(error.message, "connection refused");
    }

    #[tokio::test]
    async fn test_invalid_identifier() {
        let result = lookup().lookup("not a molecule").await;
        assert!(matches!(result, Err(SdsError::InvalidStructure(_))));
    }
}
