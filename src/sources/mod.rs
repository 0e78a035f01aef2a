//! External data-source adapters.
//!
//! Every adapter turns one remote source into a [`PartialSafetyRecord`].
//! Adapters may fail freely: [`fetch_contribution`] is the boundary that
//! enforces the deadline and converts any failure into an empty contribution
//! plus a [`SourceError`].

pub mod chemidplus;
pub mod echa;
pub mod nist;
pub mod pubchem;

pub use chemidplus::ChemIdPlusSource;
pub use echa::{EchaClassificationSource, EchaSubstanceSource};
pub use nist::NistWebbookSource;
pub use pubchem::PubChemSource;

use crate::compound::{CompoundDatabase, CompoundRecord};
use crate::config::PipelineConfig;
use crate::error::{Result, SdsError, SourceError};
use crate::schema::{PartialSafetyRecord, Provenance, SectionKey};
use futures::future::BoxFuture;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default depth bound for [`search_headings`].
pub const MAX_HEADING_DEPTH: usize = 4;

const USER_AGENT: &str = concat!("rustsds/", env!("CARGO_PKG_VERSION"));

/// What an adapter knows about the compound it is asked for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceIdentity {
    pub smiles: String,
    pub cid: Option<u64>,
    pub cas: Option<String>,
    pub name: Option<String>,
}

impl SourceIdentity {
    pub fn new(smiles: impl Into<String>, record: &CompoundRecord) -> Self {
        Self {
            smiles: smiles.into(),
            cid: record.cid,
            cas: record.cas.as_known().map(str::to_string),
            name: record.name.as_known().map(str::to_string),
        }
    }

    /// Best registry query: CAS number, then name.
    pub fn query(&self) -> Option<&str> {
        self.cas.as_deref().or(self.name.as_deref())
    }
}

/// One external source of safety data.
pub trait SourceAdapter: Send + Sync {
    /// Stable name used for provenance and error records.
    fn name(&self) -> &str;

    fn fetch<'a>(&'a self, identity: &'a SourceIdentity) -> BoxFuture<'a, Result<PartialSafetyRecord>>;
}

/// Run one adapter under a deadline. Never fails: errors and timeouts come
/// back as an empty contribution and a [`SourceError`].
pub async fn fetch_contribution(
    adapter: &dyn SourceAdapter,
    identity: &SourceIdentity,
    timeout: Duration,
) -> (PartialSafetyRecord, Option<SourceError>) {
    let name = adapter.name().to_string();
    let failure = match tokio::time::timeout(timeout, adapter.fetch(identity)).await {
        Ok(Ok(partial)) => {
            debug!(source = %name, fields = partial.len(), "Source contribution received");
            return (partial, None);
        }
        Ok(Err(e)) => e,
        Err(_) => SdsError::Timeout {
            name: name.clone(),
            secs: timeout.as_secs(),
        },
    };
    warn!(source = %name, error = %failure, "Source failed, treating as empty");
    let error = SourceError::from_error(&name, &failure);
    (PartialSafetyRecord::new(Provenance::Source(name)), Some(error))
}

/// Deepest PUG-View section nesting converted into a [`HeadingNode`] tree.
pub const MAX_PUG_VIEW_DEPTH: usize = 8;

/// Node of a nested heading/value document (PubChem PUG-View and similar).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeadingNode {
    pub heading: String,
    pub value: Option<String>,
    pub children: Vec<HeadingNode>,
}

impl HeadingNode {
    pub fn new(heading: impl Into<String>, value: Option<&str>) -> Self {
        Self {
            heading: heading.into(),
            value: value.map(str::to_string),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<HeadingNode>) -> Self {
        self.children = children;
        self
    }

    /// Convert a PUG-View `Section` object. The node value is the first
    /// information entry that yields more than two characters. Sections
    /// nested deeper than [`MAX_PUG_VIEW_DEPTH`] are dropped.
    pub fn from_pug_view(section: &serde_json::Value) -> Self {
        Self::from_pug_view_at(section, 0)
    }

    fn from_pug_view_at(section: &serde_json::Value, depth: usize) -> Self {
        let heading = section
            .get("TOCHeading")
            .and_then(|h| h.as_str())
            .unwrap_or_default()
            .to_string();
        let value = section
            .get("Information")
            .and_then(|i| i.as_array())
            .into_iter()
            .flatten()
            .filter_map(|info| info.get("Value").and_then(pug_view_text))
            .find(|text| text.chars().count() > 2);
        let children = match section.get("Section").and_then(|s| s.as_array()) {
            Some(list) if depth < MAX_PUG_VIEW_DEPTH => list
                .iter()
                .map(|child| Self::from_pug_view_at(child, depth + 1))
                .collect(),
            _ => Vec::new(),
        };
        Self {
            heading,
            value,
            children,
        }
    }
}

/// Text of a PUG-View `Value`: markup strings joined with " | ", or the
/// first number with its unit.
pub fn pug_view_text(value: &serde_json::Value) -> Option<String> {
    if let Some(strings) = value.get("StringWithMarkup").and_then(|s| s.as_array()) {
        let parts: Vec<&str> = strings
            .iter()
            .filter_map(|s| s.get("String").and_then(|v| v.as_str()))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        return (!parts.is_empty()).then(|| parts.join(" | "));
    }
    let number = value.get("Number")?.as_array()?.first()?.as_f64()?;
    let unit = value.get("Unit").and_then(|u| u.as_str()).unwrap_or_default();
    Some(format!("{} {}", number, unit).trim().to_string())
}

/// Keyword test used by every heading and table-row mapping. Keywords of
/// three characters or fewer must match a whole word.
pub fn keyword_matches(text: &str, keyword: &str) -> bool {
    let text = text.to_lowercase();
    let keyword = keyword.to_lowercase();
    if keyword.chars().count() <= 3 {
        text.split(|c: char| !c.is_alphanumeric())
            .any(|word| word == keyword)
    } else {
        text.contains(&keyword)
    }
}

/// Depth-first search for the first heading that matches any keyword and
/// carries a value longer than two characters.
pub fn search_headings<'a>(
    nodes: &'a [HeadingNode],
    keywords: &[&str],
    max_depth: usize,
) -> Option<&'a str> {
    fn walk<'a>(nodes: &'a [HeadingNode], keywords: &[&str], depth: usize, max_depth: usize) -> Option<&'a str> {
        if depth > max_depth {
            return None;
        }
        for node in nodes {
            let hit = keywords.iter().any(|k| keyword_matches(&node.heading, k));
            if hit {
                if let Some(value) = node.value.as_deref().map(str::trim) {
                    if value.chars().count() > 2 {
                        return Some(value);
                    }
                }
            }
            if let Some(found) = walk(&node.children, keywords, depth + 1, max_depth) {
                return Some(found);
            }
        }
        None
    }
    walk(nodes, keywords, 0, max_depth)
}

/// Keywords that map a heading or row label onto one schema field.
#[derive(Debug, Clone, Copy)]
pub struct KeywordRule {
    pub keywords: &'static [&'static str],
    pub section: SectionKey,
    pub field: &'static str,
}

impl KeywordRule {
    pub const fn new(keywords: &'static [&'static str], section: SectionKey, field: &'static str) -> Self {
        Self {
            keywords,
            section,
            field,
        }
    }

    pub fn matches(&self, label: &str) -> bool {
        self.keywords.iter().any(|k| keyword_matches(label, k))
    }
}

/// Evaluate every rule against a heading tree. The first match per field wins.
pub fn apply_keyword_rules(
    nodes: &[HeadingNode],
    rules: &[KeywordRule],
    provenance: Provenance,
) -> PartialSafetyRecord {
    let mut out = PartialSafetyRecord::new(provenance);
    for rule in rules {
        if let Some(value) = search_headings(nodes, rule.keywords, MAX_HEADING_DEPTH) {
            out.insert(rule.section, rule.field, value);
        }
    }
    out
}

/// Collapse whitespace in scraped text.
pub fn squash(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cell texts of every row in the tables matched by `table_selector`.
pub fn table_rows(html: &str, table_selector: &str) -> Result<Vec<Vec<String>>> {
    let document = Html::parse_document(html);
    let tables = Selector::parse(table_selector).map_err(|e| SdsError::Parse(e.to_string()))?;
    let rows = Selector::parse("tr").map_err(|e| SdsError::Parse(e.to_string()))?;
    let cells = Selector::parse("th, td").map_err(|e| SdsError::Parse(e.to_string()))?;

    let mut out = Vec::new();
    for table in document.select(&tables) {
        for row in table.select(&rows) {
            let texts: Vec<String> = row
                .select(&cells)
                .map(|cell| squash(&cell.text().collect::<String>()))
                .collect();
            if !texts.is_empty() {
                out.push(texts);
            }
        }
    }
    Ok(out)
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| SdsError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// GET a page as text, mapping non-success statuses to [`SdsError::Api`].
pub(crate) async fn get_text(client: &reqwest::Client, url: &str, source: &str) -> Result<String> {
    debug!(source = %source, url = %url, "Fetching");
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(SdsError::Api {
            code: status.as_u16() as i32,
            message: format!("{} returned {}", source, status),
        });
    }
    Ok(response.text().await?)
}

/// The standard adapters in merge-priority order.
pub fn default_adapters(
    config: &PipelineConfig,
    database: Arc<dyn CompoundDatabase>,
) -> Result<Vec<Arc<dyn SourceAdapter>>> {
    let urls = &config.urls;
    let timeout = config.source_timeout;
    Ok(vec![
        Arc::new(PubChemSource::new(database)),
        Arc::new(ChemIdPlusSource::new(&urls.chemidplus, timeout)?),
        Arc::new(NistWebbookSource::new(&urls.nist_webbook, timeout)?),
        Arc::new(EchaClassificationSource::new(&urls.echa, timeout)?),
        Arc::new(EchaSubstanceSource::new(&urls.echa, timeout)?),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use serde_json::json;

    fn tree() -> Vec<HeadingNode> {
        vec![
            HeadingNode::new("Chemical and Physical Properties", None).with_children(vec![
                HeadingNode::new("Experimental Properties", None).with_children(vec![
                    HeadingNode::new("Melting Point", Some("-114.1 °C")),
                    HeadingNode::new("Boiling Point", Some("78")),
                    HeadingNode::new("pH", Some("7.0 (neutral)")),
                ]),
            ]),
            HeadingNode::new("Safety and Hazards", None).with_children(vec![
                HeadingNode::new("Flash Point", Some("13 °C")),
                HeadingNode::new("Phosphorus content", Some("none")),
            ]),
        ]
    }

    #[test]
    fn test_search_headings_depth_first() {
        let nodes = tree();
        assert_eq!(search_headings(&nodes, &["melting point"], 4), Some("-114.1 °C"));
        assert_eq!(search_headings(&nodes, &["flash point", "fp"], 4), Some("13 °C"));
        // Two-character values are not substantive
        assert_eq!(search_headings(&nodes, &["boiling"], 4), None);
        assert_eq!(search_headings(&nodes, &["melting point"], 1), None);
    }

    #[test]
    fn test_short_keywords_match_whole_words() {
        assert!(keyword_matches("pH", "ph"));
        assert!(keyword_matches("Flash Point (FP)", "fp"));
        assert!(!keyword_matches("Phosphorus content", "ph"));
        assert!(keyword_matches("Vapor Pressure", "vapor pressure"));
        let nodes = tree();
        assert_eq!(search_headings(&nodes, &["ph"], 4), Some("7.0 (neutral)"));
    }

    #[test]
    fn test_apply_keyword_rules_first_match_wins() {
        const RULES: &[KeywordRule] = &[
            KeywordRule::new(&["flash point"], SectionKey::PhysicalProperties, "Flash Point"),
            KeywordRule::new(&["melting"], SectionKey::PhysicalProperties, "Melting Point"),
            KeywordRule::new(&["odor"], SectionKey::PhysicalProperties, "Odor"),
        ];
        let partial = apply_keyword_rules(&tree(), RULES, Provenance::Source("PubChem".into()));
        assert_eq!(partial.len(), 2);
        assert_eq!(
            partial.get(SectionKey::PhysicalProperties, "Flash Point"),
            Some("13 °C")
        );
    }

    #[test]
    fn test_pug_view_conversion() {
        let section = json!({
            "TOCHeading": "Experimental Properties",
            "Section": [
                {"TOCHeading": "Density", "Information": [
                    {"Value": {"Number": [0.789], "Unit": "g/cm³"}}
                ]},
                {"TOCHeading": "Odor", "Information": [
                    {"Value": {"StringWithMarkup": [{"String": "-"}]}},
                    {"Value": {"StringWithMarkup": [{"String": "Pleasant"}, {"String": "vinous"}]}}
                ]}
            ]
        });
        let node = HeadingNode::from_pug_view(&section);
        assert_eq!(node.children.len(), 2);
        assert_eq!(node.children[0].value.as_deref(), Some("0.789 g/cm³"));
        assert_eq!(node.children[1].value.as_deref(), Some("Pleasant | vinous"));
    }

    #[test]
    fn test_pug_view_depth_is_bounded() {
        let mut section = json!({"TOCHeading": "Leaf"});
        for level in 0..100 {
            section = json!({"TOCHeading": format!("Level {}", level), "Section": [section]});
        }
        let mut node = HeadingNode::from_pug_view(&section);
        let mut depth = 0;
        while let Some(child) = node.children.pop() {
            node = child;
            depth += 1;
        }
        assert_eq!(depth, MAX_PUG_VIEW_DEPTH);
    }

    #[test]
    fn test_table_rows() {
        let html = r#"<table id="physical"><tr><th>Property</th><th>Value</th></tr>
            <tr><td>Melting   Point</td><td> 135 deg C </td></tr></table>"#;
        let rows = table_rows(html, "table#physical").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec!["Melting Point".to_string(), "135 deg C".to_string()]);
    }

    struct Hanging;

    impl SourceAdapter for Hanging {
        fn name(&self) -> &str {
            "Hanging"
        }

        fn fetch<'a>(&'a self, _identity: &'a SourceIdentity) -> BoxFuture<'a, Result<PartialSafetyRecord>> {
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(PartialSafetyRecord::new(Provenance::Source("Hanging".into())))
            }
            .boxed()
        }
    }

    struct Broken;

    impl SourceAdapter for Broken {
        fn name(&self) -> &str {
            "Broken"
        }

        fn fetch<'a>(&'a self, _identity: &'a SourceIdentity) -> BoxFuture<'a, Result<PartialSafetyRecord>> {
            async { Err(SdsError::Parse("unexpected layout".into())) }.boxed()
        }
    }

    #[tokio::test]
    async fn test_fetch_contribution_timeout() {
        let identity = SourceIdentity::default();
        let (partial, error) = fetch_contribution(&Hanging, &identity, Duration::from_millis(20)).await;
        assert!(partial.is_empty());
        assert_eq!(error.unwrap().source, "Hanging");
    }

    #[tokio::test]
    async fn test_fetch_contribution_error() {
        let identity = SourceIdentity::default();
        let (partial, error) = fetch_contribution(&Broken, &identity, Duration::from_secs(1)).await;
        assert!(partial.is_empty());
        assert_eq!(error.unwrap().message, "Parse error: unexpected layout");
    }
}
