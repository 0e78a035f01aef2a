//! ECHA (European Chemicals Agency) scrapers: GHS hazard statements from the
//! chemical search, and the registered substance name from the substance
//! information page.

use super::{get_text, http_client, squash, table_rows, SourceAdapter, SourceIdentity};
use crate::error::{Result, SdsError};
use crate::schema::{PartialSafetyRecord, Provenance, SectionKey};
use futures::future::{BoxFuture, FutureExt};
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

pub const CLASSIFICATION_NAME: &str = "ECHA";
pub const SUBSTANCE_NAME: &str = "ECHA Substance";

/// Hazard codes that raise the signal word to "Danger".
const DANGER_CODES: &[&str] = &["H300", "H301", "H310", "H330", "H340", "H350", "H360"];

/// A hazard code and its text, up to the next hazard code.
static HAZARD_STATEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"H\d{3}(?:[^H]|H\D)*").expect("valid regex"));

fn require_query<'a>(identity: &'a SourceIdentity, source: &str) -> Result<&'a str> {
    identity
        .query()
        .ok_or_else(|| SdsError::unavailable(source, "no CAS number or name to search"))
}

/// GHS classification, signal word and hazard statements.
pub struct EchaClassificationSource {
    client: reqwest::Client,
    base_url: String,
}

impl EchaClassificationSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_impl(&self, identity: &SourceIdentity) -> Result<PartialSafetyRecord> {
        let query = require_query(identity, CLASSIFICATION_NAME)?;
        let url = format!(
            "{}/search-for-chemicals?q={}",
            self.base_url,
            urlencoding::encode(query)
        );
        let html = get_text(&self.client, &url, CLASSIFICATION_NAME).await?;
        let statements = hazard_statements(&html);
        debug!(query = %query, statements = statements.len(), "ECHA hazard statements found");
        Ok(classification_contribution(&statements))
    }
}

/// Every `H###` statement in the page text, in document order.
pub fn hazard_statements(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .root_element()
        .text()
        .flat_map(|text| {
            HAZARD_STATEMENT
                .find_iter(text)
                .map(|m| squash(m.as_str()))
                .collect::<Vec<_>>()
        })
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn signal_word(statements: &[String]) -> &'static str {
    let danger = statements
        .iter()
        .any(|s| DANGER_CODES.iter().any(|code| s.contains(code)));
    if danger {
        "Danger"
    } else {
        "Warning"
    }
}

pub fn classification_contribution(statements: &[String]) -> PartialSafetyRecord {
    let mut out = PartialSafetyRecord::new(Provenance::Source(CLASSIFICATION_NAME.to_string()));
    if statements.is_empty() {
        return out;
    }
    let first = |n: usize, sep: &str| {
        statements
            .iter()
            .take(n)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(sep)
    };
    out.insert(SectionKey::HazardIdentification, "GHS Classification", first(5, ", "));
    out.insert(SectionKey::HazardIdentification, "Signal Word", signal_word(statements));
    out.insert(SectionKey::HazardIdentification, "Hazard Statements", first(10, " | "));
    out
}

impl SourceAdapter for EchaClassificationSource {
    fn name(&self) -> &str {
        CLASSIFICATION_NAME
    }

    fn fetch<'a>(&'a self, identity: &'a SourceIdentity) -> BoxFuture<'a, Result<PartialSafetyRecord>> {
        self.fetch_impl(identity).boxed()
    }
}

/// Preferred substance name, EC number and page link.
pub struct EchaSubstanceSource {
    client: reqwest::Client,
    base_url: String,
}

impl EchaSubstanceSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_impl(&self, identity: &SourceIdentity) -> Result<PartialSafetyRecord> {
        let query = require_query(identity, SUBSTANCE_NAME)?;
        let url = format!(
            "{}/search?searchtext={}&submit=Search",
            self.base_url,
            urlencoding::encode(query)
        );
        let html = get_text(&self.client, &url, SUBSTANCE_NAME).await?;
        let Some(href) = detail_link(&html)? else {
            debug!(query = %query, "ECHA search returned no substance");
            return Ok(PartialSafetyRecord::new(Provenance::Source(SUBSTANCE_NAME.to_string())));
        };
        let detail_url = if href.starts_with("http") {
            href
        } else {
            format!("{}{}", self.base_url, href)
        };
        let detail = get_text(&self.client, &detail_url, SUBSTANCE_NAME).await?;
        substance_contribution(&detail, &detail_url)
    }
}

/// First link whose text mentions "Detail".
pub fn detail_link(html: &str) -> Result<Option<String>> {
    let document = Html::parse_document(html);
    let links = Selector::parse("a[href]").map_err(|e| SdsError::Parse(e.to_string()))?;
    Ok(document
        .select(&links)
        .find(|a| a.text().collect::<String>().contains("Detail"))
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string))
}

pub fn substance_contribution(html: &str, page_url: &str) -> Result<PartialSafetyRecord> {
    let mut out = PartialSafetyRecord::new(Provenance::Source(SUBSTANCE_NAME.to_string()));
    let mut name = None;

    for row in table_rows(html, "table")? {
        let [header, value, ..] = row.as_slice() else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        if name.is_none()
            && ["Preferred IUPAC", "EC Name", "Substance Name"]
                .iter()
                .any(|k| header.contains(k))
        {
            name = Some(value.clone());
        } else if header.contains("EC Number") || header.contains("EC / List no") {
            out.insert(SectionKey::Composition, "EC Number", value.as_str());
        }
    }

    if name.is_none() {
        let title = Selector::parse("title").map_err(|e| SdsError::Parse(e.to_string()))?;
        name = Html::parse_document(html)
            .select(&title)
            .next()
            .map(|t| t.text().collect::<String>())
            .and_then(|t| t.split_once(" - Substance Information").map(|(n, _)| squash(n)))
            .filter(|n| !n.is_empty());
    }

    if let Some(name) = name {
        out.insert(SectionKey::Identification, "ECHA Preferred Name", name);
    }
    out.insert(SectionKey::OtherInformation, "ECHA Substance Page", page_url);
    Ok(out)
}

impl SourceAdapter for EchaSubstanceSource {
    fn name(&self) -> &str {
        SUBSTANCE_NAME
    }

    fn fetch<'a>(&'a self, identity: &'a SourceIdentity) -> BoxFuture<'a, Result<PartialSafetyRecord>> {
        self.fetch_impl(identity).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hazard_statements_and_signal_word() {
        let html = r#"<ul><li>H225 Highly flammable liquid and vapour</li>
            <li>H319 Causes serious eye irritation</li></ul>"#;
        let statements = hazard_statements(html);
        assert_eq!(
            statements,
            vec![
                "H225 Highly flammable liquid and vapour".to_string(),
                "H319 Causes serious eye irritation".to_string()
            ]
        );
        assert_eq!(signal_word(&statements), "Warning");

        let partial = classification_contribution(&statements);
        assert_eq!(
            partial.get(SectionKey::HazardIdentification, "Hazard Statements"),
            Some("H225 Highly flammable liquid and vapour | H319 Causes serious eye irritation")
        );
    }

    #[test]
    fn test_danger_codes() {
        let statements = vec!["H301 Toxic if swallowed".to_string()];
        assert_eq!(signal_word(&statements), "Danger");
        assert!(classification_contribution(&[]).is_empty());
    }

    #[test]
    fn test_detail_link() {
        let html = r#"<a href="/home">Home</a><a href="/substance-information/-/substanceinfo/100.000.526">Details</a>"#;
        assert_eq!(
            detail_link(html).unwrap().as_deref(),
            Some("/substance-information/-/substanceinfo/100.000.526")
        );
        assert_eq!(detail_link("<p>nothing</p>").unwrap(), None);
    }

    #[test]
    fn test_substance_page() {
        let html = r#"<html><head><title>Ethanol - Substance Information - ECHA</title></head>
            <body><table><tr><td>EC Number</td><td>200-578-6</td></tr></table></body></html>"#;
        let partial = substance_contribution(html, "https://echa.europa.eu/x").unwrap();
        assert_eq!(
            partial.get(SectionKey::Identification, "ECHA Preferred Name"),
            Some("Ethanol")
        );
        assert_eq!(partial.get(SectionKey::Composition, "EC Number"), Some("200-578-6"));
        assert_eq!(
            partial.get(SectionKey::OtherInformation, "ECHA Substance Page"),
            Some("https://echa.europa.eu/x")
        );
    }
}
