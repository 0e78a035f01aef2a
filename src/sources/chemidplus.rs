//! ChemIDplus (NLM) registry page scraper.
//!
//! The service has been retired upstream; the adapter still runs and fails
//! like any other unreachable source.

use super::{get_text, http_client, table_rows, SourceAdapter, SourceIdentity};
use crate::error::{Result, SdsError};
use crate::schema::{PartialSafetyRecord, Provenance, SectionKey};
use futures::future::{BoxFuture, FutureExt};
use std::time::Duration;
use tracing::debug;

pub const NAME: &str = "ChemIDplus";

pub struct ChemIdPlusSource {
    client: reqwest::Client,
    base_url: String,
}

impl ChemIdPlusSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_impl(&self, identity: &SourceIdentity) -> Result<PartialSafetyRecord> {
        let cas = identity
            .cas
            .as_deref()
            .ok_or_else(|| SdsError::unavailable(NAME, "no CAS number"))?;
        let url = format!("{}/{}", self.base_url, urlencoding::encode(cas));
        let html = get_text(&self.client, &url, NAME).await?;
        let partial = parse_registry_page(&html)?;
        debug!(cas = %cas, fields = partial.len(), "ChemIDplus page parsed");
        Ok(partial)
    }
}

/// Map the `toxicity` and `physical` tables of a registry page.
pub fn parse_registry_page(html: &str) -> Result<PartialSafetyRecord> {
    let mut out = PartialSafetyRecord::new(Provenance::Source(NAME.to_string()));

    for row in table_rows(html, "table#toxicity")? {
        let [test, value, ..] = row.as_slice() else {
            continue;
        };
        let test = test.to_lowercase();
        if test.contains("oral") && test.contains("ld50") {
            out.insert(SectionKey::Toxicological, "LD50 Oral", value.as_str());
        } else if test.contains("inhalation") && (test.contains("lc50") || test.contains("ld50")) {
            out.insert(SectionKey::Toxicological, "LC50 Inhalation", value.as_str());
        } else if test.contains("skin") && test.contains("ld50") {
            out.insert(SectionKey::Toxicological, "LD50 Dermal", value.as_str());
        }
    }

    for row in table_rows(html, "table#physical")? {
        let [property, value, ..] = row.as_slice() else {
            continue;
        };
        let property = property.to_lowercase();
        let field = if property.contains("melting") {
            "Melting Point"
        } else if property.contains("boiling") {
            "Boiling Point"
        } else if property.contains("density") {
            "Density"
        } else if property.contains("water solubility") {
            "Solubility in Water"
        } else if property.contains("vapor pressure") {
            "Vapor Pressure"
        } else {
            continue;
        };
        out.insert(SectionKey::PhysicalProperties, field, value.as_str());
    }

    Ok(out)
}

impl SourceAdapter for ChemIdPlusSource {
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

    const PAGE: &str = r#"<html><body>
        <table id="toxicity">
          <tr><th>Test</th><th>Dose</th></tr>
          <tr><td>LD50 oral rat</td><td>7060 mg/kg</td></tr>
          <tr><td>LC50 inhalation rat</td><td>20000 ppm/10H</td></tr>
        </table>
        <table id="physical">
          <tr><td>Melting Point</td><td>-114.1 deg C</td></tr>
          <tr><td>Boiling Point</td><td>78.2 deg C</td></tr>
          <tr><td>Density</td><td>0.789 g/cm3</td></tr>
          <tr><td>Color</td><td>colorless</td></tr>
        </table></body></html>"#;

    #[test]
    fn test_parse_registry_page() {
        let partial = parse_registry_page(PAGE).unwrap();
        assert_eq!(partial.get(SectionKey::Toxicological, "LD50 Oral"), Some("7060 mg/kg"));
        assert_eq!(
            partial.get(SectionKey::Toxicological, "LC50 Inhalation"),
            Some("20000 ppm/10H")
        );
        assert_eq!(
            partial.get(SectionKey::PhysicalProperties, "Boiling Point"),
            Some("78.2 deg C")
        );
        assert_eq!(partial.len(), 5);
    }

    #[test]
    fn test_page_without_tables() {
        let partial = parse_registry_page("<html><p>No records</p></html>").unwrap();
        assert!(partial.is_empty());
    }

    #[tokio::test]
    async fn test_requires_cas() {
        let source = ChemIdPlusSource::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let result = source.fetch(&SourceIdentity::default()).await;
        assert!(matches!(result, Err(SdsError::SourceUnavailable { .. })));
    }
}
