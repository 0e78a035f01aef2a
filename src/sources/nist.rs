//! NIST Chemistry WebBook thermochemistry page scraper.

use super::{http_client, squash, table_rows, SourceAdapter, SourceIdentity};
use crate::error::{Result, SdsError};
use crate::schema::{PartialSafetyRecord, Provenance, SectionKey};
use futures::future::{BoxFuture, FutureExt};
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::debug;

pub const NAME: &str = "NIST WebBook";

pub struct NistWebbookSource {
    client: reqwest::Client,
    base_url: String,
}

impl NistWebbookSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.to_string(),
        })
    }

    async fn fetch_impl(&self, identity: &SourceIdentity) -> Result<PartialSafetyRecord> {
        let cas = identity
            .cas
            .as_deref()
            .ok_or_else(|| SdsError::unavailable(NAME, "no CAS number"))?;

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("ID", cas), ("Mask", "4"), ("Type", "Name"), ("Units", "SI")])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SdsError::Api {
                code: status.as_u16() as i32,
                message: format!("{} returned {}", NAME, status),
            });
        }
        let html = response.text().await?;
        let partial = parse_webbook_page(&html)?;
        debug!(cas = %cas, fields = partial.len(), "WebBook page parsed");
        Ok(partial)
    }
}

/// Map the property rows and phase-change tables of a WebBook page.
/// A "not found" page yields an empty contribution.
pub fn parse_webbook_page(html: &str) -> Result<PartialSafetyRecord> {
    let mut out = PartialSafetyRecord::new(Provenance::Source(NAME.to_string()));
    if html.to_lowercase().contains("not found") {
        return Ok(out);
    }

    for row in table_rows(html, "table")? {
        let [label, value, ..] = row.as_slice() else {
            continue;
        };
        if value.chars().count() <= 1 || value == "-" {
            continue;
        }
        let label = label.to_lowercase();
        let field = if label.contains("melting") || label.contains("fusion") {
            "Melting Point"
        } else if label.contains("boiling") || label.contains("vaporization") {
            "Boiling Point"
        } else if label.contains("density") {
            "Density"
        } else if label.contains("vapor pressure") {
            "Vapor Pressure"
        } else {
            continue;
        };
        out.insert(SectionKey::PhysicalProperties, field, format!("{value} (NIST)"));
    }

    let document = Html::parse_document(html);
    let tables = Selector::parse("table.data").map_err(|e| SdsError::Parse(e.to_string()))?;
    let caption = Selector::parse("caption").map_err(|e| SdsError::Parse(e.to_string()))?;
    let rows = Selector::parse("tr").map_err(|e| SdsError::Parse(e.to_string()))?;
    let cells = Selector::parse("td").map_err(|e| SdsError::Parse(e.to_string()))?;

    for table in document.select(&tables) {
        let Some(title) = table.select(&caption).next() else {
            continue;
        };
        let title = title.text().collect::<String>().to_lowercase();
        if !title.contains("phase") && !title.contains("temperature") {
            continue;
        }
        let field = if title.contains("melting") {
            "Melting Point"
        } else if title.contains("boiling") {
            "Boiling Point"
        } else {
            continue;
        };
        let first_value = table.select(&rows).skip(1).find_map(|row| {
            let temp = squash(&row.select(&cells).next()?.text().collect::<String>());
            (!temp.is_empty() && temp != "-").then_some(temp)
        });
        if let Some(temp) = first_value {
            out.insert(SectionKey::PhysicalProperties, field, format!("{temp} K (NIST)"));
        }
    }

    Ok(out)
}

impl SourceAdapter for NistWebbookSource {
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

    #[test]
    fn test_property_rows() {
        let html = r#"<table>
            <tr><td>Enthalpy of vaporization</td><td>42.3 kJ/mol</td></tr>
            <tr><td>Density</td><td>-</td></tr>
        </table>"#;
        let partial = parse_webbook_page(html).unwrap();
        assert_eq!(
            partial.get(SectionKey::PhysicalProperties, "Boiling Point"),
            Some("42.3 kJ/mol (NIST)")
        );
        assert_eq!(partial.get(SectionKey::PhysicalProperties, "Density"), None);
    }

    #[test]
    fn test_phase_change_table() {
        let html = r#"<table class="data"><caption>Boiling point temperature (phase change data)</caption>
            <tr><th>Tboil (K)</th><th>Reference</th></tr>
            <tr><td>351.5</td><td>Ambrose 1975</td></tr>
        </table>"#;
        let partial = parse_webbook_page(html).unwrap();
        assert_eq!(
            partial.get(SectionKey::PhysicalProperties, "Boiling Point"),
            Some("351.5 K (NIST)")
        );
    }

    #[test]
    fn test_not_found_page() {
        let html = "<html><h1>Name Not Found</h1><table><tr><td>Density</td><td>1.0</td></tr></table></html>";
        assert!(parse_webbook_page(html).unwrap().is_empty());
    }
}
