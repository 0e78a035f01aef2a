//! Serialization of an assembled [`SdsDocument`] to downloadable bytes.
//!
//! All formats share one row mapping, [`section_rows`]: groups are
//! flattened to `key: value` lines and over-long values are truncated.

pub mod docx;
pub mod pdf;

use crate::assembler::{FieldValue, SdsDocument, Section};
use crate::error::{Result, SdsError};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Longest value a rendered cell may hold.
pub const MAX_CELL_CHARS: usize = 1000;
const TRUNCATION_MARKER: &str = "... [truncated]";

/// One field as it appears in a rendered table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderRow {
    pub field: String,
    pub value: String,
}

fn truncate_cell(value: &str) -> String {
    if value.chars().count() <= MAX_CELL_CHARS {
        return value.to_string();
    }
    let mut out: String = value.chars().take(MAX_CELL_CHARS).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

/// Rows of a section in field order.
pub fn section_rows(section: &Section) -> Vec<RenderRow> {
    section
        .fields
        .iter()
        .map(|(name, value)| {
            let text = match value {
                FieldValue::Text(text) => text.clone(),
                FieldValue::Group(group) => group
                    .iter()
                    .map(|(k, v)| match v {
                        FieldValue::Text(t) => format!("{}: {}", k, t),
                        // Nested groups are not produced by the assembler; keep the key
                        FieldValue::Group(_) => k.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join("\n"),
            };
            RenderRow {
                field: name.to_string(),
                value: truncate_cell(&text),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Csv,
    Docx,
    Pdf,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Json,
        OutputFormat::Csv,
        OutputFormat::Docx,
        OutputFormat::Pdf,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Docx => "docx",
            OutputFormat::Pdf => "pdf",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Json => "application/json",
            OutputFormat::Csv => "text/csv; charset=utf-8",
            OutputFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            OutputFormat::Pdf => "application/pdf",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = SdsError;

    fn from_str(s: &str) -> Result<Self> {
        OutputFormat::ALL
            .into_iter()
            .find(|f| f.extension().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                SdsError::Config(format!(
                    "Unknown output format '{}' (expected json, csv, docx or pdf)",
                    s
                ))
            })
    }
}

/// Rendered bytes plus download metadata.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub format: OutputFormat,
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl RenderedDocument {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}

/// `SDS_<name>.<ext>` with everything but ASCII alphanumerics replaced.
pub fn file_name(document: &SdsDocument, format: OutputFormat) -> String {
    let stem: String = document
        .compound_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let stem = stem.trim_matches('_');
    let stem = if stem.is_empty() { "compound" } else { stem };
    format!("SDS_{}.{}", stem, format.extension())
}

#[derive(Serialize)]
struct CsvRow<'a> {
    section_number: u8,
    section_title: &'a str,
    field: &'a str,
    value: &'a str,
}

fn render_csv(document: &SdsDocument) -> Result<Vec<u8>> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(true)
        .from_writer(Vec::new());
    for section in &document.sections {
        for row in section_rows(section) {
            wtr.serialize(CsvRow {
                section_number: section.number,
                section_title: &section.title,
                field: &row.field,
                value: &row.value,
            })
            .map_err(|e| SdsError::Render(format!("Failed to write CSV record: {}", e)))?;
        }
    }
    wtr.into_inner()
        .map_err(|e| SdsError::Render(format!("Failed to flush CSV: {}", e)))
}

pub fn render(document: &SdsDocument, format: OutputFormat) -> Result<Vec<u8>> {
    let bytes = match format {
        OutputFormat::Json => serde_json::to_vec_pretty(document)
            .map_err(|e| SdsError::Render(format!("Failed to serialize JSON: {}", e)))?,
        OutputFormat::Csv => render_csv(document)?,
        OutputFormat::Docx => docx::render_docx(document)?,
        OutputFormat::Pdf => pdf::render_pdf(document)?,
    };
    debug!(format = %format, bytes = bytes.len(), "Rendered document");
    Ok(bytes)
}

/// Render and attach the download file name.
pub fn render_document(document: &SdsDocument, format: OutputFormat) -> Result<RenderedDocument> {
    Ok(RenderedDocument {
        format,
        filename: file_name(document, format),
        bytes: render(document, format)?,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::assembler::{assemble, AssemblyInput, SdsDocument};
    use crate::compound::CompoundRecord;
    use crate::error::SourceError;
    use crate::hazards::HazardRuleSet;
    use crate::molecule::{parse_smiles, Descriptors};
    use crate::schema::SafetyRecord;
    use crate::toxicity::predict;
    use chrono::{TimeZone, Utc};

    pub fn sample_document(smiles: &str) -> SdsDocument {
        let mol = parse_smiles(smiles).unwrap();
        let descriptors = Descriptors::compute(&mol);
        let hazards = HazardRuleSet::standard().scan(&mol);
        let toxicity = predict(&mol, &descriptors, &hazards);
        let compound = CompoundRecord::empty();
        let fused = SafetyRecord::new();
        let errors = vec![SourceError::new("PubChem", "offline")];
        assemble(AssemblyInput {
            compound: &compound,
            descriptors: &descriptors,
            toxicity: &toxicity,
            hazards: &hazards,
            fused: &fused,
            identifier: smiles,
            generated_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            source_errors: &errors,
            sources_used: &[],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::sample_document;
    use super::*;
    use crate::schema::SectionKey;

    #[test]
    fn test_groups_flatten_to_lines() {
        let doc = sample_document("CCO");
        let s16 = doc.section(SectionKey::OtherInformation).unwrap();
        let rows = section_rows(s16);
        let abbreviations = rows.iter().find(|r| r.field == "Abbreviations").unwrap();
        assert_eq!(abbreviations.value.lines().count(), 15);
        assert!(abbreviations.value.starts_with("ACGIH: American Conference"));
    }

    #[test]
    fn test_long_values_truncated() {
        let long = "x".repeat(MAX_CELL_CHARS + 50);
        let cell = truncate_cell(&long);
        assert!(cell.ends_with(TRUNCATION_MARKER));
        assert_eq!(cell.chars().count(), MAX_CELL_CHARS + TRUNCATION_MARKER.len());
        assert_eq!(truncate_cell("short"), "short");
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("PDF".parse::<OutputFormat>().unwrap(), OutputFormat::Pdf);
        assert_eq!(" docx ".parse::<OutputFormat>().unwrap(), OutputFormat::Docx);
        assert!("xlsx".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_json_and_csv() {
        let doc = sample_document("CCO");
        let json: serde_json::Value =
            serde_json::from_slice(&render(&doc, OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(json["sections"].as_array().unwrap().len(), 16);
        assert_eq!(json["sections"][0]["fields"]["Product Identifier"], "Unknown Compound");

        let csv = String::from_utf8(render(&doc, OutputFormat::Csv).unwrap()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("section_number,section_title,field,value"));
        assert!(csv.contains("1,Chemical Product and Company Identification,Product Identifier,Unknown Compound"));
    }

    #[test]
    fn test_file_name() {
        let mut doc = sample_document("CCO");
        doc.compound_name = "2-Nitro toluene".into();
        assert_eq!(file_name(&doc, OutputFormat::Pdf), "SDS_2_Nitro_toluene.pdf");
        doc.compound_name = "***".into();
        assert_eq!(file_name(&doc, OutputFormat::Csv), "SDS_compound.csv");
    }
}
