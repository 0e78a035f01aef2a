//! Minimal WordprocessingML package.
//!
//! The package holds the three parts a word processor needs to open a
//! document: content types, the root relationship and `word/document.xml`.

use super::section_rows;
use crate::assembler::SdsDocument;
use crate::error::{Result, SdsError};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

const WORD_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

const DISCLAIMER: &str = "This document was generated automatically from public databases, \
structural rules and predictive models. Predicted and generated values are advisory and must be \
verified before use.";

/// Half-points, as WordprocessingML measures font size.
const TITLE_SIZE: &str = "36";
const HEADING_SIZE: &str = "28";
const BODY_SIZE: &str = "20";

type XmlWriter = Writer<Cursor<Vec<u8>>>;

fn xml_error(err: impl std::fmt::Display) -> SdsError {
    SdsError::Render(format!("DOCX XML error: {}", err))
}

#[derive(Clone, Copy, Default)]
struct RunStyle {
    bold: bool,
    italic: bool,
    size: Option<&'static str>,
}

impl RunStyle {
    const BODY: RunStyle = RunStyle {
        bold: false,
        italic: false,
        size: Some(BODY_SIZE),
    };
    const LABEL: RunStyle = RunStyle {
        bold: true,
        italic: false,
        size: Some(BODY_SIZE),
    };
    const NOTE: RunStyle = RunStyle {
        bold: false,
        italic: true,
        size: Some(BODY_SIZE),
    };
}

fn start(w: &mut XmlWriter, tag: &str, attrs: &[(&str, &str)]) -> Result<()> {
    let mut elem = BytesStart::new(tag);
    for attr in attrs {
        elem.push_attribute(*attr);
    }
    w.write_event(Event::Start(elem)).map_err(xml_error)
}

fn end(w: &mut XmlWriter, tag: &str) -> Result<()> {
    w.write_event(Event::End(BytesEnd::new(tag))).map_err(xml_error)
}

fn empty(w: &mut XmlWriter, tag: &str, attrs: &[(&str, &str)]) -> Result<()> {
    let mut elem = BytesStart::new(tag);
    for attr in attrs {
        elem.push_attribute(*attr);
    }
    w.write_event(Event::Empty(elem)).map_err(xml_error)
}

/// Text runs, one `<w:br/>` per embedded newline.
fn runs(w: &mut XmlWriter, text: &str, style: RunStyle) -> Result<()> {
    start(w, "w:r", &[])?;
    if style.bold || style.italic || style.size.is_some() {
        start(w, "w:rPr", &[])?;
        if style.bold {
            empty(w, "w:b", &[])?;
        }
        if style.italic {
            empty(w, "w:i", &[])?;
        }
        if let Some(size) = style.size {
            empty(w, "w:sz", &[("w:val", size)])?;
        }
        end(w, "w:rPr")?;
    }
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            empty(w, "w:br", &[])?;
        }
        start(w, "w:t", &[("xml:space", "preserve")])?;
        w.write_event(Event::Text(BytesText::new(line))).map_err(xml_error)?;
        end(w, "w:t")?;
    }
    end(w, "w:r")
}

fn paragraph(w: &mut XmlWriter, text: &str, style: RunStyle) -> Result<()> {
    start(w, "w:p", &[])?;
    runs(w, text, style)?;
    end(w, "w:p")
}

fn cell(w: &mut XmlWriter, text: &str, style: RunStyle, width: &str) -> Result<()> {
    start(w, "w:tc", &[])?;
    start(w, "w:tcPr", &[])?;
    empty(w, "w:tcW", &[("w:w", width), ("w:type", "dxa")])?;
    end(w, "w:tcPr")?;
    paragraph(w, text, style)?;
    end(w, "w:tc")
}

fn table(w: &mut XmlWriter, rows: &[(String, String)]) -> Result<()> {
    start(w, "w:tbl", &[])?;
    start(w, "w:tblPr", &[])?;
    empty(w, "w:tblW", &[("w:w", "5000"), ("w:type", "pct")])?;
    start(w, "w:tblBorders", &[])?;
    for side in ["w:top", "w:left", "w:bottom", "w:right", "w:insideH", "w:insideV"] {
        empty(w, side, &[("w:val", "single"), ("w:sz", "4"), ("w:color", "999999")])?;
    }
    end(w, "w:tblBorders")?;
    end(w, "w:tblPr")?;
    start(w, "w:tblGrid", &[])?;
    empty(w, "w:gridCol", &[("w:w", "3000")])?;
    empty(w, "w:gridCol", &[("w:w", "6000")])?;
    end(w, "w:tblGrid")?;
    for (field, value) in rows {
        start(w, "w:tr", &[])?;
        cell(w, field, RunStyle::LABEL, "3000")?;
        cell(w, value, RunStyle::BODY, "6000")?;
        end(w, "w:tr")?;
    }
    end(w, "w:tbl")
}

fn document_xml(document: &SdsDocument) -> Result<Vec<u8>> {
    let mut w = Writer::new(Cursor::new(Vec::new()));
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
        .map_err(xml_error)?;
    start(&mut w, "w:document", &[("xmlns:w", WORD_NS)])?;
    start(&mut w, "w:body", &[])?;

    let title = RunStyle {
        bold: true,
        size: Some(TITLE_SIZE),
        ..Default::default()
    };
    let heading = RunStyle {
        bold: true,
        size: Some(HEADING_SIZE),
        ..Default::default()
    };

    paragraph(&mut w, "Safety Data Sheet", title)?;
    paragraph(&mut w, &document.compound_name, heading)?;
    paragraph(
        &mut w,
        &format!(
            "SMILES: {}\nGenerated: {}",
            document.identifier,
            document.generated_at.format("%Y-%m-%d %H:%M UTC")
        ),
        RunStyle::BODY,
    )?;

    paragraph(&mut w, "Table of Contents", heading)?;
    for section in &document.sections {
        paragraph(&mut w, &format!("{}. {}", section.number, section.title), RunStyle::BODY)?;
    }

    for section in &document.sections {
        paragraph(&mut w, &format!("Section {}: {}", section.number, section.title), heading)?;
        let rows: Vec<(String, String)> = section_rows(section)
            .into_iter()
            .map(|r| (r.field, r.value))
            .collect();
        table(&mut w, &rows)?;
        if !section.data_sources.is_empty() {
            paragraph(
                &mut w,
                &format!("Data sources: {}", section.data_sources.join(", ")),
                RunStyle::NOTE,
            )?;
        }
        for note in &section.notes {
            paragraph(&mut w, &format!("Note: {}", note), RunStyle::NOTE)?;
        }
    }

    paragraph(&mut w, "Disclaimer", heading)?;
    paragraph(&mut w, DISCLAIMER, RunStyle::NOTE)?;

    end(&mut w, "w:body")?;
    end(&mut w, "w:document")?;
    Ok(w.into_inner().into_inner())
}

pub fn render_docx(document: &SdsDocument) -> Result<Vec<u8>> {
    let body = document_xml(document)?;
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let parts: [(&str, &[u8]); 3] = [
        ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
        ("_rels/.rels", ROOT_RELS.as_bytes()),
        ("word/document.xml", &body),
    ];
    for (name, bytes) in parts {
        zip.start_file(name, options)
            .map_err(|e| SdsError::Render(format!("Failed to add {}: {}", name, e)))?;
        zip.write_all(bytes)?;
    }
    let cursor = zip
        .finish()
        .map_err(|e| SdsError::Render(format!("Failed to finish DOCX package: {}", e)))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::test_support::sample_document;
    use std::io::Read;

    #[test]
    fn test_docx_package_layout() {
        let doc = sample_document("CCO");
        let bytes = render_docx(&doc).unwrap();
        assert_eq!(&bytes[..2], b"PK");

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert!(archive.by_name("[Content_Types].xml").is_ok());
        assert!(archive.by_name("_rels/.rels").is_ok());

        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .unwrap()
            .read_to_string(&mut xml)
            .unwrap();
        assert!(xml.contains("Table of Contents"));
        assert!(xml.contains("Section 16: Other Information"));
        assert_eq!(xml.matches("<w:tbl>").count(), 16);
        assert!(xml.contains("<w:i/>"));
    }

    #[test]
    fn test_text_is_escaped() {
        let mut doc = sample_document("CCO");
        doc.compound_name = "A & B <test>".into();
        let xml = String::from_utf8(document_xml(&doc).unwrap()).unwrap();
        assert!(xml.contains("A &amp; B &lt;test&gt;"));
    }
}
